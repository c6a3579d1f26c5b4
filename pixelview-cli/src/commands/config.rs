//! Configuration management CLI commands.
//!
//! Provides `config get`, `config set`, `config list`, and `config path`.
//! Values are shown as they take effect: unset settings show their
//! fallback, and sizes are normalized to the unit `format_size` picks.

use clap::Subcommand;
use pixelview::config::{config_file_path, ConfigFile, ConfigKey};
use pixelview::executor::default_threads;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., overlay.threads)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., cache.tile_cache_size)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => run_path(),
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'pixelview config list' to see available keys.",
            key
        ))
    })
}

fn run_get(key: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let config = ConfigFile::load().unwrap_or_default();
    println!("{}", effective_value(config_key, &config));
    Ok(())
}

fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;

    let before = ConfigFile::load().unwrap_or_default();
    let mut after = before.clone();
    config_key
        .set(&mut after, value)
        .map_err(|e| CliError::Config(e.to_string()))?;
    after.save()?;

    println!("{}", describe_change(config_key, &before, &after));
    Ok(())
}

fn run_list() -> Result<(), CliError> {
    let config = ConfigFile::load().unwrap_or_default();

    println!("{}", config_file_path().display());
    println!();
    for line in list_lines(&config) {
        println!("{}", line);
    }
    Ok(())
}

/// The value a setting takes effect with. Unset settings show what the
/// overlay falls back to.
fn effective_value(key: ConfigKey, config: &ConfigFile) -> String {
    let value = key.get(config);
    if !value.is_empty() {
        return value;
    }
    match key {
        ConfigKey::OverlayThreads => format!("auto ({} CPUs)", default_threads()),
        ConfigKey::LoggingDirectory => "stderr only".to_string(),
        _ => "(not set)".to_string(),
    }
}

/// One line per key. Changed settings are starred and show their default.
fn list_lines(config: &ConfigFile) -> Vec<String> {
    let defaults = ConfigFile::default();
    let mut lines: Vec<String> = ConfigKey::all()
        .iter()
        .map(|&key| {
            let value = effective_value(key, config);
            let default = effective_value(key, &defaults);
            let (marker, hint) = if value == default {
                (' ', String::new())
            } else {
                ('*', format!("default {}", default))
            };
            format!("{} {:<26}{:<16}{}", marker, key.name(), value, hint)
                .trim_end()
                .to_string()
        })
        .collect();

    if lines.iter().any(|line| line.starts_with('*')) {
        lines.push(String::new());
        lines.push("* changed from default".to_string());
    }
    lines
}

/// `key: old -> new`, with values normalized the way they are saved.
fn describe_change(key: ConfigKey, before: &ConfigFile, after: &ConfigFile) -> String {
    let old = effective_value(key, before);
    let new = effective_value(key, after);
    if old == new {
        format!("{} unchanged: {}", key.name(), new)
    } else {
        format!("{}: {} -> {}", key.name(), old, new)
    }
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelview::config::{format_size, DEFAULT_DISPLAY_CACHE_SIZE, DEFAULT_TILE_CACHE_SIZE};

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("overlay.threads").unwrap(), ConfigKey::OverlayThreads);
        let err = parse_key("overlay.nope").unwrap_err();
        assert!(err.to_string().contains("overlay.nope"));
    }

    #[test]
    fn test_effective_value_fallbacks() {
        let config = ConfigFile::default();
        assert_eq!(
            effective_value(ConfigKey::OverlayThreads, &config),
            format!("auto ({} CPUs)", default_threads())
        );
        assert_eq!(
            effective_value(ConfigKey::LoggingDirectory, &config),
            "stderr only"
        );
        assert_eq!(
            effective_value(ConfigKey::CacheTileCacheSize, &config),
            format_size(DEFAULT_TILE_CACHE_SIZE)
        );
    }

    #[test]
    fn test_list_defaults_unmarked() {
        let lines = list_lines(&ConfigFile::default());
        assert_eq!(lines.len(), ConfigKey::all().len());
        assert!(lines.iter().all(|line| line.starts_with("  ")));
        assert!(!lines.iter().any(|line| line.contains("default")));
    }

    #[test]
    fn test_list_marks_changed_values() {
        let mut config = ConfigFile::default();
        ConfigKey::CacheDisplayCacheSize.set(&mut config, "64 MB").unwrap();

        let lines = list_lines(&config);
        let changed: Vec<&String> = lines.iter().filter(|l| l.starts_with('*')).collect();
        assert_eq!(changed.len(), 2);
        assert!(changed[0].contains("cache.display_cache_size"));
        assert!(changed[0].contains(&format_size(64 * 1024 * 1024)));
        let default_hint = format!("default {}", format_size(DEFAULT_DISPLAY_CACHE_SIZE));
        assert!(changed[0].ends_with(&default_hint));
        assert_eq!(changed[1], "* changed from default");
    }

    #[test]
    fn test_describe_change() {
        let before = ConfigFile::default();
        let mut after = before.clone();
        ConfigKey::OverlayThreads.set(&mut after, "4").unwrap();

        let message = describe_change(ConfigKey::OverlayThreads, &before, &after);
        assert_eq!(
            message,
            format!("overlay.threads: auto ({} CPUs) -> 4", default_threads())
        );
        assert_eq!(
            describe_change(ConfigKey::OverlayThreads, &after, &after),
            "overlay.threads unchanged: 4"
        );
    }
}
