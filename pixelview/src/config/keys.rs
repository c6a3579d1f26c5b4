//! Addressing individual settings by `section.key` name.

use std::str::FromStr;

use super::file::{
    parse_bool, parse_directory, parse_opacity, parse_size_value, parse_threads, ConfigError,
    ConfigFile,
};
use super::size::format_size;

/// A single configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    OverlayThreads,
    OverlayLivePrediction,
    OverlayOpacity,
    CacheTileCacheSize,
    CacheDisplayCacheSize,
    LoggingDirectory,
    LoggingVerbose,
}

impl ConfigKey {
    /// Every key, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::OverlayThreads,
            ConfigKey::OverlayLivePrediction,
            ConfigKey::OverlayOpacity,
            ConfigKey::CacheTileCacheSize,
            ConfigKey::CacheDisplayCacheSize,
            ConfigKey::LoggingDirectory,
            ConfigKey::LoggingVerbose,
        ]
    }

    /// Full `section.key` name.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::OverlayThreads => "overlay.threads",
            ConfigKey::OverlayLivePrediction => "overlay.live_prediction",
            ConfigKey::OverlayOpacity => "overlay.opacity",
            ConfigKey::CacheTileCacheSize => "cache.tile_cache_size",
            ConfigKey::CacheDisplayCacheSize => "cache.display_cache_size",
            ConfigKey::LoggingDirectory => "logging.directory",
            ConfigKey::LoggingVerbose => "logging.verbose",
        }
    }

    pub fn section(&self) -> &'static str {
        self.name().split('.').next().unwrap_or_default()
    }

    pub fn key_name(&self) -> &'static str {
        self.name().split('.').nth(1).unwrap_or_default()
    }

    /// Current value rendered as it would appear in the file. Empty when
    /// the setting is unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::OverlayThreads => config
                .overlay
                .threads
                .map(|n| n.to_string())
                .unwrap_or_default(),
            ConfigKey::OverlayLivePrediction => config.overlay.live_prediction.to_string(),
            ConfigKey::OverlayOpacity => config.overlay.opacity.to_string(),
            ConfigKey::CacheTileCacheSize => format_size(config.cache.tile_cache_size),
            ConfigKey::CacheDisplayCacheSize => format_size(config.cache.display_cache_size),
            ConfigKey::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
            ConfigKey::LoggingVerbose => config.logging.verbose.to_string(),
        }
    }

    /// Validate `value` and store it in `config`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        match self {
            ConfigKey::OverlayThreads => config.overlay.threads = parse_threads(value)?,
            ConfigKey::OverlayLivePrediction => {
                config.overlay.live_prediction = parse_bool(self.name(), value)?
            }
            ConfigKey::OverlayOpacity => config.overlay.opacity = parse_opacity(value)?,
            ConfigKey::CacheTileCacheSize => {
                config.cache.tile_cache_size = parse_size_value(self.name(), value)?
            }
            ConfigKey::CacheDisplayCacheSize => {
                config.cache.display_cache_size = parse_size_value(self.name(), value)?
            }
            ConfigKey::LoggingDirectory => config.logging.directory = parse_directory(value),
            ConfigKey::LoggingVerbose => config.logging.verbose = parse_bool(self.name(), value)?,
        }
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_key() {
        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
        }
        assert!(matches!(
            "overlay.colour".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_section_and_key_name() {
        assert_eq!(ConfigKey::CacheTileCacheSize.section(), "cache");
        assert_eq!(ConfigKey::CacheTileCacheSize.key_name(), "tile_cache_size");
    }

    #[test]
    fn test_set_then_get() {
        let mut config = ConfigFile::default();
        ConfigKey::OverlayThreads.set(&mut config, "6").unwrap();
        ConfigKey::OverlayOpacity.set(&mut config, "0.4").unwrap();
        ConfigKey::CacheTileCacheSize.set(&mut config, "1GB").unwrap();
        ConfigKey::LoggingVerbose.set(&mut config, "yes").unwrap();

        assert_eq!(ConfigKey::OverlayThreads.get(&config), "6");
        assert_eq!(ConfigKey::OverlayOpacity.get(&config), "0.4");
        assert_eq!(ConfigKey::CacheTileCacheSize.get(&config), "1 GB");
        assert_eq!(ConfigKey::LoggingVerbose.get(&config), "true");
    }

    #[test]
    fn test_unset_values_are_empty() {
        let config = ConfigFile::default();
        assert_eq!(ConfigKey::OverlayThreads.get(&config), "");
        assert_eq!(ConfigKey::LoggingDirectory.get(&config), "");
    }

    #[test]
    fn test_set_rejects_invalid() {
        let mut config = ConfigFile::default();
        assert!(ConfigKey::OverlayLivePrediction
            .set(&mut config, "sometimes")
            .is_err());
        assert!(ConfigKey::CacheDisplayCacheSize
            .set(&mut config, "lots")
            .is_err());
        assert_eq!(config, ConfigFile::default());
    }
}
