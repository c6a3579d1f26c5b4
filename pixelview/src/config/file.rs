//! INI configuration file.
//!
//! ```ini
//! [overlay]
//! threads = 8
//! live_prediction = true
//! opacity = 0.8
//!
//! [cache]
//! tile_cache_size = 512MB
//! display_cache_size = 128MB
//!
//! [logging]
//! directory = /home/user/.local/share/pixelview/logs
//! verbose = false
//! ```
//!
//! Missing keys fall back to their defaults. `threads = 0` or an absent
//! `threads` means one worker per CPU.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::size::{format_size, parse_size};

/// Default byte bound of the computed tile cache.
pub const DEFAULT_TILE_CACHE_SIZE: u64 = 512 * 1024 * 1024;

/// Default byte bound of the colorized display cache.
pub const DEFAULT_DISPLAY_CACHE_SIZE: u64 = 128 * 1024 * 1024;

/// Default overlay opacity.
pub const DEFAULT_OPACITY: f32 = 1.0;

const APP_DIR: &str = "pixelview";
const CONFIG_FILE: &str = "config.ini";

/// Errors reading, writing or interpreting the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `[overlay]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySettings {
    /// Worker threads; `None` uses one per CPU.
    pub threads: Option<usize>,
    pub live_prediction: bool,
    pub opacity: f32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            threads: None,
            live_prediction: true,
            opacity: DEFAULT_OPACITY,
        }
    }
}

/// `[cache]` section. Sizes are in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub tile_cache_size: u64,
    pub display_cache_size: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            tile_cache_size: DEFAULT_TILE_CACHE_SIZE,
            display_cache_size: DEFAULT_DISPLAY_CACHE_SIZE,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Directory for log files; `None` logs to stderr only.
    pub directory: Option<PathBuf>,
    pub verbose: bool,
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub overlay: OverlaySettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

/// `<config dir>/pixelview`, or `./pixelview` if the platform has none.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Path of the user's configuration file.
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE)
}

impl ConfigFile {
    /// Load the user's configuration file, or defaults if it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Save to the user's configuration file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_error)?;
            }
        }
        self.to_ini().write_to_file(path).map_err(write_error)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("overlay")) {
            if let Some(value) = section.get("threads") {
                config.overlay.threads = parse_threads(value)?;
            }
            if let Some(value) = section.get("live_prediction") {
                config.overlay.live_prediction = parse_bool("overlay.live_prediction", value)?;
            }
            if let Some(value) = section.get("opacity") {
                config.overlay.opacity = parse_opacity(value)?;
            }
        }

        if let Some(section) = ini.section(Some("cache")) {
            if let Some(value) = section.get("tile_cache_size") {
                config.cache.tile_cache_size = parse_size_value("cache.tile_cache_size", value)?;
            }
            if let Some(value) = section.get("display_cache_size") {
                config.cache.display_cache_size =
                    parse_size_value("cache.display_cache_size", value)?;
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(value) = section.get("directory") {
                config.logging.directory = parse_directory(value);
            }
            if let Some(value) = section.get("verbose") {
                config.logging.verbose = parse_bool("logging.verbose", value)?;
            }
        }

        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("overlay"))
            .set("threads", self.overlay.threads.unwrap_or(0).to_string())
            .set("live_prediction", self.overlay.live_prediction.to_string())
            .set("opacity", self.overlay.opacity.to_string());
        ini.with_section(Some("cache"))
            .set("tile_cache_size", format_size(self.cache.tile_cache_size))
            .set("display_cache_size", format_size(self.cache.display_cache_size));
        ini.with_section(Some("logging"))
            .set(
                "directory",
                self.logging
                    .directory
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_default(),
            )
            .set("verbose", self.logging.verbose.to_string());
        ini
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub(super) fn parse_threads(value: &str) -> Result<Option<usize>, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    match trimmed.parse::<usize>() {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(invalid(
            "overlay.threads",
            value,
            "expected a thread count or 'auto'",
        )),
    }
}

pub(super) fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}

pub(super) fn parse_opacity(value: &str) -> Result<f32, ConfigError> {
    match value.trim().parse::<f32>() {
        Ok(opacity) if (0.0..=1.0).contains(&opacity) => Ok(opacity),
        _ => Err(invalid(
            "overlay.opacity",
            value,
            "expected a number between 0 and 1",
        )),
    }
}

pub(super) fn parse_size_value(key: &str, value: &str) -> Result<u64, ConfigError> {
    parse_size(value).ok_or_else(|| invalid(key, value, "expected a size such as 512MB"))
}

pub(super) fn parse_directory(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}
