//! Registry of named tile-source builders.
//!
//! The registry is an ordinary object: create it once for the application
//! and pass it by reference to whatever needs to construct sources. There is
//! no global list.
//!
//! # Example
//!
//! ```
//! use pixelview::source::{SourceParams, TileSourceRegistry};
//!
//! let registry = TileSourceRegistry::with_builtin();
//! let params = SourceParams::new().with("tile_size", "128");
//! let source = registry.build("pattern", &params).unwrap();
//! assert_eq!(source.name(), "pattern");
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::error::ConfigurationError;
use super::pattern::PatternSource;
use super::TileSource;

/// Builder for a tile source from string parameters.
pub type SourceBuilder =
    Arc<dyn Fn(&SourceParams) -> Result<Arc<dyn TileSource>, ConfigurationError> + Send + Sync>;

/// String key/value parameters passed to a source builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceParams {
    values: BTreeMap<String, String>,
}

impl SourceParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Parse `key=value`.
    pub fn parse_pair(pair: &str) -> Result<(String, String), ConfigurationError> {
        match pair.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ConfigurationError::InvalidParameter {
                name: pair.to_string(),
                value: String::new(),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Parse a parameter, falling back to `default` when absent.
    pub fn get_parsed<T: FromStr>(&self, name: &str, default: T) -> Result<T, ConfigurationError> {
        match self.values.get(name) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigurationError::InvalidParameter {
                    name: name.to_string(),
                    value: raw.clone(),
                }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Named collection of tile-source builders.
pub struct TileSourceRegistry {
    builders: RwLock<BTreeMap<String, SourceBuilder>>,
}

impl TileSourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            builders: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a registry with the built-in sources installed.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register("pattern", |params: &SourceParams| {
            let source = PatternSource::from_params(params)?;
            Ok(Arc::new(source) as Arc<dyn TileSource>)
        });
        registry
    }

    /// Install a builder, replacing any previous builder with the same name.
    ///
    /// Returns `true` if a builder was replaced.
    pub fn register<F>(&self, name: impl Into<String>, builder: F) -> bool
    where
        F: Fn(&SourceParams) -> Result<Arc<dyn TileSource>, ConfigurationError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        debug!(source = %name, "Registering tile source builder");
        self.builders
            .write()
            .insert(name, Arc::new(builder))
            .is_some()
    }

    /// Remove a builder.
    pub fn unregister(&self, name: &str) -> bool {
        self.builders.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.read().contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.builders.read().keys().cloned().collect()
    }

    /// Build a source by name.
    pub fn build(
        &self,
        name: &str,
        params: &SourceParams,
    ) -> Result<Arc<dyn TileSource>, ConfigurationError> {
        // Clone the builder out so user code never runs under the lock
        let builder = self
            .builders
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownSource(name.to_string()))?;
        builder(params)
    }
}

impl Default for TileSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TileSourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSourceRegistry")
            .field("names", &self.names())
            .finish()
    }
}
