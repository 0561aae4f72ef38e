//! JSON configuration for an SSR server.
//!
//! ```json
//! {
//!   "bind": "0.0.0.0:4000",
//!   "document": "dist/browser/index.html",
//!   "bootstrap": "AppServerModule",
//!   "coalesceMisses": true,
//!   "cache": { "maxEntries": 100 },
//!   "routeCaches": [
//!     { "path": "/", "ttl": 30 },
//!     { "path": "/search", "useQueryParams": true }
//!   ]
//! }
//! ```
//!
//! Every field is optional. Unknown keys are rejected.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::cache::{MemoryCacheConfig, MemoryRenderCache};
use crate::ssr::{Bootstrap, PolicyError, RoutePolicy, RoutePolicyConfig, SetupOptions};

/// Errors raised while loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidPolicy(#[from] PolicyError),
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SsrConfig {
    /// Address the server binds to.
    pub bind: String,
    /// Document template rendered for every page.
    pub document: PathBuf,
    /// Default bootstrap target.
    pub bootstrap: Option<String>,
    /// Coalesce concurrent misses for one cache key.
    pub coalesce_misses: bool,
    pub cache: MemoryCacheConfig,
    /// Route cache policies in priority order.
    pub route_caches: Vec<RoutePolicyConfig>,
}

impl Default for SsrConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:4000".to_owned(),
            document: PathBuf::from("dist/browser/index.html"),
            bootstrap: None,
            coalesce_misses: true,
            cache: MemoryCacheConfig::default(),
            route_caches: Vec::new(),
        }
    }
}

impl SsrConfig {
    /// Parses and validates a config from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Rejects unusable route policies and warns about shadowed ones.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut seen = HashSet::new();
        for config in &self.route_caches {
            RoutePolicy::from(config.clone()).validate()?;
            if !seen.insert(config.path.as_str()) {
                warn!(path = %config.path, "duplicate route cache policy, the first one wins");
            }
        }
        Ok(())
    }

    /// Setup options carrying the bootstrap target and route policies.
    pub fn setup_options(&self) -> SetupOptions {
        SetupOptions {
            bootstrap: self.bootstrap.as_deref().map(Bootstrap::from),
            providers: Vec::new(),
            route_caches: self.route_caches.iter().cloned().map(RoutePolicy::from).collect(),
        }
    }

    /// A render cache sized by the `cache` section.
    pub fn render_cache(&self) -> MemoryRenderCache {
        MemoryRenderCache::new(self.cache.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = SsrConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SsrConfig::default());
        assert_eq!(config.cache.max_entries.get(), 100);
        assert!(config.coalesce_misses);
    }

    #[test]
    fn full_config() {
        let config = SsrConfig::from_json_str(
            r#"{
                "bind": "0.0.0.0:8080",
                "document": "public/index.html",
                "bootstrap": "AppServerModule",
                "coalesceMisses": false,
                "cache": { "maxEntries": 10, "maxValueBytes": 4096 },
                "routeCaches": [
                    { "path": "/", "ttl": 30 },
                    { "path": "/search", "useQueryParams": true }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.document, PathBuf::from("public/index.html"));
        assert!(!config.coalesce_misses);
        assert_eq!(config.cache.max_value_bytes, Some(4096));

        let setup = config.setup_options();
        assert_eq!(setup.bootstrap.as_ref().map(Bootstrap::name), Some("AppServerModule"));
        assert_eq!(setup.route_caches.len(), 2);
        assert_eq!(setup.route_caches[0].ttl_duration().as_secs(), 30);
        assert!(setup.route_caches[1].uses_query_params());
        assert_eq!(config.render_cache().capacity(), 10);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SsrConfig::from_json_str(r#"{"port": 80}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let err = SsrConfig::from_json_str(r#"{"routeCaches": [{"path": "/", "ttl": 0}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPolicy(PolicyError::ZeroTtl { .. })));
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        let err = SsrConfig::from_json_str(
            r#"{"routeCaches": [{"path": "/", "ttl": 18446744073709551615}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPolicy(PolicyError::TtlTooLong { .. })));
    }

    #[test]
    fn relative_path_is_rejected() {
        let err = SsrConfig::from_json_str(r#"{"routeCaches": [{"path": "home"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPolicy(PolicyError::RelativePath { .. })));
    }

    #[test]
    fn duplicate_paths_are_accepted() {
        let config = SsrConfig::from_json_str(
            r#"{"routeCaches": [{"path": "/", "ttl": 5}, {"path": "/", "ttl": 9}]}"#,
        )
        .unwrap();
        assert_eq!(config.route_caches.len(), 2);
    }

    #[test]
    fn missing_file() {
        let err = SsrConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
