//! Configuration types
//!
//! Loading configuration is the host's job; these types describe the shape
//! the storage layer consumes and check it before any connection is opened.

use crate::error::{ConfigError, StrataError, StrataResult};
use crate::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Partition name reserved for the meta partition.
pub const META_PARTITION: &str = "meta";

/// Default cache key prefix.
pub const DEFAULT_CACHE_PREFIX: &str = "strata";

/// Connection settings for one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub uri: String,
    pub dbname: String,
    /// Driver options passed through untouched.
    #[serde(default)]
    pub options: Document,
    /// `false` marks the partition read-only.
    #[serde(default = "default_open")]
    pub open: bool,
}

fn default_open() -> bool {
    true
}

impl ShardConfig {
    pub fn new(uri: impl Into<String>, dbname: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            dbname: dbname.into(),
            options: Document::new(),
            open: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.open = false;
        self
    }
}

/// Which cache adapter to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// In-process expiring map.
    Simple,
    /// External network cache.
    Memcached,
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(rename = "type")]
    pub kind: CacheKind,
    /// Network cache endpoints, `host:port`.
    #[serde(default)]
    pub backends: Vec<String>,
    #[serde(default)]
    pub options: Document,
    /// Default time-to-live in seconds.
    #[serde(rename = "defaultTTL", alias = "default_ttl")]
    pub default_ttl: u64,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    DEFAULT_CACHE_PREFIX.to_string()
}

impl CacheConfig {
    pub fn simple(default_ttl: u64) -> Self {
        Self {
            kind: CacheKind::Simple,
            backends: Vec::new(),
            options: Document::new(),
            default_ttl,
            prefix: default_prefix(),
        }
    }

    pub fn memcached(backends: Vec<String>, default_ttl: u64) -> Self {
        Self {
            kind: CacheKind::Memcached,
            backends,
            ..Self::simple(default_ttl)
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// Top-level database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub meta: ShardConfig,
    #[serde(default)]
    pub shards: BTreeMap<String, ShardConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
}

impl DatabaseConfig {
    pub fn new(meta: ShardConfig) -> Self {
        Self {
            meta,
            shards: BTreeMap::new(),
            cache: None,
        }
    }

    pub fn with_shard(mut self, id: impl Into<String>, shard: ShardConfig) -> Self {
        self.shards.insert(id.into(), shard);
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn from_toml_str(s: &str) -> StrataResult<Self> {
        toml::from_str(s).map_err(|e| {
            StrataError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })
    }

    pub fn from_json_str(s: &str) -> StrataResult<Self> {
        serde_json::from_str(s).map_err(|e| {
            StrataError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - every partition has a non-empty uri and dbname
    /// - shard ids are non-empty and do not shadow the meta partition
    /// - a memcached cache names at least one backend
    /// - the cache default TTL is positive
    pub fn validate(&self) -> StrataResult<()> {
        validate_shard(META_PARTITION, &self.meta)?;

        for (id, shard) in &self.shards {
            if id.trim().is_empty() {
                return Err(StrataError::Config(ConfigError::InvalidValue {
                    field: "shards".to_string(),
                    value: format!("{:?}", id),
                    reason: "shard id must not be empty".to_string(),
                }));
            }
            if id == META_PARTITION {
                return Err(StrataError::Config(ConfigError::InvalidValue {
                    field: "shards".to_string(),
                    value: id.clone(),
                    reason: "shard id is reserved for the meta partition".to_string(),
                }));
            }
            validate_shard(&format!("shards.{}", id), shard)?;
        }

        if let Some(cache) = &self.cache {
            if cache.kind == CacheKind::Memcached && cache.backends.is_empty() {
                return Err(StrataError::Config(ConfigError::MissingRequired {
                    field: "cache.backends".to_string(),
                }));
            }
            if cache.default_ttl == 0 {
                return Err(StrataError::Config(ConfigError::InvalidValue {
                    field: "cache.defaultTTL".to_string(),
                    value: cache.default_ttl.to_string(),
                    reason: "defaultTTL must be greater than 0".to_string(),
                }));
            }
        }

        Ok(())
    }
}

fn validate_shard(path: &str, shard: &ShardConfig) -> StrataResult<()> {
    if shard.uri.trim().is_empty() {
        return Err(StrataError::Config(ConfigError::MissingRequired {
            field: format!("{}.uri", path),
        }));
    }
    if shard.dbname.trim().is_empty() {
        return Err(StrataError::Config(ConfigError::MissingRequired {
            field: format!("{}.dbname", path),
        }));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
