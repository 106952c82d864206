//! `[cache]` section configuration.
//!
//! Controls the persistent transform cache.
//!
//! # Example
//!
//! ```toml
//! [cache]
//! enabled = true
//! dir = "node_modules/.devgraph/server-cache"
//! version = "1"                       # bump to drop every entry
//! version_files = ["devgraph.toml"]   # contents feed the version hash
//! flush_debounce_ms = 1000
//! exclude = ["/src/generated/"]       # url substrings never persisted
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Persistent cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Opt-in; the cache is off unless enabled.
    pub enabled: bool,

    /// Cache directory, relative to the project root.
    pub dir: PathBuf,

    /// User-declared version string.
    pub version: String,

    /// Extra files hashed into the cache version, relative to the root.
    pub version_files: Vec<PathBuf>,

    /// Manifest write coalescing window in milliseconds.
    pub flush_debounce_ms: u64,

    /// Urls containing any of these substrings are never persisted.
    pub exclude: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("node_modules/.devgraph/server-cache"),
            version: String::new(),
            version_files: Vec::new(),
            flush_debounce_ms: 1000,
            exclude: Vec::new(),
        }
    }
}
