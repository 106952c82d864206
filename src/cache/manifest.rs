//! Cache manifest data structures.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::graph::ModuleInfo;

/// Manifest file name (inside the cache dir)
pub const MANIFEST_FILE: &str = "manifest.json";

/// Prefix of every content file written by the cache
pub const CONTENT_PREFIX: &str = "c-";

/// One cached transform output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Source file the module was loaded from
    #[serde(default)]
    pub file: String,
    /// Code file name, relative to the cache dir
    pub file_code: String,
    /// Source map file name, relative to the cache dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_map: Option<String>,
    #[serde(default)]
    pub ssr: bool,
    /// Graph edges needed to restore the module on a warm start.
    /// Specifiers are urls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleInfo>,
}

impl CacheEntry {
    /// Content files referenced by this entry.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.file_code.as_str()).chain(self.file_map.as_deref())
    }
}

/// Key to entry mapping plus the version stamp it was written under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub modules: BTreeMap<String, CacheEntry>,
}

impl Manifest {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            modules: BTreeMap::new(),
        }
    }

    /// Read a manifest from disk. `Ok(None)` if the file does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>, CacheError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn to_json(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every content file name referenced by some entry.
    pub fn referenced_files(&self) -> impl Iterator<Item = &str> {
        self.modules.values().flat_map(CacheEntry::files)
    }
}
