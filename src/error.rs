//! Error types for request handling and the persistent cache.
//!
//! Configuration errors live in `config::ConfigError`.

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// TransformError
// ============================================================================

/// Failure of a transform request.
///
/// Cloneable because one outcome is shared by every caller waiting on the
/// same pending request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The pipeline produced nothing for this module.
    #[error("failed to load url {url} (resolved id: {id}){}", importer_suffix(.importer))]
    LoadFailed {
        url: String,
        id: String,
        importer: Option<String>,
    },

    #[error("transform of {id} failed: {message}")]
    Pipeline { id: String, message: String },

    /// The pending request was dropped before producing a result.
    #[error("request for {url} was aborted")]
    Aborted { url: String },
}

fn importer_suffix(importer: &Option<String>) -> String {
    importer
        .as_deref()
        .map(|i| format!(" in {i}. Does the file exist?"))
        .unwrap_or_default()
}

// ============================================================================
// CacheError
// ============================================================================

/// Persistent cache failures that cannot be degraded to a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache IO error at `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache version file `{0}` does not exist")]
    VersionFileMissing(PathBuf),

    #[error("cache manifest serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_load_failed_display() {
        let err = TransformError::LoadFailed {
            url: "/src/missing.ts".into(),
            id: "/root/src/missing.ts".into(),
            importer: Some("/src/main.ts".into()),
        };
        let display = err.to_string();
        assert!(display.contains("/src/missing.ts"));
        assert!(display.contains("in /src/main.ts"));

        let err = TransformError::LoadFailed {
            url: "/a".into(),
            id: "/a".into(),
            importer: None,
        };
        assert!(!err.to_string().contains("Does the file exist"));
    }

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::io("cache/_manifest.json", Error::new(ErrorKind::NotFound, "gone"));
        assert!(err.to_string().contains("_manifest.json"));

        let err = CacheError::VersionFileMissing(PathBuf::from("yarn.lock"));
        assert!(err.to_string().contains("yarn.lock"));
    }
}
