//! Development configuration (`devgraph.toml`).
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── cache      # [cache]
//! │   └── hmr        # [hmr]
//! ├── error          # ConfigError
//! └── mod.rs         # DevConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section   | Purpose                                        |
//! |-----------|------------------------------------------------|
//! | `[cache]` | Persistent transform cache (dir, version, ...) |
//! | `[hmr]`   | Change event coalescing                        |

mod error;
pub mod section;

pub use error::ConfigError;
pub use section::{CacheConfig, HmrConfig};

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevConfig {
    /// Project root. Relative roots are resolved against the config file.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Persistent cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Hot update settings
    #[serde(default)]
    pub hmr: HmrConfig,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            cache: CacheConfig::default(),
            hmr: HmrConfig::default(),
        }
    }
}

impl DevConfig {
    /// Parse configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load and validate configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let mut config = Self::from_str(&content)?;

        if config.root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.root = base.join(&config.root);
        }

        config.validate()?;
        crate::debug!("config"; "loaded {} (root: {})", path.display(), config.root.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.enabled && self.cache.dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "cache.dir must not be empty when the cache is enabled".into(),
            ));
        }
        if self.cache.flush_debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "cache.flush_debounce_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Join a path with the root directory.
    pub fn root_join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DevConfig::from_str("").unwrap();
        assert_eq!(config, DevConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            DevConfig::from_str("[cache\nenabled = true"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_validation() {
        let config = DevConfig::from_str("[cache]\nenabled = true\ndir = \"\"").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        // An empty dir is fine while the cache is off.
        let config = DevConfig::from_str("[cache]\ndir = \"\"").unwrap();
        assert!(config.validate().is_ok());

        let config = DevConfig::from_str("[cache]\nflush_debounce_ms = 0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_resolves_root() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("devgraph.toml");
        fs::write(&path, "root = \"web\"\n[cache]\nenabled = true").unwrap();

        let config = DevConfig::load(&path).unwrap();
        assert_eq!(config.root, dir.path().join("web"));
        assert_eq!(
            config.root_join("src/main.ts"),
            dir.path().join("web/src/main.ts")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = DevConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }
}
