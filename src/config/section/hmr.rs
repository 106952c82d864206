//! `[hmr]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [hmr]
//! debounce_ms = 50    # coalesce change bursts (editor save, git checkout)
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hot update settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmrConfig {
    /// Quiet period before a burst of file changes is handled.
    pub debounce_ms: u64,
}

impl HmrConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for HmrConfig {
    fn default() -> Self {
        Self { debounce_ms: 50 }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DevConfig;
    use std::time::Duration;

    #[test]
    fn test_hmr_config() {
        let config = DevConfig::from_str("[hmr]\ndebounce_ms = 120").unwrap();
        assert_eq!(config.hmr.debounce(), Duration::from_millis(120));
        assert_eq!(DevConfig::from_str("").unwrap().hmr.debounce_ms, 50);
    }
}
