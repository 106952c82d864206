//! Module and environment kinds.

use serde::{Deserialize, Serialize};

use super::url::clean_url;

/// Extensions served as stylesheets.
const STYLE_EXTENSIONS: &[&str] = &[
    "css", "less", "sass", "scss", "styl", "stylus", "pcss", "postcss", "sss",
];

/// Kind of module, determines update semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// JavaScript-like module
    Script,
    /// Stylesheet module
    Style,
}

impl ModuleKind {
    /// Detect module kind from a request url (query and hash ignored).
    pub fn from_url(url: &str) -> Self {
        if is_css_request(url) {
            Self::Style
        } else {
            Self::Script
        }
    }
}

/// Check if a request url targets a stylesheet.
pub fn is_css_request(url: &str) -> bool {
    let path = clean_url(url);
    path.rsplit_once('.')
        .filter(|(_, ext)| !ext.contains('/'))
        .is_some_and(|(_, ext)| STYLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Execution environment a graph is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    /// Modules served to the browser, re-requested lazily after invalidation
    Browser,
    /// Modules evaluated by the server; evaluation state must cascade
    Server,
}

impl EnvironmentKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Browser => "client",
            Self::Server => "ssr",
        }
    }

    #[inline]
    pub fn is_server(self) -> bool {
        matches!(self, Self::Server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_url() {
        assert_eq!(ModuleKind::from_url("/src/main.ts"), ModuleKind::Script);
        assert_eq!(ModuleKind::from_url("/src/style.css"), ModuleKind::Style);
        assert_eq!(ModuleKind::from_url("/src/a.scss?direct"), ModuleKind::Style);
        assert_eq!(ModuleKind::from_url("/src/a.CSS"), ModuleKind::Style);
    }

    #[test]
    fn test_css_request_ignores_dotted_dirs() {
        assert!(!is_css_request("/node_modules/pkg.css/index.js"));
        assert!(!is_css_request("/src/noext"));
    }

    #[test]
    fn test_environment_names() {
        assert_eq!(EnvironmentKind::Browser.name(), "client");
        assert!(EnvironmentKind::Server.is_server());
    }
}
