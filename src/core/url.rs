//! Request url helpers.
//!
//! Urls arrive from the browser with volatile query parameters (`t=<ms>`
//! cache busters, `import` markers) that must not create new graph nodes.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

/// `t=1700000000000` cache-busting marker injected by the client runtime.
static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u:\b)t=[0-9]+&?").unwrap());

/// `import` marker added to non-js imports.
static IMPORT_QUERY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([?&])import=?(?:&|$)").unwrap());

/// Dangling `?` or `&` left over after a parameter was removed.
static TRAILING_SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?&]$").unwrap());

/// Decode a percent-encoded browser url, keeping the raw text on invalid utf-8.
pub fn decode_url(encoded: &str) -> String {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| encoded.to_string())
}

/// Strip query string and hash.
#[inline]
pub fn clean_url(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// Remove the `t=<ms>` cache-busting parameter.
pub fn remove_timestamp_query(url: &str) -> String {
    let stripped = TIMESTAMP_RE.replace(url, "");
    TRAILING_SEPARATOR_RE.replace(&stripped, "").into_owned()
}

/// Remove the `import` marker parameter.
pub fn remove_import_query(url: &str) -> String {
    let stripped = IMPORT_QUERY_RE.replace(url, "$1");
    TRAILING_SEPARATOR_RE.replace(&stripped, "").into_owned()
}

/// Remove every volatile parameter that must not distinguish graph nodes.
pub fn strip_volatile_query(url: &str) -> String {
    remove_import_query(&remove_timestamp_query(url))
}

/// Extension of the last path segment, including the leading dot.
pub fn extname(path: &str) -> Option<&str> {
    let path = clean_url(path);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&file_name[idx..]),
    }
}

/// Check if a path names an html document.
#[inline]
pub fn is_html(path: &str) -> bool {
    clean_url(path).ends_with(".html")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        LazyLock::force(&TIMESTAMP_RE);
        LazyLock::force(&IMPORT_QUERY_RE);
        LazyLock::force(&TRAILING_SEPARATOR_RE);
    }

    #[test]
    fn test_clean_url() {
        assert_eq!(clean_url("/a.js?t=1#x"), "/a.js");
        assert_eq!(clean_url("/a.js#x"), "/a.js");
        assert_eq!(clean_url("/a.js"), "/a.js");
    }

    #[test]
    fn test_remove_timestamp_query() {
        assert_eq!(remove_timestamp_query("/a.js?t=1700000000000"), "/a.js");
        assert_eq!(
            remove_timestamp_query("/a.js?t=1700000000000&v=3"),
            "/a.js?v=3"
        );
        assert_eq!(
            remove_timestamp_query("/a.vue?vue&t=1700000000000"),
            "/a.vue?vue"
        );
        assert_eq!(remove_timestamp_query("/a.js?raw"), "/a.js?raw");
        assert_eq!(remove_timestamp_query("/a.js?at=1"), "/a.js?at=1");
    }

    #[test]
    fn test_remove_import_query() {
        assert_eq!(remove_import_query("/a.svg?import"), "/a.svg");
        assert_eq!(remove_import_query("/a.svg?import&raw"), "/a.svg?raw");
        assert_eq!(remove_import_query("/a.svg?raw&import"), "/a.svg?raw");
    }

    #[test]
    fn test_strip_volatile_query() {
        assert_eq!(
            strip_volatile_query("/a.svg?import&t=1700000000000"),
            "/a.svg"
        );
    }

    #[test]
    fn test_extname() {
        assert_eq!(extname("/src/main.ts"), Some(".ts"));
        assert_eq!(extname("/src/main.ts?raw"), Some(".ts"));
        assert_eq!(extname("/src/main"), None);
        assert_eq!(extname("/src/.env"), None);
        assert_eq!(extname("/pkg.d/main"), None);
    }

    #[test]
    fn test_decode_url() {
        assert_eq!(decode_url("/posts/hello%20world.js"), "/posts/hello world.js");
        assert_eq!(decode_url("/%E4%B8%AD%E6%96%87.js"), "/中文.js");
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("/index.html"));
        assert!(is_html("/index.html?x"));
        assert!(!is_html("/index.js"));
    }
}
