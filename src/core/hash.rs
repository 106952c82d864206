//! Content hashing using blake3.

use std::fmt;

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash a single byte slice.
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        Self(*blake3::hash(bytes.as_ref()).as_bytes())
    }

    /// Hash several parts as one stream (no separators).
    pub fn of_parts<I, B>(parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part.as_ref());
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Get the raw bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// First 16 hex chars, used for file names and version stamps.
    pub fn short(self) -> String {
        self.to_hex()[..16].to_string()
    }

    /// Create from hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 32 {
            return None;
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Some(Self(arr))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display first 16 chars of hex for brevity
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Weak etag for emitted code: `W/"<len>-<hash>"`.
pub fn weak_etag(code: &str) -> String {
    format!("W/\"{:x}-{}\"", code.len(), ContentHash::of(code).short())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_display() {
        let hash = ContentHash::new([0xab; 32]);
        assert_eq!(format!("{}", hash), "abababababababab");
    }

    #[test]
    fn test_content_hash_hex_roundtrip() {
        let original = ContentHash::new([0x12; 32]);
        let recovered = ContentHash::from_hex(&original.to_hex()).unwrap();
        assert_eq!(original, recovered);
        assert!(ContentHash::from_hex("abcd").is_none());
    }

    #[test]
    fn test_parts_match_concatenation() {
        assert_eq!(
            ContentHash::of_parts(["/src/a.ts", "export {}"]),
            ContentHash::of("/src/a.tsexport {}")
        );
        assert_ne!(ContentHash::of("a"), ContentHash::of("b"));
    }

    #[test]
    fn test_weak_etag() {
        let etag = weak_etag("export default 1");
        assert!(etag.starts_with("W/\"10-"));
        assert!(etag.ends_with('"'));
        assert_eq!(etag, weak_etag("export default 1"));
        assert_ne!(etag, weak_etag("export default 2"));
    }
}
