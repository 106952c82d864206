//! Persistent transform cache.
//!
//! Transform outputs are stored as content files named after a hash of the
//! module id and its loaded source. A manifest maps each key to its files and
//! to the graph edges needed to restore the module on a warm start.
//!
//! # On-disk layout
//!
//! ```text
//! <dir>/
//! ├── manifest.json   # { version, modules: { key: entry } }
//! ├── c-<key>         # emitted code
//! └── c-<key>-map     # source map, when present
//! ```

mod manifest;
mod store;
mod sweep;
mod version;
mod writer;


pub use manifest::{CacheEntry, MANIFEST_FILE, Manifest};
pub use store::{CacheOptions, CacheRecord, CachedModule, PersistentCache};
pub use version::{LOCKFILES, cache_version, version_files};
