//! Core types - pure abstractions shared across the codebase.

mod clock;
mod hash;
mod kind;
mod url;

pub use clock::{Clock, Timestamp};
pub use hash::{ContentHash, weak_etag};
pub use kind::{EnvironmentKind, ModuleKind, is_css_request};
pub use url::{
    clean_url, decode_url, extname, is_html, remove_import_query,
    remove_timestamp_query, strip_volatile_query,
};
