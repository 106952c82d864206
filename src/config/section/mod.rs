//! Configuration section definitions.

mod cache;
mod hmr;

pub use cache::CacheConfig;
pub use hmr::HmrConfig;
