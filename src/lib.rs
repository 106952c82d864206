//! Dev-server core: module graph, hot-update propagation and transform caching.
//!
//! # Module Structure
//!
//! ```text
//! src/
//! ├── core/       # clock, url helpers, module and environment kinds, hashing
//! ├── plugin      # Resolver / Pipeline collaborator traits
//! ├── graph/      # per-environment module graph + merged view
//! ├── hmr/        # update propagation, payloads, event loop
//! ├── transform/  # deduplicated transform requests
//! ├── cache/      # persistent content-addressed transform cache
//! ├── config/     # devgraph.toml
//! ├── error       # TransformError, CacheError
//! └── logger      # log! / debug! / warn!
//! ```
//!
//! # Wiring
//!
//! ```ignore
//! let clock = Clock::new();
//! let client = Arc::new(EnvironmentGraph::new(EnvironmentKind::Browser, resolver));
//! let (tx, rx) = hmr::channel();
//! let requests = TransformRequestCache::new(client.clone(), pipeline, clock.clone())
//!     .with_hmr_channel(tx.clone());
//! let engine = Arc::new(HmrEngine::new(root, clock).with_environment(client, tx));
//! tokio::spawn(HmrActor::new(changes, engine, config.hmr.debounce()).run());
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod graph;
pub mod hmr;
pub mod logger;
pub mod plugin;
pub mod transform;

#[cfg(test)]
mod testing;

pub use cache::{CacheOptions, PersistentCache};
pub use config::{ConfigError, DevConfig};
pub use core::{Clock, EnvironmentKind, Timestamp};
pub use error::{CacheError, TransformError};
pub use graph::{EnvironmentGraph, MixedModuleGraph, ModuleGraph, ModuleId, ModuleInfo, TransformResult};
pub use hmr::{FileChange, HmrActor, HmrEngine, HmrPayload};
pub use plugin::{Pipeline, PipelineOutput, ResolvedId, Resolver};
pub use transform::TransformRequestCache;
