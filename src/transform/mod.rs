//! Transform request cache.
//!
//! Serves transformed module code, sharing in-flight work between concurrent
//! requests and refusing to store results that raced with an invalidation.

mod pending;
mod request;


pub use pending::{PendingRegistry, SharedTransform, TransformOutcome};
pub use request::TransformRequestCache;
