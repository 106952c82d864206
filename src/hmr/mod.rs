//! Update propagation engine.
//!
//! # Module Structure
//!
//! ```text
//! hmr/
//! ├── message    # HmrPayload wire format and channel types
//! ├── event      # FileChange, ChangeKind
//! ├── propagate  # boundary search over importers
//! ├── engine     # HmrEngine: per-event invalidation + decision + delivery
//! ├── debounce   # change coalescing
//! └── actor      # HmrActor: sequential event loop
//! ```

mod actor;
mod debounce;
mod engine;
mod event;
mod message;
mod propagate;

#[cfg(test)]
mod tests;

pub use actor::HmrActor;
pub use engine::{HmrEngine, HmrOutcome, handle_pruned_modules};
pub use event::{ChangeKind, FileChange};
pub use message::{HmrPayload, HmrReceiver, HmrSender, Update, UpdateType, channel};
pub use propagate::{Boundary, Propagation, Propagator};
