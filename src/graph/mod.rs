//! Module graph.
//!
//! # Module Structure
//!
//! ```text
//! graph/
//! ├── node         # ModuleNode, ModuleId, TransformResult, ModuleInfo
//! ├── store        # ModuleGraph: arena, indices, edges, invalidation
//! ├── environment  # EnvironmentGraph: lock + resolver, async operations
//! └── mixed        # MixedModuleGraph: merged browser/server view
//! ```

mod environment;
mod mixed;
mod node;
mod store;


pub use environment::EnvironmentGraph;
pub use mixed::{MixedInfo, MixedModuleGraph, MixedNode};
pub use node::{Evaluation, ModuleId, ModuleInfo, ModuleNode, TransformResult};
pub use store::{FS_PREFIX, LinkedInfo, ModuleGraph, ResolvedUrl};
