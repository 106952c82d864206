//! Module node records.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::core::{ModuleKind, Timestamp, weak_etag};
use crate::plugin::{PipelineOutput, SourceMap};

/// Stable arena index of a node within one environment graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(u32);

impl ModuleId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Output of a transform, shared between the graph and waiting callers.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult {
    pub code: String,
    pub map: Option<SourceMap>,
    pub etag: String,
    pub deps: Vec<String>,
    pub dynamic_deps: Vec<String>,
}

impl TransformResult {
    pub fn new(code: String, map: Option<SourceMap>) -> Self {
        let etag = weak_etag(&code);
        Self {
            code,
            map,
            etag,
            deps: Vec::new(),
            dynamic_deps: Vec::new(),
        }
    }

    pub fn from_output(output: &PipelineOutput) -> Self {
        Self {
            deps: output.imported_ids.clone(),
            dynamic_deps: output.dynamic_import_ids.clone(),
            ..Self::new(output.code.clone(), output.map.clone())
        }
    }
}

/// Server-side evaluation state of a module.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Instance(serde_json::Value),
    Error(String),
}

/// Import and acceptance data reported for one module.
///
/// Specifiers are unresolved urls; the graph resolves them before linking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub imported: Vec<String>,
    #[serde(default)]
    pub static_imported: Vec<String>,
    #[serde(default)]
    pub accepted: Vec<String>,
    #[serde(default)]
    pub accepted_exports: Option<Vec<String>>,
    #[serde(default)]
    pub imported_bindings: Vec<(String, Vec<String>)>,
    #[serde(default)]
    pub is_self_accepting: bool,
}

impl From<&PipelineOutput> for ModuleInfo {
    fn from(output: &PipelineOutput) -> Self {
        Self {
            imported: output.imported_ids.clone(),
            static_imported: output.static_imported_ids.clone(),
            accepted: output.accepted_ids.clone(),
            accepted_exports: output.accepted_exports.clone(),
            imported_bindings: output.imported_bindings.clone(),
            is_self_accepting: output.is_self_accepting,
        }
    }
}

/// A tracked module within one environment.
///
/// Fields are public for reading; all mutation goes through
/// [`ModuleGraph`](super::ModuleGraph) so edge invariants hold.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub url: String,
    /// `None` for file-only entries.
    pub id: Option<String>,
    /// `None` for virtual modules.
    pub file: Option<PathBuf>,
    pub kind: ModuleKind,
    pub meta: Option<serde_json::Value>,

    pub importers: FxHashSet<ModuleId>,
    pub imported_modules: FxHashSet<ModuleId>,
    pub static_imported_modules: FxHashSet<ModuleId>,
    pub accepted_hmr_deps: FxHashSet<ModuleId>,
    pub accepted_hmr_exports: Option<FxHashSet<String>>,
    /// Binding names this node imports from each dependency.
    pub imported_bindings: Option<FxHashMap<ModuleId, FxHashSet<String>>>,
    /// `None` until the module has been analyzed at least once.
    pub is_self_accepting: Option<bool>,

    pub transform_result: Option<Arc<TransformResult>>,
    pub last_hmr_timestamp: Timestamp,
    pub last_invalidation_timestamp: Timestamp,
    pub evaluation: Option<Evaluation>,
}

impl ModuleNode {
    pub(crate) fn new(url: String, set_is_self_accepting: bool) -> Self {
        let kind = ModuleKind::from_url(&url);
        Self {
            url,
            id: None,
            file: None,
            kind,
            meta: None,
            importers: FxHashSet::default(),
            imported_modules: FxHashSet::default(),
            static_imported_modules: FxHashSet::default(),
            accepted_hmr_deps: FxHashSet::default(),
            accepted_hmr_exports: None,
            imported_bindings: None,
            is_self_accepting: set_is_self_accepting.then_some(false),
            transform_result: None,
            last_hmr_timestamp: Timestamp::ZERO,
            last_invalidation_timestamp: Timestamp::ZERO,
            evaluation: None,
        }
    }

    #[inline]
    pub fn self_accepting(&self) -> bool {
        self.is_self_accepting == Some(true)
    }

    #[inline]
    pub fn has_evaluation(&self) -> bool {
        self.evaluation.is_some()
    }

    /// Key used to identify this module across environments.
    pub fn identity_key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.url)
    }
}
