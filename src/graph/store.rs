//! Arena-backed module graph for one environment.
//!
//! Nodes live in a `Vec` and reference each other by [`ModuleId`], so
//! importer back-edges and import cycles need no shared ownership.
//!
//! # Invariants
//! - `a ∈ b.imported_modules` ⇔ `b ∈ a.importers`
//! - `accepted_hmr_deps ⊆ imported_modules`
//! - each url maps to exactly one node; one id may be reached from many urls

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::node::{Evaluation, ModuleId, ModuleNode, TransformResult};
use crate::core::{EnvironmentKind, Timestamp, clean_url};

/// Url prefix for modules addressed by absolute file path.
pub const FS_PREFIX: &str = "/@fs/";

/// Outcome of url resolution: `(canonical url, resolved id, meta)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUrl {
    pub url: String,
    pub id: String,
    pub meta: Option<serde_json::Value>,
}

/// Import data with every specifier already mapped onto a node.
#[derive(Debug, Clone, Default)]
pub struct LinkedInfo {
    pub imported: Vec<ModuleId>,
    pub static_imported: Vec<ModuleId>,
    pub accepted: Vec<ModuleId>,
    pub accepted_exports: Option<FxHashSet<String>>,
    pub imported_bindings: Option<FxHashMap<ModuleId, FxHashSet<String>>>,
    pub is_self_accepting: bool,
}

/// Module graph of a single environment.
#[derive(Debug)]
pub struct ModuleGraph {
    environment: EnvironmentKind,
    nodes: Vec<ModuleNode>,
    url_to_module: FxHashMap<String, ModuleId>,
    id_to_module: FxHashMap<String, ModuleId>,
    file_to_modules: FxHashMap<PathBuf, FxHashSet<ModuleId>>,
    etag_to_module: FxHashMap<String, ModuleId>,
    /// Raw (pre-resolution) urls already known to map onto a node.
    unresolved_urls: FxHashMap<String, ModuleId>,
}

impl ModuleGraph {
    pub fn new(environment: EnvironmentKind) -> Self {
        Self {
            environment,
            nodes: Vec::new(),
            url_to_module: FxHashMap::default(),
            id_to_module: FxHashMap::default(),
            file_to_modules: FxHashMap::default(),
            etag_to_module: FxHashMap::default(),
            unresolved_urls: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn environment(&self) -> EnvironmentKind {
        self.environment
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    #[inline]
    pub fn node(&self, id: ModuleId) -> Option<&ModuleNode> {
        self.nodes.get(id.index())
    }

    /// Node access for ids handed out by this graph.
    ///
    /// Ids are never removed, so an id from this graph is always in range.
    #[inline]
    pub(crate) fn get(&self, id: ModuleId) -> &ModuleNode {
        &self.nodes[id.index()]
    }

    #[inline]
    fn get_mut(&mut self, id: ModuleId) -> &mut ModuleNode {
        &mut self.nodes[id.index()]
    }

    pub fn module_by_url(&self, url: &str) -> Option<ModuleId> {
        self.url_to_module.get(url).copied()
    }

    pub fn module_by_id(&self, id: &str) -> Option<ModuleId> {
        self.id_to_module.get(id).copied()
    }

    pub fn module_by_etag(&self, etag: &str) -> Option<ModuleId> {
        self.etag_to_module.get(etag).copied()
    }

    pub(crate) fn module_by_unresolved_url(&self, raw_url: &str) -> Option<ModuleId> {
        self.unresolved_urls.get(raw_url).copied()
    }

    /// All nodes backed by `file`, in creation order.
    pub fn modules_by_file(&self, file: &Path) -> Vec<ModuleId> {
        let mut ids: Vec<_> = self
            .file_to_modules
            .get(file)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &ModuleNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (ModuleId::from_index(i), node))
    }

    // =========================================================================
    // Entry creation
    // =========================================================================

    /// Get or create the node for a resolved url.
    ///
    /// Keyed by resolved id: a second url for an existing id is registered as
    /// an alias of the same node.
    pub fn ensure_entry(&mut self, resolved: &ResolvedUrl, set_is_self_accepting: bool) -> ModuleId {
        if let Some(existing) = self.id_to_module.get(&resolved.id).copied() {
            self.url_to_module
                .entry(resolved.url.clone())
                .or_insert(existing);
            return existing;
        }
        // A url already owned by another node keeps its owner.
        if let Some(existing) = self.url_to_module.get(&resolved.url).copied() {
            return existing;
        }

        let id = self.push(ModuleNode::new(resolved.url.clone(), set_is_self_accepting));
        let file = file_of(&resolved.id);
        {
            let node = self.get_mut(id);
            node.id = Some(resolved.id.clone());
            node.meta = resolved.meta.clone();
            node.file = file.clone();
        }
        self.url_to_module.insert(resolved.url.clone(), id);
        self.id_to_module.insert(resolved.id.clone(), id);
        if let Some(file) = file {
            self.file_to_modules.entry(file).or_default().insert(id);
        }
        id
    }

    /// Remember that `raw_url` resolves onto `id` to skip the resolver later.
    pub(crate) fn record_unresolved_url(&mut self, raw_url: &str, id: ModuleId) {
        if self.get(id).url != raw_url {
            self.unresolved_urls.insert(raw_url.to_string(), id);
        }
    }

    /// Register an extra url for an existing node.
    pub fn alias_url(&mut self, url: &str, id: ModuleId) {
        self.url_to_module.entry(url.to_string()).or_insert(id);
    }

    /// Node for a file that is a dependency but not itself a module
    /// (e.g. a file registered by a stylesheet preprocessor).
    pub fn create_file_only_entry(&mut self, file: &Path) -> ModuleId {
        let url = format!("{FS_PREFIX}{}", file.display().to_string().trim_start_matches('/'));
        if let Some(existing) = self.file_to_modules.get(file).and_then(|set| {
            set.iter()
                .copied()
                .filter(|m| self.get(*m).url == url)
                .min()
        }) {
            return existing;
        }

        let id = self.push(ModuleNode::new(url.clone(), false));
        self.get_mut(id).file = Some(file.to_path_buf());
        self.url_to_module.entry(url).or_insert(id);
        self.file_to_modules
            .entry(file.to_path_buf())
            .or_default()
            .insert(id);
        id
    }

    fn push(&mut self, node: ModuleNode) -> ModuleId {
        let id = ModuleId::from_index(self.nodes.len());
        self.nodes.push(node);
        id
    }

    // =========================================================================
    // Edges
    // =========================================================================

    /// Replace the import and acceptance data of a node.
    ///
    /// Edges are updated by difference so untouched edges keep their identity.
    /// Returns the previously imported nodes that lost their last importer.
    pub fn update_module_info(&mut self, id: ModuleId, info: LinkedInfo) -> Vec<ModuleId> {
        let mut next_imports: FxHashSet<ModuleId> = info.imported.iter().copied().collect();
        // Accepting a dependency implies importing it.
        next_imports.extend(info.accepted.iter().copied());

        let prev_imports = std::mem::take(&mut self.get_mut(id).imported_modules);

        for dep in next_imports.difference(&prev_imports) {
            self.get_mut(*dep).importers.insert(id);
        }

        let mut no_longer_imported = Vec::new();
        for dep in prev_imports.difference(&next_imports) {
            let dep_node = self.get_mut(*dep);
            dep_node.importers.remove(&id);
            if dep_node.importers.is_empty() {
                no_longer_imported.push(*dep);
            }
        }
        no_longer_imported.sort_unstable();

        let node = self.get_mut(id);
        node.imported_modules = next_imports;
        node.static_imported_modules = info.static_imported.into_iter().collect();
        node.accepted_hmr_deps = info.accepted.into_iter().collect();
        node.accepted_hmr_exports = info.accepted_exports;
        node.imported_bindings = info.imported_bindings;
        node.is_self_accepting = Some(info.is_self_accepting);

        no_longer_imported
    }

    /// Unlink every forward edge of a node (both sides).
    fn clear_imports(&mut self, id: ModuleId) {
        let prev = std::mem::take(&mut self.get_mut(id).imported_modules);
        for dep in prev {
            self.get_mut(dep).importers.remove(&id);
        }
        let node = self.get_mut(id);
        node.static_imported_modules.clear();
        node.accepted_hmr_deps.clear();
    }

    // =========================================================================
    // Transform results
    // =========================================================================

    pub fn update_module_transform_result(&mut self, id: ModuleId, result: Arc<TransformResult>) {
        if let Some(old) = self.get(id).transform_result.as_ref() {
            let old_etag = old.etag.clone();
            self.drop_etag(&old_etag, id);
        }
        self.etag_to_module.insert(result.etag.clone(), id);
        self.get_mut(id).transform_result = Some(result);
    }

    fn drop_etag(&mut self, etag: &str, id: ModuleId) {
        if self.etag_to_module.get(etag) == Some(&id) {
            self.etag_to_module.remove(etag);
        }
    }

    pub fn record_evaluation(&mut self, id: ModuleId, evaluation: Evaluation) {
        self.get_mut(id).evaluation = Some(evaluation);
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Clear cached state of a node and stamp it with `timestamp`.
    ///
    /// Server graphs cascade into importers that hold evaluation state,
    /// unless the importer accepts this node. `seen` guards against cycles.
    pub fn invalidate(
        &mut self,
        id: ModuleId,
        seen: &mut FxHashSet<ModuleId>,
        timestamp: Timestamp,
        is_hmr: bool,
    ) {
        if !seen.insert(id) {
            return;
        }

        if let Some(result) = self.get_mut(id).transform_result.take() {
            self.drop_etag(&result.etag, id);
        }

        let node = self.get_mut(id);
        node.evaluation = None;
        node.last_invalidation_timestamp = node.last_invalidation_timestamp.max(timestamp);
        if is_hmr {
            node.last_hmr_timestamp = node.last_hmr_timestamp.max(timestamp);
        }

        if !self.environment.is_server() {
            return;
        }

        let mut importers: Vec<_> = self.get(id).importers.iter().copied().collect();
        importers.sort_unstable();
        for importer in importers {
            let importer_node = self.get(importer);
            if importer_node.has_evaluation() && !importer_node.accepted_hmr_deps.contains(&id) {
                self.invalidate(importer, seen, timestamp, is_hmr);
            }
        }
    }

    pub fn invalidate_all(&mut self, timestamp: Timestamp) {
        let mut seen = FxHashSet::default();
        for index in 0..self.nodes.len() {
            self.invalidate(ModuleId::from_index(index), &mut seen, timestamp, false);
        }
    }

    /// Invalidate every node backed by `file`. Returns the affected nodes.
    pub fn on_file_change(&mut self, file: &Path, timestamp: Timestamp) -> Vec<ModuleId> {
        let ids = self.modules_by_file(file);
        let mut seen = FxHashSet::default();
        for id in &ids {
            self.invalidate(*id, &mut seen, timestamp, false);
        }
        ids
    }

    /// Invalidate every node backed by a deleted file and drop its imports.
    pub fn on_file_delete(&mut self, file: &Path, timestamp: Timestamp) -> Vec<ModuleId> {
        let ids = self.on_file_change(file, timestamp);
        for id in &ids {
            self.clear_imports(*id);
        }
        ids
    }

    /// Stamp pruned nodes so a later re-import fetches a fresh copy.
    pub fn mark_pruned(&mut self, ids: &[ModuleId], timestamp: Timestamp) {
        for id in ids {
            let node = self.get_mut(*id);
            node.last_hmr_timestamp = node.last_hmr_timestamp.max(timestamp);
        }
    }
}

/// File backing a resolved id, `None` for virtual modules.
fn file_of(resolved_id: &str) -> Option<PathBuf> {
    if resolved_id.starts_with('\0') || resolved_id.starts_with("virtual:") {
        return None;
    }
    Some(PathBuf::from(clean_url(resolved_id)))
}
