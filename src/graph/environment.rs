//! Async wrapper binding a [`ModuleGraph`] to its resolver.
//!
//! The lock is only taken inside synchronous closures, never across an
//! `.await`, so every graph mutation is applied in one uninterrupted step.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use super::node::{ModuleId, ModuleInfo};
use super::store::{LinkedInfo, ModuleGraph, ResolvedUrl};
use crate::core::{EnvironmentKind, Timestamp, clean_url, extname, strip_volatile_query};
use crate::debug;
use crate::plugin::Resolver;

/// Module graph of one environment plus the resolver that feeds it.
pub struct EnvironmentGraph {
    kind: EnvironmentKind,
    resolver: Arc<dyn Resolver>,
    state: RwLock<ModuleGraph>,
}

impl EnvironmentGraph {
    pub fn new(kind: EnvironmentKind, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            kind,
            resolver,
            state: RwLock::new(ModuleGraph::new(kind)),
        }
    }

    #[inline]
    pub fn kind(&self) -> EnvironmentKind {
        self.kind
    }

    /// Access the graph with a read lock.
    ///
    /// Use this when you need multiple queries in a loop to avoid
    /// repeated lock acquisition.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ModuleGraph) -> R,
    {
        f(&self.state.read())
    }

    /// Mutate the graph with a write lock.
    pub fn write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ModuleGraph) -> R,
    {
        f(&mut self.state.write())
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Canonicalize a request url.
    ///
    /// Volatile query parameters are dropped first. Resolver failures fall
    /// back to the url itself. When the resolved id carries an extension the
    /// url lacks, the extension is appended so both spellings share a node.
    pub async fn resolve_url(&self, raw_url: &str) -> ResolvedUrl {
        let url = strip_volatile_query(raw_url);

        let known = self.read(|g| {
            g.module_by_unresolved_url(&url)
                .map(|id| g.get(id))
                .and_then(|node| {
                    node.id.clone().map(|id| ResolvedUrl {
                        url: node.url.clone(),
                        id,
                        meta: node.meta.clone(),
                    })
                })
        });
        if let Some(resolved) = known {
            return resolved;
        }

        let resolved = match self.resolver.resolve(&url).await {
            Ok(resolved) => resolved,
            Err(err) => {
                debug!("graph"; "resolve failed for {}: {:#}", url, err);
                None
            }
        };
        let (id, meta) = match resolved {
            Some(resolved) => (resolved.id, resolved.meta),
            None => (url.clone(), None),
        };

        let url = reconcile_extension(url, &id);
        ResolvedUrl { url, id, meta }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_module_by_url(&self, raw_url: &str) -> Option<ModuleId> {
        let resolved = self.resolve_url(raw_url).await;
        self.read(|g| g.module_by_url(&resolved.url))
    }

    pub fn get_module_by_id(&self, id: &str) -> Option<ModuleId> {
        self.read(|g| g.module_by_id(id))
    }

    pub fn get_modules_by_file(&self, file: &Path) -> Vec<ModuleId> {
        self.read(|g| g.modules_by_file(file))
    }

    pub fn get_module_by_etag(&self, etag: &str) -> Option<ModuleId> {
        self.read(|g| g.module_by_etag(etag))
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    pub async fn ensure_entry_from_url(&self, raw_url: &str, set_is_self_accepting: bool) -> ModuleId {
        let stripped = strip_volatile_query(raw_url);
        if let Some(id) = self.read(|g| g.module_by_unresolved_url(&stripped)) {
            return id;
        }
        let resolved = self.resolve_url(&stripped).await;
        self.write(|g| {
            let id = g.ensure_entry(&resolved, set_is_self_accepting);
            g.record_unresolved_url(&stripped, id);
            id
        })
    }

    pub fn create_file_only_entry(&self, file: &Path) -> ModuleId {
        self.write(|g| g.create_file_only_entry(file))
    }

    /// Resolve every specifier in `info`, then update the node's edges.
    ///
    /// Returns the modules that lost their last importer.
    pub async fn update_module_info(&self, id: ModuleId, info: &ModuleInfo) -> Vec<ModuleId> {
        let mut linked: FxHashMap<String, ModuleId> = FxHashMap::default();
        for specifier in info.imported.iter().chain(&info.accepted) {
            if linked.contains_key(specifier) {
                continue;
            }
            let dep = self.ensure_entry_from_url(specifier, false).await;
            linked.insert(specifier.clone(), dep);
        }

        let pick = |specifiers: &[String]| -> Vec<ModuleId> {
            specifiers
                .iter()
                .filter_map(|s| linked.get(s).copied())
                .collect()
        };

        let imported_bindings = (!info.imported_bindings.is_empty()).then(|| {
            info.imported_bindings
                .iter()
                .filter_map(|(specifier, names)| {
                    let dep = linked.get(specifier)?;
                    Some((*dep, names.iter().cloned().collect::<FxHashSet<_>>()))
                })
                .collect()
        });

        let linked_info = LinkedInfo {
            imported: pick(&info.imported),
            static_imported: pick(&info.static_imported),
            accepted: pick(&info.accepted),
            accepted_exports: info
                .accepted_exports
                .as_ref()
                .map(|names| names.iter().cloned().collect()),
            imported_bindings,
            is_self_accepting: info.is_self_accepting,
        };

        self.write(|g| g.update_module_info(id, linked_info))
    }

    pub fn invalidate_module(&self, id: ModuleId, timestamp: Timestamp, is_hmr: bool) {
        let mut seen = FxHashSet::default();
        self.write(|g| g.invalidate(id, &mut seen, timestamp, is_hmr));
    }

    pub fn invalidate_all(&self, timestamp: Timestamp) {
        self.write(|g| g.invalidate_all(timestamp));
    }

    pub fn on_file_change(&self, file: &Path, timestamp: Timestamp) -> Vec<ModuleId> {
        self.write(|g| g.on_file_change(file, timestamp))
    }

    pub fn on_file_delete(&self, file: &Path, timestamp: Timestamp) -> Vec<ModuleId> {
        self.write(|g| g.on_file_delete(file, timestamp))
    }
}

impl std::fmt::Debug for EnvironmentGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentGraph")
            .field("kind", &self.kind)
            .field("modules", &self.read(|g| g.len()))
            .finish()
    }
}

/// Append the resolved id's extension to `url` when the url omits it.
fn reconcile_extension(url: String, resolved_id: &str) -> String {
    if url == resolved_id || url.contains('\0') || url.starts_with("virtual:") {
        return url;
    }
    let Some(ext) = extname(resolved_id) else {
        return url;
    };
    let pathname = clean_url(&url);
    if pathname.ends_with(ext) {
        return url;
    }
    let rest = &url[pathname.len()..];
    format!("{pathname}{ext}{rest}")
}
