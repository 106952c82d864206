//! Boundary search over importer edges.
//!
//! Starting at a changed module, walk up through importers until every path
//! ends at a module that can absorb the change (a boundary) or at a module
//! nobody imports (a dead end). One dead end forces a full reload.

use rustc_hash::FxHashSet;

use crate::core::{ModuleKind, Timestamp, is_css_request};
use crate::debug;
use crate::graph::{ModuleGraph, ModuleId};

/// A module that will re-import `accepted_via`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub boundary: ModuleId,
    pub accepted_via: ModuleId,
    pub is_within_circular_import: bool,
}

/// Result of propagating one changed module.
#[derive(Debug, Default)]
pub struct Propagation {
    pub boundaries: Vec<Boundary>,
    /// Some path reached a module with no accepting importer.
    pub dead_end: bool,
    /// Some path looped back into itself before reaching a boundary.
    pub unresolved_cycle: bool,
}

impl Propagation {
    /// Whether the change must be handled with a full reload.
    pub fn needs_full_reload(&self) -> bool {
        self.dead_end || (self.boundaries.is_empty() && self.unresolved_cycle)
    }
}

/// State shared by every module propagated within one change event.
pub struct Propagator<'g> {
    graph: &'g mut ModuleGraph,
    timestamp: Timestamp,
    traversed: FxHashSet<ModuleId>,
    invalidated: FxHashSet<ModuleId>,
}

impl<'g> Propagator<'g> {
    pub fn new(graph: &'g mut ModuleGraph, timestamp: Timestamp) -> Self {
        Self {
            graph,
            timestamp,
            traversed: FxHashSet::default(),
            invalidated: FxHashSet::default(),
        }
    }

    /// Propagate a change of `node`, then stamp it as hot-invalidated.
    pub fn propagate(&mut self, node: ModuleId) -> Propagation {
        let mut out = Walk::default();
        let mut chain = vec![node];
        let dead_end = self.walk(node, &mut chain, &mut out);
        self.invalidate(&[node]);
        Propagation {
            boundaries: out.boundaries,
            dead_end,
            unresolved_cycle: out.unresolved_cycle,
        }
    }

    /// Visit `node`, the last element of `chain`. Returns `true` on a dead end.
    fn walk(&mut self, node: ModuleId, chain: &mut Vec<ModuleId>, out: &mut Walk) -> bool {
        if !self.traversed.insert(node) {
            return false;
        }

        let n = self.graph.get(node);
        if n.id.is_some() && n.is_self_accepting.is_none() {
            // Never analyzed, so never loaded by a client either.
            debug!("hmr"; "stop propagation at unanalyzed {}", n.url);
            return false;
        }

        if n.self_accepting() {
            let circular = self.within_circular_import(node, chain);
            out.push(node, node, circular);
            self.invalidate(chain);
            // A stylesheet may list arbitrary files as dependencies.
            for importer in self.sorted_importers(node) {
                if is_css_request(&self.graph.get(importer).url) && !chain.contains(&importer) {
                    chain.push(importer);
                    self.walk(importer, chain, out);
                    chain.pop();
                }
            }
            return false;
        }

        let partially_accepted = n.accepted_hmr_exports.is_some();
        if partially_accepted {
            let circular = self.within_circular_import(node, chain);
            out.push(node, node, circular);
            self.invalidate(chain);
        } else {
            if n.importers.is_empty() {
                return true;
            }
            if n.kind != ModuleKind::Style
                && n.importers
                    .iter()
                    .all(|i| is_css_request(&self.graph.get(*i).url))
            {
                return true;
            }
        }

        for importer in self.sorted_importers(node) {
            if self.graph.get(importer).accepted_hmr_deps.contains(&node) {
                chain.push(importer);
                let circular = self.within_circular_import(importer, chain);
                chain.pop();
                out.push(importer, node, circular);
                self.invalidate(chain);
                continue;
            }

            if chain.contains(&importer) {
                debug!("hmr"; "circular import via {}", self.graph.get(importer).url);
                out.unresolved_cycle = true;
                continue;
            }

            if self.imports_only_accepted_exports(importer, node) {
                continue;
            }

            chain.push(importer);
            let dead_end = self.walk(importer, chain, out);
            chain.pop();
            if dead_end {
                return true;
            }
        }
        false
    }

    /// Whether `importer` only uses exports that `node` accepts.
    fn imports_only_accepted_exports(&self, importer: ModuleId, node: ModuleId) -> bool {
        let n = self.graph.get(node);
        let (Some(_), Some(accepted)) = (&n.id, &n.accepted_hmr_exports) else {
            return false;
        };
        self.graph
            .get(importer)
            .imported_bindings
            .as_ref()
            .and_then(|bindings| bindings.get(&node))
            .is_some_and(|names| names.iter().all(|name| accepted.contains(name)))
    }

    /// Whether some importer path from `node` leads back into `chain`.
    fn within_circular_import(&self, node: ModuleId, chain: &[ModuleId]) -> bool {
        let mut traversed = FxHashSet::default();
        let mut path = vec![node];
        self.circular_from(node, chain, &mut path, &mut traversed)
    }

    fn circular_from(
        &self,
        node: ModuleId,
        chain: &[ModuleId],
        path: &mut Vec<ModuleId>,
        traversed: &mut FxHashSet<ModuleId>,
    ) -> bool {
        if !traversed.insert(node) {
            return false;
        }
        for importer in self.sorted_importers(node) {
            // A module importing itself is harmless.
            if importer == node {
                continue;
            }
            if chain.contains(&importer) {
                return true;
            }
            if !path.contains(&importer) {
                path.push(importer);
                let found = self.circular_from(importer, chain, path, traversed);
                path.pop();
                if found {
                    return true;
                }
            }
        }
        false
    }

    fn sorted_importers(&self, node: ModuleId) -> Vec<ModuleId> {
        let mut importers: Vec<_> = self.graph.get(node).importers.iter().copied().collect();
        importers.sort_unstable();
        importers
    }

    fn invalidate(&mut self, ids: &[ModuleId]) {
        for id in ids {
            self.graph
                .invalidate(*id, &mut self.invalidated, self.timestamp, true);
        }
    }
}

/// Boundaries collected during one walk, deduplicated by
/// `(boundary, accepted_via)`.
#[derive(Default)]
struct Walk {
    boundaries: Vec<Boundary>,
    seen: FxHashSet<(ModuleId, ModuleId)>,
    unresolved_cycle: bool,
}

impl Walk {
    fn push(&mut self, boundary: ModuleId, accepted_via: ModuleId, circular: bool) {
        if self.seen.insert((boundary, accepted_via)) {
            self.boundaries.push(Boundary {
                boundary,
                accepted_via,
                is_within_circular_import: circular,
            });
        }
    }
}
