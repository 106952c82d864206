//! Merged read-through view over the browser and server graphs.
//!
//! Neither graph is changed by the overlay. A merged node pairs the entries
//! of both environments that share a resolved id (or url, for id-less
//! nodes), and the pair is identified by that key.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::environment::EnvironmentGraph;
use super::node::{ModuleId, ModuleNode};
use crate::core::Timestamp;

/// One logical module, present in either or both environments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MixedNode {
    pub key: String,
    pub client: Option<ModuleId>,
    pub ssr: Option<ModuleId>,
}

/// Snapshot of the fields both environments agree on.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedInfo {
    pub url: String,
    pub id: Option<String>,
    pub file: Option<PathBuf>,
    pub is_self_accepting: Option<bool>,
    pub last_hmr_timestamp: Timestamp,
    pub last_invalidation_timestamp: Timestamp,
}

pub struct MixedModuleGraph {
    client: Arc<EnvironmentGraph>,
    ssr: Arc<EnvironmentGraph>,
}

impl MixedModuleGraph {
    pub fn new(client: Arc<EnvironmentGraph>, ssr: Arc<EnvironmentGraph>) -> Self {
        Self { client, ssr }
    }

    pub fn client(&self) -> &Arc<EnvironmentGraph> {
        &self.client
    }

    pub fn ssr(&self) -> &Arc<EnvironmentGraph> {
        &self.ssr
    }

    /// Pair a node of one environment with its twin in the other.
    fn pair(&self, key: String) -> MixedNode {
        let lookup = |graph: &EnvironmentGraph| {
            graph.read(|g| g.module_by_id(&key).or_else(|| g.module_by_url(&key)))
        };
        MixedNode {
            client: lookup(&self.client),
            ssr: lookup(&self.ssr),
            key,
        }
    }

    fn key_of(graph: &EnvironmentGraph, id: ModuleId) -> Option<String> {
        graph.read(|g| g.node(id).map(|n| n.identity_key().to_string()))
    }

    pub fn get_module_by_id(&self, id: &str) -> Option<MixedNode> {
        let node = self.pair(id.to_string());
        (node.client.is_some() || node.ssr.is_some()).then_some(node)
    }

    pub async fn get_module_by_url(&self, raw_url: &str) -> Option<MixedNode> {
        if let Some(id) = self.client.get_module_by_url(raw_url).await {
            return Self::key_of(&self.client, id).map(|key| self.pair(key));
        }
        let id = self.ssr.get_module_by_url(raw_url).await?;
        Self::key_of(&self.ssr, id).map(|key| self.pair(key))
    }

    /// Nodes for `file` from both environments, one entry per key.
    pub fn get_modules_by_file(&self, file: &Path) -> Vec<MixedNode> {
        let keys = self
            .client
            .read(|g| keys_of(g.modules_by_file(file), |id| g.node(id)))
            .into_iter()
            .chain(self.ssr.read(|g| keys_of(g.modules_by_file(file), |id| g.node(id))));
        self.dedup(keys)
    }

    /// Union of importers in both environments.
    pub fn importers(&self, node: &MixedNode) -> Vec<MixedNode> {
        let client_keys = node
            .client
            .map(|id| self.client.read(|g| importer_keys(g.node(id), |i| g.node(i))))
            .unwrap_or_default();
        let ssr_keys = node
            .ssr
            .map(|id| self.ssr.read(|g| importer_keys(g.node(id), |i| g.node(i))))
            .unwrap_or_default();
        self.dedup(client_keys.into_iter().chain(ssr_keys))
    }

    /// Merged field view; the browser entry wins where both exist, while
    /// timestamps take the later of the two.
    pub fn info(&self, node: &MixedNode) -> Option<MixedInfo> {
        let client = node
            .client
            .and_then(|id| self.client.read(|g| g.node(id).map(snapshot)));
        let ssr = node
            .ssr
            .and_then(|id| self.ssr.read(|g| g.node(id).map(snapshot)));
        match (client, ssr) {
            (Some(c), Some(s)) => Some(MixedInfo {
                last_hmr_timestamp: c.last_hmr_timestamp.max(s.last_hmr_timestamp),
                last_invalidation_timestamp: c
                    .last_invalidation_timestamp
                    .max(s.last_invalidation_timestamp),
                ..c
            }),
            (c, s) => c.or(s),
        }
    }

    pub fn invalidate_module(&self, node: &MixedNode, timestamp: Timestamp, is_hmr: bool) {
        if let Some(id) = node.client {
            self.client.invalidate_module(id, timestamp, is_hmr);
        }
        if let Some(id) = node.ssr {
            self.ssr.invalidate_module(id, timestamp, is_hmr);
        }
    }

    pub fn invalidate_all(&self, timestamp: Timestamp) {
        self.client.invalidate_all(timestamp);
        self.ssr.invalidate_all(timestamp);
    }

    pub fn on_file_change(&self, file: &Path, timestamp: Timestamp) {
        self.client.on_file_change(file, timestamp);
        self.ssr.on_file_change(file, timestamp);
    }

    fn dedup(&self, keys: impl Iterator<Item = String>) -> Vec<MixedNode> {
        let mut seen = FxHashSet::default();
        keys.filter(|key| seen.insert(key.clone()))
            .map(|key| self.pair(key))
            .collect()
    }
}

fn keys_of<'a>(
    ids: Vec<ModuleId>,
    node: impl Fn(ModuleId) -> Option<&'a ModuleNode>,
) -> Vec<String> {
    ids.into_iter()
        .filter_map(|id| node(id).map(|n| n.identity_key().to_string()))
        .collect()
}

fn importer_keys<'a>(
    node: Option<&'a ModuleNode>,
    lookup: impl Fn(ModuleId) -> Option<&'a ModuleNode>,
) -> Vec<String> {
    let Some(node) = node else {
        return Vec::new();
    };
    let mut importers: Vec<_> = node.importers.iter().copied().collect();
    importers.sort_unstable();
    keys_of(importers, lookup)
}

fn snapshot(node: &ModuleNode) -> MixedInfo {
    MixedInfo {
        url: node.url.clone(),
        id: node.id.clone(),
        file: node.file.clone(),
        is_self_accepting: node.is_self_accepting,
        last_hmr_timestamp: node.last_hmr_timestamp,
        last_invalidation_timestamp: node.last_invalidation_timestamp,
    }
}
