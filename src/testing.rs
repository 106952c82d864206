//! In-memory collaborators shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rustc_hash::FxHashSet;
use tokio::sync::Notify;

use crate::core::EnvironmentKind;
use crate::graph::{EnvironmentGraph, ModuleId, ModuleInfo};
use crate::plugin::{Pipeline, PipelineOutput, ResolvedId, Resolver};

/// Resolver with per-url overrides; unknown urls resolve to `/root<url>`.
#[derive(Default)]
pub struct MapResolver {
    pub overrides: DashMap<String, String>,
    pub failing: DashMap<String, ()>,
    pub calls: AtomicUsize,
}

impl MapResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn map(&self, url: &str, id: &str) {
        self.overrides.insert(url.to_string(), id.to_string());
    }

    pub fn fail(&self, url: &str) {
        self.failing.insert(url.to_string(), ());
    }
}

#[async_trait]
impl Resolver for MapResolver {
    async fn resolve(&self, raw_url: &str) -> anyhow::Result<Option<ResolvedId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains_key(raw_url) {
            anyhow::bail!("cannot resolve {raw_url}");
        }
        let id = self
            .overrides
            .get(raw_url)
            .map(|id| id.clone())
            .unwrap_or_else(|| format!("/root{raw_url}"));
        Ok(Some(ResolvedId::new(id)))
    }
}

/// Pipeline serving fixed sources and outputs, counting runs per id.
#[derive(Default)]
pub struct FakePipeline {
    pub sources: DashMap<String, String>,
    pub outputs: DashMap<String, PipelineOutput>,
    pub failing: DashMap<String, ()>,
    pub runs: AtomicUsize,
    /// When set, every run waits for one permit before finishing.
    pub gate: Option<Arc<Notify>>,
    /// Signalled when a run has started.
    pub started: Arc<Notify>,
}

impl FakePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn module(&self, id: &str, source: &str, output: PipelineOutput) {
        self.sources.insert(id.to_string(), source.to_string());
        self.outputs.insert(id.to_string(), output);
    }

    pub fn fail(&self, id: &str) {
        self.failing.insert(id.to_string(), ());
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pipeline for FakePipeline {
    async fn load(&self, id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.sources.get(id).map(|s| s.clone()))
    }

    async fn run(&self, id: &str, _code: Option<String>) -> anyhow::Result<Option<PipelineOutput>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.failing.contains_key(id) {
            anyhow::bail!("syntax error in {id}");
        }
        Ok(self.outputs.get(id).map(|o| o.clone()))
    }
}

/// Graph over a [`MapResolver`].
pub fn graph(kind: EnvironmentKind) -> (Arc<EnvironmentGraph>, Arc<MapResolver>) {
    let resolver = MapResolver::new();
    let graph = Arc::new(EnvironmentGraph::new(kind, resolver.clone()));
    (graph, resolver)
}

/// Analyzed module importing `imports` and accepting `accepts`.
pub async fn module(
    graph: &EnvironmentGraph,
    url: &str,
    imports: &[&str],
    accepts: &[&str],
    self_accepting: bool,
) -> ModuleId {
    let id = graph.ensure_entry_from_url(url, false).await;
    let info = ModuleInfo {
        imported: imports.iter().map(|s| s.to_string()).collect(),
        accepted: accepts.iter().map(|s| s.to_string()).collect(),
        is_self_accepting: self_accepting,
        ..Default::default()
    };
    graph.update_module_info(id, &info).await;
    id
}

/// Assert `a ∈ b.imported_modules ⇔ b ∈ a.importers` for every node.
pub fn assert_edges_symmetric(graph: &EnvironmentGraph) {
    graph.read(|g| {
        for (id, node) in g.iter() {
            for dep in &node.imported_modules {
                assert!(g.get(*dep).importers.contains(&id), "{id} -> {dep} missing back-edge");
            }
            for importer in &node.importers {
                assert!(
                    g.get(*importer).imported_modules.contains(&id),
                    "{importer} <- {id} missing forward edge"
                );
            }
            let accepted: FxHashSet<_> = node.accepted_hmr_deps.iter().collect();
            assert!(accepted.iter().all(|d| node.imported_modules.contains(d)));
        }
    });
}
