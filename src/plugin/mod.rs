//! Collaborator contracts.
//!
//! The graph and request cache never resolve, load or transform code
//! themselves. They call out through these traits, which the embedding
//! server implements on top of its plugin system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Source map attached to a transform result. Opaque to the core.
pub type SourceMap = serde_json::Value;

/// Canonical identity returned by a [`Resolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedId {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl ResolvedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            meta: None,
        }
    }
}

/// Output of one pipeline run for a module.
///
/// `imported_ids` and `accepted_ids` are specifiers as they appear in the
/// module; the graph resolves them before linking nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutput {
    pub code: String,
    pub map: Option<SourceMap>,
    pub imported_ids: Vec<String>,
    /// Subset of `imported_ids` reached through static imports.
    pub static_imported_ids: Vec<String>,
    pub accepted_ids: Vec<String>,
    /// Export names the module accepts updates for (`None` = not export-scoped).
    pub accepted_exports: Option<Vec<String>>,
    /// Binding names imported per dependency specifier.
    pub imported_bindings: Vec<(String, Vec<String>)>,
    pub is_self_accepting: bool,
    pub dynamic_import_ids: Vec<String>,
}

/// Turns a raw request url into a canonical module id.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// `Ok(None)` means "unresolvable"; callers fall back to the raw url.
    async fn resolve(&self, raw_url: &str) -> anyhow::Result<Option<ResolvedId>>;
}

/// Loads and transforms a module.
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Read the source for `id`. `Ok(None)` lets [`Pipeline::run`] load it.
    async fn load(&self, _id: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    /// Transform a module. `Ok(None)` means the module does not exist.
    async fn run(&self, id: &str, code: Option<String>) -> anyhow::Result<Option<PipelineOutput>>;
}

/// Resolver that maps every url onto itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

#[async_trait]
impl Resolver for IdentityResolver {
    async fn resolve(&self, raw_url: &str) -> anyhow::Result<Option<ResolvedId>> {
        Ok(Some(ResolvedId::new(raw_url)))
    }
}
