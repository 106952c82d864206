//! Deduplicated, staleness-guarded transform requests.

use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;

use super::pending::{PendingRegistry, SharedTransform, TransformOutcome};
use crate::cache::{CacheRecord, PersistentCache};
use crate::core::{
    Clock, Timestamp, clean_url, decode_url, remove_timestamp_query, strip_volatile_query,
};
use crate::error::TransformError;
use crate::graph::{EnvironmentGraph, ModuleGraph, ModuleId, ModuleInfo, ResolvedUrl, TransformResult};
use crate::hmr::{HmrPayload, HmrSender, handle_pruned_modules};
use crate::plugin::Pipeline;
use crate::{debug, log};

/// Request entry point of one environment.
///
/// Concurrent requests for the same url share one pipeline run. A result
/// whose computation started before the module's last invalidation is
/// returned to its callers but never stored on the node.
#[derive(Clone)]
pub struct TransformRequestCache {
    graph: Arc<EnvironmentGraph>,
    pipeline: Arc<dyn Pipeline>,
    persistent: Option<PersistentCache>,
    pending: Arc<PendingRegistry>,
    clock: Clock,
    hmr: Option<HmrSender>,
}

impl TransformRequestCache {
    pub fn new(graph: Arc<EnvironmentGraph>, pipeline: Arc<dyn Pipeline>, clock: Clock) -> Self {
        Self {
            graph,
            pipeline,
            persistent: None,
            pending: Arc::new(PendingRegistry::new()),
            clock,
            hmr: None,
        }
    }

    pub fn with_persistent_cache(mut self, cache: PersistentCache) -> Self {
        self.persistent = Some(cache);
        self
    }

    /// Channel for prune and error payloads.
    pub fn with_hmr_channel(mut self, channel: HmrSender) -> Self {
        self.hmr = Some(channel);
        self
    }

    pub fn graph(&self) -> &Arc<EnvironmentGraph> {
        &self.graph
    }

    /// Number of requests currently in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Transform the module behind `raw_url`.
    ///
    /// The url is percent-decoded first, so encoded and literal spellings of
    /// the same path share one pending request and one node.
    pub async fn transform_request(&self, raw_url: &str) -> TransformOutcome {
        let timestamp = self.clock.now();
        let url = remove_timestamp_query(&decode_url(raw_url));
        let key = self.cache_key(&url);

        let last_invalidation = if self.pending.contains(&key) {
            self.last_invalidation(&url).await
        } else {
            None
        };

        let seq = self.pending.next_seq();
        let joined = self.pending.join_or_start(&key, last_invalidation, seq, timestamp, || {
            self.start(url.clone(), key.clone(), seq, timestamp)
        });
        joined.into_shared().await
    }

    fn cache_key(&self, url: &str) -> String {
        if self.graph.kind().is_server() {
            format!("ssr:{url}")
        } else {
            url.to_string()
        }
    }

    async fn last_invalidation(&self, url: &str) -> Option<Timestamp> {
        let node = self.graph.get_module_by_url(url).await?;
        Some(self.graph.read(|g| g.get(node).last_invalidation_timestamp))
    }

    /// Spawn the work so it outlives any single caller.
    fn start(&self, url: String, key: String, seq: u64, timestamp: Timestamp) -> SharedTransform {
        let this = self.clone();
        let task_url = url.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = this.do_transform(&task_url, timestamp).await;
            this.pending.remove(&task_key, seq);
            result
        });

        let pending = Arc::clone(&self.pending);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    log!("error"; "transform task for {} failed: {}", url, e);
                    pending.remove(&key, seq);
                    Err(TransformError::Aborted { url })
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn do_transform(&self, url: &str, timestamp: Timestamp) -> TransformOutcome {
        let url = strip_volatile_query(url);
        let resolved = self.graph.resolve_url(&url).await;

        let existing = self
            .graph
            .read(|g| g.module_by_url(&resolved.url).or_else(|| g.module_by_id(&resolved.id)));
        if existing.is_some() {
            // Relate this url to the node even when it was reached by id.
            let (_, cached) = self.ensure_entry(&url, &resolved);
            if let Some(cached) = cached {
                debug!("transform"; "memory hit {}", url);
                return Ok(cached);
            }
        }

        self.load_and_transform(&url, &resolved, timestamp).await
    }

    async fn load_and_transform(
        &self,
        url: &str,
        resolved: &ResolvedUrl,
        timestamp: Timestamp,
    ) -> TransformOutcome {
        let id = resolved.id.as_str();
        let code = match self.pipeline.load(id).await {
            Ok(Some(code)) => Some(code),
            Ok(None) => read_source_file(id).await,
            Err(e) => return Err(self.pipeline_error(id, &e)),
        };

        // With a source in hand the module exists, so a change arriving while
        // the pipeline runs finds the node and invalidates it.
        let loaded = code.is_some().then(|| self.ensure_entry(url, resolved).0);

        let ssr = self.graph.kind().is_server();
        let persist_key = match (&self.persistent, &code) {
            (Some(cache), Some(code)) if !cache.is_excluded(url, code) => {
                Some(PersistentCache::key(id, code, ssr))
            }
            _ => None,
        };

        if let (Some(cache), Some(key)) = (&self.persistent, &persist_key)
            && let Some(hit) = cache.read(key).await
        {
            debug!("cache"; "hit {}", url);
            let node = loaded.unwrap_or_else(|| self.ensure_entry(url, resolved).0);
            let mut result = TransformResult::new(hit.code, hit.map);
            if let Some(info) = &hit.info {
                result.deps = info.imported.clone();
                let pruned = self.graph.update_module_info(node, info).await;
                self.prune(&pruned);
            }
            return Ok(self.commit(node, url, result, timestamp));
        }

        let output = match self.pipeline.run(id, code).await {
            Ok(Some(output)) => output,
            Ok(None) => return Err(self.load_failed(url, id)),
            Err(e) => return Err(self.pipeline_error(id, &e)),
        };

        let node = loaded.unwrap_or_else(|| self.ensure_entry(url, resolved).0);
        let pruned = self
            .graph
            .update_module_info(node, &ModuleInfo::from(&output))
            .await;
        self.prune(&pruned);

        if let (Some(cache), Some(key)) = (&self.persistent, &persist_key) {
            let (file, info) = self.graph.read(|g| {
                let file = g
                    .get(node)
                    .file
                    .as_ref()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (file, linked_info(g, node))
            });
            let record = CacheRecord {
                id,
                url: Some(url),
                file: &file,
                ssr,
                code: &output.code,
                map: output.map.as_ref(),
                info: Some(info),
            };
            cache.write(key, record).await;
        }

        Ok(self.commit(node, url, TransformResult::from_output(&output), timestamp))
    }

    /// Ensure a node for `resolved` and alias `url` onto it.
    fn ensure_entry(&self, url: &str, resolved: &ResolvedUrl) -> (ModuleId, Option<Arc<TransformResult>>) {
        self.graph.write(|g| {
            let node = g.ensure_entry(resolved, false);
            g.record_unresolved_url(url, node);
            (node, g.get(node).transform_result.clone())
        })
    }

    /// Store `result` unless the node was invalidated after the request began.
    fn commit(&self, node: ModuleId, url: &str, result: TransformResult, timestamp: Timestamp) -> Arc<TransformResult> {
        let result = Arc::new(result);
        let stored = self.graph.write(|g| {
            if timestamp > g.get(node).last_invalidation_timestamp {
                g.update_module_transform_result(node, Arc::clone(&result));
                true
            } else {
                false
            }
        });
        if !stored {
            debug!("transform"; "discard stale result for {}", url);
        }
        result
    }

    fn prune(&self, pruned: &[ModuleId]) {
        if pruned.is_empty() {
            return;
        }
        let timestamp = self.clock.now();
        match &self.hmr {
            Some(channel) => handle_pruned_modules(&self.graph, pruned, timestamp, channel),
            None => self.graph.write(|g| g.mark_pruned(pruned, timestamp)),
        }
    }

    fn load_failed(&self, url: &str, id: &str) -> TransformError {
        let importer = self.graph.read(|g| {
            let node = g.get(g.module_by_id(id)?);
            let first = node.importers.iter().min()?;
            let importer = g.get(*first);
            Some(
                importer
                    .file
                    .as_ref()
                    .map(|f| f.display().to_string())
                    .unwrap_or_else(|| importer.url.clone()),
            )
        });
        TransformError::LoadFailed {
            url: url.to_string(),
            id: id.to_string(),
            importer,
        }
    }

    fn pipeline_error(&self, id: &str, err: &anyhow::Error) -> TransformError {
        let message = format!("{err:#}");
        log!("error"; "{}: {}", id, message);
        if let Some(channel) = &self.hmr {
            let _ = channel.send(HmrPayload::error(message.clone()));
        }
        TransformError::Pipeline {
            id: id.to_string(),
            message,
        }
    }
}

impl std::fmt::Debug for TransformRequestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRequestCache")
            .field("environment", &self.graph.kind())
            .field("pending", &self.pending.len())
            .field("persistent", &self.persistent)
            .finish()
    }
}

/// Fallback load straight from disk for ids that are plain file paths.
async fn read_source_file(id: &str) -> Option<String> {
    if id.starts_with('\0') || id.starts_with("virtual:") {
        return None;
    }
    let path = Path::new(clean_url(id));
    if !path.is_absolute() {
        return None;
    }
    tokio::fs::read_to_string(path).await.ok()
}

/// Module edges expressed as urls, ready to persist.
fn linked_info(graph: &ModuleGraph, node: ModuleId) -> ModuleInfo {
    let n = graph.get(node);
    let urls = |ids: &rustc_hash::FxHashSet<ModuleId>| {
        let mut urls: Vec<String> = ids.iter().map(|id| graph.get(*id).url.clone()).collect();
        urls.sort_unstable();
        urls
    };
    let mut imported_bindings: Vec<(String, Vec<String>)> = n
        .imported_bindings
        .iter()
        .flatten()
        .map(|(dep, names)| {
            let mut names: Vec<String> = names.iter().cloned().collect();
            names.sort_unstable();
            (graph.get(*dep).url.clone(), names)
        })
        .collect();
    imported_bindings.sort_unstable();

    ModuleInfo {
        imported: urls(&n.imported_modules),
        static_imported: urls(&n.static_imported_modules),
        accepted: urls(&n.accepted_hmr_deps),
        accepted_exports: n.accepted_hmr_exports.as_ref().map(|names| {
            let mut names: Vec<String> = names.iter().cloned().collect();
            names.sort_unstable();
            names
        }),
        imported_bindings,
        is_self_accepting: n.self_accepting(),
    }
}
