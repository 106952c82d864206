//! File change handling.
//!
//! Each change event is handled under one event lock: invalidation,
//! propagation and payload delivery all finish before the next event starts,
//! so clients never observe two events interleaved.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::event::{ChangeKind, FileChange};
use super::message::{HmrPayload, HmrSender, Update, UpdateType};
use super::propagate::Propagator;
use crate::core::{Clock, EnvironmentKind, ModuleKind, Timestamp, is_html};
use crate::graph::{EnvironmentGraph, ModuleGraph, ModuleId};
use crate::{debug, log};

/// What one environment did with a change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HmrOutcome {
    /// The file backs no module of this environment.
    NoModules,
    /// Propagation found nothing to update.
    NoUpdate,
    /// Hot updates were sent for these boundary urls.
    Updated(Vec<String>),
    FullReload,
}

struct HmrEnvironment {
    graph: Arc<EnvironmentGraph>,
    channel: HmrSender,
}

/// Update propagation engine.
pub struct HmrEngine {
    root: PathBuf,
    clock: Clock,
    environments: Vec<HmrEnvironment>,
    events: Mutex<()>,
}

impl HmrEngine {
    pub fn new(root: impl Into<PathBuf>, clock: Clock) -> Self {
        Self {
            root: root.into(),
            clock,
            environments: Vec::new(),
            events: Mutex::new(()),
        }
    }

    /// Register an environment and the channel its payloads go to.
    pub fn with_environment(mut self, graph: Arc<EnvironmentGraph>, channel: HmrSender) -> Self {
        self.environments.push(HmrEnvironment { graph, channel });
        self
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Handle one file change in every registered environment.
    ///
    /// Returns one outcome per environment, in registration order.
    pub async fn handle_file_change(&self, change: &FileChange) -> Vec<HmrOutcome> {
        let _event = self.events.lock().await;
        let timestamp = self.clock.now();
        self.environments
            .iter()
            .map(|env| self.handle_in(env, change, timestamp))
            .collect()
    }

    fn handle_in(&self, env: &HmrEnvironment, change: &FileChange, timestamp: Timestamp) -> HmrOutcome {
        let file = change.path.as_path();
        let kind = env.graph.kind();

        let modules = match change.kind {
            ChangeKind::Removed => env.graph.on_file_delete(file, timestamp),
            ChangeKind::Created | ChangeKind::Modified => env.graph.on_file_change(file, timestamp),
        };

        if modules.is_empty() {
            if kind == EnvironmentKind::Browser && is_html(&file.to_string_lossy()) {
                let page = format!("/{}", self.relative(file));
                log!("hmr"; "page reload {}", self.relative(file));
                send(&env.channel, HmrPayload::reload_page(page));
                return HmrOutcome::FullReload;
            }
            debug!("hmr"; "[{}] no modules matched {}", kind.name(), self.relative(file));
            return HmrOutcome::NoModules;
        }

        let decision = env
            .graph
            .write(|g| decide(g, &modules, timestamp));

        match decision {
            Decision::FullReload => {
                log!("hmr"; "page reload {}", self.relative(file));
                send(
                    &env.channel,
                    HmrPayload::full_reload(self.root.join(file).display().to_string()),
                );
                HmrOutcome::FullReload
            }
            Decision::Update(updates) if updates.is_empty() => {
                debug!("hmr"; "[{}] no update happened for {}", kind.name(), self.relative(file));
                HmrOutcome::NoUpdate
            }
            Decision::Update(updates) => {
                let paths: Vec<_> = updates.iter().map(|u| u.path.clone()).collect();
                for path in &paths {
                    log!("hmr"; "{} update {}", kind.name(), path);
                }
                send(&env.channel, HmrPayload::Update { updates });
                HmrOutcome::Updated(paths)
            }
        }
    }

    #[cfg(test)]
    pub(super) async fn lock_events(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.events.lock().await
    }

    fn relative(&self, file: &Path) -> String {
        file.strip_prefix(&self.root)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

enum Decision {
    Update(Vec<Update>),
    FullReload,
}

/// Propagate every changed module with one shared traversal state.
fn decide(graph: &mut ModuleGraph, modules: &[ModuleId], timestamp: Timestamp) -> Decision {
    let mut propagator = Propagator::new(graph, timestamp);
    let mut boundaries = Vec::new();
    let mut full_reload = false;
    for module in modules {
        let propagation = propagator.propagate(*module);
        if propagation.needs_full_reload() {
            full_reload = true;
        }
        if !full_reload {
            boundaries.extend(propagation.boundaries);
        }
    }
    if full_reload {
        return Decision::FullReload;
    }

    let updates = boundaries
        .into_iter()
        .map(|b| {
            let boundary = graph.get(b.boundary);
            Update {
                kind: match boundary.kind {
                    ModuleKind::Style => UpdateType::Css,
                    ModuleKind::Script => UpdateType::Js,
                },
                timestamp,
                path: boundary.url.clone(),
                accepted_path: graph.get(b.accepted_via).url.clone(),
                is_within_circular_import: b.is_within_circular_import,
            }
        })
        .collect();
    Decision::Update(updates)
}

/// Announce modules that lost their last importer.
///
/// They are stamped with a fresh hot-update timestamp so a later re-import
/// fetches new code instead of a disposed instance.
pub fn handle_pruned_modules(
    graph: &EnvironmentGraph,
    pruned: &[ModuleId],
    timestamp: Timestamp,
    channel: &HmrSender,
) {
    if pruned.is_empty() {
        return;
    }
    let paths = graph.write(|g| {
        g.mark_pruned(pruned, timestamp);
        pruned
            .iter()
            .filter_map(|id| g.node(*id).map(|n| n.url.clone()))
            .collect::<Vec<_>>()
    });
    for path in &paths {
        debug!("hmr"; "[dispose] {}", path);
    }
    send(channel, HmrPayload::Prune { paths });
}

fn send(channel: &HmrSender, payload: HmrPayload) {
    if channel.send(payload).is_err() {
        debug!("hmr"; "payload dropped: channel closed");
    }
}
