use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::core::{Clock, EnvironmentKind};
use crate::graph::{EnvironmentGraph, ModuleInfo, TransformResult};
use crate::testing::{graph, module};

fn engine(graph: &Arc<EnvironmentGraph>) -> (HmrEngine, HmrReceiver) {
    let (tx, rx) = channel();
    let engine = HmrEngine::new("/root", Clock::new()).with_environment(graph.clone(), tx);
    (engine, rx)
}

fn modified(path: &str) -> FileChange {
    FileChange::new(path, ChangeKind::Modified)
}

fn updates(payload: HmrPayload) -> Vec<(String, String)> {
    match payload {
        HmrPayload::Update { updates } => updates
            .into_iter()
            .map(|u| (u.path, u.accepted_path))
            .collect(),
        other => panic!("expected update, got {other:?}"),
    }
}

async fn info(
    graph: &EnvironmentGraph,
    url: &str,
    info: ModuleInfo,
) -> crate::graph::ModuleId {
    let id = graph.ensure_entry_from_url(url, false).await;
    graph.update_module_info(id, &info).await;
    id
}

// ============================================================================
// Propagation scenarios
// ============================================================================

#[tokio::test]
async fn test_self_accepting_module_is_its_own_boundary() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/a.ts", &[], &[], true).await;
    let (engine, mut rx) = engine(&graph);

    let outcome = engine.handle_file_change(&modified("/root/src/a.ts")).await;
    assert_eq!(outcome, vec![HmrOutcome::Updated(vec!["/src/a.ts".into()])]);

    let payload = rx.try_recv().unwrap();
    assert_eq!(updates(payload), vec![("/src/a.ts".into(), "/src/a.ts".into())]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_module_without_importers_forces_full_reload() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/a.ts", &[], &[], false).await;
    let (engine, mut rx) = engine(&graph);

    let outcome = engine.handle_file_change(&modified("/root/src/a.ts")).await;
    assert_eq!(outcome, vec![HmrOutcome::FullReload]);
    assert_eq!(rx.try_recv().unwrap(), HmrPayload::full_reload("/root/src/a.ts"));
}

#[tokio::test]
async fn test_accepted_dependency_stops_at_importer() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    let a = module(&graph, "/src/a.ts", &["/src/b.ts"], &[], false).await;
    let b = module(&graph, "/src/b.ts", &["/src/c.ts"], &["/src/c.ts"], false).await;
    let c = module(&graph, "/src/c.ts", &[], &[], false).await;
    graph.write(|g| {
        g.update_module_transform_result(a, Arc::new(TransformResult::new("a".into(), None)))
    });
    let (engine, mut rx) = engine(&graph);

    engine.handle_file_change(&modified("/root/src/c.ts")).await;
    assert_eq!(
        updates(rx.try_recv().unwrap()),
        vec![("/src/b.ts".into(), "/src/c.ts".into())]
    );
    graph.read(|g| {
        assert!(g.get(a).transform_result.is_some());
        assert!(g.get(a).last_invalidation_timestamp.is_zero());
        assert!(g.get(b).last_hmr_timestamp.is_zero());
        assert!(!g.get(c).last_hmr_timestamp.is_zero());
    });
}

#[tokio::test]
async fn test_self_import_cycle_terminates_with_full_reload() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/a.ts", &["/src/a.ts"], &[], false).await;
    let (engine, mut rx) = engine(&graph);

    let outcome = engine.handle_file_change(&modified("/root/src/a.ts")).await;
    assert_eq!(outcome, vec![HmrOutcome::FullReload]);
    assert!(matches!(rx.try_recv().unwrap(), HmrPayload::FullReload { .. }));
}

#[tokio::test]
async fn test_second_event_waits_for_first() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/a.ts", &[], &[], true).await;
    let (engine, mut rx) = engine(&graph);
    let engine = Arc::new(engine);

    let guard = engine.lock_events().await;
    let pending = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.handle_file_change(&modified("/root/src/a.ts")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err());

    drop(guard);
    pending.await.unwrap();
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn test_concurrent_events_deliver_whole_payloads_in_order() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/a.ts", &[], &[], true).await;
    module(&graph, "/src/b.ts", &[], &[], true).await;
    let (engine, mut rx) = engine(&graph);

    let a = modified("/root/src/a.ts");
    let b = modified("/root/src/b.ts");
    tokio::join!(engine.handle_file_change(&a), engine.handle_file_change(&b));

    let mut stamps = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        let HmrPayload::Update { updates } = payload else {
            panic!("expected update");
        };
        assert_eq!(updates.len(), 1);
        stamps.push(updates[0].timestamp);
    }
    assert_eq!(stamps.len(), 2);
    assert!(stamps[0] < stamps[1]);
}

// ============================================================================
// Propagation rules
// ============================================================================

#[tokio::test]
async fn test_one_dead_end_forces_full_reload() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/accepting.ts", &["/src/c.ts"], &["/src/c.ts"], false).await;
    module(&graph, "/src/plain.ts", &["/src/c.ts"], &[], false).await;
    module(&graph, "/src/c.ts", &[], &[], false).await;
    let (engine, mut rx) = engine(&graph);

    let outcome = engine.handle_file_change(&modified("/root/src/c.ts")).await;
    assert_eq!(outcome, vec![HmrOutcome::FullReload]);
    assert!(matches!(rx.try_recv().unwrap(), HmrPayload::FullReload { .. }));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_stylesheet_update_type() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/a.css", &[], &[], true).await;
    let (engine, mut rx) = engine(&graph);

    engine.handle_file_change(&modified("/root/src/a.css")).await;
    let HmrPayload::Update { updates } = rx.try_recv().unwrap() else {
        panic!("expected update");
    };
    assert_eq!(updates[0].kind, UpdateType::Css);
}

#[tokio::test]
async fn test_stylesheet_importers_of_boundary_are_updated() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/main.css", &["/src/a.css"], &[], true).await;
    module(&graph, "/src/a.css", &[], &[], true).await;
    let (engine, mut rx) = engine(&graph);

    engine.handle_file_change(&modified("/root/src/a.css")).await;
    let mut paths: Vec<_> = updates(rx.try_recv().unwrap())
        .into_iter()
        .map(|(p, _)| p)
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["/src/a.css", "/src/main.css"]);
}

#[tokio::test]
async fn test_script_imported_only_by_stylesheets_is_dead_end() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/main.css", &["/tailwind.config.js"], &[], true).await;
    module(&graph, "/tailwind.config.js", &[], &[], false).await;
    let (engine, mut rx) = engine(&graph);

    let outcome = engine
        .handle_file_change(&modified("/root/tailwind.config.js"))
        .await;
    assert_eq!(outcome, vec![HmrOutcome::FullReload]);
    assert!(matches!(rx.try_recv().unwrap(), HmrPayload::FullReload { .. }));
}

#[tokio::test]
async fn test_partially_accepted_exports() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    info(
        &graph,
        "/src/a.ts",
        ModuleInfo {
            imported: vec!["/src/b.ts".into()],
            imported_bindings: vec![("/src/b.ts".into(), vec!["x".into()])],
            ..Default::default()
        },
    )
    .await;
    info(
        &graph,
        "/src/b.ts",
        ModuleInfo {
            accepted_exports: Some(vec!["x".into()]),
            ..Default::default()
        },
    )
    .await;
    let (engine, mut rx) = engine(&graph);

    engine.handle_file_change(&modified("/root/src/b.ts")).await;
    assert_eq!(
        updates(rx.try_recv().unwrap()),
        vec![("/src/b.ts".into(), "/src/b.ts".into())]
    );

    // Importing a non-accepted export walks on to a dead end.
    info(
        &graph,
        "/src/a.ts",
        ModuleInfo {
            imported: vec!["/src/b.ts".into()],
            imported_bindings: vec![("/src/b.ts".into(), vec!["x".into(), "y".into()])],
            ..Default::default()
        },
    )
    .await;
    let outcome = engine.handle_file_change(&modified("/root/src/b.ts")).await;
    assert_eq!(outcome, vec![HmrOutcome::FullReload]);
}

#[tokio::test]
async fn test_boundary_within_circular_import_is_flagged() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/a.ts", &["/src/b.ts"], &[], false).await;
    module(&graph, "/src/b.ts", &["/src/a.ts"], &[], true).await;
    let (engine, mut rx) = engine(&graph);

    engine.handle_file_change(&modified("/root/src/b.ts")).await;
    let HmrPayload::Update { updates } = rx.try_recv().unwrap() else {
        panic!("expected update");
    };
    assert_eq!(updates.len(), 1);
    assert!(updates[0].is_within_circular_import);
}

#[tokio::test]
async fn test_unanalyzed_module_stops_propagation() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    graph.ensure_entry_from_url("/src/lazy.ts", false).await;
    let (engine, mut rx) = engine(&graph);

    let outcome = engine.handle_file_change(&modified("/root/src/lazy.ts")).await;
    assert_eq!(outcome, vec![HmrOutcome::NoUpdate]);
    assert!(rx.try_recv().is_err());
}

// ============================================================================
// Files without modules, deletes, prune
// ============================================================================

#[tokio::test]
async fn test_unknown_file_is_ignored() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    let (engine, mut rx) = engine(&graph);
    let outcome = engine.handle_file_change(&modified("/root/src/nope.ts")).await;
    assert_eq!(outcome, vec![HmrOutcome::NoModules]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_html_change_reloads_page() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    let (engine, mut rx) = engine(&graph);
    engine.handle_file_change(&modified("/root/about/index.html")).await;
    assert_eq!(
        rx.try_recv().unwrap(),
        HmrPayload::reload_page("/about/index.html")
    );
}

#[tokio::test]
async fn test_deleted_file_propagates_to_accepting_importer() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/app.ts", &["/src/a.ts"], &["/src/a.ts"], false).await;
    let a = module(&graph, "/src/a.ts", &["/src/util.ts"], &[], false).await;
    let (engine, mut rx) = engine(&graph);

    engine
        .handle_file_change(&FileChange::new("/root/src/a.ts", ChangeKind::Removed))
        .await;
    assert_eq!(
        updates(rx.try_recv().unwrap()),
        vec![("/src/app.ts".into(), "/src/a.ts".into())]
    );
    graph.read(|g| assert!(g.get(a).imported_modules.is_empty()));
}

#[tokio::test]
async fn test_server_environment_gets_its_own_payloads() {
    let (client, _) = graph(EnvironmentKind::Browser);
    let (ssr, _) = graph(EnvironmentKind::Server);
    module(&client, "/src/a.ts", &[], &[], true).await;
    module(&ssr, "/src/a.ts", &[], &[], false).await;

    let (client_tx, mut client_rx) = channel();
    let (ssr_tx, mut ssr_rx) = channel();
    let engine = HmrEngine::new("/root", Clock::new())
        .with_environment(client, client_tx)
        .with_environment(ssr, ssr_tx);

    let outcome = engine.handle_file_change(&modified("/root/src/a.ts")).await;
    assert_eq!(
        outcome,
        vec![
            HmrOutcome::Updated(vec!["/src/a.ts".into()]),
            HmrOutcome::FullReload
        ]
    );
    assert!(matches!(client_rx.try_recv().unwrap(), HmrPayload::Update { .. }));
    assert!(matches!(ssr_rx.try_recv().unwrap(), HmrPayload::FullReload { .. }));
}

#[tokio::test]
async fn test_pruned_modules_are_announced() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    let a = module(&graph, "/src/a.ts", &["/src/old.ts"], &[], false).await;
    let pruned = graph.update_module_info(a, &ModuleInfo::default()).await;
    let (tx, mut rx) = channel();
    let clock = Clock::new();
    let now = clock.now();

    handle_pruned_modules(&graph, &pruned, now, &tx);
    assert_eq!(
        rx.try_recv().unwrap(),
        HmrPayload::Prune {
            paths: vec!["/src/old.ts".into()]
        }
    );
    graph.read(|g| assert_eq!(g.get(pruned[0]).last_hmr_timestamp, now));

    handle_pruned_modules(&graph, &[], now, &tx);
    assert!(rx.try_recv().is_err());
}

// ============================================================================
// Actor
// ============================================================================

#[tokio::test]
async fn test_actor_coalesces_and_flushes_on_close() {
    let (graph, _) = graph(EnvironmentKind::Browser);
    module(&graph, "/src/a.ts", &[], &[], true).await;
    let (engine, mut rx) = engine(&graph);

    let (feed_tx, feed_rx) = mpsc::channel(16);
    let actor = HmrActor::new(feed_rx, Arc::new(engine), Duration::from_secs(60));
    let handle = tokio::spawn(actor.run());

    feed_tx.send(modified("/root/src/a.ts")).await.unwrap();
    feed_tx.send(modified("/root/src/a.ts")).await.unwrap();
    feed_tx
        .send(FileChange::new("/root/src/tmp.ts", ChangeKind::Created))
        .await
        .unwrap();
    feed_tx
        .send(FileChange::new("/root/src/tmp.ts", ChangeKind::Removed))
        .await
        .unwrap();
    drop(feed_tx);
    handle.await.unwrap();

    assert!(matches!(rx.try_recv().unwrap(), HmrPayload::Update { .. }));
    assert!(rx.try_recv().is_err());
    assert!(graph.get_modules_by_file(Path::new("/root/src/tmp.ts")).is_empty());
}
