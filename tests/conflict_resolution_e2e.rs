mod common;

use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

use common::{edit_task, fake_spec, FakeFleet};
use concord::engine::{Orchestrator, WriteOutcome};
use concord::lifecycle::{AgentLifecycleManager, LifecycleConfig};
use concord::locks::{FileLockTable, LockConfig};
use concord::registry::AgentRegistry;
use concord::storage::{
    FileStore, HistoryStore, InMemoryFileStore, InMemoryHistoryStore, JsonlHistoryStore,
    LocalFileStore, Workspace,
};
use concord::types::{
    ConflictType, HistoryFilter, OverwriteSource, ResolutionRequest, ResolutionSpec,
    ResolutionStrategy,
};

struct Harness {
    fleet: FakeFleet,
    orchestrator: Orchestrator,
}

async fn harness(
    files: Arc<dyn FileStore>,
    history: Arc<dyn HistoryStore>,
    locks: LockConfig,
    agents: &[(&str, &[&str], serde_json::Value)],
) -> Harness {
    let fleet = FakeFleet::new();
    let lifecycle = Arc::new(AgentLifecycleManager::new(
        Arc::new(AgentRegistry::new()),
        fleet.factory(),
        LifecycleConfig::default(),
    ));
    for (id, caps, settings) in agents {
        lifecycle
            .create_agent(fake_spec(id, caps, settings.clone()))
            .await
            .unwrap();
    }

    let orchestrator = Orchestrator::new(
        lifecycle,
        Arc::new(Workspace::new(files)),
        history,
        Arc::new(FileLockTable::new(locks)),
    );
    Harness { fleet, orchestrator }
}

async fn in_memory(agents: &[(&str, &[&str], serde_json::Value)]) -> Harness {
    harness(
        Arc::new(InMemoryFileStore::with_files([("/src/foo.ts", "const x=0;")])),
        Arc::new(InMemoryHistoryStore::new()),
        LockConfig::default(),
        agents,
    )
    .await
}

#[tokio::test]
async fn test_overwrite_with_remote_version() {
    let h = in_memory(&[]).await;
    let orchestrator = &h.orchestrator;

    let first = orchestrator
        .propose_edit("agent-a", "/src/foo.ts", "const x=1;", Some(0))
        .await
        .unwrap();
    assert!(matches!(first, WriteOutcome::Written { .. }));

    // agent-b still thinks the file is at revision 0
    let conflict = match orchestrator
        .propose_edit("agent-b", "/src/foo.ts", "const x=2;", Some(0))
        .await
        .unwrap()
    {
        WriteOutcome::Conflicted { conflict } => conflict,
        other => panic!("expected a conflict, got {:?}", other),
    };
    assert_eq!(conflict.conflict_type, ConflictType::ConcurrentModification);
    assert_eq!(conflict.local.content, "const x=1;");
    assert_eq!(conflict.remote.content, "const x=2;");
    assert_eq!(orchestrator.active_conflicts().len(), 1);

    let entry = orchestrator
        .resolve(
            conflict.id,
            ResolutionRequest {
                strategy: "overwrite".to_string(),
                source: Some("remote".to_string()),
                resolved_by: Some("reviewer".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(entry.resolution.strategy, ResolutionStrategy::Overwrite);
    assert_eq!(entry.resolution.source, Some(OverwriteSource::Remote));
    assert_eq!(entry.resolution.resolved_by, "reviewer");
    assert_eq!(
        orchestrator.workspace().read("/src/foo.ts").await.unwrap().as_deref(),
        Some("const x=2;")
    );
    assert!(orchestrator.active_conflicts().is_empty());

    let history = orchestrator.history(&HistoryFilter::default()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].conflict.id, conflict.id);

    let again = orchestrator
        .resolve_with(conflict.id, ResolutionSpec::overwrite(OverwriteSource::Local))
        .await
        .unwrap_err();
    assert!(again.is_not_found());
    assert_eq!(orchestrator.history(&HistoryFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_resolves_have_one_winner() {
    let h = in_memory(&[]).await;
    let orchestrator = &h.orchestrator;

    orchestrator
        .propose_edit("agent-a", "/src/foo.ts", "const x=1;", Some(0))
        .await
        .unwrap();
    let conflict = match orchestrator
        .propose_edit("agent-b", "/src/foo.ts", "const x=2;", Some(0))
        .await
        .unwrap()
    {
        WriteOutcome::Conflicted { conflict } => conflict,
        other => panic!("expected a conflict, got {:?}", other),
    };

    let (first, second) = tokio::join!(
        orchestrator.resolve_with(conflict.id, ResolutionSpec::overwrite(OverwriteSource::Local)),
        orchestrator.resolve_with(conflict.id, ResolutionSpec::overwrite(OverwriteSource::Remote)),
    );
    assert_eq!([&first, &second].iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(orchestrator.history(&HistoryFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_out_of_band_edit_during_task_auto_merges() {
    let h = harness(
        Arc::new(InMemoryFileStore::with_files([("/doc.md", "a\nb\nc\n")])),
        Arc::new(InMemoryHistoryStore::new()),
        LockConfig::default(),
        &[("writer", &["docs"], json!({ "gated": true }))],
    )
    .await;
    let orchestrator = &h.orchestrator;

    let ticket = orchestrator
        .dispatch(edit_task("/doc.md", "A\nb\nc\n", &["docs"]))
        .await
        .unwrap();
    assert!(orchestrator.locks().holds("/doc.md", "writer"));

    // someone edits the last line while the task is running
    orchestrator
        .workspace()
        .write("/doc.md", "a\nb\nC\n", "human")
        .await
        .unwrap();
    h.fleet.get("writer").release();

    let report = ticket.wait().await.unwrap();
    assert!(report.written.is_empty());
    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.base.as_deref(), Some("a\nb\nc\n"));
    // the lock stays with the writer until the conflict is settled
    assert!(orchestrator.locks().holds("/doc.md", "writer"));

    let entry = orchestrator
        .resolve_with(conflict.id, ResolutionSpec::auto_merge())
        .await
        .unwrap();
    assert!(entry.resolution.unresolved_lines.is_empty());
    assert_eq!(
        orchestrator.workspace().read("/doc.md").await.unwrap().as_deref(),
        Some("A\nb\nC\n")
    );
    assert!(!orchestrator.locks().is_locked("/doc.md"));
    assert!(orchestrator.active_conflicts().is_empty());
}

#[tokio::test]
async fn test_lock_wait_timeout_is_recorded() {
    let h = harness(
        Arc::new(InMemoryFileStore::with_files([("/src/foo.ts", "const x=0;")])),
        Arc::new(InMemoryHistoryStore::new()),
        LockConfig {
            lock_wait_ms: 50,
            ..Default::default()
        },
        &[
            ("slowpoke", &["ts", "first"], json!({ "gated": true })),
            ("eager", &["ts", "second"], json!({})),
        ],
    )
    .await;
    let orchestrator = &h.orchestrator;

    let held = orchestrator
        .dispatch(edit_task("/src/foo.ts", "const x=1;", &["first"]))
        .await
        .unwrap();

    let err = orchestrator
        .dispatch(edit_task("/src/foo.ts", "const x=2;", &["second"]))
        .await
        .unwrap_err();
    assert!(err.is_lock_contention());

    let open = orchestrator.active_conflicts();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].conflict.conflict_type, ConflictType::LockTimeout);
    assert_eq!(open[0].conflict.local.agent_id, "slowpoke");
    assert_eq!(open[0].conflict.remote.agent_id, "eager");

    h.fleet.get("slowpoke").release();
    let report = held.wait().await.unwrap();
    assert_eq!(report.written, vec!["/src/foo.ts".to_string()]);
    assert!(!orchestrator.locks().is_locked("/src/foo.ts"));
}

#[tokio::test]
async fn test_history_survives_restart_with_jsonl() {
    let dir = TempDir::new().unwrap();
    let history_path = dir.path().join("history").join("conflicts.jsonl");
    let workspace_root = dir.path().join("workspace");
    std::fs::create_dir_all(workspace_root.join("src")).unwrap();
    std::fs::write(workspace_root.join("src/foo.ts"), "const x=0;").unwrap();

    let conflict_id = {
        let h = harness(
            Arc::new(LocalFileStore::new(workspace_root.clone())),
            Arc::new(JsonlHistoryStore::open(&history_path).await.unwrap()),
            LockConfig::default(),
            &[],
        )
        .await;
        let orchestrator = &h.orchestrator;

        orchestrator
            .propose_edit("agent-a", "/src/foo.ts", "const x=1;", Some(0))
            .await
            .unwrap();
        let conflict = match orchestrator
            .propose_edit("agent-b", "/src/foo.ts", "const x=2;", Some(0))
            .await
            .unwrap()
        {
            WriteOutcome::Conflicted { conflict } => conflict,
            other => panic!("expected a conflict, got {:?}", other),
        };
        orchestrator
            .resolve_with(
                conflict.id,
                ResolutionSpec::manual("const x=3;").by("reviewer"),
            )
            .await
            .unwrap();
        conflict.id
    };

    assert_eq!(
        std::fs::read_to_string(workspace_root.join("src/foo.ts")).unwrap(),
        "const x=3;"
    );

    let reopened = JsonlHistoryStore::open(&history_path).await.unwrap();
    let entries = reopened
        .list(&HistoryFilter {
            agent_ids: vec!["agent-b".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].conflict.id, conflict_id);
    assert_eq!(entries[0].resolution.strategy, ResolutionStrategy::Manual);
    assert_eq!(entries[0].resolution.resolved_by, "reviewer");
}
