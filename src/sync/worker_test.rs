use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use crate::doc::{Doc, canonicalize};
use crate::error::SyncError;
use crate::git;
use crate::jsondiff::DiffOptions;
use crate::options::SyncOptions;
use crate::remote::{LibgitEngine, encode_to_remote_name};
use crate::sync::context::{Identity, WorkerContext};
use crate::sync::push_worker::push_worker;
use crate::sync::sync_worker::sync_worker;
use crate::types::{ChangedFile, ConflictOperation, ConflictStrategyLabel, SyncResult};

fn identity() -> Identity {
    Identity {
        name: "tester".to_string(),
        email: "tester@example.com".to_string(),
    }
}

/// A working tree wired to a local bare remote through the real engine.
fn open_store(dir: &Path, remote_url: &str, include_commits: bool) -> Arc<WorkerContext> {
    git::open_or_init(dir, "tester", "tester@example.com").unwrap();
    let remote_name = encode_to_remote_name(remote_url).unwrap();
    let repo = git2::Repository::open(dir).unwrap();
    let mut config = repo.config().unwrap();
    config
        .set_str(&format!("remote.{remote_name}.url"), remote_url)
        .unwrap();
    config
        .set_str(
            &format!("remote.{remote_name}.fetch"),
            &format!("+refs/heads/*:refs/remotes/{remote_name}/*"),
        )
        .unwrap();
    Arc::new(WorkerContext {
        working_dir: dir.to_path_buf(),
        remote_name,
        options: SyncOptions {
            include_commits,
            ..SyncOptions::new(remote_url)
        },
        engine: Arc::new(LibgitEngine::new()),
        author: identity(),
        committer: identity(),
        schema: DiffOptions::default(),
    })
}

/// Write a document and commit it, the way the CRUD layer above does.
fn put(dir: &Path, id: &str, doc: serde_json::Value) {
    let repo = git2::Repository::open(dir).unwrap();
    let name = format!("{id}.json");
    std::fs::write(dir.join(&name), canonicalize(&doc)).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(&name)).unwrap();
    index.write().unwrap();
    let tree_oid = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let signature = git2::Signature::now("tester", "tester@example.com").unwrap();
    let parent = repo.head().unwrap().peel_to_commit().unwrap();
    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        &format!("put: {id}"),
        &tree,
        &[&parent],
    )
    .unwrap();
}

fn get(dir: &Path, id: &str) -> Option<serde_json::Value> {
    let content = std::fs::read_to_string(dir.join(format!("{id}.json"))).ok()?;
    serde_json::from_str(&content).ok()
}

struct Fixture {
    _keep: TempDir,
    remote_url: String,
}

impl Fixture {
    fn new() -> Self {
        let keep = TempDir::new().unwrap();
        let remote_dir = keep.path().join("remote.git");
        git2::Repository::init_bare(&remote_dir).unwrap();
        Fixture {
            remote_url: remote_dir.to_str().unwrap().to_string(),
            _keep: keep,
        }
    }

    fn store(&self, name: &str, include_commits: bool) -> Arc<WorkerContext> {
        let dir = self._keep.path().join(name);
        open_store(&dir, &self.remote_url, include_commits)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_first_push_reports_inserted_documents() {
    let fixture = Fixture::new();
    let store_a = fixture.store("a", true);
    put(&store_a.working_dir, "1", json!({"_id": "1", "name": "fromA"}));

    let result = push_worker(Arc::clone(&store_a), false).await.unwrap();
    match result {
        SyncResult::Push { changes, commits } => {
            assert_eq!(changes.remote.len(), 1);
            match &changes.remote[0] {
                ChangedFile::Insert { new } => assert_eq!(new.id, "1"),
                other => panic!("unexpected change: {other:?}"),
            }
            let commits = commits.expect("include_commits was set");
            assert_eq!(commits.remote.len(), 1);
            assert_eq!(commits.remote[0].message, "put: 1");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fresh_store_adopts_remote_by_fast_forward() {
    let fixture = Fixture::new();
    let store_a = fixture.store("a", false);
    put(&store_a.working_dir, "1", json!({"_id": "1", "name": "fromA"}));
    push_worker(Arc::clone(&store_a), false).await.unwrap();

    let store_b = fixture.store("b", false);
    let result = sync_worker(Arc::clone(&store_b)).await.unwrap();
    match &result {
        SyncResult::FastForwardMerge { changes, .. } => {
            assert_eq!(changes.local.len(), 1);
            match &changes.local[0] {
                ChangedFile::Insert { new } => assert_eq!(new.id, "1"),
                other => panic!("unexpected change: {other:?}"),
            }
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(
        get(&store_b.working_dir, "1"),
        Some(json!({"_id": "1", "name": "fromA"}))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fast_forward_is_idempotent() {
    let fixture = Fixture::new();
    let store_a = fixture.store("a", false);
    put(&store_a.working_dir, "1", json!({"_id": "1"}));
    push_worker(Arc::clone(&store_a), false).await.unwrap();

    let store_b = fixture.store("b", false);
    assert!(matches!(
        sync_worker(Arc::clone(&store_b)).await.unwrap(),
        SyncResult::FastForwardMerge { .. }
    ));
    assert_eq!(
        sync_worker(Arc::clone(&store_b)).await.unwrap(),
        SyncResult::Nop
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disjoint_inserts_merge_and_push() {
    let fixture = Fixture::new();
    let store_a = fixture.store("a", false);
    put(&store_a.working_dir, "1", json!({"_id": "1"}));
    push_worker(Arc::clone(&store_a), false).await.unwrap();

    let store_b = fixture.store("b", false);
    sync_worker(Arc::clone(&store_b)).await.unwrap();

    // Concurrent disjoint edits: A pushes 1b, B holds 2.
    put(&store_a.working_dir, "1b", json!({"_id": "1b"}));
    push_worker(Arc::clone(&store_a), false).await.unwrap();
    put(&store_b.working_dir, "2", json!({"_id": "2"}));

    let result = sync_worker(Arc::clone(&store_b)).await.unwrap();
    match result {
        SyncResult::MergeAndPush { changes, .. } => {
            assert_eq!(changes.local.len(), 1);
            assert_eq!(changes.local[0].name(), "1b.json");
            assert_eq!(changes.remote.len(), 1);
            assert_eq!(changes.remote[0].name(), "2.json");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    // Both documents present locally.
    assert!(get(&store_b.working_dir, "1b").is_some());
    assert!(get(&store_b.working_dir, "2").is_some());

    // A only needs to catch up.
    let result = sync_worker(Arc::clone(&store_a)).await.unwrap();
    assert!(matches!(result, SyncResult::FastForwardMerge { .. }));
    assert!(get(&store_a.working_dir, "2").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_same_id_conflict_resolves_with_ours_diff() {
    let fixture = Fixture::new();
    // Both stores share the bootstrap commit before they diverge.
    let store_a = fixture.store("a", false);
    push_worker(Arc::clone(&store_a), false).await.unwrap();
    let store_b = fixture.store("b", false);
    sync_worker(Arc::clone(&store_b)).await.unwrap();

    // A creates and pushes document 1; B creates the same id on its own.
    put(&store_a.working_dir, "1", json!({"_id": "1", "name": "fromA"}));
    push_worker(Arc::clone(&store_a), false).await.unwrap();
    put(&store_b.working_dir, "1", json!({"_id": "1", "name": "fromB"}));

    let result = sync_worker(Arc::clone(&store_b)).await.unwrap();
    match result {
        SyncResult::ResolveConflictsAndPush {
            conflicts,
            changes,
            ..
        } => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].fat_doc.id, "1");
            assert_eq!(conflicts[0].strategy, ConflictStrategyLabel::OursDiff);
            assert_eq!(conflicts[0].operation, ConflictOperation::InsertMerge);
            match &conflicts[0].fat_doc.doc {
                Doc::Json(doc) => assert_eq!(doc["name"], json!("fromB")),
                other => panic!("unexpected doc: {other:?}"),
            }

            // ours-diff kept our content: nothing changed locally, the
            // remote moves from A's blob to the merged blob.
            assert!(changes.local.is_empty());
            assert_eq!(changes.remote.len(), 1);
            match &changes.remote[0] {
                ChangedFile::Update { old, new } => {
                    assert_eq!(
                        old.doc,
                        Doc::Json(json!({"_id": "1", "name": "fromA"}))
                    );
                    assert_eq!(new.file_oid, conflicts[0].fat_doc.file_oid);
                }
                other => panic!("unexpected change: {other:?}"),
            }
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(
        get(&store_b.working_dir, "1"),
        Some(json!({"_id": "1", "name": "fromB"}))
    );

    // A fast-forwards onto the resolved merge.
    let result = sync_worker(Arc::clone(&store_a)).await.unwrap();
    assert!(matches!(result, SyncResult::FastForwardMerge { .. }));
    assert_eq!(
        get(&store_a.working_dir, "1"),
        Some(json!({"_id": "1", "name": "fromB"}))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_push_race_rejects_the_loser() {
    let fixture = Fixture::new();
    let store_a = fixture.store("a", false);
    let store_b = fixture.store("b", false);
    put(&store_a.working_dir, "1", json!({"_id": "1", "name": "fromA"}));
    put(&store_b.working_dir, "1", json!({"_id": "1", "name": "fromB"}));

    let first = push_worker(Arc::clone(&store_a), false).await;
    let second = push_worker(Arc::clone(&store_b), false).await;

    assert!(matches!(first, Ok(SyncResult::Push { .. })));
    match second {
        Err(SyncError::Remote(err)) => assert_eq!(err.name(), "UnfetchedCommitExists"),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_push_after_remote_deletion_syncs_the_delete() {
    let fixture = Fixture::new();
    let store_a = fixture.store("a", false);
    put(&store_a.working_dir, "1", json!({"_id": "1"}));
    put(&store_a.working_dir, "2", json!({"_id": "2"}));
    push_worker(Arc::clone(&store_a), false).await.unwrap();

    let store_b = fixture.store("b", false);
    sync_worker(Arc::clone(&store_b)).await.unwrap();

    // A deletes document 2 and pushes.
    {
        let repo = git2::Repository::open(&store_a.working_dir).unwrap();
        std::fs::remove_file(store_a.working_dir.join("2.json")).unwrap();
        let mut index = repo.index().unwrap();
        index.remove_path(Path::new("2.json")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let signature = git2::Signature::now("tester", "tester@example.com").unwrap();
        let parent = repo.head().unwrap().peel_to_commit().unwrap();
        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            "delete: 2",
            &tree,
            &[&parent],
        )
        .unwrap();
    }
    push_worker(Arc::clone(&store_a), false).await.unwrap();

    let result = sync_worker(Arc::clone(&store_b)).await.unwrap();
    match result {
        SyncResult::FastForwardMerge { changes, .. } => {
            assert_eq!(changes.local.len(), 1);
            assert!(matches!(changes.local[0], ChangedFile::Delete { .. }));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(get(&store_b.working_dir, "2").is_none());
    assert!(get(&store_b.working_dir, "1").is_some());
}
