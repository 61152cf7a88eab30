use serde_json::json;
use tempfile::TempDir;

use crate::doc::{Doc, DocType, canonicalize};
use crate::error::SyncError;
use crate::git::{
    flatten_tree, get_changed_files, get_commit_logs, normalize_commit, open_or_init,
};
use crate::types::ChangedFile;

struct Fixture {
    _dir: TempDir,
    repo: git2::Repository,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = open_or_init(dir.path(), "tester", "tester@example.com").unwrap();
        Fixture { _dir: dir, repo }
    }

    fn commit(&self, files: &[(&str, &[u8])], removals: &[&str], message: &str) -> git2::Oid {
        let workdir = self.repo.workdir().unwrap();
        let mut index = self.repo.index().unwrap();
        for (name, content) in files {
            std::fs::write(workdir.join(name), content).unwrap();
            index.add_path(std::path::Path::new(name)).unwrap();
        }
        for name in removals {
            std::fs::remove_file(workdir.join(name)).unwrap();
            index.remove_path(std::path::Path::new(name)).unwrap();
        }
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let signature = git2::Signature::now("tester", "tester@example.com").unwrap();
        let parent = self.repo.head().unwrap().peel_to_commit().unwrap();
        self.repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])
            .unwrap()
    }

    fn tree_of(&self, oid: git2::Oid) -> git2::Tree<'_> {
        self.repo.find_commit(oid).unwrap().tree().unwrap()
    }
}

#[test]
fn test_changed_files_classifies_insert_update_delete() {
    let fixture = Fixture::new();
    let doc_a = canonicalize(&json!({"_id": "a", "v": 1}));
    let doc_b = canonicalize(&json!({"_id": "b", "v": 1}));
    let old = fixture.commit(
        &[("a.json", doc_a.as_bytes()), ("b.json", doc_b.as_bytes())],
        &[],
        "seed",
    );
    let doc_b2 = canonicalize(&json!({"_id": "b", "v": 2}));
    let doc_c = canonicalize(&json!({"_id": "c"}));
    let new = fixture.commit(
        &[("b.json", doc_b2.as_bytes()), ("c.json", doc_c.as_bytes())],
        &["a.json"],
        "change",
    );

    let changes = get_changed_files(
        &fixture.repo,
        Some(&fixture.tree_of(old)),
        &fixture.tree_of(new),
    )
    .unwrap();

    assert_eq!(changes.len(), 3);
    let mut by_name: Vec<(&str, &ChangedFile)> =
        changes.iter().map(|c| (c.name(), c)).collect();
    by_name.sort_by_key(|(name, _)| *name);

    assert!(matches!(by_name[0].1, ChangedFile::Delete { .. }));
    match by_name[1].1 {
        ChangedFile::Update { old, new } => {
            assert_eq!(old.doc, Doc::Json(json!({"_id": "b", "v": 1})));
            assert_eq!(new.doc, Doc::Json(json!({"_id": "b", "v": 2})));
        }
        other => panic!("unexpected change: {other:?}"),
    }
    match by_name[2].1 {
        ChangedFile::Insert { new } => {
            assert_eq!(new.id, "c");
            assert_eq!(new.doc_type, DocType::Json);
        }
        other => panic!("unexpected change: {other:?}"),
    }
}

#[test]
fn test_changed_files_against_empty_tree_lists_all_inserts() {
    let fixture = Fixture::new();
    let doc = canonicalize(&json!({"_id": "a"}));
    let head = fixture.commit(&[("a.json", doc.as_bytes())], &[], "seed");

    let changes = get_changed_files(&fixture.repo, None, &fixture.tree_of(head)).unwrap();
    assert_eq!(changes.len(), 1);
    assert!(matches!(changes[0], ChangedFile::Insert { .. }));
}

#[test]
fn test_invalid_json_document_surfaces() {
    let fixture = Fixture::new();
    let head = fixture.commit(&[("broken.json", b"{ not json")], &[], "seed");
    let err = get_changed_files(&fixture.repo, None, &fixture.tree_of(head)).unwrap_err();
    assert!(matches!(err, SyncError::InvalidJsonObject { .. }));
}

#[test]
fn test_commit_logs_hide_base_and_remote() {
    let fixture = Fixture::new();
    let base = fixture.commit(&[("a.json", b"{}")], &[], "put: a");
    let mid = fixture.commit(&[("b.json", b"{}")], &[], "put: b");
    let head = fixture.commit(&[("c.json", b"{}")], &[], "put: c");

    let logs = get_commit_logs(&fixture.repo, head, Some(base), None).unwrap();
    assert_eq!(
        logs.iter().map(|c| c.message.as_str()).collect::<Vec<_>>(),
        vec!["put: b", "put: c"]
    );

    let logs = get_commit_logs(&fixture.repo, head, Some(base), Some(mid)).unwrap();
    assert_eq!(
        logs.iter().map(|c| c.message.as_str()).collect::<Vec<_>>(),
        vec!["put: c"]
    );
}

#[test]
fn test_normalize_commit_carries_identities_and_parents() {
    let fixture = Fixture::new();
    let head = fixture.commit(&[("a.json", b"{}")], &[], "put: a");
    let commit = fixture.repo.find_commit(head).unwrap();
    let normalized = normalize_commit(&commit);

    assert_eq!(normalized.oid, head.to_string());
    assert_eq!(normalized.message, "put: a");
    assert_eq!(normalized.parent.len(), 1);
    assert_eq!(normalized.author.name, "tester");
    assert_eq!(normalized.committer.email, "tester@example.com");
    assert!(normalized.gpgsig.is_none());
}

#[test]
fn test_flatten_tree_recurses_into_collections() {
    let fixture = Fixture::new();
    std::fs::create_dir_all(fixture.repo.workdir().unwrap().join("notes")).unwrap();
    let head = fixture.commit(
        &[("root.json", b"{}"), ("notes/1.json", b"{}")],
        &[],
        "seed",
    );

    let entries = flatten_tree(&fixture.repo, &fixture.tree_of(head)).unwrap();
    let paths: Vec<&str> = entries.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["notes/1.json", "root.json"]);
}
