use tempfile::TempDir;

use crate::git::{
    DEFAULT_BRANCH, current_branch, fast_forward, first_commit_oid, head_commit, open,
    open_or_init, resolve_tracking, set_tracking_ref,
};

fn commit_file(repo: &git2::Repository, name: &str, content: &str, message: &str) -> git2::Oid {
    std::fs::write(repo.workdir().unwrap().join(name), content).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(std::path::Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let signature = git2::Signature::now("tester", "tester@example.com").unwrap();
    let parent = repo.head().unwrap().peel_to_commit().unwrap();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])
        .unwrap()
}

#[test]
fn test_open_missing_repository_fails() {
    let dir = TempDir::new().unwrap();
    assert!(open(dir.path()).is_err());
}

#[test]
fn test_open_or_init_bootstraps_main_with_first_commit() {
    let dir = TempDir::new().unwrap();
    let repo = open_or_init(dir.path(), "tester", "tester@example.com").unwrap();

    assert_eq!(current_branch(&repo).unwrap(), DEFAULT_BRANCH);
    let head = head_commit(&repo).unwrap().expect("bootstrap commit");
    assert_eq!(head.parent_count(), 0);
    assert_eq!(head.message(), Some("first commit"));
    assert!(head.tree().unwrap().is_empty());

    // Idempotent: a second open reuses the repository.
    let repo = open_or_init(dir.path(), "tester", "tester@example.com").unwrap();
    let again = head_commit(&repo).unwrap().unwrap();
    assert_eq!(again.id(), head.id());
}

#[test]
fn test_tracking_ref_round_trip() {
    let dir = TempDir::new().unwrap();
    let repo = open_or_init(dir.path(), "tester", "tester@example.com").unwrap();
    let head = head_commit(&repo).unwrap().unwrap().id();

    assert!(resolve_tracking(&repo, "origin_abc", "main").is_none());
    set_tracking_ref(&repo, "origin_abc", "main", head).unwrap();
    assert_eq!(resolve_tracking(&repo, "origin_abc", "main"), Some(head));
}

#[test]
fn test_first_commit_oid_walks_to_the_root() {
    let dir = TempDir::new().unwrap();
    let repo = open_or_init(dir.path(), "tester", "tester@example.com").unwrap();
    let root = head_commit(&repo).unwrap().unwrap().id();
    commit_file(&repo, "a.json", "{}", "put: a");
    let head = commit_file(&repo, "b.json", "{}", "put: b");

    assert_eq!(first_commit_oid(&repo, head).unwrap(), root);
}

#[test]
fn test_fast_forward_updates_ref_and_working_tree() {
    let dir = TempDir::new().unwrap();
    let repo = open_or_init(dir.path(), "tester", "tester@example.com").unwrap();
    let old_head = head_commit(&repo).unwrap().unwrap().id();
    let new_head = commit_file(&repo, "a.json", r#"{"_id":"a"}"#, "put: a");

    // Rewind the branch, then fast-forward back.
    repo.reference("refs/heads/main", old_head, true, "rewind")
        .unwrap();
    let mut checkout = git2::build::CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout)).unwrap();
    assert!(!dir.path().join("a.json").exists());

    fast_forward(&repo, "main", new_head).unwrap();
    assert_eq!(head_commit(&repo).unwrap().unwrap().id(), new_head);
    assert!(dir.path().join("a.json").exists());
}
