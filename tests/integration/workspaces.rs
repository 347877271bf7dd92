//! Workspace isolation tests.
//!
//! A workspace clone must capture the source at the moment of the call,
//! stay pinned there regardless of what the source does afterwards, and
//! never fail the run just because object sharing is unavailable.

use crew::workspace::Workspace;
use crew::Error;

use super::fixtures::{git, prepare_run, TestRepo};

#[tokio::test]
async fn test_clone_matches_source_head() {
    let repo = TestRepo::new();
    let head = repo.create_and_commit("a.txt", "alpha\n", "add a");

    let dest = repo.temp_dir.path().join("clone-a");
    let ws = Workspace::clone_referenced(&repo.path, &repo.path, &dest)
        .await
        .unwrap();

    assert_eq!(ws.head().await.unwrap(), head);
    assert_eq!(
        std::fs::read_to_string(dest.join("a.txt")).unwrap(),
        "alpha\n"
    );
}

#[tokio::test]
async fn test_clone_replaces_existing_destination() {
    let repo = TestRepo::new();
    let dest = repo.temp_dir.path().join("clone-b");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("stale.txt"), "stale").unwrap();

    Workspace::clone_referenced(&repo.path, &repo.path, &dest)
        .await
        .unwrap();

    assert!(!dest.join("stale.txt").exists());
    assert!(dest.join("README.md").exists());
}

#[tokio::test]
async fn test_clone_of_missing_source_is_fatal() {
    let repo = TestRepo::new();
    let missing = repo.temp_dir.path().join("does-not-exist");
    let dest = repo.temp_dir.path().join("clone-c");

    let err = Workspace::clone_referenced(&missing, &repo.path, &dest)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CloneFailed { .. }));
}

#[tokio::test]
async fn test_clone_is_isolated_from_later_source_commits() {
    let repo = TestRepo::new();
    let before = repo.git_ops().unwrap().head_commit().unwrap();

    let dest = repo.temp_dir.path().join("clone-d");
    let ws = Workspace::clone_referenced(&repo.path, &repo.path, &dest)
        .await
        .unwrap();

    // Source advances after the clone; the clone must not observe it.
    repo.create_and_commit("later.txt", "later\n", "later work");

    assert_eq!(ws.head().await.unwrap(), before);
    assert!(!dest.join("later.txt").exists());
}

#[tokio::test]
async fn test_checkout_new_branch_pins_explicit_base() {
    let repo = TestRepo::new();
    let base = repo.git_ops().unwrap().head_commit().unwrap();
    repo.create_and_commit("extra.txt", "extra\n", "extra");

    let dest = repo.temp_dir.path().join("clone-e");
    let ws = Workspace::clone_referenced(&repo.path, &repo.path, &dest)
        .await
        .unwrap();

    ws.checkout_new_branch("crew/pinned", &base).await.unwrap();

    assert_eq!(ws.head().await.unwrap(), base);
    assert!(!dest.join("extra.txt").exists());
    assert_eq!(git(&dest, &["branch", "--show-current"]), "crew/pinned");
}

#[tokio::test]
async fn test_run_context_prepare_lays_out_tree() {
    let repo = TestRepo::new();
    let ctx = prepare_run(&repo).await.unwrap();

    assert!(ctx.integration_dir.is_dir());
    assert!(ctx.clones_dir.is_dir());
    assert!(ctx.patches_dir.is_dir());
    assert!(ctx.logs_dir.is_dir());
    assert_eq!(ctx.integration_branch, "crew/integration-test-run");
    assert_eq!(ctx.integration_base, ctx.main_base);

    // The integration workspace is on its branch at the base commit.
    let integration = ctx.integration();
    assert_eq!(integration.head().await.unwrap(), ctx.main_base);
    assert_eq!(
        git(&ctx.integration_dir, &["branch", "--show-current"]),
        "crew/integration-test-run"
    );
    assert!(integration.is_clean().await.unwrap());
}
