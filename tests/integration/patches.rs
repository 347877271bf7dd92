//! Patch transfer tests: export, replay, fallback, and rollback.

use crew::patch::{apply_change, export_change, PatchKind};
use crew::workspace::Workspace;
use crew::Error;

use super::fixtures::{git, prepare_run, TestRepo};

#[tokio::test]
async fn test_export_apply_reproduces_identical_tree() {
    let repo = TestRepo::new();
    let ctx = prepare_run(&repo).await.unwrap();
    let base = ctx.integration_base.clone();

    // Worker clone commits two changes on its own branch.
    let worker_dir = ctx.clones_dir.join("worker");
    let worker = Workspace::clone_referenced(&ctx.integration_dir, &repo.path, &worker_dir)
        .await
        .unwrap();
    worker.checkout_new_branch("crew/worker", &base).await.unwrap();
    std::fs::write(worker_dir.join("feature.txt"), "step one\n").unwrap();
    git(&worker_dir, &["add", "-A"]);
    git(&worker_dir, &["commit", "-m", "feature: step one"]);
    std::fs::write(worker_dir.join("feature.txt"), "step one\nstep two\n").unwrap();
    git(&worker_dir, &["add", "-A"]);
    git(&worker_dir, &["commit", "-m", "feature: step two"]);

    let patch = export_change(&worker, &base, &ctx.patch_path(&crew::core::TaskId::normalize("worker")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patch.kind, PatchKind::Series);

    // Replaying onto the pristine integration workspace reproduces the tree
    // and the per-commit history.
    let integration = ctx.integration();
    apply_change(&integration, &patch, "crew: apply worker").await.unwrap();

    assert_eq!(
        std::fs::read_to_string(ctx.integration_dir.join("feature.txt")).unwrap(),
        "step one\nstep two\n"
    );
    let log = git(&ctx.integration_dir, &["log", "--format=%s", "-n", "2"]);
    assert!(log.contains("feature: step two"));
    assert!(log.contains("feature: step one"));
    assert_ne!(integration.head().await.unwrap(), base);
    assert!(integration.is_clean().await.unwrap());
}

#[tokio::test]
async fn test_uncommitted_diff_applies_via_fallback_commit() {
    let repo = TestRepo::new();
    repo.create_and_commit("notes.txt", "original\n", "add notes");
    let ctx = prepare_run(&repo).await.unwrap();
    let base = ctx.integration_base.clone();

    // Worker modifies a tracked file but never commits.
    let worker_dir = ctx.clones_dir.join("sloppy");
    let worker = Workspace::clone_referenced(&ctx.integration_dir, &repo.path, &worker_dir)
        .await
        .unwrap();
    std::fs::write(worker_dir.join("notes.txt"), "edited\n").unwrap();

    let patch = export_change(&worker, &base, &ctx.patches_dir.join("sloppy.patch"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patch.kind, PatchKind::Diff);

    // A plain diff cannot go through `am`, so the permissive path commits it
    // as a single synthesized commit carrying the fallback message.
    let integration = ctx.integration();
    apply_change(&integration, &patch, "crew: apply sloppy (edits)")
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(ctx.integration_dir.join("notes.txt")).unwrap(),
        "edited\n"
    );
    let subject = git(&ctx.integration_dir, &["log", "--format=%s", "-n", "1"]);
    assert_eq!(subject, "crew: apply sloppy (edits)");
    assert!(integration.is_clean().await.unwrap());
}

#[tokio::test]
async fn test_no_change_exports_none() {
    let repo = TestRepo::new();
    let ctx = prepare_run(&repo).await.unwrap();
    let base = ctx.integration_base.clone();

    let worker_dir = ctx.clones_dir.join("idle");
    let worker = Workspace::clone_referenced(&ctx.integration_dir, &repo.path, &worker_dir)
        .await
        .unwrap();

    let patch = export_change(&worker, &base, &ctx.patches_dir.join("idle.patch"))
        .await
        .unwrap();
    assert!(patch.is_none());
}

#[tokio::test]
async fn test_conflicting_patch_rolls_back_and_errors() {
    let repo = TestRepo::new();
    repo.create_and_commit("shared.txt", "base\n", "add shared");
    let ctx = prepare_run(&repo).await.unwrap();
    let base = ctx.integration_base.clone();

    // Worker rewrites shared.txt from the original base.
    let worker_dir = ctx.clones_dir.join("conflicted");
    let worker = Workspace::clone_referenced(&ctx.integration_dir, &repo.path, &worker_dir)
        .await
        .unwrap();
    std::fs::write(worker_dir.join("shared.txt"), "worker version\n").unwrap();
    git(&worker_dir, &["add", "-A"]);
    git(&worker_dir, &["commit", "-m", "worker edit"]);

    let patch = export_change(&worker, &base, &ctx.patches_dir.join("conflicted.patch"))
        .await
        .unwrap()
        .unwrap();

    // Integration diverges on the same lines before the patch lands.
    std::fs::write(ctx.integration_dir.join("shared.txt"), "integration version\n").unwrap();
    git(&ctx.integration_dir, &["add", "-A"]);
    git(&ctx.integration_dir, &["commit", "-m", "integration edit"]);
    let pre_apply_head = ctx.integration().head().await.unwrap();

    let err = apply_change(&ctx.integration(), &patch, "crew: apply conflicted")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PatchApply { .. }));

    // Rolled back: same head, clean tree, integration's content intact.
    let integration = ctx.integration();
    assert_eq!(integration.head().await.unwrap(), pre_apply_head);
    assert!(integration.is_clean().await.unwrap());
    assert_eq!(
        std::fs::read_to_string(ctx.integration_dir.join("shared.txt")).unwrap(),
        "integration version\n"
    );
}

#[tokio::test]
async fn test_exported_series_is_self_contained() {
    let repo = TestRepo::new();
    let ctx = prepare_run(&repo).await.unwrap();
    let base = ctx.integration_base.clone();

    let worker_dir = ctx.clones_dir.join("portable");
    let worker = Workspace::clone_referenced(&ctx.integration_dir, &repo.path, &worker_dir)
        .await
        .unwrap();
    std::fs::write(worker_dir.join("portable.txt"), "contents\n").unwrap();
    git(&worker_dir, &["add", "-A"]);
    git(&worker_dir, &["commit", "-m", "portable change"]);

    let patch = export_change(&worker, &base, &ctx.patches_dir.join("portable.patch"))
        .await
        .unwrap()
        .unwrap();

    // The worker clone can be deleted entirely; the patch still applies.
    drop(worker);
    std::fs::remove_dir_all(&worker_dir).unwrap();

    apply_change(&ctx.integration(), &patch, "crew: apply portable")
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(ctx.integration_dir.join("portable.txt")).unwrap(),
        "contents\n"
    );

    // Authorship survived the replay.
    let author = git(&ctx.integration_dir, &["log", "--format=%an", "-n", "1"]);
    assert_eq!(author, "Crew Test");
}

#[tokio::test]
async fn test_apply_same_patch_to_two_pristine_bases_matches() {
    let repo = TestRepo::new();
    let ctx = prepare_run(&repo).await.unwrap();
    let base = ctx.integration_base.clone();

    let worker_dir = ctx.clones_dir.join("repeat");
    let worker = Workspace::clone_referenced(&ctx.integration_dir, &repo.path, &worker_dir)
        .await
        .unwrap();
    std::fs::write(worker_dir.join("repeat.txt"), "same either way\n").unwrap();
    git(&worker_dir, &["add", "-A"]);
    git(&worker_dir, &["commit", "-m", "repeatable change"]);

    let patch = export_change(&worker, &base, &ctx.patches_dir.join("repeat.patch"))
        .await
        .unwrap()
        .unwrap();

    // Two independent pristine copies of the same base.
    let copy_a = ctx.clones_dir.join("copy-a");
    let copy_b = ctx.clones_dir.join("copy-b");
    let ws_a = Workspace::clone_referenced(&ctx.integration_dir, &repo.path, &copy_a)
        .await
        .unwrap();
    let ws_b = Workspace::clone_referenced(&ctx.integration_dir, &repo.path, &copy_b)
        .await
        .unwrap();

    apply_change(&ws_a, &patch, "crew: apply repeat").await.unwrap();
    apply_change(&ws_b, &patch, "crew: apply repeat").await.unwrap();

    let tree_a = git(&copy_a, &["rev-parse", "HEAD^{tree}"]);
    let tree_b = git(&copy_b, &["rev-parse", "HEAD^{tree}"]);
    assert_eq!(tree_a, tree_b);

    // Both trees carry the change.
    assert_eq!(
        std::fs::read_to_string(copy_a.join("repeat.txt")).unwrap(),
        "same either way\n"
    );
}
