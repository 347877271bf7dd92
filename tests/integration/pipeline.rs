//! Full pipeline tests: plan, execute, verify, review, all with scripted
//! agents over a real repository.

use std::sync::Arc;

use tokio::sync::mpsc;

use crew::core::dag::TaskDag;
use crew::core::task::TaskId;
use crew::orchestration::scheduler::Scheduler;
use crew::orchestration::{dedup_commands, run_checks, run_planner, run_review, Evidence};
use crew::Error;

use super::fixtures::{commit_file_script, prepare_run, ScriptedAgent, TestRepo};

const PLAN_REPLY: &str = r#"Breaking the request down.
{
  "goal": "add the feature",
  "tasks": [
    {
      "id": "scaffold",
      "title": "Scaffold the module",
      "description": "Create the module file",
      "scope": ["src/"],
      "acceptance": ["module exists"],
      "test_commands": ["echo scaffold-check"],
      "depends_on": []
    },
    {
      "id": "wire-up",
      "title": "Wire the module in",
      "description": "Reference the module",
      "scope": ["src/"],
      "acceptance": ["module referenced"],
      "test_commands": ["echo scaffold-check", "echo wiring-check"],
      "depends_on": ["scaffold"]
    }
  ]
}"#;

const REVIEW_REPLY: &str = r#"Looks complete, merging.
{
  "done": true,
  "reason": "both tasks integrated and checks recorded",
  "merge": {
    "attempted": true,
    "status": "merged",
    "target_branch": "main",
    "merged_tasks": ["scaffold", "wire-up"],
    "details": "merged integration branch"
  },
  "followups": []
}"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_pipeline_end_to_end() {
    let repo = TestRepo::new();
    let ctx = Arc::new(prepare_run(&repo).await.unwrap());

    let agent = Arc::new(
        ScriptedAgent::new()
            .with_planner_reply(PLAN_REPLY)
            .with_reviewer_reply(REVIEW_REPLY)
            .with_worker(
                "scaffold",
                commit_file_script("module.txt", "module body\n", "scaffolded"),
            )
            .with_worker(
                "wire-up",
                commit_file_script("wiring.txt", "wired\n", "wired up"),
            ),
    );

    // ----- Plan -----
    let plan = run_planner(agent.as_ref(), &ctx, "add the feature")
        .await
        .unwrap();
    assert_eq!(plan.goal, "add the feature");
    assert_eq!(plan.tasks.len(), 2);
    assert!(ctx.plan_path().exists());
    assert!(ctx.planner_log().exists());

    // ----- Execute -----
    let dag = TaskDag::from_tasks(plan.tasks.clone()).unwrap();
    let (event_tx, _event_rx) = mpsc::channel(100);
    let scheduler = Scheduler::new(dag, Arc::clone(&ctx), Arc::clone(&agent), 2, event_tx);
    let outcome = scheduler.run().await.unwrap();

    assert_eq!(outcome.done.len(), 2);
    assert!(ctx.integration_dir.join("module.txt").exists());
    assert!(ctx.integration_dir.join("wiring.txt").exists());
    assert!(ctx.patch_path(&TaskId::normalize("scaffold")).exists());
    assert!(ctx.worker_log(&TaskId::normalize("wire-up")).exists());

    // ----- Verify -----
    let commands = dedup_commands(&plan.tasks);
    assert_eq!(commands, vec!["echo scaffold-check", "echo wiring-check"]);
    let report = run_checks(&ctx, &commands).await.unwrap();
    assert!(report.all_passed());

    let tests_log = std::fs::read_to_string(&report.log).unwrap();
    assert!(tests_log.contains("$ echo scaffold-check"));
    assert!(tests_log.contains("wiring-check"));
    assert!(tests_log.contains("[exit=0]"));
    // Deduplicated: the shared command ran once.
    assert_eq!(tests_log.matches("$ echo scaffold-check").count(), 1);

    // ----- Review -----
    let evidence = Evidence::assemble(&ctx, &plan.tasks, &outcome);
    assert!(evidence.tasks.iter().all(|t| t.status == "done"));

    let review = run_review(agent.as_ref(), &ctx, "add the feature", &evidence)
        .await
        .unwrap();
    assert!(review.done);
    assert_eq!(review.merge_status(), Some(("merged", Some("main"))));
    assert!(ctx.review_log().exists());
}

#[tokio::test]
async fn test_failing_check_is_recorded_not_fatal() {
    let repo = TestRepo::new();
    let ctx = Arc::new(prepare_run(&repo).await.unwrap());

    let commands = vec![
        "git log --oneline".to_string(),
        "git frobnicate".to_string(),
    ];
    let report = run_checks(&ctx, &commands).await.unwrap();

    assert_eq!(report.checks.len(), 2);
    assert_eq!(report.checks[0].exit_code, 0);
    assert_ne!(report.checks[1].exit_code, 0);
    assert!(!report.all_passed());

    let log = std::fs::read_to_string(&report.log).unwrap();
    assert!(log.contains("$ git frobnicate"));
}

#[tokio::test]
async fn test_dirty_primary_aborts_before_any_workspace() {
    let repo = TestRepo::new();
    // An uncommitted edit to a tracked file.
    std::fs::write(repo.path.join("README.md"), "# edited locally\n").unwrap();

    let git_ops = repo.git_ops().unwrap();
    let err = git_ops.require_clean().unwrap_err();
    assert!(matches!(err, Error::DirtyWorkspace { .. }));

    // The check runs before the run tree is created, so nothing exists yet.
    assert!(!repo.path.join(".crew").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_planner_with_dangling_dependency_is_rejected() {
    let repo = TestRepo::new();
    let ctx = Arc::new(prepare_run(&repo).await.unwrap());

    let agent = ScriptedAgent::new().with_planner_reply(
        r#"{"goal": "g", "tasks": [
            {"id": "a", "title": "a", "description": "d", "depends_on": ["phantom"]}
        ]}"#,
    );

    let plan = run_planner(&agent, &ctx, "goal").await.unwrap();
    let err = TaskDag::from_tasks(plan.tasks).unwrap_err();
    assert!(matches!(err, Error::Validation(msg) if msg.contains("phantom")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_planner_without_json_is_fatal() {
    let repo = TestRepo::new();
    let ctx = Arc::new(prepare_run(&repo).await.unwrap());

    let agent = ScriptedAgent::new().with_planner_reply("I'd rather chat about the weather.");
    let err = run_planner(&agent, &ctx, "goal").await.unwrap_err();
    assert!(matches!(err, Error::NoJsonObject));
}
