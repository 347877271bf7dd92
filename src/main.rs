use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use crew::agent::AgentRunner;
use crew::config::Config;
use crew::core::dag::TaskDag;
use crew::git::GitOps;
use crew::orchestration::scheduler::{Scheduler, SchedulerEvent};
use crew::orchestration::{dedup_commands, run_checks, run_planner, run_review, Evidence};
use crew::run::RunContext;
use crew::{clog, Result};

/// Crew - delegate one large task to a planned team of autonomous agents
#[derive(Parser, Debug)]
#[command(name = "crew")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CREW_DEBUG=1    Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// The large task to delegate
    pub task: String,

    /// Maximum concurrently running workers (default from config, else 4)
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Model override for the planner agent
    #[arg(long)]
    pub planner_model: Option<String>,

    /// Model override for worker agents
    #[arg(long)]
    pub worker_model: Option<String>,

    /// Model override for the reviewer agent
    #[arg(long)]
    pub reviewer_model: Option<String>,

    /// Enable debug logging (writes to ~/.crew/crew.log)
    #[arg(short = 'd', long)]
    pub debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    crew::log::init_with_debug(cli.debug);

    if let Err(e) = run(cli).await {
        eprintln!("crew: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    // Anchor on the repository containing the current directory. The
    // primary tree must be clean before any workspace is created, so every
    // clone's base snapshot is well-defined for the whole run.
    let git = GitOps::discover(Path::new("."))?;
    git.require_clean()?;
    let main_base = git.head_commit()?;
    let main_branch = git.default_branch()?;
    clog!(
        "Primary repo {} branch {} at {}",
        git.repo_path().display(),
        main_branch,
        &main_base[..12]
    );

    let runs_root = config
        .runs_dir_override()
        .unwrap_or_else(|| git.repo_path().join(".crew").join("runs"));
    let ctx = Arc::new(
        RunContext::prepare(git.repo_path(), &main_branch, &main_base, &runs_root).await?,
    );

    let agent = Arc::new(AgentRunner::from_config(&config)?.with_models(
        cli.planner_model,
        cli.worker_model,
        cli.reviewer_model,
    ));

    // ----------------- Plan -----------------
    println!("Planning...");
    let plan = run_planner(agent.as_ref(), &ctx, &cli.task).await?;
    println!("Plan: {} task(s): {}", plan.tasks.len(), plan.goal);
    let dag = TaskDag::from_tasks(plan.tasks.clone())?;

    // ----------------- Execute -----------------
    let max_workers = cli
        .max_workers
        .filter(|n| *n > 0)
        .unwrap_or_else(|| config.effective_max_workers());
    let (event_tx, mut event_rx) = mpsc::channel(100);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                SchedulerEvent::TaskStarted { task_id } => {
                    println!("  [{}] started", task_id);
                }
                SchedulerEvent::TaskFinished { task_id, status } => {
                    println!("  [{}] worker finished: {}", task_id, status);
                }
                SchedulerEvent::TaskIntegrated { task_id } => {
                    println!("  [{}] integrated", task_id);
                }
                SchedulerEvent::IntegrationRejected { task_id, .. } => {
                    println!("  [{}] patch conflicted; left out of integration", task_id);
                }
                SchedulerEvent::AllTasksSettled => {
                    println!("All tasks settled.");
                }
            }
        }
    });

    let scheduler = Scheduler::new(
        dag,
        Arc::clone(&ctx),
        Arc::clone(&agent),
        max_workers,
        event_tx,
    );
    let outcome = scheduler.run().await?;
    let _ = printer.await;

    // ----------------- Verify -----------------
    let commands = dedup_commands(&plan.tasks);
    let report = run_checks(&ctx, &commands).await?;

    // ----------------- Review -----------------
    println!("Reviewing...");
    let evidence = Evidence::assemble(&ctx, &plan.tasks, &outcome);
    let review = run_review(agent.as_ref(), &ctx, &cli.task, &evidence).await?;

    // ----------------- Summary -----------------
    println!("\n=== crew finished ===");
    println!("Run directory: {}", ctx.root.display());
    println!("Integration workspace: {}", ctx.integration_dir.display());
    println!("Integration branch: {}", ctx.integration_branch);
    println!("Plan: {}", ctx.plan_path().display());
    println!("Worker logs: {}", ctx.logs_dir.display());
    println!("Patches: {}", ctx.patches_dir.display());
    println!(
        "Tests log: {} ({})",
        report.log.display(),
        if report.all_passed() {
            "all passed"
        } else {
            "failures recorded"
        }
    );
    println!(
        "Integrated: {}/{} task(s){}",
        outcome.done.len(),
        plan.tasks.len(),
        if outcome.never_ran.is_empty() {
            String::new()
        } else {
            format!(", {} never ran", outcome.never_ran.len())
        }
    );
    if let Some((status, target)) = review.merge_status() {
        println!(
            "Merge status: {} ({})",
            status,
            target.unwrap_or(&ctx.main_branch)
        );
    }
    println!("Review log: {}", ctx.review_log().display());
    if !review.reason.is_empty() {
        println!("Review: {}", review.reason);
    }

    Ok(())
}
