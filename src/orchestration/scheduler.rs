//! Dependency-aware scheduler for parallel task execution.
//!
//! The Scheduler is the run's control loop. It launches ready tasks into
//! bounded-concurrency workers, waits for whichever finishes first, and
//! serially integrates each successful patch into the shared integration
//! workspace before recomputing readiness. Dependents only become ready
//! once their dependency's change is durably in the integration history,
//! not merely reported finished by the agent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::agent::{AgentExec, Role};
use crate::core::dag::TaskDag;
use crate::core::task::{Task, TaskId, WorkerReply, WorkerResult, WorkerStatus};
use crate::orchestration::prompts;
use crate::patch;
use crate::run::RunContext;
use crate::workspace::Workspace;
use crate::{clog, clog_warn, Error, Result};

/// Events emitted by the scheduler for task lifecycle changes.
///
/// These let external components (progress printing, logging) react to
/// state changes without polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A task has been launched.
    TaskStarted {
        /// The task that was started.
        task_id: TaskId,
    },
    /// A task's worker finished and its result was recorded.
    TaskFinished {
        /// The task that finished.
        task_id: TaskId,
        /// The agent-reported status.
        status: WorkerStatus,
    },
    /// A task's patch was applied to the integration workspace.
    TaskIntegrated {
        /// The task whose change is now durably integrated.
        task_id: TaskId,
    },
    /// A task's patch conflicted and was rolled back; the task stays out
    /// of the integrated set but the run continues.
    IntegrationRejected {
        /// The task whose patch was rejected.
        task_id: TaskId,
        /// Description of the conflict.
        error: String,
    },
    /// Nothing is pending or running anymore.
    AllTasksSettled,
}

/// Final scheduler state, consumed by the evidence assembler.
#[derive(Debug)]
pub struct SchedulerOutcome {
    /// One result per launched task, keyed by id.
    pub results: HashMap<TaskId, WorkerResult>,
    /// Tasks whose change is durably integrated.
    pub done: HashSet<TaskId>,
    /// Tasks never launched because a dependency never completed,
    /// in plan order. Distinct from "blocked": these were never attempted.
    pub never_ran: Vec<TaskId>,
}

/// Drives the task graph to completion.
///
/// The scheduler exclusively owns the `pending`/`running`/`done` sets and
/// the `results` map. Workers run concurrently but communicate only through
/// their returned futures; every mutation of shared state, including the
/// one mutation of the integration workspace per task, happens in the
/// serialized settle step of the main loop.
pub struct Scheduler<E: AgentExec> {
    dag: TaskDag,
    ctx: Arc<RunContext>,
    agent: Arc<E>,
    limiter: Arc<Semaphore>,
    event_tx: mpsc::Sender<SchedulerEvent>,
    pending: HashSet<TaskId>,
    running: HashSet<TaskId>,
    done: HashSet<TaskId>,
    results: HashMap<TaskId, WorkerResult>,
}

impl<E: AgentExec> Scheduler<E> {
    /// Create a scheduler over a validated task graph.
    ///
    /// # Arguments
    ///
    /// * `dag` - The task graph to execute
    /// * `ctx` - The run context (integration workspace, artifact layout)
    /// * `agent` - Executor used for every worker invocation
    /// * `max_workers` - Concurrency bound N
    /// * `event_tx` - Channel for lifecycle events
    pub fn new(
        dag: TaskDag,
        ctx: Arc<RunContext>,
        agent: Arc<E>,
        max_workers: usize,
        event_tx: mpsc::Sender<SchedulerEvent>,
    ) -> Self {
        let pending = dag.ids().into_iter().collect();
        Self {
            dag,
            ctx,
            agent,
            limiter: Arc::new(Semaphore::new(max_workers)),
            event_tx,
            pending,
            running: HashSet::new(),
            done: HashSet::new(),
            results: HashMap::new(),
        }
    }

    /// Run the scheduling loop until nothing is pending or running.
    ///
    /// Results are processed in completion order, not dispatch order. The
    /// loop terminates even when tasks can never run (their dependency was
    /// blocked or rejected): such tasks simply stay pending and surface in
    /// the outcome as `never_ran`.
    pub async fn run(mut self) -> Result<SchedulerOutcome> {
        let mut inflight: JoinSet<Result<WorkerResult>> = JoinSet::new();
        self.launch_ready(&mut inflight).await;

        while let Some(joined) = inflight.join_next().await {
            let result = joined.map_err(|e| Error::TaskJoin(e.to_string()))??;
            self.settle(result).await?;
            self.launch_ready(&mut inflight).await;
        }

        let _ = self.event_tx.send(SchedulerEvent::AllTasksSettled).await;

        // Anything still pending had a dependency that never integrated.
        let never_ran: Vec<TaskId> = self
            .dag
            .ids()
            .into_iter()
            .filter(|id| self.pending.contains(id))
            .collect();
        for id in &never_ran {
            clog_warn!("Task {} never ran: unmet dependency", id);
        }

        Ok(SchedulerOutcome {
            results: self.results,
            done: self.done,
            never_ran,
        })
    }

    /// Launch every ready task that has not been launched yet.
    async fn launch_ready(&mut self, inflight: &mut JoinSet<Result<WorkerResult>>) {
        for id in self.dag.ready_ids(&self.done) {
            if !self.pending.contains(&id) {
                continue;
            }
            let Some(task) = self.dag.get(&id) else {
                continue;
            };
            let task = task.clone();
            self.pending.remove(&id);
            self.running.insert(id.clone());

            let _ = self
                .event_tx
                .send(SchedulerEvent::TaskStarted {
                    task_id: id.clone(),
                })
                .await;
            clog!("Task {} launched", id);

            let ctx = Arc::clone(&self.ctx);
            let agent = Arc::clone(&self.agent);
            let limiter = Arc::clone(&self.limiter);
            inflight.spawn(run_worker(task, ctx, agent, limiter));
        }
    }

    /// Record one finished result and, when warranted, integrate its patch.
    ///
    /// This is the single place the integration workspace is mutated; the
    /// main loop calls it for one result at a time, so application is
    /// naturally serialized even though execution is concurrent.
    async fn settle(&mut self, result: WorkerResult) -> Result<()> {
        let task_id = result.task_id.clone();
        self.running.remove(&task_id);

        let _ = self
            .event_tx
            .send(SchedulerEvent::TaskFinished {
                task_id: task_id.clone(),
                status: result.status,
            })
            .await;

        if result.status == WorkerStatus::Done {
            if let Some(patch) = &result.patch {
                let title = self
                    .dag
                    .get(&task_id)
                    .map(|t| t.title.clone())
                    .unwrap_or_default();
                let message = format!("crew: apply {} ({})", task_id, title);

                match patch::apply_change(&self.ctx.integration(), patch, &message).await {
                    Ok(()) => {
                        self.done.insert(task_id.clone());
                        let _ = self
                            .event_tx
                            .send(SchedulerEvent::TaskIntegrated {
                                task_id: task_id.clone(),
                            })
                            .await;
                        clog!("Task {} integrated", task_id);
                    }
                    Err(err @ Error::PatchApply { .. }) => {
                        // Rolled back; the integration workspace is intact.
                        // The task stays out of done and its dependents will
                        // never launch.
                        clog_warn!("Task {} patch rejected: {}", task_id, err);
                        let _ = self
                            .event_tx
                            .send(SchedulerEvent::IntegrationRejected {
                                task_id: task_id.clone(),
                                error: err.to_string(),
                            })
                            .await;
                    }
                    Err(other) => return Err(other),
                }
            } else {
                clog!("Task {} reported done with no change to integrate", task_id);
            }
        }

        self.results.insert(task_id, result);
        Ok(())
    }
}

/// Execute one task in its own workspace.
///
/// Holds a capacity permit from before the workspace is created until the
/// agent execution completes: workspace creation counts against the bound,
/// patch export does not. Returns the task's `WorkerResult`; only
/// infrastructure failures (clone, spawn, export) are errors, and those
/// abort the run.
async fn run_worker<E: AgentExec>(
    task: Task,
    ctx: Arc<RunContext>,
    agent: Arc<E>,
    limiter: Arc<Semaphore>,
) -> Result<WorkerResult> {
    let permit = limiter
        .acquire_owned()
        .await
        .map_err(|e| Error::Semaphore(e.to_string()))?;

    // Clone from the integration workspace so this worker sees every change
    // integrated so far; reference the primary repo's object store.
    let clone_dir = ctx.task_clone_dir(&task.id);
    let workspace =
        Workspace::clone_referenced(&ctx.integration_dir, &ctx.repo_root, &clone_dir).await?;

    // Pin the base explicitly from the integration workspace at this
    // instant, then branch the clone at it.
    let worker_base = ctx.integration().head().await?;
    workspace
        .checkout_new_branch(&ctx.task_branch(&task.id), &worker_base)
        .await?;

    let prompt = prompts::worker_prompt(&task);
    let reply = agent.execute(Role::Worker, &prompt, workspace.path()).await?;

    let log_path = ctx.worker_log(&task.id);
    tokio::fs::write(&log_path, &reply.text).await?;
    drop(permit);

    let parsed = WorkerReply::parse(&reply.text);
    let patch =
        patch::export_change(&workspace, &worker_base, &ctx.patch_path(&task.id)).await?;

    Ok(WorkerResult {
        task_id: task.id.clone(),
        status: parsed.status,
        summary: parsed.summary,
        commit_head: parsed.commit_head,
        patch,
        log: log_path,
        workspace: clone_dir,
    })
}
