//! Dependency-driven task execution.
//!
//! The engine walks a [`TaskGraph`] in topological order, spawning every task
//! whose upstream tasks all succeeded and skipping every task with a failed or
//! skipped upstream. Spawned tasks report back over an mpsc channel; the
//! scheduling loop is the only place task results are written.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::constants::{RUN_CANCELLED_REASON, UPSTREAM_FAILURE_REASON};
use crate::observability::metrics;
use crate::pipeline::graph::TaskGraph;
use crate::pipeline::run::{Run, RunStatus};
use crate::pipeline::task::{TaskAction, TaskContext, TaskError, TaskOutput, TaskRecord, TaskResult, TaskStatus};

/// Execution policy shared by every task of a run
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Upper bound on tasks running at the same time
    pub max_concurrency: usize,
    /// Extra attempts after a failure; 0 disables retries
    pub retries: u32,
    pub retry_delay: Duration,
    /// Per-attempt deadline; `None` waits indefinitely
    pub task_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            retries: 0,
            retry_delay: Duration::from_secs(5 * 60),
            task_timeout: None,
        }
    }
}

/// Result of one spawned task, sent back to the scheduling loop
struct Completion {
    index: usize,
    result: TaskResult,
    attempts: u32,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    elapsed: Duration,
}

pub struct Engine {
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute every task of `graph` for `logical_date`.
    ///
    /// Always returns a terminal run; task failures are recorded, never raised.
    /// Cancelling `cancel` lets in-flight tasks finish and skips everything not
    /// yet started.
    pub async fn execute(&self, graph: &TaskGraph, logical_date: NaiveDate, cancel: CancellationToken) -> Run {
        let mut run = Run::new(graph.name(), logical_date);
        run.status = RunStatus::Running;
        info!(
            run_id = %run.run_id,
            pipeline = %run.pipeline,
            logical_date = %logical_date,
            tasks = graph.len(),
            "🚀 run_started"
        );

        let n = graph.len();
        let max_concurrency = self.config.max_concurrency.max(1);
        let mut results: Vec<Option<TaskRecord>> = (0..n).map(|_| None).collect();
        let mut running = vec![false; n];
        let mut in_flight = 0usize;
        let mut cancel_seen = false;
        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();

        loop {
            // Resolution pass in topological order: an upstream is always decided
            // before its dependents are looked at.
            for index in 0..n {
                if results[index].is_some() || running[index] {
                    continue;
                }
                let node = graph.node(index);
                let upstream_statuses = node
                    .upstream()
                    .iter()
                    .map(|&up| results[up].as_ref().map(|r| (r.status, r.error.as_deref())));

                match disposition(upstream_statuses, cancel.is_cancelled()) {
                    Disposition::Skip(reason) => {
                        results[index] = Some(self.skip(&run, graph, index, reason));
                        continue;
                    }
                    Disposition::Wait => continue,
                    Disposition::Ready if in_flight >= max_concurrency => continue,
                    Disposition::Ready => {}
                }

                let upstream: HashMap<String, TaskOutput> = node
                    .upstream()
                    .iter()
                    .filter_map(|&up| {
                        let record = results[up].as_ref()?;
                        let output = record.output.clone()?;
                        Some((record.name.clone(), output))
                    })
                    .collect();
                let ctx = TaskContext {
                    run_id: run.run_id,
                    pipeline: run.pipeline.clone(),
                    logical_date,
                    task: node.name().to_string(),
                    attempt: 1,
                    upstream,
                };
                self.spawn_task(index, node.action(), ctx, cancel.clone(), tx.clone());
                running[index] = true;
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            let completion = tokio::select! {
                completion = rx.recv() => completion,
                _ = cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    warn!(run_id = %run.run_id, in_flight, "run cancelled; waiting for in-flight tasks");
                    continue;
                }
            };
            let Some(completion) = completion else {
                break;
            };

            let index = completion.index;
            running[index] = false;
            in_flight -= 1;
            results[index] = Some(self.record_completion(&run, graph, completion));
        }

        run.tasks = results
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                // Every slot is filled once nothing is in flight
                record.unwrap_or_else(|| {
                    TaskRecord::skipped(graph.node(index).name(), graph.upstream_names(index), RUN_CANCELLED_REASON)
                })
            })
            .collect();
        run.ended_at = Some(Utc::now());
        run.status = if run.tasks.iter().all(|t| t.status == TaskStatus::Succeeded) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };

        metrics::engine::run_completed(run.succeeded());
        let failed = run.count(TaskStatus::Failed);
        let skipped = run.count(TaskStatus::Skipped);
        if run.succeeded() {
            info!(run_id = %run.run_id, status = %run.status, "🎉 run_completed");
        } else {
            error!(
                run_id = %run.run_id,
                status = %run.status,
                failed,
                skipped,
                first_failure = run.first_failure().map(|t| t.name.as_str()).unwrap_or("none"),
                "run_completed"
            );
        }
        run
    }

    fn skip(&self, run: &Run, graph: &TaskGraph, index: usize, reason: &str) -> TaskRecord {
        let name = graph.node(index).name();
        info!(run_id = %run.run_id, task = %name, reason, "⏭️ task_skipped");
        metrics::engine::task_skipped(name);
        TaskRecord::skipped(name, graph.upstream_names(index), reason)
    }

    fn record_completion(&self, run: &Run, graph: &TaskGraph, completion: Completion) -> TaskRecord {
        let name = graph.node(completion.index).name().to_string();
        let secs = completion.elapsed.as_secs_f64();
        let (status, error, output) = match completion.result {
            Ok(output) => {
                info!(
                    run_id = %run.run_id,
                    task = %name,
                    attempts = completion.attempts,
                    duration_secs = secs,
                    output = output.as_ref().map(|o| o.summary()).unwrap_or_default(),
                    "✅ task_succeeded"
                );
                metrics::engine::task_succeeded(&name, secs);
                (TaskStatus::Succeeded, None, output)
            }
            Err(err) => {
                error!(
                    run_id = %run.run_id,
                    task = %name,
                    attempts = completion.attempts,
                    duration_secs = secs,
                    error = %err,
                    "❌ task_failed"
                );
                metrics::engine::task_failed(&name, secs);
                (TaskStatus::Failed, Some(err.reason().to_string()), None)
            }
        };
        TaskRecord {
            name,
            upstream: graph.upstream_names(completion.index),
            status,
            error,
            output,
            attempts: completion.attempts,
            started_at: Some(completion.started_at),
            ended_at: Some(completion.ended_at),
        }
    }

    fn spawn_task(
        &self,
        index: usize,
        action: Arc<dyn TaskAction>,
        ctx: TaskContext,
        cancel: CancellationToken,
        tx: mpsc::UnboundedSender<Completion>,
    ) {
        let config = self.config.clone();
        let span = info_span!("task", run_id = %ctx.run_id, task = %ctx.task);
        tokio::spawn(
            async move {
                let started_at = Utc::now();
                let clock = Instant::now();
                let task_name = ctx.task.clone();
                let mut attempt = 0u32;

                let result = loop {
                    attempt += 1;
                    info!(attempt, "▶️ task_started");
                    let ctx = TaskContext { attempt, ..ctx.clone() };
                    let result = run_attempt(Arc::clone(&action), ctx, config.task_timeout).await;

                    match result {
                        Err(err) if attempt <= config.retries && !cancel.is_cancelled() => {
                            warn!(attempt, error = %err, delay = ?config.retry_delay, "🔄 task_retrying");
                            metrics::engine::task_retried(&task_name);
                            tokio::select! {
                                _ = tokio::time::sleep(config.retry_delay) => {}
                                _ = cancel.cancelled() => break Err(err),
                            }
                        }
                        other => break other,
                    }
                };

                let _ = tx.send(Completion {
                    index,
                    result,
                    attempts: attempt,
                    started_at,
                    ended_at: Utc::now(),
                    elapsed: clock.elapsed(),
                });
            }
            .instrument(span),
        );
    }
}

/// What the scheduling pass does with a task that has not started
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    Ready,
    Wait,
    Skip(&'static str),
}

/// Decide a pending task from its upstream results (`None` while unresolved).
///
/// A failed upstream wins over cancellation so the recorded reason names the
/// actual cause; a task behind a cancelled skip is itself cancelled.
fn disposition<'a>(
    upstream: impl IntoIterator<Item = Option<(TaskStatus, Option<&'a str>)>>,
    cancelled: bool,
) -> Disposition {
    let mut all_succeeded = true;
    let mut upstream_cancelled = false;
    for resolved in upstream {
        match resolved {
            Some((TaskStatus::Succeeded, _)) => {}
            Some((TaskStatus::Skipped, Some(RUN_CANCELLED_REASON))) => upstream_cancelled = true,
            Some(_) => return Disposition::Skip(UPSTREAM_FAILURE_REASON),
            None => all_succeeded = false,
        }
    }
    if cancelled || upstream_cancelled {
        Disposition::Skip(RUN_CANCELLED_REASON)
    } else if all_succeeded {
        Disposition::Ready
    } else {
        Disposition::Wait
    }
}

/// Run one attempt on its own tokio task so a panic is contained to it.
async fn run_attempt(action: Arc<dyn TaskAction>, ctx: TaskContext, timeout: Option<Duration>) -> TaskResult {
    let handle = tokio::spawn(async move { action.run(ctx).await });
    match timeout {
        Some(limit) => {
            let abort = handle.abort_handle();
            match tokio::time::timeout(limit, handle).await {
                Ok(joined) => flatten_join(joined),
                Err(_) => {
                    abort.abort();
                    Err(TaskError::new(format!("task timed out after {}s", limit.as_secs_f64())))
                }
            }
        }
        None => flatten_join(handle.await),
    }
}

fn flatten_join(joined: Result<TaskResult, JoinError>) -> TaskResult {
    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            let payload = err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(TaskError::new(format!("task panicked: {}", message)))
        }
        Err(err) => Err(TaskError::new(format!("task aborted: {}", err))),
    }
}
