use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

use ev_charge_pipeline::pipeline::{
    Engine, EngineConfig, FnAction, RunStatus, TaskContext, TaskError, TaskGraph, TaskOutput, TaskStatus,
};
use ev_charge_pipeline::PipelineError;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

type Calls = Arc<Mutex<HashMap<String, usize>>>;

/// Action that records its invocation and fails when its task is `failing`
fn recording_action(
    calls: Calls,
    failing: Option<String>,
) -> FnAction<impl Fn(TaskContext) -> std::future::Ready<ev_charge_pipeline::pipeline::task::TaskResult> + Send + Sync>
{
    FnAction::new(move |ctx: TaskContext| {
        *calls.lock().unwrap().entry(ctx.task.clone()).or_insert(0) += 1;
        let result = if failing.as_deref() == Some(ctx.task.as_str()) {
            Err(TaskError::new(format!("{} failed", ctx.task)))
        } else {
            Ok(None)
        };
        std::future::ready(result)
    })
}

/// Deterministic pseudo-random DAG: each node depends on a subset of earlier nodes
fn random_edges(nodes: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };
    (0..nodes)
        .map(|i| (0..i).filter(|_| next() % 4 == 0).collect())
        .collect()
}

fn build_random_graph(edges: &[Vec<usize>], calls: &Calls, failing: Option<&str>) -> TaskGraph {
    let names: Vec<String> = (0..edges.len()).map(|i| format!("t{:02}", i)).collect();
    // Declare in reverse so the builder has to reorder
    let mut builder = TaskGraph::builder("random");
    for i in (0..edges.len()).rev() {
        let deps: Vec<&str> = edges[i].iter().map(|&d| names[d].as_str()).collect();
        builder = builder.task(
            names[i].clone(),
            recording_action(Arc::clone(calls), failing.map(str::to_string)),
            &deps,
        );
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn every_task_resolves_exactly_once() {
    for seed in [1u64, 7, 42, 1234] {
        let edges = random_edges(12, seed);
        let calls: Calls = Arc::default();
        let graph = build_random_graph(&edges, &calls, None);

        let run = Engine::default().execute(&graph, date(), CancellationToken::new()).await;

        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.tasks.len(), graph.len());
        let names: BTreeSet<&str> = run.tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), graph.len());
        assert!(calls.lock().unwrap().values().all(|&n| n == 1));
        assert!(run.ended_at.is_some());
    }
}

#[tokio::test]
async fn failure_skips_exactly_the_downstream_closure() {
    let edges = random_edges(10, 99);
    for failing in 0..edges.len() {
        let failing_name = format!("t{:02}", failing);
        let calls: Calls = Arc::default();
        let graph = build_random_graph(&edges, &calls, Some(&failing_name));
        let closure = graph.descendants(&failing_name);

        let run = Engine::default().execute(&graph, date(), CancellationToken::new()).await;

        assert_eq!(run.status, RunStatus::Failed);
        for task in &run.tasks {
            let expected = if task.name == failing_name {
                TaskStatus::Failed
            } else if closure.contains(&task.name) {
                TaskStatus::Skipped
            } else {
                TaskStatus::Succeeded
            };
            assert_eq!(task.status, expected, "task {} with {} failing", task.name, failing_name);
            if expected == TaskStatus::Skipped {
                assert_eq!(task.error.as_deref(), Some("upstream failure"));
                assert_eq!(task.attempts, 0);
                assert!(!calls.lock().unwrap().contains_key(&task.name));
            }
        }
        assert_eq!(run.first_failure().unwrap().name, failing_name);
    }
}

#[tokio::test]
async fn results_are_reported_in_topological_order() {
    let calls: Calls = Arc::default();
    let graph = TaskGraph::builder("ordered")
        .task("report", recording_action(Arc::clone(&calls), Some("extract".into())), &["transform"])
        .task("transform", recording_action(Arc::clone(&calls), Some("extract".into())), &["extract"])
        .task("extract", recording_action(Arc::clone(&calls), Some("extract".into())), &[])
        .build()
        .unwrap();

    let run = Engine::default().execute(&graph, date(), CancellationToken::new()).await;

    let order: Vec<&str> = run.tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(order, ["extract", "transform", "report"]);
    assert_eq!(run.skipped().count(), 2);
}

#[tokio::test]
async fn independent_branches_run_concurrently() {
    // Each branch waits for the other; this only completes if both are in flight at once
    let barrier = Arc::new(Barrier::new(2));
    let branch = |barrier: Arc<Barrier>, rows: usize| {
        FnAction::new(move |_ctx: TaskContext| {
            let barrier = Arc::clone(&barrier);
            async move {
                barrier.wait().await;
                Ok(Some(TaskOutput::RowCount(rows)))
            }
        })
    };
    let graph = TaskGraph::builder("fan")
        .task("root", FnAction::new(|_ctx: TaskContext| async { Ok(None) }), &[])
        .task("left", branch(Arc::clone(&barrier), 1), &["root"])
        .task("right", branch(Arc::clone(&barrier), 2), &["root"])
        .task(
            "join",
            FnAction::new(|ctx: TaskContext| async move {
                match (ctx.upstream.get("left"), ctx.upstream.get("right")) {
                    (Some(TaskOutput::RowCount(1)), Some(TaskOutput::RowCount(2))) => {
                        Ok(Some(TaskOutput::RowCount(3)))
                    }
                    _ => Err(TaskError::new("fan-in missing an upstream output")),
                }
            }),
            &["left", "right"],
        )
        .build()
        .unwrap();

    let run = tokio::time::timeout(
        Duration::from_secs(5),
        Engine::default().execute(&graph, date(), CancellationToken::new()),
    )
    .await
    .expect("branches deadlocked");

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.status_of("join"), Some(TaskStatus::Succeeded));
    assert!(matches!(run.get("join").unwrap().output, Some(TaskOutput::RowCount(3))));
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut builder = TaskGraph::builder("wide");
    for i in 0..8 {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        builder = builder.task(
            format!("task{}", i),
            FnAction::new(move |_ctx: TaskContext| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(None)
                }
            }),
            &[],
        );
    }
    let graph = builder.build().unwrap();
    let engine = Engine::new(EngineConfig {
        max_concurrency: 2,
        ..EngineConfig::default()
    });

    let run = engine.execute(&graph, date(), CancellationToken::new()).await;

    assert_eq!(run.status, RunStatus::Succeeded);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn cancellation_lets_in_flight_finish_and_skips_pending() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let graph = TaskGraph::builder("cancel")
        .task(
            "slow",
            FnAction::new(move |_ctx: TaskContext| {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(None)
                }
            }),
            &[],
        )
        .task("next", FnAction::new(|_ctx: TaskContext| async { Ok(None) }), &["slow"])
        .task("last", FnAction::new(|_ctx: TaskContext| async { Ok(None) }), &["next"])
        .build()
        .unwrap();

    let run = Engine::default().execute(&graph, date(), cancel).await;

    assert_eq!(run.status_of("slow"), Some(TaskStatus::Succeeded));
    for name in ["next", "last"] {
        let record = run.get(name).unwrap();
        assert_eq!(record.status, TaskStatus::Skipped);
        assert_eq!(record.error.as_deref(), Some("run cancelled"));
    }
    assert_eq!(run.status, RunStatus::Failed);
}

#[test]
fn cyclic_graphs_are_rejected_at_construction() {
    let calls: Calls = Arc::default();
    let err = TaskGraph::builder("cyclic")
        .task("a", recording_action(Arc::clone(&calls), None), &["b"])
        .task("b", recording_action(Arc::clone(&calls), None), &["a"])
        .build()
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cycle { .. }));
    assert!(err.to_string().contains("a, b"));
}
