// Orchestration core: task graph, engine and the daily pipeline's tasks

pub mod daily;
pub mod engine;
pub mod graph;
pub mod ingestion;
pub mod processing;
pub mod run;
pub mod steps;
pub mod storage;
pub mod task;

pub use engine::{Engine, EngineConfig};
pub use graph::{TaskGraph, TaskGraphBuilder};
pub use run::{Run, RunStatus, TaskReportLine};
pub use task::{FnAction, TaskAction, TaskContext, TaskError, TaskOutput, TaskRecord, TaskStatus};
