// Task adapters: each step wraps one collaborator behind the TaskAction interface

pub mod archive;
pub mod extract;
pub mod load;
pub mod quality_gate;
pub mod transform;
pub mod value_check;

pub use archive::ArchiveStep;
pub use extract::ExtractStep;
pub use load::LoadStep;
pub use quality_gate::QualityGateStep;
pub use transform::TransformStep;
pub use value_check::{duplicate_count_sql, ValueCheckStep};
