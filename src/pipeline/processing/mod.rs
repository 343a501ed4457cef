// Data processing: flat rows, normalization and quality checks

pub mod normalize;
pub mod quality_gate;
pub mod rows;

pub use normalize::{ConnectionNormalizer, Normalizer};
pub use quality_gate::{CheckResult, CheckSpec, QualityGate, QualityReport};
pub use rows::{Row, RowSet, Value};
