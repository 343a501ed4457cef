use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::processing::rows::RowSet;

/// A declarative data-quality rule bound to one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckSpec {
    /// Number of null cells must equal `expected`
    NullCountEquals { column: String, expected: u64 },
    /// Smallest non-null value must be strictly greater than `threshold`
    MinGreaterThan { column: String, threshold: f64 },
    /// Largest non-null value must be strictly less than `threshold`
    MaxLessThan { column: String, threshold: f64 },
    /// Smallest non-null value must be at least `threshold`
    MinAtLeast { column: String, threshold: f64 },
    /// Non-null values must be pairwise distinct
    Uniqueness { column: String },
}

impl CheckSpec {
    pub fn null_count_equals(column: impl Into<String>, expected: u64) -> Self {
        CheckSpec::NullCountEquals { column: column.into(), expected }
    }

    pub fn min_greater_than(column: impl Into<String>, threshold: f64) -> Self {
        CheckSpec::MinGreaterThan { column: column.into(), threshold }
    }

    pub fn max_less_than(column: impl Into<String>, threshold: f64) -> Self {
        CheckSpec::MaxLessThan { column: column.into(), threshold }
    }

    pub fn min_at_least(column: impl Into<String>, threshold: f64) -> Self {
        CheckSpec::MinAtLeast { column: column.into(), threshold }
    }

    pub fn uniqueness(column: impl Into<String>) -> Self {
        CheckSpec::Uniqueness { column: column.into() }
    }

    pub fn column(&self) -> &str {
        match self {
            CheckSpec::NullCountEquals { column, .. }
            | CheckSpec::MinGreaterThan { column, .. }
            | CheckSpec::MaxLessThan { column, .. }
            | CheckSpec::MinAtLeast { column, .. }
            | CheckSpec::Uniqueness { column } => column.as_str(),
        }
    }
}

impl fmt::Display for CheckSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckSpec::NullCountEquals { column, expected } => {
                write!(f, "null_count_equals({column}, {expected})")
            }
            CheckSpec::MinGreaterThan { column, threshold } => {
                write!(f, "min_greater_than({column}, {threshold})")
            }
            CheckSpec::MaxLessThan { column, threshold } => {
                write!(f, "max_less_than({column}, {threshold})")
            }
            CheckSpec::MinAtLeast { column, threshold } => {
                write!(f, "min_at_least({column}, {threshold})")
            }
            CheckSpec::Uniqueness { column } => write!(f, "uniqueness({column})"),
        }
    }
}

/// Outcome of one check: pass/fail plus the metric that decided it
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub check: CheckSpec,
    pub passed: bool,
    /// Null count, min, max or duplicate count; `None` when no value was observed
    pub observed: Option<f64>,
    pub message: String,
}

/// Ordered check results of one gate evaluation
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub rows_evaluated: usize,
    pub results: Vec<CheckResult>,
    pub evaluated_at: DateTime<Utc>,
}

impl QualityReport {
    /// Gate status: the AND of every check
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// One-line description of the failing checks
    pub fn failure_summary(&self) -> String {
        self.failures()
            .map(|r| format!("{}: {}", r.check, r.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A named set of checks evaluated together
#[derive(Debug, Clone)]
pub struct QualityGate {
    pub name: String,
    pub checks: Vec<CheckSpec>,
}

impl QualityGate {
    pub fn new(name: impl Into<String>, checks: Vec<CheckSpec>) -> Self {
        Self { name: name.into(), checks }
    }

    pub fn evaluate(&self, rows: &RowSet) -> QualityReport {
        evaluate(rows, &self.checks)
    }
}

/// Evaluate every check against `rows`, in order
pub fn evaluate(rows: &RowSet, checks: &[CheckSpec]) -> QualityReport {
    QualityReport {
        rows_evaluated: rows.len(),
        results: checks.iter().map(|check| evaluate_check(rows, check)).collect(),
        evaluated_at: Utc::now(),
    }
}

enum Extreme {
    Min,
    Max,
}

fn evaluate_check(rows: &RowSet, check: &CheckSpec) -> CheckResult {
    let column = check.column();
    if !rows.is_empty() && !rows.has_column(column) {
        return CheckResult {
            check: check.clone(),
            passed: false,
            observed: None,
            message: format!("column '{column}' not found"),
        };
    }

    match check {
        CheckSpec::NullCountEquals { expected, .. } => {
            let nulls = rows.column_values(column).filter(|v| v.is_null()).count() as u64;
            CheckResult {
                check: check.clone(),
                passed: nulls == *expected,
                observed: Some(nulls as f64),
                message: format!("{nulls} null value(s), expected {expected}"),
            }
        }
        CheckSpec::MinGreaterThan { threshold, .. } => {
            range_check(rows, check, Extreme::Min, |min| min > *threshold)
        }
        CheckSpec::MaxLessThan { threshold, .. } => {
            range_check(rows, check, Extreme::Max, |max| max < *threshold)
        }
        CheckSpec::MinAtLeast { threshold, .. } => {
            range_check(rows, check, Extreme::Min, |min| min >= *threshold)
        }
        CheckSpec::Uniqueness { .. } => {
            let keys: Vec<String> = rows
                .column_values(column)
                .filter_map(|v| v.distinct_key())
                .collect();
            let distinct: HashSet<&String> = keys.iter().collect();
            let duplicates = keys.len() - distinct.len();
            CheckResult {
                check: check.clone(),
                passed: duplicates == 0,
                observed: Some(duplicates as f64),
                message: format!(
                    "{} non-null value(s), {} distinct",
                    keys.len(),
                    distinct.len()
                ),
            }
        }
    }
}

fn range_check(
    rows: &RowSet,
    check: &CheckSpec,
    extreme: Extreme,
    accept: impl Fn(f64) -> bool,
) -> CheckResult {
    let column = check.column();
    let mut observed: Option<f64> = None;

    for value in rows.column_values(column).filter(|v| !v.is_null()) {
        let Some(number) = value.as_f64() else {
            return CheckResult {
                check: check.clone(),
                passed: false,
                observed: None,
                message: format!("non-numeric value '{value}' in column '{column}'"),
            };
        };
        observed = Some(match (observed, &extreme) {
            (None, _) => number,
            (Some(current), Extreme::Min) => current.min(number),
            (Some(current), Extreme::Max) => current.max(number),
        });
    }

    match observed {
        // Nothing to violate the bound
        None => CheckResult {
            check: check.clone(),
            passed: true,
            observed: None,
            message: "no non-null values".to_string(),
        },
        Some(metric) => {
            let label = match extreme {
                Extreme::Min => "min",
                Extreme::Max => "max",
            };
            CheckResult {
                check: check.clone(),
                passed: accept(metric),
                observed: Some(metric),
                message: format!("observed {label} {metric}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::rows::{Row, Value};

    fn rows_of(column: &str, values: Vec<Value>) -> RowSet {
        let mut set = RowSet::with_columns([column]);
        for value in values {
            let mut row = Row::new();
            row.insert(column.to_string(), value);
            set.push(row);
        }
        set
    }

    #[test]
    fn null_count_fails_when_any_null_present() {
        let check = [CheckSpec::null_count_equals("ID", 0)];

        let report = evaluate(&rows_of("ID", vec![Value::Int(1), Value::Null]), &check);
        assert!(!report.passed());
        assert_eq!(report.results[0].observed, Some(1.0));

        let report = evaluate(&rows_of("ID", vec![Value::Int(1), Value::Int(2)]), &check);
        assert!(report.passed());
    }

    #[test]
    fn checks_pass_on_empty_row_set() {
        let checks = [
            CheckSpec::null_count_equals("ID", 0),
            CheckSpec::min_greater_than("lat", 50.0),
            CheckSpec::max_less_than("lat", 53.0),
            CheckSpec::min_at_least("power_kw", 0.0),
            CheckSpec::uniqueness("conn_ID"),
        ];
        let report = evaluate(&RowSet::new(), &checks);
        assert!(report.passed());
        assert_eq!(report.rows_evaluated, 0);
    }

    #[test]
    fn non_finite_values_fail_range_checks() {
        let check = [CheckSpec::min_greater_than("lat", 50.0)];
        for bad in ["NaN", "inf", "-inf"] {
            let report = evaluate(&rows_of("lat", vec![Value::Text(bad.into()), Value::Float(51.0)]), &check);
            assert!(!report.passed(), "{} should not pass", bad);
            assert!(report.results[0].message.contains("non-numeric"));
        }

        let report = evaluate(&rows_of("lat", vec![Value::Float(f64::NAN), Value::Float(51.0)]), &check);
        assert!(!report.passed());
    }

    #[test]
    fn min_greater_than_uses_strict_bound() {
        let check = [CheckSpec::min_greater_than("lat", 50.0)];

        let failing = evaluate(&rows_of("lat", vec![Value::Float(49.9), Value::Float(51.5)]), &check);
        assert!(!failing.passed());
        assert_eq!(failing.results[0].observed, Some(49.9));

        let passing = evaluate(&rows_of("lat", vec![Value::Float(50.1), Value::Float(51.5)]), &check);
        assert!(passing.passed());

        let boundary = evaluate(&rows_of("lat", vec![Value::Float(50.0)]), &check);
        assert!(!boundary.passed());
    }

    #[test]
    fn max_less_than_ignores_nulls() {
        let check = [CheckSpec::max_less_than("lon", 0.5)];
        let report = evaluate(
            &rows_of("lon", vec![Value::Null, Value::Float(-0.1), Value::Float(0.2)]),
            &check,
        );
        assert!(report.passed());
        assert_eq!(report.results[0].observed, Some(0.2));
    }

    #[test]
    fn min_at_least_accepts_equal_value() {
        let check = [CheckSpec::min_at_least("power_kw", 0.0)];
        assert!(evaluate(&rows_of("power_kw", vec![Value::Int(0), Value::Float(7.4)]), &check).passed());
        assert!(!evaluate(&rows_of("power_kw", vec![Value::Float(-1.0)]), &check).passed());
    }

    #[test]
    fn uniqueness_ignores_nulls_and_detects_repeats() {
        let check = [CheckSpec::uniqueness("conn_ID")];

        let with_nulls = rows_of("conn_ID", vec![Value::Int(1), Value::Null, Value::Null, Value::Int(2)]);
        assert!(evaluate(&with_nulls, &check).passed());

        let repeated = rows_of("conn_ID", vec![Value::Int(1), Value::Int(2), Value::Int(1)]);
        let report = evaluate(&repeated, &check);
        assert!(!report.passed());
        assert_eq!(report.results[0].observed, Some(1.0));
    }

    #[test]
    fn missing_column_fails_on_non_empty_rows() {
        let report = evaluate(
            &rows_of("ID", vec![Value::Int(1)]),
            &[CheckSpec::null_count_equals("station_id", 0)],
        );
        assert!(!report.passed());
        assert!(report.failure_summary().contains("not found"));
    }

    #[test]
    fn non_numeric_values_fail_range_checks() {
        let report = evaluate(
            &rows_of("lat", vec![Value::from("north")]),
            &[CheckSpec::min_greater_than("lat", 50.0)],
        );
        assert!(!report.passed());
    }

    #[test]
    fn gate_status_is_and_of_checks() {
        let rows = rows_of("lat", vec![Value::Float(51.0)]);
        let gate = QualityGate::new(
            "landing",
            vec![
                CheckSpec::min_greater_than("lat", 50.0),
                CheckSpec::max_less_than("lat", 51.0),
            ],
        );
        let report = gate.evaluate(&rows);
        assert_eq!(report.passed_count(), 1);
        assert!(!report.passed());
    }

    #[test]
    fn check_specs_deserialize_from_tagged_toml() {
        #[derive(Deserialize)]
        struct Checks {
            checks: Vec<CheckSpec>,
        }
        let parsed: Checks = toml::from_str(
            r#"
            [[checks]]
            kind = "null_count_equals"
            column = "ID"
            expected = 0

            [[checks]]
            kind = "min_greater_than"
            column = "AddressInfo_Latitude"
            threshold = 50.0
            "#,
        )
        .unwrap();
        assert_eq!(parsed.checks[0], CheckSpec::null_count_equals("ID", 0));
        assert_eq!(parsed.checks[1], CheckSpec::min_greater_than("AddressInfo_Latitude", 50.0));
    }
}
