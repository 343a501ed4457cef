//! Flat tabular rows shared by the normalizer, the quality gate and the stores.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// A scalar cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used by range checks. Text that parses as a number counts;
    /// NaN and infinities do not.
    pub fn as_f64(&self) -> Option<f64> {
        let number = match self {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Text(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        number.is_finite().then_some(number)
    }

    /// Key used for distinct comparisons; `None` for nulls.
    ///
    /// Integral floats share a key with the equal integer, mirroring SQL equality.
    pub fn distinct_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(format!("b:{b}")),
            Value::Int(i) => Some(format!("n:{i}")),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some(format!("n:{}", *f as i64))
            }
            Value::Float(f) => Some(format!("f:{}", f.to_bits())),
            Value::Text(s) => Some(format!("s:{s}")),
            Value::Timestamp(ts) => Some(format!("t:{}", ts.timestamp_nanos_opt().unwrap_or_default())),
        }
    }

    /// Convert a JSON scalar into a cell value. Arrays and objects are kept as JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    /// Text rendering used for CSV output; nulls become empty cells.
    pub fn to_csv_field(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Timestamp(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// One flat record: column name to value. Columns missing from the map read as null.
pub type Row = HashMap<String, Value>;

/// An ordered sequence of rows sharing a column schema.
///
/// The schema is the declared columns followed by every other column in the
/// order it was first seen.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl RowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a row set with a declared schema.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for column in columns {
            set.declare_column(column);
        }
        set
    }

    pub fn declare_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    pub fn push(&mut self, row: Row) {
        let mut new_columns: Vec<&String> = row
            .keys()
            .filter(|k| !self.columns.contains(*k))
            .collect();
        // HashMap iteration order is arbitrary; keep the schema stable.
        new_columns.sort();
        let new_columns: Vec<String> = new_columns.into_iter().cloned().collect();
        self.columns.extend(new_columns);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `index`, null when the row lacks the field.
    pub fn value(&self, index: usize, column: &str) -> &Value {
        self.rows
            .get(index)
            .and_then(|row| row.get(column))
            .unwrap_or(&Value::Null)
    }

    /// Every row's value for `column`, in row order.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(column).unwrap_or(&Value::Null))
    }

    /// Write the row set as CSV with a header line, nulls as empty cells.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(self.columns.iter().map(|c| {
                row.get(c).map(Value::to_csv_field).unwrap_or_default()
            }))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn schema_is_union_of_fields_in_first_seen_order() {
        let mut set = RowSet::with_columns(["ID"]);
        set.push(row(&[("ID", Value::Int(1)), ("b", Value::Null)]));
        set.push(row(&[("ID", Value::Int(2)), ("a", Value::Int(3)), ("c", Value::Int(4))]));

        assert_eq!(set.columns(), &["ID", "b", "a", "c"]);
        assert_eq!(set.value(0, "a"), &Value::Null);
        assert_eq!(set.value(1, "a"), &Value::Int(3));
    }

    #[test]
    fn integral_float_and_int_share_distinct_key() {
        assert_eq!(Value::Int(7).distinct_key(), Value::Float(7.0).distinct_key());
        assert_ne!(Value::Float(7.5).distinct_key(), Value::Int(7).distinct_key());
        assert_eq!(Value::Null.distinct_key(), None);
    }

    #[test]
    fn csv_output_renders_nulls_as_empty_cells() {
        let mut set = RowSet::with_columns(["ID", "Town"]);
        set.push(row(&[("ID", Value::Int(1)), ("Town", Value::from("London"))]));
        set.push(row(&[("ID", Value::Int(2))]));

        let mut out = Vec::new();
        set.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "ID,Town\n1,London\n2,\n");
    }
}
