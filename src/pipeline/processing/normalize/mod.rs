use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::constants::{
    CONNECTIONS_FIELD, CONNECTION_PREFIX, CORE_CONNECTION_FIELDS, INSERT_DATETIME_COLUMN,
    LAST_VERIFIED_COLUMN, PARENT_FIELDS,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::ingestion::RawPayload;
use crate::pipeline::processing::rows::{Row, RowSet, Value};

/// Trait for flattening a raw provider payload into a row set
pub trait Normalizer: Send + Sync {
    /// Flatten `payload`, stamping every row with `ingested_at`
    fn normalize_at(&self, payload: &RawPayload, ingested_at: DateTime<Utc>) -> Result<RowSet>;

    /// Flatten `payload` using the current UTC time as the ingestion timestamp
    fn normalize(&self, payload: &RawPayload) -> Result<RowSet> {
        self.normalize_at(payload, Utc::now())
    }
}

/// Emits one row per connection, carrying the parent point-of-interest fields onto each.
#[derive(Debug, Default, Clone)]
pub struct ConnectionNormalizer;

impl ConnectionNormalizer {
    pub fn new() -> Self {
        Self
    }

    fn parent_columns(&self, record: &Map<String, JsonValue>) -> Vec<(String, Value)> {
        PARENT_FIELDS
            .iter()
            .map(|path| {
                let column = path.join("_");
                let raw = lookup(record, path);
                let value = if column == LAST_VERIFIED_COLUMN {
                    raw.and_then(JsonValue::as_str)
                        .and_then(parse_timestamp)
                        .map(Value::Timestamp)
                        .unwrap_or(Value::Null)
                } else {
                    raw.map(Value::from_json).unwrap_or(Value::Null)
                };
                (column, value)
            })
            .collect()
    }
}

impl Normalizer for ConnectionNormalizer {
    fn normalize_at(&self, payload: &RawPayload, ingested_at: DateTime<Utc>) -> Result<RowSet> {
        let mut rows: Vec<Row> = Vec::new();
        let mut seen_columns: Vec<String> = CORE_CONNECTION_FIELDS
            .iter()
            .map(|f| format!("{CONNECTION_PREFIX}{f}"))
            .collect();
        let mut seen: HashSet<String> = seen_columns.iter().cloned().collect();

        for (index, item) in payload.iter().enumerate() {
            let record = item.as_object().ok_or_else(|| {
                PipelineError::Normalization(format!("record {index} is not a JSON object"))
            })?;

            let connections = match record.get(CONNECTIONS_FIELD) {
                None => {
                    return Err(PipelineError::Normalization(format!(
                        "record {index} has no '{CONNECTIONS_FIELD}' collection"
                    )))
                }
                Some(JsonValue::Null) => continue,
                Some(JsonValue::Array(items)) => items,
                Some(other) => {
                    return Err(PipelineError::Normalization(format!(
                        "record {index} has a non-array '{CONNECTIONS_FIELD}' field: {other}"
                    )))
                }
            };

            if connections.is_empty() {
                continue;
            }

            let parent = self.parent_columns(record);

            for (conn_index, connection) in connections.iter().enumerate() {
                let conn = connection.as_object().ok_or_else(|| {
                    PipelineError::Normalization(format!(
                        "record {index} connection {conn_index} is not a JSON object"
                    ))
                })?;

                let mut row = Row::new();
                flatten_into(&mut row, CONNECTION_PREFIX.trim_end_matches('_'), conn);
                for column in row.keys() {
                    if seen.insert(column.clone()) {
                        seen_columns.push(column.clone());
                    }
                }
                for (column, value) in &parent {
                    row.insert(column.clone(), value.clone());
                }
                row.insert(
                    INSERT_DATETIME_COLUMN.to_string(),
                    Value::Timestamp(ingested_at),
                );
                rows.push(row);
            }
        }

        // Connection fields are sorted per object; keep the first-seen order across objects.
        let mut set = RowSet::with_columns(seen_columns);
        for path in PARENT_FIELDS {
            set.declare_column(path.join("_"));
        }
        set.declare_column(INSERT_DATETIME_COLUMN);
        for row in rows {
            set.push(row);
        }
        Ok(set)
    }
}

/// Follow a nested field path; `None` when any segment is absent or not an object.
fn lookup<'a>(record: &'a Map<String, JsonValue>, path: &[&str]) -> Option<&'a JsonValue> {
    let (last, parents) = path.split_last()?;
    let mut current = record;
    for segment in parents {
        current = current.get(*segment)?.as_object()?;
    }
    current.get(*last)
}

/// Flatten nested objects into `prefix_key_subkey` columns. Dots in keys become underscores.
fn flatten_into(row: &mut Row, prefix: &str, object: &Map<String, JsonValue>) {
    for (key, value) in object {
        let column = format!("{prefix}_{}", key.replace('.', "_"));
        match value {
            JsonValue::Object(nested) => flatten_into(row, &column, nested),
            other => {
                row.insert(column, Value::from_json(other));
            }
        }
    }
}

/// Parse the provider's verification date; anything unparseable yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn station(id: i64, connections: JsonValue) -> JsonValue {
        json!({
            "ID": id,
            "UUID": format!("uuid-{id}"),
            "UsageCost": "£0.79/kWh",
            "NumberOfPoints": 2,
            "OperatorInfo": { "Title": "Source London" },
            "UsageType": { "Title": "Public" },
            "AddressInfo": {
                "Title": "Finsbury Circus",
                "AddressLine1": "Finsbury Circus",
                "Town": "London",
                "Postcode": "EC2M 7EB",
                "Latitude": 51.5176,
                "Longitude": -0.0871,
                "Country": { "Title": "United Kingdom" }
            },
            "DateLastVerified": "2024-03-01T09:30:00Z",
            "Connections": connections
        })
    }

    #[test]
    fn emits_one_row_per_connection() {
        let payload = vec![
            station(1, json!([
                { "ID": 10, "PowerKW": 7.0, "ConnectionType": { "Title": "Type 2" } },
                { "ID": 11, "PowerKW": 22.0 }
            ])),
            station(2, json!([])),
            station(3, json!([{ "ID": 30 }])),
        ];

        let rows = ConnectionNormalizer::new().normalize(&payload).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows.value(0, "conn_ID"), &Value::Int(10));
        assert_eq!(rows.value(0, "conn_ConnectionType_Title"), &Value::from("Type 2"));
        assert_eq!(rows.value(1, "ID"), &Value::Int(1));
        assert_eq!(rows.value(2, "ID"), &Value::Int(3));
        assert_eq!(rows.value(2, "conn_PowerKW"), &Value::Null);
        assert_eq!(rows.value(0, "AddressInfo_Country_Title"), &Value::from("United Kingdom"));
    }

    #[test]
    fn missing_parent_fields_become_null() {
        let payload = vec![json!({
            "ID": 5,
            "AddressInfo": { "Town": "London" },
            "Connections": [{ "ID": 50 }]
        })];

        let rows = ConnectionNormalizer::new().normalize(&payload).unwrap();

        assert_eq!(rows.value(0, "AddressInfo_Town"), &Value::from("London"));
        assert_eq!(rows.value(0, "AddressInfo_Latitude"), &Value::Null);
        assert_eq!(rows.value(0, "OperatorInfo_Title"), &Value::Null);
        assert_eq!(rows.value(0, "AddressInfo_Country_Title"), &Value::Null);
        assert!(rows.has_column("UsageType_Title"));
    }

    #[test]
    fn ingestion_timestamp_is_shared_by_all_rows() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let payload = vec![station(1, json!([{ "ID": 1 }, { "ID": 2 }]))];

        let rows = ConnectionNormalizer::new().normalize_at(&payload, at).unwrap();

        for value in rows.column_values(INSERT_DATETIME_COLUMN) {
            assert_eq!(value, &Value::Timestamp(at));
        }
    }

    #[test]
    fn unparseable_verification_date_becomes_null() {
        let mut record = station(1, json!([{ "ID": 1 }]));
        record["DateLastVerified"] = json!("last tuesday");
        let rows = ConnectionNormalizer::new().normalize(&vec![record]).unwrap();
        assert_eq!(rows.value(0, LAST_VERIFIED_COLUMN), &Value::Null);

        let rows = ConnectionNormalizer::new()
            .normalize(&vec![station(1, json!([{ "ID": 1 }]))])
            .unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(rows.value(0, LAST_VERIFIED_COLUMN), &Value::Timestamp(expected));
    }

    #[test]
    fn missing_connections_collection_is_an_error() {
        let payload = vec![json!({ "ID": 1 })];
        let err = ConnectionNormalizer::new().normalize(&payload).unwrap_err();
        assert!(matches!(err, PipelineError::Normalization(_)));
    }

    #[test]
    fn null_connections_contribute_no_rows() {
        let payload = vec![station(1, JsonValue::Null), station(2, json!([{ "ID": 9 }]))];
        let rows = ConnectionNormalizer::new().normalize(&payload).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn empty_payload_keeps_the_declared_schema() {
        let rows = ConnectionNormalizer::new().normalize(&Vec::new()).unwrap();
        assert!(rows.is_empty());
        assert!(rows.has_column("conn_ID"));
        assert!(rows.has_column("ID"));
        assert!(rows.has_column(INSERT_DATETIME_COLUMN));
    }

    #[test]
    fn parses_common_timestamp_shapes() {
        assert!(parse_timestamp("2024-03-01T09:30:00Z").is_some());
        assert!(parse_timestamp("2024-03-01T09:30:00").is_some());
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("").is_none());
    }
}
