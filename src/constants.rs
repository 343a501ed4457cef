/// Task names of the daily graph, shared by the graph builder, reports and tests
pub const EXTRACT_TASK: &str = "run_ev_extraction";
pub const LOAD_LANDING_TASK: &str = "load_to_landing";
pub const LANDING_COLUMNS_TASK: &str = "check_landing_columns";
pub const LANDING_DUPLICATES_TASK: &str = "check_landing_duplicates";
pub const TRANSFORM_TASK: &str = "transform_to_target";
pub const TARGET_QUALITY_TASK: &str = "check_target_data_quality";
pub const ARCHIVE_TASK: &str = "archive_source_artifact";

pub const DEFAULT_PIPELINE_NAME: &str = "ev_charging_points_daily";

// Provider defaults: central London, 5 km
pub const DEFAULT_ENDPOINT: &str = "https://api.openchargemap.io/v3/poi/";
pub const DEFAULT_API_KEY_SECRET: &str = "openchargemap_api_key";
pub const DEFAULT_LATITUDE: f64 = 51.5145215458141;
pub const DEFAULT_LONGITUDE: f64 = -0.09063526851277263;
pub const DEFAULT_DISTANCE: f64 = 5.0;
pub const DEFAULT_DISTANCE_UNIT: &str = "km";
pub const DEFAULT_MAX_RESULTS: u32 = 50_000;

// Staging defaults
pub const DEFAULT_LANDING_TABLE: &str = "central_london_ev_charging_points_landing";
pub const DEFAULT_TARGET_TABLE: &str = "central_london_ev_charging_points_target";
pub const DEFAULT_TRANSFORM_PROCEDURE: &str = "sp_transform_ev_data";
pub const DEFAULT_SOURCE_ARTIFACT: &str = "data/ev_charging_data_normalized.csv";
pub const DEFAULT_ARCHIVE_TEMPLATE: &str = "archive/ev_charging_data_{ds}.csv";
pub const RUN_DATE_PLACEHOLDER: &str = "{ds}";

// Normalized column naming
pub const CONNECTIONS_FIELD: &str = "Connections";
pub const CONNECTION_PREFIX: &str = "conn_";
pub const INSERT_DATETIME_COLUMN: &str = "insert_datetime";
pub const LAST_VERIFIED_COLUMN: &str = "DateLastVerified";

/// Parent fields carried onto every connection row, as nested paths
pub const PARENT_FIELDS: &[&[&str]] = &[
    &["ID"],
    &["UUID"],
    &["UsageCost"],
    &["NumberOfPoints"],
    &["OperatorInfo", "Title"],
    &["UsageType", "Title"],
    &["AddressInfo", "Title"],
    &["AddressInfo", "AddressLine1"],
    &["AddressInfo", "Town"],
    &["AddressInfo", "Postcode"],
    &["AddressInfo", "Latitude"],
    &["AddressInfo", "Longitude"],
    &["AddressInfo", "Country", "Title"],
    &["DateLastVerified"],
];

/// Connection fields always present in the landing schema, even when the provider omits them
pub const CORE_CONNECTION_FIELDS: &[&str] = &[
    "ID",
    "ConnectionTypeID",
    "StatusTypeID",
    "LevelID",
    "Amps",
    "Voltage",
    "PowerKW",
    "CurrentTypeID",
    "Quantity",
];

/// Reason recorded on tasks that never ran because an upstream task did not succeed
pub const UPSTREAM_FAILURE_REASON: &str = "upstream failure";
/// Reason recorded on tasks that never ran because the run was cancelled
pub const RUN_CANCELLED_REASON: &str = "run cancelled";
