// Pipeline ingestion: fetching raw charge point records from the provider

pub mod extractor;

pub use extractor::{Extractor, FetchParams};

/// Raw provider payload: one JSON object per charging location.
pub type RawPayload = Vec<serde_json::Value>;
