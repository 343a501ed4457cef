use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::app::ports::HttpClientPort;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::ingestion::RawPayload;

/// Geographic query sent to the provider
#[derive(Debug, Clone, PartialEq)]
pub struct FetchParams {
    pub latitude: f64,
    pub longitude: f64,
    pub distance: f64,
    pub distance_unit: String,
    pub max_results: u32,
}

/// Fetches point-of-interest records from the charge point provider
pub struct Extractor {
    http: Arc<dyn HttpClientPort>,
    endpoint: String,
}

impl Extractor {
    pub fn new(http: Arc<dyn HttpClientPort>, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Query string for one fetch, in the order the provider documents it.
    pub fn query(api_key: &str, params: &FetchParams) -> Vec<(String, String)> {
        vec![
            ("key".to_string(), api_key.to_string()),
            ("latitude".to_string(), params.latitude.to_string()),
            ("longitude".to_string(), params.longitude.to_string()),
            ("distance".to_string(), params.distance.to_string()),
            ("distanceunit".to_string(), params.distance_unit.clone()),
            ("maxresults".to_string(), params.max_results.to_string()),
            ("output".to_string(), "json".to_string()),
        ]
    }

    /// Perform a single GET and decode the JSON array of records.
    ///
    /// Only HTTP 200 counts as success. An empty array is returned as-is; the
    /// caller decides whether that is fatal.
    pub async fn fetch(&self, api_key: &str, params: &FetchParams) -> Result<RawPayload> {
        let started = Instant::now();
        info!(
            "🌐 Fetching charge points within {} {} of ({}, {})",
            params.distance, params.distance_unit, params.latitude, params.longitude
        );

        let query = Self::query(api_key, params);
        let response = match self.http.get(&self.endpoint, &query).await {
            Ok(response) => response,
            Err(e) => {
                metrics::extract::request_error(0);
                return Err(PipelineError::Extraction {
                    status: 0,
                    message: format!("request to {} failed: {}", self.endpoint, e),
                });
            }
        };

        if response.status != 200 {
            warn!("❌ Provider returned HTTP {}", response.status);
            metrics::extract::request_error(response.status);
            let body = String::from_utf8_lossy(&response.bytes);
            let snippet: String = body.chars().take(200).collect();
            return Err(PipelineError::Extraction {
                status: response.status,
                message: format!("unexpected status from provider: {}", snippet.trim()),
            });
        }

        let decoded: serde_json::Value = serde_json::from_slice(&response.bytes).map_err(|e| {
            PipelineError::Extraction {
                status: response.status,
                message: format!("response body is not valid JSON: {}", e),
            }
        })?;

        let records = match decoded {
            serde_json::Value::Array(records) => records,
            other => {
                return Err(PipelineError::Extraction {
                    status: response.status,
                    message: format!("expected a JSON array of records, got {}", json_kind(&other)),
                })
            }
        };

        let secs = started.elapsed().as_secs_f64();
        metrics::extract::request_success(secs, records.len());
        debug!(content_type = %response.content_type, bytes = response.bytes.len(), "provider response decoded");
        info!("✅ Fetched {} records in {:.2}s", records.len(), secs);
        Ok(records)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedHttp {
        status: u16,
        body: &'static str,
        seen: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl CannedHttp {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClientPort for CannedHttp {
        async fn get(&self, url: &str, query: &[(String, String)]) -> std::result::Result<HttpGetResult, String> {
            self.seen.lock().unwrap().push((url.to_string(), query.to_vec()));
            Ok(HttpGetResult {
                status: self.status,
                bytes: self.body.as_bytes().to_vec(),
                content_type: "application/json".to_string(),
            })
        }
    }

    struct BrokenHttp;

    #[async_trait]
    impl HttpClientPort for BrokenHttp {
        async fn get(&self, _url: &str, _query: &[(String, String)]) -> std::result::Result<HttpGetResult, String> {
            Err("connection refused".to_string())
        }
    }

    fn params() -> FetchParams {
        FetchParams {
            latitude: 51.5,
            longitude: -0.09,
            distance: 5.0,
            distance_unit: "km".to_string(),
            max_results: 50_000,
        }
    }

    #[tokio::test]
    async fn sends_documented_query_parameters() {
        let http = Arc::new(CannedHttp::new(200, r#"[{"ID": 1}]"#));
        let extractor = Extractor::new(http.clone(), "https://provider.test/poi/");

        let records = extractor.fetch("secret", &params()).await.unwrap();
        assert_eq!(records.len(), 1);

        let seen = http.seen.lock().unwrap();
        let (url, query) = &seen[0];
        assert_eq!(url, "https://provider.test/poi/");
        let keys: Vec<&str> = query.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            ["key", "latitude", "longitude", "distance", "distanceunit", "maxresults", "output"]
        );
        assert!(query.contains(&("key".to_string(), "secret".to_string())));
        assert!(query.contains(&("output".to_string(), "json".to_string())));
        assert!(query.contains(&("maxresults".to_string(), "50000".to_string())));
    }

    #[tokio::test]
    async fn empty_array_is_not_an_error() {
        let extractor = Extractor::new(Arc::new(CannedHttp::new(200, "[]")), "u");
        assert!(extractor.fetch("k", &params()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_200_status_is_extraction_error() {
        let extractor = Extractor::new(Arc::new(CannedHttp::new(401, "bad key")), "u");
        match extractor.fetch("k", &params()).await {
            Err(PipelineError::Extraction { status, message }) => {
                assert_eq!(status, 401);
                assert!(message.contains("bad key"));
            }
            other => panic!("expected extraction error, got {:?}", other),
        }

        // Other 2xx codes are still rejected
        let extractor = Extractor::new(Arc::new(CannedHttp::new(204, "")), "u");
        assert!(matches!(
            extractor.fetch("k", &params()).await,
            Err(PipelineError::Extraction { status: 204, .. })
        ));
    }

    #[tokio::test]
    async fn non_array_body_is_extraction_error() {
        let extractor = Extractor::new(Arc::new(CannedHttp::new(200, r#"{"error": "x"}"#)), "u");
        let err = extractor.fetch("k", &params()).await.unwrap_err();
        assert!(err.to_string().contains("an object"));
    }

    #[tokio::test]
    async fn transport_failure_reports_status_zero() {
        let extractor = Extractor::new(Arc::new(BrokenHttp), "u");
        assert!(matches!(
            extractor.fetch("k", &params()).await,
            Err(PipelineError::Extraction { status: 0, .. })
        ));
    }
}
