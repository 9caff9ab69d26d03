//! Decoded OTLP batch types: the boundary a receiver hands to an
//! analyzer. Restricted to the fields the analyzers in §4.5 actually
//! consume — not a full OTLP protobuf surface (out of scope, §1).
//!
//! Shapes mirror the OTLP/HTTP JSON export-request encoding closely
//! enough that `receivers::otlp_http` can deserialize straight into
//! them, but field names are simplified (no `Value`-oneof wrapper) to
//! keep the analyzer code free of wire-format noise.

use serde::Deserialize;

fn default_attrs() -> Vec<Attribute> {
    Vec::new()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Resource {
    #[serde(default = "default_attrs")]
    pub attributes: Vec<Attribute>,
}

impl Resource {
    pub fn service_name(&self) -> Option<String> {
        self.attributes
            .iter()
            .find(|a| a.key == "service.name")
            .map(|a| a.value.clone())
    }
}

// ---- Metrics --------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsBatch {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceMetrics {
    #[serde(default)]
    pub resource: Resource,
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeMetrics {
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(rename = "type")]
    pub metric_type: String,
    #[serde(default = "default_attrs")]
    pub data_points: Vec<DataPoint>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DataPoint {
    #[serde(default = "default_attrs")]
    pub attributes: Vec<Attribute>,
}

// ---- Traces -----------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TracesBatch {
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSpans {
    #[serde(default)]
    pub resource: Resource,
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeSpans {
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Span {
    pub name: String,
    #[serde(default)]
    pub kind: u8,
    #[serde(default = "default_attrs")]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub events: Vec<SpanEvent>,
    #[serde(default)]
    pub links: Vec<SpanLink>,
    #[serde(default)]
    pub status: SpanStatus,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SpanStatus {
    #[serde(default = "default_status_code")]
    pub code: String,
}

fn default_status_code() -> String {
    "STATUS_CODE_UNSET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    #[serde(default = "default_attrs")]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SpanLink {
    #[serde(default = "default_attrs")]
    pub attributes: Vec<Attribute>,
}

// ---- Logs ---------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LogsBatch {
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceLogs {
    #[serde(default)]
    pub resource: Resource,
    pub scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeLogs {
    pub log_records: Vec<LogRecord>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogRecord {
    #[serde(default)]
    pub severity_text: Option<String>,
    #[serde(default)]
    pub severity_number: i32,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default = "default_attrs")]
    pub attributes: Vec<Attribute>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_read_from_resource_attributes() {
        let resource = Resource {
            attributes: vec![Attribute {
                key: "service.name".to_string(),
                value: "checkout".to_string(),
            }],
        };
        assert_eq!(resource.service_name(), Some("checkout".to_string()));
    }

    #[test]
    fn service_name_absent_is_none() {
        let resource = Resource::default();
        assert_eq!(resource.service_name(), None);
    }

    #[test]
    fn metrics_batch_deserializes_from_json() {
        let json = r#"{
            "resource_metrics": [{
                "resource": {"attributes": [{"key": "service.name", "value": "api"}]},
                "scope_metrics": [{
                    "metrics": [{
                        "name": "http_requests_total",
                        "description": "count",
                        "unit": "1",
                        "type": "Sum",
                        "data_points": [{"attributes": [{"key": "status_code", "value": "200"}]}]
                    }]
                }]
            }]
        }"#;
        let batch: MetricsBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.resource_metrics.len(), 1);
        let metric = &batch.resource_metrics[0].scope_metrics[0].metrics[0];
        assert_eq!(metric.name, "http_requests_total");
        assert_eq!(metric.data_points.len(), 1);
    }
}
