//! Serializer (C7, spec §4.7): converts live aggregates into
//! snapshot-ready `Session` values. The per-type `to_serialized`/
//! `from_serialized` conversions live alongside each aggregate
//! (`aggregates::*`); this module is the `CreateSession` entry point
//! that ties them together with signal/service filtering and stats.

use std::collections::HashSet;

use crate::session::model::{Session, SessionData, SessionStats, SESSION_FORMAT_VERSION};
use crate::store::{ListFilter, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Metrics,
    Spans,
    Logs,
    Attributes,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Metrics => "metrics",
            SignalKind::Spans => "spans",
            SignalKind::Logs => "logs",
            SignalKind::Attributes => "attributes",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateSessionOptions {
    pub id: String,
    pub description: String,
    pub signals: HashSet<SignalKind>,
    pub services: Option<Vec<String>>,
}

fn service_matches(services_filter: &Option<Vec<String>>, entry_services: &std::collections::HashMap<String, u64>) -> bool {
    match services_filter {
        None => true,
        Some(wanted) => wanted.iter().any(|s| entry_services.contains_key(s)),
    }
}

/// `CreateSession(opts, live)`, spec §4.7.
pub fn create_session(opts: &CreateSessionOptions, store: &Store) -> Session {
    let mut data = SessionData::default();
    let mut stats = SessionStats::default();

    if opts.signals.contains(&SignalKind::Metrics) {
        let metrics: Vec<_> = store
            .list_metrics(&ListFilter::default())
            .into_iter()
            .filter(|m| service_matches(&opts.services, &m.services))
            .collect();
        stats.metrics_count = metrics.iter().map(|m| m.sample_count).sum();
        data.metrics = Some(metrics);
    }
    if opts.signals.contains(&SignalKind::Spans) {
        let spans: Vec<_> = store
            .list_spans(&ListFilter::default())
            .into_iter()
            .filter(|s| service_matches(&opts.services, &s.services))
            .collect();
        stats.spans_count = spans.iter().map(|s| s.sample_count).sum();
        data.spans = Some(spans);
    }
    if opts.signals.contains(&SignalKind::Logs) {
        let logs: Vec<_> = store
            .list_logs(&ListFilter::default())
            .into_iter()
            .filter(|l| service_matches(&opts.services, &l.services))
            .collect();
        stats.logs_count = logs.iter().map(|l| l.sample_count).sum();
        data.logs = Some(logs);
    }
    if opts.signals.contains(&SignalKind::Attributes) {
        let attributes = store.list_attributes(&ListFilter::default());
        stats.attributes_count = attributes.len() as u64;
        data.attributes = Some(attributes);
    }

    Session {
        version: SESSION_FORMAT_VERSION,
        id: opts.id.clone(),
        description: opts.description.clone(),
        created: chrono::Utc::now(),
        signals: opts.signals.iter().map(|s| s.as_str().to_string()).collect(),
        data,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::metric::{MetricDataPointUpdate, MetricType, MetricUpdate};
    use crate::config::CardinalityConfig;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn create_session_aggregates_stats_for_selected_signals() {
        let store = Store::new(&CardinalityConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        store
            .store_metric(
                &MetricUpdate {
                    name: "http_requests_total".to_string(),
                    description: String::new(),
                    unit: String::new(),
                    metric_type: MetricType::Sum,
                    data_points: vec![MetricDataPointUpdate {
                        label_values: vec![],
                        resource_attribute_values: vec![],
                        service_name: Some("api".to_string()),
                    }],
                },
                &cancel,
            )
            .unwrap();

        let mut signals = HashSet::new();
        signals.insert(SignalKind::Metrics);
        let opts = CreateSessionOptions {
            id: "snap-1".to_string(),
            description: "test".to_string(),
            signals,
            services: None,
        };
        let session = create_session(&opts, &store);
        assert_eq!(session.stats.metrics_count, 1);
        assert!(session.data.spans.is_none());
        assert_eq!(session.data.metrics.unwrap().len(), 1);
    }

    #[test]
    fn create_session_filters_by_service() {
        let store = Store::new(&CardinalityConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        store
            .store_metric(
                &MetricUpdate {
                    name: "m".to_string(),
                    description: String::new(),
                    unit: String::new(),
                    metric_type: MetricType::Gauge,
                    data_points: vec![MetricDataPointUpdate {
                        label_values: vec![],
                        resource_attribute_values: vec![],
                        service_name: Some("other".to_string()),
                    }],
                },
                &cancel,
            )
            .unwrap();

        let mut signals = HashSet::new();
        signals.insert(SignalKind::Metrics);
        let opts = CreateSessionOptions {
            id: "snap-1".to_string(),
            description: String::new(),
            signals,
            services: Some(vec!["api".to_string()]),
        };
        let session = create_session(&opts, &store);
        assert_eq!(session.stats.metrics_count, 0);
        assert!(session.data.metrics.unwrap().is_empty());
    }
}
