//! `AttributesAnalyzer` (C5, spec §4.5): derives the global-catalog
//! observations for one signal update. The Store folds these into the
//! live `AttributeMetadata` catalog alongside the signal-specific
//! update (spec §9 "global catalog vs per-signal keys", resolved in
//! favor of live maintenance — see SPEC_FULL.md §9).

use crate::aggregates::attribute::{AttributeScope, SignalType};
use crate::aggregates::log::LogRecordUpdate;
use crate::aggregates::metric::MetricUpdate;
use crate::aggregates::span::SpanRecordUpdate;

pub struct AttributeObservation {
    pub key: String,
    pub value: String,
    pub scope: AttributeScope,
    pub signal_type: SignalType,
}

pub fn observe_metric(update: &MetricUpdate) -> Vec<AttributeObservation> {
    let mut out = Vec::new();
    for dp in &update.data_points {
        for (key, value) in &dp.label_values {
            out.push(AttributeObservation {
                key: key.clone(),
                value: value.clone(),
                scope: AttributeScope::Attribute,
                signal_type: SignalType::Metric,
            });
        }
        for (key, value) in &dp.resource_attribute_values {
            out.push(AttributeObservation {
                key: key.clone(),
                value: value.clone(),
                scope: AttributeScope::Resource,
                signal_type: SignalType::Metric,
            });
        }
    }
    out
}

pub fn observe_span(record: &SpanRecordUpdate) -> Vec<AttributeObservation> {
    let mut out = Vec::new();
    for (key, value) in &record.attribute_values {
        out.push(AttributeObservation {
            key: key.clone(),
            value: value.clone(),
            scope: AttributeScope::Attribute,
            signal_type: SignalType::Span,
        });
    }
    for (key, value) in &record.resource_attribute_values {
        out.push(AttributeObservation {
            key: key.clone(),
            value: value.clone(),
            scope: AttributeScope::Resource,
            signal_type: SignalType::Span,
        });
    }
    for (_, attrs) in &record.event_attribute_values {
        for (key, value) in attrs {
            out.push(AttributeObservation {
                key: key.clone(),
                value: value.clone(),
                scope: AttributeScope::Attribute,
                signal_type: SignalType::Span,
            });
        }
    }
    for (key, value) in &record.link_attribute_values {
        out.push(AttributeObservation {
            key: key.clone(),
            value: value.clone(),
            scope: AttributeScope::Attribute,
            signal_type: SignalType::Span,
        });
    }
    out
}

pub fn observe_log(record: &LogRecordUpdate) -> Vec<AttributeObservation> {
    let mut out = Vec::new();
    for (key, value) in &record.attribute_values {
        out.push(AttributeObservation {
            key: key.clone(),
            value: value.clone(),
            scope: AttributeScope::Attribute,
            signal_type: SignalType::Log,
        });
    }
    for (key, value) in &record.resource_attribute_values {
        out.push(AttributeObservation {
            key: key.clone(),
            value: value.clone(),
            scope: AttributeScope::Resource,
            signal_type: SignalType::Log,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::metric::{MetricDataPointUpdate, MetricType};

    #[test]
    fn observe_metric_tags_resource_and_attribute_scope() {
        let update = MetricUpdate {
            name: "m".to_string(),
            description: String::new(),
            unit: String::new(),
            metric_type: MetricType::Gauge,
            data_points: vec![MetricDataPointUpdate {
                label_values: vec![("status_code".to_string(), "200".to_string())],
                resource_attribute_values: vec![("service.name".to_string(), "api".to_string())],
                service_name: Some("api".to_string()),
            }],
        };
        let observations = observe_metric(&update);
        assert_eq!(observations.len(), 2);
        assert!(observations
            .iter()
            .any(|o| o.key == "status_code" && o.scope == AttributeScope::Attribute));
        assert!(observations
            .iter()
            .any(|o| o.key == "service.name" && o.scope == AttributeScope::Resource));
    }
}
