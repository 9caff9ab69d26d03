//! `MetricsAnalyzer` (C5, spec §4.5): folds a decoded metrics batch into
//! `MetricUpdate` value objects. Never touches the store directly.

use tokio_util::sync::CancellationToken;

use crate::aggregates::metric::{MetricDataPointUpdate, MetricType, MetricUpdate};
use crate::error::CoreError;
use crate::otlp_model::MetricsBatch;

pub fn analyze(batch: &MetricsBatch, cancel: &CancellationToken) -> Result<Vec<MetricUpdate>, CoreError> {
    let mut updates = Vec::new();

    for resource_metrics in &batch.resource_metrics {
        let service_name = resource_metrics.resource.service_name();
        let resource_attrs: Vec<(String, String)> = resource_metrics
            .resource
            .attributes
            .iter()
            .map(|a| (a.key.clone(), a.value.clone()))
            .collect();

        for scope_metrics in &resource_metrics.scope_metrics {
            for metric in &scope_metrics.metrics {
                if cancel.is_cancelled() {
                    return Err(CoreError::Cancelled);
                }

                let metric_type = MetricType::from_str(&metric.metric_type)?;
                let data_points = metric
                    .data_points
                    .iter()
                    .map(|dp| MetricDataPointUpdate {
                        label_values: dp
                            .attributes
                            .iter()
                            .map(|a| (a.key.clone(), a.value.clone()))
                            .collect(),
                        resource_attribute_values: resource_attrs.clone(),
                        service_name: service_name.clone(),
                    })
                    .collect();

                updates.push(MetricUpdate {
                    name: metric.name.clone(),
                    description: metric.description.clone(),
                    unit: metric.unit.clone(),
                    metric_type,
                    data_points,
                });
            }
        }
    }

    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otlp_model::{Attribute, DataPoint, Metric, Resource, ResourceMetrics, ScopeMetrics};

    fn batch() -> MetricsBatch {
        MetricsBatch {
            resource_metrics: vec![ResourceMetrics {
                resource: Resource {
                    attributes: vec![Attribute {
                        key: "service.name".to_string(),
                        value: "api".to_string(),
                    }],
                },
                scope_metrics: vec![ScopeMetrics {
                    metrics: vec![Metric {
                        name: "http_requests_total".to_string(),
                        description: "count".to_string(),
                        unit: "1".to_string(),
                        metric_type: "Sum".to_string(),
                        data_points: vec![DataPoint {
                            attributes: vec![Attribute {
                                key: "status_code".to_string(),
                                value: "200".to_string(),
                            }],
                        }],
                    }],
                }],
            }],
        }
    }

    #[test]
    fn analyze_produces_one_update_per_metric() {
        let updates = analyze(&batch(), &CancellationToken::new()).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].name, "http_requests_total");
        assert_eq!(updates[0].data_points.len(), 1);
        assert_eq!(
            updates[0].data_points[0].service_name,
            Some("api".to_string())
        );
    }

    #[test]
    fn analyze_respects_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(analyze(&batch(), &cancel), Err(CoreError::Cancelled)));
    }
}
