//! `TracesAnalyzer` (C5, spec §4.5): folds a decoded spans batch into
//! `SpanRecordUpdate` value objects, one per span.

use tokio_util::sync::CancellationToken;

use crate::aggregates::span::SpanRecordUpdate;
use crate::error::CoreError;
use crate::otlp_model::TracesBatch;

pub fn analyze(batch: &TracesBatch, cancel: &CancellationToken) -> Result<Vec<SpanRecordUpdate>, CoreError> {
    let mut updates = Vec::new();

    for resource_spans in &batch.resource_spans {
        let service_name = resource_spans.resource.service_name();
        let resource_attrs: Vec<(String, String)> = resource_spans
            .resource
            .attributes
            .iter()
            .map(|a| (a.key.clone(), a.value.clone()))
            .collect();

        for scope_spans in &resource_spans.scope_spans {
            for span in &scope_spans.spans {
                if cancel.is_cancelled() {
                    return Err(CoreError::Cancelled);
                }

                updates.push(SpanRecordUpdate {
                    name: span.name.clone(),
                    kind: span.kind,
                    attribute_values: span
                        .attributes
                        .iter()
                        .map(|a| (a.key.clone(), a.value.clone()))
                        .collect(),
                    resource_attribute_values: resource_attrs.clone(),
                    event_names: span.events.iter().map(|e| e.name.clone()).collect(),
                    event_attribute_values: span
                        .events
                        .iter()
                        .map(|e| {
                            (
                                e.name.clone(),
                                e.attributes.iter().map(|a| (a.key.clone(), a.value.clone())).collect(),
                            )
                        })
                        .collect(),
                    link_attribute_values: span
                        .links
                        .iter()
                        .flat_map(|l| l.attributes.iter().map(|a| (a.key.clone(), a.value.clone())))
                        .collect(),
                    status_code: span.status.code.clone(),
                    service_name: service_name.clone(),
                });
            }
        }
    }

    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::span::kind_name;
    use crate::otlp_model::{Attribute, Resource, ResourceSpans, ScopeSpans, Span, SpanStatus};

    fn batch(kind: u8) -> TracesBatch {
        TracesBatch {
            resource_spans: vec![ResourceSpans {
                resource: Resource {
                    attributes: vec![Attribute {
                        key: "service.name".to_string(),
                        value: "checkout".to_string(),
                    }],
                },
                scope_spans: vec![ScopeSpans {
                    spans: vec![Span {
                        name: "GET /users/123".to_string(),
                        kind,
                        attributes: vec![],
                        events: vec![],
                        links: vec![],
                        status: SpanStatus {
                            code: "STATUS_CODE_OK".to_string(),
                        },
                    }],
                }],
            }],
        }
    }

    #[test]
    fn span_kind_mapping_from_spec() {
        let updates = analyze(&batch(2), &CancellationToken::new()).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(kind_name(updates[0].kind), "Server");
    }

    #[test]
    fn service_name_and_status_code_carried_through() {
        let updates = analyze(&batch(2), &CancellationToken::new()).unwrap();
        assert_eq!(updates[0].service_name, Some("checkout".to_string()));
        assert_eq!(updates[0].status_code, "STATUS_CODE_OK");
    }
}
