//! `LogsAnalyzer` (C5, spec §4.5): folds a decoded logs batch into
//! `LogRecordUpdate` value objects, keyed downstream by normalized
//! severity text.

use tokio_util::sync::CancellationToken;

use crate::aggregates::log::LogRecordUpdate;
use crate::error::CoreError;
use crate::otlp_model::LogsBatch;

pub fn analyze(batch: &LogsBatch, cancel: &CancellationToken) -> Result<Vec<LogRecordUpdate>, CoreError> {
    let mut updates = Vec::new();

    for resource_logs in &batch.resource_logs {
        let service_name = resource_logs.resource.service_name();
        let resource_attrs: Vec<(String, String)> = resource_logs
            .resource
            .attributes
            .iter()
            .map(|a| (a.key.clone(), a.value.clone()))
            .collect();

        for scope_logs in &resource_logs.scope_logs {
            for record in &scope_logs.log_records {
                if cancel.is_cancelled() {
                    return Err(CoreError::Cancelled);
                }

                updates.push(LogRecordUpdate {
                    severity: record.severity_text.clone(),
                    severity_number: record.severity_number,
                    body: record.body.clone(),
                    event_name: record.event_name.clone(),
                    attribute_values: record
                        .attributes
                        .iter()
                        .map(|a| (a.key.clone(), a.value.clone()))
                        .collect(),
                    resource_attribute_values: resource_attrs.clone(),
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
    use crate::aggregates::log::normalize_severity;
    use crate::otlp_model::{LogRecord, Resource, ResourceLogs, ScopeLogs};

    fn batch(severity: Option<&str>) -> LogsBatch {
        LogsBatch {
            resource_logs: vec![ResourceLogs {
                resource: Resource::default(),
                scope_logs: vec![ScopeLogs {
                    log_records: vec![LogRecord {
                        severity_text: severity.map(str::to_string),
                        severity_number: 17,
                        body: "user 4831 logged in from 10.2.3.4".to_string(),
                        event_name: None,
                        attributes: vec![],
                    }],
                }],
            }],
        }
    }

    #[test]
    fn severity_normalized_uppercase() {
        let updates = analyze(&batch(Some("error")), &CancellationToken::new()).unwrap();
        assert_eq!(
            normalize_severity(updates[0].severity.as_deref()),
            "ERROR"
        );
    }

    #[test]
    fn missing_severity_becomes_unset() {
        let updates = analyze(&batch(None), &CancellationToken::new()).unwrap();
        assert_eq!(normalize_severity(updates[0].severity.as_deref()), "UNSET");
    }
}
