//! Diff engine (C9, spec §4.9): structural + numerical comparison of
//! two snapshots. Entity identity is `(signal_type, name)` — severity
//! text for logs, name for metrics/spans, key for attributes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::aggregates::{SerializedAttributeMetadata, SerializedLogMetadata, SerializedMetricMetadata, SerializedSpanMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::str::FromStr for Severity {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(crate::error::CoreError::Validation(format!(
                "unknown severity: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDelta {
    pub field: String,
    pub old: f64,
    pub new: f64,
    pub percent_change: f64,
    pub severity: Severity,
}

fn percent_change(old: f64, new: f64) -> f64 {
    (new - old) / old.max(1.0) * 100.0
}

/// Sample-count change severity: `≥50% ⇒ warning`, `≥200% ⇒ critical`.
fn magnitude_severity(percent: f64) -> Severity {
    let magnitude = percent.abs();
    if magnitude >= 200.0 {
        Severity::Critical
    } else if magnitude >= 50.0 {
        Severity::Warning
    } else {
        Severity::Info
    }
}

/// High-cardinality-growth severity: crossing `T` ⇒ warning, crossing
/// `10T` ⇒ critical. Only fires on growth (shrinking past the
/// threshold is not itself a signal worth flagging).
fn cardinality_growth_severity(old: u64, new: u64, threshold: u64) -> Option<Severity> {
    if old >= threshold || new < threshold {
        return None;
    }
    if new >= threshold.saturating_mul(10) {
        Some(Severity::Critical)
    } else {
        Some(Severity::Warning)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub name: String,
    pub field_deltas: Vec<FieldDelta>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedEntry {
    pub name: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalDiff {
    pub added: Vec<AddedEntry>,
    pub removed: Vec<String>,
    pub changed: Vec<Change>,
}

impl SignalDiff {
    fn total_changes(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffSummary {
    pub total_changes: usize,
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub info: usize,
    pub warning: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub metrics: SignalDiff,
    pub spans: SignalDiff,
    pub logs: SignalDiff,
    pub attributes: SignalDiff,
    pub summary: DiffSummary,
}

/// Threshold `T` for new-signal severity, spec §4.9: `sample_count ≥
/// 1000 ⇒ warning` on an added entry.
const NEW_SIGNAL_SAMPLE_THRESHOLD: u64 = 1000;

fn added_severity(sample_count: u64) -> Severity {
    if sample_count >= NEW_SIGNAL_SAMPLE_THRESHOLD {
        Severity::Warning
    } else {
        Severity::Info
    }
}

fn service_disappearance_deltas(old: &HashMap<String, u64>, new: &HashMap<String, u64>) -> Vec<FieldDelta> {
    old.iter()
        .filter(|(service, _)| !new.contains_key(*service))
        .map(|(service, &count)| FieldDelta {
            field: format!("services.{service}"),
            old: count as f64,
            new: 0.0,
            percent_change: -100.0,
            severity: Severity::Warning,
        })
        .collect()
}

fn label_cardinality_deltas(old_keys: &HashMap<String, crate::key_metadata::SerializedKeyMetadata>, new_keys: &HashMap<String, crate::key_metadata::SerializedKeyMetadata>, threshold: u64, prefix: &str) -> Vec<FieldDelta> {
    let mut out = Vec::new();
    for (key, new_meta) in new_keys {
        let old_cardinality = old_keys.get(key).map(|k| k.estimated_cardinality).unwrap_or(0);
        if let Some(severity) = cardinality_growth_severity(old_cardinality, new_meta.estimated_cardinality, threshold) {
            out.push(FieldDelta {
                field: format!("{prefix}.{key}.estimated_cardinality"),
                old: old_cardinality as f64,
                new: new_meta.estimated_cardinality as f64,
                percent_change: percent_change(old_cardinality as f64, new_meta.estimated_cardinality as f64),
                severity,
            });
        }
    }
    out
}

fn overall_severity(deltas: &[FieldDelta]) -> Option<Severity> {
    deltas.iter().map(|d| d.severity).max()
}

pub fn diff_metrics(from: &[SerializedMetricMetadata], to: &[SerializedMetricMetadata], high_cardinality_threshold: u64) -> SignalDiff {
    let from_map: HashMap<&str, &SerializedMetricMetadata> = from.iter().map(|m| (m.name.as_str(), m)).collect();
    let to_map: HashMap<&str, &SerializedMetricMetadata> = to.iter().map(|m| (m.name.as_str(), m)).collect();

    let mut diff = SignalDiff::default();
    for (name, to_entry) in &to_map {
        match from_map.get(name) {
            None => diff.added.push(AddedEntry {
                name: name.to_string(),
                severity: added_severity(to_entry.sample_count),
            }),
            Some(from_entry) => {
                let mut deltas = Vec::new();
                if from_entry.sample_count != to_entry.sample_count {
                    let pct = percent_change(from_entry.sample_count as f64, to_entry.sample_count as f64);
                    deltas.push(FieldDelta {
                        field: "sample_count".to_string(),
                        old: from_entry.sample_count as f64,
                        new: to_entry.sample_count as f64,
                        percent_change: pct,
                        severity: magnitude_severity(pct),
                    });
                }
                deltas.extend(label_cardinality_deltas(&from_entry.label_keys, &to_entry.label_keys, high_cardinality_threshold, "label_keys"));
                deltas.extend(service_disappearance_deltas(&from_entry.services, &to_entry.services));
                if let Some(severity) = overall_severity(&deltas) {
                    diff.changed.push(Change { name: name.to_string(), field_deltas: deltas, severity });
                }
            }
        }
    }
    for name in from_map.keys() {
        if !to_map.contains_key(name) {
            diff.removed.push(name.to_string());
        }
    }
    diff
}

pub fn diff_spans(from: &[SerializedSpanMetadata], to: &[SerializedSpanMetadata], high_cardinality_threshold: u64) -> SignalDiff {
    let from_map: HashMap<&str, &SerializedSpanMetadata> = from.iter().map(|s| (s.name.as_str(), s)).collect();
    let to_map: HashMap<&str, &SerializedSpanMetadata> = to.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut diff = SignalDiff::default();
    for (name, to_entry) in &to_map {
        match from_map.get(name) {
            None => diff.added.push(AddedEntry {
                name: name.to_string(),
                severity: added_severity(to_entry.sample_count),
            }),
            Some(from_entry) => {
                let mut deltas = Vec::new();
                if from_entry.sample_count != to_entry.sample_count {
                    let pct = percent_change(from_entry.sample_count as f64, to_entry.sample_count as f64);
                    deltas.push(FieldDelta {
                        field: "sample_count".to_string(),
                        old: from_entry.sample_count as f64,
                        new: to_entry.sample_count as f64,
                        percent_change: pct,
                        severity: magnitude_severity(pct),
                    });
                }
                deltas.extend(label_cardinality_deltas(&from_entry.attribute_keys, &to_entry.attribute_keys, high_cardinality_threshold, "attribute_keys"));
                deltas.extend(service_disappearance_deltas(&from_entry.services, &to_entry.services));
                if let Some(severity) = overall_severity(&deltas) {
                    diff.changed.push(Change { name: name.to_string(), field_deltas: deltas, severity });
                }
            }
        }
    }
    for name in from_map.keys() {
        if !to_map.contains_key(name) {
            diff.removed.push(name.to_string());
        }
    }
    diff
}

pub fn diff_logs(from: &[SerializedLogMetadata], to: &[SerializedLogMetadata], high_cardinality_threshold: u64) -> SignalDiff {
    let from_map: HashMap<&str, &SerializedLogMetadata> = from.iter().map(|l| (l.severity.as_str(), l)).collect();
    let to_map: HashMap<&str, &SerializedLogMetadata> = to.iter().map(|l| (l.severity.as_str(), l)).collect();

    let mut diff = SignalDiff::default();
    for (sev_key, to_entry) in &to_map {
        match from_map.get(sev_key) {
            None => diff.added.push(AddedEntry {
                name: sev_key.to_string(),
                severity: added_severity(to_entry.sample_count),
            }),
            Some(from_entry) => {
                let mut deltas = Vec::new();
                if from_entry.sample_count != to_entry.sample_count {
                    let pct = percent_change(from_entry.sample_count as f64, to_entry.sample_count as f64);
                    deltas.push(FieldDelta {
                        field: "sample_count".to_string(),
                        old: from_entry.sample_count as f64,
                        new: to_entry.sample_count as f64,
                        percent_change: pct,
                        severity: magnitude_severity(pct),
                    });
                }
                deltas.extend(label_cardinality_deltas(&from_entry.attribute_keys, &to_entry.attribute_keys, high_cardinality_threshold, "attribute_keys"));
                deltas.extend(service_disappearance_deltas(&from_entry.services, &to_entry.services));
                if let Some(severity) = overall_severity(&deltas) {
                    diff.changed.push(Change { name: sev_key.to_string(), field_deltas: deltas, severity });
                }
            }
        }
    }
    for sev_key in from_map.keys() {
        if !to_map.contains_key(sev_key) {
            diff.removed.push(sev_key.to_string());
        }
    }
    diff
}

pub fn diff_attributes(from: &[SerializedAttributeMetadata], to: &[SerializedAttributeMetadata], high_cardinality_threshold: u64) -> SignalDiff {
    let from_map: HashMap<&str, &SerializedAttributeMetadata> = from.iter().map(|a| (a.key.as_str(), a)).collect();
    let to_map: HashMap<&str, &SerializedAttributeMetadata> = to.iter().map(|a| (a.key.as_str(), a)).collect();

    let mut diff = SignalDiff::default();
    for (key, to_entry) in &to_map {
        match from_map.get(key) {
            None => diff.added.push(AddedEntry {
                name: key.to_string(),
                severity: added_severity(to_entry.count),
            }),
            Some(from_entry) => {
                let mut deltas = Vec::new();
                if from_entry.count != to_entry.count {
                    let pct = percent_change(from_entry.count as f64, to_entry.count as f64);
                    deltas.push(FieldDelta {
                        field: "count".to_string(),
                        old: from_entry.count as f64,
                        new: to_entry.count as f64,
                        percent_change: pct,
                        severity: magnitude_severity(pct),
                    });
                }
                if let Some(severity) = cardinality_growth_severity(
                    from_entry.estimated_cardinality,
                    to_entry.estimated_cardinality,
                    high_cardinality_threshold,
                ) {
                    deltas.push(FieldDelta {
                        field: "estimated_cardinality".to_string(),
                        old: from_entry.estimated_cardinality as f64,
                        new: to_entry.estimated_cardinality as f64,
                        percent_change: percent_change(from_entry.estimated_cardinality as f64, to_entry.estimated_cardinality as f64),
                        severity,
                    });
                }
                if let Some(severity) = overall_severity(&deltas) {
                    diff.changed.push(Change { name: key.to_string(), field_deltas: deltas, severity });
                }
            }
        }
    }
    for key in from_map.keys() {
        if !to_map.contains_key(key) {
            diff.removed.push(key.to_string());
        }
    }
    diff
}

fn summarize(diffs: &[&SignalDiff]) -> DiffSummary {
    let mut summary = DiffSummary {
        total_changes: 0,
        added: 0,
        removed: 0,
        changed: 0,
        info: 0,
        warning: 0,
        critical: 0,
    };
    for diff in diffs {
        summary.added += diff.added.len();
        summary.removed += diff.removed.len();
        summary.changed += diff.changed.len();
        summary.total_changes += diff.total_changes();
        for entry in &diff.added {
            match entry.severity {
                Severity::Info => summary.info += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Critical => summary.critical += 1,
            }
        }
        for change in &diff.changed {
            match change.severity {
                Severity::Info => summary.info += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Critical => summary.critical += 1,
            }
        }
    }
    summary
}

pub fn diff_snapshots(from: &crate::session::Session, to: &crate::session::Session, high_cardinality_threshold: u64) -> SnapshotDiff {
    let empty_metrics = Vec::new();
    let empty_spans = Vec::new();
    let empty_logs = Vec::new();
    let empty_attrs = Vec::new();

    let metrics = diff_metrics(
        from.data.metrics.as_ref().unwrap_or(&empty_metrics),
        to.data.metrics.as_ref().unwrap_or(&empty_metrics),
        high_cardinality_threshold,
    );
    let spans = diff_spans(
        from.data.spans.as_ref().unwrap_or(&empty_spans),
        to.data.spans.as_ref().unwrap_or(&empty_spans),
        high_cardinality_threshold,
    );
    let logs = diff_logs(
        from.data.logs.as_ref().unwrap_or(&empty_logs),
        to.data.logs.as_ref().unwrap_or(&empty_logs),
        high_cardinality_threshold,
    );
    let attributes = diff_attributes(
        from.data.attributes.as_ref().unwrap_or(&empty_attrs),
        to.data.attributes.as_ref().unwrap_or(&empty_attrs),
        high_cardinality_threshold,
    );

    let summary = summarize(&[&metrics, &spans, &logs, &attributes]);
    SnapshotDiff { metrics, spans, logs, attributes, summary }
}

/// Suppress buckets/entries below `min_severity`.
pub fn filter_min_severity(diff: &mut SnapshotDiff, min_severity: Severity) {
    for signal in [&mut diff.metrics, &mut diff.spans, &mut diff.logs, &mut diff.attributes] {
        signal.added.retain(|e| e.severity >= min_severity);
        signal.changed.retain(|c| c.severity >= min_severity);
    }
    diff.summary = summarize(&[&diff.metrics, &diff.spans, &diff.logs, &diff.attributes]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(name: &str, sample_count: u64, cardinality: u64) -> SerializedMetricMetadata {
        use crate::hll::Hll;
        use crate::key_metadata::KeyMetadata;
        let mut key = KeyMetadata::new(14, 20).unwrap();
        for i in 0..cardinality {
            key.add_value(&format!("v{i}"));
        }
        let mut label_keys = HashMap::new();
        label_keys.insert("label".to_string(), key.to_serialized());
        SerializedMetricMetadata {
            name: name.to_string(),
            description: String::new(),
            unit: String::new(),
            metric_type: "Sum".to_string(),
            sample_count,
            active_series: 0,
            active_series_hll: Hll::new(14).unwrap().to_encoded(),
            label_keys,
            resource_keys: HashMap::new(),
            services: HashMap::new(),
        }
    }

    #[test]
    fn diff_symmetry_self_comparison_has_no_changes() {
        let snapshot = vec![metric("http_requests_total", 1000, 5)];
        let diff = diff_metrics(&snapshot, &snapshot, 100);
        assert_eq!(diff.total_changes(), 0);
    }

    #[test]
    fn diff_added_removed_duality() {
        let a = vec![metric("a_only", 10, 1)];
        let b = vec![metric("b_only", 10, 1)];
        let forward = diff_metrics(&a, &b, 100);
        let backward = diff_metrics(&b, &a, 100);
        assert_eq!(forward.added[0].name, backward.removed[0]);
        assert_eq!(forward.removed[0], backward.added[0].name);
    }

    #[test]
    fn sample_count_change_severity_matches_spec_scenario() {
        let from = vec![metric("m", 1000, 1)];
        let to_critical = vec![metric("m", 3500, 1)];
        let diff = diff_metrics(&from, &to_critical, 100);
        assert_eq!(diff.changed[0].severity, Severity::Critical);

        let to_info = vec![metric("m", 1200, 1)];
        let diff = diff_metrics(&from, &to_info, 100);
        assert_eq!(diff.changed[0].severity, Severity::Info);
    }

    #[test]
    fn high_cardinality_growth_flags_warning() {
        let from = vec![metric("m", 100, 1)];
        let to = vec![metric("m", 100, 5000)];
        let diff = diff_metrics(&from, &to, 100);
        assert_eq!(diff.changed.len(), 1);
        assert!(diff.changed[0]
            .field_deltas
            .iter()
            .any(|d| d.field.contains("estimated_cardinality") && d.severity == Severity::Warning));
    }

    #[test]
    fn service_disappearance_is_flagged_warning() {
        let mut from_metric = metric("m", 10, 1);
        from_metric.services.insert("checkout".to_string(), 10);
        let to_metric = metric("m", 10, 1);
        let diff = diff_metrics(&[from_metric], &[to_metric], 100);
        assert_eq!(diff.changed.len(), 1);
        assert!(diff.changed[0].field_deltas.iter().any(|d| d.field == "services.checkout"));
    }

    #[test]
    fn new_signal_with_high_volume_flagged_warning() {
        let to = vec![metric("new_metric", 5000, 1)];
        let diff = diff_metrics(&[], &to, 100);
        assert_eq!(diff.added[0].severity, Severity::Warning);
    }

    #[test]
    fn min_severity_filter_suppresses_info() {
        let from = vec![metric("m", 1000, 1)];
        let to = vec![metric("m", 1200, 1)];
        let mut snapshot_diff = SnapshotDiff {
            metrics: diff_metrics(&from, &to, 100),
            spans: SignalDiff::default(),
            logs: SignalDiff::default(),
            attributes: SignalDiff::default(),
            summary: DiffSummary { total_changes: 0, added: 0, removed: 0, changed: 0, info: 0, warning: 0, critical: 0 },
        };
        filter_min_severity(&mut snapshot_diff, Severity::Warning);
        assert!(snapshot_diff.metrics.changed.is_empty());
    }
}
