//! The concurrent metadata store (C6, spec §4.6).
//!
//! Realized with `dashmap::DashMap`: its internal per-shard `RwLock`s
//! play the role of both the "shard lock" (guarding insert/create) and,
//! combined with holding the returned entry guard for the duration of a
//! field-level merge, the "entry lock" described in §4.6/§5. No guard is
//! ever held across an `.await` point.

use std::collections::HashMap;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::aggregates::attribute::{AttributeMetadata, AttributeScope, SerializedAttributeMetadata, SignalType};
use crate::aggregates::log::{LogMetadata, LogRecordUpdate, SerializedLogMetadata};
use crate::aggregates::metric::{MetricMetadata, MetricUpdate, SerializedMetricMetadata};
use crate::aggregates::span::{SerializedSpanMetadata, SpanMetadata, SpanRecordUpdate};
use crate::analyzers::attributes::{observe_log, observe_metric, observe_span, AttributeObservation};
use crate::config::CardinalityConfig;
use crate::error::CoreError;
use crate::hll::Hll;
use crate::key_metadata::KeyMetadata;
use crate::template::extract_template;

/// Filter shared by every `List*` read contract (spec §6).
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub service: Option<String>,
    pub min_cardinality: Option<u64>,
    pub min_samples: Option<u64>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListFilter {
    fn matches_service(&self, services: &HashMap<String, u64>) -> bool {
        match &self.service {
            Some(service) => services.contains_key(service),
            None => true,
        }
    }

    fn matches_samples(&self, sample_count: u64) -> bool {
        match self.min_samples {
            Some(min) => sample_count >= min,
            None => true,
        }
    }

    fn matches_cardinality(&self, max_cardinality: u64) -> bool {
        match self.min_cardinality {
            Some(min) => max_cardinality >= min,
            None => true,
        }
    }

    fn matches_search(&self, name: &str) -> bool {
        match &self.search {
            Some(needle) => name.to_lowercase().contains(&needle.to_lowercase()),
            None => true,
        }
    }

    fn apply_paging<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = self.offset.unwrap_or(0);
        let mut items: Vec<T> = items.into_iter().skip(offset).collect();
        if let Some(limit) = self.limit {
            items.truncate(limit);
        }
        items
    }
}

fn max_key_cardinality(keys: &HashMap<String, KeyMetadata>) -> u64 {
    keys.values().map(|k| k.estimated_cardinality()).max().unwrap_or(0)
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplexityEntry {
    pub signal_type: &'static str,
    pub name: String,
    pub total_keys: usize,
    pub max_key_cardinality: u64,
    pub complexity: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HighCardinalityKey {
    pub signal_type: &'static str,
    pub signal_name: String,
    pub key_scope: String,
    pub key_name: String,
    pub cardinality: u64,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub metric_count: usize,
    pub span_count: usize,
    pub log_severity_count: usize,
    pub attribute_count: usize,
    pub service_count: usize,
}

/// The sharded concurrent store of live aggregates.
pub struct Store {
    metrics: DashMap<String, MetricMetadata>,
    spans: DashMap<String, SpanMetadata>,
    logs: DashMap<String, LogMetadata>,
    attributes: DashMap<String, AttributeMetadata>,
    precision: u8,
    sample_cap: usize,
    template_cap: usize,
    template_example_max_len: usize,
}

impl Store {
    pub fn new(config: &CardinalityConfig) -> Result<Self, CoreError> {
        // Validated once here; every per-entry `Hll::new(precision)` call
        // made afterward is guaranteed to succeed.
        Hll::new(config.hll_precision)?;
        Ok(Self {
            metrics: DashMap::new(),
            spans: DashMap::new(),
            logs: DashMap::new(),
            attributes: DashMap::new(),
            precision: config.hll_precision,
            sample_cap: config.value_sample_cap,
            template_cap: config.template_cap,
            template_example_max_len: config.template_example_max_len,
        })
    }

    fn observe_attributes(&self, observations: Vec<AttributeObservation>) -> Result<(), CoreError> {
        let now = Utc::now();
        for obs in observations {
            match self.attributes.get_mut(&obs.key) {
                Some(mut entry) => entry.observe(&obs.value, obs.scope, obs.signal_type, now),
                None => {
                    let mut entry =
                        AttributeMetadata::new(&obs.key, obs.scope, obs.signal_type, self.precision, self.sample_cap, now)?;
                    entry.observe(&obs.value, obs.scope, obs.signal_type, now);
                    self.attributes
                        .entry(obs.key.clone())
                        .and_modify(|existing| existing.observe(&obs.value, obs.scope, obs.signal_type, now))
                        .or_insert(entry);
                }
            }
        }
        Ok(())
    }

    pub fn store_metric(&self, update: &MetricUpdate, cancel: &CancellationToken) -> Result<(), CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        match self.metrics.get_mut(&update.name) {
            Some(mut entry) => entry.apply_update(update)?,
            None => {
                let mut entry = MetricMetadata::new(update, self.precision, self.sample_cap)?;
                entry.apply_update(update)?;
                let mut race_err = None;
                self.metrics
                    .entry(update.name.clone())
                    .and_modify(|existing| {
                        if let Err(e) = existing.apply_update(update) {
                            race_err = Some(e);
                        }
                    })
                    .or_insert(entry);
                if let Some(e) = race_err {
                    return Err(e);
                }
            }
        }
        self.observe_attributes(observe_metric(update))
    }

    pub fn store_span(&self, record: &SpanRecordUpdate, cancel: &CancellationToken) -> Result<(), CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let key = extract_template(&record.name);
        match self.spans.get_mut(&key) {
            Some(mut entry) => entry.apply_record(record)?,
            None => {
                let mut entry = SpanMetadata::new(
                    &key,
                    record,
                    self.precision,
                    self.sample_cap,
                    self.template_cap,
                    self.template_example_max_len,
                );
                entry.apply_record(record)?;
                let mut race_err = None;
                self.spans
                    .entry(key)
                    .and_modify(|existing| {
                        if let Err(e) = existing.apply_record(record) {
                            race_err = Some(e);
                        }
                    })
                    .or_insert(entry);
                if let Some(e) = race_err {
                    return Err(e);
                }
            }
        }
        self.observe_attributes(observe_span(record))
    }

    pub fn store_log(&self, record: &LogRecordUpdate, cancel: &CancellationToken) -> Result<(), CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let key = crate::aggregates::log::normalize_severity(record.severity.as_deref());
        match self.logs.get_mut(&key) {
            Some(mut entry) => entry.apply_record(record)?,
            None => {
                let mut entry = LogMetadata::new(
                    &key,
                    record.severity_number,
                    self.precision,
                    self.sample_cap,
                    self.template_cap,
                    self.template_example_max_len,
                );
                entry.apply_record(record)?;
                let mut race_err = None;
                self.logs
                    .entry(key)
                    .and_modify(|existing| {
                        if let Err(e) = existing.apply_record(record) {
                            race_err = Some(e);
                        }
                    })
                    .or_insert(entry);
                if let Some(e) = race_err {
                    return Err(e);
                }
            }
        }
        self.observe_attributes(observe_log(record))
    }

    pub fn get_metric_by_name(&self, name: &str) -> Option<SerializedMetricMetadata> {
        self.metrics.get(name).map(|e| e.to_serialized())
    }

    pub fn get_span_by_name(&self, name: &str) -> Option<SerializedSpanMetadata> {
        self.spans.get(name).map(|e| e.to_serialized())
    }

    pub fn get_log_by_name(&self, severity: &str) -> Option<SerializedLogMetadata> {
        self.logs.get(severity).map(|e| e.to_serialized())
    }

    pub fn get_attribute_by_name(&self, key: &str) -> Option<SerializedAttributeMetadata> {
        self.attributes.get(key).map(|e| e.to_serialized())
    }

    pub fn list_metrics(&self, filter: &ListFilter) -> Vec<SerializedMetricMetadata> {
        let items: Vec<SerializedMetricMetadata> = self
            .metrics
            .iter()
            .filter(|e| {
                filter.matches_service(&e.services)
                    && filter.matches_samples(e.sample_count)
                    && filter.matches_cardinality(max_key_cardinality(&e.label_keys))
                    && filter.matches_search(&e.name)
            })
            .map(|e| e.to_serialized())
            .collect();
        filter.apply_paging(items)
    }

    pub fn list_spans(&self, filter: &ListFilter) -> Vec<SerializedSpanMetadata> {
        let items: Vec<SerializedSpanMetadata> = self
            .spans
            .iter()
            .filter(|e| {
                filter.matches_service(&e.services)
                    && filter.matches_samples(e.sample_count)
                    && filter.matches_cardinality(max_key_cardinality(&e.attribute_keys))
                    && filter.matches_search(&e.name)
            })
            .map(|e| e.to_serialized())
            .collect();
        filter.apply_paging(items)
    }

    pub fn list_logs(&self, filter: &ListFilter) -> Vec<SerializedLogMetadata> {
        let items: Vec<SerializedLogMetadata> = self
            .logs
            .iter()
            .filter(|e| {
                filter.matches_service(&e.services)
                    && filter.matches_samples(e.sample_count)
                    && filter.matches_cardinality(max_key_cardinality(&e.attribute_keys))
                    && filter.matches_search(&e.severity)
            })
            .map(|e| e.to_serialized())
            .collect();
        filter.apply_paging(items)
    }

    pub fn list_attributes(&self, filter: &ListFilter) -> Vec<SerializedAttributeMetadata> {
        let items: Vec<SerializedAttributeMetadata> = self
            .attributes
            .iter()
            .filter(|e| {
                filter.matches_samples(e.count) && filter.matches_cardinality(e.estimated_cardinality()) && filter.matches_search(&e.key)
            })
            .map(|e| e.to_serialized())
            .collect();
        filter.apply_paging(items)
    }

    /// Atomic (per-shard) swap to a fresh empty map, spec §4.6.
    pub fn clear(&self) {
        self.metrics.clear();
        self.spans.clear();
        self.logs.clear();
        self.attributes.clear();
    }

    pub fn summary(&self) -> Summary {
        let mut services = std::collections::HashSet::new();
        for m in self.metrics.iter() {
            services.extend(m.services.keys().cloned());
        }
        for s in self.spans.iter() {
            services.extend(s.services.keys().cloned());
        }
        for l in self.logs.iter() {
            services.extend(l.services.keys().cloned());
        }
        Summary {
            metric_count: self.metrics.len(),
            span_count: self.spans.len(),
            log_severity_count: self.logs.len(),
            attribute_count: self.attributes.len(),
            service_count: services.len(),
        }
    }

    pub fn complexity(&self) -> Vec<ComplexityEntry> {
        let mut out = Vec::new();
        for m in self.metrics.iter() {
            let max_card = max_key_cardinality(&m.label_keys);
            out.push(ComplexityEntry {
                signal_type: "metric",
                name: m.name.clone(),
                total_keys: m.label_keys.len(),
                max_key_cardinality: max_card,
                complexity: m.label_keys.len() as u64 * max_card,
            });
        }
        for s in self.spans.iter() {
            let max_card = max_key_cardinality(&s.attribute_keys);
            out.push(ComplexityEntry {
                signal_type: "span",
                name: s.name.clone(),
                total_keys: s.attribute_keys.len(),
                max_key_cardinality: max_card,
                complexity: s.attribute_keys.len() as u64 * max_card,
            });
        }
        for l in self.logs.iter() {
            let max_card = max_key_cardinality(&l.attribute_keys);
            out.push(ComplexityEntry {
                signal_type: "log",
                name: l.severity.clone(),
                total_keys: l.attribute_keys.len(),
                max_key_cardinality: max_card,
                complexity: l.attribute_keys.len() as u64 * max_card,
            });
        }
        out
    }

    pub fn high_cardinality_keys(&self, threshold: u64) -> Vec<HighCardinalityKey> {
        let mut out = Vec::new();
        for m in self.metrics.iter() {
            for (key, meta) in &m.label_keys {
                if meta.estimated_cardinality() >= threshold {
                    out.push(HighCardinalityKey {
                        signal_type: "metric",
                        signal_name: m.name.clone(),
                        key_scope: "label".to_string(),
                        key_name: key.clone(),
                        cardinality: meta.estimated_cardinality(),
                        samples: meta.value_samples.clone(),
                    });
                }
            }
            for (key, meta) in &m.resource_keys {
                if meta.estimated_cardinality() >= threshold {
                    out.push(HighCardinalityKey {
                        signal_type: "metric",
                        signal_name: m.name.clone(),
                        key_scope: "resource".to_string(),
                        key_name: key.clone(),
                        cardinality: meta.estimated_cardinality(),
                        samples: meta.value_samples.clone(),
                    });
                }
            }
        }
        for s in self.spans.iter() {
            for (key, meta) in &s.attribute_keys {
                if meta.estimated_cardinality() >= threshold {
                    out.push(HighCardinalityKey {
                        signal_type: "span",
                        signal_name: s.name.clone(),
                        key_scope: "attribute".to_string(),
                        key_name: key.clone(),
                        cardinality: meta.estimated_cardinality(),
                        samples: meta.value_samples.clone(),
                    });
                }
            }
        }
        for l in self.logs.iter() {
            for (key, meta) in &l.attribute_keys {
                if meta.estimated_cardinality() >= threshold {
                    out.push(HighCardinalityKey {
                        signal_type: "log",
                        signal_name: l.severity.clone(),
                        key_scope: "attribute".to_string(),
                        key_name: key.clone(),
                        cardinality: meta.estimated_cardinality(),
                        samples: meta.value_samples.clone(),
                    });
                }
            }
        }
        out
    }

    /// `Replace` load semantics (spec §4.8): atomically swap each
    /// signal's live map for the snapshot's contents.
    pub fn replace_from_serialized(
        &self,
        metrics: &[SerializedMetricMetadata],
        spans: &[SerializedSpanMetadata],
        logs: &[SerializedLogMetadata],
        attributes: &[SerializedAttributeMetadata],
    ) -> Result<(), CoreError> {
        let new_metrics = DashMap::new();
        for m in metrics {
            new_metrics.insert(m.name.clone(), MetricMetadata::from_serialized(m, self.sample_cap)?);
        }
        let new_spans = DashMap::new();
        for s in spans {
            new_spans.insert(
                s.name.clone(),
                SpanMetadata::from_serialized(s, self.sample_cap, self.template_cap, self.template_example_max_len, self.precision)?,
            );
        }
        let new_logs = DashMap::new();
        for l in logs {
            new_logs.insert(
                l.severity.clone(),
                LogMetadata::from_serialized(l, self.sample_cap, self.template_cap, self.template_example_max_len, self.precision)?,
            );
        }
        let new_attributes = DashMap::new();
        for a in attributes {
            new_attributes.insert(a.key.clone(), AttributeMetadata::from_serialized(a, self.sample_cap)?);
        }

        self.metrics.clear();
        for (k, v) in new_metrics {
            self.metrics.insert(k, v);
        }
        self.spans.clear();
        for (k, v) in new_spans {
            self.spans.insert(k, v);
        }
        self.logs.clear();
        for (k, v) in new_logs {
            self.logs.insert(k, v);
        }
        self.attributes.clear();
        for (k, v) in new_attributes {
            self.attributes.insert(k, v);
        }
        Ok(())
    }

    /// `Merge` load semantics (spec §4.8): fold snapshot aggregates into
    /// the current store using the same merge rules as ingestion.
    pub fn merge_from_serialized(
        &self,
        metrics: &[SerializedMetricMetadata],
        spans: &[SerializedSpanMetadata],
        logs: &[SerializedLogMetadata],
        attributes: &[SerializedAttributeMetadata],
    ) -> Result<(), CoreError> {
        for m in metrics {
            let incoming = MetricMetadata::from_serialized(m, self.sample_cap)?;
            match self.metrics.get_mut(&m.name) {
                Some(mut existing) => existing.merge(&incoming)?,
                None => {
                    self.metrics.entry(m.name.clone()).or_insert(incoming);
                }
            }
        }
        for s in spans {
            let incoming =
                SpanMetadata::from_serialized(s, self.sample_cap, self.template_cap, self.template_example_max_len, self.precision)?;
            match self.spans.get_mut(&s.name) {
                Some(mut existing) => existing.merge(&incoming)?,
                None => {
                    self.spans.entry(s.name.clone()).or_insert(incoming);
                }
            }
        }
        for l in logs {
            let incoming =
                LogMetadata::from_serialized(l, self.sample_cap, self.template_cap, self.template_example_max_len, self.precision)?;
            match self.logs.get_mut(&l.severity) {
                Some(mut existing) => existing.merge(&incoming)?,
                None => {
                    self.logs.entry(l.severity.clone()).or_insert(incoming);
                }
            }
        }
        for a in attributes {
            let incoming = AttributeMetadata::from_serialized(a, self.sample_cap)?;
            match self.attributes.get_mut(&a.key) {
                Some(mut existing) => existing.merge(&incoming)?,
                None => {
                    self.attributes.entry(a.key.clone()).or_insert(incoming);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::metric::{MetricDataPointUpdate, MetricType};

    fn config() -> CardinalityConfig {
        CardinalityConfig::default()
    }

    fn metric_update(status: &str) -> MetricUpdate {
        MetricUpdate {
            name: "http_requests_total".to_string(),
            description: "count".to_string(),
            unit: "1".to_string(),
            metric_type: MetricType::Sum,
            data_points: vec![MetricDataPointUpdate {
                label_values: vec![("status_code".to_string(), status.to_string())],
                resource_attribute_values: vec![],
                service_name: Some("api".to_string()),
            }],
        }
    }

    #[test]
    fn store_metric_creates_then_updates_same_entry() {
        let store = Store::new(&config()).unwrap();
        let cancel = CancellationToken::new();
        store.store_metric(&metric_update("200"), &cancel).unwrap();
        store.store_metric(&metric_update("404"), &cancel).unwrap();

        let metric = store.get_metric_by_name("http_requests_total").unwrap();
        assert_eq!(metric.sample_count, 2);
        assert_eq!(metric.label_keys.get("status_code").unwrap().estimated_cardinality, 2);
    }

    #[test]
    fn store_metric_also_populates_attribute_catalog() {
        let store = Store::new(&config()).unwrap();
        let cancel = CancellationToken::new();
        store.store_metric(&metric_update("200"), &cancel).unwrap();
        let attr = store.get_attribute_by_name("status_code").unwrap();
        assert_eq!(attr.count, 1);
    }

    #[test]
    fn high_cardinality_keys_surfaces_offenders() {
        let store = Store::new(&config()).unwrap();
        let cancel = CancellationToken::new();
        for i in 0..5000 {
            store
                .store_metric(
                    &MetricUpdate {
                        name: "noisy_metric".to_string(),
                        description: String::new(),
                        unit: String::new(),
                        metric_type: MetricType::Gauge,
                        data_points: vec![MetricDataPointUpdate {
                            label_values: vec![("user_id".to_string(), format!("u{i}"))],
                            resource_attribute_values: vec![],
                            service_name: None,
                        }],
                    },
                    &cancel,
                )
                .unwrap();
        }
        let offenders = store.high_cardinality_keys(100);
        assert!(offenders.iter().any(|o| o.key_name == "user_id" && o.cardinality >= 100));
    }

    #[test]
    fn clear_empties_all_maps() {
        let store = Store::new(&config()).unwrap();
        let cancel = CancellationToken::new();
        store.store_metric(&metric_update("200"), &cancel).unwrap();
        store.clear();
        assert_eq!(store.summary().metric_count, 0);
    }

    #[test]
    fn list_filters_by_min_samples() {
        let store = Store::new(&config()).unwrap();
        let cancel = CancellationToken::new();
        store.store_metric(&metric_update("200"), &cancel).unwrap();
        let filter = ListFilter {
            min_samples: Some(5),
            ..Default::default()
        };
        assert!(store.list_metrics(&filter).is_empty());
    }
}
