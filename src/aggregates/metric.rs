//! `MetricMetadata`: per-metric-name aggregate (spec §3, §4.4).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::error::CoreError;
use crate::hll::{EncodedHll, Hll};
use crate::key_metadata::{KeyMetadata, SerializedKeyMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    Gauge,
    Sum,
    Histogram,
    ExponentialHistogram,
    Summary,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "Gauge",
            MetricType::Sum => "Sum",
            MetricType::Histogram => "Histogram",
            MetricType::ExponentialHistogram => "ExponentialHistogram",
            MetricType::Summary => "Summary",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "Gauge" => Ok(MetricType::Gauge),
            "Sum" => Ok(MetricType::Sum),
            "Histogram" => Ok(MetricType::Histogram),
            "ExponentialHistogram" => Ok(MetricType::ExponentialHistogram),
            "Summary" => Ok(MetricType::Summary),
            other => Err(CoreError::CorruptData(format!("unknown metric type: {other}"))),
        }
    }
}

/// One data point observed for a metric, as handed to the store by
/// `MetricsAnalyzer` (spec §4.5). Value objects only — no shared state.
#[derive(Debug, Clone, Default)]
pub struct MetricDataPointUpdate {
    pub label_values: Vec<(String, String)>,
    pub resource_attribute_values: Vec<(String, String)>,
    pub service_name: Option<String>,
}

/// Update descriptor for one metric observed in a batch.
#[derive(Debug, Clone)]
pub struct MetricUpdate {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub metric_type: MetricType,
    pub data_points: Vec<MetricDataPointUpdate>,
}

pub const UNKNOWN_SERVICE: &str = "unknown_service";

#[derive(Debug, Clone)]
pub struct MetricMetadata {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub metric_type: MetricType,
    pub sample_count: u64,
    active_series_hll: Hll,
    pub label_keys: HashMap<String, KeyMetadata>,
    pub resource_keys: HashMap<String, KeyMetadata>,
    pub services: HashMap<String, u64>,
    precision: u8,
    sample_cap: usize,
}

impl MetricMetadata {
    pub fn new(update: &MetricUpdate, precision: u8, sample_cap: usize) -> Result<Self, CoreError> {
        Ok(Self {
            name: update.name.clone(),
            description: update.description.clone(),
            unit: update.unit.clone(),
            metric_type: update.metric_type,
            sample_count: 0,
            active_series_hll: Hll::new(precision)?,
            label_keys: HashMap::new(),
            resource_keys: HashMap::new(),
            services: HashMap::new(),
            precision,
            sample_cap,
        })
    }

    pub fn active_series(&self) -> u64 {
        self.active_series_hll.count()
    }

    fn series_fingerprint(label_values: &[(String, String)]) -> u64 {
        let mut sorted: Vec<&(String, String)> = label_values.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let fingerprint: String = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(fingerprint.as_bytes());
        hasher.finish()
    }

    /// Apply an update descriptor: name/desc/unit are refreshed
    /// (description text tends to improve over time), `metric_type` is
    /// immutable once set.
    pub fn apply_update(&mut self, update: &MetricUpdate) -> Result<(), CoreError> {
        self.description = update.description.clone();
        self.unit = update.unit.clone();
        self.sample_count += update.data_points.len() as u64;

        for dp in &update.data_points {
            self.active_series_hll
                .add_hash(Self::series_fingerprint(&dp.label_values));

            for (key, value) in &dp.label_values {
                let entry = match self.label_keys.entry(key.clone()) {
                    Entry::Occupied(o) => o.into_mut(),
                    Entry::Vacant(v) => v.insert(KeyMetadata::new(self.precision, self.sample_cap)?),
                };
                entry.add_value(value);
            }
            for (key, value) in &dp.resource_attribute_values {
                let entry = match self.resource_keys.entry(key.clone()) {
                    Entry::Occupied(o) => o.into_mut(),
                    Entry::Vacant(v) => v.insert(KeyMetadata::new(self.precision, self.sample_cap)?),
                };
                entry.add_value(value);
            }

            let service = dp.service_name.clone().unwrap_or_else(|| UNKNOWN_SERVICE.to_string());
            *self.services.entry(service).or_insert(0) += 1;
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &MetricMetadata) -> Result<(), CoreError> {
        self.sample_count += other.sample_count;
        self.active_series_hll.merge(&other.active_series_hll)?;
        for (key, value) in &other.label_keys {
            match self.label_keys.get_mut(key) {
                Some(existing) => existing.merge(value)?,
                None => {
                    self.label_keys.insert(key.clone(), value.clone());
                }
            }
        }
        for (key, value) in &other.resource_keys {
            match self.resource_keys.get_mut(key) {
                Some(existing) => existing.merge(value)?,
                None => {
                    self.resource_keys.insert(key.clone(), value.clone());
                }
            }
        }
        for (service, count) in &other.services {
            *self.services.entry(service.clone()).or_insert(0) += count;
        }
        Ok(())
    }

    pub fn to_serialized(&self) -> SerializedMetricMetadata {
        SerializedMetricMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            metric_type: self.metric_type.as_str().to_string(),
            sample_count: self.sample_count,
            active_series: self.active_series(),
            active_series_hll: self.active_series_hll.to_encoded(),
            label_keys: self
                .label_keys
                .iter()
                .map(|(k, v)| (k.clone(), v.to_serialized()))
                .collect(),
            resource_keys: self
                .resource_keys
                .iter()
                .map(|(k, v)| (k.clone(), v.to_serialized()))
                .collect(),
            services: self.services.clone(),
        }
    }

    pub fn from_serialized(
        serialized: &SerializedMetricMetadata,
        sample_cap: usize,
    ) -> Result<Self, CoreError> {
        let active_series_hll = Hll::from_encoded(&serialized.active_series_hll)?;
        let precision = active_series_hll.precision();
        let mut label_keys = HashMap::new();
        for (k, v) in &serialized.label_keys {
            label_keys.insert(k.clone(), KeyMetadata::from_serialized(v, sample_cap)?);
        }
        let mut resource_keys = HashMap::new();
        for (k, v) in &serialized.resource_keys {
            resource_keys.insert(k.clone(), KeyMetadata::from_serialized(v, sample_cap)?);
        }
        Ok(Self {
            name: serialized.name.clone(),
            description: serialized.description.clone(),
            unit: serialized.unit.clone(),
            metric_type: MetricType::from_str(&serialized.metric_type)?,
            sample_count: serialized.sample_count,
            active_series_hll,
            label_keys,
            resource_keys,
            services: serialized.services.clone(),
            precision,
            sample_cap,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedMetricMetadata {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub metric_type: String,
    pub sample_count: u64,
    pub active_series: u64,
    pub active_series_hll: EncodedHll,
    pub label_keys: HashMap<String, SerializedKeyMetadata>,
    pub resource_keys: HashMap<String, SerializedKeyMetadata>,
    pub services: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_update() -> MetricUpdate {
        MetricUpdate {
            name: "http_requests_total".to_string(),
            description: "count of http requests".to_string(),
            unit: "1".to_string(),
            metric_type: MetricType::Sum,
            data_points: vec![],
        }
    }

    #[test]
    fn metric_round_trip_example_from_spec() {
        let mut update = sample_update();
        let statuses = [("200", 60), ("404", 30), ("500", 10)];
        for (status, count) in statuses {
            for _ in 0..count {
                update.data_points.push(MetricDataPointUpdate {
                    label_values: vec![("status_code".to_string(), status.to_string())],
                    resource_attribute_values: vec![],
                    service_name: Some("api".to_string()),
                });
            }
        }

        let mut metric = MetricMetadata::new(&update, 14, 20).unwrap();
        metric.apply_update(&update).unwrap();

        assert_eq!(metric.sample_count, 100);
        assert_eq!(metric.services.get("api"), Some(&100));

        let serialized = metric.to_serialized();
        let restored = MetricMetadata::from_serialized(&serialized, 20).unwrap();

        assert_eq!(restored.name, "http_requests_total");
        assert_eq!(restored.sample_count, 100);
        assert_eq!(restored.services.get("api"), Some(&100));
        assert_eq!(
            restored.label_keys.get("status_code").unwrap().estimated_cardinality(),
            3
        );
    }

    #[test]
    fn counter_monotonicity_across_multiple_applies() {
        let update = sample_update();
        let mut metric = MetricMetadata::new(&update, 14, 20).unwrap();

        let mut total = 0u64;
        for batch in 0..5 {
            let mut u = sample_update();
            for i in 0..(batch + 1) {
                u.data_points.push(MetricDataPointUpdate {
                    label_values: vec![("i".to_string(), i.to_string())],
                    resource_attribute_values: vec![],
                    service_name: None,
                });
            }
            total += u.data_points.len() as u64;
            metric.apply_update(&u).unwrap();
        }

        assert_eq!(metric.sample_count, total);
    }

    #[test]
    fn unknown_service_used_when_absent() {
        let mut update = sample_update();
        update.data_points.push(MetricDataPointUpdate {
            label_values: vec![],
            resource_attribute_values: vec![],
            service_name: None,
        });
        let mut metric = MetricMetadata::new(&update, 14, 20).unwrap();
        metric.apply_update(&update).unwrap();
        assert_eq!(metric.services.get(UNKNOWN_SERVICE), Some(&1));
    }

    #[test]
    fn metric_type_is_immutable_across_updates() {
        let update = sample_update();
        let mut metric = MetricMetadata::new(&update, 14, 20).unwrap();
        metric.apply_update(&update).unwrap();

        let mut other = sample_update();
        other.metric_type = MetricType::Gauge;
        metric.apply_update(&other).unwrap();

        assert_eq!(metric.metric_type, MetricType::Sum);
    }

    #[test]
    fn merge_sums_sample_counts_and_unions_keys() {
        let update = sample_update();
        let mut a = MetricMetadata::new(&update, 14, 20).unwrap();
        let mut u1 = sample_update();
        u1.data_points.push(MetricDataPointUpdate {
            label_values: vec![("status_code".to_string(), "200".to_string())],
            resource_attribute_values: vec![],
            service_name: Some("api".to_string()),
        });
        a.apply_update(&u1).unwrap();

        let mut b = MetricMetadata::new(&update, 14, 20).unwrap();
        let mut u2 = sample_update();
        u2.data_points.push(MetricDataPointUpdate {
            label_values: vec![("status_code".to_string(), "500".to_string())],
            resource_attribute_values: vec![],
            service_name: Some("api".to_string()),
        });
        b.apply_update(&u2).unwrap();

        a.merge(&b).unwrap();
        assert_eq!(a.sample_count, 2);
        assert_eq!(a.services.get("api"), Some(&2));
        assert_eq!(a.label_keys.get("status_code").unwrap().estimated_cardinality(), 2);
    }

    #[test]
    fn active_series_counts_distinct_label_combinations() {
        let mut update = sample_update();
        for status in ["200", "404", "200", "500"] {
            update.data_points.push(MetricDataPointUpdate {
                label_values: vec![("status_code".to_string(), status.to_string())],
                resource_attribute_values: vec![],
                service_name: Some("api".to_string()),
            });
        }
        let mut metric = MetricMetadata::new(&update, 14, 20).unwrap();
        metric.apply_update(&update).unwrap();
        assert_eq!(metric.active_series(), 3);
    }
}
