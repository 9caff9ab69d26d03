//! `LogMetadata`: per-severity aggregate (spec §3, §4.4).
//!
//! Entries are keyed by severity text, uppercased on ingest; missing
//! severity becomes `"UNSET"` (Open Question resolution, see SPEC_FULL.md).

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::{Deserialize, Serialize};

use crate::aggregates::metric::UNKNOWN_SERVICE;
use crate::error::CoreError;
use crate::key_metadata::{KeyMetadata, SerializedKeyMetadata};
use crate::template::{TemplateEntry, TemplateSet};

pub const UNSET_SEVERITY: &str = "UNSET";
pub const EVENT_NAME_CAP: usize = 200;

/// Normalize a raw severity string per the Open Question resolution:
/// uppercase, or `UNSET` if absent/blank.
pub fn normalize_severity(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_uppercase(),
        _ => UNSET_SEVERITY.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogRecordUpdate {
    pub severity: Option<String>,
    pub severity_number: i32,
    pub body: String,
    pub event_name: Option<String>,
    pub attribute_values: Vec<(String, String)>,
    pub resource_attribute_values: Vec<(String, String)>,
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LogUpdate {
    pub records: Vec<LogRecordUpdate>,
}

#[derive(Debug, Clone)]
pub struct LogMetadata {
    pub severity: String,
    pub severity_number: i32,
    pub attribute_keys: HashMap<String, KeyMetadata>,
    pub resource_keys: HashMap<String, KeyMetadata>,
    pub body_templates: TemplateSet,
    pub event_names: Vec<String>,
    pub sample_count: u64,
    pub services: HashMap<String, u64>,
    precision: u8,
    sample_cap: usize,
}

impl LogMetadata {
    pub fn new(
        severity: &str,
        severity_number: i32,
        precision: u8,
        sample_cap: usize,
        template_cap: usize,
        template_example_max_len: usize,
    ) -> Self {
        Self {
            severity: severity.to_string(),
            severity_number,
            attribute_keys: HashMap::new(),
            resource_keys: HashMap::new(),
            body_templates: TemplateSet::new(template_cap, template_example_max_len),
            event_names: Vec::new(),
            sample_count: 0,
            services: HashMap::new(),
            precision,
            sample_cap,
        }
    }

    fn get_or_create<'a>(
        map: &'a mut HashMap<String, KeyMetadata>,
        key: &str,
        precision: u8,
        sample_cap: usize,
    ) -> Result<&'a mut KeyMetadata, CoreError> {
        Ok(match map.entry(key.to_string()) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => v.insert(KeyMetadata::new(precision, sample_cap)?),
        })
    }

    pub fn apply_record(&mut self, record: &LogRecordUpdate) -> Result<(), CoreError> {
        self.sample_count += 1;
        self.severity_number = record.severity_number;
        if !record.body.is_empty() {
            self.body_templates.record(&record.body);
        }
        for (key, value) in &record.attribute_values {
            Self::get_or_create(&mut self.attribute_keys, key, self.precision, self.sample_cap)?
                .add_value(value);
        }
        for (key, value) in &record.resource_attribute_values {
            Self::get_or_create(&mut self.resource_keys, key, self.precision, self.sample_cap)?
                .add_value(value);
        }
        if let Some(event_name) = &record.event_name {
            if !self.event_names.iter().any(|n| n == event_name) && self.event_names.len() < EVENT_NAME_CAP {
                self.event_names.push(event_name.clone());
            }
        }
        let service = record
            .service_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_SERVICE.to_string());
        *self.services.entry(service).or_insert(0) += 1;
        Ok(())
    }

    pub fn merge(&mut self, other: &LogMetadata) -> Result<(), CoreError> {
        self.sample_count += other.sample_count;
        self.body_templates.merge(&other.body_templates);
        for (key, value) in &other.attribute_keys {
            match self.attribute_keys.get_mut(key) {
                Some(existing) => existing.merge(value)?,
                None => {
                    self.attribute_keys.insert(key.clone(), value.clone());
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
        for name in &other.event_names {
            if !self.event_names.iter().any(|n| n == name) && self.event_names.len() < EVENT_NAME_CAP {
                self.event_names.push(name.clone());
            }
        }
        for (service, count) in &other.services {
            *self.services.entry(service.clone()).or_insert(0) += count;
        }
        Ok(())
    }

    pub fn to_serialized(&self) -> SerializedLogMetadata {
        SerializedLogMetadata {
            severity: self.severity.clone(),
            severity_number: self.severity_number,
            attribute_keys: self
                .attribute_keys
                .iter()
                .map(|(k, v)| (k.clone(), v.to_serialized()))
                .collect(),
            resource_keys: self
                .resource_keys
                .iter()
                .map(|(k, v)| (k.clone(), v.to_serialized()))
                .collect(),
            body_templates: self.body_templates.entries().to_vec(),
            event_names: self.event_names.clone(),
            sample_count: self.sample_count,
            services: self.services.clone(),
        }
    }

    pub fn from_serialized(
        serialized: &SerializedLogMetadata,
        sample_cap: usize,
        template_cap: usize,
        template_example_max_len: usize,
        precision: u8,
    ) -> Result<Self, CoreError> {
        let mut attribute_keys = HashMap::new();
        for (k, v) in &serialized.attribute_keys {
            attribute_keys.insert(k.clone(), KeyMetadata::from_serialized(v, sample_cap)?);
        }
        let mut resource_keys = HashMap::new();
        for (k, v) in &serialized.resource_keys {
            resource_keys.insert(k.clone(), KeyMetadata::from_serialized(v, sample_cap)?);
        }
        let mut body_templates = TemplateSet::new(template_cap, template_example_max_len);
        for entry in &serialized.body_templates {
            body_templates.restore_entry(entry.clone());
        }
        Ok(Self {
            severity: serialized.severity.clone(),
            severity_number: serialized.severity_number,
            attribute_keys,
            resource_keys,
            body_templates,
            event_names: serialized.event_names.clone(),
            sample_count: serialized.sample_count,
            services: serialized.services.clone(),
            precision,
            sample_cap,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedLogMetadata {
    pub severity: String,
    pub severity_number: i32,
    pub attribute_keys: HashMap<String, SerializedKeyMetadata>,
    pub resource_keys: HashMap<String, SerializedKeyMetadata>,
    pub body_templates: Vec<TemplateEntry>,
    pub event_names: Vec<String>,
    pub sample_count: u64,
    pub services: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(body: &str) -> LogRecordUpdate {
        LogRecordUpdate {
            severity: Some("error".to_string()),
            severity_number: 17,
            body: body.to_string(),
            event_name: None,
            attribute_values: vec![],
            resource_attribute_values: vec![],
            service_name: Some("checkout".to_string()),
        }
    }

    #[test]
    fn severity_is_uppercased_on_normalize() {
        assert_eq!(normalize_severity(Some("error")), "ERROR");
        assert_eq!(normalize_severity(Some("  warn  ")), "WARN");
        assert_eq!(normalize_severity(None), "UNSET");
        assert_eq!(normalize_severity(Some("")), "UNSET");
    }

    #[test]
    fn apply_record_extracts_body_templates() {
        let mut log = LogMetadata::new("ERROR", 17, 14, 20, 200, 512);
        log.apply_record(&record("user 4831 logged in from 10.2.3.4")).unwrap();
        log.apply_record(&record("user 77 logged in from 10.0.0.9")).unwrap();
        assert_eq!(log.sample_count, 2);
        assert_eq!(log.body_templates.entries().len(), 1);
        assert_eq!(
            log.body_templates.entries()[0].template,
            "user <NUM> logged in from <IP>"
        );
        assert_eq!(log.body_templates.entries()[0].count, 2);
    }

    #[test]
    fn merge_unions_templates_and_services() {
        let mut a = LogMetadata::new("ERROR", 17, 14, 20, 200, 512);
        a.apply_record(&record("disk full")).unwrap();
        let mut b = LogMetadata::new("ERROR", 17, 14, 20, 200, 512);
        b.apply_record(&record("disk full")).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.sample_count, 2);
        assert_eq!(a.body_templates.entries()[0].count, 2);
        assert_eq!(a.services.get("checkout"), Some(&2));
    }

    #[test]
    fn serialization_round_trips_severity_number() {
        let mut log = LogMetadata::new("ERROR", 17, 14, 20, 200, 512);
        log.apply_record(&record("boom")).unwrap();
        let serialized = log.to_serialized();
        let restored = LogMetadata::from_serialized(&serialized, 20, 200, 512, 14).unwrap();
        assert_eq!(restored.severity_number, 17);
        assert_eq!(restored.sample_count, 1);
    }
}
