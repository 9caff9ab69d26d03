//! `SpanMetadata`: per-span-template aggregate (spec §3, §4.4).
//!
//! Entries are keyed by the template extracted from the span name
//! (`crate::template::extract_template`) rather than the raw name, so
//! that e.g. `GET /users/123` and `GET /users/456` land in the same
//! entry. `name_patterns` then holds the distinct raw names observed
//! for that template, with counts — this is what gives `TemplateExtractor`
//! (spec §4.3, which names span names explicitly as an input) a role for
//! spans analogous to its role for log bodies.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::key_metadata::{KeyMetadata, SerializedKeyMetadata};
use crate::template::{TemplateEntry, TemplateSet};

/// `{0:Unspecified,1:Internal,2:Server,3:Client,4:Producer,5:Consumer}`
/// per spec §4.5.
pub fn kind_name(kind: u8) -> &'static str {
    match kind {
        0 => "Unspecified",
        1 => "Internal",
        2 => "Server",
        3 => "Client",
        4 => "Producer",
        5 => "Consumer",
        _ => "Unspecified",
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpanRecordUpdate {
    pub name: String,
    pub kind: u8,
    pub attribute_values: Vec<(String, String)>,
    pub resource_attribute_values: Vec<(String, String)>,
    pub event_names: Vec<String>,
    pub event_attribute_values: Vec<(String, Vec<(String, String)>)>,
    pub link_attribute_values: Vec<(String, String)>,
    pub status_code: String,
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SpanUpdate {
    pub records: Vec<SpanRecordUpdate>,
}

pub const EVENT_NAME_CAP: usize = 200;
pub const STATUS_CODE_CAP: usize = 32;

#[derive(Debug, Clone)]
pub struct SpanMetadata {
    pub name: String,
    pub kind: u8,
    pub attribute_keys: HashMap<String, KeyMetadata>,
    pub event_names: Vec<String>,
    pub event_attribute_keys: HashMap<String, HashMap<String, KeyMetadata>>,
    pub link_attribute_keys: HashMap<String, KeyMetadata>,
    pub resource_keys: HashMap<String, KeyMetadata>,
    pub status_codes: Vec<String>,
    pub name_patterns: TemplateSet,
    pub sample_count: u64,
    pub services: HashMap<String, u64>,
    precision: u8,
    sample_cap: usize,
}

use crate::aggregates::metric::UNKNOWN_SERVICE;

impl SpanMetadata {
    pub fn new(
        template_name: &str,
        first_record: &SpanRecordUpdate,
        precision: u8,
        sample_cap: usize,
        template_cap: usize,
        template_example_max_len: usize,
    ) -> Self {
        Self {
            name: template_name.to_string(),
            kind: first_record.kind,
            attribute_keys: HashMap::new(),
            event_names: Vec::new(),
            event_attribute_keys: HashMap::new(),
            link_attribute_keys: HashMap::new(),
            resource_keys: HashMap::new(),
            status_codes: Vec::new(),
            name_patterns: TemplateSet::new(template_cap, template_example_max_len),
            sample_count: 0,
            services: HashMap::new(),
            precision,
            sample_cap,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        kind_name(self.kind)
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

    pub fn apply_record(&mut self, record: &SpanRecordUpdate) -> Result<(), CoreError> {
        self.sample_count += 1;
        self.name_patterns.record(&record.name);

        for (key, value) in &record.attribute_values {
            Self::get_or_create(&mut self.attribute_keys, key, self.precision, self.sample_cap)?
                .add_value(value);
        }
        for (key, value) in &record.resource_attribute_values {
            Self::get_or_create(&mut self.resource_keys, key, self.precision, self.sample_cap)?
                .add_value(value);
        }
        for (key, value) in &record.link_attribute_values {
            Self::get_or_create(&mut self.link_attribute_keys, key, self.precision, self.sample_cap)?
                .add_value(value);
        }
        for name in &record.event_names {
            if !self.event_names.iter().any(|n| n == name) && self.event_names.len() < EVENT_NAME_CAP {
                self.event_names.push(name.clone());
            }
        }
        for (event_name, attrs) in &record.event_attribute_values {
            let keys = self
                .event_attribute_keys
                .entry(event_name.clone())
                .or_default();
            for (key, value) in attrs {
                Self::get_or_create(keys, key, self.precision, self.sample_cap)?.add_value(value);
            }
        }
        if !self.status_codes.iter().any(|s| s == &record.status_code)
            && self.status_codes.len() < STATUS_CODE_CAP
        {
            self.status_codes.push(record.status_code.clone());
        }

        let service = record
            .service_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_SERVICE.to_string());
        *self.services.entry(service).or_insert(0) += 1;
        Ok(())
    }

    pub fn merge(&mut self, other: &SpanMetadata) -> Result<(), CoreError> {
        self.sample_count += other.sample_count;
        self.name_patterns.merge(&other.name_patterns);

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
        for (key, value) in &other.link_attribute_keys {
            match self.link_attribute_keys.get_mut(key) {
                Some(existing) => existing.merge(value)?,
                None => {
                    self.link_attribute_keys.insert(key.clone(), value.clone());
                }
            }
        }
        for name in &other.event_names {
            if !self.event_names.iter().any(|n| n == name) && self.event_names.len() < EVENT_NAME_CAP {
                self.event_names.push(name.clone());
            }
        }
        for (event_name, other_keys) in &other.event_attribute_keys {
            let keys = self.event_attribute_keys.entry(event_name.clone()).or_default();
            for (key, value) in other_keys {
                match keys.get_mut(key) {
                    Some(existing) => existing.merge(value)?,
                    None => {
                        keys.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        for code in &other.status_codes {
            if !self.status_codes.iter().any(|s| s == code) && self.status_codes.len() < STATUS_CODE_CAP {
                self.status_codes.push(code.clone());
            }
        }
        for (service, count) in &other.services {
            *self.services.entry(service.clone()).or_insert(0) += count;
        }
        Ok(())
    }

    pub fn to_serialized(&self) -> SerializedSpanMetadata {
        SerializedSpanMetadata {
            name: self.name.clone(),
            kind: self.kind,
            kind_name: self.kind_name().to_string(),
            attribute_keys: map_to_serialized(&self.attribute_keys),
            event_names: self.event_names.clone(),
            event_attribute_keys: self
                .event_attribute_keys
                .iter()
                .map(|(k, v)| (k.clone(), map_to_serialized(v)))
                .collect(),
            link_attribute_keys: map_to_serialized(&self.link_attribute_keys),
            resource_keys: map_to_serialized(&self.resource_keys),
            status_codes: self.status_codes.clone(),
            name_patterns: self.name_patterns.entries().to_vec(),
            sample_count: self.sample_count,
            services: self.services.clone(),
        }
    }

    pub fn from_serialized(
        serialized: &SerializedSpanMetadata,
        sample_cap: usize,
        template_cap: usize,
        template_example_max_len: usize,
        precision: u8,
    ) -> Result<Self, CoreError> {
        let mut name_patterns = TemplateSet::new(template_cap, template_example_max_len);
        for entry in &serialized.name_patterns {
            name_patterns.restore_entry(entry.clone());
        }
        let mut event_attribute_keys = HashMap::new();
        for (event, keys) in &serialized.event_attribute_keys {
            event_attribute_keys.insert(event.clone(), map_from_serialized(keys, sample_cap)?);
        }
        Ok(Self {
            name: serialized.name.clone(),
            kind: serialized.kind,
            attribute_keys: map_from_serialized(&serialized.attribute_keys, sample_cap)?,
            event_names: serialized.event_names.clone(),
            event_attribute_keys,
            link_attribute_keys: map_from_serialized(&serialized.link_attribute_keys, sample_cap)?,
            resource_keys: map_from_serialized(&serialized.resource_keys, sample_cap)?,
            status_codes: serialized.status_codes.clone(),
            name_patterns,
            sample_count: serialized.sample_count,
            services: serialized.services.clone(),
            precision,
            sample_cap,
        })
    }
}

fn map_to_serialized(
    map: &HashMap<String, KeyMetadata>,
) -> HashMap<String, SerializedKeyMetadata> {
    map.iter().map(|(k, v)| (k.clone(), v.to_serialized())).collect()
}

fn map_from_serialized(
    map: &HashMap<String, SerializedKeyMetadata>,
    sample_cap: usize,
) -> Result<HashMap<String, KeyMetadata>, CoreError> {
    let mut out = HashMap::new();
    for (k, v) in map {
        out.insert(k.clone(), KeyMetadata::from_serialized(v, sample_cap)?);
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedSpanMetadata {
    pub name: String,
    pub kind: u8,
    pub kind_name: String,
    pub attribute_keys: HashMap<String, SerializedKeyMetadata>,
    pub event_names: Vec<String>,
    pub event_attribute_keys: HashMap<String, HashMap<String, SerializedKeyMetadata>>,
    pub link_attribute_keys: HashMap<String, SerializedKeyMetadata>,
    pub resource_keys: HashMap<String, SerializedKeyMetadata>,
    pub status_codes: Vec<String>,
    pub name_patterns: Vec<TemplateEntry>,
    pub sample_count: u64,
    pub services: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, kind: u8) -> SpanRecordUpdate {
        SpanRecordUpdate {
            name: name.to_string(),
            kind,
            status_code: "OK".to_string(),
            service_name: Some("checkout".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn span_kind_mapping_from_spec() {
        assert_eq!(kind_name(2), "Server");
        assert_eq!(kind_name(0), "Unspecified");
        assert_eq!(kind_name(5), "Consumer");
    }

    #[test]
    fn apply_record_tracks_sample_count_and_services() {
        let r = record("GET /users/1", 2);
        let mut span = SpanMetadata::new("GET /users/<ID>", &r, 14, 20, 200, 512);
        span.apply_record(&r).unwrap();
        span.apply_record(&record("GET /users/2", 2)).unwrap();
        assert_eq!(span.sample_count, 2);
        assert_eq!(span.services.get("checkout"), Some(&2));
        assert_eq!(span.kind_name(), "Server");
    }

    #[test]
    fn event_names_and_status_codes_are_deduped() {
        let mut r = record("op", 1);
        r.event_names = vec!["retry".to_string(), "retry".to_string()];
        let mut span = SpanMetadata::new("op", &r, 14, 20, 200, 512);
        span.apply_record(&r).unwrap();
        span.apply_record(&r).unwrap();
        assert_eq!(span.event_names, vec!["retry".to_string()]);
        assert_eq!(span.status_codes, vec!["OK".to_string()]);
    }

    #[test]
    fn serialization_round_trips_name_patterns() {
        let r = record("GET /users/1", 2);
        let mut span = SpanMetadata::new("GET /users/<ID>", &r, 14, 20, 200, 512);
        span.apply_record(&r).unwrap();
        span.apply_record(&record("GET /users/2", 2)).unwrap();

        let serialized = span.to_serialized();
        let restored = SpanMetadata::from_serialized(&serialized, 20, 200, 512, 14).unwrap();
        assert_eq!(restored.sample_count, 2);
        assert_eq!(restored.name_patterns.entries().len(), 2);
    }
}
