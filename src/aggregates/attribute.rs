//! `AttributeMetadata`: the global attribute-name catalog (spec §3,
//! §4.4, §9). Maintained live alongside signal ingestion (see
//! SPEC_FULL.md §9) rather than computed lazily, so catalog reads stay
//! O(1).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hll::{EncodedHll, Hll};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Metric,
    Span,
    Log,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Metric => "metric",
            SignalType::Span => "span",
            SignalType::Log => "log",
        }
    }
}

/// Where an attribute name was observed: as a resource attribute, a
/// signal-level attribute/label, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeScope {
    Resource,
    Attribute,
    Both,
}

impl AttributeScope {
    fn combine(self, other: AttributeScope) -> AttributeScope {
        if self == other {
            self
        } else {
            AttributeScope::Both
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttributeMetadata {
    pub key: String,
    pub count: u64,
    pub value_samples: Vec<String>,
    pub signal_types: HashSet<SignalType>,
    pub scope: AttributeScope,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    hll: Hll,
    sample_cap: usize,
}

impl AttributeMetadata {
    pub fn new(
        key: &str,
        scope: AttributeScope,
        signal_type: SignalType,
        precision: u8,
        sample_cap: usize,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let mut signal_types = HashSet::new();
        signal_types.insert(signal_type);
        Ok(Self {
            key: key.to_string(),
            count: 0,
            value_samples: Vec::new(),
            signal_types,
            scope,
            first_seen: now,
            last_seen: now,
            hll: Hll::new(precision)?,
            sample_cap,
        })
    }

    pub fn estimated_cardinality(&self) -> u64 {
        self.hll.count()
    }

    /// Record one observation of this attribute key with `value`, from
    /// `signal_type` in `scope`, at time `now`.
    pub fn observe(
        &mut self,
        value: &str,
        scope: AttributeScope,
        signal_type: SignalType,
        now: DateTime<Utc>,
    ) {
        self.count += 1;
        self.hll.add(value);
        if self.value_samples.len() < self.sample_cap && !self.value_samples.iter().any(|v| v == value) {
            self.value_samples.push(value.to_string());
        }
        self.signal_types.insert(signal_type);
        self.scope = self.scope.combine(scope);
        if now < self.first_seen {
            self.first_seen = now;
        }
        if now > self.last_seen {
            self.last_seen = now;
        }
    }

    pub fn merge(&mut self, other: &AttributeMetadata) -> Result<(), CoreError> {
        self.count += other.count;
        self.hll.merge(&other.hll)?;
        for value in &other.value_samples {
            if self.value_samples.len() >= self.sample_cap {
                break;
            }
            if !self.value_samples.iter().any(|v| v == value) {
                self.value_samples.push(value.clone());
            }
        }
        for signal_type in &other.signal_types {
            self.signal_types.insert(*signal_type);
        }
        self.scope = self.scope.combine(other.scope);
        if other.first_seen < self.first_seen {
            self.first_seen = other.first_seen;
        }
        if other.last_seen > self.last_seen {
            self.last_seen = other.last_seen;
        }
        Ok(())
    }

    pub fn to_serialized(&self) -> SerializedAttributeMetadata {
        SerializedAttributeMetadata {
            key: self.key.clone(),
            count: self.count,
            value_samples: self.value_samples.clone(),
            estimated_cardinality: self.estimated_cardinality(),
            signal_types: self.signal_types.iter().map(|s| s.as_str().to_string()).collect(),
            scope: self.scope,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            hll: self.hll.to_encoded(),
        }
    }

    pub fn from_serialized(
        serialized: &SerializedAttributeMetadata,
        sample_cap: usize,
    ) -> Result<Self, CoreError> {
        let mut signal_types = HashSet::new();
        for s in &serialized.signal_types {
            signal_types.insert(match s.as_str() {
                "metric" => SignalType::Metric,
                "span" => SignalType::Span,
                "log" => SignalType::Log,
                other => return Err(CoreError::CorruptData(format!("unknown signal type: {other}"))),
            });
        }
        Ok(Self {
            key: serialized.key.clone(),
            count: serialized.count,
            value_samples: serialized.value_samples.clone(),
            signal_types,
            scope: serialized.scope,
            first_seen: serialized.first_seen,
            last_seen: serialized.last_seen,
            hll: Hll::from_encoded(&serialized.hll)?,
            sample_cap,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedAttributeMetadata {
    pub key: String,
    pub count: u64,
    pub value_samples: Vec<String>,
    pub estimated_cardinality: u64,
    pub signal_types: Vec<String>,
    pub scope: AttributeScope,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub hll: EncodedHll,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn observe_tracks_count_cardinality_and_scope() {
        let mut attr = AttributeMetadata::new(
            "http.method",
            AttributeScope::Attribute,
            SignalType::Span,
            14,
            20,
            ts(100),
        )
        .unwrap();
        attr.observe("GET", AttributeScope::Attribute, SignalType::Span, ts(150));
        attr.observe("POST", AttributeScope::Resource, SignalType::Metric, ts(50));
        assert_eq!(attr.count, 2);
        assert_eq!(attr.estimated_cardinality(), 2);
        assert_eq!(attr.scope, AttributeScope::Both);
        assert!(attr.signal_types.contains(&SignalType::Span));
        assert!(attr.signal_types.contains(&SignalType::Metric));
        assert_eq!(attr.first_seen, ts(50));
        assert_eq!(attr.last_seen, ts(150));
    }

    #[test]
    fn merge_unions_signal_types_and_widens_time_range() {
        let mut a = AttributeMetadata::new(
            "service.name",
            AttributeScope::Resource,
            SignalType::Metric,
            14,
            20,
            ts(100),
        )
        .unwrap();
        let mut b = AttributeMetadata::new(
            "service.name",
            AttributeScope::Resource,
            SignalType::Log,
            14,
            20,
            ts(200),
        )
        .unwrap();
        b.observe("checkout", AttributeScope::Resource, SignalType::Log, ts(300));
        a.merge(&b).unwrap();
        assert!(a.signal_types.contains(&SignalType::Log));
        assert_eq!(a.first_seen, ts(100));
        assert_eq!(a.last_seen, ts(300));
    }

    #[test]
    fn serialization_round_trips_scope_and_timestamps() {
        let mut attr = AttributeMetadata::new(
            "http.method",
            AttributeScope::Attribute,
            SignalType::Span,
            14,
            20,
            ts(100),
        )
        .unwrap();
        attr.observe("GET", AttributeScope::Attribute, SignalType::Span, ts(100));
        let serialized = attr.to_serialized();
        let restored = AttributeMetadata::from_serialized(&serialized, 20).unwrap();
        assert_eq!(restored.scope, AttributeScope::Attribute);
        assert_eq!(restored.first_seen, ts(100));
        assert_eq!(restored.count, 1);
    }
}
