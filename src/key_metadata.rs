//! Per-label/attribute key summary: occurrence count, bounded value
//! samples, and a distinct-value HLL sketch.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hll::{EncodedHll, Hll};

#[derive(Debug, Clone)]
pub struct KeyMetadata {
    pub count: u64,
    pub value_samples: Vec<String>,
    hll: Hll,
    sample_cap: usize,
}

impl KeyMetadata {
    pub fn new(precision: u8, sample_cap: usize) -> Result<Self, CoreError> {
        Ok(Self {
            count: 0,
            value_samples: Vec::new(),
            hll: Hll::new(precision)?,
            sample_cap,
        })
    }

    /// Record one occurrence of `value` on this key.
    pub fn add_value(&mut self, value: &str) {
        self.count += 1;
        self.hll.add(value);
        if self.value_samples.len() < self.sample_cap
            && !self.value_samples.iter().any(|v| v == value)
        {
            self.value_samples.push(value.to_string());
        }
    }

    /// Estimated number of distinct values observed, recomputed from the
    /// HLL sketch at call time (never cached).
    pub fn estimated_cardinality(&self) -> u64 {
        self.hll.count()
    }

    pub fn percentage(&self, parent_sample_count: u64) -> f64 {
        if parent_sample_count == 0 {
            0.0
        } else {
            self.count as f64 / parent_sample_count as f64 * 100.0
        }
    }

    /// Fold another key's observations into this one: counts sum, HLLs
    /// merge, value samples union up to the cap (first-seen order
    /// preserved — `self`'s existing samples keep priority).
    pub fn merge(&mut self, other: &KeyMetadata) -> Result<(), CoreError> {
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
        Ok(())
    }

    pub fn to_serialized(&self) -> SerializedKeyMetadata {
        SerializedKeyMetadata {
            count: self.count,
            value_samples: self.value_samples.clone(),
            estimated_cardinality: self.estimated_cardinality(),
            hll: self.hll.to_encoded(),
        }
    }

    pub fn from_serialized(
        serialized: &SerializedKeyMetadata,
        sample_cap: usize,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            count: serialized.count,
            value_samples: serialized.value_samples.clone(),
            hll: Hll::from_encoded(&serialized.hll)?,
            sample_cap,
        })
    }
}

/// Wire form of `KeyMetadata` for the session snapshot format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedKeyMetadata {
    pub count: u64,
    pub value_samples: Vec<String>,
    pub estimated_cardinality: u64,
    pub hll: EncodedHll,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_value_tracks_count_and_samples() {
        let mut key = KeyMetadata::new(14, 20).unwrap();
        key.add_value("200");
        key.add_value("200");
        key.add_value("404");
        assert_eq!(key.count, 3);
        assert_eq!(key.value_samples, vec!["200".to_string(), "404".to_string()]);
        assert_eq!(key.estimated_cardinality(), 2);
    }

    #[test]
    fn value_samples_are_capped() {
        let mut key = KeyMetadata::new(14, 3).unwrap();
        for i in 0..10 {
            key.add_value(&format!("v{i}"));
        }
        assert_eq!(key.value_samples.len(), 3);
        assert_eq!(key.count, 10);
    }

    #[test]
    fn percentage_uses_parent_sample_count() {
        let mut key = KeyMetadata::new(14, 20).unwrap();
        for _ in 0..60 {
            key.add_value("200");
        }
        assert!((key.percentage(100) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn merge_combines_counts_and_samples() {
        let mut a = KeyMetadata::new(14, 20).unwrap();
        a.add_value("1");
        a.add_value("2");
        let mut b = KeyMetadata::new(14, 20).unwrap();
        b.add_value("2");
        b.add_value("3");
        a.merge(&b).unwrap();
        assert_eq!(a.count, 4);
        assert_eq!(a.value_samples, vec!["1".to_string(), "2".to_string(), "3".to_string()]);
    }

    #[test]
    fn round_trip_through_serialized_form() {
        let mut key = KeyMetadata::new(12, 20).unwrap();
        key.add_value("a");
        key.add_value("b");
        let serialized = key.to_serialized();
        let restored = KeyMetadata::from_serialized(&serialized, 20).unwrap();
        assert_eq!(restored.count, key.count);
        assert_eq!(restored.value_samples, key.value_samples);
        assert_eq!(restored.estimated_cardinality(), key.estimated_cardinality());
    }
}
