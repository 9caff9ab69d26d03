//! Register-based HyperLogLog distinct-value estimator.
//!
//! Precision is fixed per sketch at construction time; registers are
//! one byte each (simpler codec than packed 6-bit, chosen per the
//! "choose one and document" instruction in spec §4.1). Hashing uses
//! `XxHash64` seeded at 0, frozen as part of the snapshot format.

use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::error::CoreError;

pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 18;
pub const DEFAULT_PRECISION: u8 = 14;

/// A single HyperLogLog sketch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hll {
    precision: u8,
    registers: Vec<u8>,
}

impl Hll {
    pub fn new(precision: u8) -> Result<Self, CoreError> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(CoreError::Validation(format!(
                "invalid HLL precision {precision}, must be in [{MIN_PRECISION}, {MAX_PRECISION}]"
            )));
        }
        Ok(Self {
            precision,
            registers: vec![0u8; 1usize << precision],
        })
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn num_registers(&self) -> usize {
        1usize << self.precision
    }

    fn hash_value(value: &str) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(value.as_bytes());
        hasher.finish()
    }

    /// Add a string value to the sketch.
    pub fn add(&mut self, value: &str) {
        self.add_hash(Self::hash_value(value));
    }

    /// Add a pre-hashed 64-bit value, used when the caller already has a
    /// fingerprint (e.g. the series-level HLL in `MetricMetadata`).
    pub fn add_hash(&mut self, hash: u64) {
        let idx = (hash >> (64 - self.precision)) as usize;
        let w = (hash << self.precision) | (1u64 << (self.precision - 1));
        let rho = (w.leading_zeros() + 1) as u8;
        if rho > self.registers[idx] {
            self.registers[idx] = rho;
        }
    }

    fn alpha(&self) -> f64 {
        let m = self.num_registers() as f64;
        match self.num_registers() {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m),
        }
    }

    fn count_zeros(&self) -> usize {
        self.registers.iter().filter(|&&r| r == 0).count()
    }

    fn raw_estimate(&self) -> f64 {
        let m = self.num_registers() as f64;
        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2.0_f64.powi(-(r as i32)))
            .sum();
        self.alpha() * m * m / sum
    }

    /// Estimated distinct-value count, with small-range linear-counting
    /// correction. Never cached: callers recompute at read time per
    /// spec §4.2.
    pub fn count(&self) -> u64 {
        let m = self.num_registers() as f64;
        let raw = self.raw_estimate();

        if raw <= 2.5 * m {
            let zeros = self.count_zeros();
            if zeros > 0 {
                return (m * (m / zeros as f64).ln()).round() as u64;
            }
        }

        raw.round().max(0.0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }

    /// Merge another sketch into this one by taking the element-wise max
    /// of registers. Both sketches must share a precision.
    pub fn merge(&mut self, other: &Hll) -> Result<(), CoreError> {
        if self.precision != other.precision {
            return Err(CoreError::Validation(format!(
                "cannot merge HLL sketches of differing precision: {} vs {}",
                self.precision, other.precision
            )));
        }
        for (a, b) in self.registers.iter_mut().zip(other.registers.iter()) {
            if *b > *a {
                *a = *b;
            }
        }
        Ok(())
    }

    /// Binary codec: one precision byte followed by `2^precision`
    /// register bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.registers.len());
        out.push(self.precision);
        out.extend_from_slice(&self.registers);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::CorruptData("empty HLL payload".to_string()));
        }
        let precision = bytes[0];
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(CoreError::CorruptData(format!(
                "invalid HLL precision byte: {precision}"
            )));
        }
        let expected_len = 1 + (1usize << precision);
        if bytes.len() != expected_len {
            return Err(CoreError::CorruptData(format!(
                "expected {} bytes for precision {}, got {}",
                expected_len,
                precision,
                bytes.len()
            )));
        }
        Ok(Self {
            precision,
            registers: bytes[1..].to_vec(),
        })
    }

    /// Encode as `{precision, base64(registers)}` for the session format.
    pub fn to_encoded(&self) -> EncodedHll {
        EncodedHll {
            precision: self.precision,
            registers: base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                &self.registers,
            ),
        }
    }

    pub fn from_encoded(encoded: &EncodedHll) -> Result<Self, CoreError> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&encoded.precision) {
            return Err(CoreError::CorruptData(format!(
                "invalid HLL precision: {}",
                encoded.precision
            )));
        }
        let registers = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            &encoded.registers,
        )
        .map_err(|e| CoreError::CorruptData(format!("bad base64 registers: {e}")))?;
        let expected = 1usize << encoded.precision;
        if registers.len() != expected {
            return Err(CoreError::CorruptData(format!(
                "expected {} registers for precision {}, got {}",
                expected,
                encoded.precision,
                registers.len()
            )));
        }
        Ok(Self {
            precision: encoded.precision,
            registers,
        })
    }
}

/// Wire form of an HLL sketch: `{precision, base64(registers)}` per
/// spec §6 "Session file format".
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EncodedHll {
    pub precision: u8,
    pub registers: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sketch_counts_zero() {
        let hll = Hll::new(14).unwrap();
        assert!(hll.is_empty());
        assert_eq!(hll.count(), 0);
    }

    #[test]
    fn count_within_two_percent_for_large_cardinality() {
        let mut hll = Hll::new(14).unwrap();
        let n = 50_000u64;
        for i in 0..n {
            hll.add(&format!("item-{i}"));
        }
        let estimate = hll.count() as f64;
        let actual = n as f64;
        let relative_error = (estimate - actual).abs() / actual;
        assert!(
            relative_error <= 0.02,
            "relative error {relative_error} too high (estimate={estimate}, actual={actual})"
        );
    }

    #[test]
    fn merge_is_idempotent_on_empty() {
        let mut hll = Hll::new(12).unwrap();
        for i in 0..1000 {
            hll.add(&format!("v{i}"));
        }
        let before = hll.clone();
        let empty = Hll::new(12).unwrap();
        hll.merge(&empty).unwrap();
        assert_eq!(hll, before);
    }

    #[test]
    fn merge_equivalence_within_two_percent() {
        let mut a = Hll::new(14).unwrap();
        let mut b = Hll::new(14).unwrap();
        let mut combined = Hll::new(14).unwrap();

        for i in 0..3000u64 {
            a.add(&format!("v{i}"));
            combined.add(&format!("v{i}"));
        }
        for i in 1500..4500u64 {
            b.add(&format!("v{i}"));
            combined.add(&format!("v{i}"));
        }

        let mut merged = a.clone();
        merged.merge(&b).unwrap();

        let expected = combined.count() as f64;
        let got = merged.count() as f64;
        let relative_error = (got - expected).abs() / expected;
        assert!(relative_error <= 0.02, "relative error {relative_error} too high");
    }

    #[test]
    fn merge_rejects_precision_mismatch() {
        let mut a = Hll::new(14).unwrap();
        let b = Hll::new(12).unwrap();
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn byte_codec_round_trips() {
        let mut hll = Hll::new(10).unwrap();
        for i in 0..500 {
            hll.add(&format!("x{i}"));
        }
        let bytes = hll.to_bytes();
        let restored = Hll::from_bytes(&bytes).unwrap();
        assert_eq!(hll, restored);
    }

    #[test]
    fn codec_rejects_corrupt_length() {
        let hll = Hll::new(10).unwrap();
        let mut bytes = hll.to_bytes();
        bytes.pop();
        assert!(matches!(Hll::from_bytes(&bytes), Err(CoreError::CorruptData(_))));
    }

    #[test]
    fn encoded_round_trip_is_byte_exact() {
        let mut hll = Hll::new(11).unwrap();
        for i in 0..200 {
            hll.add(&format!("e{i}"));
        }
        let encoded = hll.to_encoded();
        let restored = Hll::from_encoded(&encoded).unwrap();
        assert_eq!(hll, restored);
    }
}
