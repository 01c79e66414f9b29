//! Shannon entropy statistics over byte streams
//!
//! The envelope engine gates key derivation on the information content of
//! the supplied source bytes, so that keys are never derived from material
//! an attacker could guess byte-for-byte.

use std::f64::consts::LN_2;

/// Accumulates a byte-value histogram and derives entropy statistics.
pub struct EntropyAccumulator {
    /// How many times each byte value was seen.
    counts: [u64; 256],
    /// Total number of bytes added.
    total: u64,
}

impl EntropyAccumulator {
    pub fn new() -> Self {
        EntropyAccumulator {
            counts: [0; 256],
            total: 0,
        }
    }

    /// Reset the statistics.
    pub fn reset(&mut self) {
        self.counts = [0; 256];
        self.total = 0;
    }

    /// Add all bytes of a slice to the statistics.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.counts[byte as usize] += 1;
        }

        self.total += bytes.len() as u64;
    }

    /// Number of bytes added so far.
    pub fn count(&self) -> u64 {
        self.total
    }

    /// Entropy in bits per byte.
    pub fn entropy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        let inverse_total = 1.0 / self.total as f64;

        let mut result = 0.0;
        for &count in self.counts.iter() {
            if count > 0 {
                let p = count as f64 * inverse_total;
                result -= p * p.ln();
            }
        }

        result / LN_2
    }

    /// Entropy as a fraction of the maximum possible for the sample count.
    ///
    /// Needs at least two bytes of input; returns `None` below that.
    pub fn relative_entropy(&self) -> Option<f64> {
        if self.total > 1 {
            Some(self.entropy() / ((self.total as f64).ln() / LN_2))
        } else {
            None
        }
    }

    /// Information content in bits: entropy per byte times byte count.
    pub fn information_in_bits(&self) -> u64 {
        (self.entropy() * self.total as f64).round() as u64
    }
}

impl Default for EntropyAccumulator {
    fn default() -> Self {
        EntropyAccumulator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stream_has_no_entropy() {
        let accumulator = EntropyAccumulator::new();

        assert_eq!(accumulator.entropy(), 0.0);
        assert_eq!(accumulator.information_in_bits(), 0);
        assert_eq!(accumulator.count(), 0);
    }

    #[test]
    fn identical_bytes_have_no_entropy() {
        let mut accumulator = EntropyAccumulator::new();
        accumulator.add_bytes(&[0u8; 100]);

        assert_eq!(accumulator.entropy(), 0.0);
        assert_eq!(accumulator.information_in_bits(), 0);
        assert_eq!(accumulator.count(), 100);
    }

    #[test]
    fn uniform_bytes_have_eight_bits_per_byte() {
        let mut accumulator = EntropyAccumulator::new();
        let uniform: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
        accumulator.add_bytes(&uniform);

        assert!((accumulator.entropy() - 8.0).abs() < 1e-9);
        assert_eq!(accumulator.information_in_bits(), 8 * 1024);
    }

    #[test]
    fn two_valued_stream_has_one_bit_per_byte() {
        let mut accumulator = EntropyAccumulator::new();
        let alternating: Vec<u8> = (0..200).map(|i| (i % 2) as u8).collect();
        accumulator.add_bytes(&alternating);

        assert!((accumulator.entropy() - 1.0).abs() < 1e-9);
        assert_eq!(accumulator.information_in_bits(), 200);
    }

    #[test]
    fn accumulates_across_calls() {
        let mut accumulator = EntropyAccumulator::new();
        accumulator.add_bytes(&[0u8; 50]);
        accumulator.add_bytes(&[1u8; 50]);

        assert_eq!(accumulator.count(), 100);
        assert!((accumulator.entropy() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn relative_entropy_needs_two_bytes() {
        let mut accumulator = EntropyAccumulator::new();
        assert!(accumulator.relative_entropy().is_none());

        accumulator.add_bytes(&[0, 1]);
        let relative = accumulator.relative_entropy().unwrap();
        assert!((relative - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_statistics() {
        let mut accumulator = EntropyAccumulator::new();
        accumulator.add_bytes(&[0, 1, 2, 3]);

        accumulator.reset();

        assert_eq!(accumulator.count(), 0);
        assert_eq!(accumulator.entropy(), 0.0);
    }
}
