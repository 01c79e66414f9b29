//! Deterministic positional mask function
//!
//! Maps `(instance secret, position)` to a 32-bit mask through the SplitMix64
//! finalizer. Two containers constructed at the same time get independent
//! secrets and therefore independent mask families.

use rand::{thread_rng, RngCore};
use zeroize::Zeroize;

/// Weyl increment of the SplitMix64 generator.
const GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// Pseudorandom mask function over integer positions.
///
/// Positions may be negative; the masked container uses negative sentinel
/// positions for values that are not data bytes.
pub struct IndexMask {
    secret: u64,
}

impl IndexMask {
    /// Create a mask function with a fresh random instance secret.
    pub fn new() -> Self {
        IndexMask {
            secret: thread_rng().next_u64(),
        }
    }

    /// Full 32-bit mask for a position.
    pub fn int_mask(&self, position: i64) -> u32 {
        self.raw(position) as u32
    }

    /// Low byte of the mask for a position.
    pub fn byte_mask(&self, position: i64) -> u8 {
        self.raw(position) as u8
    }

    /// SplitMix64 output for the stream position `secret + position * GAMMA`.
    fn raw(&self, position: i64) -> u64 {
        let mut z = self
            .secret
            .wrapping_add((position as u64).wrapping_mul(GAMMA))
            .wrapping_add(GAMMA);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Wipe the instance secret. The mask function is unusable afterwards.
    pub(crate) fn destroy(&mut self) {
        self.secret.zeroize();
    }
}

impl Default for IndexMask {
    fn default() -> Self {
        IndexMask::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_are_deterministic_per_instance() {
        let masker = IndexMask::new();

        for position in [-97i64, -3, 0, 1, 17, 4999] {
            assert_eq!(masker.int_mask(position), masker.int_mask(position));
            assert_eq!(masker.byte_mask(position), masker.byte_mask(position));
        }
    }

    #[test]
    fn byte_mask_is_low_byte_of_int_mask() {
        let masker = IndexMask::new();

        for position in 0..100i64 {
            assert_eq!(masker.byte_mask(position), masker.int_mask(position) as u8);
        }
    }

    #[test]
    fn different_instances_disagree() {
        let first = IndexMask::new();
        let second = IndexMask::new();

        // 64 positions all colliding would mean the secrets are equal.
        let colliding = (0..64i64)
            .filter(|&i| first.int_mask(i) == second.int_mask(i))
            .count();
        assert!(colliding < 64);
    }

    #[test]
    fn masks_spread_over_positions() {
        let masker = IndexMask::new();

        let mut values: Vec<u32> = (0..256i64).map(|i| masker.int_mask(i)).collect();
        values.sort_unstable();
        values.dedup();
        // A PRF over 2^32 values must not collapse on 256 consecutive inputs.
        assert!(values.len() > 250);
    }
}
