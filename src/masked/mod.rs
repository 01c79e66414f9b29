//! Masked in-memory byte container
//!
//! Stores a byte array shuffled into a randomized, padded backing buffer and
//! XOR-masked by a position-dependent mask function, so the plaintext never
//! appears contiguously in a process memory dump. This is defense in depth
//! against casual memory inspection, not a cryptographic barrier.

mod mask;

pub use mask::IndexMask;

use crate::crypto::constant_time_eq;
use crate::error::{Error, Result};
use rand::{thread_rng, Rng, RngCore};
use zeroize::{Zeroize, Zeroizing};

/// Backing buffers are allocated in multiples of this block size.
const STORE_BLOCK_SIZE: usize = 50;

/// Largest payload this container accepts.
const MAX_PAYLOAD_LENGTH: usize = (i32::MAX as usize / STORE_BLOCK_SIZE) * STORE_BLOCK_SIZE;

// Sentinel positions for values that are not data bytes. Any negative
// value works; they only have to be distinct from each other.
const SENTINEL_LENGTH: i64 = -3;
const SENTINEL_START: i64 = -97;

/// A byte array stored in scattered, masked form.
///
/// The container is valid from construction until [`MaskedBytes::destroy`],
/// at which point all buffers are zeroed and every accessor fails.
pub struct MaskedBytes {
    /// Scatter store, prefilled with random bytes.
    data: Vec<u8>,
    /// Masked permutation of `0..data.len()`.
    index: Vec<u32>,
    /// Payload length, masked under `SENTINEL_LENGTH`.
    masked_length: u32,
    /// Start offset into the index array, masked under `SENTINEL_START`.
    masked_start: u32,
    masker: IndexMask,
    hash: u64,
    changed: bool,
    valid: bool,
}

impl MaskedBytes {
    /// Create a container holding a copy of `source`.
    pub fn new(source: &[u8]) -> Result<Self> {
        Self::with_range(source, 0, source.len())
    }

    /// Create a container holding `length` bytes of `source` starting at
    /// `offset`.
    pub fn with_range(source: &[u8], offset: usize, length: usize) -> Result<Self> {
        if length > MAX_PAYLOAD_LENGTH {
            return Err(Error::InvalidArgument("source array is too large".to_string()));
        }

        if source.len() < offset || source.len() - offset < length {
            return Err(Error::InvalidArgument(
                "source array too short for offset and length".to_string(),
            ));
        }

        let mut rng = thread_rng();
        let masker = IndexMask::new();

        let store_length = length + (STORE_BLOCK_SIZE - length % STORE_BLOCK_SIZE);

        let mut data = vec![0u8; store_length];
        rng.fill_bytes(&mut data);

        // Inside-out Fisher-Yates shuffle of 0..store_length.
        let mut index = vec![0u32; store_length];
        for i in 1..store_length {
            let j = rng.gen_range(0..=i);
            index[i] = index[j];
            index[j] = i as u32;
        }

        for (position, slot) in index.iter_mut().enumerate() {
            *slot ^= masker.int_mask(position as i64);
        }

        let start = rng.gen_range(0..=store_length - length);
        let masked_start = (start as u32) ^ masker.int_mask(SENTINEL_START);
        let masked_length = (length as u32) ^ masker.int_mask(SENTINEL_LENGTH);

        let mut result = MaskedBytes {
            data,
            index,
            masked_length,
            masked_start,
            masker,
            hash: 0,
            changed: false,
            valid: true,
        };

        for i in 0..length {
            let slot = result.slot(i);
            result.data[slot] = result.masker.byte_mask(i as i64) ^ source[offset + i];
        }

        result.recompute_hash();

        Ok(result)
    }

    /// Byte at logical index `index`.
    pub fn get_at(&self, index: usize) -> Result<u8> {
        self.check_index(index)?;

        Ok(self.masker.byte_mask(index as i64) ^ self.data[self.slot(index)])
    }

    /// Overwrite the byte at logical index `index`.
    pub fn set_at(&mut self, index: usize, value: u8) -> Result<()> {
        self.check_index(index)?;

        let slot = self.slot(index);
        self.data[slot] = self.masker.byte_mask(index as i64) ^ value;
        self.changed = true;

        Ok(())
    }

    /// Freshly allocated plaintext copy of the contents. The copy wipes
    /// itself when dropped.
    pub fn to_vec(&self) -> Result<Zeroizing<Vec<u8>>> {
        self.check_valid()?;

        Ok(self.plaintext())
    }

    /// Length of the stored payload.
    pub fn len(&self) -> Result<usize> {
        self.check_valid()?;

        Ok(self.payload_length())
    }

    /// Whether the container still holds data.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Hash of the current contents, recomputed lazily after mutations.
    pub fn content_hash(&mut self) -> Result<u64> {
        self.check_valid()?;

        if self.changed {
            self.recompute_hash();
        }

        Ok(self.hash)
    }

    /// Zero all buffers and invalidate the container. Idempotent.
    pub fn destroy(&mut self) {
        if !self.valid {
            return;
        }

        self.valid = false;
        self.changed = false;
        self.hash = 0;
        self.masked_length = 0;
        self.masked_start = 0;
        self.data.zeroize();
        self.index.zeroize();
        self.masker.destroy();
    }

    fn check_valid(&self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::Destroyed("masked byte container"))
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        self.check_valid()?;

        let length = self.payload_length();
        if index >= length {
            return Err(Error::IndexOutOfBounds { index, length });
        }

        Ok(())
    }

    fn payload_length(&self) -> usize {
        (self.masked_length ^ self.masker.int_mask(SENTINEL_LENGTH)) as usize
    }

    fn start_offset(&self) -> usize {
        (self.masked_start ^ self.masker.int_mask(SENTINEL_START)) as usize
    }

    /// Physical slot in the data array for a logical index.
    fn slot(&self, index: usize) -> usize {
        let position = index + self.start_offset();

        (self.index[position] ^ self.masker.int_mask(position as i64)) as usize
    }

    fn plaintext(&self) -> Zeroizing<Vec<u8>> {
        let length = self.payload_length();
        let mut result = Zeroizing::new(vec![0u8; length]);

        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.masker.byte_mask(i as i64) ^ self.data[self.slot(i)];
        }

        result
    }

    fn recompute_hash(&mut self) {
        let content = self.plaintext();

        let mut hash: u64 = 1;
        for &byte in content.iter() {
            hash = hash.wrapping_mul(31).wrapping_add(byte as u64);
        }

        self.hash = hash;
        self.changed = false;
    }
}

impl std::fmt::Debug for MaskedBytes {
    /// Deliberately omits the scatter store, index, and mask state so that
    /// secret material never appears in debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskedBytes")
            .field("valid", &self.valid)
            .field("changed", &self.changed)
            .finish_non_exhaustive()
    }
}

impl PartialEq for MaskedBytes {
    /// Constant-time comparison of the underlying plaintexts. Destroyed
    /// containers compare unequal to everything.
    fn eq(&self, other: &Self) -> bool {
        let this = match self.to_vec() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let that = match other.to_vec() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        constant_time_eq(&this, &that)
    }
}

impl Eq for MaskedBytes {}

impl Drop for MaskedBytes {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_contents() {
        for length in [0usize, 1, 13, 49, 50, 51, 200] {
            let source: Vec<u8> = (0..length).map(|i| (i * 7) as u8).collect();
            let masked = MaskedBytes::new(&source).unwrap();

            assert_eq!(masked.len().unwrap(), length);
            assert_eq!(&*masked.to_vec().unwrap(), &source);
        }
    }

    #[test]
    fn store_is_padded_to_block_multiple() {
        let masked = MaskedBytes::new(&[1, 2, 3]).unwrap();
        assert_eq!(masked.data.len(), 50);

        let masked = MaskedBytes::new(&[0u8; 50]).unwrap();
        assert_eq!(masked.data.len(), 100);
    }

    #[test]
    fn plaintext_is_not_contiguous_in_store() {
        let source: Vec<u8> = (0u8..200).collect();
        let masked = MaskedBytes::new(&source).unwrap();

        // The backing store must not contain the source as a substring.
        let store = &masked.data;
        let found = store
            .windows(source.len())
            .any(|window| window == source.as_slice());
        assert!(!found);
    }

    #[test]
    fn with_range_extracts_window() {
        let source: Vec<u8> = (0u8..64).collect();
        let masked = MaskedBytes::with_range(&source, 16, 16).unwrap();

        assert_eq!(&*masked.to_vec().unwrap(), &source[16..32]);
    }

    #[test]
    fn with_range_rejects_short_source() {
        let source = [0u8; 10];

        assert!(matches!(
            MaskedBytes::with_range(&source, 8, 5),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            MaskedBytes::with_range(&source, 11, 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn get_and_set_single_bytes() {
        let mut masked = MaskedBytes::new(&[10, 20, 30]).unwrap();

        assert_eq!(masked.get_at(1).unwrap(), 20);

        masked.set_at(1, 99).unwrap();
        assert_eq!(masked.get_at(1).unwrap(), 99);
        assert_eq!(&*masked.to_vec().unwrap(), &[10, 99, 30]);
    }

    #[test]
    fn index_out_of_bounds_is_rejected() {
        let mut masked = MaskedBytes::new(&[1, 2, 3]).unwrap();

        assert!(matches!(
            masked.get_at(3),
            Err(Error::IndexOutOfBounds { index: 3, length: 3 })
        ));
        assert!(matches!(
            masked.set_at(4, 0),
            Err(Error::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn destroy_invalidates_and_is_idempotent() {
        let mut masked = MaskedBytes::new(&[1, 2, 3]).unwrap();

        masked.destroy();
        masked.destroy();

        assert!(!masked.is_valid());
        assert!(matches!(masked.get_at(0), Err(Error::Destroyed(_))));
        assert!(matches!(masked.to_vec(), Err(Error::Destroyed(_))));
        assert!(matches!(masked.len(), Err(Error::Destroyed(_))));
        assert!(matches!(masked.content_hash(), Err(Error::Destroyed(_))));
    }

    #[test]
    fn destroy_wipes_buffers() {
        let mut masked = MaskedBytes::new(&[0xAB; 75]).unwrap();

        masked.destroy();

        assert!(masked.data.iter().all(|&b| b == 0));
        assert!(masked.index.iter().all(|&i| i == 0));
    }

    #[test]
    fn equality_compares_plaintexts() {
        let first = MaskedBytes::new(&[1, 2, 3]).unwrap();
        let second = MaskedBytes::new(&[1, 2, 3]).unwrap();
        let third = MaskedBytes::new(&[1, 2, 4]).unwrap();

        assert_eq!(first, second);
        assert_ne!(first, third);
    }

    #[test]
    fn destroyed_container_is_never_equal() {
        let first = MaskedBytes::new(&[1, 2, 3]).unwrap();
        let mut second = MaskedBytes::new(&[1, 2, 3]).unwrap();

        second.destroy();

        assert_ne!(first, second);
    }

    #[test]
    fn content_hash_follows_mutations() {
        let mut first = MaskedBytes::new(&[5; 20]).unwrap();
        let mut second = MaskedBytes::new(&[5; 20]).unwrap();

        assert_eq!(first.content_hash().unwrap(), second.content_hash().unwrap());

        let before = first.content_hash().unwrap();
        first.set_at(0, 6).unwrap();
        assert_ne!(first.content_hash().unwrap(), before);

        first.set_at(0, 5).unwrap();
        assert_eq!(first.content_hash().unwrap(), before);
    }
}
