//! Block padding
//!
//! Two variants coexist because legacy ciphertexts must keep decrypting.
//! New ciphertexts are padded with random bytes; the true length is carried
//! by the blinding header, so removal is implicit. Old ciphertexts
//! (formats 1 and 2) used a repeated arbitrary tail byte, which is stripped
//! here on decryption.

use rand::{thread_rng, RngCore};
use zeroize::Zeroizing;

/// Append random bytes up to the next block boundary.
///
/// Input already on a boundary gains a full block, so at least one byte of
/// padding is always present.
pub fn pad_to_block(data: &[u8], block_size: usize) -> Zeroizing<Vec<u8>> {
    let pad_length = block_size - data.len() % block_size;

    let mut result = Zeroizing::new(Vec::with_capacity(data.len() + pad_length));
    result.extend_from_slice(data);

    let mut padding = Zeroizing::new(vec![0u8; pad_length]);
    thread_rng().fill_bytes(&mut padding);
    result.extend_from_slice(&padding);

    result
}

/// Remove legacy tail padding: the trailing byte value and every
/// contiguous trailing occurrence of it.
pub fn strip_tail_padding(data: &[u8]) -> Zeroizing<Vec<u8>> {
    let Some(&pad_value) = data.last() else {
        return Zeroizing::new(Vec::new());
    };

    let mut end = data.len();
    while end > 0 && data[end - 1] == pad_value {
        end -= 1;
    }

    Zeroizing::new(data[..end].to_vec())
}
