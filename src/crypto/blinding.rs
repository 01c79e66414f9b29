//! Length-hiding blinding
//!
//! Wraps a plaintext in random prefix and suffix bytes together with an
//! explicit length header, so that the ciphertext never reveals the true
//! plaintext length and short secrets always occupy at least two cipher
//! blocks.
//!
//! Layout: `[prefix_len (1)] [suffix_len (1)] [packed(len)] [prefix] [data] [suffix]`

use crate::encoding::packed;
use crate::error::{Error, Result};
use rand::{thread_rng, Rng, RngCore};
use zeroize::Zeroizing;

/// A single blinder fits in its one-byte length field.
const MAX_BLINDER_LENGTH: usize = 255;

/// Build the blinded form of `data`, at least `min_total` bytes long.
///
/// The combined blinder length is exactly the shortfall between the header
/// plus data and `min_total`; only the split between prefix and suffix is
/// random. Blinded output length therefore depends on nothing but the
/// payload length, which is what keeps equal-length inputs
/// indistinguishable.
pub fn blind(data: &[u8], min_total: usize) -> Result<Zeroizing<Vec<u8>>> {
    if data.len() > packed::MAX_VALUE as usize {
        return Err(Error::InvalidArgument(
            "data is too large for blinding".to_string(),
        ));
    }

    let packed_length = packed::encode(data.len() as u32)?;

    let core_length = 2 + packed_length.len() + data.len();
    let shortfall = min_total.saturating_sub(core_length);

    if shortfall > 2 * MAX_BLINDER_LENGTH {
        return Err(Error::InvalidArgument(
            "minimum total length is too large for blinding".to_string(),
        ));
    }

    let mut rng = thread_rng();
    let prefix_length = rng.gen_range(
        shortfall.saturating_sub(MAX_BLINDER_LENGTH)..=shortfall.min(MAX_BLINDER_LENGTH),
    );
    let suffix_length = shortfall - prefix_length;

    let mut result = Zeroizing::new(Vec::with_capacity(core_length + shortfall));
    result.push(prefix_length as u8);
    result.push(suffix_length as u8);
    result.extend_from_slice(&packed_length);

    let mut blinder = Zeroizing::new(vec![0u8; prefix_length.max(suffix_length)]);
    rng.fill_bytes(&mut blinder);

    result.extend_from_slice(&blinder[..prefix_length]);
    result.extend_from_slice(data);
    result.extend_from_slice(&blinder[..suffix_length]);

    Ok(result)
}

/// Recover the plaintext from a blinded buffer.
///
/// Fails when the header is inconsistent with the buffer size.
pub fn unblind(data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if data.len() < 3 {
        return Err(Error::InvalidArgument("blinded data is too short".to_string()));
    }

    let prefix_length = data[0] as usize;
    let suffix_length = data[1] as usize;
    let (payload_length, packed_length) = packed::decode_at(data, 2)?;
    let payload_length = payload_length as usize;

    let header_length = 2 + packed_length;
    // The buffer may be longer than announced because of block padding,
    // never shorter.
    if header_length + prefix_length + payload_length + suffix_length > data.len() {
        return Err(Error::InvalidArgument(
            "blinding header is inconsistent with data length".to_string(),
        ));
    }

    let start = header_length + prefix_length;

    Ok(Zeroizing::new(data[start..start + payload_length].to_vec()))
}
