//! Cryptography module for credseal
//!
//! Provides the authenticated encryption envelope: key derivation from
//! source bytes, AES encryption in the mode selected by the token format,
//! HMAC-SHA-256 authentication, length-hiding blinding and padding.

pub mod blinding;
pub mod cipher;
pub mod engine;
pub mod padding;
pub mod token;

pub use engine::EnvelopeCipher;

use subtle::ConstantTimeEq;

/// Size of an AES block in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// Size of an AES-128 key in bytes
pub const AES_128_KEY_SIZE: usize = 16;

/// Size of an AES-256 key in bytes
pub const AES_256_KEY_SIZE: usize = 32;

/// Size of an HMAC-SHA-256 tag in bytes
pub const HMAC_TAG_SIZE: usize = 32;

/// Minimum length of the key-derivation key in bytes
pub const MIN_DERIVATION_KEY_LENGTH: usize = 14;

/// Maximum length of the key-derivation key in bytes
///
/// The key must not be larger than the block size of the underlying hash.
pub const MAX_DERIVATION_KEY_LENGTH: usize = 32;

/// Length-oblivious constant-time byte array equality.
///
/// Execution time depends only on `min(a.len(), b.len())`, never on where
/// the first mismatch occurs. Arrays of different lengths are unequal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let common = a.len().min(b.len());

    let mut equal = a.len().ct_eq(&b.len());
    for i in 0..common {
        equal &= a[i].ct_eq(&b[i]);
    }

    equal.into()
}
