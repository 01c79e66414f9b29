//! credseal - Encrypts short secrets into self-describing printable tokens
//!
//! This library derives an AES data key and an HMAC authentication key from
//! a caller-supplied key-derivation key and one or more source byte arrays,
//! and uses them to produce authenticated, length-hiding ciphertext tokens.
//! The derived keys are kept shuffled and masked in process memory for their
//! whole lifetime.

pub mod crypto;
pub mod encoding;
pub mod entropy;
pub mod error;
pub mod masked;

pub use crypto::engine::EnvelopeCipher;
pub use error::{Error, Result};
