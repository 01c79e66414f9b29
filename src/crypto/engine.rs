//! Envelope engine
//!
//! Derives the working keys from a key-derivation key and caller-supplied
//! source bytes, and provides authenticated encryption of short secrets
//! into printable tokens. The two derived keys live in masked containers
//! from construction to destruction; every transient buffer that touches
//! key material or plaintext wipes itself on all exit paths.

use crate::crypto::cipher;
use crate::crypto::token::{FormatId, TokenParts};
use crate::crypto::{blinding, constant_time_eq, padding};
use crate::crypto::{
    AES_BLOCK_SIZE, HMAC_TAG_SIZE, MAX_DERIVATION_KEY_LENGTH, MIN_DERIVATION_KEY_LENGTH,
};
use crate::entropy::EntropyAccumulator;
use crate::error::{Error, Result};
use crate::masked::MaskedBytes;
use parking_lot::Mutex;
use rand::{thread_rng, RngCore};
use ring::hmac;
use zeroize::Zeroizing;

/// Minimum number of source bytes.
const MIN_SOURCE_BYTES: u64 = 100;

/// Maximum number of source bytes.
const MAX_SOURCE_BYTES: u64 = 10_000_000;

/// Minimum information content of the source bytes in bits.
const MIN_SOURCE_INFORMATION_BITS: u64 = 128;

/// Entropy per byte below which the source bytes are considered to have no
/// variation at all. 1/2^13, exactly representable as a float.
const ENTROPY_THRESHOLD: f64 = 0.000_122_070_312_5;

/// Prefix salt for key modification with a subject.
const PREFIX_SALT: &[u8] = &[0x54, 0x75]; // "Tu"

/// Suffix salt for key modification with a subject.
const SUFFIX_SALT: &[u8] = &[0x70, 0x57]; // "pW"

/// The two derived keys of an engine instance.
struct KeyPair {
    /// AES data key (16 bytes).
    data_key: MaskedBytes,
    /// HMAC authentication key (16 bytes).
    auth_key: MaskedBytes,
}

impl KeyPair {
    fn check_valid(&self) -> Result<()> {
        if self.data_key.is_valid() && self.auth_key.is_valid() {
            Ok(())
        } else {
            Err(Error::Destroyed("envelope cipher"))
        }
    }
}

/// Authenticated encryption of short secrets under keys derived from
/// source bytes and a key-derivation key.
///
/// Construction computes the HMAC-SHA-256 of the source bytes keyed by the
/// key-derivation key; the low half becomes the AES data key and the high
/// half the HMAC authentication key. Neither the key-derivation key nor
/// the source bytes are retained.
///
/// The engine is usable from multiple threads; all operations are
/// serialized on one internal lock.
pub struct EnvelopeCipher {
    keys: Mutex<KeyPair>,
}

impl EnvelopeCipher {
    /// Create an engine from a key-derivation key and source byte arrays.
    ///
    /// The caller keeps ownership of both inputs and should wipe them after
    /// this returns. Fails when the key length is outside 14..=32 bytes, a
    /// source array is empty, the total source length is outside
    /// 100..=10_000_000 bytes, or the sources carry fewer than 128 bits of
    /// information.
    pub fn new(derivation_key: &[u8], source_bytes: &[&[u8]]) -> Result<Self> {
        check_derivation_key(derivation_key)?;
        check_source_bytes(source_bytes)?;

        let mut digest = Zeroizing::new([0u8; HMAC_TAG_SIZE]);
        {
            let key = hmac::Key::new(hmac::HMAC_SHA256, derivation_key);
            let mut context = hmac::Context::with_key(&key);
            for source in source_bytes {
                context.update(source);
            }
            digest.copy_from_slice(context.sign().as_ref());
        }

        // First half: data key. Second half: authentication key.
        let data_key = MaskedBytes::with_range(&digest[..], 0, HMAC_TAG_SIZE / 2)?;
        let auth_key = MaskedBytes::with_range(&digest[..], HMAC_TAG_SIZE / 2, HMAC_TAG_SIZE / 2)?;

        Ok(EnvelopeCipher {
            keys: Mutex::new(KeyPair { data_key, auth_key }),
        })
    }

    /// Encrypt a byte array under a subject into a printable token.
    ///
    /// An empty subject means no subject.
    pub fn encrypt_bytes(&self, data: &[u8], subject: &str) -> Result<String> {
        let keys = self.keys.lock();
        keys.check_valid()?;

        let parts = raw_encrypt(&keys, data, subject.as_bytes())?;

        Ok(parts.render())
    }

    /// Encrypt a string under a subject into a printable token.
    pub fn encrypt_str(&self, text: &str, subject: &str) -> Result<String> {
        self.encrypt_bytes(text.as_bytes(), subject)
    }

    /// Decrypt a token under a subject into its plaintext bytes.
    ///
    /// The returned buffer wipes itself when dropped.
    pub fn decrypt_bytes(&self, text: &str, subject: &str) -> Result<Zeroizing<Vec<u8>>> {
        let keys = self.keys.lock();
        keys.check_valid()?;

        let parts = TokenParts::parse(text)?;

        check_tag(&keys, &parts, subject.as_bytes())?;

        raw_decrypt(&keys, &parts, subject.as_bytes())
    }

    /// Decrypt a token under a subject into a string.
    ///
    /// Fails with a character coding error when the plaintext is not valid
    /// UTF-8.
    pub fn decrypt_str(&self, text: &str, subject: &str) -> Result<Zeroizing<String>> {
        let decrypted = self.decrypt_bytes(text, subject)?;

        let text = std::str::from_utf8(&decrypted)
            .map_err(|e| Error::CharacterCoding(e.to_string()))?;

        Ok(Zeroizing::new(text.to_string()))
    }

    /// Securely erase both derived keys. Idempotent; any later operation
    /// fails with a destroyed error.
    pub fn destroy(&self) {
        let mut keys = self.keys.lock();

        keys.data_key.destroy();
        keys.auth_key.destroy();
    }

    /// Whether the engine still holds its keys.
    pub fn is_valid(&self) -> bool {
        let keys = self.keys.lock();

        keys.data_key.is_valid() && keys.auth_key.is_valid()
    }
}

// -------- Construction checks --------

fn check_derivation_key(derivation_key: &[u8]) -> Result<()> {
    if derivation_key.len() < MIN_DERIVATION_KEY_LENGTH {
        return Err(Error::InvalidArgument(format!(
            "key-derivation key length is less than {}",
            MIN_DERIVATION_KEY_LENGTH
        )));
    }

    if derivation_key.len() > MAX_DERIVATION_KEY_LENGTH {
        return Err(Error::InvalidArgument(format!(
            "key-derivation key length is larger than {}",
            MAX_DERIVATION_KEY_LENGTH
        )));
    }

    Ok(())
}

fn check_source_bytes(source_bytes: &[&[u8]]) -> Result<()> {
    if source_bytes.is_empty() {
        return Err(Error::InvalidArgument(
            "no source byte arrays provided".to_string(),
        ));
    }

    let mut statistics = EntropyAccumulator::new();

    for (i, source) in source_bytes.iter().enumerate() {
        if source.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "source byte array {} is empty",
                i + 1
            )));
        }

        statistics.add_bytes(source);
    }

    if statistics.information_in_bits() < MIN_SOURCE_INFORMATION_BITS {
        let entropy = statistics.entropy();

        if entropy > ENTROPY_THRESHOLD {
            let recommended = (MIN_SOURCE_INFORMATION_BITS as f64 / entropy).round() as u64 + 1;
            return Err(Error::InvalidArgument(format!(
                "there is not enough information in the source bytes, increase the length to at least {} bytes",
                recommended
            )));
        } else {
            return Err(Error::InvalidArgument(
                "there is no information in the source bytes (only identical byte values)"
                    .to_string(),
            ));
        }
    }

    if statistics.count() < MIN_SOURCE_BYTES {
        return Err(Error::InvalidArgument(format!(
            "there are fewer than {} source bytes",
            MIN_SOURCE_BYTES
        )));
    }

    if statistics.count() > MAX_SOURCE_BYTES {
        return Err(Error::InvalidArgument(format!(
            "there are more than {} source bytes",
            MAX_SOURCE_BYTES
        )));
    }

    Ok(())
}

// -------- Subject-dependent key derivation --------

/// Derive a per-call key from a base key, keyed by the other half of the
/// key pair, with the subject as domain separator. The result is 32 bytes,
/// so encryption upgrades to AES-256 whenever a subject is present.
fn derive_subject_key(
    mac_key: &MaskedBytes,
    base_key: &MaskedBytes,
    subject: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let mac_key_bytes = mac_key.to_vec()?;
    let base_key_bytes = base_key.to_vec()?;

    let key = hmac::Key::new(hmac::HMAC_SHA256, &mac_key_bytes);
    let mut context = hmac::Context::with_key(&key);
    context.update(&base_key_bytes);
    context.update(PREFIX_SALT);
    context.update(subject);
    context.update(SUFFIX_SALT);

    let mut result = Zeroizing::new(vec![0u8; HMAC_TAG_SIZE]);
    result.copy_from_slice(context.sign().as_ref());

    Ok(result)
}

/// Effective data key for a subject: the base key without one, a derived
/// 32-byte key otherwise.
fn data_key_for_subject(keys: &KeyPair, subject: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if subject.is_empty() {
        keys.data_key.to_vec()
    } else {
        derive_subject_key(&keys.auth_key, &keys.data_key, subject)
    }
}

/// Effective authentication key for a subject.
fn auth_key_for_subject(keys: &KeyPair, subject: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if subject.is_empty() {
        keys.auth_key.to_vec()
    } else {
        derive_subject_key(&keys.data_key, &keys.auth_key, subject)
    }
}

// -------- Authentication --------

/// Compute the authentication tag over format id, IV and ciphertext.
///
/// Formats before 5 authenticate with the default key even when a subject
/// is present.
fn compute_tag(
    keys: &KeyPair,
    format_id: FormatId,
    iv: &[u8],
    ciphertext: &[u8],
    subject: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let tag_key = if format_id.subject_aware_tag() {
        auth_key_for_subject(keys, subject)?
    } else {
        keys.auth_key.to_vec()?
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, &tag_key);
    let mut context = hmac::Context::with_key(&key);
    context.update(&[format_id.as_byte()]);
    context.update(iv);
    context.update(ciphertext);

    let mut result = Zeroizing::new(vec![0u8; HMAC_TAG_SIZE]);
    result.copy_from_slice(context.sign().as_ref());

    Ok(result)
}

fn check_tag(keys: &KeyPair, parts: &TokenParts, subject: &[u8]) -> Result<()> {
    let expected = compute_tag(keys, parts.format_id, &parts.iv, &parts.ciphertext, subject)?;

    // Compare in the encoded domain so that every changed character of the
    // tag field is caught, including ones that only touch the unused
    // trailing bits of the final encoded symbol.
    let expected_field = Zeroizing::new(parts.format_id.encode_field(&expected));

    if !constant_time_eq(expected_field.as_bytes(), parts.tag_field.as_bytes()) {
        return Err(Error::DataIntegrity);
    }

    Ok(())
}

// -------- Raw encryption and decryption --------

fn raw_encrypt(keys: &KeyPair, data: &[u8], subject: &[u8]) -> Result<TokenParts> {
    let format_id = FormatId::NEWEST;

    // At least two cipher blocks, so the ciphertext never betrays that the
    // plaintext was shorter than blockSize - 3 bytes.
    let blinded = blinding::blind(data, AES_BLOCK_SIZE + 1)?;
    let padded = padding::pad_to_block(&blinded, AES_BLOCK_SIZE);

    let mut iv = vec![0u8; AES_BLOCK_SIZE];
    thread_rng().fill_bytes(&mut iv);

    let data_key = data_key_for_subject(keys, subject)?;
    let ciphertext = cipher::encrypt(format_id.cipher_mode(), &data_key, &iv, &padded)?;

    let tag = compute_tag(keys, format_id, &iv, &ciphertext, subject)?;

    Ok(TokenParts::from_raw(
        format_id,
        Zeroizing::new(iv),
        Zeroizing::new(ciphertext),
        &tag,
    ))
}

fn raw_decrypt(keys: &KeyPair, parts: &TokenParts, subject: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let data_key = data_key_for_subject(keys, subject)?;

    let padded = cipher::decrypt(
        parts.format_id.cipher_mode(),
        &data_key,
        &parts.iv,
        &parts.ciphertext,
    )?;

    if parts.format_id.uses_blinding() {
        blinding::unblind(&padded)
    } else {
        Ok(padding::strip_tail_padding(&padded))
    }
}
