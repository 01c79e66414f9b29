//! AES mode dispatch
//!
//! The token format id selects the cipher mode; the presence of a subject
//! selects the key width (16-byte base key or 32-byte derived key). Block
//! alignment is handled by the callers: encryption input is pre-padded and
//! uses `NoPadding`.

use crate::crypto::{AES_128_KEY_SIZE, AES_256_KEY_SIZE, AES_BLOCK_SIZE};
use crate::error::{Error, Result};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{AsyncStreamCipher, BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use aes::{Aes128, Aes256};
use zeroize::Zeroizing;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type Aes128CfbEnc = cfb_mode::Encryptor<Aes128>;
type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes128CfbDec = cfb_mode::Decryptor<Aes128>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// AES block mode of operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherMode {
    Cfb,
    Ctr,
    Cbc,
}

fn parameter_error<E: std::fmt::Display>(error: E) -> Error {
    Error::CryptoParameter(error.to_string())
}

/// Encrypt `plaintext` with the given mode, key and IV.
///
/// CBC input must already be block-aligned.
pub fn encrypt(mode: CipherMode, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    if mode == CipherMode::Cbc && plaintext.len() % AES_BLOCK_SIZE != 0 {
        return Err(Error::CryptoParameter(
            "plaintext length is not a multiple of the cipher block size".to_string(),
        ));
    }

    match (mode, key.len()) {
        (CipherMode::Cbc, AES_128_KEY_SIZE) => Ok(Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(parameter_error)?
            .encrypt_padded_vec_mut::<NoPadding>(plaintext)),
        (CipherMode::Cbc, AES_256_KEY_SIZE) => Ok(Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(parameter_error)?
            .encrypt_padded_vec_mut::<NoPadding>(plaintext)),
        (CipherMode::Ctr, AES_128_KEY_SIZE) => {
            let mut buffer = plaintext.to_vec();
            Aes128Ctr::new_from_slices(key, iv)
                .map_err(parameter_error)?
                .apply_keystream(&mut buffer);
            Ok(buffer)
        }
        (CipherMode::Ctr, AES_256_KEY_SIZE) => {
            let mut buffer = plaintext.to_vec();
            Aes256Ctr::new_from_slices(key, iv)
                .map_err(parameter_error)?
                .apply_keystream(&mut buffer);
            Ok(buffer)
        }
        (CipherMode::Cfb, AES_128_KEY_SIZE) => {
            let mut buffer = plaintext.to_vec();
            Aes128CfbEnc::new_from_slices(key, iv)
                .map_err(parameter_error)?
                .encrypt(&mut buffer);
            Ok(buffer)
        }
        (CipherMode::Cfb, AES_256_KEY_SIZE) => {
            let mut buffer = plaintext.to_vec();
            Aes256CfbEnc::new_from_slices(key, iv)
                .map_err(parameter_error)?
                .encrypt(&mut buffer);
            Ok(buffer)
        }
        (_, length) => Err(Error::CryptoParameter(format!(
            "unsupported AES key length {}",
            length
        ))),
    }
}

/// Decrypt `ciphertext` with the given mode, key and IV.
pub fn decrypt(
    mode: CipherMode,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    match (mode, key.len()) {
        (CipherMode::Cbc, AES_128_KEY_SIZE) => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(parameter_error)?
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| cbc_length_error()),
        (CipherMode::Cbc, AES_256_KEY_SIZE) => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(parameter_error)?
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| cbc_length_error()),
        (CipherMode::Ctr, AES_128_KEY_SIZE) => {
            let mut buffer = Zeroizing::new(ciphertext.to_vec());
            Aes128Ctr::new_from_slices(key, iv)
                .map_err(parameter_error)?
                .apply_keystream(&mut buffer);
            Ok(buffer)
        }
        (CipherMode::Ctr, AES_256_KEY_SIZE) => {
            let mut buffer = Zeroizing::new(ciphertext.to_vec());
            Aes256Ctr::new_from_slices(key, iv)
                .map_err(parameter_error)?
                .apply_keystream(&mut buffer);
            Ok(buffer)
        }
        (CipherMode::Cfb, AES_128_KEY_SIZE) => {
            let mut buffer = Zeroizing::new(ciphertext.to_vec());
            Aes128CfbDec::new_from_slices(key, iv)
                .map_err(parameter_error)?
                .decrypt(&mut buffer);
            Ok(buffer)
        }
        (CipherMode::Cfb, AES_256_KEY_SIZE) => {
            let mut buffer = Zeroizing::new(ciphertext.to_vec());
            Aes256CfbDec::new_from_slices(key, iv)
                .map_err(parameter_error)?
                .decrypt(&mut buffer);
            Ok(buffer)
        }
        (_, length) => Err(Error::CryptoParameter(format!(
            "unsupported AES key length {}",
            length
        ))),
    }
}

fn cbc_length_error() -> Error {
    Error::InvalidArgument("ciphertext length is not a multiple of the cipher block size".to_string())
}
