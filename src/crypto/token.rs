//! Versioned token format
//!
//! A token is four fields joined by a separator character: a single-digit
//! format id, the IV, the ciphertext and the authentication tag. The format
//! id selects every other property of the wire format: separator, field
//! encoding, cipher mode, padding variant and whether the authentication
//! key honors the subject. Only the newest format is produced; all older
//! formats decrypt so stored tokens can be upgraded.

use crate::crypto::cipher::CipherMode;
use crate::encoding::base32;
use crate::error::{Error, Result};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use zeroize::Zeroizing;

/// Separator for formats 1 to 5 (Base64 field encoding).
const LEGACY_SEPARATOR: char = '$';

/// Separator for format 6. `1` is not part of the spell-safe alphabet.
const SAFE_SEPARATOR: char = '1';

/// Number of separated fields in a token.
const FIELD_COUNT: usize = 4;

/// Token format id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatId {
    V1 = 1,
    V2 = 2,
    V3 = 3,
    V4 = 4,
    V5 = 5,
    V6 = 6,
}

/// Formats at or above this use blinding instead of tail padding.
const FIRST_BLINDING_FORMAT: u8 = 3;

/// Formats at or above this derive the authentication key from the subject.
const FIRST_SUBJECT_AWARE_TAG_FORMAT: u8 = 5;

/// Formats at or above this use the spell-safe encoding and separator.
const FIRST_SAFE_ENCODING_FORMAT: u8 = 6;

/// Formats at or below this use `=`-padded Base64.
const LAST_PADDED_BASE64_FORMAT: u8 = 3;

impl FormatId {
    /// The only format produced by encryption.
    pub const NEWEST: FormatId = FormatId::V6;

    /// Parse a format id from the leading token character.
    pub fn from_token_digit(digit: char) -> Result<Self> {
        match digit {
            '1' => Ok(FormatId::V1),
            '2' => Ok(FormatId::V2),
            '3' => Ok(FormatId::V3),
            '4' => Ok(FormatId::V4),
            '5' => Ok(FormatId::V5),
            '6' => Ok(FormatId::V6),
            '0'..='9' => Err(Error::InvalidArgument("unknown format id".to_string())),
            _ => Err(Error::InvalidArgument("invalid format id".to_string())),
        }
    }

    /// Numeric value, as authenticated by the tag.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// ASCII digit used in the printable token.
    pub fn as_digit(self) -> char {
        (b'0' + self.as_byte()) as char
    }

    /// Field separator of this format.
    pub fn separator(self) -> char {
        if self.uses_safe_encoding() {
            SAFE_SEPARATOR
        } else {
            LEGACY_SEPARATOR
        }
    }

    /// Whether decrypted data carries a blinding header instead of legacy
    /// tail padding.
    pub fn uses_blinding(self) -> bool {
        self.as_byte() >= FIRST_BLINDING_FORMAT
    }

    /// Whether the authentication key is derived from the subject.
    ///
    /// Format 4 predates this and authenticates with the default key even
    /// when a subject is present; that behavior is preserved so existing
    /// tokens keep verifying.
    pub fn subject_aware_tag(self) -> bool {
        self.as_byte() >= FIRST_SUBJECT_AWARE_TAG_FORMAT
    }

    /// Whether fields use the spell-safe Base32 encoding.
    pub fn uses_safe_encoding(self) -> bool {
        self.as_byte() >= FIRST_SAFE_ENCODING_FORMAT
    }

    /// Whether Base64 fields carry `=` padding.
    pub fn uses_padded_base64(self) -> bool {
        self.as_byte() <= LAST_PADDED_BASE64_FORMAT
    }

    /// Cipher mode of this format.
    pub fn cipher_mode(self) -> CipherMode {
        match self {
            FormatId::V1 => CipherMode::Cfb,
            FormatId::V2 | FormatId::V3 => CipherMode::Ctr,
            FormatId::V4 | FormatId::V5 | FormatId::V6 => CipherMode::Cbc,
        }
    }

    /// Decode one token field.
    pub fn decode_field(self, field: &str) -> Result<Zeroizing<Vec<u8>>> {
        let decoded = if self.uses_safe_encoding() {
            base32::decode(field)?
        } else if self.uses_padded_base64() {
            STANDARD
                .decode(field)
                .map_err(|e| Error::InvalidArgument(format!("invalid Base64 field: {}", e)))?
        } else {
            STANDARD_NO_PAD
                .decode(field)
                .map_err(|e| Error::InvalidArgument(format!("invalid Base64 field: {}", e)))?
        };

        Ok(Zeroizing::new(decoded))
    }

    /// Encode one token field.
    pub fn encode_field(self, data: &[u8]) -> String {
        if self.uses_safe_encoding() {
            base32::encode(data)
        } else if self.uses_padded_base64() {
            STANDARD.encode(data)
        } else {
            STANDARD_NO_PAD.encode(data)
        }
    }
}

/// The transient parts of one encrypted token.
///
/// The tag is kept in its encoded form: verification compares the received
/// field against the encoding of the recomputed tag, so any changed
/// character in the tag field is caught, including in the trailing bits of
/// the final encoded symbol.
pub struct TokenParts {
    pub format_id: FormatId,
    pub iv: Zeroizing<Vec<u8>>,
    pub ciphertext: Zeroizing<Vec<u8>>,
    /// Encoded authentication tag, exactly as received or produced.
    pub tag_field: Zeroizing<String>,
}

impl TokenParts {
    /// Assemble parts from raw byte fields, encoding the tag.
    pub fn from_raw(
        format_id: FormatId,
        iv: Zeroizing<Vec<u8>>,
        ciphertext: Zeroizing<Vec<u8>>,
        tag: &[u8],
    ) -> Self {
        TokenParts {
            format_id,
            iv,
            ciphertext,
            tag_field: Zeroizing::new(format_id.encode_field(tag)),
        }
    }

    /// Split a printable token into its decoded parts.
    pub fn parse(text: &str) -> Result<Self> {
        let first = text
            .chars()
            .next()
            .ok_or_else(|| Error::InvalidArgument("encrypted text is empty".to_string()))?;

        let format_id = FormatId::from_token_digit(first)?;
        let separator = format_id.separator();

        let fields: Vec<&str> = text.split(separator).collect();
        if fields.len() != FIELD_COUNT {
            return Err(Error::InvalidArgument(format!(
                "number of '{}' separated fields in encrypted text is not {}",
                separator, FIELD_COUNT
            )));
        }

        if fields[0].len() != 1 {
            return Err(Error::InvalidArgument(
                "format id field is not a single digit".to_string(),
            ));
        }

        if fields[1..].iter().any(|field| field.is_empty()) {
            return Err(Error::InvalidArgument(
                "empty field in encrypted text".to_string(),
            ));
        }

        // Decoding the tag validates its characters; the decoded bytes are
        // not needed because verification runs on the encoded field.
        format_id.decode_field(fields[3])?;

        Ok(TokenParts {
            format_id,
            iv: format_id.decode_field(fields[1])?,
            ciphertext: format_id.decode_field(fields[2])?,
            tag_field: Zeroizing::new(fields[3].to_string()),
        })
    }

    /// Render the parts as a printable token.
    pub fn render(&self) -> String {
        let total = self.iv.len() + self.ciphertext.len() + self.tag_field.len();

        // Slight overestimate of the encoded size: total * 7 / 4 + separators.
        let mut result = String::with_capacity(4 + total + (total >> 1) + (total >> 2));

        let separator = self.format_id.separator();

        result.push(self.format_id.as_digit());
        result.push(separator);
        result.push_str(&self.format_id.encode_field(&self.iv));
        result.push(separator);
        result.push_str(&self.format_id.encode_field(&self.ciphertext));
        result.push(separator);
        result.push_str(&self.tag_field);

        result
    }
}
