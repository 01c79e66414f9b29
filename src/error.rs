//! Error types for credseal

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for credseal
#[derive(Error, Debug)]
pub enum Error {
    /// An input violated a documented constraint: lengths, entropy, token
    /// shape, out-of-range integers, invalid encoded characters, malformed
    /// blinding headers, unknown format ids.
    #[error("{0}")]
    InvalidArgument(String),

    /// The authentication tag does not match the data.
    #[error("checksum does not match data")]
    DataIntegrity,

    /// Decrypted data is not valid UTF-8 but character output was requested.
    #[error("invalid UTF-8 in decrypted data: {0}")]
    CharacterCoding(String),

    /// Use after `destroy` on the engine or a masked container.
    #[error("{0} has already been destroyed")]
    Destroyed(&'static str),

    /// Index outside the container bounds.
    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: usize, length: usize },

    /// A lower-level crypto primitive reported an impossible error. Must
    /// never occur against a conforming primitive.
    #[error("invalid cryptographic parameter: {0}")]
    CryptoParameter(String),

    // IO errors (command line tool only)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
