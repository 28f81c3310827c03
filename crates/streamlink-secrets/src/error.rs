//! Error types for the secret codec.

use thiserror::Error;

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("encryption failed")]
    Encryption,

    /// Ciphertext was malformed, tampered with, or sealed under another key.
    #[error("decryption failed: {0}")]
    Decryption(String),
}
