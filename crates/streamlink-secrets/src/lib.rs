//! streamlink-secrets: encryption at rest for stored credentials.
//!
//! Database passwords, OAuth client secrets and cluster kubeconfigs are
//! stored as ciphertext produced by a [`SecretCodec`]. The shipped codec is
//! [`AesGcmCodec`] (AES-256-GCM with a random 96-bit nonce per message,
//! serialized as base64 of `nonce || ciphertext || tag`).
//!
//! Empty input is passed through unchanged in both directions so optional
//! fields never need special casing.

pub mod codec;
pub mod error;

pub use codec::{AesGcmCodec, SecretCodec};
pub use error::{CodecError, CodecResult};
