//! Symmetric codec used for every secret persisted by the control plane.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::debug;

use crate::error::{CodecError, CodecResult};

/// Reversible encryption of short secrets.
pub trait SecretCodec: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> CodecResult<String>;
    fn decrypt(&self, ciphertext: &str) -> CodecResult<String>;
}

/// AES-256-GCM codec keyed by a 32-byte key.
pub struct AesGcmCodec {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl AesGcmCodec {
    /// Build a codec from raw key bytes. The key must be exactly 32 bytes.
    pub fn new(key: &[u8]) -> CodecResult<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| {
            CodecError::InvalidKey(format!("expected {} bytes, got {}", AES_256_GCM.key_len(), key.len()))
        })?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Build a codec from a base64-encoded key, as found in the environment.
    pub fn from_base64_key(encoded: &str) -> CodecResult<Self> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
        Self::new(&raw)
    }

    /// Generate a fresh random key, base64-encoded.
    pub fn generate_key() -> CodecResult<String> {
        let mut key = [0u8; 32];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| CodecError::InvalidKey("system RNG unavailable".to_string()))?;
        Ok(STANDARD.encode(key))
    }
}

impl SecretCodec for AesGcmCodec {
    fn encrypt(&self, plaintext: &str) -> CodecResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CodecError::Encryption)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut sealed = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut sealed)
            .map_err(|_| CodecError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> CodecResult<String> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }
        let raw = STANDARD
            .decode(ciphertext)
            .map_err(|e| CodecError::Decryption(format!("not base64: {e}")))?;
        if raw.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(CodecError::Decryption("ciphertext too short".to_string()));
        }
        let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CodecError::Decryption("bad nonce".to_string()))?;

        let mut buf = sealed.to_vec();
        let plain = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| {
                debug!("secret failed authentication");
                CodecError::Decryption("authentication failed".to_string())
            })?;
        String::from_utf8(plain.to_vec())
            .map_err(|e| CodecError::Decryption(format!("not utf-8: {e}")))
    }
}
