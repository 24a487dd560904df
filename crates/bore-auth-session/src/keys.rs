//! Cookie key material.
//!
//! Keys arrive from the environment in whatever encoding the operator had
//! at hand, so decoding is liberal. The fallback order matters: deployments
//! rely on a given encoding being picked up the same way every time.
//!
//! 1. standard base64 with padding
//! 2. URL-safe base64 with padding
//! 3. standard base64 without padding
//! 4. the raw bytes of the string
//!
//! A base64 form is only taken when it decodes to at least [`KEY_LEN`]
//! bytes. Raw bytes are truncated or zero-padded to [`KEY_LEN`].

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE},
};
use rand::RngCore;
use tracing::{info, warn};

/// Length of both the hash key and the block key.
pub const KEY_LEN: usize = 32;

/// Where the session keys came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Both keys were supplied by configuration.
    Configured,
    /// Keys were generated at startup; sessions die with the process.
    Ephemeral,
}

/// The authentication (hash) and encryption (block) keys.
#[derive(Clone)]
pub struct SessionKeys {
    /// HMAC-SHA256 key.
    pub hash_key: [u8; KEY_LEN],
    /// AES-256-GCM key.
    pub block_key: [u8; KEY_LEN],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("hash_key", &"[redacted]")
            .field("block_key", &"[redacted]")
            .finish()
    }
}

impl SessionKeys {
    /// Generate a random key pair.
    pub fn generate() -> Self {
        Self {
            hash_key: random_key(),
            block_key: random_key(),
        }
    }

    /// Decode a configured key pair.
    pub fn from_encoded(hash_key: &str, block_key: &str) -> Self {
        Self {
            hash_key: decode_key(hash_key),
            block_key: decode_key(block_key),
        }
    }

    /// Resolve keys from optional configuration values.
    ///
    /// Missing or empty values for either key fall back to ephemeral keys.
    /// That is a degraded mode, not an error: it only means sessions will
    /// not survive a restart.
    pub fn resolve(hash_key: Option<&str>, block_key: Option<&str>) -> (Self, KeySource) {
        let hash_key = hash_key.map(str::trim).filter(|k| !k.is_empty());
        let block_key = block_key.map(str::trim).filter(|k| !k.is_empty());

        match (hash_key, block_key) {
            (Some(hash), Some(block)) => {
                if raw_fallback_is_short(hash) || raw_fallback_is_short(block) {
                    warn!(
                        "Cookie key shorter than {} bytes was zero-padded; use a 32-byte base64 key",
                        KEY_LEN
                    );
                }
                info!(
                    hash_bytes = KEY_LEN,
                    block_bytes = KEY_LEN,
                    "Loaded cookie keys"
                );
                (Self::from_encoded(hash, block), KeySource::Configured)
            }
            _ => {
                warn!(
                    "COOKIE_HASH_KEY and COOKIE_BLOCK_KEY not set, generating random keys; \
                     sessions will not survive a restart"
                );
                (Self::generate(), KeySource::Ephemeral)
            }
        }
    }
}

/// Decode a single key, normalizing to exactly [`KEY_LEN`] bytes.
pub fn decode_key(input: &str) -> [u8; KEY_LEN] {
    let input = input.trim();

    for engine in [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD] {
        if let Ok(decoded) = engine.decode(input)
            && decoded.len() >= KEY_LEN
        {
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&decoded[..KEY_LEN]);
            return key;
        }
    }

    let raw = input.as_bytes();
    let mut key = [0u8; KEY_LEN];
    let n = raw.len().min(KEY_LEN);
    key[..n].copy_from_slice(&raw[..n]);
    key
}

/// Whether `input` ends up on the zero-padding path of [`decode_key`].
fn raw_fallback_is_short(input: &str) -> bool {
    let input = input.trim();
    let decodes = [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD]
        .iter()
        .any(|engine| matches!(engine.decode(input), Ok(d) if d.len() >= KEY_LEN));
    !decodes && input.len() < KEY_LEN
}

fn random_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::rng().fill_bytes(&mut key);
    key
}
