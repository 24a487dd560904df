//! Session cookie codec.
//!
//! The cookie value is
//! `base64url(timestamp "|" base64url(nonce || ciphertext) "|" base64url(mac))`.
//!
//! - `ciphertext` is the JSON session sealed with AES-256-GCM under the block key.
//! - `mac` is HMAC-SHA256 under the hash key over `name "|" timestamp "|" payload`,
//!   so a value minted for one cookie name cannot be replayed under another.
//! - `timestamp` is the issue time in Unix seconds; values older than the
//!   codec max age are rejected regardless of the session's own expiry.
//!
//! The MAC is verified before anything is decrypted.

use std::time::Duration;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, SessionError};
use crate::keys::{KEY_LEN, SessionKeys};
use crate::session::Session;

type HmacSha256 = Hmac<Sha256>;

/// Default max age of an encoded value (7 days).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// AES-GCM nonce length.
const NONCE_LEN: usize = 12;

/// AES-GCM tag length.
const TAG_LEN: usize = 16;

/// How far in the future an issue timestamp may be before it is rejected.
const CLOCK_SKEW_SECS: i64 = 60;

/// Encodes and decodes [`Session`] values to opaque cookie strings.
#[derive(Clone)]
pub struct SessionCodec {
    name: String,
    hash_key: [u8; KEY_LEN],
    cipher: Aes256Gcm,
    max_age: Duration,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("name", &self.name)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl SessionCodec {
    /// Create a codec for the cookie `name` with the default max age.
    pub fn new(name: impl Into<String>, keys: &SessionKeys) -> Self {
        Self {
            name: name.into(),
            hash_key: keys.hash_key,
            cipher: Aes256Gcm::new((&keys.block_key).into()),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Set the max age of encoded values.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// The cookie name values are bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured max age.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Encode a session into an opaque cookie value.
    pub fn encode(&self, session: &Session) -> Result<String> {
        self.encode_at(session, Utc::now())
    }

    /// Decode and verify a cookie value.
    ///
    /// This checks integrity and the codec max age only. Whether the session
    /// itself is still valid is the caller's decision ([`Session::is_valid`]).
    pub fn decode(&self, value: &str) -> Result<Session> {
        self.decode_at(value, Utc::now())
    }

    pub(crate) fn encode_at(&self, session: &Session, now: DateTime<Utc>) -> Result<String> {
        let plaintext = serde_json::to_vec(session)
            .map_err(|e| SessionError::Encoding(format!("Failed to serialize session: {}", e)))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| SessionError::Encoding("Failed to encrypt session".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        let payload = URL_SAFE_NO_PAD.encode(sealed);

        let timestamp = now.timestamp();
        let mac = self
            .mac(timestamp, &payload)
            .map_err(|e| SessionError::Encoding(e.to_string()))?
            .finalize()
            .into_bytes();

        let joined = format!("{}|{}|{}", timestamp, payload, URL_SAFE_NO_PAD.encode(mac));
        Ok(URL_SAFE_NO_PAD.encode(joined))
    }

    pub(crate) fn decode_at(&self, value: &str, now: DateTime<Utc>) -> Result<Session> {
        let raw = URL_SAFE_NO_PAD
            .decode(value.trim())
            .map_err(|_| invalid("value is not base64"))?;
        let joined = std::str::from_utf8(&raw).map_err(|_| invalid("value is not UTF-8"))?;

        let mut parts = joined.splitn(3, '|');
        let (Some(timestamp), Some(payload), Some(mac)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("value has too few parts"));
        };

        let timestamp: i64 = timestamp
            .parse()
            .map_err(|_| invalid("timestamp is not a number"))?;
        let mac = URL_SAFE_NO_PAD
            .decode(mac)
            .map_err(|_| invalid("mac is not base64"))?;

        self.mac(timestamp, payload)?
            .verify_slice(&mac)
            .map_err(|_| invalid("mac mismatch"))?;

        let age = now.timestamp() - timestamp;
        if age < -CLOCK_SKEW_SECS {
            return Err(invalid("timestamp is in the future"));
        }
        if age > self.max_age.as_secs() as i64 {
            return Err(invalid("value is older than max age"));
        }

        let sealed = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| invalid("payload is not base64"))?;
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(invalid("payload is too short"));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| invalid("decryption failed"))?;

        serde_json::from_slice(&plaintext).map_err(|_| invalid("payload is not a session"))
    }

    fn mac(&self, timestamp: i64, payload: &str) -> Result<HmacSha256> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.hash_key)
            .map_err(|_| invalid("hash key rejected"))?;
        mac.update(self.name.as_bytes());
        mac.update(b"|");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b"|");
        mac.update(payload.as_bytes());
        Ok(mac)
    }
}

fn invalid(reason: &str) -> SessionError {
    SessionError::InvalidSession(reason.to_string())
}
