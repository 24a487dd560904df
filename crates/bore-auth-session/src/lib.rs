//! Stateless cookie sessions.
//!
//! A [`Session`] is never stored server-side. Its only home is the cookie
//! value produced by [`SessionCodec`], which is encrypted with AES-256-GCM
//! under the block key and authenticated with HMAC-SHA256 under the hash key.
//!
//! # Example
//!
//! ```rust,ignore
//! use bore_auth_session::{Session, SessionCodec, SessionKeys};
//!
//! let codec = SessionCodec::new("bore_session", &SessionKeys::generate());
//! let cookie = codec.encode(&Session::new("https://me.example", "Me", "me@example.com", lifetime))?;
//! let session = codec.decode(&cookie)?;
//! ```

mod codec;
mod error;
mod keys;
mod session;

pub use codec::{DEFAULT_MAX_AGE, SessionCodec};
pub use error::{Result, SessionError};
pub use keys::{KEY_LEN, KeySource, SessionKeys, decode_key};
pub use session::Session;
