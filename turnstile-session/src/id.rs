//! Session identifiers.
//!
//! A session id is 18 random bytes encoded as URL-safe base64 without
//! padding, giving exactly 24 characters from `A-Z a-z 0-9 - _`.

use crate::error::SessionError;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of an encoded session id.
pub const SESSION_ID_LENGTH: usize = 24;

/// Random bytes behind each id (144 bits).
const SESSION_ID_BYTES: usize = 18;

/// Opaque session identifier, as carried in the session cookie.
///
/// # Examples
///
/// ```
/// use turnstile_session::SessionId;
///
/// let id = SessionId::generate();
/// assert_eq!(id.as_str().len(), 24);
/// assert_eq!(SessionId::parse(id.as_str()), Some(id));
/// assert_eq!(SessionId::parse("not-a-session-id"), None);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh id from the thread-local CSPRNG.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Generate a fresh id from the given cryptographic RNG.
    pub fn generate_with<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Parse a session id, returning `None` for anything malformed.
    pub fn parse(text: &str) -> Option<Self> {
        Self::from_bytes(text.as_bytes())
    }

    /// Parse a raw cookie value, returning `None` for anything malformed.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.len() != SESSION_ID_LENGTH || !raw.iter().copied().all(is_id_symbol) {
            return None;
        }

        std::str::from_utf8(raw).ok().map(|s| Self(s.to_owned()))
    }

    /// The encoded id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_id_symbol(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_'
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Ids are bearer credentials; keep them out of debug output.
impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}…)", &self.0[..4])
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(SessionError::InvalidSessionId)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Source of fresh session ids.
pub trait IdGenerator: Send + Sync {
    /// Produce an id that has never been handed out before.
    fn generate(&self) -> SessionId;
}

/// Id generator backed by the thread-local CSPRNG.
///
/// Each thread owns its own OS-seeded generator, so concurrent callers never
/// contend on a shared lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> SessionId {
        SessionId::generate()
    }
}
