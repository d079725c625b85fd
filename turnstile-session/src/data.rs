//! Session payloads and the split between engine-owned and caller-owned keys.
//!
//! Two keys of a payload are reserved: the configurable auth key, carrying
//! the authenticated user's identifier, and [`FORCE_INVALIDATE_KEY`], carrying
//! a [`ForceInvalidate`] directive. [`SessionData::decompose`] strips both
//! before a payload is compared or stored; [`SessionData::recompose`] puts the
//! auth key back when a payload is handed to the caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map;
use std::fmt;
use tracing::warn;

/// Payload key carrying the textual [`ForceInvalidate`] directive.
pub const FORCE_INVALIDATE_KEY: &str = "turnstile-force-invalidate";

/// Opaque identifier of an authenticated principal.
pub type AuthId = Vec<u8>;

/// Session payload: string keys mapped to byte-string values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionMap(HashMap<String, Vec<u8>>);

impl SessionMap {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.0.remove(key)
    }

    /// Check if a key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries in arbitrary order.
    pub fn iter(&self) -> hash_map::Iter<'_, String, Vec<u8>> {
        self.0.iter()
    }

    /// Unwrap into the underlying map.
    pub fn into_inner(self) -> HashMap<String, Vec<u8>> {
        self.0
    }
}

impl From<HashMap<String, Vec<u8>>> for SessionMap {
    fn from(map: HashMap<String, Vec<u8>>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Vec<u8>>> FromIterator<(K, V)> for SessionMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for SessionMap {
    type Item = (String, Vec<u8>);
    type IntoIter = hash_map::IntoIter<String, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Directive asking the engine to destroy session rows on the next save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ForceInvalidate {
    /// Invalidate only when the authenticated user changes
    #[default]
    DoNotForceInvalidate,
    /// Destroy the current session row
    CurrentSessionId,
    /// Destroy the current row and every row of the previously logged-in user
    AllSessionIdsOfLoggedUser,
}

impl ForceInvalidate {
    /// Every directive, in declaration order.
    pub const ALL: [ForceInvalidate; 3] = [
        ForceInvalidate::DoNotForceInvalidate,
        ForceInvalidate::CurrentSessionId,
        ForceInvalidate::AllSessionIdsOfLoggedUser,
    ];

    /// Textual encoding stored under [`FORCE_INVALIDATE_KEY`].
    pub fn as_str(&self) -> &'static str {
        match self {
            ForceInvalidate::DoNotForceInvalidate => "DoNotForceInvalidate",
            ForceInvalidate::CurrentSessionId => "CurrentSessionId",
            ForceInvalidate::AllSessionIdsOfLoggedUser => "AllSessionIdsOfLoggedUser",
        }
    }

    /// Parse the textual encoding exactly.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str().as_bytes() == raw)
    }

    /// Decode a stored directive; absent or garbled values mean
    /// [`ForceInvalidate::DoNotForceInvalidate`].
    pub fn decode(raw: Option<&[u8]>) -> Self {
        match raw {
            None => ForceInvalidate::default(),
            Some(raw) => Self::parse(raw).unwrap_or_else(|| {
                warn!(len = raw.len(), "Ignoring unrecognised force-invalidate directive");
                ForceInvalidate::default()
            }),
        }
    }
}

impl fmt::Display for ForceInvalidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ask the engine to invalidate sessions when `payload` is next saved.
///
/// # Examples
///
/// ```
/// use turnstile_session::{ForceInvalidate, SessionMap, force_invalidate, FORCE_INVALIDATE_KEY};
///
/// let mut payload = SessionMap::new();
/// force_invalidate(&mut payload, ForceInvalidate::AllSessionIdsOfLoggedUser);
/// assert_eq!(
///     payload.get(FORCE_INVALIDATE_KEY),
///     Some("AllSessionIdsOfLoggedUser".as_bytes())
/// );
/// ```
pub fn force_invalidate(payload: &mut SessionMap, directive: ForceInvalidate) {
    payload.insert(FORCE_INVALIDATE_KEY, directive.as_str());
}

/// A payload split into its reserved parts and the caller's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecomposedSession<D> {
    /// Value of the auth key, if present
    pub auth_id: Option<AuthId>,
    /// Decoded force-invalidate directive
    pub force_invalidate: ForceInvalidate,
    /// Payload without any reserved key
    pub data: D,
}

impl<D: SessionData> DecomposedSession<D> {
    /// No authenticated user and no caller data.
    pub fn is_empty(&self) -> bool {
        self.auth_id.is_none() && self.data.is_empty()
    }
}

/// Payload types a storage backend can hold.
///
/// [`SessionMap`] is the standard implementation; backends with richer
/// payloads implement this trait to plug into the same engine.
pub trait SessionData: Clone + PartialEq + Send + Sync + 'static {
    /// Payload with no entries.
    fn empty() -> Self;

    /// Whether the payload has no entries.
    fn is_empty(&self) -> bool;

    /// Strip the reserved keys from `payload`.
    fn decompose(auth_key: &str, payload: Self) -> DecomposedSession<Self>;

    /// Re-insert the auth key into caller data.
    fn recompose(auth_key: &str, auth_id: Option<&[u8]>, data: Self) -> Self;
}

impl SessionData for SessionMap {
    fn empty() -> Self {
        SessionMap::new()
    }

    fn is_empty(&self) -> bool {
        SessionMap::is_empty(self)
    }

    fn decompose(auth_key: &str, mut payload: Self) -> DecomposedSession<Self> {
        let auth_id = payload.remove(auth_key);
        let force_invalidate =
            ForceInvalidate::decode(payload.remove(FORCE_INVALIDATE_KEY).as_deref());

        DecomposedSession {
            auth_id,
            force_invalidate,
            data: payload,
        }
    }

    fn recompose(auth_key: &str, auth_id: Option<&[u8]>, mut data: Self) -> Self {
        if let Some(auth_id) = auth_id {
            data.insert(auth_key, auth_id);
        }
        data
    }
}
