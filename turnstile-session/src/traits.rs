//! Session record and the storage contract every backend implements.

use crate::data::{AuthId, SessionData, SessionMap};
use crate::error::{SessionError, SessionResult};
use crate::id::SessionId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Session record as held by a storage backend.
///
/// The authenticated user lives in `auth_id`; when set, `data` mirrors it
/// under the configured auth key. Force-invalidate directives are never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session<D = SessionMap> {
    /// Session identifier (the cookie value)
    pub key: SessionId,
    /// Authenticated user, if any
    pub auth_id: Option<AuthId>,
    /// Caller data
    pub data: D,
    /// Session creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last write timestamp, never earlier than `created_at`
    pub accessed_at: DateTime<Utc>,
}

impl<D> Session<D> {
    /// Create a session created and accessed at `now`.
    pub fn new(key: SessionId, auth_id: Option<AuthId>, data: D, now: DateTime<Utc>) -> Self {
        Self {
            key,
            auth_id,
            data,
            created_at: now,
            accessed_at: now,
        }
    }

    /// Metadata of this session without its payload.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            key: self.key.clone(),
            auth_id: self.auth_id.clone(),
            created_at: self.created_at,
            accessed_at: self.accessed_at,
        }
    }
}

impl<D: Serialize + DeserializeOwned> Session<D> {
    /// Encode for key-value backends that store sessions as JSON documents.
    pub fn to_json(&self) -> SessionResult<String> {
        serde_json::to_string(self).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    /// Decode a session stored with [`Session::to_json`].
    pub fn from_json(json: &str) -> SessionResult<Self> {
        serde_json::from_str(json).map_err(|e| SessionError::Deserialization(e.to_string()))
    }
}

/// Session metadata carried by storage errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session identifier
    pub key: SessionId,
    /// Authenticated user, if any
    pub auth_id: Option<AuthId>,
    /// Session creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last write timestamp
    pub accessed_at: DateTime<Utc>,
}

/// Storage contract for session backends.
///
/// Every operation runs inside a transaction opened with
/// [`SessionStorage::begin`]. The engine only requires that the calls made
/// within one transaction are observed atomically by concurrent readers; how
/// a backend achieves that is its own business. A backend is compliant once
/// it passes [`crate::conformance::run_all`].
///
/// # Examples
///
/// ```
/// use turnstile_session::{MemorySessionStorage, SessionId, SessionStorage};
///
/// # #[tokio::main]
/// # async fn main() -> turnstile_session::SessionResult<()> {
/// let storage = MemorySessionStorage::new();
/// let id = SessionId::generate();
///
/// let found = storage
///     .run_transaction(move |storage, tx| {
///         Box::pin(async move { storage.get_session(tx, &id).await })
///     })
///     .await?;
///
/// assert!(found.is_none());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Payload type held by this backend.
    type Data: SessionData;

    /// Transaction scope handed to every operation.
    type Transaction: Send;

    /// Open a transaction.
    async fn begin(&self) -> SessionResult<Self::Transaction>;

    /// Make the transaction's effects visible.
    async fn commit(&self, tx: Self::Transaction) -> SessionResult<()>;

    /// Discard the transaction's effects, where the backend can.
    async fn rollback(&self, tx: Self::Transaction) -> SessionResult<()>;

    /// Get a session by ID.
    ///
    /// Returns `Ok(None)` if no such session is stored. Expiry is not the
    /// backend's concern.
    async fn get_session(
        &self,
        tx: &mut Self::Transaction,
        id: &SessionId,
    ) -> SessionResult<Option<Session<Self::Data>>>;

    /// Delete a session. Deleting an absent session is not an error.
    async fn delete_session(&self, tx: &mut Self::Transaction, id: &SessionId) -> SessionResult<()>;

    /// Delete every session of the given user. Idempotent.
    async fn delete_all_sessions_of_auth_id(
        &self,
        tx: &mut Self::Transaction,
        auth_id: &[u8],
    ) -> SessionResult<()>;

    /// Insert a new session.
    ///
    /// Fails with [`SessionError::SessionAlreadyExists`] if the key is taken.
    async fn insert_session(
        &self,
        tx: &mut Self::Transaction,
        session: Session<Self::Data>,
    ) -> SessionResult<()>;

    /// Replace an existing session.
    ///
    /// Fails with [`SessionError::SessionDoesNotExist`] if the key is absent.
    async fn replace_session(
        &self,
        tx: &mut Self::Transaction,
        session: Session<Self::Data>,
    ) -> SessionResult<()>;

    // ========== Convenience Methods ==========

    /// Run `body` in a fresh transaction.
    ///
    /// Commits if `body` succeeds; otherwise rolls back and returns the
    /// body's error.
    async fn run_transaction<T, F>(&self, body: F) -> SessionResult<T>
    where
        Self: Sized,
        T: Send,
        F: for<'t> FnOnce(&'t Self, &'t mut Self::Transaction) -> BoxFuture<'t, SessionResult<T>>
            + Send,
    {
        let mut tx = self.begin().await?;
        let outcome = body(self, &mut tx).await;
        finish_transaction(self, tx, outcome).await
    }
}

/// Commit on success, roll back on failure.
///
/// A failed rollback is logged and the original error wins.
pub async fn finish_transaction<S, T>(
    storage: &S,
    tx: S::Transaction,
    outcome: SessionResult<T>,
) -> SessionResult<T>
where
    S: SessionStorage + ?Sized,
{
    match outcome {
        Ok(value) => {
            storage.commit(tx).await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = storage.rollback(tx).await {
                warn!(error = %rollback_err, "Rollback failed after storage error");
            }
            Err(err)
        }
    }
}
