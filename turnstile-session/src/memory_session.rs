//! In-memory session storage.
//!
//! Every operation is applied atomically to a single versioned map and
//! appended to an operation log, which makes this store the reference the
//! engine is tested against. It offers no multi-operation atomicity:
//! transactions are accepted but operations take effect immediately.
//!
//! Instances are independent; cloning one shares its state.

use crate::data::{AuthId, SessionData, SessionMap};
use crate::error::{SessionError, SessionResult};
use crate::id::SessionId;
use crate::traits::{Session, SessionStorage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::trace;

/// A storage call recorded by [`MemorySessionStorage`].
#[derive(Debug, Clone, PartialEq)]
pub enum StorageOperation<D = SessionMap> {
    /// `get_session`
    GetSession(SessionId),
    /// `delete_session`
    DeleteSession(SessionId),
    /// `delete_all_sessions_of_auth_id`
    DeleteAllSessionsOfAuthId(AuthId),
    /// `insert_session`
    InsertSession(Session<D>),
    /// `replace_session`
    ReplaceSession(Session<D>),
}

/// Transaction handle of [`MemorySessionStorage`].
#[derive(Debug)]
pub struct MemoryTransaction {
    id: u64,
}

impl MemoryTransaction {
    /// Sequence number of this transaction.
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct MemoryState<D> {
    version: u64,
    sessions: HashMap<SessionId, Session<D>>,
    log: Vec<StorageOperation<D>>,
}

impl<D> MemoryState<D> {
    fn record(&mut self, op: StorageOperation<D>) {
        self.log.push(op);
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}

/// In-memory session store with an operation log.
///
/// # Examples
///
/// ```
/// use turnstile_session::{MemorySessionStorage, SessionConfig, SessionManager};
///
/// # #[tokio::main]
/// # async fn main() -> turnstile_session::SessionResult<()> {
/// let storage = MemorySessionStorage::new();
/// let manager = SessionManager::new(storage.clone(), SessionConfig::default())?;
///
/// let (_payload, _token) = manager.load_session(None).await?;
/// assert!(storage.operations().await.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct MemorySessionStorage<D = SessionMap> {
    state: Arc<Mutex<MemoryState<D>>>,
    transactions: Arc<AtomicU64>,
}

impl MemorySessionStorage {
    /// Create an empty store for [`SessionMap`] payloads.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D> Default for MemorySessionStorage<D> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                version: 0,
                sessions: HashMap::new(),
                log: Vec::new(),
            })),
            transactions: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<D> Clone for MemorySessionStorage<D> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            transactions: Arc::clone(&self.transactions),
        }
    }
}

impl<D: Clone> MemorySessionStorage<D> {
    /// Every recorded operation, oldest first.
    pub async fn operations(&self) -> Vec<StorageOperation<D>> {
        self.state.lock().await.log.clone()
    }

    /// Drain the operation log.
    pub async fn take_operations(&self) -> Vec<StorageOperation<D>> {
        std::mem::take(&mut self.state.lock().await.log)
    }

    /// Clear the operation log.
    pub async fn clear_operations(&self) {
        self.state.lock().await.log.clear();
    }

    /// All stored sessions, in arbitrary order.
    pub async fn sessions(&self) -> Vec<Session<D>> {
        self.state.lock().await.sessions.values().cloned().collect()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Whether no session is stored.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.sessions.is_empty()
    }

    /// Number of mutations applied so far.
    pub async fn version(&self) -> u64 {
        self.state.lock().await.version
    }

    /// Number of transactions opened so far.
    pub fn transaction_count(&self) -> u64 {
        self.transactions.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<D: SessionData> SessionStorage for MemorySessionStorage<D> {
    type Data = D;
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> SessionResult<MemoryTransaction> {
        let id = self.transactions.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(tx = id, "Opening in-memory transaction");
        Ok(MemoryTransaction { id })
    }

    async fn commit(&self, tx: MemoryTransaction) -> SessionResult<()> {
        trace!(tx = tx.id, "Committing in-memory transaction");
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTransaction) -> SessionResult<()> {
        trace!(tx = tx.id, "Rolling back in-memory transaction (no-op)");
        Ok(())
    }

    async fn get_session(
        &self,
        _tx: &mut MemoryTransaction,
        id: &SessionId,
    ) -> SessionResult<Option<Session<D>>> {
        let mut state = self.state.lock().await;
        state.record(StorageOperation::GetSession(id.clone()));
        Ok(state.sessions.get(id).cloned())
    }

    async fn delete_session(
        &self,
        _tx: &mut MemoryTransaction,
        id: &SessionId,
    ) -> SessionResult<()> {
        let mut state = self.state.lock().await;
        state.record(StorageOperation::DeleteSession(id.clone()));
        if state.sessions.remove(id).is_some() {
            state.bump();
        }
        Ok(())
    }

    async fn delete_all_sessions_of_auth_id(
        &self,
        _tx: &mut MemoryTransaction,
        auth_id: &[u8],
    ) -> SessionResult<()> {
        let mut state = self.state.lock().await;
        state.record(StorageOperation::DeleteAllSessionsOfAuthId(auth_id.to_vec()));

        let before = state.sessions.len();
        state
            .sessions
            .retain(|_, session| session.auth_id.as_deref() != Some(auth_id));
        let removed = before - state.sessions.len();

        trace!(removed = removed, "Deleted sessions of auth id");
        if removed > 0 {
            state.bump();
        }
        Ok(())
    }

    async fn insert_session(
        &self,
        _tx: &mut MemoryTransaction,
        session: Session<D>,
    ) -> SessionResult<()> {
        let mut state = self.state.lock().await;
        state.record(StorageOperation::InsertSession(session.clone()));

        if let Some(existing) = state.sessions.get(&session.key) {
            return Err(SessionError::SessionAlreadyExists {
                existing: Box::new(existing.snapshot()),
                attempted: Box::new(session.snapshot()),
            });
        }

        state.sessions.insert(session.key.clone(), session);
        state.bump();
        Ok(())
    }

    async fn replace_session(
        &self,
        _tx: &mut MemoryTransaction,
        session: Session<D>,
    ) -> SessionResult<()> {
        let mut state = self.state.lock().await;
        state.record(StorageOperation::ReplaceSession(session.clone()));

        match state.sessions.get_mut(&session.key) {
            Some(slot) => {
                *slot = session;
                state.bump();
                Ok(())
            }
            None => Err(SessionError::SessionDoesNotExist(Box::new(session.snapshot()))),
        }
    }
}
