//! Session manager: loading and saving sessions against any storage.

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::data::{DecomposedSession, SessionData};
use crate::error::SessionResult;
use crate::expiration::{check_expired, cookie_expires, next_expires};
use crate::id::{IdGenerator, RandomIdGenerator, SessionId};
use crate::invalidation::invalidate_if_needed;
use crate::traits::{Session, SessionStorage, finish_transaction};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, trace};

/// What `load_session` saw, handed back to `save_session`.
///
/// Saving diffs against this prior read instead of reading the row again.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveToken<D> {
    prior_session: Option<Session<D>>,
    now: DateTime<Utc>,
}

impl<D> SaveToken<D> {
    /// Create a token by hand.
    pub fn new(prior_session: Option<Session<D>>, now: DateTime<Utc>) -> Self {
        Self { prior_session, now }
    }

    /// The session that was loaded, if any.
    pub fn prior_session(&self) -> Option<&Session<D>> {
        self.prior_session.as_ref()
    }

    /// Instant of the load.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// Attributes of the cookie carrying a session id.
///
/// Rendering the `Set-Cookie` header is left to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name
    pub name: String,
    /// Encoded session id
    pub value: String,
    /// `HttpOnly` flag
    pub http_only: bool,
    /// `Secure` flag
    pub secure: bool,
    /// `Expires` attribute; `None` for a browser-session cookie
    pub expires: Option<DateTime<Utc>>,
}

/// Loads and saves sessions on behalf of the transport layer.
///
/// # Examples
///
/// ```
/// use turnstile_session::{MemorySessionStorage, SessionConfig, SessionManager, SessionMap};
///
/// # #[tokio::main]
/// # async fn main() -> turnstile_session::SessionResult<()> {
/// let manager = SessionManager::new(MemorySessionStorage::new(), SessionConfig::default())?;
///
/// // First request: no cookie yet.
/// let (mut payload, token) = manager.load_session(None).await?;
/// payload.insert("cart", "3 items");
/// let session = manager.save_session(token, payload).await?.expect("session was created");
///
/// // Next request presents the cookie.
/// let cookie = manager.cookie_for(&session);
/// let (payload, _token) = manager.load_session(Some(cookie.value.as_bytes())).await?;
/// assert_eq!(payload.get("cart"), Some("3 items".as_bytes()));
/// # Ok(())
/// # }
/// ```
pub struct SessionManager<S: SessionStorage> {
    storage: Arc<S>,
    config: SessionConfig,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl<S: SessionStorage> Clone for SessionManager<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
            ids: Arc::clone(&self.ids),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: SessionStorage> SessionManager<S> {
    /// Create a manager over `storage`.
    ///
    /// Fails if `config` does not validate.
    pub fn new(storage: S, config: SessionConfig) -> SessionResult<Self> {
        Self::from_shared(Arc::new(storage), config)
    }

    /// Create a manager over storage shared with other owners.
    pub fn from_shared(storage: Arc<S>, config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            config,
            ids: Arc::new(RandomIdGenerator),
            clock: Arc::new(SystemClock),
        })
    }

    /// Use a different configuration.
    pub fn with_config(mut self, config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Use a different id source.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// The storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The active configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Load the session named by the raw cookie value.
    ///
    /// Absent cookies, malformed ids, unknown ids and expired sessions all
    /// produce the same empty payload and a token without a prior session.
    /// Malformed ids never reach the storage.
    pub async fn load_session(
        &self,
        raw_cookie: Option<&[u8]>,
    ) -> SessionResult<(S::Data, SaveToken<S::Data>)> {
        let now = self.clock.now();

        let Some(id) = raw_cookie.and_then(SessionId::from_bytes) else {
            trace!(cookie_present = raw_cookie.is_some(), "No usable session cookie");
            return Ok(Self::no_session(now));
        };

        let mut tx = self.storage.begin().await?;
        let outcome = self.storage.get_session(&mut tx, &id).await;
        let found = finish_transaction(self.storage.as_ref(), tx, outcome).await?;

        match found {
            Some(session) if !check_expired(now, &self.config, &session) => {
                let payload = <S::Data as SessionData>::recompose(
                    self.config.auth_key(),
                    session.auth_id.as_deref(),
                    session.data.clone(),
                );
                Ok((payload, SaveToken::new(Some(session), now)))
            }
            Some(_) => {
                debug!("Loaded session has expired");
                Ok(Self::no_session(now))
            }
            None => {
                trace!("Session cookie names no stored session");
                Ok(Self::no_session(now))
            }
        }
    }

    /// Persist `payload` for the request described by `token`.
    ///
    /// Returns the session the cookie should now name, or `None` when there
    /// is nothing to keep.
    pub async fn save_session(
        &self,
        token: SaveToken<S::Data>,
        payload: S::Data,
    ) -> SessionResult<Option<Session<S::Data>>> {
        let decomposed = <S::Data as SessionData>::decompose(self.config.auth_key(), payload);

        if token.prior_session.is_none() && decomposed.is_empty() {
            trace!("Empty new session, nothing to save");
            return Ok(None);
        }

        let mut tx = self.storage.begin().await?;
        let outcome = self.save_in(&mut tx, token, decomposed).await;
        finish_transaction(self.storage.as_ref(), tx, outcome).await
    }

    async fn save_in(
        &self,
        tx: &mut S::Transaction,
        token: SaveToken<S::Data>,
        decomposed: DecomposedSession<S::Data>,
    ) -> SessionResult<Option<Session<S::Data>>> {
        let prior = invalidate_if_needed(
            self.storage.as_ref(),
            tx,
            token.prior_session,
            &decomposed,
        )
        .await?;
        self.save_session_on_db(tx, token.now, prior, decomposed).await
    }

    /// Insert, replace or leave alone the session row.
    ///
    /// `prior` is the session surviving invalidation. Unchanged sessions are
    /// only re-written once the timeout resolution has elapsed since their
    /// last access.
    pub async fn save_session_on_db(
        &self,
        tx: &mut S::Transaction,
        now: DateTime<Utc>,
        prior: Option<Session<S::Data>>,
        decomposed: DecomposedSession<S::Data>,
    ) -> SessionResult<Option<Session<S::Data>>> {
        let auth_key = self.config.auth_key();

        let Some(old) = prior else {
            if decomposed.is_empty() {
                return Ok(None);
            }

            let data = <S::Data as SessionData>::recompose(
                auth_key,
                decomposed.auth_id.as_deref(),
                decomposed.data,
            );
            let session = Session::new(self.ids.generate(), decomposed.auth_id, data, now);

            debug!(authenticated = session.auth_id.is_some(), "Inserting new session");
            self.storage.insert_session(tx, session.clone()).await?;
            return Ok(Some(session));
        };

        let data = <S::Data as SessionData>::recompose(
            auth_key,
            decomposed.auth_id.as_deref(),
            decomposed.data,
        );

        if data == old.data
            && decomposed.auth_id == old.auth_id
            && self.within_timeout_resolution(now, &old)
        {
            trace!("Session unchanged within timeout resolution, skipping write");
            return Ok(Some(old));
        }

        // A clock that stepped back must not move accessed_at before created_at.
        let updated = Session {
            auth_id: decomposed.auth_id,
            data,
            accessed_at: now.max(old.created_at),
            ..old
        };

        debug!(authenticated = updated.auth_id.is_some(), "Replacing session");
        self.storage.replace_session(tx, updated.clone()).await?;
        Ok(Some(updated))
    }

    /// Cookie attributes for `session`.
    pub fn cookie_for(&self, session: &Session<S::Data>) -> SessionCookie {
        SessionCookie {
            name: self.config.cookie_name().to_string(),
            value: session.key.to_string(),
            http_only: self.config.http_only_cookies(),
            secure: self.config.secure_cookies(),
            expires: cookie_expires(self.clock.now(), &self.config, session),
        }
    }

    /// Instant at which `session` expires under this configuration.
    pub fn next_expires(&self, session: &Session<S::Data>) -> Option<DateTime<Utc>> {
        next_expires(&self.config, session)
    }

    fn within_timeout_resolution(&self, now: DateTime<Utc>, old: &Session<S::Data>) -> bool {
        let Some(resolution) = self.config.timeout_resolution() else {
            return true;
        };

        match chrono::Duration::from_std(resolution) {
            Ok(resolution) => now.signed_duration_since(old.accessed_at) < resolution,
            Err(_) => true,
        }
    }

    fn no_session(now: DateTime<Utc>) -> (S::Data, SaveToken<S::Data>) {
        (<S::Data as SessionData>::empty(), SaveToken::new(None, now))
    }
}
