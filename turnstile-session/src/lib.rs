//! Server-side session engine for Turnstile applications.
//!
//! The engine loads a session from a cookie value, hands the caller a plain
//! key-value payload, and on save decides whether the stored row must be
//! inserted, replaced, left alone or destroyed. It knows nothing about HTTP
//! or any particular database: the transport layer passes raw cookie bytes in
//! and renders [`SessionCookie`] attributes out, and persistence goes through
//! the [`SessionStorage`] trait.
//!
//! # Features
//!
//! - Unguessable 144-bit session ids
//! - Idle and absolute timeouts, with a resolution window that avoids
//!   re-writing unchanged sessions on every request
//! - Session fixation defence: the id is rotated whenever the authenticated
//!   user changes
//! - Forced invalidation of the current session or of every session of the
//!   logged user ("log out everywhere")
//! - In-memory storage with an operation log for tests
//! - A conformance suite for third-party storage backends
//!
//! # Examples
//!
//! ## Login and logout
//!
//! ```
//! use turnstile_session::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let manager = SessionManager::new(MemorySessionStorage::new(), SessionConfig::default())?;
//!
//!     // Anonymous visitor adds something to their cart.
//!     let (mut payload, token) = manager.load_session(None).await?;
//!     payload.insert("cart", "1 item");
//!     let anonymous = manager.save_session(token, payload).await?.expect("session created");
//!
//!     // Login: storing the user under the auth key rotates the session id.
//!     let cookie = manager.cookie_for(&anonymous);
//!     let (mut payload, token) = manager.load_session(Some(cookie.value.as_bytes())).await?;
//!     payload.insert(manager.config().auth_key(), "john");
//!     let logged_in = manager.save_session(token, payload).await?.expect("session kept");
//!     assert_ne!(logged_in.key, anonymous.key);
//!     assert_eq!(logged_in.auth_id.as_deref(), Some(b"john".as_slice()));
//!
//!     // Log out everywhere.
//!     let cookie = manager.cookie_for(&logged_in);
//!     let (mut payload, token) = manager.load_session(Some(cookie.value.as_bytes())).await?;
//!     force_invalidate(&mut payload, ForceInvalidate::AllSessionIdsOfLoggedUser);
//!     payload.remove(manager.config().auth_key());
//!     payload.remove("cart");
//!     assert!(manager.save_session(token, payload).await?.is_none());
//!     assert!(manager.storage().is_empty().await);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Checking a storage backend
//!
//! ```
//! use turnstile_session::{MemorySessionStorage, conformance};
//!
//! # #[tokio::main]
//! # async fn main() -> turnstile_session::SessionResult<()> {
//! conformance::run_all(&MemorySessionStorage::new(), conformance::sample_map).await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod conformance;
pub mod data;
pub mod error;
pub mod expiration;
pub mod id;
pub mod invalidation;
pub mod manager;
pub mod memory_session;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_AUTH_KEY, DEFAULT_COOKIE_NAME, SessionConfig};
pub use data::{
    AuthId, DecomposedSession, FORCE_INVALIDATE_KEY, ForceInvalidate, SessionData, SessionMap,
    force_invalidate,
};
pub use error::{SessionError, SessionResult};
pub use expiration::{check_expired, cookie_expires, next_expires};
pub use id::{IdGenerator, RandomIdGenerator, SESSION_ID_LENGTH, SessionId};
pub use invalidation::invalidate_if_needed;
pub use manager::{SaveToken, SessionCookie, SessionManager};
pub use memory_session::{MemorySessionStorage, MemoryTransaction, StorageOperation};
pub use traits::{Session, SessionSnapshot, SessionStorage, finish_transaction};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::config::SessionConfig;
    pub use crate::data::{ForceInvalidate, SessionData, SessionMap, force_invalidate};
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::id::SessionId;
    pub use crate::manager::{SaveToken, SessionCookie, SessionManager};
    pub use crate::memory_session::MemorySessionStorage;
    pub use crate::traits::{Session, SessionStorage};
}
