// Turnstile - server-side sessions for Rust web applications
//
// The session engine is storage-agnostic: plug any transactional store in
// behind the `SessionStorage` trait.

#[cfg(feature = "session")]
pub use turnstile_session;

#[cfg(feature = "session")]
pub use turnstile_session::{
    ForceInvalidate, MemorySessionStorage, SaveToken, Session, SessionConfig, SessionCookie,
    SessionError, SessionId, SessionManager, SessionMap, SessionResult, SessionStorage,
    force_invalidate,
};

// Prelude for common imports
#[cfg(feature = "session")]
pub mod prelude {
    pub use turnstile_session::prelude::*;
}
