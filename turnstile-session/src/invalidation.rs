//! Session fixation defence.
//!
//! Whenever the authenticated user behind a session changes, or the caller
//! asks for it explicitly, the loaded session row is destroyed so the next
//! save mints a fresh session id.

use crate::data::{DecomposedSession, ForceInvalidate};
use crate::error::SessionResult;
use crate::traits::{Session, SessionStorage};
use tracing::debug;

/// Destroy the loaded session if the save request calls for it.
///
/// Returns the session to continue with, or `None` when a new row must be
/// minted. Must run inside the save's transaction.
pub async fn invalidate_if_needed<S>(
    storage: &S,
    tx: &mut S::Transaction,
    loaded: Option<Session<S::Data>>,
    decomposed: &DecomposedSession<S::Data>,
) -> SessionResult<Option<Session<S::Data>>>
where
    S: SessionStorage + ?Sized,
{
    let Some(loaded) = loaded else {
        return Ok(None);
    };

    match decomposed.force_invalidate {
        ForceInvalidate::AllSessionIdsOfLoggedUser => {
            debug!(
                directive = %decomposed.force_invalidate,
                authenticated = loaded.auth_id.is_some(),
                "Invalidating every session of the logged user"
            );
            storage.delete_session(tx, &loaded.key).await?;
            if let Some(auth_id) = &loaded.auth_id {
                storage.delete_all_sessions_of_auth_id(tx, auth_id).await?;
            }
            Ok(None)
        }
        ForceInvalidate::CurrentSessionId => {
            debug!(directive = %decomposed.force_invalidate, "Invalidating current session");
            storage.delete_session(tx, &loaded.key).await?;
            Ok(None)
        }
        ForceInvalidate::DoNotForceInvalidate if loaded.auth_id != decomposed.auth_id => {
            debug!(
                was_authenticated = loaded.auth_id.is_some(),
                now_authenticated = decomposed.auth_id.is_some(),
                "Authenticated user changed, invalidating session"
            );
            storage.delete_session(tx, &loaded.key).await?;
            Ok(None)
        }
        ForceInvalidate::DoNotForceInvalidate => Ok(Some(loaded)),
    }
}
