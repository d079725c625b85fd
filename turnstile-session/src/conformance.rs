//! Conformance tests for [`SessionStorage`] backends.
//!
//! A backend is compliant once [`run_all`] passes against it. Each case uses
//! fresh session ids and auth ids, so the suite can share a store with other
//! data. Contract violations panic with a descriptive message; storage
//! failures are returned as errors.
//!
//! The suite is generic over the backend's payload type. Callers supply
//! `sample(variant)`, which must return different payloads for different
//! variants; [`sample_map`] does so for [`SessionMap`].
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

use crate::data::{AuthId, SessionMap};
use crate::error::{SessionError, SessionResult};
use crate::id::SessionId;
use crate::traits::{Session, SessionStorage, finish_transaction};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::fmt::Debug;
use tracing::debug;

/// Run every conformance case.
pub async fn run_all<S, F>(storage: &S, sample: F) -> SessionResult<()>
where
    S: SessionStorage,
    S::Data: Debug,
    F: Fn(usize) -> S::Data,
{
    get_unknown_session_returns_none(storage).await?;
    insert_then_get_returns_session(storage, &sample).await?;
    insert_existing_session_fails(storage, &sample).await?;
    replace_missing_session_fails(storage, &sample).await?;
    replace_updates_session(storage, &sample).await?;
    delete_session_is_idempotent(storage, &sample).await?;
    delete_all_sessions_of_auth_id_is_scoped(storage, &sample).await?;
    transaction_commits_and_propagates_errors(storage, &sample).await?;
    debug!("Storage conformance suite passed");
    Ok(())
}

/// Sample [`SessionMap`] payloads, distinct per variant.
pub fn sample_map(variant: usize) -> SessionMap {
    [
        ("hello", "world".to_string()),
        ("empty", String::new()),
        ("variant", variant.to_string()),
    ]
    .into_iter()
    .collect()
}

/// Unknown ids are reported as absent.
pub async fn get_unknown_session_returns_none<S>(storage: &S) -> SessionResult<()>
where
    S: SessionStorage,
    S::Data: Debug,
{
    let found = get(storage, &SessionId::generate()).await?;
    assert!(found.is_none(), "get_session returned a session for an unknown id");
    Ok(())
}

/// An inserted session reads back unchanged.
pub async fn insert_then_get_returns_session<S, F>(storage: &S, sample: &F) -> SessionResult<()>
where
    S: SessionStorage,
    S::Data: Debug,
    F: Fn(usize) -> S::Data,
{
    for auth_id in [None, Some(fresh_auth_id())] {
        let session = sample_session(sample(0), auth_id);
        insert(storage, session.clone()).await?;

        let found = get(storage, &session.key).await?;
        assert_eq!(found, Some(session), "inserted session did not read back unchanged");
    }
    Ok(())
}

/// Inserting over an existing key fails and leaves the stored row intact.
pub async fn insert_existing_session_fails<S, F>(storage: &S, sample: &F) -> SessionResult<()>
where
    S: SessionStorage,
    S::Data: Debug,
    F: Fn(usize) -> S::Data,
{
    let original = sample_session(sample(0), None);
    insert(storage, original.clone()).await?;

    let mut clash = sample_session(sample(1), Some(fresh_auth_id()));
    clash.key = original.key.clone();

    match insert(storage, clash).await {
        Err(SessionError::SessionAlreadyExists { existing, attempted }) => {
            assert_eq!(existing.key, original.key);
            assert_eq!(attempted.key, original.key);
        }
        other => panic!("duplicate insert_session returned {other:?}"),
    }

    let found = get(storage, &original.key).await?;
    assert_eq!(found, Some(original), "failed insert modified the stored session");
    Ok(())
}

/// Replacing an absent key fails and creates nothing.
pub async fn replace_missing_session_fails<S, F>(storage: &S, sample: &F) -> SessionResult<()>
where
    S: SessionStorage,
    S::Data: Debug,
    F: Fn(usize) -> S::Data,
{
    let session = sample_session(sample(0), None);

    match replace(storage, session.clone()).await {
        Err(SessionError::SessionDoesNotExist(snapshot)) => {
            assert_eq!(snapshot.key, session.key);
        }
        other => panic!("replace_session of a missing key returned {other:?}"),
    }

    let found = get(storage, &session.key).await?;
    assert!(found.is_none(), "failed replace created a session");
    Ok(())
}

/// Replacing changes data, auth id and access time.
pub async fn replace_updates_session<S, F>(storage: &S, sample: &F) -> SessionResult<()>
where
    S: SessionStorage,
    S::Data: Debug,
    F: Fn(usize) -> S::Data,
{
    let original = sample_session(sample(0), None);
    insert(storage, original.clone()).await?;

    let mut updated = original.clone();
    updated.data = sample(1);
    updated.auth_id = Some(fresh_auth_id());
    updated.accessed_at = original.accessed_at + Duration::seconds(30);
    assert_ne!(updated.data, original.data, "sample payloads must differ per variant");
    replace(storage, updated.clone()).await?;

    let found = get(storage, &original.key).await?;
    assert_eq!(found, Some(updated.clone()), "replace_session did not persist changes");

    let mut anonymous = updated;
    anonymous.auth_id = None;
    replace(storage, anonymous.clone()).await?;
    let found = get(storage, &original.key).await?;
    assert_eq!(found, Some(anonymous), "replace_session did not clear the auth id");
    Ok(())
}

/// Deleting removes the row and deleting again is harmless.
pub async fn delete_session_is_idempotent<S, F>(storage: &S, sample: &F) -> SessionResult<()>
where
    S: SessionStorage,
    S::Data: Debug,
    F: Fn(usize) -> S::Data,
{
    let session = sample_session(sample(0), Some(fresh_auth_id()));
    insert(storage, session.clone()).await?;

    for _ in 0..2 {
        let key = session.key.clone();
        storage
            .run_transaction(move |storage, tx| {
                Box::pin(async move { storage.delete_session(tx, &key).await })
            })
            .await?;
        let found = get(storage, &session.key).await?;
        assert!(found.is_none(), "delete_session left the session behind");
    }

    let never_stored = SessionId::generate();
    storage
        .run_transaction(move |storage, tx| {
            Box::pin(async move { storage.delete_session(tx, &never_stored).await })
        })
        .await?;
    Ok(())
}

/// Deleting by auth id removes exactly that user's rows.
pub async fn delete_all_sessions_of_auth_id_is_scoped<S, F>(
    storage: &S,
    sample: &F,
) -> SessionResult<()>
where
    S: SessionStorage,
    S::Data: Debug,
    F: Fn(usize) -> S::Data,
{
    let target = fresh_auth_id();
    let bystander = fresh_auth_id();

    let doomed = vec![
        sample_session(sample(0), Some(target.clone())),
        sample_session(sample(1), Some(target.clone())),
        sample_session(sample(2), Some(target.clone())),
    ];
    let survivors = vec![
        sample_session(sample(0), Some(bystander)),
        sample_session(sample(0), None),
    ];

    for session in doomed.iter().chain(survivors.iter()) {
        insert(storage, session.clone()).await?;
    }

    for _ in 0..2 {
        let auth_id = target.clone();
        storage
            .run_transaction(move |storage, tx| {
                Box::pin(async move {
                    storage.delete_all_sessions_of_auth_id(tx, &auth_id).await
                })
            })
            .await?;

        for session in &doomed {
            let found = get(storage, &session.key).await?;
            assert!(found.is_none(), "delete_all_sessions_of_auth_id missed a session");
        }
        for session in &survivors {
            let found = get(storage, &session.key).await?;
            assert_eq!(
                found.as_ref(),
                Some(session),
                "delete_all_sessions_of_auth_id removed another user's session"
            );
        }
    }
    Ok(())
}

/// `run_transaction` commits the body's writes and hands back its error.
pub async fn transaction_commits_and_propagates_errors<S, F>(
    storage: &S,
    sample: &F,
) -> SessionResult<()>
where
    S: SessionStorage,
    S::Data: Debug,
    F: Fn(usize) -> S::Data,
{
    let first = sample_session(sample(0), None);
    let second = sample_session(sample(1), None);
    let (a, b) = (first.clone(), second.clone());

    storage
        .run_transaction(move |storage, tx| {
            Box::pin(async move {
                storage.insert_session(tx, a).await?;
                storage.insert_session(tx, b).await
            })
        })
        .await?;

    assert_eq!(get(storage, &first.key).await?, Some(first.clone()));
    assert_eq!(get(storage, &second.key).await?, Some(second));

    let clash = first.clone();
    let outcome = storage
        .run_transaction(move |storage, tx| {
            Box::pin(async move { storage.insert_session(tx, clash).await })
        })
        .await;
    assert!(
        matches!(outcome, Err(SessionError::SessionAlreadyExists { .. })),
        "run_transaction swallowed the body's error"
    );

    // The same steps without the closure helper.
    let mut tx = storage.begin().await?;
    let outcome = storage.get_session(&mut tx, &first.key).await;
    let found = finish_transaction(storage, tx, outcome).await?;
    assert_eq!(found, Some(first));
    Ok(())
}

fn sample_session<D>(data: D, auth_id: Option<AuthId>) -> Session<D> {
    // Whole seconds, so backends with coarse timestamps still compare equal.
    let now: DateTime<Utc> = Utc::now().trunc_subsecs(0);
    Session {
        key: SessionId::generate(),
        auth_id,
        data,
        created_at: now - Duration::minutes(5),
        accessed_at: now,
    }
}

fn fresh_auth_id() -> AuthId {
    format!("user-{}", SessionId::generate()).into_bytes()
}

async fn get<S>(storage: &S, id: &SessionId) -> SessionResult<Option<Session<S::Data>>>
where
    S: SessionStorage,
{
    let mut tx = storage.begin().await?;
    let outcome = storage.get_session(&mut tx, id).await;
    finish_transaction(storage, tx, outcome).await
}

async fn insert<S>(storage: &S, session: Session<S::Data>) -> SessionResult<()>
where
    S: SessionStorage,
{
    let mut tx = storage.begin().await?;
    let outcome = storage.insert_session(&mut tx, session).await;
    finish_transaction(storage, tx, outcome).await
}

async fn replace<S>(storage: &S, session: Session<S::Data>) -> SessionResult<()>
where
    S: SessionStorage,
{
    let mut tx = storage.begin().await?;
    let outcome = storage.replace_session(&mut tx, session).await;
    finish_transaction(storage, tx, outcome).await
}
