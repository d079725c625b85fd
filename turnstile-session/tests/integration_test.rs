//! Integration tests for turnstile-session

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use turnstile_session::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn manager_at(
    start: chrono::DateTime<Utc>,
) -> (SessionManager<MemorySessionStorage>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let manager = SessionManager::new(MemorySessionStorage::new(), SessionConfig::default())
        .unwrap()
        .with_clock(Arc::clone(&clock));
    (manager, clock)
}

#[tokio::test]
async fn test_visitor_to_login_to_logout() {
    init_tracing();
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let (manager, clock) = manager_at(start);
    let auth_key = manager.config().auth_key().to_string();

    // Anonymous visit that stores nothing creates no session.
    let (payload, token) = manager.load_session(None).await.unwrap();
    assert!(payload.is_empty());
    assert!(manager.save_session(token, payload).await.unwrap().is_none());
    assert_eq!(manager.storage().transaction_count(), 0);

    // Visitor puts something in the cart.
    let (mut payload, token) = manager.load_session(None).await.unwrap();
    payload.insert("cart", "book");
    let anonymous = manager.save_session(token, payload).await.unwrap().unwrap();
    assert_eq!(anonymous.auth_id, None);

    // Login rotates the id and keeps the cart.
    clock.advance(ChronoDuration::minutes(1));
    let cookie = manager.cookie_for(&anonymous);
    let (mut payload, token) = manager
        .load_session(Some(cookie.value.as_bytes()))
        .await
        .unwrap();
    assert_eq!(payload.get("cart"), Some(b"book".as_slice()));
    payload.insert(auth_key.as_str(), "john");
    let logged_in = manager.save_session(token, payload).await.unwrap().unwrap();

    assert_ne!(logged_in.key, anonymous.key);
    assert_eq!(logged_in.auth_id.as_deref(), Some(b"john".as_slice()));
    assert_eq!(logged_in.created_at, start + ChronoDuration::minutes(1));
    assert_eq!(manager.storage().sessions().await, vec![logged_in.clone()]);

    // The old cookie no longer resolves.
    let (payload, token) = manager
        .load_session(Some(anonymous.key.as_str().as_bytes()))
        .await
        .unwrap();
    assert!(payload.is_empty());
    assert!(token.prior_session().is_none());

    // Logout clears the user and the data.
    let cookie = manager.cookie_for(&logged_in);
    let (mut payload, token) = manager
        .load_session(Some(cookie.value.as_bytes()))
        .await
        .unwrap();
    assert_eq!(payload.get(&auth_key), Some(b"john".as_slice()));
    payload.remove(&auth_key);
    payload.remove("cart");
    assert!(manager.save_session(token, payload).await.unwrap().is_none());
    assert!(manager.storage().is_empty().await);
}

#[tokio::test]
async fn test_logout_everywhere_spares_other_users() {
    init_tracing();
    let (manager, _clock) = manager_at(Utc::now());
    let auth_key = manager.config().auth_key().to_string();

    let mut john_sessions = Vec::new();
    for _ in 0..3 {
        let (mut payload, token) = manager.load_session(None).await.unwrap();
        payload.insert(auth_key.as_str(), "john");
        john_sessions.push(manager.save_session(token, payload).await.unwrap().unwrap());
    }

    let (mut payload, token) = manager.load_session(None).await.unwrap();
    payload.insert(auth_key.as_str(), "jane");
    let jane = manager.save_session(token, payload).await.unwrap().unwrap();
    assert_eq!(manager.storage().len().await, 4);

    let cookie = manager.cookie_for(&john_sessions[0]);
    let (mut payload, token) = manager
        .load_session(Some(cookie.value.as_bytes()))
        .await
        .unwrap();
    force_invalidate(&mut payload, ForceInvalidate::AllSessionIdsOfLoggedUser);

    // Still logged in as john on a fresh id, every other john session gone.
    let fresh = manager.save_session(token, payload).await.unwrap().unwrap();
    assert_eq!(fresh.auth_id.as_deref(), Some(b"john".as_slice()));

    let remaining: HashSet<SessionId> = manager
        .storage()
        .sessions()
        .await
        .into_iter()
        .map(|s| s.key)
        .collect();
    assert_eq!(remaining, HashSet::from([jane.key, fresh.key]));
    assert!(!fresh.data.contains_key(FORCE_INVALIDATE_KEY));
}

#[tokio::test]
async fn test_idle_and_absolute_timeouts() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let config = SessionConfig::default()
        .with_idle_timeout(Some(Duration::from_secs(3600)))
        .with_absolute_timeout(Some(Duration::from_secs(4 * 3600)))
        .with_timeout_resolution(Some(Duration::from_secs(60)));
    let manager = SessionManager::new(MemorySessionStorage::new(), config)
        .unwrap()
        .with_clock(Arc::clone(&clock));

    let (mut payload, token) = manager.load_session(None).await.unwrap();
    payload.insert("k", "v");
    let mut session = manager.save_session(token, payload).await.unwrap().unwrap();
    assert_eq!(
        manager.next_expires(&session),
        Some(start + ChronoDuration::hours(1))
    );

    // Keep the session alive with a visit every 50 minutes.
    for _ in 0..4 {
        clock.advance(ChronoDuration::minutes(50));
        let (payload, token) = manager
            .load_session(Some(session.key.as_str().as_bytes()))
            .await
            .unwrap();
        assert_eq!(payload.get("k"), Some(b"v".as_slice()));
        session = manager
            .save_session(token, payload)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.accessed_at, clock.now());
    }

    // The absolute timeout caps the session regardless of activity.
    assert_eq!(
        manager.next_expires(&session),
        Some(start + ChronoDuration::hours(4))
    );
    clock.set(start + ChronoDuration::hours(4));
    let (payload, token) = manager
        .load_session(Some(session.key.as_str().as_bytes()))
        .await
        .unwrap();
    assert!(payload.is_empty());
    assert!(token.prior_session().is_none());
}

#[tokio::test]
async fn test_concurrent_id_generation() {
    let mut handles = Vec::new();
    for _ in 0..32 {
        handles.push(tokio::spawn(async {
            (0..250)
                .map(|_| RandomIdGenerator.generate())
                .collect::<Vec<_>>()
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert_eq!(id.as_str().len(), SESSION_ID_LENGTH);
            assert!(seen.insert(id));
        }
    }
    assert_eq!(seen.len(), 32 * 250);
}

#[tokio::test]
async fn test_concurrent_saves_share_storage() {
    let manager =
        SessionManager::new(MemorySessionStorage::new(), SessionConfig::default()).unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let (mut payload, token) = manager.load_session(None).await?;
            payload.insert("n", i.to_string());
            manager.save_session(token, payload).await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_some());
    }
    assert_eq!(manager.storage().len().await, 20);
    assert_eq!(manager.storage().transaction_count(), 20);
}

#[tokio::test]
async fn test_memory_storage_conformance() {
    init_tracing();
    conformance::run_all(&MemorySessionStorage::new(), conformance::sample_map)
        .await
        .unwrap();
}

/// Typed payload with the user and logout directive held in fields.
#[derive(Debug, Clone, Default, PartialEq)]
struct Preferences {
    user: Option<Vec<u8>>,
    logout: Option<ForceInvalidate>,
    theme: Option<String>,
    visits: u32,
}

impl SessionData for Preferences {
    fn empty() -> Self {
        Self::default()
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn decompose(_auth_key: &str, mut payload: Self) -> DecomposedSession<Self> {
        DecomposedSession {
            auth_id: payload.user.take(),
            force_invalidate: payload.logout.take().unwrap_or_default(),
            data: payload,
        }
    }

    fn recompose(_auth_key: &str, auth_id: Option<&[u8]>, mut data: Self) -> Self {
        data.user = auth_id.map(<[u8]>::to_vec);
        data
    }
}

fn preferences(variant: usize) -> Preferences {
    Preferences {
        theme: Some("dark".to_string()),
        visits: variant as u32,
        ..Preferences::default()
    }
}

#[tokio::test]
async fn test_conformance_with_custom_payload() {
    let storage = MemorySessionStorage::<Preferences>::default();
    conformance::run_all(&storage, preferences).await.unwrap();
}

#[tokio::test]
async fn test_manager_with_custom_payload() {
    let manager = SessionManager::new(
        MemorySessionStorage::<Preferences>::default(),
        SessionConfig::default(),
    )
    .unwrap();

    let (mut payload, token) = manager.load_session(None).await.unwrap();
    assert!(payload.is_empty());
    payload.theme = Some("light".to_string());
    payload.user = Some(b"john".to_vec());
    let session = manager.save_session(token, payload).await.unwrap().unwrap();
    assert_eq!(session.auth_id.as_deref(), Some(b"john".as_slice()));

    let (mut payload, token) = manager
        .load_session(Some(session.key.as_str().as_bytes()))
        .await
        .unwrap();
    assert_eq!(payload.user.as_deref(), Some(b"john".as_slice()));
    assert_eq!(payload.theme.as_deref(), Some("light"));

    payload.logout = Some(ForceInvalidate::CurrentSessionId);
    let rotated = manager.save_session(token, payload).await.unwrap().unwrap();
    assert_ne!(rotated.key, session.key);
    assert_eq!(rotated.data.logout, None);
    assert_eq!(manager.storage().len().await, 1);
}

#[tokio::test]
async fn test_storage_errors_roll_back_and_propagate() {
    let storage = MemorySessionStorage::new();
    let session = Session::new(SessionId::generate(), None, SessionMap::new(), Utc::now());

    let err = storage
        .run_transaction(move |storage, tx| {
            Box::pin(async move { storage.replace_session(tx, session).await })
        })
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert!(matches!(err, SessionError::SessionDoesNotExist(_)));
}

#[test]
fn test_session_cookie_attributes() {
    let config = SessionConfig::default()
        .with_cookie_name("SID")
        .with_secure_cookies(true)
        .with_persistent_cookies(false);
    let manager = SessionManager::new(MemorySessionStorage::new(), config).unwrap();
    let session = Session::new(SessionId::generate(), None, SessionMap::new(), Utc::now());

    let cookie = manager.cookie_for(&session);
    assert_eq!(cookie.name, "SID");
    assert_eq!(cookie.value, session.key.to_string());
    assert!(cookie.http_only);
    assert!(cookie.secure);
    assert_eq!(cookie.expires, None);
}

#[test]
fn test_session_config_from_json() {
    let config: SessionConfig = serde_json::from_str(
        r#"{"cookie_name":"app_session","idle_timeout":{"secs":1800,"nanos":0}}"#,
    )
    .unwrap();

    assert_eq!(config.cookie_name(), "app_session");
    assert_eq!(config.idle_timeout(), Some(Duration::from_secs(1800)));
    assert_eq!(config.auth_key(), DEFAULT_AUTH_KEY);
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = SessionConfig::default().with_cookie_name("");
    let err = SessionManager::new(MemorySessionStorage::new(), config)
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::Config(_)));
}

#[test]
fn test_session_error_display() {
    let err = SessionError::Storage("connection refused".to_string());
    assert!(format!("{}", err).contains("connection refused"));

    let session = Session::new(SessionId::generate(), None, SessionMap::new(), Utc::now());
    let err = SessionError::SessionDoesNotExist(Box::new(session.snapshot()));
    assert!(!format!("{}", err).contains(session.key.as_str()));
    assert!(!format!("{:?}", session.key).contains(session.key.as_str()));
}

#[test]
fn test_session_id_parsing() {
    let id = SessionId::generate();
    assert_eq!(SessionId::parse(id.as_str()), Some(id.clone()));
    assert_eq!(SessionId::from_bytes(id.as_str().as_bytes()), Some(id));
    assert_eq!(SessionId::parse("too-short"), None);
    assert_eq!(SessionId::from_bytes(&[0xff; SESSION_ID_LENGTH]), None);
}
