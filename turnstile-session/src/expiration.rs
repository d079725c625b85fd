//! Session expiry computation.
//!
//! A session expires at the earlier of `accessed_at + idle_timeout` and
//! `created_at + absolute_timeout`; with neither timeout set it never
//! expires.

use crate::config::SessionConfig;
use crate::traits::Session;
use chrono::{DateTime, Duration, Utc};

/// How far ahead persistent cookies without any timeout expire.
const PERMANENT_COOKIE_DAYS: i64 = 365 * 20 + 5;

/// Instant at which `session` expires, if it ever does.
pub fn next_expires<D>(config: &SessionConfig, session: &Session<D>) -> Option<DateTime<Utc>> {
    let idle = config
        .idle_timeout()
        .and_then(|timeout| add(session.accessed_at, timeout));
    let absolute = config
        .absolute_timeout()
        .and_then(|timeout| add(session.created_at, timeout));

    match (idle, absolute) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Whether `session` has expired at `now`.
pub fn check_expired<D>(now: DateTime<Utc>, config: &SessionConfig, session: &Session<D>) -> bool {
    next_expires(config, session).is_some_and(|expires| now >= expires)
}

/// `Expires` attribute for the session cookie.
///
/// `None` means a browser-session cookie. Persistent cookies for sessions
/// that never expire get an instant twenty years past `now`.
pub fn cookie_expires<D>(
    now: DateTime<Utc>,
    config: &SessionConfig,
    session: &Session<D>,
) -> Option<DateTime<Utc>> {
    if !config.persistent_cookies() {
        return None;
    }

    next_expires(config, session).or_else(|| {
        now.checked_add_signed(Duration::days(PERMANENT_COOKIE_DAYS))
            .or(Some(DateTime::<Utc>::MAX_UTC))
    })
}

/// Timeouts too large for the calendar never fire.
fn add(instant: DateTime<Utc>, timeout: std::time::Duration) -> Option<DateTime<Utc>> {
    Duration::from_std(timeout)
        .ok()
        .and_then(|delta| instant.checked_add_signed(delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SessionMap;
    use crate::id::SessionId;
    use std::time::Duration as StdDuration;

    fn secs(n: u64) -> Option<StdDuration> {
        Some(StdDuration::from_secs(n))
    }

    fn session_at(created_at: DateTime<Utc>, accessed_at: DateTime<Utc>) -> Session<SessionMap> {
        Session {
            key: SessionId::generate(),
            auth_id: None,
            data: SessionMap::new(),
            created_at,
            accessed_at,
        }
    }

    fn config(idle: Option<StdDuration>, absolute: Option<StdDuration>) -> SessionConfig {
        SessionConfig::default()
            .with_idle_timeout(idle)
            .with_absolute_timeout(absolute)
    }

    #[test]
    fn test_next_expires_without_timeouts() {
        let t = Utc::now();
        assert_eq!(next_expires(&config(None, None), &session_at(t, t)), None);
    }

    #[test]
    fn test_next_expires_single_timeout() {
        let t = Utc::now();
        let s = session_at(t, t);
        assert_eq!(
            next_expires(&config(secs(1), None), &s),
            Some(t + Duration::seconds(1))
        );
        assert_eq!(
            next_expires(&config(None, secs(1)), &s),
            Some(t + Duration::seconds(1))
        );
    }

    #[test]
    fn test_next_expires_takes_nearer_bound() {
        let t = Utc::now();
        let cfg = config(secs(3), secs(7));

        assert_eq!(
            next_expires(&cfg, &session_at(t, t)),
            Some(t + Duration::seconds(3))
        );
        assert_eq!(
            next_expires(&cfg, &session_at(t - Duration::seconds(4), t)),
            Some(t + Duration::seconds(3))
        );

        assert_eq!(
            next_expires(&cfg, &session_at(t, t + Duration::seconds(4))),
            Some(t + Duration::seconds(7))
        );

        // Absolute wins once it is the nearer bound.
        assert_eq!(
            next_expires(&cfg, &session_at(t - Duration::seconds(5), t)),
            Some(t + Duration::seconds(2))
        );
    }

    #[test]
    fn test_next_expires_idle_uses_access_time() {
        let t = Utc::now();
        let cfg = config(secs(3), None);
        assert_eq!(
            next_expires(&cfg, &session_at(t - Duration::seconds(100), t)),
            Some(t + Duration::seconds(3))
        );
    }

    #[test]
    fn test_absolute_wins_with_long_idle() {
        let t = Utc::now();
        let cfg = config(secs(10), secs(7));
        assert_eq!(
            next_expires(&cfg, &session_at(t - Duration::seconds(4), t)),
            Some(t + Duration::seconds(3))
        );
    }

    #[test]
    fn test_check_expired_boundary() {
        let t = Utc::now();
        let s = session_at(t, t);
        let cfg = config(secs(10), None);

        assert!(!check_expired(t, &cfg, &s));
        assert!(!check_expired(t + Duration::seconds(9), &cfg, &s));
        assert!(check_expired(t + Duration::seconds(10), &cfg, &s));
        assert!(check_expired(t + Duration::seconds(11), &cfg, &s));
    }

    #[test]
    fn test_check_expired_matches_next_expires() {
        let t = Utc::now();
        let configs = [
            config(None, None),
            config(secs(5), None),
            config(None, secs(5)),
            config(secs(2), secs(5)),
        ];
        let sessions = [
            session_at(t, t),
            session_at(t - Duration::seconds(3), t - Duration::seconds(1)),
        ];

        for cfg in &configs {
            for s in &sessions {
                for offset in -2..8 {
                    let now = t + Duration::seconds(offset);
                    let expected = next_expires(cfg, s).is_some_and(|e| now >= e);
                    assert_eq!(check_expired(now, cfg, s), expected);
                }
            }
        }
    }

    #[test]
    fn test_never_expires_without_timeouts() {
        let t = Utc::now();
        let s = session_at(t, t);
        assert!(!check_expired(t + Duration::days(100_000), &config(None, None), &s));
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let t = Utc::now();
        let cfg = config(Some(StdDuration::from_secs(u64::MAX)), secs(5));
        assert_eq!(
            next_expires(&cfg, &session_at(t, t)),
            Some(t + Duration::seconds(5))
        );
    }

    #[test]
    fn test_cookie_expires_non_persistent() {
        let t = Utc::now();
        let s = session_at(t, t);
        for cfg in [config(None, None), config(secs(5), secs(10))] {
            let cfg = cfg.with_persistent_cookies(false);
            assert_eq!(cookie_expires(t, &cfg, &s), None);
        }
    }

    #[test]
    fn test_cookie_expires_persistent() {
        let t = Utc::now();
        let s = session_at(t, t);

        let cfg = config(secs(5), None).with_persistent_cookies(true);
        assert_eq!(cookie_expires(t, &cfg, &s), Some(t + Duration::seconds(5)));

        let cfg = config(None, None).with_persistent_cookies(true);
        let expires = cookie_expires(t, &cfg, &s).unwrap();
        assert!(expires >= t + Duration::days(3653));
    }

    #[test]
    fn test_permanent_cookie_counts_from_now() {
        let cfg = config(None, None).with_persistent_cookies(true);
        let accessed = Utc::now() - Duration::days(365 * 15);
        let s = session_at(accessed, accessed);

        let now = Utc::now();
        let expires = cookie_expires(now, &cfg, &s).unwrap();
        assert!(expires >= now + Duration::days(3653));
    }

    #[test]
    fn test_permanent_cookie_saturates() {
        let cfg = config(None, None).with_persistent_cookies(true);
        let t = Utc::now();
        let s = session_at(t, t);
        assert_eq!(
            cookie_expires(DateTime::<Utc>::MAX_UTC, &cfg, &s),
            Some(DateTime::<Utc>::MAX_UTC)
        );
    }
}
