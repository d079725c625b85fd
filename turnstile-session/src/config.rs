//! Session configuration.

use crate::data::FORCE_INVALIDATE_KEY;
use crate::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default name of the session cookie.
pub const DEFAULT_COOKIE_NAME: &str = "JSESSIONID";

/// Default payload key carrying the authenticated user's identifier.
pub const DEFAULT_AUTH_KEY: &str = "_ID";

/// Session configuration.
///
/// The value is immutable: every `with_*` setter consumes it and returns a
/// new configuration.
///
/// # Examples
///
/// ```
/// use turnstile_session::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::default()
///     .with_cookie_name("SID")
///     .with_idle_timeout(Some(Duration::from_secs(1800)))
///     .with_secure_cookies(true);
///
/// assert_eq!(config.cookie_name(), "SID");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    cookie_name: String,
    auth_key: String,
    idle_timeout: Option<Duration>,
    absolute_timeout: Option<Duration>,
    timeout_resolution: Option<Duration>,
    persistent_cookies: bool,
    http_only_cookies: bool,
    secure_cookies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            auth_key: DEFAULT_AUTH_KEY.to_string(),
            idle_timeout: Some(Duration::from_secs(86400 * 7)), // 7 days
            absolute_timeout: Some(Duration::from_secs(86400 * 60)), // 60 days
            timeout_resolution: Some(Duration::from_secs(600)), // 10 minutes
            persistent_cookies: true,
            http_only_cookies: true,
            secure_cookies: false,
        }
    }
}

impl SessionConfig {
    /// Name of the session cookie.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Payload key holding the authenticated user's identifier.
    pub fn auth_key(&self) -> &str {
        &self.auth_key
    }

    /// Maximum time since last access before a session expires.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Maximum time since creation before a session expires.
    pub fn absolute_timeout(&self) -> Option<Duration> {
        self.absolute_timeout
    }

    /// Window within which unchanged sessions are not re-written.
    pub fn timeout_resolution(&self) -> Option<Duration> {
        self.timeout_resolution
    }

    /// Whether cookies carry an `Expires` attribute.
    pub fn persistent_cookies(&self) -> bool {
        self.persistent_cookies
    }

    /// Whether cookies are flagged `HttpOnly`.
    pub fn http_only_cookies(&self) -> bool {
        self.http_only_cookies
    }

    /// Whether cookies are flagged `Secure`.
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    /// Set the session cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the payload key holding the authenticated user's identifier.
    pub fn with_auth_key(mut self, key: impl Into<String>) -> Self {
        self.auth_key = key.into();
        self
    }

    /// Set the idle timeout (`None` disables it).
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the absolute timeout (`None` disables it).
    pub fn with_absolute_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.absolute_timeout = timeout;
        self
    }

    /// Set the timeout resolution (`None` never re-writes unchanged sessions).
    pub fn with_timeout_resolution(mut self, resolution: Option<Duration>) -> Self {
        self.timeout_resolution = resolution;
        self
    }

    /// Enable or disable persistent cookies.
    pub fn with_persistent_cookies(mut self, persistent: bool) -> Self {
        self.persistent_cookies = persistent;
        self
    }

    /// Enable or disable the `HttpOnly` cookie flag.
    pub fn with_http_only_cookies(mut self, http_only: bool) -> Self {
        self.http_only_cookies = http_only;
        self
    }

    /// Enable or disable the `Secure` cookie flag.
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> SessionResult<()> {
        if self.cookie_name.is_empty() {
            return Err(SessionError::Config("cookie name must not be empty".to_string()));
        }

        if self.auth_key.is_empty() {
            return Err(SessionError::Config("auth key must not be empty".to_string()));
        }

        if self.auth_key == FORCE_INVALIDATE_KEY {
            return Err(SessionError::Config(format!(
                "auth key must differ from the reserved key {FORCE_INVALIDATE_KEY}"
            )));
        }

        let timeouts = [
            ("idle timeout", self.idle_timeout),
            ("absolute timeout", self.absolute_timeout),
        ];
        for (name, timeout) in timeouts {
            if timeout.is_some_and(|t| t.is_zero()) {
                return Err(SessionError::Config(format!("{name} must be non-zero")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.cookie_name(), "JSESSIONID");
        assert_eq!(config.auth_key(), "_ID");
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(604_800)));
        assert_eq!(config.absolute_timeout(), Some(Duration::from_secs(5_184_000)));
        assert_eq!(config.timeout_resolution(), Some(Duration::from_secs(600)));
        assert!(config.persistent_cookies());
        assert!(config.http_only_cookies());
        assert!(!config.secure_cookies());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_setters_return_new_value() {
        let base = SessionConfig::default();
        let changed = base
            .clone()
            .with_auth_key("user")
            .with_idle_timeout(None)
            .with_persistent_cookies(false);

        assert_eq!(base.auth_key(), "_ID");
        assert_eq!(changed.auth_key(), "user");
        assert_eq!(changed.idle_timeout(), None);
        assert!(!changed.persistent_cookies());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SessionConfig::default().with_cookie_name("").validate().is_err());
        assert!(SessionConfig::default().with_auth_key("").validate().is_err());
        assert!(
            SessionConfig::default()
                .with_auth_key(FORCE_INVALIDATE_KEY)
                .validate()
                .is_err()
        );
        assert!(
            SessionConfig::default()
                .with_absolute_timeout(Some(Duration::ZERO))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"cookie_name":"SID","secure_cookies":true}"#).unwrap();
        assert_eq!(config.cookie_name(), "SID");
        assert!(config.secure_cookies());
        assert_eq!(config.auth_key(), DEFAULT_AUTH_KEY);
    }
}
