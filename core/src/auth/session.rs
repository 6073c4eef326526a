use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity attached to a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

/// Credential bundle issued by the auth service. The client never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "Session::default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Unix timestamp, seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl Session {
    fn default_token_type() -> String {
        "bearer".to_string()
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at_utc()
            .map(|exp| Utc::now() >= exp)
            .unwrap_or(false)
    }

    pub fn needs_refresh(&self) -> bool {
        match self.expires_at_utc() {
            Some(exp) => Utc::now() + Duration::minutes(1) >= exp,
            None => false,
        }
    }

    /// Fill `expires_at` from `expires_in` when the service only sent the latter.
    pub(crate) fn stamp_expiry(mut self) -> Self {
        if self.expires_at.is_none() {
            if let Some(expires_in) = self.expires_in {
                self.expires_at = Some(Utc::now().timestamp() + expires_in);
            }
        }
        self
    }
}

/// Result of a sign-in or sign-up. Sign-up without auto-confirm yields a user but no session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthResponse {
    pub user: Option<User>,
    pub session: Option<Session>,
}

impl AuthResponse {
    pub fn from_session(session: Session) -> Self {
        Self {
            user: Some(session.user.clone()),
            session: Some(session),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// One session-change notification pushed by the auth service.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthChange {
    /// Position in the backend's [`ChangeSequence`](super::backend::ChangeSequence).
    pub seq: u64,
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn new(seq: u64, event: AuthEvent, session: Option<Session>) -> Self {
        Self {
            seq,
            event,
            session,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    Global,
    Local,
    Others,
}

impl SignOutScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Local => "local",
            Self::Others => "others",
        }
    }
}
