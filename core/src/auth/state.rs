use super::session::{Session, User};

/// Coarse view of [`AuthState`] used by navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unresolved,
    Unauthenticated,
    Authenticated,
}

/// What the UI renders. `authenticated` always mirrors `session.is_some()`, so the
/// fields are only reachable through the constructors below.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    user: Option<User>,
    session: Option<Session>,
    loading: bool,
    authenticated: bool,
}

impl AuthState {
    /// Startup value, before the first current-session query resolves.
    pub fn unresolved() -> Self {
        Self {
            user: None,
            session: None,
            loading: true,
            authenticated: false,
        }
    }

    pub fn signed_out() -> Self {
        Self::from_session(None)
    }

    pub fn from_session(session: Option<Session>) -> Self {
        Self {
            user: session.as_ref().map(|s| s.user.clone()),
            authenticated: session.is_some(),
            session,
            loading: false,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn phase(&self) -> AuthPhase {
        if self.loading {
            AuthPhase::Unresolved
        } else if self.authenticated {
            AuthPhase::Authenticated
        } else {
            AuthPhase::Unauthenticated
        }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::unresolved()
    }
}

/// A published [`AuthState`] tagged with the sequence number it was dispatched under.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub seq: u64,
    pub state: AuthState,
}
