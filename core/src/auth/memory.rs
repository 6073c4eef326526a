use super::backend::{broadcast_stream, AuthBackend, AuthChangeStream, ChangeSequence, RealtimeChannel};
use super::session::{AuthChange, AuthEvent, AuthResponse, Session, SignOutScope, User};
use crate::error::AuthError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

#[derive(Default)]
struct Failures {
    get_session: Option<String>,
    sign_out: Option<String>,
    remove_channel: Option<String>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, (String, User)>,
    session: Option<Session>,
    channels: Vec<RealtimeChannel>,
    failures: Failures,
    get_session_gate: Option<Arc<Notify>>,
    get_session_calls: usize,
    sign_out_calls: usize,
    reset_requests: Vec<String>,
}

/// Auth service that lives in the process. Used by the smoke task and tests, and as a
/// stand-in backend when the app runs without Supabase credentials.
#[derive(Clone)]
pub struct InMemoryAuthBackend {
    inner: Arc<Mutex<Inner>>,
    changes: broadcast::Sender<AuthChange>,
    sequence: ChangeSequence,
}

impl Default for InMemoryAuthBackend {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            changes,
            sequence: ChangeSequence::new(),
        }
    }
}

impl InMemoryAuthBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.inner.lock().accounts.insert(
            email.to_owned(),
            (password.to_owned(), new_user(email, Value::Null)),
        );
        self
    }

    /// Pretend a session survived from a previous launch.
    pub fn with_session(self, session: Session) -> Self {
        self.inner.lock().session = Some(session);
        self
    }

    pub fn session_for(email: &str) -> Session {
        Session {
            access_token: format!("access-{}", Uuid::new_v4()),
            refresh_token: Some(format!("refresh-{}", Uuid::new_v4())),
            token_type: "bearer".to_string(),
            expires_in: Some(3600),
            expires_at: Some(Utc::now().timestamp() + 3600),
            user: new_user(email, Value::Null),
        }
    }

    /// Push a notification as if the service had emitted it.
    pub fn emit(&self, event: AuthEvent, session: Option<Session>) {
        self.inner.lock().session = session.clone();
        self.dispatch(event, session);
    }

    /// Hold `get_session` answers until the returned gate is notified. The answer still
    /// reflects the session at the time of the request.
    pub fn hold_get_session(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner.lock().get_session_gate = Some(gate.clone());
        gate
    }

    pub fn open_channel(&self, topic: &str) -> RealtimeChannel {
        let channel = RealtimeChannel::new(topic);
        self.inner.lock().channels.push(channel.clone());
        channel
    }

    pub fn fail_get_session(&self, message: &str) {
        self.inner.lock().failures.get_session = Some(message.to_owned());
    }

    pub fn fail_sign_out(&self, message: &str) {
        self.inner.lock().failures.sign_out = Some(message.to_owned());
    }

    pub fn fail_remove_channel(&self, message: &str) {
        self.inner.lock().failures.remove_channel = Some(message.to_owned());
    }

    pub fn get_session_calls(&self) -> usize {
        self.inner.lock().get_session_calls
    }

    pub fn sign_out_calls(&self) -> usize {
        self.inner.lock().sign_out_calls
    }

    pub fn reset_requests(&self) -> Vec<String> {
        self.inner.lock().reset_requests.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn dispatch(&self, event: AuthEvent, session: Option<Session>) {
        let seq = self.sequence.next();
        let _ = self.changes.send(AuthChange::new(seq, event, session));
    }
}

fn new_user(email: &str, metadata: Value) -> User {
    User {
        id: Uuid::new_v4().to_string(),
        email: Some(email.to_owned()),
        user_metadata: metadata,
    }
}

fn remote(status: u16, message: &str) -> AuthError {
    AuthError::Remote {
        status,
        message: message.to_owned(),
    }
}

#[async_trait]
impl AuthBackend for InMemoryAuthBackend {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let (result, gate) = {
            let mut inner = self.inner.lock();
            inner.get_session_calls += 1;
            let result = match &inner.failures.get_session {
                Some(message) => Err(AuthError::Transport(message.clone())),
                None => Ok(inner.session.clone()),
            };
            (result, inner.get_session_gate.clone())
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    fn subscribe(&self) -> AuthChangeStream {
        broadcast_stream(self.changes.subscribe())
    }

    fn sequence(&self) -> ChangeSequence {
        self.sequence.clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let session = {
            let mut inner = self.inner.lock();
            let user = match inner.accounts.get(email) {
                Some((expected, user)) if expected == password => user.clone(),
                _ => return Err(remote(400, "Invalid login credentials")),
            };
            let session = Session {
                user,
                ..Self::session_for(email)
            };
            inner.session = Some(session.clone());
            session
        };
        self.dispatch(AuthEvent::SignedIn, Some(session.clone()));
        Ok(AuthResponse::from_session(session))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<Value>,
    ) -> Result<AuthResponse, AuthError> {
        let session = {
            let mut inner = self.inner.lock();
            if inner.accounts.contains_key(email) {
                return Err(remote(422, "User already registered"));
            }
            let user = new_user(email, metadata.unwrap_or(Value::Null));
            inner
                .accounts
                .insert(email.to_owned(), (password.to_owned(), user.clone()));
            let session = Session {
                user,
                ..Self::session_for(email)
            };
            inner.session = Some(session.clone());
            session
        };
        self.dispatch(AuthEvent::SignedIn, Some(session.clone()));
        Ok(AuthResponse::from_session(session))
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError> {
        {
            let mut inner = self.inner.lock();
            inner.sign_out_calls += 1;
            if let Some(message) = &inner.failures.sign_out {
                return Err(AuthError::Transport(message.clone()));
            }
            if scope != SignOutScope::Others {
                inner.session = None;
            }
        }
        self.dispatch(AuthEvent::SignedOut, None);
        Ok(())
    }

    async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let mut inner = self.inner.lock();
        if !email.contains('@') {
            return Err(remote(400, "Unable to validate email address: invalid format"));
        }
        inner.reset_requests.push(email.to_owned());
        Ok(())
    }

    fn channels(&self) -> Vec<RealtimeChannel> {
        self.inner.lock().channels.clone()
    }

    async fn remove_channel(&self, channel: &RealtimeChannel) -> Result<(), AuthError> {
        let mut inner = self.inner.lock();
        if let Some(message) = &inner.failures.remove_channel {
            return Err(AuthError::Transport(message.clone()));
        }
        inner.channels.retain(|existing| existing.id != channel.id);
        Ok(())
    }
}
