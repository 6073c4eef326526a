use super::backend::{AuthBackend, ChangeSequence};
use super::session::{AuthResponse, SignOutScope};
use super::state::{AuthSnapshot, AuthState};
use super::token_store::{is_auth_token_key, TokenStore};
use crate::error::AuthError;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One step of the sign-out teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStep {
    ClearTokens { store: &'static str },
    CloseChannels,
    RemoteSignOut,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClearTokens { store } => write!(f, "clear {store} tokens"),
            Self::CloseChannels => f.write_str("close realtime channels"),
            Self::RemoteSignOut => f.write_str("remote sign-out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub step: CleanupStep,
    pub error: Option<String>,
}

/// Everything that happened during [`AuthCoordinator::sign_out`]. Failures are kept for
/// diagnostics; they never change the final state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOutReport {
    outcomes: Vec<CleanupOutcome>,
}

impl SignOutReport {
    fn record(&mut self, step: CleanupStep, result: Result<(), String>) {
        if let Err(error) = &result {
            warn!(%step, %error, "sign-out step failed");
        }
        self.outcomes.push(CleanupOutcome {
            step,
            error: result.err(),
        });
    }

    pub fn outcomes(&self) -> &[CleanupOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &CleanupOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.error.is_some())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

struct Published {
    sequence: ChangeSequence,
    applied: Mutex<u64>,
    tx: watch::Sender<AuthSnapshot>,
}

impl Published {
    /// Position for work starting now, drawn from the same counter the backend stamps its
    /// notifications with.
    fn ticket(&self) -> u64 {
        self.sequence.next()
    }

    /// Publish `state` unless something dispatched later has already been applied.
    fn apply(&self, seq: u64, state: AuthState) -> bool {
        let mut applied = self.applied.lock();
        if seq <= *applied {
            debug!(seq, applied = *applied, "dropping stale auth state");
            return false;
        }
        *applied = seq;
        self.tx.send_replace(AuthSnapshot { seq, state });
        true
    }
}

/// Keeps the session-change subscription alive. Dropping it unsubscribes.
pub struct AuthSubscription {
    task: Option<JoinHandle<()>>,
}

impl AuthSubscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Presents one consistent [`AuthState`] derived from an [`AuthBackend`] that reports
/// sessions both on request and through change notifications.
#[derive(Clone)]
pub struct AuthCoordinator {
    backend: Arc<dyn AuthBackend>,
    token_stores: Vec<Arc<dyn TokenStore>>,
    published: Arc<Published>,
}

impl AuthCoordinator {
    /// `token_stores` are the caches wiped on sign-out.
    pub fn new(backend: Arc<dyn AuthBackend>, token_stores: Vec<Arc<dyn TokenStore>>) -> Self {
        let (tx, _) = watch::channel(AuthSnapshot {
            seq: 0,
            state: AuthState::unresolved(),
        });
        Self {
            published: Arc::new(Published {
                sequence: backend.sequence(),
                applied: Mutex::new(0),
                tx,
            }),
            backend,
            token_stores,
        }
    }

    /// Subscribe, then resolve the current session. Must run inside a tokio runtime.
    pub async fn start(
        backend: Arc<dyn AuthBackend>,
        token_stores: Vec<Arc<dyn TokenStore>>,
    ) -> (Self, AuthSubscription) {
        let coordinator = Self::new(backend, token_stores);
        let subscription = coordinator.subscribe();
        coordinator.initialize().await;
        (coordinator, subscription)
    }

    pub fn state(&self) -> AuthState {
        self.published.tx.borrow().state.clone()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.published.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.published.tx.subscribe()
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> AuthState
    where
        F: FnMut(&AuthState) -> bool,
    {
        let mut rx = self.watch();
        let result = rx
            .wait_for(|snapshot| predicate(&snapshot.state))
            .await
            .map(|snapshot| snapshot.state.clone());
        // The sender lives in `self`, so the channel cannot close while we wait.
        result.unwrap_or_else(|_| self.state())
    }

    /// Resolve the current session once. Failures leave the state logged out.
    pub async fn initialize(&self) {
        let seq = self.published.ticket();
        let state = match self.backend.get_session().await {
            Ok(session) => AuthState::from_session(session),
            Err(err) => {
                warn!(%err, "failed to resolve current session");
                AuthState::signed_out()
            }
        };
        if self.published.apply(seq, state) {
            info!(
                authenticated = self.state().is_authenticated(),
                "auth state resolved"
            );
        }
    }

    /// Forward session-change notifications into the published state until the returned
    /// guard is dropped.
    pub fn subscribe(&self) -> AuthSubscription {
        let mut changes = self.backend.subscribe();
        let published = self.published.clone();
        let task = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                debug!(event = ?change.event, seq = change.seq, "auth change received");
                published.apply(change.seq, AuthState::from_session(change.session));
            }
        });
        AuthSubscription { task: Some(task) }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        self.backend.sign_in(email, password).await
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<Value>,
    ) -> Result<AuthResponse, AuthError> {
        self.backend.sign_up(email, password, metadata).await
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        self.backend.reset_password(email).await
    }

    /// Tear the session down and always end logged out locally.
    pub async fn sign_out(&self) -> SignOutReport {
        let mut report = SignOutReport::default();

        for store in &self.token_stores {
            let step = CleanupStep::ClearTokens {
                store: store.name(),
            };
            report.record(step, clear_auth_tokens(store.as_ref()));
        }

        report.record(CleanupStep::CloseChannels, self.close_channels().await);

        let remote = self
            .backend
            .sign_out(SignOutScope::Local)
            .await
            .map_err(|err| err.to_string());
        report.record(CleanupStep::RemoteSignOut, remote);

        // Anything the backend dispatched before this point is older and loses, even if
        // the forwarding task has not delivered it yet.
        let seq = self.published.ticket();
        self.published.apply(seq, AuthState::signed_out());
        info!(clean = report.is_clean(), "signed out");
        report
    }

    async fn close_channels(&self) -> Result<(), String> {
        let mut errors = Vec::new();
        for channel in self.backend.channels() {
            if let Err(err) = self.backend.remove_channel(&channel).await {
                errors.push(format!("{}: {err}", channel.topic));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

fn clear_auth_tokens(store: &dyn TokenStore) -> Result<(), String> {
    let keys = store.keys().map_err(|err| err.to_string())?;
    let mut errors = Vec::new();
    for key in keys.iter().filter(|key| is_auth_token_key(key)) {
        if let Err(err) = store.remove(key) {
            errors.push(format!("{key}: {err}"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
