use super::session::{AuthChange, AuthResponse, Session, SignOutScope};
use crate::error::AuthError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;
use uuid::Uuid;

/// Session-change notifications. Dropping the stream releases the subscription.
pub type AuthChangeStream = BoxStream<'static, AuthChange>;

/// A live channel held by the backend client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeChannel {
    pub id: Uuid,
    pub topic: String,
}

impl RealtimeChannel {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
        }
    }
}

/// Dispatch order of session changes, shared by a backend and whoever reads its state.
///
/// A change draws its number when it is sent, not when a subscriber gets to it, so a
/// notification delivered late still compares as older than work started after it.
#[derive(Debug, Clone, Default)]
pub struct ChangeSequence(Arc<AtomicU64>);

impl ChangeSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// The external auth service as the coordinator consumes it.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    fn subscribe(&self) -> AuthChangeStream;

    /// Counter every [`AuthChange`] from this backend is stamped from.
    fn sequence(&self) -> ChangeSequence;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<Value>,
    ) -> Result<AuthResponse, AuthError>;

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError>;

    async fn reset_password(&self, email: &str) -> Result<(), AuthError>;

    fn channels(&self) -> Vec<RealtimeChannel>;

    async fn remove_channel(&self, channel: &RealtimeChannel) -> Result<(), AuthError>;
}

/// Adapts a broadcast receiver into an [`AuthChangeStream`]. A lagging subscriber skips
/// the missed notifications; only the newest state matters to it.
pub(crate) fn broadcast_stream(rx: broadcast::Receiver<AuthChange>) -> AuthChangeStream {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(change) => return Some((change, rx)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth change subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
