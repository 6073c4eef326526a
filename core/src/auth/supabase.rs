use super::backend::{broadcast_stream, AuthBackend, AuthChangeStream, ChangeSequence, RealtimeChannel};
use super::session::{AuthChange, AuthEvent, AuthResponse, Session, SignOutScope, User};
use super::token_store::TokenStore;
use crate::config::SupabaseSettings;
use crate::error::AuthError;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

const CHANGE_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Default, Deserialize)]
struct GoTrueErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl GoTrueErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

/// GoTrue REST client. Keeps the current session in memory and in a [`TokenStore`],
/// and broadcasts every change to subscribers.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    storage_key: String,
    store: Arc<dyn TokenStore>,
    current: Arc<RwLock<Option<Session>>>,
    changes: broadcast::Sender<AuthChange>,
    sequence: ChangeSequence,
    channels: Arc<RwLock<Vec<RealtimeChannel>>>,
}

impl SupabaseAuthClient {
    pub fn new(settings: &SupabaseSettings, store: Arc<dyn TokenStore>) -> Result<Self, AuthError> {
        let mut raw = settings.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw)
            .map_err(|err| AuthError::NotConfigured(format!("invalid Supabase url: {err}")))?;
        let project_ref = base_url
            .host_str()
            .and_then(|host| host.split('.').next())
            .filter(|label| !label.is_empty())
            .ok_or_else(|| AuthError::NotConfigured("Supabase url has no host".into()))?
            .to_string();
        let http = reqwest::Client::builder().build()?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            http,
            base_url,
            anon_key: settings.anon_key.clone(),
            storage_key: format!("sb-{project_ref}-auth-token"),
            store,
            current: Arc::new(RwLock::new(None)),
            changes,
            sequence: ChangeSequence::new(),
            channels: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Key the session is persisted under.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Open and track a realtime channel for `topic`.
    pub fn channel(&self, topic: impl Into<String>) -> RealtimeChannel {
        let channel = RealtimeChannel::new(topic);
        self.channels.write().push(channel.clone());
        channel
    }

    /// Exchange the refresh token for a new session.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");
        let req = self
            .http
            .post(url)
            .headers(self.headers(None))
            .json(&json!({ "refresh_token": refresh_token }));
        let session: Session = self.execute(req).await?;
        let session = session.stamp_expiry();
        self.adopt(Some(session.clone()), AuthEvent::TokenRefreshed)?;
        Ok(session)
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base_url
            .join(path)
            .map_err(|err| AuthError::NotConfigured(err.to_string()))
    }

    fn headers(&self, access_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", value);
        }
        let bearer = access_token.unwrap_or(&self.anon_key);
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {bearer}")) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, AuthError> {
        let res = req.send().await?;
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = serde_json::from_str::<GoTrueErrorBody>(&body)
                .ok()
                .and_then(GoTrueErrorBody::into_message)
                .unwrap_or_else(|| status.to_string());
            return Err(AuthError::Remote {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, AuthError> {
        let body = self.send(req).await?;
        serde_json::from_str(&body).map_err(|err| AuthError::Decode(err.to_string()))
    }

    fn load_persisted(&self) -> Result<Option<Session>, AuthError> {
        let raw = self
            .store
            .get(&self.storage_key)
            .map_err(|err| AuthError::Storage(err.to_string()))?;
        match raw {
            Some(raw) => match serde_json::from_str::<Session>(&raw) {
                Ok(session) => Ok(Some(session)),
                Err(err) => {
                    warn!(%err, "discarding unreadable persisted session");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn persist(&self, session: &Session) -> Result<(), AuthError> {
        let raw =
            serde_json::to_string(session).map_err(|err| AuthError::Decode(err.to_string()))?;
        self.store
            .set(&self.storage_key, &raw)
            .map_err(|err| AuthError::Storage(err.to_string()))
    }

    /// Store `session`, make it current, and notify subscribers.
    ///
    /// A session that cannot be stored is never adopted, so a failed sign-in leaves no
    /// trace. Clearing always takes effect in memory; a failed removal is still returned.
    fn adopt(&self, session: Option<Session>, event: AuthEvent) -> Result<(), AuthError> {
        let cleared = match &session {
            Some(session) => {
                self.persist(session)?;
                Ok(())
            }
            None => self
                .store
                .remove(&self.storage_key)
                .map_err(|err| AuthError::Storage(err.to_string())),
        };
        *self.current.write() = session.clone();
        let seq = self.sequence.next();
        debug!(?event, seq, "auth session changed");
        let _ = self.changes.send(AuthChange::new(seq, event, session));
        cleared
    }
}

#[async_trait]
impl AuthBackend for SupabaseAuthClient {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let cached = self.current.read().clone();
        let session = match cached {
            Some(session) => Some(session),
            None => self.load_persisted()?,
        };
        let Some(session) = session else {
            return Ok(None);
        };
        if !session.needs_refresh() {
            *self.current.write() = Some(session.clone());
            return Ok(Some(session));
        }
        match session.refresh_token.as_deref() {
            Some(refresh_token) => match self.refresh_session(refresh_token).await {
                Ok(session) => Ok(Some(session)),
                Err(err) => {
                    self.adopt(None, AuthEvent::SignedOut)?;
                    Err(err)
                }
            },
            None if session.is_expired() => {
                self.adopt(None, AuthEvent::SignedOut)?;
                Ok(None)
            }
            None => Ok(Some(session)),
        }
    }

    fn subscribe(&self) -> AuthChangeStream {
        broadcast_stream(self.changes.subscribe())
    }

    fn sequence(&self) -> ChangeSequence {
        self.sequence.clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let req = self
            .http
            .post(url)
            .headers(self.headers(None))
            .json(&json!({ "email": email, "password": password }));
        let session: Session = self.execute(req).await?;
        let session = session.stamp_expiry();
        self.adopt(Some(session.clone()), AuthEvent::SignedIn)?;
        info!(user_id = %session.user.id, "signed in");
        Ok(AuthResponse::from_session(session))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<Value>,
    ) -> Result<AuthResponse, AuthError> {
        let url = self.endpoint("auth/v1/signup")?;
        let req = self.http.post(url).headers(self.headers(None)).json(&json!({
            "email": email,
            "password": password,
            "data": metadata.unwrap_or_else(|| json!({})),
        }));
        let body: Value = self.execute(req).await?;
        if body.get("access_token").is_some() {
            let session: Session =
                serde_json::from_value(body).map_err(|err| AuthError::Decode(err.to_string()))?;
            let session = session.stamp_expiry();
            self.adopt(Some(session.clone()), AuthEvent::SignedIn)?;
            return Ok(AuthResponse::from_session(session));
        }
        // Email confirmation pending: the service returns the bare user.
        let user: User =
            serde_json::from_value(body).map_err(|err| AuthError::Decode(err.to_string()))?;
        info!(user_id = %user.id, "sign-up awaiting confirmation");
        Ok(AuthResponse {
            user: Some(user),
            session: None,
        })
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError> {
        let session = self.current.read().clone();
        let remote = match &session {
            Some(session) => {
                let mut url = self.endpoint("auth/v1/logout")?;
                url.query_pairs_mut().append_pair("scope", scope.as_str());
                let req = self
                    .http
                    .post(url)
                    .headers(self.headers(Some(&session.access_token)));
                self.send(req).await.map(|_| ())
            }
            None => Ok(()),
        };
        if scope != SignOutScope::Others {
            self.adopt(None, AuthEvent::SignedOut)?;
        }
        remote
    }

    async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let url = self.endpoint("auth/v1/recover")?;
        let req = self
            .http
            .post(url)
            .headers(self.headers(None))
            .json(&json!({ "email": email }));
        self.send(req).await?;
        Ok(())
    }

    fn channels(&self) -> Vec<RealtimeChannel> {
        self.channels.read().clone()
    }

    async fn remove_channel(&self, channel: &RealtimeChannel) -> Result<(), AuthError> {
        let mut channels = self.channels.write();
        let before = channels.len();
        channels.retain(|existing| existing.id != channel.id);
        if channels.len() != before {
            debug!(topic = %channel.topic, "removed realtime channel");
        }
        Ok(())
    }
}
