use crate::assistant::CoachChat;
use crate::auth::{
    AuthCoordinator, AuthSubscription, MemoryTokenStore, SupabaseAuthClient, TokenStore,
    TokenStoreKind,
};
use crate::config::CoachSettings;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// The services a UI shell needs, built once and handed to screens by reference.
#[derive(Clone)]
pub struct CoachServices {
    pub auth: AuthCoordinator,
    pub chat: CoachChat,
}

impl CoachServices {
    pub fn new(auth: AuthCoordinator, chat: CoachChat) -> Self {
        Self { auth, chat }
    }

    /// Build the Supabase and OpenAI clients from `settings`, subscribe to session
    /// changes and resolve the current session. Keep the subscription for as long as the
    /// services are in use.
    pub async fn connect(settings: &CoachSettings) -> Result<(Self, AuthSubscription)> {
        let kind = TokenStoreKind::for_platform();
        let session_store = kind.open()?;
        let mut token_stores: Vec<Arc<dyn TokenStore>> = vec![session_store.clone()];
        if kind != TokenStoreKind::Memory {
            token_stores.push(Arc::new(MemoryTokenStore::default()));
        }

        let backend = Arc::new(SupabaseAuthClient::new(&settings.supabase, session_store)?);
        let (auth, subscription) = AuthCoordinator::start(backend, token_stores).await;
        let chat = CoachChat::from_settings(settings)?;
        info!(
            authenticated = auth.state().is_authenticated(),
            "coach services ready"
        );
        Ok((Self::new(auth, chat), subscription))
    }
}
