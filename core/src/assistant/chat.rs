use super::api::AssistantApi;
use super::openai::OpenAiAssistantsClient;
use super::poller::{PollPolicy, RunPoller};
use super::threads::ThreadRegistry;
use crate::config::CoachSettings;
use crate::error::AssistantError;
use crate::state::{ChatMessage, Conversation, ConversationLog, MessageRole};
use crate::store::ThreadMapStore;
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Coach chat: one remote thread per local conversation, one run per user message.
#[derive(Clone)]
pub struct CoachChat {
    api: Arc<dyn AssistantApi>,
    threads: Arc<ThreadRegistry>,
    poller: RunPoller,
    log: ConversationLog,
}

impl CoachChat {
    pub fn new(api: Arc<dyn AssistantApi>, assistant_id: impl Into<String>, policy: PollPolicy) -> Self {
        let threads = ThreadRegistry::new(api.clone());
        Self::with_registry(api, threads, assistant_id, policy)
    }

    pub fn with_registry(
        api: Arc<dyn AssistantApi>,
        threads: ThreadRegistry,
        assistant_id: impl Into<String>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            poller: RunPoller::new(api.clone(), assistant_id, policy),
            api,
            threads: Arc::new(threads),
            log: ConversationLog::new(),
        }
    }

    /// Wire the OpenAI client and, when configured, the persisted thread map.
    pub fn from_settings(settings: &CoachSettings) -> Result<Self> {
        let api: Arc<dyn AssistantApi> =
            Arc::new(OpenAiAssistantsClient::from_settings(&settings.openai)?);
        let threads = match &settings.thread_map_path {
            Some(path) => ThreadRegistry::with_store(api.clone(), ThreadMapStore::new(path))?,
            None => ThreadRegistry::new(api.clone()),
        };
        Ok(Self::with_registry(
            api,
            threads,
            settings.openai.assistant_id.clone(),
            settings.polling.clone(),
        ))
    }

    pub fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    /// Send `user_message` on `conversation_id` and return the coach's reply.
    pub async fn chat(&self, conversation_id: &str, user_message: &str) -> Result<String, AssistantError> {
        self.chat_with_cancel(conversation_id, user_message, &CancellationToken::new())
            .await
    }

    pub async fn chat_with_cancel(
        &self,
        conversation_id: &str,
        user_message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AssistantError> {
        let result = self.exchange(conversation_id, user_message, cancel).await;
        if let Err(err) = &result {
            error!(conversation_id, %err, "coach chat failed");
        }
        result
    }

    async fn exchange(
        &self,
        conversation_id: &str,
        user_message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AssistantError> {
        if user_message.trim().is_empty() {
            return Err(AssistantError::EmptyMessage);
        }
        let thread_id = self.threads.resolve_or_create(conversation_id).await?;
        self.api.add_message(&thread_id, user_message).await?;
        self.log
            .record(conversation_id, ChatMessage::new(MessageRole::User, user_message));

        let reply = self.poller.run_to_completion(&thread_id, cancel).await?;
        self.log.record(
            conversation_id,
            ChatMessage::new(MessageRole::Assistant, reply.clone()),
        );
        info!(conversation_id, thread_id = %thread_id, "coach replied");
        Ok(reply)
    }

    pub fn transcript(&self, conversation_id: &str) -> Option<Conversation> {
        self.log.conversation(conversation_id)
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Drop both the thread mapping and the local transcript.
    pub fn forget(&self, conversation_id: &str) {
        self.threads.forget(conversation_id);
        self.log.forget(conversation_id);
    }
}
