use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Messages exchanged with the coach in one local conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: "New chat".to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Append `message`; the first user message names the conversation.
    pub fn add_message(&mut self, message: ChatMessage) -> bool {
        let mut title_changed = false;
        if self.messages.is_empty() && message.role == MessageRole::User {
            self.title = snippet(&message.content);
            title_changed = true;
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
        title_changed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

/// In-memory transcripts keyed by conversation id.
#[derive(Clone, Default)]
pub struct ConversationLog {
    inner: Arc<RwLock<HashMap<String, Conversation>>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, conversation_id: &str, message: ChatMessage) {
        let mut inner = self.inner.write();
        inner
            .entry(conversation_id.to_owned())
            .or_insert_with(|| Conversation::new(conversation_id))
            .add_message(message);
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.inner.read().get(conversation_id).cloned()
    }

    pub fn forget(&self, conversation_id: &str) -> Option<Conversation> {
        self.inner.write().remove(conversation_id)
    }

    /// Most recently updated first.
    pub fn summaries(&self) -> Vec<ConversationSummary> {
        let inner = self.inner.read();
        let mut summaries: Vec<_> = inner
            .values()
            .map(|c| ConversationSummary {
                id: c.id.clone(),
                title: c.title.clone(),
                updated_at: c.updated_at,
                message_count: c.messages.len(),
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }
}

fn snippet(content: &str) -> String {
    let trimmed = content.trim();
    const MAX: usize = 42;
    let mut chars = trimmed.chars();
    let mut acc = String::new();
    for _ in 0..MAX {
        if let Some(ch) = chars.next() {
            acc.push(ch);
        } else {
            return trimmed.to_string();
        }
    }
    if chars.next().is_none() {
        return acc;
    }
    acc.push('…');
    acc
}
