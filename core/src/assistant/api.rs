use super::types::{Run, Thread, ThreadMessage};
use crate::error::AssistantError;
use async_trait::async_trait;

/// The assistant service's thread/run endpoints.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_thread(&self) -> Result<Thread, AssistantError>;

    async fn add_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str)
        -> Result<Run, AssistantError>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError>;

    /// Most recent message in the thread.
    async fn latest_message(&self, thread_id: &str)
        -> Result<Option<ThreadMessage>, AssistantError>;
}
