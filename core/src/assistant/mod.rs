//! Coach chat over the Assistants API: thread mapping and run polling.

pub mod api;
pub mod chat;
pub mod mock;
pub mod openai;
pub mod poller;
pub mod threads;
pub mod types;

pub use api::AssistantApi;
pub use chat::CoachChat;
pub use mock::ScriptedAssistant;
pub use openai::OpenAiAssistantsClient;
pub use poller::{PollPolicy, RunPoller};
pub use threads::ThreadRegistry;
pub use types::{ContentBlock, Run, RunStatus, TextContent, Thread, ThreadMessage, FALLBACK_REPLY};
