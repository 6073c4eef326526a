pub mod assistant;
pub mod auth;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod store;
pub mod telemetry;

pub use assistant::{AssistantApi, CoachChat, PollPolicy, RunPoller, RunStatus, ThreadRegistry};
pub use auth::{AuthBackend, AuthCoordinator, AuthPhase, AuthState, AuthSubscription};
pub use config::{CoachSettings, ConfigError};
pub use error::{AssistantError, AuthError};
pub use services::CoachServices;
pub use state::{ChatMessage, Conversation, ConversationLog, MessageRole};
pub use store::ThreadMapStore;
