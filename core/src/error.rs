use crate::assistant::RunStatus;
use std::time::Duration;

const GENERIC_AUTH_MESSAGE: &str = "Something went wrong. Please try again.";

/// Failures raised by the auth backend. Remote messages are carried verbatim.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("auth service rejected the request ({status}): {message}")]
    Remote { status: u16, message: String },
    #[error("auth service unreachable: {0}")]
    Transport(String),
    #[error("token storage failed: {0}")]
    Storage(String),
    #[error("unexpected auth response: {0}")]
    Decode(String),
    #[error("auth backend not configured: {0}")]
    NotConfigured(String),
}

impl AuthError {
    /// Text suitable for an alert: the remote message when there is one.
    pub fn user_message(&self) -> String {
        match self {
            Self::Remote { message, .. } if !message.trim().is_empty() => message.clone(),
            _ => GENERIC_AUTH_MESSAGE.to_string(),
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Failures raised while talking to the assistant API or driving a run.
#[derive(thiserror::Error, Debug)]
pub enum AssistantError {
    #[error("assistant API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("assistant API unreachable: {0}")]
    Transport(String),
    #[error("unexpected assistant response: {0}")]
    Decode(String),
    #[error("run finished with status {0}")]
    RunTerminated(RunStatus),
    #[error("run still pending after {attempts} status checks")]
    PollExhausted { attempts: u32 },
    #[error("run did not finish within {0:?}")]
    PollTimedOut(Duration),
    #[error("run polling cancelled")]
    Cancelled,
    #[error("message is empty")]
    EmptyMessage,
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
