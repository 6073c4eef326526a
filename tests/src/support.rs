use anyhow::{anyhow, Result};
use fitcoach_core::auth::TokenStore;
use fitcoach_core::PollPolicy;
use std::time::Duration;

pub fn fast_policy() -> PollPolicy {
    PollPolicy::fixed(Duration::from_millis(1), 50)
}

/// Token store whose every operation fails, as a locked keychain would.
pub struct FailingTokenStore;

impl TokenStore for FailingTokenStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(anyhow!("keychain locked"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(anyhow!("keychain locked"))
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Err(anyhow!("keychain locked"))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Err(anyhow!("keychain locked"))
    }
}
