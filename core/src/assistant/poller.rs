use super::api::AssistantApi;
use super::types::{Run, RunStatus, FALLBACK_REPLY};
use crate::error::AssistantError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How often and for how long a run is polled.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Growth factor applied to the interval after each status check. `1.0` keeps it fixed.
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_attempts: u32,
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            multiplier: 1.5,
            max_interval: Duration::from_secs(8),
            max_attempts: 120,
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            multiplier: 1.0,
            max_interval: interval,
            max_attempts,
            timeout: None,
        }
    }

    /// Delay before status check number `attempt` (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let cap = self.max_interval.max(self.interval);
        if attempt == 0 || self.multiplier <= 1.0 {
            return self.interval;
        }
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.interval.as_secs_f64() * factor;
        if secs.is_finite() && secs < cap.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            cap
        }
    }
}

/// Starts a run on a thread and waits for it to finish.
#[derive(Clone)]
pub struct RunPoller {
    api: Arc<dyn AssistantApi>,
    assistant_id: String,
    policy: PollPolicy,
}

impl RunPoller {
    pub fn new(api: Arc<dyn AssistantApi>, assistant_id: impl Into<String>, policy: PollPolicy) -> Self {
        Self {
            api,
            assistant_id: assistant_id.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Run the assistant on `thread_id` and return the text of its reply.
    pub async fn run_to_completion(
        &self,
        thread_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AssistantError> {
        let run = self.api.create_run(thread_id, &self.assistant_id).await?;
        info!(thread_id, run_id = %run.id, status = %run.status, "run started");

        let status = self.await_terminal(thread_id, &run, cancel).await?;
        if status != RunStatus::Completed {
            return Err(AssistantError::RunTerminated(status));
        }

        let reply = self
            .api
            .latest_message(thread_id)
            .await?
            .and_then(|message| message.first_text().map(str::to_owned))
            .unwrap_or_else(|| FALLBACK_REPLY.to_string());
        Ok(reply)
    }

    async fn await_terminal(
        &self,
        thread_id: &str,
        run: &Run,
        cancel: &CancellationToken,
    ) -> Result<RunStatus, AssistantError> {
        let started = Instant::now();
        let mut status = run.status;
        let mut attempts = 0u32;

        while status.is_pending() {
            if attempts >= self.policy.max_attempts {
                return Err(AssistantError::PollExhausted { attempts });
            }
            let delay = self.policy.delay_for(attempts);
            if let Some(timeout) = self.policy.timeout {
                if started.elapsed() + delay > timeout {
                    return Err(AssistantError::PollTimedOut(timeout));
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AssistantError::Cancelled),
                _ = sleep(delay) => {}
            }
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AssistantError::Cancelled),
                polled = self.api.get_run(thread_id, &run.id) => polled?,
            };

            attempts += 1;
            status = polled.status;
            debug!(thread_id, run_id = %run.id, attempts, %status, "run status");
        }

        Ok(status)
    }
}
