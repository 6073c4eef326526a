use super::api::AssistantApi;
use super::types::{Run, RunStatus, Thread, ThreadMessage};
use crate::error::AssistantError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Default)]
struct Script {
    statuses: Vec<RunStatus>,
    pending: VecDeque<RunStatus>,
    last: Option<RunStatus>,
    reply: Option<ThreadMessage>,
    add_message_failure: Option<(u16, String)>,
    create_thread_failure: Option<(u16, String)>,
    thread_delay: Duration,
}

#[derive(Default)]
struct Calls {
    threads_created: usize,
    messages: Vec<(String, String)>,
    runs_created: usize,
    status_checks: usize,
}

/// Assistant API that replays a scripted status sequence for every run.
///
/// The first status is what run creation reports; each status check returns the next one,
/// repeating the last once the script runs out.
#[derive(Clone, Default)]
pub struct ScriptedAssistant {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Calls>>,
}

impl ScriptedAssistant {
    pub fn new(statuses: Vec<RunStatus>, reply: Option<ThreadMessage>) -> Self {
        let assistant = Self::default();
        {
            let mut script = assistant.script.lock();
            script.statuses = statuses;
            script.reply = reply;
        }
        assistant
    }

    /// Runs complete immediately with `reply` as the assistant's text.
    pub fn replying(reply: &str) -> Self {
        Self::new(
            vec![RunStatus::Queued, RunStatus::InProgress, RunStatus::Completed],
            Some(ThreadMessage::assistant(reply)),
        )
    }

    pub fn with_thread_delay(self, delay: Duration) -> Self {
        self.script.lock().thread_delay = delay;
        self
    }

    /// Fail thread creation until [`Self::heal`] is called.
    pub fn fail_create_thread(&self, status: u16, message: &str) {
        self.script.lock().create_thread_failure = Some((status, message.to_owned()));
    }

    pub fn heal(&self) {
        let mut script = self.script.lock();
        script.create_thread_failure = None;
        script.add_message_failure = None;
    }

    pub fn fail_add_message(&self, status: u16, message: &str) {
        self.script.lock().add_message_failure = Some((status, message.to_owned()));
    }

    pub fn threads_created(&self) -> usize {
        self.calls.lock().threads_created
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.calls.lock().messages.clone()
    }

    pub fn runs_created(&self) -> usize {
        self.calls.lock().runs_created
    }

    pub fn status_checks(&self) -> usize {
        self.calls.lock().status_checks
    }

    fn next_status(script: &mut Script) -> RunStatus {
        let status = script
            .pending
            .pop_front()
            .or(script.last)
            .unwrap_or(RunStatus::Completed);
        script.last = Some(status);
        status
    }
}

#[async_trait]
impl AssistantApi for ScriptedAssistant {
    async fn create_thread(&self) -> Result<Thread, AssistantError> {
        let (delay, failure) = {
            let script = self.script.lock();
            (script.thread_delay, script.create_thread_failure.clone())
        };
        if !delay.is_zero() {
            sleep(delay).await;
        }
        if let Some((status, message)) = failure {
            return Err(AssistantError::Api { status, message });
        }
        let mut calls = self.calls.lock();
        calls.threads_created += 1;
        Ok(Thread {
            id: format!("thread_{}", calls.threads_created),
        })
    }

    async fn add_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError> {
        if let Some((status, message)) = self.script.lock().add_message_failure.clone() {
            return Err(AssistantError::Api { status, message });
        }
        self.calls
            .lock()
            .messages
            .push((thread_id.to_owned(), content.to_owned()));
        Ok(())
    }

    async fn create_run(
        &self,
        _thread_id: &str,
        _assistant_id: &str,
    ) -> Result<Run, AssistantError> {
        let status = {
            let mut script = self.script.lock();
            script.pending = script.statuses.iter().copied().collect();
            script.last = None;
            Self::next_status(&mut script)
        };
        let mut calls = self.calls.lock();
        calls.runs_created += 1;
        Ok(Run {
            id: format!("run_{}", calls.runs_created),
            status,
        })
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let status = Self::next_status(&mut self.script.lock());
        self.calls.lock().status_checks += 1;
        Ok(Run {
            id: run_id.to_owned(),
            status,
        })
    }

    async fn latest_message(
        &self,
        _thread_id: &str,
    ) -> Result<Option<ThreadMessage>, AssistantError> {
        Ok(self.script.lock().reply.clone())
    }
}
