use super::api::AssistantApi;
use crate::error::AssistantError;
use crate::store::ThreadMapStore;
use anyhow::Result;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Maps local conversation ids to remote assistant threads. First use of a conversation
/// is serialized per id, so one conversation never ends up with two threads.
pub struct ThreadRegistry {
    api: Arc<dyn AssistantApi>,
    threads: Mutex<BTreeMap<String, String>>,
    creating: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    store: Option<ThreadMapStore>,
    // Held across snapshot and write so the file never goes back to an older map.
    persisting: Mutex<()>,
}

impl ThreadRegistry {
    pub fn new(api: Arc<dyn AssistantApi>) -> Self {
        Self {
            api,
            threads: Mutex::new(BTreeMap::new()),
            creating: Mutex::new(HashMap::new()),
            store: None,
            persisting: Mutex::new(()),
        }
    }

    /// Registry backed by `store`; mappings saved there are reused.
    pub fn with_store(api: Arc<dyn AssistantApi>, store: ThreadMapStore) -> Result<Self> {
        let threads = store.load()?;
        Ok(Self {
            api,
            threads: Mutex::new(threads),
            creating: Mutex::new(HashMap::new()),
            store: Some(store),
            persisting: Mutex::new(()),
        })
    }

    pub fn lookup(&self, conversation_id: &str) -> Option<String> {
        self.threads.lock().get(conversation_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn resolve_or_create(&self, conversation_id: &str) -> Result<String, AssistantError> {
        if let Some(thread_id) = self.lookup(conversation_id) {
            return Ok(thread_id);
        }

        let gate = self
            .creating
            .lock()
            .entry(conversation_id.to_owned())
            .or_default()
            .clone();
        let result = {
            let _guard = gate.lock().await;
            self.create_locked(conversation_id).await
        };
        self.release_gate(conversation_id, &gate);
        result
    }

    /// Drop the gate once nobody else is queued on it. Clones are only handed out under
    /// the `creating` lock, so the count cannot grow while we look at it.
    fn release_gate(&self, conversation_id: &str, gate: &Arc<tokio::sync::Mutex<()>>) {
        let mut creating = self.creating.lock();
        let ours = creating
            .get(conversation_id)
            .is_some_and(|current| Arc::ptr_eq(current, gate));
        if ours && Arc::strong_count(gate) <= 2 {
            creating.remove(conversation_id);
        }
    }

    async fn create_locked(&self, conversation_id: &str) -> Result<String, AssistantError> {
        // Whoever held the gate before us may have created it.
        if let Some(thread_id) = self.lookup(conversation_id) {
            return Ok(thread_id);
        }

        let thread = self.api.create_thread().await?;
        info!(conversation_id, thread_id = %thread.id, "created assistant thread");
        self.threads
            .lock()
            .insert(conversation_id.to_owned(), thread.id.clone());
        self.save();
        Ok(thread.id)
    }

    #[cfg(test)]
    fn pending_gates(&self) -> usize {
        self.creating.lock().len()
    }

    /// Drop the mapping; the next message starts a new thread.
    pub fn forget(&self, conversation_id: &str) -> Option<String> {
        let removed = self.threads.lock().remove(conversation_id);
        if removed.is_some() {
            self.save();
        }
        removed
    }

    fn save(&self) {
        if let Some(store) = &self.store {
            let _persisting = self.persisting.lock();
            let threads = self.threads.lock().clone();
            if let Err(err) = store.persist(&threads) {
                warn!(%err, path = %store.path().display(), "failed to persist thread map");
            }
        }
    }
}
