use services::conversations::models::ConversationId;
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};
use tracing::debug;

/// Threads that currently have a generation running.
///
/// At most one generation per thread; the slot is held until the producer has
/// finished persisting, which may be after the response body was dropped.
#[derive(Clone, Default)]
pub struct InFlightGenerations {
    active: Arc<Mutex<HashSet<ConversationId>>>,
}

impl InFlightGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the thread, or `None` if a generation is already running for it
    pub fn try_acquire(&self, id: ConversationId) -> Option<InFlightGuard> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(id) {
            debug!("Generation already in flight for {}", id);
            return None;
        }
        Some(InFlightGuard {
            id,
            active: self.active.clone(),
        })
    }

    pub fn is_active(&self, id: ConversationId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Releases the thread when dropped
pub struct InFlightGuard {
    id: ConversationId,
    active: Arc<Mutex<HashSet<ConversationId>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.id);
    }
}
