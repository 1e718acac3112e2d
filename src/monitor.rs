//! Shared monitoring state.
//!
//! Groups the health monitor and conversation store behind one lock so a
//! request's outcome (counter, error record, conversation entry) lands as a
//! single step. Lock order is monitor first, then the system log.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::conversation::{ConversationRecord, ConversationStatus, ConversationStore};
use crate::health::{ErrorInfo, ErrorView, HealthMonitor, HealthSnapshot};
use crate::system_log::SystemLog;

struct MonitorState {
    health: HealthMonitor,
    conversations: ConversationStore,
}

/// Cloneable handle to the relay's in-memory bookkeeping.
#[derive(Clone)]
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
    log: SystemLog,
}

impl Monitor {
    pub fn new(log: SystemLog) -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                health: HealthMonitor::new(log.clone()),
                conversations: ConversationStore::new(),
            })),
            log,
        }
    }

    pub fn log(&self) -> &SystemLog {
        &self.log
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a successful logical request.
    pub fn record_success(&self, user_input: &str, reply: &str) {
        let mut state = self.lock();
        state.health.record_request(true);
        state
            .conversations
            .add(user_input, reply, ConversationStatus::Success);
    }

    /// Record a failed logical request and return the health as it stands
    /// right after the failure.
    pub fn record_failure(
        &self,
        user_input: &str,
        placeholder: &str,
        error: ErrorInfo,
        context: &str,
    ) -> HealthSnapshot {
        let mut state = self.lock();
        state.health.record_request(false);
        state.health.record_error(error, context);
        state
            .conversations
            .add(user_input, placeholder, ConversationStatus::Error);
        state.health.snapshot()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.lock().health.snapshot()
    }

    pub fn errors(&self, limit: usize) -> Vec<ErrorView> {
        self.lock().health.errors(limit)
    }

    pub fn conversations(&self, limit: usize) -> Vec<ConversationRecord> {
        self.lock().conversations.list(limit)
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Monitor")
            .field("health", &state.health.snapshot())
            .field("conversations", &state.conversations.len())
            .finish()
    }
}
