//! Bounded log of relayed conversations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rolling_log::RollingLog;

pub const CONVERSATION_CAPACITY: usize = 100;

pub const DEFAULT_CONVERSATION_LIMIT: usize = 50;

/// Outcome of a relayed chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Success,
    Error,
}

/// One user turn and what the relay answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub ai_response: String,
    pub status: ConversationStatus,
}

#[derive(Debug, Clone)]
pub struct ConversationStore {
    records: RollingLog<ConversationRecord>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_capacity(CONVERSATION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RollingLog::new(capacity),
        }
    }

    /// Store a record stamped with the current time.
    pub fn add(
        &mut self,
        user_input: impl Into<String>,
        ai_response: impl Into<String>,
        status: ConversationStatus,
    ) {
        self.records.push(ConversationRecord {
            timestamp: Utc::now(),
            user_input: user_input.into(),
            ai_response: ai_response.into(),
            status,
        });
    }

    /// Up to `limit` most recent records, newest first.
    pub fn list(&self, limit: usize) -> Vec<ConversationRecord> {
        self.records.list(limit)
    }

    /// Number of stored conversations.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no conversation has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
