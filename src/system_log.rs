//! Shared system event log.
//!
//! Narrates what the relay is doing for the admin dashboard. Every entry is
//! also mirrored to `tracing` so the process log and the dashboard agree.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rolling_log::RollingLog;

/// Maximum number of entries retained.
pub const SYSTEM_LOG_CAPACITY: usize = 1000;

/// Default number of entries returned by [`SystemLog::list`] callers.
pub const DEFAULT_LOG_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Warning,
    Error,
}

/// A single narrated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
}

// ---------------------------------------------------------------------------
// SystemLog
// ---------------------------------------------------------------------------

/// Cloneable handle to the process-wide event log.
#[derive(Debug, Clone)]
pub struct SystemLog {
    entries: Arc<Mutex<RollingLog<LogEntry>>>,
}

impl SystemLog {
    pub fn new() -> Self {
        Self::with_capacity(SYSTEM_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(RollingLog::new(capacity))),
        }
    }

    /// Append an entry stamped with the current time.
    pub fn log(&self, kind: LogKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            LogKind::Info => tracing::info!(target: "voice_relay::system", "{message}"),
            LogKind::Warning => tracing::warn!(target: "voice_relay::system", "{message}"),
            LogKind::Error => tracing::error!(target: "voice_relay::system", "{message}"),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            message,
            kind,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogKind::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogKind::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogKind::Error, message);
    }

    /// Up to `limit` most recent entries, newest first.
    pub fn list(&self, limit: usize) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .list(limit)
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing has been logged yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SystemLog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
