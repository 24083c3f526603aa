//! Rolling per-session conversation context.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Default number of turns kept per session.
pub const DEFAULT_CONTEXT_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextEntry {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ContextEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tokens: None,
            cost: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, tokens: Option<u64>, cost: Option<f64>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tokens,
            cost,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub sessions: usize,
    pub entries: usize,
    pub window_size: usize,
}

/// Sliding window of the most recent turns, keyed by session.
///
/// Each session's deque holds at most `window_size` entries; appending beyond
/// that evicts from the front.
#[derive(Debug)]
pub struct ContextStore {
    window_size: usize,
    sessions: DashMap<String, VecDeque<ContextEntry>>,
}

impl ContextStore {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            sessions: DashMap::new(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Up to `window_size` most recent entries, oldest first.
    pub fn get_context(&self, session_id: &str) -> Vec<ContextEntry> {
        self.sessions
            .get(session_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn add_to_context(&self, session_id: &str, entry: ContextEntry) {
        let mut entries = self.sessions.entry(session_id.to_string()).or_default();
        entries.push_back(entry);
        while entries.len() > self.window_size {
            entries.pop_front();
        }
    }

    pub fn clear_context(&self, session_id: &str) -> usize {
        self.sessions
            .remove(session_id)
            .map(|(_, entries)| entries.len())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            sessions: self.sessions.len(),
            entries: self.sessions.iter().map(|entry| entry.value().len()).sum(),
            window_size: self.window_size,
        }
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW)
    }
}
