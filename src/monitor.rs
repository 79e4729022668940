use crate::types::ErrorLogEntry;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};

pub const MAX_ERROR_ENTRIES: usize = 100;
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Bounded, in-memory log of recent errors for diagnostics.
///
/// Holds at most [`MAX_ERROR_ENTRIES`]; the oldest entry is dropped first.
/// Clones share the same buffer.
#[derive(Clone, Default)]
pub struct ErrorMonitor {
    entries: Arc<Mutex<VecDeque<ErrorLogEntry>>>,
}

impl ErrorMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error. The `source()` chain, if any, becomes the entry's stack.
    pub fn log(
        &self,
        component: &str,
        action: &str,
        error: &(dyn Error + 'static),
        metadata: Option<Map<String, Value>>,
    ) {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        let stack = if chain.is_empty() { None } else { Some(chain.join("\n")) };

        self.push(component, action, error.to_string(), stack, metadata);
    }

    pub fn log_message(
        &self,
        component: &str,
        action: &str,
        message: &str,
        metadata: Option<Map<String, Value>>,
    ) {
        self.push(component, action, message.to_string(), None, metadata);
    }

    fn push(
        &self,
        component: &str,
        action: &str,
        error: String,
        stack: Option<String>,
        metadata: Option<Map<String, Value>>,
    ) {
        let entry = ErrorLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            component: component.to_string(),
            action: action.to_string(),
            error,
            stack,
            metadata,
        };

        tracing::error!(
            component = %entry.component,
            action = %entry.action,
            stack = entry.stack.as_deref(),
            metadata = ?entry.metadata,
            "{}",
            entry.error
        );

        let mut entries = self.lock();
        if entries.len() >= MAX_ERROR_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The last `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ErrorLogEntry> {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn by_component(&self, component: &str) -> Vec<ErrorLogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.component == component)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ErrorLogEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
