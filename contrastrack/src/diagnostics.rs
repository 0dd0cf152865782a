//! Write-once diagnostics for inspecting intermediate shapes and values
//!
//! The selector reports through an injected [`DiagnosticSink`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

/// Sink that emits each message at most once per key
pub trait DiagnosticSink: Send + Sync {
    /// Emit `content` unless something was already logged under `id`
    fn log_id(&self, id: u32, content: fmt::Arguments<'_>);

    /// Emit `content` unless the same text was already logged
    fn log_once(&self, content: fmt::Arguments<'_>);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn log_id(&self, _id: u32, _content: fmt::Arguments<'_>) {}

    fn log_once(&self, _content: fmt::Arguments<'_>) {}
}

/// Forwards first occurrences to the `log` facade at debug level
#[derive(Debug)]
pub struct OneTimeLogger {
    prefix: String,
    seen_ids: Mutex<HashSet<u32>>,
    seen_content: Mutex<HashSet<String>>,
}

impl Default for OneTimeLogger {
    fn default() -> Self {
        Self::new("[OneTimeLogger]:")
    }
}

impl OneTimeLogger {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
            seen_ids: Mutex::new(HashSet::new()),
            seen_content: Mutex::new(HashSet::new()),
        }
    }

    /// Whether anything was logged under `id`
    pub fn has_logged(&self, id: u32) -> bool {
        self.seen_ids
            .lock()
            .map(|ids| ids.contains(&id))
            .unwrap_or(false)
    }

    /// Forget every key so messages are emitted again
    pub fn reset(&self) {
        if let Ok(mut ids) = self.seen_ids.lock() {
            ids.clear();
        }
        if let Ok(mut content) = self.seen_content.lock() {
            content.clear();
        }
    }
}

impl DiagnosticSink for OneTimeLogger {
    fn log_id(&self, id: u32, content: fmt::Arguments<'_>) {
        let first = match self.seen_ids.lock() {
            Ok(mut ids) => ids.insert(id),
            Err(poisoned) => poisoned.into_inner().insert(id),
        };
        if first {
            log::debug!("{}{}", self.prefix, content);
        }
    }

    fn log_once(&self, content: fmt::Arguments<'_>) {
        let text = content.to_string();
        let first = match self.seen_content.lock() {
            Ok(mut seen) => seen.insert(text.clone()),
            Err(poisoned) => poisoned.into_inner().insert(text.clone()),
        };
        if first {
            log::debug!("{}{}", self.prefix, text);
        }
    }
}
