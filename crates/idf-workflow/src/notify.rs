//! User-facing notification sink.

use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard};

pub trait Notifier: Send + Sync {
    fn info_notify(&self, message: &str, tags: &[&str]);

    fn warn_notify(&self, message: &str, tags: &[&str]);

    fn error_notify(&self, message: &str, error: &dyn Error, tags: &[&str]);
}

fn error_chain(error: &dyn Error) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

/// Notifier that writes through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn info_notify(&self, message: &str, tags: &[&str]) {
        log::info!("[{}] {}", tags.join(","), message);
    }

    fn warn_notify(&self, message: &str, tags: &[&str]) {
        log::warn!("[{}] {}", tags.join(","), message);
    }

    fn error_notify(&self, message: &str, error: &dyn Error, tags: &[&str]) {
        log::error!("[{}] {} ({})", tags.join(","), message, error_chain(error));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotifyLevel,
    pub message: String,
    /// Rendered error chain for `Error` notifications.
    pub error: Option<String>,
    pub tags: Vec<String>,
}

/// Notifier that keeps every notification for later inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn seen(&self) -> MutexGuard<'_, Vec<Notification>> {
        match self.seen.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen().clone()
    }

    pub fn count(&self, level: NotifyLevel) -> usize {
        self.seen().iter().filter(|n| n.level == level).count()
    }

    pub fn contains(&self, level: NotifyLevel, needle: &str) -> bool {
        self.seen()
            .iter()
            .any(|n| n.level == level && n.message.contains(needle))
    }

    fn push(&self, level: NotifyLevel, message: &str, error: Option<String>, tags: &[&str]) {
        self.seen().push(Notification {
            level,
            message: message.to_string(),
            error,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        });
    }
}

impl Notifier for RecordingNotifier {
    fn info_notify(&self, message: &str, tags: &[&str]) {
        self.push(NotifyLevel::Info, message, None, tags);
    }

    fn warn_notify(&self, message: &str, tags: &[&str]) {
        self.push(NotifyLevel::Warn, message, None, tags);
    }

    fn error_notify(&self, message: &str, error: &dyn Error, tags: &[&str]) {
        self.push(NotifyLevel::Error, message, Some(error_chain(error)), tags);
    }
}
