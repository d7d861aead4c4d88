//! Classified filesystem notifications.

use std::path::{Path, PathBuf};
use sync_types::Operation;

/// A raw filesystem change, already classified into a single [`Operation`]
/// by the notifier adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Path the notifier reported.
    pub path: PathBuf,
    /// Kind of change.
    pub operation: Operation,
}

impl Notification {
    /// Create a notification.
    pub fn new(path: impl Into<PathBuf>, operation: Operation) -> Self {
        Self {
            path: path.into(),
            operation,
        }
    }

    /// The reported path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
