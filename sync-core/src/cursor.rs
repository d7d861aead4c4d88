//! Rename coalescing for the local watch loop.
//!
//! Many filesystems implement a user-level rename as create + move, so the
//! notifier reports it as two notifications: a CREATE for one path followed
//! by a RENAME. Forwarded as-is, the remote would never receive the file's
//! bytes under the name the local end actually holds them under.
//!
//! [`WatchCursor`] remembers the previous notification (one step of
//! lookback, never a full rename chain) and, when a RENAME directly follows
//! a CREATE, asks for an extra WRITE of the created path ahead of the
//! ordinary RENAME event.
//!
//! The cursor is owned by the single task that drives the watch loop and is
//! never touched from another task. Watching roots from parallel loops would
//! need one cursor per loop.

use std::path::PathBuf;
use sync_types::Operation;

use crate::Notification;

/// What the watch loop has to do for one notification, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Read the file at `path` and send a WRITE event with its bytes.
    SendContent {
        /// File to read.
        path: PathBuf,
    },
    /// Read the previously created file at `path` and send a WRITE event
    /// for it (CREATE followed by RENAME).
    SynthesizeWrite {
        /// The path tracked by the cursor, not the renamed path.
        path: PathBuf,
    },
    /// Send an event with no payload.
    SendMetadata {
        /// Reported path.
        path: PathBuf,
        /// Reported operation.
        operation: Operation,
    },
}

/// Last-seen `(operation, path)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchCursor {
    last: Option<(Operation, PathBuf)>,
}

impl WatchCursor {
    /// Create a cursor that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The previous notification, if any.
    pub fn last(&self) -> Option<(Operation, &PathBuf)> {
        self.last.as_ref().map(|(op, path)| (*op, path))
    }

    /// Process a notification and return the steps to execute.
    ///
    /// The cursor moves to this notification unconditionally, whatever the
    /// caller later makes of the steps.
    pub fn on_notification(&mut self, notification: &Notification) -> Vec<Step> {
        let path = notification.path.clone();
        let steps = match notification.operation {
            Operation::Write => vec![Step::SendContent { path }],
            Operation::Rename => {
                let mut steps = Vec::with_capacity(2);
                if let Some((Operation::Create, created)) = &self.last {
                    steps.push(Step::SynthesizeWrite {
                        path: created.clone(),
                    });
                }
                steps.push(Step::SendMetadata {
                    path,
                    operation: Operation::Rename,
                });
                steps
            }
            operation => vec![Step::SendMetadata { path, operation }],
        };

        self.last = Some((notification.operation, notification.path.clone()));
        steps
    }
}
