//! Filesystem notifier adapter.
//!
//! The `notify` crate reports rich [`EventKind`]s; the watch loop only deals
//! in the five [`Operation`]s. The mapping is decided here and nowhere else.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sync_core::Notification;
use sync_types::Operation;
use tokio::sync::mpsc;

use crate::error::WatchError;

/// Queue depth between the notifier thread and the watch loop.
pub const NOTIFICATION_CAPACITY: usize = 256;

/// Registers directories for change notifications.
///
/// Registration is non-recursive: every directory has to be registered on
/// its own.
pub trait Notifier: Send {
    /// Start watching `path`.
    fn watch(&mut self, path: &Path) -> Result<(), WatchError>;
}

/// Receiving half of a notifier: notifications and asynchronous errors.
#[derive(Debug)]
pub struct NotificationStream {
    /// Classified notifications, in delivery order.
    pub notifications: mpsc::Receiver<Notification>,
    /// Errors the notifier reported after setup.
    pub errors: mpsc::Receiver<WatchError>,
}

/// Sending half matching a [`NotificationStream`].
#[derive(Debug, Clone)]
pub struct NotificationSink {
    notifications: mpsc::Sender<Notification>,
    errors: mpsc::Sender<WatchError>,
}

/// Create a connected sink/stream pair.
pub fn notification_channel(capacity: usize) -> (NotificationSink, NotificationStream) {
    let (notifications_tx, notifications_rx) = mpsc::channel(capacity);
    let (errors_tx, errors_rx) = mpsc::channel(capacity);
    (
        NotificationSink {
            notifications: notifications_tx,
            errors: errors_tx,
        },
        NotificationStream {
            notifications: notifications_rx,
            errors: errors_rx,
        },
    )
}

impl NotificationSink {
    /// Deliver a notification. Returns false once the stream is gone.
    pub async fn notify(&self, notification: Notification) -> bool {
        self.notifications.send(notification).await.is_ok()
    }

    /// Deliver an error. Returns false once the stream is gone.
    pub async fn report(&self, error: WatchError) -> bool {
        self.errors.send(error).await.is_ok()
    }

    // Runs on the notifier's own thread, never inside the runtime.
    fn forward(&self, result: notify::Result<Event>) {
        match result {
            Ok(event) => {
                for notification in classify(&event) {
                    if self.notifications.blocking_send(notification).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = self
                    .errors
                    .blocking_send(WatchError::Notifier(e.to_string()));
            }
        }
    }
}

/// Map a `notify` event kind to an operation. `None` means drop the event.
pub fn classify_kind(kind: &EventKind) -> Option<Operation> {
    match kind {
        EventKind::Create(_) => Some(Operation::Create),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(Operation::Create),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => None,
        EventKind::Modify(ModifyKind::Name(_)) => Some(Operation::Rename),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(Operation::Other),
        EventKind::Modify(_) => Some(Operation::Write),
        EventKind::Remove(_) => Some(Operation::Remove),
        EventKind::Access(_) => None,
        EventKind::Any | EventKind::Other => Some(Operation::Other),
    }
}

/// One notification per path in `event`.
pub fn classify(event: &Event) -> Vec<Notification> {
    match classify_kind(&event.kind) {
        Some(operation) => event
            .paths
            .iter()
            .map(|path| Notification::new(path.clone(), operation))
            .collect(),
        None => Vec::new(),
    }
}

/// Notifier backed by the platform's recommended `notify` watcher.
pub struct FsNotifier {
    watcher: RecommendedWatcher,
}

impl FsNotifier {
    /// Create the watcher and the stream it feeds.
    pub fn new() -> Result<(Self, NotificationStream), WatchError> {
        let (sink, stream) = notification_channel(NOTIFICATION_CAPACITY);
        let watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| sink.forward(result))
                .map_err(WatchError::Init)?;
        Ok((Self { watcher }, stream))
    }
}

impl std::fmt::Debug for FsNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsNotifier").finish_non_exhaustive()
    }
}

impl Notifier for FsNotifier {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::Register {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

/// Notifier that records registrations, for tests.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    inner: Arc<Mutex<MockNotifierInner>>,
}

#[derive(Debug, Default)]
struct MockNotifierInner {
    watched: Vec<PathBuf>,
    failing: HashSet<PathBuf>,
}

impl MockNotifier {
    /// Create a notifier that accepts every path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths registered so far, in order.
    pub fn watched(&self) -> Vec<PathBuf> {
        self.inner
            .lock()
            .map(|inner| inner.watched.clone())
            .unwrap_or_default()
    }

    /// Make registration of `path` fail.
    pub fn fail_watch(&self, path: impl Into<PathBuf>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing.insert(path.into());
        }
    }
}

impl Notifier for MockNotifier {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        let mut inner = self.inner.lock().map_err(|e| WatchError::Register {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if inner.failing.contains(path) {
            return Err(WatchError::Register {
                path: path.to_path_buf(),
                reason: "mock failure".to_string(),
            });
        }
        inner.watched.push(path.to_path_buf());
        Ok(())
    }
}
