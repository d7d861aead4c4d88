//! Local watch engine.
//!
//! Walks the configured roots, registers every directory with the notifier
//! and turns the notification stream into [`MutationEvent`]s on the peer
//! channel. Failures while handling one notification are logged and the
//! loop moves on; the remote simply never sees that change.
//!
//! The notifier reports absolute paths even for relative roots. Every
//! notification is rebased onto the root as configured before anything
//! else looks at it, so a root of `./a` yields event names like
//! `./a/x.txt`.

mod notifier;

use std::path::{Path, PathBuf};

use sync_channel::PeerChannel;
use sync_core::{IgnoreSet, Notification, Step, WatchCursor};
use sync_types::{MutationEvent, Operation};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::WatchConfig;
use crate::error::PushError;

pub use notifier::{
    classify, classify_kind, notification_channel, FsNotifier, MockNotifier, NotificationSink,
    NotificationStream, Notifier, NOTIFICATION_CAPACITY,
};

/// A configured root and the absolute forms the notifier may report it as.
#[derive(Debug, Clone)]
struct WatchRoot {
    configured: PathBuf,
    prefixes: Vec<PathBuf>,
}

impl WatchRoot {
    fn new(configured: &Path) -> Self {
        let mut prefixes = vec![configured.to_path_buf()];
        if configured.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                prefixes.push(cwd.join(configured));
            }
        }
        if let Ok(canonical) = configured.canonicalize() {
            prefixes.push(canonical);
        }
        Self {
            configured: configured.to_path_buf(),
            prefixes,
        }
    }
}

/// What one run of the watch loop processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Notifications handled (including ignored ones).
    pub notifications: u64,
    /// Notifier errors logged.
    pub errors: u64,
}

/// Drives notifications from `N` onto the send side of `C`.
pub struct LocalWatcher<N, C> {
    roots: Vec<WatchRoot>,
    ignore: IgnoreSet,
    notifier: N,
    channel: C,
    cursor: WatchCursor,
}

impl<N: Notifier, C: PeerChannel> LocalWatcher<N, C> {
    /// Create a watcher for `config.roots`, honouring `config.ignore`.
    pub fn new(config: &WatchConfig, notifier: N, channel: C) -> Self {
        Self {
            roots: config.roots.iter().map(|root| WatchRoot::new(root)).collect(),
            ignore: IgnoreSet::new(config.ignore.iter().cloned()),
            notifier,
            channel,
            cursor: WatchCursor::new(),
        }
    }

    /// The notifier directories are registered with.
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// The channel events are sent on.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Rename-coalescing state.
    pub fn cursor(&self) -> &WatchCursor {
        &self.cursor
    }

    /// Register every non-ignored directory under the roots.
    ///
    /// Ignored directories are skipped but still descended into; their
    /// children are matched on their own paths. Returns how many
    /// directories were registered.
    pub fn register_tree(&mut self) -> usize {
        let mut registered = 0;
        let roots: Vec<PathBuf> = self.roots.iter().map(|r| r.configured.clone()).collect();
        for root in roots {
            for entry in WalkDir::new(&root).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Error walking {}: {}", root.display(), e);
                        continue;
                    }
                };
                if !entry.file_type().is_dir() || self.ignore.is_ignored(entry.path()) {
                    continue;
                }
                if self.add_directory(entry.path()) {
                    registered += 1;
                }
            }
        }
        registered
    }

    fn add_directory(&mut self, path: &Path) -> bool {
        info!("Adding directory: {} to the watch", path.display());
        match self.notifier.watch(path) {
            Ok(()) => true,
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    /// Process notifications until the notifier goes away.
    ///
    /// Errors still queued when the notification side closes are logged
    /// before returning.
    pub async fn run(&mut self, mut stream: NotificationStream) -> WatchSummary {
        let mut summary = WatchSummary::default();
        let mut errors_open = true;
        loop {
            tokio::select! {
                notification = stream.notifications.recv() => match notification {
                    Some(notification) => {
                        summary.notifications += 1;
                        self.handle(notification).await;
                    }
                    None => break,
                },
                watch_error = stream.errors.recv(), if errors_open => match watch_error {
                    Some(e) => {
                        summary.errors += 1;
                        error!("Watcher error: {}", e);
                    }
                    None => errors_open = false,
                },
            }
        }
        while let Ok(e) = stream.errors.try_recv() {
            summary.errors += 1;
            error!("Watcher error: {}", e);
        }
        info!("Notifier closed, watch loop stopped");
        summary
    }

    /// Map a reported path back onto the root it was registered under.
    ///
    /// The longest matching root prefix wins. Paths under no root are
    /// returned unchanged.
    pub fn rebase(&self, path: &Path) -> PathBuf {
        let mut best: Option<(usize, PathBuf)> = None;
        for root in &self.roots {
            for prefix in &root.prefixes {
                let Ok(rest) = path.strip_prefix(prefix) else {
                    continue;
                };
                let depth = prefix.components().count();
                if best.as_ref().map_or(true, |(d, _)| depth > *d) {
                    let rebased = if rest.as_os_str().is_empty() {
                        root.configured.clone()
                    } else {
                        root.configured.join(rest)
                    };
                    best = Some((depth, rebased));
                }
            }
        }
        best.map_or_else(|| path.to_path_buf(), |(_, rebased)| rebased)
    }

    /// Handle one notification: rebase, filter, coalesce, push.
    pub async fn handle(&mut self, notification: Notification) {
        let notification =
            Notification::new(self.rebase(notification.path()), notification.operation);
        if self.ignore.is_ignored(notification.path()) {
            debug!("Ignoring {}", notification.path().display());
            return;
        }
        debug!(
            "Notification: {} {}",
            notification.operation,
            notification.path().display()
        );

        if notification.operation == Operation::Create && is_dir(notification.path()).await {
            self.add_directory(notification.path());
        }

        for step in self.cursor.on_notification(&notification) {
            if let Err(e) = self.execute(step).await {
                error!("{}", e);
            }
        }
    }

    async fn execute(&self, step: Step) -> Result<(), PushError> {
        let event = match step {
            Step::SendContent { path } => MutationEvent::write(path_name(&path), read(&path).await?),
            Step::SynthesizeWrite { path } => {
                debug!("Synthesizing write for renamed {}", path.display());
                MutationEvent::write(path_name(&path), read(&path).await?)
            }
            Step::SendMetadata { path, operation } => {
                MutationEvent::metadata(path_name(&path), operation)
            }
        };

        let payload = event.to_bytes()?;
        self.channel.send(&payload).await?;
        debug!("Sent {:?}", event);
        Ok(())
    }
}

impl<N, C> std::fmt::Debug for LocalWatcher<N, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWatcher")
            .field(
                "roots",
                &self.roots.iter().map(|r| &r.configured).collect::<Vec<_>>(),
            )
            .field("ignore", &self.ignore)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, PushError> {
    tokio::fs::read(path).await.map_err(|source| PushError::Read {
        path: path.to_path_buf(),
        source,
    })
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

fn path_name(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_channel::MockChannel;

    fn config(root: &Path) -> WatchConfig {
        WatchConfig {
            roots: vec![root.to_path_buf()],
            ignore: vec![".git".to_string()],
        }
    }

    fn sent_events(channel: &MockChannel) -> Vec<MutationEvent> {
        channel
            .sent_frames()
            .iter()
            .map(|frame| MutationEvent::from_bytes(frame).unwrap())
            .collect()
    }

    fn name(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn register_tree_skips_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("a/b")).unwrap();
        std::fs::create_dir_all(root.join(".git/objects")).unwrap();
        std::fs::write(root.join("a/file.txt"), b"x").unwrap();

        let notifier = MockNotifier::new();
        let mut watcher = LocalWatcher::new(&config(root), notifier.clone(), MockChannel::new());

        assert_eq!(watcher.register_tree(), 3);
        let watched = notifier.watched();
        assert!(watched.contains(&root.to_path_buf()));
        assert!(watched.contains(&root.join("a")));
        assert!(watched.contains(&root.join("a/b")));
        assert!(watched.iter().all(|p| !name(p).contains(".git")));
    }

    #[test]
    fn register_tree_counts_only_successful_registrations() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("a")).unwrap();

        let notifier = MockNotifier::new();
        notifier.fail_watch(root.join("a"));
        let mut watcher = LocalWatcher::new(&config(root), notifier.clone(), MockChannel::new());

        assert_eq!(watcher.register_tree(), 1);
        assert_eq!(notifier.watched(), vec![root.to_path_buf()]);
    }

    #[test]
    fn register_tree_survives_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");

        let mut watcher = LocalWatcher::new(&config(&missing), MockNotifier::new(), MockChannel::new());
        assert_eq!(watcher.register_tree(), 0);
    }

    #[tokio::test]
    async fn write_sends_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.txt");
        std::fs::write(&file, b"hi").unwrap();

        let channel = MockChannel::new();
        let mut watcher = LocalWatcher::new(&config(dir.path()), MockNotifier::new(), channel.clone());
        watcher.handle(Notification::new(&file, Operation::Write)).await;

        let events = sent_events(&channel);
        assert_eq!(events, vec![MutationEvent::write(name(&file), b"hi".to_vec())]);
    }

    #[tokio::test]
    async fn create_then_rename_synthesizes_write() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("tmp");
        let fin = dir.path().join("final");
        std::fs::write(&tmp, b"v1").unwrap();

        let channel = MockChannel::new();
        let mut watcher = LocalWatcher::new(&config(dir.path()), MockNotifier::new(), channel.clone());
        watcher.handle(Notification::new(&tmp, Operation::Create)).await;
        watcher.handle(Notification::new(&fin, Operation::Rename)).await;

        let events = sent_events(&channel);
        assert_eq!(
            events,
            vec![
                MutationEvent::metadata(name(&tmp), Operation::Create),
                MutationEvent::write(name(&tmp), b"v1".to_vec()),
                MutationEvent::metadata(name(&fin), Operation::Rename),
            ]
        );
    }

    #[tokio::test]
    async fn failed_synthesis_still_sends_rename() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let fin = dir.path().join("final");

        let channel = MockChannel::new();
        let mut watcher = LocalWatcher::new(&config(dir.path()), MockNotifier::new(), channel.clone());
        watcher.handle(Notification::new(&gone, Operation::Create)).await;
        watcher.handle(Notification::new(&fin, Operation::Rename)).await;

        let events = sent_events(&channel);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], MutationEvent::metadata(name(&fin), Operation::Rename));
    }

    #[tokio::test]
    async fn unreadable_write_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new();
        let mut watcher = LocalWatcher::new(&config(dir.path()), MockNotifier::new(), channel.clone());

        watcher
            .handle(Notification::new(dir.path().join("missing"), Operation::Write))
            .await;
        watcher
            .handle(Notification::new(dir.path().join("old"), Operation::Remove))
            .await;

        let events = sent_events(&channel);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, Operation::Remove);
        assert!(!events[0].carries_content());
    }

    #[tokio::test]
    async fn ignored_notifications_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new();
        let mut watcher = LocalWatcher::new(&config(dir.path()), MockNotifier::new(), channel.clone());

        watcher
            .handle(Notification::new(dir.path().join(".git/index"), Operation::Write))
            .await;

        assert!(channel.sent_frames().is_empty());
        assert!(watcher.cursor().last().is_none());
    }

    #[tokio::test]
    async fn created_directory_is_registered() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let notifier = MockNotifier::new();
        let channel = MockChannel::new();
        let mut watcher = LocalWatcher::new(&config(dir.path()), notifier.clone(), channel.clone());
        watcher.handle(Notification::new(&sub, Operation::Create)).await;

        assert_eq!(notifier.watched(), vec![sub.clone()]);
        assert_eq!(
            sent_events(&channel),
            vec![MutationEvent::metadata(name(&sub), Operation::Create)]
        );
    }

    #[tokio::test]
    async fn send_failure_does_not_stop_processing() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new();
        channel.fail_next_send("buffer full");
        let mut watcher = LocalWatcher::new(&config(dir.path()), MockNotifier::new(), channel.clone());

        watcher.handle(Notification::new(dir.path().join("a"), Operation::Remove)).await;
        watcher.handle(Notification::new(dir.path().join("b"), Operation::Remove)).await;

        let events = sent_events(&channel);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, name(&dir.path().join("b")));
    }

    #[tokio::test]
    async fn run_drains_stream_and_stops_when_closed() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new();
        let mut watcher = LocalWatcher::new(&config(dir.path()), MockNotifier::new(), channel.clone());

        let (sink, stream) = notification_channel(8);
        sink.report(crate::error::WatchError::Notifier("overflow".into()))
            .await;
        sink.notify(Notification::new(dir.path().join("a"), Operation::Create))
            .await;
        sink.notify(Notification::new(dir.path().join("a"), Operation::Remove))
            .await;
        drop(sink);

        let summary = watcher.run(stream).await;
        assert_eq!(
            summary,
            WatchSummary {
                notifications: 2,
                errors: 1
            }
        );

        let ops: Vec<Operation> = sent_events(&channel).iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec![Operation::Create, Operation::Remove]);
    }

    fn relative(root: &str, ignore: Vec<String>) -> WatchConfig {
        WatchConfig {
            roots: vec![PathBuf::from(root)],
            ignore,
        }
    }

    #[tokio::test]
    async fn relative_root_names_events_relative_to_root() {
        let cwd = std::env::current_dir().unwrap();
        let channel = MockChannel::new();
        let mut watcher =
            LocalWatcher::new(&relative("./a", vec![]), MockNotifier::new(), channel.clone());

        watcher
            .handle(Notification::new(cwd.join("./a/gone.txt"), Operation::Remove))
            .await;

        assert_eq!(
            sent_events(&channel),
            vec![MutationEvent::metadata("./a/gone.txt", Operation::Remove)]
        );
    }

    #[tokio::test]
    async fn ignore_matches_rebased_path_not_absolute_one() {
        let cwd = std::env::current_dir().unwrap();
        let outer = cwd.file_name().unwrap().to_string_lossy().into_owned();
        let channel = MockChannel::new();
        let mut watcher =
            LocalWatcher::new(&relative("./a", vec![outer]), MockNotifier::new(), channel.clone());

        watcher
            .handle(Notification::new(cwd.join("./a/x.txt"), Operation::Remove))
            .await;

        assert_eq!(sent_events(&channel).len(), 1);
    }

    #[test]
    fn rebase_maps_root_itself_and_leaves_foreign_paths() {
        let cwd = std::env::current_dir().unwrap();
        let watcher = LocalWatcher::new(&relative("./a", vec![]), MockNotifier::new(), MockChannel::new());

        assert_eq!(watcher.rebase(&cwd.join("a")), PathBuf::from("./a"));
        assert_eq!(
            watcher.rebase(Path::new("/elsewhere/x.txt")),
            PathBuf::from("/elsewhere/x.txt")
        );
    }

    #[tokio::test]
    async fn fs_notifier_on_relative_root_sends_relative_names() {
        let dir = tempfile::tempdir_in(".").unwrap();
        let root = dir.path().to_path_buf();
        assert!(root.is_relative());

        let (notifier, mut stream) = FsNotifier::new().unwrap();
        let channel = MockChannel::new();
        let config = WatchConfig {
            roots: vec![root.clone()],
            ignore: vec![],
        };
        let mut watcher = LocalWatcher::new(&config, notifier, channel.clone());
        assert_eq!(watcher.register_tree(), 1);

        std::fs::write(root.join("x.txt"), b"hi").unwrap();
        let expected = name(&root.join("x.txt"));

        let written = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while let Some(notification) = stream.notifications.recv().await {
                watcher.handle(notification).await;
                if sent_events(&channel)
                    .iter()
                    .any(|e| e.operation == Operation::Write && e.path == expected)
                {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        assert!(written);
        assert!(sent_events(&channel)
            .iter()
            .all(|e| e.path.starts_with(&name(&root))));
    }
}
