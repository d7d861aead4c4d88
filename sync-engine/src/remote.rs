//! Remote apply engine.
//!
//! Receives [`MutationEvent`]s from the peer channel and replays them onto
//! the local filesystem under a root directory. Only events that carry
//! content change anything; applying the same event twice leaves the same
//! bytes on disk.

use std::path::{Component, Path, PathBuf};

use sync_channel::{ChannelError, PeerChannel};
use sync_types::{MutationEvent, Operation};
use tracing::{debug, info, warn};

use crate::error::ApplyError;

/// What applying one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// File contents were written.
    Written {
        /// Target file.
        path: PathBuf,
        /// Number of bytes written.
        bytes: usize,
    },
    /// The event carried no content; nothing changed.
    MetadataOnly,
}

/// Applies events under a fixed root.
#[derive(Debug, Clone)]
pub struct RemoteApplier {
    root: PathBuf,
}

impl RemoteApplier {
    /// Create an applier writing under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory event paths are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an event path under the root.
    ///
    /// Leading `/` and `.` components are dropped so the result always
    /// stays inside the root; `..` is refused.
    pub fn target(&self, name: &str) -> Result<PathBuf, ApplyError> {
        let mut target = self.root.clone();
        for component in Path::new(name).components() {
            match component {
                Component::Normal(part) => target.push(part),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
                Component::ParentDir => return Err(ApplyError::UnsafePath(name.to_string())),
            }
        }
        if target == self.root {
            return Err(ApplyError::UnsafePath(name.to_string()));
        }
        Ok(target)
    }

    /// Apply one event.
    pub async fn apply(&self, event: &MutationEvent) -> Result<ApplyOutcome, ApplyError> {
        let Some(content) = &event.content else {
            if event.operation == Operation::Remove {
                info!("{} removed locally, deletion not propagated", event.path);
            } else {
                info!("{} {}", event.operation, event.path);
            }
            return Ok(ApplyOutcome::MetadataOnly);
        };

        let target = self.target(&event.path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ApplyError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|source| ApplyError::Io {
                path: target.clone(),
                source,
            })?;

        debug!("Wrote {} bytes to {}", content.len(), target.display());
        Ok(ApplyOutcome::Written {
            path: target,
            bytes: content.len(),
        })
    }

    /// Apply every event received on `channel` until the peer closes it.
    ///
    /// Returns the number of events received. A malformed frame or a failed
    /// write ends the loop with an error; paths outside the root are
    /// skipped.
    pub async fn run<C: PeerChannel + ?Sized>(&self, channel: &C) -> Result<u64, ApplyError> {
        let mut received = 0u64;
        loop {
            let frame = match channel.recv().await {
                Ok(frame) => frame,
                Err(ChannelError::Closed) => {
                    info!("Data channel closed after {} events", received);
                    return Ok(received);
                }
                Err(e) => return Err(e.into()),
            };
            received += 1;

            let event = MutationEvent::from_bytes(&frame)?;
            debug!("Received {:?}", event);
            match self.apply(&event).await {
                Ok(_) => {}
                Err(ApplyError::UnsafePath(path)) => {
                    warn!("Skipping event for path outside the root: {}", path);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
