//! # sync-engine
//!
//! Synchronization engine for workspace-sync.
//!
//! A session has two ends:
//! - the **local** end watches a directory tree and pushes every change as a
//!   [`MutationEvent`](sync_types::MutationEvent)
//! - the **remote** end receives those events and writes them under its own
//!   root
//!
//! They find each other through a one-shot HTTP exchange ([`signaling`]),
//! after which all traffic goes over a [`PeerChannel`](sync_channel::PeerChannel).
//!
//! ## Example
//!
//! ```ignore
//! let config = Config::load(None)?;
//! run_remote(&config).await?;   // on the mirror
//! run_local(&config).await?;    // on the workstation
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod local;
pub mod remote;
pub mod session;
pub mod signaling;

pub use config::Config;
pub use error::{ApplyError, EngineError, PushError, Result, SignalingError, WatchError};
pub use local::{LocalWatcher, Notifier, WatchSummary};
pub use remote::{ApplyOutcome, RemoteApplier};
pub use session::{initiate, respond, run_local, run_remote};
pub use signaling::{signal_offer, PendingOffer, SignalingServer};
