//! Error types for the synchronization engine.

use std::path::PathBuf;

use sync_channel::ChannelError;
use sync_types::WireError;

use crate::config::ConfigError;

/// Top-level error for running either end. Everything here ends the session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Offer/answer exchange failed.
    #[error("signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// Peer channel could not be established or broke.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Notifier could not be set up.
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    /// Remote end could not apply an event.
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),
}

/// Signaling errors.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    /// Could not bind the signaling endpoint.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address we tried to bind.
        address: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The HTTP round trip failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The responder refused the offer.
    #[error("offer rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The signaling endpoint stopped before an offer arrived.
    #[error("signaling endpoint stopped")]
    Stopped,

    /// The initiator went away before it got the answer.
    #[error("initiator disconnected before the answer was sent")]
    InitiatorGone,
}

/// Notifier errors.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Notifier construction failed.
    #[error("failed to create notifier: {0}")]
    Init(#[source] notify::Error),

    /// A directory could not be registered.
    #[error("failed to watch {path}: {reason}")]
    Register {
        /// Directory we tried to watch.
        path: PathBuf,
        /// Why it failed.
        reason: String,
    },

    /// Error reported asynchronously by the notifier.
    #[error("notifier error: {0}")]
    Notifier(String),
}

/// Failure to push one event. The watch loop logs these and moves on.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The changed file could not be read.
    #[error("error reading file {path}: {source}")]
    Read {
        /// File we tried to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The event could not be serialized.
    #[error("unable to encode event: {0}")]
    Encode(#[from] WireError),

    /// The event could not be sent.
    #[error("unable to send payload: {0}")]
    Send(#[from] ChannelError),
}

/// Remote apply errors.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// An inbound frame was not a valid event.
    #[error("malformed event: {0}")]
    Decode(#[from] WireError),

    /// The event path would escape the remote root.
    #[error("refusing path outside the remote root: {0}")]
    UnsafePath(String),

    /// Writing to the remote tree failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Path we tried to create or write.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Receiving from the channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
