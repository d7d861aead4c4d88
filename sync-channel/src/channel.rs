//! Peer channel and provider traits.

use async_trait::async_trait;
use sync_types::{HandshakeAnswer, HandshakeOffer};
use thiserror::Error;

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Channel closed by the peer.
    #[error("channel closed")]
    Closed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,

    /// The offer or answer could not be understood.
    #[error("invalid connection description: {0}")]
    InvalidDescription(String),

    /// The peer asked for a different channel.
    #[error("channel label mismatch: expected {expected}, got {actual}")]
    LabelMismatch {
        /// Label this end is configured for.
        expected: String,
        /// Label the peer asked for.
        actual: String,
    },

    /// A frame exceeded the size limit.
    #[error("frame too large: {size} bytes (limit: {limit} bytes)")]
    FrameTooLarge {
        /// Size of the frame.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },
}

/// An established, ordered, bidirectional message channel between the two ends.
///
/// Implementations must deliver frames in the order they were sent; the
/// remote end relies on it to replay file changes correctly.
#[async_trait]
pub trait PeerChannel: Send + Sync {
    /// Label both ends agreed on.
    fn label(&self) -> &str;

    /// Send one frame.
    async fn send(&self, data: &[u8]) -> Result<(), ChannelError>;

    /// Receive one frame.
    ///
    /// Blocks until a frame is available. Returns [`ChannelError::Closed`]
    /// once the peer has gone away.
    async fn recv(&self) -> Result<Vec<u8>, ChannelError>;

    /// Check if the channel is open.
    fn is_open(&self) -> bool;

    /// Close the channel gracefully.
    async fn close(&self) -> Result<(), ChannelError>;
}

/// Establishes peer channels from an offer/answer exchange.
///
/// The initiating end calls [`create_offer`](Self::create_offer), carries the
/// offer to the responder by some other means, and finishes with
/// [`complete`](Self::complete). The responding end calls
/// [`create_answer`](Self::create_answer) and then waits in
/// [`open`](Self::open) until the initiator arrives.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// The channel type this provider hands out.
    type Channel: PeerChannel + 'static;

    /// Initiator: describe how to reach us.
    async fn create_offer(&self) -> Result<HandshakeOffer, ChannelError>;

    /// Initiator: open the channel described by the responder's answer.
    async fn complete(&self, answer: &HandshakeAnswer) -> Result<Self::Channel, ChannelError>;

    /// Responder: accept an offer and describe how to reach us.
    async fn create_answer(&self, offer: &HandshakeOffer) -> Result<HandshakeAnswer, ChannelError>;

    /// Responder: wait until the initiator has opened the channel.
    async fn open(&self) -> Result<Self::Channel, ChannelError>;
}
