//! # sync-channel
//!
//! Peer channel abstraction for workspace-sync.
//!
//! The synchronization engine never looks inside the transport. It needs a
//! provider that can describe itself in an offer, turn an offer into an
//! answer, and hand back an open, ordered, bidirectional message channel.
//!
//! ## Design
//!
//! - [`ChannelProvider`] produces and consumes the opaque offer/answer blobs
//!   and yields a [`PeerChannel`] once the channel is open
//! - [`PeerChannel`] is message oriented: `send()` one frame, `recv()` one frame
//! - [`TcpProvider`] is a direct TCP implementation with length-prefixed frames
//! - [`MockChannel`] captures sent frames and replays queued ones in tests
//!
//! ## Example
//!
//! ```ignore
//! let provider = TcpProvider::new(TcpProviderConfig::default());
//! let offer = provider.create_offer().await?;
//! // ... carry the offer to the responder, get the answer back ...
//! let channel = provider.complete(&answer).await?;
//! channel.send(b"hello").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod channel;
mod mock;
mod tcp;

pub use channel::{ChannelError, ChannelProvider, PeerChannel};
pub use mock::MockChannel;
pub use tcp::{TcpChannel, TcpProvider, TcpProviderConfig, MAX_FRAME_SIZE};
