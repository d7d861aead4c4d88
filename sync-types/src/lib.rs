//! # sync-types
//!
//! Wire format types for workspace-sync.
//!
//! This crate provides the types exchanged between the two ends of a session:
//! - [`MutationEvent`] and [`Operation`] - one file change, as sent over the peer channel
//! - [`HandshakeOffer`], [`HandshakeAnswer`] - opaque connection descriptions
//!   carried by the signaling exchange
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod handshake;

pub use error::WireError;
pub use event::{MutationEvent, Operation};
pub use handshake::{HandshakeAnswer, HandshakeOffer};
