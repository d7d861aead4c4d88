//! Offer/answer exchange between the two ends.
//!
//! The remote end runs a tiny HTTP endpoint ([`SignalingServer`]). The local
//! end posts its [`HandshakeOffer`] to it ([`signal_offer`]) and gets the
//! [`HandshakeAnswer`] back in the response body. Only one offer is
//! accepted; the endpoint answers later ones with 409 Conflict. An offer
//! that never got its answer frees the slot again.

mod client;
mod server;

use sync_types::{HandshakeAnswer, HandshakeOffer};
use tokio::sync::oneshot;

use crate::error::SignalingError;

pub use client::signal_offer;
pub use server::{build_router, SignalingServer};

/// An offer waiting for the responder's answer.
///
/// The HTTP request that delivered the offer stays open until
/// [`respond`](Self::respond) is called or this value is dropped.
#[derive(Debug)]
pub struct PendingOffer {
    offer: HandshakeOffer,
    reply: oneshot::Sender<HandshakeAnswer>,
}

impl PendingOffer {
    pub(crate) fn new(offer: HandshakeOffer, reply: oneshot::Sender<HandshakeAnswer>) -> Self {
        Self { offer, reply }
    }

    /// The initiator's offer.
    pub fn offer(&self) -> &HandshakeOffer {
        &self.offer
    }

    /// Send the answer back to the initiator.
    pub fn respond(self, answer: HandshakeAnswer) -> Result<(), SignalingError> {
        self.reply
            .send(answer)
            .map_err(|_| SignalingError::InitiatorGone)
    }
}
