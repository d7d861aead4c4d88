//! Opaque connection descriptions exchanged during signaling.
//!
//! The signaling exchange only transports these; the peer channel provider
//! produces and interprets them.

use serde::{Deserialize, Serialize};

/// Connection offer produced by the initiating end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandshakeOffer(pub serde_json::Value);

/// Connection answer produced by the responding end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandshakeAnswer(pub serde_json::Value);
