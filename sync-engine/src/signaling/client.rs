//! Signaling client used by the local end.

use sync_types::{HandshakeAnswer, HandshakeOffer};
use tracing::debug;

use crate::error::SignalingError;

/// Post `offer` to the signaling endpoint at `url` and return the answer.
pub async fn signal_offer(
    url: &str,
    offer: &HandshakeOffer,
) -> Result<HandshakeAnswer, SignalingError> {
    debug!("Posting offer to {}", url);
    let response = reqwest::Client::new().post(url).json(offer).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SignalingError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json::<HandshakeAnswer>().await?)
}
