//! Signaling endpoint run by the remote end.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::any, Extension, Json, Router};
use sync_types::HandshakeOffer;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::PendingOffer;
use crate::error::SignalingError;

#[derive(Clone)]
struct SignalingState {
    offers: mpsc::Sender<PendingOffer>,
    paired: Arc<AtomicBool>,
}

/// Build the signaling router.
///
/// Accepted offers are handed to `offers`; the request completes once the
/// receiver responds to the [`PendingOffer`].
pub fn build_router(offers: mpsc::Sender<PendingOffer>) -> Router {
    let state = SignalingState {
        offers,
        paired: Arc::new(AtomicBool::new(false)),
    };
    Router::new()
        .route("/", any(offer_handler))
        .layer(Extension(state))
}

async fn offer_handler(
    Extension(state): Extension<SignalingState>,
    method: Method,
    body: Bytes,
) -> Response {
    let response = match method {
        Method::OPTIONS => StatusCode::OK.into_response(),
        Method::POST => accept_offer(&state, &body).await,
        _ => (StatusCode::BAD_REQUEST, "Please send a POST request").into_response(),
    };
    with_cors(response)
}

async fn accept_offer(state: &SignalingState, body: &[u8]) -> Response {
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "Please send a request body").into_response();
    }

    let offer: HandshakeOffer = match serde_json::from_slice(body) {
        Ok(offer) => offer,
        Err(e) => {
            warn!("Rejecting malformed offer: {}", e);
            return (StatusCode::BAD_REQUEST, format!("Invalid offer: {}", e)).into_response();
        }
    };

    if state.paired.swap(true, Ordering::SeqCst) {
        debug!("Rejecting offer, session already paired");
        return (StatusCode::CONFLICT, "Session already paired").into_response();
    }

    let (reply_tx, reply_rx) = oneshot::channel();
    if state
        .offers
        .send(PendingOffer::new(offer, reply_tx))
        .await
        .is_err()
    {
        error!("Offer received but nobody is waiting for it");
        state.paired.store(false, Ordering::SeqCst);
        return (StatusCode::SERVICE_UNAVAILABLE, "Not accepting offers").into_response();
    }

    info!("Offer received, waiting for answer");
    match reply_rx.await {
        Ok(answer) => Json(answer).into_response(),
        Err(_) => {
            error!("Offer was dropped without an answer");
            state.paired.store(false, Ordering::SeqCst);
            (StatusCode::INTERNAL_SERVER_ERROR, "No answer was produced").into_response()
        }
    }
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// Running signaling endpoint. Stops serving when dropped.
pub struct SignalingServer {
    local_addr: SocketAddr,
    offers: mpsc::Receiver<PendingOffer>,
    task: JoinHandle<()>,
}

impl SignalingServer {
    /// Bind `address` and start serving in the background.
    pub async fn bind(address: &str) -> Result<Self, SignalingError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| SignalingError::Bind {
                address: address.to_string(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| SignalingError::Bind {
                address: address.to_string(),
                source,
            })?;

        let (tx, rx) = mpsc::channel(1);
        let router = build_router(tx);
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("Signaling endpoint failed: {}", e);
            }
        });

        info!("Listening on {}", local_addr);
        Ok(Self {
            local_addr,
            offers: rx,
            task,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the first offer.
    pub async fn next_offer(&mut self) -> Result<PendingOffer, SignalingError> {
        self.offers.recv().await.ok_or(SignalingError::Stopped)
    }
}

impl std::fmt::Debug for SignalingServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingServer")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl Drop for SignalingServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
