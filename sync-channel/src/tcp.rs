//! TcpProvider - direct peer channel over a single TCP connection.
//!
//! The responder binds a listener when it answers an offer and puts the
//! address in the answer. The initiator connects to that address and
//! presents the session token from its offer as the first frame, so a
//! stray connection cannot take the responder's place.
//!
//! Frames are length-prefixed (4 bytes, big-endian).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sync_types::{HandshakeAnswer, HandshakeOffer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ChannelError, ChannelProvider, PeerChannel};

/// Maximum frame size (64 MiB). Whole files travel in one frame.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Configuration for [`TcpProvider`].
#[derive(Clone, Debug)]
pub struct TcpProviderConfig {
    /// Channel label both ends must agree on.
    pub channel: String,
    /// Where the responder listens for the initiator.
    pub listen_address: String,
    /// Host to put in the answer instead of the listener's own IP.
    pub advertise_host: Option<String>,
    /// Host the initiator dials when the answer advertises an unspecified
    /// IP (`0.0.0.0` or `::`). Usually the host the offer was signaled to.
    pub peer_host: Option<String>,
    /// Initiator connect timeout, also how long the responder waits for a
    /// connection to present its session token.
    pub connect_timeout: Duration,
}

impl Default for TcpProviderConfig {
    fn default() -> Self {
        Self {
            channel: "workspace-sync".to_string(),
            listen_address: "0.0.0.0:0".to_string(),
            advertise_host: None,
            peer_host: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DescriptionKind {
    Offer,
    Answer,
}

/// What travels inside the opaque offer/answer blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TcpDescription {
    #[serde(rename = "type")]
    kind: DescriptionKind,
    channel: String,
    session: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    address: Option<String>,
}

impl TcpDescription {
    fn to_value(&self) -> Result<serde_json::Value, ChannelError> {
        serde_json::to_value(self).map_err(|e| ChannelError::InvalidDescription(e.to_string()))
    }

    fn from_value(value: &serde_json::Value, expected: DescriptionKind) -> Result<Self, ChannelError> {
        let description: Self = serde_json::from_value(value.clone())
            .map_err(|e| ChannelError::InvalidDescription(e.to_string()))?;
        if description.kind != expected {
            return Err(ChannelError::InvalidDescription(format!(
                "expected {:?}, got {:?}",
                expected, description.kind
            )));
        }
        Ok(description)
    }
}

/// Listener bound while answering, waiting for the initiator.
struct PendingAccept {
    listener: TcpListener,
    session: Uuid,
}

/// Direct TCP channel provider.
///
/// One provider establishes one channel per role: the initiator keeps the
/// session of its last offer, the responder keeps the listener of its last
/// answer until [`open`](ChannelProvider::open) takes it.
pub struct TcpProvider {
    config: TcpProviderConfig,
    offered: Mutex<Option<Uuid>>,
    pending: Mutex<Option<PendingAccept>>,
}

impl std::fmt::Debug for TcpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TcpProvider {
    /// Create a provider.
    pub fn new(config: TcpProviderConfig) -> Self {
        Self {
            config,
            offered: Mutex::new(None),
            pending: Mutex::new(None),
        }
    }

    /// Get the provider configuration.
    pub fn config(&self) -> &TcpProviderConfig {
        &self.config
    }

    fn check_label(&self, actual: &str) -> Result<(), ChannelError> {
        if actual != self.config.channel {
            return Err(ChannelError::LabelMismatch {
                expected: self.config.channel.clone(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    fn advertised(&self, bound: SocketAddr) -> String {
        match &self.config.advertise_host {
            Some(host) => format!("{}:{}", host, bound.port()),
            None => {
                if bound.ip().is_unspecified() {
                    tracing::warn!(
                        "Listening on unspecified address {}; set advertise_host so the peer can reach it",
                        bound
                    );
                }
                bound.to_string()
            }
        }
    }
}

#[async_trait]
impl ChannelProvider for TcpProvider {
    type Channel = TcpChannel;

    async fn create_offer(&self) -> Result<HandshakeOffer, ChannelError> {
        let session = Uuid::new_v4();
        *self.offered.lock().await = Some(session);

        let offer = TcpDescription {
            kind: DescriptionKind::Offer,
            channel: self.config.channel.clone(),
            session,
            address: None,
        };
        Ok(HandshakeOffer(offer.to_value()?))
    }

    async fn complete(&self, answer: &HandshakeAnswer) -> Result<TcpChannel, ChannelError> {
        let answer = TcpDescription::from_value(&answer.0, DescriptionKind::Answer)?;
        self.check_label(&answer.channel)?;

        let session = self
            .offered
            .lock()
            .await
            .take()
            .ok_or_else(|| ChannelError::InvalidDescription("no offer outstanding".into()))?;
        if answer.session != session {
            return Err(ChannelError::InvalidDescription(
                "answer does not match our offer".into(),
            ));
        }

        let advertised = answer
            .address
            .ok_or_else(|| ChannelError::InvalidDescription("answer has no address".into()))?;
        let address = dial_address(&advertised, self.config.peer_host.as_deref());

        // Connect with timeout
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| ChannelError::Timeout)?
            .map_err(|e| ChannelError::ConnectionFailed(format!("{}: {}", address, e)))?;
        stream.set_nodelay(true).ok();

        let channel = TcpChannel::new(stream, &self.config.channel)?;
        channel.send(session.to_string().as_bytes()).await?;

        tracing::info!("Data channel '{}' open to {}", channel.label(), channel.peer_addr());
        Ok(channel)
    }

    async fn create_answer(&self, offer: &HandshakeOffer) -> Result<HandshakeAnswer, ChannelError> {
        let offer = TcpDescription::from_value(&offer.0, DescriptionKind::Offer)?;
        self.check_label(&offer.channel)?;

        let listener = TcpListener::bind(&self.config.listen_address)
            .await
            .map_err(|e| {
                ChannelError::ConnectionFailed(format!(
                    "failed to bind {}: {}",
                    self.config.listen_address, e
                ))
            })?;
        let bound = listener
            .local_addr()
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        let address = self.advertised(bound);

        tracing::debug!("Waiting for channel '{}' on {}", offer.channel, bound);
        *self.pending.lock().await = Some(PendingAccept {
            listener,
            session: offer.session,
        });

        let answer = TcpDescription {
            kind: DescriptionKind::Answer,
            channel: offer.channel,
            session: offer.session,
            address: Some(address),
        };
        Ok(HandshakeAnswer(answer.to_value()?))
    }

    async fn open(&self) -> Result<TcpChannel, ChannelError> {
        let pending = self
            .pending
            .lock()
            .await
            .take()
            .ok_or(ChannelError::NotConnected)?;
        let expected = pending.session.to_string();

        loop {
            let (stream, peer) = pending
                .listener
                .accept()
                .await
                .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
            stream.set_nodelay(true).ok();

            // A connection that never presents a token must not hold up the real peer
            let channel = TcpChannel::new(stream, &self.config.channel)?;
            match tokio::time::timeout(self.config.connect_timeout, channel.recv()).await {
                Ok(Ok(token)) if token == expected.as_bytes() => {
                    tracing::info!("Data channel '{}' open from {}", channel.label(), peer);
                    return Ok(channel);
                }
                Ok(Ok(_)) => tracing::warn!("Rejected connection from {}: wrong session", peer),
                Ok(Err(e)) => tracing::warn!("Rejected connection from {}: {}", peer, e),
                Err(_) => tracing::warn!("Rejected connection from {}: no session token", peer),
            }
        }
    }
}

/// An open TCP peer channel.
///
/// Send and receive halves are locked separately so one task can send while
/// another receives.
pub struct TcpChannel {
    label: String,
    peer: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    open: AtomicBool,
}

impl std::fmt::Debug for TcpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpChannel")
            .field("label", &self.label)
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .finish()
    }
}

impl TcpChannel {
    fn new(stream: TcpStream, label: &str) -> Result<Self, ChannelError> {
        let peer = stream
            .peer_addr()
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            label: label.to_string(),
            peer,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            open: AtomicBool::new(true),
        })
    }

    /// Address of the other end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl PeerChannel for TcpChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, data: &[u8]) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::NotConnected);
        }
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, data).await
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::NotConnected);
        }
        let mut reader = self.reader.lock().await;
        let result = read_frame(&mut *reader).await;
        if matches!(result, Err(ChannelError::Closed)) {
            self.open.store(false, Ordering::SeqCst);
        }
        result
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), ChannelError> {
        if self.open.swap(false, Ordering::SeqCst) {
            // Signal end of stream
            self.writer.lock().await.shutdown().await.ok();
        }
        Ok(())
    }
}

/// Address to connect to for an advertised listener address.
fn dial_address(advertised: &str, peer_host: Option<&str>) -> String {
    match (advertised.parse::<SocketAddr>(), peer_host) {
        (Ok(addr), Some(host)) if addr.ip().is_unspecified() => {
            if host.contains(':') && !host.starts_with('[') {
                format!("[{}]:{}", host, addr.port())
            } else {
                format!("{}:{}", host, addr.port())
            }
        }
        _ => advertised.to_string(),
    }
}

/// Write one length-prefixed frame.
async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<(), ChannelError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ChannelError::FrameTooLarge {
            size: data.len(),
            limit: MAX_FRAME_SIZE,
        });
    }

    let len = (data.len() as u32).to_be_bytes();
    writer
        .write_all(&len)
        .await
        .map_err(|e| ChannelError::SendFailed(format!("Failed to write length: {e}")))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| ChannelError::SendFailed(format!("Failed to write data: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| ChannelError::SendFailed(format!("Failed to flush: {e}")))?;
    Ok(())
}

/// Read one length-prefixed frame.
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ChannelError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ChannelError::Closed
        } else {
            ChannelError::ReceiveFailed(format!("Failed to read length: {e}"))
        }
    })?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ChannelError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }

    let mut data = vec![0u8; len];
    reader
        .read_exact(&mut data)
        .await
        .map_err(|e| ChannelError::ReceiveFailed(format!("Failed to read data: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback(channel: &str) -> TcpProvider {
        TcpProvider::new(TcpProviderConfig {
            channel: channel.to_string(),
            listen_address: "127.0.0.1:0".to_string(),
            ..TcpProviderConfig::default()
        })
    }

    // ===========================================
    // Framing Tests
    // ===========================================

    #[tokio::test]
    async fn frames_roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        write_frame(&mut a, b"first").await.unwrap();
        write_frame(&mut a, b"").await.unwrap();

        assert_eq!(read_frame(&mut b).await.unwrap(), b"first");
        assert_eq!(read_frame(&mut b).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn eof_reads_as_closed() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);

        let result = read_frame(&mut b).await;
        assert!(matches!(result, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        let result = read_frame(&mut b).await;
        assert!(matches!(result, Err(ChannelError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn oversized_frame_is_not_sent() {
        let (mut a, _b) = tokio::io::duplex(64);
        let oversized = vec![0u8; MAX_FRAME_SIZE + 1];

        let result = write_frame(&mut a, &oversized).await;
        assert!(matches!(result, Err(ChannelError::FrameTooLarge { .. })));
    }

    #[test]
    fn length_prefix_is_big_endian() {
        let len: u32 = 1024;
        assert_eq!(len.to_be_bytes(), [0, 0, 4, 0]);
    }

    // ===========================================
    // Description Tests
    // ===========================================

    #[tokio::test]
    async fn offer_names_channel_and_session() {
        let provider = loopback("files");
        let offer = provider.create_offer().await.unwrap();

        assert_eq!(offer.0["type"], "offer");
        assert_eq!(offer.0["channel"], "files");
        assert!(offer.0["session"].is_string());
        assert!(offer.0.get("address").is_none());
    }

    #[tokio::test]
    async fn answer_rejects_other_channel() {
        let initiator = loopback("files");
        let responder = loopback("something-else");

        let offer = initiator.create_offer().await.unwrap();
        let result = responder.create_answer(&offer).await;

        assert!(matches!(result, Err(ChannelError::LabelMismatch { .. })));
    }

    #[tokio::test]
    async fn answer_rejects_an_answer() {
        let responder = loopback("files");
        let bogus = HandshakeOffer(serde_json::json!({
            "type": "answer",
            "channel": "files",
            "session": Uuid::new_v4(),
        }));

        let result = responder.create_answer(&bogus).await;
        assert!(matches!(result, Err(ChannelError::InvalidDescription(_))));
    }

    #[tokio::test]
    async fn answer_rejects_garbage() {
        let responder = loopback("files");
        let result = responder
            .create_answer(&HandshakeOffer(serde_json::json!("v=0")))
            .await;
        assert!(matches!(result, Err(ChannelError::InvalidDescription(_))));
    }

    #[tokio::test]
    async fn complete_without_offer_fails() {
        let initiator = loopback("files");
        let answer = HandshakeAnswer(serde_json::json!({
            "type": "answer",
            "channel": "files",
            "session": Uuid::new_v4(),
            "address": "127.0.0.1:1",
        }));

        let result = initiator.complete(&answer).await;
        assert!(matches!(result, Err(ChannelError::InvalidDescription(_))));
    }

    #[tokio::test]
    async fn open_without_answer_fails() {
        let responder = loopback("files");
        let result = responder.open().await;
        assert!(matches!(result, Err(ChannelError::NotConnected)));
    }

    #[tokio::test]
    async fn advertise_host_replaces_listener_ip() {
        let responder = TcpProvider::new(TcpProviderConfig {
            listen_address: "127.0.0.1:0".to_string(),
            advertise_host: Some("sync.example".to_string()),
            ..TcpProviderConfig::default()
        });
        let initiator = TcpProvider::new(TcpProviderConfig::default());

        let offer = initiator.create_offer().await.unwrap();
        let answer = responder.create_answer(&offer).await.unwrap();

        let address = answer.0["address"].as_str().unwrap();
        assert!(address.starts_with("sync.example:"));
    }

    #[test]
    fn unspecified_answer_dials_peer_host() {
        assert_eq!(
            dial_address("0.0.0.0:4000", Some("sync.example")),
            "sync.example:4000"
        );
        assert_eq!(dial_address("[::]:4000", Some("10.0.0.5")), "10.0.0.5:4000");
        assert_eq!(dial_address("0.0.0.0:4000", Some("::1")), "[::1]:4000");
        assert_eq!(dial_address("0.0.0.0:4000", None), "0.0.0.0:4000");
    }

    #[test]
    fn specific_answer_ignores_peer_host() {
        assert_eq!(
            dial_address("192.168.1.7:4000", Some("sync.example")),
            "192.168.1.7:4000"
        );
        assert_eq!(
            dial_address("mirror.lan:4000", Some("sync.example")),
            "mirror.lan:4000"
        );
    }

    // ===========================================
    // Integration Tests (Two Providers)
    // ===========================================

    #[tokio::test]
    async fn wildcard_listener_is_reached_through_peer_host() {
        let initiator = TcpProvider::new(TcpProviderConfig {
            channel: "files".to_string(),
            peer_host: Some("127.0.0.1".to_string()),
            ..TcpProviderConfig::default()
        });
        let responder = std::sync::Arc::new(TcpProvider::new(TcpProviderConfig {
            channel: "files".to_string(),
            listen_address: "0.0.0.0:0".to_string(),
            ..TcpProviderConfig::default()
        }));

        let offer = initiator.create_offer().await.unwrap();
        let answer = responder.create_answer(&offer).await.unwrap();
        assert!(answer.0["address"].as_str().unwrap().starts_with("0.0.0.0:"));

        let accepting = {
            let responder = responder.clone();
            tokio::spawn(async move { responder.open().await })
        };
        let local = initiator.complete(&answer).await.unwrap();
        let remote = accepting.await.unwrap().unwrap();

        assert!(local.peer_addr().ip().is_loopback());
        local.send(b"across").await.unwrap();
        assert_eq!(remote.recv().await.unwrap(), b"across");
    }

    #[tokio::test]
    async fn offer_answer_opens_bidirectional_channel() {
        let initiator = loopback("files");
        let responder = std::sync::Arc::new(loopback("files"));

        let offer = initiator.create_offer().await.unwrap();
        let answer = responder.create_answer(&offer).await.unwrap();

        let accepting = {
            let responder = responder.clone();
            tokio::spawn(async move { responder.open().await })
        };
        let local = initiator.complete(&answer).await.unwrap();
        let remote = accepting.await.unwrap().unwrap();

        assert!(local.is_open());
        assert_eq!(remote.label(), "files");

        local.send(b"one").await.unwrap();
        local.send(b"two").await.unwrap();
        assert_eq!(remote.recv().await.unwrap(), b"one");
        assert_eq!(remote.recv().await.unwrap(), b"two");

        remote.send(b"back").await.unwrap();
        assert_eq!(local.recv().await.unwrap(), b"back");

        local.close().await.unwrap();
        assert!(matches!(remote.recv().await, Err(ChannelError::Closed)));
        assert!(!remote.is_open());
    }

    #[tokio::test]
    async fn stray_connection_is_rejected() {
        let initiator = loopback("files");
        let responder = std::sync::Arc::new(loopback("files"));

        let offer = initiator.create_offer().await.unwrap();
        let answer = responder.create_answer(&offer).await.unwrap();
        let address = answer.0["address"].as_str().unwrap().to_string();

        let accepting = {
            let responder = responder.clone();
            tokio::spawn(async move { responder.open().await })
        };

        // Intruder presents the wrong token first
        let mut intruder = TcpStream::connect(&address).await.unwrap();
        write_frame(&mut intruder, b"not-the-session").await.unwrap();

        let local = initiator.complete(&answer).await.unwrap();
        let remote = accepting.await.unwrap().unwrap();

        local.send(b"hello").await.unwrap();
        assert_eq!(remote.recv().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn silent_connection_does_not_block_open() {
        let initiator = loopback("files");
        let responder = std::sync::Arc::new(TcpProvider::new(TcpProviderConfig {
            channel: "files".to_string(),
            listen_address: "127.0.0.1:0".to_string(),
            connect_timeout: Duration::from_millis(200),
            ..TcpProviderConfig::default()
        }));

        let offer = initiator.create_offer().await.unwrap();
        let answer = responder.create_answer(&offer).await.unwrap();
        let address = answer.0["address"].as_str().unwrap().to_string();

        // Connects first and never sends anything
        let _silent = TcpStream::connect(&address).await.unwrap();

        let accepting = {
            let responder = responder.clone();
            tokio::spawn(async move { responder.open().await })
        };
        let local = initiator.complete(&answer).await.unwrap();

        let remote = tokio::time::timeout(Duration::from_secs(5), accepting)
            .await
            .expect("open() stayed blocked on the silent connection")
            .unwrap()
            .unwrap();

        local.send(b"hello").await.unwrap();
        assert_eq!(remote.recv().await.unwrap(), b"hello");
    }
}
