//! Mock channel for testing.
//!
//! Allows queueing inbound frames and capturing sent frames for verification.

use super::{ChannelError, PeerChannel};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock peer channel for testing.
///
/// Starts open. Clones share state, so a test can keep one handle while the
/// engine under test owns another.
#[derive(Debug)]
pub struct MockChannel {
    inner: Arc<Mutex<MockChannelInner>>,
}

#[derive(Debug)]
struct MockChannelInner {
    open: bool,
    sent_frames: Vec<Vec<u8>>,
    receive_queue: VecDeque<Vec<u8>>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

impl Default for MockChannelInner {
    fn default() -> Self {
        Self {
            open: true,
            sent_frames: Vec::new(),
            receive_queue: VecDeque::new(),
            fail_next_send: None,
            fail_next_recv: None,
        }
    }
}

impl MockChannel {
    /// Create a new, open mock channel.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockChannelInner::default())),
        }
    }

    /// Queue a frame to be returned by the next `recv()` call.
    pub fn queue_frame(&self, data: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.receive_queue.push_back(data);
    }

    /// Get all frames that were sent.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.sent_frames.clone()
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_recv = Some(error.to_string());
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockChannel {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl PeerChannel for MockChannel {
    fn label(&self) -> &str {
        "mock"
    }

    async fn send(&self, data: &[u8]) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.open {
            return Err(ChannelError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(ChannelError::SendFailed(error));
        }

        inner.sent_frames.push(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.open {
            return Err(ChannelError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_recv.take() {
            return Err(ChannelError::ReceiveFailed(error));
        }

        inner
            .receive_queue
            .pop_front()
            .ok_or(ChannelError::Closed)
    }

    fn is_open(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.open
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        inner.open = false;
        Ok(())
    }
}
