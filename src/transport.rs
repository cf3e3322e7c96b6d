//! The message-channel collaborator seam.
//!
//! The crate never opens sockets itself: the host injects an implementation
//! of [`MessageChannel`] (a websocket bridge, a dev-server plugin pipe, an
//! in-process loop for tests) and the relay controller drives it through
//! this trait.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors surfaced by a message channel implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("channel closed")]
    Closed,
}

/// A bidirectional, channel-addressed message pipe to the inspector.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Establish the connection. May take unbounded time; never called on
    /// the dispatch path.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Fire one payload at a named channel.
    async fn send_message(&self, channel: &str, payload: String) -> Result<(), TransportError>;

    /// Subscribe to inbound payloads on a named channel. Dropping the
    /// returned receiver (or closing the transport) ends the subscription.
    fn add_message_listener(&self, channel: &str) -> mpsc::UnboundedReceiver<String>;

    /// Tear the connection down. Must be idempotent.
    async fn close(&self) -> Result<(), TransportError>;
}

pub mod mock {
    //! In-process mock channel for deterministic tests.
    //!
    //! Captures every outbound send and lets tests inject inbound payloads,
    //! without any real I/O. Hosts can use it to test their own inspector
    //! wiring too.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::{MessageChannel, TransportError};

    /// Mock message channel.
    #[derive(Default)]
    pub struct MockChannel {
        fail_connect: Option<String>,
        sent: Arc<Mutex<Vec<(String, String)>>>,
        listeners: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<String>>>>,
        connected: Arc<Mutex<bool>>,
        close_count: Arc<AtomicUsize>,
    }

    impl MockChannel {
        pub fn new() -> Self {
            Self::default()
        }

        /// A channel whose `connect` always fails with the given message.
        pub fn failing_with(message: impl Into<String>) -> Self {
            Self {
                fail_connect: Some(message.into()),
                ..Self::default()
            }
        }

        /// Every `(channel, payload)` pair sent so far.
        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().clone()
        }

        /// Payloads sent on one channel.
        pub fn sent_on(&self, channel: &str) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .filter(|(c, _)| c == channel)
                .map(|(_, p)| p.clone())
                .collect()
        }

        /// Deliver an inbound payload to the listener on `channel`.
        /// Returns false when nothing is listening.
        pub fn push(&self, channel: &str, payload: impl Into<String>) -> bool {
            let listeners = self.listeners.lock();
            match listeners.get(channel) {
                Some(tx) => tx.send(payload.into()).is_ok(),
                None => false,
            }
        }

        /// Drop all listeners, as a transport would on losing its peer.
        pub fn drop_listeners(&self) {
            self.listeners.lock().clear();
        }

        pub fn is_connected(&self) -> bool {
            *self.connected.lock()
        }

        pub fn close_count(&self) -> usize {
            self.close_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageChannel for MockChannel {
        async fn connect(&self) -> Result<(), TransportError> {
            if let Some(message) = &self.fail_connect {
                return Err(TransportError::Connect(message.clone()));
            }
            *self.connected.lock() = true;
            Ok(())
        }

        async fn send_message(&self, channel: &str, payload: String) -> Result<(), TransportError> {
            if !*self.connected.lock() {
                return Err(TransportError::Closed);
            }
            self.sent.lock().push((channel.to_string(), payload));
            Ok(())
        }

        fn add_message_listener(&self, channel: &str) -> mpsc::UnboundedReceiver<String> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.listeners.lock().insert(channel.to_string(), tx);
            rx
        }

        async fn close(&self) -> Result<(), TransportError> {
            *self.connected.lock() = false;
            self.listeners.lock().clear();
            self.close_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn captures_sends_and_routes_pushes() {
            let channel = MockChannel::new();
            channel.connect().await.unwrap();

            channel
                .send_message("log", "hello".to_string())
                .await
                .unwrap();
            assert_eq!(channel.sent_on("log"), vec!["hello".to_string()]);

            let mut rx = channel.add_message_listener("respond");
            assert!(channel.push("respond", "cmd"));
            assert_eq!(rx.recv().await.unwrap(), "cmd");

            assert!(!channel.push("other", "nope"));
        }

        #[tokio::test]
        async fn send_before_connect_is_refused() {
            let channel = MockChannel::new();
            let err = channel
                .send_message("log", "x".to_string())
                .await
                .unwrap_err();
            assert!(matches!(err, TransportError::Closed));
        }

        #[tokio::test]
        async fn close_is_counted_and_clears_listeners() {
            let channel = MockChannel::new();
            channel.connect().await.unwrap();
            let _rx = channel.add_message_listener("respond");

            channel.close().await.unwrap();
            channel.close().await.unwrap();
            assert_eq!(channel.close_count(), 2);
            assert!(!channel.push("respond", "dropped"));
        }
    }
}
