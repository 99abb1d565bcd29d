//! Transport abstraction for the sync protocol.
//!
//! A transport is connection-scoped: one value speaks to exactly one
//! peer. Message delivery is ordered and at-most-once; serialization is
//! the transport's business (the in-memory pair skips it entirely).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::messages::SyncMessage;

/// A duplex message channel to a single peer.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message to the peer.
    async fn send(&self, message: SyncMessage) -> Result<()>;

    /// Receive the next message.
    ///
    /// Returns `Ok(None)` if the timeout expires first. A dropped
    /// connection is `PeerUnreachable`.
    async fn recv_timeout(&self, timeout: Duration) -> Result<Option<SyncMessage>>;

    /// Close the connection. Subsequent sends on either end fail.
    async fn close(&self);
}

/// Channel-backed in-process transport, for tests and local replicas.
pub mod memory {
    use super::*;
    use tokio::sync::{mpsc, Mutex};

    use crate::error::SyncError;

    /// One end of an in-memory duplex link.
    pub struct MemoryTransport {
        tx: Mutex<Option<mpsc::UnboundedSender<SyncMessage>>>,
        rx: Mutex<mpsc::UnboundedReceiver<SyncMessage>>,
    }

    /// Create a connected pair of in-memory transports.
    ///
    /// Channels are unbounded, so a send never waits on the reader.
    pub fn duplex_pair() -> (MemoryTransport, MemoryTransport) {
        let (tx_ab, rx_ab) = mpsc::unbounded_channel();
        let (tx_ba, rx_ba) = mpsc::unbounded_channel();

        let a = MemoryTransport {
            tx: Mutex::new(Some(tx_ab)),
            rx: Mutex::new(rx_ba),
        };
        let b = MemoryTransport {
            tx: Mutex::new(Some(tx_ba)),
            rx: Mutex::new(rx_ab),
        };
        (a, b)
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, message: SyncMessage) -> Result<()> {
            let tx = self.tx.lock().await;
            match tx.as_ref() {
                Some(tx) => tx
                    .send(message)
                    .map_err(|_| SyncError::PeerUnreachable("peer end dropped".into())),
                None => Err(SyncError::PeerUnreachable("connection closed".into())),
            }
        }

        async fn recv_timeout(&self, timeout: Duration) -> Result<Option<SyncMessage>> {
            let mut rx = self.rx.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(message)) => Ok(Some(message)),
                Ok(None) => Err(SyncError::PeerUnreachable("peer end dropped".into())),
                Err(_) => Ok(None),
            }
        }

        async fn close(&self) {
            self.tx.lock().await.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::duplex_pair;
    use super::*;
    use crate::error::SyncError;
    use crate::messages::PROTOCOL_VERSION;
    use basin_core::ReplicaId;

    fn hello(b: u8) -> SyncMessage {
        SyncMessage::Hello {
            replica_id: ReplicaId::from_bytes([b; 16]),
            protocol_version: PROTOCOL_VERSION,
            collections: vec![],
        }
    }

    #[tokio::test]
    async fn test_duplex_send_recv() {
        let (a, b) = duplex_pair();

        a.send(hello(1)).await.unwrap();
        b.send(hello(2)).await.unwrap();

        let from_a = b.recv_timeout(Duration::from_secs(1)).await.unwrap();
        let from_b = a.recv_timeout(Duration::from_secs(1)).await.unwrap();

        match from_a {
            Some(SyncMessage::Hello { replica_id, .. }) => {
                assert_eq!(replica_id, ReplicaId::from_bytes([1; 16]));
            }
            other => panic!("expected Hello, got {:?}", other),
        }
        assert!(from_b.is_some());
    }

    #[tokio::test]
    async fn test_recv_timeout_returns_none() {
        let (a, _b) = duplex_pair();
        let got = a.recv_timeout(Duration::from_millis(10)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_send_after_peer_drop_fails() {
        let (a, b) = duplex_pair();
        drop(b);
        let err = a.send(hello(1)).await.unwrap_err();
        assert!(matches!(err, SyncError::PeerUnreachable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_close_stops_sends() {
        let (a, _b) = duplex_pair();
        a.close().await;
        assert!(a.send(hello(1)).await.is_err());
    }
}
