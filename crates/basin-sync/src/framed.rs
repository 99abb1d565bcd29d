//! Length-prefixed CBOR framing over a duplex byte stream.
//!
//! Frame layout: 4-byte big-endian length, then that many bytes of CBOR.
//! Works over any `AsyncRead + AsyncWrite` stream (TCP, Unix socket,
//! `tokio::io::duplex` in tests).

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::error::{Result, SyncError};
use crate::messages::{limits, SyncMessage};
use crate::transport::Transport;

/// A [`Transport`] that frames CBOR messages over a byte stream.
///
/// A timed-out `recv_timeout` may abandon a partially read frame, so a
/// timeout poisons the connection; callers treat it as retryable and
/// reconnect rather than continuing on the same stream.
pub struct FramedTransport<T> {
    reader: Mutex<ReadHalf<T>>,
    writer: Mutex<Option<WriteHalf<T>>>,
}

impl<T: AsyncRead + AsyncWrite + Send> FramedTransport<T> {
    pub fn new(stream: T) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(writer)),
        }
    }
}

fn encode(message: &SyncMessage) -> Result<Vec<u8>> {
    message
        .validate_limits()
        .map_err(|e| SyncError::InvalidMessage(e.to_string()))?;

    let mut body = Vec::new();
    ciborium::into_writer(message, &mut body)
        .map_err(|e| SyncError::InvalidMessage(format!("encode failed: {}", e)))?;

    if body.len() > limits::MAX_MESSAGE_BYTES {
        return Err(SyncError::InvalidMessage(format!(
            "message of {} bytes exceeds frame limit",
            body.len()
        )));
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

fn decode(body: &[u8]) -> Result<SyncMessage> {
    let message: SyncMessage = ciborium::from_reader(body)
        .map_err(|e| SyncError::InvalidMessage(format!("decode failed: {}", e)))?;
    message
        .validate_limits()
        .map_err(|e| SyncError::InvalidMessage(e.to_string()))?;
    Ok(message)
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Send + 'static> Transport for FramedTransport<T> {
    async fn send(&self, message: SyncMessage) -> Result<()> {
        let frame = encode(&message)?;
        let mut writer = self.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| SyncError::PeerUnreachable("connection closed".into()))?;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| SyncError::PeerUnreachable(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| SyncError::PeerUnreachable(e.to_string()))?;
        Ok(())
    }

    async fn recv_timeout(&self, timeout: Duration) -> Result<Option<SyncMessage>> {
        let mut reader = self.reader.lock().await;

        let read_frame = async {
            let mut len_buf = [0u8; 4];
            reader
                .read_exact(&mut len_buf)
                .await
                .map_err(|e| SyncError::PeerUnreachable(e.to_string()))?;

            let len = u32::from_be_bytes(len_buf) as usize;
            if len > limits::MAX_MESSAGE_BYTES {
                return Err(SyncError::InvalidMessage(format!(
                    "frame of {} bytes exceeds limit",
                    len
                )));
            }

            let mut body = vec![0u8; len];
            reader
                .read_exact(&mut body)
                .await
                .map_err(|e| SyncError::PeerUnreachable(e.to_string()))?;
            decode(&body)
        };

        match tokio::time::timeout(timeout, read_frame).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Some(mut w) = writer.take() {
            let _ = w.shutdown().await;
        }
    }
}
