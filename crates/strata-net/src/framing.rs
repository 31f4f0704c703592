//! Length-prefixed framing for TCP streams.
//!
//! ```text
//! +-------------------+----------------------+
//! | length (4 bytes)  |   payload            |
//! | u32 little-endian |   UTF-8 JSON message |
//! +-------------------+----------------------+
//! ```
//!
//! The length does not include the prefix itself. A zero-length frame is a
//! keepalive and carries no message.

use strata_config::ServerConfig;
use strata_protocol::{CodecError, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Limits applied to every frame.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum allowed payload size in bytes.
    pub max_payload_size: u32,
}

impl FrameConfig {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_payload_size: config.max_frame_bytes,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: u64, max: u32 },

    /// The peer closed the stream, possibly mid-frame.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn map_eof(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read one frame and return its payload.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(map_eof)?;

    let len = u32::from_le_bytes(len_buf);
    if len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: u64::from(len),
            max: config.max_payload_size,
        });
    }

    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        reader.read_exact(&mut payload).await.map_err(map_eof)?;
    }
    Ok(payload)
}

/// Write one frame and flush it.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= config.max_payload_size)
        .ok_or(FrameError::PayloadTooLarge {
            size: payload.len() as u64,
            max: config.max_payload_size,
        })?;

    writer.write_all(&len.to_le_bytes()).await?;
    if len > 0 {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Decode a frame payload into a message.
///
/// The error string is what gets reported back to the peer.
pub fn decode_payload(payload: &[u8]) -> Result<Message, String> {
    let text = std::str::from_utf8(payload).map_err(|e| format!("invalid UTF-8: {e}"))?;
    strata_protocol::decode(text).map_err(|e: CodecError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_protocol::{Ping, encode};
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_message_survives_framing() {
        let (mut client, mut server) = duplex(8192);
        let config = FrameConfig::default();
        let msg = Message::Ping(Ping { client_time: 12.5 });

        write_frame(&mut client, encode(&msg).unwrap().as_bytes(), &config)
            .await
            .unwrap();
        let payload = read_frame(&mut server, &config).await.unwrap();
        assert_eq!(decode_payload(&payload).unwrap(), msg);
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (mut client, mut server) = duplex(8192);
        let config = FrameConfig::default();
        for payload in [&b"first"[..], b"", b"third"] {
            write_frame(&mut client, payload, &config).await.unwrap();
        }
        assert_eq!(read_frame(&mut server, &config).await.unwrap(), b"first");
        assert!(read_frame(&mut server, &config).await.unwrap().is_empty());
        assert_eq!(read_frame(&mut server, &config).await.unwrap(), b"third");
    }

    #[tokio::test]
    async fn test_small_buffer_forces_partial_reads() {
        let (mut client, mut server) = duplex(8);
        let config = FrameConfig::default();
        let payload = b"this payload is larger than the duplex buffer";

        let write_config = config.clone();
        let writer = tokio::spawn(async move {
            write_frame(&mut client, payload, &write_config).await.unwrap();
        });
        let received = read_frame(&mut server, &config).await.unwrap();
        writer.await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn test_oversized_frames_rejected() {
        let config = FrameConfig {
            max_payload_size: 16,
        };

        let (mut client, mut server) = duplex(8192);
        client.write_all(&1024u32.to_le_bytes()).await.unwrap();
        client.flush().await.unwrap();
        assert!(matches!(
            read_frame(&mut server, &config).await,
            Err(FrameError::PayloadTooLarge { size: 1024, max: 16 })
        ));

        let (mut client, _server) = duplex(8192);
        assert!(matches!(
            write_frame(&mut client, &[0u8; 17], &config).await,
            Err(FrameError::PayloadTooLarge { size: 17, .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_closed() {
        let (mut client, mut server) = duplex(8192);
        client.write_all(&10u32.to_le_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);
        assert!(matches!(
            read_frame(&mut server, &FrameConfig::default()).await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_length_prefix_is_little_endian() {
        let (mut client, mut server) = duplex(8192);
        write_frame(&mut client, b"abcde", &FrameConfig::default())
            .await
            .unwrap();
        let mut prefix = [0u8; 4];
        server.read_exact(&mut prefix).await.unwrap();
        assert_eq!(prefix, [5, 0, 0, 0]);
    }

    #[test]
    fn test_decode_payload_reports_bad_input() {
        assert!(decode_payload(&[0xFF, 0xFE]).unwrap_err().contains("UTF-8"));
        assert!(decode_payload(b"{\"type\": 9999}").is_err());
        assert!(decode_payload(b"[1, 2]").is_err());
    }
}
