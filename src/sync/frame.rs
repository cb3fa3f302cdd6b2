// Length-prefixed framing
//
// Each frame is a 4-byte big-endian length followed by that many bytes of
// JSON. The length is bounded to keep a misbehaving peer from forcing a
// huge allocation.

use crate::error::{FlockError, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame payload (1 MB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FlockError::Network(format!(
            "frame too large: {} bytes (max: {} bytes)",
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }
    writer
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .map_err(|e| FlockError::Network(e.to_string()))?;
    writer
        .write_all(payload)
        .await
        .map_err(|e| FlockError::Network(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| FlockError::Network(e.to_string()))?;
    Ok(())
}

/// Read one frame. Returns None on a clean end-of-stream before the length
/// prefix, which is how peers close a finished exchange.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(FlockError::Network(e.to_string())),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FlockError::Network(format!(
            "frame too large: {} bytes (max: {} bytes)",
            len, MAX_FRAME_SIZE
        )));
    }

    let mut buffer = BytesMut::with_capacity(len);
    buffer.resize(len, 0);
    reader
        .read_exact(&mut buffer)
        .await
        .map_err(|e| FlockError::Network(e.to_string()))?;
    Ok(Some(buffer.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_round_trip() {
        let mut cursor = Cursor::new(Vec::new());
        write_frame(&mut cursor, b"{\"action\":\"SERVER_PING\"}")
            .await
            .unwrap();

        let buffer = cursor.into_inner();
        let mut reader = buffer.as_slice();
        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(frame, b"{\"action\":\"SERVER_PING\"}");

        // Stream exhausted: clean end.
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(MAX_FRAME_SIZE as u32 + 1).to_be_bytes());
        let mut reader = buffer.as_slice();
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_payload_is_error() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&8u32.to_be_bytes());
        buffer.extend_from_slice(b"abc");
        let mut reader = buffer.as_slice();
        assert!(read_frame(&mut reader).await.is_err());
    }
}
