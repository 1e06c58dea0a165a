//! Length-prefixed framing for TCP streams.
//!
//! Each frame is a 4-byte big-endian payload length followed by the payload
//! bytes.  The reference protocol this system interoperates with had no
//! framing at all and assumed one transport read yields exactly one message,
//! which breaks as soon as a message spans TCP segments or two messages
//! coalesce into one read.  This layer is the deliberate fix for that gap;
//! the document encoding above it is unchanged.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame's payload.  Anything larger is treated as a
/// corrupt prefix rather than an allocation request.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Default receive buffer capacity when the OS buffer size is unknown.
pub const DEFAULT_RECV_BUFFER: usize = 8192;

/// Sizes a connection's reusable receive buffer:
/// `min(max(socket_rcvbuf, 2048), 8192)`, or a fixed 8 KiB when the OS
/// value is unavailable.
pub fn recv_buffer_capacity(socket_rcvbuf: Option<usize>) -> usize {
    match socket_rcvbuf {
        Some(n) => n.clamp(2048, DEFAULT_RECV_BUFFER),
        None => DEFAULT_RECV_BUFFER,
    }
}

/// Writes one frame: length prefix then payload.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds maximum", payload.len()),
        ));
    }
    let len = (payload.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Reads one frame into `buf`, reusing its allocation across calls.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary (the
/// graceful-disconnect signal).  An EOF in the middle of a frame, a corrupt
/// length prefix, or any other I/O problem is an error.
pub async fn read_frame_into<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<usize>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    if reader.read(&mut prefix[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut prefix[1..]).await?;

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds maximum"),
        ));
    }

    buf.resize(len, 0);
    reader.read_exact(buf).await?;
    Ok(Some(len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recv_buffer_capacity_clamps_to_range() {
        assert_eq!(recv_buffer_capacity(Some(512)), 2048);
        assert_eq!(recv_buffer_capacity(Some(4096)), 4096);
        assert_eq!(recv_buffer_capacity(Some(1 << 20)), 8192);
        assert_eq!(recv_buffer_capacity(None), 8192);
    }

    #[tokio::test]
    async fn test_write_then_read_round_trips_one_frame() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, b"hello").await.unwrap();

        let mut buf = Vec::new();
        let n = read_frame_into(&mut server, &mut buf).await.unwrap();
        assert_eq!(n, Some(5));
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_two_frames_are_separated_even_when_coalesced() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, b"first").await.unwrap();
        write_frame(&mut client, b"second message").await.unwrap();

        let mut buf = Vec::new();
        read_frame_into(&mut server, &mut buf).await.unwrap();
        assert_eq!(&buf, b"first");
        read_frame_into(&mut server, &mut buf).await.unwrap();
        assert_eq!(&buf, b"second message");
    }

    #[tokio::test]
    async fn test_empty_frame_round_trips() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, b"").await.unwrap();
        let mut buf = vec![0xAA; 8];
        let n = read_frame_into(&mut server, &mut buf).await.unwrap();
        assert_eq!(n, Some(0));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_clean_eof_at_boundary_returns_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let mut buf = Vec::new();
        assert_eq!(read_frame_into(&mut server, &mut buf).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_eof_inside_frame_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        // Prefix promises 100 bytes, stream delivers none.
        tokio::io::AsyncWriteExt::write_all(&mut client, &100u32.to_be_bytes())
            .await
            .unwrap();
        drop(client);
        let mut buf = Vec::new();
        assert!(read_frame_into(&mut server, &mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut client, &u32::MAX.to_be_bytes())
            .await
            .unwrap();
        let mut buf = Vec::new();
        let err = read_frame_into(&mut server, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
