//! Minimal blocking client.
//!
//! One connection, one request in flight, no reconnection and no discovery:
//! connect, frame the encoded request, block until the framed response
//! arrives (or the read timeout fires).  Suitable for scripts and tests; the
//! hardened [`RpcClient`](crate::client::RpcClient) is the production path.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use rpclink_core::{decode_result, encode_request, InvokeRequest, InvokeResult, WireError};

/// Frames larger than this are rejected as corrupt.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors from the blocking client.
#[derive(Debug, Error)]
pub enum SimpleError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

/// Blocking single-connection client.
pub struct SimpleClient {
    stream: TcpStream,
    peer: SocketAddr,
}

impl SimpleClient {
    /// Connects and applies the read timeout (`None` blocks forever).
    pub fn connect(addr: SocketAddr, read_timeout: Option<Duration>) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(read_timeout)?;
        let peer = stream.peer_addr()?;
        debug!("simple client connected to {peer}");
        Ok(Self { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one request and blocks for its response.
    pub fn invoke(&mut self, request: &InvokeRequest) -> Result<InvokeResult, SimpleError> {
        let doc = encode_request(request)?;
        write_frame(&mut self.stream, doc.as_bytes())?;
        let payload = read_frame(&mut self.stream)?;
        let text = std::str::from_utf8(&payload).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("non-UTF-8 response: {e}"))
        })?;
        Ok(decode_result(text)?)
    }
}

fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
