//! # rpclink-net
//!
//! Asynchronous TCP/UDP transport primitives with a uniform contract, so the
//! protocol layer above is transport-agnostic:
//!
//! - a constructor binds or connects,
//! - `events()` hands back an `mpsc` receiver of [`TransportEvent`]s
//!   (`Connected`, `Disconnected`, `Data`, `Fault`),
//! - `send`/`send_to` are fire-and-forget and return a `bool`,
//! - `close()` tears the transport down.
//!
//! TCP payloads are framed with a 4-byte big-endian length prefix (see
//! [`framing`]); UDP datagrams are self-delimiting and carried unframed.
//! Write failures surface as `Fault` events in addition to the boolean
//! return, so a caller that ignores return values still observes them.

pub mod framing;
pub mod tcp_client;
pub mod tcp_server;
pub mod udp;

use std::net::SocketAddr;

use thiserror::Error;

pub use tcp_client::TcpClient;
pub use tcp_server::TcpServer;
pub use udp::UdpTransport;

/// Errors raised while establishing a transport.
///
/// Established transports report runtime problems through
/// [`TransportEvent::Fault`] instead, matching the fire-and-forget send
/// contract.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Events delivered by every transport on its event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A TCP connection was established, or a UDP endpoint was observed for
    /// the first time (synthetic connect).
    Connected { peer: SocketAddr },
    /// A TCP connection ended, gracefully or not.  UDP peers never emit
    /// this: with no teardown signal they age only by being ignored.
    Disconnected { peer: SocketAddr },
    /// One complete inbound payload.
    Data { peer: SocketAddr, bytes: Vec<u8> },
    /// A read or write error.  The transport stays usable where possible;
    /// a faulted TCP connection is also reported `Disconnected`.
    Fault {
        peer: Option<SocketAddr>,
        error: String,
    },
}
