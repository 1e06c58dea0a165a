//! Framed TCP client transport.
//!
//! Owns one connection: a background read loop turns inbound frames into
//! `Data` events, and a liveness flag tracks whether the stream is still
//! usable.  A half-open socket (remote closed, nothing left to read) is
//! observed by the read loop as EOF and flips the flag, so `is_alive()`
//! never reports a dead connection as healthy.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::framing::{self, DEFAULT_RECV_BUFFER};
use crate::{NetError, TransportEvent};

/// Connecting side of the framed TCP transport.
pub struct TcpClient {
    peer: SocketAddr,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    alive: Arc<AtomicBool>,
    event_tx: mpsc::Sender<TransportEvent>,
}

impl TcpClient {
    /// Connects and starts the background read loop.
    pub async fn connect(
        addr: SocketAddr,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), NetError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| NetError::ConnectFailed { addr, source })?;
        let peer = stream
            .peer_addr()
            .map_err(|source| NetError::ConnectFailed { addr, source })?;

        let (event_tx, event_rx) = mpsc::channel(128);
        let (mut reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(Some(writer)));
        let alive = Arc::new(AtomicBool::new(true));

        let client = Self {
            peer,
            writer: Arc::clone(&writer),
            alive: Arc::clone(&alive),
            event_tx: event_tx.clone(),
        };

        tokio::spawn(async move {
            let _ = event_tx.send(TransportEvent::Connected { peer }).await;

            // Clients use the fixed 8 KiB receive buffer.
            let mut buf = Vec::with_capacity(DEFAULT_RECV_BUFFER);
            loop {
                match framing::read_frame_into(&mut reader, &mut buf).await {
                    Ok(Some(_)) => {
                        let event = TransportEvent::Data {
                            peer,
                            bytes: buf.clone(),
                        };
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("server {peer} closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!("read error from {peer}: {e}");
                        let _ = event_tx
                            .send(TransportEvent::Fault {
                                peer: Some(peer),
                                error: e.to_string(),
                            })
                            .await;
                        break;
                    }
                }
            }

            alive.store(false, Ordering::Relaxed);
            *writer.lock().await = None;
            let _ = event_tx.send(TransportEvent::Disconnected { peer }).await;
        });

        Ok((client, event_rx))
    }

    /// The remote address of this connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the connection is still usable.  Half-open sockets are not
    /// considered alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Sends one framed payload.  Fire-and-forget; write failures also
    /// surface as a `Fault` event.
    pub async fn send(&self, payload: &[u8]) -> bool {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return false;
        };
        match framing::write_frame(writer, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!("write to {} failed: {e}", self.peer);
                self.alive.store(false, Ordering::Relaxed);
                *guard = None;
                let _ = self
                    .event_tx
                    .send(TransportEvent::Fault {
                        peer: Some(self.peer),
                        error: e.to_string(),
                    })
                    .await;
                false
            }
        }
    }

    /// Closes the write side; the read loop then winds down on EOF.
    pub async fn close(&self) {
        self.alive.store(false, Ordering::Relaxed);
        *self.writer.lock().await = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp_server::TcpServer;

    #[tokio::test]
    async fn test_connect_to_refused_port_is_an_error() {
        // Port 1 on loopback is essentially never listening.
        let result = TcpClient::connect("127.0.0.1:1".parse().unwrap()).await;
        assert!(matches!(result, Err(NetError::ConnectFailed { .. })));
    }

    #[tokio::test]
    async fn test_client_and_server_exchange_frames() {
        let (server, mut server_rx) = TcpServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let (client, mut client_rx) = TcpClient::connect(server.local_addr()).await.unwrap();

        assert!(matches!(
            client_rx.recv().await,
            Some(TransportEvent::Connected { .. })
        ));
        let peer = match server_rx.recv().await {
            Some(TransportEvent::Connected { peer }) => peer,
            other => panic!("expected Connected, got {other:?}"),
        };

        assert!(client.send(b"request").await);
        match server_rx.recv().await {
            Some(TransportEvent::Data { bytes, .. }) => assert_eq!(bytes, b"request"),
            other => panic!("expected Data, got {other:?}"),
        }

        assert!(server.send_to(peer, b"reply").await);
        match client_rx.recv().await {
            Some(TransportEvent::Data { bytes, .. }) => assert_eq!(bytes, b"reply"),
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_is_alive_goes_false_after_server_closes() {
        let (server, mut server_rx) = TcpServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let (client, mut client_rx) = TcpClient::connect(server.local_addr()).await.unwrap();
        assert!(client.is_alive());

        // Drop the server side of the connection.
        let _ = server_rx.recv().await; // Connected
        server.close().await;

        // Wait for the client read loop to observe the EOF.
        loop {
            match client_rx.recv().await {
                Some(TransportEvent::Disconnected { .. }) | None => break,
                _ => continue,
            }
        }
        assert!(!client.is_alive());
    }

    #[tokio::test]
    async fn test_send_after_close_returns_false() {
        let (server, _server_rx) = TcpServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let (client, _client_rx) = TcpClient::connect(server.local_addr()).await.unwrap();
        client.close().await;
        assert!(!client.send(b"too late").await);
    }
}
