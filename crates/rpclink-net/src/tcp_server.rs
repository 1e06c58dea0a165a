//! Framed TCP server transport: one accept loop, one read loop per
//! accepted connection.
//!
//! Each connection owns a reusable receive buffer sized by
//! [`framing::recv_buffer_capacity`].  A frame-boundary EOF is a graceful
//! disconnect; a read error is a disconnect plus a `Fault` event.  Write
//! halves live in a registry keyed by peer address so responses can be sent
//! from outside the read loop.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::framing::{self, recv_buffer_capacity};
use crate::{NetError, TransportEvent};

// Each write half carries its own lock so a send in progress never holds
// the registry lock; a slow peer only serializes its own writes.
type ConnRegistry = Arc<Mutex<HashMap<SocketAddr, Arc<Mutex<OwnedWriteHalf>>>>>;

/// Accepting side of the framed TCP transport.
pub struct TcpServer {
    local_addr: SocketAddr,
    conns: ConnRegistry,
    event_tx: mpsc::Sender<TransportEvent>,
    shutdown: Arc<Notify>,
}

impl TcpServer {
    /// Binds a listener and starts the accept loop.
    ///
    /// Returns the server handle and the receiver for its
    /// [`TransportEvent`]s.
    pub async fn bind(
        addr: SocketAddr,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), NetError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NetError::BindFailed { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| NetError::BindFailed { addr, source })?;

        let (event_tx, event_rx) = mpsc::channel(128);
        let conns: ConnRegistry = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(Notify::new());

        let server = Self {
            local_addr,
            conns: Arc::clone(&conns),
            event_tx: event_tx.clone(),
            shutdown: Arc::clone(&shutdown),
        };

        tokio::spawn(accept_loop(listener, conns, event_tx, shutdown));
        info!("tcp server listening on {local_addr}");
        Ok((server, event_rx))
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends one framed payload to a connected peer.
    ///
    /// Fire-and-forget: `false` only means no such connection existed or the
    /// write failed; failures additionally surface as a `Fault` event, which
    /// is the authoritative error channel.
    pub async fn send_to(&self, peer: SocketAddr, payload: &[u8]) -> bool {
        let writer = {
            let conns = self.conns.lock().await;
            match conns.get(&peer) {
                Some(writer) => Arc::clone(writer),
                None => {
                    debug!("send_to {peer}: no such connection");
                    return false;
                }
            }
        };

        let mut writer = writer.lock().await;
        match framing::write_frame(&mut *writer, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!("write to {peer} failed: {e}");
                self.conns.lock().await.remove(&peer);
                let _ = self
                    .event_tx
                    .send(TransportEvent::Fault {
                        peer: Some(peer),
                        error: e.to_string(),
                    })
                    .await;
                false
            }
        }
    }

    /// Currently connected peers.
    pub async fn peers(&self) -> Vec<SocketAddr> {
        self.conns.lock().await.keys().copied().collect()
    }

    /// Stops the accept loop and drops all connections.
    pub async fn close(&self) {
        self.shutdown.notify_waiters();
        self.conns.lock().await.clear();
    }
}

async fn accept_loop(
    listener: TcpListener,
    conns: ConnRegistry,
    event_tx: mpsc::Sender<TransportEvent>,
    shutdown: Arc<Notify>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    let _ = event_tx
                        .send(TransportEvent::Fault {
                            peer: None,
                            error: e.to_string(),
                        })
                        .await;
                    continue;
                }
            },
        };

        debug!("accepted connection from {peer}");
        tokio::spawn(connection_loop(
            stream,
            peer,
            Arc::clone(&conns),
            event_tx.clone(),
        ));
    }
    info!("tcp server accept loop stopped");
}

/// Per-connection read loop: registers the write half, forwards frames as
/// `Data` events, and deregisters on disconnect.
async fn connection_loop(
    stream: TcpStream,
    peer: SocketAddr,
    conns: ConnRegistry,
    event_tx: mpsc::Sender<TransportEvent>,
) {
    let (mut reader, writer) = stream.into_split();
    conns.lock().await.insert(peer, Arc::new(Mutex::new(writer)));
    if event_tx
        .send(TransportEvent::Connected { peer })
        .await
        .is_err()
    {
        // Receiver dropped; the transport is being torn down.
        conns.lock().await.remove(&peer);
        return;
    }

    let mut buf = Vec::with_capacity(recv_buffer_capacity(None));
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
                debug!("peer {peer} disconnected");
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

    conns.lock().await.remove(&peer);
    let _ = event_tx.send(TransportEvent::Disconnected { peer }).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn bind_local() -> (TcpServer, mpsc::Receiver<TransportEvent>) {
        TcpServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind")
    }

    #[tokio::test]
    async fn test_bind_assigns_a_local_port() {
        let (server, _rx) = bind_local().await;
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_accept_emits_connected_then_data() {
        let (server, mut rx) = bind_local().await;
        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        framing::write_frame(&mut stream, b"ping").await.unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Connected { .. })
        ));
        match rx.recv().await {
            Some(TransportEvent::Data { bytes, .. }) => assert_eq!(bytes, b"ping"),
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clean_shutdown_of_peer_emits_disconnected() {
        let (server, mut rx) = bind_local().await;
        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        stream.shutdown().await.unwrap();
        drop(stream);

        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Connected { .. })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Disconnected { .. })
        ));
        assert!(server.peers().await.is_empty());
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_returns_false() {
        let (server, _rx) = bind_local().await;
        let ghost: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert!(!server.send_to(ghost, b"hello").await);
    }

    #[tokio::test]
    async fn test_slow_peer_does_not_stall_sends_to_others() {
        use std::time::Duration;

        let (server, mut rx) = bind_local().await;
        let server = Arc::new(server);

        // One peer that never reads, one that does.
        let stalled = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut live = TcpStream::connect(server.local_addr()).await.unwrap();
        let stalled_addr = stalled.local_addr().unwrap();
        let live_addr = live.local_addr().unwrap();
        for _ in 0..2 {
            assert!(matches!(
                rx.recv().await,
                Some(TransportEvent::Connected { .. })
            ));
        }

        // Saturate the stalled peer's send window so a write to it blocks.
        let flood = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let chunk = vec![0u8; 1 << 20];
                while server.send_to(stalled_addr, &chunk).await {}
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The blocked write must not hold the registry closed.
        let sent = tokio::time::timeout(
            Duration::from_secs(1),
            server.send_to(live_addr, b"still here"),
        )
        .await
        .expect("send to the live peer stalled behind the slow one");
        assert!(sent);

        let mut buf = Vec::new();
        framing::read_frame_into(&mut live, &mut buf).await.unwrap();
        assert_eq!(&buf, b"still here");

        flood.abort();
        drop(stalled);
    }

    #[tokio::test]
    async fn test_send_to_connected_peer_delivers_frame() {
        let (server, mut rx) = bind_local().await;
        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();

        let peer = match rx.recv().await {
            Some(TransportEvent::Connected { peer }) => peer,
            other => panic!("expected Connected, got {other:?}"),
        };
        assert!(server.send_to(peer, b"response").await);

        let mut buf = Vec::new();
        let n = framing::read_frame_into(&mut stream, &mut buf).await.unwrap();
        assert_eq!(n, Some(8));
        assert_eq!(&buf, b"response");
    }
}
