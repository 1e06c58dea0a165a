//! Connectionless UDP transport.
//!
//! UDP has no connections, so "clients" are tracked as a deduplicated set of
//! endpoints observed on send or receive.  The first datagram exchanged with
//! a new endpoint fires a synthetic `Connected` event for it.  No teardown
//! signal exists; peers age only through data we choose to stop sending.
//!
//! Datagrams are self-delimiting and carried without the TCP length prefix.
//! The same type serves both roles: bind a known port to act as a server,
//! bind port 0 (optionally with broadcast enabled) to act as a client.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::{NetError, TransportEvent};

const DATAGRAM_BUFFER: usize = 8192;

/// Symmetric UDP transport endpoint.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    peers: Arc<Mutex<HashSet<SocketAddr>>>,
    event_tx: mpsc::Sender<TransportEvent>,
    shutdown: Arc<Notify>,
}

impl UdpTransport {
    /// Binds the socket and starts the receive loop.
    ///
    /// `broadcast` enables `SO_BROADCAST` so discovery requests can be sent
    /// to the LAN broadcast address.
    pub async fn bind(
        addr: SocketAddr,
        broadcast: bool,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), NetError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| NetError::BindFailed { addr, source })?;
        if broadcast {
            socket
                .set_broadcast(true)
                .map_err(|source| NetError::BindFailed { addr, source })?;
        }
        let local_addr = socket
            .local_addr()
            .map_err(|source| NetError::BindFailed { addr, source })?;

        let socket = Arc::new(socket);
        let peers: Arc<Mutex<HashSet<SocketAddr>>> = Arc::new(Mutex::new(HashSet::new()));
        let (event_tx, event_rx) = mpsc::channel(128);
        let shutdown = Arc::new(Notify::new());

        let transport = Self {
            socket: Arc::clone(&socket),
            local_addr,
            peers: Arc::clone(&peers),
            event_tx: event_tx.clone(),
            shutdown: Arc::clone(&shutdown),
        };

        tokio::spawn(recv_loop(socket, peers, event_tx, Arc::clone(&shutdown)));
        info!("udp transport bound on {local_addr}");
        Ok((transport, event_rx))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends one datagram.  Fire-and-forget; failures also surface as a
    /// `Fault` event.  A first successful send to a new endpoint records it
    /// as a peer and fires the synthetic `Connected` event.
    pub async fn send_to(&self, peer: SocketAddr, payload: &[u8]) -> bool {
        match self.socket.send_to(payload, peer).await {
            Ok(_) => {
                if self.peers.lock().await.insert(peer) {
                    let _ = self.event_tx.send(TransportEvent::Connected { peer }).await;
                }
                true
            }
            Err(e) => {
                warn!("udp send to {peer} failed: {e}");
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

    /// Endpoints observed so far, in no particular order.
    pub async fn peers(&self) -> Vec<SocketAddr> {
        self.peers.lock().await.iter().copied().collect()
    }

    /// Stops the receive loop.
    pub fn close(&self) {
        self.shutdown.notify_waiters();
    }
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    peers: Arc<Mutex<HashSet<SocketAddr>>>,
    event_tx: mpsc::Sender<TransportEvent>,
    shutdown: Arc<Notify>,
) {
    let mut buf = vec![0u8; DATAGRAM_BUFFER];
    loop {
        let (len, peer) = tokio::select! {
            _ = shutdown.notified() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("udp recv error: {e}");
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

        if peers.lock().await.insert(peer) {
            debug!("new udp peer {peer}");
            if event_tx
                .send(TransportEvent::Connected { peer })
                .await
                .is_err()
            {
                break;
            }
        }

        let event = TransportEvent::Data {
            peer,
            bytes: buf[..len].to_vec(),
        };
        if event_tx.send(event).await.is_err() {
            break;
        }
    }
    info!("udp receive loop stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
