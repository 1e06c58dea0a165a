//! UDP discovery responder.
//!
//! Listens on a well-known port for `DISCOVER:<name>` datagrams and answers
//! ones naming this server with `SERVER_INFO:<host>,<port>`.  Requests
//! naming another server are ignored so multiple servers can share a LAN
//! segment.
//!
//! Runs on a dedicated blocking thread with a short receive timeout so a
//! stop request is observed within one poll interval.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use rpclink_core::protocol::discovery::{format_server_info, parse_discover};
use rpclink_net::NetError;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Running discovery responder; stops when dropped or on [`stop`].
///
/// [`stop`]: DiscoveryResponder::stop
pub struct DiscoveryResponder {
    local_port: u16,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DiscoveryResponder {
    /// Binds the discovery port and starts answering.
    ///
    /// `advertise` is the `host,port` pair written into replies; the host
    /// part must be an address clients can reach, not `0.0.0.0`.
    pub fn start(
        name: &str,
        discovery_port: u16,
        advertise: SocketAddr,
    ) -> Result<Self, NetError> {
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, discovery_port));
        let socket = UdpSocket::bind(bind_addr).map_err(|source| NetError::BindFailed {
            addr: bind_addr,
            source,
        })?;
        socket
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(|source| NetError::BindFailed {
                addr: bind_addr,
                source,
            })?;
        let local_port = socket
            .local_addr()
            .map_err(|source| NetError::BindFailed {
                addr: bind_addr,
                source,
            })?
            .port();

        let running = Arc::new(AtomicBool::new(true));
        let name = name.to_string();
        let thread = std::thread::Builder::new()
            .name("rpclink-discovery".to_string())
            .spawn({
                let running = Arc::clone(&running);
                move || respond_loop(&socket, &name, advertise, &running)
            })
            .map_err(|source| NetError::BindFailed {
                addr: bind_addr,
                source,
            })?;

        info!("discovery responder on port {local_port}, advertising {advertise}");
        Ok(Self {
            local_port,
            running,
            thread: Some(thread),
        })
    }

    /// The port actually bound (useful with port 0 in tests).
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Signals the responder thread to exit and waits for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DiscoveryResponder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn respond_loop(socket: &UdpSocket, name: &str, advertise: SocketAddr, running: &AtomicBool) {
    let reply = format_server_info(advertise);
    let mut buf = [0u8; 512];
    while running.load(Ordering::Relaxed) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                warn!("discovery recv error: {e}");
                continue;
            }
        };

        let Ok(text) = std::str::from_utf8(&buf[..len]) else {
            debug!("ignoring non-UTF-8 discovery datagram from {peer}");
            continue;
        };
        let Some(requested) = parse_discover(text) else {
            debug!("ignoring unrecognized discovery datagram from {peer}: {text:?}");
            continue;
        };
        if requested != name {
            debug!("discovery request for {requested:?}, not us");
            continue;
        }

        debug!("answering discovery from {peer}");
        if let Err(e) = socket.send_to(reply.as_bytes(), peer) {
            warn!("discovery reply to {peer} failed: {e}");
        }
    }
    debug!("discovery responder stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
