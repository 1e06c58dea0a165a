//! Hardened reconnecting client.
//!
//! Holds one connection to the server, reconnecting as needed: every invoke
//! first verifies liveness, reconnects (optionally through UDP discovery)
//! with a retry interval that escalates after repeated failures, and drains
//! any stale frames left over from a previous call that timed out.  A call
//! whose response never arrives, or whose connection drops while waiting,
//! yields a `Timeout` result rather than an error, mirroring the server's
//! own unresolved-call answer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use rpclink_core::{decode_result, encode_request, InvokeRequest, InvokeResult, WireError};
use rpclink_net::{NetError, TcpClient, TransportEvent};

use crate::discovery::discover_server;

/// Where the server lives: a fixed address, or a name resolved through UDP
/// discovery on every (re)connect.
#[derive(Debug, Clone)]
pub enum ServerLocation {
    Addr(SocketAddr),
    Discover {
        name: String,
        /// Discovery datagram target, normally
        /// [`broadcast_target`](crate::discovery::broadcast_target).
        target: SocketAddr,
        /// How long one discovery round may take.
        timeout: Duration,
    },
}

/// Tunables for connection management and response waits.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How long to wait for a response before answering `Timeout`.
    pub read_timeout: Duration,
    /// Delay between reconnect attempts.
    pub reconnect_interval: Duration,
    /// After this many consecutive failures the escalated interval applies.
    pub retry_threshold: u32,
    /// Delay between reconnect attempts once the threshold is crossed.
    pub escalated_interval: Duration,
    /// When `true`, a failed connect is an error instead of a retry loop.
    pub raise_on_failure: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_secs(1),
            retry_threshold: 5,
            escalated_interval: Duration::from_secs(10),
            raise_on_failure: false,
        }
    }
}

/// Errors from the hardened client.  Note that an unanswered call is not an
/// error; it comes back as a `Timeout` result.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("connect failed: {0}")]
    Connect(#[from] NetError),

    #[error("no server answered discovery")]
    ServerNotFound,

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("malformed response: {0}")]
    BadResponse(String),
}

/// Cancels a client's pending and future work from another task.  Aborts
/// in-flight waits and reconnect delays, not just future calls.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
        self.wake.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Resolves when cancelled.  Already-cancelled handles resolve
    /// immediately.
    async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag, so a cancel
            // between the check and the await cannot be missed.
            let notified = self.wake.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

struct Conn {
    transport: TcpClient,
    events: mpsc::Receiver<TransportEvent>,
}

/// Reconnecting RPC client.
pub struct RpcClient {
    location: ServerLocation,
    options: ClientOptions,
    conn: Option<Conn>,
    cancel: CancelHandle,
}

impl RpcClient {
    pub fn new(location: ServerLocation, options: ClientOptions) -> Self {
        Self {
            location,
            options,
            conn: None,
            cancel: CancelHandle::default(),
        }
    }

    /// Handle for cancelling from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Whether a live connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.conn
            .as_ref()
            .map(|c| c.transport.is_alive())
            .unwrap_or(false)
    }

    /// Sends one request and waits for its result, reconnecting first if
    /// needed.
    ///
    /// Transport-level silence (no response within the read timeout, or a
    /// disconnect while waiting) is answered with a `Timeout` result; only
    /// cancellation, unreachable servers under `raise_on_failure`, and codec
    /// failures are `Err`.
    pub async fn invoke(&mut self, request: &InvokeRequest) -> Result<InvokeResult, ClientError> {
        let doc = encode_request(request)?;
        let object_method = request.object_method();

        self.ensure_connected().await?;
        let mut conn = self.conn.take().expect("connected");
        let cancel = self.cancel.clone();

        // Drop frames a previous timed-out call left behind, so this call
        // cannot consume a stale response.
        while let Ok(event) = conn.events.try_recv() {
            if let TransportEvent::Data { .. } = event {
                debug!("discarding stale frame before {object_method}");
            }
        }

        if !conn.transport.send(doc.as_bytes()).await {
            // Connection stays dropped; the next invoke reconnects.
            warn!("send of {object_method} failed; dropping connection");
            return Ok(InvokeResult::timeout(object_method));
        }

        let deadline = Instant::now() + self.options.read_timeout;
        loop {
            let event = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    warn!("{object_method} unanswered after {:?}", self.options.read_timeout);
                    self.conn = Some(conn);
                    return Ok(InvokeResult::timeout(object_method));
                }
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                event = conn.events.recv() => event,
            };
            match event {
                Some(TransportEvent::Data { bytes, .. }) => {
                    let text = std::str::from_utf8(&bytes)
                        .map_err(|e| ClientError::BadResponse(format!("non-UTF-8 frame: {e}")))?;
                    let result = decode_result(text)?;
                    self.conn = Some(conn);
                    return Ok(result);
                }
                Some(TransportEvent::Disconnected { .. }) | None => {
                    warn!("connection lost while waiting for {object_method}");
                    return Ok(InvokeResult::timeout(object_method));
                }
                Some(_) => continue,
            }
        }
    }

    /// Drops the connection; the next invoke reconnects.
    pub async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.transport.close().await;
        }
    }

    async fn ensure_connected(&mut self) -> Result<(), ClientError> {
        if self.is_connected() {
            return Ok(());
        }
        self.conn = None;

        let mut attempts = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            match self.try_connect_once().await {
                Ok(conn) => {
                    info!("connected to {}", conn.transport.peer_addr());
                    self.conn = Some(conn);
                    return Ok(());
                }
                Err(e) if self.options.raise_on_failure => return Err(e),
                Err(e) => {
                    attempts += 1;
                    let delay = if attempts >= self.options.retry_threshold {
                        self.options.escalated_interval
                    } else {
                        self.options.reconnect_interval
                    };
                    warn!("connect attempt {attempts} failed ({e}); retrying in {delay:?}");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                    }
                }
            }
        }
    }

    async fn try_connect_once(&self) -> Result<Conn, ClientError> {
        let addr = match &self.location {
            ServerLocation::Addr(addr) => *addr,
            ServerLocation::Discover {
                name,
                target,
                timeout,
            } => discover_server(name, *target, *timeout)
                .await?
                .ok_or(ClientError::ServerNotFound)?,
        };
        let (transport, events) = TcpClient::connect(addr).await?;
        Ok(Conn { transport, events })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
