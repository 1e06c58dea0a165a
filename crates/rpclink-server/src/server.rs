//! The RPC server: a framed TCP listener feeding the dispatch engine.
//!
//! Requests are handled strictly one at a time, in arrival order: the event
//! loop parses, dispatches, and writes the response for a frame before it
//! takes the next one off the transport.  Together with the single-threaded
//! execution context this means invocation N+1 never starts before the
//! response to invocation N has been written.
//!
//! A frame that fails to parse gets a `Failed` reply and the connection
//! stays open; only transport-level errors tear a connection down.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rpclink_core::{decode_request, encode_result, InvokeResult};
use rpclink_net::{NetError, TcpServer, TransportEvent};

use crate::dispatch::Dispatcher;
use crate::registry::ObjectRegistry;

/// Placeholder `ObjectMethod` used in replies to frames that never parsed
/// far enough to name one.
const UNPARSED: &str = "unknown.unknown";

/// A running RPC server bound to one TCP address.
pub struct RpcServer {
    transport: Arc<TcpServer>,
    dispatcher: Arc<Dispatcher>,
    local_addr: SocketAddr,
    event_task: JoinHandle<()>,
}

impl RpcServer {
    /// Binds the listener and starts the serve loop.
    pub async fn start(addr: SocketAddr, registry: ObjectRegistry) -> Result<Self, NetError> {
        let (transport, event_rx) = TcpServer::bind(addr).await?;
        let transport = Arc::new(transport);
        let local_addr = transport.local_addr();
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));

        let objects: Vec<&String> = dispatcher.registry().object_names().collect();
        info!("rpc server on {local_addr}, objects: {objects:?}");

        let event_task = tokio::spawn(serve_loop(
            event_rx,
            Arc::clone(&transport),
            Arc::clone(&dispatcher),
        ));

        Ok(Self {
            transport,
            dispatcher,
            local_addr,
            event_task,
        })
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Stops accepting, drops all connections, and ends the serve loop.
    pub async fn shutdown(&self) {
        self.transport.close().await;
        self.event_task.abort();
        info!("rpc server on {} stopped", self.local_addr);
    }
}

/// Sequential request loop.  Each `Data` event is fully handled (parse,
/// dispatch, respond) before the next event is received.
async fn serve_loop(
    mut event_rx: mpsc::Receiver<TransportEvent>,
    transport: Arc<TcpServer>,
    dispatcher: Arc<Dispatcher>,
) {
    while let Some(event) = event_rx.recv().await {
        match event {
            TransportEvent::Connected { peer } => {
                info!("client connected: {peer}");
            }
            TransportEvent::Disconnected { peer } => {
                info!("client disconnected: {peer}");
            }
            TransportEvent::Data { peer, bytes } => {
                let result = handle_frame(&dispatcher, &bytes).await;
                respond(&transport, peer, &result).await;
            }
            TransportEvent::Fault { peer, error } => {
                warn!("transport fault (peer {peer:?}): {error}");
            }
        }
    }
    debug!("serve loop ended");
}

/// Parses and dispatches one inbound frame, always producing a result.
async fn handle_frame(dispatcher: &Dispatcher, bytes: &[u8]) -> InvokeResult {
    let doc = match std::str::from_utf8(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("discarding non-UTF-8 frame: {e}");
            return InvokeResult::failed(UNPARSED, format!("request is not UTF-8: {e}"));
        }
    };
    let request = match decode_request(doc) {
        Ok(request) => request,
        Err(e) => {
            warn!("unparseable request: {e}");
            return InvokeResult::failed(UNPARSED, format!("malformed request: {e}"));
        }
    };
    debug!(
        "request {} ({} args, asynchronous={})",
        request.object_method(),
        request.parameters.len(),
        request.asynchronous
    );
    dispatcher.dispatch(&request).await
}

async fn respond(transport: &TcpServer, peer: SocketAddr, result: &InvokeResult) {
    let doc = match encode_result(result) {
        Ok(doc) => doc,
        Err(e) => {
            // The return value was unencodable; tell the caller that much.
            warn!("result for {} is unencodable: {e}", result.object_method);
            let fallback =
                InvokeResult::failed(result.object_method.clone(), format!("unencodable result: {e}"));
            match encode_result(&fallback) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("fallback result also unencodable: {e}");
                    return;
                }
            }
        }
    };
    if !transport.send_to(peer, doc.as_bytes()).await {
        warn!("response to {peer} was not delivered");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
