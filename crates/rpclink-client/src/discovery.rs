//! Client-side UDP server discovery.
//!
//! Broadcasts `DISCOVER:<name>` to the discovery port every half second and
//! waits for a matching `SERVER_INFO:<host>,<port>` reply.  Replies that do
//! not parse are ignored so a noisy segment cannot wedge discovery.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use rpclink_core::protocol::discovery::{format_discover, parse_server_info};
use rpclink_net::{NetError, TransportEvent, UdpTransport};

/// How often the request is re-broadcast while waiting.
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(500);

/// The LAN broadcast target for a discovery port.
pub fn broadcast_target(discovery_port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::BROADCAST, discovery_port))
}

/// Broadcasts for a server named `name` until one answers or `timeout`
/// expires.  `target` is normally [`broadcast_target`]; tests aim it at
/// loopback instead.
pub async fn discover_server(
    name: &str,
    target: SocketAddr,
    timeout: Duration,
) -> Result<Option<SocketAddr>, NetError> {
    let broadcast = target.ip().is_multicast() || target.ip() == Ipv4Addr::BROADCAST;
    let (transport, mut events) =
        UdpTransport::bind("0.0.0.0:0".parse().expect("static addr"), broadcast).await?;

    let request = format_discover(name);
    let deadline = Instant::now() + timeout;
    debug!("discovering {name:?} via {target}");

    loop {
        transport.send_to(target, request.as_bytes()).await;

        let next_broadcast = Instant::now() + BROADCAST_INTERVAL;
        let wait_until = next_broadcast.min(deadline);
        loop {
            let event = tokio::select! {
                _ = tokio::time::sleep_until(wait_until) => break,
                event = events.recv() => event,
            };
            match event {
                Some(TransportEvent::Data { peer, bytes }) => {
                    let Ok(text) = std::str::from_utf8(&bytes) else {
                        continue;
                    };
                    if let Some(addr) = parse_server_info(text) {
                        info!("discovered {name:?} at {addr} (answered from {peer})");
                        transport.close();
                        return Ok(Some(addr));
                    }
                    debug!("ignoring unrecognized datagram from {peer}");
                }
                Some(_) => continue,
                None => break,
            }
        }

        if Instant::now() >= deadline {
            debug!("discovery of {name:?} timed out");
            transport.close();
            return Ok(None);
        }
    }
}
