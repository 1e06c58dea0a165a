//! The UDP discovery datagram format, shared by both sides.
//!
//! A client broadcasts `DISCOVER:<name>`; the server whose configured name
//! matches answers `SERVER_INFO:<host>,<port>` naming its invoke endpoint.
//! Both datagrams are single-line UTF-8 text.

use std::net::SocketAddr;

const DISCOVER_PREFIX: &str = "DISCOVER:";
const SERVER_INFO_PREFIX: &str = "SERVER_INFO:";

/// Builds a `DISCOVER:<name>` request datagram.
pub fn format_discover(name: &str) -> String {
    format!("{DISCOVER_PREFIX}{name}")
}

/// Extracts the requested server name from a `DISCOVER:` datagram, or `None`
/// when the datagram is not a discovery request.
pub fn parse_discover(text: &str) -> Option<&str> {
    text.trim().strip_prefix(DISCOVER_PREFIX)
}

/// Builds a `SERVER_INFO:<host>,<port>` reply datagram.
pub fn format_server_info(addr: SocketAddr) -> String {
    format!("{SERVER_INFO_PREFIX}{},{}", addr.ip(), addr.port())
}

/// Parses a `SERVER_INFO:<host>,<port>` reply into a socket address.
pub fn parse_server_info(text: &str) -> Option<SocketAddr> {
    let rest = text.trim().strip_prefix(SERVER_INFO_PREFIX)?;
    let (host, port) = rest.split_once(',')?;
    let port: u16 = port.trim().parse().ok()?;
    let ip = host.trim().parse().ok()?;
    Some(SocketAddr::new(ip, port))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
