//! # rpclink-client
//!
//! Client-side rpclink: [`simple::SimpleClient`] is a minimal blocking
//! client for scripts and tests; [`client::RpcClient`] is the hardened
//! production client with automatic reconnection, escalating retry
//! intervals, stale-frame draining, cancellation, and optional UDP server
//! discovery.

pub mod client;
pub mod config;
pub mod discovery;
pub mod simple;

pub use client::{CancelHandle, ClientError, ClientOptions, RpcClient, ServerLocation};
pub use config::{load_config, ClientConfig, ConfigError};
pub use discovery::{broadcast_target, discover_server};
pub use simple::{SimpleClient, SimpleError};
