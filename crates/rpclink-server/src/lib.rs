//! # rpclink-server
//!
//! The server side of rpclink: an explicit object/method registry standing
//! in for reflection, a resolution and dispatch engine with overload
//! narrowing and a resolution cache, a single-threaded execution context
//! for method bodies, the framed TCP serve loop, and the UDP discovery
//! responder.
//!
//! A typical embedding registers its objects, loads a [`config::ServerConfig`],
//! and starts one [`server::RpcServer`] plus one
//! [`discovery::DiscoveryResponder`].

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod invoker;
pub mod registry;
pub mod server;

pub use config::{load_config, ConfigError, ServerConfig};
pub use discovery::DiscoveryResponder;
pub use dispatch::{Dispatcher, ResolveError};
pub use invoker::Invoker;
pub use registry::{InvokeFault, MethodDef, MethodHandler, MethodKind, ObjectRegistry, RegistryError};
pub use server::RpcServer;
