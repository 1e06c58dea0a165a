//! # rpclink-core
//!
//! Shared library for rpclink containing the wire message model, the textual
//! codec, the loosely-typed value model, and the type coercion engine.
//!
//! This crate is used by both the server and client applications.
//! It has zero dependencies on OS APIs or network sockets.
//!
//! rpclink is a dynamic RPC system: a client names a server-side *object*, a
//! *method* on it, and a list of string-encoded arguments.  The server
//! resolves the name to a registered callable, coerces each argument into the
//! parameter type the callable declares, invokes it, and replies with a
//! status plus an optional string-encoded return value.  This crate defines:
//!
//! - **`protocol`** – The two message shapes that travel over the network
//!   (`InvokeRequest` and `InvokeResult`) and the textual encoding that
//!   preserves the original field names for interoperability testing.
//!
//! - **`value`** – The `Value` / `TypeDesc` pair: a loosely-typed runtime
//!   value and the descriptor of the concrete type a dispatch target expects.
//!
//! - **`coerce`** – The conversion rules that turn raw wire strings (including
//!   base-prefixed numerics, enum names, and comma-separated arrays) into
//!   typed values.

pub mod coerce;
pub mod protocol;
pub mod value;

pub use coerce::{coerce, CoerceEnv, CoerceError, LastResortConverter};
pub use protocol::messages::{InvokeRequest, InvokeResult, StatusCode, WireParam};
pub use protocol::text::{decode_request, decode_result, encode_request, encode_result};
pub use protocol::WireError;
pub use value::{EnumRegistry, TypeDesc, Value};

/// Returns `true` when `s` is a valid object or method identifier:
/// `^[A-Za-z_][A-Za-z0-9_]*$`.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
