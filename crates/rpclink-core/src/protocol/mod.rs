//! Wire message model and textual codec.
//!
//! Two message shapes cross the network: [`messages::InvokeRequest`]
//! (client → server) and [`messages::InvokeResult`] (server → client).
//! [`text`] encodes them as UTF-8 tagged documents preserving the original
//! field names, so captures remain human-diffable and interoperable with the
//! reference wire shape.

pub mod discovery;
pub mod messages;
pub mod text;

use thiserror::Error;

/// Errors raised while building, encoding, or decoding wire messages.
#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    /// The document ended before the expected construct.
    #[error("unexpected end of document")]
    UnexpectedEnd,

    /// A literal token was expected at the given byte offset.
    #[error("expected {expected} at offset {at}")]
    Expected { expected: String, at: usize },

    /// A required attribute is missing from a tag.
    #[error("tag <{tag}> is missing required attribute {attr}")]
    MissingAttribute { tag: String, attr: String },

    /// An object or method name violates `^[A-Za-z_][A-Za-z0-9_]*$`.
    #[error("invalid identifier in {field}: {value:?}")]
    InvalidIdentifier { field: String, value: String },

    /// A `Type` attribute names a type the model cannot represent.
    #[error("unrecognized type name: {0:?}")]
    BadTypeName(String),

    /// A `StatusCode` attribute is not a known status value.
    #[error("unknown status code: {0:?}")]
    BadStatusCode(String),

    /// An entity reference could not be resolved while unescaping.
    #[error("bad escape sequence: {0:?}")]
    BadEscape(String),

    /// A value contains the CDATA terminator and cannot be encoded.
    #[error("value contains ']]>' and cannot be carried in a CDATA section")]
    UnencodableValue,

    /// Content remained after the closing tag of the document.
    #[error("trailing content at offset {at}")]
    TrailingContent { at: usize },
}
