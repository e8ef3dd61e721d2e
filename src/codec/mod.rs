//! Conversions between raw AMQP payloads and the shapes message handlers work with.
//!
//! Inbound, a handler declares the type it wants to receive and the matching
//! [`FromPayload`] implementation decodes the body:
//!
//! | Body type | Shape                  | Decoding                                   |
//! |-----------|------------------------|--------------------------------------------|
//! | `Vec<u8>` | [`PayloadShape::Raw`]     | none, the bytes are passed through         |
//! | `String`  | [`PayloadShape::Text`]    | UTF-8                                      |
//! | [`JsonMap`] | [`PayloadShape::Mapping`] | a JSON object                            |
//! | [`Json<T>`] | [`PayloadShape::Record`]  | a JSON object deserialized into `T`      |
//!
//! Outbound, [`Payload`] is the closed set of values that can be published.
//! Raw bytes cannot be published: see [`encode`].
use std::fmt;

mod decode;
mod encode;

pub use decode::{decode, DecodeError, FromPayload, Json};
pub use encode::{encode, EncodeError, Payload};

/// A generic, string-keyed JSON mapping.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// The shape a payload is decoded into (or encoded from).
///
/// The shape of a route is fixed when the route is registered and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// The payload bytes, untouched.
    Raw,
    /// A UTF-8 string.
    Text,
    /// A generic JSON object.
    Mapping,
    /// A structured record, identified by the name of its Rust type.
    Record(&'static str),
}

impl PayloadShape {
    /// The MIME type advertised when publishing a payload of this shape.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Raw => None,
            Self::Text => Some("text/plain"),
            Self::Mapping | Self::Record(_) => Some("application/json"),
        }
    }
}

impl fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw bytes"),
            Self::Text => write!(f, "text"),
            Self::Mapping => write!(f, "mapping"),
            Self::Record(type_name) => write!(f, "record `{type_name}`"),
        }
    }
}
