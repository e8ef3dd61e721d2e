use super::{JsonMap, PayloadShape};
use serde::Serialize;

/// A value that can be handed to a [`Publisher`](crate::publishers::Publisher).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw bytes. Never publishable, see [`encode`].
    Raw(Vec<u8>),
    /// A UTF-8 string, published as-is.
    Text(String),
    /// A generic JSON object.
    Mapping(JsonMap),
    /// The fields of a structured record. Use [`Payload::record`] to build it.
    Record {
        type_name: &'static str,
        fields: JsonMap,
    },
}

impl Payload {
    /// Capture the fields of a serializable record.
    ///
    /// Fails with [`EncodeError::NotARecord`] if `T` does not serialize to a JSON object.
    pub fn record<T: Serialize>(record: &T) -> Result<Self, EncodeError> {
        let type_name = std::any::type_name::<T>();
        match serde_json::to_value(record).map_err(EncodeError::Serialization)? {
            serde_json::Value::Object(fields) => Ok(Self::Record { type_name, fields }),
            _ => Err(EncodeError::NotARecord(type_name)),
        }
    }

    pub fn shape(&self) -> PayloadShape {
        match self {
            Self::Raw(_) => PayloadShape::Raw,
            Self::Text(_) => PayloadShape::Text,
            Self::Mapping(_) => PayloadShape::Mapping,
            Self::Record { type_name, .. } => PayloadShape::Record(*type_name),
        }
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<JsonMap> for Payload {
    fn from(value: JsonMap) -> Self {
        Self::Mapping(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Raw(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Self::Raw(value.to_vec())
    }
}

/// Error returned when a value cannot be turned into a publishable payload.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("Payloads of shape {0} cannot be published. Publish text, a mapping or a record")]
    UnsupportedShape(PayloadShape),
    #[error("`{0}` does not serialize to a JSON object, it is not a record")]
    NotARecord(&'static str),
    #[error("Failed to serialize the payload to JSON")]
    Serialization(#[source] serde_json::Error),
}

/// Serialize a payload to the bytes sent to the broker.
///
/// Mappings and records are serialized to JSON, text is sent as UTF-8.
/// [`Payload::Raw`] is rejected with [`EncodeError::UnsupportedShape`]: every published
/// payload must be text or JSON.
pub fn encode(payload: &Payload) -> Result<Vec<u8>, EncodeError> {
    match payload {
        Payload::Raw(_) => Err(EncodeError::UnsupportedShape(payload.shape())),
        Payload::Text(text) => Ok(text.as_bytes().to_vec()),
        Payload::Mapping(map) => serde_json::to_vec(map).map_err(EncodeError::Serialization),
        Payload::Record { fields, .. } => {
            serde_json::to_vec(fields).map_err(EncodeError::Serialization)
        }
    }
}
