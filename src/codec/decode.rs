use super::{JsonMap, PayloadShape};
use serde::de::DeserializeOwned;
use std::ops::{Deref, DerefMut};

/// Types that can be built from the raw payload of an incoming message.
///
/// The crate implements `FromPayload` for the four supported shapes - `Vec<u8>`, `String`,
/// [`JsonMap`] and [`Json<T>`]. The shape is a property of the type: it is known when a route
/// is registered and used for logging and diagnostics.
pub trait FromPayload: Sized + Send + 'static {
    /// The shape this type decodes from.
    fn shape() -> PayloadShape;

    /// Decode the raw payload.
    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError>;
}

/// Decode a raw payload into `T`.
pub fn decode<T: FromPayload>(payload: &[u8]) -> Result<T, DecodeError> {
    T::from_payload(payload)
}

/// Error returned when an incoming payload cannot be decoded into the shape expected by a route.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("The payload is not valid UTF-8")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),
    #[error("The payload is not valid JSON")]
    MalformedJson(#[source] serde_json::Error),
    #[error("The payload does not match the expected {shape}")]
    SchemaMismatch {
        shape: PayloadShape,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    fn from_json(shape: PayloadShape, e: serde_json::Error) -> Self {
        if e.is_data() {
            Self::SchemaMismatch { shape, source: e }
        } else {
            Self::MalformedJson(e)
        }
    }
}

impl FromPayload for Vec<u8> {
    fn shape() -> PayloadShape {
        PayloadShape::Raw
    }

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(payload.to_vec())
    }
}

impl FromPayload for String {
    fn shape() -> PayloadShape {
        PayloadShape::Text
    }

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        String::from_utf8(payload.to_vec()).map_err(DecodeError::InvalidUtf8)
    }
}

impl FromPayload for JsonMap {
    fn shape() -> PayloadShape {
        PayloadShape::Mapping
    }

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(payload).map_err(|e| DecodeError::from_json(Self::shape(), e))
    }
}

/// A structured record carried as a JSON object.
///
/// Any `T: Deserialize` works as a record. Validation beyond the structure of the type
/// (ranges, formats, etc.) belongs to `T`'s `Deserialize` implementation, e.g. via
/// `#[serde(try_from = "...")]`.
///
/// ```rust
/// use carrot_router::codec::{decode, Json};
///
/// #[derive(serde::Deserialize)]
/// struct Person {
///     name: String,
///     age: u8,
/// }
///
/// let Json(person) = decode::<Json<Person>>(br#"{"name":"Al","age":5}"#).unwrap();
/// assert_eq!(person.name, "Al");
/// assert_eq!(person.age, 5);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: DeserializeOwned + Send + 'static> FromPayload for Json<T> {
    fn shape() -> PayloadShape {
        PayloadShape::Record(std::any::type_name::<T>())
    }

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(payload)
            .map(Json)
            .map_err(|e| DecodeError::from_json(Self::shape(), e))
    }
}
