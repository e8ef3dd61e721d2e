use lapin::types::{AMQPValue, FieldTable};
use std::borrow::{Borrow, Cow};

/// Convenience methods for [`lapin::BasicProperties`].
pub trait BasicPropertiesExt {
    /// Lookup header by key.
    fn get_header<Q>(&self, key: &Q) -> Option<&AMQPValue>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized;

    /// Lookup a header string value.
    ///
    /// Returns `None` if not a string.
    fn get_header_str<Q>(&self, key: &Q) -> Option<Cow<'_, str>>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        match self.get_header(key) {
            Some(AMQPValue::LongString(s)) => Some(String::from_utf8_lossy(s.as_bytes())),
            Some(AMQPValue::ShortString(s)) => Some(Cow::Borrowed(s.as_str())),
            _ => None,
        }
    }

    /// The headers of the message, an empty table if the message carries none.
    fn headers_or_empty(&self) -> FieldTable;
}

impl BasicPropertiesExt for lapin::BasicProperties {
    fn get_header<Q>(&self, key: &Q) -> Option<&AMQPValue>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.headers().as_ref()?.inner().get(key)
    }

    fn headers_or_empty(&self) -> FieldTable {
        self.headers().clone().unwrap_or_default()
    }
}

/// Build a header table out of `(name, value)` pairs.
///
/// ```rust
/// use carrot_router::amqp::convenience::field_table;
/// use carrot_router::amqp::types::AMQPValue;
///
/// let headers = field_table([
///     ("kind", AMQPValue::LongString("order".into())),
///     ("version", AMQPValue::LongInt(2)),
/// ]);
/// assert_eq!(headers.inner().len(), 2);
/// ```
pub fn field_table<'a, I>(headers: I) -> FieldTable
where
    I: IntoIterator<Item = (&'a str, AMQPValue)>,
{
    let mut table = FieldTable::default();
    for (name, value) in headers {
        table.insert(name.into(), value);
    }
    table
}

/// Compare two header values the way a publisher means them rather than the way the wire
/// encodes them.
///
/// AMQP has two string types and seven integer widths, and client libraries pick different
/// ones for the same value: strings are compared by content, integers by numeric value.
/// Every other value must match exactly.
pub fn header_values_match(expected: &AMQPValue, actual: &AMQPValue) -> bool {
    if let (Some(expected), Some(actual)) = (string_bytes(expected), string_bytes(actual)) {
        return expected == actual;
    }
    if let (Some(expected), Some(actual)) = (integer(expected), integer(actual)) {
        return expected == actual;
    }
    expected == actual
}

fn string_bytes(value: &AMQPValue) -> Option<&[u8]> {
    match value {
        AMQPValue::LongString(s) => Some(s.as_bytes()),
        AMQPValue::ShortString(s) => Some(s.as_str().as_bytes()),
        _ => None,
    }
}

fn integer(value: &AMQPValue) -> Option<i64> {
    match value {
        AMQPValue::ShortShortInt(v) => Some((*v).into()),
        AMQPValue::ShortShortUInt(v) => Some((*v).into()),
        AMQPValue::ShortInt(v) => Some((*v).into()),
        AMQPValue::ShortUInt(v) => Some((*v).into()),
        AMQPValue::LongInt(v) => Some((*v).into()),
        AMQPValue::LongUInt(v) => Some((*v).into()),
        AMQPValue::LongLongInt(v) => Some(*v),
        _ => None,
    }
}
