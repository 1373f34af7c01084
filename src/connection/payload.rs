//! Outbound and inbound payload types.
//!
//! Payloads are opaque text on the wire. A producer either hands over text
//! that is already encoded ([`OutboundValue::Text`]) or a structured value
//! that is serialized to canonical JSON ([`OutboundValue::Structured`]).
//! The choice is made by the caller's type, never by sniffing the content:
//! a `String` that happens to look like JSON is still sent verbatim.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Payload
// ============================================================================

/// Encoded text payload.
///
/// Cheap to clone; cycles take snapshots of the outbound slot by cloning.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Payload(Arc<str>);

impl Payload {
    /// Wraps already-encoded text.
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// Serializes a value to canonical JSON.
    ///
    /// Object keys come out sorted, so equal values always encode to equal
    /// text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the value cannot be
    /// represented as JSON.
    pub fn to_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let value = sort_keys(serde_json::to_value(value)?);
        Ok(Self::new(serde_json::to_string(&value)?))
    }

    /// Returns the payload text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for Payload {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

// ============================================================================
// OutboundValue
// ============================================================================

/// A value handed to
/// [`Connection::set_outbound_value`](crate::Connection::set_outbound_value).
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundValue {
    /// Text sent as-is.
    Text(String),
    /// Structured value, serialized to canonical JSON before sending.
    Structured(Value),
}

impl OutboundValue {
    /// Encodes the value into a wire payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if a structured value
    /// cannot be encoded.
    pub fn encode(self) -> Result<Payload> {
        match self {
            Self::Text(text) => Ok(Payload::from(text)),
            Self::Structured(value) => Payload::to_canonical_json(&value),
        }
    }
}

impl From<String> for OutboundValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for OutboundValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for OutboundValue {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

// ============================================================================
// Canonical Ordering
// ============================================================================

/// Rebuilds every object with its keys in sorted order.
///
/// `serde_json::Map` keeps insertion order when `preserve_order` is enabled
/// anywhere in the dependency graph.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde::ser::{Error as _, Serializer};
    use serde_json::json;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
            Err(S::Error::custom("joystick handle is not serializable"))
        }
    }

    #[test]
    fn test_text_passes_through() {
        let payload = OutboundValue::from("10").encode().unwrap();
        assert_eq!(payload.as_str(), "10");
    }

    #[test]
    fn test_json_looking_text_is_not_reencoded() {
        let payload = OutboundValue::from(r#"{"x":1}"#).encode().unwrap();
        assert_eq!(payload.as_str(), r#"{"x":1}"#);
    }

    #[test]
    fn test_structured_keys_sorted() {
        let payload = OutboundValue::from(json!({ "y": 2, "x": 1, "a": [true] }))
            .encode()
            .unwrap();
        assert_eq!(payload.as_str(), r#"{"a":[true],"x":1,"y":2}"#);
    }

    #[test]
    fn test_nested_keys_sorted_regardless_of_insertion_order() {
        let mut inner = serde_json::Map::new();
        inner.insert("z".to_string(), json!(1));
        inner.insert("b".to_string(), json!(2));
        let mut outer = serde_json::Map::new();
        outer.insert("y".to_string(), json!([Value::Object(inner.clone())]));
        outer.insert("a".to_string(), Value::Object(inner));

        let payload = Payload::to_canonical_json(&Value::Object(outer)).unwrap();
        assert_eq!(
            payload.as_str(),
            r#"{"a":{"b":2,"z":1},"y":[{"b":2,"z":1}]}"#
        );
    }

    #[test]
    fn test_structured_string_is_quoted() {
        let payload = OutboundValue::from(json!("10")).encode().unwrap();
        assert_eq!(payload.as_str(), "\"10\"");
    }

    #[test]
    fn test_canonical_from_struct() {
        #[derive(Serialize)]
        struct Stick {
            y: f32,
            x: f32,
        }

        let payload = Payload::to_canonical_json(&Stick { y: 0.5, x: -1.0 }).unwrap();
        assert_eq!(payload.as_str(), r#"{"x":-1.0,"y":0.5}"#);
    }

    #[test]
    fn test_unserializable_fails() {
        let err = Payload::to_canonical_json(&Unserializable).unwrap_err();
        assert!(matches!(err, crate::Error::Json(_)));
    }

    #[test]
    fn test_payload_equality_by_content() {
        assert_eq!(Payload::from("a"), Payload::from(String::from("a")));
        assert_ne!(Payload::from("a"), Payload::from("b"));
    }
}
