//! Relayed frames and their normalization.
//!
//! A [`Frame`] is one WebSocket message as the relay sees it: either text or
//! binary. Text frames are expected to carry a flat JSON record; the relay
//! stamps records that lack a `timestamp` field and re-serializes them into a
//! canonical compact form. Binary frames are opaque and pass through as-is.
//!
//! The normalized frame is the only form the relay ever stores or sends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field injected into structured records that arrive without one.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Errors produced while normalizing an inbound frame.
///
/// Every variant means the frame is dropped: it is neither stored nor
/// broadcast, and the connection that sent it stays open.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The text payload is not valid JSON.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The text payload is valid JSON but not an object.
    #[error("payload is a JSON {0}, expected a record")]
    NotARecord(&'static str),

    /// A binary frame was handed to structured parsing.
    #[error("binary payloads cannot be read as records")]
    UnsupportedPayload,
}

/// A single relayed message, text or binary.
///
/// Serializes untagged so that adapter events carry text as a JSON string and
/// binary as an array of byte values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// A UTF-8 text frame.
    Text(String),
    /// An opaque binary frame.
    Binary(Vec<u8>),
}

impl Frame {
    /// Returns `true` for binary frames.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parses a text frame as a flat JSON record.
    ///
    /// # Errors
    ///
    /// - [`NormalizeError::UnsupportedPayload`] for binary frames.
    /// - [`NormalizeError::MalformedPayload`] if the text is not JSON.
    /// - [`NormalizeError::NotARecord`] if the JSON is not an object.
    pub fn parse_record(&self) -> Result<Map<String, Value>, NormalizeError> {
        let Self::Text(text) = self else {
            return Err(NormalizeError::UnsupportedPayload);
        };
        match serde_json::from_str::<Value>(text)? {
            Value::Object(record) => Ok(record),
            other => Err(NormalizeError::NotARecord(json_kind(&other))),
        }
    }
}

/// Milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

/// Converts an inbound frame into its stored and broadcast form.
///
/// Binary frames are returned untouched. Text frames must parse as a JSON
/// record; a record without a `timestamp` field gets `now` injected, and the
/// result is re-serialized compactly with the sender's field order kept.
/// An existing `timestamp` is never changed, whatever its value, so
/// normalizing an already-normalized frame yields the same frame.
///
/// # Errors
///
/// Returns [`NormalizeError`] if a text frame is not a JSON record.
pub fn normalize(frame: Frame, now: Timestamp) -> Result<Frame, NormalizeError> {
    if frame.is_binary() {
        return Ok(frame);
    }

    let mut record = frame.parse_record()?;
    if !record.contains_key(TIMESTAMP_FIELD) {
        record.insert(TIMESTAMP_FIELD.to_string(), Value::from(now.as_millis()));
    }
    Ok(Frame::Text(serde_json::to_string(&record)?))
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
