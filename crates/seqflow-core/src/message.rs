//! Messages: a timestamped envelope around a typed payload.
//!
//! A [`Message`] always carries a resolved acquisition timestamp. When the
//! caller does not set one explicitly, [`MessageBuilder::build`] falls back to
//! the payload header stamp and then to the recording timestamp, in that
//! order. A payload without a header stamp receives the resolved timestamp.

use crate::error::{Error, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field values of one record, keyed by field name.
///
/// `Null` values are never stored: inserting `Null` removes the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub header_stamp_ns: Option<i64>,
    fields: BTreeMap<String, Value>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_header_stamp(mut self, stamp_ns: i64) -> Self {
        self.header_stamp_ns = Some(stamp_ns);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        match value.into() {
            Value::Null => {
                self.fields.remove(&name);
            }
            value => {
                self.fields.insert(name, value);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn estimated_size(&self) -> usize {
        self.fields
            .iter()
            .map(|(name, value)| name.len() + value.estimated_size())
            .sum::<usize>()
            + if self.header_stamp_ns.is_some() { 8 } else { 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Acquisition timestamp, always resolved.
    pub timestamp_ns: i64,
    /// Time the record was stored by the recorder, if known.
    pub recording_timestamp_ns: Option<i64>,
    pub payload: Payload,
}

impl Message {
    pub fn builder(payload: Payload) -> MessageBuilder {
        MessageBuilder {
            payload,
            timestamp_ns: None,
            recording_timestamp_ns: None,
        }
    }

    /// Message with an explicit acquisition timestamp.
    pub fn at(timestamp_ns: i64, payload: Payload) -> Self {
        let mut payload = payload;
        payload.header_stamp_ns.get_or_insert(timestamp_ns);
        Self {
            timestamp_ns,
            recording_timestamp_ns: None,
            payload,
        }
    }

    /// Approximate encoded size, used for batch byte thresholds.
    pub fn estimated_size(&self) -> usize {
        // Two 8-byte timestamp columns plus the payload.
        16 + self.payload.estimated_size()
    }
}

pub struct MessageBuilder {
    payload: Payload,
    timestamp_ns: Option<i64>,
    recording_timestamp_ns: Option<i64>,
}

impl MessageBuilder {
    pub fn timestamp_ns(mut self, ts: i64) -> Self {
        self.timestamp_ns = Some(ts);
        self
    }

    pub fn recording_timestamp_ns(mut self, ts: i64) -> Self {
        self.recording_timestamp_ns = Some(ts);
        self
    }

    /// Resolves the acquisition timestamp.
    ///
    /// Fails with [`Error::MissingTimestamp`] when no source is set.
    pub fn build(self) -> Result<Message> {
        let MessageBuilder {
            mut payload,
            timestamp_ns,
            recording_timestamp_ns,
        } = self;

        let timestamp_ns = timestamp_ns
            .or(payload.header_stamp_ns)
            .or(recording_timestamp_ns)
            .ok_or(Error::MissingTimestamp)?;

        payload.header_stamp_ns.get_or_insert(timestamp_ns);

        Ok(Message {
            timestamp_ns,
            recording_timestamp_ns,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_timestamp_wins() {
        let msg = Message::builder(Payload::new().with_header_stamp(5))
            .timestamp_ns(10)
            .recording_timestamp_ns(20)
            .build()
            .unwrap();
        assert_eq!(msg.timestamp_ns, 10);
        assert_eq!(msg.payload.header_stamp_ns, Some(5));
        assert_eq!(msg.recording_timestamp_ns, Some(20));
    }

    #[test]
    fn test_header_then_recording_fallback() {
        let from_header = Message::builder(Payload::new().with_header_stamp(7))
            .recording_timestamp_ns(9)
            .build()
            .unwrap();
        assert_eq!(from_header.timestamp_ns, 7);

        let from_recording = Message::builder(Payload::new())
            .recording_timestamp_ns(9)
            .build()
            .unwrap();
        assert_eq!(from_recording.timestamp_ns, 9);
        // Header gets filled with the resolved value.
        assert_eq!(from_recording.payload.header_stamp_ns, Some(9));
    }

    #[test]
    fn test_missing_timestamp() {
        let err = Message::builder(Payload::new().with("x", 1.0)).build().unwrap_err();
        assert_eq!(err, Error::MissingTimestamp);
    }

    #[test]
    fn test_null_removes_field() {
        let mut payload = Payload::new().with("a", 1).with("b", "x");
        payload.insert("a", Value::Null);
        assert!(payload.get("a").is_none());
        assert_eq!(payload.get("b"), Some(&Value::Str("x".to_string())));
    }
}
