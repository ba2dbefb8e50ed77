//! Timestamps and time windows.
//!
//! All timestamps are nanoseconds since the Unix epoch, stored as `i64`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp of the next unread row of a stream.
///
/// `Exhausted` orders after every `At` value, so a stream that has run dry
/// never wins a minimum-timestamp comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamTimestamp {
    At(i64),
    Exhausted,
}

impl StreamTimestamp {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, StreamTimestamp::Exhausted)
    }

    pub fn as_nanos(&self) -> Option<i64> {
        match self {
            StreamTimestamp::At(ts) => Some(*ts),
            StreamTimestamp::Exhausted => None,
        }
    }
}

impl fmt::Display for StreamTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTimestamp::At(ts) => write!(f, "{ts}"),
            StreamTimestamp::Exhausted => write!(f, "inf"),
        }
    }
}

/// Half-open time window `[start_ns, end_ns)`. Missing bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ns: Option<i64>,
    pub end_ns: Option<i64>,
}

impl TimeWindow {
    pub fn new(start_ns: Option<i64>, end_ns: Option<i64>) -> Self {
        Self { start_ns, end_ns }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.start_ns.is_none() && self.end_ns.is_none()
    }

    pub fn contains(&self, ts: i64) -> bool {
        self.start_ns.map_or(true, |start| ts >= start) && self.end_ns.map_or(true, |end| ts < end)
    }
}
