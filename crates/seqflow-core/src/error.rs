//! Error Types for seqflow core values
//!
//! Every error in this module describes a caller bug: a malformed name, a
//! message without any timestamp source, or a payload that does not match the
//! schema of the channel it is written to. None of them are retried.
//!
//! ## Error Categories
//!
//! ### Naming Errors
//! - `InvalidName`: sequence or channel name failed validation
//!
//! ### Message Errors
//! - `MissingTimestamp`: no acquisition, header or recording timestamp
//!
//! ### Schema Errors
//! - `ReservedField`: payload field collides with a reserved column name
//! - `SchemaMismatch`: payload does not fit the channel schema
//!
//! ### Batch Errors
//! - `Decode`: a columnar batch could not be turned back into messages
//!
//! ## Example
//! ```
//! use seqflow_core::{names, Error};
//!
//! let err = names::validate_channel_name("#bad").unwrap_err();
//! assert!(matches!(err, Error::InvalidName { .. }));
//! ```

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error(
        "Timestamp data is needed: set the acquisition timestamp, the payload header stamp or the recording timestamp"
    )]
    MissingTimestamp,

    #[error("Field name '{0}' is reserved")]
    ReservedField(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
