//! Core value types shared by the seqflow client.
//!
//! - [`names`]: sequence and channel naming rules
//! - [`time`]: timestamps, the exhausted-stream sentinel and time windows
//! - [`schema`], [`value`], [`message`]: typed payloads and their envelope
//! - [`batch`]: columnar batches exchanged with the server

pub mod batch;
pub mod error;
pub mod message;
pub mod names;
pub mod schema;
pub mod time;
pub mod value;

pub use batch::RecordBatch;
pub use error::{Error, Result};
pub use message::{Message, MessageBuilder, Payload};
pub use schema::{PayloadSchema, PayloadSchemaBuilder, SchemaField, RESERVED_FIELD_NAMES};
pub use time::{StreamTimestamp, TimeWindow};
pub use value::{FieldType, Value};
