//! Edge-case tests for names, timestamps, schemas and columnar batches.

use seqflow_core::names::{pack_resource_name, validate_channel_name, validate_sequence_name};
use seqflow_core::{
    Error, FieldType, Message, Payload, PayloadSchema, RecordBatch, StreamTimestamp, Value,
};
use std::sync::Arc;

// ---------------------------------------------------------------
// Naming
// ---------------------------------------------------------------

#[test]
fn channel_name_collapses_separators() {
    assert_eq!(validate_channel_name("/front//imu").unwrap(), "front/imu");
    assert_eq!(validate_channel_name("front/imu/").unwrap(), "front/imu");
}

#[test]
fn channel_name_reports_offending_character() {
    let err = validate_channel_name("#bad").unwrap_err();
    assert!(err.to_string().contains("invalid character '#'"), "{err}");
}

#[test]
fn sequence_name_rejects_spaces() {
    assert!(matches!(
        validate_sequence_name("run 1"),
        Err(Error::InvalidName { kind: "sequence", .. })
    ));
}

#[test]
fn resource_name_joins_components() {
    assert_eq!(pack_resource_name("//drive", "/cam/left"), "drive/cam/left");
}

// ---------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------

#[test]
fn min_over_streams_ignores_exhausted() {
    let heads = [
        StreamTimestamp::Exhausted,
        StreamTimestamp::At(300),
        StreamTimestamp::At(100),
    ];
    assert_eq!(heads.iter().min(), Some(&StreamTimestamp::At(100)));
    let drained = [StreamTimestamp::Exhausted, StreamTimestamp::Exhausted];
    assert!(drained.iter().min().unwrap().is_exhausted());
}

// ---------------------------------------------------------------
// Batches
// ---------------------------------------------------------------

fn scalar_schema() -> Arc<PayloadSchema> {
    Arc::new(
        PayloadSchema::builder("float64")
            .field("data", FieldType::Float64)
            .build()
            .unwrap(),
    )
}

#[test]
fn empty_batch_has_no_bounds() {
    let batch = RecordBatch::from_messages(scalar_schema(), &[]).unwrap();
    assert!(batch.is_empty());
    assert_eq!(batch.time_bounds(), None);
}

#[test]
fn batch_rejects_wrong_type() {
    let messages = vec![Message::at(1, Payload::new().with("data", 1))];
    let err = RecordBatch::from_messages(scalar_schema(), &messages).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch(_)));
}

#[test]
fn batch_preserves_unsorted_rows() {
    let messages: Vec<Message> = [30, 10, 20]
        .iter()
        .map(|&ts| Message::at(ts, Payload::new().with("data", ts as f64)))
        .collect();
    let batch = RecordBatch::from_messages(scalar_schema(), &messages).unwrap();
    assert_eq!(batch.timestamps(), &[30, 10, 20]);
    assert_eq!(batch.time_bounds(), Some((10, 30)));
    assert_eq!(
        batch.row(1).unwrap().payload.get("data"),
        Some(&Value::Float(10.0))
    );
}
