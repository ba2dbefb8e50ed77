//! Columnar record batches.
//!
//! A [`RecordBatch`] is the unit exchanged with the server: a group of rows
//! for one channel, stored column by column. The envelope columns
//! (`timestamp_ns`, `recording_timestamp_ns`, header stamp) come first,
//! followed by one column per payload schema field in declaration order.
//!
//! Batches are built from buffered [`Message`]s on the write path and decoded
//! back into messages row by row on the read path.

use crate::error::{Error, Result};
use crate::message::{Message, Payload};
use crate::schema::PayloadSchema;
use crate::time::TimeWindow;
use crate::value::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    schema: Arc<PayloadSchema>,
    timestamp_ns: Vec<i64>,
    recording_timestamp_ns: Vec<Option<i64>>,
    header_stamp_ns: Vec<Option<i64>>,
    columns: Vec<Vec<Value>>,
}

impl RecordBatch {
    pub fn empty(schema: Arc<PayloadSchema>) -> Self {
        let columns = vec![Vec::new(); schema.fields().len()];
        Self {
            schema,
            timestamp_ns: Vec::new(),
            recording_timestamp_ns: Vec::new(),
            header_stamp_ns: Vec::new(),
            columns,
        }
    }

    /// Converts messages into columns, validating every payload.
    pub fn from_messages(schema: Arc<PayloadSchema>, messages: &[Message]) -> Result<Self> {
        let mut batch = Self::empty(schema);
        batch.timestamp_ns.reserve(messages.len());
        for message in messages {
            batch.schema.validate(&message.payload)?;
            batch.timestamp_ns.push(message.timestamp_ns);
            batch.recording_timestamp_ns.push(message.recording_timestamp_ns);
            batch.header_stamp_ns.push(message.payload.header_stamp_ns);
            for (field, column) in batch.schema.fields().iter().zip(batch.columns.iter_mut()) {
                column.push(message.payload.get(&field.name).cloned().unwrap_or(Value::Null));
            }
        }
        Ok(batch)
    }

    pub fn schema(&self) -> &Arc<PayloadSchema> {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.timestamp_ns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp_ns.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamp_ns
    }

    pub fn timestamp_at(&self, row: usize) -> Option<i64> {
        self.timestamp_ns.get(row).copied()
    }

    /// Column of a payload field, by name.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.schema
            .field_index(name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Rebuilds the message stored at `row`.
    pub fn row(&self, row: usize) -> Result<Message> {
        let timestamp_ns = self.timestamp_at(row).ok_or_else(|| {
            Error::Decode(format!(
                "row {row} out of range for batch of {} rows",
                self.num_rows()
            ))
        })?;

        let mut payload = Payload::new();
        payload.header_stamp_ns = self.header_stamp_ns[row];
        for (field, column) in self.schema.fields().iter().zip(&self.columns) {
            let value = column.get(row).cloned().ok_or_else(|| {
                Error::Decode(format!("column '{}' is shorter than the batch", field.name))
            })?;
            payload.insert(field.name.clone(), value);
        }

        Ok(Message {
            timestamp_ns,
            recording_timestamp_ns: self.recording_timestamp_ns[row],
            payload,
        })
    }

    /// Keeps only the rows whose timestamp falls inside `window`.
    pub fn filter(&self, window: &TimeWindow) -> Self {
        if window.is_unbounded() {
            return self.clone();
        }
        let keep: Vec<usize> = (0..self.num_rows())
            .filter(|&i| window.contains(self.timestamp_ns[i]))
            .collect();
        Self {
            schema: Arc::clone(&self.schema),
            timestamp_ns: keep.iter().map(|&i| self.timestamp_ns[i]).collect(),
            recording_timestamp_ns: keep.iter().map(|&i| self.recording_timestamp_ns[i]).collect(),
            header_stamp_ns: keep.iter().map(|&i| self.header_stamp_ns[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|column| keep.iter().map(|&i| column[i].clone()).collect())
                .collect(),
        }
    }

    /// Smallest and largest timestamp in the batch.
    pub fn time_bounds(&self) -> Option<(i64, i64)> {
        let min = self.timestamp_ns.iter().min()?;
        let max = self.timestamp_ns.iter().max()?;
        Some((*min, *max))
    }

    /// Approximate payload size in bytes.
    pub fn size_bytes(&self) -> usize {
        let envelope = self.num_rows() * 24;
        let values: usize = self
            .columns
            .iter()
            .flat_map(|column| column.iter())
            .map(Value::estimated_size)
            .sum();
        envelope + values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldType;

    fn schema() -> Arc<PayloadSchema> {
        Arc::new(
            PayloadSchema::builder("gps")
                .field("lat", FieldType::Float64)
                .nullable_field("fix", FieldType::Utf8)
                .build()
                .unwrap(),
        )
    }

    fn messages() -> Vec<Message> {
        vec![
            Message::at(100, Payload::new().with("lat", 45.0).with("fix", "3d")),
            Message::builder(Payload::new().with("lat", 45.5))
                .timestamp_ns(200)
                .recording_timestamp_ns(250)
                .build()
                .unwrap(),
            Message::at(300, Payload::new().with("lat", 46.0)),
        ]
    }

    #[test]
    fn test_rows_rebuild_messages() {
        let input = messages();
        let batch = RecordBatch::from_messages(schema(), &input).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.time_bounds(), Some((100, 300)));
        for (i, expected) in input.iter().enumerate() {
            assert_eq!(&batch.row(i).unwrap(), expected);
        }
        assert!(matches!(batch.row(3), Err(Error::Decode(_))));
    }

    #[test]
    fn test_nullable_column_padded() {
        let batch = RecordBatch::from_messages(schema(), &messages()).unwrap();
        let fix = batch.column("fix").unwrap();
        assert_eq!(fix[0], Value::Str("3d".to_string()));
        assert_eq!(fix[1], Value::Null);
    }

    #[test]
    fn test_invalid_payload_rejected() {
        let bad = vec![Message::at(1, Payload::new().with("lon", 1.0))];
        assert!(RecordBatch::from_messages(schema(), &bad).is_err());
    }

    #[test]
    fn test_filter_window() {
        let batch = RecordBatch::from_messages(schema(), &messages()).unwrap();
        let filtered = batch.filter(&TimeWindow::new(Some(150), Some(300)));
        assert_eq!(filtered.timestamps(), &[200]);
        assert_eq!(filtered.row(0).unwrap().recording_timestamp_ns, Some(250));
    }
}
