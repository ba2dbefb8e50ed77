//! One-row lookahead over a channel's get stream.
//!
//! [`ChannelReadState`] always knows the timestamp of the next unread row
//! without consuming it. `next()` hands out the buffered row and immediately
//! buffers the following one, so after every call the lookahead holds the
//! next unread row, never the one just returned. The merge reader relies on
//! this to compare channels without consuming any of them.
//!
//! Once the stream ends the lookahead becomes [`StreamTimestamp::Exhausted`],
//! which orders after every real timestamp.

use crate::error::{ClientError, Result};
use crate::transport::GetStream;
use seqflow_core::{Message, PayloadSchema, RecordBatch, StreamTimestamp};
use std::sync::Arc;
use tracing::trace;

enum Lookahead {
    Empty,
    Row { timestamp_ns: i64, message: Message },
    Exhausted,
}

pub struct ChannelReadState {
    channel: String,
    stream: Box<dyn GetStream>,
    batch: Option<RecordBatch>,
    cursor: usize,
    lookahead: Lookahead,
    row_mode: bool,
    batch_mode: bool,
}

impl ChannelReadState {
    pub fn new(channel: impl Into<String>, stream: Box<dyn GetStream>) -> Self {
        Self {
            channel: channel.into(),
            stream,
            batch: None,
            cursor: 0,
            lookahead: Lookahead::Empty,
            row_mode: false,
            batch_mode: false,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn schema(&self) -> Arc<PayloadSchema> {
        self.stream.schema()
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.lookahead, Lookahead::Exhausted)
    }

    /// Buffers the next row if none is buffered and returns its timestamp.
    pub async fn peek_next_row(&mut self) -> Result<StreamTimestamp> {
        if self.batch_mode {
            return Err(ClientError::InvalidState(format!(
                "channel '{}' is being read in batch mode",
                self.channel
            )));
        }
        self.row_mode = true;

        match &self.lookahead {
            Lookahead::Row { timestamp_ns, .. } => return Ok(StreamTimestamp::At(*timestamp_ns)),
            Lookahead::Exhausted => return Ok(StreamTimestamp::Exhausted),
            Lookahead::Empty => {}
        }

        loop {
            if let Some(batch) = &self.batch {
                if self.cursor < batch.num_rows() {
                    let message = batch.row(self.cursor)?;
                    self.cursor += 1;
                    let timestamp_ns = message.timestamp_ns;
                    self.lookahead = Lookahead::Row {
                        timestamp_ns,
                        message,
                    };
                    return Ok(StreamTimestamp::At(timestamp_ns));
                }
            }

            match self.stream.read_batch().await? {
                Some(batch) => {
                    trace!(channel = %self.channel, rows = batch.num_rows(), "Fetched batch");
                    self.batch = Some(batch);
                    self.cursor = 0;
                }
                None => {
                    trace!(channel = %self.channel, "Stream exhausted");
                    self.batch = None;
                    self.lookahead = Lookahead::Exhausted;
                    return Ok(StreamTimestamp::Exhausted);
                }
            }
        }
    }

    /// Returns the buffered row and buffers the one after it.
    pub async fn next(&mut self) -> Result<Option<Message>> {
        self.peek_next_row().await?;
        match std::mem::replace(&mut self.lookahead, Lookahead::Empty) {
            Lookahead::Row { message, .. } => {
                self.peek_next_row().await?;
                Ok(Some(message))
            }
            Lookahead::Exhausted => {
                self.lookahead = Lookahead::Exhausted;
                Ok(None)
            }
            Lookahead::Empty => Err(ClientError::Internal(format!(
                "lookahead of channel '{}' empty after peek",
                self.channel
            ))),
        }
    }

    /// Next raw batch, bypassing the row lookahead.
    ///
    /// Not allowed once rows have been peeked or consumed.
    pub async fn fetch_next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.row_mode {
            return Err(ClientError::InvalidState(format!(
                "channel '{}' already started row-by-row iteration",
                self.channel
            )));
        }
        self.batch_mode = true;
        self.stream.read_batch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seqflow_core::{FieldType, Payload};
    use std::collections::VecDeque;

    struct VecStream {
        schema: Arc<PayloadSchema>,
        batches: VecDeque<RecordBatch>,
    }

    #[async_trait]
    impl GetStream for VecStream {
        fn schema(&self) -> Arc<PayloadSchema> {
            Arc::clone(&self.schema)
        }

        async fn read_batch(&mut self) -> Result<Option<RecordBatch>> {
            Ok(self.batches.pop_front())
        }
    }

    fn state(batches: &[&[i64]]) -> ChannelReadState {
        let schema = Arc::new(
            PayloadSchema::builder("int64")
                .field("data", FieldType::Int64)
                .build()
                .unwrap(),
        );
        let batches = batches
            .iter()
            .map(|ts| {
                let messages: Vec<Message> = ts
                    .iter()
                    .map(|&t| Message::at(t, Payload::new().with("data", t)))
                    .collect();
                RecordBatch::from_messages(Arc::clone(&schema), &messages).unwrap()
            })
            .collect();
        ChannelReadState::new("seq/ch", Box::new(VecStream { schema, batches }))
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let mut state = state(&[&[10, 20]]);
        assert_eq!(state.peek_next_row().await.unwrap(), StreamTimestamp::At(10));
        assert_eq!(state.peek_next_row().await.unwrap(), StreamTimestamp::At(10));
        assert_eq!(state.next().await.unwrap().unwrap().timestamp_ns, 10);
        // Re-primed with the following row.
        assert_eq!(state.peek_next_row().await.unwrap(), StreamTimestamp::At(20));
    }

    #[tokio::test]
    async fn test_rows_across_batches_and_empty_batches() {
        let mut state = state(&[&[1], &[], &[2, 3]]);
        let mut seen = Vec::new();
        while let Some(message) = state.next().await.unwrap() {
            seen.push(message.timestamp_ns);
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(state.is_exhausted());
        assert_eq!(state.peek_next_row().await.unwrap(), StreamTimestamp::Exhausted);
        assert!(state.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_mode_exclusive() {
        let mut rows = state(&[&[1], &[2]]);
        rows.peek_next_row().await.unwrap();
        assert!(matches!(
            rows.fetch_next_batch().await,
            Err(ClientError::InvalidState(_))
        ));

        let mut batches = state(&[&[1], &[2]]);
        assert_eq!(batches.fetch_next_batch().await.unwrap().unwrap().num_rows(), 1);
        assert!(matches!(
            batches.next().await,
            Err(ClientError::InvalidState(_))
        ));
    }
}
