//! Batching engine of a channel writer.
//!
//! Messages accumulate in a [`WriteBuffer`] until either threshold is reached,
//! then the buffer is turned into one [`RecordBatch`] and written to the
//! channel's put stream.
//!
//! ## Flush Triggers
//!
//! A flush runs before `push` returns when ANY of these hold after the append:
//! - **Records**: buffer holds `max_batch_size_records` messages
//! - **Bytes**: estimated size reaches `max_batch_size_bytes`
//! - **Manual**: `flush()` or a clean `close()`
//!
//! ## Executors
//!
//! Without an executor the flush runs on the caller's task. With one, the
//! encode-and-write job is queued on the executor and `push` returns once it
//! is queued. Completed jobs are checked at every flush; `close` waits for all
//! of them. A failed job is reported by the first flush or close that
//! observes it.
//!
//! ## Thread Safety
//!
//! Not thread-safe. One channel is driven by one caller at a time; the owning
//! [`ChannelWriter`](crate::ChannelWriter) sits behind a mutex.

use crate::error::{ClientError, Result};
use crate::executor_pool::{FlushExecutor, FlushTicket};
use crate::transport::PutStream;
use seqflow_core::{Message, PayloadSchema, RecordBatch};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Pending messages plus a running size estimate.
#[derive(Debug)]
pub struct WriteBuffer {
    messages: Vec<Message>,
    size_bytes: usize,
    max_records: usize,
    max_bytes: usize,
}

impl WriteBuffer {
    pub fn new(max_records: usize, max_bytes: usize) -> Self {
        Self {
            messages: Vec::new(),
            size_bytes: 0,
            max_records,
            max_bytes,
        }
    }

    pub fn append(&mut self, message: Message) {
        self.size_bytes += message.estimated_size();
        self.messages.push(message);
        trace!(
            record_count = self.messages.len(),
            size_bytes = self.size_bytes,
            "Appended message to buffer"
        );
    }

    pub fn should_flush(&self) -> bool {
        if self.messages.is_empty() {
            return false;
        }
        self.messages.len() >= self.max_records || self.size_bytes >= self.max_bytes
    }

    pub fn drain(&mut self) -> Vec<Message> {
        self.size_bytes = 0;
        std::mem::take(&mut self.messages)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

/// Buffering and transmission state of one channel.
pub struct ChannelWriteState {
    channel: String,
    schema: Arc<PayloadSchema>,
    buffer: WriteBuffer,
    stream: Arc<Mutex<Box<dyn PutStream>>>,
    executor: Option<Arc<FlushExecutor>>,
    in_flight: VecDeque<FlushTicket>,
    flush_count: usize,
    closed: bool,
}

impl ChannelWriteState {
    pub fn new(
        channel: impl Into<String>,
        schema: Arc<PayloadSchema>,
        stream: Box<dyn PutStream>,
        executor: Option<Arc<FlushExecutor>>,
        max_batch_size_records: usize,
        max_batch_size_bytes: usize,
    ) -> Self {
        Self {
            channel: channel.into(),
            schema,
            buffer: WriteBuffer::new(max_batch_size_records, max_batch_size_bytes),
            stream: Arc::new(Mutex::new(stream)),
            executor,
            in_flight: VecDeque::new(),
            flush_count: 0,
            closed: false,
        }
    }

    /// Validates and buffers a message, flushing if a threshold is reached.
    pub async fn push(&mut self, message: Message) -> Result<()> {
        if self.closed {
            return Err(ClientError::InvalidState(format!(
                "channel '{}' is closed",
                self.channel
            )));
        }
        self.schema.validate(&message.payload)?;
        self.buffer.append(message);
        if self.buffer.should_flush() {
            self.flush().await?;
        }
        Ok(())
    }

    /// Sends the buffered messages as one batch.
    ///
    /// Also reports the failure of any earlier offloaded flush that finished
    /// since the last call. After an error the state must not be reused.
    pub async fn flush(&mut self) -> Result<()> {
        self.reap_finished()?;
        if self.buffer.is_empty() {
            return Ok(());
        }

        let messages = self.buffer.drain();
        self.flush_count += 1;
        debug!(
            channel = %self.channel,
            record_count = messages.len(),
            flush = self.flush_count,
            offloaded = self.executor.is_some(),
            "Flushing batch"
        );

        let job = flush_job(
            self.channel.clone(),
            Arc::clone(&self.schema),
            Arc::clone(&self.stream),
            messages,
        );
        match &self.executor {
            Some(executor) => {
                let ticket = executor.submit(Box::pin(job)).await?;
                self.in_flight.push_back(ticket);
                Ok(())
            }
            None => job.await,
        }
    }

    /// Closes the channel stream.
    ///
    /// A clean close flushes the remainder, waits for offloaded flushes and
    /// closes the put stream. If any of those steps fails, the remaining
    /// tickets are still awaited and the stream is still closed before the
    /// first error is returned. An error close drops the buffer and pending
    /// tickets and closes the stream best-effort. A second call does nothing.
    pub async fn close(&mut self, with_error: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if with_error {
            let dropped = self.buffer.drain().len();
            let pending = self.in_flight.len();
            self.in_flight.clear();
            if let Err(e) = self.stream.lock().await.close().await {
                debug!(channel = %self.channel, error = %e, "Put stream close failed in error mode");
            }
            warn!(
                channel = %self.channel,
                dropped_records = dropped,
                pending_flushes = pending,
                "Channel closed in error mode"
            );
            return Ok(());
        }

        let mut first_error = self.flush().await.err();
        if first_error.is_some() {
            self.buffer.drain();
        }
        while let Some(ticket) = self.in_flight.pop_front() {
            if let Err(e) = ticket.wait().await {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.stream.lock().await.close().await {
            first_error.get_or_insert(ClientError::flush(&self.channel, e));
        }

        match first_error {
            Some(e) => {
                warn!(channel = %self.channel, error = %e, "Channel close failed");
                Err(e)
            }
            None => {
                debug!(channel = %self.channel, flushes = self.flush_count, "Channel closed");
                Ok(())
            }
        }
    }

    fn reap_finished(&mut self) -> Result<()> {
        while let Some(ticket) = self.in_flight.front_mut() {
            match ticket.try_result() {
                None => break,
                Some(result) => {
                    self.in_flight.pop_front();
                    result?;
                }
            }
        }
        Ok(())
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn schema(&self) -> &Arc<PayloadSchema> {
        &self.schema
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of flushes started so far.
    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    /// Offloaded flushes not yet observed as finished.
    pub fn pending_flushes(&self) -> usize {
        self.in_flight.len()
    }

    pub fn buffered_records(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.size_bytes()
    }
}

async fn flush_job(
    channel: String,
    schema: Arc<PayloadSchema>,
    stream: Arc<Mutex<Box<dyn PutStream>>>,
    messages: Vec<Message>,
) -> Result<()> {
    let batch = RecordBatch::from_messages(schema, &messages)
        .map_err(|e| ClientError::flush(&channel, e))?;
    let rows = batch.num_rows();
    stream
        .lock()
        .await
        .write_batch(batch)
        .await
        .map_err(|e| ClientError::flush(&channel, e))?;
    trace!(channel = %channel, rows = rows, "Batch written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seqflow_core::{FieldType, Payload};

    #[derive(Default)]
    struct Recorded {
        batches: Vec<usize>,
        closed: bool,
    }

    struct RecordingStream {
        log: Arc<std::sync::Mutex<Recorded>>,
        fail: bool,
    }

    #[async_trait]
    impl PutStream for RecordingStream {
        async fn write_batch(&mut self, batch: RecordBatch) -> Result<()> {
            if self.fail {
                return Err(ClientError::Connection("mem".into(), "reset".into()));
            }
            self.log.lock().unwrap().batches.push(batch.num_rows());
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.log.lock().unwrap().closed = true;
            Ok(())
        }
    }

    fn schema() -> Arc<PayloadSchema> {
        Arc::new(
            PayloadSchema::builder("float64")
                .field("data", FieldType::Float64)
                .build()
                .unwrap(),
        )
    }

    fn msg(ts: i64) -> Message {
        Message::at(ts, Payload::new().with("data", ts as f64))
    }

    fn state(
        max_records: usize,
        fail: bool,
        executor: Option<Arc<FlushExecutor>>,
    ) -> (ChannelWriteState, Arc<std::sync::Mutex<Recorded>>) {
        let log = Arc::new(std::sync::Mutex::new(Recorded::default()));
        let stream = RecordingStream {
            log: Arc::clone(&log),
            fail,
        };
        let state = ChannelWriteState::new(
            "seq/ch",
            schema(),
            Box::new(stream),
            executor,
            max_records,
            usize::MAX,
        );
        (state, log)
    }

    #[tokio::test]
    async fn test_flush_at_record_threshold() {
        let (mut state, log) = state(3, false, None);
        state.push(msg(1)).await.unwrap();
        state.push(msg(2)).await.unwrap();
        assert_eq!(state.flush_count(), 0);
        state.push(msg(3)).await.unwrap();
        assert_eq!(state.flush_count(), 1);
        assert_eq!(state.buffered_records(), 0);
        assert_eq!(log.lock().unwrap().batches, vec![3]);
    }

    #[tokio::test]
    async fn test_flush_at_byte_threshold() {
        let log = Arc::new(std::sync::Mutex::new(Recorded::default()));
        let stream = RecordingStream {
            log: Arc::clone(&log),
            fail: false,
        };
        let one = msg(1).estimated_size();
        let mut state =
            ChannelWriteState::new("seq/ch", schema(), Box::new(stream), None, 100, one * 2);
        state.push(msg(1)).await.unwrap();
        assert_eq!(state.flush_count(), 0);
        state.push(msg(2)).await.unwrap();
        assert_eq!(state.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_clean_close_flushes_remainder_once() {
        let (mut state, log) = state(10, false, None);
        state.push(msg(1)).await.unwrap();
        state.close(false).await.unwrap();
        state.close(false).await.unwrap();
        let log = log.lock().unwrap();
        assert_eq!(log.batches, vec![1]);
        assert!(log.closed);
    }

    #[tokio::test]
    async fn test_error_close_discards_buffer() {
        let (mut state, log) = state(10, false, None);
        state.push(msg(1)).await.unwrap();
        state.close(true).await.unwrap();
        assert!(log.lock().unwrap().batches.is_empty());
        assert!(matches!(state.push(msg(2)).await, Err(ClientError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_schema_violation_rejected() {
        let (mut state, _) = state(10, false, None);
        let bad = Message::at(1, Payload::new().with("data", "text"));
        assert!(matches!(state.push(bad).await, Err(ClientError::Validation(_))));
        assert_eq!(state.buffered_records(), 0);
    }

    #[tokio::test]
    async fn test_sync_flush_failure() {
        let (mut state, _) = state(1, true, None);
        let err = state.push(msg(1)).await.unwrap_err();
        assert!(matches!(err, ClientError::Flush { .. }));
    }

    #[tokio::test]
    async fn test_offloaded_failure_surfaces_at_close() {
        let executor = Arc::new(FlushExecutor::spawn(0, 4));
        let (mut state, _) = state(1, true, Some(executor));
        // Queued, not awaited.
        state.push(msg(1)).await.unwrap();
        let err = state.close(false).await.unwrap_err();
        assert!(matches!(err, ClientError::Flush { .. }));
    }

    #[tokio::test]
    async fn test_failed_clean_close_still_closes_stream() {
        let (mut state, log) = state(10, true, None);
        state.push(msg(1)).await.unwrap();
        let err = state.close(false).await.unwrap_err();
        assert!(matches!(err, ClientError::Flush { .. }));
        assert!(log.lock().unwrap().closed);
        assert_eq!(state.buffered_records(), 0);

        // Teardown after the failure is a no-op.
        state.close(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_offloaded_close_drains_every_ticket() {
        let executor = Arc::new(FlushExecutor::spawn(0, 8));
        let (mut state, log) = state(1, true, Some(executor));
        for ts in 0..4 {
            // An earlier failure may already surface here.
            let _ = state.push(msg(ts)).await;
        }
        let err = state.close(false).await.unwrap_err();
        assert!(matches!(err, ClientError::Flush { .. }));
        assert_eq!(state.pending_flushes(), 0);
        assert!(log.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn test_offloaded_flushes_keep_order() {
        let executor = Arc::new(FlushExecutor::spawn(0, 4));
        let (mut state, log) = state(2, false, Some(executor));
        for ts in 0..5 {
            state.push(msg(ts)).await.unwrap();
        }
        state.close(false).await.unwrap();
        assert_eq!(log.lock().unwrap().batches, vec![2, 2, 1]);
    }
}
