//! Per-channel writer.
//!
//! A [`ChannelWriter`] binds a channel name, its [`ChannelWriteState`] and the
//! error-report hook. It is created by the sequence writer, which keeps the
//! writer and hands the caller a cloneable [`ChannelHandle`].
//!
//! ## Failure Handling
//!
//! When a push fails, the writer:
//! 1. reports the error to the server if the session policy is `Report`,
//! 2. closes its state in error mode (buffered data is discarded),
//! 3. returns the error wrapped in [`ClientError::ChannelFailed`].
//!
//! A failed channel makes its later clean finalize fail too, so the sequence
//! writer never finalizes a sequence with a silently broken channel.

use crate::action::{self, NotifyCreateRequest, NotifyType};
use crate::config::{OnErrorPolicy, WriterConfig};
use crate::error::{ClientError, Result};
use crate::executor_pool::FlushExecutor;
use crate::transport::{DoPutCommand, FlightAction, FlightTransport};
use crate::write_state::ChannelWriteState;
use seqflow_core::names::pack_resource_name;
use seqflow_core::{Message, PayloadSchema};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub struct ChannelWriter {
    name: String,
    resource: String,
    transport: Arc<dyn FlightTransport>,
    state: ChannelWriteState,
    on_error: OnErrorPolicy,
    failure: Option<String>,
    finalized: bool,
}

impl ChannelWriter {
    /// Opens the put stream of a registered channel.
    ///
    /// `transport` is the data connection assigned to the channel and is
    /// also used for error notifications.
    pub async fn create(
        sequence_name: &str,
        channel_name: &str,
        key: String,
        schema: Arc<PayloadSchema>,
        transport: Arc<dyn FlightTransport>,
        executor: Option<Arc<FlushExecutor>>,
        config: &WriterConfig,
    ) -> Result<Self> {
        let resource = pack_resource_name(sequence_name, channel_name);
        let command = DoPutCommand {
            resource_locator: resource.clone(),
            key,
        };
        let stream = transport.do_put(&command, Arc::clone(&schema)).await?;

        debug!(
            channel = %resource,
            executor = ?executor.as_ref().map(|e| e.id()),
            max_records = config.max_batch_size_records,
            max_bytes = config.max_batch_size_bytes,
            "Channel writer created"
        );

        let state = ChannelWriteState::new(
            resource.clone(),
            schema,
            stream,
            executor,
            config.max_batch_size_records,
            config.max_batch_size_bytes,
        );

        Ok(Self {
            name: channel_name.to_string(),
            resource,
            transport,
            state,
            on_error: config.on_error,
            failure: None,
            finalized: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `{sequence}/{channel}`
    pub fn resource_name(&self) -> &str {
        &self.resource
    }

    pub fn schema(&self) -> &Arc<PayloadSchema> {
        self.state.schema()
    }

    /// `true` until the channel is finalized or fails.
    pub fn is_active(&self) -> bool {
        !self.finalized && self.failure.is_none()
    }

    pub fn flush_count(&self) -> usize {
        self.state.flush_count()
    }

    pub async fn push(&mut self, message: Message) -> Result<()> {
        if let Some(failure) = &self.failure {
            return Err(ClientError::InvalidState(format!(
                "channel '{}' failed earlier: {failure}",
                self.name
            ))
            .in_channel(&self.name));
        }
        if self.finalized {
            return Err(ClientError::InvalidState(format!(
                "channel '{}' is finalized",
                self.name
            )));
        }

        match self.state.push(message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = e.to_string();
                error!(channel = %self.resource, error = %message, "Push failed, closing channel");
                if self.on_error == OnErrorPolicy::Report {
                    self.report_error(&message).await;
                }
                if let Err(close_err) = self.state.close(true).await {
                    debug!(channel = %self.resource, error = %close_err, "Error-mode close failed");
                }
                self.failure = Some(message);
                Err(e.in_channel(&self.name))
            }
        }
    }

    /// Sends the buffered messages without waiting for a threshold.
    pub async fn flush(&mut self) -> Result<()> {
        self.state.flush().await.map_err(|e| e.in_channel(&self.name))
    }

    /// Single exit path of the channel.
    ///
    /// With no error: flush, wait and close the stream. With an error: report
    /// it and close without flushing. A second call does nothing.
    pub async fn finalize(&mut self, error: Option<&str>) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        match error {
            Some(reason) => {
                self.report_error(reason).await;
                self.state.close(true).await.map_err(|e| e.in_channel(&self.name))
            }
            None => {
                if let Some(failure) = &self.failure {
                    return Err(ClientError::InvalidState(format!(
                        "channel failed before finalize: {failure}"
                    ))
                    .in_channel(&self.name));
                }
                match self.state.close(false).await {
                    Ok(()) => {
                        info!(
                            channel = %self.resource,
                            flushes = self.state.flush_count(),
                            "Channel finalized"
                        );
                        Ok(())
                    }
                    Err(e) => {
                        self.failure = Some(e.to_string());
                        Err(e.in_channel(&self.name))
                    }
                }
            }
        }
    }

    /// Attaches an error notification to the channel. Failures are logged.
    pub async fn report_error(&self, message: &str) {
        let request = NotifyCreateRequest {
            name: self.resource.clone(),
            notify_type: NotifyType::Error,
            msg: message.to_string(),
        };
        match action::run(
            self.transport.as_ref(),
            FlightAction::ChannelNotifyCreate,
            &request,
        )
        .await
        {
            Ok(()) => warn!(channel = %self.resource, error = %message, "Channel reported error"),
            Err(e) => error!(
                channel = %self.resource,
                error = %e,
                "Failed to send channel error notification"
            ),
        }
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        if !self.finalized {
            warn!(
                channel = %self.resource,
                buffered = self.state.buffered_records(),
                "Channel writer dropped without finalize; server-side resources may leak"
            );
        }
    }
}

/// Shared handle to a channel writer owned by a sequence writer.
#[derive(Clone)]
pub struct ChannelHandle {
    name: Arc<str>,
    inner: Arc<Mutex<ChannelWriter>>,
}

impl ChannelHandle {
    pub(crate) fn new(writer: ChannelWriter) -> Self {
        Self {
            name: Arc::from(writer.name()),
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffers a message; see [`ChannelWriter::push`].
    pub async fn push(&self, message: Message) -> Result<()> {
        self.inner.lock().await.push(message).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.inner.lock().await.flush().await
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.is_active()
    }

    pub async fn flush_count(&self) -> usize {
        self.inner.lock().await.flush_count()
    }

    pub(crate) async fn finalize(&self, error: Option<&str>) -> Result<()> {
        self.inner.lock().await.finalize(error).await
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle").field("name", &self.name).finish()
    }
}
