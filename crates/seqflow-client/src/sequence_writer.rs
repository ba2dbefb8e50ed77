//! Write-session orchestrator.
//!
//! A [`SequenceWriter`] owns one ingestion session on the server. It
//! registers the sequence, creates channels on pooled resources and decides
//! the fate of the sequence when the session ends.
//!
//! ## Lifecycle
//!
//! ```text
//!   Null ──open()──▶ Pending ──close(Success)──▶ Finalized
//!                       │
//!                       └──close(Failed) / channel failure──▶ Error
//! ```
//!
//! ## Closing
//!
//! On success every channel is finalized first and failures are collected
//! rather than short-circuited. Only if all channels finalized cleanly is the
//! sequence finalized. Otherwise, or when the session failed, every channel
//! is closed in error mode and exactly one terminal action runs, chosen by
//! [`OnErrorPolicy`]: abort (`Delete`) or an error notification (`Report`).
//!
//! ## Multi-lane Writes
//!
//! Each new channel takes the next pooled connection and the next pooled
//! executor. Without pools (sync mode) channels share the control connection
//! and flush inline.
//!
//! ## Examples
//!
//! ```ignore
//! let writer = client.create_sequence("drive_01", Metadata::new(), WriterOptions::default()).await?;
//! writer
//!     .run(|w| async move {
//!         let imu = w.create_channel("front/imu", imu_schema, Metadata::new()).await?;
//!         imu.push(message).await?;
//!         Ok(())
//!     })
//!     .await?;
//! ```

use crate::action::{
    self, ChannelCreateRequest, KeyResponse, Metadata, NameKeyRequest, NameRequest,
    NotifyCreateRequest, NotifyType, SequenceCreateRequest, SequenceNewVersionRequest,
};
use crate::channel_writer::{ChannelHandle, ChannelWriter};
use crate::config::{OnErrorPolicy, SequenceStatus, WriterConfig};
use crate::connection_pool::ConnectionPool;
use crate::error::{ClientError, Result};
use crate::executor_pool::ExecutorPool;
use crate::transport::{FlightAction, FlightTransport};
use async_trait::async_trait;
use seqflow_core::names::{pack_resource_name, validate_channel_name, validate_sequence_name};
use seqflow_core::PayloadSchema;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// How a session registers itself with the server.
#[derive(Debug, Clone)]
pub enum SessionKind {
    /// A brand-new sequence.
    Create { metadata: Metadata },
    /// A new version of an existing sequence. `available_channels` are the
    /// channels inherited from the previous version.
    NewVersion {
        tag: Option<String>,
        available_channels: Vec<String>,
    },
}

/// How the caller's session block ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Success,
    Failed(String),
}

/// Two-phase session lifecycle.
#[async_trait]
pub trait Session: Send + Sync {
    /// Registers the session server-side. Null → Pending.
    async fn open(&self) -> Result<()>;

    /// Finalizes or tears down the session. Only the first call acts.
    async fn close(&self, outcome: SessionOutcome) -> Result<()>;

    async fn status(&self) -> SequenceStatus;
}

struct WriterInner {
    status: SequenceStatus,
    key: Option<String>,
    channels: Vec<ChannelHandle>,
    available_channels: Vec<String>,
}

struct Shared {
    name: String,
    kind: SessionKind,
    config: WriterConfig,
    control: Arc<dyn FlightTransport>,
    connections: Option<Arc<ConnectionPool>>,
    executors: Option<Arc<ExecutorPool>>,
    inner: Mutex<WriterInner>,
}

/// Handle to one write session. Clones share the session.
#[derive(Clone)]
pub struct SequenceWriter {
    shared: Arc<Shared>,
}

impl SequenceWriter {
    /// Builds an unopened writer. Call [`Session::open`] before use.
    pub fn new(
        name: &str,
        kind: SessionKind,
        config: WriterConfig,
        control: Arc<dyn FlightTransport>,
        connections: Option<Arc<ConnectionPool>>,
        executors: Option<Arc<ExecutorPool>>,
    ) -> Result<Self> {
        let name = validate_sequence_name(name)?;
        let available_channels = match &kind {
            SessionKind::NewVersion {
                available_channels, ..
            } => available_channels.clone(),
            SessionKind::Create { .. } => Vec::new(),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                name,
                kind,
                config,
                control,
                connections,
                executors,
                inner: Mutex::new(WriterInner {
                    status: SequenceStatus::Null,
                    key: None,
                    channels: Vec::new(),
                    available_channels,
                }),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &WriterConfig {
        &self.shared.config
    }

    pub fn kind(&self) -> &SessionKind {
        &self.shared.kind
    }

    /// Registers a channel and returns its writer.
    ///
    /// If the channel is registered but its writer cannot be built, the
    /// channel is deleted again before the error is returned.
    pub async fn create_channel(
        &self,
        name: &str,
        schema: PayloadSchema,
        metadata: Metadata,
    ) -> Result<ChannelHandle> {
        let channel_name = validate_channel_name(name)?;
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        if inner.status != SequenceStatus::Pending {
            return Err(ClientError::InvalidState(format!(
                "cannot create channel '{channel_name}' on sequence '{}' in state {}",
                shared.name, inner.status
            )));
        }
        if inner.channels.iter().any(|c| c.name() == channel_name) {
            error!(sequence = %shared.name, channel = %channel_name, "Channel already exists in this session");
            return Err(ClientError::AlreadyExists(channel_name));
        }

        let sequence_key = inner.key.clone().ok_or_else(|| {
            ClientError::Internal("pending sequence without a key".to_string())
        })?;
        let resource = pack_resource_name(&shared.name, &channel_name);

        debug!(sequence = %shared.name, channel = %channel_name, "Requesting new channel");
        let response: KeyResponse = action::call(
            shared.control.as_ref(),
            FlightAction::ChannelCreate,
            &ChannelCreateRequest {
                sequence_key,
                name: resource.clone(),
                ontology_tag: schema.tag().to_string(),
                user_metadata: metadata,
            },
        )
        .await
        .map_err(|e| {
            error!(channel = %resource, error = %e, "Channel registration failed");
            e
        })?;

        let schema = Arc::new(schema);
        let built = async {
            let transport = match &shared.connections {
                Some(pool) => pool.get_next()?,
                None => Arc::clone(&shared.control),
            };
            let executor = match &shared.executors {
                Some(pool) => Some(pool.get_next()?),
                None => None,
            };
            ChannelWriter::create(
                &shared.name,
                &channel_name,
                response.key,
                schema,
                transport,
                executor,
                &shared.config,
            )
            .await
        }
        .await;

        match built {
            Ok(writer) => {
                let handle = ChannelHandle::new(writer);
                inner.channels.push(handle.clone());
                info!(sequence = %shared.name, channel = %channel_name, "Channel created");
                Ok(handle)
            }
            Err(e) => {
                error!(
                    channel = %resource,
                    error = %e,
                    "Channel writer setup failed, deleting registered channel"
                );
                if let Err(delete_err) = action::run(
                    shared.control.as_ref(),
                    FlightAction::ChannelDelete,
                    &NameRequest { name: resource.clone() },
                )
                .await
                {
                    error!(channel = %resource, error = %delete_err, "Compensating channel delete failed");
                }
                Err(e)
            }
        }
    }

    /// Removes a channel inherited from the previous sequence version.
    pub async fn delete_channel(&self, name: &str) -> Result<()> {
        let channel_name = validate_channel_name(name)?;
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        if !matches!(shared.kind, SessionKind::NewVersion { .. }) {
            return Err(ClientError::InvalidState(
                "channels can only be deleted from a new sequence version".to_string(),
            ));
        }
        if inner.status != SequenceStatus::Pending {
            return Err(ClientError::InvalidState(format!(
                "sequence '{}' is {}",
                shared.name, inner.status
            )));
        }
        let Some(position) = inner
            .available_channels
            .iter()
            .position(|c| *c == channel_name)
        else {
            return Err(ClientError::NotFound(format!(
                "channel '{channel_name}' does not belong to sequence '{}'",
                shared.name
            )));
        };

        action::run(
            shared.control.as_ref(),
            FlightAction::ChannelDelete,
            &NameRequest {
                name: pack_resource_name(&shared.name, &channel_name),
            },
        )
        .await?;
        inner.available_channels.remove(position);
        info!(sequence = %shared.name, channel = %channel_name, "Inherited channel deleted");
        Ok(())
    }

    /// Channels inherited from the previous version and not deleted.
    pub async fn available_channels(&self) -> Vec<String> {
        self.shared.inner.lock().await.available_channels.clone()
    }

    pub async fn channel(&self, name: &str) -> Option<ChannelHandle> {
        let name = validate_channel_name(name).ok()?;
        self.shared
            .inner
            .lock()
            .await
            .channels
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    pub async fn channel_exists(&self, name: &str) -> bool {
        self.channel(name).await.is_some()
    }

    /// Channel names in creation order.
    pub async fn list_channels(&self) -> Vec<String> {
        self.shared
            .inner
            .lock()
            .await
            .channels
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Runs `f` inside the session and closes it exactly once.
    ///
    /// `Ok` finalizes the sequence; `Err` runs the error path and is returned
    /// unchanged.
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(SequenceWriter) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.status().await != SequenceStatus::Pending {
            return Err(ClientError::InvalidState(format!(
                "sequence '{}' is not open",
                self.shared.name
            )));
        }

        match f(self.clone()).await {
            Ok(value) => {
                self.close(SessionOutcome::Success).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(close_err) = self.close(SessionOutcome::Failed(e.to_string())).await {
                    error!(
                        sequence = %self.shared.name,
                        error = %close_err,
                        "Error path of the session failed"
                    );
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Session for SequenceWriter {
    async fn open(&self) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        if inner.status != SequenceStatus::Null {
            return Err(ClientError::InvalidState(format!(
                "sequence '{}' already opened ({})",
                shared.name, inner.status
            )));
        }

        let response: KeyResponse = match &shared.kind {
            SessionKind::Create { metadata } => {
                action::call(
                    shared.control.as_ref(),
                    FlightAction::SequenceCreate,
                    &SequenceCreateRequest {
                        name: shared.name.clone(),
                        user_metadata: metadata.clone(),
                    },
                )
                .await?
            }
            SessionKind::NewVersion { tag, .. } => {
                action::call(
                    shared.control.as_ref(),
                    FlightAction::SequenceNewVersion,
                    &SequenceNewVersionRequest {
                        name: shared.name.clone(),
                        tag_name: tag.clone(),
                    },
                )
                .await?
            }
        };

        inner.key = Some(response.key);
        inner.status = SequenceStatus::Pending;
        info!(sequence = %shared.name, "Sequence session opened");
        Ok(())
    }

    async fn close(&self, outcome: SessionOutcome) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        match inner.status {
            SequenceStatus::Pending => {}
            SequenceStatus::Null => {
                return Err(ClientError::InvalidState(format!(
                    "sequence '{}' was never opened",
                    shared.name
                )))
            }
            SequenceStatus::Finalized | SequenceStatus::Error => return Ok(()),
        }

        let teardown = Teardown::capture(&shared.name, &shared.config, &shared.control, &inner);

        let reason = match outcome {
            SessionOutcome::Failed(reason) => reason,
            SessionOutcome::Success => match finalize_channels(&teardown.channels).await {
                Ok(()) => {
                    let result = action::run(
                        shared.control.as_ref(),
                        FlightAction::SequenceFinalize,
                        &NameKeyRequest {
                            name: shared.name.clone(),
                            key: teardown.key.clone(),
                        },
                    )
                    .await;
                    return match result {
                        Ok(()) => {
                            inner.status = SequenceStatus::Finalized;
                            info!(sequence = %shared.name, "Sequence finalized");
                            Ok(())
                        }
                        Err(e) => {
                            inner.status = SequenceStatus::Error;
                            error!(
                                sequence = %shared.name,
                                error = %e,
                                "Sequence finalize failed; server state may be inconsistent"
                            );
                            Err(e)
                        }
                    };
                }
                Err(channels_err) => {
                    let reason = channels_err.to_string();
                    inner.status = SequenceStatus::Error;
                    if let Err(e) = teardown.run(&reason).await {
                        error!(sequence = %shared.name, error = %e, "Sequence teardown failed");
                    }
                    return Err(channels_err);
                }
            },
        };

        inner.status = SequenceStatus::Error;
        teardown.run(&reason).await
    }

    async fn status(&self) -> SequenceStatus {
        self.shared.inner.lock().await.status
    }
}

/// Finalizes every channel, collecting failures.
async fn finalize_channels(channels: &[ChannelHandle]) -> Result<()> {
    let mut failed = Vec::new();
    let mut first = None;
    for channel in channels {
        if let Err(e) = channel.finalize(None).await {
            error!(channel = %channel.name(), error = %e, "Channel finalize failed");
            failed.push(channel.name().to_string());
            first.get_or_insert(e);
        }
    }
    match first {
        None => Ok(()),
        Some(first) => Err(ClientError::ChannelsFailed {
            failed,
            first: Box::new(first),
        }),
    }
}

/// Everything the error path needs, detached from the writer lock.
struct Teardown {
    name: String,
    key: String,
    policy: OnErrorPolicy,
    control: Arc<dyn FlightTransport>,
    channels: Vec<ChannelHandle>,
}

impl Teardown {
    fn capture(
        name: &str,
        config: &WriterConfig,
        control: &Arc<dyn FlightTransport>,
        inner: &WriterInner,
    ) -> Self {
        Self {
            name: name.to_string(),
            key: inner.key.clone().unwrap_or_default(),
            policy: config.on_error,
            control: Arc::clone(control),
            channels: inner.channels.clone(),
        }
    }

    /// Closes every channel in error mode, then aborts or reports the
    /// sequence according to the policy.
    async fn run(&self, reason: &str) -> Result<()> {
        for channel in &self.channels {
            if let Err(e) = channel.finalize(Some(reason)).await {
                warn!(channel = %channel.name(), error = %e, "Error-mode channel close failed");
            }
        }

        match self.policy {
            OnErrorPolicy::Delete => {
                action::run(
                    self.control.as_ref(),
                    FlightAction::SequenceAbort,
                    &NameKeyRequest {
                        name: self.name.clone(),
                        key: self.key.clone(),
                    },
                )
                .await?;
                info!(sequence = %self.name, reason = %reason, "Sequence aborted");
            }
            OnErrorPolicy::Report => {
                action::run(
                    self.control.as_ref(),
                    FlightAction::SequenceNotifyCreate,
                    &NotifyCreateRequest {
                        name: self.name.clone(),
                        notify_type: NotifyType::Error,
                        msg: reason.to_string(),
                    },
                )
                .await?;
                info!(sequence = %self.name, reason = %reason, "Sequence error reported");
            }
        }
        Ok(())
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let Shared {
            name,
            config,
            control,
            inner,
            ..
        } = self;
        let inner = inner.get_mut();
        if inner.status != SequenceStatus::Pending {
            return;
        }

        warn!(
            sequence = %name,
            "Sequence writer dropped while pending, running error path"
        );
        let teardown = Teardown::capture(name, config, control, inner);
        inner.status = SequenceStatus::Error;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = teardown
                        .run("sequence writer dropped before the session was closed")
                        .await
                    {
                        error!(sequence = %teardown.name, error = %e, "Dropped-writer teardown failed");
                    }
                });
            }
            Err(_) => error!(
                sequence = %name,
                "No tokio runtime to clean up dropped sequence writer; server-side data may leak"
            ),
        }
    }
}
