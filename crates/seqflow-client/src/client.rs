//! Client facade.
//!
//! A [`Client`] holds the control connection to the platform and, once the
//! first write session starts, a pool of data connections plus a pool of
//! flush executors shared by every session it creates.
//!
//! ## Examples
//!
//! ```ignore
//! use seqflow_client::{Client, Metadata, WriterOptions};
//!
//! let client = Client::builder()
//!     .connector(connector)
//!     .host("platform.local")
//!     .pool_size(4)
//!     .connect()
//!     .await?;
//!
//! let writer = client
//!     .create_sequence("drive_01", Metadata::new(), WriterOptions::default())
//!     .await?;
//! ```

use crate::action::{
    self, Metadata, NameRequest, Notification, NotifyListResponse, SystemInfoResponse,
};
use crate::catalog::{ChannelInfo, SequenceInfo};
use crate::channel_reader::ChannelReader;
use crate::config::{ClientConfig, WriterConfig, WriterOptions};
use crate::connection_pool::{connect_with_timeout, ConnectionPool};
use crate::error::{ClientError, Result};
use crate::executor_pool::ExecutorPool;
use crate::manifest::{parse_endpoints, ChannelManifest};
use crate::sequence_reader::SequenceReader;
use crate::sequence_writer::{SequenceWriter, Session, SessionKind};
use crate::transport::{Connector, FlightAction, FlightInfoCommand, FlightTransport};
use seqflow_core::names::{pack_resource_name, validate_channel_name, validate_sequence_name};
use seqflow_core::TimeWindow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

struct Pools {
    connections: Arc<ConnectionPool>,
    executors: Arc<ExecutorPool>,
}

/// Entry point to the platform.
pub struct Client {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    control: Arc<dyn FlightTransport>,
    pools: OnceCell<Pools>,
    closed: AtomicBool,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Validates `config` and opens the control connection.
    pub async fn connect(connector: Arc<dyn Connector>, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let control = connect_with_timeout(
            connector.as_ref(),
            &config.host,
            config.port,
            config.connect_timeout,
        )
        .await?;

        info!(
            host = %config.host,
            port = config.port,
            pool_size = config.pool_size,
            "Client connected"
        );
        Ok(Self {
            config,
            connector,
            control,
            pools: OnceCell::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the data pools have been created yet.
    pub fn pools_initialized(&self) -> bool {
        self.pools.initialized()
    }

    // ------------------------------------------------------------------
    // Write sessions
    // ------------------------------------------------------------------

    /// Registers a new sequence and returns its open writer.
    pub async fn create_sequence(
        &self,
        name: &str,
        metadata: Metadata,
        options: WriterOptions,
    ) -> Result<SequenceWriter> {
        self.start_session(name, SessionKind::Create { metadata }, options)
            .await
    }

    /// Opens a new version of an existing sequence.
    ///
    /// The channels of the previous version stay available and may be
    /// removed with [`SequenceWriter::delete_channel`].
    pub async fn new_sequence_version(
        &self,
        name: &str,
        tag: Option<&str>,
        options: WriterOptions,
    ) -> Result<SequenceWriter> {
        self.ensure_open()?;
        let available_channels = self.resolve_channels(name).await?;
        let kind = SessionKind::NewVersion {
            tag: tag.map(str::to_string),
            available_channels,
        };
        self.start_session(name, kind, options).await
    }

    async fn start_session(
        &self,
        name: &str,
        kind: SessionKind,
        options: WriterOptions,
    ) -> Result<SequenceWriter> {
        self.ensure_open()?;
        let config = WriterConfig::resolve(&self.config, &options)?;
        let (connections, executors) = match self.pools().await? {
            Some(pools) => (
                Some(Arc::clone(&pools.connections)),
                Some(Arc::clone(&pools.executors)),
            ),
            None => (None, None),
        };

        let writer = SequenceWriter::new(
            name,
            kind,
            config,
            Arc::clone(&self.control),
            connections,
            executors,
        )?;
        writer.open().await?;
        Ok(writer)
    }

    /// Data pools, created on first use. `None` in sync mode.
    async fn pools(&self) -> Result<Option<&Pools>> {
        if self.config.is_sync_mode() {
            return Ok(None);
        }
        let pools = self
            .pools
            .get_or_try_init(|| async {
                let connections = ConnectionPool::connect(
                    self.connector.as_ref(),
                    &self.config.host,
                    self.config.port,
                    self.config.pool_size,
                    self.config.connect_timeout,
                )
                .await?;
                let executors =
                    ExecutorPool::new(self.config.pool_size, self.config.executor_queue_depth)?;
                debug!(size = self.config.pool_size, "Data pools initialized");
                Ok::<_, ClientError>(Pools {
                    connections: Arc::new(connections),
                    executors: Arc::new(executors),
                })
            })
            .await?;
        Ok(Some(pools))
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Deletes a sequence and all its channels.
    pub async fn sequence_delete(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let name = validate_sequence_name(name)?;
        action::run(
            self.control.as_ref(),
            FlightAction::SequenceDelete,
            &NameRequest { name: name.clone() },
        )
        .await?;
        info!(sequence = %name, "Sequence deleted");
        Ok(())
    }

    pub async fn channel_delete(&self, sequence_name: &str, channel_name: &str) -> Result<()> {
        self.ensure_open()?;
        let resource = resource(sequence_name, channel_name)?;
        action::run(
            self.control.as_ref(),
            FlightAction::ChannelDelete,
            &NameRequest {
                name: resource.clone(),
            },
        )
        .await?;
        info!(channel = %resource, "Channel deleted");
        Ok(())
    }

    /// Names of all sequences. Empty if the server cannot be queried.
    pub async fn list_sequences(&self) -> Vec<String> {
        if self.ensure_open().is_err() {
            return Vec::new();
        }
        match self.control.list_flights().await {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "Failed to list sequences");
                Vec::new()
            }
        }
    }

    /// Channel names of a sequence. Empty if it cannot be resolved.
    pub async fn sequence_channels(&self, name: &str) -> Vec<String> {
        if self.ensure_open().is_err() {
            return Vec::new();
        }
        match self.resolve_channels(name).await {
            Ok(channels) => channels,
            Err(e) => {
                error!(sequence = %name, error = %e, "Failed to list channels");
                Vec::new()
            }
        }
    }

    /// Catalog view of a sequence. `None` if it cannot be resolved.
    pub async fn sequence_info(&self, name: &str) -> Option<SequenceInfo> {
        if self.ensure_open().is_err() {
            return None;
        }
        match self.fetch_sequence_info(name).await {
            Ok(info) => Some(info),
            Err(e) => {
                error!(sequence = %name, error = %e, "Failed to fetch sequence info");
                None
            }
        }
    }

    async fn fetch_sequence_info(&self, name: &str) -> Result<SequenceInfo> {
        let name = validate_sequence_name(name)?;
        let manifests = self.manifests(name.clone()).await?;
        let system: SystemInfoResponse = action::call(
            self.control.as_ref(),
            FlightAction::SequenceSystemInfo,
            &NameRequest { name: name.clone() },
        )
        .await?;
        Ok(SequenceInfo::assemble(name, &manifests, system))
    }

    /// Catalog view of a channel. `None` if it cannot be resolved.
    pub async fn channel_info(
        &self,
        sequence_name: &str,
        channel_name: &str,
    ) -> Option<ChannelInfo> {
        if self.ensure_open().is_err() {
            return None;
        }
        match self.fetch_channel_info(sequence_name, channel_name).await {
            Ok(info) => Some(info),
            Err(e) => {
                error!(sequence = %sequence_name, channel = %channel_name, error = %e, "Failed to fetch channel info");
                None
            }
        }
    }

    async fn fetch_channel_info(
        &self,
        sequence_name: &str,
        channel_name: &str,
    ) -> Result<ChannelInfo> {
        let name = resource(sequence_name, channel_name)?;
        let manifest = self
            .manifests(name.clone())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("channel '{name}'")))?;
        let system: SystemInfoResponse = action::call(
            self.control.as_ref(),
            FlightAction::ChannelSystemInfo,
            &NameRequest { name },
        )
        .await?;
        Ok(ChannelInfo::assemble(manifest, system))
    }

    async fn manifests(&self, resource_locator: String) -> Result<Vec<ChannelManifest>> {
        let endpoints = self
            .control
            .get_flight_info(&FlightInfoCommand::new(
                resource_locator,
                TimeWindow::unbounded(),
            ))
            .await?;
        Ok(parse_endpoints(endpoints)
            .into_iter()
            .map(|(manifest, _)| manifest)
            .collect())
    }

    async fn resolve_channels(&self, name: &str) -> Result<Vec<String>> {
        let name = validate_sequence_name(name)?;
        Ok(self
            .manifests(name)
            .await?
            .into_iter()
            .map(|manifest| manifest.channel_name)
            .collect())
    }

    pub async fn list_sequence_notifications(&self, name: &str) -> Vec<Notification> {
        match validate_sequence_name(name) {
            Ok(name) => {
                self.list_notifications(FlightAction::SequenceNotifyList, name)
                    .await
            }
            Err(e) => {
                error!(sequence = %name, error = %e, "Invalid sequence name");
                Vec::new()
            }
        }
    }

    pub async fn clear_sequence_notifications(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let name = validate_sequence_name(name)?;
        action::run(
            self.control.as_ref(),
            FlightAction::SequenceNotifyPurge,
            &NameRequest { name },
        )
        .await
    }

    pub async fn list_channel_notifications(
        &self,
        sequence_name: &str,
        channel_name: &str,
    ) -> Vec<Notification> {
        match resource(sequence_name, channel_name) {
            Ok(name) => {
                self.list_notifications(FlightAction::ChannelNotifyList, name)
                    .await
            }
            Err(e) => {
                error!(sequence = %sequence_name, channel = %channel_name, error = %e, "Invalid channel name");
                Vec::new()
            }
        }
    }

    pub async fn clear_channel_notifications(
        &self,
        sequence_name: &str,
        channel_name: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        let name = resource(sequence_name, channel_name)?;
        action::run(
            self.control.as_ref(),
            FlightAction::ChannelNotifyPurge,
            &NameRequest { name },
        )
        .await
    }

    async fn list_notifications(&self, action: FlightAction, name: String) -> Vec<Notification> {
        if self.ensure_open().is_err() {
            return Vec::new();
        }
        let response: Result<NotifyListResponse> = action::call(
            self.control.as_ref(),
            action,
            &NameRequest { name: name.clone() },
        )
        .await;
        match response {
            Ok(list) => list.notifies,
            Err(e) => {
                error!(resource = %name, action = %action, error = %e, "Failed to list notifications");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------

    /// Opens a time-ordered merge over the channels of a sequence.
    pub async fn open_sequence_stream(
        &self,
        name: &str,
        channels: Option<&[&str]>,
        window: TimeWindow,
    ) -> Result<SequenceReader> {
        self.ensure_open()?;
        SequenceReader::open(self.control.as_ref(), name, channels, window).await
    }

    pub async fn open_channel_stream(
        &self,
        sequence_name: &str,
        channel_name: &str,
        window: TimeWindow,
    ) -> Result<ChannelReader> {
        self.ensure_open()?;
        ChannelReader::connect(self.control.as_ref(), sequence_name, channel_name, window).await
    }

    /// Shuts down the pools and the control connection.
    ///
    /// Writers still holding pooled resources fail on their next channel
    /// creation. A second call is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(pools) = self.pools.get() {
            if let Err(e) = pools.executors.close().await {
                warn!(error = %e, "Failed to close executor pool");
            }
            if let Err(e) = pools.connections.close().await {
                warn!(error = %e, "Failed to close connection pool");
            }
        }
        self.control.close().await?;
        info!(host = %self.config.host, "Client closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::InvalidState("client is closed".to_string()));
        }
        Ok(())
    }
}

fn resource(sequence_name: &str, channel_name: &str) -> Result<String> {
    Ok(pack_resource_name(
        &validate_sequence_name(sequence_name)?,
        &validate_channel_name(channel_name)?,
    ))
}

/// Builder for [`Client`]. A connector is required.
pub struct ClientBuilder {
    connector: Option<Arc<dyn Connector>>,
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            connector: None,
            config: ClientConfig::default(),
        }
    }

    /// Transport factory used for the control and pooled connections.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// `0` selects sync mode.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    pub fn executor_queue_depth(mut self, depth: usize) -> Self {
        self.config.executor_queue_depth = depth;
        self
    }

    pub fn max_batch_size_bytes(mut self, bytes: usize) -> Self {
        self.config.max_batch_size_bytes = bytes;
        self
    }

    pub fn max_batch_size_records(mut self, records: usize) -> Self {
        self.config.max_batch_size_records = records;
        self
    }

    pub async fn connect(self) -> Result<Client> {
        let connector = self
            .connector
            .ok_or_else(|| ClientError::Config("connector is required".to_string()))?;
        Client::connect(connector, self.config).await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryServer;

    #[tokio::test]
    async fn test_builder_requires_connector() {
        let result = Client::builder().connect().await;
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let server = InMemoryServer::new();
        server.set_unreachable(true);
        let result = Client::builder()
            .connector(server.connector())
            .connect()
            .await;
        assert!(matches!(result, Err(ClientError::Connection(_, _))));
    }

    #[tokio::test]
    async fn test_pools_are_lazy() {
        let server = InMemoryServer::new();
        let client = Client::builder()
            .connector(server.connector())
            .pool_size(3)
            .connect()
            .await
            .unwrap();
        assert!(!client.pools_initialized());
        assert_eq!(server.connections_opened(), 1);

        client
            .create_sequence("lazy", Metadata::new(), WriterOptions::default())
            .await
            .unwrap();
        assert!(client.pools_initialized());
        assert_eq!(server.connections_opened(), 4);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let server = InMemoryServer::new();
        let client = Client::builder()
            .connector(server.connector())
            .pool_size(0)
            .connect()
            .await
            .unwrap();
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(client.is_closed());
        assert!(client.list_sequences().await.is_empty());
        assert!(matches!(
            client.sequence_delete("x").await,
            Err(ClientError::InvalidState(_))
        ));
    }
}
