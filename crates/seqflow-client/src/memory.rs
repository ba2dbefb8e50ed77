//! In-memory server and transport.
//!
//! [`InMemoryServer`] implements the control and data planes the pipeline
//! talks to: sequences and channels with authorization keys, notifications,
//! endpoint resolution with timestamp manifests, and bulk put/get streams of
//! [`RecordBatch`]es. Tests and the demo binary connect to it through
//! [`InMemoryServer::connector`].
//!
//! ## Fault Injection
//!
//! - `set_unreachable`: every new connection fails
//! - `fail_connections_after(n)`: connections after the n-th fail
//! - `fail_puts(resource)`: opening the put stream of one channel fails
//! - `fail_writes(resource)`: batch writes to one channel fail
//! - `fail_action(action)`: one control action always fails
//!
//! ## Examples
//!
//! ```ignore
//! let server = InMemoryServer::new();
//! let client = Client::builder().connector(server.connector()).connect().await?;
//! ```

use crate::action::{
    ChannelCreateRequest, KeyResponse, Metadata, NameKeyRequest, NameRequest,
    Notification, NotifyCreateRequest, NotifyListResponse, SequenceCreateRequest,
    SequenceNewVersionRequest, SystemInfoResponse,
};
use crate::error::{ClientError, Result};
use crate::manifest::ChannelManifest;
use crate::transport::{
    Connector, DoPutCommand, FlightAction, FlightEndpoint, FlightInfoCommand, FlightTransport,
    GetStream, PutStream, Ticket,
};
use async_trait::async_trait;
use bytes::Bytes;
use seqflow_core::names::unpack_resource_name;
use seqflow_core::{PayloadSchema, RecordBatch, TimeWindow};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoredStatus {
    Pending,
    Finalized,
}

struct StoredChannel {
    name: String,
    key: String,
    ontology_tag: String,
    metadata: Metadata,
    created_at_ms: i64,
    schema: Option<Arc<PayloadSchema>>,
    batches: Vec<RecordBatch>,
    notifications: Vec<Notification>,
    committed: bool,
}

impl StoredChannel {
    fn bounds(&self) -> Option<(i64, i64)> {
        self.batches
            .iter()
            .filter_map(RecordBatch::time_bounds)
            .reduce(|(lo, hi), (min, max)| (lo.min(min), hi.max(max)))
    }

    fn rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    fn size_bytes(&self) -> u64 {
        self.batches.iter().map(|b| b.size_bytes() as u64).sum()
    }

    fn system_info(&self) -> SystemInfoResponse {
        SystemInfoResponse {
            user_metadata: self.metadata.clone(),
            created_at_ms: self.created_at_ms,
            is_locked: self.committed,
            total_size_bytes: self.size_bytes(),
            chunks_number: Some(self.batches.len()),
            ontology_tag: Some(self.ontology_tag.clone()),
        }
    }
}

struct StoredSequence {
    key: String,
    status: StoredStatus,
    metadata: Metadata,
    created_at_ms: i64,
    versions: Vec<Option<String>>,
    channels: Vec<StoredChannel>,
    notifications: Vec<Notification>,
}

impl StoredSequence {
    fn channel(&self, name: &str) -> Option<&StoredChannel> {
        self.channels.iter().find(|c| c.name == name)
    }

    fn channel_mut(&mut self, name: &str) -> Option<&mut StoredChannel> {
        self.channels.iter_mut().find(|c| c.name == name)
    }

    fn system_info(&self) -> SystemInfoResponse {
        SystemInfoResponse {
            user_metadata: self.metadata.clone(),
            created_at_ms: self.created_at_ms,
            is_locked: self.status == StoredStatus::Finalized,
            total_size_bytes: self.channels.iter().map(StoredChannel::size_bytes).sum(),
            chunks_number: None,
            ontology_tag: None,
        }
    }
}

#[derive(Default)]
struct ServerState {
    sequences: BTreeMap<String, StoredSequence>,
    unreachable: bool,
    connection_limit: Option<usize>,
    connections_opened: usize,
    failing_puts: HashSet<String>,
    failing_writes: HashSet<String>,
    failing_actions: HashSet<FlightAction>,
}

/// Shared in-memory server. Clones refer to the same state.
#[derive(Clone, Default)]
pub struct InMemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(InMemoryConnector {
            server: self.clone(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ServerState>> {
        self.state
            .lock()
            .map_err(|_| ClientError::Internal("in-memory server state poisoned".to_string()))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ServerState) -> T) -> Option<T> {
        self.state.lock().ok().map(|mut state| f(&mut *state))
    }

    // --- fault injection ---

    pub fn set_unreachable(&self, unreachable: bool) {
        self.with_state(|s| s.unreachable = unreachable);
    }

    /// Lets `n` more connections succeed, then fails the rest.
    pub fn fail_connections_after(&self, n: usize) {
        self.with_state(|s| s.connection_limit = Some(s.connections_opened + n));
    }

    pub fn fail_puts(&self, sequence_name: &str, channel_name: &str) {
        let resource = format!("{sequence_name}/{channel_name}");
        self.with_state(|s| s.failing_puts.insert(resource));
    }

    pub fn fail_writes(&self, sequence_name: &str, channel_name: &str) {
        let resource = format!("{sequence_name}/{channel_name}");
        self.with_state(|s| s.failing_writes.insert(resource));
    }

    pub fn fail_action(&self, action: FlightAction) {
        self.with_state(|s| s.failing_actions.insert(action));
    }

    pub fn clear_faults(&self) {
        self.with_state(|s| {
            s.unreachable = false;
            s.connection_limit = None;
            s.failing_puts.clear();
            s.failing_writes.clear();
            s.failing_actions.clear();
        });
    }

    // --- inspection ---

    pub fn sequence_names(&self) -> Vec<String> {
        self.with_state(|s| s.sequences.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_finalized(&self, sequence_name: &str) -> Option<bool> {
        self.with_state(|s| {
            s.sequences
                .get(sequence_name)
                .map(|seq| seq.status == StoredStatus::Finalized)
        })
        .flatten()
    }

    pub fn channel_names(&self, sequence_name: &str) -> Vec<String> {
        self.with_state(|s| {
            s.sequences
                .get(sequence_name)
                .map(|seq| seq.channels.iter().map(|c| c.name.clone()).collect())
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }

    /// Rows stored for a channel, `None` if it does not exist.
    pub fn channel_rows(&self, sequence_name: &str, channel_name: &str) -> Option<usize> {
        self.with_state(|s| {
            s.sequences
                .get(sequence_name)
                .and_then(|seq| seq.channel(channel_name))
                .map(StoredChannel::rows)
        })
        .flatten()
    }

    pub fn channel_batches(&self, sequence_name: &str, channel_name: &str) -> Option<usize> {
        self.with_state(|s| {
            s.sequences
                .get(sequence_name)
                .and_then(|seq| seq.channel(channel_name))
                .map(|c| c.batches.len())
        })
        .flatten()
    }

    pub fn sequence_notifications(&self, sequence_name: &str) -> Vec<Notification> {
        self.with_state(|s| {
            s.sequences
                .get(sequence_name)
                .map(|seq| seq.notifications.clone())
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }

    pub fn channel_notifications(&self, sequence_name: &str, channel_name: &str) -> Vec<Notification> {
        self.with_state(|s| {
            s.sequences
                .get(sequence_name)
                .and_then(|seq| seq.channel(channel_name))
                .map(|c| c.notifications.clone())
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }

    pub fn connections_opened(&self) -> usize {
        self.with_state(|s| s.connections_opened).unwrap_or(0)
    }

    // --- control plane ---

    fn handle_action(&self, action: FlightAction, body: &[u8]) -> Result<Option<Bytes>> {
        let mut state = self.lock()?;
        if state.failing_actions.contains(&action) {
            return Err(ClientError::action(action, "injected failure"));
        }
        trace!(action = %action, "In-memory action");

        match action {
            FlightAction::SequenceCreate => {
                let req: SequenceCreateRequest = decode(action, body)?;
                if state.sequences.contains_key(&req.name) {
                    return Err(ClientError::action(
                        action,
                        format!("sequence '{}' already exists", req.name),
                    ));
                }
                let key = Uuid::new_v4().to_string();
                state.sequences.insert(
                    req.name,
                    StoredSequence {
                        key: key.clone(),
                        status: StoredStatus::Pending,
                        metadata: req.user_metadata,
                        created_at_ms: now_ms(),
                        versions: vec![None],
                        channels: Vec::new(),
                        notifications: Vec::new(),
                    },
                );
                encode(&KeyResponse { key })
            }
            FlightAction::SequenceNewVersion => {
                let req: SequenceNewVersionRequest = decode(action, body)?;
                let seq = sequence_mut(&mut state, action, &req.name)?;
                if seq.status != StoredStatus::Finalized {
                    return Err(ClientError::action(
                        action,
                        format!("sequence '{}' has a version in progress", req.name),
                    ));
                }
                seq.key = Uuid::new_v4().to_string();
                seq.status = StoredStatus::Pending;
                seq.versions.push(req.tag_name);
                encode(&KeyResponse {
                    key: seq.key.clone(),
                })
            }
            FlightAction::SequenceFinalize => {
                let req: NameKeyRequest = decode(action, body)?;
                let seq = sequence_mut(&mut state, action, &req.name)?;
                check_key(action, &seq.key, &req.key)?;
                if seq.status != StoredStatus::Pending {
                    return Err(ClientError::action(action, "sequence is not pending"));
                }
                seq.status = StoredStatus::Finalized;
                Ok(None)
            }
            FlightAction::SequenceAbort => {
                let req: NameKeyRequest = decode(action, body)?;
                let seq = sequence_mut(&mut state, action, &req.name)?;
                check_key(action, &seq.key, &req.key)?;
                if seq.status == StoredStatus::Finalized {
                    return Err(ClientError::action(action, "sequence is finalized"));
                }
                state.sequences.remove(&req.name);
                Ok(None)
            }
            FlightAction::SequenceDelete => {
                let req: NameRequest = decode(action, body)?;
                state
                    .sequences
                    .remove(&req.name)
                    .ok_or_else(|| not_found(action, &req.name))?;
                Ok(None)
            }
            FlightAction::SequenceNotifyCreate => {
                let req: NotifyCreateRequest = decode(action, body)?;
                let seq = sequence_mut(&mut state, action, &req.name)?;
                seq.notifications.push(notification(req));
                Ok(None)
            }
            FlightAction::SequenceNotifyList => {
                let req: NameRequest = decode(action, body)?;
                let seq = sequence_mut(&mut state, action, &req.name)?;
                encode(&NotifyListResponse {
                    notifies: seq.notifications.clone(),
                })
            }
            FlightAction::SequenceNotifyPurge => {
                let req: NameRequest = decode(action, body)?;
                sequence_mut(&mut state, action, &req.name)?
                    .notifications
                    .clear();
                Ok(None)
            }
            FlightAction::SequenceSystemInfo => {
                let req: NameRequest = decode(action, body)?;
                encode(&sequence_mut(&mut state, action, &req.name)?.system_info())
            }
            FlightAction::ChannelCreate => {
                let req: ChannelCreateRequest = decode(action, body)?;
                let (seq_name, channel_name) = split(action, &req.name)?;
                let seq = sequence_mut(&mut state, action, &seq_name)?;
                check_key(action, &seq.key, &req.sequence_key)?;
                if seq.status != StoredStatus::Pending {
                    return Err(ClientError::action(action, "sequence is not pending"));
                }
                if seq.channel(&channel_name).is_some() {
                    return Err(ClientError::action(
                        action,
                        format!("channel '{}' already exists", req.name),
                    ));
                }
                let key = Uuid::new_v4().to_string();
                seq.channels.push(StoredChannel {
                    name: channel_name,
                    key: key.clone(),
                    ontology_tag: req.ontology_tag,
                    metadata: req.user_metadata,
                    created_at_ms: now_ms(),
                    schema: None,
                    batches: Vec::new(),
                    notifications: Vec::new(),
                    committed: false,
                });
                encode(&KeyResponse { key })
            }
            FlightAction::ChannelDelete => {
                let req: NameRequest = decode(action, body)?;
                let (seq_name, channel_name) = split(action, &req.name)?;
                let seq = sequence_mut(&mut state, action, &seq_name)?;
                let before = seq.channels.len();
                seq.channels.retain(|c| c.name != channel_name);
                if seq.channels.len() == before {
                    return Err(not_found(action, &req.name));
                }
                Ok(None)
            }
            FlightAction::ChannelNotifyCreate => {
                let req: NotifyCreateRequest = decode(action, body)?;
                let channel = channel_mut(&mut state, action, &req.name)?;
                channel.notifications.push(notification(req));
                Ok(None)
            }
            FlightAction::ChannelNotifyList => {
                let req: NameRequest = decode(action, body)?;
                let channel = channel_mut(&mut state, action, &req.name)?;
                encode(&NotifyListResponse {
                    notifies: channel.notifications.clone(),
                })
            }
            FlightAction::ChannelNotifyPurge => {
                let req: NameRequest = decode(action, body)?;
                channel_mut(&mut state, action, &req.name)?
                    .notifications
                    .clear();
                Ok(None)
            }
            FlightAction::ChannelSystemInfo => {
                let req: NameRequest = decode(action, body)?;
                encode(&channel_mut(&mut state, action, &req.name)?.system_info())
            }
        }
    }

    fn endpoints(&self, command: &FlightInfoCommand) -> Result<Vec<FlightEndpoint>> {
        let state = self.lock()?;
        let (seq_name, only_channel) = match unpack_resource_name(&command.resource_locator) {
            Some((seq, channel)) => (seq, Some(channel)),
            None => (command.resource_locator.trim_start_matches('/').to_string(), None),
        };
        let seq = state
            .sequences
            .get(&seq_name)
            .ok_or_else(|| ClientError::NotFound(format!("sequence '{seq_name}'")))?;

        let mut endpoints = Vec::new();
        for channel in &seq.channels {
            if only_channel.as_ref().is_some_and(|only| *only != channel.name) {
                continue;
            }
            let ticket = FlightInfoCommand {
                resource_locator: format!("{seq_name}/{}", channel.name),
                timestamp_ns_start: command.timestamp_ns_start,
                timestamp_ns_end: command.timestamp_ns_end,
            };
            endpoints.push(FlightEndpoint {
                location: Some(ChannelManifest::location(&seq_name, &channel.name)),
                ticket: Ticket(Bytes::from(serde_json::to_vec(&ticket)?)),
                app_metadata: ChannelManifest::encode_bounds(channel.bounds()),
            });
        }

        if let Some(only) = only_channel {
            if endpoints.is_empty() {
                return Err(ClientError::NotFound(format!("channel '{seq_name}/{only}'")));
            }
        }
        Ok(endpoints)
    }

    fn open_put(&self, command: &DoPutCommand, schema: Arc<PayloadSchema>) -> Result<()> {
        let mut state = self.lock()?;
        let action = "do_put";
        if state.failing_puts.contains(&command.resource_locator) {
            return Err(ClientError::action(action, "injected put failure"));
        }
        let channel = channel_mut(&mut state, action, &command.resource_locator)?;
        check_key(action, &channel.key, &command.key)?;
        if channel.ontology_tag != schema.tag() {
            return Err(ClientError::action(
                action,
                format!(
                    "schema '{}' does not match channel type '{}'",
                    schema.tag(),
                    channel.ontology_tag
                ),
            ));
        }
        channel.schema = Some(schema);
        Ok(())
    }

    fn append(&self, resource: &str, batch: RecordBatch) -> Result<()> {
        let mut state = self.lock()?;
        if state.failing_writes.contains(resource) {
            return Err(ClientError::Connection(
                "memory".to_string(),
                format!("injected write failure on '{resource}'"),
            ));
        }
        let channel = channel_mut(&mut state, "do_put", resource)?;
        if channel.committed {
            return Err(ClientError::action("do_put", "stream already closed"));
        }
        channel.batches.push(batch);
        Ok(())
    }

    fn commit(&self, resource: &str) -> Result<()> {
        let mut state = self.lock()?;
        if let Ok(channel) = channel_mut(&mut state, "do_put", resource) {
            channel.committed = true;
        }
        Ok(())
    }

    fn open_get(&self, ticket: &Ticket) -> Result<InMemoryGetStream> {
        let command: FlightInfoCommand = serde_json::from_slice(&ticket.0)
            .map_err(|e| ClientError::action("do_get", format!("bad ticket: {e}")))?;
        let mut state = self.lock()?;
        let channel = channel_mut(&mut state, "do_get", &command.resource_locator)?;
        let schema = channel
            .schema
            .clone()
            .ok_or_else(|| ClientError::action("do_get", "channel has no data stream"))?;
        let window: TimeWindow = command.window();
        let batches = channel.batches.iter().map(|b| b.filter(&window)).collect();
        Ok(InMemoryGetStream { schema, batches })
    }
}

fn decode<T: DeserializeOwned>(action: FlightAction, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| ClientError::action(action, format!("malformed request: {e}")))
}

fn encode<T: Serialize>(response: &T) -> Result<Option<Bytes>> {
    Ok(Some(Bytes::from(serde_json::to_vec(response)?)))
}

fn not_found(action: impl ToString, name: &str) -> ClientError {
    ClientError::action(action, format!("'{name}' not found"))
}

fn check_key(action: impl ToString, expected: &str, given: &str) -> Result<()> {
    if expected != given {
        return Err(ClientError::action(action, "invalid authorization key"));
    }
    Ok(())
}

fn split(action: impl ToString, resource: &str) -> Result<(String, String)> {
    unpack_resource_name(resource)
        .ok_or_else(|| ClientError::action(action, format!("'{resource}' is not a channel")))
}

fn sequence_mut<'a>(
    state: &'a mut ServerState,
    action: impl ToString,
    name: &str,
) -> Result<&'a mut StoredSequence> {
    state
        .sequences
        .get_mut(name)
        .ok_or_else(|| not_found(action, name))
}

fn channel_mut<'a>(
    state: &'a mut ServerState,
    action: impl ToString + Copy,
    resource: &str,
) -> Result<&'a mut StoredChannel> {
    let (seq_name, channel_name) = split(action, resource)?;
    sequence_mut(state, action, &seq_name)?
        .channel_mut(&channel_name)
        .ok_or_else(|| not_found(action, resource))
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn notification(req: NotifyCreateRequest) -> Notification {
    Notification {
        name: req.name,
        notify_type: req.notify_type,
        msg: req.msg,
        created_at_ms: now_ms(),
    }
}

/// Connector handing out transports bound to one [`InMemoryServer`].
pub struct InMemoryConnector {
    server: InMemoryServer,
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn FlightTransport>> {
        let mut state = self.server.lock()?;
        let refused = state.unreachable
            || state
                .connection_limit
                .is_some_and(|limit| state.connections_opened >= limit);
        if refused {
            return Err(ClientError::Connection(
                format!("{host}:{port}"),
                "connection refused".to_string(),
            ));
        }
        state.connections_opened += 1;
        let id = state.connections_opened;
        drop(state);

        debug!(host = %host, port = port, connection = id, "In-memory connection opened");
        Ok(Arc::new(InMemoryTransport {
            server: self.server.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One connection to an [`InMemoryServer`].
pub struct InMemoryTransport {
    server: InMemoryServer,
    closed: AtomicBool,
}

impl InMemoryTransport {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Connection(
                "memory".to_string(),
                "connection closed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FlightTransport for InMemoryTransport {
    async fn do_action(&self, action: FlightAction, body: Bytes) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        self.server.handle_action(action, &body)
    }

    async fn get_flight_info(&self, command: &FlightInfoCommand) -> Result<Vec<FlightEndpoint>> {
        self.ensure_open()?;
        self.server.endpoints(command)
    }

    async fn list_flights(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.server.lock()?.sequences.keys().cloned().collect())
    }

    async fn do_put(
        &self,
        command: &DoPutCommand,
        schema: Arc<PayloadSchema>,
    ) -> Result<Box<dyn PutStream>> {
        self.ensure_open()?;
        self.server.open_put(command, schema)?;
        Ok(Box::new(InMemoryPutStream {
            server: self.server.clone(),
            resource: command.resource_locator.clone(),
            closed: false,
        }))
    }

    async fn do_get(&self, ticket: &Ticket) -> Result<Box<dyn GetStream>> {
        self.ensure_open()?;
        Ok(Box::new(self.server.open_get(ticket)?))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct InMemoryPutStream {
    server: InMemoryServer,
    resource: String,
    closed: bool,
}

#[async_trait]
impl PutStream for InMemoryPutStream {
    async fn write_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if self.closed {
            return Err(ClientError::action("do_put", "stream closed"));
        }
        self.server.append(&self.resource, batch)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.server.commit(&self.resource)?;
        }
        Ok(())
    }
}

struct InMemoryGetStream {
    schema: Arc<PayloadSchema>,
    batches: VecDeque<RecordBatch>,
}

#[async_trait]
impl GetStream for InMemoryGetStream {
    fn schema(&self) -> Arc<PayloadSchema> {
        Arc::clone(&self.schema)
    }

    async fn read_batch(&mut self) -> Result<Option<RecordBatch>> {
        Ok(self.batches.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn transport(server: &InMemoryServer) -> Arc<dyn FlightTransport> {
        server.connector().connect("localhost", 1).await.unwrap()
    }

    fn body<T: Serialize>(value: &T) -> Bytes {
        Bytes::from(serde_json::to_vec(value).unwrap())
    }

    #[tokio::test]
    async fn test_sequence_keys_are_checked() {
        let server = InMemoryServer::new();
        let t = transport(&server).await;
        let created = t
            .do_action(
                FlightAction::SequenceCreate,
                body(&SequenceCreateRequest {
                    name: "s".into(),
                    user_metadata: Metadata::new(),
                }),
            )
            .await
            .unwrap()
            .unwrap();
        let key: KeyResponse = serde_json::from_slice(&created).unwrap();

        let wrong = NameKeyRequest {
            name: "s".into(),
            key: "nope".into(),
        };
        assert!(t
            .do_action(FlightAction::SequenceFinalize, body(&wrong))
            .await
            .is_err());

        let right = NameKeyRequest {
            name: "s".into(),
            key: key.key,
        };
        t.do_action(FlightAction::SequenceFinalize, body(&right))
            .await
            .unwrap();
        assert_eq!(server.is_finalized("s"), Some(true));
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let server = InMemoryServer::new();
        server.fail_connections_after(1);
        let connector = server.connector();
        assert!(connector.connect("h", 1).await.is_ok());
        assert!(matches!(
            connector.connect("h", 1).await,
            Err(ClientError::Connection(_, _))
        ));
        server.clear_faults();
        assert!(connector.connect("h", 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_calls() {
        let server = InMemoryServer::new();
        let t = transport(&server).await;
        t.close().await.unwrap();
        assert!(t.list_flights().await.is_err());
    }
}
