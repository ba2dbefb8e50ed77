//! Transport seam between the pipeline and the server.
//!
//! The pipeline never speaks a wire protocol itself. It talks to a
//! [`FlightTransport`]: control actions with JSON bodies, endpoint resolution,
//! and bulk put/get streams of [`RecordBatch`]es. A [`Connector`] opens
//! transports; pools hold several of them.
//!
//! ## Thread Safety
//!
//! A transport may be shared by every channel assigned to it through the
//! connection pool, so implementations must be `Send + Sync` and tolerate
//! concurrent calls. Put and get streams are owned by exactly one channel.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use seqflow_core::{PayloadSchema, RecordBatch, TimeWindow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Control-plane actions understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightAction {
    SequenceCreate,
    SequenceNewVersion,
    SequenceFinalize,
    SequenceAbort,
    SequenceDelete,
    SequenceNotifyCreate,
    SequenceNotifyList,
    SequenceNotifyPurge,
    SequenceSystemInfo,
    ChannelCreate,
    ChannelDelete,
    ChannelNotifyCreate,
    ChannelNotifyList,
    ChannelNotifyPurge,
    ChannelSystemInfo,
}

impl FlightAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightAction::SequenceCreate => "sequence_create",
            FlightAction::SequenceNewVersion => "sequence_new_version",
            FlightAction::SequenceFinalize => "sequence_finalize",
            FlightAction::SequenceAbort => "sequence_abort",
            FlightAction::SequenceDelete => "sequence_delete",
            FlightAction::SequenceNotifyCreate => "sequence_notify_create",
            FlightAction::SequenceNotifyList => "sequence_notify_list",
            FlightAction::SequenceNotifyPurge => "sequence_notify_purge",
            FlightAction::SequenceSystemInfo => "sequence_system_info",
            FlightAction::ChannelCreate => "topic_create",
            FlightAction::ChannelDelete => "topic_delete",
            FlightAction::ChannelNotifyCreate => "topic_notify_create",
            FlightAction::ChannelNotifyList => "topic_notify_list",
            FlightAction::ChannelNotifyPurge => "topic_notify_purge",
            FlightAction::ChannelSystemInfo => "topic_system_info",
        }
    }
}

impl fmt::Display for FlightAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to a server-side stream, issued by endpoint resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ticket(pub Bytes);

/// One stream location returned by [`FlightTransport::get_flight_info`].
#[derive(Debug, Clone)]
pub struct FlightEndpoint {
    /// `seqflow:{sequence}/{channel}`, or `None` if the server omitted it.
    pub location: Option<String>,
    pub ticket: Ticket,
    /// JSON manifest; see [`crate::manifest`].
    pub app_metadata: Bytes,
}

/// Descriptor for endpoint resolution. `resource_locator` is either a
/// sequence name or a channel resource name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightInfoCommand {
    pub resource_locator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ns_start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ns_end: Option<i64>,
}

impl FlightInfoCommand {
    pub fn new(resource_locator: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            resource_locator: resource_locator.into(),
            timestamp_ns_start: window.start_ns,
            timestamp_ns_end: window.end_ns,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.timestamp_ns_start, self.timestamp_ns_end)
    }
}

/// Descriptor for opening a put stream on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoPutCommand {
    pub resource_locator: String,
    /// Channel authorization key returned by channel creation.
    pub key: String,
}

/// Opens connections to a server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens one transport. Timeouts are applied by the caller.
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn FlightTransport>>;
}

/// One connection to the server.
#[async_trait]
pub trait FlightTransport: Send + Sync {
    /// Runs a control action. Returns the response body, if any.
    async fn do_action(&self, action: FlightAction, body: Bytes) -> Result<Option<Bytes>>;

    /// Resolves the stream endpoints of a sequence or channel.
    async fn get_flight_info(&self, command: &FlightInfoCommand) -> Result<Vec<FlightEndpoint>>;

    /// Names of every sequence stored on the server.
    async fn list_flights(&self) -> Result<Vec<String>>;

    async fn do_put(
        &self,
        command: &DoPutCommand,
        schema: Arc<PayloadSchema>,
    ) -> Result<Box<dyn PutStream>>;

    async fn do_get(&self, ticket: &Ticket) -> Result<Box<dyn GetStream>>;

    async fn close(&self) -> Result<()>;
}

/// Write half of a bulk stream.
#[async_trait]
pub trait PutStream: Send {
    async fn write_batch(&mut self, batch: RecordBatch) -> Result<()>;

    /// Signals end of data. The server commits what it received.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a bulk stream.
#[async_trait]
pub trait GetStream: Send {
    fn schema(&self) -> Arc<PayloadSchema>;

    /// Next batch, or `None` at end of stream.
    async fn read_batch(&mut self) -> Result<Option<RecordBatch>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_command_omits_open_bounds() {
        let cmd = FlightInfoCommand::new("seq", TimeWindow::new(Some(10), None));
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"resource_locator":"seq","timestamp_ns_start":10}"#);
        assert_eq!(cmd.window(), TimeWindow::new(Some(10), None));
    }

    #[test]
    fn test_action_names() {
        assert_eq!(FlightAction::ChannelCreate.as_str(), "topic_create");
        assert_eq!(FlightAction::SequenceAbort.to_string(), "sequence_abort");
    }
}
