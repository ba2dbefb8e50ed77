//! Control-action bodies.
//!
//! Every control action carries a JSON document. Requests and responses are
//! typed here so both the client and transport implementations agree on the
//! field names.

use crate::error::{ClientError, Result};
use crate::transport::{FlightAction, FlightTransport};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// User metadata attached to sequences and channels. Opaque to the pipeline.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceCreateRequest {
    pub name: String,
    pub user_metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceNewVersionRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
}

/// Used by finalize and abort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameKeyRequest {
    pub name: String,
    pub key: String,
}

/// Used by delete, notify list and notify purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCreateRequest {
    pub sequence_key: String,
    /// Channel resource name, `{sequence}/{channel}`.
    pub name: String,
    pub ontology_tag: String,
    pub user_metadata: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyType {
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyCreateRequest {
    pub name: String,
    pub notify_type: NotifyType,
    pub msg: String,
}

/// Authorization key issued on sequence or channel creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyResponse {
    pub key: String,
}

/// A notification attached to a sequence or channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub name: String,
    pub notify_type: NotifyType,
    pub msg: String,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyListResponse {
    pub notifies: Vec<Notification>,
}

/// Server-side bookkeeping of a sequence or channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemInfoResponse {
    #[serde(default)]
    pub user_metadata: Metadata,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: i64,
    /// Sequences lock on finalize, channels when their put stream closes.
    pub is_locked: bool,
    pub total_size_bytes: u64,
    /// Channels only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_number: Option<usize>,
    /// Channels only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ontology_tag: Option<String>,
}

/// Runs an action whose response body is ignored.
pub(crate) async fn run<P: Serialize>(
    transport: &dyn FlightTransport,
    action: FlightAction,
    payload: &P,
) -> Result<()> {
    let body = Bytes::from(serde_json::to_vec(payload)?);
    trace!(action = %action, bytes = body.len(), "do_action");
    transport.do_action(action, body).await?;
    Ok(())
}

/// Runs an action and decodes its JSON response.
///
/// An empty response is [`ClientError::NoResponse`].
pub(crate) async fn call<P, R>(
    transport: &dyn FlightTransport,
    action: FlightAction,
    payload: &P,
) -> Result<R>
where
    P: Serialize,
    R: DeserializeOwned,
{
    let body = Bytes::from(serde_json::to_vec(payload)?);
    trace!(action = %action, bytes = body.len(), "do_action");
    let response = transport
        .do_action(action, body)
        .await?
        .ok_or_else(|| ClientError::NoResponse(action.to_string()))?;
    serde_json::from_slice(&response).map_err(|e| {
        ClientError::action(action, format!("malformed response: {e}"))
    })
}
