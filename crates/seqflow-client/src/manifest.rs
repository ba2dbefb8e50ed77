//! Channel manifests resolved from flight endpoints.

use crate::error::{ClientError, Result};
use crate::transport::{FlightEndpoint, Ticket};
use bytes::Bytes;
use seqflow_core::names::unpack_resource_name;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// URI scheme of endpoint locations.
pub const LOCATION_SCHEME: &str = "seqflow:";

/// Per-channel metadata attached to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelManifest {
    pub sequence_name: String,
    pub channel_name: String,
    pub timestamp_ns_min: Option<i64>,
    pub timestamp_ns_max: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AppMetadata {
    #[serde(default)]
    timestamp: Option<TimestampBounds>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TimestampBounds {
    min: Option<i64>,
    max: Option<i64>,
}

impl ChannelManifest {
    /// Parses the manifest of one endpoint.
    ///
    /// Fails if the location is missing, uses another scheme or does not hold
    /// a `{sequence}/{channel}` path. Unreadable app metadata only drops the
    /// timestamp bounds.
    pub fn from_endpoint(endpoint: &FlightEndpoint) -> Result<Self> {
        let location = endpoint
            .location
            .as_deref()
            .ok_or_else(|| ClientError::Internal("endpoint has no location".to_string()))?;

        let path = location.strip_prefix(LOCATION_SCHEME).ok_or_else(|| {
            ClientError::Internal(format!(
                "location '{location}' is missing the '{LOCATION_SCHEME}' prefix"
            ))
        })?;

        let (sequence_name, channel_name) = unpack_resource_name(path).ok_or_else(|| {
            ClientError::Internal(format!("path '{path}' is not a sequence/channel pair"))
        })?;

        let (timestamp_ns_min, timestamp_ns_max) = parse_bounds(&endpoint.app_metadata);

        Ok(Self {
            sequence_name,
            channel_name,
            timestamp_ns_min,
            timestamp_ns_max,
        })
    }

    /// `true` when both bounds are known, i.e. the channel holds data.
    pub fn has_bounds(&self) -> bool {
        self.timestamp_ns_min.is_some() && self.timestamp_ns_max.is_some()
    }

    /// Builds the location string for a channel.
    pub fn location(sequence_name: &str, channel_name: &str) -> String {
        format!("{LOCATION_SCHEME}{sequence_name}/{channel_name}")
    }

    /// Encodes timestamp bounds the way servers attach them to endpoints.
    pub fn encode_bounds(bounds: Option<(i64, i64)>) -> Bytes {
        let meta = AppMetadata {
            timestamp: bounds.map(|(min, max)| TimestampBounds {
                min: Some(min),
                max: Some(max),
            }),
        };
        serde_json::to_vec(&meta).map(Bytes::from).unwrap_or_default()
    }
}

fn parse_bounds(raw: &[u8]) -> (Option<i64>, Option<i64>) {
    if raw.is_empty() {
        return (None, None);
    }
    match serde_json::from_slice::<AppMetadata>(raw) {
        Ok(AppMetadata {
            timestamp: Some(TimestampBounds {
                min: Some(min),
                max: Some(max),
            }),
        }) => (Some(min), Some(max)),
        Ok(_) => (None, None),
        Err(e) => {
            warn!(error = %e, "Ignoring malformed endpoint app metadata");
            (None, None)
        }
    }
}

/// Parses every endpoint, logging and skipping the ones that fail.
pub(crate) fn parse_endpoints(
    endpoints: Vec<FlightEndpoint>,
) -> Vec<(ChannelManifest, Ticket)> {
    endpoints
        .into_iter()
        .filter_map(|endpoint| match ChannelManifest::from_endpoint(&endpoint) {
            Ok(manifest) => Some((manifest, endpoint.ticket)),
            Err(e) => {
                tracing::error!(error = %e, "Skipping unreadable endpoint");
                None
            }
        })
        .collect()
}
