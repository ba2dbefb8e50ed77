//! Catalog views of stored sequences and channels.
//!
//! Each view combines two server answers. The system-info action supplies
//! user metadata, creation time, lock state and storage size. The endpoint
//! manifests supply channel names and timestamp bounds.

use crate::action::{Metadata, SystemInfoResponse};
use crate::manifest::ChannelManifest;

/// What the server knows about one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceInfo {
    pub name: String,
    pub channels: Vec<String>,
    pub user_metadata: Metadata,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: i64,
    /// Set once the sequence is finalized.
    pub is_locked: bool,
    pub total_size_bytes: u64,
    /// Lowest timestamp across channels holding data.
    pub timestamp_ns_min: Option<i64>,
    /// Highest timestamp across channels holding data.
    pub timestamp_ns_max: Option<i64>,
}

impl SequenceInfo {
    pub(crate) fn assemble(
        name: String,
        manifests: &[ChannelManifest],
        system: SystemInfoResponse,
    ) -> Self {
        let bounded = manifests.iter().filter(|m| m.has_bounds());
        let timestamp_ns_min = bounded.clone().filter_map(|m| m.timestamp_ns_min).min();
        let timestamp_ns_max = bounded.filter_map(|m| m.timestamp_ns_max).max();

        Self {
            name,
            channels: manifests.iter().map(|m| m.channel_name.clone()).collect(),
            user_metadata: system.user_metadata,
            created_at_ms: system.created_at_ms,
            is_locked: system.is_locked,
            total_size_bytes: system.total_size_bytes,
            timestamp_ns_min,
            timestamp_ns_max,
        }
    }
}

/// What the server knows about one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub sequence_name: String,
    pub name: String,
    pub ontology_tag: Option<String>,
    pub user_metadata: Metadata,
    pub created_at_ms: i64,
    /// Set once the channel's put stream has been closed.
    pub is_locked: bool,
    /// Number of stored batches, if the server reports it.
    pub chunks_number: Option<usize>,
    pub total_size_bytes: u64,
    pub timestamp_ns_min: Option<i64>,
    pub timestamp_ns_max: Option<i64>,
}

impl ChannelInfo {
    pub(crate) fn assemble(manifest: ChannelManifest, system: SystemInfoResponse) -> Self {
        Self {
            sequence_name: manifest.sequence_name,
            name: manifest.channel_name,
            ontology_tag: system.ontology_tag,
            user_metadata: system.user_metadata,
            created_at_ms: system.created_at_ms,
            is_locked: system.is_locked,
            chunks_number: system.chunks_number,
            total_size_bytes: system.total_size_bytes,
            timestamp_ns_min: manifest.timestamp_ns_min,
            timestamp_ns_max: manifest.timestamp_ns_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(channel: &str, bounds: Option<(i64, i64)>) -> ChannelManifest {
        ChannelManifest {
            sequence_name: "drive".to_string(),
            channel_name: channel.to_string(),
            timestamp_ns_min: bounds.map(|(lo, _)| lo),
            timestamp_ns_max: bounds.map(|(_, hi)| hi),
        }
    }

    #[test]
    fn test_sequence_bounds_span_channels_with_data() {
        let manifests = vec![
            manifest("imu", Some((40, 90))),
            manifest("empty", None),
            manifest("gps", Some((10, 60))),
        ];
        let info = SequenceInfo::assemble(
            "drive".to_string(),
            &manifests,
            SystemInfoResponse::default(),
        );
        assert_eq!(info.channels, vec!["imu", "empty", "gps"]);
        assert_eq!(info.timestamp_ns_min, Some(10));
        assert_eq!(info.timestamp_ns_max, Some(90));
    }

    #[test]
    fn test_sequence_without_data_has_no_bounds() {
        let info = SequenceInfo::assemble(
            "drive".to_string(),
            &[manifest("empty", None)],
            SystemInfoResponse::default(),
        );
        assert_eq!(info.timestamp_ns_min, None);
        assert_eq!(info.timestamp_ns_max, None);
    }
}
