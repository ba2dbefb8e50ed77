//! Single-channel reader.

use crate::error::{ClientError, Result};
use crate::manifest::{parse_endpoints, ChannelManifest};
use crate::read_state::ChannelReadState;
use crate::transport::{FlightInfoCommand, FlightTransport, Ticket};
use seqflow_core::names::{pack_resource_name, validate_channel_name, validate_sequence_name};
use seqflow_core::{Message, RecordBatch, TimeWindow};
use tracing::{debug, info};

/// Time-ordered reader over one channel.
///
/// Rows come back in the order the server streams them, which is
/// acquisition-timestamp order for data written through this crate.
pub struct ChannelReader {
    manifest: ChannelManifest,
    state: ChannelReadState,
    closed: bool,
}

impl ChannelReader {
    /// Resolves the endpoint of `sequence/channel` and opens its stream.
    pub async fn connect(
        transport: &dyn FlightTransport,
        sequence_name: &str,
        channel_name: &str,
        window: TimeWindow,
    ) -> Result<Self> {
        let sequence_name = validate_sequence_name(sequence_name)?;
        let channel_name = validate_channel_name(channel_name)?;
        let resource = pack_resource_name(&sequence_name, &channel_name);

        let endpoints = transport
            .get_flight_info(&FlightInfoCommand::new(resource.clone(), window))
            .await?;

        let (manifest, ticket) = parse_endpoints(endpoints)
            .into_iter()
            .find(|(m, _)| m.sequence_name == sequence_name && m.channel_name == channel_name)
            .ok_or_else(|| ClientError::NotFound(format!("channel '{resource}'")))?;

        Self::from_ticket(transport, manifest, &ticket).await
    }

    /// Opens the stream behind an already resolved endpoint.
    pub async fn from_ticket(
        transport: &dyn FlightTransport,
        manifest: ChannelManifest,
        ticket: &Ticket,
    ) -> Result<Self> {
        let stream = transport.do_get(ticket).await?;
        let resource = pack_resource_name(&manifest.sequence_name, &manifest.channel_name);
        debug!(channel = %resource, "Channel stream opened");
        Ok(Self {
            state: ChannelReadState::new(resource, stream),
            manifest,
            closed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.manifest.channel_name
    }

    pub fn sequence_name(&self) -> &str {
        &self.manifest.sequence_name
    }

    pub fn manifest(&self) -> &ChannelManifest {
        &self.manifest
    }

    /// Ontology tag of the channel payload type.
    pub fn ontology_tag(&self) -> String {
        self.state.schema().tag().to_string()
    }

    /// Timestamp of the next unread row, `None` once exhausted.
    pub async fn next_timestamp(&mut self) -> Result<Option<i64>> {
        self.ensure_open()?;
        Ok(self.state.peek_next_row().await?.as_nanos())
    }

    pub async fn next(&mut self) -> Result<Option<Message>> {
        self.ensure_open()?;
        self.state.next().await
    }

    /// Next raw batch. Rejected once row iteration has started.
    pub async fn fetch_next_batch(&mut self) -> Result<Option<RecordBatch>> {
        self.ensure_open()?;
        self.state.fetch_next_batch().await
    }

    pub(crate) fn state_mut(&mut self) -> &mut ChannelReadState {
        &mut self.state
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            info!(channel = %self.state.channel(), "Channel reader closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ClientError::InvalidState(format!(
                "reader closed for channel '{}'",
                self.state.channel()
            )));
        }
        Ok(())
    }
}
