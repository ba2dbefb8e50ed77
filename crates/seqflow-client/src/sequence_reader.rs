//! K-way merge over the channels of a sequence.
//!
//! [`SequenceReader`] keeps one [`ChannelReader`] per selected channel and
//! repeatedly emits the buffered row with the smallest timestamp. Ties go to
//! the channel that comes first in reader order, which is the order the
//! server listed the endpoints in. Each step is a linear scan over the
//! channels.
//!
//! ## Modes
//!
//! A reader is consumed either row by row (`next`, `next_timestamp`) or as
//! raw batches (`as_batch_provider`). Once row iteration has started the batch
//! provider is refused, because the lookahead rows would otherwise be lost.
//!
//! Not thread-safe; use one reader per consumer.

use crate::channel_reader::ChannelReader;
use crate::error::{ClientError, Result};
use crate::manifest::parse_endpoints;
use crate::transport::{FlightInfoCommand, FlightTransport};
use seqflow_core::names::{validate_channel_name, validate_sequence_name};
use seqflow_core::{Message, StreamTimestamp, TimeWindow};
use tracing::{debug, info};

pub struct SequenceReader {
    name: String,
    readers: Vec<ChannelReader>,
    in_iteration: bool,
    closed: bool,
}

impl SequenceReader {
    /// Opens one reader per channel of `sequence_name` that holds data.
    ///
    /// `channels` restricts the selection; `None` or an empty list selects
    /// every channel.
    /// Channels without timestamp bounds are skipped. Fails with
    /// [`ClientError::NotFound`] when no channel can be opened.
    pub async fn open(
        transport: &dyn FlightTransport,
        sequence_name: &str,
        channels: Option<&[&str]>,
        window: TimeWindow,
    ) -> Result<Self> {
        let name = validate_sequence_name(sequence_name)?;
        let selection = channels
            .filter(|list| !list.is_empty())
            .map(|list| {
                list.iter()
                    .map(|c| validate_channel_name(c))
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .transpose()?;

        let endpoints = transport
            .get_flight_info(&FlightInfoCommand::new(name.clone(), window))
            .await?;

        let mut readers = Vec::new();
        for (manifest, ticket) in parse_endpoints(endpoints) {
            if !manifest.has_bounds() {
                debug!(sequence = %name, channel = %manifest.channel_name, "Skipping channel without data");
                continue;
            }
            if let Some(selection) = &selection {
                if !selection.contains(&manifest.channel_name) {
                    continue;
                }
            }
            readers.push(ChannelReader::from_ticket(transport, manifest, &ticket).await?);
        }

        if readers.is_empty() {
            return Err(ClientError::NotFound(format!(
                "no readable channels in sequence '{name}'"
            )));
        }

        info!(sequence = %name, channels = readers.len(), "Sequence reader opened");
        Ok(Self {
            name,
            readers,
            in_iteration: false,
            closed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the merged channels, in tie-break order.
    pub fn channel_names(&self) -> Vec<String> {
        self.readers.iter().map(|r| r.name().to_string()).collect()
    }

    /// Timestamp of the next row `next()` would return, without consuming it.
    pub async fn next_timestamp(&mut self) -> Result<Option<i64>> {
        self.ensure_open()?;
        self.in_iteration = true;
        Ok(self.winner().await?.map(|(_, ts)| ts))
    }

    /// Next row across all channels in timestamp order, with its channel name.
    pub async fn next(&mut self) -> Result<Option<(String, Message)>> {
        self.ensure_open()?;
        self.in_iteration = true;

        let Some((index, _)) = self.winner().await? else {
            return Ok(None);
        };
        let reader = &mut self.readers[index];
        let message = reader.state_mut().next().await?.ok_or_else(|| {
            ClientError::Internal(format!("channel '{}' lost its buffered row", reader.name()))
        })?;
        Ok(Some((reader.name().to_string(), message)))
    }

    /// Raw access to the channel readers for batch processing.
    ///
    /// Refused once row-by-row iteration has started.
    pub fn as_batch_provider(&mut self) -> Result<&mut [ChannelReader]> {
        self.ensure_open()?;
        if self.in_iteration {
            return Err(ClientError::InvalidState(
                "cannot switch to batch provider mode: row-by-row iteration has already started"
                    .to_string(),
            ));
        }
        Ok(&mut self.readers)
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for reader in &mut self.readers {
            reader.close();
        }
        info!(sequence = %self.name, "Sequence reader closed");
    }

    /// Index and timestamp of the channel holding the smallest buffered
    /// timestamp. First seen wins ties.
    async fn winner(&mut self) -> Result<Option<(usize, i64)>> {
        let mut best: Option<(usize, i64)> = None;
        for (index, reader) in self.readers.iter_mut().enumerate() {
            if let StreamTimestamp::At(ts) = reader.state_mut().peek_next_row().await? {
                if best.map_or(true, |(_, min)| ts < min) {
                    best = Some((index, ts));
                }
            }
        }
        Ok(best)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ClientError::InvalidState(format!(
                "reader closed for sequence '{}'",
                self.name
            )));
        }
        Ok(())
    }
}
