//! Seqflow Client - Batched Ingestion and Time-Ordered Replay
//!
//! This crate drives the client side of a remote time-series platform. It
//! writes sequences of named channels through pooled connections and
//! background flush executors, and reads them back as one globally
//! time-ordered stream.
//!
//! # Examples
//!
//! ## Writing
//!
//! ```ignore
//! use seqflow_client::{Client, Metadata, WriterOptions};
//!
//! let client = Client::builder().connector(connector).connect().await?;
//! let writer = client
//!     .create_sequence("drive_01", Metadata::new(), WriterOptions::default())
//!     .await?;
//!
//! writer
//!     .run(|w| async move {
//!         let imu = w.create_channel("front/imu", imu_schema, Metadata::new()).await?;
//!         imu.push(message).await?;
//!         Ok(())
//!     })
//!     .await?;
//! ```
//!
//! ## Reading
//!
//! ```ignore
//! use seqflow_client::TimeWindow;
//!
//! let mut reader = client
//!     .open_sequence_stream("drive_01", None, TimeWindow::unbounded())
//!     .await?;
//!
//! while let Some((channel, message)) = reader.next().await? {
//!     println!("{channel} @ {}", message.timestamp_ns);
//! }
//! ```

pub mod action;
pub mod catalog;
pub mod channel_reader;
pub mod channel_writer;
pub mod client;
pub mod config;
pub mod connection_pool;
pub mod error;
pub mod executor_pool;
pub mod manifest;
pub mod memory;
pub mod read_state;
pub mod sequence_reader;
pub mod sequence_writer;
pub mod transport;
pub mod write_state;

pub use action::{Metadata, Notification, NotifyType};
pub use catalog::{ChannelInfo, SequenceInfo};
pub use channel_reader::ChannelReader;
pub use channel_writer::{ChannelHandle, ChannelWriter};
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, OnErrorPolicy, SequenceStatus, WriterConfig, WriterOptions};
pub use connection_pool::{ConnectionPool, ResourcePool};
pub use error::{ClientError, Result};
pub use executor_pool::{ExecutorPool, FlushExecutor, FlushTicket};
pub use manifest::ChannelManifest;
pub use memory::{InMemoryConnector, InMemoryServer, InMemoryTransport};
pub use read_state::ChannelReadState;
pub use sequence_reader::SequenceReader;
pub use sequence_writer::{SequenceWriter, Session, SessionKind, SessionOutcome};
pub use transport::{
    Connector, DoPutCommand, FlightAction, FlightEndpoint, FlightInfoCommand, FlightTransport,
    GetStream, PutStream, Ticket,
};
pub use write_state::ChannelWriteState;

pub use seqflow_core::{
    FieldType, Message, Payload, PayloadSchema, RecordBatch, StreamTimestamp, TimeWindow, Value,
};
