//! Error types for seqflow client operations.
//!
//! This module defines every error the writer and reader pipelines can return.
//! Errors are grouped by where they originate (transport, control plane, data
//! plane, caller) so that call sites can decide what to do with them.
//!
//! ## Error Handling Strategy
//!
//! - **Fatal to session open**: `Connection`, `Timeout`
//! - **Caller bugs, never retried**: `Validation`, `AlreadyExists`, `InvalidState`
//! - **Control plane**: `Action`, `NoResponse`, `NotFound`
//! - **Data plane**: `Flush`, `ChannelFailed`, `ChannelsFailed`
//!
//! Nothing in this crate retries. Read-only listing calls on [`Client`](crate::Client)
//! log control-plane errors and return empty results instead.
//!
//! ## Examples
//!
//! ```ignore
//! use seqflow_client::ClientError;
//!
//! match writer.create_channel("front/imu", schema, Default::default()).await {
//!     Ok(channel) => { /* push */ }
//!     Err(ClientError::AlreadyExists(name)) => eprintln!("'{}' already open", name),
//!     Err(e) => return Err(e),
//! }
//! ```

use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error type for seqflow client operations.
///
/// ## Error Categories
///
/// - **Transport**: `Connection`, `Timeout`, `PoolClosed`
/// - **Validation**: `Validation`, `AlreadyExists`, `Config`
/// - **Control plane**: `Action`, `NoResponse`, `NotFound`
/// - **Data plane**: `Flush`, `ChannelFailed`, `ChannelsFailed`
/// - **Lifecycle**: `InvalidState`
/// - **Unknown**: `Internal`
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server could not be reached or the handshake failed.
    ///
    /// ## Causes
    /// - Server is down or the address is wrong
    /// - A pooled connection failed while the pool was being built
    ///
    /// ## Resolution
    /// - Verify host and port
    /// - Pool construction is all-or-nothing; no partial pool is left behind
    #[error("Failed to connect to {0}: {1}")]
    Connection(String, String),

    /// Connection establishment exceeded the configured timeout.
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// A resource was requested from a pool after `close()`.
    ///
    /// Also returned by a second `close()` on the same pool.
    #[error("Pool is closed")]
    PoolClosed,

    /// A name, payload or schema failed validation.
    ///
    /// Wraps the core error so the exact rule that was broken is preserved.
    #[error("Validation error: {0}")]
    Validation(#[from] seqflow_core::Error),

    /// A channel with this name is already open in the current session.
    #[error("Channel '{0}' already exists in this session")]
    AlreadyExists(String),

    /// The server rejected a control-plane action.
    ///
    /// ## Causes
    /// - Unknown or already-finalized sequence
    /// - Wrong authorization key
    /// - Server-side failure
    ///
    /// ## Resolution
    /// - Check the server logs for the action name shown in the message
    #[error("Action '{action}' failed: {message}")]
    Action { action: String, message: String },

    /// A control action that must return a body returned nothing.
    #[error("Action '{0}' returned no response")]
    NoResponse(String),

    /// A batch could not be transmitted to the server.
    ///
    /// The channel that raised it is closed in error mode; sibling channels
    /// keep running.
    #[error("Flush failed on channel '{channel}': {message}")]
    Flush { channel: String, message: String },

    /// A channel operation failed and the channel was shut down.
    ///
    /// `source` carries the original cause.
    #[error("Channel '{channel}' failed: {source}")]
    ChannelFailed {
        channel: String,
        #[source]
        source: Box<ClientError>,
    },

    /// One or more channels failed to finalize.
    ///
    /// Collected by the sequence writer before it decides the fate of the
    /// sequence; `first` is the first failure observed.
    #[error("{} channel(s) failed to finalize ({}): {first}", .failed.len(), .failed.join(", "))]
    ChannelsFailed {
        failed: Vec<String>,
        first: Box<ClientError>,
    },

    /// An operation was called in the wrong lifecycle state.
    ///
    /// ## Causes
    /// - Creating a channel on a writer that is not pending
    /// - Reading from a closed reader
    /// - Switching a reader to batch mode after row iteration started
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The requested sequence or channel does not exist on the server.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Client configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error that shouldn't happen.
    ///
    /// Usually a worker task that went away while work was queued on it.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    pub(crate) fn action(action: impl ToString, message: impl ToString) -> Self {
        ClientError::Action {
            action: action.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn flush(channel: impl Into<String>, message: impl ToString) -> Self {
        ClientError::Flush {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Wraps `self` as the cause of a failed channel.
    pub(crate) fn in_channel(self, channel: impl Into<String>) -> Self {
        match self {
            already @ ClientError::ChannelFailed { .. } => already,
            other => ClientError::ChannelFailed {
                channel: channel.into(),
                source: Box::new(other),
            },
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Internal(format!("JSON error: {err}"))
    }
}
