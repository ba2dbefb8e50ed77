//! Client and writer configuration.
//!
//! [`ClientConfig`] holds connection parameters, pool sizing and the default
//! batching thresholds. Each write session resolves a [`WriterConfig`] from
//! the client defaults and the per-sequence [`WriterOptions`].
//!
//! ## Environment
//!
//! [`ClientConfig::from_env`] reads:
//!
//! | Variable                        | Default       |
//! |---------------------------------|---------------|
//! | `SEQFLOW_HOST`                  | `localhost`   |
//! | `SEQFLOW_PORT`                  | `6726`        |
//! | `SEQFLOW_CONNECT_TIMEOUT_MS`    | `5000`        |
//! | `SEQFLOW_POOL_SIZE`             | CPU count     |
//! | `SEQFLOW_EXECUTOR_QUEUE_DEPTH`  | `64`          |
//! | `SEQFLOW_MAX_BATCH_BYTES`       | `1048576`     |
//! | `SEQFLOW_MAX_BATCH_RECORDS`     | `5000`        |
//!
//! Unparsable values fall back to the default.

use crate::error::{ClientError, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 6726;
pub const DEFAULT_MAX_BATCH_BYTES: usize = 1024 * 1024;
pub const DEFAULT_MAX_BATCH_RECORDS: usize = 5_000;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_EXECUTOR_QUEUE_DEPTH: usize = 64;

/// What a write session does with the sequence when it ends in error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnErrorPolicy {
    /// Abort the sequence; the server deletes everything written so far.
    #[default]
    Delete,
    /// Keep the data and attach an error notification to the sequence.
    Report,
}

/// Lifecycle state of a write session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStatus {
    Null,
    Pending,
    Finalized,
    Error,
}

impl SequenceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SequenceStatus::Finalized | SequenceStatus::Error)
    }
}

impl fmt::Display for SequenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SequenceStatus::Null => "null",
            SequenceStatus::Pending => "pending",
            SequenceStatus::Finalized => "finalized",
            SequenceStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Connection and pooling configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,

    /// Applied to every connection attempt, control and pooled.
    pub connect_timeout: Duration,

    /// Number of pooled data connections and flush executors.
    ///
    /// `0` selects sync mode: channels share the control connection and
    /// flush on the caller's task.
    pub pool_size: usize,

    /// Capacity of each executor's job queue.
    pub executor_queue_depth: usize,

    pub max_batch_size_bytes: usize,
    pub max_batch_size_records: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_size: default_pool_size(),
            executor_queue_depth: DEFAULT_EXECUTOR_QUEUE_DEPTH,
            max_batch_size_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_batch_size_records: DEFAULT_MAX_BATCH_RECORDS,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Builds a configuration from `SEQFLOW_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("SEQFLOW_HOST").unwrap_or(defaults.host),
            port: env_or("SEQFLOW_PORT", defaults.port),
            connect_timeout: Duration::from_millis(env_or(
                "SEQFLOW_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout.as_millis() as u64,
            )),
            pool_size: env_or("SEQFLOW_POOL_SIZE", defaults.pool_size),
            executor_queue_depth: env_or(
                "SEQFLOW_EXECUTOR_QUEUE_DEPTH",
                defaults.executor_queue_depth,
            ),
            max_batch_size_bytes: env_or("SEQFLOW_MAX_BATCH_BYTES", defaults.max_batch_size_bytes),
            max_batch_size_records: env_or(
                "SEQFLOW_MAX_BATCH_RECORDS",
                defaults.max_batch_size_records,
            ),
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn executor_queue_depth(mut self, depth: usize) -> Self {
        self.executor_queue_depth = depth;
        self
    }

    pub fn max_batch_size_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_size_bytes = bytes;
        self
    }

    pub fn max_batch_size_records(mut self, records: usize) -> Self {
        self.max_batch_size_records = records;
        self
    }

    pub fn is_sync_mode(&self) -> bool {
        self.pool_size == 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ClientError::Config("host is empty".to_string()));
        }
        if self.max_batch_size_bytes == 0 || self.max_batch_size_records == 0 {
            return Err(ClientError::Config(
                "batch thresholds must be greater than zero".to_string(),
            ));
        }
        if self.pool_size > 0 && self.executor_queue_depth == 0 {
            return Err(ClientError::Config(
                "executor queue depth must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-sequence overrides passed to `create_sequence`.
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub on_error: OnErrorPolicy,
    pub max_batch_size_bytes: Option<usize>,
    pub max_batch_size_records: Option<usize>,
}

impl WriterOptions {
    pub fn on_error(mut self, policy: OnErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    pub fn max_batch_size_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_size_bytes = Some(bytes);
        self
    }

    pub fn max_batch_size_records(mut self, records: usize) -> Self {
        self.max_batch_size_records = Some(records);
        self
    }
}

/// Resolved settings of one write session, shared by all its channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    pub on_error: OnErrorPolicy,
    pub max_batch_size_bytes: usize,
    pub max_batch_size_records: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            on_error: OnErrorPolicy::default(),
            max_batch_size_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_batch_size_records: DEFAULT_MAX_BATCH_RECORDS,
        }
    }
}

impl WriterConfig {
    pub fn resolve(client: &ClientConfig, options: &WriterOptions) -> Result<Self> {
        let config = Self {
            on_error: options.on_error,
            max_batch_size_bytes: options
                .max_batch_size_bytes
                .unwrap_or(client.max_batch_size_bytes),
            max_batch_size_records: options
                .max_batch_size_records
                .unwrap_or(client.max_batch_size_records),
        };
        if config.max_batch_size_bytes == 0 || config.max_batch_size_records == 0 {
            return Err(ClientError::Config(
                "batch thresholds must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_batch_size_bytes, 1_048_576);
        assert_eq!(config.max_batch_size_records, 5_000);
        assert!(config.pool_size >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sync_mode() {
        let config = ClientConfig::new("localhost", 1).pool_size(0);
        assert!(config.is_sync_mode());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_writer_config_overrides() {
        let client = ClientConfig::default().max_batch_size_records(10);
        let writer = WriterConfig::resolve(
            &client,
            &WriterOptions::default()
                .on_error(OnErrorPolicy::Report)
                .max_batch_size_bytes(64),
        )
        .unwrap();
        assert_eq!(writer.on_error, OnErrorPolicy::Report);
        assert_eq!(writer.max_batch_size_bytes, 64);
        assert_eq!(writer.max_batch_size_records, 10);

        let zero = WriterOptions::default().max_batch_size_records(0);
        assert!(WriterConfig::resolve(&client, &zero).is_err());
    }

    #[test]
    fn test_env_fallback() {
        assert_eq!(env_or("SEQFLOW_TEST_UNSET_VARIABLE", 42usize), 42);
    }
}
