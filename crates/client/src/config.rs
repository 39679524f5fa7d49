use std::time::Duration;

use filestream_protocol::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_CHUNK_SIZE, MAX_CHUNK_SIZE,
};

use crate::ClientError;

/// Default deadline applied to every call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (`host:port`), used by [`TcpConnector`](crate::TcpConnector).
    pub addr: String,
    /// Bearer token sent with every call.
    pub token: String,
    /// Maximum bytes per upload message.
    pub max_chunk_size: usize,
    /// Deadline per call; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Pause between upload messages.
    pub chunk_interval: Duration,
    /// Messages buffered per channel direction.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:50051".into(),
            token: String::new(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            timeout: Some(DEFAULT_TIMEOUT),
            chunk_interval: Duration::ZERO,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            token: token.into(),
            ..Self::default()
        }
    }

    /// Checks the settings every call depends on.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.max_chunk_size == 0 || self.max_chunk_size > MAX_CHUNK_SIZE {
            return Err(ClientError::Config(format!(
                "max_chunk_size must be between 1 and {MAX_CHUNK_SIZE} bytes"
            )));
        }
        if self.channel_capacity == 0 {
            return Err(ClientError::Config(
                "channel_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
