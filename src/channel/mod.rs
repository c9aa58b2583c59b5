//! Transport seam between the engine and the ordered message log.
//!
//! The engine only sees [`QuizChannel`]: fetch, commit, seek, publish, close.
//! Establishing a secured connection is the job of a [`ChannelFactory`].

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ConnectionConfig;

pub mod memory;

pub use memory::{MemoryBroker, MemoryChannel};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connectivity hiccup; the same step may be retried.
    #[error("transient transport failure: {0}")]
    Transient(String),

    /// The stream has ended; no further messages will arrive.
    #[error("channel closed")]
    Closed,

    #[error("transport failure: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A raw message handle as delivered by the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub partition: i32,
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// Duplex channel to the quiz topic.
#[async_trait]
pub trait QuizChannel: Send {
    /// Block until the next message is available.
    async fn fetch_next(&mut self) -> Result<RawMessage>;

    /// Mark a message (and everything before it) as processed for this consumer group.
    async fn commit(&mut self, message: &RawMessage) -> Result<()>;

    /// Reposition so the next fetch delivers `message` again. Nothing is committed.
    async fn seek(&mut self, message: &RawMessage) -> Result<()>;

    /// Append a payload to the topic, returning once the log has acknowledged it.
    async fn publish(&mut self, payload: Vec<u8>) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Builds connected channels from a resolved connection descriptor.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    type Channel: QuizChannel;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Channel>;
}
