//! QuizRapid library root.
//!
//! A participant engine for broker-mediated quizzes: questions arrive on a
//! shared stream, the caller's [`QuizHandler`] answers them, and answers are
//! published correlated to the question before its offset is committed.

pub mod channel;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod protocol;

pub use channel::{ChannelFactory, MemoryBroker, QuizChannel, RawMessage, TransportError};
pub use config::{load_local_connection, connection_from_env, ConnectionConfig, EngineConfig, MalformedPolicy};
pub use crate::core::{CycleOutcome, CycleStats, EngineError, QuizHandler, Rapid};
pub use error::{Error, Result};
pub use protocol::{Answer, Assessment, AssessmentStatus, Envelope, MessageKind, Question};
