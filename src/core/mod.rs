//! Core module - the protocol engine.
//!
//! This module contains the heart of QuizRapid's message processing:
//! - Dispatch of decoded envelopes to the participant's handler
//! - Answer emission correlated to the triggering question
//! - The sequential consumption loop with commit-after-process

use thiserror::Error;

use crate::channel::TransportError;
use crate::protocol::EncodeError;

pub mod dispatcher;
pub mod emitter;
pub mod engine;

pub use dispatcher::{DispatchOutcome, Dispatcher, IgnoreReason, QuizHandler};
pub use emitter::AnswerEmitter;
pub use engine::{CycleOutcome, CycleStats, Rapid};

/// Terminal engine errors. Anything else is logged and absorbed by the loop.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("handler failed on message {message_id}: {source}")]
    Handler {
        message_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to encode answer: {0}")]
    Encode(#[from] EncodeError),

    #[error("failed to publish answer to question {question_id}: {source}")]
    Publish {
        question_id: String,
        #[source]
        source: TransportError,
    },
}
