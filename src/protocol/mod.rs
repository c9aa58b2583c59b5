//! Quiz wire protocol for QuizRapid.
//!
//! This module defines the message stream's vocabulary:
//! - Message kinds and the derived Question/Answer/Assessment entities
//! - Envelopes with correlation IDs
//! - The JSON codec

pub mod codec;
pub mod envelope;
pub mod types;

pub use codec::{decode, encode, DecodeError, DecodeErrorKind, EncodeError};
pub use envelope::{
    AnswerEnvelope, AssessmentEnvelope, Envelope, Header, QuestionEnvelope, UnknownEnvelope,
    TIME_FORMAT,
};
pub use types::{Answer, Assessment, AssessmentStatus, MessageKind, Question};
