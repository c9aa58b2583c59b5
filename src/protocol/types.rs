//! Message kinds and the derived quiz entities.

use serde::{Deserialize, Serialize};

/// Wire value of the question discriminator.
pub const EVENT_QUESTION: &str = "SPØRSMÅL";
/// Wire value of the answer discriminator.
pub const EVENT_ANSWER: &str = "SVAR";
/// Wire value of the assessment discriminator.
pub const EVENT_ASSESSMENT: &str = "KORREKTUR";

/// Message kind classification.
///
/// The set is closed; anything the codec does not recognise becomes `Unknown`
/// and is skipped by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Question,
    Answer,
    Assessment,
    Unknown(String),
}

impl MessageKind {
    /// Classify a raw `@event_name` value.
    pub fn from_event_name(name: &str) -> Self {
        match name {
            EVENT_QUESTION => Self::Question,
            EVENT_ANSWER => Self::Answer,
            EVENT_ASSESSMENT => Self::Assessment,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The discriminator written on the wire.
    pub fn event_name(&self) -> &str {
        match self {
            Self::Question => EVENT_QUESTION,
            Self::Answer => EVENT_ANSWER,
            Self::Assessment => EVENT_ASSESSMENT,
            Self::Unknown(name) => name,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Correctness verdict carried by an assessment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssessmentStatus {
    #[serde(rename = "KORREKT")]
    Correct,
    #[serde(rename = "FEIL")]
    Incorrect,
}

impl AssessmentStatus {
    pub fn is_correct(self) -> bool {
        matches!(self, Self::Correct)
    }
}

/// A question as presented to the participant's handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Message id of the question envelope; answers correlate to this.
    pub id: String,
    pub category: String,
    pub question: String,
    pub answer_format: Option<String>,
    pub documentation: Option<String>,
}

/// An outbound answer, built inside a single cycle and discarded after submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub answer: String,
    pub category: String,
    /// Always the triggering question's message id.
    pub question_id: String,
    pub team_name: String,
}

/// Correctness feedback for one of this team's answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub category: String,
    pub status: AssessmentStatus,
    /// Message id of the answer being assessed.
    pub answer_id: String,
    pub team_name: String,
}
