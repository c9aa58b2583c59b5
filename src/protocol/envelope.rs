//! Wire envelopes with correlation IDs linking answers and assessments to questions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::types::{Answer, Assessment, AssessmentStatus, MessageKind, Question};

/// Timestamp format for `@opprettet`: microsecond precision, no UTC offset.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Fields shared by every known message kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Unique message ID (UUID v4). Older producers omit it and identify
    /// questions and answers by `spørsmålId` / `svarId` instead.
    #[serde(rename = "messageId", default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    /// Team the message belongs to (questions are contest-wide and may omit it)
    #[serde(rename = "lagnavn", default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(rename = "kategorinavn")]
    pub category: String,
    /// Creation timestamp, see [`TIME_FORMAT`]
    #[serde(rename = "@opprettet")]
    pub created: String,
}

impl Header {
    /// Fresh header stamped with a new message ID and the current local time.
    pub fn new(category: impl Into<String>, team_name: Option<String>) -> Self {
        Self {
            message_id: generate_id(),
            team_name,
            category: category.into(),
            created: current_timestamp(),
        }
    }

    /// Parse `created`, accepting any sub-second precision.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.created, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEnvelope {
    #[serde(flatten)]
    pub header: Header,
    /// Question ID; takes precedence over `messageId`
    #[serde(rename = "spørsmålId", default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(rename = "spørsmål")]
    pub question: String,
    #[serde(rename = "svarformat", default, skip_serializing_if = "Option::is_none")]
    pub answer_format: Option<String>,
    #[serde(rename = "dokumentasjon", default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEnvelope {
    #[serde(flatten)]
    pub header: Header,
    /// Answer ID; assessments refer back to it
    #[serde(rename = "svarId", default, skip_serializing_if = "Option::is_none")]
    pub answer_id: Option<String>,
    /// ID of the question this answers
    #[serde(rename = "spørsmålId")]
    pub question_id: String,
    #[serde(rename = "svar")]
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentEnvelope {
    #[serde(flatten)]
    pub header: Header,
    /// Message ID of the answer being assessed
    #[serde(rename = "svarId")]
    pub answer_id: String,
    pub status: AssessmentStatus,
}

/// Whatever the partial parse could recover from an unrecognised kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEnvelope {
    pub event_name: String,
    pub team_name: Option<String>,
    pub category: Option<String>,
}

/// A decoded message from the quiz stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Question(QuestionEnvelope),
    Answer(AnswerEnvelope),
    Assessment(AssessmentEnvelope),
    Unknown(UnknownEnvelope),
}

impl Envelope {
    /// Create a question envelope. Used by quiz masters and test harnesses.
    pub fn question(category: impl Into<String>, question: impl Into<String>) -> Self {
        let header = Header::new(category, None);
        Self::Question(QuestionEnvelope {
            question_id: Some(header.message_id.clone()),
            header,
            question: question.into(),
            answer_format: None,
            documentation: None,
        })
    }

    /// Create an assessment of an answer for the given team.
    pub fn assessment(
        category: impl Into<String>,
        team_name: impl Into<String>,
        answer_id: impl Into<String>,
        status: AssessmentStatus,
    ) -> Self {
        Self::Assessment(AssessmentEnvelope {
            header: Header::new(category, Some(team_name.into())),
            answer_id: answer_id.into(),
            status,
        })
    }

    /// Wrap an answer in a fresh envelope with a new ID and timestamp.
    ///
    /// The ID is stamped as both `messageId` and `svarId`.
    pub fn from_answer(answer: Answer) -> Self {
        let header = Header::new(answer.category, Some(answer.team_name));
        Self::Answer(AnswerEnvelope {
            answer_id: Some(header.message_id.clone()),
            header,
            question_id: answer.question_id,
            answer: answer.answer,
        })
    }

    /// Set the answer-format hint on a question envelope.
    pub fn with_answer_format(mut self, format: impl Into<String>) -> Self {
        if let Self::Question(q) = &mut self {
            q.answer_format = Some(format.into());
        }
        self
    }

    /// Set the documentation link on a question envelope.
    pub fn with_documentation(mut self, documentation: impl Into<String>) -> Self {
        if let Self::Question(q) = &mut self {
            q.documentation = Some(documentation.into());
        }
        self
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Question(_) => MessageKind::Question,
            Self::Answer(_) => MessageKind::Answer,
            Self::Assessment(_) => MessageKind::Assessment,
            Self::Unknown(u) => MessageKind::Unknown(u.event_name.clone()),
        }
    }

    pub fn header(&self) -> Option<&Header> {
        match self {
            Self::Question(q) => Some(&q.header),
            Self::Answer(a) => Some(&a.header),
            Self::Assessment(a) => Some(&a.header),
            Self::Unknown(_) => None,
        }
    }

    /// Identifier of this message: the question or answer ID where the kind has one.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Question(q) => Some(q.id()),
            Self::Answer(a) => Some(a.id()),
            Self::Assessment(a) => Some(&a.header.message_id),
            Self::Unknown(_) => None,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            Self::Unknown(u) => u.category.as_deref(),
            _ => self.header().map(|h| h.category.as_str()),
        }
    }

    pub fn team_name(&self) -> Option<&str> {
        match self {
            Self::Unknown(u) => u.team_name.as_deref(),
            _ => self.header().and_then(|h| h.team_name.as_deref()),
        }
    }

    /// The ID of the message this one responds to or evaluates.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Answer(a) => Some(&a.question_id),
            Self::Assessment(a) => Some(&a.answer_id),
            Self::Question(_) | Self::Unknown(_) => None,
        }
    }

    /// Check if this envelope belongs to a specific team.
    pub fn is_for_team(&self, team_name: &str) -> bool {
        self.team_name() == Some(team_name)
    }
}

impl QuestionEnvelope {
    /// `spørsmålId` when present, otherwise `messageId`.
    pub fn id(&self) -> &str {
        match self.question_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.header.message_id,
        }
    }

    /// Narrow to the read-only question handed to handlers.
    pub fn to_question(&self) -> Question {
        Question {
            id: self.id().to_string(),
            category: self.header.category.clone(),
            question: self.question.clone(),
            answer_format: self.answer_format.clone(),
            documentation: self.documentation.clone(),
        }
    }
}

impl AnswerEnvelope {
    /// `svarId` when present, otherwise `messageId`.
    pub fn id(&self) -> &str {
        match self.answer_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.header.message_id,
        }
    }

    pub fn to_answer(&self) -> Answer {
        Answer {
            answer: self.answer.clone(),
            category: self.header.category.clone(),
            question_id: self.question_id.clone(),
            team_name: self.header.team_name.clone().unwrap_or_default(),
        }
    }
}

impl AssessmentEnvelope {
    pub fn to_assessment(&self) -> Assessment {
        Assessment {
            category: self.header.category.clone(),
            status: self.status,
            answer_id: self.answer_id.clone(),
            team_name: self.header.team_name.clone().unwrap_or_default(),
        }
    }
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn current_timestamp() -> String {
    chrono::Local::now().format(TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_creation() {
        let envelope = Envelope::question("math", "2+2?").with_answer_format("integer");

        assert_eq!(envelope.kind(), MessageKind::Question);
        assert_eq!(envelope.category(), Some("math"));
        assert!(envelope.team_name().is_none());
        assert!(envelope.correlation_id().is_none());
        assert!(!envelope.message_id().unwrap().is_empty());

        let Envelope::Question(q) = envelope else {
            panic!("expected question");
        };
        assert_eq!(q.answer_format.as_deref(), Some("integer"));
    }

    #[test]
    fn test_answer_correlates_to_question() {
        let answer = Answer {
            answer: "4".to_string(),
            category: "math".to_string(),
            question_id: "Q1".to_string(),
            team_name: "blue".to_string(),
        };
        let envelope = Envelope::from_answer(answer.clone());

        assert_eq!(envelope.kind(), MessageKind::Answer);
        assert_eq!(envelope.correlation_id(), Some("Q1"));
        assert!(envelope.is_for_team("blue"));
        assert_ne!(envelope.message_id(), Some("Q1"));

        let Envelope::Answer(a) = envelope else {
            panic!("expected answer");
        };
        assert_eq!(a.answer_id.as_deref(), Some(a.header.message_id.as_str()));
        assert_eq!(a.to_answer(), answer);
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = Envelope::question("math", "1+1?");
        let b = Envelope::question("math", "1+1?");
        assert_ne!(a.message_id(), b.message_id());
    }

    #[test]
    fn test_timestamp_format() {
        let header = Header::new("math", None);
        assert!(header.created_at().is_some());
        assert!(!header.created.contains('+'));
        assert!(!header.created.ends_with('Z'));
        let fraction = header.created.rsplit('.').next().unwrap();
        assert_eq!(fraction.len(), 6);
    }

    #[test]
    fn test_assessment_projection() {
        let envelope = Envelope::assessment("math", "blue", "A1", AssessmentStatus::Correct);
        assert_eq!(envelope.correlation_id(), Some("A1"));

        let Envelope::Assessment(a) = envelope else {
            panic!("expected assessment");
        };
        let assessment = a.to_assessment();
        assert_eq!(assessment.team_name, "blue");
        assert!(assessment.status.is_correct());
    }
}
