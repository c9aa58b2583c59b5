//! JSON codec for quiz envelopes.
//!
//! Decoding is two-phase: a partial parse recovers only `@event_name`,
//! `lagnavn` and `kategorinavn`, and the full structural parse runs only for
//! kinds the dispatcher acts on.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::envelope::{AnswerEnvelope, AssessmentEnvelope, Envelope, QuestionEnvelope, UnknownEnvelope};
use super::types::MessageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// The bytes could not be classified or did not match the schema of their kind.
    Malformed,
}

#[derive(Error, Debug)]
#[error("malformed envelope: {source}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    /// The offending payload, kept for logging and dead-lettering.
    pub raw: Vec<u8>,
    #[source]
    source: serde_json::Error,
}

impl DecodeError {
    fn malformed(raw: &[u8], source: serde_json::Error) -> Self {
        Self {
            kind: DecodeErrorKind::Malformed,
            raw: raw.to_vec(),
            source,
        }
    }

    /// Payload as text, with invalid UTF-8 replaced.
    pub fn raw_lossy(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("cannot encode message of unknown kind '{0}'")]
    UnknownKind(String),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Minimal view used to classify a message before parsing its payload.
#[derive(Deserialize)]
struct Discriminator {
    #[serde(rename = "@event_name")]
    event_name: String,
    #[serde(rename = "lagnavn", default)]
    team_name: Option<String>,
    #[serde(rename = "kategorinavn", default)]
    category: Option<String>,
}

/// Body plus its discriminator, for encoding.
#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "@event_name")]
    event_name: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

/// Decode raw bytes into an envelope.
///
/// Unrecognised kinds are not an error; they come back as [`Envelope::Unknown`].
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    let disc: Discriminator =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::malformed(bytes, e))?;

    let envelope = match MessageKind::from_event_name(&disc.event_name) {
        MessageKind::Question => {
            let question = serde_json::from_slice::<QuestionEnvelope>(bytes)
                .map_err(|e| DecodeError::malformed(bytes, e))?;
            if question.id().is_empty() {
                let missing = serde_json::Error::custom("question has neither `spørsmålId` nor `messageId`");
                return Err(DecodeError::malformed(bytes, missing));
            }
            Envelope::Question(question)
        }
        MessageKind::Answer => Envelope::Answer(
            serde_json::from_slice::<AnswerEnvelope>(bytes)
                .map_err(|e| DecodeError::malformed(bytes, e))?,
        ),
        MessageKind::Assessment => Envelope::Assessment(
            serde_json::from_slice::<AssessmentEnvelope>(bytes)
                .map_err(|e| DecodeError::malformed(bytes, e))?,
        ),
        MessageKind::Unknown(event_name) => Envelope::Unknown(UnknownEnvelope {
            event_name,
            team_name: disc.team_name,
            category: disc.category,
        }),
    };

    Ok(envelope)
}

/// Encode an envelope to its wire form.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EncodeError> {
    let kind = envelope.kind();
    let bytes = match envelope {
        Envelope::Question(body) => serde_json::to_vec(&Tagged { event_name: kind.event_name(), body })?,
        Envelope::Answer(body) => serde_json::to_vec(&Tagged { event_name: kind.event_name(), body })?,
        Envelope::Assessment(body) => serde_json::to_vec(&Tagged { event_name: kind.event_name(), body })?,
        Envelope::Unknown(u) => return Err(EncodeError::UnknownKind(u.event_name.clone())),
    };
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Answer, AssessmentStatus};
    use serde_json::{json, Value};

    #[test]
    fn test_question_projection_survives_round_trip() {
        let envelope = Envelope::question("math", "2+2?")
            .with_answer_format("integer")
            .with_documentation("https://example.org/arithmetic");
        let bytes = encode(&envelope).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);

        let (Envelope::Question(sent), Envelope::Question(back)) = (&envelope, &decoded) else {
            panic!("expected questions");
        };
        assert_eq!(back.to_question(), sent.to_question());
    }

    #[test]
    fn test_decode_question_wire_form() {
        let raw = json!({
            "@event_name": "SPØRSMÅL",
            "messageId": "Q1",
            "kategorinavn": "math",
            "spørsmål": "2+2?",
            "svarformat": "integer",
            "@opprettet": "2024-01-01T10:00:00.123456"
        });
        let envelope = decode(raw.to_string().as_bytes()).unwrap();

        let Envelope::Question(q) = envelope else {
            panic!("expected question");
        };
        let question = q.to_question();
        assert_eq!(question.id, "Q1");
        assert_eq!(question.category, "math");
        assert_eq!(question.question, "2+2?");
        assert_eq!(question.answer_format.as_deref(), Some("integer"));
        assert!(question.documentation.is_none());
    }

    #[test]
    fn test_answer_wire_form_omits_irrelevant_fields() {
        let envelope = Envelope::from_answer(Answer {
            answer: "4".to_string(),
            category: "math".to_string(),
            question_id: "Q1".to_string(),
            team_name: "blue".to_string(),
        });
        let value: Value = serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj["@event_name"], "SVAR");
        assert_eq!(obj["spørsmålId"], "Q1");
        assert_eq!(obj["svar"], "4");
        assert_eq!(obj["lagnavn"], "blue");
        assert_eq!(obj["kategorinavn"], "math");
        assert!(obj.contains_key("messageId"));
        assert_eq!(obj["svarId"], obj["messageId"]);
        assert!(obj.contains_key("@opprettet"));
        for absent in ["spørsmål", "svarformat", "dokumentasjon", "status"] {
            assert!(!obj.contains_key(absent), "unexpected key {absent}");
        }
    }

    #[test]
    fn test_decode_question_identified_by_question_id() {
        let raw = json!({
            "@event_name": "SPØRSMÅL",
            "spørsmålId": "Q1",
            "kategorinavn": "math",
            "spørsmål": "2+2?",
            "svarformat": "integer",
            "lagnavn": "",
            "svar": "",
            "svarId": "",
            "dokumentasjon": "",
            "@opprettet": "2024-01-01T10:00:00.123456"
        });
        let envelope = decode(raw.to_string().as_bytes()).unwrap();
        assert_eq!(envelope.message_id(), Some("Q1"));

        let Envelope::Question(q) = envelope else {
            panic!("expected question");
        };
        assert_eq!(q.to_question().id, "Q1");
        assert_eq!(q.to_question().question, "2+2?");
    }

    #[test]
    fn test_question_id_wins_over_message_id() {
        let raw = json!({
            "@event_name": "SPØRSMÅL",
            "messageId": "M1",
            "spørsmålId": "Q1",
            "kategorinavn": "math",
            "spørsmål": "2+2?",
            "@opprettet": "2024-01-01T10:00:00.123456"
        });
        let Envelope::Question(q) = decode(raw.to_string().as_bytes()).unwrap() else {
            panic!("expected question");
        };
        assert_eq!(q.id(), "Q1");
    }

    #[test]
    fn test_question_without_any_id_is_malformed() {
        let raw = json!({
            "@event_name": "SPØRSMÅL",
            "kategorinavn": "math",
            "spørsmål": "2+2?",
            "@opprettet": "2024-01-01T10:00:00.123456"
        });
        let err = decode(raw.to_string().as_bytes()).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::Malformed);
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let raw = json!({"@event_name": "HEARTBEAT", "lagnavn": "blue", "kategorinavn": "ops", "whatever": [1, 2]});
        let envelope = decode(raw.to_string().as_bytes()).unwrap();

        assert_eq!(envelope.kind(), MessageKind::Unknown("HEARTBEAT".to_string()));
        assert_eq!(envelope.team_name(), Some("blue"));
        assert_eq!(envelope.category(), Some("ops"));
        assert!(matches!(encode(&envelope), Err(EncodeError::UnknownKind(_))));
    }

    #[test]
    fn test_unparseable_payload_is_malformed() {
        let err = decode(b"{not json").unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::Malformed);
        assert_eq!(err.raw_lossy(), "{not json");
    }

    #[test]
    fn test_missing_discriminator_is_malformed() {
        let raw = json!({"messageId": "Q1", "kategorinavn": "math"});
        assert!(decode(raw.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_known_kind_with_bad_payload_is_malformed() {
        let raw = json!({"@event_name": "SPØRSMÅL", "messageId": "Q1", "kategorinavn": "math"});
        let err = decode(raw.to_string().as_bytes()).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::Malformed);
    }

    #[test]
    fn test_decode_assessment() {
        let raw = json!({
            "@event_name": "KORREKTUR",
            "messageId": "K1",
            "lagnavn": "blue",
            "kategorinavn": "math",
            "svarId": "A1",
            "status": "FEIL",
            "@opprettet": "2024-01-01T10:00:01.000001"
        });
        let envelope = decode(raw.to_string().as_bytes()).unwrap();
        let Envelope::Assessment(a) = envelope else {
            panic!("expected assessment");
        };
        assert_eq!(a.answer_id, "A1");
        assert_eq!(a.status, AssessmentStatus::Incorrect);
    }
}
