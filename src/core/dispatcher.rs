//! Classification and handler dispatch for decoded envelopes.
//!
//! Every envelope goes through one pass of:
//! - Question -> question handler -> answer or decline
//! - Assessment -> own team? -> assessment handler
//! - Answer / Unknown -> ignored

use async_trait::async_trait;

use super::EngineError;
use crate::config::EngineConfig;
use crate::protocol::{Assessment, Envelope, Question};

/// The participant's answering logic.
#[async_trait]
pub trait QuizHandler: Send + Sync {
    /// Answer a question. `Ok(None)` declines to answer.
    async fn handle_question(&self, question: &Question) -> anyhow::Result<Option<String>>;

    /// Receive feedback on one of this team's answers.
    async fn handle_assessment(&self, _assessment: &Assessment) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Why an envelope produced no handler call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Answers on the stream (ours included) are never acted on.
    AnswerKind,
    /// Assessment addressed to another team.
    OtherTeam(Option<String>),
    UnknownKind(String),
}

/// Terminal state of a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler answered; the answer still has to be emitted.
    Answer { question: Question, answer: String },
    Declined { question_id: String },
    AssessmentDelivered { answer_id: String },
    Ignored(IgnoreReason),
}

/// Routes envelopes to handler calls on behalf of a single team.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    team_name: String,
    ignored_categories: Vec<String>,
}

impl Dispatcher {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            team_name: config.team_name.clone(),
            ignored_categories: config.ignored_categories.clone(),
        }
    }

    pub fn team_name(&self) -> &str {
        &self.team_name
    }

    fn is_quiet(&self, category: &str) -> bool {
        self.ignored_categories.iter().any(|c| c == category)
    }

    /// Classify an envelope and invoke the matching handler.
    ///
    /// A handler error aborts the cycle; nothing is committed for it.
    pub async fn dispatch<H>(&self, envelope: &Envelope, handler: &H) -> Result<DispatchOutcome, EngineError>
    where
        H: QuizHandler + ?Sized,
    {
        match envelope {
            Envelope::Question(q) => {
                let question = q.to_question();
                if self.is_quiet(&question.category) {
                    tracing::debug!(
                        "Received question: category='{}' question='{}' id='{}'",
                        question.category, question.question, question.id
                    );
                } else {
                    tracing::info!(
                        "Received question: category='{}' question='{}' format='{}' id='{}' documentation='{}'",
                        question.category,
                        question.question,
                        question.answer_format.as_deref().unwrap_or(""),
                        question.id,
                        question.documentation.as_deref().unwrap_or("")
                    );
                }

                let answer = handler
                    .handle_question(&question)
                    .await
                    .map_err(|source| EngineError::Handler {
                        message_id: question.id.clone(),
                        source,
                    })?;

                Ok(match answer {
                    Some(answer) => DispatchOutcome::Answer { question, answer },
                    None => {
                        tracing::debug!("Declined question {}", question.id);
                        DispatchOutcome::Declined { question_id: question.id }
                    }
                })
            }

            Envelope::Assessment(a) => {
                if !envelope.is_for_team(&self.team_name) {
                    return Ok(DispatchOutcome::Ignored(IgnoreReason::OtherTeam(
                        a.header.team_name.clone(),
                    )));
                }

                let assessment = a.to_assessment();
                if self.is_quiet(&assessment.category) {
                    tracing::debug!("Received assessment for answer {}: {:?}", assessment.answer_id, assessment.status);
                } else {
                    tracing::info!(
                        "Received assessment: category='{}' answer='{}' status={:?}",
                        assessment.category, assessment.answer_id, assessment.status
                    );
                }

                handler
                    .handle_assessment(&assessment)
                    .await
                    .map_err(|source| EngineError::Handler {
                        message_id: a.header.message_id.clone(),
                        source,
                    })?;

                Ok(DispatchOutcome::AssessmentDelivered {
                    answer_id: assessment.answer_id,
                })
            }

            Envelope::Answer(_) => Ok(DispatchOutcome::Ignored(IgnoreReason::AnswerKind)),

            Envelope::Unknown(u) => {
                tracing::trace!("Skipping message of unknown kind '{}'", u.event_name);
                Ok(DispatchOutcome::Ignored(IgnoreReason::UnknownKind(u.event_name.clone())))
            }
        }
    }
}
