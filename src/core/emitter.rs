//! Builds and submits answer envelopes.

use std::time::Duration;

use super::EngineError;
use crate::channel::QuizChannel;
use crate::config::EngineConfig;
use crate::protocol::{encode, Answer, Envelope, Question};

/// Turns handler results into published answers under the engine's team name.
#[derive(Debug, Clone)]
pub struct AnswerEmitter {
    team_name: String,
    max_attempts: u32,
    backoff: Duration,
    ignored_categories: Vec<String>,
}

impl AnswerEmitter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            team_name: config.team_name.clone(),
            max_attempts: config.max_publish_attempts.max(1),
            backoff: config.retry_backoff(),
            ignored_categories: config.ignored_categories.clone(),
        }
    }

    /// Build the outbound envelope answering `question`.
    pub fn build(&self, question: &Question, answer: String) -> Envelope {
        Envelope::from_answer(Answer {
            answer,
            category: question.category.clone(),
            question_id: question.id.clone(),
            team_name: self.team_name.clone(),
        })
    }

    /// Encode and publish an answer, retrying transient transport failures.
    ///
    /// Returns the envelope that was published.
    pub async fn emit<C>(&self, channel: &mut C, question: &Question, answer: String) -> Result<Envelope, EngineError>
    where
        C: QuizChannel + ?Sized,
    {
        let envelope = self.build(question, answer);
        let payload = encode(&envelope)?;

        let mut attempt = 1;
        loop {
            match channel.publish(payload.clone()).await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        "Publish attempt {}/{} for question {} failed: {}",
                        attempt, self.max_attempts, question.id, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
                Err(source) => {
                    return Err(EngineError::Publish {
                        question_id: question.id.clone(),
                        source,
                    });
                }
            }
        }

        if let Envelope::Answer(a) = &envelope {
            if self.ignored_categories.contains(&a.header.category) {
                tracing::debug!("Published answer {} to question {}", a.header.message_id, a.question_id);
            } else {
                tracing::info!(
                    "Published answer: category='{}' answer='{}' team='{}'",
                    a.header.category, a.answer, self.team_name
                );
            }
        }

        Ok(envelope)
    }
}
