//! The sequential fetch -> dispatch -> commit loop.

use std::collections::HashMap;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::dispatcher::{DispatchOutcome, Dispatcher, QuizHandler};
use super::emitter::AnswerEmitter;
use super::EngineError;
use crate::channel::{QuizChannel, RawMessage, TransportError};
use crate::config::{EngineConfig, MalformedPolicy};
use crate::error::Result;
use crate::protocol::decode;

/// Malformed-message attempt counters kept before the table is reset.
const MAX_TRACKED_MALFORMED: usize = 1024;

/// What to do with a message that failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MalformedAction {
    Leave,
    Redeliver,
    Skip,
}

/// What a single cycle ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Answered { answer_id: String, question_id: String },
    Declined,
    AssessmentDelivered,
    Ignored,
    Malformed { committed: bool },
}

/// Counters over the engine's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub fetched: u64,
    pub answered: u64,
    pub declined: u64,
    pub assessments: u64,
    pub ignored: u64,
    pub malformed: u64,
    pub committed: u64,
    pub commit_failures: u64,
    pub fetch_failures: u64,
}

impl std::fmt::Display for CycleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cycle Stats:\n")?;
        write!(f, "  Fetched:     {}\n", self.fetched)?;
        write!(f, "  Answered:    {}\n", self.answered)?;
        write!(f, "  Declined:    {}\n", self.declined)?;
        write!(f, "  Assessments: {}\n", self.assessments)?;
        write!(f, "  Ignored:     {}\n", self.ignored)?;
        write!(f, "  Malformed:   {}\n", self.malformed)?;
        write!(f, "  Committed:   {} ({} failed)", self.committed, self.commit_failures)
    }
}

/// A quiz participant bound to one channel, one team and one handler.
pub struct Rapid<C, H> {
    channel: C,
    handler: H,
    config: EngineConfig,
    dispatcher: Dispatcher,
    emitter: AnswerEmitter,
    malformed_attempts: HashMap<(i32, u64), u32>,
    stats: CycleStats,
}

impl<C, H> Rapid<C, H>
where
    C: QuizChannel,
    H: QuizHandler,
{
    /// Create a new engine. The config is validated once and never changes afterwards.
    pub fn new(config: EngineConfig, channel: C, handler: H) -> Result<Self> {
        config.validate()?;
        tracing::info!("Creating new rapid for team '{}'", config.team_name);

        Ok(Self {
            dispatcher: Dispatcher::new(&config),
            emitter: AnswerEmitter::new(&config),
            channel,
            handler,
            config,
            malformed_attempts: HashMap::new(),
            stats: CycleStats::default(),
        })
    }

    pub fn team_name(&self) -> &str {
        &self.config.team_name
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Run cycles until cancelled, the stream closes, or a fatal error occurs.
    ///
    /// Cancellation aborts a pending fetch or retry sleep. It never interrupts
    /// a handler call or an answer submission already in progress.
    pub async fn run(&mut self, cancel: CancellationToken) -> std::result::Result<(), EngineError> {
        tracing::info!("Starting QuizRapid, looking for first question");

        let result = self.run_cycles(&cancel).await;

        match &result {
            Ok(()) => tracing::info!("QuizRapid stopped\n{}", self.stats),
            Err(e) => tracing::error!("QuizRapid stopped on fatal error: {}\n{}", e, self.stats),
        }
        result
    }

    async fn run_cycles(&mut self, cancel: &CancellationToken) -> std::result::Result<(), EngineError> {
        loop {
            if cancel.is_cancelled() {
                tracing::info!("Cancellation requested");
                return Ok(());
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Cancellation requested during fetch");
                    return Ok(());
                }
                fetched = self.channel.fetch_next() => fetched,
            };

            let message = match fetched {
                Ok(message) => message,
                Err(TransportError::Closed) => {
                    tracing::info!("Message stream closed");
                    return Ok(());
                }
                Err(e) => {
                    self.stats.fetch_failures += 1;
                    if e.is_transient() {
                        tracing::warn!("Failed to read message: {}", e);
                    } else {
                        tracing::error!("Failed to read message: {}", e);
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.config.retry_backoff()) => {}
                    }
                    continue;
                }
            };

            self.process(message).await?;
        }
    }

    /// Run one cycle for an already-fetched message: decode, dispatch, emit, commit.
    ///
    /// The offset is committed only when the cycle reaches a terminal state
    /// without a handler or submission error.
    pub async fn process(&mut self, message: RawMessage) -> std::result::Result<CycleOutcome, EngineError> {
        self.stats.fetched += 1;

        let envelope = match decode(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.malformed += 1;
                tracing::error!("Failed to decode message at offset {}: {}", message.offset, e);
                tracing::debug!("Malformed payload: {}", e.raw_lossy());

                let committed = match self.malformed_action(&message) {
                    MalformedAction::Skip => self.commit(&message).await,
                    MalformedAction::Redeliver => {
                        if let Err(e) = self.channel.seek(&message).await {
                            tracing::error!("Failed to rewind to offset {}: {}", message.offset, e);
                        }
                        false
                    }
                    MalformedAction::Leave => false,
                };
                return Ok(CycleOutcome::Malformed { committed });
            }
        };

        let dispatched = self.dispatcher.dispatch(&envelope, &self.handler).await?;
        let outcome = match dispatched {
            DispatchOutcome::Answer { question, answer } => {
                let sent = self.emitter.emit(&mut self.channel, &question, answer).await?;
                self.stats.answered += 1;
                CycleOutcome::Answered {
                    answer_id: sent.message_id().unwrap_or_default().to_string(),
                    question_id: question.id,
                }
            }
            DispatchOutcome::Declined { .. } => {
                self.stats.declined += 1;
                CycleOutcome::Declined
            }
            DispatchOutcome::AssessmentDelivered { .. } => {
                self.stats.assessments += 1;
                CycleOutcome::AssessmentDelivered
            }
            DispatchOutcome::Ignored(reason) => {
                tracing::trace!("Ignored message at offset {}: {:?}", message.offset, reason);
                self.stats.ignored += 1;
                CycleOutcome::Ignored
            }
        };

        self.commit(&message).await;
        Ok(outcome)
    }

    /// Close the underlying channel.
    pub async fn close(&mut self) -> std::result::Result<(), TransportError> {
        self.channel.close().await
    }

    /// Commit a message; failures are logged and absorbed.
    async fn commit(&mut self, message: &RawMessage) -> bool {
        match self.channel.commit(message).await {
            Ok(()) => {
                self.stats.committed += 1;
                true
            }
            Err(e) => {
                self.stats.commit_failures += 1;
                tracing::error!("Failed to commit offset {}: {}", message.offset, e);
                false
            }
        }
    }

    /// Count the attempt and decide. Under `RetryThenSkip` the message is
    /// redelivered on this channel until the budget runs out, then committed.
    fn malformed_action(&mut self, message: &RawMessage) -> MalformedAction {
        match self.config.malformed_policy {
            MalformedPolicy::LeaveUncommitted => MalformedAction::Leave,
            MalformedPolicy::SkipAndCommit => MalformedAction::Skip,
            MalformedPolicy::RetryThenSkip { max_attempts } => {
                if self.malformed_attempts.len() >= MAX_TRACKED_MALFORMED {
                    self.malformed_attempts.clear();
                }
                let key = (message.partition, message.offset);
                let seen = self.malformed_attempts.entry(key).or_insert(0);
                *seen += 1;
                if *seen >= max_attempts {
                    tracing::warn!(
                        "Skipping malformed message at offset {} after {} attempts",
                        message.offset, seen
                    );
                    self.malformed_attempts.remove(&key);
                    MalformedAction::Skip
                } else {
                    MalformedAction::Redeliver
                }
            }
        }
    }
}
