//! In-process message log with consumer-group offsets.
//!
//! Models the parts of a partitioned log the engine relies on: one ordered
//! partition per topic, committed offsets per consumer group, and redelivery
//! of everything after the committed offset when a group reconnects.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{ChannelFactory, QuizChannel, RawMessage, Result, TransportError};
use crate::config::ConnectionConfig;

const PARTITION: i32 = 0;

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<u8>>>,
    /// (topic, group) -> next offset to deliver
    committed: HashMap<(String, String), u64>,
    closed: bool,
    faults: Faults,
}

/// Queued failures returned by the next matching operations.
#[derive(Debug, Default)]
struct Faults {
    fetch: VecDeque<TransportError>,
    commit: VecDeque<TransportError>,
    publish: VecDeque<TransportError>,
}

#[derive(Debug, Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    notify: Notify,
}

/// Shared in-memory broker. Cheap to clone; clones see the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        // Every mutation is a single push or insert, so a poisoned state is still consistent.
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a payload to a topic. Returns its offset.
    pub fn append(&self, topic: &str, payload: impl Into<Vec<u8>>) -> u64 {
        let offset = {
            let mut state = self.state();
            let log = state.topics.entry(topic.to_string()).or_default();
            log.push(payload.into());
            (log.len() - 1) as u64
        };
        self.inner.notify.notify_waiters();
        offset
    }

    /// All payloads on a topic, in log order.
    pub fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        self.state().topics.get(topic).cloned().unwrap_or_default()
    }

    /// Next offset the group will receive after reconnecting.
    pub fn committed_offset(&self, topic: &str, group: &str) -> Option<u64> {
        self.state()
            .committed
            .get(&(topic.to_string(), group.to_string()))
            .copied()
    }

    /// Open a channel for a consumer group, positioned at its committed offset.
    pub fn channel(&self, topic: &str, group: &str) -> MemoryChannel {
        let position = self.committed_offset(topic, group).unwrap_or(0);
        tracing::debug!("Opened memory channel topic={} group={} offset={}", topic, group, position);
        MemoryChannel {
            broker: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            position,
            closed: false,
        }
    }

    /// End the stream: pending and future fetches return [`TransportError::Closed`]
    /// once they have drained the log.
    pub fn close(&self) {
        self.state().closed = true;
        self.inner.notify.notify_waiters();
    }

    /// Make the next fetch fail with `error`.
    pub fn fail_next_fetch(&self, error: TransportError) {
        self.state().faults.fetch.push_back(error);
    }

    /// Make the next commit fail with `error`.
    pub fn fail_next_commit(&self, error: TransportError) {
        self.state().faults.commit.push_back(error);
    }

    /// Make the next publish fail with `error`.
    pub fn fail_next_publish(&self, error: TransportError) {
        self.state().faults.publish.push_back(error);
    }
}

#[async_trait]
impl ChannelFactory for MemoryBroker {
    type Channel = MemoryChannel;

    async fn connect(&self, config: &ConnectionConfig) -> Result<MemoryChannel> {
        if config.group_id.is_empty() {
            return Err(TransportError::Fatal("group ID is required".to_string()));
        }
        Ok(self.channel(&config.topic, &config.group_id))
    }
}

/// One consumer-group member reading and writing a single topic.
#[derive(Debug)]
pub struct MemoryChannel {
    broker: MemoryBroker,
    topic: String,
    group: String,
    position: u64,
    closed: bool,
}

impl MemoryChannel {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

#[async_trait]
impl QuizChannel for MemoryChannel {
    async fn fetch_next(&mut self) -> Result<RawMessage> {
        loop {
            if self.closed {
                return Err(TransportError::Closed);
            }

            let notified = self.broker.inner.notify.notified();
            {
                let mut state = self.broker.state();
                if let Some(err) = state.faults.fetch.pop_front() {
                    return Err(err);
                }

                let log = state.topics.get(&self.topic);
                if let Some(payload) = log.and_then(|l| l.get(self.position as usize)) {
                    let message = RawMessage {
                        partition: PARTITION,
                        offset: self.position,
                        payload: payload.clone(),
                    };
                    self.position += 1;
                    return Ok(message);
                }

                if state.closed {
                    return Err(TransportError::Closed);
                }
            }
            notified.await;
        }
    }

    async fn commit(&mut self, message: &RawMessage) -> Result<()> {
        let mut state = self.broker.state();
        if let Some(err) = state.faults.commit.pop_front() {
            return Err(err);
        }

        let next = message.offset + 1;
        let entry = state
            .committed
            .entry((self.topic.clone(), self.group.clone()))
            .or_insert(0);
        *entry = (*entry).max(next);
        Ok(())
    }

    async fn seek(&mut self, message: &RawMessage) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.position = message.offset;
        Ok(())
    }

    async fn publish(&mut self, payload: Vec<u8>) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if let Some(err) = self.broker.state().faults.publish.pop_front() {
            return Err(err);
        }
        self.broker.append(&self.topic, payload);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
