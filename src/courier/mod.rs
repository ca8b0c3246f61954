//! # Courier Queue
//!
//! Hands committed outgoing messages to the transport layer.
//!
//! Messages are grouped by channel and priority, and every group becomes exactly
//! one batch: a JSON array pushed as a single sorted-set member under
//! `msgs:<channel-uuid>|<tps>/<0|1>`. The transport pops the highest score first,
//! which [`crate::queue::queue_score`] makes the highest priority, oldest batch.
//! Each queue key is also registered in `msgs:active` so senders can discover it;
//! the batch and its registration are written in one atomic step, so a batch is
//! either queued and discoverable or reported failed, never both.
//!
//! Messages on locally polled channel types are never queued; the device picks
//! them up itself. A failed push is not an error for the caller: the messages of
//! that batch come back as failed so they can be marked pending, and
//! [`retry_pending_messages`] queues them again later.

pub mod retry;

use indexmap::IndexMap;
use tracing::error;

use crate::config::CourierConfig;
use crate::constants::{COURIER_ACTIVE_KEY, COURIER_QUEUE_PREFIX};
use crate::models::{Channel, Msg, MsgId};
use crate::queue::{queue_score, SortedSetStore};

pub use retry::retry_pending_messages;

/// What happened to each message handed to [`queue_messages`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueOutcome {
    /// Pushed to a courier queue
    pub queued: Vec<MsgId>,
    /// Left for a locally polled channel to pick up
    pub polled: Vec<MsgId>,
    /// Push failed; these should go back to pending
    pub failed: Vec<MsgId>,
}

impl QueueOutcome {
    pub fn merge(&mut self, other: QueueOutcome) {
        self.queued.extend(other.queued);
        self.polled.extend(other.polled);
        self.failed.extend(other.failed);
    }
}

/// Queue key for a channel and priority
pub fn queue_key(channel: &Channel, default_tps: u32, high_priority: bool) -> String {
    let tps = channel.tps.unwrap_or(default_tps);
    let bucket = u8::from(high_priority);
    format!("{COURIER_QUEUE_PREFIX}:{}|{tps}/{bucket}", channel.uuid)
}

/// Queue outgoing messages, one batch per channel and priority
pub async fn queue_messages(
    queues: &dyn SortedSetStore,
    config: &CourierConfig,
    msgs: &[(&Channel, &Msg)],
) -> QueueOutcome {
    let mut outcome = QueueOutcome::default();
    let mut batches: IndexMap<String, (bool, Vec<&Msg>)> = IndexMap::new();

    for (channel, msg) in msgs {
        if config.is_locally_polled(&channel.channel_type) {
            outcome.polled.push(msg.id);
            continue;
        }
        let key = queue_key(channel, config.default_tps, msg.high_priority);
        batches
            .entry(key)
            .or_insert_with(|| (msg.high_priority, Vec::new()))
            .1
            .push(*msg);
    }

    for (key, (high_priority, batch)) in batches {
        let ids: Vec<MsgId> = batch.iter().map(|m| m.id).collect();
        match push_batch(queues, &key, high_priority, &batch).await {
            Ok(()) => {
                crate::log_queue!(
                    debug,
                    "courier_batch_queued",
                    key: key,
                    msgs: ids.len(),
                    high_priority: high_priority
                );
                outcome.queued.extend(ids);
            }
            Err(e) => {
                error!(key = %key, msgs = ids.len(), error = %e, "Failed to queue courier batch");
                outcome.failed.extend(ids);
            }
        }
    }

    outcome
}

async fn push_batch(
    queues: &dyn SortedSetStore,
    key: &str,
    high_priority: bool,
    batch: &[&Msg],
) -> crate::error::Result<()> {
    let payload = serde_json::to_string(batch)?;
    queues
        .push_indexed(key, &payload, queue_score(high_priority), COURIER_ACTIVE_KEY)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemorySortedSetStore;
    use chrono::Utc;

    fn msg(id: MsgId, channel: &Channel, high_priority: bool) -> Msg {
        let mut msg = Msg::outgoing(1, 1, format!("msg {id}"), Utc::now());
        msg.id = id;
        msg.channel_id = Some(channel.id);
        msg.channel_uuid = Some(channel.uuid);
        msg.high_priority = high_priority;
        msg
    }

    #[test]
    fn test_queue_key_format() {
        let mut channel = Channel::new(1, "T");
        assert_eq!(
            queue_key(&channel, 10, false),
            format!("msgs:{}|10/0", channel.uuid)
        );
        channel.tps = Some(50);
        assert_eq!(
            queue_key(&channel, 10, true),
            format!("msgs:{}|50/1", channel.uuid)
        );
    }

    #[tokio::test]
    async fn test_priorities_form_separate_batches() {
        let queues = InMemorySortedSetStore::new();
        let channel = Channel::new(1, "T");
        let (a, b, c) = (msg(1, &channel, false), msg(2, &channel, true), msg(3, &channel, false));

        let outcome = queue_messages(
            &queues,
            &CourierConfig::default(),
            &[(&channel, &a), (&channel, &b), (&channel, &c)],
        )
        .await;
        assert_eq!(outcome.queued, vec![1, 3, 2]);

        let normal = queues
            .zpopmax(&queue_key(&channel, 10, false))
            .await
            .unwrap()
            .unwrap();
        let batch: Vec<Msg> = serde_json::from_str(&normal.0).unwrap();
        assert_eq!(batch.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 3]);

        assert_eq!(queues.zcard(&queue_key(&channel, 10, true)).await.unwrap(), 1);
        assert_eq!(queues.zcard(COURIER_ACTIVE_KEY).await.unwrap(), 2);
    }

    /// Rejects indexed pushes and writes nothing, like a transaction that never ran
    struct RejectingPushes(InMemorySortedSetStore);

    #[async_trait::async_trait]
    impl SortedSetStore for RejectingPushes {
        async fn zadd(&self, key: &str, member: &str, score: f64) -> crate::error::Result<()> {
            self.0.zadd(key, member, score).await
        }
        async fn push_indexed(&self, _: &str, _: &str, _: f64, _: &str) -> crate::error::Result<()> {
            Err(crate::error::MailroomError::Queue("EXECABORT".into()))
        }
        async fn zincrby(&self, key: &str, member: &str, delta: f64) -> crate::error::Result<f64> {
            self.0.zincrby(key, member, delta).await
        }
        async fn zrem(&self, key: &str, member: &str) -> crate::error::Result<bool> {
            self.0.zrem(key, member).await
        }
        async fn zcard(&self, key: &str) -> crate::error::Result<u64> {
            self.0.zcard(key).await
        }
        async fn zpopmax(&self, key: &str) -> crate::error::Result<Option<(String, f64)>> {
            self.0.zpopmax(key).await
        }
        async fn zrange_with_scores(&self, key: &str) -> crate::error::Result<Vec<(String, f64)>> {
            self.0.zrange_with_scores(key).await
        }
        async fn pop_fair(
            &self,
            active: &str,
            prefix: &str,
        ) -> crate::error::Result<Option<(String, String)>> {
            self.0.pop_fair(active, prefix).await
        }
        fn provider_name(&self) -> &'static str {
            "rejecting"
        }
    }

    #[tokio::test]
    async fn test_failed_batch_is_never_left_in_queue() {
        let queues = RejectingPushes(InMemorySortedSetStore::new());
        let channel = Channel::new(1, "T");
        let m = msg(42, &channel, false);

        let outcome =
            queue_messages(&queues, &CourierConfig::default(), &[(&channel, &m)]).await;
        assert_eq!(outcome.failed, vec![42]);
        assert!(outcome.queued.is_empty());
        assert_eq!(queues.zcard(&queue_key(&channel, 10, false)).await.unwrap(), 0);
        assert_eq!(queues.zcard(COURIER_ACTIVE_KEY).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_earlier_batches_pop_first() {
        let queues = InMemorySortedSetStore::new();
        let config = CourierConfig::default();
        let channel = Channel::new(1, "T");
        let first = msg(1, &channel, false);
        let second = msg(2, &channel, false);

        queue_messages(&queues, &config, &[(&channel, &first)]).await;
        queue_messages(&queues, &config, &[(&channel, &second)]).await;

        let key = queue_key(&channel, 10, false);
        let popped: Vec<Msg> =
            serde_json::from_str(&queues.zpopmax(&key).await.unwrap().unwrap().0).unwrap();
        assert_eq!(popped[0].id, 1);
    }
}
