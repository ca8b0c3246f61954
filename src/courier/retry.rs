//! Periodic sweep that re-queues outgoing messages stuck in pending.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use super::{queue_messages, QueueOutcome};
use crate::config::CourierConfig;
use crate::error::Result;
use crate::queue::SortedSetStore;
use crate::store::Store;

/// Re-queue pending outgoing messages created more than `requeue_after_secs` ago.
///
/// Messages that queue (or belong to a locally polled channel) are marked queued;
/// those that fail again stay pending for the next sweep.
#[instrument(skip_all, fields(store = store.provider_name()))]
pub async fn retry_pending_messages(
    store: &dyn Store,
    queues: &dyn SortedSetStore,
    config: &CourierConfig,
    now: DateTime<Utc>,
) -> Result<QueueOutcome> {
    let cutoff = i64::try_from(config.requeue_after_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let pending = store
        .select_pending_messages(cutoff, config.requeue_batch_size)
        .await?;
    if pending.is_empty() {
        return Ok(QueueOutcome::default());
    }

    let msgs: Vec<_> = pending.iter().map(|p| (&p.channel, &p.msg)).collect();
    let outcome = queue_messages(queues, config, &msgs).await;

    let sendable: Vec<_> = outcome
        .queued
        .iter()
        .chain(outcome.polled.iter())
        .copied()
        .collect();
    store.mark_messages_queued(&sendable).await?;

    info!(
        selected = pending.len(),
        queued = outcome.queued.len(),
        polled = outcome.polled.len(),
        failed = outcome.failed.len(),
        "Re-queued pending messages"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, Contact, Msg, MsgStatus};
    use crate::queue::InMemorySortedSetStore;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_old_pending_messages_are_requeued() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let store = InMemoryStore::new();
        let queues = InMemorySortedSetStore::new();
        let channel = Channel::new(1, "T");
        store.insert_channel(channel.clone());
        store.insert_contact(&Contact::new(1, 1, now));

        let mut old = Msg::outgoing(1, 1, "old", now - Duration::minutes(30));
        old.channel_id = Some(channel.id);
        old.status = MsgStatus::Pending;
        let old_id = store.insert_msg(old);

        let mut fresh = Msg::outgoing(1, 1, "fresh", now - Duration::seconds(10));
        fresh.channel_id = Some(channel.id);
        fresh.status = MsgStatus::Pending;
        let fresh_id = store.insert_msg(fresh);

        let outcome = retry_pending_messages(&store, &queues, &CourierConfig::default(), now)
            .await
            .unwrap();
        assert_eq!(outcome.queued, vec![old_id]);

        let state = store.snapshot();
        assert_eq!(state.msgs[&old_id].status, MsgStatus::Queued);
        assert_eq!(state.msgs[&fresh_id].status, MsgStatus::Pending);
        assert_eq!(queues.zcard(&crate::courier::queue_key(&channel, 10, false)).await.unwrap(), 1);
    }
}
