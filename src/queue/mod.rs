//! # Sorted-Set Queue Store
//!
//! The courier batch queues and the fair task queues both live in sorted sets.
//! [`SortedSetStore`] is the small slice of sorted-set operations they need, with a
//! Redis provider for deployments and an in-memory provider for tests.
//!
//! Scores encode priority and arrival: [`queue_score`] puts every high priority
//! entry above every normal one and, within a priority, earlier arrivals above
//! later ones, so popping the highest score is FIFO per priority.

pub mod memory;
pub mod redis;
pub mod tasks;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::Result;

pub use self::memory::InMemorySortedSetStore;
pub use self::redis::RedisSortedSetStore;
pub use tasks::{Priority, QueueTask, TaskQueue};

#[async_trait]
pub trait SortedSetStore: Send + Sync + 'static {
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Atomically add `member` to `key` and register `key` in `index_key` with a
    /// zero score unless it is already there. Either both writes land or neither.
    async fn push_indexed(&self, key: &str, member: &str, score: f64, index_key: &str)
        -> Result<()>;

    /// Returns the new score; absent members start from zero
    async fn zincrby(&self, key: &str, member: &str, delta: f64) -> Result<f64>;

    async fn zrem(&self, key: &str, member: &str) -> Result<bool>;

    async fn zcard(&self, key: &str) -> Result<u64>;

    /// Remove and return the highest scored member
    async fn zpopmax(&self, key: &str) -> Result<Option<(String, f64)>>;

    /// Every member with its score, lowest score first
    async fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>>;

    /// Atomically pop from the least busy owner.
    ///
    /// Owners are the members of `active_key`, scored by how many workers are busy
    /// with their tasks. Starting from the lowest score, pops the highest scored
    /// entry of `<prefix>:<owner>`, increments the owner's score and returns
    /// `(owner, entry)`. Owners whose set turns out empty are dropped from
    /// `active_key` along the way.
    async fn pop_fair(&self, active_key: &str, prefix: &str) -> Result<Option<(String, String)>>;

    fn provider_name(&self) -> &'static str;
}

/// Offset separating the two priority bands; arrival sequences stay below it
const PRIORITY_BAND: i64 = 1 << 51;

static LAST_SEQUENCE: AtomicI64 = AtomicI64::new(0);

/// Strictly increasing arrival sequence for this process, in microseconds
pub fn next_sequence() -> i64 {
    let now = Utc::now().timestamp_micros();
    let previous = LAST_SEQUENCE
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}

/// Score for an entry arriving now; both bands fit exactly in an f64 mantissa
pub fn queue_score(high_priority: bool) -> f64 {
    score_for(high_priority, next_sequence())
}

pub(crate) fn score_for(high_priority: bool, sequence: i64) -> f64 {
    let band = if high_priority { PRIORITY_BAND } else { 0 };
    let sequence = sequence.clamp(0, PRIORITY_BAND - 1);
    (band + (PRIORITY_BAND - sequence)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sequence_is_strictly_increasing() {
        let mut last = next_sequence();
        for _ in 0..1000 {
            let next = next_sequence();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_high_priority_outranks_any_normal_entry() {
        let early_normal = score_for(false, 1);
        let late_high = score_for(true, PRIORITY_BAND - 2);
        assert!(late_high > early_normal);
    }

    proptest! {
        #[test]
        fn earlier_arrivals_score_higher_within_a_priority(
            a in 0i64..(1i64 << 51) - 1,
            gap in 1i64..1_000_000,
            high in any::<bool>(),
        ) {
            let b = (a + gap).min(PRIORITY_BAND - 1);
            prop_assume!(b > a);
            prop_assert!(score_for(high, a) > score_for(high, b));
        }
    }
}
