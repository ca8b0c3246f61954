//! In-memory sorted-set provider for tests and single-process use.
//!
//! Ties between equal scores break by member, highest member first on pops, the
//! same order Redis uses.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;

use super::SortedSetStore;
use crate::error::Result;

type SortedSet = HashMap<String, f64>;

#[derive(Debug, Default)]
pub struct InMemorySortedSetStore {
    sets: Mutex<HashMap<String, SortedSet>>,
}

impl InMemorySortedSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently holding at least one member
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .sets
            .lock()
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

fn by_score(a: &(&String, &f64), b: &(&String, &f64)) -> Ordering {
    a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0))
}

fn pop_max(set: &mut SortedSet) -> Option<(String, f64)> {
    let member = set.iter().max_by(by_score).map(|(m, _)| m.clone())?;
    set.remove_entry(&member)
}

fn ascending(set: &SortedSet) -> Vec<(String, f64)> {
    let mut members: Vec<_> = set.iter().collect();
    members.sort_by(by_score);
    members.into_iter().map(|(m, s)| (m.clone(), *s)).collect()
}

#[async_trait]
impl SortedSetStore for InMemorySortedSetStore {
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.sets
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn push_indexed(
        &self,
        key: &str,
        member: &str,
        score: f64,
        index_key: &str,
    ) -> Result<()> {
        let mut sets = self.sets.lock();
        sets.entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        sets.entry(index_key.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert(0.0);
        Ok(())
    }

    async fn zincrby(&self, key: &str, member: &str, delta: f64) -> Result<f64> {
        let mut sets = self.sets.lock();
        let score = sets
            .entry(key.to_string())
            .or_default()
            .entry(member.to_string())
            .or_insert(0.0);
        *score += delta;
        Ok(*score)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .sets
            .lock()
            .get_mut(key)
            .map(|set| set.remove(member).is_some())
            .unwrap_or(false))
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        Ok(self.sets.lock().get(key).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn zpopmax(&self, key: &str) -> Result<Option<(String, f64)>> {
        Ok(self.sets.lock().get_mut(key).and_then(pop_max))
    }

    async fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>> {
        Ok(self.sets.lock().get(key).map(ascending).unwrap_or_default())
    }

    async fn pop_fair(&self, active_key: &str, prefix: &str) -> Result<Option<(String, String)>> {
        let mut sets = self.sets.lock();
        let owners = sets.get(active_key).map(ascending).unwrap_or_default();

        for (owner, _) in owners {
            let queue_key = format!("{prefix}:{owner}");
            if let Some((entry, _)) = sets.get_mut(&queue_key).and_then(pop_max) {
                if let Some(workers) = sets.get_mut(active_key).and_then(|a| a.get_mut(&owner)) {
                    *workers += 1.0;
                }
                return Ok(Some((owner, entry)));
            }
            if let Some(active) = sets.get_mut(active_key) {
                active.remove(&owner);
            }
        }
        Ok(None)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zpopmax_returns_highest_score() {
        let store = InMemorySortedSetStore::new();
        store.zadd("q", "a", 1.0).await.unwrap();
        store.zadd("q", "b", 3.0).await.unwrap();
        store.zadd("q", "c", 2.0).await.unwrap();

        assert_eq!(store.zpopmax("q").await.unwrap(), Some(("b".to_string(), 3.0)));
        assert_eq!(store.zcard("q").await.unwrap(), 2);
        assert_eq!(
            store.zrange_with_scores("q").await.unwrap(),
            vec![("a".to_string(), 1.0), ("c".to_string(), 2.0)]
        );
    }

    #[tokio::test]
    async fn test_push_indexed_keeps_existing_index_score() {
        let store = InMemorySortedSetStore::new();
        store.push_indexed("q", "a", 1.0, "active").await.unwrap();
        store.zincrby("active", "q", 3.0).await.unwrap();
        store.push_indexed("q", "b", 2.0, "active").await.unwrap();

        assert_eq!(store.zcard("q").await.unwrap(), 2);
        assert_eq!(
            store.zrange_with_scores("active").await.unwrap(),
            vec![("q".to_string(), 3.0)]
        );
    }

    #[tokio::test]
    async fn test_pop_fair_prefers_least_busy_owner() {
        let store = InMemorySortedSetStore::new();
        store.zadd("q:1", "one-a", 2.0).await.unwrap();
        store.zadd("q:1", "one-b", 1.0).await.unwrap();
        store.zadd("q:2", "two-a", 1.0).await.unwrap();
        store.zadd("q:active", "1", 0.0).await.unwrap();
        store.zadd("q:active", "2", 0.0).await.unwrap();

        let first = store.pop_fair("q:active", "q").await.unwrap().unwrap();
        assert_eq!(first, ("1".to_string(), "one-a".to_string()));

        // owner 1 now has a busy worker so owner 2 goes next
        let second = store.pop_fair("q:active", "q").await.unwrap().unwrap();
        assert_eq!(second, ("2".to_string(), "two-a".to_string()));

        let third = store.pop_fair("q:active", "q").await.unwrap().unwrap();
        assert_eq!(third, ("1".to_string(), "one-b".to_string()));

        assert_eq!(store.pop_fair("q:active", "q").await.unwrap(), None);
        assert_eq!(store.zcard("q:active").await.unwrap(), 0);
    }
}
