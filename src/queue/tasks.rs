//! Fair task queues.
//!
//! Each queue keeps one sorted set of tasks per org (`<queue>:<org>`) plus an
//! active set (`<queue>:active`) scoring each org by how many workers are busy
//! with its tasks. Popping always serves the least busy org, so one org pushing
//! thousands of tasks can't starve the others.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{queue_score, SortedSetStore};
use crate::constants::ACTIVE_SUFFIX;
use crate::error::{MailroomError, Result};
use crate::models::OrgId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Default,
    High,
}

/// Envelope stored in the per-org sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTask {
    #[serde(rename = "type")]
    pub task_type: String,
    pub org_id: OrgId,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueTask {
    pub fn new<T: Serialize + ?Sized>(task_type: &str, org_id: OrgId, payload: &T) -> Result<Self> {
        Ok(Self {
            task_type: task_type.to_string(),
            org_id,
            payload: serde_json::to_value(payload)?,
            enqueued_at: Utc::now(),
        })
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn SortedSetStore>,
    name: String,
    active_key: String,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.name)
            .field("store", &self.store.provider_name())
            .finish()
    }
}

impl TaskQueue {
    pub fn new(store: Arc<dyn SortedSetStore>, name: impl Into<String>) -> Self {
        let name = name.into();
        let active_key = format!("{name}:{ACTIVE_SUFFIX}");
        Self {
            store,
            name,
            active_key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn org_key(&self, org_id: OrgId) -> String {
        format!("{}:{}", self.name, org_id)
    }

    pub async fn push(&self, task: &QueueTask, priority: Priority) -> Result<()> {
        let payload = serde_json::to_string(task)?;
        let score = queue_score(priority == Priority::High);

        self.store
            .zadd(&self.org_key(task.org_id), &payload, score)
            .await?;
        // zero increment registers the org without touching its worker count
        self.store
            .zincrby(&self.active_key, &task.org_id.to_string(), 0.0)
            .await?;

        crate::log_queue!(
            debug,
            "task_pushed",
            queue: self.name,
            task_type: task.task_type,
            org_id: task.org_id,
            high_priority: priority == Priority::High
        );
        Ok(())
    }

    /// Next task from the least busy org. Callers must call [`TaskQueue::done`]
    /// once they finish with it.
    pub async fn pop(&self) -> Result<Option<QueueTask>> {
        let Some((owner, payload)) = self.store.pop_fair(&self.active_key, &self.name).await?
        else {
            return Ok(None);
        };
        let task: QueueTask = serde_json::from_str(&payload).map_err(|e| {
            MailroomError::Queue(format!(
                "malformed task for org {owner} in queue {}: {e}",
                self.name
            ))
        })?;
        Ok(Some(task))
    }

    /// Release the worker slot taken by a popped task
    pub async fn done(&self, org_id: OrgId) -> Result<()> {
        let owner = org_id.to_string();
        let workers = self.store.zincrby(&self.active_key, &owner, -1.0).await?;
        if workers < 0.0 {
            self.store.zadd(&self.active_key, &owner, 0.0).await?;
        }
        Ok(())
    }

    /// Tasks waiting across every org
    pub async fn size(&self) -> Result<u64> {
        let mut total = 0;
        for (owner, _) in self.store.zrange_with_scores(&self.active_key).await? {
            total += self.store.zcard(&format!("{}:{owner}", self.name)).await?;
        }
        Ok(total)
    }
}
