//! Session hooks: the wait timeout write inside the batch transaction, and the
//! post-commit hooks that hand flow starts and broadcasts to the async task
//! queues. Every queued task argument becomes one task.

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::error;

use super::{
    unexpected_arg, HookArg, HookContext, HookId, PostCommitHook, PreCommitHook, SceneArgs,
};
use crate::constants::task_types;
use crate::error::{MailroomError, Result};
use crate::queue::{Priority, QueueTask};
use crate::store::BatchTx;

/// Writes session wait timeouts; the last value queued for a session wins
#[derive(Debug, Default)]
pub struct UpdateSessionTimeoutsHook;

#[async_trait]
impl PreCommitHook for UpdateSessionTimeoutsHook {
    fn id(&self) -> HookId {
        HookId::UpdateSessionTimeouts
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let mut timeouts = IndexMap::new();
        for arg in scenes.iter().flat_map(|entry| entry.args) {
            let HookArg::SessionTimeout {
                session_id,
                timeout_on,
            } = arg
            else {
                return Err(unexpected_arg(self.id(), arg));
            };
            timeouts.insert(*session_id, *timeout_on);
        }
        let timeouts: Vec<_> = timeouts.into_iter().collect();
        tx.update_session_timeouts(&timeouts).await
    }
}

/// Queues session starts. Starts aimed at a single contact go to the handler
/// queue at high priority; anything wider goes to the batch queue.
#[derive(Debug, Default)]
pub struct StartSessionsHook;

#[async_trait]
impl PostCommitHook for StartSessionsHook {
    fn id(&self) -> HookId {
        HookId::StartSessions
    }

    async fn apply(&self, ctx: &HookContext<'_>, scenes: &[SceneArgs<'_>]) -> Result<()> {
        let mut failures = 0usize;
        let mut last_error = None;

        for entry in scenes {
            for arg in entry.args {
                let HookArg::StartSession(start) = arg else {
                    return Err(unexpected_arg(self.id(), arg));
                };
                let task = QueueTask::new(task_types::START_SESSION, entry.scene.org_id(), start)?;
                let pushed = if start.is_single_contact() {
                    ctx.services.handler_queue.push(&task, Priority::High).await
                } else {
                    ctx.services.batch_queue.push(&task, Priority::Default).await
                };
                if let Err(e) = pushed {
                    error!(org_id = task.org_id, flow_uuid = %start.flow_uuid, error = %e, "Failed to queue session start");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            None => Ok(()),
            Some(e) => Err(MailroomError::hook(
                self.id().as_str(),
                format!("{failures} session starts not queued: {e}"),
            )),
        }
    }
}

/// Queues broadcasts on the batch queue
#[derive(Debug, Default)]
pub struct QueueBroadcastsHook;

#[async_trait]
impl PostCommitHook for QueueBroadcastsHook {
    fn id(&self) -> HookId {
        HookId::QueueBroadcasts
    }

    async fn apply(&self, ctx: &HookContext<'_>, scenes: &[SceneArgs<'_>]) -> Result<()> {
        let mut failures = 0usize;
        let mut last_error = None;

        for entry in scenes {
            for arg in entry.args {
                let HookArg::Broadcast(broadcast) = arg else {
                    return Err(unexpected_arg(self.id(), arg));
                };
                let task =
                    QueueTask::new(task_types::SEND_BROADCAST, entry.scene.org_id(), broadcast)?;
                if let Err(e) = ctx.services.batch_queue.push(&task, Priority::Default).await {
                    error!(org_id = task.org_id, error = %e, "Failed to queue broadcast");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            None => Ok(()),
            Some(e) => Err(MailroomError::hook(
                self.id().as_str(),
                format!("{failures} broadcasts not queued: {e}"),
            )),
        }
    }
}
