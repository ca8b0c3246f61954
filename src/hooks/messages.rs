//! Message hooks: inserting outgoing messages, marking incoming ones handled,
//! labelling, and handing committed messages to the courier.

use async_trait::async_trait;
use indexmap::IndexSet;
use tracing::{error, warn};

use super::{unexpected_arg, HookArg, HookContext, HookId, PostCommitHook, PreCommitHook, SceneArgs};
use crate::courier::queue_messages;
use crate::error::Result;
use crate::models::{Channel, LabelId, Msg, MsgId, MsgStatus, SharedMsg};
use crate::store::BatchTx;

fn shared_msgs<'a>(hook: HookId, scenes: &[SceneArgs<'a>]) -> Result<Vec<&'a SharedMsg>> {
    let mut msgs = Vec::new();
    for entry in scenes {
        for arg in entry.args {
            let HookArg::Msg(msg) = arg else {
                return Err(unexpected_arg(hook, arg));
            };
            msgs.push(msg);
        }
    }
    Ok(msgs)
}

/// Inserts every queued outgoing message and writes the new ids back into the
/// shared message so [`SendMessagesHook`] sees them after commit.
#[derive(Debug, Default)]
pub struct InsertMessagesHook;

#[async_trait]
impl PreCommitHook for InsertMessagesHook {
    fn id(&self) -> HookId {
        HookId::InsertMessages
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let shared = shared_msgs(self.id(), scenes)?;
        let rows: Vec<Msg> = shared.iter().map(|m| m.lock().clone()).collect();

        let ids = tx.insert_messages(&rows).await?;
        for (msg, id) in shared.iter().zip(ids) {
            msg.lock().id = id;
        }

        crate::log_hook!(debug, "apply", hook: self.id(), msgs: rows.len());
        Ok(())
    }
}

/// Marks incoming messages handled once their session has processed them; all
/// queued ids are used.
#[derive(Debug, Default)]
pub struct MarkMessagesHandledHook;

#[async_trait]
impl PreCommitHook for MarkMessagesHandledHook {
    fn id(&self) -> HookId {
        HookId::MarkMessagesHandled
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let mut msg_ids: IndexSet<MsgId> = IndexSet::new();
        for entry in scenes {
            for arg in entry.args {
                let HookArg::HandledMsg(id) = arg else {
                    return Err(unexpected_arg(self.id(), arg));
                };
                msg_ids.insert(*id);
            }
        }
        let msg_ids: Vec<_> = msg_ids.into_iter().collect();
        tx.mark_messages_handled(&msg_ids).await
    }
}

/// Labels messages. The same label and message queued twice, by one scene or by
/// several, is written once.
#[derive(Debug, Default)]
pub struct AddMessageLabelsHook;

#[async_trait]
impl PreCommitHook for AddMessageLabelsHook {
    fn id(&self) -> HookId {
        HookId::AddMessageLabels
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let mut labels: IndexSet<(LabelId, MsgId)> = IndexSet::new();
        for entry in scenes {
            for arg in entry.args {
                let HookArg::MsgLabel { label_id, msg_id } = arg else {
                    return Err(unexpected_arg(self.id(), arg));
                };
                labels.insert((*label_id, *msg_id));
            }
        }

        let labels: Vec<_> = labels.into_iter().collect();
        let added = tx.add_message_labels(&labels).await?;
        crate::log_hook!(debug, "apply", hook: self.id(), labels: labels.len(), added: added);
        Ok(())
    }
}

/// Queues committed outgoing messages to the courier.
///
/// A failed push doesn't fail the hook: the affected messages are put back to
/// pending so the re-queue sweep sends them later.
#[derive(Debug, Default)]
pub struct SendMessagesHook;

#[async_trait]
impl PostCommitHook for SendMessagesHook {
    fn id(&self) -> HookId {
        HookId::SendMessages
    }

    async fn apply(&self, ctx: &HookContext<'_>, scenes: &[SceneArgs<'_>]) -> Result<()> {
        let shared = shared_msgs(self.id(), scenes)?;

        let mut sendable: Vec<(Channel, Msg)> = Vec::with_capacity(shared.len());
        for msg in shared {
            let msg = msg.lock().clone();
            if msg.status == MsgStatus::Failed || !msg.is_inserted() {
                continue;
            }
            let Some(channel) = msg.channel_id.and_then(|id| ctx.assets.channel_by_id(id)) else {
                warn!(msg_id = msg.id, "Outgoing message has no known channel, not sending");
                continue;
            };
            sendable.push((channel.clone(), msg));
        }
        if sendable.is_empty() {
            return Ok(());
        }

        let pairs: Vec<(&Channel, &Msg)> = sendable.iter().map(|(c, m)| (c, m)).collect();
        let outcome = queue_messages(
            ctx.services.queues.as_ref(),
            &ctx.services.config.courier,
            &pairs,
        )
        .await;

        if !outcome.failed.is_empty() {
            error!(
                failed = outcome.failed.len(),
                "Courier queueing failed, marking messages pending for re-queue"
            );
            ctx.services
                .store
                .mark_messages_pending(&outcome.failed)
                .await?;
        }

        crate::log_hook!(
            info,
            "apply",
            hook: self.id(),
            queued: outcome.queued.len(),
            polled: outcome.polled.len(),
            failed: outcome.failed.len()
        );
        Ok(())
    }
}
