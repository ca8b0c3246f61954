//! Campaign fire reconciliation hook.
//!
//! Consumes every group and field change queued across the batch, nets them per
//! contact and applies the resulting [`FirePlan`](crate::campaigns::FirePlan) as
//! two bulk statements: deletes first, then inserts.

use async_trait::async_trait;
use std::collections::HashMap;

use super::{unexpected_arg, HookArg, HookContext, HookId, PreCommitHook, SceneArgs};
use crate::campaigns::{plan_fires, CampaignDelta};
use crate::error::Result;
use crate::models::{Contact, ContactId};
use crate::store::BatchTx;

#[derive(Debug, Default)]
pub struct UpdateCampaignFiresHook;

#[async_trait]
impl PreCommitHook for UpdateCampaignFiresHook {
    fn id(&self) -> HookId {
        HookId::UpdateCampaignFires
    }

    async fn apply(
        &self,
        ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let mut changes = Vec::new();
        let mut contacts: HashMap<ContactId, &Contact> = HashMap::with_capacity(scenes.len());
        for entry in scenes {
            contacts.insert(entry.scene.contact_id(), entry.scene.contact());
            for arg in entry.args {
                let HookArg::Campaign(change) = arg else {
                    return Err(unexpected_arg(self.id(), arg));
                };
                changes.push((entry.scene.contact_id(), change));
            }
        }

        let delta = CampaignDelta::from_changes(changes);
        if delta.is_empty() {
            return Ok(());
        }
        let plan = plan_fires(ctx.assets, ctx.now, &contacts, &delta);

        let deleted = if plan.deletes.is_empty() {
            0
        } else {
            tx.delete_unfired_fires(&plan.deletes).await?
        };
        let inserted = if plan.inserts.is_empty() {
            0
        } else {
            tx.insert_fires(&plan.inserts).await?
        };

        crate::log_hook!(
            debug,
            "apply",
            hook: self.id(),
            contacts: contacts.len(),
            deleted: deleted,
            inserted: inserted
        );
        Ok(())
    }
}
