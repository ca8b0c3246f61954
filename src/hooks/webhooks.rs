//! Post-commit webhook health monitoring.

use async_trait::async_trait;
use indexmap::IndexMap;
use uuid::Uuid;

use super::{
    unexpected_arg, HookArg, HookContext, HookId, PostCommitHook, SceneArgs, WebhookCall,
};
use crate::error::Result;
use crate::models::OrgId;

/// Records every webhook call of the batch in its node's health window, then
/// opens incidents for nodes that turned unhealthy and ends them for nodes that
/// recovered. Uses all queued calls.
#[derive(Debug, Default)]
pub struct MonitorWebhooksHook;

#[async_trait]
impl PostCommitHook for MonitorWebhooksHook {
    fn id(&self) -> HookId {
        HookId::MonitorWebhooks
    }

    async fn apply(&self, ctx: &HookContext<'_>, scenes: &[SceneArgs<'_>]) -> Result<()> {
        let mut by_node: IndexMap<Uuid, (OrgId, Vec<WebhookCall>)> = IndexMap::new();
        for entry in scenes {
            for arg in entry.args {
                let HookArg::WebhookCall(call) = arg else {
                    return Err(unexpected_arg(self.id(), arg));
                };
                by_node
                    .entry(call.node_uuid)
                    .or_insert_with(|| (entry.scene.org_id(), Vec::new()))
                    .1
                    .push(call.clone());
            }
        }

        let health = &ctx.services.health;
        let mut unhealthy: IndexMap<OrgId, Vec<Uuid>> = IndexMap::new();
        let mut recovered = Vec::new();
        for (node_uuid, (org_id, calls)) in &by_node {
            health.record(*node_uuid, calls);
            if !health.healthy(*node_uuid, ctx.now) {
                unhealthy.entry(*org_id).or_default().push(*node_uuid);
            } else if health.incident(*node_uuid).is_some() {
                recovered.push(*node_uuid);
            }
        }

        let store = ctx.services.store.as_ref();
        for (org_id, nodes) in &unhealthy {
            health.open_incidents(store, *org_id, nodes, ctx.now).await?;
        }
        if !recovered.is_empty() {
            health.end_incidents(store, &recovered, ctx.now).await?;
        }

        crate::log_hook!(
            debug,
            "apply",
            hook: self.id(),
            nodes: by_node.len(),
            unhealthy: unhealthy.values().map(Vec::len).sum::<usize>()
        );
        Ok(())
    }
}
