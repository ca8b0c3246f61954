//! Pre-commit hooks that insert tickets and HTTP logs; every queued argument is
//! written.

use async_trait::async_trait;

use super::{unexpected_arg, HookArg, HookContext, HookId, PreCommitHook, SceneArgs};
use crate::error::Result;
use crate::models::{HttpLog, Ticket};
use crate::store::BatchTx;

#[derive(Debug, Default)]
pub struct InsertTicketsHook;

#[async_trait]
impl PreCommitHook for InsertTicketsHook {
    fn id(&self) -> HookId {
        HookId::InsertTickets
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let mut tickets: Vec<Ticket> = Vec::new();
        for entry in scenes {
            for arg in entry.args {
                let HookArg::Ticket(ticket) = arg else {
                    return Err(unexpected_arg(self.id(), arg));
                };
                tickets.push(ticket.clone());
            }
        }
        tx.insert_tickets(&tickets).await
    }
}

#[derive(Debug, Default)]
pub struct InsertHttpLogsHook;

#[async_trait]
impl PreCommitHook for InsertHttpLogsHook {
    fn id(&self) -> HookId {
        HookId::InsertHttpLogs
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let mut logs: Vec<HttpLog> = Vec::new();
        for entry in scenes {
            for arg in entry.args {
                let HookArg::HttpLog(log) = arg else {
                    return Err(unexpected_arg(self.id(), arg));
                };
                logs.push(log.clone());
            }
        }
        crate::log_hook!(debug, "apply", hook: self.id(), logs: logs.len());
        tx.insert_http_logs(&logs).await
    }
}
