//! # Hooks
//!
//! A hook is a named operation applied once per batch across every scene that
//! queued work for it. Translators turn engine events into hook arguments on a
//! [`Scene`]; the coordinator then applies each distinct hook once, handing it every
//! scene's argument list in scene order.
//!
//! Hooks come in two phases:
//!
//! - [`PreCommitHook`]: runs inside the batch transaction, all or nothing
//! - [`PostCommitHook`]: runs after commit; failures are reported, never rolled back
//!
//! Hook identity is the [`HookId`] enum rather than the hook value, and each
//! hook's argument is one variant of the [`HookArg`] sum type.

pub mod contact;
pub mod fires;
pub mod messages;
pub mod registry;
pub mod scene;
pub mod sessions;
pub mod tickets;
pub mod translators;
pub mod webhooks;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::MailroomConfig;
use crate::error::{MailroomError, Result};
use crate::events::CallStatus;
use crate::health::WebhookHealthMonitor;
use crate::models::{
    ContactStatus, FieldValue, GroupId, HttpLog, LabelId, MsgId, OrgAssets, SessionId, SharedMsg,
    Ticket,
};
use crate::queue::{SortedSetStore, TaskQueue};
use crate::store::{BatchTx, Store};

pub use registry::{HookRegistry, HookRegistryBuilder, TranslateContext, Translator};
pub use scene::{BatchSessions, IncomingMsg, Scene};

/// Which side of the batch commit a hook runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    PreCommit,
    PostCommit,
}

/// Identity of every hook the coordinator can apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookId {
    UpdateContactFields,
    UpdateContactGroups,
    UpdateContactLanguage,
    UpdateContactStatus,
    UpdateContactName,
    UpdateContactUrns,
    UpdateContactModifiedOn,
    UpdateContactLastSeen,
    UpdateContactFlow,
    UpdateSessionTimeouts,
    InsertMessages,
    MarkMessagesHandled,
    AddMessageLabels,
    InsertHttpLogs,
    InsertTickets,
    UpdateCampaignFires,
    SendMessages,
    MonitorWebhooks,
    StartSessions,
    QueueBroadcasts,
}

impl HookId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateContactFields => "update_contact_fields",
            Self::UpdateContactGroups => "update_contact_groups",
            Self::UpdateContactLanguage => "update_contact_language",
            Self::UpdateContactStatus => "update_contact_status",
            Self::UpdateContactName => "update_contact_name",
            Self::UpdateContactUrns => "update_contact_urns",
            Self::UpdateContactModifiedOn => "update_contact_modified_on",
            Self::UpdateContactLastSeen => "update_contact_last_seen",
            Self::UpdateContactFlow => "update_contact_flow",
            Self::UpdateSessionTimeouts => "update_session_timeouts",
            Self::InsertMessages => "insert_messages",
            Self::MarkMessagesHandled => "mark_messages_handled",
            Self::AddMessageLabels => "add_message_labels",
            Self::InsertHttpLogs => "insert_http_logs",
            Self::InsertTickets => "insert_tickets",
            Self::UpdateCampaignFires => "update_campaign_fires",
            Self::SendMessages => "send_messages",
            Self::MonitorWebhooks => "monitor_webhooks",
            Self::StartSessions => "start_sessions",
            Self::QueueBroadcasts => "queue_broadcasts",
        }
    }

    pub fn phase(&self) -> HookPhase {
        match self {
            Self::SendMessages
            | Self::MonitorWebhooks
            | Self::StartSessions
            | Self::QueueBroadcasts => HookPhase::PostCommit,
            _ => HookPhase::PreCommit,
        }
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub key: String,
    /// `None` clears the field
    pub value: Option<FieldValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupChange {
    pub group_id: GroupId,
    pub added: bool,
}

/// Change that may invalidate or trigger campaign fires
#[derive(Debug, Clone, PartialEq)]
pub enum CampaignChange {
    Group(GroupChange),
    Field(FieldChange),
}

/// Outcome of one webhook call made from a flow node
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookCall {
    pub node_uuid: Uuid,
    pub flow_uuid: Uuid,
    pub url: String,
    pub status: CallStatus,
    pub status_code: Option<u16>,
    pub elapsed_ms: u64,
    pub created_on: DateTime<Utc>,
}

/// Flow start requested by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSessionTask {
    pub flow_uuid: Uuid,
    pub group_ids: Vec<GroupId>,
    pub contact_uuids: Vec<Uuid>,
    pub urns: Vec<String>,
    pub parent_summary: serde_json::Value,
}

impl StartSessionTask {
    /// Starts aimed at exactly one contact go through the low latency queue
    pub fn is_single_contact(&self) -> bool {
        self.group_ids.is_empty() && self.urns.is_empty() && self.contact_uuids.len() == 1
    }
}

/// Broadcast created by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastTask {
    pub translations: BTreeMap<String, String>,
    pub base_language: String,
    pub group_ids: Vec<GroupId>,
    pub contact_uuids: Vec<Uuid>,
    pub urns: Vec<String>,
}

/// Argument queued on a scene for one hook
#[derive(Debug, Clone)]
pub enum HookArg {
    Field(FieldChange),
    Group(GroupChange),
    Language(Option<String>),
    Status(ContactStatus),
    Name(Option<String>),
    Urns(Vec<String>),
    ModifiedOn,
    LastSeen(DateTime<Utc>),
    Flow(Option<Uuid>),
    SessionTimeout {
        session_id: SessionId,
        timeout_on: Option<DateTime<Utc>>,
    },
    Msg(SharedMsg),
    HandledMsg(MsgId),
    MsgLabel { label_id: LabelId, msg_id: MsgId },
    HttpLog(HttpLog),
    Ticket(Ticket),
    Campaign(CampaignChange),
    WebhookCall(WebhookCall),
    StartSession(StartSessionTask),
    Broadcast(BroadcastTask),
}

impl HookArg {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Field(_) => "field",
            Self::Group(_) => "group",
            Self::Language(_) => "language",
            Self::Status(_) => "status",
            Self::Name(_) => "name",
            Self::Urns(_) => "urns",
            Self::ModifiedOn => "modified_on",
            Self::LastSeen(_) => "last_seen",
            Self::Flow(_) => "flow",
            Self::SessionTimeout { .. } => "session_timeout",
            Self::Msg(_) => "msg",
            Self::HandledMsg(_) => "handled_msg",
            Self::MsgLabel { .. } => "msg_label",
            Self::HttpLog(_) => "http_log",
            Self::Ticket(_) => "ticket",
            Self::Campaign(_) => "campaign",
            Self::WebhookCall(_) => "webhook_call",
            Self::StartSession(_) => "start_session",
            Self::Broadcast(_) => "broadcast",
        }
    }
}

/// Error for an argument queued on the wrong hook
pub(crate) fn unexpected_arg(hook: HookId, arg: &HookArg) -> MailroomError {
    MailroomError::hook(hook.as_str(), format!("unexpected {} argument", arg.kind()))
}

/// One scene's queued arguments for the hook being applied
#[derive(Debug, Clone, Copy)]
pub struct SceneArgs<'a> {
    pub scene: &'a Scene,
    pub args: &'a [HookArg],
}

/// Long-lived collaborators hooks reach through [`HookContext`]
#[derive(Clone)]
pub struct HookServices {
    pub config: Arc<MailroomConfig>,
    pub store: Arc<dyn Store>,
    pub queues: Arc<dyn SortedSetStore>,
    pub handler_queue: TaskQueue,
    pub batch_queue: TaskQueue,
    pub health: Arc<WebhookHealthMonitor>,
}

impl HookServices {
    pub fn new(
        config: Arc<MailroomConfig>,
        store: Arc<dyn Store>,
        queues: Arc<dyn SortedSetStore>,
    ) -> Self {
        let handler_queue = TaskQueue::new(Arc::clone(&queues), &config.tasks.handler_queue);
        let batch_queue = TaskQueue::new(Arc::clone(&queues), &config.tasks.batch_queue);
        let health = Arc::new(WebhookHealthMonitor::new(config.health.clone()));
        Self {
            config,
            store,
            queues,
            handler_queue,
            batch_queue,
            health,
        }
    }
}

impl fmt::Debug for HookServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookServices")
            .field("store", &self.store.provider_name())
            .field("queues", &self.queues.provider_name())
            .finish()
    }
}

/// Everything a hook may read while it is applied
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub services: &'a HookServices,
    pub assets: &'a OrgAssets,
    pub now: DateTime<Utc>,
}

#[async_trait]
pub trait PreCommitHook: Send + Sync {
    fn id(&self) -> HookId;

    /// Apply the hook for every scene that queued it, inside the batch transaction
    async fn apply(
        &self,
        ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()>;
}

#[async_trait]
pub trait PostCommitHook: Send + Sync {
    fn id(&self) -> HookId;

    /// Apply the hook for every scene that queued it, after the batch committed
    async fn apply(&self, ctx: &HookContext<'_>, scenes: &[SceneArgs<'_>]) -> Result<()>;
}

/// The last argument of each scene, for hooks where only the final value counts
pub(crate) fn last_per_scene<'a, T>(
    hook: HookId,
    scenes: &[SceneArgs<'a>],
    extract: impl Fn(&'a HookArg) -> Option<T>,
) -> Result<Vec<(&'a Scene, T)>> {
    let mut values = Vec::with_capacity(scenes.len());
    for entry in scenes {
        let Some(last) = entry.args.last() else {
            continue;
        };
        let value = extract(last).ok_or_else(|| unexpected_arg(hook, last))?;
        values.push((entry.scene, value));
    }
    Ok(values)
}
