//! # Relational Store
//!
//! Provider-agnostic seam between hooks and the relational schema.
//!
//! A batch writes everything through one [`BatchTx`]: pre-commit hooks call its
//! bulk write operations, the coordinator then commits or rolls it back. Work that
//! happens outside a batch transaction (marking messages for re-queue, incident
//! upserts) goes through [`Store`] directly.
//!
//! ## Providers
//!
//! - [`PgStore`]: PostgreSQL via SQLx, bulk statements keyed by contact id
//! - [`InMemoryStore`]: snapshot-isolated in-memory tables for tests and development

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CampaignEventId, Channel, ContactId, ContactStatus, FieldValue, Fire, GroupId, HttpLog,
    IncidentId, LabelId, Msg, MsgId, OrgId, SessionId, Ticket,
};

pub use memory::{InMemoryStore, MemoryState, StoredContact, StoredFire};
pub use postgres::PgStore;

/// New value (or removal) of one contact field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub contact_id: ContactId,
    pub key: String,
    pub value: Option<FieldValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupMembership {
    pub contact_id: ContactId,
    pub group_id: GroupId,
}

/// Outgoing message waiting to be re-queued, with the channel it goes out on
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMsg {
    pub msg: Msg,
    pub channel: Channel,
}

/// One open transaction shared by every pre-commit hook of a batch
#[async_trait]
pub trait BatchTx: Send {
    async fn update_contact_fields(&mut self, updates: &[FieldUpdate]) -> Result<()>;

    async fn add_contact_groups(&mut self, memberships: &[GroupMembership]) -> Result<()>;

    async fn remove_contact_groups(&mut self, memberships: &[GroupMembership]) -> Result<()>;

    async fn update_contact_languages(
        &mut self,
        languages: &[(ContactId, Option<String>)],
    ) -> Result<()>;

    async fn update_contact_statuses(&mut self, statuses: &[(ContactId, ContactStatus)])
        -> Result<()>;

    async fn update_contact_names(&mut self, names: &[(ContactId, Option<String>)]) -> Result<()>;

    /// Replace each contact's URNs, first one highest priority
    async fn update_contact_urns(&mut self, urns: &[(ContactId, Vec<String>)]) -> Result<()>;

    async fn update_contact_flows(&mut self, flows: &[(ContactId, Option<Uuid>)]) -> Result<()>;

    async fn update_contact_modified_on(
        &mut self,
        contact_ids: &[ContactId],
        modified_on: DateTime<Utc>,
    ) -> Result<()>;

    async fn update_contact_last_seen(&mut self, seen: &[(ContactId, DateTime<Utc>)])
        -> Result<()>;

    /// Set or clear the wait timeout of each session
    async fn update_session_timeouts(
        &mut self,
        timeouts: &[(SessionId, Option<DateTime<Utc>>)],
    ) -> Result<()>;

    /// Insert messages, returning their new ids in input order
    async fn insert_messages(&mut self, msgs: &[Msg]) -> Result<Vec<MsgId>>;

    async fn mark_messages_handled(&mut self, msg_ids: &[MsgId]) -> Result<()>;

    /// Associate labels with messages, ignoring existing associations
    async fn add_message_labels(&mut self, labels: &[(LabelId, MsgId)]) -> Result<u64>;

    async fn insert_http_logs(&mut self, logs: &[HttpLog]) -> Result<()>;

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> Result<()>;

    /// Delete fires not yet picked up by the fire scheduler; returns rows deleted
    async fn delete_unfired_fires(&mut self, fires: &[(ContactId, CampaignEventId)])
        -> Result<u64>;

    /// Insert fires, skipping any contact/event pair that already has an unfired fire
    async fn insert_fires(&mut self, fires: &[Fire]) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Store operations that don't belong to a batch transaction
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn begin(&self) -> Result<Box<dyn BatchTx>>;

    /// Put messages back in the pending state so the re-queue sweep retries them
    async fn mark_messages_pending(&self, msg_ids: &[MsgId]) -> Result<()>;

    async fn mark_messages_queued(&self, msg_ids: &[MsgId]) -> Result<()>;

    /// Outgoing pending messages created before `older_than`, oldest first
    async fn select_pending_messages(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PendingMsg>>;

    /// Open an incident unless one is already open for the same org, type and scope.
    /// Returns the id of the open incident either way.
    async fn open_incident(
        &self,
        org_id: OrgId,
        incident_type: &str,
        scope: &str,
        started_on: DateTime<Utc>,
    ) -> Result<IncidentId>;

    async fn end_incident(&self, incident_id: IncidentId, ended_on: DateTime<Utc>) -> Result<()>;

    fn provider_name(&self) -> &'static str;
}
