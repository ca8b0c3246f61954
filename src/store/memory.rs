//! In-memory relational store.
//!
//! Tables live behind one mutex. A transaction works on a private copy taken at
//! `begin` and swaps it in at `commit`; rollback drops the copy. Commits are
//! optimistic: if another transaction committed in between, the commit fails with
//! SQLSTATE 40001 the way a serializable PostgreSQL transaction would, so the
//! coordinator's retry path is exercised without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use super::{BatchTx, FieldUpdate, GroupMembership, PendingMsg, Store};
use crate::error::{MailroomError, PgErrorCode, Result};
use crate::models::{
    CampaignEventId, Channel, ChannelId, Contact, ContactId, ContactStatus, FieldValue, Fire,
    GroupId, HttpLog, Incident, IncidentId, LabelId, Msg, MsgDirection, MsgId, MsgStatus, OrgId,
    Session, SessionId, Ticket,
};

/// Contact row as the batch writes it
#[derive(Debug, Clone, PartialEq)]
pub struct StoredContact {
    pub id: ContactId,
    pub uuid: Uuid,
    pub org_id: OrgId,
    pub name: Option<String>,
    pub language: Option<String>,
    pub status: ContactStatus,
    pub fields: BTreeMap<String, FieldValue>,
    pub urns: Vec<String>,
    pub current_flow_uuid: Option<Uuid>,
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
    pub last_seen_on: Option<DateTime<Utc>>,
}

impl From<&Contact> for StoredContact {
    fn from(contact: &Contact) -> Self {
        Self {
            id: contact.id,
            uuid: contact.uuid,
            org_id: contact.org_id,
            name: contact.name.clone(),
            language: contact.language.clone(),
            status: contact.status,
            fields: contact.fields.clone(),
            urns: contact.urns.clone(),
            current_flow_uuid: contact.current_flow_uuid,
            created_on: contact.created_on,
            modified_on: contact.created_on,
            last_seen_on: contact.last_seen_on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFire {
    pub id: i64,
    pub contact_id: ContactId,
    pub event_id: CampaignEventId,
    pub scheduled: DateTime<Utc>,
    pub fired: Option<DateTime<Utc>>,
}

/// Every table of the in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub contacts: BTreeMap<ContactId, StoredContact>,
    pub group_members: BTreeSet<(GroupId, ContactId)>,
    pub channels: BTreeMap<ChannelId, Channel>,
    pub msgs: BTreeMap<MsgId, Msg>,
    pub msg_labels: BTreeSet<(LabelId, MsgId)>,
    pub sessions: BTreeMap<SessionId, Session>,
    pub http_logs: Vec<HttpLog>,
    pub tickets: Vec<Ticket>,
    pub fires: Vec<StoredFire>,
    pub incidents: Vec<Incident>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn contact_mut(&mut self, contact_id: ContactId) -> Result<&mut StoredContact> {
        self.contacts
            .get_mut(&contact_id)
            .ok_or_else(|| MailroomError::NotFound(format!("contact {contact_id}")))
    }

    pub fn unfired_fires(&self) -> impl Iterator<Item = &StoredFire> {
        self.fires.iter().filter(|f| f.fired.is_none())
    }

    pub fn open_incidents(&self) -> impl Iterator<Item = &Incident> {
        self.incidents.iter().filter(|i| i.is_open())
    }

    pub fn contact_groups(&self, contact_id: ContactId) -> BTreeSet<GroupId> {
        self.group_members
            .iter()
            .filter(|(_, c)| *c == contact_id)
            .map(|(g, _)| *g)
            .collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: MemoryState,
    version: u64,
    commit_failures: VecDeque<MailroomError>,
}

/// Relational store kept in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_contact(&self, contact: &Contact) {
        let mut inner = self.inner.lock();
        for group_id in &contact.groups {
            inner.state.group_members.insert((*group_id, contact.id));
        }
        inner
            .state
            .contacts
            .insert(contact.id, StoredContact::from(contact));
        inner.version += 1;
    }

    pub fn insert_channel(&self, channel: Channel) {
        let mut inner = self.inner.lock();
        inner.state.channels.insert(channel.id, channel);
        inner.version += 1;
    }

    /// Insert a message row, assigning an id when it has none
    pub fn insert_msg(&self, mut msg: Msg) -> MsgId {
        let mut inner = self.inner.lock();
        if !msg.is_inserted() {
            msg.id = inner.state.next_id();
        }
        let id = msg.id;
        inner.state.msgs.insert(id, msg);
        inner.version += 1;
        id
    }

    pub fn insert_session(&self, session: &Session) {
        let mut inner = self.inner.lock();
        inner.state.sessions.insert(session.id, session.clone());
        inner.version += 1;
    }

    pub fn insert_fire(&self, fire: Fire, fired: Option<DateTime<Utc>>) {
        let mut inner = self.inner.lock();
        let id = inner.state.next_id();
        inner.state.fires.push(StoredFire {
            id,
            contact_id: fire.contact_id,
            event_id: fire.event_id,
            scheduled: fire.scheduled,
            fired,
        });
        inner.version += 1;
    }

    /// Make the next commit fail with `error` instead of applying
    pub fn fail_next_commit(&self, error: MailroomError) {
        self.inner.lock().commit_failures.push_back(error);
    }

    /// Copy of the committed state
    pub fn snapshot(&self) -> MemoryState {
        self.inner.lock().state.clone()
    }
}

/// Private working copy of the tables for one batch
pub struct MemoryTx {
    inner: Arc<Mutex<Inner>>,
    base_version: u64,
    state: MemoryState,
}

#[async_trait]
impl BatchTx for MemoryTx {
    async fn update_contact_fields(&mut self, updates: &[FieldUpdate]) -> Result<()> {
        for update in updates {
            let contact = self.state.contact_mut(update.contact_id)?;
            match &update.value {
                Some(value) => {
                    contact.fields.insert(update.key.clone(), value.clone());
                }
                None => {
                    contact.fields.remove(&update.key);
                }
            }
        }
        Ok(())
    }

    async fn add_contact_groups(&mut self, memberships: &[GroupMembership]) -> Result<()> {
        for m in memberships {
            self.state.group_members.insert((m.group_id, m.contact_id));
        }
        Ok(())
    }

    async fn remove_contact_groups(&mut self, memberships: &[GroupMembership]) -> Result<()> {
        for m in memberships {
            self.state.group_members.remove(&(m.group_id, m.contact_id));
        }
        Ok(())
    }

    async fn update_contact_languages(
        &mut self,
        languages: &[(ContactId, Option<String>)],
    ) -> Result<()> {
        for (contact_id, language) in languages {
            self.state.contact_mut(*contact_id)?.language = language.clone();
        }
        Ok(())
    }

    async fn update_contact_statuses(
        &mut self,
        statuses: &[(ContactId, ContactStatus)],
    ) -> Result<()> {
        for (contact_id, status) in statuses {
            self.state.contact_mut(*contact_id)?.status = *status;
        }
        Ok(())
    }

    async fn update_contact_names(&mut self, names: &[(ContactId, Option<String>)]) -> Result<()> {
        for (contact_id, name) in names {
            self.state.contact_mut(*contact_id)?.name = name.clone();
        }
        Ok(())
    }

    async fn update_contact_urns(&mut self, urns: &[(ContactId, Vec<String>)]) -> Result<()> {
        for (contact_id, urns) in urns {
            self.state.contact_mut(*contact_id)?.urns = urns.clone();
        }
        Ok(())
    }

    async fn update_contact_flows(&mut self, flows: &[(ContactId, Option<Uuid>)]) -> Result<()> {
        for (contact_id, flow) in flows {
            self.state.contact_mut(*contact_id)?.current_flow_uuid = *flow;
        }
        Ok(())
    }

    async fn update_contact_modified_on(
        &mut self,
        contact_ids: &[ContactId],
        modified_on: DateTime<Utc>,
    ) -> Result<()> {
        for contact_id in contact_ids {
            self.state.contact_mut(*contact_id)?.modified_on = modified_on;
        }
        Ok(())
    }

    async fn update_contact_last_seen(
        &mut self,
        seen: &[(ContactId, DateTime<Utc>)],
    ) -> Result<()> {
        for (contact_id, seen_on) in seen {
            self.state.contact_mut(*contact_id)?.last_seen_on = Some(*seen_on);
        }
        Ok(())
    }

    async fn update_session_timeouts(
        &mut self,
        timeouts: &[(SessionId, Option<DateTime<Utc>>)],
    ) -> Result<()> {
        for (session_id, timeout_on) in timeouts {
            let session = self
                .state
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| MailroomError::NotFound(format!("session {session_id}")))?;
            session.wait_timeout_on = *timeout_on;
        }
        Ok(())
    }

    async fn insert_messages(&mut self, msgs: &[Msg]) -> Result<Vec<MsgId>> {
        let mut ids = Vec::with_capacity(msgs.len());
        for msg in msgs {
            if self.state.msgs.values().any(|m| m.uuid == msg.uuid) {
                return Err(MailroomError::database_with_code(
                    format!("duplicate message uuid {}", msg.uuid),
                    PgErrorCode::UNIQUE_VIOLATION,
                ));
            }
            let id = self.state.next_id();
            let mut row = msg.clone();
            row.id = id;
            self.state.msgs.insert(id, row);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn mark_messages_handled(&mut self, msg_ids: &[MsgId]) -> Result<()> {
        for id in msg_ids {
            if let Some(msg) = self.state.msgs.get_mut(id) {
                msg.status = MsgStatus::Handled;
            }
        }
        Ok(())
    }

    async fn add_message_labels(&mut self, labels: &[(LabelId, MsgId)]) -> Result<u64> {
        let mut added = 0;
        for pair in labels {
            if self.state.msg_labels.insert(*pair) {
                added += 1;
            }
        }
        Ok(added)
    }

    async fn insert_http_logs(&mut self, logs: &[HttpLog]) -> Result<()> {
        self.state.http_logs.extend_from_slice(logs);
        Ok(())
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> Result<()> {
        self.state.tickets.extend_from_slice(tickets);
        Ok(())
    }

    async fn delete_unfired_fires(
        &mut self,
        fires: &[(ContactId, CampaignEventId)],
    ) -> Result<u64> {
        let targets: BTreeSet<_> = fires.iter().copied().collect();
        let before = self.state.fires.len();
        self.state
            .fires
            .retain(|f| f.fired.is_some() || !targets.contains(&(f.contact_id, f.event_id)));
        Ok((before - self.state.fires.len()) as u64)
    }

    async fn insert_fires(&mut self, fires: &[Fire]) -> Result<u64> {
        let mut inserted = 0;
        for fire in fires {
            let exists = self
                .state
                .unfired_fires()
                .any(|f| f.contact_id == fire.contact_id && f.event_id == fire.event_id);
            if exists {
                continue;
            }
            let id = self.state.next_id();
            self.state.fires.push(StoredFire {
                id,
                contact_id: fire.contact_id,
                event_id: fire.event_id,
                scheduled: fire.scheduled,
                fired: None,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx {
            inner,
            base_version,
            state,
        } = *self;
        let mut inner = inner.lock();
        if let Some(error) = inner.commit_failures.pop_front() {
            return Err(error);
        }
        if inner.version != base_version {
            return Err(MailroomError::database_with_code(
                "could not serialize access due to concurrent update",
                PgErrorCode::SERIALIZATION_FAILURE,
            ));
        }
        inner.state = state;
        inner.version += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn BatchTx>> {
        let inner = self.inner.lock();
        Ok(Box::new(MemoryTx {
            inner: Arc::clone(&self.inner),
            base_version: inner.version,
            state: inner.state.clone(),
        }))
    }

    async fn mark_messages_pending(&self, msg_ids: &[MsgId]) -> Result<()> {
        self.set_status(msg_ids, MsgStatus::Pending);
        Ok(())
    }

    async fn mark_messages_queued(&self, msg_ids: &[MsgId]) -> Result<()> {
        self.set_status(msg_ids, MsgStatus::Queued);
        Ok(())
    }

    async fn select_pending_messages(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PendingMsg>> {
        let inner = self.inner.lock();
        let mut pending: Vec<_> = inner
            .state
            .msgs
            .values()
            .filter(|m| {
                m.direction == MsgDirection::Outgoing
                    && m.status == MsgStatus::Pending
                    && m.created_on < older_than
            })
            .filter_map(|m| {
                let channel = m.channel_id.and_then(|id| inner.state.channels.get(&id))?;
                Some(PendingMsg {
                    msg: m.clone(),
                    channel: channel.clone(),
                })
            })
            .collect();
        pending.sort_by_key(|p| (p.msg.created_on, p.msg.id));
        pending.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(pending)
    }

    async fn open_incident(
        &self,
        org_id: OrgId,
        incident_type: &str,
        scope: &str,
        started_on: DateTime<Utc>,
    ) -> Result<IncidentId> {
        let mut inner = self.inner.lock();
        if let Some(open) = inner.state.open_incidents().find(|i| {
            i.org_id == org_id && i.incident_type == incident_type && i.scope == scope
        }) {
            return Ok(open.id);
        }
        let id = inner.state.next_id();
        inner.state.incidents.push(Incident {
            id,
            org_id,
            incident_type: incident_type.to_string(),
            scope: scope.to_string(),
            started_on,
            ended_on: None,
        });
        inner.version += 1;
        Ok(id)
    }

    async fn end_incident(&self, incident_id: IncidentId, ended_on: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock();
        let incident = inner
            .state
            .incidents
            .iter_mut()
            .find(|i| i.id == incident_id && i.is_open())
            .ok_or_else(|| MailroomError::NotFound(format!("open incident {incident_id}")))?;
        incident.ended_on = Some(ended_on);
        inner.version += 1;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

impl InMemoryStore {
    fn set_status(&self, msg_ids: &[MsgId], status: MsgStatus) {
        let mut inner = self.inner.lock();
        for id in msg_ids {
            if let Some(msg) = inner.state.msgs.get_mut(id) {
                msg.status = status;
            }
        }
        inner.version += 1;
    }
}
