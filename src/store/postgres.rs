//! PostgreSQL store.
//!
//! Every batch write is one statement regardless of how many contacts the batch
//! covers: per-row values are bound as parallel arrays and expanded with `unnest`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

use super::{BatchTx, FieldUpdate, GroupMembership, PendingMsg, Store};
use crate::config::DatabaseConfig;
use crate::constants::msg_status;
use crate::error::{MailroomError, Result};
use crate::models::{
    CampaignEventId, Channel, ContactId, ContactStatus, Fire, HttpLog, IncidentId, LabelId, Msg,
    MsgDirection, MsgId, MsgStatus, OrgId, SessionId, Ticket,
};

/// Embedded schema migrations
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Relational store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| MailroomError::database(format!("migration failed: {e}")))
    }

    async fn set_msg_status(&self, msg_ids: &[MsgId], status: &str) -> Result<()> {
        if msg_ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE msgs_msg SET status = $2, modified_on = NOW() WHERE id = ANY($1)")
            .bind(msg_ids)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Batch transaction on one pooled connection
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

/// Collapse per-field updates into one JSON patch and one removal list per contact
fn field_patches(updates: &[FieldUpdate]) -> Result<(Vec<ContactId>, Vec<Value>, Vec<Value>)> {
    let mut patches: BTreeMap<ContactId, (Map<String, Value>, BTreeSet<String>)> = BTreeMap::new();
    for update in updates {
        let (set, removed) = patches.entry(update.contact_id).or_default();
        match &update.value {
            Some(value) => {
                set.insert(update.key.clone(), serde_json::to_value(value)?);
                removed.remove(&update.key);
            }
            None => {
                set.remove(&update.key);
                removed.insert(update.key.clone());
            }
        }
    }

    let mut ids = Vec::with_capacity(patches.len());
    let mut sets = Vec::with_capacity(patches.len());
    let mut removals = Vec::with_capacity(patches.len());
    for (contact_id, (set, removed)) in patches {
        ids.push(contact_id);
        sets.push(Value::Object(set));
        removals.push(Value::from(removed.into_iter().collect::<Vec<_>>()));
    }
    Ok((ids, sets, removals))
}

#[async_trait]
impl BatchTx for PgTx {
    async fn update_contact_fields(&mut self, updates: &[FieldUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let (ids, sets, removals) = field_patches(updates)?;
        sqlx::query(
            r#"
            UPDATE contacts_contact c
            SET fields = (c.fields - ARRAY(SELECT jsonb_array_elements_text(r.removed))) || r.updates,
                modified_on = NOW()
            FROM unnest($1::bigint[], $2::jsonb[], $3::jsonb[]) AS r(id, updates, removed)
            WHERE c.id = r.id
            "#,
        )
        .bind(&ids)
        .bind(&sets)
        .bind(&removals)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn add_contact_groups(&mut self, memberships: &[GroupMembership]) -> Result<()> {
        if memberships.is_empty() {
            return Ok(());
        }
        let (contacts, groups): (Vec<_>, Vec<_>) =
            memberships.iter().map(|m| (m.contact_id, m.group_id)).unzip();
        sqlx::query(
            r#"
            INSERT INTO contacts_contactgroup_contacts (contact_id, contactgroup_id)
            SELECT * FROM unnest($1::bigint[], $2::bigint[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&contacts)
        .bind(&groups)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn remove_contact_groups(&mut self, memberships: &[GroupMembership]) -> Result<()> {
        if memberships.is_empty() {
            return Ok(());
        }
        let (contacts, groups): (Vec<_>, Vec<_>) =
            memberships.iter().map(|m| (m.contact_id, m.group_id)).unzip();
        sqlx::query(
            r#"
            DELETE FROM contacts_contactgroup_contacts g
            USING unnest($1::bigint[], $2::bigint[]) AS r(contact_id, group_id)
            WHERE g.contact_id = r.contact_id AND g.contactgroup_id = r.group_id
            "#,
        )
        .bind(&contacts)
        .bind(&groups)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_contact_languages(
        &mut self,
        languages: &[(ContactId, Option<String>)],
    ) -> Result<()> {
        if languages.is_empty() {
            return Ok(());
        }
        let (ids, values): (Vec<_>, Vec<_>) = languages.iter().cloned().unzip();
        sqlx::query(
            r#"
            UPDATE contacts_contact c SET language = r.language, modified_on = NOW()
            FROM unnest($1::bigint[], $2::text[]) AS r(id, language)
            WHERE c.id = r.id
            "#,
        )
        .bind(&ids)
        .bind(&values)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_contact_statuses(
        &mut self,
        statuses: &[(ContactId, ContactStatus)],
    ) -> Result<()> {
        if statuses.is_empty() {
            return Ok(());
        }
        let (ids, codes): (Vec<_>, Vec<_>) = statuses
            .iter()
            .map(|(id, status)| (*id, status.code().to_string()))
            .unzip();
        sqlx::query(
            r#"
            UPDATE contacts_contact c SET status = r.status, modified_on = NOW()
            FROM unnest($1::bigint[], $2::text[]) AS r(id, status)
            WHERE c.id = r.id
            "#,
        )
        .bind(&ids)
        .bind(&codes)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_contact_names(&mut self, names: &[(ContactId, Option<String>)]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let (ids, values): (Vec<_>, Vec<_>) = names.iter().cloned().unzip();
        sqlx::query(
            r#"
            UPDATE contacts_contact c SET name = r.name, modified_on = NOW()
            FROM unnest($1::bigint[], $2::text[]) AS r(id, name)
            WHERE c.id = r.id
            "#,
        )
        .bind(&ids)
        .bind(&values)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_contact_urns(&mut self, urns: &[(ContactId, Vec<String>)]) -> Result<()> {
        if urns.is_empty() {
            return Ok(());
        }
        let contact_ids: Vec<ContactId> = urns.iter().map(|(id, _)| *id).collect();
        let mut owners = Vec::new();
        let mut identities = Vec::new();
        let mut priorities = Vec::new();
        for (contact_id, contact_urns) in urns {
            for (i, identity) in contact_urns.iter().enumerate() {
                owners.push(*contact_id);
                identities.push(identity.clone());
                priorities.push(1000 - i as i32);
            }
        }

        sqlx::query("UPDATE contacts_contacturn SET contact_id = NULL WHERE contact_id = ANY($1)")
            .bind(&contact_ids)
            .execute(&mut *self.tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO contacts_contacturn (org_id, contact_id, identity, priority)
            SELECT c.org_id, r.contact_id, r.identity, r.priority
            FROM unnest($1::bigint[], $2::text[], $3::int[]) AS r(contact_id, identity, priority)
            JOIN contacts_contact c ON c.id = r.contact_id
            ON CONFLICT (org_id, identity)
            DO UPDATE SET contact_id = EXCLUDED.contact_id, priority = EXCLUDED.priority
            "#,
        )
        .bind(&owners)
        .bind(&identities)
        .bind(&priorities)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query("UPDATE contacts_contact SET modified_on = NOW() WHERE id = ANY($1)")
            .bind(&contact_ids)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_contact_flows(&mut self, flows: &[(ContactId, Option<Uuid>)]) -> Result<()> {
        if flows.is_empty() {
            return Ok(());
        }
        let (ids, values): (Vec<_>, Vec<_>) = flows.iter().copied().unzip();
        sqlx::query(
            r#"
            UPDATE contacts_contact c SET current_flow_uuid = r.flow_uuid
            FROM unnest($1::bigint[], $2::uuid[]) AS r(id, flow_uuid)
            WHERE c.id = r.id
            "#,
        )
        .bind(&ids)
        .bind(&values)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_contact_modified_on(
        &mut self,
        contact_ids: &[ContactId],
        modified_on: DateTime<Utc>,
    ) -> Result<()> {
        if contact_ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE contacts_contact SET modified_on = $2 WHERE id = ANY($1)")
            .bind(contact_ids)
            .bind(modified_on)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_contact_last_seen(
        &mut self,
        seen: &[(ContactId, DateTime<Utc>)],
    ) -> Result<()> {
        if seen.is_empty() {
            return Ok(());
        }
        let (ids, values): (Vec<_>, Vec<_>) = seen.iter().copied().unzip();
        sqlx::query(
            r#"
            UPDATE contacts_contact c SET last_seen_on = r.seen_on, modified_on = NOW()
            FROM unnest($1::bigint[], $2::timestamptz[]) AS r(id, seen_on)
            WHERE c.id = r.id
            "#,
        )
        .bind(&ids)
        .bind(&values)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_session_timeouts(
        &mut self,
        timeouts: &[(SessionId, Option<DateTime<Utc>>)],
    ) -> Result<()> {
        if timeouts.is_empty() {
            return Ok(());
        }
        let (uuids, values): (Vec<_>, Vec<_>) = timeouts.iter().copied().unzip();
        sqlx::query(
            r#"
            UPDATE flows_flowsession s SET wait_timeout_on = r.timeout_on, modified_on = NOW()
            FROM unnest($1::uuid[], $2::timestamptz[]) AS r(uuid, timeout_on)
            WHERE s.uuid = r.uuid
            "#,
        )
        .bind(&uuids)
        .bind(&values)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_messages(&mut self, msgs: &[Msg]) -> Result<Vec<MsgId>> {
        if msgs.is_empty() {
            return Ok(Vec::new());
        }
        let uuids: Vec<Uuid> = msgs.iter().map(|m| m.uuid).collect();
        let org_ids: Vec<OrgId> = msgs.iter().map(|m| m.org_id).collect();
        let contact_ids: Vec<ContactId> = msgs.iter().map(|m| m.contact_id).collect();
        let channel_ids: Vec<Option<i64>> = msgs.iter().map(|m| m.channel_id).collect();
        let directions: Vec<&str> = msgs.iter().map(|m| m.direction.code()).collect();
        let statuses: Vec<&str> = msgs.iter().map(|m| m.status.code()).collect();
        let texts: Vec<&str> = msgs.iter().map(|m| m.text.as_str()).collect();
        let attachments: Vec<Value> = msgs.iter().map(|m| Value::from(m.attachments.clone())).collect();
        let quick_replies: Vec<Value> =
            msgs.iter().map(|m| Value::from(m.quick_replies.clone())).collect();
        let urns: Vec<Option<String>> = msgs.iter().map(|m| m.urn.clone()).collect();
        let priorities: Vec<bool> = msgs.iter().map(|m| m.high_priority).collect();
        let responses: Vec<Option<MsgId>> = msgs.iter().map(|m| m.response_to_id).collect();
        let created: Vec<DateTime<Utc>> = msgs.iter().map(|m| m.created_on).collect();

        let rows = sqlx::query(
            r#"
            INSERT INTO msgs_msg (uuid, org_id, contact_id, channel_id, direction, status, text,
                                  attachments, quick_replies, urn, high_priority, response_to_id,
                                  created_on, modified_on)
            SELECT r.*, NOW()
            FROM unnest($1::uuid[], $2::bigint[], $3::bigint[], $4::bigint[], $5::text[], $6::text[],
                        $7::text[], $8::jsonb[], $9::jsonb[], $10::text[], $11::bool[], $12::bigint[],
                        $13::timestamptz[]) AS r
            RETURNING id, uuid
            "#,
        )
        .bind(&uuids)
        .bind(&org_ids)
        .bind(&contact_ids)
        .bind(&channel_ids)
        .bind(&directions)
        .bind(&statuses)
        .bind(&texts)
        .bind(&attachments)
        .bind(&quick_replies)
        .bind(&urns)
        .bind(&priorities)
        .bind(&responses)
        .bind(&created)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut ids_by_uuid = HashMap::with_capacity(rows.len());
        for row in rows {
            ids_by_uuid.insert(row.try_get::<Uuid, _>("uuid")?, row.try_get::<MsgId, _>("id")?);
        }
        uuids
            .iter()
            .map(|uuid| {
                ids_by_uuid
                    .get(uuid)
                    .copied()
                    .ok_or_else(|| MailroomError::database(format!("no id returned for msg {uuid}")))
            })
            .collect()
    }

    async fn mark_messages_handled(&mut self, msg_ids: &[MsgId]) -> Result<()> {
        if msg_ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE msgs_msg SET status = $2, modified_on = NOW() WHERE id = ANY($1)")
            .bind(msg_ids)
            .bind(msg_status::HANDLED)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn add_message_labels(&mut self, labels: &[(LabelId, MsgId)]) -> Result<u64> {
        if labels.is_empty() {
            return Ok(0);
        }
        let (label_ids, msg_ids): (Vec<_>, Vec<_>) = labels.iter().copied().unzip();
        let result = sqlx::query(
            r#"
            INSERT INTO msgs_msg_labels (label_id, msg_id)
            SELECT * FROM unnest($1::bigint[], $2::bigint[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&label_ids)
        .bind(&msg_ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_http_logs(&mut self, logs: &[HttpLog]) -> Result<()> {
        if logs.is_empty() {
            return Ok(());
        }
        let org_ids: Vec<OrgId> = logs.iter().map(|l| l.org_id).collect();
        let types: Vec<&str> = logs.iter().map(|l| l.log_type.as_str()).collect();
        let urls: Vec<&str> = logs.iter().map(|l| l.url.as_str()).collect();
        let codes: Vec<Option<i32>> = logs.iter().map(|l| l.status_code.map(i32::from)).collect();
        let requests: Vec<&str> = logs.iter().map(|l| l.request.as_str()).collect();
        let responses: Vec<&str> = logs.iter().map(|l| l.response.as_str()).collect();
        let errors: Vec<bool> = logs.iter().map(|l| l.is_error).collect();
        let elapsed: Vec<i32> = logs
            .iter()
            .map(|l| i32::try_from(l.elapsed_ms).unwrap_or(i32::MAX))
            .collect();
        let flows: Vec<Option<Uuid>> = logs.iter().map(|l| l.flow_uuid).collect();
        let services: Vec<Option<Uuid>> = logs.iter().map(|l| l.service_uuid).collect();
        let created: Vec<DateTime<Utc>> = logs.iter().map(|l| l.created_on).collect();

        sqlx::query(
            r#"
            INSERT INTO request_logs_httplog (org_id, log_type, url, status_code, request, response,
                                              is_error, elapsed_ms, flow_uuid, service_uuid, created_on)
            SELECT * FROM unnest($1::bigint[], $2::text[], $3::text[], $4::int[], $5::text[], $6::text[],
                                 $7::bool[], $8::int[], $9::uuid[], $10::uuid[], $11::timestamptz[])
            "#,
        )
        .bind(&org_ids)
        .bind(&types)
        .bind(&urls)
        .bind(&codes)
        .bind(&requests)
        .bind(&responses)
        .bind(&errors)
        .bind(&elapsed)
        .bind(&flows)
        .bind(&services)
        .bind(&created)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> Result<()> {
        if tickets.is_empty() {
            return Ok(());
        }
        let uuids: Vec<Uuid> = tickets.iter().map(|t| t.uuid).collect();
        let org_ids: Vec<OrgId> = tickets.iter().map(|t| t.org_id).collect();
        let contact_ids: Vec<ContactId> = tickets.iter().map(|t| t.contact_id).collect();
        let ticketer_ids: Vec<i64> = tickets.iter().map(|t| t.ticketer_id).collect();
        let topics: Vec<Option<String>> = tickets.iter().map(|t| t.topic.clone()).collect();
        let bodies: Vec<&str> = tickets.iter().map(|t| t.body.as_str()).collect();
        let external_ids: Vec<Option<String>> =
            tickets.iter().map(|t| t.external_id.clone()).collect();
        let opened: Vec<DateTime<Utc>> = tickets.iter().map(|t| t.opened_on).collect();

        sqlx::query(
            r#"
            INSERT INTO tickets_ticket (uuid, org_id, contact_id, ticketer_id, topic, body,
                                        external_id, opened_on)
            SELECT * FROM unnest($1::uuid[], $2::bigint[], $3::bigint[], $4::bigint[], $5::text[],
                                 $6::text[], $7::text[], $8::timestamptz[])
            "#,
        )
        .bind(&uuids)
        .bind(&org_ids)
        .bind(&contact_ids)
        .bind(&ticketer_ids)
        .bind(&topics)
        .bind(&bodies)
        .bind(&external_ids)
        .bind(&opened)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_unfired_fires(
        &mut self,
        fires: &[(ContactId, CampaignEventId)],
    ) -> Result<u64> {
        if fires.is_empty() {
            return Ok(0);
        }
        let (contact_ids, event_ids): (Vec<_>, Vec<_>) = fires.iter().copied().unzip();
        let result = sqlx::query(
            r#"
            DELETE FROM campaigns_eventfire f
            USING unnest($1::bigint[], $2::bigint[]) AS r(contact_id, event_id)
            WHERE f.contact_id = r.contact_id AND f.event_id = r.event_id AND f.fired IS NULL
            "#,
        )
        .bind(&contact_ids)
        .bind(&event_ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_fires(&mut self, fires: &[Fire]) -> Result<u64> {
        if fires.is_empty() {
            return Ok(0);
        }
        let contact_ids: Vec<ContactId> = fires.iter().map(|f| f.contact_id).collect();
        let event_ids: Vec<CampaignEventId> = fires.iter().map(|f| f.event_id).collect();
        let scheduled: Vec<DateTime<Utc>> = fires.iter().map(|f| f.scheduled).collect();
        let result = sqlx::query(
            r#"
            INSERT INTO campaigns_eventfire (contact_id, event_id, scheduled)
            SELECT * FROM unnest($1::bigint[], $2::bigint[], $3::timestamptz[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&contact_ids)
        .bind(&event_ids)
        .bind(&scheduled)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn pending_from_row(row: &PgRow) -> Result<PendingMsg> {
    let direction: String = row.try_get("direction")?;
    let status: String = row.try_get("status")?;
    let msg = Msg {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        org_id: row.try_get("org_id")?,
        contact_id: row.try_get("contact_id")?,
        channel_id: row.try_get("channel_id")?,
        channel_uuid: row.try_get("channel_uuid")?,
        direction: if direction == MsgDirection::Incoming.code() {
            MsgDirection::Incoming
        } else {
            MsgDirection::Outgoing
        },
        status: MsgStatus::from_code(&status)
            .ok_or_else(|| MailroomError::database(format!("unknown msg status {status}")))?,
        text: row.try_get("text")?,
        attachments: row.try_get::<Json<Vec<String>>, _>("attachments")?.0,
        quick_replies: row.try_get::<Json<Vec<String>>, _>("quick_replies")?.0,
        urn: row.try_get("urn")?,
        high_priority: row.try_get("high_priority")?,
        response_to_id: row.try_get("response_to_id")?,
        created_on: row.try_get("created_on")?,
    };
    let channel = Channel {
        id: row.try_get("channel_id")?,
        uuid: row.try_get("channel_uuid")?,
        name: row.try_get("channel_name")?,
        channel_type: row.try_get("channel_type")?,
        tps: row
            .try_get::<Option<i32>, _>("channel_tps")?
            .and_then(|tps| u32::try_from(tps).ok()),
    };
    Ok(PendingMsg { msg, channel })
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn BatchTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn mark_messages_pending(&self, msg_ids: &[MsgId]) -> Result<()> {
        self.set_msg_status(msg_ids, msg_status::PENDING).await
    }

    async fn mark_messages_queued(&self, msg_ids: &[MsgId]) -> Result<()> {
        self.set_msg_status(msg_ids, msg_status::QUEUED).await
    }

    async fn select_pending_messages(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PendingMsg>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.uuid, m.org_id, m.contact_id, m.channel_id, m.direction, m.status,
                   m.text, m.attachments, m.quick_replies, m.urn, m.high_priority,
                   m.response_to_id, m.created_on,
                   c.uuid AS channel_uuid, c.name AS channel_name,
                   c.channel_type AS channel_type, c.tps AS channel_tps
            FROM msgs_msg m
            JOIN channels_channel c ON c.id = m.channel_id
            WHERE m.direction = 'O' AND m.status = 'P' AND m.created_on < $1
            ORDER BY m.created_on, m.id
            LIMIT $2
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(pending_from_row).collect()
    }

    async fn open_incident(
        &self,
        org_id: OrgId,
        incident_type: &str,
        scope: &str,
        started_on: DateTime<Utc>,
    ) -> Result<IncidentId> {
        // the no-op update makes RETURNING yield the already open row
        let row = sqlx::query(
            r#"
            INSERT INTO notifications_incident (org_id, incident_type, scope, started_on)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (org_id, incident_type, scope) WHERE ended_on IS NULL
            DO UPDATE SET incident_type = EXCLUDED.incident_type
            RETURNING id
            "#,
        )
        .bind(org_id)
        .bind(incident_type)
        .bind(scope)
        .bind(started_on)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn end_incident(&self, incident_id: IncidentId, ended_on: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE notifications_incident SET ended_on = $2 WHERE id = $1 AND ended_on IS NULL",
        )
        .bind(incident_id)
        .bind(ended_on)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;

    #[test]
    fn test_field_patches_last_write_wins_per_key() {
        let updates = vec![
            FieldUpdate {
                contact_id: 1,
                key: "age".to_string(),
                value: Some(FieldValue::text("30")),
            },
            FieldUpdate {
                contact_id: 1,
                key: "age".to_string(),
                value: None,
            },
            FieldUpdate {
                contact_id: 1,
                key: "city".to_string(),
                value: Some(FieldValue::text("Kigali")),
            },
            FieldUpdate {
                contact_id: 2,
                key: "age".to_string(),
                value: Some(FieldValue::text("41")),
            },
        ];

        let (ids, sets, removals) = field_patches(&updates).unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(sets[0], serde_json::json!({"city": {"text": "Kigali"}}));
        assert_eq!(removals[0], serde_json::json!(["age"]));
        assert_eq!(sets[1], serde_json::json!({"age": {"text": "41"}}));
        assert_eq!(removals[1], serde_json::json!([]));
    }
}
