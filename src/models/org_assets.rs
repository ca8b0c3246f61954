//! # Org Assets
//!
//! Cached, read-only snapshot of the assets of one organization: channels, groups,
//! fields, labels, ticketers and campaigns. Translators resolve engine references
//! against it; the campaign scheduler reads campaign events from it.
//!
//! Loading and refreshing assets is the caller's concern. A translation error for a
//! missing asset usually means the cache is stale and should be refreshed before
//! the batch is retried.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    Campaign, CampaignEvent, Channel, FieldId, GroupId, LabelId, OrgId, Ticketer,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgAssets {
    pub org_id: OrgId,
    /// IANA timezone name campaign delivery hours are interpreted in
    pub timezone: String,
    channels: HashMap<Uuid, Channel>,
    groups: HashMap<Uuid, Group>,
    fields: HashMap<String, Field>,
    labels: HashMap<Uuid, Label>,
    ticketers: HashMap<Uuid, Ticketer>,
    campaigns: Vec<Campaign>,
}

impl OrgAssets {
    pub fn new(org_id: OrgId, timezone: impl Into<String>) -> Self {
        Self {
            org_id,
            timezone: timezone.into(),
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.insert(channel.uuid, channel);
        self
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.insert(group.uuid, group);
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.insert(field.key.clone(), field);
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.insert(label.uuid, label);
        self
    }

    pub fn with_ticketer(mut self, ticketer: Ticketer) -> Self {
        self.ticketers.insert(ticketer.uuid, ticketer);
        self
    }

    pub fn with_campaign(mut self, campaign: Campaign) -> Self {
        self.campaigns.push(campaign);
        self
    }

    pub fn channel_by_uuid(&self, uuid: &Uuid) -> Option<&Channel> {
        self.channels.get(uuid)
    }

    pub fn channel_by_id(&self, id: super::ChannelId) -> Option<&Channel> {
        self.channels.values().find(|c| c.id == id)
    }

    pub fn group_by_uuid(&self, uuid: &Uuid) -> Option<&Group> {
        self.groups.get(uuid)
    }

    pub fn field_by_key(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    pub fn label_by_uuid(&self, uuid: &Uuid) -> Option<&Label> {
        self.labels.get(uuid)
    }

    pub fn ticketer_by_uuid(&self, uuid: &Uuid) -> Option<&Ticketer> {
        self.ticketers.get(uuid)
    }

    pub fn campaigns(&self) -> &[Campaign] {
        &self.campaigns
    }

    /// Every event of every campaign targeting `group_id`
    pub fn campaign_events_for_group(&self, group_id: GroupId) -> impl Iterator<Item = &CampaignEvent> {
        self.campaigns
            .iter()
            .filter(move |c| c.group_id == group_id)
            .flat_map(|c| c.events.iter())
    }

    /// Every campaign event scheduled relative to the field `key`
    pub fn campaign_events_for_field<'a>(
        &'a self,
        key: &'a str,
    ) -> impl Iterator<Item = &'a CampaignEvent> + 'a {
        self.campaigns
            .iter()
            .flat_map(|c| c.events.iter())
            .filter(move |e| e.relative_to == key)
    }
}
