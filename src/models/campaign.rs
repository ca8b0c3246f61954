//! # Campaign Model
//!
//! Campaign events and the fires derived from them. A fire exists only while its
//! contact is in the campaign's group and the computed schedule is in the future.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{CampaignEventId, CampaignId, ContactId, GroupId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffsetUnit {
    #[serde(rename = "M")]
    Minutes,
    #[serde(rename = "H")]
    Hours,
    #[serde(rename = "D")]
    Days,
    #[serde(rename = "W")]
    Weeks,
}

impl fmt::Display for OffsetUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minutes => write!(f, "M"),
            Self::Hours => write!(f, "H"),
            Self::Days => write!(f, "D"),
            Self::Weeks => write!(f, "W"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub uuid: Uuid,
    pub name: String,
    pub group_id: GroupId,
    pub events: Vec<CampaignEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignEvent {
    pub id: CampaignEventId,
    pub uuid: Uuid,
    pub campaign_id: CampaignId,
    /// Group whose members the event schedules fires for
    pub group_id: GroupId,
    /// Key of the field (or system field) the schedule is relative to
    pub relative_to: String,
    pub offset: i32,
    pub unit: OffsetUnit,
    /// Hour of day (org timezone) to deliver at, for day and week offsets
    pub delivery_hour: Option<u32>,
}

/// A pending campaign action for one contact/event pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fire {
    pub contact_id: ContactId,
    pub event_id: CampaignEventId,
    pub scheduled: DateTime<Utc>,
}
