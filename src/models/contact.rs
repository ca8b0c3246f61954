//! # Contact Model
//!
//! In-memory view of a contact as the engine left it at the end of the run. Hooks
//! persist the parts of it that changed; the campaign scheduler reads field values
//! and group membership from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use super::{ContactId, GroupId, OrgId};
use crate::constants::contact_status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    #[default]
    Active,
    Blocked,
    Stopped,
    Archived,
}

impl ContactStatus {
    /// Status code as stored in the contact table
    pub fn code(&self) -> &'static str {
        match self {
            Self::Active => contact_status::ACTIVE,
            Self::Blocked => contact_status::BLOCKED,
            Self::Stopped => contact_status::STOPPED,
            Self::Archived => contact_status::ARCHIVED,
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Blocked => write!(f, "blocked"),
            Self::Stopped => write!(f, "stopped"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Typed value of a contact field
///
/// The text form is always present; the parsed forms are set when the text parses
/// as that type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldValue {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<DateTime<Utc>>,
}

impl FieldValue {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn datetime(value: DateTime<Utc>) -> Self {
        Self {
            text: value.to_rfc3339(),
            number: None,
            datetime: Some(value),
        }
    }
}

/// Contact fields that campaigns may be relative to without being user fields
pub const CREATED_ON_FIELD: &str = "created_on";
pub const LAST_SEEN_ON_FIELD: &str = "last_seen_on";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub uuid: Uuid,
    pub org_id: OrgId,
    pub name: Option<String>,
    pub language: Option<String>,
    pub status: ContactStatus,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub groups: BTreeSet<GroupId>,
    #[serde(default)]
    pub urns: Vec<String>,
    pub created_on: DateTime<Utc>,
    pub last_seen_on: Option<DateTime<Utc>>,
    pub current_flow_uuid: Option<Uuid>,
}

impl Contact {
    pub fn new(id: ContactId, org_id: OrgId, created_on: DateTime<Utc>) -> Self {
        Self {
            id,
            uuid: Uuid::new_v4(),
            org_id,
            name: None,
            language: None,
            status: ContactStatus::Active,
            fields: BTreeMap::new(),
            groups: BTreeSet::new(),
            urns: Vec::new(),
            created_on,
            last_seen_on: None,
            current_flow_uuid: None,
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn in_group(&self, group_id: GroupId) -> bool {
        self.groups.contains(&group_id)
    }

    /// Datetime a campaign event relative to `key` is anchored on, if any
    pub fn datetime_for(&self, key: &str) -> Option<DateTime<Utc>> {
        match key {
            CREATED_ON_FIELD => Some(self.created_on),
            LAST_SEEN_ON_FIELD => self.last_seen_on,
            _ => self.fields.get(key).and_then(|v| v.datetime),
        }
    }
}
