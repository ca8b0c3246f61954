//! # Session Model
//!
//! Session-level state shared by every event of a scene, and by every scene of a
//! batch through [`BatchSessions`](crate::hooks::BatchSessions). Pre-write
//! translators are the only code allowed to mutate it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Waiting,
    Completed,
    Expired,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub current_flow_uuid: Option<Uuid>,
    /// When a waiting session times out if the contact doesn't reply
    pub wait_timeout_on: Option<DateTime<Utc>>,
    pub wait_expires_on: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            status: SessionStatus::Waiting,
            current_flow_uuid: None,
            wait_timeout_on: None,
            wait_expires_on: None,
        }
    }
}
