//! # Message Model
//!
//! Outgoing and incoming messages as stored in the message table and as serialized
//! into courier batches.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{ChannelId, ContactId, MsgId, OrgId};
use crate::constants::msg_status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgDirection {
    #[serde(rename = "I")]
    Incoming,
    #[serde(rename = "O")]
    Outgoing,
}

impl MsgDirection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Incoming => "I",
            Self::Outgoing => "O",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgStatus {
    #[serde(rename = "P")]
    Pending,
    #[serde(rename = "Q")]
    Queued,
    #[serde(rename = "W")]
    Wired,
    #[serde(rename = "S")]
    Sent,
    #[serde(rename = "H")]
    Handled,
    #[serde(rename = "F")]
    Failed,
}

impl MsgStatus {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Pending => msg_status::PENDING,
            Self::Queued => msg_status::QUEUED,
            Self::Wired => msg_status::WIRED,
            Self::Sent => msg_status::SENT,
            Self::Handled => msg_status::HANDLED,
            Self::Failed => msg_status::FAILED,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            msg_status::PENDING => Some(Self::Pending),
            msg_status::QUEUED => Some(Self::Queued),
            msg_status::WIRED => Some(Self::Wired),
            msg_status::SENT => Some(Self::Sent),
            msg_status::HANDLED => Some(Self::Handled),
            msg_status::FAILED => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    /// Assigned when the message is inserted; zero until then
    pub id: MsgId,
    pub uuid: Uuid,
    pub org_id: OrgId,
    pub contact_id: ContactId,
    pub channel_id: Option<ChannelId>,
    pub channel_uuid: Option<Uuid>,
    pub direction: MsgDirection,
    pub status: MsgStatus,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub quick_replies: Vec<String>,
    pub urn: Option<String>,
    pub high_priority: bool,
    pub response_to_id: Option<MsgId>,
    pub created_on: DateTime<Utc>,
}

impl Msg {
    /// Outgoing message not yet inserted
    pub fn outgoing(
        org_id: OrgId,
        contact_id: ContactId,
        text: impl Into<String>,
        created_on: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            uuid: Uuid::new_v4(),
            org_id,
            contact_id,
            channel_id: None,
            channel_uuid: None,
            direction: MsgDirection::Outgoing,
            status: MsgStatus::Queued,
            text: text.into(),
            attachments: Vec::new(),
            quick_replies: Vec::new(),
            urn: None,
            high_priority: false,
            response_to_id: None,
            created_on,
        }
    }

    pub fn is_inserted(&self) -> bool {
        self.id != 0
    }
}

/// Message shared between the hook that inserts it and the hook that sends it
///
/// The insert assigns the id; the send reads it after commit.
pub type SharedMsg = Arc<Mutex<Msg>>;

pub fn shared(msg: Msg) -> SharedMsg {
    Arc::new(Mutex::new(msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            MsgStatus::Pending,
            MsgStatus::Queued,
            MsgStatus::Wired,
            MsgStatus::Sent,
            MsgStatus::Handled,
            MsgStatus::Failed,
        ] {
            assert_eq!(MsgStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(MsgStatus::from_code("X"), None);
    }

    #[test]
    fn test_msg_serializes_status_codes() {
        let msg = Msg::outgoing(1, 2, "hi", Utc::now());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["status"], "Q");
        assert_eq!(json["direction"], "O");
        assert!(!msg.is_inserted());
    }
}
