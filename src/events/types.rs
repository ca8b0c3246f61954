//! Asset references and payload types carried by engine events.
//!
//! The engine refers to org assets by UUID (or key, for fields). Translators
//! resolve these references against the org's cached assets.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MsgId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupRef {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelRef {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRef {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactRef {
    pub uuid: Uuid,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketerRef {
    pub uuid: Uuid,
    pub name: String,
}

/// Outgoing message as produced by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgOut {
    pub uuid: Uuid,
    pub urn: Option<String>,
    pub channel: Option<ChannelRef>,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub quick_replies: Vec<String>,
}

/// Incoming message the session is handling; it already exists in storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgIn {
    pub uuid: Uuid,
    pub id: MsgId,
    pub urn: Option<String>,
    pub channel: Option<ChannelRef>,
    pub text: String,
}

/// Outcome of an external call as recorded by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Success,
    ResponseError,
    ConnectionError,
    SubscriberGone,
}

/// A pre-recorded HTTP exchange attached to a service call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpTrace {
    pub url: String,
    pub status_code: Option<u16>,
    pub request: String,
    #[serde(default)]
    pub response: String,
    pub elapsed_ms: u64,
    pub status: CallStatus,
}

/// Ticket as opened by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketData {
    pub uuid: Uuid,
    pub ticketer: TicketerRef,
    pub topic: Option<String>,
    pub body: String,
    pub external_id: Option<String>,
}
