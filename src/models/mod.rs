//! # Models
//!
//! Domain records read and written by the batch coordinator and its hooks.

pub mod campaign;
pub mod channel;
pub mod contact;
pub mod http_log;
pub mod incident;
pub mod msg;
pub mod org_assets;
pub mod session;
pub mod ticket;

pub use campaign::{Campaign, CampaignEvent, Fire, OffsetUnit};
pub use channel::Channel;
pub use contact::{Contact, ContactStatus, FieldValue};
pub use http_log::{HttpLog, HttpLogType};
pub use incident::Incident;
pub use msg::{Msg, MsgDirection, MsgStatus, SharedMsg};
pub use org_assets::{Field, Group, Label, OrgAssets};
pub use session::{Session, SessionStatus};
pub use ticket::{Ticket, Ticketer};

pub type OrgId = i64;
pub type ContactId = i64;
pub type SessionId = uuid::Uuid;
pub type GroupId = i64;
pub type FieldId = i64;
pub type LabelId = i64;
pub type MsgId = i64;
pub type ChannelId = i64;
pub type CampaignId = i64;
pub type CampaignEventId = i64;
pub type TicketerId = i64;
pub type IncidentId = i64;
