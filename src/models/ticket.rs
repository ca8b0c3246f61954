//! # Ticket Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ContactId, OrgId, TicketerId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub uuid: Uuid,
    pub org_id: OrgId,
    pub contact_id: ContactId,
    pub ticketer_id: TicketerId,
    pub topic: Option<String>,
    pub body: String,
    pub external_id: Option<String>,
    pub opened_on: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticketer {
    pub id: TicketerId,
    pub uuid: Uuid,
    pub name: String,
    pub ticketer_type: String,
}
