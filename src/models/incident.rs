//! # Incident Model
//!
//! Operator-visible records that something in an org is persistently failing.
//! At most one incident per (org, type, scope) is open at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{IncidentId, OrgId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub org_id: OrgId,
    pub incident_type: String,
    /// What the incident is about, e.g. a flow node UUID
    pub scope: String,
    pub started_on: DateTime<Utc>,
    pub ended_on: Option<DateTime<Utc>>,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.ended_on.is_none()
    }
}
