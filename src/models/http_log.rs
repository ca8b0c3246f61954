//! # HTTP Log Model
//!
//! Pre-recorded external calls made by the engine, persisted for auditing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrgId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpLogType {
    WebhookCalled,
    ClassifierCalled,
    TicketerCalled,
}

impl HttpLogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebhookCalled => "webhook_called",
            Self::ClassifierCalled => "classifier_called",
            Self::TicketerCalled => "ticketer_called",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpLog {
    pub org_id: OrgId,
    pub log_type: HttpLogType,
    pub url: String,
    pub status_code: Option<u16>,
    pub request: String,
    pub response: String,
    pub is_error: bool,
    pub elapsed_ms: u64,
    /// Flow that made a webhook call
    pub flow_uuid: Option<Uuid>,
    /// Classifier or ticketer that was called
    pub service_uuid: Option<Uuid>,
    pub created_on: DateTime<Utc>,
}
