//! # Engine Events
//!
//! Immutable facts emitted by the flow engine for one contact within one run.
//!
//! The set of event kinds is closed: [`Event`] is a serde-tagged sum type and
//! [`EventType`] is its tag, which is what the hook registry keys translators by.
//! Adding a kind means adding a variant here, and the compiler then points at every
//! `match` that has to learn about it.

pub mod types;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use types::{
    CallStatus, ChannelRef, ContactRef, FieldRef, FlowRef, GroupRef, HttpTrace, LabelRef,
    MsgIn, MsgOut, TicketData, TicketerRef,
};

use crate::models::{ContactStatus, FieldValue};
use uuid::Uuid;

/// Tag identifying the kind of an [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ContactFieldChanged,
    ContactGroupsChanged,
    ContactLanguageChanged,
    ContactStatusChanged,
    ContactNameChanged,
    ContactUrnsChanged,
    MsgCreated,
    MsgReceived,
    BroadcastCreated,
    SessionTriggered,
    TicketOpened,
    ServiceCalled,
    WebhookCalled,
    InputLabelsAdded,
    SprintEnded,
}

impl EventType {
    pub const ALL: [EventType; 15] = [
        EventType::ContactFieldChanged,
        EventType::ContactGroupsChanged,
        EventType::ContactLanguageChanged,
        EventType::ContactStatusChanged,
        EventType::ContactNameChanged,
        EventType::ContactUrnsChanged,
        EventType::MsgCreated,
        EventType::MsgReceived,
        EventType::BroadcastCreated,
        EventType::SessionTriggered,
        EventType::TicketOpened,
        EventType::ServiceCalled,
        EventType::WebhookCalled,
        EventType::InputLabelsAdded,
        EventType::SprintEnded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactFieldChanged => "contact_field_changed",
            Self::ContactGroupsChanged => "contact_groups_changed",
            Self::ContactLanguageChanged => "contact_language_changed",
            Self::ContactStatusChanged => "contact_status_changed",
            Self::ContactNameChanged => "contact_name_changed",
            Self::ContactUrnsChanged => "contact_urns_changed",
            Self::MsgCreated => "msg_created",
            Self::MsgReceived => "msg_received",
            Self::BroadcastCreated => "broadcast_created",
            Self::SessionTriggered => "session_triggered",
            Self::TicketOpened => "ticket_opened",
            Self::ServiceCalled => "service_called",
            Self::WebhookCalled => "webhook_called",
            Self::InputLabelsAdded => "input_labels_added",
            Self::SprintEnded => "sprint_ended",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed fact produced by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ContactFieldChanged {
        created_on: DateTime<Utc>,
        field: FieldRef,
        /// `None` when the value was cleared
        value: Option<FieldValue>,
    },
    ContactGroupsChanged {
        created_on: DateTime<Utc>,
        #[serde(default)]
        groups_added: Vec<GroupRef>,
        #[serde(default)]
        groups_removed: Vec<GroupRef>,
    },
    ContactLanguageChanged {
        created_on: DateTime<Utc>,
        language: Option<String>,
    },
    ContactStatusChanged {
        created_on: DateTime<Utc>,
        status: ContactStatus,
    },
    ContactNameChanged {
        created_on: DateTime<Utc>,
        name: Option<String>,
    },
    ContactUrnsChanged {
        created_on: DateTime<Utc>,
        urns: Vec<String>,
    },
    MsgCreated {
        created_on: DateTime<Utc>,
        msg: MsgOut,
    },
    MsgReceived {
        created_on: DateTime<Utc>,
        msg: MsgIn,
    },
    BroadcastCreated {
        created_on: DateTime<Utc>,
        translations: std::collections::BTreeMap<String, String>,
        base_language: String,
        #[serde(default)]
        groups: Vec<GroupRef>,
        #[serde(default)]
        contacts: Vec<ContactRef>,
        #[serde(default)]
        urns: Vec<String>,
    },
    SessionTriggered {
        created_on: DateTime<Utc>,
        flow: FlowRef,
        #[serde(default)]
        groups: Vec<GroupRef>,
        #[serde(default)]
        contacts: Vec<ContactRef>,
        #[serde(default)]
        urns: Vec<String>,
        #[serde(default)]
        run_summary: serde_json::Value,
    },
    TicketOpened {
        created_on: DateTime<Utc>,
        ticket: TicketData,
    },
    ServiceCalled {
        created_on: DateTime<Utc>,
        /// `classifier` or `ticketer`
        service: String,
        service_uuid: Uuid,
        #[serde(default)]
        http_logs: Vec<HttpTrace>,
    },
    WebhookCalled {
        created_on: DateTime<Utc>,
        url: String,
        status: CallStatus,
        status_code: Option<u16>,
        elapsed_ms: u64,
        request: String,
        #[serde(default)]
        response: String,
        resthook: Option<String>,
        flow_uuid: Uuid,
        node_uuid: Uuid,
    },
    InputLabelsAdded {
        created_on: DateTime<Utc>,
        input_uuid: Uuid,
        labels: Vec<LabelRef>,
    },
    SprintEnded {
        created_on: DateTime<Utc>,
        /// Flow the contact is now waiting in, if any
        current_flow: Option<FlowRef>,
    },
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::ContactFieldChanged { .. } => EventType::ContactFieldChanged,
            Event::ContactGroupsChanged { .. } => EventType::ContactGroupsChanged,
            Event::ContactLanguageChanged { .. } => EventType::ContactLanguageChanged,
            Event::ContactStatusChanged { .. } => EventType::ContactStatusChanged,
            Event::ContactNameChanged { .. } => EventType::ContactNameChanged,
            Event::ContactUrnsChanged { .. } => EventType::ContactUrnsChanged,
            Event::MsgCreated { .. } => EventType::MsgCreated,
            Event::MsgReceived { .. } => EventType::MsgReceived,
            Event::BroadcastCreated { .. } => EventType::BroadcastCreated,
            Event::SessionTriggered { .. } => EventType::SessionTriggered,
            Event::TicketOpened { .. } => EventType::TicketOpened,
            Event::ServiceCalled { .. } => EventType::ServiceCalled,
            Event::WebhookCalled { .. } => EventType::WebhookCalled,
            Event::InputLabelsAdded { .. } => EventType::InputLabelsAdded,
            Event::SprintEnded { .. } => EventType::SprintEnded,
        }
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        match self {
            Event::ContactFieldChanged { created_on, .. }
            | Event::ContactGroupsChanged { created_on, .. }
            | Event::ContactLanguageChanged { created_on, .. }
            | Event::ContactStatusChanged { created_on, .. }
            | Event::ContactNameChanged { created_on, .. }
            | Event::ContactUrnsChanged { created_on, .. }
            | Event::MsgCreated { created_on, .. }
            | Event::MsgReceived { created_on, .. }
            | Event::BroadcastCreated { created_on, .. }
            | Event::SessionTriggered { created_on, .. }
            | Event::TicketOpened { created_on, .. }
            | Event::ServiceCalled { created_on, .. }
            | Event::WebhookCalled { created_on, .. }
            | Event::InputLabelsAdded { created_on, .. }
            | Event::SprintEnded { created_on, .. } => *created_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_type_tags_round_trip_through_json() {
        let event = Event::ContactLanguageChanged {
            created_on: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            language: Some("fra".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "contact_language_changed");
        assert_eq!(json["type"], event.event_type().as_str());

        let parsed: Event = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_groups_changed_defaults_missing_lists() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "type": "contact_groups_changed",
            "created_on": "2026-03-01T12:00:00Z",
            "groups_added": [{"uuid": "5e9d8fab-5e7e-4f51-b533-261af5dea70d", "name": "Testers"}]
        }))
        .unwrap();

        match event {
            Event::ContactGroupsChanged {
                groups_added,
                groups_removed,
                ..
            } => {
                assert_eq!(groups_added.len(), 1);
                assert!(groups_removed.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_all_event_types_have_distinct_tags() {
        let tags: std::collections::BTreeSet<_> =
            EventType::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(tags.len(), EventType::ALL.len());
    }
}
