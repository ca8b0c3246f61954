//! Builders for org assets and engine events.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use mailroom_core::events::{
    CallStatus, ChannelRef, Event, FieldRef, GroupRef, LabelRef, MsgIn, MsgOut,
};
use mailroom_core::models::{
    Campaign, CampaignEvent, Channel, Field, FieldValue, Group, Label, OffsetUnit,
};

pub fn group(id: i64, name: &str) -> Group {
    Group {
        id,
        uuid: Uuid::new_v4(),
        name: name.to_string(),
    }
}

pub fn field(id: i64, key: &str) -> Field {
    Field {
        id,
        key: key.to_string(),
        name: key.to_string(),
    }
}

pub fn label(id: i64, name: &str) -> Label {
    Label {
        id,
        uuid: Uuid::new_v4(),
        name: name.to_string(),
    }
}

/// Campaign on `group_id` with one event per `(event_id, relative_to, offset days)`
pub fn campaign(id: i64, group_id: i64, events: &[(i64, &str, i32)]) -> Campaign {
    Campaign {
        id,
        uuid: Uuid::new_v4(),
        name: format!("Campaign {id}"),
        group_id,
        events: events
            .iter()
            .map(|(event_id, relative_to, offset)| CampaignEvent {
                id: *event_id,
                uuid: Uuid::new_v4(),
                campaign_id: id,
                group_id,
                relative_to: relative_to.to_string(),
                offset: *offset,
                unit: OffsetUnit::Days,
                delivery_hour: None,
            })
            .collect(),
    }
}

pub fn group_ref(group: &Group) -> GroupRef {
    GroupRef {
        uuid: group.uuid,
        name: group.name.clone(),
    }
}

pub fn field_changed(key: &str, value: Option<FieldValue>) -> Event {
    Event::ContactFieldChanged {
        created_on: Utc::now(),
        field: FieldRef {
            key: key.to_string(),
            name: key.to_string(),
        },
        value,
    }
}

pub fn groups_changed(added: &[&Group], removed: &[&Group]) -> Event {
    Event::ContactGroupsChanged {
        created_on: Utc::now(),
        groups_added: added.iter().map(|g| group_ref(g)).collect(),
        groups_removed: removed.iter().map(|g| group_ref(g)).collect(),
    }
}

pub fn name_changed(name: &str) -> Event {
    Event::ContactNameChanged {
        created_on: Utc::now(),
        name: Some(name.to_string()),
    }
}

pub fn msg_created(channel: &Channel, text: &str, created_on: DateTime<Utc>) -> Event {
    Event::MsgCreated {
        created_on,
        msg: MsgOut {
            uuid: Uuid::new_v4(),
            urn: Some("tel:+250788383383".to_string()),
            channel: Some(ChannelRef {
                uuid: channel.uuid,
                name: channel.name.clone(),
            }),
            text: text.to_string(),
            attachments: vec![],
            quick_replies: vec![],
        },
    }
}

pub fn webhook_called(node_uuid: Uuid, status_code: Option<u16>) -> Event {
    let status = match status_code {
        None => CallStatus::ConnectionError,
        Some(code) if (200..300).contains(&code) => CallStatus::Success,
        Some(_) => CallStatus::ResponseError,
    };
    Event::WebhookCalled {
        created_on: Utc::now(),
        url: "https://example.com/webhook".to_string(),
        status,
        status_code,
        elapsed_ms: 150,
        request: "POST /webhook HTTP/1.1\r\n\r\n".to_string(),
        response: String::new(),
        resthook: None,
        flow_uuid: Uuid::new_v4(),
        node_uuid,
    }
}

pub fn input_labels_added(labels: &[&Label]) -> Event {
    Event::InputLabelsAdded {
        created_on: Utc::now(),
        input_uuid: Uuid::new_v4(),
        labels: labels
            .iter()
            .map(|l| LabelRef {
                uuid: l.uuid,
                name: l.name.clone(),
            })
            .collect(),
    }
}

pub fn msg_received(msg_id: i64, text: &str) -> Event {
    Event::MsgReceived {
        created_on: Utc::now(),
        msg: MsgIn {
            uuid: Uuid::new_v4(),
            id: msg_id,
            urn: Some("tel:+250788383383".to_string()),
            channel: None,
            text: text.to_string(),
        },
    }
}

pub fn sprint_ended() -> Event {
    Event::SprintEnded {
        created_on: Utc::now(),
        current_flow: None,
    }
}
