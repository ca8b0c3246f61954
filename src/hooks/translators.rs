//! Event translators.
//!
//! One function per event type. Each resolves the event's asset references
//! against the org's cached assets and queues hook arguments on the scene; none of
//! them touch storage or queues. A reference that can't be resolved is a
//! translation error, which aborts the batch before anything is written.

use uuid::Uuid;

use super::{
    BroadcastTask, CampaignChange, FieldChange, GroupChange, HookArg, HookId, Scene,
    StartSessionTask, TranslateContext, WebhookCall,
};
use crate::error::{MailroomError, Result};
use crate::events::{CallStatus, ChannelRef, Event, EventType, GroupRef, HttpTrace};
use crate::models::contact::LAST_SEEN_ON_FIELD;
use crate::models::{
    msg, FieldValue, GroupId, HttpLog, HttpLogType, Msg, MsgStatus, OrgAssets, SessionStatus,
    Ticket,
};

fn wrong_event(expected: EventType, event: &Event) -> MailroomError {
    MailroomError::Internal(format!(
        "{expected} translator called with {} event",
        event.event_type()
    ))
}

fn resolve_group(assets: &OrgAssets, group: &GroupRef) -> Result<GroupId> {
    assets
        .group_by_uuid(&group.uuid)
        .map(|g| g.id)
        .ok_or_else(|| {
            MailroomError::Translation(format!(
                "unable to find group {} ({})",
                group.uuid, group.name
            ))
        })
}

fn resolve_groups(assets: &OrgAssets, groups: &[GroupRef]) -> Result<Vec<GroupId>> {
    groups.iter().map(|g| resolve_group(assets, g)).collect()
}

fn resolve_channel<'a>(
    assets: &'a OrgAssets,
    channel: &ChannelRef,
) -> Result<&'a crate::models::Channel> {
    assets.channel_by_uuid(&channel.uuid).ok_or_else(|| {
        MailroomError::Translation(format!(
            "unable to find channel {} ({})",
            channel.uuid, channel.name
        ))
    })
}

pub fn contact_field_changed(
    ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    let Event::ContactFieldChanged { field, value, .. } = event else {
        return Err(wrong_event(EventType::ContactFieldChanged, event));
    };
    if ctx.assets.field_by_key(&field.key).is_none() {
        return Err(MailroomError::Translation(format!(
            "unable to find field with key {}",
            field.key
        )));
    }

    let change = FieldChange {
        key: field.key.clone(),
        value: value.clone(),
    };
    scene.append(
        HookId::UpdateCampaignFires,
        HookArg::Campaign(CampaignChange::Field(change.clone())),
    );
    scene.append(HookId::UpdateContactFields, HookArg::Field(change));
    scene.append(HookId::UpdateContactModifiedOn, HookArg::ModifiedOn);
    Ok(())
}

pub fn contact_groups_changed(
    ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    let Event::ContactGroupsChanged {
        groups_added,
        groups_removed,
        ..
    } = event
    else {
        return Err(wrong_event(EventType::ContactGroupsChanged, event));
    };

    let removed = resolve_groups(ctx.assets, groups_removed)?;
    let added = resolve_groups(ctx.assets, groups_added)?;
    let changes = removed
        .into_iter()
        .map(|group_id| GroupChange {
            group_id,
            added: false,
        })
        .chain(added.into_iter().map(|group_id| GroupChange {
            group_id,
            added: true,
        }));

    for change in changes {
        scene.append(HookId::UpdateContactGroups, HookArg::Group(change));
        scene.append(
            HookId::UpdateCampaignFires,
            HookArg::Campaign(CampaignChange::Group(change)),
        );
    }
    scene.append(HookId::UpdateContactModifiedOn, HookArg::ModifiedOn);
    Ok(())
}

pub fn contact_language_changed(
    _ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    let Event::ContactLanguageChanged { language, .. } = event else {
        return Err(wrong_event(EventType::ContactLanguageChanged, event));
    };
    scene.append(HookId::UpdateContactLanguage, HookArg::Language(language.clone()));
    scene.append(HookId::UpdateContactModifiedOn, HookArg::ModifiedOn);
    Ok(())
}

pub fn contact_status_changed(
    _ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    let Event::ContactStatusChanged { status, .. } = event else {
        return Err(wrong_event(EventType::ContactStatusChanged, event));
    };
    scene.append(HookId::UpdateContactStatus, HookArg::Status(*status));
    scene.append(HookId::UpdateContactModifiedOn, HookArg::ModifiedOn);
    Ok(())
}

pub fn contact_name_changed(
    _ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    let Event::ContactNameChanged { name, .. } = event else {
        return Err(wrong_event(EventType::ContactNameChanged, event));
    };
    scene.append(HookId::UpdateContactName, HookArg::Name(name.clone()));
    scene.append(HookId::UpdateContactModifiedOn, HookArg::ModifiedOn);
    Ok(())
}

pub fn contact_urns_changed(
    _ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    let Event::ContactUrnsChanged { urns, .. } = event else {
        return Err(wrong_event(EventType::ContactUrnsChanged, event));
    };
    scene.append(HookId::UpdateContactUrns, HookArg::Urns(urns.clone()));
    scene.append(HookId::UpdateContactModifiedOn, HookArg::ModifiedOn);
    Ok(())
}

/// Outgoing message. Replies to an incoming message go out at high priority; a
/// message with no channel is stored as failed and never sent.
pub fn msg_created(ctx: &TranslateContext<'_>, scene: &mut Scene, event: &Event) -> Result<()> {
    let Event::MsgCreated { created_on, msg: out } = event else {
        return Err(wrong_event(EventType::MsgCreated, event));
    };

    let channel = out
        .channel
        .as_ref()
        .map(|c| resolve_channel(ctx.assets, c))
        .transpose()?;

    let mut row = Msg::outgoing(scene.org_id(), scene.contact_id(), out.text.clone(), *created_on);
    row.uuid = out.uuid;
    row.urn = out.urn.clone();
    row.attachments = out.attachments.clone();
    row.quick_replies = out.quick_replies.clone();
    row.response_to_id = scene.incoming_msg().map(|m| m.id);
    row.high_priority = row.response_to_id.is_some();
    match channel {
        Some(channel) => {
            row.channel_id = Some(channel.id);
            row.channel_uuid = Some(channel.uuid);
        }
        None => row.status = MsgStatus::Failed,
    }

    let sendable = row.status != MsgStatus::Failed;
    let shared = msg::shared(row);
    if sendable {
        scene.append(HookId::SendMessages, HookArg::Msg(shared.clone()));
    }
    scene.append(HookId::InsertMessages, HookArg::Msg(shared));
    Ok(())
}

/// Clears the session's wait timeout as soon as the contact replies, for every
/// scene of the batch sharing that session
pub fn msg_received_pre_write(
    ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    if !matches!(event, Event::MsgReceived { .. }) {
        return Err(wrong_event(EventType::MsgReceived, event));
    }
    let Some(session_id) = scene.session_id() else {
        return Ok(());
    };
    if ctx.sessions.clear_wait_timeout(session_id).is_some() {
        scene.append(
            HookId::UpdateSessionTimeouts,
            HookArg::SessionTimeout {
                session_id,
                timeout_on: None,
            },
        );
    }
    Ok(())
}

pub fn msg_received(ctx: &TranslateContext<'_>, scene: &mut Scene, event: &Event) -> Result<()> {
    let Event::MsgReceived { created_on, msg } = event else {
        return Err(wrong_event(EventType::MsgReceived, event));
    };
    scene.append(HookId::MarkMessagesHandled, HookArg::HandledMsg(msg.id));
    scene.append(HookId::UpdateContactLastSeen, HookArg::LastSeen(*created_on));

    if ctx
        .assets
        .campaign_events_for_field(LAST_SEEN_ON_FIELD)
        .next()
        .is_some()
    {
        scene.append(
            HookId::UpdateCampaignFires,
            HookArg::Campaign(CampaignChange::Field(FieldChange {
                key: LAST_SEEN_ON_FIELD.to_string(),
                value: Some(FieldValue::datetime(*created_on)),
            })),
        );
    }
    Ok(())
}

pub fn broadcast_created(
    ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    let Event::BroadcastCreated {
        translations,
        base_language,
        groups,
        contacts,
        urns,
        ..
    } = event
    else {
        return Err(wrong_event(EventType::BroadcastCreated, event));
    };

    let task = BroadcastTask {
        translations: translations.clone(),
        base_language: base_language.clone(),
        group_ids: resolve_groups(ctx.assets, groups)?,
        contact_uuids: contacts.iter().map(|c| c.uuid).collect(),
        urns: urns.clone(),
    };
    scene.append(HookId::QueueBroadcasts, HookArg::Broadcast(task));
    Ok(())
}

pub fn session_triggered(
    ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    let Event::SessionTriggered {
        flow,
        groups,
        contacts,
        urns,
        run_summary,
        ..
    } = event
    else {
        return Err(wrong_event(EventType::SessionTriggered, event));
    };

    let task = StartSessionTask {
        flow_uuid: flow.uuid,
        group_ids: resolve_groups(ctx.assets, groups)?,
        contact_uuids: contacts.iter().map(|c| c.uuid).collect(),
        urns: urns.clone(),
        parent_summary: run_summary.clone(),
    };
    scene.append(HookId::StartSessions, HookArg::StartSession(task));
    Ok(())
}

pub fn ticket_opened(ctx: &TranslateContext<'_>, scene: &mut Scene, event: &Event) -> Result<()> {
    let Event::TicketOpened { created_on, ticket } = event else {
        return Err(wrong_event(EventType::TicketOpened, event));
    };
    let ticketer = ctx
        .assets
        .ticketer_by_uuid(&ticket.ticketer.uuid)
        .ok_or_else(|| {
            MailroomError::Translation(format!(
                "unable to find ticketer {} ({})",
                ticket.ticketer.uuid, ticket.ticketer.name
            ))
        })?;

    scene.append(
        HookId::InsertTickets,
        HookArg::Ticket(Ticket {
            uuid: ticket.uuid,
            org_id: scene.org_id(),
            contact_id: scene.contact_id(),
            ticketer_id: ticketer.id,
            topic: ticket.topic.clone(),
            body: ticket.body.clone(),
            external_id: ticket.external_id.clone(),
            opened_on: *created_on,
        }),
    );
    Ok(())
}

fn http_log(
    scene: &Scene,
    log_type: HttpLogType,
    trace: &HttpTrace,
    flow_uuid: Option<Uuid>,
    service_uuid: Option<Uuid>,
    created_on: chrono::DateTime<chrono::Utc>,
) -> HttpLog {
    HttpLog {
        org_id: scene.org_id(),
        log_type,
        url: trace.url.clone(),
        status_code: trace.status_code,
        request: trace.request.clone(),
        response: trace.response.clone(),
        is_error: trace.status != CallStatus::Success,
        elapsed_ms: trace.elapsed_ms,
        flow_uuid,
        service_uuid,
        created_on,
    }
}

/// Classifier or ticketer call; each recorded exchange becomes an HTTP log
pub fn service_called(
    _ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    let Event::ServiceCalled {
        created_on,
        service,
        service_uuid,
        http_logs,
    } = event
    else {
        return Err(wrong_event(EventType::ServiceCalled, event));
    };

    let log_type = match service.as_str() {
        "classifier" => HttpLogType::ClassifierCalled,
        "ticketer" => HttpLogType::TicketerCalled,
        other => {
            return Err(MailroomError::Translation(format!(
                "unknown service type {other}"
            )))
        }
    };
    for trace in http_logs {
        let log = http_log(scene, log_type, trace, None, Some(*service_uuid), *created_on);
        scene.append(HookId::InsertHttpLogs, HookArg::HttpLog(log));
    }
    Ok(())
}

/// Webhook call: logged, and fed to the node's health window after commit
pub fn webhook_called(
    _ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    let Event::WebhookCalled {
        created_on,
        url,
        status,
        status_code,
        elapsed_ms,
        request,
        response,
        flow_uuid,
        node_uuid,
        ..
    } = event
    else {
        return Err(wrong_event(EventType::WebhookCalled, event));
    };

    let trace = HttpTrace {
        url: url.clone(),
        status_code: *status_code,
        request: request.clone(),
        response: response.clone(),
        elapsed_ms: *elapsed_ms,
        status: *status,
    };
    let log = http_log(
        scene,
        HttpLogType::WebhookCalled,
        &trace,
        Some(*flow_uuid),
        None,
        *created_on,
    );
    scene.append(HookId::InsertHttpLogs, HookArg::HttpLog(log));
    scene.append(
        HookId::MonitorWebhooks,
        HookArg::WebhookCall(WebhookCall {
            node_uuid: *node_uuid,
            flow_uuid: *flow_uuid,
            url: url.clone(),
            status: *status,
            status_code: *status_code,
            elapsed_ms: *elapsed_ms,
            created_on: *created_on,
        }),
    );
    Ok(())
}

/// Labels the incoming message; a session with no incoming message has nothing
/// to label.
pub fn input_labels_added(
    ctx: &TranslateContext<'_>,
    scene: &mut Scene,
    event: &Event,
) -> Result<()> {
    let Event::InputLabelsAdded { labels, .. } = event else {
        return Err(wrong_event(EventType::InputLabelsAdded, event));
    };
    let Some(incoming) = scene.incoming_msg() else {
        return Ok(());
    };

    for label in labels {
        let label_id = ctx
            .assets
            .label_by_uuid(&label.uuid)
            .map(|l| l.id)
            .ok_or_else(|| {
                MailroomError::Translation(format!(
                    "unable to find label {} ({})",
                    label.uuid, label.name
                ))
            })?;
        scene.append(
            HookId::AddMessageLabels,
            HookArg::MsgLabel {
                label_id,
                msg_id: incoming.id,
            },
        );
    }
    Ok(())
}

/// Records the flow the contact is left waiting in, when it changed
/// Persists the contact's current flow and, for a session left waiting, its
/// wait timeout as the batch sees it after every pre-write
pub fn sprint_ended(_ctx: &TranslateContext<'_>, scene: &mut Scene, event: &Event) -> Result<()> {
    let Event::SprintEnded { current_flow, .. } = event else {
        return Err(wrong_event(EventType::SprintEnded, event));
    };
    let flow_uuid = current_flow.as_ref().map(|f| f.uuid);
    if flow_uuid != scene.contact().current_flow_uuid {
        scene.append(HookId::UpdateContactFlow, HookArg::Flow(flow_uuid));
    }

    let waiting = scene
        .session()
        .filter(|s| s.status == SessionStatus::Waiting)
        .and_then(|s| s.wait_timeout_on.map(|timeout_on| (s.id, timeout_on)));
    if let Some((session_id, timeout_on)) = waiting {
        scene.append(
            HookId::UpdateSessionTimeouts,
            HookArg::SessionTimeout {
                session_id,
                timeout_on: Some(timeout_on),
            },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FieldRef, LabelRef, MsgIn, MsgOut};
    use crate::hooks::{BatchSessions, HookPhase, IncomingMsg};
    use crate::models::{Channel, Contact, Field, Group, Label, Session};
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn scene() -> Scene {
        Scene::new(Contact::new(1, 1, now()), Some(Session::new(Uuid::new_v4())))
    }

    #[test]
    fn test_field_change_queues_fields_campaigns_and_modified_on() {
        let assets = OrgAssets::new(1, "UTC").with_field(Field {
            id: 1,
            key: "age".into(),
            name: "Age".into(),
        });
        let ctx = TranslateContext {
            assets: &assets,
            sessions: &BatchSessions::default(),
            now: now(),
        };
        let mut scene = scene();
        let event = Event::ContactFieldChanged {
            created_on: now(),
            field: FieldRef {
                key: "age".into(),
                name: "Age".into(),
            },
            value: None,
        };

        contact_field_changed(&ctx, &mut scene, &event).unwrap();
        let hooks: Vec<_> = scene.hooks(HookPhase::PreCommit).collect();
        assert_eq!(
            hooks,
            vec![
                HookId::UpdateCampaignFires,
                HookId::UpdateContactFields,
                HookId::UpdateContactModifiedOn
            ]
        );
    }

    #[test]
    fn test_unknown_group_is_a_translation_error() {
        let assets = OrgAssets::new(1, "UTC");
        let ctx = TranslateContext {
            assets: &assets,
            sessions: &BatchSessions::default(),
            now: now(),
        };
        let mut scene = scene();
        let event = Event::ContactGroupsChanged {
            created_on: now(),
            groups_added: vec![GroupRef {
                uuid: Uuid::new_v4(),
                name: "Gone".into(),
            }],
            groups_removed: vec![],
        };

        let err = contact_groups_changed(&ctx, &mut scene, &event).unwrap_err();
        assert!(matches!(err, MailroomError::Translation(_)));
        assert_eq!(scene.hooks(HookPhase::PreCommit).count(), 0);
    }

    #[test]
    fn test_group_changes_feed_groups_and_campaigns() {
        let group = Group {
            id: 10,
            uuid: Uuid::new_v4(),
            name: "Testers".into(),
        };
        let assets = OrgAssets::new(1, "UTC").with_group(group.clone());
        let ctx = TranslateContext {
            assets: &assets,
            sessions: &BatchSessions::default(),
            now: now(),
        };
        let mut scene = scene();
        let event = Event::ContactGroupsChanged {
            created_on: now(),
            groups_added: vec![GroupRef {
                uuid: group.uuid,
                name: group.name.clone(),
            }],
            groups_removed: vec![],
        };

        contact_groups_changed(&ctx, &mut scene, &event).unwrap();
        assert_eq!(
            scene.args(HookPhase::PreCommit, HookId::UpdateContactGroups).len(),
            1
        );
        assert_eq!(
            scene.args(HookPhase::PreCommit, HookId::UpdateCampaignFires).len(),
            1
        );
    }

    #[test]
    fn test_reply_is_high_priority_and_sent() {
        let channel = Channel::new(3, "T");
        let assets = OrgAssets::new(1, "UTC").with_channel(channel.clone());
        let ctx = TranslateContext {
            assets: &assets,
            sessions: &BatchSessions::default(),
            now: now(),
        };
        let mut scene = scene().with_incoming_msg(IncomingMsg {
            id: 55,
            uuid: Uuid::new_v4(),
        });
        let event = Event::MsgCreated {
            created_on: now(),
            msg: MsgOut {
                uuid: Uuid::new_v4(),
                urn: Some("tel:+250788123123".into()),
                channel: Some(ChannelRef {
                    uuid: channel.uuid,
                    name: channel.name.clone(),
                }),
                text: "hi".into(),
                attachments: vec![],
                quick_replies: vec![],
            },
        };

        msg_created(&ctx, &mut scene, &event).unwrap();
        let args = scene.args(HookPhase::PreCommit, HookId::InsertMessages);
        let HookArg::Msg(msg) = &args[0] else {
            panic!("expected msg argument");
        };
        let msg = msg.lock();
        assert!(msg.high_priority);
        assert_eq!(msg.response_to_id, Some(55));
        assert_eq!(msg.channel_id, Some(3));
        assert_eq!(
            scene.args(HookPhase::PostCommit, HookId::SendMessages).len(),
            1
        );
    }

    #[test]
    fn test_msg_without_channel_is_failed_and_not_sent() {
        let assets = OrgAssets::new(1, "UTC");
        let ctx = TranslateContext {
            assets: &assets,
            sessions: &BatchSessions::default(),
            now: now(),
        };
        let mut scene = scene();
        let event = Event::MsgCreated {
            created_on: now(),
            msg: MsgOut {
                uuid: Uuid::new_v4(),
                urn: None,
                channel: None,
                text: "hi".into(),
                attachments: vec![],
                quick_replies: vec![],
            },
        };

        msg_created(&ctx, &mut scene, &event).unwrap();
        let args = scene.args(HookPhase::PreCommit, HookId::InsertMessages);
        let HookArg::Msg(msg) = &args[0] else {
            panic!("expected msg argument");
        };
        assert_eq!(msg.lock().status, MsgStatus::Failed);
        assert_eq!(scene.hooks(HookPhase::PostCommit).count(), 0);
    }

    #[test]
    fn test_msg_received_pre_write_clears_wait_timeout() {
        let assets = OrgAssets::new(1, "UTC");
        let mut scene = scene();
        if let Some(session) = scene.session_mut() {
            session.wait_timeout_on = Some(now());
        }
        let session_id = scene.session_id().unwrap();
        let sessions = BatchSessions::from_scenes(std::slice::from_ref(&scene));
        let ctx = TranslateContext {
            assets: &assets,
            sessions: &sessions,
            now: now(),
        };
        let event = Event::MsgReceived {
            created_on: now(),
            msg: MsgIn {
                uuid: Uuid::new_v4(),
                id: 9,
                urn: None,
                channel: None,
                text: "yes".into(),
            },
        };

        msg_received_pre_write(&ctx, &mut scene, &event).unwrap();
        assert_eq!(sessions.get(session_id).unwrap().wait_timeout_on, None);
        assert!(matches!(
            scene.args(HookPhase::PreCommit, HookId::UpdateSessionTimeouts),
            [HookArg::SessionTimeout { timeout_on: None, .. }]
        ));

        // a second reply in the same batch has nothing left to clear
        msg_received_pre_write(&ctx, &mut scene, &event).unwrap();
        assert_eq!(
            scene
                .args(HookPhase::PreCommit, HookId::UpdateSessionTimeouts)
                .len(),
            1
        );

        msg_received(&ctx, &mut scene, &event).unwrap();
        assert!(matches!(
            scene.args(HookPhase::PreCommit, HookId::MarkMessagesHandled),
            [HookArg::HandledMsg(9)]
        ));
        // no campaign is relative to last seen
        assert!(scene
            .args(HookPhase::PreCommit, HookId::UpdateCampaignFires)
            .is_empty());
    }

    #[test]
    fn test_msg_received_feeds_last_seen_campaigns() {
        let assets = OrgAssets::new(1, "UTC").with_campaign(crate::models::Campaign {
            id: 1,
            uuid: Uuid::new_v4(),
            name: "Check in".into(),
            group_id: 10,
            events: vec![crate::models::CampaignEvent {
                id: 100,
                uuid: Uuid::new_v4(),
                campaign_id: 1,
                group_id: 10,
                relative_to: LAST_SEEN_ON_FIELD.into(),
                offset: 7,
                unit: crate::models::OffsetUnit::Days,
                delivery_hour: None,
            }],
        });
        let ctx = TranslateContext {
            assets: &assets,
            sessions: &BatchSessions::default(),
            now: now(),
        };
        let mut scene = scene();
        let event = Event::MsgReceived {
            created_on: now(),
            msg: MsgIn {
                uuid: Uuid::new_v4(),
                id: 9,
                urn: None,
                channel: None,
                text: "hi".into(),
            },
        };

        msg_received(&ctx, &mut scene, &event).unwrap();
        match scene.args(HookPhase::PreCommit, HookId::UpdateCampaignFires) {
            [HookArg::Campaign(CampaignChange::Field(change))] => {
                assert_eq!(change.key, LAST_SEEN_ON_FIELD);
                assert_eq!(change.value.as_ref().and_then(|v| v.datetime), Some(now()));
            }
            other => panic!("unexpected campaign args: {other:?}"),
        }
    }

    #[test]
    fn test_sprint_ended_persists_a_pending_wait_timeout() {
        let assets = OrgAssets::new(1, "UTC");
        let ctx = TranslateContext {
            assets: &assets,
            sessions: &BatchSessions::default(),
            now: now(),
        };
        let event = Event::SprintEnded {
            created_on: now(),
            current_flow: None,
        };

        let mut waiting = scene();
        if let Some(session) = waiting.session_mut() {
            session.wait_timeout_on = Some(now());
        }
        sprint_ended(&ctx, &mut waiting, &event).unwrap();
        assert!(matches!(
            waiting.args(HookPhase::PreCommit, HookId::UpdateSessionTimeouts),
            [HookArg::SessionTimeout { timeout_on: Some(_), .. }]
        ));

        let mut replied = scene();
        sprint_ended(&ctx, &mut replied, &event).unwrap();
        assert!(replied
            .args(HookPhase::PreCommit, HookId::UpdateSessionTimeouts)
            .is_empty());
    }

    #[test]
    fn test_input_labels_need_an_incoming_message() {
        let label = Label {
            id: 4,
            uuid: Uuid::new_v4(),
            name: "Spam".into(),
        };
        let assets = OrgAssets::new(1, "UTC").with_label(label.clone());
        let ctx = TranslateContext {
            assets: &assets,
            sessions: &BatchSessions::default(),
            now: now(),
        };
        let event = Event::InputLabelsAdded {
            created_on: now(),
            input_uuid: Uuid::new_v4(),
            labels: vec![LabelRef {
                uuid: label.uuid,
                name: label.name.clone(),
            }],
        };

        let mut without = scene();
        input_labels_added(&ctx, &mut without, &event).unwrap();
        assert_eq!(without.hooks(HookPhase::PreCommit).count(), 0);

        let mut with = scene().with_incoming_msg(IncomingMsg {
            id: 70,
            uuid: Uuid::new_v4(),
        });
        input_labels_added(&ctx, &mut with, &event).unwrap();
        assert!(matches!(
            with.args(HookPhase::PreCommit, HookId::AddMessageLabels),
            [HookArg::MsgLabel {
                label_id: 4,
                msg_id: 70
            }]
        ));
    }

    #[test]
    fn test_translator_rejects_other_event_types() {
        let assets = OrgAssets::new(1, "UTC");
        let ctx = TranslateContext {
            assets: &assets,
            sessions: &BatchSessions::default(),
            now: now(),
        };
        let event = Event::ContactNameChanged {
            created_on: now(),
            name: None,
        };
        let err = contact_status_changed(&ctx, &mut scene(), &event).unwrap_err();
        assert!(matches!(err, MailroomError::Internal(_)));
    }
}
