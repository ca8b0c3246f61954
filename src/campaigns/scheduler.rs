//! Fire reconciliation for a batch.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use std::collections::HashMap;
use tracing::warn;

use super::delta::{CampaignDelta, ContactDelta};
use super::schedule::schedule_for_contact;
use crate::models::contact::LAST_SEEN_ON_FIELD;
use crate::models::{CampaignEvent, CampaignEventId, Contact, ContactId, Fire, OrgAssets};

/// Bulk fire changes for one batch; deletes must be applied before inserts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FirePlan {
    pub deletes: Vec<(ContactId, CampaignEventId)>,
    pub inserts: Vec<Fire>,
}

impl FirePlan {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }
}

/// The contact as it will look once the batch's changes are applied
fn contact_after(contact: &Contact, delta: &ContactDelta) -> Contact {
    let mut after = contact.clone();
    for (key, value) in &delta.fields_changed {
        match value {
            _ if key == LAST_SEEN_ON_FIELD => {
                after.last_seen_on = value.as_ref().and_then(|v| v.datetime);
            }
            Some(value) => {
                after.fields.insert(key.clone(), value.clone());
            }
            None => {
                after.fields.remove(key);
            }
        }
    }
    for group_id in &delta.groups_removed {
        after.groups.remove(group_id);
    }
    after.groups.extend(delta.groups_added.iter().copied());
    after
}

/// Work out which fires to delete and which to insert.
///
/// Events driven by a removed group or a changed field lose their unfired fires,
/// whatever the new value is. Events driven by an added group, or by a changed
/// field of a campaign the contact is (still) in, are recomputed; a recomputed
/// event only gets a fire when [`schedule_for_contact`] yields a time. Events that
/// fail to schedule are logged and skipped.
pub fn plan_fires(
    assets: &OrgAssets,
    now: DateTime<Utc>,
    contacts: &HashMap<ContactId, &Contact>,
    delta: &CampaignDelta,
) -> FirePlan {
    let mut plan = FirePlan::default();

    for (contact_id, changes) in delta.iter() {
        let Some(contact) = contacts.get(&contact_id) else {
            continue;
        };
        let after = contact_after(contact, changes);

        let mut stale: IndexSet<CampaignEventId> = IndexSet::new();
        let mut recompute: IndexSet<&CampaignEvent> = IndexSet::new();

        for group_id in &changes.groups_removed {
            stale.extend(assets.campaign_events_for_group(*group_id).map(|e| e.id));
        }
        for key in changes.fields_changed.keys() {
            for event in assets.campaign_events_for_field(key) {
                stale.insert(event.id);
                if after.in_group(event.group_id) {
                    recompute.insert(event);
                }
            }
        }
        for group_id in &changes.groups_added {
            recompute.extend(assets.campaign_events_for_group(*group_id));
        }

        plan.deletes
            .extend(stale.into_iter().map(|event_id| (contact_id, event_id)));

        for event in recompute {
            match schedule_for_contact(event, &assets.timezone, now, &after) {
                Ok(Some(scheduled)) => plan.inserts.push(Fire {
                    contact_id,
                    event_id: event.id,
                    scheduled,
                }),
                Ok(None) => {}
                Err(e) => warn!(
                    contact_id = contact_id,
                    event_id = event.id,
                    error = %e,
                    "Skipping campaign event that can't be scheduled"
                ),
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{CampaignChange, FieldChange, GroupChange};
    use crate::models::{Campaign, FieldValue, OffsetUnit};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    const GROUP: i64 = 10;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn assets() -> OrgAssets {
        assets_relative_to("appointment")
    }

    fn assets_relative_to(key: &str) -> OrgAssets {
        OrgAssets::new(1, "UTC").with_campaign(Campaign {
            id: 1,
            uuid: Uuid::new_v4(),
            name: "Reminders".to_string(),
            group_id: GROUP,
            events: vec![CampaignEvent {
                id: 100,
                uuid: Uuid::new_v4(),
                campaign_id: 1,
                group_id: GROUP,
                relative_to: key.to_string(),
                offset: 2,
                unit: OffsetUnit::Days,
                delivery_hour: None,
            }],
        })
    }

    fn plan(contact: &Contact, changes: &[CampaignChange]) -> FirePlan {
        let delta = CampaignDelta::from_changes(changes.iter().map(|c| (contact.id, c)));
        let contacts = HashMap::from([(contact.id, contact)]);
        plan_fires(&assets(), now(), &contacts, &delta)
    }

    fn field(value: Option<FieldValue>) -> CampaignChange {
        CampaignChange::Field(FieldChange {
            key: "appointment".to_string(),
            value,
        })
    }

    #[test]
    fn test_setting_field_to_future_date_schedules_one_fire() {
        let mut contact = Contact::new(1, 1, now());
        contact.groups.insert(GROUP);
        let appointment = now() + Duration::days(5);

        let plan = plan(&contact, &[field(Some(FieldValue::datetime(appointment)))]);
        assert_eq!(plan.deletes, vec![(1, 100)]);
        assert_eq!(
            plan.inserts,
            vec![Fire {
                contact_id: 1,
                event_id: 100,
                scheduled: appointment + Duration::days(2),
            }]
        );
    }

    #[test]
    fn test_clearing_field_only_deletes() {
        let mut contact = Contact::new(1, 1, now());
        contact.groups.insert(GROUP);
        contact.fields.insert(
            "appointment".to_string(),
            FieldValue::datetime(now() + Duration::days(5)),
        );

        let plan = plan(&contact, &[field(None)]);
        assert_eq!(plan.deletes, vec![(1, 100)]);
        assert!(plan.inserts.is_empty());
    }

    #[test]
    fn test_field_change_outside_group_schedules_nothing() {
        let contact = Contact::new(1, 1, now());
        let plan = plan(
            &contact,
            &[field(Some(FieldValue::datetime(now() + Duration::days(5))))],
        );
        assert!(plan.inserts.is_empty());
    }

    #[test]
    fn test_remove_and_readd_issues_nothing() {
        let mut contact = Contact::new(1, 1, now());
        contact.groups.insert(GROUP);
        let plan = plan(
            &contact,
            &[
                CampaignChange::Group(GroupChange {
                    group_id: GROUP,
                    added: false,
                }),
                CampaignChange::Group(GroupChange {
                    group_id: GROUP,
                    added: true,
                }),
            ],
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_last_seen_change_reschedules_from_new_time() {
        let assets = assets_relative_to(LAST_SEEN_ON_FIELD);
        let mut contact = Contact::new(1, 1, now());
        contact.groups.insert(GROUP);
        contact.last_seen_on = Some(now() - Duration::days(10));

        let seen = now() - Duration::hours(1);
        let change = CampaignChange::Field(FieldChange {
            key: LAST_SEEN_ON_FIELD.to_string(),
            value: Some(FieldValue::datetime(seen)),
        });
        let delta = CampaignDelta::from_changes([(1, &change)]);
        let contacts = HashMap::from([(1, &contact)]);
        let plan = plan_fires(&assets, now(), &contacts, &delta);

        assert_eq!(plan.deletes, vec![(1, 100)]);
        assert_eq!(
            plan.inserts,
            vec![Fire {
                contact_id: 1,
                event_id: 100,
                scheduled: seen + Duration::days(2),
            }]
        );
    }

    #[test]
    fn test_bad_timezone_skips_event() {
        let mut contact = Contact::new(1, 1, now());
        contact.fields.insert(
            "appointment".to_string(),
            FieldValue::datetime(now() + Duration::days(5)),
        );
        let mut assets = assets();
        assets.timezone = "Nowhere/Special".to_string();

        let change = CampaignChange::Group(GroupChange {
            group_id: GROUP,
            added: true,
        });
        let delta = CampaignDelta::from_changes([(1, &change)]);
        let contacts = HashMap::from([(1, &contact)]);
        let plan = plan_fires(&assets, now(), &contacts, &delta);
        assert!(plan.inserts.is_empty());
        assert!(plan.deletes.is_empty());
    }
}
