//! Net group and field changes per contact.

use indexmap::IndexMap;
use std::collections::BTreeSet;

use crate::hooks::{CampaignChange, GroupChange};
use crate::models::{ContactId, FieldValue, GroupId};

/// Net membership change per group.
///
/// Only the first and last operation on a group matter: when they differ (removed
/// then re-added, or added then removed) the contact ends where it started and the
/// group nets to no change; otherwise the last operation is the net change.
pub fn net_group_changes(changes: &[GroupChange]) -> (Vec<GroupId>, Vec<GroupId>) {
    let mut first_last: IndexMap<GroupId, (bool, bool)> = IndexMap::new();
    for change in changes {
        first_last
            .entry(change.group_id)
            .and_modify(|(_, last)| *last = change.added)
            .or_insert((change.added, change.added));
    }

    let mut added = Vec::new();
    let mut removed = Vec::new();
    for (group_id, (first, last)) in first_last {
        match (first, last) {
            (true, true) => added.push(group_id),
            (false, false) => removed.push(group_id),
            _ => {}
        }
    }
    (added, removed)
}

/// Net campaign-relevant changes for one contact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactDelta {
    pub groups_added: BTreeSet<GroupId>,
    pub groups_removed: BTreeSet<GroupId>,
    /// Final value of each changed field, `None` when cleared
    pub fields_changed: IndexMap<String, Option<FieldValue>>,
}

impl ContactDelta {
    pub fn is_empty(&self) -> bool {
        self.groups_added.is_empty()
            && self.groups_removed.is_empty()
            && self.fields_changed.is_empty()
    }
}

/// Net changes for every contact in a batch, in first-seen contact order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignDelta {
    contacts: IndexMap<ContactId, ContactDelta>,
}

impl CampaignDelta {
    pub fn from_changes<'a>(
        changes: impl IntoIterator<Item = (ContactId, &'a CampaignChange)>,
    ) -> Self {
        let mut groups: IndexMap<ContactId, Vec<GroupChange>> = IndexMap::new();
        let mut contacts: IndexMap<ContactId, ContactDelta> = IndexMap::new();

        for (contact_id, change) in changes {
            let delta = contacts.entry(contact_id).or_default();
            match change {
                CampaignChange::Group(group) => groups.entry(contact_id).or_default().push(*group),
                CampaignChange::Field(field) => {
                    delta
                        .fields_changed
                        .insert(field.key.clone(), field.value.clone());
                }
            }
        }

        for (contact_id, changes) in groups {
            let (added, removed) = net_group_changes(&changes);
            if let Some(delta) = contacts.get_mut(&contact_id) {
                delta.groups_added.extend(added);
                delta.groups_removed.extend(removed);
            }
        }

        contacts.retain(|_, delta| !delta.is_empty());
        Self { contacts }
    }

    pub fn get(&self, contact_id: ContactId) -> Option<&ContactDelta> {
        self.contacts.get(&contact_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContactId, &ContactDelta)> {
        self.contacts.iter().map(|(id, delta)| (*id, delta))
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}
