//! Pre-commit hooks that persist changes to the contact row and its group
//! memberships.
//!
//! All of these are bulk: one statement per hook per batch, keyed by contact id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use super::{
    last_per_scene, unexpected_arg, GroupChange, HookArg, HookContext, HookId, PreCommitHook,
    SceneArgs,
};
use crate::campaigns::net_group_changes;
use crate::error::Result;
use crate::models::ContactId;
use crate::store::{BatchTx, FieldUpdate, GroupMembership};

/// Writes changed field values. Uses the last value queued per contact and field.
#[derive(Debug, Default)]
pub struct UpdateContactFieldsHook;

#[async_trait]
impl PreCommitHook for UpdateContactFieldsHook {
    fn id(&self) -> HookId {
        HookId::UpdateContactFields
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let mut updates = Vec::new();
        for entry in scenes {
            let mut last: IndexMap<&str, FieldUpdate> = IndexMap::new();
            for arg in entry.args {
                let HookArg::Field(change) = arg else {
                    return Err(unexpected_arg(self.id(), arg));
                };
                last.insert(
                    change.key.as_str(),
                    FieldUpdate {
                        contact_id: entry.scene.contact_id(),
                        key: change.key.clone(),
                        value: change.value.clone(),
                    },
                );
            }
            updates.extend(last.into_values());
        }

        crate::log_hook!(debug, "apply", hook: self.id(), updates: updates.len());
        tx.update_contact_fields(&updates).await
    }
}

/// Adds and removes group memberships, netting every change queued for a contact
#[derive(Debug, Default)]
pub struct UpdateContactGroupsHook;

#[async_trait]
impl PreCommitHook for UpdateContactGroupsHook {
    fn id(&self) -> HookId {
        HookId::UpdateContactGroups
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let mut adds = Vec::new();
        let mut removes = Vec::new();

        for entry in scenes {
            let changes = entry
                .args
                .iter()
                .map(|arg| match arg {
                    HookArg::Group(change) => Ok(*change),
                    other => Err(unexpected_arg(self.id(), other)),
                })
                .collect::<Result<Vec<GroupChange>>>()?;

            let contact_id = entry.scene.contact_id();
            let (added, removed) = net_group_changes(&changes);
            adds.extend(added.into_iter().map(|group_id| GroupMembership {
                contact_id,
                group_id,
            }));
            removes.extend(removed.into_iter().map(|group_id| GroupMembership {
                contact_id,
                group_id,
            }));
        }

        crate::log_hook!(
            debug,
            "apply",
            hook: self.id(),
            adds: adds.len(),
            removes: removes.len()
        );
        if !removes.is_empty() {
            tx.remove_contact_groups(&removes).await?;
        }
        if !adds.is_empty() {
            tx.add_contact_groups(&adds).await?;
        }
        Ok(())
    }
}

/// Sets the contact language; last wins
#[derive(Debug, Default)]
pub struct UpdateContactLanguageHook;

#[async_trait]
impl PreCommitHook for UpdateContactLanguageHook {
    fn id(&self) -> HookId {
        HookId::UpdateContactLanguage
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let languages: Vec<(ContactId, Option<String>)> =
            last_per_scene(self.id(), scenes, |arg| match arg {
                HookArg::Language(language) => Some(language.clone()),
                _ => None,
            })?
            .into_iter()
            .map(|(scene, language)| (scene.contact_id(), language))
            .collect();
        tx.update_contact_languages(&languages).await
    }
}

/// Sets the contact status; last wins
#[derive(Debug, Default)]
pub struct UpdateContactStatusHook;

#[async_trait]
impl PreCommitHook for UpdateContactStatusHook {
    fn id(&self) -> HookId {
        HookId::UpdateContactStatus
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let statuses: Vec<_> = last_per_scene(self.id(), scenes, |arg| match arg {
            HookArg::Status(status) => Some(*status),
            _ => None,
        })?
        .into_iter()
        .map(|(scene, status)| (scene.contact_id(), status))
        .collect();
        tx.update_contact_statuses(&statuses).await
    }
}

/// Sets the contact name; last wins
#[derive(Debug, Default)]
pub struct UpdateContactNameHook;

#[async_trait]
impl PreCommitHook for UpdateContactNameHook {
    fn id(&self) -> HookId {
        HookId::UpdateContactName
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let names: Vec<_> = last_per_scene(self.id(), scenes, |arg| match arg {
            HookArg::Name(name) => Some(name.clone()),
            _ => None,
        })?
        .into_iter()
        .map(|(scene, name)| (scene.contact_id(), name))
        .collect();
        tx.update_contact_names(&names).await
    }
}

/// Replaces the contact's URNs; last wins
#[derive(Debug, Default)]
pub struct UpdateContactUrnsHook;

#[async_trait]
impl PreCommitHook for UpdateContactUrnsHook {
    fn id(&self) -> HookId {
        HookId::UpdateContactUrns
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let urns: Vec<_> = last_per_scene(self.id(), scenes, |arg| match arg {
            HookArg::Urns(urns) => Some(urns.clone()),
            _ => None,
        })?
        .into_iter()
        .map(|(scene, urns)| (scene.contact_id(), urns))
        .collect();
        tx.update_contact_urns(&urns).await
    }
}

/// Sets the flow the contact is waiting in; last wins
#[derive(Debug, Default)]
pub struct UpdateContactFlowHook;

#[async_trait]
impl PreCommitHook for UpdateContactFlowHook {
    fn id(&self) -> HookId {
        HookId::UpdateContactFlow
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let flows: Vec<_> = last_per_scene(self.id(), scenes, |arg| match arg {
            HookArg::Flow(flow) => Some(*flow),
            _ => None,
        })?
        .into_iter()
        .map(|(scene, flow)| (scene.contact_id(), flow))
        .collect();
        tx.update_contact_flows(&flows).await
    }
}

/// Touches `modified_on` once per contact, however many changes were queued
#[derive(Debug, Default)]
pub struct UpdateContactModifiedOnHook;

#[async_trait]
impl PreCommitHook for UpdateContactModifiedOnHook {
    fn id(&self) -> HookId {
        HookId::UpdateContactModifiedOn
    }

    async fn apply(
        &self,
        ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let contact_ids: Vec<ContactId> = scenes
            .iter()
            .filter(|entry| !entry.args.is_empty())
            .map(|entry| entry.scene.contact_id())
            .collect();
        tx.update_contact_modified_on(&contact_ids, ctx.now).await
    }
}

/// Records when the contact was last seen; the latest timestamp wins
#[derive(Debug, Default)]
pub struct UpdateContactLastSeenHook;

#[async_trait]
impl PreCommitHook for UpdateContactLastSeenHook {
    fn id(&self) -> HookId {
        HookId::UpdateContactLastSeen
    }

    async fn apply(
        &self,
        _ctx: &HookContext<'_>,
        tx: &mut dyn BatchTx,
        scenes: &[SceneArgs<'_>],
    ) -> Result<()> {
        let mut seen = Vec::with_capacity(scenes.len());
        for entry in scenes {
            let mut latest: Option<DateTime<Utc>> = None;
            for arg in entry.args {
                let HookArg::LastSeen(at) = arg else {
                    return Err(unexpected_arg(self.id(), arg));
                };
                latest = latest.max(Some(*at));
            }
            if let Some(at) = latest {
                seen.push((entry.scene.contact_id(), at));
            }
        }
        tx.update_contact_last_seen(&seen).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{FieldChange, HookServices, Scene};
    use crate::models::{Contact, FieldValue, OrgAssets};
    use crate::queue::InMemorySortedSetStore;
    use crate::store::{InMemoryStore, Store};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn services(store: Arc<InMemoryStore>) -> HookServices {
        HookServices::new(
            Arc::new(Default::default()),
            store,
            Arc::new(InMemorySortedSetStore::new()),
        )
    }

    #[tokio::test]
    async fn test_last_field_value_per_contact_wins() {
        let store = Arc::new(InMemoryStore::new());
        let contact = Contact::new(1, 1, now());
        store.insert_contact(&contact);
        let services = services(Arc::clone(&store));
        let assets = OrgAssets::new(1, "UTC");
        let ctx = HookContext {
            services: &services,
            assets: &assets,
            now: now(),
        };

        let scene = Scene::new(contact, None);
        let args = vec![
            HookArg::Field(FieldChange {
                key: "age".into(),
                value: Some(FieldValue::text("30")),
            }),
            HookArg::Field(FieldChange {
                key: "nickname".into(),
                value: Some(FieldValue::text("Bob")),
            }),
            HookArg::Field(FieldChange {
                key: "age".into(),
                value: Some(FieldValue::text("31")),
            }),
        ];

        let mut tx = store.begin().await.unwrap();
        UpdateContactFieldsHook
            .apply(
                &ctx,
                tx.as_mut(),
                &[SceneArgs {
                    scene: &scene,
                    args: &args,
                }],
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let state = store.snapshot();
        let fields = &state.contacts[&1].fields;
        assert_eq!(fields["age"].text, "31");
        assert_eq!(fields["nickname"].text, "Bob");
    }

    #[tokio::test]
    async fn test_group_changes_net_out() {
        let store = Arc::new(InMemoryStore::new());
        let mut contact = Contact::new(1, 1, now());
        contact.groups.insert(20);
        store.insert_contact(&contact);
        let services = services(Arc::clone(&store));
        let assets = OrgAssets::new(1, "UTC");
        let ctx = HookContext {
            services: &services,
            assets: &assets,
            now: now(),
        };

        let scene = Scene::new(contact, None);
        let change = |group_id, added| HookArg::Group(GroupChange { group_id, added });
        let args = vec![
            change(10, true),
            change(20, false),
            change(20, true),
            change(30, true),
            change(30, false),
        ];

        let mut tx = store.begin().await.unwrap();
        UpdateContactGroupsHook
            .apply(
                &ctx,
                tx.as_mut(),
                &[SceneArgs {
                    scene: &scene,
                    args: &args,
                }],
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let groups: Vec<_> = store.snapshot().contact_groups(1).into_iter().collect();
        assert_eq!(groups, vec![10, 20]);
    }

    #[tokio::test]
    async fn test_wrong_argument_is_a_hook_error() {
        let store = Arc::new(InMemoryStore::new());
        let contact = Contact::new(1, 1, now());
        store.insert_contact(&contact);
        let services = services(Arc::clone(&store));
        let assets = OrgAssets::new(1, "UTC");
        let ctx = HookContext {
            services: &services,
            assets: &assets,
            now: now(),
        };
        let scene = Scene::new(contact, None);
        let args = vec![HookArg::ModifiedOn];

        let mut tx = store.begin().await.unwrap();
        let err = UpdateContactNameHook
            .apply(
                &ctx,
                tx.as_mut(),
                &[SceneArgs {
                    scene: &scene,
                    args: &args,
                }],
            )
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();
        assert!(matches!(err, crate::error::MailroomError::Hook { .. }));
    }

    #[tokio::test]
    async fn test_latest_last_seen_wins() {
        let store = Arc::new(InMemoryStore::new());
        let contact = Contact::new(1, 1, now());
        store.insert_contact(&contact);
        let services = services(Arc::clone(&store));
        let assets = OrgAssets::new(1, "UTC");
        let ctx = HookContext {
            services: &services,
            assets: &assets,
            now: now(),
        };
        let scene = Scene::new(contact, None);
        let later = now() - Duration::minutes(1);
        let args = vec![
            HookArg::LastSeen(later),
            HookArg::LastSeen(now() - Duration::minutes(5)),
        ];

        let mut tx = store.begin().await.unwrap();
        UpdateContactLastSeenHook
            .apply(
                &ctx,
                tx.as_mut(),
                &[SceneArgs {
                    scene: &scene,
                    args: &args,
                }],
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.snapshot().contacts[&1].last_seen_on, Some(later));
    }
}
