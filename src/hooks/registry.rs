//! Hook registry.
//!
//! Built once at startup by an explicit, ordered list of registration calls and
//! frozen into an immutable [`HookRegistry`] that the coordinator shares through an
//! `Arc`. Registering the same event type or hook twice is a startup error.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::{BatchSessions, HookId, PostCommitHook, PreCommitHook, Scene};
use crate::error::{MailroomError, Result};
use crate::events::{Event, EventType};
use crate::models::OrgAssets;

/// Inputs available to a translator. Only pre-write translators may change
/// `sessions`.
#[derive(Debug, Clone, Copy)]
pub struct TranslateContext<'a> {
    pub assets: &'a OrgAssets,
    pub sessions: &'a BatchSessions,
    pub now: DateTime<Utc>,
}

/// Turns one event into hook arguments on its scene
pub type Translator = fn(&TranslateContext<'_>, &mut Scene, &Event) -> Result<()>;

#[derive(Default)]
pub struct HookRegistryBuilder {
    translators: HashMap<EventType, Translator>,
    pre_write: HashMap<EventType, Translator>,
    pre_commit: HashMap<HookId, Arc<dyn PreCommitHook>>,
    post_commit: HashMap<HookId, Arc<dyn PostCommitHook>>,
}

impl HookRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_event_handler(
        &mut self,
        event_type: EventType,
        translator: Translator,
    ) -> Result<&mut Self> {
        if self.translators.insert(event_type, translator).is_some() {
            return Err(MailroomError::Registry(format!(
                "duplicate handler for event type {event_type}"
            )));
        }
        Ok(self)
    }

    /// Register a translator that runs for every scene before any main translator
    pub fn register_event_pre_write_handler(
        &mut self,
        event_type: EventType,
        translator: Translator,
    ) -> Result<&mut Self> {
        if self.pre_write.insert(event_type, translator).is_some() {
            return Err(MailroomError::Registry(format!(
                "duplicate pre-write handler for event type {event_type}"
            )));
        }
        Ok(self)
    }

    pub fn register_pre_commit_hook(&mut self, hook: Arc<dyn PreCommitHook>) -> Result<&mut Self> {
        let id = hook.id();
        if id.phase() != super::HookPhase::PreCommit {
            return Err(MailroomError::Registry(format!(
                "{id} is not a pre-commit hook"
            )));
        }
        if self.pre_commit.insert(id, hook).is_some() {
            return Err(MailroomError::Registry(format!("duplicate hook {id}")));
        }
        Ok(self)
    }

    pub fn register_post_commit_hook(
        &mut self,
        hook: Arc<dyn PostCommitHook>,
    ) -> Result<&mut Self> {
        let id = hook.id();
        if id.phase() != super::HookPhase::PostCommit {
            return Err(MailroomError::Registry(format!(
                "{id} is not a post-commit hook"
            )));
        }
        if self.post_commit.insert(id, hook).is_some() {
            return Err(MailroomError::Registry(format!("duplicate hook {id}")));
        }
        Ok(self)
    }

    pub fn build(self) -> Arc<HookRegistry> {
        Arc::new(HookRegistry {
            translators: self.translators,
            pre_write: self.pre_write,
            pre_commit: self.pre_commit,
            post_commit: self.post_commit,
        })
    }
}

/// Immutable table of translators and hooks
pub struct HookRegistry {
    translators: HashMap<EventType, Translator>,
    pre_write: HashMap<EventType, Translator>,
    pre_commit: HashMap<HookId, Arc<dyn PreCommitHook>>,
    post_commit: HashMap<HookId, Arc<dyn PostCommitHook>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("translators", &self.translators.len())
            .field("pre_write", &self.pre_write.len())
            .field("hooks", &self.registered_hooks())
            .finish()
    }
}

impl HookRegistry {
    pub fn translator(&self, event_type: EventType) -> Option<Translator> {
        self.translators.get(&event_type).copied()
    }

    pub fn pre_write_translator(&self, event_type: EventType) -> Option<Translator> {
        self.pre_write.get(&event_type).copied()
    }

    pub fn pre_commit_hook(&self, id: HookId) -> Option<&Arc<dyn PreCommitHook>> {
        self.pre_commit.get(&id)
    }

    pub fn post_commit_hook(&self, id: HookId) -> Option<&Arc<dyn PostCommitHook>> {
        self.post_commit.get(&id)
    }

    pub fn translator_count(&self) -> usize {
        self.translators.len()
    }

    pub fn has_translator(&self, event_type: EventType) -> bool {
        self.translators.contains_key(&event_type)
    }

    /// Every registered hook, sorted by identity
    pub fn registered_hooks(&self) -> Vec<HookId> {
        let mut hooks: Vec<HookId> = self
            .pre_commit
            .keys()
            .chain(self.post_commit.keys())
            .copied()
            .collect();
        hooks.sort();
        hooks
    }
}
