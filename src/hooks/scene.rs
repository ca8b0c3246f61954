//! The unit of work for one contact within one batch.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use uuid::Uuid;

use super::{HookArg, HookId, HookPhase};
use crate::events::Event;
use crate::models::{Contact, ContactId, MsgId, OrgId, Session, SessionId};

/// Message the session is responding to, already persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomingMsg {
    pub id: MsgId,
    pub uuid: Uuid,
}

/// One contact's events and the hook arguments they produce.
///
/// Hook arguments are kept per hook in insertion order, and hooks are kept in the
/// order they were first referenced, so "last value wins" hooks and the
/// coordinator's dispatch order are both deterministic.
#[derive(Debug, Clone)]
pub struct Scene {
    contact: Contact,
    session: Option<Session>,
    events: Vec<Event>,
    incoming_msg: Option<IncomingMsg>,
    pre_commit: IndexMap<HookId, Vec<HookArg>>,
    post_commit: IndexMap<HookId, Vec<HookArg>>,
}

impl Scene {
    pub fn new(contact: Contact, session: Option<Session>) -> Self {
        Self {
            contact,
            session,
            events: Vec::new(),
            incoming_msg: None,
            pre_commit: IndexMap::new(),
            post_commit: IndexMap::new(),
        }
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }

    pub fn with_incoming_msg(mut self, msg: IncomingMsg) -> Self {
        self.incoming_msg = Some(msg);
        self
    }

    pub fn org_id(&self) -> OrgId {
        self.contact.org_id
    }

    pub fn contact_id(&self) -> ContactId {
        self.contact.id
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn incoming_msg(&self) -> Option<IncomingMsg> {
        self.incoming_msg
    }

    pub fn append_to_event_pre_commit_hook(&mut self, hook: HookId, arg: HookArg) {
        debug_assert_eq!(hook.phase(), HookPhase::PreCommit);
        self.pre_commit.entry(hook).or_default().push(arg);
    }

    pub fn append_to_event_post_commit_hook(&mut self, hook: HookId, arg: HookArg) {
        debug_assert_eq!(hook.phase(), HookPhase::PostCommit);
        self.post_commit.entry(hook).or_default().push(arg);
    }

    /// Queue an argument on whichever phase the hook belongs to
    pub fn append(&mut self, hook: HookId, arg: HookArg) {
        match hook.phase() {
            HookPhase::PreCommit => self.append_to_event_pre_commit_hook(hook, arg),
            HookPhase::PostCommit => self.append_to_event_post_commit_hook(hook, arg),
        }
    }

    pub fn hooks(&self, phase: HookPhase) -> impl Iterator<Item = HookId> + '_ {
        self.hook_map(phase).keys().copied()
    }

    pub fn args(&self, phase: HookPhase, hook: HookId) -> &[HookArg] {
        self.hook_map(phase)
            .get(&hook)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Drop every queued argument so the scene can be translated again
    pub fn clear_hooks(&mut self) {
        self.pre_commit.clear();
        self.post_commit.clear();
    }

    fn hook_map(&self, phase: HookPhase) -> &IndexMap<HookId, Vec<HookArg>> {
        match phase {
            HookPhase::PreCommit => &self.pre_commit,
            HookPhase::PostCommit => &self.post_commit,
        }
    }
}

/// Session state visible to every scene of one batch.
///
/// Seeded from the scenes before translation; the first copy of a session wins.
/// Pre-write translators change it, and the coordinator copies it back onto every
/// scene before any main translator runs.
#[derive(Debug, Default)]
pub struct BatchSessions {
    sessions: DashMap<SessionId, Session>,
}

impl BatchSessions {
    pub fn from_scenes(scenes: &[Scene]) -> Self {
        let sessions = DashMap::new();
        for session in scenes.iter().filter_map(Scene::session) {
            sessions
                .entry(session.id)
                .or_insert_with(|| session.clone());
        }
        Self { sessions }
    }

    pub fn get(&self, session_id: SessionId) -> Option<Session> {
        self.sessions.get(&session_id).map(|s| s.clone())
    }

    /// Clear a session's wait timeout, returning the timeout it had
    pub fn clear_wait_timeout(&self, session_id: SessionId) -> Option<DateTime<Utc>> {
        self.sessions
            .get_mut(&session_id)
            .and_then(|mut session| session.wait_timeout_on.take())
    }

    /// Overwrite each scene's session with the batch-wide state
    pub fn apply_to(&self, scenes: &mut [Scene]) {
        for session in scenes.iter_mut().filter_map(Scene::session_mut) {
            if let Some(shared) = self.sessions.get(&session.id) {
                *session = shared.clone();
            }
        }
    }
}
