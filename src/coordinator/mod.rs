//! # Transaction Coordinator
//!
//! Drives one batch of scenes through translation, the pre-commit hooks, the
//! commit and the post-commit hooks.
//!
//! ## Lifecycle
//!
//! ```text
//! Translating -> PreCommitting -> Committing -> PostCommitting -> Done
//!      |              |               |
//!      +--> Aborted <-+               +--> Failed
//! ```
//!
//! Translation runs in two passes: every scene's pre-write translators first, then
//! every scene's main translators. Each distinct hook is then applied exactly once
//! for the whole batch, in the order hooks were first referenced, with every
//! scene's argument list. All pre-commit hooks share one transaction; any failure
//! rolls it back.
//!
//! Transient database races (serialization failures, deadlocks, unique
//! violations) retry the batch from translation with a fresh transaction, up to
//! `coordinator.max_retries` more times. Post-commit failures never fail the
//! batch; they are logged and reported in the [`BatchOutcome`].

pub mod pool;
pub mod state;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use std::sync::Arc;
use tracing::{error, instrument, warn};

use crate::error::{BatchError, MailroomError, Result};
use crate::hooks::{
    BatchSessions, HookContext, HookId, HookPhase, HookRegistry, HookServices, Scene, SceneArgs,
    TranslateContext,
};
use crate::models::OrgAssets;
use crate::store::BatchTx;

pub use pool::{Batch, BatchPool, BatchReport};
pub use state::BatchState;

/// What a successfully committed batch did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Attempts made, including the one that committed
    pub attempts: u32,
    /// Lifecycle state the committing attempt finished in
    pub state: BatchState,
    pub scenes: usize,
    pub pre_commit_hooks: Vec<HookId>,
    pub post_commit_hooks: Vec<HookId>,
    /// Post-commit hooks that failed; the committed state stands regardless
    pub post_commit_errors: Vec<(HookId, MailroomError)>,
}

impl BatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.post_commit_errors.is_empty()
    }
}

pub struct BatchCoordinator {
    registry: Arc<HookRegistry>,
    services: HookServices,
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("registry", &self.registry)
            .field("services", &self.services)
            .finish()
    }
}

impl BatchCoordinator {
    pub fn new(registry: Arc<HookRegistry>, services: HookServices) -> Self {
        Self { registry, services }
    }

    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    pub fn services(&self) -> &HookServices {
        &self.services
    }

    /// Process a batch of scenes for one org, retrying transient failures
    #[instrument(skip(self, assets, scenes), fields(org_id = assets.org_id, scenes = scenes.len()))]
    pub async fn handle_batch(
        &self,
        assets: &OrgAssets,
        scenes: &mut [Scene],
    ) -> std::result::Result<BatchOutcome, BatchError> {
        let retry = &self.services.config.coordinator;
        let max_attempts = retry.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt(assets, scenes, Utc::now()).await {
                Ok(mut outcome) => {
                    outcome.attempts = attempt;
                    crate::log_batch!(
                        info,
                        "batch_committed",
                        org_id: assets.org_id,
                        attempts: attempt,
                        scenes: outcome.scenes,
                        post_commit_errors: outcome.post_commit_errors.len()
                    );
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = retry.backoff_for(attempt);
                    warn!(
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying batch"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) if e.is_retryable() => {
                    error!(attempts = attempt, error = %e, "Batch retries exhausted");
                    return Err(BatchError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    error!(attempt = attempt, error = %e, "Batch failed");
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(
        &self,
        assets: &OrgAssets,
        scenes: &mut [Scene],
        now: DateTime<Utc>,
    ) -> std::result::Result<BatchOutcome, BatchError> {
        let state = BatchState::Translating;
        for scene in scenes.iter_mut() {
            scene.clear_hooks();
        }

        if let Err(e) = self.translate(assets, now, scenes) {
            state
                .transition(BatchState::Aborted)
                .map_err(BatchError::Translation)?;
            return Err(BatchError::Translation(e));
        }
        let state = state
            .transition(BatchState::PreCommitting)
            .map_err(BatchError::Translation)?;

        let scenes: &[Scene] = scenes;
        let ctx = HookContext {
            services: &self.services,
            assets,
            now,
        };
        let mut outcome = BatchOutcome {
            scenes: scenes.len(),
            ..Default::default()
        };

        let mut tx = self
            .services
            .store
            .begin()
            .await
            .map_err(BatchError::Begin)?;

        for hook_id in hooks_in_order(scenes, HookPhase::PreCommit) {
            let applied = match self.registry.pre_commit_hook(hook_id) {
                Some(hook) => {
                    let args = scene_args(scenes, HookPhase::PreCommit, hook_id);
                    hook.apply(&ctx, tx.as_mut(), &args).await
                }
                None => Err(MailroomError::Registry(format!(
                    "no pre-commit hook registered for {hook_id}"
                ))),
            };
            if let Err(e) = applied {
                rollback(tx).await;
                state
                    .transition(BatchState::Aborted)
                    .map_err(BatchError::PreCommit)?;
                return Err(BatchError::PreCommit(e));
            }
            outcome.pre_commit_hooks.push(hook_id);
        }

        let state = state
            .transition(BatchState::Committing)
            .map_err(BatchError::PreCommit)?;
        if let Err(e) = tx.commit().await {
            state
                .transition(BatchState::Failed)
                .map_err(BatchError::Commit)?;
            return Err(BatchError::Commit(e));
        }
        let state = state
            .transition(BatchState::PostCommitting)
            .map_err(BatchError::Commit)?;

        for hook_id in hooks_in_order(scenes, HookPhase::PostCommit) {
            let applied = match self.registry.post_commit_hook(hook_id) {
                Some(hook) => {
                    let args = scene_args(scenes, HookPhase::PostCommit, hook_id);
                    hook.apply(&ctx, &args).await
                }
                None => Err(MailroomError::Registry(format!(
                    "no post-commit hook registered for {hook_id}"
                ))),
            };
            match applied {
                Ok(()) => outcome.post_commit_hooks.push(hook_id),
                Err(e) => {
                    error!(hook = %hook_id, error = %e, "Post-commit hook failed");
                    outcome.post_commit_errors.push((hook_id, e));
                }
            }
        }

        outcome.state = state
            .transition(BatchState::Done)
            .map_err(BatchError::Commit)?;
        Ok(outcome)
    }

    /// Pre-write translators for every scene, then main translators for every scene
    fn translate(&self, assets: &OrgAssets, now: DateTime<Utc>, scenes: &mut [Scene]) -> Result<()> {
        let sessions = BatchSessions::from_scenes(scenes);
        let ctx = TranslateContext {
            assets,
            sessions: &sessions,
            now,
        };

        for scene in scenes.iter_mut() {
            let events = scene.events().to_vec();
            for event in &events {
                if let Some(pre_write) = self.registry.pre_write_translator(event.event_type()) {
                    pre_write(&ctx, scene, event)?;
                }
            }
        }

        // main translators see session state after every scene's pre-write
        sessions.apply_to(scenes);

        for scene in scenes.iter_mut() {
            let events = scene.events().to_vec();
            for event in &events {
                let event_type = event.event_type();
                let translator = self.registry.translator(event_type).ok_or_else(|| {
                    MailroomError::Translation(format!(
                        "no handler registered for event type {event_type}"
                    ))
                })?;
                translator(&ctx, scene, event)?;
            }
        }

        crate::log_batch!(debug, "translated", scenes: scenes.len());
        Ok(())
    }
}

/// Distinct hooks of a phase, in the order the batch first referenced them
fn hooks_in_order(scenes: &[Scene], phase: HookPhase) -> IndexSet<HookId> {
    scenes.iter().flat_map(|s| s.hooks(phase)).collect()
}

/// Every scene that queued `hook`, with its arguments, in scene order
fn scene_args(scenes: &[Scene], phase: HookPhase, hook: HookId) -> Vec<SceneArgs<'_>> {
    scenes
        .iter()
        .map(|scene| SceneArgs {
            scene,
            args: scene.args(phase, hook),
        })
        .filter(|entry| !entry.args.is_empty())
        .collect()
}

async fn rollback(tx: Box<dyn BatchTx>) {
    if let Err(e) = tx.rollback().await {
        error!(error = %e, "Failed to roll back batch transaction");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookArg, Scene};
    use crate::models::Contact;
    use chrono::Utc;

    #[test]
    fn test_hooks_in_first_reference_order_across_scenes() {
        let mut first = Scene::new(Contact::new(1, 1, Utc::now()), None);
        first.append(HookId::UpdateContactName, HookArg::Name(None));
        let mut second = Scene::new(Contact::new(2, 1, Utc::now()), None);
        second.append(HookId::UpdateContactLanguage, HookArg::Language(None));
        second.append(HookId::UpdateContactName, HookArg::Name(None));
        let third = Scene::new(Contact::new(3, 1, Utc::now()), None);

        let scenes = vec![first, second, third];
        let hooks: Vec<_> = hooks_in_order(&scenes, HookPhase::PreCommit)
            .into_iter()
            .collect();
        assert_eq!(
            hooks,
            vec![HookId::UpdateContactName, HookId::UpdateContactLanguage]
        );

        let args = scene_args(&scenes, HookPhase::PreCommit, HookId::UpdateContactName);
        let contacts: Vec<_> = args.iter().map(|a| a.scene.contact_id()).collect();
        assert_eq!(contacts, vec![1, 2]);
    }
}
