//! # Bootstrap
//!
//! Startup assembly: the explicit list of translator and hook registrations, and
//! the wiring of stores, queues and the coordinator into a [`MailroomRuntime`].
//!
//! Registration happens once, here, in a fixed order. Nothing registers itself.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::config::MailroomConfig;
use crate::coordinator::{BatchCoordinator, BatchPool};
use crate::courier::{retry_pending_messages, QueueOutcome};
use crate::error::Result;
use crate::events::EventType;
use crate::hooks::contact::{
    UpdateContactFieldsHook, UpdateContactFlowHook, UpdateContactGroupsHook,
    UpdateContactLanguageHook, UpdateContactLastSeenHook, UpdateContactModifiedOnHook,
    UpdateContactNameHook, UpdateContactStatusHook, UpdateContactUrnsHook,
};
use crate::hooks::fires::UpdateCampaignFiresHook;
use crate::hooks::messages::{
    AddMessageLabelsHook, InsertMessagesHook, MarkMessagesHandledHook, SendMessagesHook,
};
use crate::hooks::sessions::{QueueBroadcastsHook, StartSessionsHook, UpdateSessionTimeoutsHook};
use crate::hooks::tickets::{InsertHttpLogsHook, InsertTicketsHook};
use crate::hooks::translators;
use crate::hooks::webhooks::MonitorWebhooksHook;
use crate::hooks::{HookRegistry, HookRegistryBuilder, HookServices};
use crate::queue::{InMemorySortedSetStore, RedisSortedSetStore, SortedSetStore};
use crate::store::{InMemoryStore, PgStore, Store};

/// Register every translator and hook the coordinator knows about
pub fn register_default_handlers(builder: &mut HookRegistryBuilder) -> Result<()> {
    builder
        .register_event_handler(EventType::ContactFieldChanged, translators::contact_field_changed)?
        .register_event_handler(EventType::ContactGroupsChanged, translators::contact_groups_changed)?
        .register_event_handler(
            EventType::ContactLanguageChanged,
            translators::contact_language_changed,
        )?
        .register_event_handler(EventType::ContactStatusChanged, translators::contact_status_changed)?
        .register_event_handler(EventType::ContactNameChanged, translators::contact_name_changed)?
        .register_event_handler(EventType::ContactUrnsChanged, translators::contact_urns_changed)?
        .register_event_handler(EventType::MsgCreated, translators::msg_created)?
        .register_event_handler(EventType::MsgReceived, translators::msg_received)?
        .register_event_handler(EventType::BroadcastCreated, translators::broadcast_created)?
        .register_event_handler(EventType::SessionTriggered, translators::session_triggered)?
        .register_event_handler(EventType::TicketOpened, translators::ticket_opened)?
        .register_event_handler(EventType::ServiceCalled, translators::service_called)?
        .register_event_handler(EventType::WebhookCalled, translators::webhook_called)?
        .register_event_handler(EventType::InputLabelsAdded, translators::input_labels_added)?
        .register_event_handler(EventType::SprintEnded, translators::sprint_ended)?;

    builder.register_event_pre_write_handler(
        EventType::MsgReceived,
        translators::msg_received_pre_write,
    )?;

    builder
        .register_pre_commit_hook(Arc::new(UpdateContactFieldsHook))?
        .register_pre_commit_hook(Arc::new(UpdateContactGroupsHook))?
        .register_pre_commit_hook(Arc::new(UpdateContactLanguageHook))?
        .register_pre_commit_hook(Arc::new(UpdateContactStatusHook))?
        .register_pre_commit_hook(Arc::new(UpdateContactNameHook))?
        .register_pre_commit_hook(Arc::new(UpdateContactUrnsHook))?
        .register_pre_commit_hook(Arc::new(UpdateContactModifiedOnHook))?
        .register_pre_commit_hook(Arc::new(UpdateContactLastSeenHook))?
        .register_pre_commit_hook(Arc::new(UpdateContactFlowHook))?
        .register_pre_commit_hook(Arc::new(UpdateSessionTimeoutsHook))?
        .register_pre_commit_hook(Arc::new(InsertMessagesHook))?
        .register_pre_commit_hook(Arc::new(MarkMessagesHandledHook))?
        .register_pre_commit_hook(Arc::new(AddMessageLabelsHook))?
        .register_pre_commit_hook(Arc::new(InsertHttpLogsHook))?
        .register_pre_commit_hook(Arc::new(InsertTicketsHook))?
        .register_pre_commit_hook(Arc::new(UpdateCampaignFiresHook))?;

    builder
        .register_post_commit_hook(Arc::new(SendMessagesHook))?
        .register_post_commit_hook(Arc::new(MonitorWebhooksHook))?
        .register_post_commit_hook(Arc::new(StartSessionsHook))?
        .register_post_commit_hook(Arc::new(QueueBroadcastsHook))?;

    Ok(())
}

/// Registry with every default translator and hook
pub fn default_registry() -> Result<Arc<HookRegistry>> {
    let mut builder = HookRegistryBuilder::new();
    register_default_handlers(&mut builder)?;
    Ok(builder.build())
}

/// Everything needed to process batches
#[derive(Debug, Clone)]
pub struct MailroomRuntime {
    pub config: Arc<MailroomConfig>,
    pub coordinator: Arc<BatchCoordinator>,
    pub pool: BatchPool,
}

impl MailroomRuntime {
    /// Assemble a runtime over the given providers
    pub fn with_providers(
        config: MailroomConfig,
        store: Arc<dyn Store>,
        queues: Arc<dyn SortedSetStore>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let registry = default_registry()?;
        let services = HookServices::new(Arc::clone(&config), store, queues);
        let coordinator = Arc::new(BatchCoordinator::new(registry, services));
        let pool = BatchPool::new(Arc::clone(&coordinator));

        info!(
            store = coordinator.services().store.provider_name(),
            queues = coordinator.services().queues.provider_name(),
            translators = coordinator.registry().translator_count(),
            hooks = coordinator.registry().registered_hooks().len(),
            workers = pool.workers(),
            "✅ BOOTSTRAP: Mailroom runtime assembled"
        );

        Ok(Self {
            config,
            coordinator,
            pool,
        })
    }

    /// Connect to PostgreSQL and Redis, running pending migrations first
    pub async fn connect(config: MailroomConfig) -> Result<Self> {
        let store = PgStore::connect(&config.database).await?;
        store.migrate().await?;
        let queues = RedisSortedSetStore::from_config(&config.redis).await?;
        Self::with_providers(config, Arc::new(store), Arc::new(queues))
    }

    /// Runtime over in-memory providers, returned alongside for inspection
    pub fn in_memory(
        config: MailroomConfig,
    ) -> Result<(Self, Arc<InMemoryStore>, Arc<InMemorySortedSetStore>)> {
        let store = Arc::new(InMemoryStore::new());
        let queues = Arc::new(InMemorySortedSetStore::new());
        let runtime = Self::with_providers(
            config,
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&queues) as Arc<dyn SortedSetStore>,
        )?;
        Ok((runtime, store, queues))
    }

    /// One pass of the pending message re-queue sweep
    pub async fn requeue_pending(&self, now: DateTime<Utc>) -> Result<QueueOutcome> {
        let services = self.coordinator.services();
        retry_pending_messages(
            services.store.as_ref(),
            services.queues.as_ref(),
            &self.config.courier,
            now,
        )
        .await
    }
}
