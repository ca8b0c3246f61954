//! Shared fixtures for the integration tests.

#![allow(dead_code)]

pub mod builders;

pub use builders::*;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use mailroom_core::bootstrap::MailroomRuntime;
use mailroom_core::config::MailroomConfig;
use mailroom_core::queue::InMemorySortedSetStore;
use mailroom_core::store::InMemoryStore;

/// Configuration tuned for tests: no retry backoff, re-queue anything pending
pub fn test_config() -> MailroomConfig {
    let mut config = MailroomConfig::default();
    config.coordinator.retry_backoff_ms = 0;
    config.courier.requeue_after_secs = 0;
    config
}

pub fn in_memory_runtime() -> (MailroomRuntime, Arc<InMemoryStore>, Arc<InMemorySortedSetStore>) {
    mailroom_core::logging::init_tracing();
    MailroomRuntime::in_memory(test_config()).expect("runtime assembles")
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}
