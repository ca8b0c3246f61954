#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Mailroom Core
//!
//! Transactional event-processing core of a flow-automation platform.
//!
//! ## Overview
//!
//! The flow engine emits events for each contact it runs (a field changed, a
//! message was created, a webhook was called, ...). This crate turns a batch of
//! those events into durable state changes and downstream work:
//!
//! - **Hook dispatch and transaction coordination**: translators map each event to
//!   hook arguments on its [`hooks::Scene`]; the [`coordinator::BatchCoordinator`]
//!   applies each hook once per batch, all pre-commit hooks inside one transaction,
//!   post-commit hooks only after it commits.
//! - **Courier queue**: committed outgoing messages are batched per channel and
//!   priority into sorted-set queues ([`courier`]).
//! - **Campaign scheduler**: group and field changes are netted per contact and
//!   reconciled against pending campaign fires ([`campaigns`]).
//! - **Webhook health**: webhook calls feed per-node rolling windows that open and
//!   close incidents ([`health`]).
//!
//! ## Module Organization
//!
//! - [`bootstrap`] - Startup registration and runtime assembly
//! - [`coordinator`] - Batch state machine, retries and worker pool
//! - [`hooks`] - Hook identities, scenes, registry, translators and hooks
//! - [`store`] - Relational store seam (PostgreSQL and in-memory)
//! - [`queue`] - Sorted-set store seam (Redis and in-memory) and fair task queues
//! - [`courier`] - Outgoing message batching and re-queueing
//! - [`campaigns`] - Campaign fire reconciliation
//! - [`health`] - Webhook node health windows and incidents
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mailroom_core::bootstrap::MailroomRuntime;
//! use mailroom_core::config::MailroomConfig;
//! use mailroom_core::hooks::Scene;
//! use mailroom_core::models::{Contact, OrgAssets};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = MailroomRuntime::connect(MailroomConfig::default()).await?;
//! let assets = OrgAssets::new(1, "UTC");
//! let mut scenes = vec![Scene::new(Contact::new(1, 1, chrono::Utc::now()), None)];
//!
//! let outcome = runtime.coordinator.handle_batch(&assets, &mut scenes).await?;
//! println!("committed after {} attempts", outcome.attempts);
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod campaigns;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod courier;
pub mod error;
pub mod events;
pub mod health;
pub mod hooks;
pub mod logging;
pub mod models;
pub mod queue;
pub mod store;

pub use bootstrap::{default_registry, register_default_handlers, MailroomRuntime};
pub use config::MailroomConfig;
pub use coordinator::{BatchCoordinator, BatchOutcome, BatchPool, BatchState};
pub use error::{BatchError, MailroomError, Result};
pub use events::{Event, EventType};
pub use hooks::{HookId, HookRegistry, HookRegistryBuilder, Scene};
