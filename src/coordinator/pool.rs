//! Bounded concurrent batch processing.
//!
//! Each batch is owned end-to-end by one spawned task. A semaphore caps how many
//! batches run at once, which in turn caps the open transactions.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{BatchCoordinator, BatchOutcome};
use crate::error::{BatchError, MailroomError, Result};
use crate::hooks::Scene;
use crate::models::OrgAssets;

/// Scenes of one org, processed together
#[derive(Debug, Clone)]
pub struct Batch {
    pub assets: Arc<OrgAssets>,
    pub scenes: Vec<Scene>,
}

/// A finished batch handed back to the submitter with its scenes
#[derive(Debug)]
pub struct BatchReport {
    pub scenes: Vec<Scene>,
    pub result: std::result::Result<BatchOutcome, BatchError>,
}

#[derive(Debug, Clone)]
pub struct BatchPool {
    coordinator: Arc<BatchCoordinator>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl BatchPool {
    pub fn new(coordinator: Arc<BatchCoordinator>) -> Self {
        let workers = coordinator.services().config.coordinator.workers.max(1);
        Self {
            coordinator,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Workers not currently processing a batch
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawn a batch; it starts as soon as a worker is free
    pub fn submit(&self, batch: Batch) -> JoinHandle<Result<BatchReport>> {
        let coordinator = Arc::clone(&self.coordinator);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| MailroomError::Internal(format!("batch pool closed: {e}")))?;

            let Batch { assets, mut scenes } = batch;
            debug!(org_id = assets.org_id, scenes = scenes.len(), "Batch started");
            let result = coordinator.handle_batch(&assets, &mut scenes).await;
            Ok(BatchReport { scenes, result })
        })
    }

    /// Run every batch and wait for all of them; reports come back in input order
    pub async fn run_all(&self, batches: Vec<Batch>) -> Result<Vec<BatchReport>> {
        let handles: Vec<_> = batches.into_iter().map(|b| self.submit(b)).collect();

        let mut reports = Vec::with_capacity(handles.len());
        for joined in futures::future::join_all(handles).await {
            let report =
                joined.map_err(|e| MailroomError::Internal(format!("batch task failed: {e}")))??;
            reports.push(report);
        }
        Ok(reports)
    }
}
