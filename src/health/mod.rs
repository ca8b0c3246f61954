//! # Webhook Health Monitor
//!
//! Rolling-window circuit breaker over the webhook calls made from each flow node.
//!
//! Every node gets a [`NodeWindow`]: a ring of `intervals` buckets of
//! `interval_secs` each, counting healthy and unhealthy calls. A node is unhealthy
//! once its window holds at least `min_samples` calls and the unhealthy share
//! exceeds `failure_ratio`. Nodes are keyed by UUID because flows can be edited
//! without changing node identity.
//!
//! Windows are independently locked; there is no lock across nodes. Incidents are
//! opened through [`Store::open_incident`], an upsert, so concurrent batches racing
//! to open the same incident are harmless.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HealthConfig;
use crate::constants::INCIDENT_WEBHOOKS_UNHEALTHY;
use crate::error::Result;
use crate::events::CallStatus;
use crate::hooks::WebhookCall;
use crate::models::{IncidentId, OrgId};
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Bucket {
    slot: i64,
    healthy: u64,
    unhealthy: u64,
}

/// Call counts for one node over the current window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeHealth {
    pub total: u64,
    pub unhealthy: u64,
}

/// Rolling window of call outcomes for one node
#[derive(Debug, Clone)]
pub struct NodeWindow {
    buckets: Vec<Bucket>,
    latest: Option<i64>,
    incident: Option<IncidentId>,
}

impl NodeWindow {
    fn new(intervals: usize) -> Self {
        Self {
            buckets: vec![Bucket::default(); intervals.max(1)],
            latest: None,
            incident: None,
        }
    }

    /// Count one call. Calls older than the window ending at the newest recorded
    /// slot are dropped; a bucket is only ever reset by a newer slot.
    fn record(&mut self, slot: i64, healthy: bool) -> bool {
        let len = self.buckets.len() as i64;
        let latest = self.latest.map_or(slot, |latest| latest.max(slot));
        if slot <= latest - len {
            return false;
        }
        self.latest = Some(latest);

        let bucket = &mut self.buckets[slot.rem_euclid(len) as usize];
        if slot < bucket.slot {
            return false;
        }
        if slot > bucket.slot {
            *bucket = Bucket {
                slot,
                ..Default::default()
            };
        }
        if healthy {
            bucket.healthy += 1;
        } else {
            bucket.unhealthy += 1;
        }
        true
    }

    fn health(&self, current_slot: i64) -> NodeHealth {
        let len = self.buckets.len() as i64;
        self.buckets
            .iter()
            .filter(|b| b.slot <= current_slot && b.slot > current_slot - len)
            .fold(NodeHealth::default(), |acc, b| NodeHealth {
                total: acc.total + b.healthy + b.unhealthy,
                unhealthy: acc.unhealthy + b.unhealthy,
            })
    }

    pub fn incident(&self) -> Option<IncidentId> {
        self.incident
    }
}

pub struct WebhookHealthMonitor {
    config: HealthConfig,
    nodes: DashMap<Uuid, Arc<Mutex<NodeWindow>>>,
}

impl std::fmt::Debug for WebhookHealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookHealthMonitor")
            .field("config", &self.config)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl WebhookHealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            nodes: DashMap::new(),
        }
    }

    fn slot(&self, at: DateTime<Utc>) -> i64 {
        let width = i64::try_from(self.config.interval_secs.max(1)).unwrap_or(i64::MAX);
        at.timestamp().div_euclid(width)
    }

    fn window(&self, node_uuid: Uuid) -> Arc<Mutex<NodeWindow>> {
        let intervals = self.config.intervals;
        Arc::clone(
            self.nodes
                .entry(node_uuid)
                .or_insert_with(|| Arc::new(Mutex::new(NodeWindow::new(intervals))))
                .value(),
        )
    }

    /// Whether a single call counts against its node
    pub fn is_unhealthy_call(&self, call: &WebhookCall) -> bool {
        if call.status == CallStatus::ConnectionError {
            return true;
        }
        if !matches!(call.status_code, Some(code) if (200..300).contains(&code)) {
            return true;
        }
        matches!(self.config.unhealthy_elapsed_ms, Some(limit) if call.elapsed_ms > limit)
    }

    /// Add call outcomes to a node's window
    pub fn record(&self, node_uuid: Uuid, calls: &[WebhookCall]) {
        let window = self.window(node_uuid);
        let mut window = window.lock();
        for call in calls {
            if !window.record(self.slot(call.created_on), !self.is_unhealthy_call(call)) {
                debug!(
                    node_uuid = %node_uuid,
                    created_on = %call.created_on,
                    "Dropping webhook call older than the health window"
                );
            }
        }
    }

    pub fn health(&self, node_uuid: Uuid, now: DateTime<Utc>) -> NodeHealth {
        let current = self.slot(now);
        self.nodes
            .get(&node_uuid)
            .map(|w| w.lock().health(current))
            .unwrap_or_default()
    }

    /// False once enough calls are in the window and too many of them failed
    pub fn healthy(&self, node_uuid: Uuid, now: DateTime<Utc>) -> bool {
        let health = self.health(node_uuid, now);
        if health.total < self.config.min_samples {
            return true;
        }
        (health.unhealthy as f64 / health.total as f64) <= self.config.failure_ratio
    }

    pub fn incident(&self, node_uuid: Uuid) -> Option<IncidentId> {
        self.nodes.get(&node_uuid).and_then(|w| w.lock().incident)
    }

    /// Open an incident for each node that doesn't already have one tracked.
    /// Returns the nodes that got a newly tracked incident.
    pub async fn open_incidents(
        &self,
        store: &dyn Store,
        org_id: OrgId,
        node_uuids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, IncidentId)>> {
        let mut opened = Vec::new();
        for node_uuid in node_uuids {
            let window = self.window(*node_uuid);
            if window.lock().incident.is_some() {
                continue;
            }
            let scope = node_uuid.to_string();
            let incident_id = store
                .open_incident(org_id, INCIDENT_WEBHOOKS_UNHEALTHY, &scope, now)
                .await?;
            window.lock().incident = Some(incident_id);

            warn!(
                org_id = org_id,
                node_uuid = %node_uuid,
                incident_id = incident_id,
                "Webhook node unhealthy, incident opened"
            );
            opened.push((*node_uuid, incident_id));
        }
        Ok(opened)
    }

    /// End the tracked incident of each node that has one
    pub async fn end_incidents(
        &self,
        store: &dyn Store,
        node_uuids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, IncidentId)>> {
        let mut ended = Vec::new();
        for node_uuid in node_uuids {
            let Some(window) = self.nodes.get(node_uuid).map(|w| Arc::clone(w.value())) else {
                continue;
            };
            let Some(incident_id) = window.lock().incident else {
                continue;
            };
            store.end_incident(incident_id, now).await?;
            window.lock().incident = None;

            info!(
                node_uuid = %node_uuid,
                incident_id = incident_id,
                "Webhook node recovered, incident ended"
            );
            ended.push((*node_uuid, incident_id));
        }
        Ok(ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn call(node_uuid: Uuid, status_code: Option<u16>, at: DateTime<Utc>) -> WebhookCall {
        WebhookCall {
            node_uuid,
            flow_uuid: Uuid::nil(),
            url: "https://example.com/hook".to_string(),
            status: match status_code {
                None => CallStatus::ConnectionError,
                Some(code) if (200..300).contains(&code) => CallStatus::Success,
                Some(_) => CallStatus::ResponseError,
            },
            status_code,
            elapsed_ms: 120,
            created_on: at,
        }
    }

    #[test]
    fn test_call_classification() {
        let node = Uuid::new_v4();
        let monitor = WebhookHealthMonitor::new(HealthConfig {
            unhealthy_elapsed_ms: Some(100),
            ..Default::default()
        });
        assert!(monitor.is_unhealthy_call(&call(node, None, now())));
        assert!(monitor.is_unhealthy_call(&call(node, Some(503), now())));
        // slow success
        assert!(monitor.is_unhealthy_call(&call(node, Some(200), now())));

        let lenient = WebhookHealthMonitor::new(HealthConfig::default());
        assert!(!lenient.is_unhealthy_call(&call(node, Some(201), now())));
    }

    #[test]
    fn test_needs_min_samples_before_unhealthy() {
        let node = Uuid::new_v4();
        let monitor = WebhookHealthMonitor::new(HealthConfig::default());
        let failures: Vec<_> = (0..9).map(|_| call(node, Some(500), now())).collect();
        monitor.record(node, &failures);
        assert!(monitor.healthy(node, now()));

        monitor.record(node, &[call(node, Some(500), now())]);
        assert!(!monitor.healthy(node, now()));
        assert_eq!(
            monitor.health(node, now()),
            NodeHealth {
                total: 10,
                unhealthy: 10
            }
        );
    }

    #[test]
    fn test_ratio_at_threshold_is_healthy() {
        let node = Uuid::new_v4();
        let monitor = WebhookHealthMonitor::new(HealthConfig::default());
        let mut calls: Vec<_> = (0..9).map(|_| call(node, Some(500), now())).collect();
        calls.push(call(node, Some(200), now()));
        monitor.record(node, &calls);
        // 9/10 is not above 0.9
        assert!(monitor.healthy(node, now()));
    }

    #[test]
    fn test_old_buckets_fall_out_of_window() {
        let node = Uuid::new_v4();
        let monitor = WebhookHealthMonitor::new(HealthConfig::default());
        let old = now() - Duration::minutes(30);
        let failures: Vec<_> = (0..20).map(|_| call(node, None, old)).collect();
        monitor.record(node, &failures);

        assert!(!monitor.healthy(node, old));
        // four five-minute buckets later the failures no longer count
        assert!(monitor.healthy(node, now()));
        assert_eq!(monitor.health(node, now()).total, 0);
    }

    #[test]
    fn test_late_call_never_resets_current_window() {
        let node = Uuid::new_v4();
        let monitor = WebhookHealthMonitor::new(HealthConfig::default());
        let failures: Vec<_> = (0..20).map(|_| call(node, None, now())).collect();
        monitor.record(node, &failures);
        assert!(!monitor.healthy(node, now()));

        // lands in the same ring position as the current bucket
        monitor.record(node, &[call(node, Some(500), now() - Duration::minutes(20))]);
        assert_eq!(
            monitor.health(node, now()),
            NodeHealth {
                total: 20,
                unhealthy: 20
            }
        );
        assert!(!monitor.healthy(node, now()));
    }

    #[test]
    fn test_late_call_inside_window_still_counts() {
        let node = Uuid::new_v4();
        let monitor = WebhookHealthMonitor::new(HealthConfig::default());
        monitor.record(node, &[call(node, Some(500), now())]);
        monitor.record(node, &[call(node, Some(500), now() - Duration::minutes(5))]);
        assert_eq!(monitor.health(node, now()).total, 2);
    }

    #[tokio::test]
    async fn test_incidents_open_once_and_end_on_recovery() {
        let store = InMemoryStore::new();
        let node = Uuid::new_v4();
        let monitor = WebhookHealthMonitor::new(HealthConfig::default());

        let opened = monitor.open_incidents(&store, 1, &[node], now()).await.unwrap();
        assert_eq!(opened.len(), 1);
        let again = monitor.open_incidents(&store, 1, &[node], now()).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(store.snapshot().open_incidents().count(), 1);

        let ended = monitor.end_incidents(&store, &[node], now()).await.unwrap();
        assert_eq!(ended, opened);
        assert_eq!(store.snapshot().open_incidents().count(), 0);
        assert_eq!(monitor.incident(node), None);
    }
}
