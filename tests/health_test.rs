//! Webhook node health: incidents opened and ended from committed batches.

mod common;

use uuid::Uuid;

use common::*;
use mailroom_core::bootstrap::MailroomRuntime;
use mailroom_core::constants::INCIDENT_WEBHOOKS_UNHEALTHY;
use mailroom_core::hooks::Scene;
use mailroom_core::models::{Contact, OrgAssets};
use mailroom_core::store::InMemoryStore;

async fn run_calls(
    runtime: &MailroomRuntime,
    store: &InMemoryStore,
    node: Uuid,
    status_codes: &[Option<u16>],
) {
    let contact = Contact::new(1, 1, now());
    store.insert_contact(&contact);
    let events = status_codes
        .iter()
        .map(|code| webhook_called(node, *code))
        .collect();
    let mut scenes = vec![Scene::new(contact, None).with_events(events)];
    let outcome = runtime
        .coordinator
        .handle_batch(&OrgAssets::new(1, "UTC"), &mut scenes)
        .await
        .unwrap();
    assert!(outcome.is_clean(), "{:?}", outcome.post_commit_errors);
}

#[tokio::test]
async fn test_failing_node_opens_one_incident_until_it_recovers() {
    let (runtime, store, _queues) = in_memory_runtime();
    let node = Uuid::new_v4();

    run_calls(&runtime, &store, node, &[Some(500); 10]).await;
    assert!(!runtime.coordinator.services().health.healthy(node, now()));
    let state = store.snapshot();
    let open: Vec<_> = state.open_incidents().collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].incident_type, INCIDENT_WEBHOOKS_UNHEALTHY);
    assert_eq!(open[0].scope, node.to_string());
    assert_eq!(state.http_logs.len(), 10);

    // still failing: the same incident stays open
    run_calls(&runtime, &store, node, &[None; 10]).await;
    let state = store.snapshot();
    assert_eq!(state.incidents.len(), 1);
    assert_eq!(state.open_incidents().count(), 1);

    // 20 of 23 unhealthy is below the failure ratio
    run_calls(&runtime, &store, node, &[Some(200); 3]).await;
    let state = store.snapshot();
    assert_eq!(state.incidents.len(), 1);
    assert_eq!(state.open_incidents().count(), 0);
    assert!(runtime.coordinator.services().health.incident(node).is_none());
}

#[tokio::test]
async fn test_too_few_calls_never_open_an_incident() {
    let (runtime, store, _queues) = in_memory_runtime();
    let node = Uuid::new_v4();

    run_calls(&runtime, &store, node, &[Some(503); 9]).await;
    assert_eq!(store.snapshot().incidents.len(), 0);
    assert!(runtime.coordinator.services().health.healthy(node, now()));
}

#[tokio::test]
async fn test_nodes_are_tracked_independently() {
    let (runtime, store, _queues) = in_memory_runtime();
    let failing = Uuid::new_v4();
    let healthy = Uuid::new_v4();

    run_calls(&runtime, &store, failing, &[Some(500); 12]).await;
    run_calls(&runtime, &store, healthy, &[Some(200); 12]).await;

    let state = store.snapshot();
    let scopes: Vec<_> = state.open_incidents().map(|i| i.scope.clone()).collect();
    assert_eq!(scopes, vec![failing.to_string()]);
}
