//! Tests for launcher reconciliation passes.

use pretty_assertions::assert_eq;
use warden_proto::TenantId;

use super::endpoint_at;
use crate::error::LauncherError;
use crate::test_helpers::Harness;
use crate::{ReconcileOutcome, RegistryConfig};

/// Inserts placeholders for `tenants` and runs one pass.
async fn spawn_tenants(harness: &Harness, tenants: &[u64]) {
	for &id in tenants {
		harness.registry.get_or_create_placeholder(TenantId(id)).await;
	}
	assert!(matches!(harness.registry.reconcile().await, ReconcileOutcome::Continue));
}

#[tokio::test(flavor = "current_thread")]
async fn idle_pass_without_dirty_flag_reaps_and_does_nothing() {
	let harness = Harness::new();
	assert!(matches!(harness.registry.reconcile().await, ReconcileOutcome::Idle));
	assert_eq!(harness.probe.reap_count(), 1);
	assert!(harness.spawner.spawns().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn pass_spawns_in_ascending_tenant_order() {
	let harness = Harness::new();
	spawn_tenants(&harness, &[3, 1, 2]).await;

	let spawned: Vec<_> = harness.spawner.spawns().iter().map(|s| (s.tenant_id, s.endpoint)).collect();
	assert_eq!(
		spawned,
		vec![
			(TenantId(1), endpoint_at(9000)),
			(TenantId(2), endpoint_at(9003)),
			(TenantId(3), endpoint_at(9006)),
		]
	);
	assert_eq!(harness.registry.status().await.free_ports, 0);
	harness.assert_ports_conserved().await;
}

#[tokio::test(flavor = "current_thread")]
async fn dead_instance_is_respawned_on_lowest_ports() {
	let harness = Harness::new();
	spawn_tenants(&harness, &[1]).await;
	let old = harness.spawner.spawns()[0];
	harness.probe.kill(old.pid);

	let (_, created) = harness.registry.get_or_create_placeholder(TenantId(1)).await;
	assert!(!created);
	assert!(matches!(harness.registry.reconcile().await, ReconcileOutcome::Idle));

	harness.registry.get_or_create_placeholder(TenantId(2)).await;
	assert!(matches!(harness.registry.reconcile().await, ReconcileOutcome::Continue));

	let status = harness.registry.status().await;
	let first = status.entries[0].instance.unwrap();
	assert_eq!(first.endpoint, endpoint_at(9000));
	assert_ne!(first.pid, old.pid);
	assert_eq!(status.entries[1].instance.unwrap().endpoint, endpoint_at(9003));
	harness.assert_ports_conserved().await;
}

#[tokio::test(flavor = "current_thread")]
async fn deleted_worker_is_erased_after_exit() {
	let harness = Harness::new();
	spawn_tenants(&harness, &[1]).await;
	let pid = harness.spawner.spawns()[0].pid;

	assert!(harness.registry.mark_deleted(TenantId(1)).await);

	let registry = harness.registry.clone();
	let pass = tokio::spawn(async move { registry.reconcile().await });
	tokio::time::sleep(std::time::Duration::from_millis(30)).await;
	assert!(!pass.is_finished());

	harness.probe.kill(pid);
	assert!(matches!(pass.await.unwrap(), ReconcileOutcome::Continue));

	let status = harness.registry.status().await;
	assert!(status.entries.is_empty());
	assert_eq!(status.free_ports, 9);
}

#[tokio::test(flavor = "current_thread")]
async fn erased_tenant_can_be_reincarnated() {
	let harness = Harness::new();
	spawn_tenants(&harness, &[1]).await;
	harness.probe.kill(harness.spawner.spawns()[0].pid);
	harness.registry.mark_deleted(TenantId(1)).await;
	assert!(matches!(harness.registry.reconcile().await, ReconcileOutcome::Continue));
	assert!(harness.registry.status().await.entries.is_empty());

	let resolver = tokio::spawn({
		let registry = harness.registry.clone();
		async move { registry.resolve(TenantId(1)).await }
	});
	harness.wait_until_dirty().await;
	let status = harness.registry.status().await;
	assert!(!status.entries[0].deleted);
	assert!(status.entries[0].instance.is_none());

	assert!(matches!(harness.registry.reconcile().await, ReconcileOutcome::Continue));
	assert_eq!(resolver.await.unwrap(), Ok(endpoint_at(9000)));

	let spawns = harness.spawner.spawns();
	assert_eq!(spawns.len(), 2);
	assert_ne!(spawns[1].pid, spawns[0].pid);
	harness.assert_ports_conserved().await;
}

#[tokio::test(flavor = "current_thread")]
async fn port_exhaustion_fails_pass_and_leaves_entry_untouched() {
	let harness = Harness::with_config(RegistryConfig {
		port_end: 9010,
		..Harness::config()
	});
	spawn_tenants(&harness, &[1, 2, 3]).await;
	assert_eq!(harness.registry.status().await.free_ports, 2);

	harness.registry.get_or_create_placeholder(TenantId(4)).await;
	let outcome = harness.registry.reconcile().await;
	assert!(matches!(
		outcome,
		ReconcileOutcome::Failure(LauncherError::PortsExhausted {
			tenant_id: TenantId(4),
			free: 2
		})
	));

	let status = harness.registry.status().await;
	let fourth = status.entries.iter().find(|e| e.tenant_id == TenantId(4)).unwrap();
	assert!(!fourth.deleted);
	assert!(fourth.instance.is_none());
	assert_eq!(status.free_ports, 2);
	harness.assert_ports_conserved().await;
}

#[tokio::test(flavor = "current_thread")]
async fn spawn_failure_returns_allocated_ports() {
	let harness = Harness::new();
	harness.spawner.fail_next();
	harness.registry.get_or_create_placeholder(TenantId(1)).await;

	let outcome = harness.registry.reconcile().await;
	assert!(matches!(
		outcome,
		ReconcileOutcome::Failure(LauncherError::Spawn {
			tenant_id: TenantId(1),
			..
		})
	));

	let status = harness.registry.status().await;
	assert_eq!(status.free_ports, 9);
	assert!(status.entries[0].instance.is_none());
	harness.assert_ports_conserved().await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn unresponsive_deleted_worker_bounds_the_pass() {
	let harness = Harness::new();
	spawn_tenants(&harness, &[1, 2]).await;
	harness.registry.mark_deleted(TenantId(1)).await;

	let started = tokio::time::Instant::now();
	assert!(matches!(harness.registry.reconcile().await, ReconcileOutcome::Idle));
	assert!(started.elapsed() >= std::time::Duration::from_secs(1));

	let status = harness.registry.status().await;
	assert!(status.dirty);
	assert_eq!(status.entries.len(), 2);
	assert!(status.entries[0].deleted);
	assert!(status.entries[0].instance.is_some());
	assert_eq!(status.free_ports, 3);
}

#[tokio::test(flavor = "current_thread")]
async fn handshake_timeout_still_records_instance() {
	let harness = Harness::new();
	harness.spawner.set_ready(false);
	spawn_tenants(&harness, &[1]).await;

	let status = harness.registry.status().await;
	let instance = status.entries[0].instance.unwrap();
	assert_eq!(instance.pid, harness.spawner.spawns()[0].pid);
}
