//! One launcher reconciliation pass.

use std::collections::BTreeSet;

use tokio::time::Instant;
use warden_proto::{Instance, TenantId};

use crate::error::LauncherError;
use crate::registry::{Registry, TableState};

/// Result of [`Registry::reconcile`].
#[derive(Debug)]
pub enum ReconcileOutcome {
	/// Nothing was requested or nothing changed.
	Idle,
	/// The table changed and waiters were notified.
	Continue,
	/// The pass aborted. The launcher must stop.
	Failure(LauncherError),
}

/// What one sweep over the table decided.
enum Sweep {
	/// Every row is settled apart from those still awaiting termination.
	Settled,
	/// A deleted row became removable; erase it and sweep again.
	Restart,
}

impl Registry {
	/// Runs one reconciliation pass under the changes lock.
	///
	/// Reaps exited children, then, if dirty was raised, erases retired rows, reclaims dead
	/// instances and spawns missing ones. Deleted workers that are still running are
	/// polled every `termination_poll_ms` for at most `termination_wait_secs`; if they
	/// outlive that bound their rows stay and dirty is raised again for a later pass.
	pub async fn reconcile(&self) -> ReconcileOutcome {
		let mut guard = self.lock().await;
		let state = &mut *guard;

		let reaped = self.probe.reap_children();
		if reaped > 0 {
			tracing::debug!(reaped, "reaped exited workers");
		}
		if !state.dirty {
			return ReconcileOutcome::Idle;
		}
		state.dirty = false;

		let deadline = Instant::now() + self.config.termination_wait();
		let mut changed = false;
		let mut pending_removal = BTreeSet::new();
		let mut awaiting_termination = BTreeSet::new();

		loop {
			for tenant_id in std::mem::take(&mut pending_removal) {
				state.entries.remove(&tenant_id);
				tracing::info!(%tenant_id, "erased deleted tenant");
				changed = true;
			}
			awaiting_termination.clear();

			match self.sweep(state, &mut pending_removal, &mut awaiting_termination, &mut changed).await {
				Ok(Sweep::Restart) => continue,
				Ok(Sweep::Settled) => {}
				Err(err) => {
					tracing::error!(error = %err, "reconciliation pass failed");
					self.publish_update();
					return ReconcileOutcome::Failure(err);
				}
			}

			if awaiting_termination.is_empty() {
				break;
			}
			if Instant::now() >= deadline {
				tracing::warn!(
					tenants = ?awaiting_termination,
					wait_secs = self.config.termination_wait_secs,
					"deleted workers still running, deferring their removal"
				);
				state.dirty = true;
				break;
			}
			tracing::debug!(tenants = ?awaiting_termination, "waiting for deleted workers to exit");
			tokio::time::sleep(self.config.termination_poll()).await;
		}

		if changed {
			self.publish_update();
			ReconcileOutcome::Continue
		} else {
			ReconcileOutcome::Idle
		}
	}

	/// Visits every row in ascending tenant order.
	async fn sweep(
		&self,
		state: &mut TableState,
		pending_removal: &mut BTreeSet<TenantId>,
		awaiting_termination: &mut BTreeSet<TenantId>,
		changed: &mut bool,
	) -> Result<Sweep, LauncherError> {
		let tenants: Vec<TenantId> = state.entries.keys().copied().collect();
		for tenant_id in tenants {
			let Some(entry) = state.entries.get_mut(&tenant_id) else {
				continue;
			};
			let running = entry.is_running(self.probe.as_ref());

			if entry.is_deleted() {
				if running {
					awaiting_termination.insert(tenant_id);
					continue;
				}
				if let Some(instance) = entry.take_instance() {
					state.ports.reclaim(&instance.endpoint);
				}
				pending_removal.insert(tenant_id);
				*changed = true;
				return Ok(Sweep::Restart);
			}

			if running {
				continue;
			}

			if let Some(stale) = entry.take_instance() {
				tracing::info!(%tenant_id, pid = stale.pid, endpoint = %stale.endpoint, "reclaiming ports of exited worker");
				state.ports.reclaim(&stale.endpoint);
				*changed = true;
			}

			let Some(endpoint) = state.ports.allocate_endpoint() else {
				return Err(LauncherError::PortsExhausted {
					tenant_id,
					free: state.ports.len(),
				});
			};

			tracing::info!(%tenant_id, %endpoint, "spawning worker unit");
			let spawned = match self.spawner.spawn(tenant_id, endpoint).await {
				Ok(spawned) => spawned,
				Err(source) => {
					state.ports.reclaim(&endpoint);
					return Err(LauncherError::Spawn { tenant_id, source });
				}
			};

			if let Some(entry) = state.entries.get_mut(&tenant_id) {
				entry.install(Instance {
					pid: spawned.pid,
					endpoint,
				});
			}
			*changed = true;
		}
		Ok(Sweep::Settled)
	}
}
