use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, Notify, watch};
use warden_proto::{Endpoint, EntrySnapshot, RegistryStatus, TenantId};

use crate::config::{ConfigError, RegistryConfig};
use crate::entry::Entry;
use crate::error::{ReportError, ResolveError};
use crate::ports::PortPool;
use crate::probe::ProcessProbe;
use crate::spawner::WorkerSpawner;

/// Everything guarded by the changes lock.
pub(crate) struct TableState {
	pub(crate) entries: BTreeMap<TenantId, Entry>,
	pub(crate) ports: PortPool,
	pub(crate) dirty: bool,
}

/// The worker registry: tenant table, port pool, dirty flag and update notification.
///
/// Shared as `Arc<Registry>` between the launcher loop, the control socket server and
/// any in-process resolvers.
pub struct Registry {
	pub(crate) config: RegistryConfig,
	state: Mutex<TableState>,
	/// Generation counter bumped by every completed pass that changed something.
	updated: watch::Sender<u64>,
	/// Wakes the launcher's idle wait when dirty is raised.
	dirty_signal: Notify,
	pub(crate) probe: Arc<dyn ProcessProbe>,
	pub(crate) spawner: Arc<dyn WorkerSpawner>,
}

impl Registry {
	/// Creates an empty registry with every configured port free.
	///
	/// # Errors
	///
	/// Returns [`ConfigError`] if the configuration fails validation.
	pub fn new(config: RegistryConfig, probe: Arc<dyn ProcessProbe>, spawner: Arc<dyn WorkerSpawner>) -> Result<Arc<Self>, ConfigError> {
		config.validate()?;
		let (updated, _) = watch::channel(0);
		Ok(Arc::new(Self {
			state: Mutex::new(TableState {
				entries: BTreeMap::new(),
				ports: PortPool::new(config.port_start, config.port_end),
				dirty: false,
			}),
			config,
			updated,
			dirty_signal: Notify::new(),
			probe,
			spawner,
		}))
	}

	/// Configuration this registry was built with.
	#[must_use]
	pub fn config(&self) -> &RegistryConfig {
		&self.config
	}

	pub(crate) async fn lock(&self) -> MutexGuard<'_, TableState> {
		self.state.lock().await
	}

	/// Sets the dirty flag and wakes the launcher. Caller holds the changes lock.
	pub(crate) fn raise_dirty(&self, state: &mut TableState) {
		state.dirty = true;
		self.dirty_signal.notify_one();
	}

	/// Wakes every resolver blocked on the update notification. Caller holds the changes lock.
	pub(crate) fn publish_update(&self) {
		self.updated.send_modify(|generation| *generation = generation.wrapping_add(1));
	}

	/// Looks up `tenant_id`, inserting an empty placeholder and raising dirty if absent.
	///
	/// Returns the row as it is after the call and whether it was created.
	pub async fn get_or_create_placeholder(&self, tenant_id: TenantId) -> (EntrySnapshot, bool) {
		let mut state = self.lock().await;
		if let Some(entry) = state.entries.get(&tenant_id) {
			return (entry.snapshot(tenant_id), false);
		}
		tracing::debug!(%tenant_id, "inserting placeholder");
		let entry = Entry::default();
		let snapshot = entry.snapshot(tenant_id);
		state.entries.insert(tenant_id, entry);
		self.raise_dirty(&mut state);
		(snapshot, true)
	}

	/// Resolves a tenant to its worker unit endpoint, asking the launcher to spawn one if needed.
	///
	/// Blocks for at most `launcher_wait_secs` on the launcher. A timed-out call leaves
	/// its placeholder in place for a later pass.
	///
	/// # Errors
	///
	/// - [`ResolveError::WorkerDeleted`] if the tenant reported its own deletion.
	/// - [`ResolveError::LauncherTimeout`] if no pass completed within the wait.
	/// - [`ResolveError::LauncherFailedToSpawn`] if a pass completed without a live instance.
	pub async fn resolve(&self, tenant_id: TenantId) -> Result<Endpoint, ResolveError> {
		let mut updated = {
			let mut guard = self.lock().await;
			let state = &mut *guard;
			let entry = state.entries.entry(tenant_id).or_insert_with(|| {
				tracing::debug!(%tenant_id, "inserting placeholder");
				Entry::default()
			});

			if entry.is_deleted() {
				return Err(ResolveError::WorkerDeleted);
			}
			if let Some(instance) = entry.instance().copied() {
				if self.probe.is_alive(instance.pid) {
					return Ok(instance.endpoint);
				}
				tracing::info!(%tenant_id, pid = instance.pid, endpoint = %instance.endpoint, "recorded worker is gone, requesting respawn");
				entry.take_instance();
				state.ports.reclaim(&instance.endpoint);
			}
			self.raise_dirty(state);
			self.updated.subscribe()
		};

		match tokio::time::timeout(self.config.launcher_wait(), updated.changed()).await {
			Ok(Ok(())) => {}
			Ok(Err(_)) => return Err(ResolveError::LauncherFailedToSpawn),
			Err(_) => {
				tracing::warn!(%tenant_id, wait_secs = self.config.launcher_wait_secs, "timed out waiting for launcher");
				return Err(ResolveError::LauncherTimeout);
			}
		}

		let state = self.lock().await;
		match state.entries.get(&tenant_id) {
			Some(entry) if !entry.is_deleted() && entry.is_running(self.probe.as_ref()) => entry
				.instance()
				.map(|instance| instance.endpoint)
				.ok_or(ResolveError::LauncherFailedToSpawn),
			_ => Err(ResolveError::LauncherFailedToSpawn),
		}
	}

	/// Records that `tenant_id` has been deleted. Idempotent.
	///
	/// Returns true if this call changed the row. Does not wait for the worker to exit.
	pub async fn mark_deleted(&self, tenant_id: TenantId) -> bool {
		let mut guard = self.lock().await;
		let state = &mut *guard;
		match state.entries.get_mut(&tenant_id) {
			Some(entry) => {
				if !entry.mark_deleted() {
					tracing::debug!(%tenant_id, "tenant already marked deleted");
					return false;
				}
				tracing::info!(%tenant_id, "tenant marked deleted");
				self.raise_dirty(state);
				true
			}
			None => {
				tracing::warn!(%tenant_id, "deletion reported for unknown tenant, recording tombstone");
				state.entries.insert(tenant_id, Entry::tombstone());
				true
			}
		}
	}

	/// Self-report arriving from the process `reporter`.
	///
	/// Marks the tenant deleted only when `reporter` is the pid of its recorded instance.
	/// A repeat report for a tenant already marked deleted is accepted without change.
	/// Returns true if this call changed the row.
	///
	/// # Errors
	///
	/// - [`ReportError::UnknownTenant`] if the tenant has no row.
	/// - [`ReportError::NotOwner`] if `reporter` is not the tenant's worker unit.
	pub async fn report_deleted(&self, tenant_id: TenantId, reporter: u32) -> Result<bool, ReportError> {
		let mut guard = self.lock().await;
		let state = &mut *guard;
		let Some(entry) = state.entries.get_mut(&tenant_id) else {
			tracing::warn!(%tenant_id, reporter, "deletion reported for unknown tenant");
			return Err(ReportError::UnknownTenant { tenant_id });
		};
		if entry.is_deleted() {
			tracing::debug!(%tenant_id, reporter, "tenant already marked deleted");
			return Ok(false);
		}
		let owner = entry.instance().map(|instance| instance.pid);
		if owner != Some(reporter) {
			tracing::warn!(%tenant_id, reporter, ?owner, "deletion reported by a process that does not own the tenant");
			return Err(ReportError::NotOwner { tenant_id, reporter });
		}
		entry.mark_deleted();
		tracing::info!(%tenant_id, pid = reporter, "worker unit reported its own deletion");
		self.raise_dirty(state);
		Ok(true)
	}

	/// Read-only view of the whole table.
	pub async fn status(&self) -> RegistryStatus {
		let state = self.lock().await;
		let (port_start, port_end) = state.ports.range();
		RegistryStatus {
			port_start,
			port_end,
			free_ports: state.ports.len(),
			dirty: state.dirty,
			entries: state.entries.iter().map(|(id, entry)| entry.snapshot(*id)).collect(),
		}
	}

	/// Sleeps until dirty is raised or `idle` elapses.
	pub async fn wait_for_changes(&self, idle: Duration) {
		tokio::select! {
			() = self.dirty_signal.notified() => {}
			() = tokio::time::sleep(idle) => {}
		}
	}
}

impl std::fmt::Debug for Registry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Registry").field("config", &self.config).finish_non_exhaustive()
	}
}
