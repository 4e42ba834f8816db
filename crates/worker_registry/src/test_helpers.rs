//! In-memory fakes for exercising the registry without real processes.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use warden_proto::{Endpoint, TenantId};

use crate::config::RegistryConfig;
use crate::error::SpawnError;
use crate::probe::ProcessProbe;
use crate::registry::Registry;
use crate::spawner::{SpawnedWorker, WorkerSpawner};

/// Probe where every pid is alive until [`FakeProbe::kill`] is called on it.
#[derive(Debug, Default)]
pub struct FakeProbe {
	dead: Mutex<HashSet<u32>>,
	reaps: AtomicUsize,
}

impl FakeProbe {
	/// Creates a probe with no dead pids.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Marks `pid` as exited.
	pub fn kill(&self, pid: u32) {
		self.dead.lock().insert(pid);
	}

	/// Number of times the registry reaped children.
	#[must_use]
	pub fn reap_count(&self) -> usize {
		self.reaps.load(Ordering::SeqCst)
	}
}

impl ProcessProbe for FakeProbe {
	fn reap_children(&self) -> usize {
		self.reaps.fetch_add(1, Ordering::SeqCst);
		0
	}

	fn is_alive(&self, pid: u32) -> bool {
		pid != 0 && !self.dead.lock().contains(&pid)
	}
}

/// One recorded call to [`FakeSpawner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnRecord {
	/// Tenant that was spawned.
	pub tenant_id: TenantId,
	/// Ports it was given.
	pub endpoint: Endpoint,
	/// Pid handed back.
	pub pid: u32,
}

/// Spawner that hands out increasing fake pids starting at 1000.
#[derive(Debug)]
pub struct FakeSpawner {
	next_pid: AtomicU32,
	spawns: Mutex<Vec<SpawnRecord>>,
	fail_next: AtomicBool,
	ready: AtomicBool,
}

impl Default for FakeSpawner {
	fn default() -> Self {
		Self::new()
	}
}

impl FakeSpawner {
	/// Creates a spawner whose units report ready.
	#[must_use]
	pub fn new() -> Self {
		Self {
			next_pid: AtomicU32::new(1000),
			spawns: Mutex::new(Vec::new()),
			fail_next: AtomicBool::new(false),
			ready: AtomicBool::new(true),
		}
	}

	/// Makes the next spawn hand out `pid`, counting up from there.
	pub fn set_next_pid(&self, pid: u32) {
		self.next_pid.store(pid, Ordering::SeqCst);
	}

	/// Makes the next spawn fail with an I/O error.
	pub fn fail_next(&self) {
		self.fail_next.store(true, Ordering::SeqCst);
	}

	/// Controls whether spawned units complete their handshake.
	pub fn set_ready(&self, ready: bool) {
		self.ready.store(ready, Ordering::SeqCst);
	}

	/// Every successful spawn so far, in order.
	#[must_use]
	pub fn spawns(&self) -> Vec<SpawnRecord> {
		self.spawns.lock().clone()
	}
}

#[async_trait]
impl WorkerSpawner for FakeSpawner {
	async fn spawn(&self, tenant_id: TenantId, endpoint: Endpoint) -> Result<SpawnedWorker, SpawnError> {
		if self.fail_next.swap(false, Ordering::SeqCst) {
			return Err(SpawnError::Io(std::io::Error::other("injected spawn failure")));
		}
		let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
		self.spawns.lock().push(SpawnRecord { tenant_id, endpoint, pid });
		Ok(SpawnedWorker {
			pid,
			ready: self.ready.load(Ordering::SeqCst),
		})
	}
}

/// A registry wired to [`FakeProbe`] and [`FakeSpawner`].
pub struct Harness {
	/// Registry under test.
	pub registry: Arc<Registry>,
	/// Liveness fake.
	pub probe: Arc<FakeProbe>,
	/// Spawn fake.
	pub spawner: Arc<FakeSpawner>,
}

impl Harness {
	/// Port range `[9000, 9008]` with short termination polling.
	#[must_use]
	pub fn new() -> Self {
		Self::with_config(Self::config())
	}

	/// Default test configuration.
	#[must_use]
	pub fn config() -> RegistryConfig {
		RegistryConfig {
			launcher_wait_secs: 5,
			worker_process_wait_secs: 1,
			port_start: 9000,
			port_end: 9008,
			termination_poll_ms: 10,
			termination_wait_secs: 1,
			idle_poll_ms: 1000,
		}
	}

	/// Builds a harness around `config`.
	///
	/// # Panics
	///
	/// Panics if `config` is invalid.
	#[must_use]
	pub fn with_config(config: RegistryConfig) -> Self {
		let probe = Arc::new(FakeProbe::new());
		let spawner = Arc::new(FakeSpawner::new());
		let registry = Registry::new(config, probe.clone(), spawner.clone()).unwrap_or_else(|err| panic!("invalid test config: {err}"));
		Self { registry, probe, spawner }
	}

	/// Yields until some caller has raised the dirty flag.
	pub async fn wait_until_dirty(&self) {
		while !self.registry.lock().await.dirty {
			tokio::task::yield_now().await;
		}
	}

	/// Checks that every port in range is free or held by exactly one recorded instance.
	///
	/// # Panics
	///
	/// Panics describing the first violation.
	pub async fn assert_ports_conserved(&self) {
		let state = self.registry.lock().await;
		let (start, end) = state.ports.range();
		let mut held = HashSet::new();
		for (tenant_id, entry) in &state.entries {
			let Some(instance) = entry.instance() else {
				continue;
			};
			for port in instance.endpoint.ports() {
				assert!(held.insert(port), "port {port} held twice (last by tenant {tenant_id})");
				assert!(!state.ports.contains(port), "port {port} of tenant {tenant_id} is also free");
			}
		}
		for port in start..=end {
			assert!(
				held.contains(&port) ^ state.ports.contains(port),
				"port {port} is neither free nor held"
			);
		}
	}
}

impl Default for Harness {
	fn default() -> Self {
		Self::new()
	}
}
