//! Registry timing and port range configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_proto::Port;

/// Number of ports assigned to one worker unit: setup, delete, user.
pub(crate) const PORTS_PER_WORKER: usize = 3;

/// Errors from validating a [`RegistryConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
	/// The range end precedes its start.
	#[error("invalid port range: port_start {start} is greater than port_end {end}")]
	InvalidPortRange {
		/// Configured `port_start`.
		start: Port,
		/// Configured `port_end`.
		end: Port,
	},
	/// The range cannot hold even one worker unit.
	#[error("port range holds {available} ports, at least 3 are required")]
	TooFewPorts {
		/// Ports in the configured range.
		available: usize,
	},
	/// A wait timeout or poll interval is zero.
	#[error("{0} must be greater than zero")]
	ZeroTimeout(&'static str),
}

/// Configuration for the registry and its launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
	/// How long a resolver waits for the launcher to publish an update.
	pub launcher_wait_secs: u16,
	/// How long the launcher waits for a new worker unit to report readiness.
	pub worker_process_wait_secs: u16,
	/// First port handed to worker units.
	pub port_start: Port,
	/// Last port handed to worker units (inclusive).
	pub port_end: Port,
	/// Sleep between sweeps while deleted workers are still running.
	pub termination_poll_ms: u64,
	/// Upper bound on how long one pass waits for deleted workers to exit.
	pub termination_wait_secs: u16,
	/// Launcher back-off between idle passes.
	pub idle_poll_ms: u64,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			launcher_wait_secs: 10,
			worker_process_wait_secs: 10,
			port_start: 9000,
			port_end: 9299,
			termination_poll_ms: 1000,
			termination_wait_secs: 30,
			idle_poll_ms: 1000,
		}
	}
}

impl RegistryConfig {
	/// Checks the port range and timeouts.
	///
	/// # Errors
	///
	/// Returns the first problem found.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.port_start > self.port_end {
			return Err(ConfigError::InvalidPortRange {
				start: self.port_start,
				end: self.port_end,
			});
		}
		let available = self.port_count();
		if available < PORTS_PER_WORKER {
			return Err(ConfigError::TooFewPorts { available });
		}
		if self.launcher_wait_secs == 0 {
			return Err(ConfigError::ZeroTimeout("launcher_wait_secs"));
		}
		if self.worker_process_wait_secs == 0 {
			return Err(ConfigError::ZeroTimeout("worker_process_wait_secs"));
		}
		if self.termination_wait_secs == 0 {
			return Err(ConfigError::ZeroTimeout("termination_wait_secs"));
		}
		if self.termination_poll_ms == 0 {
			return Err(ConfigError::ZeroTimeout("termination_poll_ms"));
		}
		if self.idle_poll_ms == 0 {
			return Err(ConfigError::ZeroTimeout("idle_poll_ms"));
		}
		Ok(())
	}

	/// Ports in the configured range.
	#[must_use]
	pub fn port_count(&self) -> usize {
		if self.port_start > self.port_end {
			return 0;
		}
		usize::from(self.port_end - self.port_start) + 1
	}

	/// Number of worker units the range can hold at once.
	#[must_use]
	pub fn capacity(&self) -> usize {
		self.port_count() / PORTS_PER_WORKER
	}

	pub(crate) fn launcher_wait(&self) -> Duration {
		Duration::from_secs(self.launcher_wait_secs.into())
	}

	pub(crate) fn termination_poll(&self) -> Duration {
		Duration::from_millis(self.termination_poll_ms)
	}

	pub(crate) fn termination_wait(&self) -> Duration {
		Duration::from_secs(self.termination_wait_secs.into())
	}

	/// Idle back-off for the launcher loop.
	#[must_use]
	pub fn idle_poll(&self) -> Duration {
		Duration::from_millis(self.idle_poll_ms)
	}

	/// Readiness handshake bound for spawned worker units.
	#[must_use]
	pub fn worker_process_wait(&self) -> Duration {
		Duration::from_secs(self.worker_process_wait_secs.into())
	}
}
