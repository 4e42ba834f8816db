use thiserror::Error;
use warden_proto::{ErrorCode, TenantId};

/// Caller-visible failures of [`Registry::resolve`](crate::Registry::resolve).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
	/// The tenant reported its own deletion; it will not be respawned.
	#[error("worker for tenant has been deleted")]
	WorkerDeleted,
	/// No reconciliation pass completed within `launcher_wait_secs`.
	#[error("timed out waiting for the launcher")]
	LauncherTimeout,
	/// A pass completed but the tenant has no live instance.
	#[error("launcher failed to spawn a worker process")]
	LauncherFailedToSpawn,
}

impl From<ResolveError> for ErrorCode {
	fn from(err: ResolveError) -> Self {
		match err {
			ResolveError::WorkerDeleted => Self::WorkerDeleted,
			ResolveError::LauncherTimeout => Self::LauncherTimeout,
			ResolveError::LauncherFailedToSpawn => Self::LauncherFailedToSpawn,
		}
	}
}

/// Refusals of [`Registry::report_deleted`](crate::Registry::report_deleted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReportError {
	/// No row exists for the tenant, so no process can own it.
	#[error("deletion reported for unknown tenant {tenant_id}")]
	UnknownTenant {
		/// Tenant named in the report.
		tenant_id: TenantId,
	},
	/// The reporting process is not the tenant's recorded worker unit.
	#[error("process {reporter} does not own tenant {tenant_id}")]
	NotOwner {
		/// Tenant named in the report.
		tenant_id: TenantId,
		/// Pid of the reporting process.
		reporter: u32,
	},
}

impl From<ReportError> for ErrorCode {
	fn from(_: ReportError) -> Self {
		Self::InvalidRequest
	}
}

/// Failures starting a worker unit process.
#[derive(Debug, Error)]
pub enum SpawnError {
	/// The OS refused to start the process.
	#[error("failed to start worker unit: {0}")]
	Io(#[from] std::io::Error),
	/// The process started but exited before its pid could be read.
	#[error("worker unit exited before reporting a pid")]
	MissingPid,
}

/// Fatal reconciliation failures. Any of these terminates the launcher loop.
#[derive(Debug, Error)]
pub enum LauncherError {
	/// Fewer than three ports were free when a tenant needed an instance.
	#[error("port pool exhausted spawning tenant {tenant_id}: {free} ports free")]
	PortsExhausted {
		/// Tenant that could not be placed.
		tenant_id: TenantId,
		/// Ports left in the pool.
		free: usize,
	},
	/// The worker unit process could not be started.
	#[error("failed to spawn worker for tenant {tenant_id}")]
	Spawn {
		/// Tenant whose worker failed to start.
		tenant_id: TenantId,
		/// Underlying spawn failure.
		#[source]
		source: SpawnError,
	},
}
