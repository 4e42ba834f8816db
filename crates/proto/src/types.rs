//! Wire types for the warden control protocol.
//!
//! Identifiers and endpoint records are shared by the registry, the control socket and
//! the worker unit runtime, so they live here rather than in the registry crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque tenant identifier, stable for the tenant's lifetime.
///
/// `TenantId(0)` is reserved and rejected at the control socket boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(pub u64);

impl TenantId {
	/// Returns true for identifiers a caller may legitimately resolve.
	#[must_use]
	pub const fn is_valid(self) -> bool {
		self.0 != 0
	}
}

impl fmt::Display for TenantId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// TCP port handed to a worker unit.
pub type Port = u16;

/// The three ports a worker unit listens on, assigned and reclaimed as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
	/// Port serving tenant version provisioning.
	pub setup_port: Port,
	/// Port serving tenant teardown.
	pub delete_port: Port,
	/// Port serving tenant traffic.
	pub user_port: Port,
}

impl Endpoint {
	/// Returns the ports in `{setup, delete, user}` order.
	#[must_use]
	pub const fn ports(&self) -> [Port; 3] {
		[self.setup_port, self.delete_port, self.user_port]
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "setup={} delete={} user={}", self.setup_port, self.delete_port, self.user_port)
	}
}

/// A process believed to run a tenant's worker unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
	/// OS process id of the worker unit.
	pub pid: u32,
	/// Ports the worker unit was started with.
	pub endpoint: Endpoint,
}

/// Read-only view of one registry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
	/// Row key.
	pub tenant_id: TenantId,
	/// One-way deletion flag.
	pub deleted: bool,
	/// Current instance, if one has been recorded.
	pub instance: Option<Instance>,
}

/// Operator view of the whole registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatus {
	/// First port of the configured range.
	pub port_start: Port,
	/// Last port of the configured range (inclusive).
	pub port_end: Port,
	/// Number of ports currently in the free pool.
	pub free_ports: usize,
	/// Whether a reconciliation pass has been requested but not yet run.
	pub dirty: bool,
	/// All rows, ascending by tenant id.
	pub entries: Vec<EntrySnapshot>,
}

/// Unique identifier for requests and responses on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// A request sent to the launcher's control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Correlation id echoed in the response.
	pub id: RequestId,
	/// The request payload.
	pub payload: RequestPayload,
}

/// Control socket operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestPayload {
	/// Connectivity check.
	Ping,
	/// Resolve a tenant to its worker unit endpoint, spawning on demand.
	Resolve {
		/// Tenant to resolve.
		tenant_id: TenantId,
	},
	/// Self-report from a worker unit that its tenant has been deleted.
	MarkDeleted {
		/// The reporting unit's own tenant.
		tenant_id: TenantId,
	},
	/// Snapshot of the registry for operators.
	Status,
}

/// A response from the launcher's control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Id of the request being answered.
	pub request_id: RequestId,
	/// Successful result, absent when `error` is set.
	pub payload: Option<ResponsePayload>,
	/// Failure classification, absent on success.
	pub error: Option<ErrorCode>,
}

impl Response {
	/// Builds a successful response.
	#[must_use]
	pub fn ok(request_id: RequestId, payload: ResponsePayload) -> Self {
		Self {
			request_id,
			payload: Some(payload),
			error: None,
		}
	}

	/// Builds a failed response.
	#[must_use]
	pub fn err(request_id: RequestId, error: ErrorCode) -> Self {
		Self {
			request_id,
			payload: None,
			error: Some(error),
		}
	}
}

/// Successful response payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePayload {
	/// Reply to [`RequestPayload::Ping`].
	Pong,
	/// Resolved endpoint for a tenant.
	Endpoint(Endpoint),
	/// Deletion recorded (idempotent).
	MarkedDeleted,
	/// Registry snapshot.
	Status(RegistryStatus),
}

/// Caller-visible failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum ErrorCode {
	/// The tenant has been marked deleted and must not be respawned.
	#[error("worker has been deleted")]
	WorkerDeleted,
	/// The launcher did not complete a pass within the configured wait.
	#[error("timed out waiting for the launcher")]
	LauncherTimeout,
	/// The launcher ran but no live instance exists for the tenant.
	#[error("launcher failed to spawn a worker process")]
	LauncherFailedToSpawn,
	/// The request was malformed (for example tenant id 0).
	#[error("invalid request")]
	InvalidRequest,
	/// Unspecified launcher error.
	#[error("internal launcher error")]
	Internal,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tenant_zero_is_reserved() {
		assert!(!TenantId(0).is_valid());
		assert!(TenantId(1).is_valid());
	}

	#[test]
	fn endpoint_ports_keep_role_order() {
		let endpoint = Endpoint {
			setup_port: 9000,
			delete_port: 9001,
			user_port: 9002,
		};
		assert_eq!(endpoint.ports(), [9000, 9001, 9002]);
		assert_eq!(endpoint.to_string(), "setup=9000 delete=9001 user=9002");
	}
}
