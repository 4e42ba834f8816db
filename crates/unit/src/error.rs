use thiserror::Error;
use warden_control::ControlError;
use warden_proto::{Port, TenantId};

use crate::handler::Role;

/// Errors from running a worker unit.
#[derive(Debug, Error)]
pub enum UnitError {
	/// One of the three listeners could not be bound.
	#[error("failed to bind {role} endpoint on port {port}")]
	Bind {
		/// Endpoint that failed.
		role: Role,
		/// Requested port.
		port: Port,
		/// Underlying bind failure.
		#[source]
		source: std::io::Error,
	},
	/// The launcher could not be told about the tenant's deletion.
	#[error("failed to report deletion of tenant {tenant_id}")]
	Report {
		/// The unit's tenant.
		tenant_id: TenantId,
		/// Control socket failure.
		#[source]
		source: ControlError,
	},
	/// Writing the readiness line failed.
	#[error("failed to announce readiness: {0}")]
	Announce(#[source] std::io::Error),
}
