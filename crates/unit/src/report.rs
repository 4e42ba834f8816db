use std::path::PathBuf;

use async_trait::async_trait;
use warden_control::{ControlClient, ControlError};
use warden_proto::TenantId;

/// Delivers the unit's deletion self-report to the launcher.
#[async_trait]
pub trait DeletionReporter: Send + Sync + 'static {
	/// Records that `tenant_id` has been deleted. Must be idempotent.
	async fn report_deleted(&self, tenant_id: TenantId) -> Result<(), ControlError>;
}

/// Reporter that sends `MarkDeleted` over the launcher's control socket.
#[derive(Debug, Clone)]
pub struct SocketReporter {
	socket: PathBuf,
}

impl SocketReporter {
	/// Reports through the control socket at `socket`.
	pub fn new(socket: impl Into<PathBuf>) -> Self {
		Self { socket: socket.into() }
	}
}

#[async_trait]
impl DeletionReporter for SocketReporter {
	async fn report_deleted(&self, tenant_id: TenantId) -> Result<(), ControlError> {
		let mut client = ControlClient::connect(&self.socket).await?;
		client.mark_deleted(tenant_id).await
	}
}
