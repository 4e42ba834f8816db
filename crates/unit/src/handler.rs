use std::fmt;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use warden_proto::TenantId;

/// The three endpoints of a worker unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
	/// Tenant version provisioning.
	Setup,
	/// Tenant teardown.
	Delete,
	/// Tenant traffic.
	User,
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Setup => "setup",
			Self::Delete => "delete",
			Self::User => "user",
		})
	}
}

/// Tenant-specific request handling for the setup and user endpoints.
///
/// Each accepted connection is handed over whole; the handler owns it until it returns.
#[async_trait]
pub trait UnitHandler: Send + Sync + 'static {
	/// Serves one connection on the setup endpoint.
	async fn setup(&self, tenant_id: TenantId, stream: TcpStream);

	/// Serves one connection on the user endpoint.
	async fn user(&self, tenant_id: TenantId, stream: TcpStream);
}

/// Handler that acknowledges each connection with one line and closes it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckHandler;

impl AckHandler {
	async fn ack(role: Role, tenant_id: TenantId, mut stream: TcpStream) {
		let line = format!("tenant {tenant_id} {role} ok\n");
		if let Err(e) = stream.write_all(line.as_bytes()).await {
			tracing::debug!(%tenant_id, %role, error = %e, "failed to acknowledge connection");
			return;
		}
		let _ = stream.shutdown().await;
	}
}

#[async_trait]
impl UnitHandler for AckHandler {
	async fn setup(&self, tenant_id: TenantId, stream: TcpStream) {
		Self::ack(Role::Setup, tenant_id, stream).await;
	}

	async fn user(&self, tenant_id: TenantId, stream: TcpStream) {
		Self::ack(Role::User, tenant_id, stream).await;
	}
}
