use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use warden_proto::{Endpoint, Port, READY_LINE, TenantId};

use crate::error::UnitError;
use crate::handler::{Role, UnitHandler};
use crate::report::DeletionReporter;

/// Startup parameters for one worker unit.
#[derive(Debug, Clone)]
pub struct UnitConfig {
	/// Tenant this unit serves.
	pub tenant_id: TenantId,
	/// Ports assigned by the launcher.
	pub endpoint: Endpoint,
	/// Address the three listeners bind to.
	pub bind_ip: IpAddr,
	/// Bound on waiting for in-flight connections at shutdown.
	pub drain_timeout: Duration,
}

impl UnitConfig {
	/// Loopback listeners with a 10 second drain.
	#[must_use]
	pub fn new(tenant_id: TenantId, endpoint: Endpoint) -> Self {
		Self {
			tenant_id,
			endpoint,
			bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
			drain_timeout: Duration::from_secs(10),
		}
	}
}

/// A worker unit whose three listeners are bound and ready to accept.
#[derive(Debug)]
pub struct BoundUnit {
	tenant_id: TenantId,
	setup: TcpListener,
	delete: TcpListener,
	user: TcpListener,
	drain_timeout: Duration,
}

impl BoundUnit {
	/// Binds the setup, delete and user listeners.
	///
	/// # Errors
	///
	/// Returns [`UnitError::Bind`] naming the first endpoint that could not be bound.
	pub async fn bind(config: &UnitConfig) -> Result<Self, UnitError> {
		let bind = |role: Role, port: Port| async move {
			TcpListener::bind(SocketAddr::new(config.bind_ip, port))
				.await
				.map_err(|source| UnitError::Bind { role, port, source })
		};
		let setup = bind(Role::Setup, config.endpoint.setup_port).await?;
		let delete = bind(Role::Delete, config.endpoint.delete_port).await?;
		let user = bind(Role::User, config.endpoint.user_port).await?;
		tracing::info!(tenant_id = %config.tenant_id, endpoint = %config.endpoint, "worker unit listening");

		Ok(Self {
			tenant_id: config.tenant_id,
			setup,
			delete,
			user,
			drain_timeout: config.drain_timeout,
		})
	}

	/// Ports actually bound, which differ from the requested ones only when 0 was asked for.
	///
	/// # Errors
	///
	/// Fails if a listener's local address cannot be read.
	pub fn local_endpoint(&self) -> std::io::Result<Endpoint> {
		Ok(Endpoint {
			setup_port: self.setup.local_addr()?.port(),
			delete_port: self.delete.local_addr()?.port(),
			user_port: self.user.local_addr()?.port(),
		})
	}

	/// Serves all three endpoints until `shutdown` is cancelled or the tenant is deleted.
	///
	/// On shutdown the listeners are closed first, then in-flight connections get up to
	/// the drain timeout to finish.
	pub async fn run(self, handler: Arc<dyn UnitHandler>, reporter: Arc<dyn DeletionReporter>, shutdown: CancellationToken) {
		let Self {
			tenant_id,
			setup,
			delete,
			user,
			drain_timeout,
		} = self;
		let connections = TaskTracker::new();

		loop {
			tokio::select! {
				() = shutdown.cancelled() => break,
				res = setup.accept() => {
					if let Some(stream) = accepted(Role::Setup, res) {
						let handler = handler.clone();
						connections.spawn(async move { handler.setup(tenant_id, stream).await });
					}
				}
				res = user.accept() => {
					if let Some(stream) = accepted(Role::User, res) {
						let handler = handler.clone();
						connections.spawn(async move { handler.user(tenant_id, stream).await });
					}
				}
				res = delete.accept() => {
					if let Some(stream) = accepted(Role::Delete, res) {
						connections.spawn(handle_delete(tenant_id, stream, reporter.clone(), shutdown.clone()));
					}
				}
			}
		}

		drop((setup, delete, user));
		connections.close();
		tracing::info!(%tenant_id, in_flight = connections.len(), "worker unit draining");
		if tokio::time::timeout(drain_timeout, connections.wait()).await.is_err() {
			tracing::warn!(%tenant_id, remaining = connections.len(), "drain timed out, abandoning connections");
		}
		tracing::info!(%tenant_id, "worker unit stopped");
	}
}

fn accepted(role: Role, res: std::io::Result<(TcpStream, SocketAddr)>) -> Option<TcpStream> {
	match res {
		Ok((stream, peer)) => {
			tracing::debug!(%role, %peer, "accepted connection");
			Some(stream)
		}
		Err(e) => {
			tracing::error!(%role, error = %e, "failed to accept connection");
			None
		}
	}
}

/// Reports deletion, answers the caller, then requests shutdown.
///
/// If the report fails the unit keeps running so the caller can retry.
async fn handle_delete(tenant_id: TenantId, mut stream: TcpStream, reporter: Arc<dyn DeletionReporter>, shutdown: CancellationToken) {
	match reporter.report_deleted(tenant_id).await {
		Ok(()) => {
			tracing::info!(%tenant_id, "tenant deleted, shutting down");
			let _ = stream.write_all(b"deleted\n").await;
			let _ = stream.shutdown().await;
			shutdown.cancel();
		}
		Err(source) => {
			let err = UnitError::Report { tenant_id, source };
			tracing::error!(error = %err, "deletion not recorded, staying up");
			let _ = stream.write_all(b"error\n").await;
			let _ = stream.shutdown().await;
		}
	}
}

/// Writes the readiness line that completes the launcher's spawn handshake.
///
/// # Errors
///
/// Returns [`UnitError::Announce`] if the line cannot be written.
pub async fn announce_ready<W>(writer: &mut W) -> Result<(), UnitError>
where
	W: AsyncWrite + Unpin,
{
	writer.write_all(format!("{READY_LINE}\n").as_bytes()).await.map_err(UnitError::Announce)?;
	writer.flush().await.map_err(UnitError::Announce)
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeSet;

	use async_trait::async_trait;
	use parking_lot::Mutex;
	use pretty_assertions::assert_eq;
	use tokio::io::AsyncReadExt;
	use warden_control::ControlError;
	use warden_proto::ErrorCode;
	use warden_registry::test_helpers::Harness;

	use super::*;
	use crate::handler::AckHandler;
	use crate::report::SocketReporter;

	#[derive(Default)]
	struct RecordingReporter {
		reported: Mutex<Vec<TenantId>>,
		fail: bool,
	}

	#[async_trait]
	impl DeletionReporter for RecordingReporter {
		async fn report_deleted(&self, tenant_id: TenantId) -> Result<(), ControlError> {
			if self.fail {
				return Err(ControlError::Remote(ErrorCode::Internal));
			}
			self.reported.lock().push(tenant_id);
			Ok(())
		}
	}

	async fn bind_any(tenant_id: TenantId) -> (BoundUnit, Endpoint) {
		let any = Endpoint {
			setup_port: 0,
			delete_port: 0,
			user_port: 0,
		};
		let unit = BoundUnit::bind(&UnitConfig::new(tenant_id, any)).await.unwrap();
		let endpoint = unit.local_endpoint().unwrap();
		(unit, endpoint)
	}

	async fn request(port: Port) -> String {
		let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();
		let mut reply = String::new();
		stream.read_to_string(&mut reply).await.unwrap();
		reply
	}

	#[tokio::test(flavor = "current_thread")]
	async fn listeners_get_distinct_ports() {
		let (_unit, endpoint) = bind_any(TenantId(1)).await;
		let ports: BTreeSet<_> = endpoint.ports().into_iter().collect();
		assert_eq!(ports.len(), 3);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn setup_and_user_are_acknowledged() {
		let (unit, endpoint) = bind_any(TenantId(4)).await;
		let shutdown = CancellationToken::new();
		let reporter = Arc::new(RecordingReporter::default());
		let running = tokio::spawn(unit.run(Arc::new(AckHandler), reporter, shutdown.clone()));

		assert_eq!(request(endpoint.setup_port).await, "tenant 4 setup ok\n");
		assert_eq!(request(endpoint.user_port).await, "tenant 4 user ok\n");

		shutdown.cancel();
		running.await.unwrap();
	}

	#[tokio::test(flavor = "current_thread")]
	async fn delete_reports_then_shuts_down() {
		let (unit, endpoint) = bind_any(TenantId(6)).await;
		let shutdown = CancellationToken::new();
		let reporter = Arc::new(RecordingReporter::default());
		let running = tokio::spawn(unit.run(Arc::new(AckHandler), reporter.clone(), shutdown.clone()));

		assert_eq!(request(endpoint.delete_port).await, "deleted\n");
		tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
		assert!(shutdown.is_cancelled());
		assert_eq!(*reporter.reported.lock(), vec![TenantId(6)]);
		assert!(TcpStream::connect((Ipv4Addr::LOCALHOST, endpoint.user_port)).await.is_err());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn failed_report_keeps_unit_running() {
		let (unit, endpoint) = bind_any(TenantId(6)).await;
		let shutdown = CancellationToken::new();
		let reporter = Arc::new(RecordingReporter {
			fail: true,
			..RecordingReporter::default()
		});
		let running = tokio::spawn(unit.run(Arc::new(AckHandler), reporter, shutdown.clone()));

		assert_eq!(request(endpoint.delete_port).await, "error\n");
		assert!(!shutdown.is_cancelled());
		assert_eq!(request(endpoint.user_port).await, "tenant 6 user ok\n");

		shutdown.cancel();
		running.await.unwrap();
	}

	#[tokio::test(flavor = "current_thread")]
	async fn delete_marks_tenant_in_launcher_registry() {
		let dir = tempfile::tempdir().unwrap();
		let socket = dir.path().join("warden.sock");
		let harness = Harness::new();
		harness.spawner.set_next_pid(std::process::id());
		harness.registry.get_or_create_placeholder(TenantId(9)).await;
		harness.registry.reconcile().await;
		let control_shutdown = CancellationToken::new();
		let server = tokio::spawn(warden_control::serve(socket.clone(), harness.registry.clone(), control_shutdown.clone()));
		while !socket.exists() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}

		let (unit, endpoint) = bind_any(TenantId(9)).await;
		let running = tokio::spawn(unit.run(Arc::new(AckHandler), Arc::new(SocketReporter::new(&socket)), CancellationToken::new()));

		assert_eq!(request(endpoint.delete_port).await, "deleted\n");
		tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
		let status = harness.registry.status().await;
		assert!(status.entries[0].deleted);

		control_shutdown.cancel();
		server.await.unwrap().unwrap();
	}

	#[tokio::test(flavor = "current_thread")]
	async fn delete_for_a_tenant_owned_by_another_process_keeps_running() {
		let dir = tempfile::tempdir().unwrap();
		let socket = dir.path().join("warden.sock");
		let harness = Harness::new();
		harness.registry.get_or_create_placeholder(TenantId(9)).await;
		harness.registry.reconcile().await;
		let control_shutdown = CancellationToken::new();
		let server = tokio::spawn(warden_control::serve(socket.clone(), harness.registry.clone(), control_shutdown.clone()));
		while !socket.exists() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}

		let (unit, endpoint) = bind_any(TenantId(9)).await;
		let shutdown = CancellationToken::new();
		let running = tokio::spawn(unit.run(Arc::new(AckHandler), Arc::new(SocketReporter::new(&socket)), shutdown.clone()));

		assert_eq!(request(endpoint.delete_port).await, "error\n");
		assert!(!shutdown.is_cancelled());
		assert!(!harness.registry.status().await.entries[0].deleted);

		shutdown.cancel();
		running.await.unwrap();
		control_shutdown.cancel();
		server.await.unwrap().unwrap();
	}

	#[tokio::test(flavor = "current_thread")]
	async fn occupied_port_names_the_failing_endpoint() {
		let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
		let port = taken.local_addr().unwrap().port();
		let config = UnitConfig::new(
			TenantId(1),
			Endpoint {
				setup_port: 0,
				delete_port: port,
				user_port: 0,
			},
		);

		let err = BoundUnit::bind(&config).await.unwrap_err();
		assert!(matches!(err, UnitError::Bind { role: Role::Delete, port: p, .. } if p == port));
	}

	#[tokio::test(flavor = "current_thread")]
	async fn ready_line_is_written_and_flushed() {
		let mut out = Vec::new();
		announce_ready(&mut out).await.unwrap();
		assert_eq!(String::from_utf8(out).unwrap(), format!("{READY_LINE}\n"));
	}
}
