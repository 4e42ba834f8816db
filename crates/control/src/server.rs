//! Server side of the control socket.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use warden_proto::{ErrorCode, Request, RequestPayload, Response, ResponsePayload, read_frame, write_frame};
use warden_registry::Registry;

use crate::client::ControlClient;
use crate::error::ControlError;

/// How long to wait for an existing socket to answer a ping before treating it as stale.
const LIVENESS_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Serves the control socket until `shutdown` is cancelled.
///
/// A leftover socket file from a dead launcher is removed before binding. On shutdown the
/// listener stops accepting, in-flight requests are answered, and the socket file is
/// removed.
///
/// # Errors
///
/// Returns [`ControlError::AlreadyRunning`] if another launcher answers on `socket_path`,
/// or [`ControlError::Io`] if the socket cannot be bound.
pub async fn serve(socket_path: impl AsRef<Path>, registry: Arc<Registry>, shutdown: CancellationToken) -> Result<(), ControlError> {
	let path = socket_path.as_ref();
	let listener = bind(path).await?;
	tracing::info!(path = %path.display(), "control socket listening");

	let connections = TaskTracker::new();
	loop {
		tokio::select! {
			() = shutdown.cancelled() => break,
			res = listener.accept() => {
				match res {
					Ok((stream, _addr)) => {
						connections.spawn(handle_connection(stream, registry.clone(), shutdown.clone()));
					}
					Err(e) => {
						tracing::error!(error = %e, "failed to accept control connection");
					}
				}
			}
		}
	}

	drop(listener);
	connections.close();
	connections.wait().await;
	if let Err(e) = tokio::fs::remove_file(path).await {
		tracing::debug!(path = %path.display(), error = %e, "control socket already removed");
	}
	tracing::info!("control socket closed");
	Ok(())
}

/// Binds `path`, refusing if a live launcher already owns it.
async fn bind(path: &Path) -> Result<UnixListener, ControlError> {
	if path.exists() {
		let probe = async {
			let mut client = ControlClient::connect(path).await?;
			client.ping().await?;
			Ok::<(), ControlError>(())
		};
		if let Ok(Ok(())) = tokio::time::timeout(LIVENESS_PROBE_TIMEOUT, probe).await {
			return Err(ControlError::AlreadyRunning(path.to_path_buf()));
		}
		tracing::warn!(path = %path.display(), "removing stale control socket");
		tokio::fs::remove_file(path).await?;
	} else if let Some(parent) = path.parent()
		&& !parent.as_os_str().is_empty()
	{
		tokio::fs::create_dir_all(parent).await?;
	}
	Ok(UnixListener::bind(path)?)
}

/// Answers requests on one connection until the peer closes it or shutdown begins.
pub(crate) async fn handle_connection(stream: UnixStream, registry: Arc<Registry>, shutdown: CancellationToken) {
	let peer_pid = match stream.peer_cred() {
		Ok(cred) => cred.pid().and_then(|pid| u32::try_from(pid).ok()),
		Err(e) => {
			tracing::warn!(error = %e, "cannot read control peer credentials");
			None
		}
	};
	tracing::debug!(?peer_pid, "control connection opened");
	let (mut reader, mut writer) = stream.into_split();

	loop {
		let request: Request = tokio::select! {
			() = shutdown.cancelled() => break,
			res = read_frame::<_, Request>(&mut reader) => match res {
				Ok(request) => request,
				Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
				Err(e) => {
					tracing::warn!(error = %e, "dropping control connection after bad frame");
					break;
				}
			},
		};

		let response = dispatch(&registry, request, peer_pid).await;
		if let Err(e) = write_frame(&mut writer, &response).await {
			tracing::warn!(error = %e, "failed to write control response");
			break;
		}
	}

	tracing::debug!("control connection closed");
}

/// Maps one request onto the registry.
///
/// `peer_pid` is the connecting process. `MarkDeleted` is accepted only from the
/// tenant's own worker unit.
pub(crate) async fn dispatch(registry: &Registry, request: Request, peer_pid: Option<u32>) -> Response {
	let id = request.id;
	match request.payload {
		RequestPayload::Ping => Response::ok(id, ResponsePayload::Pong),
		RequestPayload::Resolve { tenant_id } | RequestPayload::MarkDeleted { tenant_id } if !tenant_id.is_valid() => {
			tracing::warn!(%tenant_id, "rejecting request for reserved tenant id");
			Response::err(id, ErrorCode::InvalidRequest)
		}
		RequestPayload::Resolve { tenant_id } => match registry.resolve(tenant_id).await {
			Ok(endpoint) => Response::ok(id, ResponsePayload::Endpoint(endpoint)),
			Err(e) => {
				tracing::debug!(%tenant_id, error = %e, "resolve failed");
				Response::err(id, e.into())
			}
		},
		RequestPayload::MarkDeleted { tenant_id } => {
			let Some(reporter) = peer_pid else {
				tracing::warn!(%tenant_id, "rejecting deletion report from a peer without a pid");
				return Response::err(id, ErrorCode::InvalidRequest);
			};
			match registry.report_deleted(tenant_id, reporter).await {
				Ok(_) => Response::ok(id, ResponsePayload::MarkedDeleted),
				Err(e) => Response::err(id, e.into()),
			}
		}
		RequestPayload::Status => Response::ok(id, ResponsePayload::Status(registry.status().await)),
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use warden_proto::{Endpoint, TenantId};
	use warden_registry::launcher;
	use warden_registry::test_helpers::Harness;

	use super::*;

	fn connect_pair(registry: Arc<Registry>, shutdown: &CancellationToken) -> ControlClient {
		let (client, server) = UnixStream::pair().unwrap();
		tokio::spawn(handle_connection(server, registry, shutdown.clone()));
		ControlClient::from_stream(client)
	}

	#[tokio::test(flavor = "current_thread")]
	async fn ping_roundtrip() {
		let harness = Harness::new();
		let shutdown = CancellationToken::new();
		let mut client = connect_pair(harness.registry.clone(), &shutdown);

		client.ping().await.unwrap();
		client.ping().await.unwrap();
	}

	#[tokio::test(flavor = "current_thread")]
	async fn resolve_is_served_by_the_launcher() {
		let harness = Harness::new();
		let shutdown = CancellationToken::new();
		tokio::spawn(launcher::run(harness.registry.clone(), shutdown.clone()));
		let mut client = connect_pair(harness.registry.clone(), &shutdown);

		let endpoint = client.resolve(TenantId(5)).await.unwrap();
		assert_eq!(
			endpoint,
			Endpoint {
				setup_port: 9000,
				delete_port: 9001,
				user_port: 9002,
			}
		);
		assert_eq!(client.resolve(TenantId(5)).await.unwrap(), endpoint);
		shutdown.cancel();
	}

	#[tokio::test(flavor = "current_thread")]
	async fn reserved_tenant_is_rejected() {
		let harness = Harness::new();
		let shutdown = CancellationToken::new();
		let mut client = connect_pair(harness.registry.clone(), &shutdown);

		let err = client.resolve(TenantId(0)).await.unwrap_err();
		assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
		let err = client.mark_deleted(TenantId(0)).await.unwrap_err();
		assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
		assert!(harness.registry.status().await.entries.is_empty());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn self_report_blocks_later_resolves() {
		let harness = Harness::new();
		harness.spawner.set_next_pid(std::process::id());
		let shutdown = CancellationToken::new();
		tokio::spawn(launcher::run(harness.registry.clone(), shutdown.clone()));
		let mut client = connect_pair(harness.registry.clone(), &shutdown);

		client.resolve(TenantId(3)).await.unwrap();
		client.mark_deleted(TenantId(3)).await.unwrap();
		client.mark_deleted(TenantId(3)).await.unwrap();

		let err = client.resolve(TenantId(3)).await.unwrap_err();
		assert_eq!(err.code(), Some(ErrorCode::WorkerDeleted));
		shutdown.cancel();
	}

	#[tokio::test(flavor = "current_thread")]
	async fn deletion_from_another_process_is_refused() {
		let harness = Harness::new();
		let shutdown = CancellationToken::new();
		tokio::spawn(launcher::run(harness.registry.clone(), shutdown.clone()));
		let mut client = connect_pair(harness.registry.clone(), &shutdown);

		let endpoint = client.resolve(TenantId(5)).await.unwrap();
		assert_ne!(harness.spawner.spawns()[0].pid, std::process::id());

		let err = client.mark_deleted(TenantId(5)).await.unwrap_err();
		assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
		let err = client.mark_deleted(TenantId(6)).await.unwrap_err();
		assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));

		assert_eq!(client.resolve(TenantId(5)).await.unwrap(), endpoint);
		let status = harness.registry.status().await;
		assert_eq!(status.entries.len(), 1);
		assert!(!status.entries[0].deleted);
		shutdown.cancel();
	}

	#[tokio::test(flavor = "current_thread")]
	async fn status_lists_entries() {
		let harness = Harness::new();
		let shutdown = CancellationToken::new();
		harness.registry.mark_deleted(TenantId(8)).await;
		let mut client = connect_pair(harness.registry.clone(), &shutdown);

		let status = client.status().await.unwrap();
		assert_eq!(status.port_start, 9000);
		assert_eq!(status.port_end, 9008);
		assert_eq!(status.free_ports, 9);
		assert_eq!(status.entries.len(), 1);
		assert!(status.entries[0].deleted);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn serve_binds_answers_and_cleans_up() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("warden.sock");
		let harness = Harness::new();
		let shutdown = CancellationToken::new();
		let server = tokio::spawn(serve(path.clone(), harness.registry.clone(), shutdown.clone()));

		let mut client = loop {
			if let Ok(client) = ControlClient::connect(&path).await {
				break client;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		};
		client.ping().await.unwrap();

		let second = serve(path.clone(), harness.registry.clone(), shutdown.clone()).await;
		assert!(matches!(second, Err(ControlError::AlreadyRunning(_))));

		drop(client);
		shutdown.cancel();
		server.await.unwrap().unwrap();
		assert!(!path.exists());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn stale_socket_file_is_replaced() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("warden.sock");
		drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
		assert!(path.exists());

		let harness = Harness::new();
		let shutdown = CancellationToken::new();
		let server = tokio::spawn(serve(path.clone(), harness.registry.clone(), shutdown.clone()));

		let mut client = loop {
			if let Ok(client) = ControlClient::connect(&path).await {
				break client;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		};
		client.ping().await.unwrap();

		drop(client);
		shutdown.cancel();
		server.await.unwrap().unwrap();
	}
}
