//! Worker unit process creation.
//!
//! A spawn is complete when the child prints [`READY_LINE`] on stdout, meaning all three
//! of its endpoints are bound, or when the handshake timeout elapses. A timed-out child
//! is still returned with its pid; the next reconciliation pass decides its fate by
//! probing liveness.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStdout, Command};
use warden_proto::{Endpoint, READY_LINE, TenantId};

use crate::error::SpawnError;

/// A worker unit process that has been started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnedWorker {
	/// OS process id.
	pub pid: u32,
	/// Whether the readiness handshake completed before the timeout.
	pub ready: bool,
}

/// Starts worker unit processes for the launcher.
///
/// Production uses [`CommandSpawner`]; tests substitute an in-memory fake.
#[async_trait]
pub trait WorkerSpawner: Send + Sync + 'static {
	/// Starts a worker unit for `tenant_id` listening on `endpoint`.
	///
	/// Returns once the unit is ready or the handshake bound elapsed.
	///
	/// # Errors
	///
	/// Returns [`SpawnError`] if no process could be started.
	async fn spawn(&self, tenant_id: TenantId, endpoint: Endpoint) -> Result<SpawnedWorker, SpawnError>;
}

/// Spawner that runs an executable with the tenant id and ports as arguments.
///
/// The child is started with
/// `<program> <args..> --tenant-id N --setup-port P --delete-port P --user-port P`,
/// stdin closed and stderr inherited.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
	program: PathBuf,
	args: Vec<OsString>,
	envs: Vec<(OsString, OsString)>,
	ready_timeout: Duration,
}

impl CommandSpawner {
	/// Creates a spawner for `program`, waiting up to `ready_timeout` for readiness.
	pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<OsString>>, ready_timeout: Duration) -> Self {
		Self {
			program: program.into(),
			args: args.into_iter().map(Into::into).collect(),
			envs: Vec::new(),
			ready_timeout,
		}
	}

	/// Adds an environment variable for every spawned unit.
	#[must_use]
	pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
		self.envs.push((key.into(), value.into()));
		self
	}
}

#[async_trait]
impl WorkerSpawner for CommandSpawner {
	async fn spawn(&self, tenant_id: TenantId, endpoint: Endpoint) -> Result<SpawnedWorker, SpawnError> {
		let mut child = Command::new(&self.program)
			.args(&self.args)
			.arg("--tenant-id")
			.arg(tenant_id.to_string())
			.arg("--setup-port")
			.arg(endpoint.setup_port.to_string())
			.arg("--delete-port")
			.arg(endpoint.delete_port.to_string())
			.arg("--user-port")
			.arg(endpoint.user_port.to_string())
			.envs(self.envs.iter().map(|(k, v)| (k, v)))
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(false)
			.spawn()?;

		let pid = child.id().ok_or(SpawnError::MissingPid)?;
		let ready = match child.stdout.take() {
			Some(stdout) => wait_for_ready(stdout, self.ready_timeout).await,
			None => false,
		};

		if ready {
			tracing::info!(%tenant_id, pid, %endpoint, "worker unit ready");
		} else {
			tracing::error!(
				%tenant_id,
				pid,
				%endpoint,
				timeout_ms = self.ready_timeout.as_millis() as u64,
				"worker unit did not report readiness"
			);
		}

		Ok(SpawnedWorker { pid, ready })
	}
}

/// Reads stdout until the ready line, EOF or `limit`.
///
/// Whatever the child writes afterwards is drained in the background so it never blocks
/// on a full pipe.
async fn wait_for_ready(stdout: ChildStdout, limit: Duration) -> bool {
	let mut reader = BufReader::new(stdout);
	let handshake = async {
		let mut line = String::new();
		loop {
			line.clear();
			match reader.read_line(&mut line).await {
				Ok(0) => return false,
				Ok(_) if line.trim_end() == READY_LINE => return true,
				Ok(_) => {}
				Err(err) => {
					tracing::warn!(error = %err, "failed to read worker unit stdout");
					return false;
				}
			}
		}
	};
	let ready = tokio::time::timeout(limit, handshake).await.unwrap_or(false);

	tokio::spawn(async move {
		let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
	});

	ready
}
