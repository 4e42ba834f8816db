//! `warden launcher`: registry, reconciliation loop and control socket in one process.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use warden_proto::paths::SOCKET_ENV;
use warden_registry::{CommandSpawner, Registry, SystemProbe, launcher};

use crate::config::{CONFIG_ENV, WardenConfig};
use crate::signals;

/// Runs the launcher until a signal arrives or a reconciliation pass fails.
pub async fn run(config: WardenConfig, config_path: Option<PathBuf>, socket: PathBuf) -> anyhow::Result<()> {
	let spawner = spawner(&config, config_path.as_deref(), &socket)?;
	let registry = Registry::new(config.registry.clone(), Arc::new(SystemProbe), Arc::new(spawner))?;

	let shutdown = CancellationToken::new();
	signals::cancel_on_signal(shutdown.clone()).context("failed to install signal handlers")?;

	tracing::info!(socket = %socket.display(), "starting launcher");
	let (launched, served) = tokio::join!(
		async {
			let result = launcher::run(registry.clone(), shutdown.clone()).await;
			shutdown.cancel();
			result
		},
		async {
			let result = warden_control::serve(&socket, registry.clone(), shutdown.clone()).await;
			shutdown.cancel();
			result
		},
	);

	served.context("control socket failed")?;
	launched.context("launcher stopped after a failed reconciliation pass")?;
	Ok(())
}

/// Spawner that re-executes this binary's `unit` subcommand unless configured otherwise.
fn spawner(config: &WardenConfig, config_path: Option<&Path>, socket: &Path) -> anyhow::Result<CommandSpawner> {
	let program = match &config.spawner.program {
		Some(program) => program.clone(),
		None => std::env::current_exe().context("cannot locate the warden executable")?,
	};
	let mut spawner = CommandSpawner::new(program, config.spawner.args.iter().map(OsString::from), config.registry.worker_process_wait())
		.with_env(SOCKET_ENV, socket);
	if let Some(path) = config_path {
		spawner = spawner.with_env(CONFIG_ENV, path);
	}
	Ok(spawner)
}
