//! Warden binary.
//!
//! One executable, several roles:
//! - `launcher`: the daemon owning the worker registry and spawning worker units
//! - `unit`: a single tenant's worker unit, started by the launcher
//! - `resolve`, `status`: control socket clients

mod cli;
mod config;
mod daemon;
mod logging;
mod signals;
mod worker;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use config::{CONFIG_ENV, WardenConfig};
use warden_control::ControlClient;
use warden_proto::paths::{SOCKET_ENV, default_socket_path};
use warden_proto::{Endpoint, TenantId};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let config_path = cli.config.clone().or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
	let config = WardenConfig::load(config_path.as_deref())?;

	let socket = config::pick_socket(
		cli.socket.clone(),
		std::env::var_os(SOCKET_ENV).map(PathBuf::from),
		config.control.socket.as_deref(),
	)
	.unwrap_or_else(default_socket_path);

	let role = match cli.command {
		Command::Launcher => "launcher",
		Command::Unit { .. } => "unit",
		_ => "cli",
	};
	logging::setup_tracing(role, cli.verbose, &config.logging.level);

	match cli.command {
		Command::Launcher => daemon::run(config, config_path, socket).await,
		Command::Unit {
			tenant_id,
			setup_port,
			delete_port,
			user_port,
		} => {
			let endpoint = Endpoint {
				setup_port,
				delete_port,
				user_port,
			};
			worker::run(&config, TenantId(tenant_id), endpoint, socket).await
		}
		Command::Resolve { tenant_id } => {
			let endpoint = connect(&socket).await?.resolve(TenantId(tenant_id)).await?;
			println!("{endpoint}");
			Ok(())
		}
		Command::Status => {
			let status = connect(&socket).await?.status().await?;
			println!("{}", serde_json::to_string_pretty(&status)?);
			Ok(())
		}
	}
}

async fn connect(socket: &std::path::Path) -> anyhow::Result<ControlClient> {
	ControlClient::connect(socket)
		.await
		.with_context(|| format!("no launcher answering on {}", socket.display()))
}
