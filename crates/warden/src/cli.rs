use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Per-tenant worker process launcher")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Configuration file (defaults to $WARDEN_CONFIG)
	#[arg(short, long, value_name = "PATH", global = true)]
	pub config: Option<PathBuf>,

	/// Control socket path (defaults to $WARDEN_SOCKET, then the config file)
	#[arg(short, long, value_name = "PATH", global = true)]
	pub socket: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long, global = true)]
	pub verbose: bool,

	/// Subcommand to execute.
	#[command(subcommand)]
	pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
	/// Run the launcher daemon: registry, reconciliation loop and control socket
	Launcher,
	/// Run one worker unit (started by the launcher)
	Unit {
		/// Tenant served by this unit
		#[arg(long)]
		tenant_id: u64,
		/// Setup endpoint port
		#[arg(long)]
		setup_port: u16,
		/// Delete endpoint port
		#[arg(long)]
		delete_port: u16,
		/// User endpoint port
		#[arg(long)]
		user_port: u16,
	},
	/// Resolve a tenant to its worker endpoint, spawning it if needed
	Resolve {
		/// Tenant to resolve
		tenant_id: u64,
	},
	/// Print the registry as JSON
	Status,
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn unit_arguments_match_spawner_order() {
		let cli = Cli::try_parse_from([
			"warden",
			"unit",
			"--tenant-id",
			"7",
			"--setup-port",
			"9000",
			"--delete-port",
			"9001",
			"--user-port",
			"9002",
		])
		.unwrap();
		assert_eq!(
			cli.command,
			Command::Unit {
				tenant_id: 7,
				setup_port: 9000,
				delete_port: 9001,
				user_port: 9002,
			}
		);
	}

	#[test]
	fn global_flags_follow_subcommand() {
		let cli = Cli::try_parse_from(["warden", "resolve", "12", "--socket", "/tmp/w.sock", "-v"]).unwrap();
		assert_eq!(cli.command, Command::Resolve { tenant_id: 12 });
		assert_eq!(cli.socket, Some(PathBuf::from("/tmp/w.sock")));
		assert!(cli.verbose);
	}

	#[test]
	fn deletion_is_not_a_client_command() {
		assert!(Cli::try_parse_from(["warden", "mark-deleted", "3"]).is_err());
	}

	#[test]
	fn subcommand_is_required() {
		assert!(Cli::try_parse_from(["warden"]).is_err());
	}
}
