use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

/// Environment variable selecting a directory for per-process log files.
pub const LOG_DIR_ENV: &str = "WARDEN_LOG_DIR";

/// Initializes tracing for one process role (`launcher`, `unit`, `cli`).
///
/// `RUST_LOG` overrides `level`. With `WARDEN_LOG_DIR` set, logs go to
/// `warden-<role>.<pid>.log` in that directory; otherwise to stderr. Stdout is never
/// used because worker units reserve it for the readiness line.
pub fn setup_tracing(role: &str, verbose: bool, level: &str) {
	let filter = || {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("warden=trace,debug")
			} else {
				EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
			}
		})
	};

	if let Some(log_dir) = std::env::var_os(LOG_DIR_ENV).map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let pid = std::process::id();
		let log_path = log_dir.join(format!("warden-{role}.{pid}.log"));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_span_events(FmtSpan::CLOSE)
				.with_target(true);

			tracing_subscriber::registry().with(filter()).with(file_layer).init();

			tracing::info!(path = ?log_path, role, "tracing initialized");
			return;
		}
	}

	tracing_subscriber::fmt()
		.with_env_filter(filter())
		.with_writer(std::io::stderr)
		.init();
}
