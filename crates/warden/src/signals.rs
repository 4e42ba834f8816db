use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Cancels `shutdown` on the first SIGINT, SIGTERM or SIGQUIT.
///
/// # Errors
///
/// Fails if the signal handlers cannot be installed.
pub fn cancel_on_signal(shutdown: CancellationToken) -> std::io::Result<()> {
	let mut sigint = signal(SignalKind::interrupt())?;
	let mut sigterm = signal(SignalKind::terminate())?;
	let mut sigquit = signal(SignalKind::quit())?;

	tokio::spawn(async move {
		let name = tokio::select! {
			_ = sigint.recv() => "SIGINT",
			_ = sigterm.recv() => "SIGTERM",
			_ = sigquit.recv() => "SIGQUIT",
			() = shutdown.cancelled() => return,
		};
		tracing::info!(signal = name, "shutdown requested");
		shutdown.cancel();
	});
	Ok(())
}
