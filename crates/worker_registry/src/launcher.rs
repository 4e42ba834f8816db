//! The launcher loop: reconciliation passes until shutdown or failure.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::LauncherError;
use crate::reconcile::ReconcileOutcome;
use crate::registry::Registry;

/// Runs reconciliation passes until `shutdown` is cancelled or a pass fails.
///
/// Idle passes back off for `idle_poll_ms`, waking early when dirty is raised. A pass in
/// progress is never interrupted; cancellation is observed between passes.
///
/// # Errors
///
/// Returns the [`LauncherError`] of the first failed pass.
pub async fn run(registry: Arc<Registry>, shutdown: CancellationToken) -> Result<(), LauncherError> {
	let idle = registry.config().idle_poll();
	tracing::info!(
		port_start = registry.config().port_start,
		port_end = registry.config().port_end,
		"launcher started"
	);

	while !shutdown.is_cancelled() {
		match registry.reconcile().await {
			ReconcileOutcome::Continue => {}
			ReconcileOutcome::Idle => {
				tokio::select! {
					() = shutdown.cancelled() => break,
					() = registry.wait_for_changes(idle) => {}
				}
			}
			ReconcileOutcome::Failure(err) => {
				tracing::error!(error = %err, "launcher stopping after failed pass");
				return Err(err);
			}
		}
	}

	tracing::info!("launcher stopped");
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use warden_proto::{Endpoint, TenantId};

	use super::*;
	use crate::error::ResolveError;
	use crate::test_helpers::Harness;

	#[tokio::test(flavor = "current_thread")]
	async fn launcher_loop_serves_resolvers_until_shutdown() {
		let harness = Harness::new();
		let shutdown = CancellationToken::new();
		let launcher = tokio::spawn(run(harness.registry.clone(), shutdown.clone()));

		let endpoint = harness.registry.resolve(TenantId(1)).await.unwrap();
		assert_eq!(
			endpoint,
			Endpoint {
				setup_port: 9000,
				delete_port: 9001,
				user_port: 9002,
			}
		);

		shutdown.cancel();
		tokio::time::timeout(Duration::from_secs(5), launcher).await.unwrap().unwrap().unwrap();
	}

	#[tokio::test(flavor = "current_thread")]
	async fn launcher_loop_exits_on_failure() {
		let harness = Harness::new();
		harness.spawner.fail_next();
		let shutdown = CancellationToken::new();
		let launcher = tokio::spawn(run(harness.registry.clone(), shutdown));

		let err = harness.registry.resolve(TenantId(1)).await.unwrap_err();
		assert_eq!(err, ResolveError::LauncherFailedToSpawn);

		let result = tokio::time::timeout(Duration::from_secs(5), launcher).await.unwrap().unwrap();
		assert!(matches!(result, Err(LauncherError::Spawn { tenant_id: TenantId(1), .. })));
	}
}
