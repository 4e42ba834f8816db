//! `warden unit`: one worker unit process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, ensure};
use tokio_util::sync::CancellationToken;
use warden_proto::{Endpoint, TenantId};
use warden_unit::{AckHandler, BoundUnit, SocketReporter, UnitConfig, announce_ready};

use crate::config::WardenConfig;
use crate::signals;

/// Binds the unit's endpoints, announces readiness and serves until shutdown.
pub async fn run(config: &WardenConfig, tenant_id: TenantId, endpoint: Endpoint, socket: PathBuf) -> anyhow::Result<()> {
	ensure!(tenant_id.is_valid(), "tenant id 0 is reserved");

	let unit_config = UnitConfig {
		drain_timeout: Duration::from_secs(config.unit.drain_timeout_secs),
		..UnitConfig::new(tenant_id, endpoint)
	};
	let unit = BoundUnit::bind(&unit_config).await?;

	let shutdown = CancellationToken::new();
	signals::cancel_on_signal(shutdown.clone()).context("failed to install signal handlers")?;

	announce_ready(&mut tokio::io::stdout()).await?;
	unit.run(Arc::new(AckHandler), Arc::new(SocketReporter::new(socket)), shutdown).await;
	Ok(())
}
