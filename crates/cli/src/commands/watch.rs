use anyhow::Result;
use tracing::{info, warn};

use dw_core::{DeploymentStore, WatchConfig, Watcher, acknowledge_notification};

use super::build_watcher;

/// Polls the console until interrupted. Each cycle's pending status
/// changes are announced on stdout and acknowledged, so a change is
/// announced exactly once.
pub async fn execute(config: WatchConfig) -> Result<()> {
	let poll_interval = config.poll_interval();
	let watcher = build_watcher(config)?;
	info!(target = "dw", interval_secs = poll_interval.as_secs(), "watching for deployment changes");

	let mut ticker = tokio::time::interval(poll_interval);
	loop {
		tokio::select! {
			_ = ticker.tick() => {
				if let Err(err) = run_cycle(&watcher).await {
					watcher.shutdown().await;
					return Err(err);
				}
			}
			_ = tokio::signal::ctrl_c() => {
				info!(target = "dw", "interrupt received; shutting down");
				break;
			}
		}
	}

	watcher.shutdown().await;
	Ok(())
}

async fn run_cycle(watcher: &Watcher) -> Result<()> {
	let outcome = watcher.refresh_cycle().await?;
	if !outcome.success {
		warn!(target = "dw", message = %outcome.message, "refresh cycle failed; will retry on next tick");
		return Ok(());
	}
	info!(target = "dw", message = %outcome.message, "refresh cycle complete");

	let store = watcher.store();
	for record in store.list_changed_unnotified()? {
		println!(
			"[{}] {} on {}: {} -> {}",
			record.last_updated.format("%Y-%m-%d %H:%M:%S"),
			record.plan_name,
			record.deployed_to,
			if record.previous_status.is_empty() { "(new)" } else { &record.previous_status },
			record.status
		);
		acknowledge_notification(store.as_ref(), &record.plan_name, &record.deployed_to)?;
	}
	Ok(())
}
