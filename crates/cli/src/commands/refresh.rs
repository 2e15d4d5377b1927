use anyhow::{Result, bail};

use dw_core::WatchConfig;

use super::build_watcher;

/// One refresh cycle against the live console, then a clean shutdown.
/// The outcome is printed either way; a failed cycle also fails the
/// process so schedulers notice.
pub async fn execute(config: WatchConfig) -> Result<()> {
	let watcher = build_watcher(config)?;
	let outcome = watcher.refresh_cycle().await;
	watcher.shutdown().await;

	let outcome = outcome?;
	println!("{}", serde_json::to_string_pretty(&outcome)?);
	if !outcome.success {
		bail!("refresh cycle failed: {}", outcome.message);
	}
	Ok(())
}
