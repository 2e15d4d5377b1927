use anyhow::Result;
use serde_json::{Value, json};

use dw_core::store::group_counts;
use dw_core::{DeploymentRecord, DeploymentStore, WatchConfig};

use super::open_store;

pub fn execute(config: &WatchConfig) -> Result<()> {
	let records = open_store(config)?.list_all()?;
	println!("{}", serde_json::to_string_pretty(&summarize(&records))?);
	Ok(())
}

/// Totals plus per-application and per-environment counts. Applications
/// are keyed on the processed details token, so multi-application rows
/// group under the collapsed label.
fn summarize(records: &[DeploymentRecord]) -> Value {
	let by_application = group_counts(records, |r| r.processed_details.clone());
	let by_environment = group_counts(records, |r| r.deployed_to.clone());
	let running = records.iter().filter(|r| r.is_running()).count();
	let pending_changes = records.iter().filter(|r| r.has_status_changed && !r.notification_sent).count();

	json!({
		"total": records.len(),
		"running": running,
		"pendingChanges": pending_changes,
		"byApplication": by_application,
		"byEnvironment": by_environment,
	})
}
