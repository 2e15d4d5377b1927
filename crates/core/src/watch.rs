//! The refresh cycle: session → extraction → reconciliation, single-flight.
//!
//! The automation session is a singleton resource, so at most one cycle may
//! be in flight; a `tokio::sync::Mutex` around the session manager is the
//! exclusion gate, and guard release on every exit path falls out of its
//! drop. Read-only store queries run unguarded and may observe pre- or
//! post-merge state per record.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::extract::{ExtractOptions, extract_snapshots};
use crate::reconcile::reconcile;
use crate::session::SessionManager;
use crate::store::DeploymentStore;

/// What one refresh cycle did, in the shape the exposed operation reports.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
	pub added_count: u32,
	pub updated_count: u32,
	pub success: bool,
	pub message: String,
}

impl RefreshOutcome {
	fn failed(message: String) -> Self {
		Self {
			added_count: 0,
			updated_count: 0,
			success: false,
			message,
		}
	}
}

pub struct Watcher {
	session: Mutex<SessionManager>,
	store: Arc<dyn DeploymentStore>,
}

impl Watcher {
	pub fn new(session: SessionManager, store: Arc<dyn DeploymentStore>) -> Self {
		Self {
			session: Mutex::new(session),
			store,
		}
	}

	pub fn store(&self) -> &Arc<dyn DeploymentStore> {
		&self.store
	}

	/// Runs one full refresh cycle.
	///
	/// Authentication and extraction failures are reported as a failed
	/// outcome with zero counts; the schedule retries on its next tick.
	/// Store failures propagate, since dropping a write silently would
	/// leave persisted state lying about the console.
	pub async fn refresh_cycle(&self) -> Result<RefreshOutcome, StoreError> {
		let mut session = self.session.lock().await;

		if let Err(e) = session.ensure_authenticated().await {
			warn!(target = "dw.watch", error = %e, "refresh cycle aborted: authentication failed");
			return Ok(RefreshOutcome::failed(format!("authentication failed: {e}")));
		}

		let options = {
			let config = session.config();
			ExtractOptions {
				listing_url: config.listing_url.clone(),
				table_selector: config.table_selector.clone(),
				table_timeout: config.table_timeout(),
				navigation_timeout: config.navigation_timeout(),
			}
		};
		let Some(console) = session.console() else {
			return Ok(RefreshOutcome::failed("no automation session available".to_string()));
		};

		let snapshots = match extract_snapshots(console, &options).await {
			Ok(snapshots) => snapshots,
			Err(e) => {
				warn!(target = "dw.watch", error = %e, "refresh cycle aborted: extraction failed");
				return Ok(RefreshOutcome::failed(format!("extraction failed: {e}")));
			}
		};

		let summary = reconcile(&snapshots, self.store.as_ref())?;
		let outcome = RefreshOutcome {
			added_count: summary.added,
			updated_count: summary.updated,
			success: true,
			message: format!(
				"merged {} snapshots: {} added, {} updated",
				snapshots.len(),
				summary.added,
				summary.updated
			),
		};
		info!(target = "dw.watch", added = summary.added, updated = summary.updated, "refresh cycle complete");
		Ok(outcome)
	}

	/// Releases the automation session, waiting out any in-flight cycle.
	pub async fn shutdown(&self) {
		self.session.lock().await.shutdown().await;
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::time::Duration;

	use parking_lot::Mutex as SyncMutex;

	use super::*;
	use crate::config::WatchConfig;
	use crate::console::testing::{FakeConnector, FakeState};
	use crate::store::JsonStore;

	fn listing_table() -> String {
		"<table id=\"deployments\">\
		 <tr><th>Plan</th><th>Environment</th><th>Status</th><th>Details</th></tr>\
		 <tr><td>billing</td><td>Production</td><td>Running</td><td>AppOne</td></tr>\
		 <tr><td>search</td><td>Homologation</td><td>Queued</td><td>AppTwo</td></tr>\
		 </table>"
			.to_string()
	}

	fn config(dir: &tempfile::TempDir) -> WatchConfig {
		WatchConfig {
			login_url: "https://console.test/userlogin".to_string(),
			listing_url: "https://console.test/deployments".to_string(),
			username: "watcher".to_string(),
			password: "secret".to_string(),
			table_selector: "table#deployments".to_string(),
			field_timeout_secs: 0,
			settle_millis: 0,
			navigation_timeout_secs: 1,
			table_timeout_secs: 1,
			diagnostics_dir: dir.path().join("diagnostics"),
			store_path: dir.path().join("deployments.json"),
			..Default::default()
		}
	}

	fn watcher(dir: &tempfile::TempDir, state: &Arc<SyncMutex<FakeState>>) -> Watcher {
		let cfg = config(dir);
		let store = Arc::new(JsonStore::open(&cfg.store_path).unwrap());
		let session = SessionManager::new(cfg, Box::new(FakeConnector::new(Arc::clone(state))));
		Watcher::new(session, store)
	}

	#[tokio::test]
	async fn refresh_cycle_logs_in_extracts_and_merges() {
		let dir = tempfile::tempdir().unwrap();
		let state = Arc::new(SyncMutex::new(FakeState {
			table_html: Some(listing_table()),
			..Default::default()
		}));
		let watcher = watcher(&dir, &state);

		let outcome = watcher.refresh_cycle().await.unwrap();
		assert!(outcome.success);
		assert_eq!(outcome.added_count, 2);
		assert_eq!(outcome.updated_count, 0);
		assert_eq!(watcher.store().list_all().unwrap().len(), 2);
	}

	#[tokio::test]
	async fn second_cycle_updates_instead_of_adding() {
		let dir = tempfile::tempdir().unwrap();
		let state = Arc::new(SyncMutex::new(FakeState {
			table_html: Some(listing_table()),
			..Default::default()
		}));
		let watcher = watcher(&dir, &state);

		watcher.refresh_cycle().await.unwrap();
		let outcome = watcher.refresh_cycle().await.unwrap();
		assert_eq!(outcome.added_count, 0);
		assert_eq!(outcome.updated_count, 2);
	}

	#[tokio::test]
	async fn auth_failure_reports_failed_cycle_without_extraction() {
		let dir = tempfile::tempdir().unwrap();
		let state = Arc::new(SyncMutex::new(FakeState {
			fields_present: false,
			table_html: Some(listing_table()),
			..Default::default()
		}));
		let watcher = watcher(&dir, &state);

		let outcome = watcher.refresh_cycle().await.unwrap();
		assert!(!outcome.success);
		assert_eq!(outcome.added_count, 0);
		assert!(outcome.message.contains("authentication failed"));
		assert!(watcher.store().list_all().unwrap().is_empty());
	}

	#[tokio::test]
	async fn extraction_failure_reports_failed_cycle_not_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let state = Arc::new(SyncMutex::new(FakeState {
			table_html: None,
			..Default::default()
		}));
		let watcher = watcher(&dir, &state);

		let outcome = watcher.refresh_cycle().await.unwrap();
		assert!(!outcome.success);
		assert!(outcome.message.contains("extraction failed"));
	}

	#[tokio::test]
	async fn concurrent_cycles_serialize_on_the_guard() {
		let dir = tempfile::tempdir().unwrap();
		let state = Arc::new(SyncMutex::new(FakeState {
			table_html: Some(listing_table()),
			goto_delay: Duration::from_millis(25),
			..Default::default()
		}));
		let watcher = Arc::new(watcher(&dir, &state));

		let first = tokio::spawn({
			let watcher = Arc::clone(&watcher);
			async move { watcher.refresh_cycle().await.unwrap() }
		});
		let second = tokio::spawn({
			let watcher = Arc::clone(&watcher);
			async move { watcher.refresh_cycle().await.unwrap() }
		});

		let (a, b) = (first.await.unwrap(), second.await.unwrap());
		assert!(a.success && b.success);
		// Strictly sequential application: one cycle inserts both keys, the
		// other updates them, whichever ran first.
		assert_eq!(a.added_count + b.added_count, 2);
		assert_eq!(a.updated_count + b.updated_count, 2);
		assert_eq!(state.lock().max_concurrent_gotos, 1);
	}

	#[tokio::test]
	async fn guard_is_released_after_a_failed_cycle() {
		let dir = tempfile::tempdir().unwrap();
		let state = Arc::new(SyncMutex::new(FakeState {
			table_html: None,
			..Default::default()
		}));
		let watcher = watcher(&dir, &state);

		assert!(!watcher.refresh_cycle().await.unwrap().success);
		state.lock().table_html = Some(listing_table());
		let outcome = watcher.refresh_cycle().await.unwrap();
		assert!(outcome.success);
	}
}
