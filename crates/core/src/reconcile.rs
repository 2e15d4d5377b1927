//! Reconciliation: merging a snapshot batch into persisted history.
//!
//! Transition detection compares raw status strings exactly, so two
//! distinct labels of the same classification (say, two "running"
//! sub-states) still register as a transition. The classification
//! predicates drive only the derived timestamp side effects.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::model::{DeploymentRecord, DeploymentSnapshot, status_is_finished, status_is_running};
use crate::store::DeploymentStore;

/// Outcome of merging one snapshot batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
	pub added: u32,
	pub updated: u32,
}

/// Merges `snapshots` into the store, keyed by `(plan_name, deployed_to)`.
///
/// Snapshots are applied in extraction order; distinct keys never interact,
/// so the per-key outcome is order-independent across keys. Store failures
/// abort the batch and propagate.
pub fn reconcile(snapshots: &[DeploymentSnapshot], store: &dyn DeploymentStore) -> Result<MergeSummary, StoreError> {
	let mut summary = MergeSummary::default();

	for snapshot in snapshots {
		match store.find_by_key(&snapshot.plan_name, &snapshot.deployed_to)? {
			None => {
				store.upsert(new_record(snapshot))?;
				summary.added += 1;
				debug!(
					target = "dw.reconcile",
					plan = %snapshot.plan_name,
					environment = %snapshot.deployed_to,
					status = %snapshot.status,
					"new deployment detected"
				);
			}
			Some(mut record) => {
				apply_snapshot(&mut record, snapshot);
				store.upsert(record)?;
				summary.updated += 1;
			}
		}
	}

	info!(
		target = "dw.reconcile",
		added = summary.added,
		updated = summary.updated,
		"snapshot batch merged"
	);
	Ok(summary)
}

fn new_record(snapshot: &DeploymentSnapshot) -> DeploymentRecord {
	DeploymentRecord {
		plan_name: snapshot.plan_name.clone(),
		deployed_to: snapshot.deployed_to.clone(),
		status: snapshot.status.clone(),
		previous_status: String::new(),
		details: snapshot.details.clone(),
		processed_details: snapshot.processed_details.clone(),
		start_time: None,
		end_time: None,
		duration_secs: None,
		first_detected: snapshot.observed_at,
		last_updated: snapshot.observed_at,
		has_status_changed: false,
		notification_sent: false,
		notes: None,
	}
}

/// Applies one snapshot to an existing record, in place.
///
/// `last_updated` is refreshed even when nothing else changed; "recent"
/// queries depend on it tracking re-observation.
fn apply_snapshot(record: &mut DeploymentRecord, snapshot: &DeploymentSnapshot) {
	if record.status != snapshot.status {
		let was_running = status_is_running(&record.status);
		let is_now_running = status_is_running(&snapshot.status);
		let is_now_finished = status_is_finished(&snapshot.status);

		record.previous_status = record.status.clone();
		record.has_status_changed = true;
		// A fresh transition always re-arms notification, even if a prior
		// one was still pending.
		record.notification_sent = false;

		if was_running && is_now_finished {
			record.end_time = Some(snapshot.observed_at);
			if let Some(start) = record.start_time {
				record.duration_secs = Some((snapshot.observed_at - start).num_seconds());
			}
		} else if !was_running && is_now_running {
			record.start_time = Some(snapshot.observed_at);
		}

		info!(
			target = "dw.reconcile",
			plan = %record.plan_name,
			environment = %record.deployed_to,
			from = %record.previous_status,
			to = %snapshot.status,
			"status transition"
		);
	}

	record.status = snapshot.status.clone();
	record.details = snapshot.details.clone();
	record.processed_details = snapshot.processed_details.clone();
	record.last_updated = snapshot.observed_at;
}

/// Marks a record's pending transition as notified. This is the only path
/// that clears `has_status_changed`, keeping "a transition happened"
/// decoupled from "a transition was merged". Returns false when the key is
/// unknown.
pub fn acknowledge_notification(store: &dyn DeploymentStore, plan_name: &str, deployed_to: &str) -> Result<bool, StoreError> {
	let Some(mut record) = store.find_by_key(plan_name, deployed_to)? else {
		return Ok(false);
	};
	record.notification_sent = true;
	record.has_status_changed = false;
	store.upsert(record)?;
	Ok(true)
}
