//! End-to-end parse-and-reconcile scenarios over the public API, driving
//! the same table markup through several observation cycles.

use chrono::{Duration, Utc};
use dw_core::extract::parse_listing_table;
use dw_core::store::{DeploymentStore, JsonStore};
use dw_core::{MULTI_APP_SENTINEL, acknowledge_notification, reconcile};

fn table(rows: &str) -> String {
	format!(
		"<table id=\"deployments\">\
		 <tr><th>Plan</th><th>Environment</th><th>Status</th><th>Details</th></tr>\
		 {rows}</table>"
	)
}

fn open_store(dir: &tempfile::TempDir) -> JsonStore {
	JsonStore::open(&dir.path().join("deployments.json")).unwrap()
}

#[test]
fn deployment_lifecycle_across_three_cycles() {
	let dir = tempfile::tempdir().unwrap();
	let store = open_store(&dir);
	let t0 = Utc::now();
	let t1 = t0 + Duration::minutes(5);
	let t2 = t1 + Duration::minutes(9);

	let queued = parse_listing_table(
		&table("<tr><td>billing</td><td>Production</td><td>Queued</td><td>AppOne</td></tr>"),
		t0,
	);
	let running = parse_listing_table(
		&table("<tr><td>billing</td><td>Production</td><td>Running<br/>21/May 10:04</td><td>AppOne</td></tr>"),
		t1,
	);
	let finished = parse_listing_table(
		&table("<tr><td>billing</td><td>Production</td><td>Finished successfully</td><td>AppOne</td></tr>"),
		t2,
	);

	let summary = reconcile(&queued, &store).unwrap();
	assert_eq!((summary.added, summary.updated), (1, 0));

	let summary = reconcile(&running, &store).unwrap();
	assert_eq!((summary.added, summary.updated), (0, 1));
	let record = store.find_by_key("billing", "Production").unwrap().unwrap();
	assert_eq!(record.status, "Running");
	assert_eq!(record.start_time, Some(t1));

	reconcile(&finished, &store).unwrap();
	let record = store.find_by_key("billing", "Production").unwrap().unwrap();
	assert_eq!(record.previous_status, "Running");
	assert_eq!(record.end_time, Some(t2));
	assert_eq!(record.duration_secs, Some((t2 - t1).num_seconds()));
	assert!(record.has_status_changed);
	assert!(!record.notification_sent);

	assert!(acknowledge_notification(&store, "billing", "Production").unwrap());
	let record = store.find_by_key("billing", "Production").unwrap().unwrap();
	assert!(!record.has_status_changed);
	assert!(record.notification_sent);
}

#[test]
fn mixed_rows_parse_and_merge_per_key() {
	let dir = tempfile::tempdir().unwrap();
	let store = open_store(&dir);
	let now = Utc::now();

	let snapshots = parse_listing_table(
		&table(
			"<tr><td>billing</td><td>Production</td><td>Running</td><td>AppOne, AppTwo</td></tr>\
			 <tr><td>broken</td><td>Homologation</td><td>Queued</td></tr>\
			 <tr><td>search</td><td>Homologation</td><td>Queued</td><td>Indexer</td></tr>",
		),
		now,
	);
	assert_eq!(snapshots.len(), 2);
	assert_eq!(snapshots[0].processed_details, MULTI_APP_SENTINEL);

	let summary = reconcile(&snapshots, &store).unwrap();
	assert_eq!(summary.added, 2);
	assert_eq!(store.list_running().unwrap().len(), 1);
	assert_eq!(store.list_by_environment("homologation").unwrap().len(), 1);
}

#[test]
fn history_survives_reopen_between_cycles() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("deployments.json");
	let t0 = Utc::now();
	let t1 = t0 + Duration::minutes(3);

	{
		let store = JsonStore::open(&path).unwrap();
		let batch = parse_listing_table(
			&table("<tr><td>billing</td><td>Production</td><td>Queued</td><td>AppOne</td></tr>"),
			t0,
		);
		reconcile(&batch, &store).unwrap();
	}

	let store = JsonStore::open(&path).unwrap();
	let batch = parse_listing_table(
		&table("<tr><td>billing</td><td>Production</td><td>Running</td><td>AppOne</td></tr>"),
		t1,
	);
	let summary = reconcile(&batch, &store).unwrap();
	assert_eq!((summary.added, summary.updated), (0, 1));

	let record = store.find_by_key("billing", "Production").unwrap().unwrap();
	assert_eq!(record.first_detected, t0);
	assert_eq!(record.start_time, Some(t1));
}
