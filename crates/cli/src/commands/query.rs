//! Read-only queries against the persisted deployment history. None of
//! these touch the console.

use anyhow::Result;
use chrono::{Duration, Utc};
use dw_core::{DeploymentStore, WatchConfig};

use super::{open_store, print_records};

pub fn list_all(config: &WatchConfig) -> Result<()> {
	print_records(&open_store(config)?.list_all()?)
}

pub fn list_changed(config: &WatchConfig) -> Result<()> {
	print_records(&open_store(config)?.list_changed_unnotified()?)
}

pub fn list_running(config: &WatchConfig) -> Result<()> {
	print_records(&open_store(config)?.list_running()?)
}

pub fn list_by_environment(config: &WatchConfig, environment: &str) -> Result<()> {
	print_records(&open_store(config)?.list_by_environment(environment)?)
}

pub fn list_since(config: &WatchConfig, hours: i64) -> Result<()> {
	let since = Utc::now() - Duration::hours(hours.max(0));
	print_records(&open_store(config)?.list_since(since)?)
}

pub fn search(config: &WatchConfig, term: &str) -> Result<()> {
	print_records(&open_store(config)?.search(term)?)
}
