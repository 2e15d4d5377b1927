//! Persisted deployment history.
//!
//! The engine only assumes a keyed store with upsert and range queries;
//! [`JsonStore`] is the bundled implementation, a schema-versioned JSON
//! document file. Each upsert rewrites the file under a lock, so a single
//! record's update is all-or-nothing.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{DeploymentRecord, environment_matches};

const STORE_SCHEMA_VERSION: u32 = 1;

/// Keyed persistence surface consumed by the reconciler and the query
/// commands. `(plan_name, deployed_to)` is the unique compound key.
pub trait DeploymentStore: Send + Sync {
	fn find_by_key(&self, plan_name: &str, deployed_to: &str) -> Result<Option<DeploymentRecord>, StoreError>;

	/// Inserts or replaces the record for its key, atomically.
	fn upsert(&self, record: DeploymentRecord) -> Result<DeploymentRecord, StoreError>;

	/// All records, most recently updated first.
	fn list_all(&self) -> Result<Vec<DeploymentRecord>, StoreError>;

	/// Records with a pending, unnotified transition.
	fn list_changed_unnotified(&self) -> Result<Vec<DeploymentRecord>, StoreError>;

	fn list_by_environment(&self, environment: &str) -> Result<Vec<DeploymentRecord>, StoreError>;

	fn list_running(&self) -> Result<Vec<DeploymentRecord>, StoreError>;

	fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<DeploymentRecord>, StoreError>;

	/// Case-insensitive match across plan name, status, details, and
	/// environment.
	fn search(&self, term: &str) -> Result<Vec<DeploymentRecord>, StoreError>;
}

/// On-disk format of the store file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
	schema: u32,
	#[serde(default)]
	records: Vec<DeploymentRecord>,
}

impl Default for StoreFile {
	fn default() -> Self {
		Self {
			schema: STORE_SCHEMA_VERSION,
			records: Vec::new(),
		}
	}
}

/// JSON-file-backed store. Records are held in memory behind a lock and the
/// whole file is rewritten on each upsert; listing sizes are small enough
/// (one row per deployment thread) that this stays cheap.
pub struct JsonStore {
	path: PathBuf,
	inner: Mutex<StoreFile>,
}

impl JsonStore {
	/// Opens or creates the store file. A present-but-unreadable file is an
	/// error rather than a silent reset; losing history would desynchronize
	/// every transition that follows.
	pub fn open(path: &Path) -> Result<Self, StoreError> {
		let file = if path.exists() {
			let raw = fs::read_to_string(path)?;
			serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
				path: path.display().to_string(),
				message: e.to_string(),
			})?
		} else {
			StoreFile::default()
		};

		Ok(Self {
			path: path.to_path_buf(),
			inner: Mutex::new(file),
		})
	}

	fn save(&self, file: &StoreFile) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent)?;
			}
		}
		let json = serde_json::to_string_pretty(file)?;
		fs::write(&self.path, json)?;
		Ok(())
	}

	fn filtered(&self, predicate: impl Fn(&DeploymentRecord) -> bool) -> Vec<DeploymentRecord> {
		let inner = self.inner.lock();
		let mut records: Vec<DeploymentRecord> = inner.records.iter().filter(|r| predicate(r)).cloned().collect();
		records.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
		records
	}
}

impl DeploymentStore for JsonStore {
	fn find_by_key(&self, plan_name: &str, deployed_to: &str) -> Result<Option<DeploymentRecord>, StoreError> {
		let inner = self.inner.lock();
		Ok(inner
			.records
			.iter()
			.find(|r| r.plan_name == plan_name && r.deployed_to == deployed_to)
			.cloned())
	}

	fn upsert(&self, record: DeploymentRecord) -> Result<DeploymentRecord, StoreError> {
		let mut inner = self.inner.lock();
		match inner
			.records
			.iter_mut()
			.find(|r| r.plan_name == record.plan_name && r.deployed_to == record.deployed_to)
		{
			Some(existing) => *existing = record.clone(),
			None => inner.records.push(record.clone()),
		}
		self.save(&inner)?;
		Ok(record)
	}

	fn list_all(&self) -> Result<Vec<DeploymentRecord>, StoreError> {
		Ok(self.filtered(|_| true))
	}

	fn list_changed_unnotified(&self) -> Result<Vec<DeploymentRecord>, StoreError> {
		Ok(self.filtered(|r| r.has_status_changed && !r.notification_sent))
	}

	fn list_by_environment(&self, environment: &str) -> Result<Vec<DeploymentRecord>, StoreError> {
		let environment = environment.to_string();
		Ok(self.filtered(move |r| environment_matches(&r.deployed_to, &environment)))
	}

	fn list_running(&self) -> Result<Vec<DeploymentRecord>, StoreError> {
		Ok(self.filtered(|r| r.is_running()))
	}

	fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<DeploymentRecord>, StoreError> {
		Ok(self.filtered(move |r| r.last_updated >= since))
	}

	fn search(&self, term: &str) -> Result<Vec<DeploymentRecord>, StoreError> {
		let term = term.to_lowercase();
		Ok(self.filtered(move |r| {
			r.plan_name.to_lowercase().contains(&term)
				|| r.status.to_lowercase().contains(&term)
				|| r.details.to_lowercase().contains(&term)
				|| r.deployed_to.to_lowercase().contains(&term)
		}))
	}
}

/// Counts grouped by a derived label, for reporting.
pub fn group_counts<'a>(records: impl IntoIterator<Item = &'a DeploymentRecord>, key: impl Fn(&DeploymentRecord) -> String) -> HashMap<String, usize> {
	let mut counts = HashMap::new();
	for record in records {
		*counts.entry(key(record)).or_insert(0) += 1;
	}
	counts
}
