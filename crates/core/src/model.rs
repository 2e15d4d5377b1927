//! Deployment data model: persisted records, per-cycle snapshots, and the
//! derived classification predicates shared by reconciliation and reporting.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Collapsed label for deployments carrying more than one application.
/// Grouping and statistics key on this value, so it must stay stable.
pub const MULTI_APP_SENTINEL: &str = "Multiple applications";

/// Persisted history for one `(plan_name, deployed_to)` deployment thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
	pub plan_name: String,
	pub deployed_to: String,
	/// Raw status label as last scraped.
	pub status: String,
	/// Last distinct status before the current one.
	#[serde(default)]
	pub previous_status: String,
	#[serde(default)]
	pub details: String,
	/// Derived application label, see [`process_details`].
	#[serde(default)]
	pub processed_details: String,
	#[serde(default)]
	pub start_time: Option<DateTime<Utc>>,
	#[serde(default)]
	pub end_time: Option<DateTime<Utc>>,
	/// Elapsed seconds between `start_time` and `end_time`.
	#[serde(default)]
	pub duration_secs: Option<i64>,
	pub first_detected: DateTime<Utc>,
	pub last_updated: DateTime<Utc>,
	/// True since the last unacknowledged transition. Cleared only by
	/// explicit acknowledgment, never by the merge path.
	#[serde(default)]
	pub has_status_changed: bool,
	#[serde(default)]
	pub notification_sent: bool,
	#[serde(default)]
	pub notes: Option<String>,
}

impl DeploymentRecord {
	pub fn is_running(&self) -> bool {
		status_is_running(&self.status)
	}

	pub fn is_finished(&self) -> bool {
		status_is_finished(&self.status)
	}

	pub fn is_homologation(&self) -> bool {
		environment_matches(&self.deployed_to, "homologation")
	}

	pub fn is_production(&self) -> bool {
		environment_matches(&self.deployed_to, "production")
	}

	pub fn duration(&self) -> Option<Duration> {
		self.duration_secs.map(Duration::seconds)
	}
}

/// One parsed listing row for a single refresh cycle. Never persisted;
/// consumed by the reconciler and discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentSnapshot {
	pub plan_name: String,
	pub deployed_to: String,
	/// Cleaned status, first line only.
	pub status: String,
	/// Raw details text from the source.
	pub details: String,
	pub processed_details: String,
	pub observed_at: DateTime<Utc>,
}

impl DeploymentSnapshot {
	/// Builds a snapshot from trimmed cell text, applying status cleaning
	/// and details processing.
	pub fn from_cells(plan_name: &str, deployed_to: &str, raw_status: &str, details: &str, observed_at: DateTime<Utc>) -> Self {
		Self {
			plan_name: plan_name.to_string(),
			deployed_to: deployed_to.to_string(),
			status: clean_status(raw_status),
			details: details.to_string(),
			processed_details: process_details(details),
			observed_at,
		}
	}

	pub fn is_running(&self) -> bool {
		status_is_running(&self.status)
	}

	pub fn is_finished(&self) -> bool {
		status_is_finished(&self.status)
	}
}

/// Classification predicates. Substring matches, case-insensitive, applied
/// to raw text. Reconciliation and reporting must share these so that
/// timestamp derivation and grouping never disagree.
pub fn status_is_running(status: &str) -> bool {
	contains_ignore_case(status, "running")
}

pub fn status_is_finished(status: &str) -> bool {
	contains_ignore_case(status, "finished") || contains_ignore_case(status, "successfully")
}

pub fn environment_matches(deployed_to: &str, label: &str) -> bool {
	contains_ignore_case(deployed_to, label)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
	haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// The console renders a status label with a timestamp on subsequent lines;
/// only the first line is the label.
pub fn clean_status(raw: &str) -> String {
	raw.lines().next().unwrap_or("").trim().to_string()
}

/// Derives the application label from raw details text.
///
/// Tokens split on spaces and commas: zero tokens keep the raw text
/// verbatim, one token is the application name, several collapse to
/// [`MULTI_APP_SENTINEL`]. The collapse is deliberate; downstream grouping
/// depends on the single shared label.
pub fn process_details(raw: &str) -> String {
	let tokens: Vec<&str> = raw.split([' ', ',']).filter(|t| !t.is_empty()).collect();
	match tokens.len() {
		0 => raw.to_string(),
		1 => tokens[0].to_string(),
		_ => MULTI_APP_SENTINEL.to_string(),
	}
}
