//! Watcher configuration: JSON file with environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_FIELD_TIMEOUT_SECS: u64 = 20;
const DEFAULT_TABLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 45;
const DEFAULT_SETTLE_MILLIS: u64 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchConfig {
	/// Login entry point of the console.
	pub login_url: String,
	/// Protected listing view holding the deployments table.
	pub listing_url: String,
	pub username: String,
	pub password: String,
	/// CSS selector for the data table on the listing view.
	pub table_selector: String,
	/// Wall-clock window after which a login is considered expired even if
	/// the liveness probe would still pass.
	pub session_timeout_secs: u64,
	pub poll_interval_secs: u64,
	pub field_timeout_secs: u64,
	pub table_timeout_secs: u64,
	pub navigation_timeout_secs: u64,
	/// Pause after submitting credentials, before re-probing.
	pub settle_millis: u64,
	pub diagnostics_dir: PathBuf,
	pub store_path: PathBuf,
	pub headless: bool,
	/// Explicit browser executable; discovered from the host when absent.
	pub browser_executable: Option<String>,
}

impl Default for WatchConfig {
	fn default() -> Self {
		Self {
			login_url: String::new(),
			listing_url: String::new(),
			username: String::new(),
			password: String::new(),
			table_selector: "table".to_string(),
			session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
			poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
			field_timeout_secs: DEFAULT_FIELD_TIMEOUT_SECS,
			table_timeout_secs: DEFAULT_TABLE_TIMEOUT_SECS,
			navigation_timeout_secs: DEFAULT_NAVIGATION_TIMEOUT_SECS,
			settle_millis: DEFAULT_SETTLE_MILLIS,
			diagnostics_dir: PathBuf::from("diagnostics"),
			store_path: PathBuf::from("deployments.json"),
			headless: true,
			browser_executable: None,
		}
	}
}

impl WatchConfig {
	/// Loads the config file, then applies `DEPLOYWATCH_*` env overrides.
	/// Credentials normally come from the environment so the file can be
	/// committed without secrets.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let config = Self::load_readonly(path)?;
		config.validate(path)?;
		Ok(config)
	}

	/// Loads without requiring credentials, for commands that only touch
	/// the local store.
	pub fn load_readonly(path: &Path) -> Result<Self, ConfigError> {
		let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.display().to_string(),
			source,
		})?;
		let mut config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
			path: path.display().to_string(),
			source,
		})?;
		config.apply_env_overrides();
		Ok(config)
	}

	fn apply_env_overrides(&mut self) {
		for (var, field) in [
			("DEPLOYWATCH_LOGIN_URL", &mut self.login_url as &mut String),
			("DEPLOYWATCH_LISTING_URL", &mut self.listing_url),
			("DEPLOYWATCH_USERNAME", &mut self.username),
			("DEPLOYWATCH_PASSWORD", &mut self.password),
		] {
			if let Ok(value) = std::env::var(var) {
				if !value.is_empty() {
					*field = value;
				}
			}
		}
	}

	fn validate(&self, path: &Path) -> Result<(), ConfigError> {
		for (name, value) in [
			("loginUrl", &self.login_url),
			("listingUrl", &self.listing_url),
			("username", &self.username),
			("password", &self.password),
		] {
			if value.is_empty() {
				return Err(ConfigError::Invalid {
					path: path.display().to_string(),
					message: format!("{name} is required (file field or DEPLOYWATCH_* env)"),
				});
			}
		}
		Ok(())
	}

	pub fn session_timeout(&self) -> Duration {
		Duration::from_secs(self.session_timeout_secs)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_secs)
	}

	pub fn field_timeout(&self) -> Duration {
		Duration::from_secs(self.field_timeout_secs)
	}

	pub fn table_timeout(&self) -> Duration {
		Duration::from_secs(self.table_timeout_secs)
	}

	pub fn navigation_timeout(&self) -> Duration {
		Duration::from_secs(self.navigation_timeout_secs)
	}

	pub fn settle(&self) -> Duration {
		Duration::from_millis(self.settle_millis)
	}
}
