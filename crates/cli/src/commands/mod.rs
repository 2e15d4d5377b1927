mod ack;
mod query;
mod refresh;
mod stats;
mod watch;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use dw_core::console::CdpConnector;
use dw_core::{DeploymentRecord, JsonStore, SessionManager, WatchConfig, Watcher};

use crate::cli::Commands;

pub async fn dispatch(command: Commands, config_path: &Path) -> Result<()> {
	// Console commands need validated credentials; store queries do not.
	let config = match command {
		Commands::Watch | Commands::Refresh => WatchConfig::load(config_path)?,
		_ => WatchConfig::load_readonly(config_path)?,
	};
	match command {
		Commands::Watch => watch::execute(config).await,
		Commands::Refresh => refresh::execute(config).await,
		Commands::List => query::list_all(&config),
		Commands::Changed => query::list_changed(&config),
		Commands::Running => query::list_running(&config),
		Commands::Env { environment } => query::list_by_environment(&config, &environment),
		Commands::Since { hours } => query::list_since(&config, hours),
		Commands::Search { term } => query::search(&config, &term),
		Commands::Ack { plan, environment } => ack::execute(&config, &plan, &environment),
		Commands::Stats => stats::execute(&config),
	}
}

fn open_store(config: &WatchConfig) -> Result<JsonStore> {
	Ok(JsonStore::open(&config.store_path)?)
}

fn build_watcher(config: WatchConfig) -> Result<Watcher> {
	let store = Arc::new(open_store(&config)?);
	let connector = CdpConnector::new(config.headless, config.browser_executable.clone());
	let session = SessionManager::new(config, Box::new(connector));
	Ok(Watcher::new(session, store))
}

fn print_records(records: &[DeploymentRecord]) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(records)?);
	Ok(())
}
