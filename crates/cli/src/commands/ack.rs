use anyhow::{Result, bail};

use dw_core::{WatchConfig, acknowledge_notification};

use super::open_store;

pub fn execute(config: &WatchConfig, plan: &str, environment: &str) -> Result<()> {
	let store = open_store(config)?;
	if !acknowledge_notification(&store, plan, environment)? {
		bail!("no deployment tracked for {plan} on {environment}");
	}
	println!("acknowledged {plan} on {environment}");
	Ok(())
}
