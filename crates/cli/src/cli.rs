use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "deploywatch")]
#[command(about = "Deployment watcher for a browser-rendered release console")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Configuration file
	#[arg(short, long, global = true, default_value = "deploywatch.json", value_name = "FILE")]
	pub config: PathBuf,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Poll the console on the configured interval until interrupted
	Watch,

	/// Run a single refresh cycle and report what changed
	Refresh,

	/// List all tracked deployments, most recently updated first
	#[command(alias = "ls")]
	List,

	/// List deployments with a pending, unnotified status change
	Changed,

	/// List deployments currently running
	Running,

	/// List deployments for one environment
	Env {
		/// Environment label (case-insensitive substring match)
		environment: String,
	},

	/// List deployments updated within the last N hours
	Since {
		#[arg(default_value = "24")]
		hours: i64,
	},

	/// Search plan names, statuses, details, and environments
	Search { term: String },

	/// Mark a deployment's status change as notified
	Ack {
		/// Plan name
		plan: String,
		/// Environment the plan deployed to
		environment: String,
	},

	/// Summaries grouped by application and environment
	Stats,
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn cli_definition_is_consistent() {
		Cli::command().debug_assert();
	}

	#[test]
	fn defaults_apply_to_global_flags() {
		let cli = Cli::parse_from(["deploywatch", "list"]);
		assert_eq!(cli.verbose, 0);
		assert_eq!(cli.config, std::path::PathBuf::from("deploywatch.json"));
		assert!(matches!(cli.command, Commands::List));
	}

	#[test]
	fn since_defaults_to_a_day() {
		let cli = Cli::parse_from(["deploywatch", "since"]);
		assert!(matches!(cli.command, Commands::Since { hours: 24 }));
	}
}
