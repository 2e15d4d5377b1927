//! Listing extraction: the deployments table, parsed into snapshots.
//!
//! Parsing is a pure function of the table markup. Rows are scanned with
//! small regexes, cell text is flattened (tags stripped, entities decoded,
//! line breaks preserved where the console stacks a label over a
//! timestamp), and each surviving row becomes a [`DeploymentSnapshot`]
//! stamped with the extraction time.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use tracing::{debug, warn};

use crate::console::Console;
use crate::error::{ConsoleError, ExtractError};
use crate::model::DeploymentSnapshot;

static ROW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("ROW_RE should compile"));
static CELL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("CELL_RE should compile"));
static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("BREAK_RE should compile"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("TAG_RE should compile"));

/// Minimum cells for a data row: plan, environment, status, details.
const REQUIRED_CELLS: usize = 4;

/// Navigation, bounded table wait, and parse, against an authenticated
/// console session.
pub struct ExtractOptions {
	pub listing_url: String,
	pub table_selector: String,
	pub table_timeout: Duration,
	pub navigation_timeout: Duration,
}

pub async fn extract_snapshots(console: &dyn Console, options: &ExtractOptions) -> Result<Vec<DeploymentSnapshot>, ExtractError> {
	console
		.goto(&options.listing_url, options.navigation_timeout)
		.await
		.map_err(|e| match e {
			ConsoleError::Navigation { url, message } => ExtractError::Navigation(format!("{url}: {message}")),
			ConsoleError::Timeout(message) => ExtractError::Navigation(message),
			other => ExtractError::Console(other),
		})?;

	console
		.wait_for_selector(&options.table_selector, options.table_timeout)
		.await
		.map_err(|e| match e {
			ConsoleError::Timeout(_) => ExtractError::TableTimeout {
				selector: options.table_selector.clone(),
				timeout: options.table_timeout,
			},
			other => ExtractError::Console(other),
		})?;

	let html = console
		.outer_html(&options.table_selector)
		.await?
		.ok_or_else(|| ExtractError::TableTimeout {
			selector: options.table_selector.clone(),
			timeout: options.table_timeout,
		})?;

	let snapshots = parse_listing_table(&html, Utc::now());
	debug!(target = "dw.extract", count = snapshots.len(), "extracted snapshots");
	Ok(snapshots)
}

/// Parses the listing table markup into snapshots.
///
/// Header rows (those carrying `<th>` cells) are excluded structurally.
/// Rows with fewer than four cells are logged and skipped; rows whose plan
/// or environment is blank after trimming are dropped silently. One bad
/// row never aborts the rest.
pub fn parse_listing_table(html: &str, observed_at: DateTime<Utc>) -> Vec<DeploymentSnapshot> {
	let mut snapshots = Vec::new();

	for (index, row) in ROW_RE.captures_iter(html).enumerate() {
		let Some(body) = row.get(1).map(|m| m.as_str()) else {
			continue;
		};
		if body.to_lowercase().contains("<th") {
			continue;
		}

		let cells: Vec<String> = CELL_RE
			.captures_iter(body)
			.filter_map(|c| c.get(1).map(|m| cell_text(m.as_str())))
			.collect();

		if cells.len() < REQUIRED_CELLS {
			warn!(target = "dw.extract", row = index, cells = cells.len(), "malformed row skipped");
			continue;
		}

		let plan_name = cells[0].trim();
		let deployed_to = cells[1].trim();
		if plan_name.is_empty() || deployed_to.is_empty() {
			continue;
		}

		snapshots.push(DeploymentSnapshot::from_cells(
			plan_name,
			deployed_to,
			&cells[2],
			cells[3].trim(),
			observed_at,
		));
	}

	snapshots
}

/// Flattens one cell's markup to text. `<br>` becomes a newline so status
/// cleaning can discard the stacked timestamp lines; all other tags are
/// stripped and entities decoded.
fn cell_text(markup: &str) -> String {
	let broken = BREAK_RE.replace_all(markup, "\n");
	let stripped = TAG_RE.replace_all(&broken, "");
	decode_entities(&stripped)
		.lines()
		.map(str::trim)
		.collect::<Vec<_>>()
		.join("\n")
		.trim()
		.to_string()
}

/// The handful of entities the console actually emits.
fn decode_entities(s: &str) -> String {
	s.replace("&amp;", "&")
		.replace("&lt;", "<")
		.replace("&gt;", ">")
		.replace("&quot;", "\"")
		.replace("&#39;", "'")
		.replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::MULTI_APP_SENTINEL;

	fn table(rows: &str) -> String {
		format!("<table id=\"deployments\"><tr><th>Plan</th><th>Environment</th><th>Status</th><th>Details</th></tr>{rows}</table>")
	}

	#[test]
	fn parses_well_formed_rows_and_skips_malformed_ones() {
		let html = table(
			"<tr><td>billing</td><td>Production</td><td>Running</td><td>AppOne</td></tr>\
			 <tr><td>orphan</td><td>Homologation</td><td>Queued</td></tr>",
		);
		let snapshots = parse_listing_table(&html, Utc::now());
		assert_eq!(snapshots.len(), 1);
		assert_eq!(snapshots[0].plan_name, "billing");
		assert_eq!(snapshots[0].deployed_to, "Production");
		assert_eq!(snapshots[0].status, "Running");
		assert_eq!(snapshots[0].processed_details, "AppOne");
	}

	#[test]
	fn header_row_is_excluded_structurally() {
		let html = table("<tr><td>plan</td><td>env</td><td>Queued</td><td>App</td></tr>");
		let snapshots = parse_listing_table(&html, Utc::now());
		assert_eq!(snapshots.len(), 1);
	}

	#[test]
	fn status_timestamp_lines_are_dropped() {
		let html = table("<tr><td>billing</td><td>Production</td><td>Finished<br/>21/May 10:04</td><td>AppOne</td></tr>");
		let snapshots = parse_listing_table(&html, Utc::now());
		assert_eq!(snapshots[0].status, "Finished");
	}

	#[test]
	fn nested_markup_and_entities_are_flattened() {
		let html = table("<tr><td><a href=\"/p\">billing&nbsp;api</a></td><td><span>Production</span></td><td><b>Running</b></td><td>AppOne, AppTwo</td></tr>");
		let snapshots = parse_listing_table(&html, Utc::now());
		assert_eq!(snapshots[0].plan_name, "billing api");
		assert_eq!(snapshots[0].processed_details, MULTI_APP_SENTINEL);
	}

	#[test]
	fn rows_missing_plan_or_environment_are_dropped_silently() {
		let html = table(
			"<tr><td>  </td><td>Production</td><td>Queued</td><td>App</td></tr>\
			 <tr><td>billing</td><td></td><td>Queued</td><td>App</td></tr>",
		);
		assert!(parse_listing_table(&html, Utc::now()).is_empty());
	}

	#[test]
	fn empty_table_yields_no_snapshots() {
		assert!(parse_listing_table(&table(""), Utc::now()).is_empty());
	}

	#[tokio::test]
	async fn extraction_fails_with_table_timeout_when_table_never_appears() {
		let state = std::sync::Arc::new(parking_lot::Mutex::new(crate::console::testing::FakeState {
			authenticated: true,
			table_html: None,
			..Default::default()
		}));
		let console = crate::console::testing::FakeConsole {
			state: std::sync::Arc::clone(&state),
		};
		let options = ExtractOptions {
			listing_url: "https://console.test/deployments".to_string(),
			table_selector: "table#deployments".to_string(),
			table_timeout: Duration::from_millis(50),
			navigation_timeout: Duration::from_millis(50),
		};
		let err = extract_snapshots(&console, &options).await.unwrap_err();
		assert!(matches!(err, ExtractError::TableTimeout { .. }));
	}

	#[tokio::test]
	async fn extraction_parses_the_live_table() {
		let html = table("<tr><td>billing</td><td>Production</td><td>Running</td><td>AppOne</td></tr>");
		let state = std::sync::Arc::new(parking_lot::Mutex::new(crate::console::testing::FakeState {
			authenticated: true,
			table_html: Some(html),
			..Default::default()
		}));
		let console = crate::console::testing::FakeConsole { state };
		let options = ExtractOptions {
			listing_url: "https://console.test/deployments".to_string(),
			table_selector: "table#deployments".to_string(),
			table_timeout: Duration::from_millis(50),
			navigation_timeout: Duration::from_millis(50),
		};
		let snapshots = extract_snapshots(&console, &options).await.unwrap();
		assert_eq!(snapshots.len(), 1);
	}
}
