//! Browser executable discovery and process launch.
//!
//! A launch is not done when the process spawns; it is done when the
//! DevTools endpoint on the port we handed the browser starts answering.
//! The readiness poll owns that wait, watching the child so a crashed
//! browser fails fast instead of running out the clock.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CdpError, Result};

const READINESS_POLL: Duration = Duration::from_millis(250);
const READINESS_ATTEMPTS: u32 = 40;
const PROBE_TIMEOUT: Duration = Duration::from_millis(400);

/// Where a freshly launched browser can be driven from.
#[derive(Debug)]
pub struct DebuggerEndpoint {
	pub ws_url: String,
	pub browser: Option<String>,
}

/// Subset of the `/json/version` document the endpoint serves once up.
#[derive(Debug, Deserialize)]
struct VersionPayload {
	#[serde(rename = "webSocketDebuggerUrl")]
	web_socket_debugger_url: String,
	#[serde(rename = "Browser")]
	browser: Option<String>,
}

/// Locates a Chromium-family executable on this machine.
pub fn find_browser_executable() -> Option<String> {
	let candidates: Vec<String> = if cfg!(target_os = "macos") {
		vec![
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
			"/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	} else {
		vec![
			"google-chrome-stable",
			"google-chrome",
			"chromium-browser",
			"chromium",
			"brave-browser",
			"/usr/bin/google-chrome-stable",
			"/usr/bin/google-chrome",
			"/usr/bin/chromium-browser",
			"/usr/bin/chromium",
			"/snap/bin/chromium",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	};

	for candidate in candidates {
		if candidate.starts_with('/') {
			if Path::new(&candidate).exists() {
				return Some(candidate);
			}
		} else if which::which(&candidate).is_ok() {
			return Some(candidate);
		}
	}

	None
}

/// Spawns the browser with remote debugging enabled and polls until its
/// DevTools endpoint answers. Returns the child and where to attach.
pub async fn launch_browser(
	executable: &str,
	port: u16,
	user_data_dir: &Path,
	headless: bool,
) -> Result<(Child, DebuggerEndpoint)> {
	let mut args = vec![
		format!("--remote-debugging-port={port}"),
		format!("--user-data-dir={}", user_data_dir.display()),
		"--no-first-run".to_string(),
		"--no-default-browser-check".to_string(),
	];
	if headless {
		args.push("--headless=new".to_string());
		args.push("--disable-gpu".to_string());
	}

	let mut cmd = Command::new(executable);
	cmd.args(&args).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

	#[cfg(unix)]
	std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

	let mut child = cmd
		.spawn()
		.map_err(|e| CdpError::Launch(format!("failed to launch {executable}: {e}")))?;

	let client = reqwest::Client::builder()
		.timeout(PROBE_TIMEOUT)
		.build()
		.map_err(|e| CdpError::Launch(format!("failed to build readiness probe client: {e}")))?;
	// The browser binds its debugging endpoint to loopback on the port we
	// chose for it, so readiness is one URL starting to answer.
	let version_url = format!("http://127.0.0.1:{port}/json/version");

	let mut last_failure = "endpoint never answered".to_string();
	for _ in 0..READINESS_ATTEMPTS {
		tokio::time::sleep(READINESS_POLL).await;

		if let Ok(Some(status)) = child.try_wait() {
			return Err(CdpError::Launch(format!(
				"browser exited before the debugging endpoint became available (status: {status})"
			)));
		}

		match probe_endpoint(&client, &version_url).await {
			Ok(endpoint) => return Ok((child, endpoint)),
			Err(failure) => last_failure = failure,
		}
	}

	let _ = child.kill();
	let _ = child.wait();
	Err(CdpError::Launch(format!(
		"browser never became ready on port {port}: {last_failure}"
	)))
}

async fn probe_endpoint(client: &reqwest::Client, url: &str) -> std::result::Result<DebuggerEndpoint, String> {
	let response = client.get(url).send().await.map_err(|e| e.to_string())?;
	if !response.status().is_success() {
		return Err(format!("endpoint answered {}", response.status()));
	}
	let payload: VersionPayload = response.json().await.map_err(|e| format!("bad version payload: {e}"))?;
	Ok(DebuggerEndpoint {
		ws_url: payload.web_socket_debugger_url,
		browser: payload.browser,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn executable_discovery_does_not_panic() {
		// Result depends on the host; the call itself must be safe anywhere.
		let _ = find_browser_executable();
	}

	#[test]
	fn version_payload_yields_the_attach_url() {
		let raw = r#"{
			"Browser": "Chrome/126.0.6478.55",
			"Protocol-Version": "1.3",
			"webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc-123"
		}"#;
		let payload: VersionPayload = serde_json::from_str(raw).unwrap();
		assert_eq!(payload.web_socket_debugger_url, "ws://127.0.0.1:9222/devtools/browser/abc-123");
		assert_eq!(payload.browser.as_deref(), Some("Chrome/126.0.6478.55"));
	}

	#[test]
	fn version_payload_tolerates_a_missing_browser_field() {
		let raw = r#"{"webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"}"#;
		let payload: VersionPayload = serde_json::from_str(raw).unwrap();
		assert!(payload.browser.is_none());
	}
}
