//! Owned browser resource: process, DevTools connection, target management.

use std::net::TcpListener;
use std::process::Child;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{CdpError, Result};
use crate::launcher::{find_browser_executable, launch_browser};
use crate::page::Page;

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
	/// Run without a visible window. On by default for scraping.
	pub headless: bool,
	/// Explicit executable path; discovered from the host when absent.
	pub executable: Option<String>,
}

impl LaunchOptions {
	pub fn headless() -> Self {
		Self {
			headless: true,
			executable: None,
		}
	}
}

/// A launched browser. Owns the child process, its temporary profile
/// directory, and the DevTools connection. Dropping without `close` leaks
/// the process until the child is reaped, so callers tear down explicitly.
pub struct Browser {
	child: Child,
	connection: Arc<Connection>,
	// Held for its Drop; the profile dir is removed when the browser closes.
	_user_data_dir: TempDir,
}

impl Browser {
	pub async fn launch(options: LaunchOptions) -> Result<Self> {
		let executable = options
			.executable
			.or_else(find_browser_executable)
			.ok_or_else(|| CdpError::Launch("no Chrome or Chromium executable found; install one or configure the path".to_string()))?;

		let user_data_dir = tempfile::tempdir().map_err(|e| CdpError::Launch(format!("failed to create profile dir: {e}")))?;
		let port = pick_free_port()?;

		let (child, endpoint) = launch_browser(&executable, port, user_data_dir.path(), options.headless).await?;
		debug!(
			target = "dw.cdp",
			%executable,
			port,
			browser = endpoint.browser.as_deref().unwrap_or("unknown"),
			"browser launched"
		);

		let connection = Connection::connect(&endpoint.ws_url).await?;
		Ok(Self {
			child,
			connection,
			_user_data_dir: user_data_dir,
		})
	}

	/// Creates an isolated browser context and a page inside it.
	pub async fn new_page(&self) -> Result<Page> {
		let created = self
			.connection
			.send("Target.createBrowserContext", json!({}), None)
			.await?;
		let context_id = string_field(&created, "browserContextId")?;

		let target = self
			.connection
			.send(
				"Target.createTarget",
				json!({"url": "about:blank", "browserContextId": context_id}),
				None,
			)
			.await?;
		let target_id = string_field(&target, "targetId")?;

		let attached = self
			.connection
			.send("Target.attachToTarget", json!({"targetId": target_id, "flatten": true}), None)
			.await?;
		let session_id = string_field(&attached, "sessionId")?;

		self.connection.send("Page.enable", json!({}), Some(&session_id)).await?;
		self.connection.send("Runtime.enable", json!({}), Some(&session_id)).await?;

		Ok(Page::new(Arc::clone(&self.connection), session_id, target_id, context_id))
	}

	/// Disposes an isolated context after its page is closed.
	pub async fn dispose_context(&self, context_id: &str) -> Result<()> {
		self.connection
			.send("Target.disposeBrowserContext", json!({"browserContextId": context_id}), None)
			.await
			.map(|_| ())
	}

	/// Shuts the browser down. Asks politely over the protocol first, then
	/// reaps the child, killing it if it ignored the request.
	pub async fn close(mut self) {
		if let Err(e) = self.connection.send("Browser.close", json!({}), None).await {
			debug!(target = "dw.cdp", error = %e, "Browser.close failed; killing process");
		}
		match self.child.try_wait() {
			Ok(Some(_)) => {}
			_ => {
				if let Err(e) = self.child.kill() {
					warn!(target = "dw.cdp", error = %e, "failed to kill browser process");
				}
				let _ = self.child.wait();
			}
		}
	}
}

fn string_field(value: &serde_json::Value, field: &str) -> Result<String> {
	value[field]
		.as_str()
		.map(str::to_string)
		.ok_or_else(|| CdpError::Protocol(format!("missing {field} in response")))
}

/// Asks the OS for an ephemeral port. The listener is dropped before the
/// browser binds; the race window is acceptable for a local singleton.
fn pick_free_port() -> Result<u16> {
	let listener =
		TcpListener::bind(("127.0.0.1", 0)).map_err(|e| CdpError::Launch(format!("failed to reserve a debugging port: {e}")))?;
	let port = listener
		.local_addr()
		.map_err(|e| CdpError::Launch(format!("failed to read reserved port: {e}")))?
		.port();
	Ok(port)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn picked_ports_are_nonzero() {
		let port = pick_free_port().unwrap();
		assert_ne!(port, 0);
	}

	#[test]
	fn string_field_reports_missing_keys() {
		let value = json!({"targetId": "T1"});
		assert_eq!(string_field(&value, "targetId").unwrap(), "T1");
		let err = string_field(&value, "sessionId").unwrap_err();
		assert!(err.to_string().contains("sessionId"));
	}
}
