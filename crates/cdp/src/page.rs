//! Page handle bound to one attached target.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use crate::connection::Connection;
use crate::error::{CdpError, Result};

const READY_POLL: Duration = Duration::from_millis(100);
const SELECTOR_POLL: Duration = Duration::from_millis(200);

pub struct Page {
	connection: Arc<Connection>,
	session_id: String,
	target_id: String,
	context_id: String,
}

impl Page {
	pub(crate) fn new(connection: Arc<Connection>, session_id: String, target_id: String, context_id: String) -> Self {
		Self {
			connection,
			session_id,
			target_id,
			context_id,
		}
	}

	/// The isolated browser context this page lives in, for disposal after
	/// the page itself is closed.
	pub fn context_id(&self) -> &str {
		&self.context_id
	}

	async fn command(&self, method: &str, params: Value) -> Result<Value> {
		self.connection.send(method, params, Some(&self.session_id)).await
	}

	/// Navigates, waits for the document to become interactive, then for
	/// resource fetches to go quiet, all bounded by one deadline.
	pub async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
		let deadline = Instant::now() + timeout;
		let result = self
			.command("Page.navigate", json!({"url": url}))
			.await
			.map_err(|e| CdpError::Navigation {
				url: url.to_string(),
				message: e.to_string(),
			})?;

		if let Some(error_text) = result["errorText"].as_str() {
			if !error_text.is_empty() {
				return Err(CdpError::Navigation {
					url: url.to_string(),
					message: error_text.to_string(),
				});
			}
		}

		self.wait_for_ready_until(deadline).await?;
		self.wait_for_network_idle(deadline).await;
		Ok(())
	}

	/// Polls `document.readyState` until the page has settled.
	async fn wait_for_ready_until(&self, deadline: Instant) -> Result<()> {
		loop {
			let state = self.eval_string("document.readyState").await.unwrap_or_default();
			if state == "complete" || state == "interactive" {
				return Ok(());
			}
			if Instant::now() >= deadline {
				return Err(CdpError::Timeout("document never became ready before the navigation deadline".to_string()));
			}
			tokio::time::sleep(READY_POLL).await;
		}
	}

	/// Best-effort network quiesce: the resource-timing entry count holding
	/// steady across consecutive polls approximates idle without a network
	/// event subscription. The page is already usable at this point, so
	/// running out the deadline ends the wait rather than failing it;
	/// callers' bounded element waits cover content that lands late.
	async fn wait_for_network_idle(&self, deadline: Instant) {
		let mut tracker = IdleTracker::default();
		loop {
			let count = self
				.evaluate("performance.getEntriesByType('resource').length")
				.await
				.ok()
				.and_then(|v| v.as_u64());
			if let Some(count) = count {
				if tracker.observe(count) {
					return;
				}
			}
			if Instant::now() >= deadline {
				return;
			}
			tokio::time::sleep(READY_POLL).await;
		}
	}

	/// Evaluates an expression in the page, returning its JSON value.
	pub async fn evaluate(&self, expression: &str) -> Result<Value> {
		let result = self
			.command(
				"Runtime.evaluate",
				json!({"expression": expression, "returnByValue": true, "awaitPromise": true}),
			)
			.await?;

		if let Some(exception) = result.get("exceptionDetails") {
			let text = exception["exception"]["description"]
				.as_str()
				.or_else(|| exception["text"].as_str())
				.unwrap_or("unknown evaluation error");
			return Err(CdpError::Protocol(format!("evaluate failed: {text}")));
		}

		Ok(result["result"]["value"].clone())
	}

	pub async fn eval_string(&self, expression: &str) -> Result<String> {
		Ok(self.evaluate(expression).await?.as_str().unwrap_or_default().to_string())
	}

	pub async fn eval_bool(&self, expression: &str) -> Result<bool> {
		Ok(self.evaluate(expression).await?.as_bool().unwrap_or(false))
	}

	/// Polls until `selector` matches an element, bounded by `timeout`.
	pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
		let expression = format!("document.querySelector('{}') !== null", escape_js(selector));
		let deadline = Instant::now() + timeout;
		loop {
			if self.eval_bool(&expression).await.unwrap_or(false) {
				return Ok(());
			}
			if Instant::now() >= deadline {
				return Err(CdpError::Timeout(format!("selector {selector:?} not present within {timeout:?}")));
			}
			tokio::time::sleep(SELECTOR_POLL).await;
		}
	}

	/// Outer HTML of the first element matching `selector`, if any.
	pub async fn outer_html(&self, selector: &str) -> Result<Option<String>> {
		let expression = format!(
			"(() => {{ const el = document.querySelector('{}'); return el ? el.outerHTML : null; }})()",
			escape_js(selector)
		);
		let value = self.evaluate(&expression).await?;
		Ok(value.as_str().map(str::to_string))
	}

	pub async fn current_url(&self) -> Result<String> {
		self.eval_string("location.href").await
	}

	/// Captures a PNG of the current viewport.
	pub async fn screenshot(&self) -> Result<Vec<u8>> {
		let result = self.command("Page.captureScreenshot", json!({"format": "png"})).await?;
		let data = result["data"]
			.as_str()
			.ok_or_else(|| CdpError::Protocol("missing data in screenshot response".to_string()))?;
		BASE64
			.decode(data)
			.map_err(|e| CdpError::Protocol(format!("invalid screenshot payload: {e}")))
	}

	/// Closes the target. The owning context is disposed by the caller.
	pub async fn close(&self) -> Result<()> {
		self.connection
			.send("Target.closeTarget", json!({"targetId": self.target_id}), None)
			.await
			.map(|_| ())
	}
}

/// Tracks whether an observed counter has stopped moving.
#[derive(Debug, Default)]
struct IdleTracker {
	last: Option<u64>,
}

impl IdleTracker {
	/// True once the same count is seen on consecutive observations.
	fn observe(&mut self, count: u64) -> bool {
		let stable = self.last == Some(count);
		self.last = Some(count);
		stable
	}
}

/// Escapes a string for embedding inside a single-quoted JS literal.
pub fn escape_js(s: &str) -> String {
	s.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n").replace('\r', "")
}
