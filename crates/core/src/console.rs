//! The console seam: what the engine needs from an automation session.
//!
//! Session management and extraction talk to the target console through
//! this trait so the pipeline can be exercised against a scripted fake.
//! The production implementation drives a headless Chromium via `dw-cdp`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use dw_cdp::{Browser, LaunchOptions, Page};

use crate::error::ConsoleError;

/// A live page inside an authenticated (or soon-to-be) browser session.
#[async_trait]
pub trait Console: Send + Sync {
	/// Navigates and waits for the document to settle, bounded by `timeout`.
	async fn goto(&self, url: &str, timeout: Duration) -> Result<(), ConsoleError>;

	/// URL the page ended up on, after any redirects.
	async fn current_url(&self) -> Result<String, ConsoleError>;

	/// Waits for `selector` to match an element, bounded by `timeout`.
	async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), ConsoleError>;

	/// Outer HTML of the first element matching `selector`.
	async fn outer_html(&self, selector: &str) -> Result<Option<String>, ConsoleError>;

	/// Evaluates a boolean JavaScript expression in the page.
	async fn eval_bool(&self, expression: &str) -> Result<bool, ConsoleError>;

	/// PNG of the current viewport, for diagnostic artifacts.
	async fn screenshot(&self) -> Result<Vec<u8>, ConsoleError>;

	/// Releases the session. Page first, then its context, then the
	/// browser; failures releasing one resource must not block the rest.
	async fn close(&mut self);
}

/// Creates consoles on demand; the session manager acquires lazily on
/// first use and keeps the result across refresh cycles.
#[async_trait]
pub trait ConsoleConnector: Send + Sync {
	async fn connect(&self) -> Result<Box<dyn Console>, ConsoleError>;
}

/// Production console over the DevTools protocol.
pub struct CdpConsole {
	browser: Option<Browser>,
	page: Option<Page>,
}

impl CdpConsole {
	pub async fn launch(headless: bool, executable: Option<String>) -> Result<Self, ConsoleError> {
		let browser = Browser::launch(LaunchOptions { headless, executable }).await?;
		let page = browser.new_page().await?;
		Ok(Self {
			browser: Some(browser),
			page: Some(page),
		})
	}

	fn page(&self) -> Result<&Page, ConsoleError> {
		self.page.as_ref().ok_or_else(|| ConsoleError::Closed("console already closed".to_string()))
	}
}

#[async_trait]
impl Console for CdpConsole {
	async fn goto(&self, url: &str, timeout: Duration) -> Result<(), ConsoleError> {
		Ok(self.page()?.goto(url, timeout).await?)
	}

	async fn current_url(&self) -> Result<String, ConsoleError> {
		Ok(self.page()?.current_url().await?)
	}

	async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), ConsoleError> {
		Ok(self.page()?.wait_for_selector(selector, timeout).await?)
	}

	async fn outer_html(&self, selector: &str) -> Result<Option<String>, ConsoleError> {
		Ok(self.page()?.outer_html(selector).await?)
	}

	async fn eval_bool(&self, expression: &str) -> Result<bool, ConsoleError> {
		Ok(self.page()?.eval_bool(expression).await?)
	}

	async fn screenshot(&self) -> Result<Vec<u8>, ConsoleError> {
		Ok(self.page()?.screenshot().await?)
	}

	async fn close(&mut self) {
		let page = self.page.take();
		let browser = self.browser.take();

		let context_id = page.as_ref().map(|p| p.context_id().to_string());
		if let Some(page) = page {
			if let Err(e) = page.close().await {
				warn!(target = "dw.session", error = %e, "failed to close page");
			}
		}
		if let Some(browser) = browser {
			if let Some(context_id) = context_id {
				if let Err(e) = browser.dispose_context(&context_id).await {
					warn!(target = "dw.session", error = %e, "failed to dispose browser context");
				}
			}
			browser.close().await;
			debug!(target = "dw.session", "browser released");
		}
	}
}

/// Launches a fresh headless browser per session.
pub struct CdpConnector {
	headless: bool,
	executable: Option<String>,
}

impl CdpConnector {
	pub fn new(headless: bool, executable: Option<String>) -> Self {
		Self { headless, executable }
	}
}

#[async_trait]
impl ConsoleConnector for CdpConnector {
	async fn connect(&self) -> Result<Box<dyn Console>, ConsoleError> {
		Ok(Box::new(CdpConsole::launch(self.headless, self.executable.clone()).await?))
	}
}

#[cfg(test)]
pub(crate) mod testing {
	//! Scripted console for exercising the session and refresh pipeline.

	use std::sync::Arc;
	use std::time::Duration;

	use async_trait::async_trait;
	use parking_lot::Mutex;

	use super::{Console, ConsoleConnector};
	use crate::error::ConsoleError;

	#[derive(Debug)]
	pub struct FakeState {
		pub current_url: String,
		pub authenticated: bool,
		pub fields_present: bool,
		pub accept_submit: bool,
		pub table_html: Option<String>,
		pub goto_delay: Duration,
		pub screenshots: u32,
		pub connects: u32,
		pub active_gotos: u32,
		pub max_concurrent_gotos: u32,
		pub closed: bool,
	}

	impl Default for FakeState {
		fn default() -> Self {
			Self {
				current_url: "about:blank".to_string(),
				authenticated: false,
				fields_present: true,
				accept_submit: true,
				table_html: None,
				goto_delay: Duration::ZERO,
				screenshots: 0,
				connects: 0,
				active_gotos: 0,
				max_concurrent_gotos: 0,
				closed: false,
			}
		}
	}

	pub struct FakeConsole {
		pub state: Arc<Mutex<FakeState>>,
	}

	#[async_trait]
	impl Console for FakeConsole {
		async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), ConsoleError> {
			let delay = {
				let mut state = self.state.lock();
				state.active_gotos += 1;
				state.max_concurrent_gotos = state.max_concurrent_gotos.max(state.active_gotos);
				state.goto_delay
			};
			if delay > Duration::ZERO {
				tokio::time::sleep(delay).await;
			}
			let mut state = self.state.lock();
			state.active_gotos -= 1;
			// An unauthenticated hit on a protected page redirects to login.
			state.current_url = if !url.contains("login") && !state.authenticated {
				format!("https://console.test/userlogin?next={url}")
			} else if url.contains("login") && state.authenticated {
				"https://console.test/dashboard".to_string()
			} else {
				url.to_string()
			};
			Ok(())
		}

		async fn current_url(&self) -> Result<String, ConsoleError> {
			Ok(self.state.lock().current_url.clone())
		}

		async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), ConsoleError> {
			if self.state.lock().table_html.is_some() {
				Ok(())
			} else {
				Err(ConsoleError::Timeout(format!("selector {selector:?} not present within {timeout:?}")))
			}
		}

		async fn outer_html(&self, _selector: &str) -> Result<Option<String>, ConsoleError> {
			Ok(self.state.lock().table_html.clone())
		}

		async fn eval_bool(&self, expression: &str) -> Result<bool, ConsoleError> {
			let mut state = self.state.lock();
			if expression.contains("submit") {
				if state.accept_submit {
					state.authenticated = true;
				}
				Ok(true)
			} else {
				Ok(state.fields_present)
			}
		}

		async fn screenshot(&self) -> Result<Vec<u8>, ConsoleError> {
			let mut state = self.state.lock();
			state.screenshots += 1;
			Ok(vec![0x89, b'P', b'N', b'G'])
		}

		async fn close(&mut self) {
			self.state.lock().closed = true;
		}
	}

	pub struct FakeConnector {
		pub state: Arc<Mutex<FakeState>>,
	}

	impl FakeConnector {
		pub fn new(state: Arc<Mutex<FakeState>>) -> Self {
			Self { state }
		}
	}

	#[async_trait]
	impl ConsoleConnector for FakeConnector {
		async fn connect(&self) -> Result<Box<dyn Console>, ConsoleError> {
			self.state.lock().connects += 1;
			Ok(Box::new(FakeConsole {
				state: Arc::clone(&self.state),
			}))
		}
	}
}
