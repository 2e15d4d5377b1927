//! Session management against the authentication-gated console.
//!
//! One long-lived automation session is acquired lazily and reused across
//! refresh cycles. A login is trusted only while the configured timeout
//! window holds and the liveness probe (loading the protected listing URL
//! without being bounced to a login path) still passes; some consoles keep
//! pages reachable slightly past true session expiry, so the window wins
//! even when the probe alone would pass.

use std::fs;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::console::{Console, ConsoleConnector};
use crate::error::{AuthError, ConsoleError};

const FIELD_POLL: Duration = Duration::from_millis(250);

/// Finds a username and a password field with flexible matching: input
/// kind first, then name/id substrings.
const LOGIN_FIELDS_PROBE_JS: &str = r#"(() => {
	const hint = (el, names) => {
		const s = ((el.name || '') + ' ' + (el.id || '')).toLowerCase();
		return names.some(n => s.includes(n));
	};
	const inputs = Array.from(document.querySelectorAll('input'));
	const user = inputs.find(el => el.type === 'text' || el.type === 'email' || hint(el, ['user', 'login', 'email']));
	const pass = inputs.find(el => el.type === 'password' || hint(el, ['pass']));
	return !!(user && pass);
})()"#;

fn submit_script(username: &str, password: &str) -> String {
	let username = dw_cdp::page::escape_js(username);
	let password = dw_cdp::page::escape_js(password);
	format!(
		r#"(() => {{
	const hint = (el, names) => {{
		const s = ((el.name || '') + ' ' + (el.id || '')).toLowerCase();
		return names.some(n => s.includes(n));
	}};
	const inputs = Array.from(document.querySelectorAll('input'));
	const user = inputs.find(el => el.type === 'text' || el.type === 'email' || hint(el, ['user', 'login', 'email']));
	const pass = inputs.find(el => el.type === 'password' || hint(el, ['pass']));
	if (!user || !pass) return false;
	const set = (el, value) => {{
		el.value = value;
		el.dispatchEvent(new Event('input', {{ bubbles: true }}));
		el.dispatchEvent(new Event('change', {{ bubbles: true }}));
	}};
	set(user, '{username}');
	set(pass, '{password}');
	const button = document.querySelector("button[type='submit'], input[type='submit']")
		|| Array.from(document.querySelectorAll('button')).find(b => /log\s*in|sign\s*in|entrar/i.test(b.textContent || ''));
	if (button) {{ button.click(); }} else if (pass.form) {{ pass.form.submit(); }}
	return true;
}})()"#
	)
}

/// Paths the console redirects to when a session is not authenticated.
fn is_login_url(url: &str) -> bool {
	let url = url.to_lowercase();
	url.contains("login") || url.contains("signin") || url.contains("sign-in")
}

pub struct SessionManager {
	config: WatchConfig,
	connector: Box<dyn ConsoleConnector>,
	console: Option<Box<dyn Console>>,
	last_login: Option<Instant>,
}

impl SessionManager {
	pub fn new(config: WatchConfig, connector: Box<dyn ConsoleConnector>) -> Self {
		Self {
			config,
			connector,
			console: None,
			last_login: None,
		}
	}

	pub fn config(&self) -> &WatchConfig {
		&self.config
	}

	/// The live console, once acquired. Extraction borrows it from here;
	/// the session manager stays the owner.
	pub fn console(&self) -> Option<&dyn Console> {
		self.console.as_deref()
	}

	fn console_ref(&self) -> Result<&dyn Console, AuthError> {
		self.console
			.as_deref()
			.ok_or_else(|| AuthError::Console(ConsoleError::Closed("no console acquired".to_string())))
	}

	async fn acquire(&mut self) -> Result<(), AuthError> {
		if self.console.is_none() {
			debug!(target = "dw.session", "acquiring automation session");
			self.console = Some(self.connector.connect().await?);
		}
		Ok(())
	}

	/// Returns once the session is usable, logging in if the timeout window
	/// elapsed or the liveness probe fails.
	pub async fn ensure_authenticated(&mut self) -> Result<(), AuthError> {
		self.acquire().await?;

		let within_window = self.last_login.is_some_and(|at| at.elapsed() < self.config.session_timeout());
		if within_window && self.probe_liveness().await? {
			return Ok(());
		}

		if within_window {
			info!(target = "dw.session", "liveness probe failed; re-authenticating");
		}
		self.login().await
	}

	/// Full login flow. Idempotent: when the console already reports an
	/// authenticated state, credentials are not resubmitted. Never retries
	/// internally; a typed failure plus a diagnostic artifact is the whole
	/// contract.
	pub async fn login(&mut self) -> Result<(), AuthError> {
		self.acquire().await?;
		let console = self.console_ref()?;

		console
			.goto(&self.config.login_url, self.config.navigation_timeout())
			.await
			.map_err(login_navigation_error)?;

		let landed_on = console.current_url().await?;
		if !is_login_url(&landed_on) {
			debug!(target = "dw.session", url = %landed_on, "already authenticated; skipping credential submit");
			self.last_login = Some(Instant::now());
			return Ok(());
		}

		let field_timeout = self.config.field_timeout();
		let deadline = Instant::now() + field_timeout;
		loop {
			if console.eval_bool(LOGIN_FIELDS_PROBE_JS).await? {
				break;
			}
			if Instant::now() >= deadline {
				self.capture_artifact("field-timeout").await;
				return Err(AuthError::FieldTimeout(field_timeout));
			}
			tokio::time::sleep(FIELD_POLL).await;
		}

		console.eval_bool(&submit_script(&self.config.username, &self.config.password)).await?;
		tokio::time::sleep(self.config.settle()).await;

		if self.probe_liveness().await? {
			info!(target = "dw.session", "login succeeded");
			self.last_login = Some(Instant::now());
			Ok(())
		} else {
			let url = self.console_ref()?.current_url().await.unwrap_or_default();
			self.capture_artifact("login-verify").await;
			Err(AuthError::VerificationFailed { url })
		}
	}

	/// Loads the protected listing URL and checks the session was not
	/// bounced to a login path.
	async fn probe_liveness(&self) -> Result<bool, AuthError> {
		let console = self.console_ref()?;
		console
			.goto(&self.config.listing_url, self.config.navigation_timeout())
			.await
			.map_err(login_navigation_error)?;
		let url = console.current_url().await?;
		Ok(!is_login_url(&url))
	}

	/// Writes a rendered-page snapshot for a failed authentication step.
	/// Artifact problems are logged, never propagated; the typed auth
	/// failure is the signal that matters.
	async fn capture_artifact(&self, failure_kind: &str) {
		let Ok(console) = self.console_ref() else {
			return;
		};
		let url = console.current_url().await.unwrap_or_default();
		let bytes = match console.screenshot().await {
			Ok(bytes) => bytes,
			Err(e) => {
				warn!(target = "dw.session", kind = failure_kind, error = %e, "failed to capture diagnostic snapshot");
				return;
			}
		};

		let filename = format!("{failure_kind}-{}.png", Utc::now().format("%Y%m%d-%H%M%S"));
		let path = self.config.diagnostics_dir.join(filename);
		if let Err(e) = fs::create_dir_all(&self.config.diagnostics_dir) {
			warn!(target = "dw.session", error = %e, "failed to create diagnostics dir");
			return;
		}
		match fs::write(&path, bytes) {
			Ok(()) => warn!(
				target = "dw.session",
				kind = failure_kind,
				%url,
				path = %path.display(),
				"authentication failure; diagnostic artifact saved"
			),
			Err(e) => warn!(target = "dw.session", error = %e, "failed to write diagnostic artifact"),
		}
	}

	/// Releases the automation session. Safe to call repeatedly.
	pub async fn shutdown(&mut self) {
		if let Some(mut console) = self.console.take() {
			console.close().await;
		}
		self.last_login = None;
	}
}

fn login_navigation_error(err: ConsoleError) -> AuthError {
	match err {
		ConsoleError::Navigation { url, message } => AuthError::Navigation(format!("{url}: {message}")),
		ConsoleError::Timeout(message) => AuthError::Navigation(message),
		other => AuthError::Console(other),
	}
}
