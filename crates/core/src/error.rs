//! Error taxonomy for the extraction and reconciliation engine.
//!
//! Authentication and extraction failures abort only the refresh cycle that
//! hit them; the scheduler retries on its next tick. Store failures
//! propagate, since silently dropping a write would desynchronize persisted
//! state from the console.

use std::time::Duration;

use thiserror::Error;

use dw_cdp::CdpError;

/// Failure surfaced by the console abstraction (navigation, evaluation,
/// bounded waits), independent of which engine component hit it.
#[derive(Debug, Error)]
pub enum ConsoleError {
	#[error("navigation to {url} failed: {message}")]
	Navigation { url: String, message: String },

	#[error("timed out: {0}")]
	Timeout(String),

	#[error("console protocol error: {0}")]
	Protocol(String),

	#[error("console session is gone: {0}")]
	Closed(String),
}

impl From<CdpError> for ConsoleError {
	fn from(err: CdpError) -> Self {
		match err {
			CdpError::Navigation { url, message } => Self::Navigation { url, message },
			CdpError::Timeout(message) => Self::Timeout(message),
			CdpError::TargetClosed(message) => Self::Closed(message),
			CdpError::ChannelClosed => Self::Closed("connection closed".to_string()),
			other => Self::Protocol(other.to_string()),
		}
	}
}

/// Authentication failures. Each aborts the current refresh cycle; none are
/// retried internally.
#[derive(Debug, Error)]
pub enum AuthError {
	#[error("timed out locating login fields after {0:?}")]
	FieldTimeout(Duration),

	#[error("post-submit verification failed; still unauthenticated at {url}")]
	VerificationFailed { url: String },

	#[error("login navigation failed: {0}")]
	Navigation(String),

	#[error(transparent)]
	Console(#[from] ConsoleError),
}

/// Extraction failures. The caller converts these into an empty snapshot
/// batch plus a failed-cycle summary rather than a process failure.
#[derive(Debug, Error)]
pub enum ExtractError {
	#[error("listing table {selector:?} did not appear within {timeout:?}")]
	TableTimeout { selector: String, timeout: Duration },

	#[error("listing navigation failed: {0}")]
	Navigation(String),

	#[error(transparent)]
	Console(#[from] ConsoleError),
}

/// Store-layer failures. Fatal to the current cycle and propagated.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("store io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("store serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("store file {path} is not usable: {message}")]
	Corrupt { path: String, message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config {path}: {source}")]
	Read {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config {path}: {source}")]
	Parse {
		path: String,
		#[source]
		source: serde_json::Error,
	},

	#[error("config {path} is incomplete: {message}")]
	Invalid { path: String, message: String },
}
