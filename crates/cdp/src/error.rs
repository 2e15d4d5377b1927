//! Error types for the DevTools client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CdpError>;

#[derive(Debug, Error)]
pub enum CdpError {
	/// Executable discovery, process spawn, or endpoint readiness failed.
	#[error("browser launch failed: {0}")]
	Launch(String),

	/// WebSocket transport failure.
	#[error("transport error: {0}")]
	Transport(String),

	/// The browser answered a command with an error payload.
	#[error("protocol error: {0}")]
	Protocol(String),

	/// Navigation was rejected or never completed.
	#[error("navigation to {url} failed: {message}")]
	Navigation { url: String, message: String },

	/// A bounded wait elapsed without the condition becoming true.
	#[error("timed out: {0}")]
	Timeout(String),

	/// The browser or target went away mid-command.
	#[error("target closed: {0}")]
	TargetClosed(String),

	/// The response channel was dropped before a reply arrived.
	#[error("connection channel closed")]
	ChannelClosed,

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}
