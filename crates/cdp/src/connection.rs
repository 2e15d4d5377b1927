//! WebSocket connection to the DevTools endpoint.
//!
//! Correlates command responses with pending requests by id. Ids are
//! generated from an atomic counter and each in-flight command parks on a
//! oneshot channel until the reader task dispatches its reply. Events are
//! logged at trace level and otherwise ignored; this client only drives
//! pages, it does not subscribe to browser state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, trace};

use crate::error::{CdpError, Result};

/// Hard ceiling on a single command round-trip. Individual waits (selector
/// polling, navigation settle) are bounded separately by their callers.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct CdpRequest<'a> {
	id: u32,
	method: &'a str,
	params: Value,
	#[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
	session_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CdpResponse {
	id: u32,
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<CdpErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct CdpErrorPayload {
	code: i64,
	message: String,
}

#[derive(Debug, Deserialize)]
struct CdpEvent {
	method: String,
	#[serde(default)]
	params: Value,
}

/// Messages with an `id` are command responses; the rest are events.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CdpMessage {
	Response(CdpResponse),
	Event(CdpEvent),
}

/// Shared connection to one browser's DevTools endpoint.
///
/// Thread-safe behind `Arc`; concurrent commands from multiple sessions are
/// supported, each correlated by its own id.
pub struct Connection {
	last_id: AtomicU32,
	callbacks: Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>,
	outgoing: mpsc::UnboundedSender<String>,
}

impl Connection {
	/// Opens the WebSocket and spawns the writer and reader tasks.
	pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
		let (stream, _) = tokio_tungstenite::connect_async(ws_url)
			.await
			.map_err(|e| CdpError::Transport(format!("connect to {ws_url}: {e}")))?;
		let (mut sink, mut source) = stream.split();
		let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();

		let connection = Arc::new(Self {
			last_id: AtomicU32::new(0),
			callbacks: Mutex::new(HashMap::new()),
			outgoing,
		});

		tokio::spawn(async move {
			while let Some(payload) = outgoing_rx.recv().await {
				if sink.send(WsMessage::Text(payload)).await.is_err() {
					break;
				}
			}
		});

		let reader = Arc::clone(&connection);
		tokio::spawn(async move {
			while let Some(frame) = source.next().await {
				match frame {
					Ok(WsMessage::Text(text)) => reader.dispatch(&text),
					Ok(WsMessage::Close(_)) => break,
					Ok(_) => {}
					Err(e) => {
						debug!(target = "dw.cdp", error = %e, "websocket read failed");
						break;
					}
				}
			}
			reader.fail_pending();
		});

		Ok(connection)
	}

	/// Sends one command and awaits its response.
	///
	/// `session_id` routes the command to an attached target (flat session
	/// mode); `None` addresses the browser itself.
	pub async fn send(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
		let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, tx);

		let request = CdpRequest {
			id,
			method,
			params,
			session_id,
		};
		let payload = serde_json::to_string(&request)?;
		if self.outgoing.send(payload).is_err() {
			self.callbacks.lock().remove(&id);
			return Err(CdpError::ChannelClosed);
		}

		match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(CdpError::ChannelClosed),
			Err(_) => {
				self.callbacks.lock().remove(&id);
				Err(CdpError::Timeout(format!("no response to {method} within {COMMAND_TIMEOUT:?}")))
			}
		}
	}

	fn dispatch(&self, raw: &str) {
		match serde_json::from_str::<CdpMessage>(raw) {
			Ok(CdpMessage::Response(response)) => {
				let Some(callback) = self.callbacks.lock().remove(&response.id) else {
					debug!(target = "dw.cdp", id = response.id, "response for unknown request");
					return;
				};
				let result = match response.error {
					Some(error) => Err(parse_protocol_error(error)),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = callback.send(result);
			}
			Ok(CdpMessage::Event(event)) => {
				trace!(target = "dw.cdp", method = %event.method, params = %event.params, "event");
			}
			Err(e) => {
				debug!(target = "dw.cdp", error = %e, "unparseable frame");
			}
		}
	}

	/// Fails every in-flight command once the socket is gone.
	fn fail_pending(&self) {
		let pending: Vec<_> = self.callbacks.lock().drain().collect();
		for (_, callback) in pending {
			let _ = callback.send(Err(CdpError::TargetClosed("devtools connection closed".to_string())));
		}
	}
}

fn parse_protocol_error(error: CdpErrorPayload) -> CdpError {
	let message = format!("{} (code {})", error.message, error.code);
	if error.message.contains("No target with given id") || error.message.contains("Session with given id not found") {
		CdpError::TargetClosed(message)
	} else {
		CdpError::Protocol(message)
	}
}
