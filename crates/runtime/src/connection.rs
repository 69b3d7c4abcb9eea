//! JSON-RPC connection to a single CDP target.
//!
//! The connection splits the WebSocket into a writer fed by an unbounded
//! channel and a reader task that correlates responses to pending calls by
//! id and fans events out on a broadcast channel. Dropping the connection
//! aborts the reader and closes the socket.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{Result, RuntimeError};

/// Events are fanned out on a broadcast channel; network captures consume
/// bursts, so the buffer is generous. A lagged receiver drops the capture
/// rather than the connection.
const EVENT_CHANNEL_CAPACITY: usize = 8192;

/// A CDP event with its method name and raw params.
#[derive(Debug, Clone)]
pub struct CdpEvent {
	pub method: String,
	pub params: Value,
}

#[derive(Debug, Deserialize)]
struct Incoming {
	#[serde(default)]
	id: Option<u64>,
	#[serde(default)]
	method: Option<String>,
	#[serde(default)]
	params: Option<Value>,
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<IncomingError>,
}

#[derive(Debug, Deserialize)]
struct IncomingError {
	#[serde(default)]
	code: i64,
	#[serde(default)]
	message: String,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, (i64, String)>>>>>;

/// Live JSON-RPC session against one CDP target.
#[derive(Debug)]
pub struct CdpConnection {
	next_id: AtomicU64,
	pending: PendingMap,
	outbound: mpsc::UnboundedSender<Message>,
	events: broadcast::Sender<CdpEvent>,
	reader: JoinHandle<()>,
	writer: JoinHandle<()>,
}

impl CdpConnection {
	/// Connect to a target's `webSocketDebuggerUrl`.
	pub async fn connect(ws_url: &str) -> Result<Self> {
		let (stream, _) = connect_async(ws_url)
			.await
			.map_err(|e| RuntimeError::Connect(format!("{ws_url}: {e}")))?;
		let (mut sink, mut source) = stream.split();

		let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
		let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
		let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

		let writer = tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if sink.send(message).await.is_err() {
					break;
				}
			}
			let _ = sink.close().await;
		});

		let reader_pending = Arc::clone(&pending);
		let reader_events = events.clone();
		let reader = tokio::spawn(async move {
			while let Some(message) = source.next().await {
				let text = match message {
					Ok(Message::Text(text)) => text,
					Ok(Message::Close(_)) | Err(_) => break,
					Ok(_) => continue,
				};
				let incoming: Incoming = match serde_json::from_str(&text) {
					Ok(incoming) => incoming,
					Err(err) => {
						warn!(target = "surfwright.cdp", %err, "dropping malformed cdp frame");
						continue;
					}
				};
				if let Some(id) = incoming.id {
					let sender = reader_pending.lock().await.remove(&id);
					if let Some(sender) = sender {
						let outcome = match incoming.error {
							Some(error) => Err((error.code, error.message)),
							None => Ok(incoming.result.unwrap_or(Value::Null)),
						};
						let _ = sender.send(outcome);
					}
				} else if let Some(method) = incoming.method {
					trace!(target = "surfwright.cdp", %method, "event");
					let _ = reader_events.send(CdpEvent {
						method,
						params: incoming.params.unwrap_or(Value::Null),
					});
				}
			}
			// Wake every pending caller so nothing awaits a dead socket.
			reader_pending.lock().await.clear();
		});

		Ok(Self {
			next_id: AtomicU64::new(1),
			pending,
			outbound,
			events,
			reader,
			writer,
		})
	}

	/// Issue a CDP method call and await its result within `timeout`.
	pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (sender, receiver) = oneshot::channel();
		self.pending.lock().await.insert(id, sender);

		let frame = json!({ "id": id, "method": method, "params": params });
		debug!(target = "surfwright.cdp", %method, id, "call");
		if self.outbound.send(Message::Text(frame.to_string())).is_err() {
			self.pending.lock().await.remove(&id);
			return Err(RuntimeError::Closed);
		}

		match tokio::time::timeout(timeout, receiver).await {
			Ok(Ok(Ok(result))) => Ok(result),
			Ok(Ok(Err((code, message)))) => Err(RuntimeError::Call {
				method: method.to_string(),
				message: format!("{message} (code {code})"),
			}),
			Ok(Err(_)) => Err(RuntimeError::Closed),
			Err(_) => {
				self.pending.lock().await.remove(&id);
				Err(RuntimeError::CallTimeout {
					method: method.to_string(),
					ms: timeout.as_millis() as u64,
				})
			}
		}
	}

	/// Subscribe to the event stream. Each receiver sees events emitted
	/// after subscription only.
	pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
		self.events.subscribe()
	}
}

impl Drop for CdpConnection {
	fn drop(&mut self) {
		self.reader.abort();
		self.writer.abort();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn incoming_distinguishes_responses_from_events() {
		let response: Incoming = serde_json::from_str(r#"{"id":3,"result":{"ok":true}}"#).unwrap();
		assert_eq!(response.id, Some(3));
		assert!(response.method.is_none());

		let event: Incoming = serde_json::from_str(r#"{"method":"Network.loadingFinished","params":{"requestId":"1"}}"#).unwrap();
		assert!(event.id.is_none());
		assert_eq!(event.method.as_deref(), Some("Network.loadingFinished"));
	}

	#[test]
	fn incoming_carries_error_payload() {
		let failed: Incoming = serde_json::from_str(r#"{"id":9,"error":{"code":-32000,"message":"No node"}}"#).unwrap();
		let error = failed.error.unwrap();
		assert_eq!(error.code, -32000);
		assert_eq!(error.message, "No node");
	}

	#[tokio::test]
	async fn connect_to_dead_endpoint_fails() {
		let err = CdpConnection::connect("ws://127.0.0.1:1/devtools/page/dead").await.unwrap_err();
		assert!(matches!(err, RuntimeError::Connect(_)));
	}
}
