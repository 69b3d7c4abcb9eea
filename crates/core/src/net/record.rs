//! Live capture recording from CDP network events.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use surfwright_protocol::cdp::{
	LoadingFailed, LoadingFinished, RequestWillBeSent, ResponseReceived, WebSocketClosed, WebSocketCreated,
	WebSocketFrame,
};
use surfwright_runtime::CdpEvent;

use super::profile::CaptureOptions;
use super::redact::Redactor;
use crate::util::now_iso;

/// One captured request, start/end relative to capture start in ms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
	pub id: u64,
	pub capture_key: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub action_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub redirected_from_id: Option<u64>,
	pub url: String,
	pub method: String,
	#[serde(default)]
	pub resource_type: Option<String>,
	#[serde(default)]
	pub navigation: bool,
	pub start_ms: f64,
	#[serde(default)]
	pub end_ms: Option<f64>,
	#[serde(default)]
	pub duration_ms: Option<f64>,
	#[serde(default)]
	pub ttfb_ms: Option<f64>,
	#[serde(default)]
	pub status: Option<u16>,
	pub ok: bool,
	#[serde(default)]
	pub failure: Option<String>,
	#[serde(default)]
	pub bytes_approx: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_headers: Option<std::collections::BTreeMap<String, String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response_headers: Option<std::collections::BTreeMap<String, String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub post_data_preview: Option<String>,
}

impl RequestRecord {
	pub fn completed(&self) -> bool {
		self.end_ms.is_some()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsMessage {
	pub direction: WsDirection,
	pub at_ms: f64,
	pub opcode: u8,
	pub preview: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsDirection {
	Sent,
	Received,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketRecord {
	pub id: u64,
	pub url: String,
	pub created_ms: f64,
	#[serde(default)]
	pub closed_ms: Option<f64>,
	pub messages_sent: u64,
	pub messages_received: u64,
	#[serde(default)]
	pub messages: Vec<WsMessage>,
}

/// Seen-vs-kept counters for truncation hints.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureCounts {
	pub requests_seen: u64,
	pub requests_captured: u64,
	pub websockets_seen: u64,
	pub websockets_captured: u64,
	pub ws_messages_seen: u64,
	pub ws_messages_captured: u64,
}

/// The persisted result of a capture window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDocument {
	#[serde(default)]
	pub capture_id: Option<String>,
	pub session_id: String,
	pub target_id: String,
	pub started_at: String,
	pub options: CaptureOptions,
	pub requests: Vec<RequestRecord>,
	pub websockets: Vec<WebSocketRecord>,
	pub counts: CaptureCounts,
}

/// Accumulates CDP network events into a [`CaptureDocument`].
pub struct Recorder {
	options: CaptureOptions,
	redactor: Redactor,
	session_id: String,
	target_id: String,
	capture_id: Option<String>,
	action_id: Option<String>,
	started_at: String,
	base_ts: Option<f64>,
	next_id: u64,
	next_ws_id: u64,
	by_cdp_id: std::collections::HashMap<String, usize>,
	ws_by_cdp_id: std::collections::HashMap<String, usize>,
	requests: Vec<RequestRecord>,
	websockets: Vec<WebSocketRecord>,
	counts: CaptureCounts,
}

impl Recorder {
	pub fn new(
		options: CaptureOptions,
		redactor: Redactor,
		session_id: String,
		target_id: String,
		capture_id: Option<String>,
		action_id: Option<String>,
	) -> Self {
		Self {
			options,
			redactor,
			session_id,
			target_id,
			capture_id,
			action_id,
			started_at: now_iso(),
			base_ts: None,
			next_id: 1,
			next_ws_id: 1,
			by_cdp_id: Default::default(),
			ws_by_cdp_id: Default::default(),
			requests: Vec::new(),
			websockets: Vec::new(),
			counts: CaptureCounts::default(),
		}
	}

	fn rel_ms(&mut self, timestamp: f64) -> f64 {
		let base = *self.base_ts.get_or_insert(timestamp);
		((timestamp - base) * 1000.0).max(0.0)
	}

	fn capture_key(&self) -> String {
		self.capture_id.clone().unwrap_or_else(|| "live".to_string())
	}

	/// Feed one CDP event into the recording.
	pub fn on_event(&mut self, event: &CdpEvent) {
		match event.method.as_str() {
			"Network.requestWillBeSent" => {
				if let Ok(payload) = serde_json::from_value::<RequestWillBeSent>(event.params.clone()) {
					self.on_request(payload);
				}
			}
			"Network.responseReceived" => {
				if let Ok(payload) = serde_json::from_value::<ResponseReceived>(event.params.clone()) {
					self.on_response(payload);
				}
			}
			"Network.loadingFinished" => {
				if let Ok(payload) = serde_json::from_value::<LoadingFinished>(event.params.clone()) {
					self.on_finished(payload);
				}
			}
			"Network.loadingFailed" => {
				if let Ok(payload) = serde_json::from_value::<LoadingFailed>(event.params.clone()) {
					self.on_failed(payload);
				}
			}
			"Network.webSocketCreated" => {
				if let Ok(payload) = serde_json::from_value::<WebSocketCreated>(event.params.clone()) {
					self.on_ws_created(payload);
				}
			}
			"Network.webSocketFrameSent" => {
				if let Ok(payload) = serde_json::from_value::<WebSocketFrame>(event.params.clone()) {
					self.on_ws_frame(payload, WsDirection::Sent);
				}
			}
			"Network.webSocketFrameReceived" => {
				if let Ok(payload) = serde_json::from_value::<WebSocketFrame>(event.params.clone()) {
					self.on_ws_frame(payload, WsDirection::Received);
				}
			}
			"Network.webSocketClosed" => {
				if let Ok(payload) = serde_json::from_value::<WebSocketClosed>(event.params.clone()) {
					self.on_ws_closed(payload);
				}
			}
			_ => {}
		}
	}

	fn on_request(&mut self, payload: RequestWillBeSent) {
		// A redirect reuses the CDP request id; close out the old record
		// and chain the new one to it.
		let redirected_from = if payload.redirect_response.is_some() {
			let previous = self.by_cdp_id.get(&payload.request_id).copied();
			if let (Some(index), Some(redirect)) = (previous, &payload.redirect_response) {
				let end = self.rel_ms(payload.timestamp);
				let record = &mut self.requests[index];
				record.status = Some(redirect.status);
				record.end_ms = Some(end);
				record.duration_ms = Some(end - record.start_ms);
				record.ok = redirect.status < 400;
			}
			previous.map(|index| self.requests[index].id)
		} else {
			None
		};

		self.counts.requests_seen += 1;
		if self.requests.len() >= self.options.max_requests {
			return;
		}
		let start_ms = self.rel_ms(payload.timestamp);
		let record = RequestRecord {
			id: self.next_id,
			capture_key: self.capture_key(),
			action_id: self.action_id.clone(),
			redirected_from_id: redirected_from,
			url: payload.request.url.clone(),
			method: payload.request.method.to_uppercase(),
			resource_type: payload.resource_type.clone(),
			navigation: payload.resource_type.as_deref() == Some("Document"),
			start_ms,
			end_ms: None,
			duration_ms: None,
			ttfb_ms: None,
			status: None,
			ok: false,
			failure: None,
			bytes_approx: 0,
			request_headers: self
				.options
				.include_headers
				.then(|| self.redactor.headers(&payload.request.headers)),
			response_headers: None,
			post_data_preview: self
				.options
				.include_post_data
				.then(|| payload.request.post_data.as_deref().map(|d| self.redactor.post_data_preview(d)))
				.flatten(),
		};
		self.next_id += 1;
		self.counts.requests_captured += 1;
		self.by_cdp_id.insert(payload.request_id, self.requests.len());
		self.requests.push(record);
	}

	fn on_response(&mut self, payload: ResponseReceived) {
		let headers = self
			.options
			.include_headers
			.then(|| self.redactor.headers(&payload.response.headers));
		let Some(&index) = self.by_cdp_id.get(&payload.request_id) else {
			return;
		};
		let record = &mut self.requests[index];
		record.status = Some(payload.response.status);
		record.ok = payload.response.status < 400;
		record.response_headers = headers;
		if let Some(timing) = &payload.response.timing {
			if timing.receive_headers_end > 0.0 {
				record.ttfb_ms = Some(timing.receive_headers_end);
			}
		}
		if let Some(bytes) = payload.response.encoded_data_length {
			record.bytes_approx = bytes.max(0.0) as u64;
		}
	}

	fn on_finished(&mut self, payload: LoadingFinished) {
		let end = self.rel_ms(payload.timestamp);
		let Some(&index) = self.by_cdp_id.get(&payload.request_id) else {
			return;
		};
		let record = &mut self.requests[index];
		record.end_ms = Some(end);
		record.duration_ms = Some(end - record.start_ms);
		if payload.encoded_data_length > 0.0 {
			record.bytes_approx = payload.encoded_data_length as u64;
		}
		record.ok = record.status.map(|s| s < 400).unwrap_or(false);
	}

	fn on_failed(&mut self, payload: LoadingFailed) {
		let end = self.rel_ms(payload.timestamp);
		let Some(&index) = self.by_cdp_id.get(&payload.request_id) else {
			return;
		};
		let record = &mut self.requests[index];
		record.end_ms = Some(end);
		record.duration_ms = Some(end - record.start_ms);
		record.failure = Some(if payload.canceled {
			"canceled".to_string()
		} else {
			payload.error_text
		});
		record.ok = false;
	}

	fn on_ws_created(&mut self, payload: WebSocketCreated) {
		self.counts.websockets_seen += 1;
		if self.websockets.len() >= self.options.max_websockets {
			return;
		}
		let record = WebSocketRecord {
			id: self.next_ws_id,
			url: payload.url,
			created_ms: 0.0,
			closed_ms: None,
			messages_sent: 0,
			messages_received: 0,
			messages: Vec::new(),
		};
		self.next_ws_id += 1;
		self.counts.websockets_captured += 1;
		self.ws_by_cdp_id.insert(payload.request_id, self.websockets.len());
		self.websockets.push(record);
	}

	fn on_ws_frame(&mut self, payload: WebSocketFrame, direction: WsDirection) {
		self.counts.ws_messages_seen += 1;
		let at_ms = self.rel_ms(payload.timestamp);
		let include = self.options.include_ws_messages && self.counts.ws_messages_captured < self.options.max_ws_messages as u64;
		let preview = include.then(|| self.redactor.post_data_preview(&payload.response.payload_data));
		let Some(&index) = self.ws_by_cdp_id.get(&payload.request_id) else {
			return;
		};
		let record = &mut self.websockets[index];
		match direction {
			WsDirection::Sent => record.messages_sent += 1,
			WsDirection::Received => record.messages_received += 1,
		}
		if let Some(preview) = preview {
			record.messages.push(WsMessage {
				direction,
				at_ms,
				opcode: payload.response.opcode as u8,
				preview,
			});
			self.counts.ws_messages_captured += 1;
		}
	}

	fn on_ws_closed(&mut self, payload: WebSocketClosed) {
		let at_ms = self.rel_ms(payload.timestamp);
		if let Some(&index) = self.ws_by_cdp_id.get(&payload.request_id) {
			self.websockets[index].closed_ms = Some(at_ms);
		}
	}

	/// Tail projection of one event: a small NDJSON record, or `None` for
	/// events outside the filter.
	pub fn tail_record(&self, event: &CdpEvent, filters: &super::filter::NetworkFilters) -> Option<Value> {
		let request_id = event.params.get("requestId")?.as_str()?;
		let index = self.by_cdp_id.get(request_id).copied();
		let record = index.map(|i| &self.requests[i]);
		if let Some(record) = record {
			if !filters.matches(record) {
				return None;
			}
		}
		let kind = event.method.strip_prefix("Network.")?;
		let mut line = json!({ "event": kind, "requestId": request_id });
		if let Some(record) = record {
			line["id"] = json!(record.id);
			line["url"] = json!(record.url);
			line["method"] = json!(record.method);
			if let Some(status) = record.status {
				line["status"] = json!(status);
			}
		}
		Some(line)
	}

	pub fn finish(self) -> CaptureDocument {
		CaptureDocument {
			capture_id: self.capture_id,
			session_id: self.session_id,
			target_id: self.target_id,
			started_at: self.started_at,
			options: self.options,
			requests: self.requests,
			websockets: self.websockets,
			counts: self.counts,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::net::profile::{CaptureOptions, CaptureProfile};

	fn recorder(options: CaptureOptions) -> Recorder {
		Recorder::new(options, Redactor::default(), "s-1".into(), "T1".into(), Some("c-1".into()), None)
	}

	fn event(method: &str, params: Value) -> CdpEvent {
		CdpEvent {
			method: method.into(),
			params,
		}
	}

	fn request_event(id: &str, url: &str, ts: f64) -> CdpEvent {
		event(
			"Network.requestWillBeSent",
			json!({
				"requestId": id,
				"request": { "url": url, "method": "get", "headers": { "Authorization": "Bearer x" } },
				"timestamp": ts,
				"wallTime": 1700000000.0,
				"type": "XHR",
			}),
		)
	}

	#[test]
	fn request_lifecycle_produces_relative_times() {
		let mut options = CaptureOptions::for_profile(CaptureProfile::Api);
		options.include_headers = true;
		let mut rec = recorder(options);
		rec.on_event(&request_event("r1", "https://api.example.com/v1", 100.0));
		rec.on_event(&event(
			"Network.responseReceived",
			json!({
				"requestId": "r1",
				"response": { "url": "https://api.example.com/v1", "status": 200, "headers": {},
					"timing": { "requestTime": 100.0, "receiveHeadersEnd": 42.5 } },
				"timestamp": 100.05,
			}),
		));
		rec.on_event(&event(
			"Network.loadingFinished",
			json!({ "requestId": "r1", "timestamp": 100.2, "encodedDataLength": 2048.0 }),
		));

		let doc = rec.finish();
		let record = &doc.requests[0];
		assert_eq!(record.id, 1);
		assert_eq!(record.method, "GET");
		assert_eq!(record.start_ms, 0.0);
		assert!((record.end_ms.unwrap() - 200.0).abs() < 1.0);
		assert_eq!(record.status, Some(200));
		assert!(record.ok);
		assert_eq!(record.ttfb_ms, Some(42.5));
		assert_eq!(record.bytes_approx, 2048);
		assert_eq!(record.request_headers.as_ref().unwrap()["Authorization"], "[REDACTED]");
	}

	#[test]
	fn redirects_chain_records() {
		let mut rec = recorder(CaptureOptions::for_profile(CaptureProfile::Custom));
		rec.on_event(&request_event("r1", "https://a/old", 10.0));
		rec.on_event(&event(
			"Network.requestWillBeSent",
			json!({
				"requestId": "r1",
				"request": { "url": "https://a/new", "method": "GET", "headers": {} },
				"timestamp": 10.1,
				"redirectResponse": { "url": "https://a/old", "status": 302, "headers": {} },
				"type": "Document",
			}),
		));

		let doc = rec.finish();
		assert_eq!(doc.requests.len(), 2);
		assert_eq!(doc.requests[0].status, Some(302));
		assert!(doc.requests[0].completed());
		assert_eq!(doc.requests[1].redirected_from_id, Some(1));
		assert!(doc.requests[1].navigation);
	}

	#[test]
	fn request_cap_stops_capturing_but_keeps_counting() {
		let mut options = CaptureOptions::for_profile(CaptureProfile::Custom);
		options.max_requests = 2;
		let mut rec = recorder(options);
		for i in 0..5 {
			rec.on_event(&request_event(&format!("r{i}"), "https://a", 1.0 + i as f64));
		}
		let doc = rec.finish();
		assert_eq!(doc.requests.len(), 2);
		assert_eq!(doc.counts.requests_seen, 5);
		assert_eq!(doc.counts.requests_captured, 2);
	}

	#[test]
	fn failures_mark_records_not_ok() {
		let mut rec = recorder(CaptureOptions::for_profile(CaptureProfile::Custom));
		rec.on_event(&request_event("r1", "https://a", 5.0));
		rec.on_event(&event(
			"Network.loadingFailed",
			json!({ "requestId": "r1", "timestamp": 5.5, "errorText": "net::ERR_CONNECTION_REFUSED" }),
		));
		let doc = rec.finish();
		assert_eq!(doc.requests[0].failure.as_deref(), Some("net::ERR_CONNECTION_REFUSED"));
		assert!(!doc.requests[0].ok);
	}

	#[test]
	fn ws_messages_respect_inclusion_and_caps() {
		let mut options = CaptureOptions::for_profile(CaptureProfile::Ws);
		options.max_ws_messages = 2;
		let mut rec = recorder(options);
		rec.on_event(&event("Network.webSocketCreated", json!({ "requestId": "w1", "url": "wss://x/sock" })));
		for i in 0..4 {
			rec.on_event(&event(
				"Network.webSocketFrameReceived",
				json!({ "requestId": "w1", "timestamp": 1.0 + i as f64, "response": { "opcode": 1, "payloadData": "hello" } }),
			));
		}
		let doc = rec.finish();
		let ws = &doc.websockets[0];
		assert_eq!(ws.messages_received, 4);
		assert_eq!(ws.messages.len(), 2);
		assert_eq!(doc.counts.ws_messages_seen, 4);
		assert_eq!(doc.counts.ws_messages_captured, 2);
	}

	#[test]
	fn tail_record_applies_filters() {
		let mut rec = recorder(CaptureOptions::for_profile(CaptureProfile::Custom));
		let ev = request_event("r1", "https://api.example.com/v1", 1.0);
		rec.on_event(&ev);
		let pass = super::super::filter::NetworkFilters {
			url_contains: Some("api.".into()),
			..Default::default()
		};
		let line = rec.tail_record(&ev, &pass).unwrap();
		assert_eq!(line["event"], "requestWillBeSent");
		assert_eq!(line["url"], "https://api.example.com/v1");

		let block = super::super::filter::NetworkFilters {
			url_contains: Some("other".into()),
			..Default::default()
		};
		assert!(rec.tail_record(&ev, &block).is_none());
	}
}
