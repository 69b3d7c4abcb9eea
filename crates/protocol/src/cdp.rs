//! Shapes for the Chrome DevTools Protocol subset SurfWright drives.
//!
//! Field names match the wire exactly (camelCase), so every type carries
//! `#[serde(rename_all = "camelCase")]` and unknown fields are ignored on
//! deserialization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response body of `GET <origin>/json/version`.
///
/// Reachability requires `webSocketDebuggerUrl` to be present; the other
/// fields are diagnostics only.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
	#[serde(rename = "Browser", default)]
	pub browser: Option<String>,
	#[serde(rename = "Protocol-Version", default)]
	pub protocol_version: Option<String>,
	pub web_socket_debugger_url: Option<String>,
}

/// One entry of `GET <origin>/json/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEndpoint {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub web_socket_debugger_url: Option<String>,
}

impl PageEndpoint {
	pub fn is_page(&self) -> bool {
		self.kind == "page"
	}
}

/// `Target.getTargetInfo` result payload (`targetInfo`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
	pub target_id: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub attached: bool,
}

/// `Page.getFrameTree` node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTreeNode {
	pub frame: Frame,
	#[serde(default)]
	pub child_frames: Vec<FrameTreeNode>,
}

/// A single frame from the frame tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
	pub id: String,
	#[serde(default)]
	pub parent_id: Option<String>,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub security_origin: Option<String>,
	#[serde(default)]
	pub mime_type: Option<String>,
}

/// `Runtime.evaluate` result envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
	pub result: RemoteObject,
	#[serde(default)]
	pub exception_details: Option<ExceptionDetails>,
}

/// A remote object returned by value.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
	#[serde(rename = "type", default)]
	pub kind: String,
	#[serde(default)]
	pub subtype: Option<String>,
	#[serde(default)]
	pub value: Option<Value>,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub unserializable_value: Option<String>,
}

/// Exception details attached to a failed evaluation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
	#[serde(default)]
	pub text: String,
	#[serde(default)]
	pub line_number: Option<i64>,
	#[serde(default)]
	pub column_number: Option<i64>,
	#[serde(default)]
	pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
	/// One-line message for error reporting, preferring the thrown value's
	/// description over the generic `text`.
	pub fn message(&self) -> String {
		self.exception
			.as_ref()
			.and_then(|e| e.description.clone())
			.unwrap_or_else(|| self.text.clone())
	}
}

/// `Runtime.executionContextCreated` event payload (`context`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextDescription {
	pub id: i64,
	#[serde(default)]
	pub origin: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub aux_data: Option<ExecutionContextAuxData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextAuxData {
	#[serde(default)]
	pub is_default: bool,
	#[serde(default)]
	pub frame_id: Option<String>,
}

/// `Page.getLayoutMetrics` result (CSS pixels).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMetrics {
	#[serde(default)]
	pub css_content_size: Option<LayoutRect>,
	#[serde(default)]
	pub css_layout_viewport: Option<LayoutViewport>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRect {
	pub width: f64,
	pub height: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutViewport {
	pub client_width: f64,
	pub client_height: f64,
}

/// `Network.requestWillBeSent` event payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSent {
	pub request_id: String,
	pub request: NetworkRequest,
	#[serde(default)]
	pub timestamp: f64,
	#[serde(default)]
	pub wall_time: f64,
	#[serde(rename = "type", default)]
	pub resource_type: Option<String>,
	#[serde(default)]
	pub redirect_response: Option<NetworkResponse>,
	#[serde(default)]
	pub frame_id: Option<String>,
}

/// Request shape shared by network events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
	pub url: String,
	pub method: String,
	#[serde(default)]
	pub headers: serde_json::Map<String, Value>,
	#[serde(default)]
	pub post_data: Option<String>,
	#[serde(default)]
	pub has_post_data: Option<bool>,
}

/// `Network.responseReceived` event payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
	pub request_id: String,
	pub response: NetworkResponse,
	#[serde(default)]
	pub timestamp: f64,
	#[serde(rename = "type", default)]
	pub resource_type: Option<String>,
}

/// Response shape shared by network events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkResponse {
	#[serde(default)]
	pub url: String,
	pub status: u16,
	#[serde(default)]
	pub status_text: String,
	#[serde(default)]
	pub headers: serde_json::Map<String, Value>,
	#[serde(default)]
	pub mime_type: Option<String>,
	#[serde(default)]
	pub encoded_data_length: Option<f64>,
	#[serde(default)]
	pub timing: Option<ResourceTiming>,
}

/// Subset of `Network.ResourceTiming` used for TTFB computation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTiming {
	#[serde(default)]
	pub request_time: f64,
	#[serde(default)]
	pub receive_headers_end: f64,
}

/// `Network.loadingFinished` event payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFinished {
	pub request_id: String,
	#[serde(default)]
	pub timestamp: f64,
	#[serde(default)]
	pub encoded_data_length: f64,
}

/// `Network.loadingFailed` event payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFailed {
	pub request_id: String,
	#[serde(default)]
	pub timestamp: f64,
	#[serde(default)]
	pub error_text: String,
	#[serde(default)]
	pub canceled: bool,
}

/// `Network.webSocketCreated` event payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketCreated {
	pub request_id: String,
	pub url: String,
}

/// `Network.webSocketFrameSent` / `webSocketFrameReceived` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketFrame {
	pub request_id: String,
	#[serde(default)]
	pub timestamp: f64,
	pub response: WebSocketFrameData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketFrameData {
	#[serde(default)]
	pub opcode: f64,
	#[serde(default)]
	pub payload_data: String,
}

/// `Network.webSocketClosed` event payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketClosed {
	pub request_id: String,
	#[serde(default)]
	pub timestamp: f64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn version_info_requires_ws_url_field_presence_only() {
		let with: VersionInfo =
			serde_json::from_str(r#"{"Browser":"Chrome/126","webSocketDebuggerUrl":"ws://x/devtools/browser/1"}"#).unwrap();
		assert!(with.web_socket_debugger_url.is_some());

		let without: VersionInfo = serde_json::from_str(r#"{"Browser":"Chrome/126"}"#).unwrap();
		assert!(without.web_socket_debugger_url.is_none());
	}

	#[test]
	fn page_endpoint_type_field_maps_to_kind() {
		let ep: PageEndpoint = serde_json::from_str(
			r#"{"id":"AB12","type":"page","title":"t","url":"https://example.com","webSocketDebuggerUrl":"ws://h/devtools/page/AB12"}"#,
		)
		.unwrap();
		assert!(ep.is_page());
		assert_eq!(ep.id, "AB12");
	}

	#[test]
	fn exception_details_prefers_exception_description() {
		let details: ExceptionDetails = serde_json::from_str(
			r#"{"text":"Uncaught","exception":{"type":"object","description":"Error: boom"}}"#,
		)
		.unwrap();
		assert_eq!(details.message(), "Error: boom");
	}

	#[test]
	fn frame_tree_deserializes_nested_children() {
		let tree: FrameTreeNode = serde_json::from_str(
			r#"{"frame":{"id":"f1","url":"https://a"},"childFrames":[{"frame":{"id":"f2","parentId":"f1","url":"https://b"}}]}"#,
		)
		.unwrap();
		assert_eq!(tree.child_frames.len(), 1);
		assert_eq!(tree.child_frames[0].frame.parent_id.as_deref(), Some("f1"));
	}
}
