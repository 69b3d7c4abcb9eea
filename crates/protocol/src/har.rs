//! HAR 1.2 document types for network exports.
//!
//! The shapes follow the published HAR 1.2 schema. SurfWright-internal
//! metadata rides along in `_surfwright`-prefixed extension fields, which
//! HAR consumers are required to ignore.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Har {
	pub log: HarLog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarLog {
	pub version: String,
	pub creator: HarCreator,
	pub pages: Vec<HarPage>,
	pub entries: Vec<HarEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarCreator {
	pub name: String,
	pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPage {
	pub started_date_time: String,
	pub id: String,
	pub title: String,
	pub page_timings: HarPageTimings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPageTimings {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub on_content_load: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub on_load: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
	pub started_date_time: String,
	pub time: f64,
	pub request: HarRequest,
	pub response: HarResponse,
	pub cache: serde_json::Value,
	pub timings: HarTimings,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pageref: Option<String>,
	/// Internal request id, stable across export and re-read.
	#[serde(rename = "_surfwrightRequestId", skip_serializing_if = "Option::is_none")]
	pub surfwright_request_id: Option<u64>,
	/// Resource type as reported by CDP.
	#[serde(rename = "_surfwrightResourceType", skip_serializing_if = "Option::is_none")]
	pub surfwright_resource_type: Option<String>,
	/// Set when the request never completed inside the capture window.
	#[serde(rename = "_surfwrightIncomplete", skip_serializing_if = "Option::is_none")]
	pub surfwright_incomplete: Option<bool>,
	/// Failure text for failed loads.
	#[serde(rename = "_surfwrightFailure", skip_serializing_if = "Option::is_none")]
	pub surfwright_failure: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
	pub method: String,
	pub url: String,
	pub http_version: String,
	pub headers: Vec<HarHeader>,
	pub query_string: Vec<HarHeader>,
	pub cookies: Vec<serde_json::Value>,
	pub headers_size: i64,
	pub body_size: i64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub post_data: Option<HarPostData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
	pub status: i64,
	pub status_text: String,
	pub http_version: String,
	pub headers: Vec<HarHeader>,
	pub cookies: Vec<serde_json::Value>,
	pub content: HarContent,
	pub redirect_u_r_l: String,
	pub headers_size: i64,
	pub body_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarHeader {
	pub name: String,
	pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
	pub size: i64,
	pub mime_type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPostData {
	pub mime_type: String,
	pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarTimings {
	pub send: f64,
	pub wait: f64,
	pub receive: f64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extension_fields_survive_round_trip() {
		let entry = HarEntry {
			started_date_time: "2026-01-01T00:00:00.000Z".into(),
			time: 12.5,
			request: HarRequest {
				method: "GET".into(),
				url: "https://example.com/".into(),
				http_version: "HTTP/1.1".into(),
				headers: vec![],
				query_string: vec![],
				cookies: vec![],
				headers_size: -1,
				body_size: -1,
				post_data: None,
			},
			response: HarResponse {
				status: 200,
				status_text: "OK".into(),
				http_version: "HTTP/1.1".into(),
				headers: vec![],
				cookies: vec![],
				content: HarContent { size: 0, mime_type: "text/html".into(), text: None },
				redirect_u_r_l: String::new(),
				headers_size: -1,
				body_size: -1,
			},
			cache: serde_json::json!({}),
			timings: HarTimings { send: 0.0, wait: 10.0, receive: 2.5 },
			pageref: Some("capture_1".into()),
			surfwright_request_id: Some(7),
			surfwright_resource_type: Some("document".into()),
			surfwright_incomplete: None,
			surfwright_failure: None,
		};

		let text = serde_json::to_string(&entry).unwrap();
		assert!(text.contains("_surfwrightRequestId"));
		let back: HarEntry = serde_json::from_str(&text).unwrap();
		assert_eq!(back.surfwright_request_id, Some(7));
		assert_eq!(back.pageref.as_deref(), Some("capture_1"));
	}
}
