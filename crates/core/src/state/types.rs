//! The persistent state document and its normalization rules.
//!
//! `state.json` is versioned and shared across processes. Reads are
//! lenient: unknown fields are dropped, fields with the wrong runtime shape
//! fall back to safe defaults, and map entries that fail to deserialize are
//! removed rather than failing the whole document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version stamped on every write.
pub const CURRENT_STATE_VERSION: u32 = 4;

/// Reserved id of the implicit managed session.
pub const DEFAULT_SESSION_ID: &str = "s-default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
	Managed,
	Attached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPolicy {
	Ephemeral,
	Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserMode {
	Headless,
	Headed,
	#[default]
	Unknown,
}

/// A browser instance the tool may drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
	pub session_id: String,
	pub kind: SessionKind,
	pub policy: SessionPolicy,
	#[serde(default)]
	pub browser_mode: BrowserMode,
	/// http(s) origin of the CDP endpoint, credential-free.
	pub cdp_origin: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub debug_port: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_data_dir: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub browser_pid: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub owner_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lease_expires_at: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lease_ttl_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub managed_unreachable_since: Option<String>,
	#[serde(default)]
	pub managed_unreachable_count: u32,
	pub created_at: String,
	pub last_seen_at: String,
}

impl SessionRecord {
	pub fn is_managed(&self) -> bool {
		self.kind == SessionKind::Managed
	}
}

/// A page handle inside a session, persisted opportunistically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
	pub target_id: String,
	pub session_id: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub status: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_action_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_action_at: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_action_kind: Option<String>,
	pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
	Recording,
	Stopped,
	Failed,
}

/// A handle-based background network capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
	pub capture_id: String,
	pub session_id: String,
	pub target_id: String,
	pub started_at: String,
	pub status: CaptureStatus,
	#[serde(default)]
	pub profile: String,
	#[serde(default)]
	pub max_runtime_ms: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub worker_pid: Option<u32>,
	pub stop_signal_path: String,
	pub done_path: String,
	pub result_path: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ended_at: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub action_id: Option<String>,
}

/// A persisted network export, currently always HAR.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
	pub artifact_id: String,
	pub created_at: String,
	pub format: String,
	pub path: String,
	pub session_id: String,
	pub target_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub capture_id: Option<String>,
	#[serde(default)]
	pub entries: u64,
	#[serde(default)]
	pub bytes: u64,
}

/// Root envelope of `state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfwrightState {
	pub version: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub active_session_id: Option<String>,
	#[serde(default = "one")]
	pub next_session_ordinal: u64,
	#[serde(default = "one")]
	pub next_capture_ordinal: u64,
	#[serde(default = "one")]
	pub next_artifact_ordinal: u64,
	#[serde(default)]
	pub sessions: BTreeMap<String, SessionRecord>,
	#[serde(default)]
	pub targets: BTreeMap<String, TargetRecord>,
	#[serde(default)]
	pub captures: BTreeMap<String, CaptureRecord>,
	#[serde(default)]
	pub artifacts: BTreeMap<String, ArtifactRecord>,
}

fn one() -> u64 {
	1
}

impl Default for SurfwrightState {
	fn default() -> Self {
		Self {
			version: CURRENT_STATE_VERSION,
			active_session_id: None,
			next_session_ordinal: 1,
			next_capture_ordinal: 1,
			next_artifact_ordinal: 1,
			sessions: BTreeMap::new(),
			targets: BTreeMap::new(),
			captures: BTreeMap::new(),
			artifacts: BTreeMap::new(),
		}
	}
}

impl SurfwrightState {
	/// Build a state from a raw JSON value, dropping whatever does not fit.
	///
	/// Map entries are deserialized individually so one malformed record
	/// never discards its siblings. Target entries whose key disagrees with
	/// their `targetId` are removed.
	pub fn from_value(value: Value) -> Self {
		let Value::Object(mut root) = value else {
			return Self::default();
		};
		let mut state = Self::default();
		state.active_session_id = root
			.remove("activeSessionId")
			.and_then(|v| v.as_str().map(String::from));
		state.next_session_ordinal = ordinal(root.remove("nextSessionOrdinal"));
		state.next_capture_ordinal = ordinal(root.remove("nextCaptureOrdinal"));
		state.next_artifact_ordinal = ordinal(root.remove("nextArtifactOrdinal"));
		state.sessions = lenient_map(root.remove("sessions"), |_, _: &SessionRecord| true);
		state.targets = lenient_map(root.remove("targets"), |key, record: &TargetRecord| key == record.target_id);
		state.captures = lenient_map(root.remove("captures"), |_, _: &CaptureRecord| true);
		state.artifacts = lenient_map(root.remove("artifacts"), |_, _: &ArtifactRecord| true);
		// The active pointer must refer to a surviving session.
		if let Some(active) = &state.active_session_id {
			if !state.sessions.contains_key(active) {
				state.active_session_id = None;
			}
		}
		state
	}
}

fn ordinal(value: Option<Value>) -> u64 {
	value.and_then(|v| v.as_u64()).filter(|n| *n >= 1).unwrap_or(1)
}

fn lenient_map<T: serde::de::DeserializeOwned>(
	value: Option<Value>,
	keep: impl Fn(&str, &T) -> bool,
) -> BTreeMap<String, T> {
	let Some(Value::Object(entries)) = value else {
		return BTreeMap::new();
	};
	let mut out = BTreeMap::new();
	for (key, raw) in entries {
		if let Ok(record) = serde_json::from_value::<T>(raw) {
			if keep(&key, &record) {
				out.insert(key, record);
			}
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn from_value_defaults_on_garbage() {
		assert_eq!(SurfwrightState::from_value(json!(null)).version, CURRENT_STATE_VERSION);
		assert_eq!(SurfwrightState::from_value(json!([1, 2])).sessions.len(), 0);
		let state = SurfwrightState::from_value(json!({ "nextSessionOrdinal": "three" }));
		assert_eq!(state.next_session_ordinal, 1);
	}

	#[test]
	fn target_key_must_agree_with_record() {
		let state = SurfwrightState::from_value(json!({
			"targets": {
				"good": { "targetId": "good", "sessionId": "s-1", "updatedAt": "2026-01-01T00:00:00Z" },
				"bad": { "targetId": "other", "sessionId": "s-1", "updatedAt": "2026-01-01T00:00:00Z" },
			}
		}));
		assert!(state.targets.contains_key("good"));
		assert!(!state.targets.contains_key("bad"));
	}

	#[test]
	fn malformed_entry_does_not_discard_siblings() {
		let state = SurfwrightState::from_value(json!({
			"sessions": {
				"s-1": {
					"sessionId": "s-1", "kind": "managed", "policy": "ephemeral",
					"cdpOrigin": "http://127.0.0.1:9222",
					"createdAt": "2026-01-01T00:00:00Z", "lastSeenAt": "2026-01-01T00:00:00Z"
				},
				"s-2": { "kind": 42 },
			}
		}));
		assert_eq!(state.sessions.len(), 1);
		assert!(state.sessions.contains_key("s-1"));
	}

	#[test]
	fn dangling_active_pointer_is_cleared() {
		let state = SurfwrightState::from_value(json!({ "activeSessionId": "s-gone" }));
		assert!(state.active_session_id.is_none());
	}

	#[test]
	fn unknown_fields_are_dropped_on_round_trip() {
		let state = SurfwrightState::from_value(json!({ "legacyField": true }));
		let text = serde_json::to_string(&state).unwrap();
		assert!(!text.contains("legacyField"));
	}
}
