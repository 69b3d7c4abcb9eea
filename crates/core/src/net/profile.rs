//! Capture profiles: named presets for bounds and inclusion flags.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, Result, SwError};

/// Hard caps, regardless of profile or explicit flags.
pub const MAX_REQUESTS_CAP: usize = 1000;
pub const MAX_WEBSOCKETS_CAP: usize = 200;
pub const MAX_WS_MESSAGES_CAP: usize = 2000;
pub const MIN_CAPTURE_MS: u64 = 100;
pub const MAX_CAPTURE_MS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureProfile {
	#[default]
	Custom,
	Api,
	Page,
	Ws,
	Perf,
}

impl CaptureProfile {
	pub fn as_str(&self) -> &'static str {
		match self {
			CaptureProfile::Custom => "custom",
			CaptureProfile::Api => "api",
			CaptureProfile::Page => "page",
			CaptureProfile::Ws => "ws",
			CaptureProfile::Perf => "perf",
		}
	}
}

impl std::str::FromStr for CaptureProfile {
	type Err = SwError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"custom" => Ok(CaptureProfile::Custom),
			"api" => Ok(CaptureProfile::Api),
			"page" => Ok(CaptureProfile::Page),
			"ws" => Ok(CaptureProfile::Ws),
			"perf" => Ok(CaptureProfile::Perf),
			other => Err(SwError::new(
				ErrorCode::QueryInvalid,
				format!("unknown network profile {other:?} (custom|api|page|ws|perf)"),
			)),
		}
	}
}

/// Effective capture options after profile defaults and explicit overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOptions {
	pub profile: CaptureProfile,
	pub capture_ms: u64,
	pub max_requests: usize,
	pub max_websockets: usize,
	pub max_ws_messages: usize,
	pub include_headers: bool,
	pub include_post_data: bool,
	pub include_ws_messages: bool,
	pub reload_before: bool,
}

impl CaptureOptions {
	/// Profile defaults; explicit flags override these per field.
	pub fn for_profile(profile: CaptureProfile) -> Self {
		match profile {
			CaptureProfile::Custom => Self {
				profile,
				capture_ms: 10_000,
				max_requests: 300,
				max_websockets: 50,
				max_ws_messages: 500,
				include_headers: false,
				include_post_data: false,
				include_ws_messages: false,
				reload_before: false,
			},
			CaptureProfile::Api => Self {
				profile,
				capture_ms: 8_000,
				max_requests: 500,
				max_websockets: 20,
				max_ws_messages: 200,
				include_headers: true,
				include_post_data: true,
				include_ws_messages: false,
				reload_before: false,
			},
			CaptureProfile::Page => Self {
				profile,
				capture_ms: 10_000,
				max_requests: 600,
				max_websockets: 20,
				max_ws_messages: 200,
				include_headers: false,
				include_post_data: false,
				include_ws_messages: false,
				reload_before: true,
			},
			CaptureProfile::Ws => Self {
				profile,
				capture_ms: 15_000,
				max_requests: 200,
				max_websockets: MAX_WEBSOCKETS_CAP,
				max_ws_messages: MAX_WS_MESSAGES_CAP,
				include_headers: false,
				include_post_data: false,
				include_ws_messages: true,
				reload_before: false,
			},
			CaptureProfile::Perf => Self {
				profile,
				capture_ms: 10_000,
				max_requests: MAX_REQUESTS_CAP,
				max_websockets: 50,
				max_ws_messages: 500,
				include_headers: false,
				include_post_data: false,
				include_ws_messages: false,
				reload_before: true,
			},
		}
	}

	/// Clamp to the hard caps and validate the window.
	pub fn validate(mut self) -> Result<Self> {
		if self.capture_ms < MIN_CAPTURE_MS {
			return Err(SwError::new(
				ErrorCode::QueryInvalid,
				format!("--capture-ms must be at least {MIN_CAPTURE_MS}"),
			));
		}
		if self.capture_ms > MAX_CAPTURE_MS {
			return Err(SwError::new(
				ErrorCode::QueryInvalid,
				format!("--capture-ms must be at most {MAX_CAPTURE_MS}"),
			));
		}
		self.max_requests = self.max_requests.min(MAX_REQUESTS_CAP);
		self.max_websockets = self.max_websockets.min(MAX_WEBSOCKETS_CAP);
		self.max_ws_messages = self.max_ws_messages.min(MAX_WS_MESSAGES_CAP);
		Ok(self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn profiles_parse_and_round_trip() {
		for token in ["custom", "api", "page", "ws", "perf"] {
			let profile: CaptureProfile = token.parse().unwrap();
			assert_eq!(profile.as_str(), token);
		}
		assert!("speed".parse::<CaptureProfile>().is_err());
	}

	#[test]
	fn perf_profile_hits_the_request_cap() {
		let options = CaptureOptions::for_profile(CaptureProfile::Perf);
		assert_eq!(options.max_requests, MAX_REQUESTS_CAP);
		assert!(options.reload_before);
	}

	#[test]
	fn too_small_window_is_rejected() {
		let mut options = CaptureOptions::for_profile(CaptureProfile::Custom);
		options.capture_ms = MIN_CAPTURE_MS - 1;
		assert_eq!(options.validate().unwrap_err().code, ErrorCode::QueryInvalid);
	}

	#[test]
	fn oversized_limits_are_clamped() {
		let mut options = CaptureOptions::for_profile(CaptureProfile::Custom);
		options.max_requests = 5000;
		options.max_ws_messages = 9999;
		let validated = options.validate().unwrap();
		assert_eq!(validated.max_requests, MAX_REQUESTS_CAP);
		assert_eq!(validated.max_ws_messages, MAX_WS_MESSAGES_CAP);
	}
}
