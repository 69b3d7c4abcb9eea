//! Redaction of sensitive values before they reach reports or disk.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use serde_json::Value;

use crate::error::{ErrorCode, Result, SwError};

pub const REDACTED: &str = "[REDACTED]";
pub const MAX_CUSTOM_PATTERNS: usize = 8;
pub const MAX_PATTERN_CHARS: usize = 240;
pub const POST_DATA_PREVIEW_CHARS: usize = 1024;

/// Headers whose values are always replaced, regardless of caller patterns.
const SENSITIVE_HEADERS: &[&str] = &[
	"authorization",
	"proxy-authorization",
	"cookie",
	"set-cookie",
	"x-api-key",
	"x-auth-token",
];

/// Compiled caller-provided redaction patterns.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
	patterns: Vec<Regex>,
}

impl Redactor {
	/// Compile caller patterns; each must be a valid regex within the size
	/// bound that cannot match the empty string.
	pub fn new(patterns: &[String]) -> Result<Self> {
		if patterns.len() > MAX_CUSTOM_PATTERNS {
			return Err(SwError::new(
				ErrorCode::QueryInvalid,
				format!("at most {MAX_CUSTOM_PATTERNS} redaction patterns are allowed"),
			));
		}
		let mut compiled = Vec::with_capacity(patterns.len());
		for raw in patterns {
			if raw.chars().count() > MAX_PATTERN_CHARS {
				return Err(SwError::new(
					ErrorCode::QueryInvalid,
					format!("redaction pattern exceeds {MAX_PATTERN_CHARS} chars"),
				));
			}
			let regex = Regex::new(raw)
				.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("invalid redaction pattern {raw:?}: {e}")))?;
			if regex.is_match("") {
				return Err(SwError::new(
					ErrorCode::QueryInvalid,
					format!("redaction pattern must not match the empty string: {raw:?}"),
				));
			}
			compiled.push(regex);
		}
		Ok(Self { patterns: compiled })
	}

	fn apply(&self, text: &str) -> String {
		let mut out = text.to_string();
		for regex in &self.patterns {
			out = regex.replace_all(&out, REDACTED).into_owned();
		}
		out
	}

	/// Redact one header value: the sensitive set wholesale, caller
	/// patterns inside the value.
	pub fn header_value(&self, name: &str, value: &str) -> String {
		if SENSITIVE_HEADERS.contains(&name.to_lowercase().as_str()) {
			return REDACTED.to_string();
		}
		self.apply(value)
	}

	/// Redact a CDP header map into a flat string map.
	pub fn headers(&self, raw: &serde_json::Map<String, Value>) -> std::collections::BTreeMap<String, String> {
		raw.iter()
			.map(|(name, value)| {
				let value = value.as_str().map(String::from).unwrap_or_else(|| value.to_string());
				(name.clone(), self.header_value(name, &value))
			})
			.collect()
	}

	/// Preview of post data: redacted text, or `base64:<…>` for binary.
	pub fn post_data_preview(&self, data: &str) -> String {
		// Control bytes below TAB mark the payload as binary.
		if data.bytes().any(|b| b < 0x09) {
			let encoded = BASE64.encode(data.as_bytes());
			let (cut, _) = crate::util::truncate_chars(&encoded, POST_DATA_PREVIEW_CHARS);
			return format!("base64:{cut}");
		}
		let redacted = self.apply(data);
		let (cut, _) = crate::util::truncate_chars(&redacted, POST_DATA_PREVIEW_CHARS);
		cut
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn sensitive_headers_are_always_redacted() {
		let redactor = Redactor::default();
		assert_eq!(redactor.header_value("Authorization", "Bearer abc"), REDACTED);
		assert_eq!(redactor.header_value("COOKIE", "sid=1"), REDACTED);
		assert_eq!(redactor.header_value("x-api-key", "k"), REDACTED);
		assert_eq!(redactor.header_value("accept", "text/html"), "text/html");
	}

	#[test]
	fn caller_patterns_redact_inside_values() {
		let redactor = Redactor::new(&["tok_[a-z0-9]+".to_string()]).unwrap();
		assert_eq!(redactor.header_value("x-trace", "id tok_abc123 end"), "id [REDACTED] end");
		assert_eq!(redactor.post_data_preview("{\"token\":\"tok_zzz\"}"), "{\"token\":\"[REDACTED]\"}");
	}

	#[test]
	fn pattern_limits_are_enforced() {
		let many: Vec<String> = (0..9).map(|i| format!("p{i}")).collect();
		assert!(Redactor::new(&many).is_err());
		assert!(Redactor::new(&["x".repeat(241)]).is_err());
		assert!(Redactor::new(&["(bad".to_string()]).is_err());
		// A pattern matching the empty string would redact everything.
		assert!(Redactor::new(&["a*".to_string()]).is_err());
	}

	#[test]
	fn binary_post_data_becomes_base64() {
		let redactor = Redactor::default();
		let preview = redactor.post_data_preview("ab\0cd");
		assert!(preview.starts_with("base64:"));
	}

	#[test]
	fn header_map_is_flattened_and_redacted() {
		let redactor = Redactor::default();
		let mut raw = serde_json::Map::new();
		raw.insert("Set-Cookie".into(), json!("a=b"));
		raw.insert("Content-Type".into(), json!("application/json"));
		let headers = redactor.headers(&raw);
		assert_eq!(headers["Set-Cookie"], REDACTED);
		assert_eq!(headers["Content-Type"], "application/json");
	}
}
