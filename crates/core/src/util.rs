//! Small shared helpers: timestamps, id sanitation, text bounds.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{ErrorCode, Result, SwError};

/// Current time as an ISO-8601 UTC string (millisecond precision).
pub fn now_iso() -> String {
	Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 timestamp; `None` for absent or malformed input.
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Milliseconds since the UNIX epoch.
pub fn now_ms() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}

/// Session ids are path- and shell-safe.
pub fn validate_session_id(id: &str) -> Result<()> {
	let ok = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
	if ok {
		Ok(())
	} else {
		Err(SwError::new(
			ErrorCode::SessionIdInvalid,
			format!("session id must match ^[A-Za-z0-9._-]+$: {id:?}"),
		))
	}
}

/// Target ids additionally allow `:` (CDP composes ids from contexts).
pub fn validate_target_id(id: &str) -> Result<()> {
	let ok = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':'));
	if ok {
		Ok(())
	} else {
		Err(SwError::new(
			ErrorCode::TargetIdInvalid,
			format!("target id must match ^[A-Za-z0-9._:-]+$: {id:?}"),
		))
	}
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut in_space = true;
	for c in text.chars() {
		if c.is_whitespace() {
			if !in_space {
				out.push(' ');
				in_space = true;
			}
		} else {
			out.push(c);
			in_space = false;
		}
	}
	if out.ends_with(' ') {
		out.pop();
	}
	out
}

/// Truncate to at most `max` characters on a char boundary; returns the
/// text and whether truncation happened.
pub fn truncate_chars(text: &str, max: usize) -> (String, bool) {
	if text.chars().count() <= max {
		return (text.to_string(), false);
	}
	(text.chars().take(max).collect(), true)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_id_charset() {
		validate_session_id("s-default").unwrap();
		validate_session_id("agent_1.primary").unwrap();
		assert!(validate_session_id("bad id").is_err());
		assert!(validate_session_id("").is_err());
		assert!(validate_session_id("a/b").is_err());
	}

	#[test]
	fn target_id_allows_colon() {
		validate_target_id("AB12:page").unwrap();
		assert!(validate_target_id("AB 12").is_err());
	}

	#[test]
	fn whitespace_collapses_to_single_spaces() {
		assert_eq!(collapse_whitespace("  a \n\t b\r\nc  "), "a b c");
		assert_eq!(collapse_whitespace(""), "");
		assert_eq!(collapse_whitespace("   "), "");
	}

	#[test]
	fn truncation_flags_only_when_cut() {
		assert_eq!(truncate_chars("hello", 10), ("hello".into(), false));
		assert_eq!(truncate_chars("hello", 3), ("hel".into(), true));
	}

	#[test]
	fn now_iso_is_rfc3339_utc() {
		let now = now_iso();
		assert!(now.ends_with('Z'));
		assert!(parse_iso(&now).is_some());
	}
}
