//! Request filters, applied during live capture (tail) and after recording
//! (projection).

use serde::{Deserialize, Serialize};

use super::record::RequestRecord;
use crate::error::{ErrorCode, Result, SwError};

/// Status filter: an exact code or a class like `4xx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusFilter {
	Exact(u16),
	Class(u8),
}

impl StatusFilter {
	/// Parse `404` or `4xx`; anything else is `E_QUERY_INVALID`.
	pub fn parse(raw: &str) -> Result<Self> {
		if let Some(class) = raw.strip_suffix("xx") {
			if class.len() == 1 {
				if let Some(digit) = class.chars().next().and_then(|c| c.to_digit(10)) {
					if (1..=5).contains(&digit) {
						return Ok(StatusFilter::Class(digit as u8));
					}
				}
			}
		} else if raw.len() == 3 && raw.chars().all(|c| c.is_ascii_digit()) {
			if let Ok(code) = raw.parse::<u16>() {
				if (100..=599).contains(&code) {
					return Ok(StatusFilter::Exact(code));
				}
			}
		}
		Err(SwError::new(
			ErrorCode::QueryInvalid,
			format!("status filter must be a code 100-599 or a class like 4xx: {raw:?}"),
		))
	}

	pub fn matches(&self, status: Option<u16>) -> bool {
		match (self, status) {
			(StatusFilter::Exact(code), Some(status)) => status == *code,
			(StatusFilter::Class(class), Some(status)) => status / 100 == *class as u16,
			_ => false,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFilters {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url_contains: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resource_type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<StatusFilter>,
	#[serde(default)]
	pub failed_only: bool,
}

impl NetworkFilters {
	/// Normalize: method is matched uppercased.
	pub fn normalized(mut self) -> Self {
		self.method = self.method.map(|m| m.to_uppercase());
		self
	}

	pub fn is_empty(&self) -> bool {
		self.url_contains.is_none()
			&& self.method.is_none()
			&& self.resource_type.is_none()
			&& self.status.is_none()
			&& !self.failed_only
	}

	pub fn matches(&self, record: &RequestRecord) -> bool {
		if let Some(needle) = &self.url_contains {
			if !record.url.contains(needle.as_str()) {
				return false;
			}
		}
		if let Some(method) = &self.method {
			if record.method != *method {
				return false;
			}
		}
		if let Some(resource_type) = &self.resource_type {
			if record.resource_type.as_deref() != Some(resource_type) {
				return false;
			}
		}
		if let Some(status) = &self.status {
			if !status.matches(record.status) {
				return false;
			}
		}
		if self.failed_only && record.failure.is_none() && record.status.map(|s| s < 400).unwrap_or(true) {
			return false;
		}
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(url: &str, method: &str, status: Option<u16>, failure: Option<&str>) -> RequestRecord {
		RequestRecord {
			id: 1,
			capture_key: "c".into(),
			action_id: None,
			redirected_from_id: None,
			url: url.into(),
			method: method.into(),
			resource_type: Some("xhr".into()),
			navigation: false,
			start_ms: 0.0,
			end_ms: None,
			duration_ms: None,
			ttfb_ms: None,
			status,
			ok: status.map(|s| s < 400).unwrap_or(false),
			failure: failure.map(String::from),
			bytes_approx: 0,
			request_headers: None,
			response_headers: None,
			post_data_preview: None,
		}
	}

	#[test]
	fn status_filter_parses_exact_and_class() {
		assert_eq!(StatusFilter::parse("404").unwrap(), StatusFilter::Exact(404));
		assert_eq!(StatusFilter::parse("5xx").unwrap(), StatusFilter::Class(5));
		assert!(StatusFilter::parse("99").is_err());
		assert!(StatusFilter::parse("600").is_err());
		assert!(StatusFilter::parse("6xx").is_err());
		assert!(StatusFilter::parse("xx").is_err());
	}

	#[test]
	fn class_filter_matches_range() {
		let filter = StatusFilter::Class(4);
		assert!(filter.matches(Some(404)));
		assert!(filter.matches(Some(451)));
		assert!(!filter.matches(Some(500)));
		assert!(!filter.matches(None));
	}

	#[test]
	fn method_matching_is_uppercased() {
		let filters = NetworkFilters {
			method: Some("post".into()),
			..Default::default()
		}
		.normalized();
		assert!(filters.matches(&record("https://a", "POST", Some(200), None)));
		assert!(!filters.matches(&record("https://a", "GET", Some(200), None)));
	}

	#[test]
	fn failed_only_accepts_failures_and_4xx_plus() {
		let filters = NetworkFilters {
			failed_only: true,
			..Default::default()
		};
		assert!(filters.matches(&record("https://a", "GET", None, Some("net::ERR_FAILED"))));
		assert!(filters.matches(&record("https://a", "GET", Some(500), None)));
		assert!(!filters.matches(&record("https://a", "GET", Some(200), None)));
	}

	#[test]
	fn url_substring_filters() {
		let filters = NetworkFilters {
			url_contains: Some("api/".into()),
			..Default::default()
		};
		assert!(filters.matches(&record("https://x/api/v1", "GET", Some(200), None)));
		assert!(!filters.matches(&record("https://x/page", "GET", Some(200), None)));
	}
}
