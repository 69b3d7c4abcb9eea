//! Budget checks over a capture.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::CaptureDocument;
use super::summary::{latency_stats, summarize};
use crate::error::{ErrorCode, Result, SwError};

/// Recognized keys of a budget document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkBudget {
	pub max_p95_latency_ms: Option<f64>,
	/// 0..1 fraction of failed or 5xx requests.
	pub max_error_rate: Option<f64>,
	pub max_bytes_approx_total: Option<u64>,
	pub max_ws_messages: Option<u64>,
	pub max_requests: Option<u64>,
}

impl NetworkBudget {
	pub fn parse(value: &Value) -> Result<Self> {
		let budget: NetworkBudget = serde_json::from_value(value.clone())
			.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("invalid budget document: {e}")))?;
		if let Some(rate) = budget.max_error_rate {
			if !(0.0..=1.0).contains(&rate) {
				return Err(SwError::new(ErrorCode::QueryInvalid, "maxErrorRate must be within 0..1"));
			}
		}
		Ok(budget)
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCheck {
	pub name: &'static str,
	pub limit: f64,
	pub actual: f64,
	pub passed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetReport {
	pub checks: Vec<BudgetCheck>,
	pub passed: bool,
}

/// Evaluate a budget against a capture; overall pass requires every check
/// to pass.
pub fn check_budget(doc: &CaptureDocument, budget: &NetworkBudget) -> BudgetReport {
	let records: Vec<_> = doc.requests.iter().collect();
	let summary = summarize(doc, &records);
	let mut checks = Vec::new();

	if let Some(limit) = budget.max_p95_latency_ms {
		let mut samples: Vec<f64> = doc.requests.iter().filter_map(|r| r.duration_ms).collect();
		let actual = latency_stats(&mut samples).p95;
		checks.push(BudgetCheck {
			name: "maxP95LatencyMs",
			limit,
			actual,
			passed: actual <= limit,
		});
	}
	if let Some(limit) = budget.max_error_rate {
		let total = doc.requests.len() as f64;
		let errors = doc
			.requests
			.iter()
			.filter(|r| r.failure.is_some() || r.status.map(|s| s >= 500).unwrap_or(false))
			.count() as f64;
		let actual = if total > 0.0 { errors / total } else { 0.0 };
		checks.push(BudgetCheck {
			name: "maxErrorRate",
			limit,
			actual,
			passed: actual <= limit,
		});
	}
	if let Some(limit) = budget.max_bytes_approx_total {
		let actual = summary.total_bytes_approx as f64;
		checks.push(BudgetCheck {
			name: "maxBytesApproxTotal",
			limit: limit as f64,
			actual,
			passed: actual <= limit as f64,
		});
	}
	if let Some(limit) = budget.max_ws_messages {
		let actual = doc.counts.ws_messages_seen as f64;
		checks.push(BudgetCheck {
			name: "maxWsMessages",
			limit: limit as f64,
			actual,
			passed: actual <= limit as f64,
		});
	}
	if let Some(limit) = budget.max_requests {
		let actual = doc.counts.requests_seen as f64;
		checks.push(BudgetCheck {
			name: "maxRequests",
			limit: limit as f64,
			actual,
			passed: actual <= limit as f64,
		});
	}

	let passed = checks.iter().all(|check| check.passed);
	BudgetReport { checks, passed }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::net::profile::{CaptureOptions, CaptureProfile};
	use crate::net::record::{CaptureCounts, RequestRecord};
	use serde_json::json;

	fn doc() -> CaptureDocument {
		let requests: Vec<RequestRecord> = [(200u16, 50.0), (200, 100.0), (500, 400.0)]
			.iter()
			.enumerate()
			.map(|(i, (status, duration))| RequestRecord {
				id: i as u64 + 1,
				capture_key: "c".into(),
				action_id: None,
				redirected_from_id: None,
				url: format!("https://a/{i}"),
				method: "GET".into(),
				resource_type: None,
				navigation: false,
				start_ms: 0.0,
				end_ms: Some(*duration),
				duration_ms: Some(*duration),
				ttfb_ms: None,
				status: Some(*status),
				ok: *status < 400,
				failure: None,
				bytes_approx: 1000,
				request_headers: None,
				response_headers: None,
				post_data_preview: None,
			})
			.collect();
		CaptureDocument {
			capture_id: None,
			session_id: "s".into(),
			target_id: "T".into(),
			started_at: "2026-01-01T00:00:00Z".into(),
			options: CaptureOptions::for_profile(CaptureProfile::Custom),
			requests,
			websockets: vec![],
			counts: CaptureCounts {
				requests_seen: 3,
				requests_captured: 3,
				ws_messages_seen: 10,
				..Default::default()
			},
		}
	}

	#[test]
	fn unknown_budget_keys_are_rejected() {
		let err = NetworkBudget::parse(&json!({ "maxLatency": 10 })).unwrap_err();
		assert_eq!(err.code, ErrorCode::QueryInvalid);
	}

	#[test]
	fn error_rate_must_be_a_fraction() {
		assert!(NetworkBudget::parse(&json!({ "maxErrorRate": 1.5 })).is_err());
		assert!(NetworkBudget::parse(&json!({ "maxErrorRate": 0.1 })).is_ok());
	}

	#[test]
	fn per_check_results_and_overall_pass() {
		let budget = NetworkBudget::parse(&json!({
			"maxP95LatencyMs": 500,
			"maxErrorRate": 0.5,
			"maxRequests": 10,
		}))
		.unwrap();
		let report = check_budget(&doc(), &budget);
		assert_eq!(report.checks.len(), 3);
		assert!(report.passed);
	}

	#[test]
	fn failing_check_fails_overall() {
		let budget = NetworkBudget::parse(&json!({ "maxErrorRate": 0.1 })).unwrap();
		let report = check_budget(&doc(), &budget);
		// One 5xx of three requests is a third.
		let check = &report.checks[0];
		assert!((check.actual - 1.0 / 3.0).abs() < 1e-9);
		assert!(!check.passed);
		assert!(!report.passed);
	}

	#[test]
	fn ws_message_budget_uses_seen_count() {
		let budget = NetworkBudget::parse(&json!({ "maxWsMessages": 5 })).unwrap();
		let report = check_budget(&doc(), &budget);
		assert_eq!(report.checks[0].actual, 10.0);
		assert!(!report.passed);
	}
}
