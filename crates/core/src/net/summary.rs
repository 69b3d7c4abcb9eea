//! Projection of a capture into summary, raw, and table views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::filter::NetworkFilters;
use super::profile::{MAX_REQUESTS_CAP, MAX_WS_MESSAGES_CAP, MAX_WEBSOCKETS_CAP};
use super::record::{CaptureDocument, RequestRecord};
use crate::error::{ErrorCode, Result, SwError};

pub const TABLE_ROW_CAP: usize = 200;
pub const TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkView {
	Raw,
	#[default]
	Summary,
	Table,
}

impl std::str::FromStr for NetworkView {
	type Err = SwError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"raw" => Ok(NetworkView::Raw),
			"summary" => Ok(NetworkView::Summary),
			"table" => Ok(NetworkView::Table),
			other => Err(SwError::new(
				ErrorCode::QueryInvalid,
				format!("view must be raw, summary, or table: {other:?}"),
			)),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBuckets {
	#[serde(rename = "2xx")]
	pub s2xx: u64,
	#[serde(rename = "3xx")]
	pub s3xx: u64,
	#[serde(rename = "4xx")]
	pub s4xx: u64,
	#[serde(rename = "5xx")]
	pub s5xx: u64,
	pub other: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
	pub min: f64,
	pub max: f64,
	pub avg: f64,
	pub p50: f64,
	pub p95: f64,
}

/// Percentile over a sorted sample using nearest-rank.
fn percentile(sorted: &[f64], p: f64) -> f64 {
	if sorted.is_empty() {
		return 0.0;
	}
	let rank = ((p / 100.0) * sorted.len() as f64).ceil().max(1.0) as usize;
	sorted[rank.min(sorted.len()) - 1]
}

/// Stats over completed requests only.
pub fn latency_stats(samples: &mut Vec<f64>) -> LatencyStats {
	if samples.is_empty() {
		return LatencyStats::default();
	}
	samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
	let sum: f64 = samples.iter().sum();
	LatencyStats {
		min: samples[0],
		max: samples[samples.len() - 1],
		avg: sum / samples.len() as f64,
		p50: percentile(samples, 50.0),
		p95: percentile(samples, 95.0),
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInsight {
	pub host: String,
	pub requests: u64,
	pub failures: u64,
	pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHotspot {
	pub url: String,
	pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WsHotspot {
	pub url: String,
	pub messages: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncationHints {
	pub requests: bool,
	pub websockets: bool,
	pub ws_messages: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub suggested_max_requests: Option<usize>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub suggested_max_websockets: Option<usize>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub suggested_max_ws_messages: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
	pub status: StatusBuckets,
	pub latency_ms: LatencyStats,
	pub ttfb_ms: LatencyStats,
	pub total_bytes_approx: u64,
	pub completed: u64,
	pub failed: u64,
	pub slowest: Vec<Value>,
	pub top_hosts: Vec<HostInsight>,
	pub error_hotspots: Vec<ErrorHotspot>,
	pub ws_hotspots: Vec<WsHotspot>,
}

/// Compute the performance summary over filtered records.
pub fn summarize(doc: &CaptureDocument, records: &[&RequestRecord]) -> PerformanceSummary {
	let mut status = StatusBuckets::default();
	let mut latencies = Vec::new();
	let mut ttfbs = Vec::new();
	let mut total_bytes = 0u64;
	let mut completed = 0u64;
	let mut failed = 0u64;

	for record in records {
		match record.status {
			Some(s) if (200..300).contains(&s) => status.s2xx += 1,
			Some(s) if (300..400).contains(&s) => status.s3xx += 1,
			Some(s) if (400..500).contains(&s) => status.s4xx += 1,
			Some(s) if (500..600).contains(&s) => status.s5xx += 1,
			_ => status.other += 1,
		}
		total_bytes += record.bytes_approx;
		if record.failure.is_some() {
			failed += 1;
		}
		if record.completed() {
			completed += 1;
			if let Some(duration) = record.duration_ms {
				latencies.push(duration);
			}
			if let Some(ttfb) = record.ttfb_ms {
				ttfbs.push(ttfb);
			}
		}
	}

	let mut slowest: Vec<&&RequestRecord> = records.iter().filter(|r| r.duration_ms.is_some()).collect();
	slowest.sort_by(|a, b| {
		b.duration_ms
			.partial_cmp(&a.duration_ms)
			.unwrap_or(std::cmp::Ordering::Equal)
	});
	let slowest = slowest
		.into_iter()
		.take(TOP_N)
		.map(|r| {
			json!({
				"id": r.id,
				"url": r.url,
				"method": r.method,
				"status": r.status,
				"durationMs": r.duration_ms,
			})
		})
		.collect();

	let mut hosts: BTreeMap<String, (u64, u64, f64, u64)> = BTreeMap::new();
	for record in records {
		let host = url::Url::parse(&record.url)
			.ok()
			.and_then(|u| u.host_str().map(String::from))
			.unwrap_or_else(|| "<invalid>".into());
		let entry = hosts.entry(host).or_default();
		entry.0 += 1;
		if record.failure.is_some() {
			entry.1 += 1;
		}
		if let Some(duration) = record.duration_ms {
			entry.2 += duration;
			entry.3 += 1;
		}
	}
	let mut top_hosts: Vec<HostInsight> = hosts
		.into_iter()
		.map(|(host, (requests, failures, latency_sum, latency_count))| HostInsight {
			host,
			requests,
			failures,
			avg_latency_ms: if latency_count > 0 { latency_sum / latency_count as f64 } else { 0.0 },
		})
		.collect();
	top_hosts.sort_by(|a, b| b.requests.cmp(&a.requests).then(a.host.cmp(&b.host)));
	top_hosts.truncate(TOP_N);

	let mut errors: BTreeMap<String, u64> = BTreeMap::new();
	for record in records {
		let is_error = record.failure.is_some() || record.status.map(|s| s >= 500).unwrap_or(false);
		if is_error {
			*errors.entry(record.url.clone()).or_default() += 1;
		}
	}
	let mut error_hotspots: Vec<ErrorHotspot> = errors.into_iter().map(|(url, count)| ErrorHotspot { url, count }).collect();
	error_hotspots.sort_by(|a, b| b.count.cmp(&a.count).then(a.url.cmp(&b.url)));
	error_hotspots.truncate(TOP_N);

	let mut ws_hotspots: Vec<WsHotspot> = doc
		.websockets
		.iter()
		.map(|ws| WsHotspot {
			url: ws.url.clone(),
			messages: ws.messages_sent + ws.messages_received,
		})
		.collect();
	ws_hotspots.sort_by(|a, b| b.messages.cmp(&a.messages).then(a.url.cmp(&b.url)));
	ws_hotspots.truncate(TOP_N);

	PerformanceSummary {
		status,
		latency_ms: latency_stats(&mut latencies),
		ttfb_ms: latency_stats(&mut ttfbs),
		total_bytes_approx: total_bytes,
		completed,
		failed,
		slowest,
		top_hosts,
		error_hotspots,
		ws_hotspots,
	}
}

/// Truncation flags plus doubled-but-capped suggested limits.
pub fn truncation_hints(doc: &CaptureDocument) -> TruncationHints {
	let requests = doc.counts.requests_seen > doc.counts.requests_captured;
	let websockets = doc.counts.websockets_seen > doc.counts.websockets_captured;
	let ws_messages = doc.counts.ws_messages_seen > doc.counts.ws_messages_captured;
	TruncationHints {
		requests,
		websockets,
		ws_messages,
		suggested_max_requests: requests.then(|| (doc.options.max_requests * 2).min(MAX_REQUESTS_CAP)),
		suggested_max_websockets: websockets.then(|| (doc.options.max_websockets * 2).min(MAX_WEBSOCKETS_CAP)),
		suggested_max_ws_messages: ws_messages.then(|| (doc.options.max_ws_messages * 2).min(MAX_WS_MESSAGES_CAP)),
	}
}

/// Fields available to the table view.
pub const TABLE_FIELDS: &[&str] = &[
	"id", "url", "method", "resourceType", "status", "durationMs", "ttfbMs", "bytesApprox", "failure",
];

fn field_of(record: &RequestRecord, field: &str) -> Value {
	match field {
		"id" => json!(record.id),
		"url" => json!(record.url),
		"method" => json!(record.method),
		"resourceType" => json!(record.resource_type),
		"status" => json!(record.status),
		"durationMs" => json!(record.duration_ms),
		"ttfbMs" => json!(record.ttfb_ms),
		"bytesApprox" => json!(record.bytes_approx),
		"failure" => json!(record.failure),
		_ => Value::Null,
	}
}

/// Project a capture according to view and filters.
pub fn project(doc: &CaptureDocument, view: NetworkView, filters: &NetworkFilters, fields: Option<&[String]>) -> Result<Value> {
	let records: Vec<&RequestRecord> = doc.requests.iter().filter(|r| filters.matches(r)).collect();
	let summary = summarize(doc, &records);
	let hints = truncation_hints(doc);
	let counts = json!({
		"requestsSeen": doc.counts.requests_seen,
		"requestsCaptured": doc.counts.requests_captured,
		"requestsReturned": records.len(),
		"websocketsSeen": doc.counts.websockets_seen,
		"wsMessagesSeen": doc.counts.ws_messages_seen,
	});
	let base = json!({
		"captureId": doc.capture_id,
		"sessionId": doc.session_id,
		"targetId": doc.target_id,
		"startedAt": doc.started_at,
		"view": view,
		"filters": { "profile": doc.options.profile, "applied": filters },
		"counts": counts,
		"performance": summary,
		"truncation": hints,
	});

	let mut out = base;
	match view {
		NetworkView::Summary => {}
		NetworkView::Raw => {
			out["requests"] = serde_json::to_value(&records)?;
			out["websockets"] = serde_json::to_value(&doc.websockets)?;
		}
		NetworkView::Table => {
			let wanted: Vec<String> = match fields {
				Some(fields) if !fields.is_empty() => {
					for field in fields {
						if !TABLE_FIELDS.contains(&field.as_str()) {
							return Err(SwError::new(
								ErrorCode::QueryInvalid,
								format!("unknown table field {field:?}; known: {}", TABLE_FIELDS.join(", ")),
							));
						}
					}
					fields.to_vec()
				}
				_ => vec!["id".into(), "method".into(), "url".into(), "status".into(), "durationMs".into()],
			};
			let rows: Vec<Value> = records
				.iter()
				.take(TABLE_ROW_CAP)
				.map(|record| {
					let mut row = serde_json::Map::new();
					for field in &wanted {
						row.insert(field.clone(), field_of(record, field));
					}
					Value::Object(row)
				})
				.collect();
			out["fields"] = json!(wanted);
			out["rows"] = Value::Array(rows);
			out["rowsTruncated"] = json!(records.len() > TABLE_ROW_CAP);
		}
	}
	Ok(out)
}
