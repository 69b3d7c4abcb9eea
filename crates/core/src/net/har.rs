//! HAR 1.2 export and re-import.
//!
//! Entries are sorted by internal request id; pages carry one entry per
//! capture. Internal ids and flags ride in `_surfwright` extension fields
//! so a re-read capture re-projects to the same performance summary.

use chrono::{Duration as ChronoDuration, Utc};
use surfwright_protocol::har::{
	Har, HarContent, HarCreator, HarEntry, HarHeader, HarLog, HarPage, HarPageTimings, HarPostData, HarRequest,
	HarResponse, HarTimings,
};

use super::profile::{CaptureOptions, CaptureProfile};
use super::record::{CaptureCounts, CaptureDocument, RequestRecord};
use crate::error::{ErrorCode, Result, SwError};
use crate::util::parse_iso;

const CREATOR_NAME: &str = "surfwright";

fn headers_of(map: Option<&std::collections::BTreeMap<String, String>>) -> Vec<HarHeader> {
	map.map(|headers| {
		headers
			.iter()
			.map(|(name, value)| HarHeader {
				name: name.clone(),
				value: value.clone(),
			})
			.collect()
	})
	.unwrap_or_default()
}

/// Build a HAR document from a capture.
pub fn to_har(doc: &CaptureDocument) -> Har {
	let page_id = doc.capture_id.clone().unwrap_or_else(|| "capture".to_string());
	let started = parse_iso(&doc.started_at).unwrap_or_else(Utc::now);

	let mut records: Vec<&RequestRecord> = doc.requests.iter().collect();
	records.sort_by_key(|r| r.id);

	let entries = records
		.iter()
		.map(|record| {
			let entry_start = started + ChronoDuration::milliseconds(record.start_ms as i64);
			let wait = record.ttfb_ms.unwrap_or(0.0);
			let total = record.duration_ms.unwrap_or(0.0);
			HarEntry {
				started_date_time: entry_start.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
				time: total,
				request: HarRequest {
					method: record.method.clone(),
					url: record.url.clone(),
					http_version: "HTTP/1.1".into(),
					headers: headers_of(record.request_headers.as_ref()),
					query_string: vec![],
					cookies: vec![],
					headers_size: -1,
					body_size: -1,
					post_data: record.post_data_preview.as_ref().map(|text| HarPostData {
						mime_type: "application/octet-stream".into(),
						text: text.clone(),
					}),
				},
				response: HarResponse {
					status: record.status.map(i64::from).unwrap_or(0),
					status_text: String::new(),
					http_version: "HTTP/1.1".into(),
					headers: headers_of(record.response_headers.as_ref()),
					cookies: vec![],
					content: HarContent {
						size: record.bytes_approx as i64,
						mime_type: record.resource_type.clone().unwrap_or_default(),
						text: None,
					},
					redirect_u_r_l: String::new(),
					headers_size: -1,
					body_size: record.bytes_approx as i64,
				},
				cache: serde_json::json!({}),
				timings: HarTimings {
					send: 0.0,
					wait,
					receive: (total - wait).max(0.0),
				},
				pageref: Some(page_id.clone()),
				surfwright_request_id: Some(record.id),
				surfwright_resource_type: record.resource_type.clone(),
				surfwright_incomplete: (!record.completed()).then_some(true),
				surfwright_failure: record.failure.clone(),
			}
		})
		.collect();

	Har {
		log: HarLog {
			version: "1.2".into(),
			creator: HarCreator {
				name: CREATOR_NAME.into(),
				version: env!("CARGO_PKG_VERSION").into(),
			},
			pages: vec![HarPage {
				started_date_time: started.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
				id: page_id,
				title: doc.target_id.clone(),
				page_timings: HarPageTimings::default(),
			}],
			entries,
		},
	}
}

/// Rebuild a capture document from an exported HAR so saved artifacts can
/// be re-projected and budget-checked.
pub fn from_har(har: &Har) -> Result<CaptureDocument> {
	if !har.log.version.starts_with("1.") {
		return Err(SwError::new(
			ErrorCode::QueryInvalid,
			format!("unsupported HAR version {:?}", har.log.version),
		));
	}
	let page = har.log.pages.first();
	let started_at = page
		.map(|p| p.started_date_time.clone())
		.unwrap_or_else(crate::util::now_iso);
	let base = parse_iso(&started_at).unwrap_or_else(Utc::now);

	let mut requests: Vec<RequestRecord> = har
		.log
		.entries
		.iter()
		.enumerate()
		.map(|(index, entry)| {
			let start_ms = parse_iso(&entry.started_date_time)
				.map(|at| (at - base).num_milliseconds() as f64)
				.unwrap_or(0.0)
				.max(0.0);
			let incomplete = entry.surfwright_incomplete.unwrap_or(false);
			let duration = (!incomplete).then_some(entry.time);
			let status = u16::try_from(entry.response.status).ok().filter(|s| *s > 0);
			RequestRecord {
				id: entry.surfwright_request_id.unwrap_or(index as u64 + 1),
				capture_key: page.map(|p| p.id.clone()).unwrap_or_default(),
				action_id: None,
				redirected_from_id: None,
				url: entry.request.url.clone(),
				method: entry.request.method.clone(),
				resource_type: entry.surfwright_resource_type.clone(),
				navigation: entry.surfwright_resource_type.as_deref() == Some("Document"),
				start_ms,
				end_ms: duration.map(|d| start_ms + d),
				duration_ms: duration,
				ttfb_ms: (entry.timings.wait > 0.0).then_some(entry.timings.wait),
				status,
				ok: status.map(|s| s < 400).unwrap_or(false),
				failure: entry.surfwright_failure.clone(),
				bytes_approx: entry.response.body_size.max(0) as u64,
				request_headers: None,
				response_headers: None,
				post_data_preview: entry.request.post_data.as_ref().map(|p| p.text.clone()),
			}
		})
		.collect();
	requests.sort_by_key(|r| r.id);

	let count = requests.len() as u64;
	Ok(CaptureDocument {
		capture_id: page.map(|p| p.id.clone()),
		session_id: String::new(),
		target_id: page.map(|p| p.title.clone()).unwrap_or_default(),
		started_at,
		options: CaptureOptions::for_profile(CaptureProfile::Custom),
		requests,
		websockets: vec![],
		counts: CaptureCounts {
			requests_seen: count,
			requests_captured: count,
			..Default::default()
		},
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::net::filter::NetworkFilters;
	use crate::net::summary::{NetworkView, project};

	fn capture() -> CaptureDocument {
		let mut options = CaptureOptions::for_profile(CaptureProfile::Custom);
		options.include_post_data = true;
		CaptureDocument {
			capture_id: Some("c-3".into()),
			session_id: "s-1".into(),
			target_id: "T1".into(),
			started_at: "2026-02-01T10:00:00.000Z".into(),
			options,
			requests: vec![
				RequestRecord {
					id: 2,
					capture_key: "c-3".into(),
					action_id: None,
					redirected_from_id: None,
					url: "https://example.com/b".into(),
					method: "POST".into(),
					resource_type: Some("XHR".into()),
					navigation: false,
					start_ms: 120.0,
					end_ms: Some(220.0),
					duration_ms: Some(100.0),
					ttfb_ms: Some(40.0),
					status: Some(201),
					ok: true,
					failure: None,
					bytes_approx: 512,
					request_headers: None,
					response_headers: None,
					post_data_preview: Some("{\"a\":1}".into()),
				},
				RequestRecord {
					id: 1,
					capture_key: "c-3".into(),
					action_id: None,
					redirected_from_id: None,
					url: "https://example.com/a".into(),
					method: "GET".into(),
					resource_type: Some("Document".into()),
					navigation: true,
					start_ms: 0.0,
					end_ms: Some(80.0),
					duration_ms: Some(80.0),
					ttfb_ms: Some(30.0),
					status: Some(200),
					ok: true,
					failure: None,
					bytes_approx: 1024,
					request_headers: None,
					response_headers: None,
					post_data_preview: None,
				},
			],
			websockets: vec![],
			counts: CaptureCounts {
				requests_seen: 2,
				requests_captured: 2,
				..Default::default()
			},
		}
	}

	#[test]
	fn entries_are_sorted_by_internal_id() {
		let har = to_har(&capture());
		assert_eq!(har.log.version, "1.2");
		assert_eq!(har.log.entries.len(), 2);
		assert_eq!(har.log.entries[0].surfwright_request_id, Some(1));
		assert_eq!(har.log.entries[1].surfwright_request_id, Some(2));
		assert_eq!(har.log.pages.len(), 1);
		assert_eq!(har.log.pages[0].id, "c-3");
	}

	#[test]
	fn export_reread_reprojects_same_performance() {
		let original = capture();
		let har = to_har(&original);
		let text = serde_json::to_string(&har).unwrap();
		let back: Har = serde_json::from_str(&text).unwrap();
		let rebuilt = from_har(&back).unwrap();

		let a = project(&original, NetworkView::Summary, &NetworkFilters::default(), None).unwrap();
		let b = project(&rebuilt, NetworkView::Summary, &NetworkFilters::default(), None).unwrap();
		assert_eq!(a["performance"], b["performance"]);
	}

	#[test]
	fn incomplete_entries_round_trip_as_incomplete() {
		let mut original = capture();
		original.requests[0].end_ms = None;
		original.requests[0].duration_ms = None;
		let har = to_har(&original);
		let rebuilt = from_har(&har).unwrap();
		let incomplete = rebuilt.requests.iter().find(|r| r.id == 2).unwrap();
		assert!(!incomplete.completed());
	}

	#[test]
	fn non_har_version_is_rejected() {
		let mut har = to_har(&capture());
		har.log.version = "2.0".into();
		assert!(from_har(&har).is_err());
	}
}
