//! Target enumeration and handle resolution.
//!
//! Pages are identified by their CDP target id, read back through
//! `Target.getTargetInfo` on a per-page connection so the handle is stable
//! for the life of the page. Pages that cannot be identified are dropped
//! rather than given synthetic handles.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use surfwright_protocol::cdp::TargetInfo;
use surfwright_runtime::{CdpConnection, list_pages};
use tracing::{debug, warn};

use crate::error::{ErrorCode, Phase, Result, SwError};
use crate::state::SurfwrightState;

mod frames;

pub use frames::{FrameInfo, FrameScope, frame_tree, frames_in_scope};

/// A live page with its identifying metadata.
#[derive(Debug)]
pub struct PageHandle {
	pub target_id: String,
	pub url: String,
	pub title: String,
	pub conn: CdpConnection,
}

/// Summary row for `target list` and not-found diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
	pub target_id: String,
	pub url: String,
	pub title: String,
	pub attached: bool,
}

/// Enumerate identifiable page targets at a CDP origin.
pub async fn list_targets(origin: &str, timeout: Duration) -> Result<Vec<TargetSummary>> {
	let pages = list_pages(origin, timeout).await?;
	let mut out = Vec::new();
	for page in pages.into_iter().filter(|p| p.is_page()) {
		let Some(ws_url) = page.web_socket_debugger_url.clone() else {
			debug!(target = "surfwright.target", page_id = %page.id, "page lacks a debugger url; dropped");
			continue;
		};
		match identify(&ws_url, timeout).await {
			Ok(info) => out.push(TargetSummary {
				target_id: info.target_id,
				url: info.url,
				title: info.title,
				attached: info.attached,
			}),
			Err(err) => {
				warn!(target = "surfwright.target", page_id = %page.id, %err, "unidentifiable page dropped");
			}
		}
	}
	Ok(out)
}

async fn identify(ws_url: &str, timeout: Duration) -> Result<TargetInfo> {
	let conn = CdpConnection::connect(ws_url).await?;
	let result = conn.call("Target.getTargetInfo", json!({}), timeout).await?;
	let info: TargetInfo = serde_json::from_value(
		result
			.get("targetInfo")
			.cloned()
			.ok_or_else(|| SwError::internal("Target.getTargetInfo returned no targetInfo"))?,
	)?;
	Ok(info)
}

/// Connect to the page with the given target id.
///
/// When the id is gone but state remembers its URL and exactly one current
/// target carries that URL, the error proposes the replacement handle.
pub async fn resolve_target(
	origin: &str,
	target_id: &str,
	state: &SurfwrightState,
	timeout: Duration,
) -> Result<PageHandle> {
	let pages = list_pages(origin, timeout).await?;
	for page in pages.iter().filter(|p| p.is_page()) {
		let Some(ws_url) = page.web_socket_debugger_url.clone() else {
			continue;
		};
		let Ok(info) = identify(&ws_url, timeout).await else {
			continue;
		};
		if info.target_id == target_id {
			let conn = CdpConnection::connect(&ws_url).await?;
			return Ok(PageHandle {
				target_id: info.target_id,
				url: info.url,
				title: info.title,
				conn,
			});
		}
	}

	// The id is gone; try a URL-based replacement proposal.
	let known_url = state.targets.get(target_id).map(|t| t.url.clone()).filter(|u| !u.is_empty());
	let mut err = SwError::new(ErrorCode::TargetNotFound, format!("no live target with id {target_id}"))
		.with_phase(Phase::ResolveTarget);

	if let Some(url) = known_url {
		let matching: Vec<_> = pages
			.iter()
			.filter(|p| p.is_page() && p.url == url)
			.collect();
		if matching.len() == 1 {
			if let Some(ws_url) = matching[0].web_socket_debugger_url.clone() {
				if let Ok(info) = identify(&ws_url, timeout).await {
					err = err
						.with_hint(format!("the page at {url} now has target id {}", info.target_id))
						.with_hint_context(json!({
							"suggestedTargetId": info.target_id,
							"url": url,
						}));
				}
			}
		}
	}

	let known: Vec<_> = pages
		.iter()
		.filter(|p| p.is_page())
		.map(|p| json!({ "id": p.id, "url": p.url, "title": p.title }))
		.collect();
	Err(err.with_diagnostics(json!({ "liveTargets": known })))
}

/// Connect to the first live page at the origin, if any.
pub async fn first_page(origin: &str, timeout: Duration) -> Result<Option<PageHandle>> {
	let pages = list_pages(origin, timeout).await?;
	for page in pages.into_iter().filter(|p| p.is_page()) {
		let Some(ws_url) = page.web_socket_debugger_url.clone() else {
			continue;
		};
		if let Ok(info) = identify(&ws_url, timeout).await {
			let conn = CdpConnection::connect(&ws_url).await?;
			return Ok(Some(PageHandle {
				target_id: info.target_id,
				url: info.url,
				title: info.title,
				conn,
			}));
		}
	}
	Ok(None)
}

/// Find a live page by URL predicate and connect to it.
pub async fn find_page_by_url(
	origin: &str,
	timeout: Duration,
	predicate: impl Fn(&str) -> bool,
) -> Result<Option<PageHandle>> {
	let pages = list_pages(origin, timeout).await?;
	for page in pages.into_iter().filter(|p| p.is_page()) {
		if !predicate(&page.url) {
			continue;
		}
		let Some(ws_url) = page.web_socket_debugger_url.clone() else {
			continue;
		};
		if let Ok(info) = identify(&ws_url, timeout).await {
			let conn = CdpConnection::connect(&ws_url).await?;
			return Ok(Some(PageHandle {
				target_id: info.target_id,
				url: info.url,
				title: info.title,
				conn,
			}));
		}
	}
	Ok(None)
}

/// Create a fresh page via the browser-level endpoint and connect to it.
pub async fn create_target(origin: &str, url: &str, timeout: Duration) -> Result<PageHandle> {
	let version = surfwright_runtime::probe_reachable(origin, timeout, None).await?;
	let browser_ws = version
		.web_socket_debugger_url
		.ok_or_else(|| SwError::new(ErrorCode::CdpUnreachable, "browser endpoint lacks webSocketDebuggerUrl"))?;
	let browser = CdpConnection::connect(&browser_ws).await?;
	let created = browser.call("Target.createTarget", json!({ "url": url }), timeout).await?;
	let target_id = created
		.get("targetId")
		.and_then(|v| v.as_str())
		.ok_or_else(|| SwError::internal("Target.createTarget returned no targetId"))?
		.to_string();
	drop(browser);

	// The page endpoint appears in /json/list shortly after creation.
	let deadline = std::time::Instant::now() + timeout;
	loop {
		let pages = list_pages(origin, timeout).await?;
		if let Some(page) = pages.iter().find(|p| p.id == target_id) {
			if let Some(ws_url) = page.web_socket_debugger_url.clone() {
				let conn = CdpConnection::connect(&ws_url).await?;
				return Ok(PageHandle {
					target_id,
					url: page.url.clone(),
					title: page.title.clone(),
					conn,
				});
			}
		}
		if std::time::Instant::now() >= deadline {
			return Err(SwError::new(
				ErrorCode::TargetNotFound,
				format!("created target {target_id} never appeared in /json/list"),
			));
		}
		tokio::time::sleep(Duration::from_millis(100)).await;
	}
}

/// Close a target via the browser-level endpoint.
pub async fn close_target(origin: &str, target_id: &str, timeout: Duration) -> Result<bool> {
	let version = surfwright_runtime::probe_reachable(origin, timeout, None).await?;
	let browser_ws = version
		.web_socket_debugger_url
		.ok_or_else(|| SwError::new(ErrorCode::CdpUnreachable, "browser endpoint lacks webSocketDebuggerUrl"))?;
	let browser = CdpConnection::connect(&browser_ws).await?;
	let result = browser
		.call("Target.closeTarget", json!({ "targetId": target_id }), timeout)
		.await?;
	Ok(result.get("success").and_then(|v| v.as_bool()).unwrap_or(false))
}
