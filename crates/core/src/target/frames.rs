//! Frame tree enumeration.
//!
//! `Page.getFrameTree` yields a stable pre-order walk; frames are numbered
//! `f-0, f-1, …` in that order, with the root always `f-0`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use surfwright_protocol::cdp::FrameTreeNode;
use surfwright_runtime::CdpConnection;

use crate::error::{ErrorCode, Result, SwError};

/// Which frames an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameScope {
	/// Root frame only.
	#[default]
	Main,
	/// Every frame, pre-order.
	All,
}

impl std::str::FromStr for FrameScope {
	type Err = SwError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"main" => Ok(FrameScope::Main),
			"all" => Ok(FrameScope::All),
			other => Err(SwError::new(
				ErrorCode::QueryInvalid,
				format!("frame scope must be main or all: {other}"),
			)),
		}
	}
}

/// One frame of the pre-order walk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
	/// Ordinal handle, `f-0` for the root.
	pub index: String,
	pub frame_id: String,
	pub url: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parent_id: Option<String>,
	pub same_origin: bool,
}

/// Fetch and flatten the frame tree.
pub async fn frame_tree(conn: &CdpConnection, timeout: Duration) -> Result<Vec<FrameInfo>> {
	let result = conn.call("Page.getFrameTree", json!({}), timeout).await?;
	let root: FrameTreeNode = serde_json::from_value(
		result
			.get("frameTree")
			.cloned()
			.ok_or_else(|| SwError::internal("Page.getFrameTree returned no frameTree"))?,
	)?;
	let root_origin = origin_of(&root.frame.url).or_else(|| root.frame.security_origin.clone());
	let mut out = Vec::new();
	walk(&root, root_origin.as_deref(), &mut out);
	Ok(out)
}

fn walk(node: &FrameTreeNode, root_origin: Option<&str>, out: &mut Vec<FrameInfo>) {
	let frame_origin = origin_of(&node.frame.url).or_else(|| node.frame.security_origin.clone());
	let same_origin = match (root_origin, frame_origin.as_deref()) {
		(Some(root), Some(frame)) => root == frame,
		// The root itself and about:blank children count as same-origin.
		_ => node.frame.parent_id.is_none() || node.frame.url == "about:blank",
	};
	out.push(FrameInfo {
		index: format!("f-{}", out.len()),
		frame_id: node.frame.id.clone(),
		url: node.frame.url.clone(),
		parent_id: node.frame.parent_id.clone(),
		same_origin,
	});
	for child in &node.child_frames {
		walk(child, root_origin, out);
	}
}

fn origin_of(url: &str) -> Option<String> {
	let parsed = url::Url::parse(url).ok()?;
	if !matches!(parsed.scheme(), "http" | "https") {
		return None;
	}
	let host = parsed.host_str()?;
	Some(match parsed.port() {
		Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
		None => format!("{}://{}", parsed.scheme(), host),
	})
}

/// Select the frames an operation should run against.
pub fn frames_in_scope(frames: &[FrameInfo], scope: FrameScope) -> Vec<&FrameInfo> {
	match scope {
		FrameScope::Main => frames.first().into_iter().collect(),
		FrameScope::All => frames.iter().collect(),
	}
}
