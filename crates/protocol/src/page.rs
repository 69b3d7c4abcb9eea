//! Records exchanged with in-page scripts.
//!
//! Every in-page routine is a pure function: it receives one serializable
//! configuration record as its argument and returns one serializable report.
//! The host never embeds its own types into the page; these shapes are the
//! whole contract.

use serde::{Deserialize, Serialize};

/// Configuration for the snapshot routine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub selector: Option<String>,
	pub max_chars: usize,
	pub max_headings: usize,
	pub max_buttons: usize,
	pub max_links: usize,
	pub visible_only: bool,
}

/// Report returned by the snapshot routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotReport {
	pub scope_matched: bool,
	#[serde(default)]
	pub text_preview: String,
	#[serde(default)]
	pub headings: Vec<String>,
	#[serde(default)]
	pub buttons: Vec<String>,
	#[serde(default)]
	pub links: Vec<LinkItem>,
	#[serde(default)]
	pub truncated: SnapshotTruncation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkItem {
	pub text: String,
	#[serde(default)]
	pub href: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTruncation {
	#[serde(default)]
	pub text: bool,
	#[serde(default)]
	pub headings: bool,
	#[serde(default)]
	pub buttons: bool,
	#[serde(default)]
	pub links: bool,
}

/// Element query shared by find, click, and fill.
///
/// Exactly one of `text` / `selector` is set; `contains` may refine a
/// selector or stand alone as a substring query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementQuery {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub selector: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub contains: Option<String>,
	pub visible_only: bool,
	pub limit: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub href_host: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub href_path_prefix: Option<String>,
}

/// One match returned by the find routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMatch {
	pub index: usize,
	#[serde(default)]
	pub text: String,
	#[serde(default)]
	pub visible: bool,
	/// Stable selector hint of the form `tag#id.class1.class2`.
	#[serde(default)]
	pub selector_hint: String,
	#[serde(default)]
	pub href: Option<String>,
}

/// Report returned by the find routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindReport {
	#[serde(default)]
	pub matches: Vec<ElementMatch>,
	#[serde(default)]
	pub total_matched: usize,
	#[serde(default)]
	pub truncated: bool,
}

/// Report returned by the click routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickReport {
	pub clicked: bool,
	#[serde(default)]
	pub picked_index: Option<usize>,
	#[serde(default)]
	pub match_count: usize,
	#[serde(default)]
	pub text: Option<String>,
}

/// Report returned by the fill routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillReport {
	pub filled: bool,
	#[serde(default)]
	pub match_count: usize,
	#[serde(default)]
	pub value_length: usize,
}

/// Report returned by the text-read routine (pre-chunking).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextReport {
	pub scope_matched: bool,
	#[serde(default)]
	pub text: String,
}

/// One record produced by the extract routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRecord {
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub title: Option<String>,
	#[serde(default)]
	pub text: Option<String>,
	#[serde(default)]
	pub extra: Option<serde_json::Value>,
}

/// Discoverable feed found by the api-feed fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedCandidate {
	pub url: String,
	#[serde(default)]
	pub kind: String,
	#[serde(default)]
	pub title: Option<String>,
}

/// Report returned by the scroll-plan routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
	pub scroll_height: f64,
	pub viewport_height: f64,
	pub scroll_top: f64,
}
