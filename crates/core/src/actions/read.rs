//! Deterministic chunked text extraction.

use serde::{Deserialize, Serialize};
use surfwright_protocol::page::TextReport;

use super::{ActionEnv, ActionScope, finish, prologue};
use crate::error::Result;
use crate::eval::Evaluator;
use crate::report::ActionReport;
use crate::target::frame_tree;
use crate::util::collapse_whitespace;

pub const DEFAULT_CHUNK_SIZE: usize = 1200;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadParams {
	pub selector: Option<String>,
	pub chunk_size: usize,
	pub chunk_index: usize,
}

impl Default for ReadParams {
	fn default() -> Self {
		Self {
			selector: None,
			chunk_size: DEFAULT_CHUNK_SIZE,
			chunk_index: 0,
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPayload {
	pub scope_matched: bool,
	pub text: String,
	pub chunk_index: usize,
	pub total_chunks: usize,
	pub total_chars: usize,
	pub truncated: bool,
}

/// Split normalized text into fixed-size chunks and return the requested
/// one. An index at or past the end yields empty text, not an error.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_index: usize) -> ReadPayload {
	let normalized = collapse_whitespace(text);
	let chars: Vec<char> = normalized.chars().collect();
	let total_chars = chars.len();
	let chunk_size = chunk_size.max(1);
	let total_chunks = total_chars.div_ceil(chunk_size);

	if chunk_index >= total_chunks {
		return ReadPayload {
			scope_matched: true,
			text: String::new(),
			chunk_index,
			total_chunks,
			total_chars,
			truncated: false,
		};
	}

	let start = chunk_index * chunk_size;
	let end = (start + chunk_size).min(total_chars);
	ReadPayload {
		scope_matched: true,
		text: chars[start..end].iter().collect(),
		chunk_index,
		total_chunks,
		total_chars,
		truncated: chunk_index + 1 < total_chunks,
	}
}

pub(crate) async fn read_chunked(scope: &ActionScope, params: &ReadParams, timeout: std::time::Duration) -> Result<ReadPayload> {
	let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
	if let Some(selector) = &params.selector {
		evaluator.validate_selector(None, selector, timeout).await?;
	}
	let frames = frame_tree(&scope.page.conn, timeout).await?;
	let root = frames
		.first()
		.ok_or_else(|| crate::error::SwError::internal("page has no frames"))?;
	let context = evaluator.isolated_world(&root.frame_id, timeout).await?;
	let config = serde_json::json!({ "selector": params.selector });
	let projected = evaluator
		.run_routine(Some(context), crate::scripts::TEXT, &config, timeout)
		.await?;
	let report: TextReport = serde_json::from_value(projected.value)?;
	if !report.scope_matched {
		return Ok(ReadPayload {
			scope_matched: false,
			text: String::new(),
			chunk_index: params.chunk_index,
			total_chunks: 0,
			total_chars: 0,
			truncated: false,
		});
	}
	Ok(chunk_text(&report.text, params.chunk_size, params.chunk_index))
}

/// Read the trimmed text of a scope in deterministic chunks.
pub async fn read(env: &ActionEnv<'_>, params: ReadParams) -> Result<ActionReport<ReadPayload>> {
	let scope = prologue(env).await?;
	let payload = read_chunked(&scope, &params, env.timeout).await?;
	finish(env, scope, "read", payload)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chunks_cover_text_without_overlap() {
		let text = "abcdefghij";
		let first = chunk_text(text, 4, 0);
		let second = chunk_text(text, 4, 1);
		let third = chunk_text(text, 4, 2);
		assert_eq!(first.text, "abcd");
		assert_eq!(second.text, "efgh");
		assert_eq!(third.text, "ij");
		assert_eq!(first.total_chunks, 3);
		assert!(first.truncated);
		assert!(!third.truncated);
	}

	#[test]
	fn out_of_range_chunk_is_empty_not_error() {
		let payload = chunk_text("short", 1200, 5);
		assert_eq!(payload.text, "");
		assert!(!payload.truncated);
		assert_eq!(payload.total_chunks, 1);
	}

	#[test]
	fn whitespace_is_collapsed_before_chunking() {
		let payload = chunk_text("a\n\n   b\t\tc", 1200, 0);
		assert_eq!(payload.text, "a b c");
		assert_eq!(payload.total_chars, 5);
	}

	#[test]
	fn empty_text_has_zero_chunks() {
		let payload = chunk_text("", 1200, 0);
		assert_eq!(payload.total_chunks, 0);
		assert_eq!(payload.text, "");
	}
}
