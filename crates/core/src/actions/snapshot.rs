//! Bounded page snapshot.

use serde::{Deserialize, Serialize};
use surfwright_protocol::page::{SnapshotConfig, SnapshotReport};

use super::{ActionEnv, finish, prologue, refresh_status};
use crate::error::Result;
use crate::eval::Evaluator;
use crate::report::ActionReport;
use crate::target::frame_tree;

pub const DEFAULT_MAX_CHARS: usize = 1200;
pub const DEFAULT_MAX_HEADINGS: usize = 10;
pub const DEFAULT_MAX_BUTTONS: usize = 10;
pub const DEFAULT_MAX_LINKS: usize = 15;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotParams {
	pub selector: Option<String>,
	pub max_chars: usize,
	pub max_headings: usize,
	pub max_buttons: usize,
	pub max_links: usize,
	pub visible_only: bool,
}

impl Default for SnapshotParams {
	fn default() -> Self {
		Self {
			selector: None,
			max_chars: DEFAULT_MAX_CHARS,
			max_headings: DEFAULT_MAX_HEADINGS,
			max_buttons: DEFAULT_MAX_BUTTONS,
			max_links: DEFAULT_MAX_LINKS,
			visible_only: true,
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
	#[serde(flatten)]
	pub report: SnapshotReport,
	pub result_truncated: bool,
}

/// Capture a bounded sample of a scope. A selector that matches nothing is
/// not an error: the report carries `scopeMatched=false` with empty buckets.
pub async fn snapshot(env: &ActionEnv<'_>, params: SnapshotParams) -> Result<ActionReport<SnapshotPayload>> {
	let mut scope = prologue(env).await?;
	let timeout = env.timeout;

	let report = {
		let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
		if let Some(selector) = &params.selector {
			evaluator.validate_selector(None, selector, timeout).await?;
		}
		let frames = frame_tree(&scope.page.conn, timeout).await?;
		let root = frames
			.first()
			.ok_or_else(|| crate::error::SwError::internal("page has no frames"))?;
		let context = evaluator.isolated_world(&root.frame_id, timeout).await?;
		let config = SnapshotConfig {
			selector: params.selector.clone(),
			max_chars: params.max_chars,
			max_headings: params.max_headings,
			max_buttons: params.max_buttons,
			max_links: params.max_links,
			visible_only: params.visible_only,
		};
		let projected = evaluator
			.run_routine(Some(context), crate::scripts::SNAPSHOT, &config, timeout)
			.await?;
		let report: SnapshotReport = serde_json::from_value(projected.value)?;
		SnapshotPayload {
			report,
			result_truncated: projected.truncated,
		}
	};

	refresh_status(&mut scope, timeout).await;
	finish(env, scope, "snapshot", report)
}
