//! Click and click-read.

use serde::{Deserialize, Serialize};
use serde_json::json;
use surfwright_protocol::page::ClickReport;

use super::query::FindParams;
use super::read::{ReadParams, ReadPayload, read_chunked};
use super::wait::{WaitMode, WaitPayload, wait_for};
use super::{ActionEnv, finish, prologue, refresh_status};
use crate::error::{ErrorCode, Result, SwError};
use crate::eval::Evaluator;
use crate::report::ActionReport;
use crate::target::frame_tree;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClickParams {
	#[serde(flatten)]
	pub query: FindParams,
	/// Zero-based pick among candidates; `index` is an alias.
	pub nth: Option<usize>,
	pub index: Option<usize>,
	pub wait_for_text: Option<String>,
	pub wait_for_selector: Option<String>,
	pub wait_network_idle: bool,
	pub proof: bool,
}

impl ClickParams {
	fn post_wait(&self) -> Result<Option<(WaitMode, String)>> {
		let set = [
			self.wait_for_text.is_some(),
			self.wait_for_selector.is_some(),
			self.wait_network_idle,
		]
		.iter()
		.filter(|s| **s)
		.count();
		if set > 1 {
			return Err(SwError::query("at most one post-click wait may be set"));
		}
		Ok(if let Some(text) = &self.wait_for_text {
			Some((WaitMode::Text, text.clone()))
		} else if let Some(selector) = &self.wait_for_selector {
			Some((WaitMode::Selector, selector.clone()))
		} else if self.wait_network_idle {
			Some((WaitMode::NetworkIdle, String::new()))
		} else {
			None
		})
	}
}

/// Proof envelope summarizing what the click observably did.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickProof {
	pub before_url: String,
	pub after_url: String,
	pub target_id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub picked_index: Option<usize>,
	pub match_count: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub wait: Option<WaitPayload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickPayload {
	pub clicked: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub picked_index: Option<usize>,
	pub match_count: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub element_text: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub wait: Option<WaitPayload>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub proof: Option<ClickProof>,
}

/// Resolve the same query as find, click the picked candidate, then run at
/// most one post-condition wait.
pub async fn click(env: &ActionEnv<'_>, params: ClickParams) -> Result<ActionReport<ClickPayload>> {
	let query = params.query.to_query()?;
	let post_wait = params.post_wait()?;
	let scope = prologue(env).await?;
	let timeout = env.timeout;
	let before_url = scope.page.url.clone();

	let report: ClickReport = {
		let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
		if let Some(selector) = &query.selector {
			evaluator.validate_selector(None, selector, timeout).await?;
		}
		let frames = frame_tree(&scope.page.conn, timeout).await?;
		let root = frames
			.first()
			.ok_or_else(|| SwError::internal("page has no frames"))?;
		let context = evaluator.isolated_world(&root.frame_id, timeout).await?;
		let config = json!({ "query": query, "nth": params.nth.or(params.index).unwrap_or(0) });
		let projected = evaluator
			.run_routine(Some(context), crate::scripts::CLICK, &config, timeout)
			.await?;
		serde_json::from_value(projected.value)?
	};

	if !report.clicked {
		return Err(SwError::new(ErrorCode::TargetNotFound, "no element matched the click query")
			.with_hint("inspect candidates with `target find`"));
	}

	let wait = match &post_wait {
		Some((mode, value)) => Some(wait_for(&scope.page.conn, *mode, value, timeout).await?),
		None => None,
	};

	let mut scope = scope;
	refresh_status(&mut scope, timeout).await;

	let proof = params.proof.then(|| ClickProof {
		before_url,
		after_url: scope.page.url.clone(),
		target_id: scope.page.target_id.clone(),
		picked_index: report.picked_index,
		match_count: report.match_count,
		wait: wait.clone(),
	});

	finish(
		env,
		scope,
		"click",
		ClickPayload {
			clicked: report.clicked,
			picked_index: report.picked_index,
			match_count: report.match_count,
			element_text: report.text,
			wait,
			proof,
		},
	)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClickReadParams {
	#[serde(flatten)]
	pub click: ClickParams,
	#[serde(flatten)]
	pub read: ReadParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickReadPayload {
	#[serde(flatten)]
	pub click: ClickPayload,
	pub read: ReadPayload,
}

/// Click, then read the resulting page in one invocation.
pub async fn click_read(env: &ActionEnv<'_>, params: ClickReadParams) -> Result<ActionReport<ClickReadPayload>> {
	let query = params.click.query.to_query()?;
	let post_wait = params.click.post_wait()?;
	let scope = prologue(env).await?;
	let timeout = env.timeout;
	let before_url = scope.page.url.clone();

	let report: ClickReport = {
		let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
		if let Some(selector) = &query.selector {
			evaluator.validate_selector(None, selector, timeout).await?;
		}
		let frames = frame_tree(&scope.page.conn, timeout).await?;
		let root = frames
			.first()
			.ok_or_else(|| SwError::internal("page has no frames"))?;
		let context = evaluator.isolated_world(&root.frame_id, timeout).await?;
		let config = json!({ "query": query, "nth": params.click.nth.or(params.click.index).unwrap_or(0) });
		let projected = evaluator
			.run_routine(Some(context), crate::scripts::CLICK, &config, timeout)
			.await?;
		serde_json::from_value(projected.value)?
	};
	if !report.clicked {
		return Err(SwError::new(ErrorCode::TargetNotFound, "no element matched the click query"));
	}

	let wait = match &post_wait {
		Some((mode, value)) => Some(wait_for(&scope.page.conn, *mode, value, timeout).await?),
		None => None,
	};

	let read = read_chunked(&scope, &params.read, timeout).await?;

	let mut scope = scope;
	refresh_status(&mut scope, timeout).await;
	let proof = params.click.proof.then(|| ClickProof {
		before_url,
		after_url: scope.page.url.clone(),
		target_id: scope.page.target_id.clone(),
		picked_index: report.picked_index,
		match_count: report.match_count,
		wait: wait.clone(),
	});

	finish(
		env,
		scope,
		"click-read",
		ClickReadPayload {
			click: ClickPayload {
				clicked: report.clicked,
				picked_index: report.picked_index,
				match_count: report.match_count,
				element_text: report.text,
				wait,
				proof,
			},
			read,
		},
	)
}
