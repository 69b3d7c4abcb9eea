//! Form filling.

use serde::{Deserialize, Serialize};
use serde_json::json;
use surfwright_protocol::page::FillReport;

use super::query::FindParams;
use super::{ActionEnv, finish, prologue};
use crate::error::{ErrorCode, Result, SwError};
use crate::eval::Evaluator;
use crate::report::ActionReport;
use crate::target::frame_tree;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FillParams {
	#[serde(flatten)]
	pub query: FindParams,
	pub value: Option<String>,
	/// Realistic mode dispatches key events around the input; synthetic
	/// mode fires input/change only.
	pub realistic_events: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillPayload {
	pub filled: bool,
	pub match_count: usize,
	pub value_length: usize,
	pub realistic_events: bool,
}

/// Type into the element located by the query. `--value` is required.
pub async fn fill(env: &ActionEnv<'_>, params: FillParams) -> Result<ActionReport<FillPayload>> {
	let value = params
		.value
		.clone()
		.ok_or_else(|| SwError::query("--value is required for fill"))?;
	let query = params.query.to_query()?;
	let scope = prologue(env).await?;
	let timeout = env.timeout;

	let report: FillReport = {
		let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
		if let Some(selector) = &query.selector {
			evaluator.validate_selector(None, selector, timeout).await?;
		}
		let frames = frame_tree(&scope.page.conn, timeout).await?;
		let root = frames
			.first()
			.ok_or_else(|| SwError::internal("page has no frames"))?;
		let context = evaluator.isolated_world(&root.frame_id, timeout).await?;
		let config = json!({
			"query": query,
			"value": value,
			"realisticEvents": params.realistic_events,
		});
		let projected = evaluator
			.run_routine(Some(context), crate::scripts::FILL, &config, timeout)
			.await?;
		serde_json::from_value(projected.value)?
	};

	if !report.filled {
		return Err(SwError::new(ErrorCode::TargetNotFound, "no fillable element matched the query"));
	}

	finish(
		env,
		scope,
		"fill",
		FillPayload {
			filled: report.filled,
			match_count: report.match_count,
			value_length: report.value_length,
			realistic_events: params.realistic_events,
		},
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fill_params_parse_with_flattened_query() {
		let params: FillParams =
			serde_json::from_str(r##"{ "selector": "#email", "value": "a@b.c", "realisticEvents": true }"##).unwrap();
		assert_eq!(params.query.selector.as_deref(), Some("#email"));
		assert_eq!(params.value.as_deref(), Some("a@b.c"));
		assert!(params.realistic_events);
	}
}
