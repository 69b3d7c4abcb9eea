//! Element location shared by find, click, and fill.

use serde::{Deserialize, Serialize};
use surfwright_protocol::page::{ElementQuery, FindReport};

use super::{ActionEnv, ActionScope, finish, prologue};
use crate::error::{ErrorCode, Result, SwError};
use crate::eval::Evaluator;
use crate::report::ActionReport;
use crate::target::frame_tree;

pub const DEFAULT_LIMIT: usize = 12;
pub const MAX_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindParams {
	pub text: Option<String>,
	pub selector: Option<String>,
	pub contains: Option<String>,
	pub visible_only: Option<bool>,
	pub limit: Option<usize>,
	pub first: bool,
	pub href_host: Option<String>,
	pub href_path_prefix: Option<String>,
}

impl FindParams {
	/// Exactly one of text/contains/selector must anchor the query;
	/// `contains` may also refine a selector.
	pub fn to_query(&self) -> Result<ElementQuery> {
		let anchors = [self.text.is_some(), self.selector.is_some(), self.contains.is_some()]
			.iter()
			.filter(|set| **set)
			.count();
		if anchors == 0 {
			return Err(SwError::query("one of --text, --selector, or --contains is required"));
		}
		if self.text.is_some() && (self.selector.is_some() || self.contains.is_some()) {
			return Err(SwError::query("--text cannot be combined with --selector or --contains"));
		}
		let limit = if self.first {
			1
		} else {
			let requested = self.limit.unwrap_or(DEFAULT_LIMIT);
			if requested == 0 || requested > MAX_LIMIT {
				return Err(SwError::new(
					ErrorCode::QueryInvalid,
					format!("limit must be between 1 and {MAX_LIMIT}"),
				));
			}
			requested
		};
		Ok(ElementQuery {
			text: self.text.clone(),
			selector: self.selector.clone(),
			contains: self.contains.clone(),
			visible_only: self.visible_only.unwrap_or(true),
			limit,
			href_host: self.href_host.clone(),
			href_path_prefix: self.href_path_prefix.clone(),
		})
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindPayload {
	#[serde(flatten)]
	pub report: FindReport,
}

/// Run a find-equivalent query in the page's main frame, validating any
/// selector first.
pub(crate) async fn run_query(scope: &ActionScope, query: &ElementQuery, timeout: std::time::Duration) -> Result<FindReport> {
	let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
	if let Some(selector) = &query.selector {
		evaluator.validate_selector(None, selector, timeout).await?;
	}
	let frames = frame_tree(&scope.page.conn, timeout).await?;
	let root = frames
		.first()
		.ok_or_else(|| SwError::internal("page has no frames"))?;
	let context = evaluator.isolated_world(&root.frame_id, timeout).await?;
	let projected = evaluator
		.run_routine(Some(context), crate::scripts::FIND, query, timeout)
		.await?;
	Ok(serde_json::from_value(projected.value)?)
}

/// Locate elements and report up to `limit` matches with selector hints.
pub async fn find(env: &ActionEnv<'_>, params: FindParams) -> Result<ActionReport<FindPayload>> {
	let query = params.to_query()?;
	let scope = prologue(env).await?;
	let report = run_query(&scope, &query, env.timeout).await?;
	finish(env, scope, "find", FindPayload { report })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn query_requires_an_anchor() {
		let err = FindParams::default().to_query().unwrap_err();
		assert_eq!(err.code, ErrorCode::QueryInvalid);
	}

	#[test]
	fn text_excludes_other_anchors() {
		let params = FindParams {
			text: Some("Sign in".into()),
			selector: Some("a".into()),
			..Default::default()
		};
		assert!(params.to_query().is_err());
	}

	#[test]
	fn contains_may_refine_selector() {
		let params = FindParams {
			selector: Some("a".into()),
			contains: Some("docs".into()),
			..Default::default()
		};
		let query = params.to_query().unwrap();
		assert_eq!(query.selector.as_deref(), Some("a"));
		assert_eq!(query.contains.as_deref(), Some("docs"));
		assert_eq!(query.limit, DEFAULT_LIMIT);
	}

	#[test]
	fn first_forces_limit_one() {
		let params = FindParams {
			text: Some("x".into()),
			first: true,
			limit: Some(40),
			..Default::default()
		};
		assert_eq!(params.to_query().unwrap().limit, 1);
	}

	#[test]
	fn limit_is_capped_at_fifty() {
		let params = FindParams {
			text: Some("x".into()),
			limit: Some(51),
			..Default::default()
		};
		assert!(params.to_query().is_err());
	}
}
