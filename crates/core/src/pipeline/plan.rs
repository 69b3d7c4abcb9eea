//! Plan model and lint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorCode, Result, SwError};

/// Supported step ids, in contract order.
pub const SUPPORTED_STEPS: &[&str] = &[
	"open",
	"list",
	"snapshot",
	"find",
	"click",
	"click-read",
	"fill",
	"upload",
	"read",
	"eval",
	"wait",
	"extract",
	"count",
	"scroll-plan",
	"repeat-until",
];

/// One step of a plan: the id, executor-level fields, and the id-specific
/// fields kept as raw JSON for dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
	pub id: String,
	#[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
	pub alias: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub assert: Option<Value>,
	#[serde(flatten)]
	pub fields: Map<String, Value>,
}

/// A parsed plan plus optional result projection and requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
	pub steps: Vec<Step>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Map<String, Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub require: Option<Value>,
}

impl Plan {
	/// Accept either a bare step array or a `{steps, result?, require?}`
	/// object.
	pub fn parse(value: Value) -> Result<Self> {
		let plan = match value {
			Value::Array(_) => serde_json::from_value::<Vec<Step>>(value).map(|steps| Plan {
				steps,
				result: None,
				require: None,
			}),
			Value::Object(_) => serde_json::from_value::<Plan>(value),
			_ => {
				return Err(SwError::new(ErrorCode::QueryInvalid, "plan must be a JSON array or object"));
			}
		}
		.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("plan does not parse: {e}")))?;
		if plan.steps.is_empty() {
			return Err(SwError::new(ErrorCode::QueryInvalid, "plan has no steps"));
		}
		Ok(plan)
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LintIssue {
	pub step: usize,
	pub message: String,
}

/// Validate step ids, required fields, alias uniqueness, and nested
/// repeat-until shape.
pub fn lint(plan: &Plan) -> Vec<LintIssue> {
	let mut issues = Vec::new();
	let mut aliases = std::collections::HashSet::new();
	for (index, step) in plan.steps.iter().enumerate() {
		lint_step(index, step, &mut aliases, &mut issues);
	}
	issues
}

fn lint_step(index: usize, step: &Step, aliases: &mut std::collections::HashSet<String>, issues: &mut Vec<LintIssue>) {
	if !SUPPORTED_STEPS.contains(&step.id.as_str()) {
		issues.push(LintIssue {
			step: index,
			message: format!("unknown step id {:?}", step.id),
		});
		return;
	}
	if let Some(alias) = &step.alias {
		if !aliases.insert(alias.clone()) {
			issues.push(LintIssue {
				step: index,
				message: format!("duplicate alias {alias:?}"),
			});
		}
	}

	let need = |field: &str| -> bool { step.fields.contains_key(field) };
	match step.id.as_str() {
		"open" => {
			if !need("url") {
				issues.push(LintIssue {
					step: index,
					message: "open requires url".into(),
				});
			}
		}
		"fill" => {
			if !need("value") {
				issues.push(LintIssue {
					step: index,
					message: "fill requires value".into(),
				});
			}
		}
		"upload" => {
			if !need("selector") || !need("files") {
				issues.push(LintIssue {
					step: index,
					message: "upload requires selector and files".into(),
				});
			}
		}
		"count" => {
			if !need("selector") {
				issues.push(LintIssue {
					step: index,
					message: "count requires selector".into(),
				});
			}
		}
		"extract" => {
			if !need("kind") {
				issues.push(LintIssue {
					step: index,
					message: "extract requires kind".into(),
				});
			}
		}
		"wait" => {
			let modes = ["text", "selector", "networkIdle"]
				.iter()
				.filter(|field| need(field))
				.count();
			if modes != 1 {
				issues.push(LintIssue {
					step: index,
					message: "wait requires exactly one of text, selector, networkIdle".into(),
				});
			}
		}
		"repeat-until" => {
			match step.fields.get("step") {
				Some(Value::Object(_)) => {
					if let Ok(nested) = serde_json::from_value::<Step>(step.fields["step"].clone()) {
						if nested.id == "repeat-until" {
							issues.push(LintIssue {
								step: index,
								message: "repeat-until cannot nest another repeat-until".into(),
							});
						} else {
							lint_step(index, &nested, aliases, issues);
						}
					} else {
						issues.push(LintIssue {
							step: index,
							message: "repeat-until step does not parse".into(),
						});
					}
				}
				_ => issues.push(LintIssue {
					step: index,
					message: "repeat-until requires a nested step object".into(),
				}),
			}
			if !need("untilPath") {
				issues.push(LintIssue {
					step: index,
					message: "repeat-until requires untilPath".into(),
				});
			}
			if !need("gte") && !need("deltaGte") && !need("maxAttempts") {
				issues.push(LintIssue {
					step: index,
					message: "repeat-until requires at least one of gte, deltaGte, maxAttempts".into(),
				});
			}
		}
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn bare_array_and_object_forms_parse() {
		let array = Plan::parse(json!([{ "id": "open", "url": "https://example.com" }])).unwrap();
		assert_eq!(array.steps.len(), 1);
		assert!(array.result.is_none());

		let object = Plan::parse(json!({
			"steps": [{ "id": "count", "selector": "a", "as": "links" }],
			"result": { "n": "steps.links.count" },
			"require": { "gte": { "result.n": 1 } },
		}))
		.unwrap();
		assert_eq!(object.steps[0].alias.as_deref(), Some("links"));
		assert!(object.require.is_some());
	}

	#[test]
	fn empty_plan_is_rejected() {
		assert!(Plan::parse(json!([])).is_err());
		assert!(Plan::parse(json!("steps")).is_err());
	}

	#[test]
	fn unknown_ids_and_missing_fields_are_flagged() {
		let plan = Plan::parse(json!([
			{ "id": "teleport" },
			{ "id": "open" },
			{ "id": "fill", "selector": "#x" },
		]))
		.unwrap();
		let issues = lint(&plan);
		assert_eq!(issues.len(), 3);
		assert!(issues[0].message.contains("teleport"));
		assert!(issues[1].message.contains("url"));
		assert!(issues[2].message.contains("value"));
	}

	#[test]
	fn duplicate_aliases_are_flagged() {
		let plan = Plan::parse(json!([
			{ "id": "count", "selector": "a", "as": "x" },
			{ "id": "count", "selector": "b", "as": "x" },
		]))
		.unwrap();
		let issues = lint(&plan);
		assert_eq!(issues.len(), 1);
		assert!(issues[0].message.contains("duplicate alias"));
	}

	#[test]
	fn wait_requires_exactly_one_mode() {
		let plan = Plan::parse(json!([{ "id": "wait", "text": "a", "selector": "b" }])).unwrap();
		assert_eq!(lint(&plan).len(), 1);
	}

	#[test]
	fn repeat_until_shape_is_checked() {
		let missing = Plan::parse(json!([{ "id": "repeat-until", "untilPath": "last.count", "gte": 5 }])).unwrap();
		assert!(lint(&missing).iter().any(|i| i.message.contains("nested step")));

		let nested_repeat = Plan::parse(json!([{
			"id": "repeat-until",
			"untilPath": "last.count",
			"gte": 5,
			"step": { "id": "repeat-until", "untilPath": "x", "gte": 1, "step": { "id": "count", "selector": "a" } },
		}]))
		.unwrap();
		assert!(lint(&nested_repeat).iter().any(|i| i.message.contains("cannot nest")));

		let good = Plan::parse(json!([{
			"id": "repeat-until",
			"untilPath": "last.count",
			"gte": 5,
			"step": { "id": "count", "selector": "a" },
		}]))
		.unwrap();
		assert!(lint(&good).is_empty());
	}
}
