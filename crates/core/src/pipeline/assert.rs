//! Per-step assertions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, Result, SwError};

/// The `assert` block of a step.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssertSpec {
	/// path → expected value.
	#[serde(default)]
	pub equals: Option<serde_json::Map<String, Value>>,
	/// path → required substring.
	#[serde(default)]
	pub contains: Option<serde_json::Map<String, Value>>,
	/// paths that must be truthy.
	#[serde(default)]
	pub truthy: Option<Vec<String>>,
	/// paths that must exist.
	#[serde(default)]
	pub exists: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertOutcome {
	pub check: &'static str,
	pub path: String,
	pub passed: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

fn lookup<'v>(report: &'v Value, path: &str) -> Option<&'v Value> {
	let mut current = report;
	for part in path.split('.') {
		current = match current {
			Value::Object(map) => map.get(part)?,
			Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
			_ => return None,
		};
	}
	Some(current)
}

fn truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
		Value::String(s) => !s.is_empty(),
		Value::Array(items) => !items.is_empty(),
		Value::Object(_) => true,
	}
}

/// Evaluate every check against a step report.
pub fn evaluate(spec: &AssertSpec, report: &Value) -> Vec<AssertOutcome> {
	let mut outcomes = Vec::new();

	if let Some(equals) = &spec.equals {
		for (path, expected) in equals {
			let actual = lookup(report, path);
			let passed = actual == Some(expected);
			outcomes.push(AssertOutcome {
				check: "equals",
				path: path.clone(),
				passed,
				message: (!passed).then(|| format!("expected {expected}, got {}", actual.cloned().unwrap_or(Value::Null))),
			});
		}
	}
	if let Some(contains) = &spec.contains {
		for (path, needle) in contains {
			let needle_text = needle.as_str().map(String::from).unwrap_or_else(|| needle.to_string());
			let actual = lookup(report, path);
			let passed = actual
				.and_then(|v| v.as_str())
				.map(|text| text.contains(&needle_text))
				.unwrap_or(false);
			outcomes.push(AssertOutcome {
				check: "contains",
				path: path.clone(),
				passed,
				message: (!passed).then(|| format!("{path} does not contain {needle_text:?}")),
			});
		}
	}
	if let Some(paths) = &spec.truthy {
		for path in paths {
			let passed = lookup(report, path).map(truthy).unwrap_or(false);
			outcomes.push(AssertOutcome {
				check: "truthy",
				path: path.clone(),
				passed,
				message: (!passed).then(|| format!("{path} is not truthy")),
			});
		}
	}
	if let Some(paths) = &spec.exists {
		for path in paths {
			let passed = lookup(report, path).is_some();
			outcomes.push(AssertOutcome {
				check: "exists",
				path: path.clone(),
				passed,
				message: (!passed).then(|| format!("{path} does not exist")),
			});
		}
	}
	outcomes
}

/// Turn the first failed check into `E_ASSERT_FAILED`.
pub fn first_failure(outcomes: &[AssertOutcome]) -> Result<()> {
	if let Some(failed) = outcomes.iter().find(|o| !o.passed) {
		return Err(SwError::new(
			ErrorCode::AssertFailed,
			failed
				.message
				.clone()
				.unwrap_or_else(|| format!("{} assertion failed at {}", failed.check, failed.path)),
		)
		.with_hint_context(serde_json::json!({ "path": failed.path, "check": failed.check })));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn report() -> Value {
		json!({ "count": 3, "url": "https://example.com/docs", "flags": { "ok": true }, "items": ["a"] })
	}

	#[test]
	fn equals_compares_typed_values() {
		let spec: AssertSpec = serde_json::from_value(json!({ "equals": { "count": 3 } })).unwrap();
		let outcomes = evaluate(&spec, &report());
		assert!(outcomes[0].passed);

		let spec: AssertSpec = serde_json::from_value(json!({ "equals": { "count": "3" } })).unwrap();
		assert!(!evaluate(&spec, &report())[0].passed);
	}

	#[test]
	fn contains_requires_string_target() {
		let spec: AssertSpec = serde_json::from_value(json!({ "contains": { "url": "/docs" } })).unwrap();
		assert!(evaluate(&spec, &report())[0].passed);

		let spec: AssertSpec = serde_json::from_value(json!({ "contains": { "count": "3" } })).unwrap();
		assert!(!evaluate(&spec, &report())[0].passed);
	}

	#[test]
	fn truthy_and_exists_walk_paths() {
		let spec: AssertSpec =
			serde_json::from_value(json!({ "truthy": ["flags.ok", "items"], "exists": ["url", "missing"] })).unwrap();
		let outcomes = evaluate(&spec, &report());
		assert!(outcomes[0].passed);
		assert!(outcomes[1].passed);
		assert!(outcomes[2].passed);
		assert!(!outcomes[3].passed);
	}

	#[test]
	fn first_failure_carries_path_context() {
		let spec: AssertSpec = serde_json::from_value(json!({ "exists": ["missing"] })).unwrap();
		let outcomes = evaluate(&spec, &report());
		let err = first_failure(&outcomes).unwrap_err();
		assert_eq!(err.code, ErrorCode::AssertFailed);
		assert_eq!(err.hint_context.as_ref().unwrap()["path"], "missing");
	}

	#[test]
	fn unknown_assert_keys_are_rejected() {
		let parsed: std::result::Result<AssertSpec, _> = serde_json::from_value(json!({ "matches": {} }));
		assert!(parsed.is_err());
	}
}
