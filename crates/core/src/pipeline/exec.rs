//! Plan execution: dispatch, templating, assertions, timeline, record.

use std::time::{Duration, Instant};

use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::assert::{AssertSpec, evaluate, first_failure};
use super::plan::{Plan, SUPPORTED_STEPS, Step, lint};
use super::template::{TemplateScope, resolve};
use crate::actions::{self, ActionEnv};
use crate::error::{ErrorCode, Result, SwError};
use crate::state::{StateStore, atomic_write};
use crate::util::now_iso;

const DEFAULT_REPEAT_MAX_ATTEMPTS: u64 = 5;

/// Executor options for one run.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
	pub doctor: bool,
	pub session_hint: Option<String>,
	pub default_timeout: Option<Duration>,
	pub record_path: Option<String>,
	pub record_label: Option<String>,
}

/// Lint-only report for `--doctor`.
pub fn doctor(plan: &Plan, source: &str) -> Value {
	let issues = lint(plan);
	json!({
		"mode": "doctor",
		"source": source,
		"stepCount": plan.steps.len(),
		"valid": issues.is_empty(),
		"supportedSteps": SUPPORTED_STEPS,
		"issues": issues,
	})
}

struct Timeline {
	start: Instant,
	events: Vec<Value>,
}

impl Timeline {
	fn new() -> Self {
		Self {
			start: Instant::now(),
			events: Vec::new(),
		}
	}

	fn push(&mut self, event: &str, detail: Value) {
		let mut entry = json!({
			"event": event,
			"tMs": self.start.elapsed().as_millis() as u64,
		});
		if let Value::Object(extra) = detail {
			for (key, value) in extra {
				entry[key] = value;
			}
		}
		self.events.push(entry);
	}
}

/// Run a plan to completion or first failure.
pub async fn run(store: &StateStore, plan: &Plan, source: &str, options: &RunOptions) -> Result<Value> {
	if options.doctor {
		return Ok(doctor(plan, source));
	}
	let issues = lint(plan);
	if !issues.is_empty() {
		return Err(SwError::new(
			ErrorCode::QueryInvalid,
			format!("plan is invalid: {}", issues[0].message),
		)
		.with_diagnostics(json!({ "issues": issues })));
	}

	let timeout = options.default_timeout.unwrap_or(Duration::from_secs(15));
	let mut scope = TemplateScope {
		session_id: options.session_hint.clone(),
		..Default::default()
	};
	let mut timeline = Timeline::new();
	let mut entries: Vec<Value> = Vec::new();
	timeline.push("run.start", json!({ "steps": plan.steps.len() }));

	for (index, step) in plan.steps.iter().enumerate() {
		timeline.push("step.start", json!({ "index": index, "id": step.id }));
		let started = Instant::now();

		let outcome = execute_step(store, step, &scope, timeout).await;
		let elapsed = started.elapsed().as_millis() as u64;

		let report = match outcome {
			Ok(report) => report,
			Err(err) => {
				timeline.push("step.end", json!({ "index": index, "id": step.id, "ok": false }));
				return Err(err.with_diagnostics(json!({
					"failedStep": index,
					"timeline": timeline.events,
				})));
			}
		};

		// Assertions run against the step's report.
		let assert_outcomes = match &step.assert {
			Some(raw) => {
				let spec: AssertSpec = serde_json::from_value(raw.clone())
					.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("step {index} assert block: {e}")))?;
				let outcomes = evaluate(&spec, &report);
				if let Err(err) = first_failure(&outcomes) {
					timeline.push("step.assert-failed", json!({ "index": index, "id": step.id }));
					timeline.push("run.end", json!({ "ok": false }));
					return Err(err.with_diagnostics(json!({
						"failedStep": index,
						"asserts": outcomes,
						"timeline": timeline.events,
					})));
				}
				Some(outcomes)
			}
			None => None,
		};

		// Context flows forward: session and target ids plus aliases.
		if let Some(session_id) = report.get("sessionId").and_then(|v| v.as_str()) {
			scope.session_id = Some(session_id.to_string());
		}
		if let Some(target_id) = report.get("targetId").and_then(|v| v.as_str()) {
			scope.target_id = Some(target_id.to_string());
		}
		if let Some(alias) = &step.alias {
			scope.steps.insert(alias.clone(), report.clone());
		}
		scope.last = Some(report.clone());

		let passed = assert_outcomes.as_ref().map(|o| o.iter().filter(|a| a.passed).count());
		entries.push(json!({
			"index": index,
			"id": step.id,
			"alias": step.alias,
			"ok": true,
			"elapsedMs": elapsed,
			"report": report,
			"assertsPassed": passed,
			"asserts": assert_outcomes,
		}));
		timeline.push("step.end", json!({ "index": index, "id": step.id, "ok": true }));
	}

	timeline.push("run.end", json!({ "ok": true }));

	// Plan-level result projection and requirements.
	let result = match &plan.result {
		Some(projection) => {
			let mut out = Map::new();
			for (field, path) in projection {
				let path = path
					.as_str()
					.ok_or_else(|| SwError::new(ErrorCode::QueryInvalid, format!("result.{field} must be a path string")))?;
				let value = scope
					.lookup(path)
					.ok_or_else(|| SwError::new(ErrorCode::QueryInvalid, format!("result path not found: {path}")))?;
				out.insert(field.clone(), value);
			}
			Some(Value::Object(out))
		}
		None => None,
	};

	if let Some(require) = &plan.require {
		check_requirements(require, result.as_ref())?;
	}

	let mut report = json!({
		"mode": "run",
		"source": source,
		"ok": true,
		"stepCount": plan.steps.len(),
		"steps": entries,
		"timeline": timeline.events,
	});
	if let Some(result) = result {
		report["result"] = result;
	}

	if let Some(record_path) = &options.record_path {
		let record = json!({
			"label": options.record_label,
			"recordedAt": now_iso(),
			"source": source,
			"plan": plan,
			"report": report,
		});
		let path = std::path::PathBuf::from(record_path);
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				std::fs::create_dir_all(parent)?;
			}
		}
		atomic_write(&path, serde_json::to_string_pretty(&record)?.as_bytes())?;
		info!(target = "surfwright.pipeline", path = %record_path, "run recorded");
		report["recordPath"] = json!(record_path);
	}

	Ok(report)
}

/// `require` supports `gte` over `result.*` paths.
fn check_requirements(require: &Value, result: Option<&Value>) -> Result<()> {
	let Some(gte) = require.get("gte").and_then(|v| v.as_object()) else {
		return Err(SwError::new(ErrorCode::QueryInvalid, "require supports only a gte block"));
	};
	let envelope = json!({ "result": result.cloned().unwrap_or(Value::Null) });
	for (path, minimum) in gte {
		let minimum = minimum
			.as_f64()
			.ok_or_else(|| SwError::new(ErrorCode::QueryInvalid, format!("require.gte.{path} must be a number")))?;
		let actual = lookup_value(&envelope, path)
			.and_then(|v| v.as_f64())
			.ok_or_else(|| SwError::new(ErrorCode::AssertFailed, format!("required path {path} is not numeric")))?;
		if actual < minimum {
			return Err(SwError::new(
				ErrorCode::AssertFailed,
				format!("requirement {path} >= {minimum} not met (actual {actual})"),
			));
		}
	}
	Ok(())
}

fn lookup_value<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
	let mut current = root;
	for part in path.split('.') {
		current = match current {
			Value::Object(map) => map.get(part)?,
			_ => return None,
		};
	}
	Some(current)
}

async fn execute_step(store: &StateStore, step: &Step, scope: &TemplateScope, default_timeout: Duration) -> Result<Value> {
	let fields = resolve(&Value::Object(step.fields.clone()), scope)?;
	let target_id = match &step.target_id {
		Some(raw) => match resolve(&Value::String(raw.clone()), scope)? {
			Value::String(id) => Some(id),
			other => Some(other.to_string()),
		},
		None => scope.target_id.clone(),
	};
	let timeout = step.timeout_ms.map(Duration::from_millis).unwrap_or(default_timeout);

	if step.id == "repeat-until" {
		return repeat_until(store, scope, &fields, timeout).await;
	}
	dispatch(store, &step.id, &fields, scope.session_id.clone(), target_id, timeout).await
}

/// Re-run the nested step until the predicate holds or attempts are
/// exhausted.
async fn repeat_until(store: &StateStore, scope: &TemplateScope, fields: &Value, timeout: Duration) -> Result<Value> {
	let nested: Step = serde_json::from_value(
		fields
			.get("step")
			.cloned()
			.ok_or_else(|| SwError::new(ErrorCode::QueryInvalid, "repeat-until requires a nested step"))?,
	)
	.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("repeat-until nested step: {e}")))?;
	if nested.id == "repeat-until" {
		return Err(SwError::new(ErrorCode::QueryInvalid, "repeat-until cannot nest another repeat-until"));
	}
	let until_path = fields
		.get("untilPath")
		.and_then(|v| v.as_str())
		.ok_or_else(|| SwError::new(ErrorCode::QueryInvalid, "repeat-until requires untilPath"))?;
	let gte = fields.get("gte").and_then(|v| v.as_f64());
	let delta_gte = fields.get("deltaGte").and_then(|v| v.as_f64());
	let max_attempts = fields
		.get("maxAttempts")
		.and_then(|v| v.as_u64())
		.unwrap_or(DEFAULT_REPEAT_MAX_ATTEMPTS)
		.max(1);

	let mut previous: Option<f64> = None;
	let mut final_value: Option<f64> = None;
	let mut last_report = Value::Null;
	let mut attempts = 0u64;
	let mut satisfied = false;

	while attempts < max_attempts {
		attempts += 1;
		let nested_fields = resolve(&Value::Object(nested.fields.clone()), scope)?;
		let report = dispatch(
			store,
			&nested.id,
			&nested_fields,
			scope.session_id.clone(),
			nested.target_id.clone().or_else(|| scope.target_id.clone()),
			timeout,
		)
		.await?;

		let attempt_scope = TemplateScope {
			session_id: scope.session_id.clone(),
			target_id: scope.target_id.clone(),
			last: Some(report.clone()),
			steps: scope.steps.clone(),
		};
		let value = attempt_scope.lookup(until_path).and_then(|v| v.as_f64());
		last_report = report;
		debug!(target = "surfwright.pipeline", attempts, ?value, "repeat-until attempt");

		let Some(value) = value else {
			continue;
		};
		final_value = Some(value);
		if let Some(threshold) = gte {
			if value >= threshold {
				satisfied = true;
				break;
			}
		}
		if let Some(min_delta) = delta_gte {
			if let Some(previous) = previous {
				if value - previous < min_delta {
					// Progress stalled.
					break;
				}
			}
		}
		if gte.is_none() && delta_gte.is_none() {
			// Only maxAttempts bounds the loop.
			satisfied = attempts >= max_attempts;
		}
		previous = Some(value);
	}

	Ok(json!({
		"attempts": attempts,
		"satisfied": satisfied,
		"untilPath": until_path,
		"finalValue": final_value,
		"last": last_report,
	}))
}

/// Map a step id to one action-set call.
async fn dispatch(
	store: &StateStore,
	id: &str,
	fields: &Value,
	session_hint: Option<String>,
	target_hint: Option<String>,
	timeout: Duration,
) -> Result<Value> {
	let mut env = ActionEnv::new(store);
	env.session_hint = session_hint;
	env.target_hint = target_hint;
	env.timeout = timeout;

	fn params<T: serde::de::DeserializeOwned>(id: &str, fields: &Value) -> Result<T> {
		serde_json::from_value(fields.clone())
			.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("{id} step fields: {e}")))
	}

	let report = match id {
		"open" => {
			env.target_hint = None;
			serde_json::to_value(actions::open(&env, params(id, fields)?).await?)?
		}
		"list" => serde_json::to_value(actions::list(&env).await?)?,
		"snapshot" => serde_json::to_value(actions::snapshot(&env, params(id, fields)?).await?)?,
		"find" => serde_json::to_value(actions::find(&env, params(id, fields)?).await?)?,
		"click" => serde_json::to_value(actions::click(&env, params(id, fields)?).await?)?,
		"click-read" => serde_json::to_value(actions::click_read(&env, params(id, fields)?).await?)?,
		"fill" => serde_json::to_value(actions::fill(&env, params(id, fields)?).await?)?,
		"upload" => serde_json::to_value(actions::upload(&env, params(id, fields)?).await?)?,
		"read" => serde_json::to_value(actions::read(&env, params(id, fields)?).await?)?,
		"eval" => serde_json::to_value(actions::eval(&env, params(id, fields)?).await?)?,
		"wait" => serde_json::to_value(actions::wait(&env, params(id, fields)?).await?)?,
		"extract" => serde_json::to_value(actions::extract(&env, params(id, fields)?).await?)?,
		"count" => serde_json::to_value(actions::count(&env, params(id, fields)?).await?)?,
		"scroll-plan" => serde_json::to_value(actions::scroll_plan(&env, params(id, fields)?).await?)?,
		other => {
			return Err(SwError::new(ErrorCode::QueryInvalid, format!("unknown step id {other:?}")));
		}
	};
	Ok(report)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn doctor_reports_shape() {
		let plan = Plan::parse(json!([{ "id": "open", "url": "https://example.com" }])).unwrap();
		let report = doctor(&plan, "plan-json");
		assert_eq!(report["mode"], "doctor");
		assert_eq!(report["valid"], true);
		assert_eq!(report["stepCount"], 1);
		assert!(report["supportedSteps"].as_array().unwrap().len() >= 14);
	}

	#[test]
	fn doctor_flags_invalid_plans() {
		let plan = Plan::parse(json!([{ "id": "nope" }])).unwrap();
		let report = doctor(&plan, "stdin");
		assert_eq!(report["valid"], false);
		assert_eq!(report["issues"].as_array().unwrap().len(), 1);
	}

	#[test]
	fn requirements_gte_passes_and_fails() {
		let result = json!({ "linkCount": 3 });
		check_requirements(&json!({ "gte": { "result.linkCount": 1 } }), Some(&result)).unwrap();
		let err = check_requirements(&json!({ "gte": { "result.linkCount": 5 } }), Some(&result)).unwrap_err();
		assert_eq!(err.code, ErrorCode::AssertFailed);
		let err = check_requirements(&json!({ "lte": {} }), Some(&result)).unwrap_err();
		assert_eq!(err.code, ErrorCode::QueryInvalid);
	}

	#[test]
	fn timeline_offsets_are_monotonic() {
		let mut timeline = Timeline::new();
		timeline.push("run.start", json!({}));
		timeline.push("step.start", json!({ "index": 0 }));
		timeline.push("run.end", json!({}));
		let offsets: Vec<u64> = timeline.events.iter().map(|e| e["tMs"].as_u64().unwrap()).collect();
		assert!(offsets.windows(2).all(|pair| pair[0] <= pair[1]));
		assert_eq!(timeline.events[0]["event"], "run.start");
	}
}
