//! Page-script evaluation in isolated and main worlds.
//!
//! Per frame there are two evaluators: an isolated world (created via
//! `Page.createIsolatedWorld`, cached per frame id) for read-only DOM
//! scraping, and the page's main world (identified through
//! `Runtime.executionContextCreated` with `auxData.isDefault`) for `eval`,
//! which must see page scope. Both run through
//! `Runtime.evaluate(returnByValue=true, awaitPromise=true)` with bounded
//! result projection.

mod project;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Value, json};
use surfwright_protocol::cdp::{EvaluateResult, ExecutionContextDescription};
use surfwright_runtime::{CdpConnection, CdpEvent, RuntimeError};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{ErrorCode, Result, SwError};

pub use project::{
	MAX_ARG_JSON_BYTES, MAX_DEPTH, MAX_EXPR_CHARS, MAX_ITEMS, MAX_SCRIPT_BYTES, MAX_STRING_CHARS, bound_value,
};

const ISOLATED_WORLD_NAME: &str = "__surfwright_world";
const EXCEPTION_MESSAGE_CAP: usize = 400;

/// A bounded evaluation result.
#[derive(Debug, Clone)]
pub struct Projected {
	pub value: Value,
	pub truncated: bool,
}

/// Per-connection evaluator, built once per CDP session.
pub struct Evaluator<'c> {
	conn: &'c CdpConnection,
	events: broadcast::Receiver<CdpEvent>,
	isolated_worlds: HashMap<String, i64>,
	main_worlds: HashMap<String, i64>,
}

impl<'c> Evaluator<'c> {
	/// Subscribe to runtime events, then enable the Page and Runtime
	/// domains. Enabling Runtime replays `executionContextCreated` for
	/// every existing context, so subscription must come first.
	pub async fn new(conn: &'c CdpConnection, timeout: Duration) -> Result<Evaluator<'c>> {
		let events = conn.subscribe();
		conn.call("Page.enable", json!({}), timeout).await?;
		conn.call("Runtime.enable", json!({}), timeout).await?;
		Ok(Self {
			conn,
			events,
			isolated_worlds: HashMap::new(),
			main_worlds: HashMap::new(),
		})
	}

	/// Isolated world for a frame, created on first use and cached.
	pub async fn isolated_world(&mut self, frame_id: &str, timeout: Duration) -> Result<i64> {
		if let Some(context) = self.isolated_worlds.get(frame_id) {
			return Ok(*context);
		}
		let result = self
			.conn
			.call(
				"Page.createIsolatedWorld",
				json!({ "frameId": frame_id, "worldName": ISOLATED_WORLD_NAME, "grantUniveralAccess": false }),
				timeout,
			)
			.await?;
		let context = result
			.get("executionContextId")
			.and_then(|v| v.as_i64())
			.ok_or_else(|| SwError::internal("Page.createIsolatedWorld returned no executionContextId"))?;
		self.isolated_worlds.insert(frame_id.to_string(), context);
		Ok(context)
	}

	/// Main-world context for a frame, observed from runtime events.
	pub async fn main_world(&mut self, frame_id: &str, timeout: Duration) -> Result<i64> {
		let deadline = std::time::Instant::now() + timeout;
		loop {
			self.drain_context_events();
			if let Some(context) = self.main_worlds.get(frame_id) {
				return Ok(*context);
			}
			if std::time::Instant::now() >= deadline {
				return Err(SwError::new(
					ErrorCode::EvalRuntime,
					format!("no main-world execution context observed for frame {frame_id}"),
				));
			}
			match tokio::time::timeout(Duration::from_millis(50), self.events.recv()).await {
				Ok(Ok(event)) => self.note_event(event),
				Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
				Ok(Err(broadcast::error::RecvError::Closed)) => {
					return Err(SwError::new(ErrorCode::CdpUnreachable, "connection closed while waiting for context"));
				}
				Err(_) => continue,
			}
		}
	}

	fn drain_context_events(&mut self) {
		while let Ok(event) = self.events.try_recv() {
			self.note_event(event);
		}
	}

	fn note_event(&mut self, event: CdpEvent) {
		if event.method != "Runtime.executionContextCreated" {
			return;
		}
		let Some(context) = event.params.get("context").cloned() else {
			return;
		};
		let Ok(desc) = serde_json::from_value::<ExecutionContextDescription>(context) else {
			return;
		};
		if let Some(aux) = &desc.aux_data {
			if aux.is_default {
				if let Some(frame_id) = &aux.frame_id {
					debug!(target = "surfwright.eval", frame_id = %frame_id, context = desc.id, "main world observed");
					self.main_worlds.insert(frame_id.clone(), desc.id);
				}
			}
		}
	}

	/// Evaluate an expression, projecting the result within bounds.
	///
	/// On timeout, `Runtime.terminateExecution` and `Page.stopLoading` are
	/// attempted best-effort before `E_EVAL_TIMEOUT` surfaces.
	pub async fn evaluate(&self, context_id: Option<i64>, expression: &str, timeout: Duration) -> Result<Projected> {
		let mut params = json!({
			"expression": expression,
			"returnByValue": true,
			"awaitPromise": true,
		});
		if let Some(context) = context_id {
			params["contextId"] = json!(context);
		}

		let outcome = self.conn.call("Runtime.evaluate", params, timeout).await;
		let result = match outcome {
			Ok(result) => result,
			Err(RuntimeError::CallTimeout { ms, .. }) => {
				let cleanup = Duration::from_millis(500);
				let _ = self.conn.call("Runtime.terminateExecution", json!({}), cleanup).await;
				let _ = self.conn.call("Page.stopLoading", json!({}), cleanup).await;
				return Err(SwError::new(ErrorCode::EvalTimeout, format!("evaluation exceeded {ms}ms")));
			}
			Err(RuntimeError::Call { message, .. }) if message.contains("serializ") => {
				return Err(SwError::new(ErrorCode::EvalResultUnserializable, message));
			}
			Err(err) => return Err(err.into()),
		};

		let parsed: EvaluateResult = serde_json::from_value(result)?;
		if let Some(details) = parsed.exception_details {
			let (message, _) = crate::util::truncate_chars(&details.message(), EXCEPTION_MESSAGE_CAP);
			return Err(SwError::new(ErrorCode::EvalRuntime, message));
		}
		if parsed.result.unserializable_value.is_some() {
			return Err(SwError::new(
				ErrorCode::EvalResultUnserializable,
				"result could not be returned by value",
			));
		}
		let (value, truncated) = bound_value(parsed.result.value.unwrap_or(Value::Null));
		Ok(Projected { value, truncated })
	}

	/// Run one of the in-page routines: a function literal applied to a
	/// serialized configuration record.
	pub async fn run_routine<C: serde::Serialize>(
		&self,
		context_id: Option<i64>,
		routine: &str,
		config: &C,
		timeout: Duration,
	) -> Result<Projected> {
		let arg = serde_json::to_string(config)?;
		let expression = format!("({routine})({arg})");
		self.evaluate(context_id, &expression, timeout).await
	}

	/// Validate a selector by running `document.querySelector` in the
	/// target frame; a thrown DOMException maps to `E_SELECTOR_INVALID`.
	pub async fn validate_selector(&self, context_id: Option<i64>, selector: &str, timeout: Duration) -> Result<()> {
		let expression = format!(
			"(() => {{ try {{ document.querySelector({sel}); return null; }} catch (e) {{ return String(e); }} }})()",
			sel = serde_json::to_string(selector)?,
		);
		let projected = self.evaluate(context_id, &expression, timeout).await?;
		match projected.value {
			Value::Null => Ok(()),
			Value::String(detail) => Err(SwError::new(
				ErrorCode::SelectorInvalid,
				format!("invalid selector {selector:?}: {detail}"),
			)),
			other => Err(SwError::internal(format!("unexpected selector validation result: {other}"))),
		}
	}
}

/// Enforce the inline-expression cap.
pub fn check_expr_len(expr: &str) -> Result<()> {
	if expr.chars().count() > MAX_EXPR_CHARS {
		return Err(SwError::new(
			ErrorCode::EvalScriptTooLarge,
			format!("inline expression exceeds {MAX_EXPR_CHARS} chars"),
		));
	}
	Ok(())
}

/// Enforce the script-file cap.
pub fn check_script_len(source: &str) -> Result<()> {
	if source.len() > MAX_SCRIPT_BYTES {
		return Err(SwError::new(
			ErrorCode::EvalScriptTooLarge,
			format!("script file exceeds {MAX_SCRIPT_BYTES} bytes"),
		));
	}
	Ok(())
}

/// Enforce the argument-JSON cap and validate it parses.
pub fn check_arg_json(arg: &str) -> Result<Value> {
	if arg.len() > MAX_ARG_JSON_BYTES {
		return Err(SwError::new(
			ErrorCode::QueryInvalid,
			format!("--arg-json exceeds {MAX_ARG_JSON_BYTES} bytes"),
		));
	}
	serde_json::from_str(arg).map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("--arg-json is not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn expr_cap_is_enforced() {
		assert!(check_expr_len("1 + 1").is_ok());
		let big = "x".repeat(MAX_EXPR_CHARS + 1);
		assert_eq!(check_expr_len(&big).unwrap_err().code, ErrorCode::EvalScriptTooLarge);
	}

	#[test]
	fn script_cap_is_enforced() {
		let big = "y".repeat(MAX_SCRIPT_BYTES + 1);
		assert_eq!(check_script_len(&big).unwrap_err().code, ErrorCode::EvalScriptTooLarge);
	}

	#[test]
	fn arg_json_must_parse_and_fit() {
		assert_eq!(check_arg_json(r#"{"a":1}"#).unwrap()["a"], 1);
		assert_eq!(check_arg_json("not json").unwrap_err().code, ErrorCode::QueryInvalid);
		let big = format!("\"{}\"", "z".repeat(MAX_ARG_JSON_BYTES));
		assert_eq!(check_arg_json(&big).unwrap_err().code, ErrorCode::QueryInvalid);
	}
}
