//! Bounded JavaScript evaluation in the page's main world.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ActionEnv, finish, prologue};
use crate::error::{Result, SwError};
use crate::eval::{Evaluator, check_arg_json, check_expr_len, check_script_len};
use crate::report::ActionReport;
use crate::target::{FrameScope, frame_tree, frames_in_scope};

pub const DEFAULT_MAX_CONSOLE_ENTRIES: usize = 20;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvalParams {
	/// Inline expression, wrapped as `return (<expr>);`.
	pub expr: Option<String>,
	/// Inline function body.
	pub expression: Option<String>,
	/// Script file containing a function body.
	pub script_path: Option<String>,
	/// JSON passed as the sole argument.
	pub arg_json: Option<String>,
	/// Frame scope; eval targets the main frame unless `all` is requested,
	/// in which case the first frame of the walk is still the target.
	pub frame: Option<String>,
	pub capture_console: bool,
	pub max_console_entries: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleCapture {
	pub count: usize,
	pub entries: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalPayload {
	pub result: Value,
	pub result_truncated: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub console: Option<ConsoleCapture>,
	pub frame: String,
}

fn build_source(params: &EvalParams) -> Result<String> {
	let set = [params.expr.is_some(), params.expression.is_some(), params.script_path.is_some()]
		.iter()
		.filter(|s| **s)
		.count();
	if set != 1 {
		return Err(SwError::query("exactly one of --expr, --expression, or --script-path is required"));
	}
	if let Some(expr) = &params.expr {
		check_expr_len(expr)?;
		return Ok(format!("(function(arg) {{ return ({expr}); }})"));
	}
	if let Some(body) = &params.expression {
		check_expr_len(body)?;
		return Ok(format!("(function(arg) {{ {body} }})"));
	}
	let Some(path) = params.script_path.as_deref() else {
		return Err(SwError::query("exactly one of --expr, --expression, or --script-path is required"));
	};
	let source = std::fs::read_to_string(path)
		.map_err(|e| SwError::query(format!("cannot read script file {path}: {e}")))?;
	check_script_len(&source)?;
	Ok(format!("(function(arg) {{ {source} }})"))
}

/// Execute bounded JavaScript in the main world of the selected frame.
pub async fn eval(env: &ActionEnv<'_>, params: EvalParams) -> Result<ActionReport<EvalPayload>> {
	let source = build_source(&params)?;
	let arg = match &params.arg_json {
		Some(raw) => check_arg_json(raw)?,
		None => Value::Null,
	};
	let scope = prologue(env).await?;
	let timeout = env.timeout;

	let payload = {
		let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
		let frames = frame_tree(&scope.page.conn, timeout).await?;
		let frame = match &params.frame {
			Some(index) => frames
				.iter()
				.find(|f| f.index == *index)
				.ok_or_else(|| SwError::query(format!("no frame {index}; see `target frames`")))?,
			None => frames_in_scope(&frames, FrameScope::Main)
				.into_iter()
				.next()
				.ok_or_else(|| SwError::internal("page has no frames"))?,
		};
		let context = evaluator.main_world(&frame.frame_id, timeout).await?;

		if params.capture_console {
			evaluator
				.evaluate(Some(context), &format!("({})()", crate::scripts::CONSOLE_INSTALL), timeout)
				.await?;
		}

		let expression = format!("({source})({arg})", arg = serde_json::to_string(&arg)?);
		let projected = evaluator.evaluate(Some(context), &expression, timeout).await?;

		let console = if params.capture_console {
			let max = params.max_console_entries.unwrap_or(DEFAULT_MAX_CONSOLE_ENTRIES);
			let read = evaluator
				.run_routine(
					Some(context),
					crate::scripts::CONSOLE_READ,
					&serde_json::json!({ "maxEntries": max }),
					timeout,
				)
				.await?;
			Some(ConsoleCapture {
				count: read.value.get("count").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
				entries: read.value.get("entries").cloned().unwrap_or(Value::Array(vec![])),
			})
		} else {
			None
		};

		EvalPayload {
			result: projected.value,
			result_truncated: projected.truncated,
			console,
			frame: frame.index.clone(),
		}
	};

	finish(env, scope, "eval", payload)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exactly_one_source_is_required() {
		assert!(build_source(&EvalParams::default()).is_err());
		let both = EvalParams {
			expr: Some("1".into()),
			expression: Some("return 1;".into()),
			..Default::default()
		};
		assert!(build_source(&both).is_err());
	}

	#[test]
	fn expr_is_wrapped_as_return() {
		let params = EvalParams {
			expr: Some("document.title".into()),
			..Default::default()
		};
		let source = build_source(&params).unwrap();
		assert_eq!(source, "(function(arg) { return (document.title); })");
	}

	#[test]
	fn expression_body_is_kept_verbatim() {
		let params = EvalParams {
			expression: Some("const x = 2; return x * arg;".into()),
			..Default::default()
		};
		let source = build_source(&params).unwrap();
		assert!(source.contains("const x = 2; return x * arg;"));
	}

	#[test]
	fn oversized_expr_is_rejected() {
		let params = EvalParams {
			expr: Some("x".repeat(crate::eval::MAX_EXPR_CHARS + 1)),
			..Default::default()
		};
		assert!(build_source(&params).is_err());
	}
}
