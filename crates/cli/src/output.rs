//! The single-JSON-object output contract.
//!
//! Every command writes exactly one JSON object to stdout: the report with
//! `ok: true` on success, or the failure envelope with `ok: false` and a
//! nonzero exit code. Compact by default; `--pretty` pretty-prints.
//! `--json` is accepted as a no-op because output is always JSON.

use serde_json::{Value, json};
use surfwright::SwError;

/// Merge `ok: true` into a report and print it.
pub fn print_success(report: Value, pretty: bool) {
	let mut envelope = json!({ "ok": true });
	if let (Value::Object(out), Value::Object(fields)) = (&mut envelope, report) {
		for (key, value) in fields {
			out.insert(key, value);
		}
	}
	print_value(&envelope, pretty);
}

/// Build the failure envelope for an error.
pub fn failure_envelope(err: &SwError) -> Value {
	let mut envelope = json!({
		"ok": false,
		"code": err.code,
		"message": err.message,
		"retryable": err.retryable(),
	});
	if !err.hints.is_empty() {
		envelope["hints"] = json!(err.hints);
	}
	if let Some(context) = &err.hint_context {
		envelope["hintContext"] = context.clone();
	}
	if let Some(phase) = &err.phase {
		envelope["phase"] = json!(phase);
	}
	if let Some(diagnostics) = &err.diagnostics {
		envelope["diagnostics"] = diagnostics.clone();
	}
	envelope
}

pub fn print_failure(err: &SwError, pretty: bool) {
	print_value(&failure_envelope(err), pretty);
}

fn print_value(value: &Value, pretty: bool) {
	let rendered = if pretty {
		serde_json::to_string_pretty(value)
	} else {
		serde_json::to_string(value)
	}
	.unwrap_or_else(|_| "{\"ok\":false,\"code\":\"E_INTERNAL\",\"message\":\"report serialization failed\"}".to_string());
	println!("{rendered}");
}

#[cfg(test)]
mod tests {
	use super::*;
	use surfwright::ErrorCode;

	#[test]
	fn failure_envelope_carries_contract_fields() {
		let err = SwError::new(ErrorCode::TargetNotFound, "gone")
			.with_hint("list targets")
			.with_hint_context(json!({ "suggestedTargetId": "AB" }));
		let envelope = failure_envelope(&err);
		assert_eq!(envelope["ok"], false);
		assert_eq!(envelope["code"], "E_TARGET_NOT_FOUND");
		assert_eq!(envelope["retryable"], false);
		assert_eq!(envelope["hints"][0], "list targets");
		assert_eq!(envelope["hintContext"]["suggestedTargetId"], "AB");
	}

	#[test]
	fn retryable_codes_are_flagged() {
		let err = SwError::new(ErrorCode::CdpUnreachable, "down");
		assert_eq!(failure_envelope(&err)["retryable"], true);
	}
}
