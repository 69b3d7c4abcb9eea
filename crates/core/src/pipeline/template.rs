//! `${expr}` template resolution over the step scope.
//!
//! The scope exposes `sessionId`, `targetId`, `last` (the previous step's
//! report), and `steps.<alias>`. A string that is exactly one `${…}`
//! substitutes the looked-up value with its type preserved; a string with
//! embedded `${…}` fragments interpolates their string forms. Assignment
//! is copy-by-value.

use serde_json::{Map, Value};

use crate::error::{ErrorCode, Result, SwError};

/// Template scope for one step.
#[derive(Debug, Default)]
pub struct TemplateScope {
	pub session_id: Option<String>,
	pub target_id: Option<String>,
	pub last: Option<Value>,
	pub steps: Map<String, Value>,
}

impl TemplateScope {
	/// Look up a dot-path such as `steps.links.count` or `last.url`.
	pub fn lookup(&self, path: &str) -> Option<Value> {
		let mut parts = path.split('.');
		let head = parts.next()?;
		let mut current: Value = match head {
			"sessionId" => Value::String(self.session_id.clone()?),
			"targetId" => Value::String(self.target_id.clone()?),
			"last" => self.last.clone()?,
			"steps" => {
				let alias = parts.next()?;
				self.steps.get(alias)?.clone()
			}
			_ => return None,
		};
		for part in parts {
			current = match current {
				Value::Object(ref map) => map.get(part)?.clone(),
				Value::Array(ref items) => items.get(part.parse::<usize>().ok()?)?.clone(),
				_ => return None,
			};
		}
		Some(current)
	}
}

fn render_fragment(value: &Value) -> String {
	match value {
		Value::String(text) => text.clone(),
		other => other.to_string(),
	}
}

/// Substitute templates throughout a value tree.
pub fn resolve(value: &Value, scope: &TemplateScope) -> Result<Value> {
	Ok(match value {
		Value::String(text) => resolve_string(text, scope)?,
		Value::Array(items) => Value::Array(items.iter().map(|item| resolve(item, scope)).collect::<Result<_>>()?),
		Value::Object(entries) => Value::Object(
			entries
				.iter()
				.map(|(key, item)| Ok((key.clone(), resolve(item, scope)?)))
				.collect::<Result<_>>()?,
		),
		primitive => primitive.clone(),
	})
}

fn resolve_string(text: &str, scope: &TemplateScope) -> Result<Value> {
	// Whole-string form keeps the looked-up type.
	if let Some(inner) = text.strip_prefix("${").and_then(|rest| rest.strip_suffix("}")) {
		if !inner.contains("${") {
			return scope
				.lookup(inner)
				.ok_or_else(|| SwError::new(ErrorCode::QueryInvalid, format!("template path not found: {inner}")));
		}
	}

	if !text.contains("${") {
		return Ok(Value::String(text.to_string()));
	}

	let mut out = String::with_capacity(text.len());
	let mut rest = text;
	while let Some(start) = rest.find("${") {
		out.push_str(&rest[..start]);
		let after = &rest[start + 2..];
		let Some(end) = after.find('}') else {
			return Err(SwError::new(ErrorCode::QueryInvalid, format!("unterminated template in {text:?}")));
		};
		let path = &after[..end];
		let value = scope
			.lookup(path)
			.ok_or_else(|| SwError::new(ErrorCode::QueryInvalid, format!("template path not found: {path}")))?;
		out.push_str(&render_fragment(&value));
		rest = &after[end + 1..];
	}
	out.push_str(rest);
	Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn scope() -> TemplateScope {
		let mut steps = Map::new();
		steps.insert("links".into(), json!({ "count": 7, "items": [{ "href": "/a" }] }));
		TemplateScope {
			session_id: Some("s-1".into()),
			target_id: Some("T1".into()),
			last: Some(json!({ "url": "https://example.com", "ok": true })),
			steps,
		}
	}

	#[test]
	fn whole_string_preserves_type() {
		let out = resolve(&json!("${steps.links.count}"), &scope()).unwrap();
		assert_eq!(out, json!(7));
		let out = resolve(&json!("${last.ok}"), &scope()).unwrap();
		assert_eq!(out, json!(true));
	}

	#[test]
	fn embedded_templates_interpolate_strings() {
		let out = resolve(&json!("seen ${steps.links.count} at ${last.url}"), &scope()).unwrap();
		assert_eq!(out, json!("seen 7 at https://example.com"));
	}

	#[test]
	fn array_indexing_in_paths() {
		let out = resolve(&json!("${steps.links.items.0.href}"), &scope()).unwrap();
		assert_eq!(out, json!("/a"));
	}

	#[test]
	fn session_and_target_resolve() {
		let out = resolve(&json!({ "s": "${sessionId}", "t": "${targetId}" }), &scope()).unwrap();
		assert_eq!(out, json!({ "s": "s-1", "t": "T1" }));
	}

	#[test]
	fn unknown_path_is_query_invalid() {
		let err = resolve(&json!("${steps.missing.count}"), &scope()).unwrap_err();
		assert_eq!(err.code, ErrorCode::QueryInvalid);
	}

	#[test]
	fn non_template_strings_pass_through() {
		let out = resolve(&json!("plain $ {not a template}"), &scope()).unwrap();
		assert_eq!(out, json!("plain $ {not a template}"));
	}

	#[test]
	fn nested_structures_resolve_by_value() {
		let out = resolve(&json!({ "q": ["${steps.links.count}", { "u": "${last.url}" }] }), &scope()).unwrap();
		assert_eq!(out, json!({ "q": [7, { "u": "https://example.com" }] }));
	}
}
