//! Bounded projection of evaluation results.
//!
//! Values coming back from the page are clamped before they reach the
//! report: strings to [`MAX_STRING_CHARS`], arrays and objects to
//! [`MAX_ITEMS`] entries, nesting to [`MAX_DEPTH`]. Anything deeper is
//! replaced by a marker string so output size stays bounded no matter what
//! the page returns.

use serde_json::Value;

pub const MAX_STRING_CHARS: usize = 4000;
pub const MAX_ITEMS: usize = 200;
pub const MAX_DEPTH: usize = 6;

/// Source caps, enforced before evaluation.
pub const MAX_EXPR_CHARS: usize = 4096;
pub const MAX_SCRIPT_BYTES: usize = 64 * 1024;
pub const MAX_ARG_JSON_BYTES: usize = 20 * 1024;

/// Clamp a value to the projection bounds. Returns the bounded value and
/// whether anything was cut.
pub fn bound_value(value: Value) -> (Value, bool) {
	let mut truncated = false;
	let bounded = bound(value, 0, &mut truncated);
	(bounded, truncated)
}

fn bound(value: Value, depth: usize, truncated: &mut bool) -> Value {
	if depth >= MAX_DEPTH {
		if !matches!(value, Value::Null | Value::Bool(_) | Value::Number(_)) {
			*truncated = true;
			return Value::String("[depth limit]".into());
		}
		return value;
	}
	match value {
		Value::String(text) => {
			if text.chars().count() > MAX_STRING_CHARS {
				*truncated = true;
				Value::String(text.chars().take(MAX_STRING_CHARS).collect())
			} else {
				Value::String(text)
			}
		}
		Value::Array(items) => {
			let over = items.len() > MAX_ITEMS;
			if over {
				*truncated = true;
			}
			Value::Array(
				items
					.into_iter()
					.take(MAX_ITEMS)
					.map(|item| bound(item, depth + 1, truncated))
					.collect(),
			)
		}
		Value::Object(entries) => {
			let over = entries.len() > MAX_ITEMS;
			if over {
				*truncated = true;
			}
			Value::Object(
				entries
					.into_iter()
					.take(MAX_ITEMS)
					.map(|(key, item)| (key, bound(item, depth + 1, truncated)))
					.collect(),
			)
		}
		primitive => primitive,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn small_values_pass_untouched() {
		let (value, truncated) = bound_value(json!({ "a": [1, 2, 3], "b": "text" }));
		assert!(!truncated);
		assert_eq!(value, json!({ "a": [1, 2, 3], "b": "text" }));
	}

	#[test]
	fn long_strings_are_cut() {
		let long = "x".repeat(MAX_STRING_CHARS + 10);
		let (value, truncated) = bound_value(json!(long));
		assert!(truncated);
		assert_eq!(value.as_str().unwrap().len(), MAX_STRING_CHARS);
	}

	#[test]
	fn arrays_are_capped() {
		let big: Vec<u32> = (0..(MAX_ITEMS as u32 + 50)).collect();
		let (value, truncated) = bound_value(json!(big));
		assert!(truncated);
		assert_eq!(value.as_array().unwrap().len(), MAX_ITEMS);
	}

	#[test]
	fn depth_limit_replaces_subtrees() {
		let mut value = json!("leaf");
		for _ in 0..(MAX_DEPTH + 2) {
			value = json!({ "next": value });
		}
		let (bounded, truncated) = bound_value(value);
		assert!(truncated);
		let text = serde_json::to_string(&bounded).unwrap();
		assert!(text.contains("[depth limit]"));
	}

	#[test]
	fn numbers_survive_at_depth() {
		let mut value = json!(7);
		for _ in 0..MAX_DEPTH {
			value = json!([value]);
		}
		let (_, truncated) = bound_value(value);
		// The leaf number sits exactly at the limit and is kept.
		assert!(!truncated);
	}
}
