//! Kind-driven structured extraction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use surfwright_protocol::page::{ExtractRecord, FeedCandidate};
use tracing::debug;

use super::{ActionEnv, finish, prologue};
use crate::error::{Result, SwError};
use crate::eval::Evaluator;
use crate::report::ActionReport;
use crate::target::{FrameScope, frame_tree, frames_in_scope};

pub const MAX_RECORDS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractKind {
	Generic,
	Blog,
	News,
	Docs,
	DocsCommands,
	CommandLines,
	Headings,
	Links,
	Codeblocks,
	Forms,
	Tables,
	TableRows,
}

impl ExtractKind {
	fn as_str(&self) -> &'static str {
		match self {
			ExtractKind::Generic => "generic",
			ExtractKind::Blog => "blog",
			ExtractKind::News => "news",
			ExtractKind::Docs => "docs",
			ExtractKind::DocsCommands => "docs-commands",
			ExtractKind::CommandLines => "command-lines",
			ExtractKind::Headings => "headings",
			ExtractKind::Links => "links",
			ExtractKind::Codeblocks => "codeblocks",
			ExtractKind::Forms => "forms",
			ExtractKind::Tables => "tables",
			ExtractKind::TableRows => "table-rows",
		}
	}

	/// Kinds with a discoverable-feed fallback on an empty DOM result.
	fn has_feed_fallback(&self) -> bool {
		matches!(self, ExtractKind::Generic | ExtractKind::Blog | ExtractKind::News | ExtractKind::Docs)
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractParams {
	pub kind: ExtractKind,
	#[serde(default)]
	pub frame_scope: FrameScope,
	/// Output field name → record path (`url`, `title`, `text`, `extra.<key>`).
	#[serde(default)]
	pub schema: Option<HashMap<String, String>>,
	/// Dedupe on a schema output field after mapping.
	#[serde(default)]
	pub dedupe_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractPayload {
	pub kind: ExtractKind,
	pub records: Vec<Value>,
	pub count: usize,
	pub source: &'static str,
	pub frames_scanned: usize,
}

/// Pull a field out of a record by path.
fn record_path(record: &ExtractRecord, path: &str) -> Value {
	match path {
		"url" => record.url.clone().map(Value::String).unwrap_or(Value::Null),
		"title" => record.title.clone().map(Value::String).unwrap_or(Value::Null),
		"text" => record.text.clone().map(Value::String).unwrap_or(Value::Null),
		other => {
			if let Some(key) = other.strip_prefix("extra.") {
				record
					.extra
					.as_ref()
					.and_then(|extra| extra.get(key))
					.cloned()
					.unwrap_or(Value::Null)
			} else {
				Value::Null
			}
		}
	}
}

/// Dedupe raw records by lowercased `(url, title)`.
fn dedupe_records(records: Vec<ExtractRecord>) -> Vec<ExtractRecord> {
	let mut seen = std::collections::HashSet::new();
	records
		.into_iter()
		.filter(|record| {
			let key = (
				record.url.as_deref().unwrap_or("").to_lowercase(),
				record.title.as_deref().unwrap_or("").to_lowercase(),
			);
			seen.insert(key)
		})
		.collect()
}

/// Map records through the output schema, then optionally dedupe on one
/// output field.
fn apply_schema(records: Vec<ExtractRecord>, schema: Option<&HashMap<String, String>>, dedupe_by: Option<&str>) -> Result<Vec<Value>> {
	let mut out: Vec<Value> = match schema {
		None => records.into_iter().map(|r| serde_json::to_value(r)).collect::<std::result::Result<_, _>>()?,
		Some(schema) => records
			.iter()
			.map(|record| {
				let mut mapped = serde_json::Map::new();
				for (field, path) in schema {
					mapped.insert(field.clone(), record_path(record, path));
				}
				Value::Object(mapped)
			})
			.collect(),
	};

	if let Some(field) = dedupe_by {
		if schema.is_none() {
			return Err(SwError::query("--dedupe-by requires a schema"));
		}
		let mut seen = std::collections::HashSet::new();
		out.retain(|record| {
			let key = record.get(field).map(|v| v.to_string()).unwrap_or_default();
			seen.insert(key)
		});
	}
	Ok(out)
}

/// Extract structured records from every frame in scope.
pub async fn extract(env: &ActionEnv<'_>, params: ExtractParams) -> Result<ActionReport<ExtractPayload>> {
	let scope = prologue(env).await?;
	let timeout = env.timeout;

	let (records, source, frames_scanned) = {
		let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
		let frames = frame_tree(&scope.page.conn, timeout).await?;
		let in_scope = frames_in_scope(&frames, params.frame_scope);
		let frames_scanned = in_scope.len();

		let mut records: Vec<ExtractRecord> = Vec::new();
		for frame in &in_scope {
			let context = evaluator.isolated_world(&frame.frame_id, timeout).await?;
			let config = json!({ "kind": params.kind.as_str(), "maxRecords": MAX_RECORDS });
			match evaluator
				.run_routine(Some(context), crate::scripts::EXTRACT, &config, timeout)
				.await
			{
				Ok(projected) => {
					let batch: Vec<ExtractRecord> = serde_json::from_value(projected.value)?;
					records.extend(batch);
				}
				Err(err) => {
					debug!(target = "surfwright.action", frame = %frame.index, %err, "frame extraction skipped");
				}
			}
		}
		let mut records = dedupe_records(records);
		records.truncate(MAX_RECORDS);

		if records.is_empty() && params.kind.has_feed_fallback() {
			let root = in_scope
				.first()
				.ok_or_else(|| SwError::internal("page has no frames"))?;
			let context = evaluator.isolated_world(&root.frame_id, timeout).await?;
			let projected = evaluator
				.evaluate(Some(context), &format!("({})()", crate::scripts::FEEDS), timeout)
				.await?;
			let feeds: Vec<FeedCandidate> = serde_json::from_value(projected.value)?;
			let feed_records: Vec<ExtractRecord> = feeds
				.into_iter()
				.map(|feed| ExtractRecord {
					url: Some(feed.url),
					title: feed.title,
					text: None,
					extra: Some(json!({ "feedKind": feed.kind })),
				})
				.collect();
			if !feed_records.is_empty() {
				(dedupe_records(feed_records), "api-feed", frames_scanned)
			} else {
				(records, "dom", frames_scanned)
			}
		} else {
			(records, "dom", frames_scanned)
		}
	};

	let mapped = apply_schema(records, params.schema.as_ref(), params.dedupe_by.as_deref())?;
	let count = mapped.len();
	finish(
		env,
		scope,
		"extract",
		ExtractPayload {
			kind: params.kind,
			records: mapped,
			count,
			source,
			frames_scanned,
		},
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(url: Option<&str>, title: Option<&str>) -> ExtractRecord {
		ExtractRecord {
			url: url.map(String::from),
			title: title.map(String::from),
			text: None,
			extra: None,
		}
	}

	#[test]
	fn dedupe_is_case_insensitive_on_url_and_title() {
		let records = vec![
			record(Some("https://a/x"), Some("Post")),
			record(Some("HTTPS://A/X"), Some("post")),
			record(Some("https://a/y"), Some("Post")),
		];
		assert_eq!(dedupe_records(records).len(), 2);
	}

	#[test]
	fn schema_maps_output_fields_by_path() {
		let records = vec![ExtractRecord {
			url: Some("https://a".into()),
			title: Some("T".into()),
			text: None,
			extra: Some(json!({ "level": 2 })),
		}];
		let schema: HashMap<String, String> = [
			("link".to_string(), "url".to_string()),
			("depth".to_string(), "extra.level".to_string()),
		]
		.into();
		let out = apply_schema(records, Some(&schema), None).unwrap();
		assert_eq!(out[0]["link"], "https://a");
		assert_eq!(out[0]["depth"], 2);
	}

	#[test]
	fn dedupe_by_requires_schema() {
		let err = apply_schema(vec![record(None, None)], None, Some("link")).unwrap_err();
		assert_eq!(err.code, crate::error::ErrorCode::QueryInvalid);
	}

	#[test]
	fn dedupe_by_collapses_on_output_field() {
		let records = vec![
			record(Some("https://a"), Some("One")),
			record(Some("https://a"), Some("Two")),
		];
		let schema: HashMap<String, String> = [("link".to_string(), "url".to_string())].into();
		let out = apply_schema(records, Some(&schema), Some("link")).unwrap();
		assert_eq!(out.len(), 1);
	}

	#[test]
	fn kind_tokens_round_trip() {
		let kind: ExtractKind = serde_json::from_str("\"table-rows\"").unwrap();
		assert_eq!(kind, ExtractKind::TableRows);
		assert_eq!(kind.as_str(), "table-rows");
		assert!(ExtractKind::Blog.has_feed_fallback());
		assert!(!ExtractKind::Tables.has_feed_fallback());
	}
}
