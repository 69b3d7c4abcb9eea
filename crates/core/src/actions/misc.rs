//! Smaller actions sharing the common skeleton: count, keypress,
//! select-option, scroll-plan, frames, target list/close/prune.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use surfwright_protocol::page::ScrollMetrics;

use super::{ActionEnv, finish, prologue};
use crate::error::{ErrorCode, Result, SwError};
use crate::eval::Evaluator;
use crate::report::ActionReport;
use crate::state::StateStore;
use crate::target::{FrameInfo, TargetSummary, close_target, frame_tree, list_targets};
use crate::util::parse_iso;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountParams {
	pub selector: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountPayload {
	pub selector: String,
	pub count: usize,
}

/// Count elements matching a selector.
pub async fn count(env: &ActionEnv<'_>, params: CountParams) -> Result<ActionReport<CountPayload>> {
	let scope = prologue(env).await?;
	let timeout = env.timeout;
	let count = {
		let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
		evaluator.validate_selector(None, &params.selector, timeout).await?;
		let frames = frame_tree(&scope.page.conn, timeout).await?;
		let root = frames.first().ok_or_else(|| SwError::internal("page has no frames"))?;
		let context = evaluator.isolated_world(&root.frame_id, timeout).await?;
		let projected = evaluator
			.run_routine(Some(context), crate::scripts::COUNT, &json!({ "selector": params.selector }), timeout)
			.await?;
		projected.value.get("count").and_then(|v| v.as_u64()).unwrap_or(0) as usize
	};
	finish(
		env,
		scope,
		"count",
		CountPayload {
			selector: params.selector,
			count,
		},
	)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeypressParams {
	pub key: String,
	#[serde(default)]
	pub selector: Option<String>,
	#[serde(default)]
	pub modifiers: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeypressPayload {
	pub key: String,
	pub dispatched: bool,
}

/// Dispatch a key event to the focused element or a selector scope.
pub async fn keypress(env: &ActionEnv<'_>, params: KeypressParams) -> Result<ActionReport<KeypressPayload>> {
	for modifier in &params.modifiers {
		if !matches!(modifier.as_str(), "alt" | "control" | "meta" | "shift") {
			return Err(SwError::query(format!("unknown modifier {modifier:?}")));
		}
	}
	let scope = prologue(env).await?;
	let timeout = env.timeout;
	let dispatched = {
		let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
		if let Some(selector) = &params.selector {
			evaluator.validate_selector(None, selector, timeout).await?;
		}
		let frames = frame_tree(&scope.page.conn, timeout).await?;
		let root = frames.first().ok_or_else(|| SwError::internal("page has no frames"))?;
		let context = evaluator.isolated_world(&root.frame_id, timeout).await?;
		let config = json!({ "key": params.key, "selector": params.selector, "modifiers": params.modifiers });
		let projected = evaluator
			.run_routine(Some(context), crate::scripts::KEYPRESS, &config, timeout)
			.await?;
		projected.value.get("dispatched").and_then(|v| v.as_bool()).unwrap_or(false)
	};
	if !dispatched {
		return Err(SwError::new(ErrorCode::TargetNotFound, "no element to receive the key event"));
	}
	finish(
		env,
		scope,
		"keypress",
		KeypressPayload {
			key: params.key,
			dispatched,
		},
	)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOptionParams {
	pub selector: String,
	#[serde(default)]
	pub value: Option<String>,
	#[serde(default)]
	pub label: Option<String>,
	#[serde(default)]
	pub index: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOptionPayload {
	pub selected: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub value: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
}

/// Select an option in a `<select>` element.
pub async fn select_option(env: &ActionEnv<'_>, params: SelectOptionParams) -> Result<ActionReport<SelectOptionPayload>> {
	let set = [params.value.is_some(), params.label.is_some(), params.index.is_some()]
		.iter()
		.filter(|s| **s)
		.count();
	if set != 1 {
		return Err(SwError::query("exactly one of --value, --label, or --index is required"));
	}
	let scope = prologue(env).await?;
	let timeout = env.timeout;
	let result: Value = {
		let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
		evaluator.validate_selector(None, &params.selector, timeout).await?;
		let frames = frame_tree(&scope.page.conn, timeout).await?;
		let root = frames.first().ok_or_else(|| SwError::internal("page has no frames"))?;
		let context = evaluator.isolated_world(&root.frame_id, timeout).await?;
		let config = json!({
			"selector": params.selector,
			"value": params.value,
			"label": params.label,
			"index": params.index,
		});
		evaluator
			.run_routine(Some(context), crate::scripts::SELECT_OPTION, &config, timeout)
			.await?
			.value
	};
	let selected = result.get("selected").and_then(|v| v.as_bool()).unwrap_or(false);
	if !selected {
		let reason = result.get("reason").and_then(|v| v.as_str()).unwrap_or("select failed");
		return Err(SwError::new(ErrorCode::TargetNotFound, reason.to_string()));
	}
	finish(
		env,
		scope,
		"select-option",
		SelectOptionPayload {
			selected,
			value: result.get("value").and_then(|v| v.as_str()).map(String::from),
			label: result.get("label").and_then(|v| v.as_str()).map(String::from),
		},
	)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrollPlanParams {
	/// Desired viewport overlap between steps, as a fraction.
	pub overlap: f64,
}

impl Default for ScrollPlanParams {
	fn default() -> Self {
		Self { overlap: 0.15 }
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollPlanPayload {
	pub scroll_height: f64,
	pub viewport_height: f64,
	pub steps: Vec<f64>,
}

/// Plan scroll offsets that tile the page with the requested overlap.
pub async fn scroll_plan(env: &ActionEnv<'_>, params: ScrollPlanParams) -> Result<ActionReport<ScrollPlanPayload>> {
	if !(0.0..0.9).contains(&params.overlap) {
		return Err(SwError::query("--overlap must be in [0, 0.9)"));
	}
	let scope = prologue(env).await?;
	let timeout = env.timeout;
	let metrics: ScrollMetrics = {
		let mut evaluator = Evaluator::new(&scope.page.conn, timeout).await?;
		let frames = frame_tree(&scope.page.conn, timeout).await?;
		let root = frames.first().ok_or_else(|| SwError::internal("page has no frames"))?;
		let context = evaluator.isolated_world(&root.frame_id, timeout).await?;
		let projected = evaluator
			.evaluate(Some(context), &format!("({})()", crate::scripts::SCROLL_METRICS), timeout)
			.await?;
		serde_json::from_value(projected.value)?
	};

	let step = (metrics.viewport_height * (1.0 - params.overlap)).max(1.0);
	let mut steps = vec![0.0];
	let mut offset = step;
	let max_offset = (metrics.scroll_height - metrics.viewport_height).max(0.0);
	while offset < max_offset {
		steps.push(offset.round());
		offset += step;
	}
	if max_offset > 0.0 {
		steps.push(max_offset.round());
	}

	finish(
		env,
		scope,
		"scroll-plan",
		ScrollPlanPayload {
			scroll_height: metrics.scroll_height,
			viewport_height: metrics.viewport_height,
			steps,
		},
	)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParams {
	pub selector: String,
	pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
	pub selector: String,
	pub files: usize,
}

/// Attach local files to a file input. Resolution goes through the DOM
/// domain: the element's remote object maps to a node id which
/// `DOM.setFileInputFiles` accepts.
pub async fn upload(env: &ActionEnv<'_>, params: UploadParams) -> Result<ActionReport<UploadPayload>> {
	if params.files.is_empty() {
		return Err(SwError::query("--files requires at least one path"));
	}
	for file in &params.files {
		if !std::path::Path::new(file).is_file() {
			return Err(SwError::query(format!("upload file does not exist: {file}")));
		}
	}
	let scope = prologue(env).await?;
	let timeout = env.timeout;
	let conn = &scope.page.conn;

	{
		let mut evaluator = Evaluator::new(conn, timeout).await?;
		evaluator.validate_selector(None, &params.selector, timeout).await?;
	}
	conn.call("DOM.enable", json!({}), timeout).await?;
	let evaluated = conn
		.call(
			"Runtime.evaluate",
			json!({
				"expression": format!("document.querySelector({})", serde_json::to_string(&params.selector)?),
				"returnByValue": false,
			}),
			timeout,
		)
		.await?;
	let object_id = evaluated
		.get("result")
		.and_then(|r| r.get("objectId"))
		.and_then(|v| v.as_str())
		.ok_or_else(|| SwError::new(ErrorCode::TargetNotFound, format!("no element matched {:?}", params.selector)))?
		.to_string();
	let node = conn.call("DOM.requestNode", json!({ "objectId": object_id }), timeout).await?;
	let node_id = node
		.get("nodeId")
		.and_then(|v| v.as_u64())
		.ok_or_else(|| SwError::internal("DOM.requestNode returned no nodeId"))?;
	conn.call(
		"DOM.setFileInputFiles",
		json!({ "files": params.files, "nodeId": node_id }),
		timeout,
	)
	.await?;
	let _ = conn.call("DOM.disable", json!({}), timeout).await;

	let files = params.files.len();
	finish(
		env,
		scope,
		"upload",
		UploadPayload {
			selector: params.selector,
			files,
		},
	)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FramesPayload {
	pub frames: Vec<FrameInfo>,
}

/// List the frame tree of the target.
pub async fn frames(env: &ActionEnv<'_>) -> Result<ActionReport<FramesPayload>> {
	let scope = prologue(env).await?;
	let frames = frame_tree(&scope.page.conn, env.timeout).await?;
	finish(env, scope, "frames", FramesPayload { frames })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetListReport {
	pub session_id: String,
	pub targets: Vec<TargetSummary>,
	pub known: Vec<crate::state::TargetRecord>,
}

/// Enumerate live targets of the resolved session, alongside what state
/// remembers about them.
pub async fn list(env: &ActionEnv<'_>) -> Result<TargetListReport> {
	let manager = crate::session::SessionManager::new(env.store);
	let outcome = manager
		.resolve_for_action(crate::session::ResolveHints {
			session_id: env.session_hint.as_deref(),
			target_id: env.target_hint.as_deref(),
			allow_implicit_new: env.allow_implicit_session,
		})
		.await?;
	let targets = list_targets(&outcome.session.cdp_origin, env.timeout).await?;
	let state = env.store.read();
	let known = state
		.targets
		.values()
		.filter(|t| t.session_id == outcome.session.session_id)
		.cloned()
		.collect();
	Ok(TargetListReport {
		session_id: outcome.session.session_id,
		targets,
		known,
	})
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetClosePayload {
	pub target_id: String,
	pub closed: bool,
}

/// Close a live target and drop its persisted snapshot.
pub async fn target_close(env: &ActionEnv<'_>, target_id: &str) -> Result<TargetClosePayload> {
	crate::util::validate_target_id(target_id)?;
	let manager = crate::session::SessionManager::new(env.store);
	let outcome = manager
		.resolve_for_action(crate::session::ResolveHints {
			session_id: env.session_hint.as_deref(),
			target_id: Some(target_id),
			allow_implicit_new: false,
		})
		.await?;
	let closed = close_target(&outcome.session.cdp_origin, target_id, env.timeout).await?;
	env.store.update(|state| {
		state.targets.remove(target_id);
		Ok(())
	})?;
	Ok(TargetClosePayload {
		target_id: target_id.to_string(),
		closed,
	})
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetPruneParams {
	/// Remove snapshots older than this.
	pub max_age_ms: u64,
	/// Keep at most this many snapshots per session, newest first.
	pub max_per_session: usize,
}

impl Default for TargetPruneParams {
	fn default() -> Self {
		Self {
			max_age_ms: 24 * 3600 * 1000,
			max_per_session: 50,
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPrunePayload {
	pub removed_by_age: usize,
	pub removed_by_cap: usize,
	pub remaining: usize,
}

/// Prune persisted target snapshots by age, then per-session cap.
pub fn target_prune(store: &StateStore, params: TargetPruneParams) -> Result<TargetPrunePayload> {
	store.update(|state| {
		let now = chrono::Utc::now();
		let mut removed_by_age = 0;
		state.targets.retain(|_, target| {
			let fresh = parse_iso(&target.updated_at)
				.map(|updated| (now - updated).num_milliseconds() < params.max_age_ms as i64)
				.unwrap_or(false);
			if !fresh {
				removed_by_age += 1;
			}
			fresh
		});

		let mut removed_by_cap = 0;
		let mut by_session: std::collections::BTreeMap<String, Vec<(String, String)>> = Default::default();
		for (id, target) in &state.targets {
			by_session
				.entry(target.session_id.clone())
				.or_default()
				.push((target.updated_at.clone(), id.clone()));
		}
		for (_, mut entries) in by_session {
			if entries.len() <= params.max_per_session {
				continue;
			}
			entries.sort_by(|a, b| b.0.cmp(&a.0));
			for (_, id) in entries.into_iter().skip(params.max_per_session) {
				state.targets.remove(&id);
				removed_by_cap += 1;
			}
		}

		Ok(TargetPrunePayload {
			removed_by_age,
			removed_by_cap,
			remaining: state.targets.len(),
		})
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{Config, Tunables};
	use crate::state::TargetRecord;
	use crate::util::now_iso;

	fn store_in(dir: &std::path::Path) -> StateStore {
		StateStore::new(Config {
			state_root: dir.to_path_buf(),
			workspace_root: None,
			tunables: Tunables::default(),
		})
	}

	fn target(id: &str, session: &str, updated_at: &str) -> TargetRecord {
		TargetRecord {
			target_id: id.into(),
			session_id: session.into(),
			url: String::new(),
			title: String::new(),
			status: "open".into(),
			last_action_id: None,
			last_action_at: None,
			last_action_kind: None,
			updated_at: updated_at.into(),
		}
	}

	#[test]
	fn prune_removes_old_snapshots_first() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state.targets.insert("old".into(), target("old", "s-1", "2000-01-01T00:00:00Z"));
				state.targets.insert("new".into(), target("new", "s-1", &now_iso()));
				Ok(())
			})
			.unwrap();

		let report = target_prune(&store, TargetPruneParams::default()).unwrap();
		assert_eq!(report.removed_by_age, 1);
		assert_eq!(report.remaining, 1);
		assert!(store.read().targets.contains_key("new"));
	}

	#[test]
	fn per_session_cap_keeps_newest() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				for i in 0..5 {
					let stamp = format!("2026-01-0{}T00:00:00Z", i + 1);
					state
						.targets
						.insert(format!("t{i}"), target(&format!("t{i}"), "s-1", &stamp));
				}
				Ok(())
			})
			.unwrap();

		let report = target_prune(
			&store,
			TargetPruneParams {
				max_age_ms: u64::MAX / 2,
				max_per_session: 2,
			},
		)
		.unwrap();
		assert_eq!(report.removed_by_cap, 3);
		let state = store.read();
		assert!(state.targets.contains_key("t4"));
		assert!(state.targets.contains_key("t3"));
		assert!(!state.targets.contains_key("t0"));
	}

	#[test]
	fn scroll_plan_overlap_bounds() {
		let params = ScrollPlanParams { overlap: 0.95 };
		assert!(!(0.0..0.9).contains(&params.overlap));
	}
}
