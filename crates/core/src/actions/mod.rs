//! The action set.
//!
//! Every action follows the same skeleton: sanitize ids, resolve the
//! session, connect CDP and resolve the target, perform the kind-specific
//! body, persist a target snapshot (unless suppressed), and report through
//! the common envelope with the five-field timing breakdown.

mod click;
mod eval;
mod extract;
mod fill;
mod misc;
mod open;
mod query;
mod read;
mod screenshot;
mod snapshot;
mod wait;

pub use click::{ClickParams, ClickPayload, ClickReadParams, click, click_read};
pub use extract::{ExtractKind, ExtractParams, ExtractPayload, extract};
pub use fill::{FillParams, FillPayload, fill};
pub use misc::{
	CountParams, KeypressParams, ScrollPlanParams, SelectOptionParams, TargetPruneParams, UploadParams, count, frames,
	keypress, list, scroll_plan, select_option, target_close, target_prune, upload,
};
pub use eval::{EvalParams, EvalPayload, eval};
pub use open::{OpenParams, OpenPayload, ReuseMode, WaitUntil, open};
pub use query::{FindParams, FindPayload, find};
pub use read::{ReadParams, ReadPayload, read};
pub use screenshot::{EmulateParams, ScreenshotParams, emulate, screenshot};
pub use snapshot::{SnapshotParams, SnapshotPayload, snapshot};
pub use wait::{WaitMode, WaitParams, WaitPayload, wait, wait_for};

use std::time::Duration;

use serde_json::{Value, json};
use surfwright_runtime::CdpConnection;
use tracing::debug;

use crate::error::{ErrorCode, Phase, Result, SwError};
use crate::report::{ActionReport, PhaseTimer, new_action_id};
use crate::session::{ResolveHints, SessionManager};
use crate::state::{SessionRecord, StateStore, TargetRecord};
use crate::target::{PageHandle, first_page, resolve_target};
use crate::util::{now_iso, validate_target_id};

/// Everything an action invocation needs from its caller.
pub struct ActionEnv<'a> {
	pub store: &'a StateStore,
	pub session_hint: Option<String>,
	pub target_hint: Option<String>,
	/// Per-command deadline, propagated to every CDP call.
	pub timeout: Duration,
	/// When false, no state is written after the action.
	pub persist: bool,
	/// Whether an implicit default session may be created.
	pub allow_implicit_session: bool,
}

impl<'a> ActionEnv<'a> {
	pub fn new(store: &'a StateStore) -> Self {
		Self {
			store,
			session_hint: None,
			target_hint: None,
			timeout: Duration::from_secs(15),
			persist: true,
			allow_implicit_session: true,
		}
	}
}

/// Resolved prologue state carried through an action body.
#[derive(Debug)]
pub struct ActionScope {
	pub session: SessionRecord,
	pub page: PageHandle,
	pub timer: PhaseTimer,
	pub action_id: String,
	pub session_restarted: bool,
}

/// Shared prologue: resolve session, connect CDP, resolve target.
pub async fn prologue(env: &ActionEnv<'_>) -> Result<ActionScope> {
	if let Some(target_id) = &env.target_hint {
		validate_target_id(target_id)?;
	}
	let mut timer = PhaseTimer::start();

	let manager = SessionManager::new(env.store);
	let outcome = manager
		.resolve_for_action(ResolveHints {
			session_id: env.session_hint.as_deref(),
			target_id: env.target_hint.as_deref(),
			allow_implicit_new: env.allow_implicit_session,
		})
		.await
		.map_err(|err| err.with_phase(Phase::ResolveSession))?;
	timer.resolve_session = timer.lap();

	let page = match &env.target_hint {
		Some(target_id) => {
			resolve_target(&outcome.session.cdp_origin, target_id, &env.store.read(), env.timeout).await?
		}
		None => first_page(&outcome.session.cdp_origin, env.timeout)
			.await?
			.ok_or_else(|| {
				SwError::new(ErrorCode::TargetNotFound, "session has no open pages")
					.with_phase(Phase::ResolveTarget)
					.with_hint("open one first with `open <url>`")
			})?,
	};
	timer.connect_cdp = timer.lap();

	debug!(
		target = "surfwright.action",
		session_id = %outcome.session.session_id,
		target_id = %page.target_id,
		"prologue resolved"
	);
	Ok(ActionScope {
		session: outcome.session,
		page,
		timer,
		action_id: new_action_id(),
		session_restarted: outcome.restarted,
	})
}

/// Evaluate a bare expression in the page's default context without the
/// full evaluator (used for status reads and waits).
pub(crate) async fn quick_eval(conn: &CdpConnection, expression: &str, timeout: Duration) -> Result<Value> {
	let result = conn
		.call(
			"Runtime.evaluate",
			json!({ "expression": expression, "returnByValue": true, "awaitPromise": true }),
			timeout,
		)
		.await?;
	if result.get("exceptionDetails").is_some() {
		return Err(SwError::new(
			ErrorCode::EvalRuntime,
			format!("status evaluation threw: {}", result["exceptionDetails"]["text"].as_str().unwrap_or("error")),
		));
	}
	Ok(result.get("result").and_then(|r| r.get("value")).cloned().unwrap_or(Value::Null))
}

/// Refresh the scope's URL and title from the live page.
pub(crate) async fn refresh_status(scope: &mut ActionScope, timeout: Duration) {
	let expression = format!("({})()", crate::scripts::PAGE_STATUS);
	if let Ok(status) = quick_eval(&scope.page.conn, &expression, timeout).await {
		if let Some(url) = status.get("url").and_then(|v| v.as_str()) {
			scope.page.url = url.to_string();
		}
		if let Some(title) = status.get("title").and_then(|v| v.as_str()) {
			scope.page.title = title.to_string();
		}
	}
}

/// Shared epilogue: persist the target snapshot and close the envelope.
pub fn finish<T: serde::Serialize>(
	env: &ActionEnv<'_>,
	mut scope: ActionScope,
	action: &'static str,
	payload: T,
) -> Result<ActionReport<T>> {
	scope.timer.action = scope.timer.lap();

	if env.persist {
		let now = now_iso();
		env.store
			.update(|state| {
				state.targets.insert(
					scope.page.target_id.clone(),
					TargetRecord {
						target_id: scope.page.target_id.clone(),
						session_id: scope.session.session_id.clone(),
						url: scope.page.url.clone(),
						title: scope.page.title.clone(),
						status: "open".into(),
						last_action_id: Some(scope.action_id.clone()),
						last_action_at: Some(now.clone()),
						last_action_kind: Some(action.to_string()),
						updated_at: now.clone(),
					},
				);
				if let Some(session) = state.sessions.get_mut(&scope.session.session_id) {
					SessionManager::heartbeat(session, &env.store.config().tunables);
				}
				Ok(())
			})
			.map_err(|err| err.with_phase(Phase::PersistState))?;
	}
	scope.timer.persist_state = scope.timer.lap();

	Ok(ActionReport {
		action,
		action_id: scope.action_id,
		session_id: scope.session.session_id,
		target_id: scope.page.target_id,
		url: scope.page.url,
		title: scope.page.title,
		payload,
		timing_ms: scope.timer.finish(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{Config, Tunables};

	#[tokio::test]
	async fn prologue_rejects_malformed_target_ids() {
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::new(Config {
			state_root: dir.path().to_path_buf(),
			workspace_root: None,
			tunables: Tunables::default(),
		});
		let mut env = ActionEnv::new(&store);
		env.target_hint = Some("bad target".into());
		env.allow_implicit_session = false;
		let err = prologue(&env).await.unwrap_err();
		assert_eq!(err.code, ErrorCode::TargetIdInvalid);
	}
}
