//! Capture orchestration: synchronous windows, handle-based background
//! workers, live tail, saved-capture queries, HAR export, budget checks.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use surfwright_runtime::CdpConnection;
use tracing::{debug, info, warn};

use super::budget::{NetworkBudget, check_budget};
use super::filter::NetworkFilters;
use super::har::{from_har, to_har};
use super::profile::{CaptureOptions, CaptureProfile};
use super::record::{CaptureDocument, Recorder};
use super::redact::Redactor;
use super::summary::{NetworkView, project};
use crate::actions::{ActionEnv, prologue, quick_eval};
use crate::error::{ErrorCode, Result, SwError};
use crate::state::{CaptureRecord, CaptureStatus, StateStore, atomic_write};
use crate::util::now_iso;

const WORKER_POLL: Duration = Duration::from_millis(100);
const DEFAULT_MAX_RUNTIME_MS: u64 = 5 * 60 * 1000;

/// Caller-facing capture parameters: profile defaults plus explicit
/// overrides, filters, and the requested view.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkParams {
	pub profile: CaptureProfile,
	pub capture_ms: Option<u64>,
	pub max_requests: Option<usize>,
	pub max_websockets: Option<usize>,
	pub max_ws_messages: Option<usize>,
	pub include_headers: Option<bool>,
	pub include_post_data: Option<bool>,
	pub include_ws_messages: Option<bool>,
	pub reload: Option<bool>,
	#[serde(flatten)]
	pub filters: NetworkFilters,
	pub redact_patterns: Vec<String>,
	pub view: NetworkView,
	pub fields: Option<Vec<String>>,
}

impl NetworkParams {
	/// Profile defaults with explicit flags layered on top.
	pub fn effective_options(&self) -> Result<CaptureOptions> {
		let mut options = CaptureOptions::for_profile(self.profile);
		if let Some(ms) = self.capture_ms {
			options.capture_ms = ms;
		}
		if let Some(n) = self.max_requests {
			options.max_requests = n;
		}
		if let Some(n) = self.max_websockets {
			options.max_websockets = n;
		}
		if let Some(n) = self.max_ws_messages {
			options.max_ws_messages = n;
		}
		if let Some(flag) = self.include_headers {
			options.include_headers = flag;
		}
		if let Some(flag) = self.include_post_data {
			options.include_post_data = flag;
		}
		if let Some(flag) = self.include_ws_messages {
			options.include_ws_messages = flag;
		}
		if let Some(flag) = self.reload {
			options.reload_before = flag;
		}
		options.validate()
	}
}

enum StopWhen {
	Elapsed(Duration),
	FileOrElapsed(PathBuf, Duration),
}

/// Record network events from a connection until the stop condition.
///
/// Subscription happens before `Network.enable` so the enable-time burst
/// is not lost. `sink` receives one tail record per event when given.
async fn record_window(
	conn: &CdpConnection,
	mut recorder: Recorder,
	filters: &NetworkFilters,
	stop: StopWhen,
	timeout: Duration,
	mut sink: Option<&mut dyn FnMut(Value) -> bool>,
) -> Result<CaptureDocument> {
	let mut events = conn.subscribe();
	conn.call("Network.enable", json!({}), timeout).await?;
	let started = Instant::now();

	loop {
		let done = match &stop {
			StopWhen::Elapsed(window) => started.elapsed() >= *window,
			StopWhen::FileOrElapsed(path, window) => path.exists() || started.elapsed() >= *window,
		};
		if done {
			break;
		}
		match tokio::time::timeout(WORKER_POLL, events.recv()).await {
			Ok(Ok(event)) => {
				if event.method.starts_with("Network.") {
					recorder.on_event(&event);
					if let Some(sink) = sink.as_deref_mut() {
						if let Some(line) = recorder.tail_record(&event, filters) {
							if !sink(line) {
								break;
							}
						}
					}
				}
			}
			Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped))) => {
				warn!(target = "surfwright.net", skipped, "event stream lagged; capture is incomplete");
			}
			Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => break,
			Err(_) => {}
		}
	}
	let _ = conn.call("Network.disable", json!({}), timeout).await;
	Ok(recorder.finish())
}

/// Synchronous capture on the current page, optionally after a reload.
pub async fn capture_sync(env: &ActionEnv<'_>, params: NetworkParams) -> Result<Value> {
	let options = params.effective_options()?;
	let filters = params.filters.clone().normalized();
	let redactor = Redactor::new(&params.redact_patterns)?;
	let scope = prologue(env).await?;

	if options.reload_before {
		debug!(target = "surfwright.net", "reloading before capture");
		let _ = quick_eval(&scope.page.conn, "location.reload()", env.timeout).await;
	}

	let recorder = Recorder::new(
		options.clone(),
		redactor,
		scope.session.session_id.clone(),
		scope.page.target_id.clone(),
		None,
		Some(scope.action_id.clone()),
	);
	let doc = record_window(
		&scope.page.conn,
		recorder,
		&filters,
		StopWhen::Elapsed(Duration::from_millis(options.capture_ms)),
		env.timeout,
		None,
	)
	.await?;

	project(&doc, params.view, &filters, params.fields.as_deref())
}

/// Live NDJSON tail: one record per event, then a `capture.end` line.
pub async fn tail(env: &ActionEnv<'_>, params: NetworkParams, sink: &mut dyn FnMut(Value) -> bool) -> Result<Value> {
	let options = params.effective_options()?;
	let filters = params.filters.clone().normalized();
	let redactor = Redactor::new(&params.redact_patterns)?;
	let scope = prologue(env).await?;

	let recorder = Recorder::new(
		options.clone(),
		redactor,
		scope.session.session_id.clone(),
		scope.page.target_id.clone(),
		None,
		Some(scope.action_id.clone()),
	);
	let doc = record_window(
		&scope.page.conn,
		recorder,
		&filters,
		StopWhen::Elapsed(Duration::from_millis(options.capture_ms)),
		env.timeout,
		Some(sink),
	)
	.await?;

	let end = json!({
		"event": "capture.end",
		"requestsSeen": doc.counts.requests_seen,
		"requestsCaptured": doc.counts.requests_captured,
		"wsMessagesSeen": doc.counts.ws_messages_seen,
	});
	sink(end.clone());
	Ok(end)
}

/// Scratch-file paths of a background capture.
fn capture_paths(store: &StateStore, capture_id: &str) -> (PathBuf, PathBuf, PathBuf) {
	let dir = store.config().state_root.join("captures");
	(
		dir.join(format!("{capture_id}.stop")),
		dir.join(format!("{capture_id}.done")),
		dir.join(format!("{capture_id}.result.json")),
	)
}

/// Begin a handle-based capture: persist the record and detach a worker.
pub async fn begin(env: &ActionEnv<'_>, params: NetworkParams, max_runtime_ms: Option<u64>) -> Result<Value> {
	let options = params.effective_options()?;
	Redactor::new(&params.redact_patterns)?;
	let scope = prologue(env).await?;
	let max_runtime_ms = max_runtime_ms.unwrap_or(DEFAULT_MAX_RUNTIME_MS);

	let record = env.store.update(|state| {
		let capture_id = state.allocate_capture_id();
		let (stop, done, result) = capture_paths(env.store, &capture_id);
		let record = CaptureRecord {
			capture_id: capture_id.clone(),
			session_id: scope.session.session_id.clone(),
			target_id: scope.page.target_id.clone(),
			started_at: now_iso(),
			status: CaptureStatus::Recording,
			profile: options.profile.as_str().into(),
			max_runtime_ms,
			worker_pid: None,
			stop_signal_path: stop.to_string_lossy().to_string(),
			done_path: done.to_string_lossy().to_string(),
			result_path: result.to_string_lossy().to_string(),
			ended_at: None,
			action_id: Some(scope.action_id.clone()),
		};
		state.captures.insert(capture_id, record.clone());
		Ok(record)
	})?;
	std::fs::create_dir_all(env.store.config().state_root.join("captures"))?;

	// The worker is this same binary, detached, driving its own connection.
	let exe = std::env::current_exe()?;
	let mut command = std::process::Command::new(exe);
	command
		.arg("network-worker")
		.arg("--capture-id")
		.arg(&record.capture_id)
		.arg("--state-dir")
		.arg(&env.store.config().state_root)
		.arg("--options-json")
		.arg(serde_json::to_string(&options)?);
	for pattern in &params.redact_patterns {
		command.arg("--redact").arg(pattern);
	}
	command
		.stdin(std::process::Stdio::null())
		.stdout(std::process::Stdio::null())
		.stderr(std::process::Stdio::null());
	#[cfg(unix)]
	std::os::unix::process::CommandExt::process_group(&mut command, 0);
	let child = command
		.spawn()
		.map_err(|e| SwError::internal(format!("failed to spawn capture worker: {e}")))?;

	let record = env.store.update(|state| {
		let Some(stored) = state.captures.get_mut(&record.capture_id) else {
			return Err(SwError::internal("capture record vanished during begin"));
		};
		stored.worker_pid = Some(child.id());
		Ok(stored.clone())
	})?;
	info!(target = "surfwright.net", capture_id = %record.capture_id, pid = ?record.worker_pid, "capture worker started");

	Ok(json!({
		"captureId": record.capture_id,
		"sessionId": record.session_id,
		"targetId": record.target_id,
		"status": record.status,
		"profile": record.profile,
		"maxRuntimeMs": record.max_runtime_ms,
		"workerPid": record.worker_pid,
	}))
}

/// Worker body: record until the stop signal appears or the runtime cap
/// elapses, then write the result atomically and touch the done file.
pub async fn run_worker(store: &StateStore, capture_id: &str, options: CaptureOptions, redactor: Redactor) -> Result<()> {
	let state = store.read();
	let record = state
		.captures
		.get(capture_id)
		.cloned()
		.ok_or_else(|| SwError::new(ErrorCode::QueryInvalid, format!("unknown capture {capture_id}")))?;
	let session = state
		.sessions
		.get(&record.session_id)
		.cloned()
		.ok_or_else(|| SwError::new(ErrorCode::SessionNotFound, format!("unknown session {}", record.session_id)))?;

	let timeout = Duration::from_secs(10);
	let page = crate::target::resolve_target(&session.cdp_origin, &record.target_id, &state, timeout).await?;
	let recorder = Recorder::new(
		options,
		redactor,
		record.session_id.clone(),
		record.target_id.clone(),
		Some(capture_id.to_string()),
		record.action_id.clone(),
	);
	let doc = record_window(
		&page.conn,
		recorder,
		&NetworkFilters::default(),
		StopWhen::FileOrElapsed(PathBuf::from(&record.stop_signal_path), Duration::from_millis(record.max_runtime_ms)),
		timeout,
		None,
	)
	.await?;

	let result_path = PathBuf::from(&record.result_path);
	atomic_write(&result_path, serde_json::to_string_pretty(&doc)?.as_bytes())?;
	std::fs::write(&record.done_path, b"done")?;

	store.update(|state| {
		if let Some(stored) = state.captures.get_mut(capture_id) {
			stored.status = CaptureStatus::Stopped;
			stored.ended_at = Some(now_iso());
		}
		Ok(())
	})?;
	info!(target = "surfwright.net", capture_id, "capture worker finished");
	Ok(())
}

/// End a handle-based capture: signal, await the done marker, project.
pub async fn end(store: &StateStore, capture_id: &str, params: &NetworkParams, wait_ms: u64) -> Result<Value> {
	let state = store.read();
	let record = state
		.captures
		.get(capture_id)
		.cloned()
		.ok_or_else(|| {
			SwError::new(ErrorCode::QueryInvalid, format!("unknown capture {capture_id}"))
				.with_hint("list captures via `state reconcile` diagnostics or begin a new one")
		})?;

	std::fs::write(&record.stop_signal_path, b"stop")?;
	let deadline = Instant::now() + Duration::from_millis(wait_ms);
	let done_path = PathBuf::from(&record.done_path);
	while !done_path.exists() {
		if Instant::now() >= deadline {
			return Err(SwError::new(
				ErrorCode::WaitTimeout,
				format!("capture worker did not finish within {wait_ms}ms"),
			));
		}
		tokio::time::sleep(WORKER_POLL).await;
	}

	let text = std::fs::read_to_string(&record.result_path)?;
	let doc: CaptureDocument = serde_json::from_str(&text)?;

	store.update(|state| {
		if let Some(stored) = state.captures.get_mut(capture_id) {
			stored.status = CaptureStatus::Stopped;
			if stored.ended_at.is_none() {
				stored.ended_at = Some(now_iso());
			}
		}
		Ok(())
	})?;

	let filters = params.filters.clone().normalized();
	project(&doc, params.view, &filters, params.fields.as_deref())
}

/// Load a saved capture result or an exported artifact as a document.
pub fn load_saved(store: &StateStore, handle: &str) -> Result<CaptureDocument> {
	let state = store.read();
	if let Some(capture) = state.captures.get(handle) {
		let text = std::fs::read_to_string(&capture.result_path)
			.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("capture result unavailable: {e}")))?;
		return Ok(serde_json::from_str(&text)?);
	}
	if let Some(artifact) = state.artifacts.get(handle) {
		let text = std::fs::read_to_string(&artifact.path)
			.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("artifact file unavailable: {e}")))?;
		let har = serde_json::from_str(&text)?;
		return from_har(&har);
	}
	Err(SwError::new(
		ErrorCode::QueryInvalid,
		format!("{handle} is neither a known capture nor a known artifact"),
	))
}

/// Re-project a saved capture or artifact.
pub fn query(store: &StateStore, handle: &str, params: &NetworkParams) -> Result<Value> {
	let doc = load_saved(store, handle)?;
	let filters = params.filters.clone().normalized();
	project(&doc, params.view, &filters, params.fields.as_deref())
}

/// Export a capture (live window or saved handle) as HAR and index it.
pub async fn export(env: &ActionEnv<'_>, out: &str, saved: Option<&str>, params: NetworkParams) -> Result<Value> {
	let doc = match saved {
		Some(handle) => load_saved(env.store, handle)?,
		None => {
			let options = params.effective_options()?;
			let redactor = Redactor::new(&params.redact_patterns)?;
			let scope = prologue(env).await?;
			if options.reload_before {
				let _ = quick_eval(&scope.page.conn, "location.reload()", env.timeout).await;
			}
			let recorder = Recorder::new(
				options.clone(),
				redactor,
				scope.session.session_id.clone(),
				scope.page.target_id.clone(),
				None,
				Some(scope.action_id.clone()),
			);
			record_window(
				&scope.page.conn,
				recorder,
				&NetworkFilters::default(),
				StopWhen::Elapsed(Duration::from_millis(options.capture_ms)),
				env.timeout,
				None,
			)
			.await?
		}
	};

	let har = to_har(&doc);
	let body = serde_json::to_string_pretty(&har)?;
	let path = PathBuf::from(out);
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			std::fs::create_dir_all(parent)?;
		}
	}
	atomic_write(&path, body.as_bytes())?;

	let entries = har.log.entries.len() as u64;
	let bytes = body.len() as u64;
	let artifact = super::artifact::index_artifact(
		env.store,
		out,
		&doc.session_id,
		&doc.target_id,
		doc.capture_id.clone(),
		entries,
		bytes,
	)?;

	Ok(json!({
		"artifactId": artifact.artifact_id,
		"path": artifact.path,
		"format": artifact.format,
		"entries": artifact.entries,
		"bytes": artifact.bytes,
		"captureId": artifact.capture_id,
	}))
}

/// Budget check against a live capture or a saved handle.
pub async fn check(env: &ActionEnv<'_>, budget_doc: &Value, saved: Option<&str>, params: NetworkParams) -> Result<Value> {
	let budget = NetworkBudget::parse(budget_doc)?;
	let doc = match saved {
		Some(handle) => load_saved(env.store, handle)?,
		None => {
			let options = params.effective_options()?;
			let redactor = Redactor::new(&params.redact_patterns)?;
			let scope = prologue(env).await?;
			let recorder = Recorder::new(
				options.clone(),
				redactor,
				scope.session.session_id.clone(),
				scope.page.target_id.clone(),
				None,
				Some(scope.action_id.clone()),
			);
			record_window(
				&scope.page.conn,
				recorder,
				&NetworkFilters::default(),
				StopWhen::Elapsed(Duration::from_millis(options.capture_ms)),
				env.timeout,
				None,
			)
			.await?
		}
	};
	let report = check_budget(&doc, &budget);
	Ok(serde_json::to_value(report)?)
}
