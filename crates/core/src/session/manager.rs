//! Session orchestration: discovery, launch, attach, reachability, leases.
//!
//! Every action funnels through [`SessionManager::resolve_for_action`], which
//! guarantees the caller a reachable session and a fresh heartbeat before
//! any CDP traffic happens.

use serde_json::json;
use tracing::{debug, info, warn};

use super::launch::{launch_managed, pid_is_alive};
use crate::config::Tunables;
use crate::error::{ErrorCode, Result, SwError};
use crate::state::{BrowserMode, DEFAULT_SESSION_ID, SessionKind, SessionPolicy, SessionRecord, StateStore};
use crate::util::{now_iso, validate_session_id, validate_target_id};

/// Outcome of an ensure-style operation.
#[derive(Debug)]
pub struct EnsureOutcome {
	pub session: SessionRecord,
	pub created: bool,
	pub restarted: bool,
}

/// Session/target hints accompanying an action invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveHints<'a> {
	pub session_id: Option<&'a str>,
	pub target_id: Option<&'a str>,
	/// Whether an implicit default session may be created when nothing else
	/// resolves.
	pub allow_implicit_new: bool,
}

pub struct SessionManager<'a> {
	store: &'a StateStore,
}

impl<'a> SessionManager<'a> {
	pub fn new(store: &'a StateStore) -> Self {
		Self { store }
	}

	pub fn store(&self) -> &'a StateStore {
		self.store
	}

	/// Refresh `lastSeenAt` and, when a TTL is set, `leaseExpiresAt`.
	pub fn heartbeat(record: &mut SessionRecord, _tunables: &Tunables) {
		let now = chrono::Utc::now();
		record.last_seen_at = now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
		if let Some(ttl_ms) = record.lease_ttl_ms {
			let expires = now + chrono::Duration::milliseconds(ttl_ms as i64);
			record.lease_expires_at = Some(expires.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
		}
	}

	/// Default lease TTL for a policy, applied when a session is created
	/// without an explicit TTL.
	pub fn default_ttl_ms(policy: SessionPolicy, tunables: &Tunables) -> u64 {
		match policy {
			SessionPolicy::Persistent => tunables.lease_persistent.as_millis() as u64,
			SessionPolicy::Ephemeral => tunables.lease_ephemeral.as_millis() as u64,
		}
	}

	async fn probe(&self, origin: &str) -> bool {
		let tunables = &self.store.config().tunables;
		surfwright_runtime::probe_reachable(origin, tunables.probe_primary, tunables.probe_fallback)
			.await
			.is_ok()
	}

	/// Guarantee the session is reachable, relaunching managed browsers.
	pub async fn ensure_reachable(&self, session_id: &str) -> Result<EnsureOutcome> {
		let state = self.store.read();
		let session = state
			.sessions
			.get(session_id)
			.cloned()
			.ok_or_else(|| SwError::new(ErrorCode::SessionNotFound, format!("unknown session: {session_id}")))?;

		if self.probe(&session.cdp_origin).await {
			let session = self.store.update(|state| {
				let Some(record) = state.sessions.get_mut(session_id) else {
					return Err(SwError::new(ErrorCode::SessionNotFound, format!("unknown session: {session_id}")));
				};
				record.managed_unreachable_since = None;
				record.managed_unreachable_count = 0;
				Self::heartbeat(record, &self.store.config().tunables);
				Ok(record.clone())
			})?;
			return Ok(EnsureOutcome {
				session,
				created: false,
				restarted: false,
			});
		}

		if session.kind == SessionKind::Attached {
			return Err(SwError::new(
				ErrorCode::SessionUnreachable,
				format!("attached session {session_id} is unreachable at {}", session.cdp_origin),
			)
			.with_hint("the external browser is gone; re-attach with `session attach` or prune with `session prune`"));
		}

		// Managed relaunch preserves the profile and creation time; the same
		// port is preferred so persisted origins stay valid.
		info!(target = "surfwright.session", session_id, "managed session unreachable; relaunching");
		let profile_dir = session
			.user_data_dir
			.clone()
			.map(std::path::PathBuf::from)
			.unwrap_or_else(|| self.store.config().profile_dir(session_id));
		let launched = launch_managed(self.store.config(), &profile_dir, session.browser_mode, session.debug_port).await?;

		let session = self.store.update(|state| {
			let Some(record) = state.sessions.get_mut(session_id) else {
				return Err(SwError::new(ErrorCode::SessionNotFound, format!("unknown session: {session_id}")));
			};
			record.cdp_origin = launched.cdp_origin.clone();
			record.debug_port = Some(launched.debug_port);
			record.browser_pid = Some(launched.pid);
			record.managed_unreachable_since = None;
			record.managed_unreachable_count = 0;
			Self::heartbeat(record, &self.store.config().tunables);
			Ok(record.clone())
		})?;
		Ok(EnsureOutcome {
			session,
			created: false,
			restarted: true,
		})
	}

	/// Ensure the reserved implicit session exists, is managed, and is
	/// reachable.
	pub async fn ensure_default_managed(&self) -> Result<EnsureOutcome> {
		let state = self.store.read();
		if let Some(existing) = state.sessions.get(DEFAULT_SESSION_ID) {
			if existing.kind != SessionKind::Managed {
				return Err(SwError::new(
					ErrorCode::SessionConflict,
					format!("{DEFAULT_SESSION_ID} is reserved for the implicit managed session"),
				));
			}
			return self.ensure_reachable(DEFAULT_SESSION_ID).await;
		}

		let session = self
			.create_managed(
				DEFAULT_SESSION_ID.to_string(),
				SessionPolicy::Ephemeral,
				BrowserMode::Headless,
				Some(self.store.config().tunables.lease_implicit.as_millis() as u64),
			)
			.await?;
		Ok(EnsureOutcome {
			session,
			created: true,
			restarted: false,
		})
	}

	/// Launch a browser and persist a managed session for it.
	pub async fn create_managed(
		&self,
		session_id: String,
		policy: SessionPolicy,
		mode: BrowserMode,
		lease_ttl_ms: Option<u64>,
	) -> Result<SessionRecord> {
		validate_session_id(&session_id)?;
		if self.store.read().sessions.contains_key(&session_id) {
			return Err(SwError::new(ErrorCode::SessionExists, format!("session already exists: {session_id}")));
		}

		let profile_dir = self.store.config().profile_dir(&session_id);
		let launched = launch_managed(self.store.config(), &profile_dir, mode, None).await?;
		let lease_ttl_ms = lease_ttl_ms.or(Some(Self::default_ttl_ms(policy, &self.store.config().tunables)));
		let now = now_iso();
		let mut record = SessionRecord {
			session_id: session_id.clone(),
			kind: SessionKind::Managed,
			policy,
			browser_mode: mode,
			cdp_origin: launched.cdp_origin,
			debug_port: Some(launched.debug_port),
			user_data_dir: Some(profile_dir.to_string_lossy().to_string()),
			browser_pid: Some(launched.pid),
			owner_id: None,
			lease_expires_at: None,
			lease_ttl_ms,
			managed_unreachable_since: None,
			managed_unreachable_count: 0,
			created_at: now.clone(),
			last_seen_at: now,
		};
		Self::heartbeat(&mut record, &self.store.config().tunables);

		self.store.update(|state| {
			if state.sessions.contains_key(&session_id) {
				return Err(SwError::new(ErrorCode::SessionExists, format!("session already exists: {session_id}")));
			}
			state.sessions.insert(session_id.clone(), record.clone());
			Ok(())
		})?;
		Ok(record)
	}

	/// Attach to an external CDP endpoint; never owns the process.
	pub async fn attach(&self, session_id: String, cdp_origin: &str, lease_ttl_ms: Option<u64>) -> Result<SessionRecord> {
		validate_session_id(&session_id)?;
		let origin = sanitize_cdp_origin(cdp_origin)?;
		if session_id == DEFAULT_SESSION_ID {
			return Err(SwError::new(
				ErrorCode::SessionConflict,
				format!("{DEFAULT_SESSION_ID} is reserved for the implicit managed session"),
			));
		}

		let tunables = &self.store.config().tunables;
		let info = surfwright_runtime::probe_reachable(&origin, tunables.probe_primary, tunables.probe_fallback)
			.await
			.map_err(|err| SwError::new(ErrorCode::CdpUnreachable, err.to_string()))?;
		debug!(target = "surfwright.session", session_id, browser = ?info.browser, "attached endpoint verified");

		let lease_ttl_ms = lease_ttl_ms.or(Some(Self::default_ttl_ms(SessionPolicy::Ephemeral, tunables)));
		let now = now_iso();
		let mut record = SessionRecord {
			session_id: session_id.clone(),
			kind: SessionKind::Attached,
			policy: SessionPolicy::Ephemeral,
			browser_mode: BrowserMode::Unknown,
			cdp_origin: origin,
			debug_port: None,
			user_data_dir: None,
			browser_pid: None,
			owner_id: None,
			lease_expires_at: None,
			lease_ttl_ms,
			managed_unreachable_since: None,
			managed_unreachable_count: 0,
			created_at: now.clone(),
			last_seen_at: now,
		};
		Self::heartbeat(&mut record, tunables);

		self.store.update(|state| {
			if state.sessions.contains_key(&session_id) {
				return Err(SwError::new(ErrorCode::SessionExists, format!("session already exists: {session_id}")));
			}
			state.sessions.insert(session_id.clone(), record.clone());
			Ok(())
		})?;
		Ok(record)
	}

	/// Resolve the session an action should run against.
	///
	/// Precedence: explicit session id, then the target's owning session,
	/// then the active session, then an implicit default (when allowed).
	pub async fn resolve_for_action(&self, hints: ResolveHints<'_>) -> Result<EnsureOutcome> {
		let state = self.store.read();

		if let Some(session_id) = hints.session_id {
			validate_session_id(session_id)?;
			if !state.sessions.contains_key(session_id) {
				if state.targets.contains_key(session_id) {
					return Err(handle_mismatch(session_id, "sessionId", "targetId"));
				}
				return Err(SwError::new(ErrorCode::SessionNotFound, format!("unknown session: {session_id}"))
					.with_hint("list known sessions with `session list`"));
			}
			return self.ensure_reachable(session_id).await;
		}

		if let Some(target_id) = hints.target_id {
			validate_target_id(target_id)?;
			if let Some(target) = state.targets.get(target_id) {
				if !state.sessions.contains_key(&target.session_id) {
					return Err(SwError::new(
						ErrorCode::TargetSessionUnknown,
						format!("target {target_id} belongs to unknown session {}", target.session_id),
					)
					.with_hint("run `state reconcile` to evict orphaned targets"));
				}
				return self.ensure_reachable(&target.session_id.clone()).await;
			}
			if state.sessions.contains_key(target_id) {
				return Err(handle_mismatch(target_id, "targetId", "sessionId"));
			}
			// Fall through: the target may be live but not yet persisted.
		}

		if let Some(active) = &state.active_session_id {
			return self.ensure_reachable(&active.clone()).await;
		}

		if hints.allow_implicit_new {
			return self.ensure_default_managed().await;
		}

		Err(SwError::new(ErrorCode::SessionRequired, "no session resolved for this action")
			.with_hint("pass --session <id>, run `session use <id>`, or create one with `session new`"))
	}

	/// Set or clear the active session pointer.
	pub fn use_session(&self, session_id: Option<&str>) -> Result<Option<String>> {
		if let Some(id) = session_id {
			validate_session_id(id)?;
		}
		self.store.update(|state| {
			if let Some(id) = session_id {
				if !state.sessions.contains_key(id) {
					return Err(SwError::new(ErrorCode::SessionNotFound, format!("unknown session: {id}")));
				}
				state.active_session_id = Some(id.to_string());
			} else {
				state.active_session_id = None;
			}
			Ok(state.active_session_id.clone())
		})
	}

	/// Record a managed-unreachable observation during prune probing.
	pub fn note_unreachable(record: &mut SessionRecord) {
		if record.managed_unreachable_since.is_none() {
			record.managed_unreachable_since = Some(now_iso());
		}
		record.managed_unreachable_count = record.managed_unreachable_count.saturating_add(1);
	}

	/// Repair a stale pid field; true when repaired.
	pub fn repair_pid(record: &mut SessionRecord) -> bool {
		match record.browser_pid {
			Some(pid) if !pid_is_alive(pid) => {
				warn!(target = "surfwright.session", session_id = %record.session_id, pid, "clearing dead browser pid");
				record.browser_pid = None;
				true
			}
			_ => false,
		}
	}
}

fn handle_mismatch(handle: &str, provided_as: &str, actual: &str) -> SwError {
	SwError::new(
		ErrorCode::HandleTypeMismatch,
		format!("{handle} was passed as a {provided_as} but is a known {actual}"),
	)
	.with_hint(format!("pass {handle} as the {actual} instead"))
	.with_hint_context(json!({
		"handle": handle,
		"providedAs": provided_as,
		"actualKind": actual,
	}))
}

/// Attached origins must be http(s) and credential-free.
pub fn sanitize_cdp_origin(raw: &str) -> Result<String> {
	let parsed = url::Url::parse(raw).map_err(|e| SwError::new(ErrorCode::CdpInvalid, format!("invalid CDP origin {raw:?}: {e}")))?;
	if !matches!(parsed.scheme(), "http" | "https") {
		return Err(SwError::new(
			ErrorCode::CdpInvalid,
			format!("CDP origin must be http or https: {raw}"),
		));
	}
	if !parsed.username().is_empty() || parsed.password().is_some() {
		return Err(SwError::new(ErrorCode::CdpInvalid, "CDP origin must not carry credentials"));
	}
	let host = parsed
		.host_str()
		.ok_or_else(|| SwError::new(ErrorCode::CdpInvalid, format!("CDP origin lacks a host: {raw}")))?;
	let origin = match parsed.port() {
		Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
		None => format!("{}://{}", parsed.scheme(), host),
	};
	Ok(origin)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;
	use crate::state::StateStore;
	use crate::util::parse_iso;

	fn store_in(dir: &std::path::Path) -> StateStore {
		StateStore::new(Config {
			state_root: dir.to_path_buf(),
			workspace_root: None,
			tunables: Tunables::default(),
		})
	}

	fn seeded_session(id: &str, kind: SessionKind) -> SessionRecord {
		SessionRecord {
			session_id: id.into(),
			kind,
			policy: SessionPolicy::Ephemeral,
			browser_mode: BrowserMode::Headless,
			cdp_origin: "http://127.0.0.1:1".into(),
			debug_port: Some(1),
			user_data_dir: None,
			browser_pid: None,
			owner_id: None,
			lease_expires_at: None,
			lease_ttl_ms: Some(60_000),
			managed_unreachable_since: None,
			managed_unreachable_count: 0,
			created_at: "2026-01-01T00:00:00.000Z".into(),
			last_seen_at: "2026-01-01T00:00:00.000Z".into(),
		}
	}

	#[test]
	fn heartbeat_advances_lease_from_last_seen() {
		let mut record = seeded_session("s-1", SessionKind::Managed);
		SessionManager::heartbeat(&mut record, &Tunables::default());
		let seen = parse_iso(&record.last_seen_at).unwrap();
		let expires = parse_iso(record.lease_expires_at.as_deref().unwrap()).unwrap();
		assert_eq!((expires - seen).num_milliseconds(), 60_000);
		assert!(record.last_seen_at >= record.created_at);
	}

	#[test]
	fn cdp_origin_sanitation() {
		assert_eq!(sanitize_cdp_origin("http://127.0.0.1:9222/").unwrap(), "http://127.0.0.1:9222");
		assert_eq!(sanitize_cdp_origin("https://debug.internal").unwrap(), "https://debug.internal");
		assert!(sanitize_cdp_origin("ws://127.0.0.1:9222").is_err());
		assert!(sanitize_cdp_origin("http://user:pw@127.0.0.1:9222").is_err());
		assert!(sanitize_cdp_origin("not a url").is_err());
	}

	#[tokio::test]
	async fn explicit_unknown_session_reports_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		let manager = SessionManager::new(&store);
		let err = manager
			.resolve_for_action(ResolveHints {
				session_id: Some("s-missing"),
				..Default::default()
			})
			.await
			.unwrap_err();
		assert_eq!(err.code, ErrorCode::SessionNotFound);
	}

	#[tokio::test]
	async fn session_id_that_is_a_target_id_reports_mismatch() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state.sessions.insert("s-1".into(), seeded_session("s-1", SessionKind::Managed));
				state.targets.insert(
					"AB12".into(),
					crate::state::TargetRecord {
						target_id: "AB12".into(),
						session_id: "s-1".into(),
						url: String::new(),
						title: String::new(),
						status: String::new(),
						last_action_id: None,
						last_action_at: None,
						last_action_kind: None,
						updated_at: now_iso(),
					},
				);
				Ok(())
			})
			.unwrap();

		let manager = SessionManager::new(&store);
		let err = manager
			.resolve_for_action(ResolveHints {
				session_id: Some("AB12"),
				..Default::default()
			})
			.await
			.unwrap_err();
		assert_eq!(err.code, ErrorCode::HandleTypeMismatch);
		assert_eq!(err.hint_context.as_ref().unwrap()["actualKind"], "targetId");
	}

	#[tokio::test]
	async fn no_hints_and_no_implicit_requires_session() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		let manager = SessionManager::new(&store);
		let err = manager.resolve_for_action(ResolveHints::default()).await.unwrap_err();
		assert_eq!(err.code, ErrorCode::SessionRequired);
	}

	#[tokio::test]
	async fn attached_unreachable_surfaces_session_unreachable() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state.sessions.insert("s-ext".into(), seeded_session("s-ext", SessionKind::Attached));
				Ok(())
			})
			.unwrap();
		let manager = SessionManager::new(&store);
		let err = manager.ensure_reachable("s-ext").await.unwrap_err();
		assert_eq!(err.code, ErrorCode::SessionUnreachable);
	}

	#[test]
	fn use_session_requires_known_id() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		let manager = SessionManager::new(&store);
		assert!(manager.use_session(Some("s-none")).is_err());
		assert_eq!(manager.use_session(None).unwrap(), None);
	}
}
