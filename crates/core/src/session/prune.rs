//! Session pruning and clearing.

use serde::Serialize;
use tracing::info;

use super::launch::terminate_pid;
use super::manager::SessionManager;
use crate::error::Result;
use crate::state::{SessionKind, StateStore};
use crate::util::parse_iso;

/// Options for `session prune`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PruneOptions {
	/// Remove managed-unreachable sessions immediately, skipping the grace
	/// window.
	pub drop_managed_unreachable: bool,
}

/// One eviction with its reason.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrunedSession {
	pub session_id: String,
	pub reason: PruneReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PruneReason {
	LeaseExpired,
	AttachedUnreachable,
	ManagedUnreachable,
	ManagedDropRequested,
}

/// Report of a prune pass, with per-reason counts.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
	pub removed: Vec<PrunedSession>,
	pub lease_expired: usize,
	pub attached_unreachable: usize,
	pub managed_unreachable: usize,
	pub managed_drop_requested: usize,
	pub repaired_pids: usize,
	pub targets_evicted: usize,
}

/// Report of `session clear`.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
	pub sessions_removed: usize,
	pub processes_terminated: usize,
	pub targets_evicted: usize,
}

impl SessionManager<'_> {
	/// Remove abandoned sessions and repair stale pids.
	///
	/// Reachability is probed outside the lock; the decision pass re-reads
	/// under the lock so concurrent invocations stay consistent.
	pub async fn prune(&self, options: PruneOptions) -> Result<PruneReport> {
		let store: &StateStore = self.store();
		let snapshot = store.read();
		let mut unreachable = Vec::new();
		for (id, session) in &snapshot.sessions {
			let tunables = &store.config().tunables;
			let reachable = surfwright_runtime::probe_reachable(&session.cdp_origin, tunables.probe_primary, tunables.probe_fallback)
				.await
				.is_ok();
			if !reachable {
				unreachable.push(id.clone());
			}
		}

		let grace_count = store.config().tunables.managed_unreachable_grace_count;
		let grace = chrono::Duration::from_std(store.config().tunables.managed_unreachable_grace)
			.unwrap_or_else(|_| chrono::Duration::seconds(60));

		let report = store.update(|state| {
			let mut report = PruneReport::default();
			let now = chrono::Utc::now();
			let mut keep = std::collections::BTreeMap::new();

			for (id, mut session) in std::mem::take(&mut state.sessions) {
				if SessionManager::repair_pid(&mut session) {
					report.repaired_pids += 1;
				}

				let lease_expired = session
					.lease_expires_at
					.as_deref()
					.and_then(parse_iso)
					.is_some_and(|expires| expires < now);
				if lease_expired {
					report.removed.push(PrunedSession {
						session_id: id,
						reason: PruneReason::LeaseExpired,
					});
					report.lease_expired += 1;
					continue;
				}

				if unreachable.contains(&id) {
					match session.kind {
						SessionKind::Attached => {
							report.removed.push(PrunedSession {
								session_id: id,
								reason: PruneReason::AttachedUnreachable,
							});
							report.attached_unreachable += 1;
							continue;
						}
						SessionKind::Managed => {
							SessionManager::note_unreachable(&mut session);
							if options.drop_managed_unreachable {
								report.removed.push(PrunedSession {
									session_id: id,
									reason: PruneReason::ManagedDropRequested,
								});
								report.managed_drop_requested += 1;
								continue;
							}
							let since = session.managed_unreachable_since.as_deref().and_then(parse_iso);
							let over_grace = session.managed_unreachable_count >= grace_count
								&& since.is_some_and(|since| now - since >= grace);
							if over_grace {
								report.removed.push(PrunedSession {
									session_id: id,
									reason: PruneReason::ManagedUnreachable,
								});
								report.managed_unreachable += 1;
								continue;
							}
						}
					}
				} else {
					session.managed_unreachable_since = None;
					session.managed_unreachable_count = 0;
				}

				keep.insert(id, session);
			}

			state.sessions = keep;
			if let Some(active) = &state.active_session_id {
				if !state.sessions.contains_key(active) {
					state.active_session_id = None;
				}
			}
			let live: std::collections::BTreeSet<_> = state.sessions.keys().cloned().collect();
			let before = state.targets.len();
			state.targets.retain(|_, target| live.contains(&target.session_id));
			report.targets_evicted = before - state.targets.len();
			Ok(report)
		})?;

		if !report.removed.is_empty() {
			info!(target = "surfwright.session", removed = report.removed.len(), "pruned sessions");
		}
		Ok(report)
	}

	/// Remove every session; terminate managed browsers unless asked not to.
	pub fn clear(&self, keep_processes: bool) -> Result<ClearReport> {
		self.store().update(|state| {
			let mut report = ClearReport::default();
			for session in state.sessions.values() {
				if !keep_processes && session.kind == SessionKind::Managed {
					if let Some(pid) = session.browser_pid {
						if terminate_pid(pid) {
							report.processes_terminated += 1;
						}
					}
				}
			}
			report.sessions_removed = state.sessions.len();
			report.targets_evicted = state.targets.len();
			state.sessions.clear();
			state.targets.clear();
			state.active_session_id = None;
			Ok(report)
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{Config, Tunables};
	use crate::state::{BrowserMode, SessionPolicy, SessionRecord, StateStore, TargetRecord};
	use crate::util::now_iso;
	use std::time::Duration;

	fn store_in(dir: &std::path::Path) -> StateStore {
		StateStore::new(Config {
			state_root: dir.to_path_buf(),
			workspace_root: None,
			tunables: Tunables {
				probe_primary: Duration::from_millis(100),
				probe_fallback: None,
				..Tunables::default()
			},
		})
	}

	fn session(id: &str, kind: SessionKind, lease_expires_at: Option<&str>) -> SessionRecord {
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
			lease_expires_at: lease_expires_at.map(String::from),
			lease_ttl_ms: None,
			managed_unreachable_since: None,
			managed_unreachable_count: 0,
			created_at: "2026-01-01T00:00:00.000Z".into(),
			last_seen_at: "2026-01-01T00:00:00.000Z".into(),
		}
	}

	#[tokio::test]
	async fn lease_expiry_evicts_and_counts() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state
					.sessions
					.insert("s-old".into(), session("s-old", SessionKind::Managed, Some("2000-01-01T00:00:00Z")));
				state.targets.insert(
					"T1".into(),
					TargetRecord {
						target_id: "T1".into(),
						session_id: "s-old".into(),
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
		let report = manager.prune(PruneOptions::default()).await.unwrap();
		assert_eq!(report.lease_expired, 1);
		assert_eq!(report.targets_evicted, 1);
		assert!(store.read().sessions.is_empty());
	}

	#[tokio::test]
	async fn attached_unreachable_evicts_immediately() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state
					.sessions
					.insert("s-ext".into(), session("s-ext", SessionKind::Attached, None));
				Ok(())
			})
			.unwrap();

		let report = SessionManager::new(&store).prune(PruneOptions::default()).await.unwrap();
		assert_eq!(report.attached_unreachable, 1);
	}

	#[tokio::test]
	async fn managed_unreachable_survives_grace_window() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state
					.sessions
					.insert("s-m".into(), session("s-m", SessionKind::Managed, None));
				Ok(())
			})
			.unwrap();

		let manager = SessionManager::new(&store);
		let report = manager.prune(PruneOptions::default()).await.unwrap();
		assert_eq!(report.managed_unreachable, 0);
		let state = store.read();
		assert_eq!(state.sessions["s-m"].managed_unreachable_count, 1);
		assert!(state.sessions["s-m"].managed_unreachable_since.is_some());
	}

	#[tokio::test]
	async fn drop_flag_removes_managed_unreachable_now() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state
					.sessions
					.insert("s-m".into(), session("s-m", SessionKind::Managed, None));
				Ok(())
			})
			.unwrap();

		let report = SessionManager::new(&store)
			.prune(PruneOptions {
				drop_managed_unreachable: true,
			})
			.await
			.unwrap();
		assert_eq!(report.managed_drop_requested, 1);
		assert!(store.read().sessions.is_empty());
	}

	#[tokio::test]
	async fn prune_is_idempotent_on_stable_state() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		let manager = SessionManager::new(&store);
		let first = manager.prune(PruneOptions::default()).await.unwrap();
		let second = manager.prune(PruneOptions::default()).await.unwrap();
		assert!(first.removed.is_empty());
		assert!(second.removed.is_empty());
	}

	#[test]
	fn clear_empties_sessions_and_targets() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state
					.sessions
					.insert("s-1".into(), session("s-1", SessionKind::Attached, None));
				state.active_session_id = Some("s-1".into());
				Ok(())
			})
			.unwrap();

		let report = SessionManager::new(&store).clear(true).unwrap();
		assert_eq!(report.sessions_removed, 1);
		let state = store.read();
		assert!(state.sessions.is_empty());
		assert!(state.active_session_id.is_none());
	}
}
