//! On-disk state reconciliation and disk hygiene.
//!
//! `reconcile` restores the cross-entity invariants of the state document
//! (targets owned by live sessions, finished captures marked, ordinals
//! ahead of every allocated id) and is idempotent. `disk_prune` removes
//! files the state no longer references.

use std::collections::BTreeSet;
use std::fs;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::session::pid_is_alive;
use crate::state::{CaptureStatus, StateStore};
use crate::util::now_iso;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
	pub orphan_targets_removed: usize,
	pub orphan_captures_removed: usize,
	pub captures_marked_failed: usize,
	pub active_pointer_cleared: bool,
	pub ordinals_repaired: usize,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskPruneReport {
	pub profile_dirs_removed: usize,
	pub temp_files_removed: usize,
	pub capture_files_removed: usize,
}

/// Restore state invariants. Running twice without intervening changes is a
/// no-op the second time.
pub fn reconcile(store: &StateStore) -> Result<ReconcileReport> {
	store.update(|state| {
		let mut report = ReconcileReport::default();

		let live: BTreeSet<_> = state.sessions.keys().cloned().collect();

		let before = state.targets.len();
		state.targets.retain(|_, target| live.contains(&target.session_id));
		report.orphan_targets_removed = before - state.targets.len();

		let before = state.captures.len();
		state.captures.retain(|_, capture| live.contains(&capture.session_id));
		report.orphan_captures_removed = before - state.captures.len();

		for capture in state.captures.values_mut() {
			if capture.status == CaptureStatus::Recording {
				let worker_alive = capture.worker_pid.is_some_and(pid_is_alive);
				if !worker_alive {
					capture.status = CaptureStatus::Failed;
					capture.ended_at = Some(now_iso());
					report.captures_marked_failed += 1;
				}
			}
		}

		if let Some(active) = &state.active_session_id {
			if !state.sessions.contains_key(active) {
				state.active_session_id = None;
				report.active_pointer_cleared = true;
			}
		}

		report.ordinals_repaired += repair_ordinal(&mut state.next_session_ordinal, state.sessions.keys());
		report.ordinals_repaired += repair_ordinal(&mut state.next_capture_ordinal, state.captures.keys());
		report.ordinals_repaired += repair_ordinal(&mut state.next_artifact_ordinal, state.artifacts.keys());

		Ok(report)
	})
}

/// Bump an ordinal above every numeric suffix in use.
fn repair_ordinal<'k>(next: &mut u64, keys: impl Iterator<Item = &'k String>) -> usize {
	let max_in_use = keys
		.filter_map(|key| key.rsplit('-').next().and_then(|s| s.parse::<u64>().ok()))
		.max()
		.unwrap_or(0);
	if *next <= max_in_use {
		*next = max_in_use + 1;
		1
	} else {
		0
	}
}

/// Remove unreferenced profile directories, stray atomic-write temp files,
/// and capture scratch files.
pub fn disk_prune(store: &StateStore) -> Result<DiskPruneReport> {
	let state = store.read();
	let config = store.config();
	let mut report = DiskPruneReport::default();

	let referenced_profiles: BTreeSet<String> = state.sessions.keys().cloned().collect();
	let profiles_base = config
		.workspace_root
		.clone()
		.unwrap_or_else(|| config.state_root.clone())
		.join("profiles");
	if let Ok(entries) = fs::read_dir(&profiles_base) {
		for entry in entries.flatten() {
			let name = entry.file_name().to_string_lossy().to_string();
			if !referenced_profiles.contains(&name) && fs::remove_dir_all(entry.path()).is_ok() {
				report.profile_dirs_removed += 1;
			}
		}
	}

	if let Ok(entries) = fs::read_dir(&config.state_root) {
		for entry in entries.flatten() {
			let name = entry.file_name().to_string_lossy().to_string();
			if name.ends_with(".tmp") && fs::remove_file(entry.path()).is_ok() {
				report.temp_files_removed += 1;
			}
		}
	}

	let referenced_capture_files: BTreeSet<String> = state
		.captures
		.values()
		.flat_map(|capture| {
			[
				capture.stop_signal_path.clone(),
				capture.done_path.clone(),
				capture.result_path.clone(),
			]
		})
		.collect();
	let captures_dir = config.state_root.join("captures");
	if let Ok(entries) = fs::read_dir(&captures_dir) {
		for entry in entries.flatten() {
			let path = entry.path().to_string_lossy().to_string();
			if !referenced_capture_files.contains(&path) && fs::remove_file(entry.path()).is_ok() {
				report.capture_files_removed += 1;
			}
		}
	}

	info!(
		target = "surfwright.state",
		profiles = report.profile_dirs_removed,
		temps = report.temp_files_removed,
		captures = report.capture_files_removed,
		"disk prune complete"
	);
	Ok(report)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{Config, Tunables};
	use crate::state::{BrowserMode, CaptureRecord, SessionKind, SessionPolicy, SessionRecord, TargetRecord};

	fn store_in(dir: &std::path::Path) -> StateStore {
		StateStore::new(Config {
			state_root: dir.to_path_buf(),
			workspace_root: None,
			tunables: Tunables::default(),
		})
	}

	fn session(id: &str) -> SessionRecord {
		SessionRecord {
			session_id: id.into(),
			kind: SessionKind::Managed,
			policy: SessionPolicy::Ephemeral,
			browser_mode: BrowserMode::Headless,
			cdp_origin: "http://127.0.0.1:9222".into(),
			debug_port: None,
			user_data_dir: None,
			browser_pid: None,
			owner_id: None,
			lease_expires_at: None,
			lease_ttl_ms: None,
			managed_unreachable_since: None,
			managed_unreachable_count: 0,
			created_at: now_iso(),
			last_seen_at: now_iso(),
		}
	}

	fn target(id: &str, session_id: &str) -> TargetRecord {
		TargetRecord {
			target_id: id.into(),
			session_id: session_id.into(),
			url: String::new(),
			title: String::new(),
			status: String::new(),
			last_action_id: None,
			last_action_at: None,
			last_action_kind: None,
			updated_at: now_iso(),
		}
	}

	#[test]
	fn orphan_targets_are_evicted() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state.sessions.insert("s-1".into(), session("s-1"));
				state.targets.insert("T1".into(), target("T1", "s-1"));
				state.targets.insert("T2".into(), target("T2", "s-gone"));
				Ok(())
			})
			.unwrap();

		let report = reconcile(&store).unwrap();
		assert_eq!(report.orphan_targets_removed, 1);
		assert!(store.read().targets.contains_key("T1"));
	}

	#[test]
	fn reconcile_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state.sessions.insert("s-9".into(), session("s-9"));
				state.targets.insert("T".into(), target("T", "s-none"));
				Ok(())
			})
			.unwrap();

		reconcile(&store).unwrap();
		let first = serde_json::to_string(&store.read()).unwrap();
		let report = reconcile(&store).unwrap();
		let second = serde_json::to_string(&store.read()).unwrap();
		assert_eq!(first, second);
		assert_eq!(report.orphan_targets_removed, 0);
		assert_eq!(report.ordinals_repaired, 0);
	}

	#[test]
	fn dead_recording_capture_is_marked_failed() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state.sessions.insert("s-1".into(), session("s-1"));
				state.captures.insert(
					"c-1".into(),
					CaptureRecord {
						capture_id: "c-1".into(),
						session_id: "s-1".into(),
						target_id: "T1".into(),
						started_at: now_iso(),
						status: CaptureStatus::Recording,
						profile: "api".into(),
						max_runtime_ms: 1000,
						worker_pid: Some(0),
						stop_signal_path: "/nonexistent/stop".into(),
						done_path: "/nonexistent/done".into(),
						result_path: "/nonexistent/result".into(),
						ended_at: None,
						action_id: None,
					},
				);
				Ok(())
			})
			.unwrap();

		let report = reconcile(&store).unwrap();
		assert_eq!(report.captures_marked_failed, 1);
		let state = store.read();
		assert_eq!(state.captures["c-1"].status, CaptureStatus::Failed);
		assert!(state.captures["c-1"].ended_at.is_some());
	}

	#[test]
	fn ordinals_climb_above_allocated_ids() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state.sessions.insert("s-7".into(), session("s-7"));
				state.next_session_ordinal = 1;
				Ok(())
			})
			.unwrap();

		let report = reconcile(&store).unwrap();
		assert_eq!(report.ordinals_repaired, 1);
		assert_eq!(store.read().next_session_ordinal, 8);
	}

	#[test]
	fn disk_prune_removes_unreferenced_profiles_and_temps() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				state.sessions.insert("s-live".into(), session("s-live"));
				Ok(())
			})
			.unwrap();
		fs::create_dir_all(dir.path().join("profiles/s-live")).unwrap();
		fs::create_dir_all(dir.path().join("profiles/s-dead")).unwrap();
		fs::write(dir.path().join("state.1.2.deadbeef.tmp"), "x").unwrap();

		let report = disk_prune(&store).unwrap();
		assert_eq!(report.profile_dirs_removed, 1);
		assert_eq!(report.temp_files_removed, 1);
		assert!(dir.path().join("profiles/s-live").exists());
	}
}
