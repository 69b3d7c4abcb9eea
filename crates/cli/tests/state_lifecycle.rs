//! Cross-invocation state behavior exercised through the public crates.

use surfwright::state::{
	ArtifactRecord, BrowserMode, CURRENT_STATE_VERSION, SessionKind, SessionPolicy, SessionRecord, StateStore,
	TargetRecord,
};
use surfwright::util::now_iso;
use surfwright::{Config, Tunables};

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
		debug_port: Some(9222),
		user_data_dir: None,
		browser_pid: None,
		owner_id: None,
		lease_expires_at: None,
		lease_ttl_ms: Some(60_000),
		managed_unreachable_since: None,
		managed_unreachable_count: 0,
		created_at: now_iso(),
		last_seen_at: now_iso(),
	}
}

#[test]
fn state_survives_process_style_reload() {
	let dir = tempfile::tempdir().unwrap();
	{
		let store = store_in(dir.path());
		store
			.update(|state| {
				let id = state.allocate_session_id("s");
				state.sessions.insert(id.clone(), session(&id));
				state.active_session_id = Some(id);
				Ok(())
			})
			.unwrap();
	}
	// A fresh store over the same root sees the persisted snapshot.
	let store = store_in(dir.path());
	let state = store.read();
	assert_eq!(state.version, CURRENT_STATE_VERSION);
	assert_eq!(state.active_session_id.as_deref(), Some("s-1"));
	assert!(state.sessions["s-1"].lease_ttl_ms.is_some());
}

#[test]
fn ordinals_stay_monotonic_across_reloads() {
	let dir = tempfile::tempdir().unwrap();
	let first = {
		let store = store_in(dir.path());
		store.update(|state| Ok(state.allocate_capture_id())).unwrap()
	};
	let second = {
		let store = store_in(dir.path());
		store.update(|state| Ok(state.allocate_capture_id())).unwrap()
	};
	assert_eq!(first, "c-1");
	assert_eq!(second, "c-2");
}

#[test]
fn reconcile_evicts_targets_of_unknown_sessions() {
	let dir = tempfile::tempdir().unwrap();
	let store = store_in(dir.path());
	store
		.update(|state| {
			state.sessions.insert("s-live".into(), session("s-live"));
			for (target_id, session_id) in [("T1", "s-live"), ("T2", "s-gone")] {
				state.targets.insert(
					target_id.into(),
					TargetRecord {
						target_id: target_id.into(),
						session_id: session_id.into(),
						url: "https://example.com".into(),
						title: "Example".into(),
						status: "open".into(),
						last_action_id: None,
						last_action_at: None,
						last_action_kind: None,
						updated_at: now_iso(),
					},
				);
			}
			Ok(())
		})
		.unwrap();

	let report = surfwright::maintenance::reconcile(&store).unwrap();
	assert_eq!(report.orphan_targets_removed, 1);
	let state = store.read();
	assert!(state.targets.contains_key("T1"));
	assert!(!state.targets.contains_key("T2"));
}

#[test]
fn artifact_index_prunes_to_zero_and_removes_files() {
	let dir = tempfile::tempdir().unwrap();
	let store = store_in(dir.path());
	let har_path = dir.path().join("x.har");
	std::fs::write(&har_path, b"{}").unwrap();
	store
		.update(|state| {
			let id = state.allocate_artifact_id();
			state.artifacts.insert(
				id.clone(),
				ArtifactRecord {
					artifact_id: id,
					created_at: now_iso(),
					format: "har".into(),
					path: har_path.to_string_lossy().to_string(),
					session_id: "s-1".into(),
					target_id: "T1".into(),
					capture_id: Some("c-1".into()),
					entries: 3,
					bytes: 2,
				},
			);
			Ok(())
		})
		.unwrap();

	let report = surfwright::net::prune_artifacts(
		&store,
		surfwright::net::ArtifactPruneParams {
			max_count: Some(0),
			..Default::default()
		},
	)
	.unwrap();
	assert_eq!(report.remaining, 0);
	assert_eq!(report.files_removed, 1);
	assert!(!har_path.exists());
}

#[test]
fn concurrent_updates_serialize_through_the_lock() {
	let dir = tempfile::tempdir().unwrap();
	let root = dir.path().to_path_buf();
	let handles: Vec<_> = (0..8)
		.map(|_| {
			let root = root.clone();
			std::thread::spawn(move || {
				let store = store_in(&root);
				store.update(|state| Ok(state.allocate_session_id("s"))).unwrap()
			})
		})
		.collect();
	let mut ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
	ids.sort();
	ids.dedup();
	assert_eq!(ids.len(), 8, "ordinal allocation must be collision-free");

	let store = store_in(&root);
	assert!(store.read().next_session_ordinal > 8);
}
