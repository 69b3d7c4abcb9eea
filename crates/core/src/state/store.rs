//! Serialized, atomic access to `state.json`.

use std::fs;
use std::path::PathBuf;

use rand::Rng;
use tracing::{debug, warn};

use super::lock::StateLock;
use super::migrate::migrate_to_current;
use super::types::{CURRENT_STATE_VERSION, SurfwrightState};
use crate::config::Config;
use crate::error::Result;
use crate::util::now_ms;

/// Handle to the on-disk state document.
///
/// Reads outside the lock observe the last persisted snapshot; every
/// mutation runs inside [`StateStore::update`]'s critical section.
pub struct StateStore {
	config: Config,
}

impl StateStore {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Read and normalize the current snapshot. A missing or malformed file
	/// yields an empty state.
	pub fn read(&self) -> SurfwrightState {
		let path = self.config.state_file();
		let Ok(text) = fs::read_to_string(&path) else {
			return SurfwrightState::default();
		};
		let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
			warn!(target = "surfwright.state", path = %path.display(), "state file is not JSON; starting empty");
			return SurfwrightState::default();
		};
		let version = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
		let value = if version < CURRENT_STATE_VERSION {
			match migrate_to_current(value, version) {
				Some(migrated) => migrated,
				None => {
					warn!(target = "surfwright.state", version, "no migration path; starting empty");
					return SurfwrightState::default();
				}
			}
		} else {
			value
		};
		SurfwrightState::from_value(value)
	}

	/// Acquire the lock, read, apply `mutate`, and write back atomically.
	pub fn update<T>(&self, mutate: impl FnOnce(&mut SurfwrightState) -> Result<T>) -> Result<T> {
		let _lock = StateLock::acquire(&self.config)?;
		let mut state = self.read();
		let out = mutate(&mut state)?;
		self.write_locked(&state)?;
		Ok(out)
	}

	/// Replace the whole document under the lock.
	pub fn write(&self, state: &SurfwrightState) -> Result<()> {
		let _lock = StateLock::acquire(&self.config)?;
		self.write_locked(state)
	}

	fn write_locked(&self, state: &SurfwrightState) -> Result<()> {
		let path = self.config.state_file();
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		let mut stamped = state.clone();
		stamped.version = CURRENT_STATE_VERSION;
		let body = format!("{}\n", serde_json::to_string_pretty(&stamped)?);
		atomic_write(&path, body.as_bytes())?;
		debug!(target = "surfwright.state", path = %path.display(), sessions = stamped.sessions.len(), "state written");
		Ok(())
	}
}

/// Write-temp-then-rename. The temp name carries pid, millis, and a random
/// suffix so concurrent writers never collide; any residual path deletes
/// the temp.
pub fn atomic_write(path: &PathBuf, bytes: &[u8]) -> Result<()> {
	let suffix: u32 = rand::thread_rng().r#gen();
	let temp = path.with_file_name(format!(
		"{}.{}.{}.{:08x}.tmp",
		path.file_stem().and_then(|s| s.to_str()).unwrap_or("state"),
		std::process::id(),
		now_ms(),
		suffix
	));
	let outcome = (|| -> Result<()> {
		{
			use std::io::Write;
			let mut file = fs::OpenOptions::new().write(true).create_new(true).open(&temp)?;
			file.write_all(bytes)?;
			file.sync_all()?;
		}
		fs::rename(&temp, path)?;
		Ok(())
	})();
	if outcome.is_err() {
		let _ = fs::remove_file(&temp);
	}
	outcome
}

/// Ordinal allocators, collision-free within the mutator scope.
impl SurfwrightState {
	pub fn allocate_session_id(&mut self, prefix: &str) -> String {
		loop {
			let id = format!("{prefix}-{}", self.next_session_ordinal);
			self.next_session_ordinal += 1;
			if !self.sessions.contains_key(&id) {
				return id;
			}
		}
	}

	pub fn allocate_capture_id(&mut self) -> String {
		loop {
			let id = format!("c-{}", self.next_capture_ordinal);
			self.next_capture_ordinal += 1;
			if !self.captures.contains_key(&id) {
				return id;
			}
		}
	}

	pub fn allocate_artifact_id(&mut self) -> String {
		loop {
			let id = format!("na-{}", self.next_artifact_ordinal);
			self.next_artifact_ordinal += 1;
			if !self.artifacts.contains_key(&id) {
				return id;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Tunables;
	use crate::state::types::{BrowserMode, SessionKind, SessionPolicy, SessionRecord};
	use crate::util::now_iso;

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
			lease_ttl_ms: None,
			managed_unreachable_since: None,
			managed_unreachable_count: 0,
			created_at: now_iso(),
			last_seen_at: now_iso(),
		}
	}

	#[test]
	fn read_of_missing_file_is_empty() {
		let dir = tempfile::tempdir().unwrap();
		let state = store_in(dir.path()).read();
		assert_eq!(state.version, CURRENT_STATE_VERSION);
		assert!(state.sessions.is_empty());
	}

	#[test]
	fn write_then_read_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		store
			.update(|state| {
				let id = state.allocate_session_id("s");
				state.sessions.insert(id.clone(), session(&id));
				state.active_session_id = Some(id);
				Ok(())
			})
			.unwrap();

		let state = store.read();
		assert_eq!(state.sessions.len(), 1);
		assert_eq!(state.active_session_id.as_deref(), Some("s-1"));
		assert_eq!(state.next_session_ordinal, 2);
		// Pretty-printed with trailing newline.
		let text = fs::read_to_string(store.config().state_file()).unwrap();
		assert!(text.ends_with('\n'));
		assert!(text.contains("\n  \"version\""));
	}

	#[test]
	fn ordinals_skip_occupied_ids() {
		let mut state = SurfwrightState::default();
		state.sessions.insert("s-1".into(), session("s-1"));
		let id = state.allocate_session_id("s");
		assert_eq!(id, "s-2");
		assert_eq!(state.next_session_ordinal, 3);
	}

	#[test]
	fn capture_and_artifact_ids_are_prefixed() {
		let mut state = SurfwrightState::default();
		assert_eq!(state.allocate_capture_id(), "c-1");
		assert_eq!(state.allocate_capture_id(), "c-2");
		assert_eq!(state.allocate_artifact_id(), "na-1");
	}

	#[test]
	fn older_version_is_migrated_on_read() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		fs::create_dir_all(dir.path()).unwrap();
		fs::write(
			store.config().state_file(),
			serde_json::json!({ "version": 1, "pages": {} }).to_string(),
		)
		.unwrap();
		let state = store.read();
		assert_eq!(state.version, CURRENT_STATE_VERSION);
	}

	#[test]
	fn corrupt_file_reads_empty() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		fs::write(store.config().state_file(), "{{not json").unwrap();
		assert!(store.read().sessions.is_empty());
	}

	#[test]
	fn atomic_write_leaves_no_temp_files() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("state.json");
		atomic_write(&path, b"{}").unwrap();
		let names: Vec<_> = fs::read_dir(dir.path())
			.unwrap()
			.map(|e| e.unwrap().file_name().into_string().unwrap())
			.collect();
		assert_eq!(names, vec!["state.json"]);
	}
}
