//! Cross-process serialization of state mutations.
//!
//! The lock is a JSON file created with `create_new`. Contenders sleep and
//! retry inside a bounded deadline; a lock older than the stale threshold
//! is forcibly deleted so a crashed holder cannot wedge the store forever.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::error::{ErrorCode, Result, SwError};
use crate::util::{now_iso, now_ms, parse_iso};

/// Contents of `state.lock`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
	pub pid: u32,
	pub created_at: String,
}

/// Held for the duration of a critical section; unlinks the lock file on
/// every exit path.
#[derive(Debug)]
pub struct StateLock {
	path: PathBuf,
}

impl StateLock {
	/// Acquire the lock, stealing stale locks along the way.
	pub fn acquire(config: &Config) -> Result<Self> {
		let path = config.lock_file();
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).map_err(lock_io)?;
		}

		let deadline = Instant::now() + config.tunables.lock_deadline;
		loop {
			match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
				Ok(mut file) => {
					let info = LockInfo {
						pid: std::process::id(),
						created_at: now_iso(),
					};
					file.write_all(serde_json::to_string(&info)?.as_bytes()).map_err(lock_io)?;
					return Ok(Self { path });
				}
				Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
					if Self::steal_if_stale(&path, config)? {
						continue;
					}
					if Instant::now() >= deadline {
						return Err(SwError::new(
							ErrorCode::StateLockTimeout,
							format!(
								"could not acquire {} within {}ms",
								path.display(),
								config.tunables.lock_deadline.as_millis()
							),
						));
					}
					std::thread::sleep(config.tunables.lock_retry_interval);
				}
				Err(err) => return Err(lock_io(err)),
			}
		}
	}

	/// Delete the lock when its recorded creation time (or file mtime as a
	/// fallback) exceeds the stale threshold. Returns true when stolen.
	fn steal_if_stale(path: &PathBuf, config: &Config) -> Result<bool> {
		let age_ms = fs::read_to_string(path)
			.ok()
			.and_then(|text| serde_json::from_str::<LockInfo>(&text).ok())
			.and_then(|info| parse_iso(&info.created_at))
			.map(|created| now_ms().saturating_sub(created.timestamp_millis().max(0) as u64))
			.or_else(|| {
				fs::metadata(path)
					.and_then(|m| m.modified())
					.ok()
					.and_then(|t| t.elapsed().ok())
					.map(|e| e.as_millis() as u64)
			});

		match age_ms {
			Some(age) if age >= config.tunables.lock_stale_after.as_millis() as u64 => {
				warn!(target = "surfwright.state", path = %path.display(), age_ms = age, "deleting stale lock");
				match fs::remove_file(path) {
					Ok(()) => Ok(true),
					// A contender may have stolen it first.
					Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(true),
					Err(err) => Err(lock_io(err)),
				}
			}
			_ => Ok(false),
		}
	}
}

impl Drop for StateLock {
	fn drop(&mut self) {
		if let Err(err) = fs::remove_file(&self.path) {
			if err.kind() != std::io::ErrorKind::NotFound {
				warn!(target = "surfwright.state", path = %self.path.display(), %err, "failed to release lock");
			}
		}
	}
}

fn lock_io(err: std::io::Error) -> SwError {
	SwError::new(ErrorCode::StateLockIo, format!("lock io fault: {err}"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Tunables;
	use std::time::Duration;

	fn test_config(root: &std::path::Path) -> Config {
		Config {
			state_root: root.to_path_buf(),
			workspace_root: None,
			tunables: Tunables {
				lock_deadline: Duration::from_millis(200),
				lock_retry_interval: Duration::from_millis(10),
				..Tunables::default()
			},
		}
	}

	#[test]
	fn acquire_writes_and_release_removes() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path());
		{
			let _lock = StateLock::acquire(&config).unwrap();
			let info: LockInfo = serde_json::from_str(&fs::read_to_string(config.lock_file()).unwrap()).unwrap();
			assert_eq!(info.pid, std::process::id());
		}
		assert!(!config.lock_file().exists());
	}

	#[test]
	fn contended_acquire_times_out() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path());
		let _held = StateLock::acquire(&config).unwrap();
		let err = StateLock::acquire(&config).unwrap_err();
		assert_eq!(err.code, ErrorCode::StateLockTimeout);
	}

	#[test]
	fn stale_lock_is_stolen() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = test_config(dir.path());
		config.tunables.lock_stale_after = Duration::from_millis(0);
		// Plant a lock from a long-dead holder.
		fs::write(
			config.lock_file(),
			serde_json::to_string(&LockInfo {
				pid: 1,
				created_at: "2000-01-01T00:00:00Z".into(),
			})
			.unwrap(),
		)
		.unwrap();
		let _lock = StateLock::acquire(&config).unwrap();
	}

	#[test]
	fn unreadable_lock_falls_back_to_mtime() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = test_config(dir.path());
		config.tunables.lock_stale_after = Duration::from_millis(0);
		fs::write(config.lock_file(), b"not json").unwrap();
		let _lock = StateLock::acquire(&config).unwrap();
	}
}
