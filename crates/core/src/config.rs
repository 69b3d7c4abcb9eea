//! Resolution of the state root and operational tunables.
//!
//! Precedence for the state root: explicit `--state-dir`, then the
//! `SURFWRIGHT_STATE_DIR` environment variable, then a `surfwright`
//! directory under the platform data dir. `SURFWRIGHT_WORKSPACE_DIR`
//! relocates managed browser profiles for repo-local use.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ErrorCode, Result, SwError};

pub const STATE_DIR_ENV: &str = "SURFWRIGHT_STATE_DIR";
pub const WORKSPACE_DIR_ENV: &str = "SURFWRIGHT_WORKSPACE_DIR";

/// Operational tunables. The defaults balance crash recovery against false
/// eviction; each is overridable here rather than hard-coded at use sites.
#[derive(Debug, Clone)]
pub struct Tunables {
	/// Lock files older than this are considered abandoned and deleted.
	pub lock_stale_after: Duration,
	/// Total budget for acquiring the state lock.
	pub lock_deadline: Duration,
	/// Sleep between lock acquisition attempts.
	pub lock_retry_interval: Duration,
	/// Primary CDP probe timeout.
	pub probe_primary: Duration,
	/// Optional second probe stage.
	pub probe_fallback: Option<Duration>,
	/// Budget for a managed browser to expose its CDP endpoint after spawn.
	pub launch_ready: Duration,
	/// Lease TTL for persistent sessions.
	pub lease_persistent: Duration,
	/// Lease TTL for ephemeral sessions.
	pub lease_ephemeral: Duration,
	/// Lease TTL for implicitly created sessions.
	pub lease_implicit: Duration,
	/// Consecutive failures before a managed session is prunable.
	pub managed_unreachable_grace_count: u32,
	/// Minimum unreachable window before a managed session is prunable.
	pub managed_unreachable_grace: Duration,
}

impl Default for Tunables {
	fn default() -> Self {
		Self {
			lock_stale_after: Duration::from_secs(20),
			lock_deadline: Duration::from_secs(10),
			lock_retry_interval: Duration::from_millis(50),
			probe_primary: Duration::from_millis(800),
			probe_fallback: Some(Duration::from_secs(3)),
			launch_ready: Duration::from_secs(15),
			lease_persistent: Duration::from_secs(7 * 24 * 3600),
			lease_ephemeral: Duration::from_secs(4 * 3600),
			lease_implicit: Duration::from_secs(30 * 60),
			managed_unreachable_grace_count: 3,
			managed_unreachable_grace: Duration::from_secs(60),
		}
	}
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
	pub state_root: PathBuf,
	pub workspace_root: Option<PathBuf>,
	pub tunables: Tunables,
}

impl Config {
	/// Resolve from an optional explicit state dir plus the environment.
	pub fn resolve(state_dir: Option<PathBuf>) -> Result<Self> {
		let state_root = match state_dir.or_else(|| std::env::var_os(STATE_DIR_ENV).map(PathBuf::from)) {
			Some(dir) => dir,
			None => default_state_root()?,
		};
		let workspace_root = std::env::var_os(WORKSPACE_DIR_ENV).map(PathBuf::from);
		if let Some(root) = &workspace_root {
			if !root.is_dir() {
				return Err(SwError::new(
					ErrorCode::WorkspaceNotFound,
					format!("workspace dir does not exist: {}", root.display()),
				));
			}
		}
		Ok(Self {
			state_root,
			workspace_root,
			tunables: Tunables::default(),
		})
	}

	/// Path of the state document.
	pub fn state_file(&self) -> PathBuf {
		self.state_root.join("state.json")
	}

	/// Path of the lock file.
	pub fn lock_file(&self) -> PathBuf {
		self.state_root.join("state.lock")
	}

	/// Managed profile directory for a session; workspace-relative when a
	/// workspace root is configured.
	pub fn profile_dir(&self, session_id: &str) -> PathBuf {
		let base = self.workspace_root.as_deref().unwrap_or(&self.state_root);
		base.join("profiles").join(session_id)
	}
}

fn default_state_root() -> Result<PathBuf> {
	dirs::data_dir()
		.or_else(dirs::home_dir)
		.map(|base| base.join("surfwright"))
		.ok_or_else(|| SwError::new(ErrorCode::WorkspaceInvalid, "cannot determine a home directory for state"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn explicit_state_dir_wins() {
		let config = Config::resolve(Some(PathBuf::from("/tmp/sw-test-root"))).unwrap();
		assert_eq!(config.state_root, PathBuf::from("/tmp/sw-test-root"));
		assert!(config.state_file().ends_with("state.json"));
		assert!(config.lock_file().ends_with("state.lock"));
	}

	#[test]
	fn profile_dir_nests_under_state_root_by_default() {
		let config = Config {
			state_root: PathBuf::from("/tmp/swroot"),
			workspace_root: None,
			tunables: Tunables::default(),
		};
		assert_eq!(config.profile_dir("s-default"), PathBuf::from("/tmp/swroot/profiles/s-default"));
	}

	#[test]
	fn default_tunables_keep_stale_threshold_at_least_twenty_seconds() {
		assert!(Tunables::default().lock_stale_after >= Duration::from_secs(20));
	}
}
