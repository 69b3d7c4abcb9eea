//! Network artifact index and pruning.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::state::{ArtifactRecord, StateStore};
use crate::util::{now_iso, parse_iso};

/// Register an exported file in the artifact index.
pub fn index_artifact(
	store: &StateStore,
	path: &str,
	session_id: &str,
	target_id: &str,
	capture_id: Option<String>,
	entries: u64,
	bytes: u64,
) -> Result<ArtifactRecord> {
	store.update(|state| {
		let artifact_id = state.allocate_artifact_id();
		let record = ArtifactRecord {
			artifact_id: artifact_id.clone(),
			created_at: now_iso(),
			format: "har".into(),
			path: path.to_string(),
			session_id: session_id.to_string(),
			target_id: target_id.to_string(),
			capture_id,
			entries,
			bytes,
		};
		state.artifacts.insert(artifact_id, record.clone());
		Ok(record)
	})
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactPruneParams {
	pub max_age_ms: Option<u64>,
	pub max_count: Option<usize>,
	pub max_total_bytes: Option<u64>,
	pub keep_files: bool,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPruneReport {
	pub removed_missing: usize,
	pub removed_by_age: usize,
	pub removed_by_count: usize,
	pub removed_by_size: usize,
	pub files_removed: usize,
	pub remaining: usize,
	pub remaining_bytes: u64,
}

/// Evict artifacts in order: missing file, age, count, cumulative size.
///
/// Count and size eviction walk descending `createdAt`, so the newest
/// artifacts survive. Files of evicted entries are removed best-effort
/// unless `keepFiles`.
pub fn prune_artifacts(store: &StateStore, params: ArtifactPruneParams) -> Result<ArtifactPruneReport> {
	store.update(|state| {
		let mut report = ArtifactPruneReport::default();
		let mut evicted: Vec<ArtifactRecord> = Vec::new();
		let now = chrono::Utc::now();

		// 1. Missing files.
		let mut survivors: Vec<ArtifactRecord> = Vec::new();
		for record in state.artifacts.values() {
			if std::path::Path::new(&record.path).exists() {
				survivors.push(record.clone());
			} else {
				report.removed_missing += 1;
				evicted.push(record.clone());
			}
		}

		// 2. Age.
		if let Some(max_age_ms) = params.max_age_ms {
			let (kept, old): (Vec<_>, Vec<_>) = survivors.into_iter().partition(|record| {
				parse_iso(&record.created_at)
					.map(|created| (now - created).num_milliseconds() < max_age_ms as i64)
					.unwrap_or(false)
			});
			report.removed_by_age = old.len();
			evicted.extend(old);
			survivors = kept;
		}

		// Newest first for count and size passes.
		survivors.sort_by(|a, b| b.created_at.cmp(&a.created_at));

		// 3. Count.
		if let Some(max_count) = params.max_count {
			let overflow = survivors.split_off(max_count.min(survivors.len()));
			report.removed_by_count = overflow.len();
			evicted.extend(overflow);
		}

		// 4. Cumulative size.
		if let Some(max_total_bytes) = params.max_total_bytes {
			let mut total = 0u64;
			let mut kept = Vec::new();
			for record in survivors {
				if total + record.bytes <= max_total_bytes {
					total += record.bytes;
					kept.push(record);
				} else {
					report.removed_by_size += 1;
					evicted.push(record);
				}
			}
			survivors = kept;
		}

		if !params.keep_files {
			for record in &evicted {
				if std::fs::remove_file(&record.path).is_ok() {
					report.files_removed += 1;
				}
			}
		}
		for record in &evicted {
			debug!(target = "surfwright.net", artifact_id = %record.artifact_id, "artifact evicted");
			state.artifacts.remove(&record.artifact_id);
		}
		report.remaining = state.artifacts.len();
		report.remaining_bytes = state.artifacts.values().map(|r| r.bytes).sum();
		Ok(report)
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{Config, Tunables};

	fn store_in(dir: &std::path::Path) -> StateStore {
		StateStore::new(Config {
			state_root: dir.to_path_buf(),
			workspace_root: None,
			tunables: Tunables::default(),
		})
	}

	fn add_artifact(store: &StateStore, dir: &std::path::Path, name: &str, bytes: u64, created_at: &str) -> String {
		let path = dir.join(name);
		std::fs::write(&path, vec![0u8; bytes as usize]).unwrap();
		store
			.update(|state| {
				let id = state.allocate_artifact_id();
				state.artifacts.insert(
					id.clone(),
					ArtifactRecord {
						artifact_id: id.clone(),
						created_at: created_at.into(),
						format: "har".into(),
						path: path.to_string_lossy().to_string(),
						session_id: "s-1".into(),
						target_id: "T1".into(),
						capture_id: None,
						entries: 1,
						bytes,
					},
				);
				Ok(id)
			})
			.unwrap()
	}

	#[test]
	fn missing_files_are_evicted_first() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		let id = add_artifact(&store, dir.path(), "a.har", 10, "2026-01-01T00:00:00Z");
		let path = store.read().artifacts[&id].path.clone();
		std::fs::remove_file(&path).unwrap();

		let report = prune_artifacts(&store, ArtifactPruneParams::default()).unwrap();
		assert_eq!(report.removed_missing, 1);
		assert_eq!(report.remaining, 0);
	}

	#[test]
	fn count_eviction_keeps_newest() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		add_artifact(&store, dir.path(), "old.har", 10, "2026-01-01T00:00:00Z");
		let newest = add_artifact(&store, dir.path(), "new.har", 10, "2026-03-01T00:00:00Z");

		let report = prune_artifacts(
			&store,
			ArtifactPruneParams {
				max_count: Some(1),
				..Default::default()
			},
		)
		.unwrap();
		assert_eq!(report.removed_by_count, 1);
		let state = store.read();
		assert!(state.artifacts.contains_key(&newest));
	}

	#[test]
	fn size_eviction_respects_budget() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		add_artifact(&store, dir.path(), "one.har", 600, "2026-03-01T00:00:00Z");
		add_artifact(&store, dir.path(), "two.har", 600, "2026-02-01T00:00:00Z");

		let report = prune_artifacts(
			&store,
			ArtifactPruneParams {
				max_total_bytes: Some(1000),
				..Default::default()
			},
		)
		.unwrap();
		assert_eq!(report.removed_by_size, 1);
		assert!(report.remaining_bytes <= 1000);
	}

	#[test]
	fn keep_files_leaves_files_on_disk() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		let id = add_artifact(&store, dir.path(), "kept.har", 10, "2026-01-01T00:00:00Z");
		let path = store.read().artifacts[&id].path.clone();

		prune_artifacts(
			&store,
			ArtifactPruneParams {
				max_count: Some(0),
				keep_files: true,
				..Default::default()
			},
		)
		.unwrap();
		assert!(std::path::Path::new(&path).exists());
		assert_eq!(store.read().artifacts.len(), 0);
	}

	#[test]
	fn prune_is_idempotent_with_same_thresholds() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(dir.path());
		for i in 0..3 {
			add_artifact(&store, dir.path(), &format!("{i}.har"), 10, &format!("2026-01-0{}T00:00:00Z", i + 1));
		}
		let params = ArtifactPruneParams {
			max_count: Some(2),
			..Default::default()
		};
		let first = prune_artifacts(&store, params).unwrap();
		let second = prune_artifacts(&store, params).unwrap();
		assert_eq!(first.removed_by_count, 1);
		assert_eq!(second.removed_by_count, 0);
		assert_eq!(second.remaining, 2);
	}
}
