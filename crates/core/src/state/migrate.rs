//! Forward-only migrations of the state document.
//!
//! Each migration takes and returns a generic JSON envelope, indexed by the
//! pre-upgrade version. A known older version with no migration entry
//! yields an empty state rather than an error; the store re-creates state
//! it cannot carry forward.

use serde_json::Value;
use tracing::debug;

use super::types::CURRENT_STATE_VERSION;

type Migration = fn(Value) -> Value;

/// Migration for the given pre-upgrade version, when one exists.
fn migration_for(version: u32) -> Option<Migration> {
	match version {
		1 => Some(migrate_v1_to_v2),
		2 => Some(migrate_v2_to_v3),
		3 => Some(migrate_v3_to_v4),
		_ => None,
	}
}

/// Apply migrations in ascending order until the document reaches
/// [`CURRENT_STATE_VERSION`]. Returns `None` when a required step is
/// missing, which callers treat as "start empty".
pub fn migrate_to_current(mut value: Value, mut version: u32) -> Option<Value> {
	while version < CURRENT_STATE_VERSION {
		let step = migration_for(version)?;
		debug!(target = "surfwright.state", from = version, to = version + 1, "migrating state");
		value = step(value);
		version += 1;
	}
	if let Value::Object(root) = &mut value {
		root.insert("version".into(), Value::from(CURRENT_STATE_VERSION));
	}
	Some(value)
}

/// v1 kept targets under a `pages` key.
fn migrate_v1_to_v2(mut value: Value) -> Value {
	if let Value::Object(root) = &mut value {
		if let Some(pages) = root.remove("pages") {
			root.insert("targets".into(), pages);
		}
	}
	value
}

/// v2 predates captures, artifacts, and their ordinals.
fn migrate_v2_to_v3(mut value: Value) -> Value {
	if let Value::Object(root) = &mut value {
		root.entry("captures").or_insert_with(|| Value::Object(Default::default()));
		root.entry("artifacts").or_insert_with(|| Value::Object(Default::default()));
		root.entry("nextCaptureOrdinal").or_insert(Value::from(1));
		root.entry("nextArtifactOrdinal").or_insert(Value::from(1));
	}
	value
}

/// v3 stored a single absolute `leaseUntil`; v4 derives expiry from
/// `leaseTtlMs` on every heartbeat and tracks managed reachability.
fn migrate_v3_to_v4(mut value: Value) -> Value {
	if let Value::Object(root) = &mut value {
		if let Some(Value::Object(sessions)) = root.get_mut("sessions") {
			for session in sessions.values_mut() {
				if let Value::Object(fields) = session {
					if let Some(lease_until) = fields.remove("leaseUntil") {
						fields.entry("leaseExpiresAt").or_insert(lease_until);
					}
					fields.entry("managedUnreachableCount").or_insert(Value::from(0));
				}
			}
		}
	}
	value
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn v1_pages_become_targets() {
		let out = migrate_to_current(json!({ "version": 1, "pages": { "t": {} } }), 1).unwrap();
		assert!(out["targets"].is_object());
		assert!(out.get("pages").is_none());
		assert_eq!(out["version"], CURRENT_STATE_VERSION);
	}

	#[test]
	fn v3_lease_until_renames() {
		let out = migrate_to_current(
			json!({
				"version": 3,
				"sessions": { "s-1": { "leaseUntil": "2026-01-01T00:00:00Z" } }
			}),
			3,
		)
		.unwrap();
		assert_eq!(out["sessions"]["s-1"]["leaseExpiresAt"], "2026-01-01T00:00:00Z");
		assert!(out["sessions"]["s-1"].get("leaseUntil").is_none());
	}

	#[test]
	fn unknown_old_version_has_no_path() {
		assert!(migrate_to_current(json!({ "version": 0 }), 0).is_none());
	}

	#[test]
	fn current_version_passes_through() {
		let out = migrate_to_current(json!({ "version": 4, "x": 1 }), 4).unwrap();
		assert_eq!(out["x"], 1);
	}

	#[test]
	fn chain_runs_every_step() {
		let out = migrate_to_current(json!({ "version": 1, "pages": {} }), 1).unwrap();
		assert!(out["captures"].is_object());
		assert_eq!(out["nextCaptureOrdinal"], 1);
	}
}
