//! `session` subcommand dispatch.

use std::time::Duration;

use serde_json::{Value, json};
use surfwright::error::{ErrorCode, Result, SwError};
use surfwright::session::{PruneOptions, SessionManager};
use surfwright::state::{BrowserMode, SessionPolicy, StateStore};

use crate::cli::{Cli, SessionAction};

pub async fn dispatch(store: &StateStore, action: &SessionAction, _cli: &Cli, _timeout: Duration) -> Result<Value> {
	let manager = SessionManager::new(store);
	match action {
		SessionAction::Ensure => {
			let outcome = manager.ensure_default_managed().await?;
			Ok(json!({
				"session": outcome.session,
				"created": outcome.created,
				"restarted": outcome.restarted,
			}))
		}
		SessionAction::New {
			id,
			policy,
			headed,
			lease_ttl_ms,
		} => {
			let policy = parse_policy(policy)?;
			let mode = if *headed { BrowserMode::Headed } else { BrowserMode::Headless };
			let session_id = match id {
				Some(id) => id.clone(),
				None => store.update(|state| Ok(state.allocate_session_id("s")))?,
			};
			let session = manager.create_managed(session_id, policy, mode, *lease_ttl_ms).await?;
			Ok(json!({ "session": session, "created": true }))
		}
		SessionAction::Attach { id, cdp, lease_ttl_ms } => {
			let session = manager.attach(id.clone(), cdp, *lease_ttl_ms).await?;
			Ok(json!({ "session": session, "attached": true }))
		}
		SessionAction::Use { id, clear } => {
			if *clear && id.is_some() {
				return Err(SwError::new(ErrorCode::QueryInvalid, "--clear conflicts with an id"));
			}
			if !*clear && id.is_none() {
				return Err(SwError::new(ErrorCode::QueryInvalid, "session use needs an id or --clear"));
			}
			let active = manager.use_session(id.as_deref())?;
			Ok(json!({ "activeSessionId": active }))
		}
		SessionAction::List { probe } => {
			let state = store.read();
			let mut sessions = Vec::new();
			for (id, session) in &state.sessions {
				let mut row = serde_json::to_value(session)?;
				row["active"] = json!(state.active_session_id.as_deref() == Some(id.as_str()));
				if *probe {
					let tunables = &store.config().tunables;
					let reachable =
						surfwright_runtime::probe_reachable(&session.cdp_origin, tunables.probe_primary, tunables.probe_fallback)
							.await
							.is_ok();
					row["reachable"] = json!(reachable);
				}
				sessions.push(row);
			}
			Ok(json!({ "sessions": sessions, "activeSessionId": state.active_session_id }))
		}
		SessionAction::Prune {
			drop_managed_unreachable,
		} => {
			let report = manager
				.prune(PruneOptions {
					drop_managed_unreachable: *drop_managed_unreachable,
				})
				.await?;
			Ok(serde_json::to_value(report)?)
		}
		SessionAction::Clear { keep_processes } => {
			let report = manager.clear(*keep_processes)?;
			Ok(serde_json::to_value(report)?)
		}
	}
}

fn parse_policy(raw: &str) -> Result<SessionPolicy> {
	match raw {
		"ephemeral" => Ok(SessionPolicy::Ephemeral),
		"persistent" => Ok(SessionPolicy::Persistent),
		other => Err(SwError::new(
			ErrorCode::QueryInvalid,
			format!("policy must be ephemeral or persistent: {other:?}"),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn policy_parsing() {
		assert_eq!(parse_policy("ephemeral").unwrap(), SessionPolicy::Ephemeral);
		assert_eq!(parse_policy("persistent").unwrap(), SessionPolicy::Persistent);
		assert!(parse_policy("forever").is_err());
	}
}
