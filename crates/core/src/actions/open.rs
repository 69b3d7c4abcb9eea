//! Open a URL, optionally reusing an existing page.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::wait::{WaitMode, wait_for};
use super::{ActionEnv, ActionScope, finish, quick_eval, refresh_status};
use crate::error::{ErrorCode, Phase, Result, SwError};
use crate::report::{ActionReport, PhaseTimer, new_action_id};
use crate::session::{ResolveHints, SessionManager};
use crate::target::{create_target, find_page_by_url, first_page};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReuseMode {
	/// Always create a fresh page.
	#[default]
	None,
	/// Reuse a page already at the exact URL.
	Url,
	/// Reuse a page on the same origin and navigate it.
	Origin,
	/// Navigate whatever page is current.
	Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
	/// Navigation has been handed to the browser.
	Commit,
	#[serde(rename = "domcontentloaded")]
	DomContentLoaded,
	#[default]
	Load,
	#[serde(rename = "networkidle")]
	NetworkIdle,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenParams {
	pub url: String,
	#[serde(default)]
	pub reuse: ReuseMode,
	#[serde(default)]
	pub wait_until: WaitUntil,
	#[serde(default)]
	pub proof: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenProof {
	pub requested_url: String,
	pub final_url: String,
	pub target_id: String,
	pub reused: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
	pub final_url: String,
	pub wait_until: WaitUntil,
	pub wait_satisfied: bool,
	pub reused: bool,
	pub created: bool,
	pub session_restarted: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub proof: Option<OpenProof>,
}

fn validate_url(raw: &str) -> Result<url::Url> {
	let parsed = url::Url::parse(raw).map_err(|e| SwError::new(ErrorCode::UrlInvalid, format!("invalid url {raw:?}: {e}")))?;
	if !matches!(parsed.scheme(), "http" | "https" | "about") {
		return Err(SwError::new(
			ErrorCode::UrlInvalid,
			format!("unsupported scheme {:?}; only http, https, and about are allowed", parsed.scheme()),
		));
	}
	Ok(parsed)
}

fn origin_of(url: &url::Url) -> String {
	url.origin().ascii_serialization()
}

/// Open a URL: resolve a session, pick or create a page per the reuse mode,
/// navigate, and wait for the requested readiness.
pub async fn open(env: &ActionEnv<'_>, params: OpenParams) -> Result<ActionReport<OpenPayload>> {
	let requested = validate_url(&params.url)?;
	let mut timer = PhaseTimer::start();

	let manager = SessionManager::new(env.store);
	let outcome = manager
		.resolve_for_action(ResolveHints {
			session_id: env.session_hint.as_deref(),
			target_id: env.target_hint.as_deref(),
			allow_implicit_new: env.allow_implicit_session,
		})
		.await
		.map_err(|err| err.with_phase(Phase::ResolveSession))?;
	timer.resolve_session = timer.lap();

	let origin = outcome.session.cdp_origin.clone();
	let requested_origin = origin_of(&requested);
	let (page, reused) = match params.reuse {
		ReuseMode::Url => {
			let exact = requested.as_str().to_string();
			match find_page_by_url(&origin, env.timeout, |url| url == exact || url.trim_end_matches('/') == exact.trim_end_matches('/')).await? {
				Some(page) => (page, true),
				None => (create_target(&origin, requested.as_str(), env.timeout).await?, false),
			}
		}
		ReuseMode::Origin => {
			let wanted = requested_origin.clone();
			match find_page_by_url(&origin, env.timeout, |url| {
				url::Url::parse(url).map(|u| origin_of(&u) == wanted).unwrap_or(false)
			})
			.await?
			{
				Some(page) => (page, true),
				None => (create_target(&origin, requested.as_str(), env.timeout).await?, false),
			}
		}
		ReuseMode::Active => match first_page(&origin, env.timeout).await? {
			Some(page) => (page, true),
			None => (create_target(&origin, requested.as_str(), env.timeout).await?, false),
		},
		ReuseMode::None => (create_target(&origin, requested.as_str(), env.timeout).await?, false),
	};
	timer.connect_cdp = timer.lap();

	let mut scope = ActionScope {
		session: outcome.session,
		page,
		timer,
		action_id: new_action_id(),
		session_restarted: outcome.restarted,
	};

	// A reused page must actually navigate unless it is already there.
	if reused && scope.page.url.trim_end_matches('/') != requested.as_str().trim_end_matches('/') {
		debug!(target = "surfwright.action", url = %requested, "navigating reused page");
		let assign = format!("location.href = {};", serde_json::to_string(requested.as_str())?);
		let _ = quick_eval(&scope.page.conn, &assign, env.timeout).await;
	}

	let wait_satisfied = match params.wait_until {
		WaitUntil::Commit => true,
		WaitUntil::DomContentLoaded => {
			poll_ready_state(&scope, "interactive", env.timeout).await
		}
		WaitUntil::Load => poll_ready_state(&scope, "complete", env.timeout).await,
		WaitUntil::NetworkIdle => wait_for(&scope.page.conn, WaitMode::NetworkIdle, "", env.timeout)
			.await
			.map(|w| w.satisfied)
			.unwrap_or(false),
	};
	if !wait_satisfied && params.wait_until != WaitUntil::Commit {
		return Err(SwError::new(
			ErrorCode::WaitTimeout,
			format!("page did not reach {:?} within {}ms", params.wait_until, env.timeout.as_millis()),
		));
	}

	refresh_status(&mut scope, env.timeout).await;
	let created = !reused;
	let proof = params.proof.then(|| OpenProof {
		requested_url: requested.to_string(),
		final_url: scope.page.url.clone(),
		target_id: scope.page.target_id.clone(),
		reused,
	});
	let session_restarted = scope.session_restarted;
	let final_url = scope.page.url.clone();

	finish(
		env,
		scope,
		"open",
		OpenPayload {
			final_url,
			wait_until: params.wait_until,
			wait_satisfied,
			reused,
			created,
			session_restarted,
			proof,
		},
	)
}

/// Poll `document.readyState`, tolerating evaluation errors while the
/// navigation swaps documents.
async fn poll_ready_state(scope: &ActionScope, at_least: &str, timeout: Duration) -> bool {
	let deadline = Instant::now() + timeout;
	let rank = |state: &str| match state {
		"loading" => 0,
		"interactive" => 1,
		"complete" => 2,
		_ => 0,
	};
	let wanted = rank(at_least);
	loop {
		if let Ok(value) = quick_eval(&scope.page.conn, "document.readyState", timeout).await {
			if value.as_str().map(rank).unwrap_or(0) >= wanted {
				return true;
			}
		}
		if Instant::now() >= deadline {
			return false;
		}
		tokio::time::sleep(Duration::from_millis(100)).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn url_validation_rejects_non_web_schemes() {
		validate_url("https://example.com").unwrap();
		validate_url("about:blank").unwrap();
		assert_eq!(validate_url("javascript:alert(1)").unwrap_err().code, ErrorCode::UrlInvalid);
		assert_eq!(validate_url("not a url").unwrap_err().code, ErrorCode::UrlInvalid);
	}

	#[test]
	fn wait_until_parses_contract_tokens() {
		let check = |token: &str, expected: WaitUntil| {
			let parsed: WaitUntil = serde_json::from_str(&format!("\"{token}\"")).unwrap();
			assert_eq!(parsed, expected);
		};
		check("commit", WaitUntil::Commit);
		check("domcontentloaded", WaitUntil::DomContentLoaded);
		check("load", WaitUntil::Load);
		check("networkidle", WaitUntil::NetworkIdle);
	}

	#[test]
	fn reuse_mode_defaults_to_none() {
		let params: OpenParams = serde_json::from_str(r#"{ "url": "https://example.com" }"#).unwrap();
		assert_eq!(params.reuse, ReuseMode::None);
		assert_eq!(params.wait_until, WaitUntil::Load);
	}
}
