//! Wait conditions: text, selector, network idle.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use surfwright_runtime::CdpConnection;

use super::{ActionEnv, finish, prologue, quick_eval, refresh_status};
use crate::error::{ErrorCode, Result, SwError};
use crate::report::ActionReport;

const POLL_INTERVAL: Duration = Duration::from_millis(150);
const NETWORK_IDLE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitMode {
	Text,
	Selector,
	NetworkIdle,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitParams {
	#[serde(default)]
	pub text: Option<String>,
	#[serde(default)]
	pub selector: Option<String>,
	#[serde(default)]
	pub network_idle: bool,
}

impl WaitParams {
	pub fn mode(&self) -> Result<(WaitMode, String)> {
		match (&self.text, &self.selector, self.network_idle) {
			(Some(text), None, false) => Ok((WaitMode::Text, text.clone())),
			(None, Some(selector), false) => Ok((WaitMode::Selector, selector.clone())),
			(None, None, true) => Ok((WaitMode::NetworkIdle, String::new())),
			_ => Err(SwError::query("exactly one of --text, --selector, or --network-idle is required")),
		}
	}
}

/// Evidence of one wait, embedded in wait and click reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitPayload {
	pub mode: WaitMode,
	pub value: String,
	pub elapsed_ms: u64,
	pub satisfied: bool,
}

/// Poll a condition until satisfied or the deadline passes.
pub async fn wait_for(conn: &CdpConnection, mode: WaitMode, value: &str, timeout: Duration) -> Result<WaitPayload> {
	let started = Instant::now();
	let satisfied = match mode {
		WaitMode::Text => poll_expression(conn, &text_probe(value)?, timeout).await?,
		WaitMode::Selector => {
			// Parse failure must surface before any waiting.
			let probe = selector_probe(value)?;
			let valid = quick_eval(conn, &selector_valid_probe(value)?, timeout).await?;
			if valid.as_bool() != Some(true) {
				return Err(SwError::new(
					ErrorCode::SelectorInvalid,
					format!("invalid selector {value:?}"),
				));
			}
			poll_expression(conn, &probe, timeout).await?
		}
		WaitMode::NetworkIdle => network_idle(conn, timeout).await?,
	};

	let payload = WaitPayload {
		mode,
		value: value.to_string(),
		elapsed_ms: started.elapsed().as_millis() as u64,
		satisfied,
	};
	if !satisfied {
		return Err(SwError::new(
			ErrorCode::WaitTimeout,
			format!("wait not satisfied within {}ms", timeout.as_millis()),
		)
		.with_diagnostics(serde_json::to_value(&payload)?));
	}
	Ok(payload)
}

fn text_probe(text: &str) -> Result<String> {
	Ok(format!(
		"!!(document.body && document.body.innerText.includes({}))",
		serde_json::to_string(text)?
	))
}

fn selector_probe(selector: &str) -> Result<String> {
	Ok(format!("!!document.querySelector({})", serde_json::to_string(selector)?))
}

fn selector_valid_probe(selector: &str) -> Result<String> {
	Ok(format!(
		"(() => {{ try {{ document.querySelector({}); return true; }} catch (e) {{ return false; }} }})()",
		serde_json::to_string(selector)?
	))
}

async fn poll_expression(conn: &CdpConnection, expression: &str, timeout: Duration) -> Result<bool> {
	let deadline = Instant::now() + timeout;
	loop {
		if quick_eval(conn, expression, timeout).await?.as_bool() == Some(true) {
			return Ok(true);
		}
		if Instant::now() >= deadline {
			return Ok(false);
		}
		tokio::time::sleep(POLL_INTERVAL).await;
	}
}

/// Idle means no requests in flight for the grace window.
async fn network_idle(conn: &CdpConnection, timeout: Duration) -> Result<bool> {
	let mut events = conn.subscribe();
	conn.call("Network.enable", json!({}), timeout).await?;

	let deadline = Instant::now() + timeout;
	let mut inflight: std::collections::HashSet<String> = Default::default();
	let mut quiet_since = Instant::now();
	loop {
		if inflight.is_empty() && quiet_since.elapsed() >= NETWORK_IDLE_GRACE {
			let _ = conn.call("Network.disable", json!({}), timeout).await;
			return Ok(true);
		}
		if Instant::now() >= deadline {
			let _ = conn.call("Network.disable", json!({}), timeout).await;
			return Ok(false);
		}
		match tokio::time::timeout(Duration::from_millis(100), events.recv()).await {
			Ok(Ok(event)) => {
				let request_id = event.params.get("requestId").and_then(|v| v.as_str()).map(String::from);
				match (event.method.as_str(), request_id) {
					("Network.requestWillBeSent", Some(id)) => {
						inflight.insert(id);
						quiet_since = Instant::now();
					}
					("Network.loadingFinished" | "Network.loadingFailed", Some(id)) => {
						inflight.remove(&id);
						if inflight.is_empty() {
							quiet_since = Instant::now();
						}
					}
					_ => {}
				}
			}
			Ok(Err(_)) => return Ok(false),
			Err(_) => {}
		}
	}
}

/// The standalone wait action.
pub async fn wait(env: &ActionEnv<'_>, params: WaitParams) -> Result<ActionReport<WaitPayload>> {
	let (mode, value) = params.mode()?;
	let mut scope = prologue(env).await?;
	let payload = wait_for(&scope.page.conn, mode, &value, env.timeout).await?;
	refresh_status(&mut scope, env.timeout).await;
	finish(env, scope, "wait", payload)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exactly_one_mode_is_required() {
		let none = WaitParams {
			text: None,
			selector: None,
			network_idle: false,
		};
		assert!(none.mode().is_err());

		let two = WaitParams {
			text: Some("x".into()),
			selector: Some("a".into()),
			network_idle: false,
		};
		assert!(two.mode().is_err());

		let ok = WaitParams {
			text: None,
			selector: None,
			network_idle: true,
		};
		assert_eq!(ok.mode().unwrap().0, WaitMode::NetworkIdle);
	}

	#[test]
	fn probes_escape_their_payloads() {
		let probe = text_probe("needs \"quotes\"").unwrap();
		assert!(probe.contains("\\\"quotes\\\""));
		let probe = selector_probe("a[href=\"x\"]").unwrap();
		assert!(probe.starts_with("!!document.querySelector"));
	}

	#[test]
	fn wait_mode_serializes_kebab_case() {
		assert_eq!(serde_json::to_string(&WaitMode::NetworkIdle).unwrap(), "\"network-idle\"");
	}
}
