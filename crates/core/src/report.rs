//! Common report envelope and the five-field timing breakdown.

use std::time::Instant;

use serde::Serialize;

/// Per-phase wall-clock milliseconds of one action invocation.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingMs {
	pub total: u64,
	pub resolve_session: u64,
	pub connect_cdp: u64,
	pub action: u64,
	pub persist_state: u64,
}

/// Accumulates phase laps into a [`TimingMs`].
#[derive(Debug)]
pub struct PhaseTimer {
	start: Instant,
	last: Instant,
	pub resolve_session: u64,
	pub connect_cdp: u64,
	pub action: u64,
	pub persist_state: u64,
}

impl PhaseTimer {
	pub fn start() -> Self {
		let now = Instant::now();
		Self {
			start: now,
			last: now,
			resolve_session: 0,
			connect_cdp: 0,
			action: 0,
			persist_state: 0,
		}
	}

	/// Milliseconds since the previous lap.
	pub fn lap(&mut self) -> u64 {
		let now = Instant::now();
		let elapsed = now.duration_since(self.last).as_millis() as u64;
		self.last = now;
		elapsed
	}

	pub fn finish(&self) -> TimingMs {
		TimingMs {
			total: self.start.elapsed().as_millis() as u64,
			resolve_session: self.resolve_session,
			connect_cdp: self.connect_cdp,
			action: self.action,
			persist_state: self.persist_state,
		}
	}
}

/// Envelope common to every action report; the kind-specific payload is
/// flattened alongside.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport<T: Serialize> {
	pub action: &'static str,
	pub action_id: String,
	pub session_id: String,
	pub target_id: String,
	pub url: String,
	pub title: String,
	#[serde(flatten)]
	pub payload: T,
	pub timing_ms: TimingMs,
}

/// Action ids are unique per invocation, not persisted ordinals.
pub fn new_action_id() -> String {
	use rand::Rng;
	let suffix: u16 = rand::thread_rng().r#gen();
	format!("a-{}-{suffix:04x}", crate::util::now_ms())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn laps_accumulate_into_phases() {
		let mut timer = PhaseTimer::start();
		timer.resolve_session = timer.lap();
		timer.connect_cdp = timer.lap();
		timer.action = timer.lap();
		timer.persist_state = timer.lap();
		let timing = timer.finish();
		assert!(timing.total >= timing.resolve_session + timing.connect_cdp);
	}

	#[test]
	fn action_ids_are_distinct() {
		assert_ne!(new_action_id(), new_action_id());
	}

	#[test]
	fn envelope_flattens_payload() {
		#[derive(Serialize)]
		struct Payload {
			clicked: bool,
		}
		let report = ActionReport {
			action: "click",
			action_id: "a-1".into(),
			session_id: "s-1".into(),
			target_id: "T1".into(),
			url: "https://example.com".into(),
			title: "Example".into(),
			payload: Payload { clicked: true },
			timing_ms: TimingMs::default(),
		};
		let value = serde_json::to_value(&report).unwrap();
		assert_eq!(value["clicked"], true);
		assert_eq!(value["timingMs"]["total"], 0);
	}
}
