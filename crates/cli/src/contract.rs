//! The machine-readable command contract.

use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use surfwright::ErrorCode;

pub const CONTRACT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
	pub id: &'static str,
	pub usage: &'static str,
	pub summary: &'static str,
}

/// Every public command of the surface, in stable order.
pub fn commands() -> Vec<CommandSpec> {
	vec![
		CommandSpec { id: "doctor", usage: "surfwright doctor", summary: "Check browser discovery and state-store health" },
		CommandSpec { id: "contract", usage: "surfwright contract", summary: "Emit the machine-readable command contract" },
		CommandSpec { id: "session.ensure", usage: "surfwright session ensure", summary: "Ensure the implicit managed session is reachable" },
		CommandSpec { id: "session.new", usage: "surfwright session new [ID] [--policy P] [--headed]", summary: "Launch a new managed session" },
		CommandSpec { id: "session.attach", usage: "surfwright session attach <ID> --cdp <ORIGIN>", summary: "Attach to an existing CDP endpoint" },
		CommandSpec { id: "session.use", usage: "surfwright session use [ID] [--clear]", summary: "Set or clear the active session" },
		CommandSpec { id: "session.list", usage: "surfwright session list [--probe]", summary: "List known sessions" },
		CommandSpec { id: "session.prune", usage: "surfwright session prune [--drop-managed-unreachable]", summary: "Remove abandoned sessions" },
		CommandSpec { id: "session.clear", usage: "surfwright session clear [--keep-processes]", summary: "Remove all sessions" },
		CommandSpec { id: "open", usage: "surfwright open <URL> [--reuse-url|--reuse-origin|--reuse-active] [--wait-until STAGE]", summary: "Open a URL in a session" },
		CommandSpec { id: "target.list", usage: "surfwright target list", summary: "Enumerate live targets" },
		CommandSpec { id: "target.snapshot", usage: "surfwright target snapshot [TARGET] [-s SELECTOR]", summary: "Bounded sample of a scope" },
		CommandSpec { id: "target.find", usage: "surfwright target find [TARGET] --text|--selector|--contains", summary: "Locate elements" },
		CommandSpec { id: "target.read", usage: "surfwright target read [TARGET] [-s SELECTOR] [--chunk-index N]", summary: "Chunked text extraction" },
		CommandSpec { id: "target.click", usage: "surfwright target click [TARGET] --text|--selector [--wait-for-text T]", summary: "Click the first matching element" },
		CommandSpec { id: "target.click-read", usage: "surfwright target click-read [TARGET] --text|--selector", summary: "Click, then read the resulting page" },
		CommandSpec { id: "target.fill", usage: "surfwright target fill [TARGET] --selector S --value V", summary: "Type into an element" },
		CommandSpec { id: "target.upload", usage: "surfwright target upload [TARGET] -s SELECTOR --file PATH", summary: "Attach files to a file input" },
		CommandSpec { id: "target.wait", usage: "surfwright target wait [TARGET] --text|--selector|--network-idle", summary: "Wait for a condition" },
		CommandSpec { id: "target.eval", usage: "surfwright target eval [TARGET] --expr|--expression|--script-path", summary: "Evaluate bounded JavaScript in the main world" },
		CommandSpec { id: "target.extract", usage: "surfwright target extract [TARGET] --kind KIND", summary: "Kind-driven structured extraction" },
		CommandSpec { id: "target.keypress", usage: "surfwright target keypress [TARGET] --key KEY", summary: "Dispatch a key event" },
		CommandSpec { id: "target.select-option", usage: "surfwright target select-option [TARGET] -s SELECTOR --value|--label|--index", summary: "Select an option" },
		CommandSpec { id: "target.screenshot", usage: "surfwright target screenshot [TARGET] --out FILE [--full-page]", summary: "Capture a screenshot" },
		CommandSpec { id: "target.emulate", usage: "surfwright target emulate [TARGET] [--user-agent UA] [--width W --height H]", summary: "Apply emulation overrides" },
		CommandSpec { id: "target.close", usage: "surfwright target close <TARGET>", summary: "Close a target" },
		CommandSpec { id: "target.count", usage: "surfwright target count [TARGET] -s SELECTOR", summary: "Count elements matching a selector" },
		CommandSpec { id: "target.scroll-plan", usage: "surfwright target scroll-plan [TARGET] [--overlap F]", summary: "Plan scroll offsets tiling the page" },
		CommandSpec { id: "target.frames", usage: "surfwright target frames [TARGET]", summary: "List the frame tree" },
		CommandSpec { id: "target.network", usage: "surfwright target network [TARGET] [--profile P] [--capture-ms MS]", summary: "Synchronous network capture" },
		CommandSpec { id: "target.network-tail", usage: "surfwright target network-tail [TARGET] [--capture-ms MS]", summary: "Stream capture events as NDJSON" },
		CommandSpec { id: "target.network-query", usage: "surfwright target network-query <HANDLE> [--view V]", summary: "Re-project a saved capture or artifact" },
		CommandSpec { id: "target.network-export", usage: "surfwright target network-export [TARGET] --out FILE [--from HANDLE]", summary: "Export a capture as HAR" },
		CommandSpec { id: "target.network-export-list", usage: "surfwright target network-export-list", summary: "List indexed network artifacts" },
		CommandSpec { id: "target.network-export-prune", usage: "surfwright target network-export-prune [--max-count N] [--keep-files]", summary: "Prune the artifact index" },
		CommandSpec { id: "target.network-begin", usage: "surfwright target network-begin [TARGET] [--max-runtime-ms MS]", summary: "Start a background capture" },
		CommandSpec { id: "target.network-end", usage: "surfwright target network-end <CAPTURE> [--wait-ms MS]", summary: "Stop a background capture and project it" },
		CommandSpec { id: "target.network-check", usage: "surfwright target network-check [TARGET] --budget-path|--budget-json [--from HANDLE]", summary: "Check a capture against a budget" },
		CommandSpec { id: "target.prune", usage: "surfwright target prune [--max-age-ms MS] [--max-per-session N]", summary: "Prune persisted target snapshots" },
		CommandSpec { id: "state.reconcile", usage: "surfwright state reconcile", summary: "Restore state-document invariants" },
		CommandSpec { id: "state.disk-prune", usage: "surfwright state disk-prune", summary: "Remove files the state no longer references" },
		CommandSpec { id: "run", usage: "surfwright run --plan-json|--plan-path|--replay-path [--doctor] [--record]", summary: "Execute a declarative pipeline plan" },
	]
}

const GUARANTEES: &[&str] = &[
	"every command writes exactly one JSON object to stdout",
	"failures carry a stable code from the error taxonomy and a nonzero exit code",
	"state mutations are serialized through a file lock and written atomically",
	"sensitive headers are redacted before any capture output leaves the process",
	"all captures, previews, and evaluation results are size-bounded",
];

const GUIDANCE: &[&str] = &[
	"prefer `open --reuse-url` to avoid unbounded tab growth",
	"pass --session explicitly in scripts; the active pointer is for interactive use",
	"treat retryable=true failures as transient and retry the same invocation",
	"use `run --doctor` to lint a plan before executing it",
];

/// sha256 over the sorted command and error rows.
pub fn fingerprint(commands: &[CommandSpec]) -> String {
	let mut command_rows: Vec<String> = commands
		.iter()
		.map(|c| format!("{}|{}|{}", c.id, c.usage, c.summary))
		.collect();
	command_rows.sort();
	let mut error_rows: Vec<String> = ErrorCode::ALL
		.iter()
		.map(|code| format!("{}|{}", code.as_str(), code.retryable()))
		.collect();
	error_rows.sort();

	let mut hasher = Sha256::new();
	for row in command_rows.iter().chain(error_rows.iter()) {
		hasher.update(row.as_bytes());
		hasher.update(b"\n");
	}
	format!("{:x}", hasher.finalize())
}

/// The full contract report.
pub fn contract_report() -> Value {
	let commands = commands();
	let errors: Vec<Value> = ErrorCode::ALL
		.iter()
		.map(|code| json!({ "code": code.as_str(), "retryable": code.retryable() }))
		.collect();
	json!({
		"name": "surfwright",
		"version": env!("CARGO_PKG_VERSION"),
		"contractSchemaVersion": CONTRACT_SCHEMA_VERSION,
		"contractFingerprint": fingerprint(&commands),
		"guarantees": GUARANTEES,
		"commands": commands,
		"errors": errors,
		"guidance": GUIDANCE,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fingerprint_is_stable_and_order_independent() {
		let mut reversed = commands();
		reversed.reverse();
		assert_eq!(fingerprint(&commands()), fingerprint(&reversed));
	}

	#[test]
	fn fingerprint_changes_with_surface() {
		let mut fewer = commands();
		fewer.pop();
		assert_ne!(fingerprint(&commands()), fingerprint(&fewer));
	}

	#[test]
	fn report_shape_matches_contract() {
		let report = contract_report();
		assert_eq!(report["name"], "surfwright");
		assert_eq!(report["contractSchemaVersion"], 1);
		assert_eq!(report["errors"].as_array().unwrap().len(), ErrorCode::ALL.len());
		assert!(report["commands"].as_array().unwrap().len() >= 40);
		assert_eq!(report["contractFingerprint"].as_str().unwrap().len(), 64);
	}

	#[test]
	fn command_ids_are_unique() {
		let mut seen = std::collections::HashSet::new();
		for command in commands() {
			assert!(seen.insert(command.id), "duplicate command id {}", command.id);
		}
	}
}
