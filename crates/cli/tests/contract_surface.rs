//! Contract and dispatch tests that need no live browser.

use clap::Parser;
use surfwright_cli::cli::Cli;
use surfwright_cli::{commands, contract};

fn parse(args: &[&str]) -> Cli {
	Cli::try_parse_from(args).expect("args parse")
}

#[test]
fn contract_report_is_self_consistent() {
	let report = contract::contract_report();
	let fingerprint = report["contractFingerprint"].as_str().unwrap();
	assert_eq!(fingerprint.len(), 64);
	assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));

	// Every error row carries code and retryable.
	for error in report["errors"].as_array().unwrap() {
		assert!(error["code"].as_str().unwrap().starts_with("E_"));
		assert!(error["retryable"].is_boolean());
	}
	// Commands are unique by id.
	let ids: Vec<_> = report["commands"]
		.as_array()
		.unwrap()
		.iter()
		.map(|c| c["id"].as_str().unwrap())
		.collect();
	let unique: std::collections::HashSet<_> = ids.iter().collect();
	assert_eq!(ids.len(), unique.len());
}

#[tokio::test]
async fn contract_command_dispatches_without_state() {
	let dir = tempfile::tempdir().unwrap();
	let cli = parse(&["surfwright", "contract", "--state-dir", dir.path().to_str().unwrap()]);
	let report = commands::dispatch(cli).await.unwrap().unwrap();
	assert_eq!(report["name"], "surfwright");
}

#[tokio::test]
async fn doctor_reports_state_health() {
	let dir = tempfile::tempdir().unwrap();
	let cli = parse(&["surfwright", "doctor", "--state-dir", dir.path().to_str().unwrap()]);
	let report = commands::dispatch(cli).await.unwrap().unwrap();
	assert_eq!(report["state"]["fileExists"], false);
	assert_eq!(report["state"]["sessions"], 0);
	assert_eq!(report["lock"]["held"], false);
}

#[tokio::test]
async fn full_output_shape_echoes_config() {
	let dir = tempfile::tempdir().unwrap();
	let cli = parse(&[
		"surfwright",
		"contract",
		"--state-dir",
		dir.path().to_str().unwrap(),
		"--output-shape",
		"full",
		"--session",
		"s-9",
	]);
	let report = commands::dispatch(cli).await.unwrap().unwrap();
	assert_eq!(report["config"]["sessionHint"], "s-9");
	assert_eq!(report["config"]["timeoutMs"], 15000);
}

#[tokio::test]
async fn state_reconcile_is_idempotent_through_dispatch() {
	let dir = tempfile::tempdir().unwrap();
	let state_dir = dir.path().to_str().unwrap();
	let first = commands::dispatch(parse(&["surfwright", "state", "reconcile", "--state-dir", state_dir]))
		.await
		.unwrap()
		.unwrap();
	let second = commands::dispatch(parse(&["surfwright", "state", "reconcile", "--state-dir", state_dir]))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(first["orphanTargetsRemoved"], 0);
	assert_eq!(first, second);
}

#[tokio::test]
async fn run_doctor_lints_without_executing() {
	let dir = tempfile::tempdir().unwrap();
	let cli = parse(&[
		"surfwright",
		"run",
		"--doctor",
		"--plan-json",
		r#"[{ "id": "open", "url": "https://example.com" }, { "id": "count", "selector": "a", "as": "links" }]"#,
		"--state-dir",
		dir.path().to_str().unwrap(),
	]);
	let report = commands::dispatch(cli).await.unwrap().unwrap();
	assert_eq!(report["mode"], "doctor");
	assert_eq!(report["valid"], true);
	assert_eq!(report["stepCount"], 2);
}

#[tokio::test]
async fn run_doctor_flags_unknown_step_ids() {
	let dir = tempfile::tempdir().unwrap();
	let cli = parse(&[
		"surfwright",
		"run",
		"--doctor",
		"--plan-json",
		r#"[{ "id": "teleport" }]"#,
		"--state-dir",
		dir.path().to_str().unwrap(),
	]);
	let report = commands::dispatch(cli).await.unwrap().unwrap();
	assert_eq!(report["valid"], false);
}

#[tokio::test]
async fn unknown_session_fails_with_contract_code() {
	let dir = tempfile::tempdir().unwrap();
	let cli = parse(&[
		"surfwright",
		"session",
		"use",
		"s-missing",
		"--state-dir",
		dir.path().to_str().unwrap(),
	]);
	let err = commands::dispatch(cli).await.unwrap_err();
	assert_eq!(err.code, surfwright::ErrorCode::SessionNotFound);
}

#[tokio::test]
async fn artifact_prune_with_no_artifacts_is_empty_report() {
	let dir = tempfile::tempdir().unwrap();
	let cli = parse(&[
		"surfwright",
		"target",
		"network-export-prune",
		"--max-count",
		"0",
		"--state-dir",
		dir.path().to_str().unwrap(),
	]);
	let report = commands::dispatch(cli).await.unwrap().unwrap();
	assert_eq!(report["remaining"], 0);
	assert_eq!(report["filesRemoved"], 0);
}
