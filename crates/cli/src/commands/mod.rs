//! Command dispatch: one clap variant, one core call, one JSON report.

mod session;
mod target;

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Value, json};
use surfwright::actions::ActionEnv;
use surfwright::error::{ErrorCode, Result, SwError};
use surfwright::state::StateStore;
use surfwright::{Config, maintenance, net, pipeline};

use crate::cli::{Cli, Commands, NetworkWorkerArgs, RunArgs};
use crate::contract;

/// Dispatch a parsed invocation. `Ok(None)` means output was already
/// streamed (network-tail).
pub async fn dispatch(cli: Cli) -> Result<Option<Value>> {
	if !matches!(cli.output_shape.as_str(), "compact" | "full") {
		return Err(SwError::new(
			ErrorCode::QueryInvalid,
			format!("--output-shape must be compact or full: {:?}", cli.output_shape),
		));
	}
	let config = Config::resolve(cli.state_dir.clone())?;
	let store = StateStore::new(config);
	let timeout = Duration::from_millis(cli.timeout_ms.max(1));

	let mut report = match cli.command {
		Commands::Doctor => Some(doctor(&store)),
		Commands::Contract => Some(contract::contract_report()),
		Commands::Session { ref action } => Some(session::dispatch(&store, action, &cli, timeout).await?),
		Commands::Open(ref args) => Some(target::open(&store, args, &cli, timeout).await?),
		Commands::Target { ref action } => target::dispatch(&store, action, &cli, timeout).await?,
		Commands::State { ref action } => Some(match action {
			crate::cli::StateAction::Reconcile => serde_json::to_value(maintenance::reconcile(&store)?)?,
			crate::cli::StateAction::DiskPrune => serde_json::to_value(maintenance::disk_prune(&store)?)?,
		}),
		Commands::Run(ref args) => Some(run(&store, args, &cli, timeout).await?),
		Commands::NetworkWorker(ref args) => Some(network_worker(args).await?),
	};

	if cli.output_shape == "full" {
		if let Some(Value::Object(out)) = report.as_mut() {
			out.insert(
				"config".into(),
				json!({
					"sessionHint": cli.session,
					"timeoutMs": cli.timeout_ms,
					"stateRoot": store.config().state_root,
				}),
			);
		}
	}
	Ok(report)
}

pub(crate) fn action_env<'a>(store: &'a StateStore, cli: &Cli, target: Option<String>, timeout: Duration) -> ActionEnv<'a> {
	let mut env = ActionEnv::new(store);
	env.session_hint = cli.session.clone();
	env.target_hint = target;
	env.timeout = timeout;
	env.persist = !cli.no_persist;
	env
}

fn doctor(store: &StateStore) -> Value {
	let browser = surfwright::session::find_browser_executable();
	let config = store.config();
	let state = store.read();
	let lock_path = config.lock_file();
	let lock = std::fs::read_to_string(&lock_path)
		.ok()
		.and_then(|text| serde_json::from_str::<Value>(&text).ok());

	json!({
		"browser": {
			"found": browser.is_ok(),
			"executable": browser.as_ref().ok(),
			"error": browser.as_ref().err().map(|e| e.message.clone()),
		},
		"state": {
			"root": config.state_root,
			"fileExists": config.state_file().exists(),
			"version": state.version,
			"sessions": state.sessions.len(),
			"targets": state.targets.len(),
			"captures": state.captures.len(),
			"artifacts": state.artifacts.len(),
			"activeSessionId": state.active_session_id,
		},
		"lock": {
			"held": lock_path.exists(),
			"holder": lock,
		},
		"workspaceRoot": config.workspace_root,
	})
}

async fn run(store: &StateStore, args: &RunArgs, cli: &Cli, timeout: Duration) -> Result<Value> {
	let (raw, source) = load_plan_source(args)?;
	let value: Value = serde_json::from_str(&raw)
		.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("plan is not valid JSON: {e}")))?;
	let plan = if source == "replay" {
		let recorded = value
			.get("plan")
			.cloned()
			.ok_or_else(|| SwError::new(ErrorCode::QueryInvalid, "replay file carries no plan"))?;
		pipeline::Plan::parse(recorded)?
	} else {
		pipeline::Plan::parse(value)?
	};

	let record_path = if args.record {
		Some(match &args.record_path {
			Some(path) => path.to_string_lossy().to_string(),
			None => store
				.config()
				.state_root
				.join("records")
				.join(format!("run-{}.json", surfwright::util::now_ms()))
				.to_string_lossy()
				.to_string(),
		})
	} else {
		None
	};

	let options = pipeline::RunOptions {
		doctor: args.doctor,
		session_hint: cli.session.clone(),
		default_timeout: Some(timeout),
		record_path,
		record_label: args.record_label.clone(),
	};
	pipeline::run(store, &plan, &source, &options).await
}

fn load_plan_source(args: &RunArgs) -> Result<(String, String)> {
	if let Some(path) = &args.plan_path {
		return Ok((read_file(path)?, "plan-path".into()));
	}
	if let Some(json) = &args.plan_json {
		if json == "-" {
			return Ok((read_stdin()?, "stdin".into()));
		}
		return Ok((json.clone(), "plan-json".into()));
	}
	if let Some(path) = &args.replay_path {
		return Ok((read_file(path)?, "replay".into()));
	}
	Ok((read_stdin()?, "stdin".into()))
}

fn read_file(path: &PathBuf) -> Result<String> {
	std::fs::read_to_string(path)
		.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("cannot read plan {}: {e}", path.display())))
}

fn read_stdin() -> Result<String> {
	use std::io::Read;
	let mut raw = String::new();
	std::io::stdin()
		.read_to_string(&mut raw)
		.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("cannot read plan from stdin: {e}")))?;
	if raw.trim().is_empty() {
		return Err(SwError::new(
			ErrorCode::QueryInvalid,
			"no plan source; pass --plan-path, --plan-json, --replay-path, or pipe a plan to stdin",
		));
	}
	Ok(raw)
}

async fn network_worker(args: &NetworkWorkerArgs) -> Result<Value> {
	let config = Config::resolve(Some(args.state_dir.clone()))?;
	let store = StateStore::new(config);
	let options: net::CaptureOptions = serde_json::from_str(&args.options_json)
		.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("worker options do not parse: {e}")))?;
	let redactor = net::Redactor::new(&args.redact_patterns)?;
	net::run_worker(&store, &args.capture_id, options, redactor).await?;
	Ok(json!({ "worker": "done", "captureId": args.capture_id }))
}
