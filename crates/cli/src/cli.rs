//! Command tree of the stable contract surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Root CLI. Every command emits one JSON object on stdout.
#[derive(Parser, Debug)]
#[command(name = "surfwright")]
#[command(about = "Deterministic browser automation over CDP with a JSON contract")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug); diagnostics go to stderr.
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Pretty-print the JSON report.
	#[arg(long, global = true)]
	pub pretty: bool,

	/// Accepted for compatibility; output is always JSON.
	#[arg(long, global = true)]
	pub json: bool,

	/// Session id to run against.
	#[arg(long, global = true, value_name = "ID")]
	pub session: Option<String>,

	/// Per-command deadline in milliseconds.
	#[arg(long, global = true, value_name = "MS", default_value = "15000")]
	pub timeout_ms: u64,

	/// Override the state root (else SURFWRIGHT_STATE_DIR, else platform default).
	#[arg(long, global = true, value_name = "DIR")]
	pub state_dir: Option<PathBuf>,

	/// Report shape: compact (default) or full (adds the resolved invocation config).
	#[arg(long, global = true, value_name = "SHAPE", default_value = "compact")]
	pub output_shape: String,

	/// Skip the post-action state write (no target snapshot, no heartbeat).
	#[arg(long, global = true)]
	pub no_persist: bool,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Check browser discovery and state-store health.
	Doctor,
	/// Emit the machine-readable command contract.
	Contract,
	/// Manage browser sessions.
	Session {
		#[command(subcommand)]
		action: SessionAction,
	},
	/// Open a URL in a session.
	Open(OpenArgs),
	/// Operate on page targets.
	Target {
		#[command(subcommand)]
		action: TargetAction,
	},
	/// Maintain the on-disk state.
	State {
		#[command(subcommand)]
		action: StateAction,
	},
	/// Execute a declarative pipeline plan.
	Run(RunArgs),
	/// Internal: detached network-capture worker.
	#[command(hide = true)]
	NetworkWorker(NetworkWorkerArgs),
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
	/// Ensure the implicit managed session exists and is reachable.
	Ensure,
	/// Launch a new managed session.
	New {
		/// Session id; allocated when omitted.
		#[arg(value_name = "ID")]
		id: Option<String>,
		/// Lease policy.
		#[arg(long, value_name = "POLICY", default_value = "ephemeral")]
		policy: String,
		/// Launch headed instead of headless.
		#[arg(long)]
		headed: bool,
		/// Explicit lease TTL override.
		#[arg(long, value_name = "MS")]
		lease_ttl_ms: Option<u64>,
	},
	/// Attach to an existing CDP endpoint.
	Attach {
		#[arg(value_name = "ID")]
		id: String,
		/// http(s) origin of the debug endpoint, credential-free.
		#[arg(long, value_name = "ORIGIN")]
		cdp: String,
		#[arg(long, value_name = "MS")]
		lease_ttl_ms: Option<u64>,
	},
	/// Set (or clear) the active session.
	Use {
		#[arg(value_name = "ID")]
		id: Option<String>,
		/// Clear the active pointer instead of setting it.
		#[arg(long)]
		clear: bool,
	},
	/// List known sessions.
	List {
		/// Probe each session's endpoint for reachability.
		#[arg(long)]
		probe: bool,
	},
	/// Remove abandoned sessions.
	Prune {
		/// Drop managed-unreachable sessions immediately.
		#[arg(long)]
		drop_managed_unreachable: bool,
	},
	/// Remove all sessions.
	Clear {
		/// Leave managed browser processes running.
		#[arg(long)]
		keep_processes: bool,
	},
}

#[derive(Args, Debug)]
pub struct OpenArgs {
	#[arg(value_name = "URL")]
	pub url: String,
	/// Reuse a page already at this exact URL.
	#[arg(long, conflicts_with_all = ["reuse_origin", "reuse_active"])]
	pub reuse_url: bool,
	/// Reuse a page on the same origin and navigate it.
	#[arg(long, conflicts_with_all = ["reuse_url", "reuse_active"])]
	pub reuse_origin: bool,
	/// Navigate the current page.
	#[arg(long, conflicts_with_all = ["reuse_url", "reuse_origin"])]
	pub reuse_active: bool,
	/// Readiness to wait for: commit|domcontentloaded|load|networkidle.
	#[arg(long, value_name = "STAGE", default_value = "load")]
	pub wait_until: String,
	/// Include a proof envelope in the report.
	#[arg(long)]
	pub proof: bool,
	/// Require the final page text to contain this string.
	#[arg(long, value_name = "TEXT")]
	pub assert_text: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
	/// Text query (innermost matching element).
	#[arg(long, value_name = "TEXT")]
	pub text: Option<String>,
	/// CSS selector query.
	#[arg(long, short = 's', value_name = "SELECTOR")]
	pub selector: Option<String>,
	/// Substring query, alone or refining a selector.
	#[arg(long, value_name = "TEXT")]
	pub contains: Option<String>,
	/// Include hidden elements.
	#[arg(long, value_name = "BOOL")]
	pub visible_only: Option<bool>,
	#[arg(long, value_name = "N")]
	pub limit: Option<usize>,
	/// Force limit to 1.
	#[arg(long)]
	pub first: bool,
	/// Keep only links on this host.
	#[arg(long, value_name = "HOST")]
	pub href_host: Option<String>,
	/// Keep only links whose path starts with this prefix.
	#[arg(long, value_name = "PREFIX")]
	pub href_path_prefix: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct NetworkArgs {
	/// Capture profile: custom|api|page|ws|perf.
	#[arg(long, value_name = "NAME", default_value = "custom")]
	pub profile: String,
	#[arg(long, value_name = "MS")]
	pub capture_ms: Option<u64>,
	#[arg(long, value_name = "N")]
	pub max_requests: Option<usize>,
	#[arg(long, value_name = "N")]
	pub max_websockets: Option<usize>,
	#[arg(long, value_name = "N")]
	pub max_ws_messages: Option<usize>,
	#[arg(long, value_name = "BOOL")]
	pub include_headers: Option<bool>,
	#[arg(long, value_name = "BOOL")]
	pub include_post_data: Option<bool>,
	#[arg(long, value_name = "BOOL")]
	pub include_ws_messages: Option<bool>,
	/// Reload the page before capturing.
	#[arg(long, value_name = "BOOL")]
	pub reload: Option<bool>,
	/// Keep only requests whose URL contains this substring.
	#[arg(long, value_name = "TEXT")]
	pub url_contains: Option<String>,
	#[arg(long, value_name = "METHOD")]
	pub method: Option<String>,
	#[arg(long, value_name = "TYPE")]
	pub resource_type: Option<String>,
	/// Exact status (e.g. 404) or class (e.g. 4xx).
	#[arg(long, value_name = "STATUS")]
	pub status: Option<String>,
	#[arg(long)]
	pub failed_only: bool,
	/// Additional redaction regexes (max 8).
	#[arg(long = "redact", value_name = "REGEX")]
	pub redact_patterns: Vec<String>,
	/// View: raw|summary|table.
	#[arg(long, value_name = "VIEW", default_value = "summary")]
	pub view: String,
	/// Table fields (comma-separated).
	#[arg(long, value_name = "FIELDS", value_delimiter = ',')]
	pub fields: Option<Vec<String>>,
}

#[derive(Subcommand, Debug)]
pub enum TargetAction {
	/// Enumerate live targets.
	List,
	/// Bounded sample of a scope.
	Snapshot {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[arg(long, short = 's', value_name = "SELECTOR")]
		selector: Option<String>,
		#[arg(long, value_name = "N")]
		max_chars: Option<usize>,
		#[arg(long, value_name = "N")]
		max_headings: Option<usize>,
		#[arg(long, value_name = "N")]
		max_buttons: Option<usize>,
		#[arg(long, value_name = "N")]
		max_links: Option<usize>,
		#[arg(long, value_name = "BOOL")]
		visible_only: Option<bool>,
	},
	/// Locate elements.
	Find {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[command(flatten)]
		query: QueryArgs,
	},
	/// Chunked text extraction.
	Read {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[arg(long, short = 's', value_name = "SELECTOR")]
		selector: Option<String>,
		#[arg(long, value_name = "N")]
		chunk_size: Option<usize>,
		#[arg(long, value_name = "N")]
		chunk_index: Option<usize>,
	},
	/// Click the first matching element.
	Click {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[command(flatten)]
		query: QueryArgs,
		#[arg(long, value_name = "N")]
		nth: Option<usize>,
		#[arg(long, value_name = "N")]
		index: Option<usize>,
		#[arg(long, value_name = "TEXT")]
		wait_for_text: Option<String>,
		#[arg(long, value_name = "SELECTOR")]
		wait_for_selector: Option<String>,
		#[arg(long)]
		wait_network_idle: bool,
		#[arg(long)]
		proof: bool,
	},
	/// Click, then read the resulting page.
	ClickRead {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[command(flatten)]
		query: QueryArgs,
		#[arg(long, value_name = "N")]
		nth: Option<usize>,
		#[arg(long, value_name = "TEXT")]
		wait_for_text: Option<String>,
		#[arg(long, value_name = "SELECTOR")]
		wait_for_selector: Option<String>,
		#[arg(long)]
		wait_network_idle: bool,
		#[arg(long)]
		proof: bool,
		#[arg(long, value_name = "N")]
		chunk_size: Option<usize>,
		#[arg(long, value_name = "N")]
		chunk_index: Option<usize>,
	},
	/// Type into an element.
	Fill {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[command(flatten)]
		query: QueryArgs,
		#[arg(long, value_name = "TEXT")]
		value: String,
		/// Dispatch realistic key events around the input.
		#[arg(long)]
		realistic_events: bool,
	},
	/// Attach files to a file input.
	Upload {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[arg(long, short = 's', value_name = "SELECTOR")]
		selector: String,
		#[arg(long = "file", value_name = "PATH", required = true)]
		files: Vec<String>,
	},
	/// Wait for a condition.
	Wait {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[arg(long, value_name = "TEXT")]
		text: Option<String>,
		#[arg(long, value_name = "SELECTOR")]
		selector: Option<String>,
		#[arg(long)]
		network_idle: bool,
	},
	/// Evaluate bounded JavaScript in the page's main world.
	Eval {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		/// Inline expression, wrapped as `return (<expr>);`.
		#[arg(long, value_name = "EXPR")]
		expr: Option<String>,
		/// Inline function body.
		#[arg(long, value_name = "BODY")]
		expression: Option<String>,
		/// Script file containing a function body.
		#[arg(long, value_name = "FILE")]
		script_path: Option<String>,
		/// JSON passed as the sole argument (max 20 KiB).
		#[arg(long, value_name = "JSON")]
		arg_json: Option<String>,
		/// Frame handle (f-0, f-1, ...).
		#[arg(long, value_name = "FRAME")]
		frame: Option<String>,
		#[arg(long)]
		capture_console: bool,
		#[arg(long, value_name = "N")]
		max_console_entries: Option<usize>,
	},
	/// Kind-driven structured extraction.
	Extract {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		/// generic|blog|news|docs|docs-commands|command-lines|headings|links|codeblocks|forms|tables|table-rows.
		#[arg(long, value_name = "KIND")]
		kind: String,
		/// Frame scope: main|all.
		#[arg(long, value_name = "SCOPE", default_value = "main")]
		frame_scope: String,
		/// Output schema as JSON: field -> record path.
		#[arg(long, value_name = "JSON")]
		schema: Option<String>,
		#[arg(long, value_name = "FIELD")]
		dedupe_by: Option<String>,
	},
	/// Dispatch a key event.
	Keypress {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[arg(long, value_name = "KEY")]
		key: String,
		#[arg(long, short = 's', value_name = "SELECTOR")]
		selector: Option<String>,
		/// alt|control|meta|shift, repeatable.
		#[arg(long = "modifier", value_name = "MOD")]
		modifiers: Vec<String>,
	},
	/// Select an option in a <select>.
	SelectOption {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[arg(long, short = 's', value_name = "SELECTOR")]
		selector: String,
		#[arg(long, value_name = "VALUE")]
		value: Option<String>,
		#[arg(long, value_name = "LABEL")]
		label: Option<String>,
		#[arg(long, value_name = "N")]
		index: Option<usize>,
	},
	/// Capture a screenshot.
	Screenshot {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[arg(long, value_name = "FILE")]
		out: String,
		/// png|jpeg.
		#[arg(long, value_name = "FORMAT", default_value = "png")]
		format: String,
		#[arg(long, value_name = "N")]
		quality: Option<u8>,
		#[arg(long)]
		full_page: bool,
		#[arg(long, short = 's', value_name = "SELECTOR")]
		selector: Option<String>,
	},
	/// Apply emulation overrides.
	Emulate {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[arg(long, value_name = "UA")]
		user_agent: Option<String>,
		#[arg(long, value_name = "PX")]
		width: Option<i64>,
		#[arg(long, value_name = "PX")]
		height: Option<i64>,
		#[arg(long, value_name = "F")]
		device_scale_factor: Option<f64>,
		#[arg(long)]
		mobile: bool,
		#[arg(long, value_name = "BOOL")]
		touch: Option<bool>,
	},
	/// Close a target.
	Close {
		#[arg(value_name = "TARGET")]
		target: String,
	},
	/// Count elements matching a selector.
	Count {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[arg(long, short = 's', value_name = "SELECTOR")]
		selector: String,
	},
	/// Plan scroll offsets tiling the page.
	ScrollPlan {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[arg(long, value_name = "FRACTION")]
		overlap: Option<f64>,
	},
	/// List the frame tree.
	Frames {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
	},
	/// Synchronous network capture on the current page.
	Network {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[command(flatten)]
		network: NetworkArgs,
	},
	/// Stream capture events as NDJSON.
	NetworkTail {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[command(flatten)]
		network: NetworkArgs,
	},
	/// Re-project a saved capture or artifact.
	NetworkQuery {
		/// Capture id (c-<n>) or artifact id (na-<n>).
		#[arg(value_name = "HANDLE")]
		handle: String,
		#[command(flatten)]
		network: NetworkArgs,
	},
	/// Export a capture as HAR and index it.
	NetworkExport {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[arg(long, value_name = "FILE")]
		out: String,
		/// Export a saved capture/artifact instead of capturing live.
		#[arg(long, value_name = "HANDLE")]
		from: Option<String>,
		#[command(flatten)]
		network: NetworkArgs,
	},
	/// List indexed network artifacts.
	NetworkExportList,
	/// Prune the artifact index.
	NetworkExportPrune {
		#[arg(long, value_name = "MS")]
		max_age_ms: Option<u64>,
		#[arg(long, value_name = "N")]
		max_count: Option<usize>,
		#[arg(long, value_name = "BYTES")]
		max_total_bytes: Option<u64>,
		/// Keep files on disk for evicted entries.
		#[arg(long)]
		keep_files: bool,
	},
	/// Start a background capture.
	NetworkBegin {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		#[command(flatten)]
		network: NetworkArgs,
		#[arg(long, value_name = "MS")]
		max_runtime_ms: Option<u64>,
	},
	/// Stop a background capture and project its result.
	NetworkEnd {
		#[arg(value_name = "CAPTURE")]
		capture_id: String,
		#[command(flatten)]
		network: NetworkArgs,
		/// How long to wait for the worker to finish.
		#[arg(long, value_name = "MS", default_value = "10000")]
		wait_ms: u64,
	},
	/// Check a capture against a budget document.
	NetworkCheck {
		#[arg(value_name = "TARGET")]
		target: Option<String>,
		/// Budget JSON file.
		#[arg(long, value_name = "FILE")]
		budget_path: Option<String>,
		/// Budget JSON inline.
		#[arg(long, value_name = "JSON")]
		budget_json: Option<String>,
		/// Check a saved capture/artifact instead of capturing live.
		#[arg(long, value_name = "HANDLE")]
		from: Option<String>,
		#[command(flatten)]
		network: NetworkArgs,
	},
	/// Prune persisted target snapshots.
	Prune {
		#[arg(long, value_name = "MS")]
		max_age_ms: Option<u64>,
		#[arg(long, value_name = "N")]
		max_per_session: Option<usize>,
	},
}

#[derive(Subcommand, Debug)]
pub enum StateAction {
	/// Restore cross-entity invariants of the state document.
	Reconcile,
	/// Remove files the state no longer references.
	DiskPrune,
}

#[derive(Args, Debug)]
pub struct RunArgs {
	/// Plan file.
	#[arg(long, value_name = "FILE", conflicts_with_all = ["plan_json", "replay_path"])]
	pub plan_path: Option<PathBuf>,
	/// Plan JSON inline ("-" reads stdin).
	#[arg(long, value_name = "JSON", conflicts_with_all = ["plan_path", "replay_path"])]
	pub plan_json: Option<String>,
	/// Replay a recorded run.
	#[arg(long, value_name = "FILE", conflicts_with_all = ["plan_path", "plan_json"])]
	pub replay_path: Option<PathBuf>,
	/// Lint only; do not execute.
	#[arg(long)]
	pub doctor: bool,
	/// Record the run as a replayable artifact.
	#[arg(long)]
	pub record: bool,
	#[arg(long, value_name = "FILE", requires = "record")]
	pub record_path: Option<PathBuf>,
	#[arg(long, value_name = "LABEL", requires = "record")]
	pub record_label: Option<String>,
}

#[derive(Args, Debug)]
pub struct NetworkWorkerArgs {
	#[arg(long, value_name = "ID")]
	pub capture_id: String,
	#[arg(long, value_name = "DIR")]
	pub state_dir: PathBuf,
	#[arg(long, value_name = "JSON")]
	pub options_json: String,
	#[arg(long = "redact", value_name = "REGEX")]
	pub redact_patterns: Vec<String>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn command_tree_is_well_formed() {
		Cli::command().debug_assert();
	}

	#[test]
	fn open_reuse_flags_conflict() {
		let parsed = Cli::try_parse_from(["surfwright", "open", "https://example.com", "--reuse-url", "--reuse-origin"]);
		assert!(parsed.is_err());
	}

	#[test]
	fn run_sources_conflict() {
		let parsed = Cli::try_parse_from(["surfwright", "run", "--plan-json", "[]", "--plan-path", "p.json"]);
		assert!(parsed.is_err());
	}

	#[test]
	fn global_flags_parse_anywhere() {
		let parsed = Cli::try_parse_from([
			"surfwright",
			"target",
			"snapshot",
			"T1",
			"--session",
			"s-2",
			"--timeout-ms",
			"5000",
			"--pretty",
		])
		.unwrap();
		assert_eq!(parsed.session.as_deref(), Some("s-2"));
		assert_eq!(parsed.timeout_ms, 5000);
		assert!(parsed.pretty);
	}

	#[test]
	fn network_fields_split_on_commas() {
		let parsed = Cli::try_parse_from([
			"surfwright",
			"target",
			"network",
			"--view",
			"table",
			"--fields",
			"id,url,status",
		])
		.unwrap();
		let Commands::Target {
			action: TargetAction::Network { network, .. },
		} = parsed.command
		else {
			panic!("wrong variant");
		};
		assert_eq!(network.fields.unwrap(), vec!["id", "url", "status"]);
	}
}
