//! `open` and `target` subcommand dispatch.

use std::io::Write;
use std::time::Duration;

use serde_json::{Value, json};
use surfwright::actions::{
	self, ClickParams, ClickReadParams, CountParams, EmulateParams, EvalParams, ExtractParams, FillParams, FindParams,
	KeypressParams, OpenParams, ReadParams, ReuseMode, ScrollPlanParams, SelectOptionParams, SnapshotParams,
	TargetPruneParams, UploadParams, WaitParams,
};
use surfwright::error::{ErrorCode, Result, SwError};
use surfwright::net::{self, ArtifactPruneParams, NetworkFilters, NetworkParams, StatusFilter};
use surfwright::state::StateStore;

use super::action_env;
use crate::cli::{Cli, NetworkArgs, OpenArgs, QueryArgs, TargetAction};

fn find_params(query: &QueryArgs) -> FindParams {
	FindParams {
		text: query.text.clone(),
		selector: query.selector.clone(),
		contains: query.contains.clone(),
		visible_only: query.visible_only,
		limit: query.limit,
		first: query.first,
		href_host: query.href_host.clone(),
		href_path_prefix: query.href_path_prefix.clone(),
	}
}

fn network_params(args: &NetworkArgs) -> Result<NetworkParams> {
	let status = match &args.status {
		Some(raw) => Some(StatusFilter::parse(raw)?),
		None => None,
	};
	Ok(NetworkParams {
		profile: args.profile.parse()?,
		capture_ms: args.capture_ms,
		max_requests: args.max_requests,
		max_websockets: args.max_websockets,
		max_ws_messages: args.max_ws_messages,
		include_headers: args.include_headers,
		include_post_data: args.include_post_data,
		include_ws_messages: args.include_ws_messages,
		reload: args.reload,
		filters: NetworkFilters {
			url_contains: args.url_contains.clone(),
			method: args.method.clone(),
			resource_type: args.resource_type.clone(),
			status,
			failed_only: args.failed_only,
		},
		redact_patterns: args.redact_patterns.clone(),
		view: args.view.parse()?,
		fields: args.fields.clone(),
	})
}

pub async fn open(store: &StateStore, args: &OpenArgs, cli: &Cli, timeout: Duration) -> Result<Value> {
	let reuse = if args.reuse_url {
		ReuseMode::Url
	} else if args.reuse_origin {
		ReuseMode::Origin
	} else if args.reuse_active {
		ReuseMode::Active
	} else {
		ReuseMode::None
	};
	let wait_until = serde_json::from_value(json!(args.wait_until))
		.map_err(|_| SwError::new(ErrorCode::QueryInvalid, format!("unknown wait-until stage {:?}", args.wait_until)))?;
	let env = action_env(store, cli, None, timeout);
	let report = actions::open(
		&env,
		OpenParams {
			url: args.url.clone(),
			reuse,
			wait_until,
			proof: args.proof,
		},
	)
	.await?;

	if let Some(expected) = &args.assert_text {
		let env = action_env(store, cli, Some(report.target_id.clone()), timeout);
		let waited = actions::wait(
			&env,
			WaitParams {
				text: Some(expected.clone()),
				selector: None,
				network_idle: false,
			},
		)
		.await;
		if let Err(err) = waited {
			if err.code == ErrorCode::WaitTimeout {
				return Err(SwError::new(
					ErrorCode::AssertFailed,
					format!("page text does not contain {expected:?}"),
				));
			}
			return Err(err);
		}
	}
	Ok(serde_json::to_value(report)?)
}

pub async fn dispatch(store: &StateStore, action: &TargetAction, cli: &Cli, timeout: Duration) -> Result<Option<Value>> {
	let report = match action {
		TargetAction::List => serde_json::to_value(actions::list(&action_env(store, cli, None, timeout)).await?)?,
		TargetAction::Snapshot {
			target,
			selector,
			max_chars,
			max_headings,
			max_buttons,
			max_links,
			visible_only,
		} => {
			let defaults = SnapshotParams::default();
			let params = SnapshotParams {
				selector: selector.clone(),
				max_chars: max_chars.unwrap_or(defaults.max_chars),
				max_headings: max_headings.unwrap_or(defaults.max_headings),
				max_buttons: max_buttons.unwrap_or(defaults.max_buttons),
				max_links: max_links.unwrap_or(defaults.max_links),
				visible_only: visible_only.unwrap_or(defaults.visible_only),
			};
			serde_json::to_value(actions::snapshot(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Find { target, query } => serde_json::to_value(
			actions::find(&action_env(store, cli, target.clone(), timeout), find_params(query)).await?,
		)?,
		TargetAction::Read {
			target,
			selector,
			chunk_size,
			chunk_index,
		} => {
			let defaults = ReadParams::default();
			let params = ReadParams {
				selector: selector.clone(),
				chunk_size: chunk_size.unwrap_or(defaults.chunk_size),
				chunk_index: chunk_index.unwrap_or(defaults.chunk_index),
			};
			serde_json::to_value(actions::read(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Click {
			target,
			query,
			nth,
			index,
			wait_for_text,
			wait_for_selector,
			wait_network_idle,
			proof,
		} => {
			let params = ClickParams {
				query: find_params(query),
				nth: *nth,
				index: *index,
				wait_for_text: wait_for_text.clone(),
				wait_for_selector: wait_for_selector.clone(),
				wait_network_idle: *wait_network_idle,
				proof: *proof,
			};
			serde_json::to_value(actions::click(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::ClickRead {
			target,
			query,
			nth,
			wait_for_text,
			wait_for_selector,
			wait_network_idle,
			proof,
			chunk_size,
			chunk_index,
		} => {
			let read_defaults = ReadParams::default();
			let params = ClickReadParams {
				click: ClickParams {
					query: find_params(query),
					nth: *nth,
					index: None,
					wait_for_text: wait_for_text.clone(),
					wait_for_selector: wait_for_selector.clone(),
					wait_network_idle: *wait_network_idle,
					proof: *proof,
				},
				read: ReadParams {
					selector: None,
					chunk_size: chunk_size.unwrap_or(read_defaults.chunk_size),
					chunk_index: chunk_index.unwrap_or(read_defaults.chunk_index),
				},
			};
			serde_json::to_value(actions::click_read(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Fill {
			target,
			query,
			value,
			realistic_events,
		} => {
			let params = FillParams {
				query: find_params(query),
				value: Some(value.clone()),
				realistic_events: *realistic_events,
			};
			serde_json::to_value(actions::fill(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Upload { target, selector, files } => {
			let params = UploadParams {
				selector: selector.clone(),
				files: files.clone(),
			};
			serde_json::to_value(actions::upload(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Wait {
			target,
			text,
			selector,
			network_idle,
		} => {
			let params = WaitParams {
				text: text.clone(),
				selector: selector.clone(),
				network_idle: *network_idle,
			};
			serde_json::to_value(actions::wait(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Eval {
			target,
			expr,
			expression,
			script_path,
			arg_json,
			frame,
			capture_console,
			max_console_entries,
		} => {
			let params = EvalParams {
				expr: expr.clone(),
				expression: expression.clone(),
				script_path: script_path.clone(),
				arg_json: arg_json.clone(),
				frame: frame.clone(),
				capture_console: *capture_console,
				max_console_entries: *max_console_entries,
			};
			serde_json::to_value(actions::eval(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Extract {
			target,
			kind,
			frame_scope,
			schema,
			dedupe_by,
		} => {
			let kind = serde_json::from_value(json!(kind))
				.map_err(|_| SwError::new(ErrorCode::QueryInvalid, format!("unknown extract kind {kind:?}")))?;
			let schema = match schema {
				Some(raw) => Some(
					serde_json::from_str(raw)
						.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("schema is not a JSON object: {e}")))?,
				),
				None => None,
			};
			let params = ExtractParams {
				kind,
				frame_scope: frame_scope.parse()?,
				schema,
				dedupe_by: dedupe_by.clone(),
			};
			serde_json::to_value(actions::extract(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Keypress {
			target,
			key,
			selector,
			modifiers,
		} => {
			let params = KeypressParams {
				key: key.clone(),
				selector: selector.clone(),
				modifiers: modifiers.clone(),
			};
			serde_json::to_value(actions::keypress(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::SelectOption {
			target,
			selector,
			value,
			label,
			index,
		} => {
			let params = SelectOptionParams {
				selector: selector.clone(),
				value: value.clone(),
				label: label.clone(),
				index: *index,
			};
			serde_json::to_value(actions::select_option(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Screenshot {
			target,
			out,
			format,
			quality,
			full_page,
			selector,
		} => {
			let params = serde_json::from_value(json!({
				"out": out,
				"format": format,
				"quality": quality,
				"fullPage": full_page,
				"selector": selector,
			}))
			.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("screenshot args: {e}")))?;
			serde_json::to_value(actions::screenshot(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Emulate {
			target,
			user_agent,
			width,
			height,
			device_scale_factor,
			mobile,
			touch,
		} => {
			let params = EmulateParams {
				user_agent: user_agent.clone(),
				width: *width,
				height: *height,
				device_scale_factor: *device_scale_factor,
				mobile: *mobile,
				touch: *touch,
			};
			serde_json::to_value(actions::emulate(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Close { target } => {
			serde_json::to_value(actions::target_close(&action_env(store, cli, None, timeout), target).await?)?
		}
		TargetAction::Count { target, selector } => {
			let params = CountParams {
				selector: selector.clone(),
			};
			serde_json::to_value(actions::count(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::ScrollPlan { target, overlap } => {
			let params = ScrollPlanParams {
				overlap: overlap.unwrap_or(ScrollPlanParams::default().overlap),
			};
			serde_json::to_value(actions::scroll_plan(&action_env(store, cli, target.clone(), timeout), params).await?)?
		}
		TargetAction::Frames { target } => {
			serde_json::to_value(actions::frames(&action_env(store, cli, target.clone(), timeout)).await?)?
		}
		TargetAction::Network { target, network } => {
			let params = network_params(network)?;
			net::capture_sync(&action_env(store, cli, target.clone(), timeout), params).await?
		}
		TargetAction::NetworkTail { target, network } => {
			let params = network_params(network)?;
			let env = action_env(store, cli, target.clone(), timeout);
			let stdout = std::io::stdout();
			let mut sink = move |line: Value| -> bool {
				let mut handle = stdout.lock();
				writeln!(handle, "{line}").is_ok()
			};
			net::tail(&env, params, &mut sink).await?;
			return Ok(None);
		}
		TargetAction::NetworkQuery { handle, network } => {
			let params = network_params(network)?;
			net::query(store, handle, &params)?
		}
		TargetAction::NetworkExport { target, out, from, network } => {
			let params = network_params(network)?;
			let env = action_env(store, cli, target.clone(), timeout);
			net::export(&env, out, from.as_deref(), params).await?
		}
		TargetAction::NetworkExportList => {
			let state = store.read();
			let artifacts: Vec<_> = state.artifacts.values().collect();
			json!({ "artifacts": artifacts, "count": artifacts.len() })
		}
		TargetAction::NetworkExportPrune {
			max_age_ms,
			max_count,
			max_total_bytes,
			keep_files,
		} => serde_json::to_value(net::prune_artifacts(
			store,
			ArtifactPruneParams {
				max_age_ms: *max_age_ms,
				max_count: *max_count,
				max_total_bytes: *max_total_bytes,
				keep_files: *keep_files,
			},
		)?)?,
		TargetAction::NetworkBegin {
			target,
			network,
			max_runtime_ms,
		} => {
			let params = network_params(network)?;
			let env = action_env(store, cli, target.clone(), timeout);
			net::begin(&env, params, *max_runtime_ms).await?
		}
		TargetAction::NetworkEnd {
			capture_id,
			network,
			wait_ms,
		} => {
			let params = network_params(network)?;
			net::end(store, capture_id, &params, *wait_ms).await?
		}
		TargetAction::NetworkCheck {
			target,
			budget_path,
			budget_json,
			from,
			network,
		} => {
			let budget = match (budget_path, budget_json) {
				(Some(path), None) => serde_json::from_str(&std::fs::read_to_string(path).map_err(|e| {
					SwError::new(ErrorCode::QueryInvalid, format!("cannot read budget {path}: {e}"))
				})?)
				.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("budget is not valid JSON: {e}")))?,
				(None, Some(inline)) => serde_json::from_str(inline)
					.map_err(|e| SwError::new(ErrorCode::QueryInvalid, format!("budget is not valid JSON: {e}")))?,
				_ => {
					return Err(SwError::new(
						ErrorCode::QueryInvalid,
						"exactly one of --budget-path or --budget-json is required",
					));
				}
			};
			let params = network_params(network)?;
			let env = action_env(store, cli, target.clone(), timeout);
			net::check(&env, &budget, from.as_deref(), params).await?
		}
		TargetAction::Prune {
			max_age_ms,
			max_per_session,
		} => {
			let defaults = TargetPruneParams::default();
			serde_json::to_value(actions::target_prune(
				store,
				TargetPruneParams {
					max_age_ms: max_age_ms.unwrap_or(defaults.max_age_ms),
					max_per_session: max_per_session.unwrap_or(defaults.max_per_session),
				},
			)?)?
		}
	};
	Ok(Some(report))
}
