//! Screenshot capture and device emulation.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::json;
use surfwright_protocol::cdp::LayoutMetrics;

use super::{ActionEnv, finish, prologue, quick_eval};
use crate::error::{Result, SwError};
use crate::report::ActionReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
	#[default]
	Png,
	Jpeg,
}

impl ImageFormat {
	fn as_str(&self) -> &'static str {
		match self {
			ImageFormat::Png => "png",
			ImageFormat::Jpeg => "jpeg",
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotParams {
	pub out: String,
	#[serde(default)]
	pub format: ImageFormat,
	#[serde(default)]
	pub quality: Option<u8>,
	#[serde(default)]
	pub full_page: bool,
	/// Clip to the first element matching this selector.
	#[serde(default)]
	pub selector: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotPayload {
	pub path: String,
	pub bytes: u64,
	pub format: ImageFormat,
	pub full_page: bool,
}

/// Capture the viewport, the full page, or one element.
pub async fn screenshot(env: &ActionEnv<'_>, params: ScreenshotParams) -> Result<ActionReport<ScreenshotPayload>> {
	let scope = prologue(env).await?;
	let timeout = env.timeout;
	let conn = &scope.page.conn;

	let mut capture = json!({ "format": params.format.as_str() });
	if params.format == ImageFormat::Jpeg {
		capture["quality"] = json!(params.quality.unwrap_or(80).min(100));
	}

	let mut metrics_overridden = false;
	if params.full_page {
		let metrics = conn.call("Page.getLayoutMetrics", json!({}), timeout).await?;
		let metrics: LayoutMetrics = serde_json::from_value(metrics)?;
		if let Some(size) = metrics.css_content_size {
			conn.call(
				"Emulation.setDeviceMetricsOverride",
				json!({
					"width": size.width.ceil() as i64,
					"height": size.height.ceil() as i64,
					"deviceScaleFactor": 1,
					"mobile": false,
				}),
				timeout,
			)
			.await?;
			metrics_overridden = true;
		}
	} else if let Some(selector) = &params.selector {
		let expression = format!(
			"(() => {{ const el = document.querySelector({sel}); if (!el) return null; const r = el.getBoundingClientRect(); \
			 return {{ x: r.x, y: r.y, width: r.width, height: r.height }}; }})()",
			sel = serde_json::to_string(selector)?,
		);
		let rect = quick_eval(conn, &expression, timeout).await?;
		if rect.is_null() {
			return Err(SwError::new(
				crate::error::ErrorCode::TargetNotFound,
				format!("no element matched {selector:?} for screenshot clip"),
			));
		}
		capture["clip"] = json!({
			"x": rect["x"], "y": rect["y"],
			"width": rect["width"], "height": rect["height"],
			"scale": 1,
		});
	}

	let result = conn.call("Page.captureScreenshot", capture, timeout).await;
	if metrics_overridden {
		let _ = conn.call("Emulation.clearDeviceMetricsOverride", json!({}), timeout).await;
	}
	let result = result?;

	let data = result
		.get("data")
		.and_then(|v| v.as_str())
		.ok_or_else(|| SwError::internal("Page.captureScreenshot returned no data"))?;
	let bytes = BASE64
		.decode(data)
		.map_err(|e| SwError::internal(format!("screenshot payload was not base64: {e}")))?;
	let byte_count = bytes.len() as u64;
	if let Some(parent) = std::path::Path::new(&params.out).parent() {
		if !parent.as_os_str().is_empty() {
			std::fs::create_dir_all(parent)?;
		}
	}
	std::fs::write(&params.out, bytes)?;

	finish(
		env,
		scope,
		"screenshot",
		ScreenshotPayload {
			path: params.out,
			bytes: byte_count,
			format: params.format,
			full_page: params.full_page,
		},
	)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmulateParams {
	pub user_agent: Option<String>,
	pub width: Option<i64>,
	pub height: Option<i64>,
	pub device_scale_factor: Option<f64>,
	pub mobile: bool,
	pub touch: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmulatePayload {
	pub user_agent_set: bool,
	pub metrics_set: bool,
	pub touch_set: bool,
}

/// Apply user-agent, viewport, and touch emulation overrides.
pub async fn emulate(env: &ActionEnv<'_>, params: EmulateParams) -> Result<ActionReport<EmulatePayload>> {
	if params.user_agent.is_none() && params.width.is_none() && params.height.is_none() && params.touch.is_none() {
		return Err(SwError::query("emulate needs at least one of --user-agent, --width/--height, or --touch"));
	}
	if params.width.is_some() != params.height.is_some() {
		return Err(SwError::query("--width and --height must be set together"));
	}
	let scope = prologue(env).await?;
	let timeout = env.timeout;
	let conn = &scope.page.conn;

	let mut payload = EmulatePayload {
		user_agent_set: false,
		metrics_set: false,
		touch_set: false,
	};
	if let Some(user_agent) = &params.user_agent {
		conn.call("Emulation.setUserAgentOverride", json!({ "userAgent": user_agent }), timeout)
			.await?;
		payload.user_agent_set = true;
	}
	if let (Some(width), Some(height)) = (params.width, params.height) {
		conn.call(
			"Emulation.setDeviceMetricsOverride",
			json!({
				"width": width,
				"height": height,
				"deviceScaleFactor": params.device_scale_factor.unwrap_or(1.0),
				"mobile": params.mobile,
			}),
			timeout,
		)
		.await?;
		payload.metrics_set = true;
	}
	if let Some(touch) = params.touch {
		conn.call("Emulation.setTouchEmulationEnabled", json!({ "enabled": touch }), timeout)
			.await?;
		payload.touch_set = true;
	}

	finish(env, scope, "emulate", payload)
}
