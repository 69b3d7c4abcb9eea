//! Managed browser launch and process helpers.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::discovery::find_browser_executable;
use crate::config::Config;
use crate::error::{ErrorCode, Result, SwError};
use crate::state::BrowserMode;

/// Allocate a free TCP port by binding to an ephemeral port and releasing it.
pub fn allocate_debug_port() -> Result<u16> {
	let listener = std::net::TcpListener::bind("127.0.0.1:0")
		.map_err(|e| SwError::new(ErrorCode::BrowserStartFailed, format!("port allocation failed: {e}")))?;
	let port = listener
		.local_addr()
		.map_err(|e| SwError::new(ErrorCode::BrowserStartFailed, format!("port allocation failed: {e}")))?
		.port();
	drop(listener);
	Ok(port)
}

/// Outcome of a successful managed launch.
#[derive(Debug)]
pub struct LaunchedBrowser {
	pub pid: u32,
	pub debug_port: u16,
	pub cdp_origin: String,
}

/// Spawn the browser detached and poll its CDP endpoint until ready.
///
/// On a ready-timeout the spawned process is killed and the launch retried
/// once on a freshly allocated port before `E_BROWSER_START_TIMEOUT`
/// surfaces.
pub async fn launch_managed(config: &Config, user_data_dir: &Path, mode: BrowserMode, port: Option<u16>) -> Result<LaunchedBrowser> {
	let executable = find_browser_executable()?;
	let first_port = match port {
		Some(port) => port,
		None => allocate_debug_port()?,
	};

	match launch_once(config, &executable, user_data_dir, mode, first_port).await {
		Ok(launched) => Ok(launched),
		// A stale port can be both slow (ready-timeout) and taken (early
		// exit); either way, one retry on a fresh port.
		Err(err) if matches!(err.code, ErrorCode::BrowserStartTimeout | ErrorCode::BrowserStartFailed) => {
			warn!(target = "surfwright.session", port = first_port, "browser did not come up; retrying on a fresh port");
			let retry_port = allocate_debug_port()?;
			launch_once(config, &executable, user_data_dir, mode, retry_port).await
		}
		Err(err) => Err(err),
	}
}

async fn launch_once(config: &Config, executable: &str, user_data_dir: &Path, mode: BrowserMode, port: u16) -> Result<LaunchedBrowser> {
	std::fs::create_dir_all(user_data_dir)?;

	let mut command = std::process::Command::new(executable);
	command
		.arg(format!("--remote-debugging-port={port}"))
		.arg(format!("--user-data-dir={}", user_data_dir.display()))
		.arg("--no-first-run")
		.arg("--no-default-browser-check");
	if mode != BrowserMode::Headed {
		command.arg("--headless=new");
	}
	command.arg("about:blank");
	command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
	#[cfg(unix)]
	std::os::unix::process::CommandExt::process_group(&mut command, 0);

	let mut child = command
		.spawn()
		.map_err(|e| SwError::new(ErrorCode::BrowserStartFailed, format!("failed to spawn {executable}: {e}")))?;
	let pid = child.id();
	let origin = format!("http://127.0.0.1:{port}");
	debug!(target = "surfwright.session", pid, port, "browser spawned; polling for readiness");

	let deadline = Instant::now() + config.tunables.launch_ready;
	loop {
		tokio::time::sleep(Duration::from_millis(200)).await;

		if let Ok(Some(status)) = child.try_wait() {
			return Err(SwError::new(
				ErrorCode::BrowserStartFailed,
				format!("browser exited during startup with {status}"),
			));
		}

		if surfwright_runtime::probe_reachable(&origin, config.tunables.probe_primary, None)
			.await
			.is_ok()
		{
			return Ok(LaunchedBrowser {
				pid,
				debug_port: port,
				cdp_origin: origin,
			});
		}

		if Instant::now() >= deadline {
			let _ = child.kill();
			let _ = child.wait();
			return Err(SwError::new(
				ErrorCode::BrowserStartTimeout,
				format!(
					"browser on port {port} not ready within {}ms",
					config.tunables.launch_ready.as_millis()
				),
			));
		}
	}
}

/// True when a process with `pid` appears alive on this platform.
pub fn pid_is_alive(pid: u32) -> bool {
	#[cfg(unix)]
	{
		if pid == 0 {
			return false;
		}
		if Path::new("/proc").join(pid.to_string()).exists() {
			return true;
		}
		std::process::Command::new("kill")
			.arg("-0")
			.arg(pid.to_string())
			.status()
			.map(|status| status.success())
			.unwrap_or(pid == std::process::id())
	}

	#[cfg(windows)]
	{
		let filter = format!("PID eq {pid}");
		std::process::Command::new("tasklist")
			.args(["/FI", &filter, "/FO", "CSV", "/NH"])
			.output()
			.map(|output| String::from_utf8_lossy(&output.stdout).contains(&format!("\"{pid}\"")))
			.unwrap_or(false)
	}
}

/// Best-effort TERM of a managed browser process.
pub fn terminate_pid(pid: u32) -> bool {
	#[cfg(unix)]
	{
		std::process::Command::new("kill")
			.args(["-TERM", &pid.to_string()])
			.status()
			.map(|status| status.success())
			.unwrap_or(false)
	}

	#[cfg(windows)]
	{
		std::process::Command::new("taskkill")
			.args(["/PID", &pid.to_string(), "/T", "/F"])
			.status()
			.map(|status| status.success())
			.unwrap_or(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allocated_ports_are_distinct_and_nonzero() {
		let a = allocate_debug_port().unwrap();
		let b = allocate_debug_port().unwrap();
		assert!(a > 0);
		// Extremely unlikely to collide back-to-back; both must be bindable.
		assert!(b > 0);
	}

	#[test]
	fn own_pid_is_alive_and_zero_is_not() {
		assert!(pid_is_alive(std::process::id()));
		#[cfg(unix)]
		assert!(!pid_is_alive(0));
	}
}
