//! Browser executable discovery.
//!
//! An ordered, platform-specific candidate list; the first candidate that
//! exists (absolute path) or resolves on PATH wins.

use std::path::{Path, PathBuf};

use crate::error::{ErrorCode, Result, SwError};

/// Locate a Chromium-family executable, or fail with `E_BROWSER_NOT_FOUND`.
pub fn find_browser_executable() -> Result<String> {
	find_in(&candidates()).ok_or_else(|| {
		SwError::new(
			ErrorCode::BrowserNotFound,
			"no Chrome/Chromium/Edge/Brave executable found",
		)
		.with_hint("install a Chromium-based browser or attach to a running one with `session attach`")
	})
}

fn candidates() -> Vec<String> {
	if cfg!(target_os = "macos") {
		vec![
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
			"/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
			"/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	} else if cfg!(target_os = "windows") {
		windows_candidates()
	} else {
		vec![
			"google-chrome-stable",
			"google-chrome",
			"chromium-browser",
			"chromium",
			"microsoft-edge",
			"brave-browser",
			"/usr/bin/google-chrome-stable",
			"/usr/bin/google-chrome",
			"/usr/bin/chromium-browser",
			"/usr/bin/chromium",
			"/snap/bin/chromium",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	}
}

fn windows_candidates() -> Vec<String> {
	let mut roots = Vec::new();
	for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
		if let Ok(value) = std::env::var(key) {
			roots.push(PathBuf::from(value));
		}
	}
	if roots.is_empty() {
		roots.push(PathBuf::from(r"C:\Program Files"));
		roots.push(PathBuf::from(r"C:\Program Files (x86)"));
	}

	let suffixes: &[&[&str]] = &[
		&["Google", "Chrome", "Application", "chrome.exe"],
		&["Microsoft", "Edge", "Application", "msedge.exe"],
		&["BraveSoftware", "Brave-Browser", "Application", "brave.exe"],
		&["Chromium", "Application", "chrome.exe"],
	];

	let mut candidates = Vec::new();
	for root in roots {
		for suffix in suffixes {
			let mut path = root.clone();
			for component in *suffix {
				path.push(component);
			}
			candidates.push(path.to_string_lossy().to_string());
		}
	}
	candidates.extend(["chrome.exe".to_string(), "msedge.exe".to_string(), "brave.exe".to_string()]);
	candidates
}

fn find_in(candidates: &[String]) -> Option<String> {
	for candidate in candidates {
		if candidate.starts_with('/') || candidate.contains('\\') {
			if Path::new(candidate).exists() {
				return Some(candidate.clone());
			}
		} else if which::which(candidate).is_ok() {
			return Some(candidate.clone());
		}
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn absolute_candidates_require_existence() {
		assert_eq!(find_in(&["/definitely/not/here/chrome".to_string()]), None);
	}

	#[test]
	fn path_candidates_resolve_common_binaries() {
		// `sh` exists on every unix test host; proves the PATH branch works.
		#[cfg(unix)]
		assert!(find_in(&["sh".to_string()]).is_some());
	}
}
