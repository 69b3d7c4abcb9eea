//! Error taxonomy shared by every SurfWright operation.
//!
//! Each failure carries a stable machine code from [`ErrorCode`] plus a
//! one-line message. Codes split into caller-input faults (not retryable),
//! state faults with recovery context, transient infrastructure faults
//! (retryable), and command-semantic faults. The `contract` command
//! enumerates [`ErrorCode::ALL`] so agents can rely on the set.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SwError>;

/// Stable error codes of the command contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
	#[serde(rename = "E_URL_INVALID")]
	UrlInvalid,
	#[serde(rename = "E_CDP_INVALID")]
	CdpInvalid,
	#[serde(rename = "E_QUERY_INVALID")]
	QueryInvalid,
	#[serde(rename = "E_SESSION_ID_INVALID")]
	SessionIdInvalid,
	#[serde(rename = "E_TARGET_ID_INVALID")]
	TargetIdInvalid,
	#[serde(rename = "E_SELECTOR_INVALID")]
	SelectorInvalid,
	#[serde(rename = "E_SESSION_NOT_FOUND")]
	SessionNotFound,
	#[serde(rename = "E_SESSION_EXISTS")]
	SessionExists,
	#[serde(rename = "E_SESSION_CONFLICT")]
	SessionConflict,
	#[serde(rename = "E_SESSION_REQUIRED")]
	SessionRequired,
	#[serde(rename = "E_TARGET_NOT_FOUND")]
	TargetNotFound,
	#[serde(rename = "E_TARGET_SESSION_UNKNOWN")]
	TargetSessionUnknown,
	#[serde(rename = "E_TARGET_SESSION_MISMATCH")]
	TargetSessionMismatch,
	#[serde(rename = "E_HANDLE_TYPE_MISMATCH")]
	HandleTypeMismatch,
	#[serde(rename = "E_CDP_UNREACHABLE")]
	CdpUnreachable,
	#[serde(rename = "E_SESSION_UNREACHABLE")]
	SessionUnreachable,
	#[serde(rename = "E_BROWSER_START_TIMEOUT")]
	BrowserStartTimeout,
	#[serde(rename = "E_STATE_LOCK_TIMEOUT")]
	StateLockTimeout,
	#[serde(rename = "E_STATE_LOCK_IO")]
	StateLockIo,
	#[serde(rename = "E_BROWSER_START_FAILED")]
	BrowserStartFailed,
	#[serde(rename = "E_BROWSER_NOT_FOUND")]
	BrowserNotFound,
	#[serde(rename = "E_WORKSPACE_NOT_FOUND")]
	WorkspaceNotFound,
	#[serde(rename = "E_WORKSPACE_INVALID")]
	WorkspaceInvalid,
	#[serde(rename = "E_WAIT_TIMEOUT")]
	WaitTimeout,
	#[serde(rename = "E_ASSERT_FAILED")]
	AssertFailed,
	#[serde(rename = "E_EVAL_RUNTIME")]
	EvalRuntime,
	#[serde(rename = "E_EVAL_TIMEOUT")]
	EvalTimeout,
	#[serde(rename = "E_EVAL_RESULT_UNSERIALIZABLE")]
	EvalResultUnserializable,
	#[serde(rename = "E_EVAL_SCRIPT_TOO_LARGE")]
	EvalScriptTooLarge,
	#[serde(rename = "E_INTERNAL")]
	Internal,
}

impl ErrorCode {
	/// Every code of the contract, in taxonomy order.
	pub const ALL: &'static [ErrorCode] = &[
		ErrorCode::UrlInvalid,
		ErrorCode::CdpInvalid,
		ErrorCode::QueryInvalid,
		ErrorCode::SessionIdInvalid,
		ErrorCode::TargetIdInvalid,
		ErrorCode::SelectorInvalid,
		ErrorCode::SessionNotFound,
		ErrorCode::SessionExists,
		ErrorCode::SessionConflict,
		ErrorCode::SessionRequired,
		ErrorCode::TargetNotFound,
		ErrorCode::TargetSessionUnknown,
		ErrorCode::TargetSessionMismatch,
		ErrorCode::HandleTypeMismatch,
		ErrorCode::CdpUnreachable,
		ErrorCode::SessionUnreachable,
		ErrorCode::BrowserStartTimeout,
		ErrorCode::StateLockTimeout,
		ErrorCode::StateLockIo,
		ErrorCode::BrowserStartFailed,
		ErrorCode::BrowserNotFound,
		ErrorCode::WorkspaceNotFound,
		ErrorCode::WorkspaceInvalid,
		ErrorCode::WaitTimeout,
		ErrorCode::AssertFailed,
		ErrorCode::EvalRuntime,
		ErrorCode::EvalTimeout,
		ErrorCode::EvalResultUnserializable,
		ErrorCode::EvalScriptTooLarge,
		ErrorCode::Internal,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorCode::UrlInvalid => "E_URL_INVALID",
			ErrorCode::CdpInvalid => "E_CDP_INVALID",
			ErrorCode::QueryInvalid => "E_QUERY_INVALID",
			ErrorCode::SessionIdInvalid => "E_SESSION_ID_INVALID",
			ErrorCode::TargetIdInvalid => "E_TARGET_ID_INVALID",
			ErrorCode::SelectorInvalid => "E_SELECTOR_INVALID",
			ErrorCode::SessionNotFound => "E_SESSION_NOT_FOUND",
			ErrorCode::SessionExists => "E_SESSION_EXISTS",
			ErrorCode::SessionConflict => "E_SESSION_CONFLICT",
			ErrorCode::SessionRequired => "E_SESSION_REQUIRED",
			ErrorCode::TargetNotFound => "E_TARGET_NOT_FOUND",
			ErrorCode::TargetSessionUnknown => "E_TARGET_SESSION_UNKNOWN",
			ErrorCode::TargetSessionMismatch => "E_TARGET_SESSION_MISMATCH",
			ErrorCode::HandleTypeMismatch => "E_HANDLE_TYPE_MISMATCH",
			ErrorCode::CdpUnreachable => "E_CDP_UNREACHABLE",
			ErrorCode::SessionUnreachable => "E_SESSION_UNREACHABLE",
			ErrorCode::BrowserStartTimeout => "E_BROWSER_START_TIMEOUT",
			ErrorCode::StateLockTimeout => "E_STATE_LOCK_TIMEOUT",
			ErrorCode::StateLockIo => "E_STATE_LOCK_IO",
			ErrorCode::BrowserStartFailed => "E_BROWSER_START_FAILED",
			ErrorCode::BrowserNotFound => "E_BROWSER_NOT_FOUND",
			ErrorCode::WorkspaceNotFound => "E_WORKSPACE_NOT_FOUND",
			ErrorCode::WorkspaceInvalid => "E_WORKSPACE_INVALID",
			ErrorCode::WaitTimeout => "E_WAIT_TIMEOUT",
			ErrorCode::AssertFailed => "E_ASSERT_FAILED",
			ErrorCode::EvalRuntime => "E_EVAL_RUNTIME",
			ErrorCode::EvalTimeout => "E_EVAL_TIMEOUT",
			ErrorCode::EvalResultUnserializable => "E_EVAL_RESULT_UNSERIALIZABLE",
			ErrorCode::EvalScriptTooLarge => "E_EVAL_SCRIPT_TOO_LARGE",
			ErrorCode::Internal => "E_INTERNAL",
		}
	}

	/// Whether a caller may retry the same invocation unchanged.
	pub fn retryable(&self) -> bool {
		matches!(
			self,
			ErrorCode::CdpUnreachable
				| ErrorCode::SessionUnreachable
				| ErrorCode::BrowserStartTimeout
				| ErrorCode::StateLockTimeout
				| ErrorCode::StateLockIo
				| ErrorCode::BrowserStartFailed
				| ErrorCode::Internal
		)
	}
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Phase of an invocation where a failure surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
	ResolveSession,
	ConnectCdp,
	ResolveTarget,
	Action,
	PersistState,
}

/// A single SurfWright failure: stable code, one-line message, optional
/// structured recovery context.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct SwError {
	pub code: ErrorCode,
	pub message: String,
	pub hints: Vec<String>,
	pub hint_context: Option<Value>,
	pub phase: Option<Phase>,
	pub diagnostics: Option<Value>,
}

impl SwError {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
			hints: Vec::new(),
			hint_context: None,
			phase: None,
			diagnostics: None,
		}
	}

	pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
		self.hints.push(hint.into());
		self
	}

	pub fn with_hint_context(mut self, context: Value) -> Self {
		self.hint_context = Some(context);
		self
	}

	pub fn with_phase(mut self, phase: Phase) -> Self {
		self.phase = Some(phase);
		self
	}

	pub fn with_diagnostics(mut self, diagnostics: Value) -> Self {
		self.diagnostics = Some(diagnostics);
		self
	}

	/// Shorthand for caller-input failures.
	pub fn query(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::QueryInvalid, message)
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::Internal, message)
	}

	pub fn retryable(&self) -> bool {
		self.code.retryable()
	}
}

impl From<std::io::Error> for SwError {
	fn from(err: std::io::Error) -> Self {
		SwError::internal(format!("io error: {err}"))
	}
}

impl From<serde_json::Error> for SwError {
	fn from(err: serde_json::Error) -> Self {
		SwError::internal(format!("json error: {err}"))
	}
}

impl From<surfwright_runtime::RuntimeError> for SwError {
	fn from(err: surfwright_runtime::RuntimeError) -> Self {
		use surfwright_runtime::RuntimeError;
		match &err {
			RuntimeError::Unreachable(_) | RuntimeError::Connect(_) | RuntimeError::Closed => {
				SwError::new(ErrorCode::CdpUnreachable, err.to_string())
			}
			RuntimeError::CallTimeout { .. } => SwError::new(ErrorCode::CdpUnreachable, err.to_string()),
			RuntimeError::Call { .. } | RuntimeError::Protocol(_) => SwError::internal(err.to_string()),
			RuntimeError::Json(_) => SwError::internal(err.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn codes_serialize_to_contract_strings() {
		let text = serde_json::to_string(&ErrorCode::StateLockTimeout).unwrap();
		assert_eq!(text, "\"E_STATE_LOCK_TIMEOUT\"");
		let back: ErrorCode = serde_json::from_str(&text).unwrap();
		assert_eq!(back, ErrorCode::StateLockTimeout);
	}

	#[test]
	fn retryability_matches_taxonomy() {
		assert!(ErrorCode::CdpUnreachable.retryable());
		assert!(ErrorCode::StateLockTimeout.retryable());
		assert!(ErrorCode::Internal.retryable());
		assert!(!ErrorCode::UrlInvalid.retryable());
		assert!(!ErrorCode::WaitTimeout.retryable());
		assert!(!ErrorCode::BrowserNotFound.retryable());
	}

	#[test]
	fn all_covers_every_code_exactly_once() {
		let mut seen = std::collections::HashSet::new();
		for code in ErrorCode::ALL {
			assert!(seen.insert(code.as_str()), "duplicate {code}");
		}
		assert_eq!(seen.len(), 30);
	}

	#[test]
	fn hints_accumulate() {
		let err = SwError::new(ErrorCode::TargetNotFound, "no such target")
			.with_hint("run `surfwright target list`")
			.with_hint_context(serde_json::json!({ "suggestedTargetId": "AB12" }));
		assert_eq!(err.hints.len(), 1);
		assert!(err.hint_context.is_some());
	}
}
