use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failures raised by the CDP transport and endpoint probes.
#[derive(Debug, Error)]
pub enum RuntimeError {
	#[error("cdp endpoint unreachable: {0}")]
	Unreachable(String),

	#[error("websocket connect failed: {0}")]
	Connect(String),

	#[error("connection closed")]
	Closed,

	#[error("cdp call {method} failed: {message}")]
	Call { method: String, message: String },

	#[error("cdp call {method} timed out after {ms}ms")]
	CallTimeout { method: String, ms: u64 },

	#[error("malformed cdp message: {0}")]
	Protocol(String),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl RuntimeError {
	/// True for failures worth retrying at a higher level (probe or
	/// transport faults, as opposed to a browser-side method error).
	pub fn is_transport(&self) -> bool {
		matches!(
			self,
			RuntimeError::Unreachable(_) | RuntimeError::Connect(_) | RuntimeError::Closed | RuntimeError::CallTimeout { .. }
		)
	}
}
