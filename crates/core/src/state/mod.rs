//! Versioned, file-locked persistence of the SurfWright state document.

mod lock;
mod migrate;
mod store;
mod types;

pub use lock::{LockInfo, StateLock};
pub use migrate::migrate_to_current;
pub use store::{StateStore, atomic_write};
pub use types::{
	ArtifactRecord, BrowserMode, CURRENT_STATE_VERSION, CaptureRecord, CaptureStatus, DEFAULT_SESSION_ID, SessionKind,
	SessionPolicy, SessionRecord, SurfwrightState, TargetRecord,
};
