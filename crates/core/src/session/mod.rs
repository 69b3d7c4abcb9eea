//! Browser session lifecycle: discovery, launch, attach, leases, pruning.

mod discovery;
mod launch;
mod manager;
mod prune;

pub use discovery::find_browser_executable;
pub use launch::{LaunchedBrowser, allocate_debug_port, launch_managed, pid_is_alive, terminate_pid};
pub use manager::{EnsureOutcome, ResolveHints, SessionManager, sanitize_cdp_origin};
pub use prune::{ClearReport, PruneOptions, PruneReason, PruneReport, PrunedSession};
