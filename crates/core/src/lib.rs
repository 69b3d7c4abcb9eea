//! SurfWright core: a deterministic automation layer over Chromium's
//! DevTools Protocol with a JSON-shaped contract.
//!
//! Subsystems, leaves first:
//! - [`state`]: the versioned, file-locked state document with atomic
//!   writes, migrations, and ordinal allocation.
//! - [`session`]: browser discovery, launch, attach, reachability
//!   recovery, leases, and pruning.
//! - [`target`] and [`eval`]: CDP target resolution, frame trees, and
//!   bounded page-script evaluation in isolated or main worlds.
//! - [`actions`]: the action set sharing one skeleton (resolve session,
//!   connect, resolve target, act, persist, report).
//! - [`net`]: bounded network capture, projection, HAR export, artifact
//!   index, budget checks.
//! - [`pipeline`]: the declarative plan executor with templating,
//!   assertions, and record/replay.

pub mod actions;
pub mod config;
pub mod error;
pub mod eval;
pub mod maintenance;
pub mod net;
pub mod pipeline;
pub mod report;
pub mod scripts;
pub mod session;
pub mod state;
pub mod target;
pub mod util;

pub use config::{Config, Tunables};
pub use error::{ErrorCode, Phase, Result, SwError};
pub use report::{ActionReport, PhaseTimer, TimingMs};
pub use state::{StateStore, SurfwrightState};
