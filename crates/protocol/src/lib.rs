//! Wire types for the SurfWright protocol surfaces.
//!
//! This crate contains the serde-serializable shapes that cross process
//! boundaries: the subset of the Chrome DevTools Protocol the tool speaks,
//! the HAR 1.2 document produced by network exports, and the configuration
//! and report records exchanged with in-page scripts.
//!
//! Types here are pure data: no behavior beyond (de)serialization. The
//! higher-level operations live in `surfwright-core`.

pub mod cdp;
pub mod har;
pub mod page;

pub use cdp::*;
pub use har::*;
