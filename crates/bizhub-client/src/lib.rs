//! # bizhub-client
//!
//! Client-side connectivity for a backend that sleeps when idle.
//!
//! - [`WarmupManager`] wakes the backend with exponential backoff, keeps it
//!   awake with periodic pings and tracks the connection state
//! - [`ServerProbe`] is the network seam; [`HttpProbe`] is the reqwest
//!   implementation
//! - [`VisitorTracker`] keeps a persisted visitor session and reports page
//!   views
//!
//! Managers are plain values shared through `Arc`. Nothing here is global.

#![deny(unsafe_code)]

pub mod analytics;
pub mod keep_alive;
pub mod manager;
pub mod probe;

#[cfg(test)]
mod testing;

pub use analytics::{TrackerConfig, VisitEvent, VisitorSession, VisitorTracker};
pub use keep_alive::KeepAliveExit;
pub use manager::{WarmupConfig, WarmupManager};
pub use probe::{Endpoints, HttpProbe, ServerProbe, build_client};
