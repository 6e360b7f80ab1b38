//! # bizhub-core
//!
//! Foundation types shared by the bizhub connectivity crates:
//!
//! - **Connection state**: [`ConnectionState`] and the derived [`ConnectionPhase`]
//! - **Wire types**: [`WakeStatus`] and [`PingStatus`] for the wake/ping endpoints
//! - **Policies**: [`WakePolicy`], [`KeepAlivePolicy`], [`InitPolicy`] and the
//!   backoff math behind them
//! - **Errors**: [`ProbeError`] and [`StorageError`] via `thiserror`
//! - **Storage port**: [`KeyValueStore`] with in-memory and JSON-file backends

#![deny(unsafe_code)]

pub mod errors;
pub mod retry;
pub mod state;
pub mod storage;

pub use errors::{ProbeError, StorageError};
pub use retry::{InitPolicy, KeepAlivePolicy, WakePolicy, calculate_backoff_delay};
pub use state::{ConnectionPhase, ConnectionState, PingStatus, WakeStatus};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
