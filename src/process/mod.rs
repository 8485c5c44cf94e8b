//! Process supervision for the engine subprocess.
//!
//! The session never spawns processes directly; it goes through the
//! [`EngineLauncher`] seam so tests can substitute a scripted in-memory
//! engine for the real OS process.
//!
//! # Architecture
//!
//! ```text
//! enginelink                         engine process
//! ┌──────────────┐                   ┌─────────────┐
//! │ EngineSession│──stdin (requests)▶│             │
//! │              │◀─stdout (JSON)────│             │
//! │              │◀─stderr (logs)────│             │
//! └──────────────┘                   └─────────────┘
//! ```
//!
//! All three standard streams are piped, never inherited; stdout carries one
//! complete JSON-RPC line per message, stderr is diagnostics only.

mod launcher;

pub use launcher::{
    EngineControl, EngineLauncher, EngineStdin, EngineStdout, LaunchedEngine, OsLauncher,
};

use std::time::Duration;

/// Grace delay observed after a successful spawn, before the first write.
///
/// Lets the process finish initializing its stdio loop. This does not
/// guarantee readiness to answer protocol requests; only the handshake
/// confirms that.
pub const SPAWN_GRACE: Duration = Duration::from_millis(200);
