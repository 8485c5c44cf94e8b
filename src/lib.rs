//! Async client for a long-lived out-of-process analysis engine.
//!
//! `enginelink` spawns the engine as a subprocess and speaks newline-delimited
//! JSON-RPC 2.0 over its standard streams: requests down stdin, responses and
//! notifications up stdout, diagnostics on stderr. The library owns the whole
//! lifecycle: executable discovery, spawn, handshake, concurrent calls with
//! per-call timeouts, lifecycle events, and reconnection after crashes.
//!
//! # Quick Start
//!
//! ```ignore
//! use enginelink::{EngineSession, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = EngineSession::builder()
//!         .engine_name("analysis-engine")
//!         .build()?;
//!     session.connect().await?;
//!
//!     for capability in session.list_capabilities().await? {
//!         println!("{}", capability.name);
//!     }
//!
//!     let result = session
//!         .invoke_capability("search", json!({"query": "unresolved symbol"}))
//!         .await?;
//!     println!("{result}");
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Lifecycle Events
//!
//! Subscribe before connecting to observe every transition:
//!
//! ```ignore
//! let mut events = session.subscribe();
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("session event: {event:?}");
//!     }
//! });
//! ```
//!
//! # Concurrency
//!
//! [`EngineSession`] is cheap to clone and every clone shares one connection.
//! Calls may be issued from any number of tasks concurrently; responses are
//! matched by request id, so out-of-order replies resolve the right caller.

pub mod config;
mod error;
pub mod events;
pub mod process;
pub mod protocol;
mod session;
pub mod state;
pub mod transport;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use error::{Error, Result};
pub use events::{EventBus, EventStream, LifecycleEvent};
pub use process::{EngineControl, EngineLauncher, LaunchedEngine, OsLauncher};
pub use protocol::{Capability, Incoming, ServerInfo};
pub use session::{EngineSession, SessionBuilder};
pub use state::ConnectionState;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineSession>();
        assert_send_sync::<SessionConfig>();
        assert_send_sync::<Error>();
        assert_send_sync::<LifecycleEvent>();
        assert_send_sync::<ConnectionState>();
        assert_send_sync::<Capability>();
    }
}
