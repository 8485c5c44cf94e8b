//! The session manager: connect, handshake, call, disconnect, reconnect.
//!
//! [`EngineSession`] composes the launcher, framing buffer, correlation
//! table, state machine, and event bus behind a simple call/response
//! façade. All of the concurrency and failure handling lives here:
//!
//! - a reader task turns stdout chunks into decoded messages and settles
//!   pending calls by id;
//! - a stderr task forwards engine diagnostics to `tracing`;
//! - an exit watcher observes abnormal termination and drives the
//!   reconnection policy;
//! - a generation counter keeps tasks belonging to a replaced subprocess
//!   from ever touching current state.
//!
//! # Example
//!
//! ```ignore
//! use enginelink::{EngineSession, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = EngineSession::builder().engine_name("analysis-engine").build()?;
//!     session.connect().await?;
//!
//!     let tools = session.list_capabilities().await?;
//!     println!("engine offers {} operations", tools.len());
//!
//!     let result = session.call("tools/list", None).await?;
//!     println!("{result}");
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};

use crate::config::{SessionConfig, SessionConfigBuilder};
use crate::events::{EventBus, EventStream, LifecycleEvent};
use crate::process::{
    EngineControl, EngineLauncher, EngineStdin, EngineStdout, LaunchedEngine, OsLauncher,
    SPAWN_GRACE,
};
use crate::protocol::{
    decode, Capability, CapabilityList, Incoming, InitializeParams, InitializeResult,
    InvocationOutcome, Notification, Request, ServerInfo, METHOD_INITIALIZE, METHOD_INITIALIZED,
    METHOD_INVOKE_CAPABILITY, METHOD_LIST_CAPABILITIES,
};
use crate::state::ConnectionState;
use crate::transport::{FrameBuffer, PendingCalls};
use crate::{Error, Result};

/// Mutable session state guarded by one lock, never held across awaits.
#[derive(Default)]
struct Shared {
    state: ConnectionState,
    server: Option<ServerInfo>,
    capabilities: Option<Vec<Capability>>,
    attempts: u32,
    /// Bumped on every spawn and every disconnect; tasks from a previous
    /// generation see a mismatch and stand down.
    generation: u64,
    /// Bumped only by user-initiated `disconnect()`; cancels reconnection.
    epoch: u64,
    /// Whether a reconnect loop is currently running.
    reconnecting: bool,
    /// Signals the exit watcher of the current process to terminate it.
    kill_tx: Option<oneshot::Sender<()>>,
}

/// A session with one out-of-process analysis engine.
///
/// `EngineSession` is `Send + Sync` and cheap to clone; clones share the
/// same connection. Concurrent [`call`](Self::call)s are supported: stdin
/// writes are serialized in whole-line units and responses are correlated
/// by id, not by position.
///
/// # Thread Safety
///
/// All shared state lives behind locks that are never held across awaits,
/// so callers may drive the session from any number of tasks.
#[derive(Clone)]
pub struct EngineSession {
    config: Arc<SessionConfig>,
    launcher: Arc<dyn EngineLauncher>,
    shared: Arc<StdMutex<Shared>>,
    stdin: Arc<Mutex<Option<EngineStdin>>>,
    pending: Arc<PendingCalls>,
    next_id: Arc<AtomicU64>,
    events: EventBus,
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("state", &self.state())
            .field("server", &self.server_info())
            .field("pending_calls", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl EngineSession {
    /// Create a session using the real OS process launcher.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_launcher(config, Arc::new(OsLauncher))
    }

    /// Create a session with an injected launcher.
    ///
    /// This is the seam test doubles plug into; production code normally
    /// goes through [`new`](Self::new).
    pub fn with_launcher(config: SessionConfig, launcher: Arc<dyn EngineLauncher>) -> Self {
        Self {
            config: Arc::new(config),
            launcher,
            shared: Arc::new(StdMutex::new(Shared::default())),
            stdin: Arc::new(Mutex::new(None)),
            pending: Arc::new(PendingCalls::new()),
            next_id: Arc::new(AtomicU64::new(0)),
            events: EventBus::new(),
        }
    }

    /// Create a builder for configuring a new session.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().expect("session state lock poisoned")
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared().state
    }

    /// Whether remote calls are currently permitted.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Negotiated server identity, present only after a successful handshake.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.shared().server.clone()
    }

    /// Negotiated server version string, if connected.
    pub fn server_version(&self) -> Option<String> {
        self.shared().server.as_ref().map(|s| s.version.clone())
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Subscribe to lifecycle events. Dropping the stream unsubscribes.
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// The session's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Spawn the engine and perform the handshake.
    ///
    /// A no-op returning `Ok(())` when already connected or connecting.
    /// On success the session transitions to `connected`, resets the
    /// reconnection counter, and emits [`LifecycleEvent::Connected`]. Any
    /// failure transitions to `error`, emits [`LifecycleEvent::Error`], and
    /// is returned to the caller.
    pub async fn connect(&self) -> Result<()> {
        let gen = {
            let mut shared = self.shared();
            if !shared.state.accepts_connect() {
                return Ok(());
            }
            shared.state = ConnectionState::Connecting;
            shared.generation += 1;
            shared.generation
        };

        match self.establish(gen).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.abort_connect(gen, &err).await;
                Err(err)
            }
        }
    }

    /// Boxed because `establish` is reachable from tasks it spawns itself
    /// (the exit watcher's reconnect loop calls `connect` again); erasing the
    /// future type here breaks that cycle of opaque types.
    fn establish(&self, gen: u64) -> BoxFuture<'_, Result<()>> {
        async move {
            let path = self
                .config
                .locate_executable()
                .ok_or_else(|| Error::ExecutableNotFound {
                    searched: self.config.searched_description(),
                })?;

            let LaunchedEngine {
                stdin,
                stdout,
                stderr,
                control,
            } = self.launcher.launch(&path)?;

            let (kill_tx, kill_rx) = oneshot::channel();
            {
                // Install the write half and the kill handle under the same
                // generation check, so a concurrent disconnect either beats
                // this block (nothing installed) or runs after it (and clears
                // both).
                let mut stdin_slot = self.stdin.lock().await;
                let mut shared = self.shared();
                if shared.generation != gen {
                    return Err(Error::Disconnected);
                }
                shared.kill_tx = Some(kill_tx);
                *stdin_slot = Some(stdin);
            }

            tokio::spawn(self.clone().read_loop(stdout, gen));
            if let Some(stderr) = stderr {
                tokio::spawn(stderr_loop(stderr));
            }
            tokio::spawn(self.clone().watch_exit(control, kill_rx, gen));

            // Let the process bring up its stdio loop before the first write.
            tokio::time::sleep(SPAWN_GRACE).await;

            let params = serde_json::to_value(InitializeParams::default())?;
            let result = self
                .dispatch(METHOD_INITIALIZE, Some(params))
                .await
                .map_err(|e| Error::Handshake {
                    message: e.to_string(),
                })?;
            let init: InitializeResult =
                serde_json::from_value(result).map_err(|e| Error::Handshake {
                    message: format!("malformed initialize result: {e}"),
                })?;

            // Fire-and-forget; not tracked in the correlation table.
            self.write_line(Notification::new(METHOD_INITIALIZED, None).to_line()?)
                .await?;

            {
                let mut shared = self.shared();
                if shared.generation != gen {
                    return Err(Error::Disconnected);
                }
                shared.state = ConnectionState::Connected;
                shared.server = Some(init.server_info.clone());
                shared.attempts = 0;
            }
            tracing::debug!(
                server = %init.server_info.name,
                version = %init.server_info.version,
                "connected to engine"
            );
            self.events.emit(LifecycleEvent::Connected);
            Ok(())
        }
        .boxed()
    }

    /// Tear down a failed connect attempt: `connecting -> error`.
    async fn abort_connect(&self, gen: u64, err: &Error) {
        let kill = {
            let mut shared = self.shared();
            if shared.generation != gen {
                // Superseded by a disconnect or a newer connect.
                return;
            }
            shared.state = ConnectionState::Error;
            shared.server = None;
            shared.kill_tx.take()
        };
        if let Some(kill) = kill {
            let _ = kill.send(());
        }
        *self.stdin.lock().await = None;
        self.pending.drain(|_| Error::Disconnected);
        self.events.emit(LifecycleEvent::Error {
            message: err.to_string(),
        });
    }

    /// Terminate the engine and reset the session.
    ///
    /// Drains every pending call with a "client disconnected" failure,
    /// clears the capability cache, and emits
    /// [`LifecycleEvent::Disconnected`]. Safe to call from any state; a
    /// no-op (no event) when already disconnected. Never triggers
    /// reconnection.
    pub async fn disconnect(&self) {
        let kill = {
            let mut shared = self.shared();
            // Only a true no-op when there is also no reconnect loop to cancel.
            if shared.state == ConnectionState::Disconnected && !shared.reconnecting {
                return;
            }
            shared.state = ConnectionState::Disconnected;
            shared.server = None;
            shared.capabilities = None;
            shared.attempts = 0;
            shared.generation += 1;
            shared.epoch += 1;
            shared.reconnecting = false;
            shared.kill_tx.take()
        };

        self.pending.drain(|_| Error::Disconnected);
        if let Some(kill) = kill {
            let _ = kill.send(());
        }
        *self.stdin.lock().await = None;
        self.events.emit(LifecycleEvent::Disconnected { reason: None });
        tracing::debug!("disconnected from engine");
    }

    // -------------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------------

    /// Invoke a remote method and await its response.
    ///
    /// Fails immediately with [`Error::NotConnected`] unless the session is
    /// connected. Each call has an independent timeout; expiry fails only
    /// that call and leaves the connection up. If the remote reported a
    /// method-level failure the call fails with [`Error::Remote`]. A result
    /// payload that is itself a JSON-encoded string is decoded one further
    /// level; if that secondary parse fails the raw string is returned
    /// unchanged.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.dispatch(method, params).await
    }

    /// The request/response path shared by `call` and the handshake.
    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        // Register before writing so a response can never beat the entry.
        let rx = self.pending.register(id, method);
        let line = Request::new(id, method, params).to_line()?;
        if let Err(err) = self.write_line(line).await {
            self.pending.remove(id);
            return Err(err);
        }
        tracing::trace!(id, method, "request dispatched");

        let timeout = self.config.call_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.pending.remove(id);
                tracing::debug!(id, method, ?timeout, "request timed out");
                Err(Error::Timeout {
                    id,
                    method: method.to_string(),
                    after: timeout,
                })
            }
            Ok(Err(_)) => Err(Error::Disconnected),
            Ok(Ok(result)) => result.map(decode_result),
        }
    }

    /// Enumerate the engine's named operations.
    ///
    /// The list is fetched once and cached; the cache is cleared only on
    /// disconnect, never refreshed automatically.
    pub async fn list_capabilities(&self) -> Result<Vec<Capability>> {
        if let Some(cached) = self.shared().capabilities.clone() {
            return Ok(cached);
        }

        let result = self.call(METHOD_LIST_CAPABILITIES, None).await?;
        let list: CapabilityList = serde_json::from_value(result).map_err(|e| Error::Parse {
            message: format!("malformed capability list: {e}"),
            source: e,
        })?;
        self.shared().capabilities = Some(list.tools.clone());
        Ok(list.tools)
    }

    /// Invoke a named capability with arguments.
    ///
    /// Thin wrapper over the invocation wire method: a result carrying the
    /// error flag fails with [`Error::Remote`] and the flagged message;
    /// otherwise the full result payload is returned.
    pub async fn invoke_capability(&self, name: &str, arguments: Value) -> Result<Value> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = self.call(METHOD_INVOKE_CAPABILITY, Some(params)).await?;

        match serde_json::from_value::<InvocationOutcome>(result.clone()) {
            Ok(outcome) if outcome.is_error => Err(Error::Remote {
                code: None,
                message: outcome.text(),
            }),
            _ => Ok(result),
        }
    }

    /// Write one complete line to the engine's stdin.
    ///
    /// The lock scopes the whole line, so concurrent calls never interleave
    /// partial request bodies.
    async fn write_line(&self, line: String) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let writer = stdin.as_mut().ok_or(Error::NotConnected)?;
        writer.write_all(line.as_bytes()).await.map_err(Error::io)?;
        writer.flush().await.map_err(Error::io)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Background tasks
    // -------------------------------------------------------------------------

    /// Pump stdout chunks through the framing buffer and route messages.
    async fn read_loop(self, mut stdout: EngineStdout, gen: u64) {
        let mut framing = FrameBuffer::new();
        let mut chunk = vec![0u8; 8192];
        loop {
            match stdout.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    for line in framing.feed(&chunk[..n]) {
                        self.route_line(&line);
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "engine stdout read failed");
                    break;
                }
            }
        }
        tracing::trace!(gen, "engine stdout closed");
    }

    fn route_line(&self, line: &str) {
        match decode(line) {
            Ok(Incoming::Success { id, result }) => {
                if !self.pending.settle(id, Ok(result)) {
                    tracing::trace!(id, "response for unknown request id, ignoring");
                }
            }
            Ok(Incoming::Failure { id, error }) => {
                if !self.pending.settle(id, Err(error.into())) {
                    tracing::trace!(id, "error response for unknown request id, ignoring");
                }
            }
            Ok(Incoming::Notification { method, .. }) => {
                tracing::debug!(%method, "engine notification");
            }
            Ok(Incoming::Request { id, method, .. }) => {
                tracing::debug!(id, %method, "ignoring server-initiated request");
            }
            Ok(Incoming::Unrecognized(value)) => {
                tracing::warn!(%value, "unrecognized frame, discarding");
            }
            // A malformed line is assumed unrelated noise, not a response.
            Err(err) => {
                tracing::warn!(error = %err, "undecodable line, discarding");
            }
        }
    }

    /// Observe process termination for one generation.
    async fn watch_exit(
        self,
        mut control: Box<dyn EngineControl>,
        mut kill_rx: oneshot::Receiver<()>,
        gen: u64,
    ) {
        let code = tokio::select! {
            status = control.wait() => status.unwrap_or(None),
            _ = &mut kill_rx => {
                // Requested termination; the requester handles state.
                let _ = control.start_kill();
                let _ = control.wait().await;
                tracing::debug!(gen, "engine process terminated on request");
                return;
            }
        };
        self.handle_unexpected_exit(code, gen).await;
    }

    async fn handle_unexpected_exit(&self, code: Option<i32>, gen: u64) {
        let (prior, reconnect) = {
            let mut shared = self.shared();
            if shared.generation != gen {
                return;
            }
            let prior = shared.state;
            shared.server = None;
            shared.capabilities = None;
            shared.kill_tx = None;
            let reconnect = prior == ConnectionState::Connected && self.config.auto_reconnect;
            if prior == ConnectionState::Connected {
                shared.state = ConnectionState::Disconnected;
            }
            if reconnect {
                shared.reconnecting = true;
            }
            (prior, reconnect)
        };

        *self.stdin.lock().await = None;
        self.pending.drain(|_| Error::ProcessExit { code });
        tracing::warn!(?code, state = %prior, "engine process exited unexpectedly");

        match prior {
            ConnectionState::Connected if reconnect => {
                let epoch = self.shared().epoch;
                tokio::spawn(self.clone().run_reconnect(epoch));
            }
            ConnectionState::Connected => {
                self.events.emit(LifecycleEvent::Disconnected {
                    reason: Some(exit_reason(code)),
                });
            }
            // A death during `connecting` surfaces through the failing
            // handshake; the connect flow owns the state transition.
            _ => {}
        }
    }

    // -------------------------------------------------------------------------
    // Reconnection policy
    // -------------------------------------------------------------------------

    /// Retry `connect()` until it succeeds, the attempt budget is spent, or
    /// the user disconnects.
    ///
    /// The counter is reset only by a fully successful connect, so
    /// consecutive failures accumulate toward the maximum even across
    /// repeated exits.
    async fn run_reconnect(self, epoch: u64) {
        loop {
            let attempt = {
                let mut shared = self.shared();
                // A disconnect may have landed while the previous attempt's
                // connect() was in flight; bail before counting or emitting.
                if shared.epoch != epoch {
                    shared.reconnecting = false;
                    tracing::debug!("reconnect cancelled by disconnect");
                    return;
                }
                if shared.attempts >= self.config.max_retries {
                    shared.state = ConnectionState::Error;
                    shared.reconnecting = false;
                    drop(shared);
                    tracing::warn!(
                        max_retries = self.config.max_retries,
                        "reconnection attempts exhausted"
                    );
                    self.events.emit(LifecycleEvent::Error {
                        message: format!(
                            "reconnect failed: max attempts ({}) exceeded",
                            self.config.max_retries
                        ),
                    });
                    return;
                }
                shared.attempts += 1;
                shared.attempts
            };

            self.events.emit(LifecycleEvent::Reconnecting { attempt });
            tracing::debug!(attempt, delay = ?self.config.retry_delay, "reconnecting");
            tokio::time::sleep(self.config.retry_delay).await;

            {
                let mut shared = self.shared();
                if shared.epoch != epoch {
                    shared.reconnecting = false;
                    tracing::debug!("reconnect cancelled by disconnect");
                    return;
                }
            }

            match self.connect().await {
                Ok(()) => {
                    self.shared().reconnecting = false;
                    return;
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "reconnect attempt failed");
                }
            }
        }
    }
}

/// Forward engine stderr lines to tracing; diagnostics only, never protocol.
async fn stderr_loop(stderr: EngineStdout) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if !line.is_empty() {
            tracing::debug!(target: "enginelink::engine_stderr", "{line}");
        }
    }
}

fn exit_reason(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("engine exited with code {code}"),
        None => "engine exited".to_string(),
    }
}

/// Decode one further level when the result payload is itself a
/// JSON-encoded string; fall back to the raw string otherwise.
fn decode_result(result: Value) -> Value {
    match result {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(decoded) => decoded,
            Err(_) => Value::String(text),
        },
        other => other,
    }
}

/// Builder for [`EngineSession`].
///
/// Wraps [`SessionConfigBuilder`] and builds directly into a session.
#[derive(Default)]
pub struct SessionBuilder {
    inner: SessionConfigBuilder,
    launcher: Option<Arc<dyn EngineLauncher>>,
}

impl SessionBuilder {
    /// Explicit path to the engine executable (skips discovery).
    pub fn executable(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.inner = self.inner.executable(path);
        self
    }

    /// Binary name probed for by executable discovery.
    pub fn engine_name(mut self, name: impl Into<String>) -> Self {
        self.inner = self.inner.engine_name(name);
        self
    }

    /// Timeout applied independently to every remote call.
    pub fn call_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.inner = self.inner.call_timeout(timeout);
        self
    }

    /// Whether an unexpected exit while connected triggers reconnection.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.inner = self.inner.auto_reconnect(enabled);
        self
    }

    /// Maximum consecutive reconnection attempts before giving up.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.inner = self.inner.max_retries(retries);
        self
    }

    /// Fixed delay between reconnection attempts.
    pub fn retry_delay(mut self, delay: std::time::Duration) -> Self {
        self.inner = self.inner.retry_delay(delay);
        self
    }

    /// Inject a process launcher (defaults to [`OsLauncher`]).
    pub fn launcher(mut self, launcher: Arc<dyn EngineLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Validate the configuration and build the session.
    pub fn build(self) -> Result<EngineSession> {
        let config = self.inner.build()?;
        Ok(match self.launcher {
            Some(launcher) => EngineSession::with_launcher(config, launcher),
            None => EngineSession::new(config),
        })
    }
}
