//! Test support: a scripted in-memory engine behind the launcher seam.
//!
//! [`FakeLauncher`] implements [`EngineLauncher`] with `tokio::io::duplex`
//! pipes instead of a real subprocess. Each launch spawns a responder task
//! that answers the handshake and any scripted methods, so integration tests
//! exercise the full session path (framing, correlation, state machine,
//! events) without touching the OS.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::{oneshot, Mutex, Notify};

use enginelink::{EngineControl, EngineLauncher, Error, LaunchedEngine, Result};

/// Path accepted by the fake; discovery is skipped when configured explicitly.
pub const FAKE_ENGINE_PATH: &str = "/fake/analysis-engine";

#[derive(Clone)]
struct Behavior {
    tools: Value,
    responses: HashMap<String, Value>,
    errors: HashMap<String, (i64, String)>,
    silent: HashSet<String>,
    delays: HashMap<String, Duration>,
    noise: Vec<String>,
    split_writes: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            tools: json!([]),
            responses: HashMap::new(),
            errors: HashMap::new(),
            silent: HashSet::new(),
            delays: HashMap::new(),
            noise: Vec::new(),
            split_writes: false,
        }
    }
}

struct LauncherInner {
    behavior: StdMutex<Behavior>,
    spawn_count: AtomicUsize,
    fail_spawns: AtomicBool,
    exit_txs: StdMutex<Vec<oneshot::Sender<Option<i32>>>>,
}

/// Launches scripted in-memory engines.
///
/// Clones share state, so tests keep one handle for scripting and hand a
/// boxed clone to the session.
#[derive(Clone)]
pub struct FakeLauncher {
    inner: Arc<LauncherInner>,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LauncherInner {
                behavior: StdMutex::new(Behavior::default()),
                spawn_count: AtomicUsize::new(0),
                fail_spawns: AtomicBool::new(false),
                exit_txs: StdMutex::new(Vec::new()),
            }),
        }
    }

    fn behavior(&self) -> std::sync::MutexGuard<'_, Behavior> {
        self.inner.behavior.lock().unwrap()
    }

    /// Tools array returned for the capability enumeration method.
    pub fn tools(&self, tools: Value) -> &Self {
        self.behavior().tools = tools;
        self
    }

    /// Script a successful result for `method`.
    pub fn respond_with(&self, method: &str, result: Value) -> &Self {
        self.behavior().responses.insert(method.to_string(), result);
        self
    }

    /// Script an error response for `method`.
    pub fn error_for(&self, method: &str, code: i64, message: &str) -> &Self {
        self.behavior()
            .errors
            .insert(method.to_string(), (code, message.to_string()));
        self
    }

    /// Never answer `method` at all.
    pub fn silence(&self, method: &str) -> &Self {
        self.behavior().silent.insert(method.to_string());
        self
    }

    /// Delay the response to `method`, allowing out-of-order replies.
    pub fn delay(&self, method: &str, delay: Duration) -> &Self {
        self.behavior().delays.insert(method.to_string(), delay);
        self
    }

    /// Emit a non-protocol line on stdout before every response.
    pub fn noise_line(&self, line: &str) -> &Self {
        self.behavior().noise.push(line.to_string());
        self
    }

    /// Write each response in two chunks with a pause in between.
    pub fn split_writes(&self, enabled: bool) -> &Self {
        self.behavior().split_writes = enabled;
        self
    }

    /// Make subsequent launches fail with a spawn error.
    pub fn fail_spawns(&self, enabled: bool) -> &Self {
        self.inner.fail_spawns.store(enabled, Ordering::SeqCst);
        self
    }

    /// Number of engines launched so far.
    pub fn spawn_count(&self) -> usize {
        self.inner.spawn_count.load(Ordering::SeqCst)
    }

    /// Make the most recently launched engine exit with `code`.
    pub fn trigger_exit(&self, code: Option<i32>) {
        let tx = self.inner.exit_txs.lock().unwrap().pop();
        if let Some(tx) = tx {
            let _ = tx.send(code);
        }
    }
}

impl EngineLauncher for FakeLauncher {
    fn launch(&self, _executable: &Path) -> Result<LaunchedEngine> {
        if self.inner.fail_spawns.load(Ordering::SeqCst) {
            return Err(Error::Spawn(io::Error::other("injected spawn failure")));
        }
        self.inner.spawn_count.fetch_add(1, Ordering::SeqCst);

        let (stdin_session, stdin_engine) = tokio::io::duplex(64 * 1024);
        let (stdout_engine, stdout_session) = tokio::io::duplex(64 * 1024);

        let behavior = self.behavior().clone();
        tokio::spawn(run_engine(stdin_engine, stdout_engine, behavior));

        let (exit_tx, exit_rx) = oneshot::channel();
        self.inner.exit_txs.lock().unwrap().push(exit_tx);

        Ok(LaunchedEngine {
            stdin: Box::new(stdin_session),
            stdout: Box::new(stdout_session),
            stderr: None,
            control: Box::new(FakeControl {
                exit_rx: Some(exit_rx),
                kill_notify: Arc::new(Notify::new()),
            }),
        })
    }
}

struct FakeControl {
    exit_rx: Option<oneshot::Receiver<Option<i32>>>,
    kill_notify: Arc<Notify>,
}

#[async_trait]
impl EngineControl for FakeControl {
    fn start_kill(&mut self) -> io::Result<()> {
        self.kill_notify.notify_one();
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let notify = self.kill_notify.clone();
        match self.exit_rx.take() {
            Some(rx) => tokio::select! {
                code = rx => Ok(code.unwrap_or(None)),
                _ = notify.notified() => Ok(None),
            },
            None => Ok(None),
        }
    }
}

/// Read requests line by line and answer them per the scripted behavior.
async fn run_engine(stdin: DuplexStream, stdout: DuplexStream, behavior: Behavior) {
    let writer = Arc::new(Mutex::new(stdout));
    let mut lines = BufReader::new(stdin).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(msg) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let method = msg["method"].as_str().unwrap_or("").to_string();
        let Some(id) = msg["id"].as_u64() else {
            // Notifications get no response.
            continue;
        };
        if behavior.silent.contains(&method) {
            continue;
        }

        let reply = build_reply(id, &method, &behavior);
        let delay = behavior.delays.get(&method).copied();
        let noise = behavior.noise.clone();
        let split = behavior.split_writes;
        let writer = Arc::clone(&writer);

        // Each reply is written from its own task so delayed responses
        // arrive out of order relative to faster ones.
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut writer = writer.lock().await;
            for line in &noise {
                let _ = writer.write_all(format!("{line}\n").as_bytes()).await;
            }
            let mut out = reply.to_string();
            out.push('\n');
            if split && out.len() > 8 {
                let mid = out.len() / 2;
                let _ = writer.write_all(&out.as_bytes()[..mid]).await;
                let _ = writer.flush().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _ = writer.write_all(&out.as_bytes()[mid..]).await;
            } else {
                let _ = writer.write_all(out.as_bytes()).await;
            }
            let _ = writer.flush().await;
        });
    }
}

fn build_reply(id: u64, method: &str, behavior: &Behavior) -> Value {
    if method == "initialize" {
        return json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake-engine", "version": "0.1.0"}
            }
        });
    }
    if let Some((code, message)) = behavior.errors.get(method) {
        return json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        });
    }
    if method == "tools/list" {
        return json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"tools": behavior.tools}
        });
    }
    if let Some(result) = behavior.responses.get(method) {
        return json!({"jsonrpc": "2.0", "id": id, "result": result});
    }
    json!({"jsonrpc": "2.0", "id": id, "result": {"echo": method}})
}
