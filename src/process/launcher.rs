//! The launcher seam and its real OS implementation.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use crate::{Error, Result};

/// Writable half of a launched engine's stdin.
pub type EngineStdin = Box<dyn AsyncWrite + Send + Unpin>;

/// Readable half of a launched engine's stdout or stderr.
pub type EngineStdout = Box<dyn AsyncRead + Send + Unpin>;

/// The I/O and control handles of one launched engine process.
///
/// Ownership is handed to the session wholesale; the session owns the
/// subprocess exclusively and no external code may touch its streams.
pub struct LaunchedEngine {
    pub stdin: EngineStdin,
    pub stdout: EngineStdout,
    pub stderr: Option<EngineStdout>,
    pub control: Box<dyn EngineControl>,
}

impl std::fmt::Debug for LaunchedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedEngine")
            .field("pid", &self.control.pid())
            .field("has_stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

/// Lifecycle control over a launched engine.
#[async_trait]
pub trait EngineControl: Send {
    /// Request termination without waiting for it to complete.
    fn start_kill(&mut self) -> std::io::Result<()>;

    /// Wait for the process to exit and return its exit code, if any.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;

    /// OS process id, when one exists.
    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Spawns engine processes.
///
/// The real variant is [`OsLauncher`]; tests inject scripted doubles so the
/// session never depends on a concrete OS binding.
pub trait EngineLauncher: Send + Sync {
    /// Spawn the engine at `executable` with piped standard streams.
    fn launch(&self, executable: &Path) -> Result<LaunchedEngine>;
}

/// Launches real OS processes via [`tokio::process::Command`].
///
/// No shell interpretation: the executable is invoked directly. The child is
/// killed when its handle is dropped, so an abandoned connection cannot leak
/// a subprocess.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLauncher;

impl EngineLauncher for OsLauncher {
    fn launch(&self, executable: &Path) -> Result<LaunchedEngine> {
        let mut cmd = Command::new(executable);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ExecutableNotFound {
                    searched: executable.display().to_string(),
                }
            } else {
                Error::Spawn(e)
            }
        })?;

        let stdin = child.stdin.take().expect("stdin was configured");
        let stdout = child.stdout.take().expect("stdout was configured");
        let stderr = child.stderr.take().expect("stderr was configured");

        tracing::debug!(pid = ?child.id(), path = %executable.display(), "spawned engine process");

        Ok(LaunchedEngine {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Some(Box::new(stderr)),
            control: Box::new(ChildControl { child }),
        })
    }
}

struct ChildControl {
    child: Child,
}

#[async_trait]
impl EngineControl for ChildControl {
    fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_maps_to_not_found() {
        let err = OsLauncher
            .launch(Path::new("/nonexistent/enginelink-test-binary"))
            .unwrap_err();
        assert!(matches!(err, Error::ExecutableNotFound { .. }));
    }

    #[tokio::test]
    async fn launch_pipes_all_streams() {
        // `true` exits immediately but spawns with all pipes configured.
        let launched = OsLauncher.launch(Path::new("/bin/true"));
        let Ok(mut launched) = launched else {
            // Not every environment has /bin/true; nothing else to assert.
            return;
        };
        assert!(launched.stderr.is_some());
        assert!(format!("{launched:?}").contains("LaunchedEngine"));
        let code = launched.control.wait().await.unwrap();
        assert_eq!(code, Some(0));
    }
}
