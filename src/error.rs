use std::time::Duration;

/// Errors that can occur when using enginelink.
///
/// Errors are organized by category:
/// - Configuration errors: detected at `build()` time
/// - Spawn errors: failed to start the engine process
/// - Connection errors: the session is not (or no longer) usable
/// - Call errors: a single remote call failed, connection unaffected
/// - Protocol errors: unexpected or malformed engine output
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // -------------------------------------------------------------------------
    // Configuration errors (detected at build() time)
    // -------------------------------------------------------------------------
    /// Invalid configuration provided to builder.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -------------------------------------------------------------------------
    // Spawn errors
    // -------------------------------------------------------------------------
    /// Engine executable could not be located.
    #[error("engine executable not found (searched: {searched})")]
    ExecutableNotFound { searched: String },

    /// Failed to spawn the engine subprocess.
    #[error("failed to spawn engine process: {0}")]
    Spawn(#[source] std::io::Error),

    /// Process spawned but the initial handshake failed or never answered.
    #[error("handshake failed: {message}")]
    Handshake { message: String },

    // -------------------------------------------------------------------------
    // Connection errors
    // -------------------------------------------------------------------------
    /// A call was attempted while the session is not connected.
    #[error("not connected to engine")]
    NotConnected,

    /// The engine process exited while the session believed itself connected.
    #[error("engine process exited unexpectedly (code: {code:?})")]
    ProcessExit { code: Option<i32> },

    /// The session was disconnected while the call was in flight.
    #[error("client disconnected")]
    Disconnected,

    /// IO error communicating with the engine subprocess.
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // Call errors
    // -------------------------------------------------------------------------
    /// A response for this request did not arrive within the timeout.
    #[error("request {id} ({method}) timed out after {after:?}")]
    Timeout {
        id: u64,
        method: String,
        after: Duration,
    },

    /// The engine explicitly reported a method-level failure.
    #[error("engine error: {message}")]
    Remote { code: Option<i64>, message: String },

    // -------------------------------------------------------------------------
    // Protocol errors
    // -------------------------------------------------------------------------
    /// Failed to parse JSON from engine output.
    #[error("failed to parse JSON: {message}")]
    Parse {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A specialized Result type for enginelink operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a parse error with context from the offending line.
    pub fn parse(source: serde_json::Error, raw: &str) -> Self {
        Self::Parse {
            message: format!(
                "at column {}: {}",
                source.column(),
                raw.chars().take(100).collect::<String>()
            ),
            source,
        }
    }

    /// Create an IO error.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io(source)
    }

    /// Check if this error indicates the connection itself is gone or unusable.
    ///
    /// Connection errors are surfaced through lifecycle events and fail any
    /// in-flight calls; they are never thrown into unrelated code paths.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::ExecutableNotFound { .. }
                | Error::Spawn(_)
                | Error::Handshake { .. }
                | Error::NotConnected
                | Error::ProcessExit { .. }
                | Error::Disconnected
                | Error::Io(_)
        )
    }

    /// Check if this error is local to a single call.
    ///
    /// Call errors leave the connection `connected`; retrying the operation
    /// is a caller decision.
    pub fn is_call_error(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::Remote { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse {
            message: err.to_string(),
            source: err,
        }
    }
}
