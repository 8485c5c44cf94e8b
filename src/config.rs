//! Session configuration and executable discovery.

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of reconnection attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between reconnection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default engine binary name used by executable discovery.
pub const DEFAULT_ENGINE_NAME: &str = "analysis-engine";

/// Configuration for an [`EngineSession`](crate::EngineSession).
///
/// Build via [`SessionConfig::builder`]:
///
/// ```
/// use std::time::Duration;
/// use enginelink::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .engine_name("analysis-engine")
///     .call_timeout(Duration::from_secs(10))
///     .auto_reconnect(true)
///     .max_retries(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Explicit path to the engine executable. When set, discovery is skipped.
    pub executable: Option<PathBuf>,
    /// Binary name probed for when no explicit path is configured.
    pub engine_name: String,
    /// Timeout applied independently to every remote call.
    pub call_timeout: Duration,
    /// Whether an unexpected exit while connected triggers reconnection.
    pub auto_reconnect: bool,
    /// Maximum consecutive reconnection attempts before giving up.
    pub max_retries: u32,
    /// Fixed delay between reconnection attempts.
    pub retry_delay: Duration,
}

impl SessionConfig {
    /// Create a builder with default settings.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Locate the engine executable.
    ///
    /// An explicit [`executable`](Self::executable) override is returned
    /// verbatim. Otherwise a fixed list of locations is probed for
    /// [`engine_name`](Self::engine_name): the current directory,
    /// `~/.local/bin`, `/usr/local/bin`, and `/usr/bin`.
    pub fn locate_executable(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.executable {
            return Some(path.clone());
        }

        for dir in self.search_dirs() {
            let candidate = dir.join(&self.engine_name);
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "located engine executable");
                return Some(candidate);
            }
        }
        None
    }

    /// The directories probed by [`locate_executable`](Self::locate_executable).
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![PathBuf::from(".")];
        if let Some(home) = dirs::home_dir() {
            dirs.push(home.join(".local/bin"));
        }
        dirs.push(PathBuf::from("/usr/local/bin"));
        dirs.push(PathBuf::from("/usr/bin"));
        dirs
    }

    /// Human-readable description of the probed locations, for error messages.
    pub(crate) fn searched_description(&self) -> String {
        self.search_dirs()
            .iter()
            .map(|d| d.join(&self.engine_name).display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            executable: None,
            engine_name: DEFAULT_ENGINE_NAME.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            auto_reconnect: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    executable: Option<PathBuf>,
    engine_name: Option<String>,
    call_timeout: Option<Duration>,
    auto_reconnect: Option<bool>,
    max_retries: Option<u32>,
    retry_delay: Option<Duration>,
}

impl SessionConfigBuilder {
    /// Explicit path to the engine executable (skips discovery).
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Binary name probed for by executable discovery.
    pub fn engine_name(mut self, name: impl Into<String>) -> Self {
        self.engine_name = Some(name.into());
        self
    }

    /// Timeout applied independently to every remote call.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Whether an unexpected exit while connected triggers reconnection.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = Some(enabled);
        self
    }

    /// Maximum consecutive reconnection attempts before giving up.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Fixed delay between reconnection attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the call timeout is zero or the
    /// engine name is empty.
    pub fn build(self) -> Result<SessionConfig> {
        let defaults = SessionConfig::default();

        let call_timeout = self.call_timeout.unwrap_or(defaults.call_timeout);
        if call_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "call timeout must be non-zero".to_string(),
            ));
        }

        let engine_name = self.engine_name.unwrap_or(defaults.engine_name);
        if engine_name.is_empty() {
            return Err(Error::InvalidConfig(
                "engine name must not be empty".to_string(),
            ));
        }

        Ok(SessionConfig {
            executable: self.executable,
            engine_name,
            call_timeout,
            auto_reconnect: self.auto_reconnect.unwrap_or(defaults.auto_reconnect),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_delay: self.retry_delay.unwrap_or(defaults.retry_delay),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = SessionConfig::builder().build().unwrap();
        assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
        assert!(config.auto_reconnect);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(config.engine_name, DEFAULT_ENGINE_NAME);
        assert!(config.executable.is_none());
    }

    #[test]
    fn builder_chains_options() {
        let config = SessionConfig::builder()
            .executable("/opt/engine/bin/engine")
            .engine_name("engine")
            .call_timeout(Duration::from_secs(5))
            .auto_reconnect(false)
            .max_retries(7)
            .retry_delay(Duration::from_millis(250))
            .build()
            .unwrap();

        assert_eq!(
            config.executable.as_deref(),
            Some(std::path::Path::new("/opt/engine/bin/engine"))
        );
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert!(!config.auto_reconnect);
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = SessionConfig::builder()
            .call_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn empty_engine_name_is_rejected() {
        let err = SessionConfig::builder().engine_name("").build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn explicit_executable_skips_probing() {
        let config = SessionConfig::builder()
            .executable("/nonexistent/engine")
            .build()
            .unwrap();
        // The override is trusted verbatim, even if the file is missing.
        assert_eq!(
            config.locate_executable().as_deref(),
            Some(std::path::Path::new("/nonexistent/engine"))
        );
    }

    #[test]
    fn discovery_misses_return_none() {
        let config = SessionConfig::builder()
            .engine_name("enginelink-test-binary-that-does-not-exist")
            .build()
            .unwrap();
        assert_eq!(config.locate_executable(), None);
    }

    #[test]
    fn searched_description_lists_candidates() {
        let config = SessionConfig::builder().engine_name("probe").build().unwrap();
        let description = config.searched_description();
        assert!(description.contains("/usr/local/bin/probe"));
        assert!(description.contains("/usr/bin/probe"));
    }
}
