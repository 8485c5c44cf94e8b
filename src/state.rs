//! Connection lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The connection state of an engine session.
///
/// Transitions:
///
/// ```text
/// Disconnected --connect()--------------------> Connecting
/// Connecting   --spawn + handshake succeed----> Connected
/// Connecting   --spawn or handshake fail------> Error
/// Connected    --unexpected exit--------------> Disconnected (or back to
///                                               Connecting via reconnect)
/// any state    --disconnect()-----------------> Disconnected
/// ```
///
/// `connect()` is a no-op while the state is already [`Connecting`] or
/// [`Connected`].
///
/// [`Connecting`]: ConnectionState::Connecting
/// [`Connected`]: ConnectionState::Connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No subprocess, no session. Initial and terminal state.
    #[default]
    Disconnected,
    /// Subprocess is being spawned or the handshake is in flight.
    Connecting,
    /// Handshake completed; remote calls are permitted.
    Connected,
    /// Spawn or handshake failed, or reconnection attempts were exhausted.
    Error,
}

impl ConnectionState {
    /// Whether a subprocess handle may exist in this state.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// Whether `connect()` should start a fresh spawn from this state.
    ///
    /// Returns `false` for [`Connecting`](Self::Connecting) and
    /// [`Connected`](Self::Connected): a connect attempt is already in
    /// progress or finished, and `connect()` must not re-enter a fresh spawn.
    pub fn accepts_connect(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_gating() {
        assert!(ConnectionState::Disconnected.accepts_connect());
        assert!(ConnectionState::Error.accepts_connect());
        assert!(!ConnectionState::Connecting.accepts_connect());
        assert!(!ConnectionState::Connected.accepts_connect());
    }

    #[test]
    fn active_states_hold_a_process() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(!ConnectionState::Error.is_active());
    }

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Error.to_string(), "error");
    }
}
