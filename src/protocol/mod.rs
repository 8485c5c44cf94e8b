//! JSON-RPC 2.0 wire types for engine communication.
//!
//! The engine speaks newline-delimited JSON-RPC 2.0 over its standard
//! streams. Each line is one complete JSON object:
//!
//! - Request: `{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}`
//! - Notification (no id): `{"jsonrpc":"2.0","method":"notifications/initialized"}`
//! - Response: `{"jsonrpc":"2.0","id":1,"result":...}` or
//!   `{"jsonrpc":"2.0","id":1,"error":{"message":"..."}}`
//!
//! Inbound lines are decoded once, at the framing boundary, into the closed
//! [`Incoming`] set; everything downstream pattern-matches on it
//! exhaustively instead of poking at raw [`serde_json::Value`]s.

mod wire;

pub use wire::{
    decode, Capability, CapabilityList, ClientInfo, Incoming, InitializeParams, InitializeResult,
    InvocationOutcome, Notification, RemoteErrorBody, Request, ServerInfo,
};

/// JSON-RPC version string carried on every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision announced during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Handshake request method.
pub const METHOD_INITIALIZE: &str = "initialize";

/// Fire-and-forget notification sent after a successful handshake.
pub const METHOD_INITIALIZED: &str = "notifications/initialized";

/// Enumerates the engine's named operations.
pub const METHOD_LIST_CAPABILITIES: &str = "tools/list";

/// Invokes a named operation with arguments.
pub const METHOD_INVOKE_CAPABILITY: &str = "tools/call";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Incoming>();
        assert_send_sync::<Request>();
        assert_send_sync::<Notification>();
        assert_send_sync::<Capability>();
        assert_send_sync::<ServerInfo>();
        assert_send_sync::<RemoteErrorBody>();
    }
}
