//! Frame types and the inbound decode step.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JSONRPC_VERSION, PROTOCOL_VERSION};
use crate::{Error, Result};

/// An outbound JSON-RPC request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Create a request frame.
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }

    /// Serialize to one newline-terminated wire line.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// An outbound JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    /// Create a notification frame.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }

    /// Serialize to one newline-terminated wire line.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// The error object of a JSON-RPC error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RemoteErrorBody> for Error {
    fn from(body: RemoteErrorBody) -> Self {
        Error::Remote {
            code: body.code,
            message: body.message,
        }
    }
}

/// One decoded inbound message.
///
/// Every line from the engine's stdout is classified into exactly one of
/// these variants. [`Unrecognized`](Incoming::Unrecognized) carries frames
/// that are valid JSON but not valid JSON-RPC; they are logged and dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A successful response to one of our requests.
    Success { id: u64, result: Value },
    /// An error response to one of our requests.
    Failure { id: u64, error: RemoteErrorBody },
    /// A server-initiated notification.
    Notification { method: String, params: Option<Value> },
    /// A server-initiated request. This client does not answer these.
    Request {
        id: u64,
        method: String,
        params: Option<Value>,
    },
    /// JSON that is not a recognizable JSON-RPC frame.
    Unrecognized(Value),
}

/// Decode one wire line into an [`Incoming`] message.
///
/// Fails only when the line is not valid JSON at all; structurally odd but
/// parseable frames come back as [`Incoming::Unrecognized`].
pub fn decode(line: &str) -> Result<Incoming> {
    let value: Value = serde_json::from_str(line).map_err(|e| Error::parse(e, line))?;
    Ok(classify(value))
}

fn classify(value: Value) -> Incoming {
    if let Some(obj) = value.as_object() {
        let id = obj.get("id").and_then(Value::as_u64);
        let method = obj.get("method").and_then(|m| m.as_str().map(str::to_owned));
        let params = obj.get("params").cloned();

        match (id, method) {
            (Some(id), Some(method)) => return Incoming::Request { id, method, params },
            (None, Some(method)) => return Incoming::Notification { method, params },
            (Some(id), None) => {
                if let Some(raw) = obj.get("error") {
                    let error = serde_json::from_value(raw.clone()).unwrap_or_else(|_| {
                        RemoteErrorBody {
                            code: None,
                            message: raw.to_string(),
                            data: None,
                        }
                    });
                    return Incoming::Failure { id, error };
                }
                if let Some(result) = obj.get("result") {
                    return Incoming::Success {
                        id,
                        result: result.clone(),
                    };
                }
            }
            (None, None) => {}
        }
    }
    Incoming::Unrecognized(value)
}

/// Client identity announced during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl ClientInfo {
    /// Identity of this crate.
    pub fn this_crate() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Params for the `initialize` handshake request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: &'static str,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            capabilities: Value::Object(Default::default()),
            client_info: ClientInfo::this_crate(),
        }
    }
}

/// Server identity returned by the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Result payload of the `initialize` handshake.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
    pub server_info: ServerInfo,
}

/// One remotely advertised operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "inputSchema",
        skip_serializing_if = "Option::is_none"
    )]
    pub input_schema: Option<Value>,
}

/// Result payload of the capability enumeration call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CapabilityList {
    #[serde(default)]
    pub tools: Vec<Capability>,
}

/// Result payload of a capability invocation.
///
/// Carries either structured content or an error flag plus message encoded
/// in the content items.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationOutcome {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl InvocationOutcome {
    /// Concatenated text of all `{"type":"text"}` content items.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("")
    }
}
