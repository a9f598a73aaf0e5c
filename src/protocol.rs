use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

pub const JSONRPC_VERSION: &str = "2.0";

/// Longest line accepted from the server, terminator excluded
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// The `error` member of an error reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC 2.0 message enum
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Call a remote method: {"jsonrpc","id","method","params"}
    Request {
        id: u64,
        method: String,
        params: Value,
    },

    /// Server push with no id: {"jsonrpc","method","params"}
    Notification { method: String, params: Value },

    /// Successful reply: {"jsonrpc","id","result"}
    Response { id: u64, result: Value },

    /// Error reply: {"jsonrpc","id","error":{"code","message","data"}}
    ///
    /// `id` is `None` when the server could not read the request id.
    Error {
        id: Option<u64>,
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl Message {
    pub fn new_request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Message::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn new_notification(method: impl Into<String>, params: Value) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn new_response(id: u64, result: Value) -> Self {
        Message::Response { id, result }
    }

    pub fn new_error(id: Option<u64>, code: i64, message: impl Into<String>) -> Self {
        Message::Error {
            id,
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Correlation id, if the message carries one
    pub fn id(&self) -> Option<u64> {
        match self {
            Message::Request { id, .. } => Some(*id),
            Message::Response { id, .. } => Some(*id),
            Message::Error { id, .. } => *id,
            Message::Notification { .. } => None,
        }
    }

    /// Serialize message to a single JSON line (without the terminator)
    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            Message::Request { id, method, params } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "method": method,
                "params": params,
            }),
            Message::Notification { method, params } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": method,
                "params": params,
            }),
            Message::Response { id, result } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "result": result,
            }),
            Message::Error {
                id,
                code,
                message,
                data,
            } => {
                let error = ErrorObject {
                    code: *code,
                    message: message.clone(),
                    data: data.clone(),
                };
                json!({
                    "jsonrpc": JSONRPC_VERSION,
                    "id": id,
                    "error": error,
                })
            }
        };

        let encoded = serde_json::to_string(&value)?;
        debug!("Serialized to: {}", encoded);
        Ok(encoded)
    }

    /// Parse message from a JSON line
    pub fn from_json(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        let object = match value {
            Value::Object(object) => object,
            other => {
                warn!("Expected JSON object, got: {}", other);
                return Err(ClientError::invalid_message(format!(
                    "Expected object, got: {}",
                    other
                )));
            }
        };

        match object.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            other => {
                return Err(ClientError::invalid_message(format!(
                    "Unsupported jsonrpc version: {:?}",
                    other
                )));
            }
        }

        let id = parse_id(&object)?;

        if let Some(method) = object.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| ClientError::invalid_message("Method name must be a string"))?
                .to_string();
            let params = object.get("params").cloned().unwrap_or(Value::Null);
            return Ok(match id {
                Some(id) => Message::new_request(id, method, params),
                None => Message::new_notification(method, params),
            });
        }

        if let Some(error) = object.get("error") {
            let ErrorObject {
                code,
                message,
                data,
            } = ErrorObject::deserialize(error).map_err(|e| {
                ClientError::invalid_message(format!("Malformed error object: {}", e))
            })?;
            return Ok(Message::Error {
                id,
                code,
                message,
                data,
            });
        }

        // `result: null` is still a result.
        if let Some(result) = object.get("result") {
            let id = id.ok_or_else(|| ClientError::invalid_message("Response without id"))?;
            return Ok(Message::new_response(id, result.clone()));
        }

        Err(ClientError::invalid_message(
            "Message is neither a call, a notification nor a response",
        ))
    }
}

fn parse_id(object: &Map<String, Value>) -> Result<Option<u64>> {
    match object.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(num)) => num
            .as_u64()
            .map(Some)
            .ok_or_else(|| ClientError::invalid_message(format!("Invalid id value: {}", num))),
        Some(other) => Err(ClientError::invalid_message(format!(
            "Expected numeric id, got: {}",
            other
        ))),
    }
}

/// Newline-delimited message framing
pub struct Framer;

impl Framer {
    /// Frame a message by appending the line terminator
    pub fn frame(message: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(message.len() + 1);
        buf.put_slice(message);
        buf.put_u8(b'\n');
        buf.freeze()
    }

    /// Extract the next complete line from buffer, without its terminator.
    ///
    /// Blank lines are consumed and skipped. Fails once a line grows past
    /// [`MAX_LINE_LEN`], complete or not.
    pub fn extract_message(buf: &mut BytesMut) -> Result<Option<Bytes>> {
        loop {
            let newline = match buf.iter().position(|b| *b == b'\n') {
                Some(newline) => newline,
                None if buf.len() > MAX_LINE_LEN => return Err(Self::line_too_long()),
                None => return Ok(None),
            };
            if newline > MAX_LINE_LEN {
                return Err(Self::line_too_long());
            }
            let mut line = buf.split_to(newline + 1);
            line.truncate(newline);
            if line.last() == Some(&b'\r') {
                line.truncate(newline - 1);
            }
            if line.is_empty() {
                continue;
            }
            debug!("Extracted line: {} bytes, {} remaining", line.len(), buf.remaining());
            return Ok(Some(line.freeze()));
        }
    }

    fn line_too_long() -> ClientError {
        ClientError::invalid_message(format!("Line exceeds {} bytes", MAX_LINE_LEN))
    }
}
