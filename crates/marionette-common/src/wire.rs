//! Wire protocol envelope and framing
//!
//! Every message on the control connection and the reverse callback
//! channel is a length-prefixed (u32 LE) JSON frame carrying either a
//! [`Request`] or a [`Response`]. Responses are correlated to requests
//! by id, never by arrival order.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Maximum size of a single wire message
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Application-level error: the agent executed the request but it failed
pub const ERR_REMOTE: i32 = -32000;
/// The reverse channel received a request for an unregistered token
pub const ERR_UNKNOWN_TOKEN: i32 = -32001;
/// Malformed request envelope
pub const ERR_INVALID_REQUEST: i32 = -32600;
/// Unknown method name
pub const ERR_UNKNOWN_METHOD: i32 = -32601;

/// A single request frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u32,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A single response frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u32,
    #[serde(flatten)]
    pub result: ResponseResult,
}

/// Result body of a response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Success(serde_json::Value),
    Error {
        code: i32,
        message: String,
        /// Remote call-stack text for application-level failures
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remote_stack: Option<String>,
    },
}

impl Request {
    pub fn new(id: u32, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

impl Response {
    pub fn success(id: u32, value: impl Serialize) -> Self {
        Self {
            id,
            result: ResponseResult::Success(
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            ),
        }
    }

    pub fn error(id: u32, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: ResponseResult::Error {
                code,
                message: message.into(),
                remote_stack: None,
            },
        }
    }

    pub fn remote_error(
        id: u32,
        message: impl Into<String>,
        remote_stack: Option<String>,
    ) -> Self {
        Self {
            id,
            result: ResponseResult::Error {
                code: ERR_REMOTE,
                message: message.into(),
                remote_stack,
            },
        }
    }
}

/// Write one length-prefixed JSON frame
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(Error::Protocol(format!(
            "Message too large: {} bytes",
            body.len()
        )));
    }

    let len = (body.len() as u32).to_le_bytes();
    writer
        .write_all(&len)
        .map_err(|e| Error::Transport(format!("Failed to write length: {}", e)))?;
    writer
        .write_all(&body)
        .map_err(|e| Error::Transport(format!("Failed to write body: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Transport(format!("Failed to flush: {}", e)))?;

    Ok(())
}

/// Read one raw frame body, surfacing I/O errors unchanged.
///
/// Not safe to retry after a read timeout: a timeout mid-frame loses
/// the bytes already consumed. Callers polling with read timeouts must
/// track partial progress themselves.
pub fn read_frame_raw<R: Read>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Message too large: {}", len),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(body)
}

/// Read one length-prefixed JSON frame
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let body = read_frame_raw(reader)
        .map_err(|e| Error::Transport(format!("Failed to read frame: {}", e)))?;
    serde_json::from_slice(&body).map_err(|e| Error::Protocol(format!("Invalid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip() {
        let request = Request::new(7, "type.dump", serde_json::json!({"full_name": "Game.Player"}));

        let mut buf = Vec::new();
        write_frame(&mut buf, &request).unwrap();

        // Length prefix matches body length
        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - 4);

        let parsed: Request = read_frame(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed.id, 7);
        assert_eq!(parsed.method, "type.dump");
    }

    #[test]
    fn test_response_success() {
        let response = Response::success(42, serde_json::json!({"ok": true}));
        assert_eq!(response.id, 42);
        assert!(matches!(response.result, ResponseResult::Success(_)));
    }

    #[test]
    fn test_response_error_preserves_id() {
        let response = Response::error(123, ERR_INVALID_REQUEST, "bad request");
        assert_eq!(response.id, 123);
        match response.result {
            ResponseResult::Error { code, message, .. } => {
                assert_eq!(code, ERR_INVALID_REQUEST);
                assert_eq!(message, "bad request");
            }
            _ => panic!("Expected error result"),
        }
    }

    #[test]
    fn test_remote_error_carries_stack() {
        let response = Response::remote_error(
            5,
            "InvalidOperationException",
            Some("at Game.Player.Attack()".to_string()),
        );
        let json = serde_json::to_string(&response).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();
        match parsed.result {
            ResponseResult::Error {
                code,
                remote_stack: Some(stack),
                ..
            } => {
                assert_eq!(code, ERR_REMOTE);
                assert!(stack.contains("Attack"));
            }
            _ => panic!("Expected error with remote stack"),
        }
    }

    #[test]
    fn test_error_without_stack_omits_field() {
        let response = Response::error(1, ERR_UNKNOWN_TOKEN, "unknown token");
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("remote_stack"));
    }

    #[test]
    fn test_read_frame_rejects_oversized() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(u32::MAX).to_le_bytes());
        let result: Result<Request> = read_frame(&mut buf.as_slice());
        assert!(result.is_err());
    }
}
