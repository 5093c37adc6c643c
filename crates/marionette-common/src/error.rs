//! Error types for marionette

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote call failed: {message}")]
    Remote {
        message: String,
        remote_stack: Option<String>,
    },

    #[error("Type resolution failed for '{name}': {reason}")]
    TypeResolution { name: String, reason: String },

    #[error("Pathological type name rejected ('{name}'): {reason}")]
    PathologicalType { name: String, reason: String },

    #[error("Unknown correlation token: {0}")]
    UnknownToken(u32),

    #[error("Object handle used after release (address {0:#x})")]
    UseAfterRelease(u64),

    #[error("Marshaling error: {0}")]
    Marshal(String),

    #[error("Ambiguous overload: {type_name}::{method} has {candidates} candidates with {arity} argument(s)")]
    AmbiguousOverload {
        type_name: String,
        method: String,
        arity: usize,
        candidates: usize,
    },

    #[error("Member not found: {type_name}::{member}")]
    MemberNotFound { type_name: String, member: String },

    #[error("Method {type_name}::{method} contains open generic parameters")]
    OpenGenerics { type_name: String, method: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = Error::Transport("connection reset".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_remote_error_display() {
        let err = Error::Remote {
            message: "NullReferenceException".to_string(),
            remote_stack: Some("at Game.Update()".to_string()),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("NullReferenceException"));
    }

    #[test]
    fn test_use_after_release_display() {
        let err = Error::UseAfterRelease(0xDEADBEEF);
        let msg = format!("{}", err);
        assert!(msg.contains("0xdeadbeef"));
    }

    #[test]
    fn test_ambiguous_overload_display() {
        let err = Error::AmbiguousOverload {
            type_name: "Game.Player".to_string(),
            method: "Attack".to_string(),
            arity: 2,
            candidates: 3,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Game.Player::Attack"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_pathological_type_display() {
        let err = Error::PathologicalType {
            name: "A[][][][][][]".to_string(),
            reason: "self-referential array nesting".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("self-referential array nesting"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Transport(_)));
    }
}
