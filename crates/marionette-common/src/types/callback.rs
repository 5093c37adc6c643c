//! Reverse channel messages
//!
//! Agent-initiated invocations arrive on the reverse callback channel
//! carrying a correlation token that routes them to the locally
//! registered delegate.

use crate::types::value::RemoteValue;
use serde::{Deserialize, Serialize};

/// Integer key routing an inbound agent-initiated call to a local delegate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationToken(pub u32);

impl std::fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "token_{}", self.0)
    }
}

/// Where a method hook fires relative to the original body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPosition {
    Pre,
    Post,
}

/// One inbound agent-initiated call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackInvocation {
    /// Routing key issued at subscription time
    pub token: CorrelationToken,
    /// The instance the event/hook fired on, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<RemoteValue>,
    /// Non-instance arguments
    #[serde(default)]
    pub args: Vec<RemoteValue>,
    /// Remote call-stack text, supplied for hook invocations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_stack: Option<String>,
}

/// Response body echoed back for a dispatched callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackReply {
    /// True when the callback produced no value
    pub void: bool,
    /// Value returned by an event callback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteValue>,
}

impl CallbackReply {
    pub fn void() -> Self {
        Self {
            void: true,
            value: None,
        }
    }

    pub fn value(value: RemoteValue) -> Self {
        Self {
            void: false,
            value: Some(value),
        }
    }
}

/// Context handed to a hook callback
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Remote call-stack text at the hooked call site
    pub call_stack: Option<String>,
    /// The instance the hooked method ran on
    pub instance: Option<RemoteValue>,
    /// Non-instance arguments of the hooked call
    pub args: Vec<RemoteValue>,
}
