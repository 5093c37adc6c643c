//! Per-operation request parameters
//!
//! One struct per wire method. Method name constants live alongside so
//! the client and any agent implementation agree on spelling.

use crate::types::callback::{CorrelationToken, HookPosition};
use crate::types::value::RemoteValue;
use serde::{Deserialize, Serialize};

pub mod methods {
    pub const PING: &str = "agent.ping";
    pub const LIST_MODULES: &str = "module.list";
    pub const DUMP_TYPE: &str = "type.dump";
    pub const DUMP_OBJECT: &str = "object.dump";
    pub const QUERY_INSTANCES: &str = "object.query";
    pub const CREATE_OBJECT: &str = "object.create";
    pub const UNPIN_OBJECT: &str = "object.unpin";
    pub const GET_FIELD: &str = "field.get";
    pub const SET_FIELD: &str = "field.set";
    pub const INVOKE_METHOD: &str = "method.invoke";
    pub const INVOKE_STATIC: &str = "method.invoke_static";
    pub const SUBSCRIBE_EVENT: &str = "event.subscribe";
    pub const UNSUBSCRIBE_EVENT: &str = "event.unsubscribe";
    pub const HOOK_METHOD: &str = "hook.install";
    pub const UNHOOK_METHOD: &str = "hook.remove";
    pub const REGISTER_CALLBACK_CHANNEL: &str = "callback.register";
    /// The single method used on the reverse channel
    pub const CALLBACK_INVOKE: &str = "callback.invoke";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpTypeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpObjectParams {
    pub address: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryInstancesParams {
    pub type_full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldParams {
    /// Zero for static access
    pub address: u64,
    pub type_full_name: String,
    pub name: String,
    /// Present for set, absent for get
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeParams {
    /// Zero for static invocation
    pub address: u64,
    pub type_full_name: String,
    /// Invocation key: display name or mangled name for natives
    pub method_key: String,
    /// Explicit generic instantiation arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_args: Vec<String>,
    #[serde(default)]
    pub args: Vec<RemoteValue>,
}

/// Result body for invocations; `value` is absent for void returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateObjectParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub type_full_name: String,
    #[serde(default)]
    pub args: Vec<RemoteValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeEventParams {
    /// Zero for static events
    pub address: u64,
    pub type_full_name: String,
    pub event_name: String,
    pub token: CorrelationToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookMethodParams {
    pub type_full_name: String,
    pub method_key: String,
    pub position: HookPosition,
    pub token: CorrelationToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenParams {
    pub token: CorrelationToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnpinParams {
    pub address: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCallbackChannelParams {
    pub host: String,
    pub port: u16,
}
