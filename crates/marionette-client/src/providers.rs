//! Agent-side contracts consumed by the engine
//!
//! Abstract interfaces over the collaborators running inside the target
//! process. The wire client implements all of them; tests substitute
//! in-memory fakes.

use marionette_common::error::Result;
use marionette_common::types::{
    CorrelationToken, HeapCandidate, HookPosition, ModuleInfo, ObjectSnapshot, RemoteValue,
    TypeDescriptor,
};

/// Produces type descriptors, from managed metadata or native RTTI
pub trait TypeDumpProvider: Send + Sync {
    fn dump_type(&self, module: Option<&str>, full_name: &str) -> Result<TypeDescriptor>;
}

/// Produces member-value snapshots and heap queries
pub trait ObjectDumpProvider: Send + Sync {
    fn dump_object(&self, address: u64) -> Result<ObjectSnapshot>;
    fn query_instances(&self, type_full_name: &str) -> Result<Vec<HeapCandidate>>;
    fn list_modules(&self) -> Result<Vec<ModuleInfo>>;
}

/// Executes invocations and field access in the target
pub trait InvocationExecutor: Send + Sync {
    /// Invoke a method; `address` zero means static invocation
    fn invoke(
        &self,
        address: u64,
        type_full_name: &str,
        method_key: &str,
        generic_args: &[String],
        args: &[RemoteValue],
    ) -> Result<Option<RemoteValue>>;

    fn create_object(
        &self,
        module: Option<&str>,
        type_full_name: &str,
        args: &[RemoteValue],
    ) -> Result<RemoteValue>;

    /// Read a field; `address` zero means static access
    fn get_field(&self, address: u64, type_full_name: &str, name: &str) -> Result<RemoteValue>;

    /// Write a field; `address` zero means static access
    fn set_field(
        &self,
        address: u64,
        type_full_name: &str,
        name: &str,
        value: &RemoteValue,
    ) -> Result<()>;
}

/// Manages event subscriptions and method hooks keyed by token
pub trait CallbackControl: Send + Sync {
    fn subscribe_event(
        &self,
        address: u64,
        type_full_name: &str,
        event_name: &str,
        token: CorrelationToken,
    ) -> Result<()>;

    fn unsubscribe_event(&self, token: CorrelationToken) -> Result<()>;

    fn hook_method(
        &self,
        type_full_name: &str,
        method_key: &str,
        position: HookPosition,
        token: CorrelationToken,
    ) -> Result<()>;

    fn unhook_method(&self, token: CorrelationToken) -> Result<()>;

    /// Tell the agent where the reverse callback channel listens
    fn register_callback_channel(&self, host: &str, port: u16) -> Result<()>;
}

/// Releases object pins held on the agent side
pub trait PinningControl: Send + Sync {
    fn unpin(&self, address: u64) -> Result<()>;
}

/// Liveness check
pub trait Liveness: Send + Sync {
    fn ping(&self) -> Result<()>;
}

/// The full agent surface the session operates against
pub trait AgentConnection:
    TypeDumpProvider + ObjectDumpProvider + InvocationExecutor + CallbackControl + PinningControl + Liveness
{
}

impl<T> AgentConnection for T where
    T: TypeDumpProvider
        + ObjectDumpProvider
        + InvocationExecutor
        + CallbackControl
        + PinningControl
        + Liveness
{
}
