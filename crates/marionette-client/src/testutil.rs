//! In-memory agent fake for unit tests
//!
//! Scripted stand-in for the wire client: descriptors, snapshots and
//! invocation results are seeded up front, and every call is counted or
//! logged so tests can assert exactly what went over the "network".

use crate::providers::{
    CallbackControl, InvocationExecutor, Liveness, ObjectDumpProvider, PinningControl,
    TypeDumpProvider,
};
use marionette_common::error::{Error, Result};
use marionette_common::types::{
    CorrelationToken, HeapCandidate, HookPosition, ModuleInfo, ObjectSnapshot, RemoteValue,
    RuntimeKind, TypeDescriptor,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
pub(crate) struct InvocationRecord {
    pub address: u64,
    pub type_full_name: String,
    pub method_key: String,
    pub generic_args: Vec<String>,
    pub args: Vec<RemoteValue>,
}

#[derive(Default)]
pub(crate) struct FakeAgent {
    types: Mutex<HashMap<String, TypeDescriptor>>,
    snapshots: Mutex<HashMap<u64, ObjectSnapshot>>,
    instances: Mutex<HashMap<String, Vec<HeapCandidate>>>,
    static_fields: Mutex<HashMap<(String, String), RemoteValue>>,
    live_fields: Mutex<HashMap<(u64, String), RemoteValue>>,
    invoke_results: Mutex<VecDeque<Option<RemoteValue>>>,
    create_results: Mutex<VecDeque<RemoteValue>>,
    pub invocations: Mutex<Vec<InvocationRecord>>,
    pub field_writes: Mutex<Vec<(u64, String, String, RemoteValue)>>,
    pub subscriptions: Mutex<Vec<(u64, String, String, CorrelationToken)>>,
    pub hooks: Mutex<Vec<(String, String, HookPosition, CorrelationToken)>>,
    pub channel_registrations: Mutex<Vec<(String, u16)>>,
    dump_type_count: AtomicUsize,
    dump_object_count: AtomicUsize,
    unpin_count: AtomicUsize,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&self, descriptor: TypeDescriptor) {
        self.types
            .lock()
            .insert(descriptor.full_name.clone(), descriptor);
    }

    pub fn add_snapshot(&self, snapshot: ObjectSnapshot) {
        self.snapshots.lock().insert(snapshot.address, snapshot);
    }

    pub fn add_instances(&self, type_full_name: &str, candidates: Vec<HeapCandidate>) {
        self.instances
            .lock()
            .insert(type_full_name.to_string(), candidates);
    }

    pub fn set_static_field(&self, type_full_name: &str, name: &str, value: RemoteValue) {
        self.static_fields
            .lock()
            .insert((type_full_name.to_string(), name.to_string()), value);
    }

    pub fn set_live_field(&self, address: u64, name: &str, value: RemoteValue) {
        self.live_fields
            .lock()
            .insert((address, name.to_string()), value);
    }

    pub fn push_invoke_result(&self, result: Option<RemoteValue>) {
        self.invoke_results.lock().push_back(result);
    }

    pub fn push_create_result(&self, result: RemoteValue) {
        self.create_results.lock().push_back(result);
    }

    pub fn dump_type_calls(&self) -> usize {
        self.dump_type_count.load(Ordering::SeqCst)
    }

    pub fn dump_object_calls(&self) -> usize {
        self.dump_object_count.load(Ordering::SeqCst)
    }

    pub fn unpin_calls(&self) -> usize {
        self.unpin_count.load(Ordering::SeqCst)
    }
}

impl TypeDumpProvider for FakeAgent {
    fn dump_type(&self, _module: Option<&str>, full_name: &str) -> Result<TypeDescriptor> {
        self.dump_type_count.fetch_add(1, Ordering::SeqCst);
        self.types
            .lock()
            .get(full_name)
            .cloned()
            .ok_or_else(|| Error::TypeResolution {
                name: full_name.to_string(),
                reason: "type not found".to_string(),
            })
    }
}

impl ObjectDumpProvider for FakeAgent {
    fn dump_object(&self, address: u64) -> Result<ObjectSnapshot> {
        self.dump_object_count.fetch_add(1, Ordering::SeqCst);
        self.snapshots
            .lock()
            .get(&address)
            .cloned()
            .ok_or_else(|| Error::Remote {
                message: format!("no pinned object at {address:#x}"),
                remote_stack: None,
            })
    }

    fn query_instances(&self, type_full_name: &str) -> Result<Vec<HeapCandidate>> {
        Ok(self
            .instances
            .lock()
            .get(type_full_name)
            .cloned()
            .unwrap_or_default())
    }

    fn list_modules(&self) -> Result<Vec<ModuleInfo>> {
        Ok(vec![ModuleInfo {
            name: "Game.dll".to_string(),
            runtime: RuntimeKind::Managed,
            base_address: None,
        }])
    }
}

impl InvocationExecutor for FakeAgent {
    fn invoke(
        &self,
        address: u64,
        type_full_name: &str,
        method_key: &str,
        generic_args: &[String],
        args: &[RemoteValue],
    ) -> Result<Option<RemoteValue>> {
        self.invocations.lock().push(InvocationRecord {
            address,
            type_full_name: type_full_name.to_string(),
            method_key: method_key.to_string(),
            generic_args: generic_args.to_vec(),
            args: args.to_vec(),
        });
        Ok(self.invoke_results.lock().pop_front().unwrap_or(None))
    }

    fn create_object(
        &self,
        _module: Option<&str>,
        type_full_name: &str,
        _args: &[RemoteValue],
    ) -> Result<RemoteValue> {
        self.create_results
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Remote {
                message: format!("no constructor scripted for {type_full_name}"),
                remote_stack: None,
            })
    }

    fn get_field(&self, address: u64, type_full_name: &str, name: &str) -> Result<RemoteValue> {
        let scripted = if address == 0 {
            self.static_fields
                .lock()
                .get(&(type_full_name.to_string(), name.to_string()))
                .cloned()
        } else {
            self.live_fields
                .lock()
                .get(&(address, name.to_string()))
                .cloned()
        };
        scripted.ok_or_else(|| Error::Remote {
            message: format!("field {name} not found on {type_full_name}"),
            remote_stack: None,
        })
    }

    fn set_field(
        &self,
        address: u64,
        type_full_name: &str,
        name: &str,
        value: &RemoteValue,
    ) -> Result<()> {
        self.field_writes.lock().push((
            address,
            type_full_name.to_string(),
            name.to_string(),
            value.clone(),
        ));
        Ok(())
    }
}

impl CallbackControl for FakeAgent {
    fn subscribe_event(
        &self,
        address: u64,
        type_full_name: &str,
        event_name: &str,
        token: CorrelationToken,
    ) -> Result<()> {
        self.subscriptions.lock().push((
            address,
            type_full_name.to_string(),
            event_name.to_string(),
            token,
        ));
        Ok(())
    }

    fn unsubscribe_event(&self, token: CorrelationToken) -> Result<()> {
        self.subscriptions.lock().retain(|(_, _, _, t)| *t != token);
        Ok(())
    }

    fn hook_method(
        &self,
        type_full_name: &str,
        method_key: &str,
        position: HookPosition,
        token: CorrelationToken,
    ) -> Result<()> {
        self.hooks.lock().push((
            type_full_name.to_string(),
            method_key.to_string(),
            position,
            token,
        ));
        Ok(())
    }

    fn unhook_method(&self, token: CorrelationToken) -> Result<()> {
        self.hooks.lock().retain(|(_, _, _, t)| *t != token);
        Ok(())
    }

    fn register_callback_channel(&self, host: &str, port: u16) -> Result<()> {
        self.channel_registrations
            .lock()
            .push((host.to_string(), port));
        Ok(())
    }
}

impl PinningControl for FakeAgent {
    fn unpin(&self, _address: u64) -> Result<()> {
        self.unpin_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Liveness for FakeAgent {
    fn ping(&self) -> Result<()> {
        Ok(())
    }
}
