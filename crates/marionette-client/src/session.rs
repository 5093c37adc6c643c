//! Remote session
//!
//! Top-level owner of one agent connection: the wire client, the
//! resolver cache, the type graph builder and the reverse callback
//! channel all live here, explicitly constructed per session rather
//! than as process globals. Dropping the session tears the callback
//! channel down; remote object pins are released only by explicit
//! caller action.

use crate::cache::ResolverCache;
use crate::config::SessionConfig;
use crate::graph::TypeGraphBuilder;
use crate::handle::ObjectHandle;
use crate::providers::{AgentConnection, TypeDumpProvider};
use crate::proxy::{Arg, RemoteObject, Returned};
use crate::reverse::{CallbackChannel, EventCallback, HookCallback};
use crate::transport::WireClient;
use marionette_common::error::{Error, Result};
use marionette_common::types::{CorrelationToken, HeapCandidate, HookPosition, ModuleInfo};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub struct RemoteSession {
    agent: Arc<dyn AgentConnection>,
    builder: Arc<TypeGraphBuilder>,
    channel: Arc<CallbackChannel>,
    modules: Mutex<Option<Vec<ModuleInfo>>>,
}

impl RemoteSession {
    /// Connect to the agent named by the config
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        let client = Arc::new(WireClient::connect(config)?);
        Ok(Self::over(client, config))
    }

    /// Build a session over an already-established agent connection
    pub fn over(agent: Arc<dyn AgentConnection>, config: &SessionConfig) -> Self {
        let cache = Arc::new(ResolverCache::new());
        let builder = Arc::new(TypeGraphBuilder::new(
            Arc::clone(&cache),
            Arc::clone(&agent) as Arc<dyn TypeDumpProvider>,
        ));
        let channel = Arc::new(CallbackChannel::new(
            &config.callback_host,
            config.callback_port,
            config.callback_poll_interval_ms,
        ));
        Self {
            agent,
            builder,
            channel,
            modules: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &Arc<ResolverCache> {
        self.builder.cache()
    }

    pub fn ping(&self) -> Result<()> {
        self.agent.ping()
    }

    /// Modules loaded in the target, fetched once per session
    pub fn modules(&self) -> Result<Vec<ModuleInfo>> {
        let mut modules = self.modules.lock();
        if let Some(cached) = modules.as_ref() {
            return Ok(cached.clone());
        }
        let fetched = self.agent.list_modules()?;
        *modules = Some(fetched.clone());
        Ok(fetched)
    }

    /// Static proxy over a remote type, building its node on demand
    pub fn get_type(&self, module: Option<&str>, full_name: &str) -> Result<RemoteObject> {
        let node = self.builder.get_or_build(module, full_name)?;
        Ok(RemoteObject::new(
            Arc::clone(&self.agent),
            Arc::clone(&self.builder),
            node,
            None,
        ))
    }

    /// Addresses of live instances the agent can see for a type
    pub fn instances_of(&self, full_name: &str) -> Result<Vec<HeapCandidate>> {
        self.agent.query_instances(full_name)
    }

    /// Proxy over the pinned object at a remote address. The object's
    /// member snapshot from the dump seeds the handle, so the first
    /// field read costs no extra round-trip.
    pub fn object_at(&self, address: u64) -> Result<RemoteObject> {
        if address == 0 {
            return Err(Error::UseAfterRelease(0));
        }
        let snapshot = self.agent.dump_object(address)?;
        let node = self.builder.get_or_build(None, &snapshot.type_full_name)?;
        let members = snapshot
            .members
            .into_iter()
            .map(|m| (m.name, m.value))
            .collect();
        let handle = Arc::new(ObjectHandle::with_snapshot(
            Arc::clone(&self.agent),
            address,
            &node.full_name,
            members,
        ));
        Ok(RemoteObject::new(
            Arc::clone(&self.agent),
            Arc::clone(&self.builder),
            node,
            Some(handle),
        ))
    }

    /// Construct a remote object and return a proxy over it
    pub fn create(
        &self,
        module: Option<&str>,
        full_name: &str,
        args: &[Arg],
    ) -> Result<RemoteObject> {
        let proxy = self.get_type(module, full_name)?;
        let wire_args = proxy.marshal_all(args)?;
        let value = self.agent.create_object(module, full_name, &wire_args)?;
        match proxy.unmarshal(Some(value))? {
            Returned::Object(object) => Ok(object),
            other => Err(Error::Marshal(format!(
                "constructor for {full_name} returned {other:?} instead of an object"
            ))),
        }
    }

    /// Invoke a static method without holding a proxy
    pub fn invoke_static(&self, full_name: &str, method: &str, args: &[Arg]) -> Result<Returned> {
        self.get_type(None, full_name)?.invoke(method, args)
    }

    pub fn get_static(&self, full_name: &str, member: &str) -> Result<Returned> {
        self.get_type(None, full_name)?.get(member)
    }

    pub fn set_static(&self, full_name: &str, member: &str, value: &Arg) -> Result<()> {
        self.get_type(None, full_name)?.set(member, value)
    }

    /// Subscribe a local callback to a remote event. Starts the
    /// reverse channel on first use.
    pub fn subscribe(
        &self,
        target: &RemoteObject,
        event_name: &str,
        callback: EventCallback,
    ) -> Result<EventSubscription> {
        if target.type_node().event(event_name).is_none() {
            return Err(Error::MemberNotFound {
                type_name: target.type_node().full_name.clone(),
                member: event_name.to_string(),
            });
        }

        self.channel.ensure_started(self.agent.as_ref())?;
        let token = self.channel.register_event(callback);
        if let Err(e) = self.agent.subscribe_event(
            target.address(),
            &target.type_node().full_name,
            event_name,
            token,
        ) {
            self.channel.unregister(token);
            return Err(e);
        }

        info!(
            target: "marionette::session",
            event = event_name,
            token = %token,
            "Subscribed to remote event"
        );
        Ok(EventSubscription {
            agent: Arc::clone(&self.agent),
            channel: Arc::clone(&self.channel),
            token,
            event_name: event_name.to_string(),
            active: AtomicBool::new(true),
        })
    }

    /// Install a hook on a remote method. Starts the reverse channel
    /// on first use.
    pub fn hook(
        &self,
        type_full_name: &str,
        method_key: &str,
        position: HookPosition,
        callback: HookCallback,
    ) -> Result<MethodHook> {
        self.channel.ensure_started(self.agent.as_ref())?;
        let token = self.channel.register_hook(callback);
        if let Err(e) = self
            .agent
            .hook_method(type_full_name, method_key, position, token)
        {
            self.channel.unregister(token);
            return Err(e);
        }

        info!(
            target: "marionette::session",
            type_full_name = type_full_name,
            method_key = method_key,
            token = %token,
            "Installed method hook"
        );
        Ok(MethodHook {
            agent: Arc::clone(&self.agent),
            channel: Arc::clone(&self.channel),
            token,
            method_key: method_key.to_string(),
            active: AtomicBool::new(true),
        })
    }

    /// Tear down the reverse channel. Wire calls remain usable.
    pub fn close(&self) {
        self.channel.shutdown();
    }
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("cached_types", &self.cache().len())
            .field("callback_port", &self.channel.port())
            .finish()
    }
}

/// Live registration of a local event callback; must be explicitly
/// torn down with [`EventSubscription::unsubscribe`]
pub struct EventSubscription {
    agent: Arc<dyn AgentConnection>,
    channel: Arc<CallbackChannel>,
    token: CorrelationToken,
    event_name: String,
    active: AtomicBool,
}

impl EventSubscription {
    pub fn token(&self) -> CorrelationToken {
        self.token
    }

    pub fn unsubscribe(self) -> Result<()> {
        if self.active.swap(false, Ordering::SeqCst) {
            self.agent.unsubscribe_event(self.token)?;
            self.channel.unregister(self.token);
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("event", &self.event_name)
            .field("token", &self.token)
            .field("active", &self.active.load(Ordering::SeqCst))
            .finish()
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if self.active.load(Ordering::SeqCst) {
            warn!(
                target: "marionette::session",
                event = %self.event_name,
                token = %self.token,
                "Event subscription dropped without unsubscribe; remote handler leaks"
            );
        }
    }
}

/// Live method hook; must be explicitly removed with
/// [`MethodHook::remove`]
pub struct MethodHook {
    agent: Arc<dyn AgentConnection>,
    channel: Arc<CallbackChannel>,
    token: CorrelationToken,
    method_key: String,
    active: AtomicBool,
}

impl MethodHook {
    pub fn token(&self) -> CorrelationToken {
        self.token
    }

    pub fn remove(self) -> Result<()> {
        if self.active.swap(false, Ordering::SeqCst) {
            self.agent.unhook_method(self.token)?;
            self.channel.unregister(self.token);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MethodHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodHook")
            .field("method_key", &self.method_key)
            .field("token", &self.token)
            .field("active", &self.active.load(Ordering::SeqCst))
            .finish()
    }
}

impl Drop for MethodHook {
    fn drop(&mut self) {
        if self.active.load(Ordering::SeqCst) {
            warn!(
                target: "marionette::session",
                method_key = %self.method_key,
                token = %self.token,
                "Method hook dropped without removal; remote hook leaks"
            );
        }
    }
}
