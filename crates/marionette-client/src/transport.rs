//! Blocking wire client
//!
//! One TCP connection to the agent, one blocking call per operation.
//! Requests carry monotonically increasing ids; the write and the read
//! of the matching response happen under a single stream lock, so
//! concurrent callers serialize at the connection and never see each
//! other's responses. An application-level error in a response body is
//! re-raised as [`Error::Remote`], kept distinct from transport
//! breakage.

use crate::config::SessionConfig;
use crate::providers::{
    CallbackControl, InvocationExecutor, Liveness, ObjectDumpProvider, PinningControl,
    TypeDumpProvider,
};
use marionette_common::error::{Error, Result};
use marionette_common::types::params::{self, methods};
use marionette_common::types::{
    CorrelationToken, HeapCandidate, HookPosition, ModuleInfo, ObjectSnapshot, RemoteValue,
    TypeDescriptor,
};
use marionette_common::wire::{read_frame, write_frame, Request, Response, ResponseResult};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

pub struct WireClient {
    stream: Mutex<TcpStream>,
    next_id: AtomicU32,
    peer: String,
}

impl std::fmt::Debug for WireClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireClient")
            .field("peer", &self.peer)
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish()
    }
}

impl WireClient {
    /// Connect to the agent, retrying with exponential backoff per the
    /// session's retry settings.
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        let addr = config.agent_addr();
        let mut backoff = config.retry.initial_backoff_ms;
        let mut attempt = 0u32;

        loop {
            match TcpStream::connect(&addr) {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(Error::from)?;
                    if config.read_timeout_ms > 0 {
                        stream
                            .set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms)))
                            .map_err(Error::from)?;
                    }
                    if config.write_timeout_ms > 0 {
                        stream
                            .set_write_timeout(Some(Duration::from_millis(config.write_timeout_ms)))
                            .map_err(Error::from)?;
                    }
                    info!(
                        target: "marionette::transport",
                        addr = %addr,
                        "Connected to agent"
                    );
                    return Ok(Self {
                        stream: Mutex::new(stream),
                        next_id: AtomicU32::new(1),
                        peer: addr,
                    });
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > config.retry.max_retries {
                        return Err(Error::Transport(format!(
                            "failed to connect to agent at {addr} after {attempt} attempts: {e}"
                        )));
                    }
                    warn!(
                        target: "marionette::transport",
                        addr = %addr,
                        attempt = attempt,
                        backoff_ms = backoff,
                        error = %e,
                        "Connection failed, retrying"
                    );
                    std::thread::sleep(Duration::from_millis(backoff));
                    backoff = ((backoff as f64 * config.retry.backoff_multiplier) as u64)
                        .min(config.retry.max_backoff_ms);
                }
            }
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one request and block for its response
    fn call<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<R> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(id, method, serde_json::to_value(params)?);

        let mut stream = self.stream.lock();
        trace!(
            target: "marionette::transport",
            id = id,
            method = method,
            "Sending request"
        );
        write_frame(&mut *stream, &request)?;

        loop {
            let response: Response = read_frame(&mut *stream)?;
            // id 0 is reserved for unsolicited agent notifications
            if response.id == 0 {
                debug!(
                    target: "marionette::transport",
                    "Skipping unsolicited notification"
                );
                continue;
            }
            if response.id != id {
                return Err(Error::Protocol(format!(
                    "response id {} does not match request id {id}",
                    response.id
                )));
            }
            return match response.result {
                ResponseResult::Success(value) => Ok(serde_json::from_value(value)?),
                ResponseResult::Error {
                    code,
                    message,
                    remote_stack,
                } => {
                    debug!(
                        target: "marionette::transport",
                        id = id,
                        method = method,
                        code = code,
                        "Agent reported error"
                    );
                    Err(Error::Remote {
                        message,
                        remote_stack,
                    })
                }
            };
        }
    }
}

impl TypeDumpProvider for WireClient {
    fn dump_type(&self, module: Option<&str>, full_name: &str) -> Result<TypeDescriptor> {
        self.call(
            methods::DUMP_TYPE,
            params::DumpTypeParams {
                module: module.map(str::to_string),
                full_name: full_name.to_string(),
            },
        )
    }
}

impl ObjectDumpProvider for WireClient {
    fn dump_object(&self, address: u64) -> Result<ObjectSnapshot> {
        self.call(methods::DUMP_OBJECT, params::DumpObjectParams { address })
    }

    fn query_instances(&self, type_full_name: &str) -> Result<Vec<HeapCandidate>> {
        self.call(
            methods::QUERY_INSTANCES,
            params::QueryInstancesParams {
                type_full_name: type_full_name.to_string(),
            },
        )
    }

    fn list_modules(&self) -> Result<Vec<ModuleInfo>> {
        self.call(methods::LIST_MODULES, serde_json::Value::Null)
    }
}

impl InvocationExecutor for WireClient {
    fn invoke(
        &self,
        address: u64,
        type_full_name: &str,
        method_key: &str,
        generic_args: &[String],
        args: &[RemoteValue],
    ) -> Result<Option<RemoteValue>> {
        let method = if address == 0 {
            methods::INVOKE_STATIC
        } else {
            methods::INVOKE_METHOD
        };
        let result: params::InvokeResult = self.call(
            method,
            params::InvokeParams {
                address,
                type_full_name: type_full_name.to_string(),
                method_key: method_key.to_string(),
                generic_args: generic_args.to_vec(),
                args: args.to_vec(),
            },
        )?;
        Ok(result.value)
    }

    fn create_object(
        &self,
        module: Option<&str>,
        type_full_name: &str,
        args: &[RemoteValue],
    ) -> Result<RemoteValue> {
        self.call(
            methods::CREATE_OBJECT,
            params::CreateObjectParams {
                module: module.map(str::to_string),
                type_full_name: type_full_name.to_string(),
                args: args.to_vec(),
            },
        )
    }

    fn get_field(&self, address: u64, type_full_name: &str, name: &str) -> Result<RemoteValue> {
        self.call(
            methods::GET_FIELD,
            params::FieldParams {
                address,
                type_full_name: type_full_name.to_string(),
                name: name.to_string(),
                value: None,
            },
        )
    }

    fn set_field(
        &self,
        address: u64,
        type_full_name: &str,
        name: &str,
        value: &RemoteValue,
    ) -> Result<()> {
        self.call(
            methods::SET_FIELD,
            params::FieldParams {
                address,
                type_full_name: type_full_name.to_string(),
                name: name.to_string(),
                value: Some(value.clone()),
            },
        )
    }
}

impl CallbackControl for WireClient {
    fn subscribe_event(
        &self,
        address: u64,
        type_full_name: &str,
        event_name: &str,
        token: CorrelationToken,
    ) -> Result<()> {
        self.call(
            methods::SUBSCRIBE_EVENT,
            params::SubscribeEventParams {
                address,
                type_full_name: type_full_name.to_string(),
                event_name: event_name.to_string(),
                token,
            },
        )
    }

    fn unsubscribe_event(&self, token: CorrelationToken) -> Result<()> {
        self.call(methods::UNSUBSCRIBE_EVENT, params::TokenParams { token })
    }

    fn hook_method(
        &self,
        type_full_name: &str,
        method_key: &str,
        position: HookPosition,
        token: CorrelationToken,
    ) -> Result<()> {
        self.call(
            methods::HOOK_METHOD,
            params::HookMethodParams {
                type_full_name: type_full_name.to_string(),
                method_key: method_key.to_string(),
                position,
                token,
            },
        )
    }

    fn unhook_method(&self, token: CorrelationToken) -> Result<()> {
        self.call(methods::UNHOOK_METHOD, params::TokenParams { token })
    }

    fn register_callback_channel(&self, host: &str, port: u16) -> Result<()> {
        self.call(
            methods::REGISTER_CALLBACK_CHANNEL,
            params::RegisterCallbackChannelParams {
                host: host.to_string(),
                port,
            },
        )
    }
}

impl PinningControl for WireClient {
    fn unpin(&self, address: u64) -> Result<()> {
        self.call(methods::UNPIN_OBJECT, params::UnpinParams { address })
    }
}

impl Liveness for WireClient {
    fn ping(&self) -> Result<()> {
        self.call(methods::PING, serde_json::Value::Null)
    }
}
