//! Reverse callback channel
//!
//! Local listener for agent-initiated invocations. The listener starts
//! on the first registration, advertises its address to the agent once,
//! and runs an accept loop on a dedicated worker thread. Inbound
//! requests are routed by correlation token through two disjoint
//! tables, event callbacks and hook callbacks, and dispatched inline on
//! the worker. Unregistering the last token stops the worker and
//! releases the listening port, so the channel has no footprint while
//! unused. The worker polls a stop flag at a bounded interval, so
//! shutdown latency is bounded too.

use crate::providers::CallbackControl;
use marionette_common::error::{Error, Result};
use marionette_common::types::params::methods;
use marionette_common::types::{
    CallbackInvocation, CallbackReply, CorrelationToken, HookContext, RemoteValue,
};
use marionette_common::wire::{self, write_frame, Request, Response};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Event callbacks may produce a value to hand back to the remote raiser
pub type EventCallback = Box<dyn Fn(&[RemoteValue]) -> Option<RemoteValue> + Send + Sync>;
/// Hook callbacks run for side effects only
pub type HookCallback = Box<dyn Fn(&HookContext) + Send + Sync>;

struct ListenerState {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    port: u16,
}

pub struct CallbackChannel {
    host: String,
    requested_port: u16,
    poll_interval: Duration,
    next_token: AtomicU32,
    events: Arc<RwLock<HashMap<u32, EventCallback>>>,
    hooks: Arc<RwLock<HashMap<u32, HookCallback>>>,
    state: Mutex<Option<ListenerState>>,
}

impl CallbackChannel {
    pub fn new(host: &str, requested_port: u16, poll_interval_ms: u64) -> Self {
        Self {
            host: host.to_string(),
            requested_port,
            poll_interval: Duration::from_millis(poll_interval_ms),
            next_token: AtomicU32::new(1),
            events: Arc::new(RwLock::new(HashMap::new())),
            hooks: Arc::new(RwLock::new(HashMap::new())),
            state: Mutex::new(None),
        }
    }

    /// The bound port, while the listener is open
    pub fn port(&self) -> Option<u16> {
        self.state.lock().as_ref().map(|s| s.port)
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Start the listener if it is not already running and advertise
    /// its address to the agent. Idempotent: a second call while open
    /// does nothing.
    pub fn ensure_started(&self, agent: &dyn CallbackControl) -> Result<u16> {
        let mut state = self.state.lock();
        if let Some(existing) = state.as_ref() {
            return Ok(existing.port);
        }

        let listener = TcpListener::bind((self.host.as_str(), self.requested_port))
            .map_err(|e| Error::Transport(format!("failed to bind callback listener: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(Error::from)?
            .port();
        listener.set_nonblocking(true).map_err(Error::from)?;

        // Advertise before spawning the worker. A failed registration
        // must leave nothing behind: the listener drops here and the
        // port is free again. Connections the agent opens between
        // registration and the first accept queue in the backlog.
        agent.register_callback_channel(&self.host, port)?;

        let stop = Arc::new(AtomicBool::new(false));
        let worker = spawn_worker(
            listener,
            Arc::clone(&stop),
            Arc::clone(&self.events),
            Arc::clone(&self.hooks),
            self.poll_interval,
        )
        .map_err(|e| Error::Transport(format!("failed to spawn callback worker: {e}")))?;
        info!(
            target: "marionette::reverse",
            host = %self.host,
            port = port,
            "Reverse callback channel listening"
        );

        *state = Some(ListenerState {
            stop,
            worker: Some(worker),
            port,
        });
        Ok(port)
    }

    fn allocate_token(&self) -> CorrelationToken {
        CorrelationToken(self.next_token.fetch_add(1, Ordering::SeqCst))
    }

    /// Register an event callback under a fresh token
    pub fn register_event(&self, callback: EventCallback) -> CorrelationToken {
        let token = self.allocate_token();
        self.events.write().insert(token.0, callback);
        debug!(target: "marionette::reverse", token = %token, "Registered event callback");
        token
    }

    /// Register a hook callback under a fresh token
    pub fn register_hook(&self, callback: HookCallback) -> CorrelationToken {
        let token = self.allocate_token();
        self.hooks.write().insert(token.0, callback);
        debug!(target: "marionette::reverse", token = %token, "Registered hook callback");
        token
    }

    /// Drop a registration. Releasing the last one stops the worker
    /// and frees the port.
    pub fn unregister(&self, token: CorrelationToken) {
        let removed =
            self.events.write().remove(&token.0).is_some() || self.hooks.write().remove(&token.0).is_some();
        if !removed {
            warn!(target: "marionette::reverse", token = %token, "Unregistered unknown token");
        }
        if self.events.read().is_empty() && self.hooks.read().is_empty() {
            self.shutdown();
        }
    }

    /// Stop the listener unconditionally
    pub fn shutdown(&self) {
        let Some(mut state) = self.state.lock().take() else {
            return;
        };
        state.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = state.worker.take() {
            if worker.join().is_err() {
                warn!(target: "marionette::reverse", "Callback worker panicked");
            }
        }
        info!(
            target: "marionette::reverse",
            port = state.port,
            "Reverse callback channel closed"
        );
    }
}

impl Drop for CallbackChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    listener: TcpListener,
    stop: Arc<AtomicBool>,
    events: Arc<RwLock<HashMap<u32, EventCallback>>>,
    hooks: Arc<RwLock<HashMap<u32, HookCallback>>>,
    poll_interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("marionette-callbacks".to_string())
        .spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        debug!(
                            target: "marionette::reverse",
                            peer = %peer,
                            "Agent connected to callback channel"
                        );
                        serve_connection(stream, &stop, &events, &hooks, poll_interval);
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        std::thread::sleep(poll_interval);
                    }
                    Err(e) => {
                        warn!(
                            target: "marionette::reverse",
                            error = %e,
                            "Accept failed on callback listener"
                        );
                        std::thread::sleep(poll_interval);
                    }
                }
            }
            // Listener drops here, releasing the port
        })
}

/// Serve one agent connection, dispatching each inbound invocation
/// inline. Read timeouts keep the loop responsive to the stop flag.
fn serve_connection(
    mut stream: TcpStream,
    stop: &AtomicBool,
    events: &RwLock<HashMap<u32, EventCallback>>,
    hooks: &RwLock<HashMap<u32, HookCallback>>,
    poll_interval: Duration,
) {
    if stream.set_read_timeout(Some(poll_interval)).is_err() {
        return;
    }

    while !stop.load(Ordering::SeqCst) {
        let bytes = match read_frame_polled(&mut stream, stop) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => continue,
            Err(e) => {
                if !matches!(e.kind(), ErrorKind::UnexpectedEof | ErrorKind::Interrupted) {
                    debug!(
                        target: "marionette::reverse",
                        error = %e,
                        "Callback connection read failed"
                    );
                }
                return;
            }
        };

        let response = match serde_json::from_slice::<Request>(&bytes) {
            Ok(request) => dispatch(request, events, hooks),
            Err(e) => Response::error(0, wire::ERR_INVALID_REQUEST, format!("malformed request: {e}")),
        };
        if write_frame(&mut stream, &response).is_err() {
            return;
        }
    }
}

/// Read one frame from a stream polled with a read timeout.
///
/// A timeout before the first byte of a frame reports idle `Ok(None)`.
/// Once any byte has been consumed the read resumes across timeouts
/// until the frame completes, so a frame split over several TCP
/// segments never desynchronizes the stream.
fn read_frame_polled(
    stream: &mut TcpStream,
    stop: &AtomicBool,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    if !fill_buf(stream, &mut len_buf, stop, true)? {
        return Ok(None);
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > wire::MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("Message too large: {len}"),
        ));
    }

    let mut body = vec![0u8; len];
    fill_buf(stream, &mut body, stop, false)?;
    Ok(Some(body))
}

/// Fill `buf` to completion. With `idle_ok`, a timeout before the
/// first byte returns `Ok(false)`; past that point timeouts retry
/// until the buffer fills, the peer closes, or the stop flag is
/// raised (surfaced as `Interrupted`).
fn fill_buf(
    stream: &mut TcpStream,
    buf: &mut [u8],
    stop: &AtomicBool,
    idle_ok: bool,
) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if idle_ok && filled == 0 {
                    return Ok(false);
                }
                if stop.load(Ordering::SeqCst) {
                    return Err(ErrorKind::Interrupted.into());
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Route one inbound invocation by its correlation token
fn dispatch(
    request: Request,
    events: &RwLock<HashMap<u32, EventCallback>>,
    hooks: &RwLock<HashMap<u32, HookCallback>>,
) -> Response {
    if request.method != methods::CALLBACK_INVOKE {
        return Response::error(
            request.id,
            wire::ERR_UNKNOWN_METHOD,
            format!("unknown reverse-channel method '{}'", request.method),
        );
    }
    let invocation: CallbackInvocation = match serde_json::from_value(request.params) {
        Ok(invocation) => invocation,
        Err(e) => {
            return Response::error(
                request.id,
                wire::ERR_INVALID_REQUEST,
                format!("malformed callback invocation: {e}"),
            )
        }
    };

    let token = invocation.token;
    if let Some(callback) = events.read().get(&token.0) {
        let reply = match callback(&invocation.args) {
            Some(value) => CallbackReply::value(value),
            None => CallbackReply::void(),
        };
        return Response::success(request.id, reply);
    }
    if let Some(callback) = hooks.read().get(&token.0) {
        callback(&HookContext {
            call_stack: invocation.call_stack,
            instance: invocation.instance,
            args: invocation.args,
        });
        return Response::success(request.id, CallbackReply::void());
    }

    warn!(
        target: "marionette::reverse",
        token = %token,
        "Inbound callback for unknown token"
    );
    Response::error(
        request.id,
        wire::ERR_UNKNOWN_TOKEN,
        format!("no callback registered for {token}"),
    )
}
