//! Reverse channel tests against a live listener

use marionette_client::providers::CallbackControl;
use marionette_client::reverse::CallbackChannel;
use marionette_common::types::params::methods;
use marionette_common::types::{CorrelationToken, HookPosition, RemoteValue};
use marionette_common::wire::{
    self, read_frame, write_frame, Request, Response, ResponseResult,
};
use marionette_common::Result;
use serde_json::json;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records channel registrations instead of talking to an agent
#[derive(Default)]
struct RecordingControl {
    registrations: Mutex<Vec<(String, u16)>>,
}

impl CallbackControl for RecordingControl {
    fn subscribe_event(&self, _: u64, _: &str, _: &str, _: CorrelationToken) -> Result<()> {
        Ok(())
    }

    fn unsubscribe_event(&self, _: CorrelationToken) -> Result<()> {
        Ok(())
    }

    fn hook_method(&self, _: &str, _: &str, _: HookPosition, _: CorrelationToken) -> Result<()> {
        Ok(())
    }

    fn unhook_method(&self, _: CorrelationToken) -> Result<()> {
        Ok(())
    }

    fn register_callback_channel(&self, host: &str, port: u16) -> Result<()> {
        self.registrations
            .lock()
            .unwrap()
            .push((host.to_string(), port));
        Ok(())
    }
}

fn invoke(stream: &mut TcpStream, id: u32, token: u32) -> Response {
    let request = Request::new(id, methods::CALLBACK_INVOKE, json!({ "token": token }));
    write_frame(stream, &request).unwrap();
    read_frame(stream).unwrap()
}

#[test]
fn test_inbound_calls_route_to_the_right_callback() {
    let channel = CallbackChannel::new("127.0.0.1", 0, 10);
    let control = RecordingControl::default();

    let first_hits = Arc::new(AtomicUsize::new(0));
    let second_hits = Arc::new(AtomicUsize::new(0));
    let first = {
        let hits = Arc::clone(&first_hits);
        channel.register_event(Box::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            None
        }))
    };
    let second = {
        let hits = Arc::clone(&second_hits);
        channel.register_event(Box::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Some(RemoteValue::Primitive {
                type_name: "System.Boolean".to_string(),
                payload: "true".to_string(),
            })
        }))
    };

    let port = channel.ensure_started(&control).unwrap();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let response = invoke(&mut stream, 1, second.0);
    assert!(matches!(response.result, ResponseResult::Success(_)));
    assert_eq!(first_hits.load(Ordering::SeqCst), 0);
    assert_eq!(second_hits.load(Ordering::SeqCst), 1);

    let response = invoke(&mut stream, 2, first.0);
    assert!(matches!(response.result, ResponseResult::Success(_)));
    assert_eq!(first_hits.load(Ordering::SeqCst), 1);
    assert_eq!(second_hits.load(Ordering::SeqCst), 1);

    channel.shutdown();
}

#[test]
fn test_unknown_token_answered_without_crashing() {
    let channel = CallbackChannel::new("127.0.0.1", 0, 10);
    let control = RecordingControl::default();
    let token = channel.register_event(Box::new(|_| None));

    let port = channel.ensure_started(&control).unwrap();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let response = invoke(&mut stream, 1, 99);
    match response.result {
        ResponseResult::Error { code, .. } => assert_eq!(code, wire::ERR_UNKNOWN_TOKEN),
        other => panic!("expected unknown-token error, got {other:?}"),
    }

    // The listener survived and still serves known tokens
    let response = invoke(&mut stream, 2, token.0);
    assert!(matches!(response.result, ResponseResult::Success(_)));

    channel.shutdown();
}

#[test]
fn test_frame_split_across_poll_timeouts_still_dispatches() {
    let channel = CallbackChannel::new("127.0.0.1", 0, 10);
    let control = RecordingControl::default();

    let hits = Arc::new(AtomicUsize::new(0));
    let token = {
        let hits = Arc::clone(&hits);
        channel.register_event(Box::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            None
        }))
    };

    let port = channel.ensure_started(&control).unwrap();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let request = Request::new(1, methods::CALLBACK_INVOKE, json!({ "token": token.0 }));
    let body = serde_json::to_vec(&request).unwrap();

    // Length prefix first, then the body in two pieces, each pause
    // longer than the worker's read timeout
    stream
        .write_all(&(body.len() as u32).to_le_bytes())
        .unwrap();
    stream.flush().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    stream.write_all(&body[..body.len() / 2]).unwrap();
    stream.flush().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    stream.write_all(&body[body.len() / 2..]).unwrap();
    stream.flush().unwrap();

    let response: Response = read_frame(&mut stream).unwrap();
    assert!(matches!(response.result, ResponseResult::Success(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    channel.shutdown();
}

/// Control whose channel registration always fails
struct RejectingControl;

impl CallbackControl for RejectingControl {
    fn subscribe_event(&self, _: u64, _: &str, _: &str, _: CorrelationToken) -> Result<()> {
        Ok(())
    }

    fn unsubscribe_event(&self, _: CorrelationToken) -> Result<()> {
        Ok(())
    }

    fn hook_method(&self, _: &str, _: &str, _: HookPosition, _: CorrelationToken) -> Result<()> {
        Ok(())
    }

    fn unhook_method(&self, _: CorrelationToken) -> Result<()> {
        Ok(())
    }

    fn register_callback_channel(&self, _: &str, _: u16) -> Result<()> {
        Err(marionette_common::Error::Remote {
            message: "callback channel refused".to_string(),
            remote_stack: None,
        })
    }
}

#[test]
fn test_failed_registration_leaves_no_listener_behind() {
    // Pick a concrete free port so a leaked listener would collide
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let channel = CallbackChannel::new("127.0.0.1", port, 10);
    let _token = channel.register_event(Box::new(|_| None));

    assert!(channel.ensure_started(&RejectingControl).is_err());
    assert!(!channel.is_running());

    // The port was released, so a later start can bind it again
    let control = RecordingControl::default();
    let bound = channel.ensure_started(&control).unwrap();
    assert_eq!(bound, port);
    channel.shutdown();
}

#[test]
fn test_start_is_idempotent_and_registers_once() {
    let channel = CallbackChannel::new("127.0.0.1", 0, 10);
    let control = RecordingControl::default();

    let first = channel.ensure_started(&control).unwrap();
    let second = channel.ensure_started(&control).unwrap();

    assert_eq!(first, second);
    assert_eq!(control.registrations.lock().unwrap().len(), 1);

    channel.shutdown();
}

#[test]
fn test_last_unregister_releases_the_port() {
    let channel = CallbackChannel::new("127.0.0.1", 0, 10);
    let control = RecordingControl::default();

    let a = channel.register_event(Box::new(|_| None));
    let b = channel.register_hook(Box::new(|_| {}));
    let port = channel.ensure_started(&control).unwrap();
    assert!(channel.is_running());

    channel.unregister(a);
    assert!(channel.is_running());

    channel.unregister(b);
    assert!(!channel.is_running());

    // Port is free again once the worker has exited
    let rebound = std::net::TcpListener::bind(("127.0.0.1", port));
    assert!(rebound.is_ok());
    drop(rebound);

    // A later registration brings the listener back up
    let _token = channel.register_event(Box::new(|_| None));
    channel.ensure_started(&control).unwrap();
    assert!(channel.is_running());
    channel.shutdown();
}
