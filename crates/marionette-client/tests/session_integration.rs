//! End-to-end session tests over a real TCP connection

mod common;

use common::MockAgent;
use marionette_client::config::{RetryConfig, SessionConfig};
use marionette_client::{Error, RemoteSession, WireClient};
use marionette_common::types::params::methods;
use marionette_common::types::{
    MemberDescriptor, RemoteValue, RuntimeKind, TypeDescriptor, TypeRef,
};
use marionette_common::wire::{read_frame, write_frame, Request, Response};
use serde_json::json;
use std::net::TcpListener;
use std::time::Duration;

fn config_for(port: u16) -> SessionConfig {
    SessionConfig {
        retry: RetryConfig {
            max_retries: 0,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            backoff_multiplier: 1.0,
        },
        ..SessionConfig::with_port(port)
    }
}

fn player_descriptor() -> TypeDescriptor {
    TypeDescriptor {
        runtime: RuntimeKind::Managed,
        module: "Game.dll".to_string(),
        full_name: "Game.Player".to_string(),
        base: None,
        is_array: false,
        methods: Vec::new(),
        constructors: Vec::new(),
        fields: vec![MemberDescriptor {
            name: "_health".to_string(),
            type_ref: TypeRef::new("System.Int32"),
        }],
        properties: Vec::new(),
        events: Vec::new(),
        vtable_address: None,
        vtable_entries: Vec::new(),
    }
}

#[test]
fn test_connect_and_ping() {
    let agent = MockAgent::spawn(|request| Response::success(request.id, json!(null)));
    let session = RemoteSession::connect(&config_for(agent.port)).unwrap();

    session.ping().unwrap();
    session.ping().unwrap();

    assert_eq!(
        agent.served_methods(),
        vec![methods::PING.to_string(), methods::PING.to_string()]
    );
}

#[test]
fn test_connect_fails_when_no_agent_listens() {
    // Grab a free port and release it so nothing is listening there
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = WireClient::connect(&config_for(port)).unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

#[test]
fn test_connect_retries_until_listener_appears() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    // Agent comes up only after the first attempt has already failed
    let agent = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        let listener = TcpListener::bind(("127.0.0.1", port)).expect("rebind agent port");
        let (mut stream, _) = listener.accept().expect("accept");
        let request: Request = read_frame(&mut stream).expect("read ping");
        write_frame(&mut stream, &Response::success(request.id, json!(null))).expect("write pong");
    });

    let config = SessionConfig {
        retry: RetryConfig {
            max_retries: 20,
            initial_backoff_ms: 25,
            max_backoff_ms: 100,
            backoff_multiplier: 1.5,
        },
        ..SessionConfig::with_port(port)
    };
    let session = RemoteSession::connect(&config).unwrap();
    session.ping().unwrap();

    agent.join().unwrap();
}

#[test]
fn test_remote_error_keeps_message_and_stack() {
    let agent = MockAgent::spawn(|request| {
        Response::remote_error(
            request.id,
            "type walker crashed",
            Some("at Walker.Dump()".to_string()),
        )
    });
    let session = RemoteSession::connect(&config_for(agent.port)).unwrap();

    let err = session.get_type(None, "Game.Player").unwrap_err();
    match err {
        Error::Remote {
            message,
            remote_stack,
        } => {
            assert_eq!(message, "type walker crashed");
            assert_eq!(remote_stack.as_deref(), Some("at Walker.Dump()"));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[test]
fn test_type_built_over_the_wire_and_cached() {
    let agent = MockAgent::spawn(|request| match request.method.as_str() {
        methods::DUMP_TYPE => Response::success(
            request.id,
            serde_json::to_value(player_descriptor()).unwrap(),
        ),
        _ => Response::success(request.id, json!(null)),
    });
    let session = RemoteSession::connect(&config_for(agent.port)).unwrap();

    let first = session.get_type(None, "Game.Player").unwrap();
    let second = session.get_type(None, "Game.Player").unwrap();

    assert!(std::sync::Arc::ptr_eq(first.type_node(), second.type_node()));
    assert_eq!(
        agent
            .served_methods()
            .iter()
            .filter(|m| *m == methods::DUMP_TYPE)
            .count(),
        1
    );
}

#[test]
fn test_static_field_read_over_the_wire() {
    let agent = MockAgent::spawn(|request| match request.method.as_str() {
        methods::DUMP_TYPE => Response::success(
            request.id,
            serde_json::to_value(player_descriptor()).unwrap(),
        ),
        methods::GET_FIELD => Response::success(
            request.id,
            serde_json::to_value(RemoteValue::Primitive {
                type_name: "System.Int32".to_string(),
                payload: "9000".to_string(),
            })
            .unwrap(),
        ),
        _ => Response::success(request.id, json!(null)),
    });
    let session = RemoteSession::connect(&config_for(agent.port)).unwrap();

    let result = session.get_static("Game.Player", "_health").unwrap();
    let primitive = result.as_primitive().expect("primitive result");
    assert_eq!(primitive.encode(), "9000");
}
