//! Wire-level mock agent for integration tests
//!
//! Listens on an ephemeral port, speaks the real length-prefixed JSON
//! framing, and answers each request through a scripted handler. Every
//! served method name is logged so tests can assert what actually
//! crossed the wire.

use marionette_common::wire::{read_frame, write_frame, Request, Response};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

pub struct MockAgent {
    pub port: u16,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockAgent {
    /// Start a mock agent that serves one controller connection
    pub fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock agent");
        let port = listener.local_addr().expect("local addr").port();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let calls_log = Arc::clone(&calls);
        std::thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            loop {
                let request: Request = match read_frame(&mut stream) {
                    Ok(request) => request,
                    Err(_) => return,
                };
                calls_log.lock().unwrap().push(request.method.clone());
                let response = handler(&request);
                if write_frame(&mut stream, &response).is_err() {
                    return;
                }
            }
        });

        Self { port, calls }
    }

    pub fn served_methods(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}
