//! Loopback blob server speaking the data protocol, for tests.

use crate::protocol::{
    OpCode, PROTOCOL_MAGIC, RESPONSE_HEADER_SIZE, RequestHeader, StatusCode, read_request_header,
    write_response,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use tufa_common::ObjectId;

/// How the server answers the next requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Behave like a blob server
    Normal,
    /// Answer reads with everything from the offset to the end of the
    /// object, ignoring the requested length
    ReadWholeObject,
    /// Answer every request with this status and no data
    Status(StatusCode),
    /// Consume the request, then close the connection without answering
    Hangup,
    /// Answer with a garbage header
    BadMagic,
}

#[derive(Default)]
struct State {
    objects: HashMap<ObjectId, Vec<u8>>,
    behavior: Option<Behavior>,
    connections: usize,
    syncs: usize,
}

impl State {
    fn apply(
        &mut self,
        header: &RequestHeader,
        payload: &[u8],
        whole: bool,
    ) -> (StatusCode, Vec<u8>) {
        match header.op {
            OpCode::Append | OpCode::AppendSync => {
                if header.op == OpCode::AppendSync {
                    self.syncs += 1;
                    if payload.is_empty() {
                        return (StatusCode::Ok, Vec::new());
                    }
                }
                let object = self.objects.entry(header.object_id).or_default();
                if header.offset != object.len() as u64 {
                    return (StatusCode::BadRequest, Vec::new());
                }
                object.extend_from_slice(payload);
                (StatusCode::Ok, Vec::new())
            }
            OpCode::Read => {
                let Some(object) = self.objects.get(&header.object_id) else {
                    return (StatusCode::NotFound, Vec::new());
                };
                let start = header.offset as usize;
                if start > object.len() {
                    return (StatusCode::BadRequest, Vec::new());
                }
                let end = if whole {
                    object.len()
                } else {
                    (start + header.length as usize).min(object.len())
                };
                (StatusCode::Ok, object[start..end].to_vec())
            }
        }
    }
}

/// In-memory blob server bound to a loopback port
pub struct FakeBlobServer {
    addr: String,
    state: Arc<Mutex<State>>,
}

impl FakeBlobServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(State::default()));

        let accept_state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                accept_state.lock().connections += 1;
                let conn_state = Arc::clone(&accept_state);
                thread::spawn(move || serve(stream, &conn_state));
            }
        });

        Self { addr, state }
    }

    /// An address nothing is listening on
    pub fn unused_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    }

    pub fn addr(&self) -> String {
        self.addr.clone()
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        self.state.lock().behavior = Some(behavior);
    }

    pub fn object(&self, id: ObjectId) -> Option<Vec<u8>> {
        self.state.lock().objects.get(&id).cloned()
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    /// AppendSync requests seen so far
    pub fn syncs(&self) -> usize {
        self.state.lock().syncs
    }
}

fn serve(mut stream: TcpStream, state: &Mutex<State>) {
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);
    loop {
        let Ok(header) = read_request_header(&mut reader) else {
            return;
        };
        let payload_len = if header.op == OpCode::Read {
            0
        } else {
            header.length as usize
        };
        let mut payload = vec![0u8; payload_len];
        if reader.read_exact(&mut payload).is_err() {
            return;
        }

        let (status, data) = {
            let mut state = state.lock();
            match state.behavior.unwrap_or(Behavior::Normal) {
                Behavior::Normal => state.apply(&header, &payload, false),
                Behavior::ReadWholeObject => state.apply(&header, &payload, true),
                Behavior::Status(status) => (status, Vec::new()),
                Behavior::Hangup => return,
                Behavior::BadMagic => {
                    let mut garbage = [0xFFu8; RESPONSE_HEADER_SIZE];
                    garbage[1] = PROTOCOL_MAGIC;
                    let _ = stream.write_all(&garbage);
                    return;
                }
            }
        };

        if write_response(&mut stream, status, &data).is_err() {
            return;
        }
    }
}
