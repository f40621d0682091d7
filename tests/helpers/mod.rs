//! Fake ipykernel debugger used by the integration tests.
#![allow(dead_code)]


use async_trait::async_trait;
use jupyter_dap_proxy::dap::channel::KernelChannel;
use jupyter_dap_proxy::dap::transport::DapTransport;
use jupyter_dap_proxy::dap::types::{Event, Message, Request, Response};
use jupyter_dap_proxy::Result;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub const DUMP_PREFIX: &str = "/tmp/ipykernel_4242/";
pub const DUMP_SUFFIX: &str = ".py";

/// File the fake kernel dumps `code` to; identical code shares a file.
pub fn dump_path(code: &str) -> String {
    dump_path_in(DUMP_PREFIX, code)
}

fn dump_path_in(prefix: &str, code: &str) -> String {
    let mut hasher = DefaultHasher::new();
    code.hash(&mut hasher);
    format!("{}{}{}", prefix, hasher.finish(), DUMP_SUFFIX)
}

/// What the fake kernel has seen and how it should answer.
#[derive(Default)]
pub struct KernelState {
    sent: Mutex<Vec<(String, Value)>>,
    replies: Mutex<HashMap<String, Value>>,
    failing: Mutex<HashSet<String>>,
    dump_dir: Mutex<Option<PathBuf>>,
}

impl KernelState {
    /// Write dumped cells as real files under `dir`.
    pub fn dump_into(&self, dir: &Path) {
        *self.dump_dir.lock().unwrap() = Some(dir.to_path_buf());
    }

    /// File this kernel dumps `code` to.
    pub fn dump_path(&self, code: &str) -> String {
        dump_path_in(&self.prefix(), code)
    }

    fn prefix(&self) -> String {
        match &*self.dump_dir.lock().unwrap() {
            Some(dir) => format!("{}/", dir.display()),
            None => DUMP_PREFIX.to_string(),
        }
    }

    pub fn reply(&self, command: &str, body: Value) {
        self.replies.lock().unwrap().insert(command.to_string(), body);
    }

    pub fn fail(&self, command: &str) {
        self.failing.lock().unwrap().insert(command.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn sent(&self, command: &str) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == command)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Answer `command` like ipykernel's debugger would.
    pub fn answer(&self, seq: i32, request_seq: i32, command: &str, arguments: Option<Value>) -> Response {
        let arguments = arguments.unwrap_or(Value::Null);
        self.sent.lock().unwrap().push((command.to_string(), arguments.clone()));

        let mut response = Response {
            seq,
            request_seq,
            command: command.to_string(),
            success: true,
            message: None,
            body: None,
        };
        if self.failing.lock().unwrap().contains(command) {
            response.success = false;
            response.message = Some(format!("{} is not available", command));
            return response;
        }
        if let Some(body) = self.replies.lock().unwrap().get(command) {
            response.body = Some(body.clone());
            return response;
        }

        response.body = match command {
            "dumpCell" => {
                let code = arguments["code"].as_str().unwrap_or_default();
                let path = self.dump_path(code);
                if self.dump_dir.lock().unwrap().is_some() {
                    std::fs::write(&path, code).unwrap();
                }
                Some(json!({ "sourcePath": path }))
            }
            "debugInfo" => Some(json!({
                "isStarted": true,
                "hashMethod": "Murmur2",
                "hashSeed": 3339675911u32,
                "tmpFilePrefix": self.prefix(),
                "tmpFileSuffix": DUMP_SUFFIX,
                "breakpoints": [],
                "stoppedThreads": [],
            })),
            "setBreakpoints" => {
                let path = arguments["source"]["path"].clone();
                let breakpoints: Vec<Value> = arguments["breakpoints"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .iter()
                    .enumerate()
                    .map(|(i, bp)| json!({"id": i + 1, "verified": true, "line": bp["line"], "source": {"path": path}}))
                    .collect();
                Some(json!({ "breakpoints": breakpoints }))
            }
            "threads" => Some(json!({"threads": [{"id": 1, "name": "MainThread"}]})),
            _ => None,
        };
        response
    }
}

/// Kernel channel answering in memory.
#[derive(Default)]
pub struct ScriptedKernel {
    pub state: KernelState,
}

#[async_trait]
impl KernelChannel for ScriptedKernel {
    async fn request(&self, command: &str, arguments: Option<Value>) -> Result<Response> {
        Ok(self.state.answer(0, 0, command, arguments))
    }
}

/// Fake kernel debugger listening on a local TCP port.
pub struct KernelServer {
    pub addr: String,
    pub state: Arc<KernelState>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl KernelServer {
    /// Bind to an ephemeral port and serve the first connection.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(KernelState::default());
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let server_state = state.clone();
        let replies = outbound.clone();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let (mut reader, mut writer) = DapTransport::socket(stream).into_split();

            tokio::spawn(async move {
                while let Some(message) = outbound_rx.recv().await {
                    if writer.write_message(&message).await.is_err() {
                        break;
                    }
                }
            });

            let mut seq = 100;
            while let Ok(message) = reader.read_message().await {
                if let Message::Request(Request { seq: request_seq, command, arguments }) = message {
                    seq += 1;
                    let response = server_state.answer(seq, request_seq, &command, arguments);
                    if replies.send(Message::Response(response)).is_err() {
                        break;
                    }
                }
            }
        });

        Self { addr, state, outbound }
    }

    /// Push an event to the connected proxy.
    pub fn emit(&self, event: &str, body: Value) {
        let _ = self.outbound.send(Message::Event(Event {
            seq: 0,
            event: event.to_string(),
            body: Some(body),
        }));
    }
}

/// Editor end of an in-memory DAP connection plus the proxy end.
pub fn editor_pipe() -> (DapTransport, DapTransport) {
    let (proxy, editor) = tokio::io::duplex(256 * 1024);
    let (proxy_read, proxy_write) = tokio::io::split(proxy);
    let (editor_read, editor_write) = tokio::io::split(editor);
    (
        DapTransport::from_io(proxy_read, proxy_write),
        DapTransport::from_io(editor_read, editor_write),
    )
}

pub fn request(seq: i32, command: &str, arguments: Value) -> Request {
    Request {
        seq,
        command: command.to_string(),
        arguments: Some(arguments),
    }
}
