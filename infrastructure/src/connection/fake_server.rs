//! In-process tool server over `tokio::io::duplex`, for connection tests.

use super::connector::{Connector, Transport};
use super::endpoint::Endpoint;
use super::error::{ConnectionError, Result};
use crate::protocol::framing::{read_frame, write_frame};
use crate::protocol::messages::methods;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::mpsc;

/// Tools returned per `tools/list` page.
const PAGE_SIZE: usize = 2;

enum Control {
    Notify(&'static str),
    Hangup,
}

/// Connector whose every `connect` starts a fresh fake server.
pub struct FakeConnector {
    tools: Mutex<Vec<Value>>,
    calls: Mutex<Vec<(String, Value)>>,
    refuse: AtomicUsize,
    panic_next: AtomicBool,
    answer_pings: AtomicBool,
    connects: AtomicUsize,
    pings: AtomicUsize,
    controls: Mutex<Vec<mpsc::UnboundedSender<Control>>>,
}

impl FakeConnector {
    pub fn new(tools: Vec<Value>) -> Self {
        Self {
            tools: Mutex::new(tools),
            calls: Mutex::new(Vec::new()),
            refuse: AtomicUsize::new(0),
            panic_next: AtomicBool::new(false),
            answer_pings: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            controls: Mutex::new(Vec::new()),
        }
    }

    /// Tools named `names`, each taking an optional object.
    pub fn with_tools(names: &[&str]) -> Self {
        Self::new(
            names
                .iter()
                .map(|n| json!({ "name": n, "description": format!("{} tool", n) }))
                .collect(),
        )
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Panic inside the next `connect` call.
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn answer_pings(&self, answer: bool) {
        self.answer_pings.store(answer, Ordering::SeqCst);
    }

    pub fn set_tools(&self, tools: Vec<Value>) {
        *self.tools.lock().unwrap() = tools;
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Push `notifications/tools/list_changed` from every live server.
    pub fn announce_tools_changed(&self) {
        self.broadcast(|| Control::Notify(methods::TOOLS_LIST_CHANGED));
    }

    /// Drop every live server's stream.
    pub fn hangup(&self) {
        self.broadcast(|| Control::Hangup);
    }

    fn broadcast(&self, control: impl Fn() -> Control) {
        self.controls
            .lock()
            .unwrap()
            .retain(|tx| tx.send(control()).is_ok());
    }

    async fn serve(
        self: std::sync::Arc<Self>,
        stream: tokio::io::DuplexStream,
        mut control: mpsc::UnboundedReceiver<Control>,
    ) {
        let (read, mut write) = tokio::io::split(stream);
        let mut reader = BufReader::new(read);
        let mut line = String::new();

        loop {
            let body = tokio::select! {
                frame = read_frame(&mut reader, &mut line) => match frame {
                    Ok(Some(body)) => body,
                    _ => return,
                },
                cmd = control.recv() => match cmd {
                    Some(Control::Notify(method)) => {
                        let msg = json!({ "jsonrpc": "2.0", "method": method });
                        let _ = write_frame(&mut write, msg.to_string().as_bytes()).await;
                        continue;
                    }
                    Some(Control::Hangup) | None => return,
                },
            };
            let request: Value = serde_json::from_slice(&body).unwrap();
            let Some(id) = request.get("id").cloned() else {
                continue;
            };
            let method = request["method"].as_str().unwrap_or("").to_string();
            let params = request.get("params").cloned().unwrap_or(Value::Null);

            let result = match method.as_str() {
                methods::INITIALIZE => json!({
                    "protocolVersion": "2024-11-05",
                    "serverInfo": { "name": "fake", "version": "0.0.0" }
                }),
                methods::TOOLS_LIST => {
                    let tools = self.tools.lock().unwrap().clone();
                    let start: usize = params["cursor"]
                        .as_str()
                        .and_then(|c| c.parse().ok())
                        .unwrap_or(0);
                    let start = start.min(tools.len());
                    let end = (start + PAGE_SIZE).min(tools.len());
                    let page_tools = tools[start..end].to_vec();
                    let mut page = json!({ "tools": page_tools });
                    if end < tools.len() {
                        page["nextCursor"] = json!(end.to_string());
                    }
                    page
                }
                methods::TOOLS_CALL => {
                    let name = params["capabilityName"].as_str().unwrap_or("").to_string();
                    let arguments = params["arguments"].clone();
                    self.calls.lock().unwrap().push((name.clone(), arguments.clone()));
                    if let Some(millis) = arguments["sleep_ms"].as_u64() {
                        tokio::time::sleep(Duration::from_millis(millis)).await;
                    }
                    match arguments["fail"].as_str() {
                        Some(code) => json!({ "errorCode": code, "message": "requested failure" }),
                        None => json!({ "result": { "tool": name, "echo": arguments } }),
                    }
                }
                methods::PING => {
                    self.pings.fetch_add(1, Ordering::SeqCst);
                    if !self.answer_pings.load(Ordering::SeqCst) {
                        continue;
                    }
                    json!({})
                }
                _ => {
                    let reply = json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32601, "message": "method not found" }
                    });
                    let _ = write_frame(&mut write, reply.to_string().as_bytes()).await;
                    continue;
                }
            };

            let reply = json!({ "jsonrpc": "2.0", "id": id, "result": result });
            if write_frame(&mut write, reply.to_string().as_bytes())
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

/// Shares one [`FakeConnector`] between the test and the connection.
pub struct SharedFake(pub std::sync::Arc<FakeConnector>);

#[async_trait]
impl Connector for SharedFake {
    async fn connect(&self, _endpoint: &Endpoint) -> Result<Transport> {
        let fake = &self.0;
        fake.connects.fetch_add(1, Ordering::SeqCst);
        if fake.panic_next.swap(false, Ordering::SeqCst) {
            panic!("connector exploded");
        }
        let refused = fake
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        fake.controls.lock().unwrap().push(control_tx);
        tokio::spawn(std::sync::Arc::clone(fake).serve(theirs, control_rx));

        let (read, write) = tokio::io::split(ours);
        Ok(Transport::new(read, write))
    }
}
