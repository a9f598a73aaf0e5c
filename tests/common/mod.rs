//! In-process `StringOperations` server used by the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use strcount_client::{ClientConfig, COUNT_STRING_METHOD};

/// Input the server refuses with an RPC error
pub const REJECTED_INPUT: &str = "boom";

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Send a notification before every reply
    pub push_before_reply: bool,
    /// Hold every reply for this long
    pub reply_delay: Option<Duration>,
}

#[derive(Default)]
struct Stats {
    connections: AtomicUsize,
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    params: Mutex<Vec<Value>>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    stats: Arc<Stats>,
    _guard: AbortOnDrop,
}

impl TestServer {
    pub async fn start() -> TestServer {
        Self::start_with(Options::default()).await
    }

    pub async fn start_with(options: Options) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(Stats::default());

        let accept_stats = Arc::clone(&stats);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                accept_stats.connections.fetch_add(1, Ordering::SeqCst);
                let stats = Arc::clone(&accept_stats);
                tokio::spawn(async move {
                    let _ = serve(stream, stats, options).await;
                });
            }
        });

        TestServer {
            addr,
            stats,
            _guard: AbortOnDrop(handle),
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.addr.to_string()).unwrap()
    }

    pub fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.stats.requests.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.stats.max_in_flight.load(Ordering::SeqCst)
    }

    /// `params` of every request received, in arrival order
    pub fn params(&self) -> Vec<Value> {
        self.stats.params.lock().unwrap().clone()
    }
}

async fn serve(stream: TcpStream, stats: Arc<Stats>, options: Options) -> std::io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        let request: Value = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(_) => continue,
        };
        stats.requests.fetch_add(1, Ordering::SeqCst);
        let in_flight = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        stats.params.lock().unwrap().push(request["params"].clone());

        if options.push_before_reply {
            let push = json!({
                "jsonrpc": "2.0",
                "method": "Server.Received",
                "params": {"id": request["id"]},
            });
            writer.write_all(format!("{}\n", push).as_bytes()).await?;
        }
        if let Some(delay) = options.reply_delay {
            sleep(delay).await;
        }

        let reply = respond(&request);
        stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        writer.write_all(format!("{}\n", reply).as_bytes()).await?;
    }
    Ok(())
}

fn respond(request: &Value) -> Value {
    let id = request["id"].clone();
    if request["method"] != COUNT_STRING_METHOD {
        return json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": "method not found"},
        });
    }

    match request["params"][0].as_str() {
        Some(REJECTED_INPUT) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32000, "message": "input rejected"},
        }),
        Some(text) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": text.chars().count(),
        }),
        None => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32602, "message": "invalid params"},
        }),
    }
}

/// Address nothing is listening on
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
