//! # Test Harness
//!
//! Local stand-ins for everything the proxy talks to, so integration tests never
//! touch the public relay.
//!
//! ## Core Components:
//! - **`MockAisServer`**: a websocket relay on `127.0.0.1:0`. It records every
//!   text frame clients send (handshakes and resubscribes) and broadcasts
//!   whatever the test pushes to every live client.
//! - **`SilentRelay`**: accepts TCP and never answers the upgrade, which pins a
//!   connection in `connecting`.
//! - **`TestApp`**: the real axum router bound on `127.0.0.1:0`, plus a
//!   `reqwest` client pointed at it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

use lib_ais::{router, ConnectionRegistry, RequestDispatcher, StreamConfig};

/// Scripted AIS Stream relay.
pub struct MockAisServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Value>>>,
    outbound: broadcast::Sender<Message>,
    live: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl MockAisServer {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let (outbound, _) = broadcast::channel(1024);
        let live = Arc::new(AtomicUsize::new(0));

        let accept_task = tokio::spawn({
            let received = Arc::clone(&received);
            let outbound = outbound.clone();
            let live = Arc::clone(&live);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    // Subscribe before the upgrade so no push can slip past.
                    let frames = outbound.subscribe();
                    tokio::spawn(serve_client(
                        stream,
                        frames,
                        Arc::clone(&received),
                        Arc::clone(&live),
                    ));
                }
            }
        });

        Ok(Self {
            addr,
            received,
            outbound,
            live,
            accept_task,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Sends a frame to every live client. Returns how many were listening.
    pub fn push(&self, frame: Message) -> usize {
        self.outbound.send(frame).unwrap_or(0)
    }

    pub fn push_json(&self, value: &Value) -> usize {
        self.push(Message::Text(value.to_string().into()))
    }

    /// Closes every live client socket from the relay side.
    pub fn close_all(&self) -> usize {
        self.push(Message::Close(None))
    }

    /// Every text frame received so far, decoded as JSON where possible.
    pub async fn received(&self) -> Vec<Value> {
        self.received.lock().await.clone()
    }

    /// Clients whose websocket is currently open.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` frames have arrived.
    pub async fn wait_for_frames(&self, count: usize) -> Result<Vec<Value>> {
        for _ in 0..500 {
            let frames = self.received().await;
            if frames.len() >= count {
                return Ok(frames);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bail!("relay saw fewer than {} frames", count)
    }

    /// Waits until exactly `count` clients are connected.
    pub async fn wait_for_live(&self, count: usize) -> Result<()> {
        for _ in 0..500 {
            if self.live_connections() == count {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bail!(
            "relay has {} live clients, expected {}",
            self.live_connections(),
            count
        )
    }
}

impl Drop for MockAisServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_client(
    stream: TcpStream,
    mut frames: broadcast::Receiver<Message>,
    received: Arc<Mutex<Vec<Value>>>,
    live: Arc<AtomicUsize>,
) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    live.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            inbound = ws.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let value = serde_json::from_str(text.as_str())
                        .unwrap_or_else(|_| Value::String(text.to_string()));
                    received.lock().await.push(value);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            outbound = frames.recv() => match outbound {
                Ok(frame) => {
                    if ws.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    live.fetch_sub(1, Ordering::SeqCst);
}

/// Accepts TCP connections and holds them open without ever answering.
pub struct SilentRelay {
    addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl SilentRelay {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let accept_task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        Ok(Self { addr, accept_task })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

impl Drop for SilentRelay {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// A running proxy with its HTTP client.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub dispatcher: Arc<RequestDispatcher>,
    server_task: JoinHandle<()>,
}

impl TestApp {
    pub async fn spawn(ws_url: impl Into<String>) -> Result<Self> {
        Self::spawn_with(StreamConfig::with_url(ws_url)).await
    }

    pub async fn spawn_with(config: StreamConfig) -> Result<Self> {
        let registry = Arc::new(ConnectionRegistry::new(config));
        let dispatcher = Arc::new(RequestDispatcher::new(registry));
        let app = router(Arc::clone(&dispatcher));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server_task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            dispatcher,
            server_task,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POSTs a JSON body to the action endpoint. Returns status and decoded body.
    pub async fn action(&self, body: Value) -> Result<(u16, Value)> {
        let response = self
            .client
            .post(self.url(lib_ais::api::AIS_STREAM_PATH))
            .json(&body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await?;
        Ok((status, body))
    }

    /// `connect` with one Miami-area bounding box. Returns the new id.
    pub async fn connect(&self, api_key: &str) -> Result<String> {
        let (status, body) = self
            .action(json!({
                "action": "connect",
                "aisApiKey": api_key,
                "subscriptionConfig": { "boundingBoxes": [[[25.6, -80.2], [25.8, -79.9]]] },
            }))
            .await?;
        if status != 200 {
            bail!("connect failed with {}: {}", status, body);
        }
        match body["connectionId"].as_str() {
            Some(id) => Ok(id.to_string()),
            None => bail!("connect reply has no connectionId: {}", body),
        }
    }

    pub async fn status_of(&self, id: &str) -> Result<(u16, Value)> {
        self.action(json!({ "action": "getStatus", "connectionId": id }))
            .await
    }

    /// Polls `getStatus` until `done` holds for the `connection` object.
    pub async fn wait_for_status(&self, id: &str, done: impl Fn(&Value) -> bool) -> Result<Value> {
        for _ in 0..500 {
            let (_, body) = self.status_of(id).await?;
            if done(&body["connection"]) {
                return Ok(body["connection"].clone());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bail!("connection {} never reached the expected state", id)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}
