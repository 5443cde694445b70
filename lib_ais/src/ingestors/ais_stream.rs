//! # AIS Stream Supervisor
//!
//! Opens one websocket per connection record and keeps that record in sync with
//! what the socket does.
//!
//! Location: lib_ais/src/ingestors/ais_stream.rs
//!
//! ## Per-connection task
//! Every `open` spawns a task that owns the socket outright. The record only
//! holds a [`TransportHandle`], the sending half of a command channel into that
//! task. The task:
//!
//! 1.  Dials the relay. A `disconnect` arriving while the dial is pending
//!     abandons it. There is deliberately no dial timeout.
//! 2.  On open, moves the record to `connected`, sends the handshake, and only
//!     after the send succeeds moves it to `subscribed`. A failed send moves it
//!     to `error` instead.
//! 3.  Decodes every inbound text or binary frame as JSON. Good frames are
//!     counted and buffered; bad frames are logged and dropped without touching
//!     any counter.
//! 4.  Runs `Send` commands (resubscribe) and reports each outcome back to the
//!     waiting caller.
//! 5.  Ends on a close frame or end-of-stream (`disconnected`), a socket error
//!     (`error`), a `Close` command, or when the record's handle is dropped.
//!
//! Callbacks for one socket are handled in order inside its task. Tasks for
//! different connections interleave freely and share nothing but the registry.

use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

use crate::core::{
    AisStreamError, ConnectionId, ConnectionRecord, ConnectionRegistry, Result, TransportCommand,
    TransportHandle,
};

use super::subscription::SubscriptionMessage;

type AisSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Spawns and tracks the socket tasks behind connection records.
#[derive(Clone)]
pub struct StreamSupervisor {
    registry: Arc<ConnectionRegistry>,
    ws_url: String,
}

impl StreamSupervisor {
    /// Supervisor dialing the relay URL from the registry's config.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        let ws_url = registry.config().ws_url.clone();
        Self { registry, ws_url }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Starts the socket for a `connecting` record and returns without waiting.
    ///
    /// The handle is attached to the record before the task starts, so no
    /// socket event can reach the record ahead of it.
    pub async fn open(&self, id: &ConnectionId, handshake: SubscriptionMessage) -> Result<()> {
        let (handle, commands) = TransportHandle::channel();
        self.registry
            .update(id, |record| record.attach_transport(handle))
            .await?;

        let session = StreamSession {
            id: id.clone(),
            url: self.ws_url.clone(),
            registry: Arc::clone(&self.registry),
            handshake,
        };
        tokio::spawn(session.run(commands));
        Ok(())
    }

    /// Removes every record and asks each live socket to close.
    ///
    /// Returns how many close requests were delivered.
    pub async fn shutdown(&self) -> usize {
        let records = self.registry.drain().await;
        let total = records.len();
        let closed = records
            .into_iter()
            .filter_map(|mut record| record.take_transport())
            .filter(|handle| handle.request_close())
            .count();
        log::info!("Closed {} of {} AIS Stream connections", closed, total);
        closed
    }
}

/// State owned by one connection's task.
struct StreamSession {
    id: ConnectionId,
    url: String,
    registry: Arc<ConnectionRegistry>,
    handshake: SubscriptionMessage,
}

/// How the read loop ended.
enum Exit {
    Closed,
    Failed(String),
    Abandoned,
}

impl StreamSession {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<TransportCommand>) {
        log::info!("Connecting {} to AIS Stream: {}", self.id, self.url);

        let dial = tokio::select! {
            result = connect_async(self.url.as_str()) => result,
            _ = Self::wait_for_close(&mut commands) => {
                log::info!("Connection {} disconnected before the socket opened", self.id);
                return;
            }
        };

        let socket = match dial {
            Ok((socket, _response)) => socket,
            Err(e) => {
                log::error!("AIS Stream error for {}: {}", self.id, e);
                self.apply(|record| record.mark_error(e.to_string())).await;
                return;
            }
        };

        match self.subscribe_and_read(socket, &mut commands).await {
            Exit::Closed => {
                log::info!("AIS Stream disconnected: {}", self.id);
                self.apply(ConnectionRecord::mark_disconnected).await;
            }
            Exit::Failed(reason) => {
                log::error!("AIS Stream error for {}: {}", self.id, reason);
                self.apply(|record| record.mark_error(reason)).await;
            }
            Exit::Abandoned => {
                log::debug!("Connection {} left the registry, socket task exiting", self.id);
            }
        }
    }

    async fn subscribe_and_read(
        &self,
        socket: AisSocket,
        commands: &mut mpsc::UnboundedReceiver<TransportCommand>,
    ) -> Exit {
        let (mut write, mut read) = socket.split();

        // --- Phase 1: open ---
        if !self.apply(ConnectionRecord::mark_connected).await {
            let _ = write.close().await;
            return Exit::Abandoned;
        }

        // --- Phase 2: handshake ---
        let frame = match self.handshake.to_frame() {
            Ok(frame) => frame,
            Err(e) => return Exit::Failed(e.to_string()),
        };
        log::debug!("Sending handshake for {}: {:?}", self.id, self.handshake);
        if let Err(e) = write.send(Message::Text(frame.into())).await {
            return Exit::Failed(format!("handshake send failed: {}", e));
        }
        if !self.apply(ConnectionRecord::mark_subscribed).await {
            let _ = write.close().await;
            return Exit::Abandoned;
        }
        log::info!("AIS Stream connected: {}", self.id);

        // --- Phase 3: pump ---
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(TransportCommand::Send { frame, ack }) => {
                        let outcome = write
                            .send(Message::Text(frame.into()))
                            .await
                            .map_err(|e| AisStreamError::Transport(e.to_string()));
                        let failure = outcome.as_ref().err().map(ToString::to_string);
                        let _ = ack.send(outcome);
                        if let Some(reason) = failure {
                            return Exit::Failed(reason);
                        }
                    }
                    Some(TransportCommand::Close) | None => {
                        log::info!("Closing AIS Stream socket for {}", self.id);
                        let _ = write.close().await;
                        return Exit::Closed;
                    }
                },
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !self.ingest(text.as_str()).await {
                            let _ = write.close().await;
                            return Exit::Abandoned;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            if !self.ingest(text).await {
                                let _ = write.close().await;
                                return Exit::Abandoned;
                            }
                        }
                        Err(e) => {
                            log::warn!("Dropping non UTF-8 AIS frame on {}: {}", self.id, e);
                        }
                    },
                    Some(Ok(Message::Close(reason))) => {
                        log::debug!("Relay closed {}: {:?}", self.id, reason);
                        return Exit::Closed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Exit::Failed(e.to_string()),
                    None => return Exit::Closed,
                },
            }
        }
    }

    /// Decodes one inbound payload. Returns false if the record is gone.
    async fn ingest(&self, text: &str) -> bool {
        match serde_json::from_str::<Value>(text) {
            Ok(message) => {
                let received_at = Utc::now();
                self.registry
                    .update(&self.id, |record| record.record_message(message, received_at))
                    .await
                    .is_ok()
            }
            Err(e) => {
                log::warn!("Error parsing AIS message on {}: {}", self.id, e);
                true
            }
        }
    }

    /// Applies a transition. Returns false only if the record has been removed.
    async fn apply(&self, transition: impl FnOnce(&mut ConnectionRecord) -> bool) -> bool {
        match self.registry.update(&self.id, transition).await {
            Ok(applied) => {
                if !applied {
                    log::debug!("Ignored late socket event for {}", self.id);
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Resolves once a `Close` arrives or every handle is dropped.
    async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<TransportCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                TransportCommand::Close => return,
                TransportCommand::Send { ack, .. } => {
                    let _ = ack.send(Err(AisStreamError::Transport(
                        "socket is not open yet".to_string(),
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConnectionSnapshot, ConnectionStatus, StreamConfig};
    use crate::ingestors::SubscriptionConfig;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn wait_until(
        registry: &ConnectionRegistry,
        id: &ConnectionId,
        done: impl Fn(&ConnectionSnapshot) -> bool,
    ) -> ConnectionSnapshot {
        for _ in 0..500 {
            let snapshot = registry.get(id).await.unwrap();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("connection {} never reached the expected state", id);
    }

    fn handshake() -> SubscriptionMessage {
        SubscriptionConfig::with_boxes(vec![[[25.6, -80.2], [25.8, -79.9]]])
            .handshake("key123")
            .unwrap()
    }

    #[tokio::test]
    async fn test_refused_dial_marks_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let registry = Arc::new(ConnectionRegistry::new(StreamConfig::with_url(url)));
        let supervisor = StreamSupervisor::new(Arc::clone(&registry));
        let id = registry.create("key123").await;
        supervisor.open(&id, handshake()).await.unwrap();

        let snapshot = wait_until(&registry, &id, |s| s.status == ConnectionStatus::Error).await;
        assert!(snapshot.error.is_some());
        assert_eq!(snapshot.message_count, 0);
    }

    #[tokio::test]
    async fn test_handshake_then_counts_only_valid_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let relay = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let first = ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(r#"{"MessageType":"PositionReport"}"#.into())).await.unwrap();
            ws.send(Message::Text("not json".into())).await.unwrap();
            ws.send(Message::Binary(br#"{"MessageType":"ShipStaticData"}"#.to_vec().into()))
                .await
                .unwrap();
            // Hold the socket open until the client closes it.
            while let Some(Ok(_)) = ws.next().await {}
            first.into_text().unwrap().to_string()
        });

        let registry = Arc::new(ConnectionRegistry::new(StreamConfig::with_url(url)));
        let supervisor = StreamSupervisor::new(Arc::clone(&registry));
        let id = registry.create("key123").await;
        supervisor.open(&id, handshake()).await.unwrap();

        let snapshot = wait_until(&registry, &id, |s| s.message_count == 2).await;
        assert_eq!(snapshot.status, ConnectionStatus::Subscribed);
        assert_eq!(snapshot.recent_messages[1]["MessageType"], "ShipStaticData");

        assert_eq!(supervisor.shutdown().await, 1);
        let frame = relay.await.unwrap();
        let sent: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(sent["APIKey"], "key123");
        assert!(sent.get("FiltersShipMMSI").is_none());
    }

    #[tokio::test]
    async fn test_relay_close_marks_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _handshake = ws.next().await;
            let _ = ws.close(None).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        let registry = Arc::new(ConnectionRegistry::new(StreamConfig::with_url(url)));
        let supervisor = StreamSupervisor::new(Arc::clone(&registry));
        let id = registry.create("key123").await;
        supervisor.open(&id, handshake()).await.unwrap();

        let snapshot = wait_until(&registry, &id, |s| s.status.is_terminal()).await;
        assert_eq!(snapshot.status, ConnectionStatus::Disconnected);
        let has_transport = registry.inspect(&id, |r| r.transport().is_some()).await.unwrap();
        assert!(!has_transport);
    }

    #[tokio::test]
    async fn test_open_unknown_record_is_not_found() {
        let supervisor = StreamSupervisor::new(Arc::new(ConnectionRegistry::default()));
        let err = supervisor
            .open(&ConnectionId::from("missing"), handshake())
            .await
            .unwrap_err();
        assert!(matches!(err, AisStreamError::NotFound(_)));
    }
}
