//! # Request Dispatcher
//!
//! Maps one `action` to registry and supervisor calls and shapes the reply.
//!
//! Location: lib_ais/src/api/dispatcher.rs
//!
//! ## Actions:
//! - **`connect`**: validates input, registers a `connecting` record, asks the
//!   supervisor to open the socket and returns at once. The reply never reflects
//!   the real socket state; clients poll `getStatus` for that.
//! - **`disconnect`**: removes the record and asks its socket to close, without
//!   waiting for the close to complete.
//! - **`updateSubscription`**: re-sends the handshake over a `subscribed` socket.
//! - **`getStatus`**: one full snapshot, or summaries of every record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{
    AisStreamError, ConnectionId, ConnectionRegistry, ConnectionSnapshot, ConnectionStatus,
    ConnectionSummary, Result,
};
use crate::ingestors::{StreamSupervisor, SubscriptionConfig};

/// Body of a `POST /api/maritime/ais-stream` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AisStreamRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub connection_id: Option<ConnectionId>,
    #[serde(default)]
    pub subscription_config: Option<SubscriptionConfig>,
    #[serde(default)]
    pub ais_api_key: Option<String>,
}

/// Reply to `connect`, `disconnect` and `updateSubscription`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub connection_id: Option<ConnectionId>,
    pub message: String,
}

impl ActionAck {
    fn ok(message: &str) -> Self {
        Self {
            success: true,
            connection_id: None,
            message: message.to_string(),
        }
    }
}

/// Reply to `getStatus` with a `connectionId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatusReply {
    pub success: bool,
    pub connection: ConnectionSnapshot,
}

/// Reply to `getStatus` without a `connectionId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionListReply {
    pub success: bool,
    pub total_connections: usize,
    pub connections: Vec<ConnectionSummary>,
}

/// Any successful dispatch result. Serializes as the inner reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DispatchReply {
    Ack(ActionAck),
    Connection(ConnectionStatusReply),
    Connections(ConnectionListReply),
}

/// Aggregate figures for `GET /api/maritime/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub last_update: DateTime<Utc>,
    pub ais_stream_status: StreamStatus,
    pub tracking_stats: TrackingStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub upstream_url: String,
    pub connection_count: usize,
    pub subscribed_count: usize,
    pub error_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStats {
    /// Records whose socket has not reached a terminal state.
    pub active_connections: usize,
    /// Messages received across every record still in the registry.
    pub message_count: u64,
}

pub struct RequestDispatcher {
    registry: Arc<ConnectionRegistry>,
    supervisor: StreamSupervisor,
}

impl RequestDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        let supervisor = StreamSupervisor::new(Arc::clone(&registry));
        Self {
            registry,
            supervisor,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn supervisor(&self) -> &StreamSupervisor {
        &self.supervisor
    }

    /// # Dispatch
    ///
    /// Routes a request by its `action` field.
    ///
    /// ## Workflow:
    /// 1.  Known actions go to their handler with the fields they need.
    /// 2.  A missing or unknown action is a validation error ("Invalid action").
    pub async fn dispatch(&self, request: AisStreamRequest) -> Result<DispatchReply> {
        let AisStreamRequest {
            action,
            connection_id,
            subscription_config,
            ais_api_key,
        } = request;

        match action.as_deref() {
            Some("connect") => self
                .connect(subscription_config, ais_api_key)
                .await
                .map(DispatchReply::Ack),
            Some("disconnect") => {
                let id = require_id(connection_id)?;
                self.disconnect(&id).await.map(DispatchReply::Ack)
            }
            Some("updateSubscription") => {
                let id = require_id(connection_id)?;
                self.update_subscription(&id, subscription_config)
                    .await
                    .map(DispatchReply::Ack)
            }
            Some("getStatus") => match connection_id {
                Some(id) => self.connection_status(&id).await.map(DispatchReply::Connection),
                None => Ok(DispatchReply::Connections(self.list_connections().await)),
            },
            other => {
                log::debug!("Rejected AIS Stream request with action {:?}", other);
                Err(AisStreamError::Validation("Invalid action".to_string()))
            }
        }
    }

    /// # Connect
    ///
    /// ## Workflow:
    /// 1.  Rejects a missing or blank API key, then missing or invalid bounding boxes.
    /// 2.  Registers a `connecting` record under a fresh id.
    /// 3.  Hands the record to the supervisor, which dials in the background.
    pub async fn connect(
        &self,
        config: Option<SubscriptionConfig>,
        api_key: Option<String>,
    ) -> Result<ActionAck> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AisStreamError::Validation("AIS API key is required".to_string()))?;
        let config = config
            .ok_or_else(|| AisStreamError::Validation("Bounding boxes are required".to_string()))?;
        let handshake = config.handshake(&api_key)?;

        let id = self.registry.create(api_key).await;
        if let Err(e) = self.supervisor.open(&id, handshake).await {
            log::error!("Failed to start AIS Stream socket for {}: {}", id, e);
            let _ = self.registry.remove(&id).await;
            return Err(AisStreamError::Internal(e.to_string()));
        }
        log::info!("AIS Stream connection created: {}", id);

        Ok(ActionAck {
            connection_id: Some(id),
            ..ActionAck::ok("AIS Stream connection initiated")
        })
    }

    /// Removes the record whatever its status and asks its socket to close.
    pub async fn disconnect(&self, id: &ConnectionId) -> Result<ActionAck> {
        let mut record = self.registry.remove(id).await?;
        if let Some(transport) = record.take_transport() {
            if !transport.request_close() {
                log::debug!("Socket task for {} had already exited", id);
            }
        }
        log::info!("AIS Stream connection closed by client: {} (was {})", id, record.status());
        Ok(ActionAck::ok("Connection closed"))
    }

    /// # Update Subscription
    ///
    /// ## Workflow:
    /// 1.  Unknown id: `NotFound`. Any status but `subscribed`: `InvalidState`,
    ///     and nothing is sent.
    /// 2.  Builds the handshake from the new config, reusing the key given at
    ///     `connect` unless the config carries its own.
    /// 3.  Waits for the socket task to report the send. The status is unchanged.
    pub async fn update_subscription(
        &self,
        id: &ConnectionId,
        config: Option<SubscriptionConfig>,
    ) -> Result<ActionAck> {
        let (status, stored_key, transport) = self
            .registry
            .inspect(id, |record| {
                (
                    record.status(),
                    record.api_key().to_string(),
                    record.transport().cloned(),
                )
            })
            .await?;

        let transport = match (status, transport) {
            (ConnectionStatus::Subscribed, Some(transport)) => transport,
            (status, _) => {
                return Err(AisStreamError::InvalidState {
                    id: id.clone(),
                    status,
                })
            }
        };

        let config = config
            .ok_or_else(|| AisStreamError::Validation("Bounding boxes are required".to_string()))?;
        let handshake = config.handshake(&stored_key)?;
        let rotated_key = (handshake.api_key != stored_key).then(|| handshake.api_key.clone());

        transport.send_frame(handshake.to_frame()?).await?;

        if let Some(key) = rotated_key {
            // The record may have been disconnected while the frame was in flight.
            let _ = self.registry.update(id, |record| record.replace_api_key(key)).await;
        }
        log::info!("AIS Stream subscription updated: {}", id);
        Ok(ActionAck::ok("Subscription updated"))
    }

    /// Full snapshot of one record.
    pub async fn connection_status(&self, id: &ConnectionId) -> Result<ConnectionStatusReply> {
        let connection = self.registry.get(id).await?;
        Ok(ConnectionStatusReply {
            success: true,
            connection,
        })
    }

    /// Summaries of every record, without message bodies.
    pub async fn list_connections(&self) -> ConnectionListReply {
        let connections = self.registry.list_all().await;
        ConnectionListReply {
            success: true,
            total_connections: connections.len(),
            connections,
        }
    }

    /// Aggregates the registry into the dashboard's system status figures.
    pub async fn system_status(&self) -> SystemStatus {
        let connections = self.registry.list_all().await;
        let count_of = |status: ConnectionStatus| {
            connections
                .iter()
                .filter(|connection| connection.status == status)
                .count()
        };

        SystemStatus {
            last_update: Utc::now(),
            ais_stream_status: StreamStatus {
                upstream_url: self.supervisor.ws_url().to_string(),
                connection_count: connections.len(),
                subscribed_count: count_of(ConnectionStatus::Subscribed),
                error_count: count_of(ConnectionStatus::Error),
            },
            tracking_stats: TrackingStats {
                active_connections: connections
                    .iter()
                    .filter(|connection| !connection.status.is_terminal())
                    .count(),
                message_count: connections.iter().map(|c| c.message_count).sum(),
            },
        }
    }

    /// Closes every socket and empties the registry.
    pub async fn shutdown(&self) -> usize {
        self.supervisor.shutdown().await
    }
}

// A missing id can never match a record.
fn require_id(id: Option<ConnectionId>) -> Result<ConnectionId> {
    id.ok_or_else(|| AisStreamError::NotFound(ConnectionId::from("")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StreamConfig, TransportCommand, TransportHandle};
    use serde_json::json;

    // Nothing listens on port 9 locally, so dials fail quickly and never
    // touch the public relay.
    fn dispatcher() -> RequestDispatcher {
        let config = StreamConfig::with_url("ws://127.0.0.1:9");
        RequestDispatcher::new(Arc::new(ConnectionRegistry::new(config)))
    }

    fn request(value: serde_json::Value) -> AisStreamRequest {
        serde_json::from_value(value).unwrap()
    }

    fn boxes() -> Option<SubscriptionConfig> {
        Some(SubscriptionConfig::with_boxes(vec![[[25.6, -80.2], [25.8, -79.9]]]))
    }

    #[tokio::test]
    async fn test_connect_requires_api_key_then_boxes() {
        let d = dispatcher();
        let err = d.connect(boxes(), None).await.unwrap_err();
        assert_eq!(err, AisStreamError::Validation("AIS API key is required".to_string()));

        let err = d.connect(boxes(), Some("   ".to_string())).await.unwrap_err();
        assert_eq!(err, AisStreamError::Validation("AIS API key is required".to_string()));

        let err = d.connect(None, Some("key123".to_string())).await.unwrap_err();
        assert_eq!(err, AisStreamError::Validation("Bounding boxes are required".to_string()));
        assert!(d.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_connect_registers_record_immediately() {
        let d = dispatcher();
        let ack = d.connect(boxes(), Some("key123".to_string())).await.unwrap();
        assert!(ack.success);
        assert_eq!(ack.message, "AIS Stream connection initiated");

        let id = ack.connection_id.unwrap();
        let reply = d.connection_status(&id).await.unwrap();
        assert_eq!(reply.connection.id, id);
        assert_eq!(reply.connection.message_count, 0);
        assert!(reply.connection.recent_messages.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_not_found() {
        let d = dispatcher();
        let id = d
            .connect(boxes(), Some("key123".to_string()))
            .await
            .unwrap()
            .connection_id
            .unwrap();

        assert_eq!(d.disconnect(&id).await.unwrap().message, "Connection closed");
        assert_eq!(d.disconnect(&id).await.unwrap_err(), AisStreamError::NotFound(id));
    }

    #[tokio::test]
    async fn test_update_rejected_unless_subscribed_and_sends_nothing() {
        let d = dispatcher();
        let id = d.registry().create("key123").await;
        let (handle, mut commands) = TransportHandle::channel();
        d.registry().update(&id, |r| r.attach_transport(handle)).await.unwrap();

        let err = d.update_subscription(&id, boxes()).await.unwrap_err();
        assert_eq!(
            err,
            AisStreamError::InvalidState {
                id: id.clone(),
                status: ConnectionStatus::Connecting
            }
        );
        assert!(commands.try_recv().is_err(), "no frame may be sent");
    }

    #[tokio::test]
    async fn test_update_resends_handshake_with_stored_key() {
        let d = dispatcher();
        let id = d.registry().create("key123").await;
        let (handle, mut commands) = TransportHandle::channel();
        d.registry()
            .update(&id, |r| {
                r.attach_transport(handle);
                r.mark_connected();
                r.mark_subscribed();
            })
            .await
            .unwrap();

        let socket = tokio::spawn(async move {
            match commands.recv().await {
                Some(TransportCommand::Send { frame, ack }) => {
                    let _ = ack.send(Ok(()));
                    frame
                }
                other => panic!("expected a send, got {:?}", other),
            }
        });

        let ack = d.update_subscription(&id, boxes()).await.unwrap();
        assert_eq!(ack.message, "Subscription updated");

        let frame: serde_json::Value = serde_json::from_str(&socket.await.unwrap()).unwrap();
        assert_eq!(frame["APIKey"], "key123");
        assert_eq!(frame["BoundingBoxes"], json!([[[25.6, -80.2], [25.8, -79.9]]]));

        let snapshot = d.registry().get(&id).await.unwrap();
        assert_eq!(snapshot.status, ConnectionStatus::Subscribed);
    }

    #[tokio::test]
    async fn test_update_on_dead_socket_is_transport_error() {
        let d = dispatcher();
        let id = d.registry().create("key123").await;
        let (handle, commands) = TransportHandle::channel();
        drop(commands);
        d.registry()
            .update(&id, |r| {
                r.attach_transport(handle);
                r.mark_connected();
                r.mark_subscribed();
            })
            .await
            .unwrap();

        let err = d.update_subscription(&id, boxes()).await.unwrap_err();
        assert!(matches!(err, AisStreamError::Transport(_)));
    }

    #[tokio::test]
    async fn test_dispatch_routes_actions() {
        let d = dispatcher();
        let err = d.dispatch(request(json!({ "action": "explode" }))).await.unwrap_err();
        assert_eq!(err, AisStreamError::Validation("Invalid action".to_string()));

        let err = d.dispatch(AisStreamRequest::default()).await.unwrap_err();
        assert_eq!(err, AisStreamError::Validation("Invalid action".to_string()));

        let reply = d
            .dispatch(request(json!({
                "action": "connect",
                "aisApiKey": "key123",
                "subscriptionConfig": { "boundingBoxes": [[[25.6, -80.2], [25.8, -79.9]]] }
            })))
            .await
            .unwrap();
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["success"], true);
        assert!(value["connectionId"].is_string());

        let reply = d.dispatch(request(json!({ "action": "getStatus" }))).await.unwrap();
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["totalConnections"], 1);
        assert!(value["connections"][0].get("recentMessages").is_none());

        let err = d
            .dispatch(request(json!({ "action": "getStatus", "connectionId": "unknown-id" })))
            .await
            .unwrap_err();
        assert!(matches!(err, AisStreamError::NotFound(_)));

        let err = d.dispatch(request(json!({ "action": "disconnect" }))).await.unwrap_err();
        assert!(matches!(err, AisStreamError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_system_status_counts_registry() {
        let d = dispatcher();
        let a = d.registry().create("k").await;
        let b = d.registry().create("k").await;
        d.registry().update(&a, |r| r.mark_error("refused")).await.unwrap();
        d.registry()
            .update(&b, |r| {
                r.mark_connected();
                r.mark_subscribed();
                r.record_message(json!({}), Utc::now());
            })
            .await
            .unwrap();

        let status = d.system_status().await;
        assert_eq!(status.ais_stream_status.connection_count, 2);
        assert_eq!(status.ais_stream_status.subscribed_count, 1);
        assert_eq!(status.ais_stream_status.error_count, 1);
        assert_eq!(status.tracking_stats.active_connections, 1);
        assert_eq!(status.tracking_stats.message_count, 1);
        assert_eq!(status.ais_stream_status.upstream_url, "ws://127.0.0.1:9");
    }
}
