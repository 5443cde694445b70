//! # Connection Registry
//!
//! The table of every AIS Stream session this process knows about, keyed by
//! [`ConnectionId`].
//!
//! It is an ordinary value built once at startup and shared as
//! `Arc<ConnectionRegistry>` between the dispatcher and the supervisor tasks.
//! A single `RwLock` guards the whole table. Every mutation runs as a
//! synchronous closure under the write guard, so exactly one writer touches
//! a record at a time and no guard is ever held across an `.await`.
//!
//! Records are never reaped on their own. A record that reaches `error` or
//! `disconnected` stays queryable until a client explicitly disconnects it.
//! A record stuck in `connecting` is kept as well.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::config::StreamConfig;
use super::error::{AisStreamError, Result};
use super::record::{ConnectionId, ConnectionRecord, ConnectionSnapshot, ConnectionSummary};

pub struct ConnectionRegistry {
    records: RwLock<HashMap<ConnectionId, ConnectionRecord>>,
    config: StreamConfig,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

impl ConnectionRegistry {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Allocates a fresh id and inserts a `connecting` record under it.
    pub async fn create(&self, api_key: impl Into<String>) -> ConnectionId {
        let mut records = self.records.write().await;

        let mut id = ConnectionId::generate();
        while records.contains_key(&id) {
            log::warn!("Generated connection id {} collided with a live record, retrying", id);
            id = ConnectionId::generate();
        }

        let record = ConnectionRecord::new(id.clone(), api_key.into(), self.config.buffer_capacity);
        records.insert(id.clone(), record);
        log::debug!("Connection {} registered ({} total)", id, records.len());
        id
    }

    /// Full snapshot of one record, with the configured status window of messages.
    pub async fn get(&self, id: &ConnectionId) -> Result<ConnectionSnapshot> {
        let window = self.config.effective_status_window();
        self.inspect(id, |record| record.snapshot(window)).await
    }

    /// Runs `f` against a record under the read guard.
    pub async fn inspect<R>(&self, id: &ConnectionId, f: impl FnOnce(&ConnectionRecord) -> R) -> Result<R> {
        let records = self.records.read().await;
        records
            .get(id)
            .map(f)
            .ok_or_else(|| AisStreamError::NotFound(id.clone()))
    }

    /// Runs `f` against a record under the write guard.
    pub async fn update<R>(
        &self,
        id: &ConnectionId,
        f: impl FnOnce(&mut ConnectionRecord) -> R,
    ) -> Result<R> {
        let mut records = self.records.write().await;
        records
            .get_mut(id)
            .map(f)
            .ok_or_else(|| AisStreamError::NotFound(id.clone()))
    }

    /// Removes a record and hands it back. Unknown ids report `NotFound`.
    pub async fn remove(&self, id: &ConnectionId) -> Result<ConnectionRecord> {
        let mut records = self.records.write().await;
        let record = records
            .remove(id)
            .ok_or_else(|| AisStreamError::NotFound(id.clone()))?;
        log::debug!("Connection {} removed ({} remaining)", id, records.len());
        Ok(record)
    }

    /// Summaries of every record, oldest first.
    pub async fn list_all(&self) -> Vec<ConnectionSummary> {
        let records = self.records.read().await;
        let mut summaries: Vec<ConnectionSummary> = records.values().map(ConnectionRecord::summary).collect();
        summaries.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.records.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Removes every record. Used at shutdown so the caller can close transports.
    pub async fn drain(&self) -> Vec<ConnectionRecord> {
        let mut records = self.records.write().await;
        records.drain().map(|(_, record)| record).collect()
    }
}
