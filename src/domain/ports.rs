use super::metrics::MetricsSnapshot;
use super::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Receives every transaction once it reaches a terminal status.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn store(&self, tx: Transaction) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Transaction>>;
    async fn all(&self) -> Result<Vec<Transaction>>;
}

/// Destination for the periodic metric snapshots taken by the monitor.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn publish(&self, snapshot: MetricsSnapshot) -> Result<()>;
}

pub type OutcomeStoreBox = Box<dyn OutcomeStore>;
pub type SnapshotSinkBox = Box<dyn SnapshotSink>;
