use crate::domain::metrics::MetricsSnapshot;
use crate::domain::ports::{OutcomeStore, SnapshotSink};
use crate::domain::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory record of finished transactions.
///
/// Clones share the same storage, so a caller can keep a handle while the
/// pipeline owns a boxed copy. Transactions are kept in arrival order. Nothing
/// outlives the process.
#[derive(Default, Clone)]
pub struct InMemoryOutcomeStore {
    transactions: Arc<RwLock<Vec<Transaction>>>,
}

impl InMemoryOutcomeStore {
    /// Creates a new, empty outcome store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded transactions, in the order they finished.
    pub async fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.read().await.clone()
    }
}

#[async_trait]
impl OutcomeStore for InMemoryOutcomeStore {
    async fn store(&self, tx: Transaction) -> Result<()> {
        self.transactions.write().await.push(tx);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.iter().find(|tx| tx.id() == id).cloned())
    }

    async fn all(&self) -> Result<Vec<Transaction>> {
        Ok(self.snapshot().await)
    }
}

/// Collects every published metrics snapshot.
#[derive(Default, Clone)]
pub struct InMemorySnapshotSink {
    snapshots: Arc<RwLock<Vec<MetricsSnapshot>>>,
}

impl InMemorySnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshots(&self) -> Vec<MetricsSnapshot> {
        self.snapshots.read().await.clone()
    }
}

#[async_trait]
impl SnapshotSink for InMemorySnapshotSink {
    async fn publish(&self, snapshot: MetricsSnapshot) -> Result<()> {
        self.snapshots.write().await.push(snapshot);
        Ok(())
    }
}
