//! Application layer: queues, producers, consumers and the coordinator that
//! owns their lifecycle.
//!
//! Every loop runs as its own `tokio` task and shares only a [`PipelineContext`]:
//! the queue set, the metrics aggregator, the ports and one cancellation token.
//! Transactions move between tasks exclusively through the queues.

pub mod execution;
pub mod generators;
pub mod monitor;
pub mod pipeline;
pub mod queues;
pub mod screening;

use crate::config::SimulationConfig;
use crate::domain::metrics::MetricsAggregator;
use crate::domain::ports::{OutcomeStoreBox, SnapshotSinkBox};
use crate::domain::transaction::Transaction;
use crate::error::{PipelineError, Result};
use queues::QueueSet;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// State shared by all tasks of one run.
pub struct PipelineContext {
    pub config: SimulationConfig,
    pub queues: QueueSet,
    pub metrics: Arc<MetricsAggregator>,
    pub outcomes: Option<OutcomeStoreBox>,
    pub snapshots: SnapshotSinkBox,
    pub cancel: CancellationToken,
}

impl PipelineContext {
    pub fn new(
        config: SimulationConfig,
        outcomes: Option<OutcomeStoreBox>,
        snapshots: SnapshotSinkBox,
    ) -> Self {
        let metrics = Arc::new(MetricsAggregator::new(|name| {
            QueueSet::capacity_for(&config, name)
        }));
        Self {
            queues: QueueSet::new(&config, metrics.clone()),
            metrics,
            config,
            outcomes,
            snapshots,
            cancel: CancellationToken::new(),
        }
    }

    /// A generator for one task. Seeded runs give each task its own stream.
    pub fn rng(&self, stream: u64) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_entropy(),
        }
    }

    /// Hands a terminal transaction to the outcome store, if one is attached.
    pub async fn finish(&self, tx: Transaction) {
        debug_assert!(tx.status().is_terminal());
        if let Some(store) = &self.outcomes
            && let Err(e) = store.store(tx).await
        {
            warn!(error = %e, "Failed to record transaction outcome");
        }
    }
}

/// Sleeps for `duration` unless `cancel` fires first.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
