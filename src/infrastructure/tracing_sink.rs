use crate::domain::metrics::MetricsSnapshot;
use crate::domain::ports::SnapshotSink;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Renders metric snapshots as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSnapshotSink;

#[async_trait]
impl SnapshotSink for TracingSnapshotSink {
    async fn publish(&self, snapshot: MetricsSnapshot) -> Result<()> {
        let totals = snapshot.totals;
        info!(
            generated = totals.generated,
            completed = totals.completed,
            rejected = totals.rejected,
            abandoned = totals.abandoned,
            success_rate = totals.success_rate().unwrap_or(0.0),
            in_queues = snapshot.total_in_queues(),
            "System metrics"
        );
        for m in &snapshot.queues {
            info!(
                queue = %m.queue,
                current = m.current_length,
                max = m.peak_length,
                "Queue status"
            );
        }
        Ok(())
    }
}
