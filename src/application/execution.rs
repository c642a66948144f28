//! Settlement stage.

use super::{PipelineContext, pause};
use crate::domain::metrics::QueueName;
use crate::domain::transaction::Transaction;
use crate::error::Result;
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const IDLE_POLL: Duration = Duration::from_millis(100);

/// Drains the execute queues, priority lane first, and completes each
/// transaction after a simulated settlement latency.
///
/// A transaction that fails mid-execution is dropped and counted as abandoned.
pub struct ExecutionWorker {
    ctx: Arc<PipelineContext>,
    rng: StdRng,
}

impl ExecutionWorker {
    const NAME: &'static str = "EXECUTION";
    const SOURCES: [QueueName; 2] = [QueueName::PriorityExecute, QueueName::NormalExecute];

    pub fn new(ctx: Arc<PipelineContext>, rng: StdRng) -> Self {
        Self { ctx, rng }
    }

    pub async fn run(mut self) {
        info!(worker = Self::NAME, "Execution worker started");

        while !self.ctx.cancel.is_cancelled() {
            let Some((_, mut tx)) = self.ctx.queues.try_pop_first(&Self::SOURCES).await else {
                if pause(&self.ctx.cancel, IDLE_POLL).await.is_err() {
                    break;
                }
                continue;
            };

            match self.execute(&mut tx).await {
                Ok(()) => {
                    self.ctx.metrics.record_completed();
                    self.ctx.finish(tx).await;
                }
                Err(e) => {
                    self.ctx.metrics.record_abandoned();
                    if e.is_cancellation() {
                        warn!(worker = Self::NAME, tx = %tx.short_id(), "Execution interrupted by shutdown");
                        break;
                    }
                    error!(worker = Self::NAME, tx = %tx.short_id(), error = %e, "Error in execution");
                }
            }
        }

        info!(worker = Self::NAME, "Execution worker stopped");
    }

    fn draw_latency(&mut self) -> Duration {
        let (fastest, slowest) = self.ctx.config.execution_latency_bounds();
        Duration::from_secs_f64(
            self.rng
                .gen_range(fastest.as_secs_f64()..=slowest.as_secs_f64()),
        )
    }

    async fn execute(&mut self, tx: &mut Transaction) -> Result<()> {
        tx.begin_execution()?;
        let latency = self.draw_latency();
        debug!(
            worker = Self::NAME,
            tx = %tx.short_id(),
            latency_ms = latency.as_millis() as u64,
            amount = %tx.amount(),
            "Started execution"
        );

        pause(&self.ctx.cancel, latency).await?;

        tx.complete()?;
        let total = tx.created_at().elapsed();
        debug!(
            worker = Self::NAME,
            tx = %tx.short_id(),
            total_secs = total.as_secs_f64(),
            "Transaction COMPLETED"
        );
        Ok(())
    }
}
