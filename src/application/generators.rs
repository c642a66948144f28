//! Transaction producers.

use super::{PipelineContext, pause};
use crate::domain::transaction::{Transaction, TransactionType};
use crate::error::{PipelineError, Result};
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const CLIENT_MAX_AMOUNT: f64 = 10_000.0;
const CORPORATE_MAX_AMOUNT: f64 = 100_000.0;
const CORPORATE_ITEM_DELAY: Duration = Duration::from_millis(10);

/// Submits a freshly created transaction, counting it as generated on success.
///
/// Returns `Err` only for cancellation; a closed queue is logged and skipped.
async fn admit(ctx: &PipelineContext, emitter: &str, tx: Transaction) -> Result<()> {
    let short_id = tx.short_id();
    let amount = tx.amount();
    match ctx.queues.route_for_check(tx, true, &ctx.cancel).await {
        Ok(queue) => {
            debug!(emitter, tx = %short_id, %amount, queue = %queue, "Generated transaction");
            Ok(())
        }
        Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
        Err(e) => {
            warn!(emitter, tx = %short_id, error = %e, "Dropped generated transaction");
            Ok(())
        }
    }
}

/// Emits client transfers at a fixed rate.
pub struct ClientEmitter {
    ctx: Arc<PipelineContext>,
    rng: StdRng,
}

impl ClientEmitter {
    pub fn new(ctx: Arc<PipelineContext>, rng: StdRng) -> Self {
        Self { ctx, rng }
    }

    pub async fn run(mut self) {
        info!(emitter = "CLIENT", "Client transaction emitter started");
        let interval = self.ctx.config.client_interval();
        let mut emitted: u64 = 0;

        while !self.ctx.cancel.is_cancelled() {
            if pause(&self.ctx.cancel, interval).await.is_err() {
                break;
            }
            let tx = Transaction::with_sampled_amount(
                TransactionType::ClientTransfer,
                self.rng.gen_range(0.0..CLIENT_MAX_AMOUNT),
            );
            if admit(&self.ctx, "CLIENT", tx).await.is_err() {
                break;
            }
            emitted += 1;
        }

        info!(emitter = "CLIENT", emitted, "Client transaction emitter stopped");
    }
}

/// Emits corporate payments in batches separated by random pauses.
pub struct CorporateEmitter {
    ctx: Arc<PipelineContext>,
    rng: StdRng,
}

impl CorporateEmitter {
    pub fn new(ctx: Arc<PipelineContext>, rng: StdRng) -> Self {
        Self { ctx, rng }
    }

    pub async fn run(mut self) {
        info!(emitter = "CORPORATE", "Corporate transaction emitter started");
        let mut batches: u64 = 0;

        while !self.ctx.cancel.is_cancelled() {
            let config = &self.ctx.config;
            let wait = Duration::from_secs(self.rng.gen_range(
                config.corporate_batch_min_interval_secs..=config.corporate_batch_max_interval_secs,
            ));
            let size = self
                .rng
                .gen_range(config.corporate_batch_min_size..=config.corporate_batch_max_size);

            if self.emit_batch(wait, size, batches + 1).await.is_err() {
                break;
            }
            batches += 1;
        }

        info!(emitter = "CORPORATE", batches, "Corporate transaction emitter stopped");
    }

    async fn emit_batch(&mut self, wait: Duration, size: u32, batch: u64) -> Result<()> {
        pause(&self.ctx.cancel, wait).await?;
        info!(emitter = "CORPORATE", batch, size, "Starting batch");

        for _ in 0..size {
            if self.ctx.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let tx = Transaction::with_sampled_amount(
                TransactionType::CorporatePayment,
                self.rng.gen_range(0.0..CORPORATE_MAX_AMOUNT),
            );
            admit(&self.ctx, "CORPORATE", tx).await?;
            pause(&self.ctx.cancel, CORPORATE_ITEM_DELAY).await?;
        }

        info!(emitter = "CORPORATE", batch, size, "Completed batch");
        Ok(())
    }
}
