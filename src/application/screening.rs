//! Automatic and manual screening workers.

use super::{PipelineContext, pause};
use crate::domain::metrics::{QueueName, RejectionPath};
use crate::domain::screening::{AutoVerdict, ManualVerdict};
use crate::domain::transaction::Transaction;
use crate::error::{PipelineError, Result};
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const AUTO_IDLE_POLL: Duration = Duration::from_millis(100);
const MANUAL_IDLE_POLL: Duration = Duration::from_millis(1000);

/// Where a screened transaction goes next.
enum Decision {
    Execute,
    ManualCheck,
    Rejected(RejectionPath),
}

/// Routes a decided transaction onward or finalises a rejection.
///
/// Routing failures drop the transaction and count it as abandoned. Returns
/// `Err(Cancelled)` when the caller's loop should stop.
async fn dispatch(ctx: &PipelineContext, worker: &str, tx: Transaction, decision: Decision) -> Result<()> {
    let short_id = tx.short_id();
    let routed = match decision {
        Decision::Execute => ctx.queues.route_for_execution(tx, &ctx.cancel).await,
        Decision::ManualCheck => ctx.queues.route_for_manual_check(tx),
        Decision::Rejected(path) => {
            ctx.metrics.record_rejected(path);
            ctx.finish(tx).await;
            return Ok(());
        }
    };

    match routed {
        Ok(queue) => {
            debug!(worker, tx = %short_id, queue = %queue, "Forwarded");
            Ok(())
        }
        Err(e) => {
            ctx.metrics.record_abandoned();
            if e.is_cancellation() {
                warn!(worker, tx = %short_id, "Forwarding interrupted by shutdown");
            } else {
                warn!(worker, tx = %short_id, error = %e, "Could not forward transaction");
            }
            if e.is_cancellation() { Err(e) } else { Ok(()) }
        }
    }
}

/// Drains the check queues, priority lane first, and classifies each
/// transaction as pass, retry-to-manual or reject.
pub struct AutoScreeningWorker {
    ctx: Arc<PipelineContext>,
    rng: StdRng,
}

impl AutoScreeningWorker {
    const NAME: &'static str = "AUTO_SCREEN";
    const SOURCES: [QueueName; 2] = [QueueName::PriorityCheck, QueueName::NormalCheck];

    pub fn new(ctx: Arc<PipelineContext>, rng: StdRng) -> Self {
        Self { ctx, rng }
    }

    pub async fn run(mut self) {
        info!(worker = Self::NAME, "Auto-screening worker started");

        while !self.ctx.cancel.is_cancelled() {
            let Some((_, mut tx)) = self.ctx.queues.try_pop_first(&Self::SOURCES).await else {
                if pause(&self.ctx.cancel, AUTO_IDLE_POLL).await.is_err() {
                    break;
                }
                continue;
            };

            let decision = match self.screen(&mut tx).await {
                Ok(decision) => decision,
                Err(PipelineError::Cancelled) => {
                    self.ctx.metrics.record_abandoned();
                    warn!(worker = Self::NAME, tx = %tx.short_id(), "Screening interrupted by shutdown");
                    break;
                }
                Err(e) => {
                    error!(worker = Self::NAME, tx = %tx.short_id(), error = %e, "Error in auto-screening");
                    if self.resubmit(tx).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            if dispatch(&self.ctx, Self::NAME, tx, decision).await.is_err() {
                break;
            }
        }

        info!(worker = Self::NAME, "Auto-screening worker stopped");
    }

    async fn screen(&mut self, tx: &mut Transaction) -> Result<Decision> {
        let config = &self.ctx.config;
        let latency = config.auto_screening_latency();
        tx.begin_screening()?;
        debug!(
            worker = Self::NAME,
            tx = %tx.short_id(),
            latency_ms = latency.as_millis() as u64,
            "Started screening"
        );

        pause(&self.ctx.cancel, latency).await?;

        let draw: f64 = self.rng.r#gen();
        match config.auto_screen_rates.classify(draw) {
            AutoVerdict::Pass => {
                debug!(worker = Self::NAME, tx = %tx.short_id(), "Screening PASSED");
                Ok(Decision::Execute)
            }
            AutoVerdict::Retry => {
                let attempts = tx.flag_for_manual_check();
                debug!(
                    worker = Self::NAME,
                    tx = %tx.short_id(),
                    attempts,
                    max_attempts = config.max_retry_attempts,
                    "Screening FLAGGED"
                );
                if attempts <= config.max_retry_attempts {
                    Ok(Decision::ManualCheck)
                } else {
                    tx.reject()?;
                    debug!(worker = Self::NAME, tx = %tx.short_id(), "Transaction REJECTED (max attempts reached)");
                    Ok(Decision::Rejected(RejectionPath::RetryExhausted))
                }
            }
            AutoVerdict::Reject => {
                tx.reject()?;
                debug!(worker = Self::NAME, tx = %tx.short_id(), "Screening FAILED");
                Ok(Decision::Rejected(RejectionPath::Auto))
            }
        }
    }

    /// Puts a transaction that hit a transient error back into the check stage.
    ///
    /// Terminal transactions are never re-enqueued. Returns `Err` on cancellation.
    async fn resubmit(&self, tx: Transaction) -> Result<()> {
        if tx.status().is_terminal() {
            self.ctx.metrics.record_abandoned();
            return Ok(());
        }
        let short_id = tx.short_id();
        match self.ctx.queues.route_for_check(tx, false, &self.ctx.cancel).await {
            Ok(queue) => {
                debug!(worker = Self::NAME, tx = %short_id, queue = %queue, "Resubmitted for screening");
                Ok(())
            }
            Err(e) => {
                self.ctx.metrics.record_abandoned();
                warn!(worker = Self::NAME, tx = %short_id, error = %e, "Resubmission failed");
                if e.is_cancellation() { Err(e) } else { Ok(()) }
            }
        }
    }
}

/// Reviews suspicious transactions, and samples ordinary ones from the normal
/// check lane when no suspicious work is waiting.
pub struct ManualScreeningWorker {
    ctx: Arc<PipelineContext>,
    rng: StdRng,
}

impl ManualScreeningWorker {
    const NAME: &'static str = "MANUAL_SCREEN";
    const SOURCES: [QueueName; 2] = [QueueName::ManualCheck, QueueName::NormalCheck];

    pub fn new(ctx: Arc<PipelineContext>, rng: StdRng) -> Self {
        Self { ctx, rng }
    }

    pub async fn run(mut self) {
        info!(worker = Self::NAME, "Manual screening worker started");

        while !self.ctx.cancel.is_cancelled() {
            let Some((source, mut tx)) = self.ctx.queues.try_pop_first(&Self::SOURCES).await else {
                if pause(&self.ctx.cancel, MANUAL_IDLE_POLL).await.is_err() {
                    break;
                }
                continue;
            };
            if source == QueueName::NormalCheck {
                debug!(worker = Self::NAME, tx = %tx.short_id(), "Transaction sampled for manual check");
            }

            let decision = match self.review(&mut tx).await {
                Ok(decision) => decision,
                Err(e) => {
                    self.ctx.metrics.record_abandoned();
                    if e.is_cancellation() {
                        warn!(worker = Self::NAME, tx = %tx.short_id(), "Manual check interrupted by shutdown");
                        break;
                    }
                    error!(worker = Self::NAME, tx = %tx.short_id(), error = %e, "Error in manual screening");
                    continue;
                }
            };

            if dispatch(&self.ctx, Self::NAME, tx, decision).await.is_err() {
                break;
            }
        }

        info!(worker = Self::NAME, "Manual screening worker stopped");
    }

    async fn review(&mut self, tx: &mut Transaction) -> Result<Decision> {
        let latency = self.ctx.config.manual_screening_latency();
        tx.begin_manual_check()?;
        debug!(
            worker = Self::NAME,
            tx = %tx.short_id(),
            latency_ms = latency.as_millis() as u64,
            "Started manual screening"
        );

        pause(&self.ctx.cancel, latency).await?;

        let draw: f64 = self.rng.r#gen();
        match self.ctx.config.manual_screen_rates.classify(draw) {
            ManualVerdict::Pass => {
                debug!(worker = Self::NAME, tx = %tx.short_id(), "Manual screening PASSED");
                Ok(Decision::Execute)
            }
            ManualVerdict::Reject => {
                tx.reject()?;
                debug!(worker = Self::NAME, tx = %tx.short_id(), "Manual screening FAILED");
                Ok(Decision::Rejected(RejectionPath::Manual))
            }
        }
    }
}
