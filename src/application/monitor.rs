use super::{PipelineContext, pause};
use std::sync::Arc;
use tracing::{info, warn};

/// Periodically samples queue metrics and run totals and publishes them to the
/// snapshot sink. Never mutates pipeline state.
pub struct MetricsMonitor {
    ctx: Arc<PipelineContext>,
}

impl MetricsMonitor {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(self) {
        info!("Metrics monitor started");
        let interval = self.ctx.config.metrics_interval();

        while pause(&self.ctx.cancel, interval).await.is_ok() {
            let snapshot = self.ctx.metrics.snapshot();
            if let Err(e) = self.ctx.snapshots.publish(snapshot).await {
                warn!(error = %e, "Failed to publish metrics snapshot");
            }
        }

        info!("Metrics monitor stopped");
    }
}
