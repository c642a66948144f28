use super::PipelineContext;
use super::execution::ExecutionWorker;
use super::generators::{ClientEmitter, CorporateEmitter};
use super::monitor::MetricsMonitor;
use super::screening::{AutoScreeningWorker, ManualScreeningWorker};
use crate::config::SimulationConfig;
use crate::domain::metrics::{MetricsSnapshot, QueueName};
use crate::domain::ports::{OutcomeStoreBox, SnapshotSinkBox};
use crate::domain::report::FinalReport;
use crate::domain::transaction::Transaction;
use crate::error::{PipelineError, Result};
use crate::infrastructure::tracing_sink::TracingSnapshotSink;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running,
    Draining,
    Stopped,
}

struct Lifecycle {
    state: PipelineState,
    tasks: Vec<JoinHandle<()>>,
    // Outlive `tasks`, which `stop` takes out to join without holding the lock.
    watchers: Vec<AbortHandle>,
    started_at: Option<Instant>,
    report: Option<FinalReport>,
}

/// Owns one simulation run.
///
/// `start` spawns every producer, worker and the monitor as independent tasks;
/// `stop` raises cancellation, waits out the grace period, closes the queues,
/// joins every task and produces the [`FinalReport`]. The state stays
/// observable as `Draining` throughout.
pub struct Pipeline {
    ctx: Arc<PipelineContext>,
    lifecycle: Mutex<Lifecycle>,
    // Serialises concurrent `stop` calls; later callers get the cached report.
    stopping: Mutex<()>,
}

/// Builder for attaching port adapters before the run starts.
pub struct PipelineBuilder {
    config: SimulationConfig,
    outcomes: Option<OutcomeStoreBox>,
    snapshots: SnapshotSinkBox,
}

impl PipelineBuilder {
    pub fn outcome_store(mut self, store: OutcomeStoreBox) -> Self {
        self.outcomes = Some(store);
        self
    }

    pub fn snapshot_sink(mut self, sink: SnapshotSinkBox) -> Self {
        self.snapshots = sink;
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;
        Ok(Pipeline {
            ctx: Arc::new(PipelineContext::new(self.config, self.outcomes, self.snapshots)),
            lifecycle: Mutex::new(Lifecycle {
                state: PipelineState::NotStarted,
                tasks: Vec::new(),
                watchers: Vec::new(),
                started_at: None,
                report: None,
            }),
            stopping: Mutex::new(()),
        })
    }
}

impl Pipeline {
    /// Creates a pipeline that logs its metric snapshots and keeps no outcomes.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: SimulationConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            outcomes: None,
            snapshots: Box::new(TracingSnapshotSink),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.ctx.config
    }

    /// Token that stops a running [`Pipeline::run`] when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    pub async fn state(&self) -> PipelineState {
        self.lifecycle.lock().await.state
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    pub fn is_queue_closed(&self, queue: QueueName) -> bool {
        self.ctx.queues.is_closed(queue)
    }

    /// Number of spawned tasks that have not finished yet.
    pub async fn running_tasks(&self) -> usize {
        self.lifecycle
            .lock()
            .await
            .watchers
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Injects a transaction through the check-stage routing, counting it as generated.
    pub async fn submit(&self, tx: Transaction) -> Result<QueueName> {
        self.ctx.queues.route_for_check(tx, true, &self.ctx.cancel).await
    }

    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != PipelineState::NotStarted {
            return Err(PipelineError::AlreadyStarted);
        }

        let config = &self.ctx.config;
        info!(
            client_tps = config.client_tps,
            auto_screening_rps = config.auto_screening_rps,
            priority_queue_capacity = config.priority_queue_capacity,
            run_duration_secs = config.run_duration_secs,
            "Starting simulation"
        );

        let ctx = &self.ctx;
        let tasks = &mut lifecycle.tasks;
        if config.client_emitter_enabled() {
            tasks.push(tokio::spawn(ClientEmitter::new(ctx.clone(), ctx.rng(0)).run()));
        }
        if config.corporate_emitter_enabled() {
            tasks.push(tokio::spawn(CorporateEmitter::new(ctx.clone(), ctx.rng(1)).run()));
        }
        tasks.push(tokio::spawn(AutoScreeningWorker::new(ctx.clone(), ctx.rng(2)).run()));
        tasks.push(tokio::spawn(ManualScreeningWorker::new(ctx.clone(), ctx.rng(3)).run()));
        tasks.push(tokio::spawn(ExecutionWorker::new(ctx.clone(), ctx.rng(4)).run()));
        tasks.push(tokio::spawn(MetricsMonitor::new(ctx.clone()).run()));
        lifecycle.watchers = lifecycle.tasks.iter().map(JoinHandle::abort_handle).collect();

        lifecycle.started_at = Some(Instant::now());
        lifecycle.state = PipelineState::Running;
        Ok(())
    }

    /// Runs until the configured duration elapses or the cancel token fires,
    /// then stops and returns the final report.
    pub async fn run(&self) -> Result<FinalReport> {
        self.start().await?;
        tokio::select! {
            _ = tokio::time::sleep(self.ctx.config.run_duration()) => {
                info!("Run duration elapsed");
            }
            _ = self.ctx.cancel.cancelled() => {
                info!("Stop requested");
            }
        }
        self.stop().await
    }

    /// Drains and stops the run. Calling it again returns the same report.
    pub async fn stop(&self) -> Result<FinalReport> {
        let _stopping = self.stopping.lock().await;

        let (tasks, elapsed, was_running) = {
            let mut lifecycle = self.lifecycle.lock().await;
            if let Some(report) = &lifecycle.report {
                return Ok(report.clone());
            }
            let elapsed = lifecycle
                .started_at
                .map(|started| started.elapsed())
                .unwrap_or_default();
            let was_running = lifecycle.state == PipelineState::Running;
            lifecycle.state = PipelineState::Draining;
            (std::mem::take(&mut lifecycle.tasks), elapsed, was_running)
        };
        info!("Stopping simulation");

        self.ctx.cancel.cancel();
        if was_running {
            tokio::time::sleep(self.ctx.config.shutdown_grace()).await;
        }
        self.ctx.queues.close_all().await;

        for handle in tasks {
            if let Err(e) = handle.await {
                error!(error = %PipelineError::from(e), "Pipeline task failed");
            }
        }

        let report = FinalReport::new(self.ctx.metrics.snapshot(), elapsed);
        info!(
            generated = report.totals.generated,
            processed = report.total_processed,
            completed = report.totals.completed,
            rejected = report.totals.rejected,
            abandoned = report.totals.abandoned,
            rejection_rate = report.rejection_rate_pct.unwrap_or(0.0),
            throughput_per_hour = report.throughput_per_hour,
            bottleneck = report.bottleneck.map(QueueName::as_str).unwrap_or("none"),
            "Simulation stopped"
        );

        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.state = PipelineState::Stopped;
        lifecycle.report = Some(report.clone());
        Ok(report)
    }
}
