use crate::domain::metrics::{MetricsSnapshot, QueueMetrics, QueueName, TotalsSnapshot};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Summary emitted once a run has drained and stopped.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct FinalReport {
    pub totals: TotalsSnapshot,
    /// Wall time between start and the beginning of shutdown.
    pub elapsed_secs: f64,
    /// Completed plus rejected.
    pub total_processed: u64,
    pub processed_pct: Option<f64>,
    pub rejection_rate_pct: Option<f64>,
    pub throughput_per_hour: f64,
    pub bottleneck: Option<QueueName>,
    pub queues: Vec<QueueMetrics>,
    /// File the run's event log was written to, when one was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl FinalReport {
    pub fn new(snapshot: MetricsSnapshot, elapsed: Duration) -> Self {
        let totals = snapshot.totals;
        let total_processed = totals.processed();
        let elapsed_secs = elapsed.as_secs_f64();
        let throughput_per_hour = if elapsed_secs > 0.0 {
            totals.completed as f64 * 3600.0 / elapsed_secs
        } else {
            0.0
        };

        Self {
            total_processed,
            processed_pct: (totals.generated > 0)
                .then(|| total_processed as f64 * 100.0 / totals.generated as f64),
            rejection_rate_pct: totals.rejection_rate(),
            throughput_per_hour,
            bottleneck: snapshot.bottleneck(),
            elapsed_secs,
            totals,
            queues: snapshot.queues,
            log_file: None,
        }
    }
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}%"))
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FINAL SIMULATION REPORT")?;
        writeln!(f, "Elapsed:                      {:.1}s", self.elapsed_secs)?;
        writeln!(f, "Total Transactions Generated: {}", self.totals.generated)?;
        writeln!(
            f,
            "Total Transactions Processed: {} ({})",
            self.total_processed,
            pct(self.processed_pct)
        )?;
        writeln!(f, "Total Transactions Completed: {}", self.totals.completed)?;
        writeln!(
            f,
            "Total Transactions Rejected:  {} (auto {}, retry exhausted {}, manual {})",
            self.totals.rejected,
            self.totals.rejected_auto,
            self.totals.rejected_retry_exhausted,
            self.totals.rejected_manual
        )?;
        writeln!(f, "Abandoned:                    {}", self.totals.abandoned)?;
        writeln!(f, "Overall Rejection Rate:       {}", pct(self.rejection_rate_pct))?;
        writeln!(
            f,
            "Throughput:                   {:.1} transactions/hour",
            self.throughput_per_hour
        )?;
        match self.bottleneck {
            Some(queue) => writeln!(f, "Bottleneck:                   {queue}")?,
            None => writeln!(f, "Bottleneck:                   none")?,
        }
        if let Some(path) = &self.log_file {
            writeln!(f, "Log file:                     {}", path.display())?;
        }
        writeln!(f, "Queue Status:")?;
        for m in &self.queues {
            writeln!(
                f,
                "  {:<20}: Current={:>3} | Max={:>3} | In={:>5} | Out={:>5}",
                m.queue.as_str(),
                m.current_length,
                m.peak_length,
                m.enqueued,
                m.dequeued
            )?;
        }
        Ok(())
    }
}
