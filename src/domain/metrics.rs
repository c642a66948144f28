//! Queue metrics and run totals.
//!
//! `MetricsAggregator` is owned by the pipeline and shared by reference with
//! every worker. Per-queue figures live behind one mutex; the queue set performs
//! the actual channel push/pop inside that critical section so the recorded
//! length always equals the number of items in the channel.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy, Hash)]
pub enum QueueName {
    PriorityCheck,
    NormalCheck,
    ManualCheck,
    PriorityExecute,
    NormalExecute,
}

impl QueueName {
    pub const ALL: [QueueName; 5] = [
        QueueName::PriorityCheck,
        QueueName::NormalCheck,
        QueueName::ManualCheck,
        QueueName::PriorityExecute,
        QueueName::NormalExecute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::PriorityCheck => "PriorityCheck",
            QueueName::NormalCheck => "NormalCheck",
            QueueName::ManualCheck => "ManualCheck",
            QueueName::PriorityExecute => "PriorityExecute",
            QueueName::NormalExecute => "NormalExecute",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Figures tracked for a single queue during a run.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
pub struct QueueMetrics {
    pub queue: QueueName,
    /// `None` for unbounded queues.
    pub capacity: Option<usize>,
    pub current_length: usize,
    /// Highest `current_length` observed; never decreases within a run.
    pub peak_length: usize,
    pub enqueued: u64,
    pub dequeued: u64,
    pub closed: bool,
}

impl QueueMetrics {
    fn new(queue: QueueName, capacity: Option<usize>) -> Self {
        Self {
            queue,
            capacity,
            current_length: 0,
            peak_length: 0,
            enqueued: 0,
            dequeued: 0,
            closed: false,
        }
    }

    fn push(&mut self) {
        self.current_length += 1;
        self.peak_length = self.peak_length.max(self.current_length);
        self.enqueued += 1;
    }

    fn pop(&mut self) {
        self.current_length = self.current_length.saturating_sub(1);
        self.dequeued += 1;
    }
}

/// Which path produced a rejection.
///
/// All three end in `TransactionStatus::Rejected`; the split only exists in the
/// counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionPath {
    Auto,
    RetryExhausted,
    Manual,
}

#[derive(Debug, Default)]
struct RunTotals {
    generated: AtomicU64,
    completed: AtomicU64,
    rejected_auto: AtomicU64,
    rejected_retry_exhausted: AtomicU64,
    rejected_manual: AtomicU64,
    abandoned: AtomicU64,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct TotalsSnapshot {
    pub generated: u64,
    pub completed: u64,
    pub rejected: u64,
    pub rejected_auto: u64,
    pub rejected_retry_exhausted: u64,
    pub rejected_manual: u64,
    /// Dequeued but dropped after a transient error or interrupted by shutdown.
    pub abandoned: u64,
}

impl TotalsSnapshot {
    /// Transactions that reached a terminal status.
    pub fn processed(&self) -> u64 {
        self.completed + self.rejected
    }

    /// Completed as a percentage of generated.
    pub fn success_rate(&self) -> Option<f64> {
        (self.generated > 0).then(|| self.completed as f64 * 100.0 / self.generated as f64)
    }

    /// Rejected as a percentage of processed.
    pub fn rejection_rate(&self) -> Option<f64> {
        let processed = self.processed();
        (processed > 0).then(|| self.rejected as f64 * 100.0 / processed as f64)
    }
}

/// A point-in-time view of all queues and totals.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub totals: TotalsSnapshot,
    pub queues: Vec<QueueMetrics>,
}

impl MetricsSnapshot {
    pub fn queue(&self, name: QueueName) -> Option<&QueueMetrics> {
        self.queues.iter().find(|m| m.queue == name)
    }

    pub fn total_in_queues(&self) -> usize {
        self.queues.iter().map(|m| m.current_length).sum()
    }

    /// Queue with the highest recorded peak; earlier queues win ties.
    pub fn bottleneck(&self) -> Option<QueueName> {
        self.queues
            .iter()
            .filter(|m| m.peak_length > 0)
            .fold(None::<&QueueMetrics>, |best, m| match best {
                Some(b) if b.peak_length >= m.peak_length => Some(b),
                _ => Some(m),
            })
            .map(|m| m.queue)
    }
}

pub struct MetricsAggregator {
    queues: Mutex<[QueueMetrics; 5]>,
    totals: RunTotals,
}

impl MetricsAggregator {
    pub fn new(capacity: impl Fn(QueueName) -> Option<usize>) -> Self {
        let queues = QueueName::ALL.map(|name| QueueMetrics::new(name, capacity(name)));
        Self {
            queues: Mutex::new(queues),
            totals: RunTotals::default(),
        }
    }

    // Counters stay meaningful after a panic elsewhere, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, [QueueMetrics; 5]> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `push` inside the metrics critical section and records the
    /// enqueue only if it succeeds.
    ///
    /// When `admission` is set the transaction enters the pipeline for the first
    /// time and `generated` is bumped in the same section, before any worker can
    /// observe it.
    pub fn record_enqueue<E>(
        &self,
        queue: QueueName,
        admission: bool,
        push: impl FnOnce() -> Result<(), E>,
    ) -> Result<(), E> {
        let mut queues = self.lock();
        push()?;
        queues[queue.index()].push();
        if admission {
            self.totals.generated.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Runs `pop` inside the metrics critical section and records a dequeue
    /// if it produced an item.
    pub fn record_dequeue<T>(&self, queue: QueueName, pop: impl FnOnce() -> Option<T>) -> Option<T> {
        let mut queues = self.lock();
        let item = pop()?;
        queues[queue.index()].pop();
        Some(item)
    }

    pub fn mark_closed(&self, queue: QueueName) {
        self.lock()[queue.index()].closed = true;
    }

    pub fn record_completed(&self) {
        self.totals.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_rejected(&self, path: RejectionPath) {
        let counter = match path {
            RejectionPath::Auto => &self.totals.rejected_auto,
            RejectionPath::RetryExhausted => &self.totals.rejected_retry_exhausted,
            RejectionPath::Manual => &self.totals.rejected_manual,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_abandoned(&self) {
        self.totals.abandoned.fetch_add(1, Ordering::SeqCst);
    }

    pub fn queue(&self, name: QueueName) -> QueueMetrics {
        self.lock()[name.index()]
    }

    pub fn totals(&self) -> TotalsSnapshot {
        // Outcome counters are read before `generated`: an outcome is only ever
        // recorded after its admission, so this order keeps the snapshot's
        // outcomes within its generated count.
        let completed = self.totals.completed.load(Ordering::SeqCst);
        let rejected_auto = self.totals.rejected_auto.load(Ordering::SeqCst);
        let rejected_retry_exhausted = self.totals.rejected_retry_exhausted.load(Ordering::SeqCst);
        let rejected_manual = self.totals.rejected_manual.load(Ordering::SeqCst);
        let abandoned = self.totals.abandoned.load(Ordering::SeqCst);
        let generated = self.totals.generated.load(Ordering::SeqCst);

        TotalsSnapshot {
            generated,
            completed,
            rejected: rejected_auto + rejected_retry_exhausted + rejected_manual,
            rejected_auto,
            rejected_retry_exhausted,
            rejected_manual,
            abandoned,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let queues = self.lock();
        let totals = self.totals();
        MetricsSnapshot {
            totals,
            queues: queues.to_vec(),
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_ok(metrics: &MetricsAggregator, queue: QueueName, admission: bool) {
        metrics
            .record_enqueue(queue, admission, || Ok::<(), ()>(()))
            .unwrap();
    }

    #[test]
    fn test_peak_is_monotonic() {
        let metrics = MetricsAggregator::default();
        push_ok(&metrics, QueueName::NormalCheck, true);
        push_ok(&metrics, QueueName::NormalCheck, true);
        metrics.record_dequeue(QueueName::NormalCheck, || Some(()));
        metrics.record_dequeue(QueueName::NormalCheck, || Some(()));
        push_ok(&metrics, QueueName::NormalCheck, true);

        let m = metrics.queue(QueueName::NormalCheck);
        assert_eq!(m.current_length, 1);
        assert_eq!(m.peak_length, 2);
        assert_eq!(m.enqueued, 3);
        assert_eq!(m.dequeued, 2);
    }

    #[test]
    fn test_failed_push_records_nothing() {
        let metrics = MetricsAggregator::default();
        let result = metrics.record_enqueue(QueueName::PriorityCheck, true, || Err("full"));
        assert_eq!(result, Err("full"));

        let m = metrics.queue(QueueName::PriorityCheck);
        assert_eq!(m.current_length, 0);
        assert_eq!(m.enqueued, 0);
        assert_eq!(metrics.totals().generated, 0);
    }

    #[test]
    fn test_empty_pop_records_nothing() {
        let metrics = MetricsAggregator::default();
        assert_eq!(metrics.record_dequeue(QueueName::ManualCheck, || None::<()>), None);
        assert_eq!(metrics.queue(QueueName::ManualCheck).dequeued, 0);
    }

    #[test]
    fn test_admission_counts_generated_once() {
        let metrics = MetricsAggregator::default();
        push_ok(&metrics, QueueName::NormalCheck, true);
        metrics.record_dequeue(QueueName::NormalCheck, || Some(()));
        // Re-enqueue after a transient error is not a new admission.
        push_ok(&metrics, QueueName::NormalCheck, false);
        assert_eq!(metrics.totals().generated, 1);
    }

    #[test]
    fn test_rejection_breakdown() {
        let metrics = MetricsAggregator::default();
        for _ in 0..4 {
            push_ok(&metrics, QueueName::NormalCheck, true);
        }
        metrics.record_rejected(RejectionPath::Auto);
        metrics.record_rejected(RejectionPath::RetryExhausted);
        metrics.record_rejected(RejectionPath::Manual);
        metrics.record_completed();

        let totals = metrics.totals();
        assert_eq!(totals.rejected, 3);
        assert_eq!(totals.rejected_retry_exhausted, 1);
        assert_eq!(totals.processed(), 4);
        assert_eq!(totals.success_rate(), Some(25.0));
        assert_eq!(totals.rejection_rate(), Some(75.0));
    }

    #[test]
    fn test_rates_undefined_without_traffic() {
        let totals = TotalsSnapshot::default();
        assert_eq!(totals.success_rate(), None);
        assert_eq!(totals.rejection_rate(), None);
    }

    #[test]
    fn test_bottleneck_prefers_highest_peak() {
        let metrics = MetricsAggregator::default();
        assert_eq!(metrics.snapshot().bottleneck(), None);

        push_ok(&metrics, QueueName::PriorityCheck, true);
        for _ in 0..3 {
            push_ok(&metrics, QueueName::NormalExecute, false);
        }
        push_ok(&metrics, QueueName::ManualCheck, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bottleneck(), Some(QueueName::NormalExecute));
        assert_eq!(snapshot.total_in_queues(), 5);
    }

    #[test]
    fn test_capacity_and_closed_flags() {
        let metrics = MetricsAggregator::new(|name| match name {
            QueueName::PriorityCheck | QueueName::PriorityExecute => Some(10),
            _ => None,
        });
        metrics.mark_closed(QueueName::PriorityCheck);

        let snapshot = metrics.snapshot();
        let priority = snapshot.queue(QueueName::PriorityCheck).unwrap();
        assert_eq!(priority.capacity, Some(10));
        assert!(priority.closed);
        assert_eq!(snapshot.queue(QueueName::ManualCheck).unwrap().capacity, None);
    }
}
