//! The five pipeline queues and the routing rules between them.

use crate::config::SimulationConfig;
use crate::domain::metrics::{MetricsAggregator, QueueName};
use crate::domain::transaction::Transaction;
use crate::error::{PipelineError, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

enum LaneSender {
    Bounded(mpsc::Sender<Transaction>),
    Unbounded(mpsc::UnboundedSender<Transaction>),
}

enum LaneReceiver {
    Bounded(mpsc::Receiver<Transaction>),
    Unbounded(mpsc::UnboundedReceiver<Transaction>),
}

impl LaneReceiver {
    fn try_recv(&mut self) -> Option<Transaction> {
        match self {
            LaneReceiver::Bounded(rx) => rx.try_recv().ok(),
            LaneReceiver::Unbounded(rx) => rx.try_recv().ok(),
        }
    }

    fn close(&mut self) {
        match self {
            LaneReceiver::Bounded(rx) => rx.close(),
            LaneReceiver::Unbounded(rx) => rx.close(),
        }
    }
}

struct Lane {
    sender: LaneSender,
    // Several workers read the same lane (NormalCheck is drained by both screeners).
    receiver: Mutex<LaneReceiver>,
}

impl Lane {
    fn new(capacity: Option<usize>) -> Self {
        match capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity);
                Self {
                    sender: LaneSender::Bounded(tx),
                    receiver: Mutex::new(LaneReceiver::Bounded(rx)),
                }
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                Self {
                    sender: LaneSender::Unbounded(tx),
                    receiver: Mutex::new(LaneReceiver::Unbounded(rx)),
                }
            }
        }
    }

    fn is_closed(&self) -> bool {
        match &self.sender {
            LaneSender::Bounded(tx) => tx.is_closed(),
            LaneSender::Unbounded(tx) => tx.is_closed(),
        }
    }
}

/// Why a non-blocking push did not go through. The transaction is handed back.
#[derive(Debug)]
pub enum TryPushError {
    Full(Transaction),
    Closed(Transaction),
}

/// The named queues of the pipeline.
///
/// Priority lanes are bounded; normal lanes are bounded or unbounded per
/// configuration; `ManualCheck` is always unbounded. Every push and pop is
/// recorded in the shared [`MetricsAggregator`] atomically with the channel
/// operation itself.
pub struct QueueSet {
    lanes: [Lane; 5],
    metrics: Arc<MetricsAggregator>,
}

impl QueueSet {
    pub fn new(config: &SimulationConfig, metrics: Arc<MetricsAggregator>) -> Self {
        Self {
            lanes: QueueName::ALL.map(|name| Lane::new(Self::capacity_for(config, name))),
            metrics,
        }
    }

    /// Capacity of `queue` under `config`; `None` when unbounded.
    pub fn capacity_for(config: &SimulationConfig, queue: QueueName) -> Option<usize> {
        match queue {
            QueueName::PriorityCheck | QueueName::PriorityExecute => {
                Some(config.priority_queue_capacity)
            }
            QueueName::NormalCheck | QueueName::NormalExecute => config.normal_queue_capacity,
            QueueName::ManualCheck => None,
        }
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    fn lane(&self, queue: QueueName) -> &Lane {
        &self.lanes[queue.index()]
    }

    fn length(&self, queue: QueueName) -> usize {
        self.metrics.queue(queue).current_length
    }

    /// Pushes without waiting. Fails with `Full` only for a bounded lane at capacity.
    pub fn try_push(
        &self,
        queue: QueueName,
        mut tx: Transaction,
        admission: bool,
    ) -> std::result::Result<(), TryPushError> {
        match &self.lane(queue).sender {
            LaneSender::Bounded(sender) => {
                let permit = match sender.try_reserve() {
                    Ok(permit) => permit,
                    Err(mpsc::error::TrySendError::Full(())) => return Err(TryPushError::Full(tx)),
                    Err(mpsc::error::TrySendError::Closed(())) => {
                        return Err(TryPushError::Closed(tx));
                    }
                };
                tx.record_route(queue);
                self.metrics
                    .record_enqueue(queue, admission, || {
                        permit.send(tx);
                        Ok::<(), TryPushError>(())
                    })
            }
            LaneSender::Unbounded(sender) => {
                if sender.is_closed() {
                    return Err(TryPushError::Closed(tx));
                }
                tx.record_route(queue);
                self.metrics.record_enqueue(queue, admission, || {
                    sender
                        .send(tx)
                        .map_err(|mpsc::error::SendError(tx)| TryPushError::Closed(tx))
                })
            }
        }
    }

    /// Pushes, waiting for capacity on a full bounded lane.
    ///
    /// The wait ends with `Cancelled` once `cancel` fires, and a closed lane
    /// yields `QueueClosed`. Either way the transaction is dropped.
    pub async fn push(
        &self,
        queue: QueueName,
        tx: Transaction,
        admission: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let tx = match self.try_push(queue, tx, admission) {
            Ok(()) => return Ok(()),
            Err(TryPushError::Closed(_)) => return Err(PipelineError::QueueClosed(queue)),
            Err(TryPushError::Full(tx)) => tx,
        };

        // Only bounded lanes report `Full`.
        let LaneSender::Bounded(sender) = &self.lane(queue).sender else {
            return Err(PipelineError::QueueClosed(queue));
        };
        let permit = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            permit = sender.reserve() => permit.map_err(|_| PipelineError::QueueClosed(queue))?,
        };

        let mut tx = tx;
        tx.record_route(queue);
        self.metrics.record_enqueue(queue, admission, || {
            permit.send(tx);
            Ok::<(), PipelineError>(())
        })
    }

    pub async fn try_pop(&self, queue: QueueName) -> Option<Transaction> {
        let mut receiver = self.lane(queue).receiver.lock().await;
        self.metrics
            .record_dequeue(queue, || receiver.try_recv())
    }

    /// Tries each source in order and returns the first available transaction.
    pub async fn try_pop_first(&self, sources: &[QueueName]) -> Option<(QueueName, Transaction)> {
        for &queue in sources {
            if let Some(tx) = self.try_pop(queue).await {
                debug!(
                    queue = %queue,
                    tx = %tx.short_id(),
                    length = self.length(queue),
                    "Transaction dequeued"
                );
                return Some((queue, tx));
            }
        }
        None
    }

    /// Routes a transaction into the check stage.
    ///
    /// Corporate payments take the priority lane when it has room and fall back
    /// to a waiting push onto the normal lane when it is full; client transfers
    /// always use the normal lane. `admission` marks a transaction entering the
    /// pipeline for the first time.
    pub async fn route_for_check(
        &self,
        tx: Transaction,
        admission: bool,
        cancel: &CancellationToken,
    ) -> Result<QueueName> {
        self.route_with_priority(
            tx.is_corporate(),
            QueueName::PriorityCheck,
            QueueName::NormalCheck,
            tx,
            admission,
            cancel,
        )
        .await
    }

    /// Routes a screened transaction into the execution stage.
    ///
    /// Same priority-then-fallback rule as the check stage, applied only to
    /// corporate payments that never went through manual review.
    pub async fn route_for_execution(
        &self,
        tx: Transaction,
        cancel: &CancellationToken,
    ) -> Result<QueueName> {
        self.route_with_priority(
            tx.is_priority_execution(),
            QueueName::PriorityExecute,
            QueueName::NormalExecute,
            tx,
            false,
            cancel,
        )
        .await
    }

    pub fn route_for_manual_check(&self, tx: Transaction) -> Result<QueueName> {
        let short_id = tx.short_id();
        match self.try_push(QueueName::ManualCheck, tx, false) {
            Ok(()) => {
                debug!(
                    queue = %QueueName::ManualCheck,
                    tx = %short_id,
                    length = self.length(QueueName::ManualCheck),
                    "Transaction enqueued for manual check"
                );
                Ok(QueueName::ManualCheck)
            }
            // Unbounded, so never full.
            Err(TryPushError::Full(_) | TryPushError::Closed(_)) => {
                Err(PipelineError::QueueClosed(QueueName::ManualCheck))
            }
        }
    }

    async fn route_with_priority(
        &self,
        prioritised: bool,
        priority: QueueName,
        normal: QueueName,
        tx: Transaction,
        admission: bool,
        cancel: &CancellationToken,
    ) -> Result<QueueName> {
        let short_id = tx.short_id();
        let tx = if prioritised {
            match self.try_push(priority, tx, admission) {
                Ok(()) => {
                    debug!(
                        queue = %priority,
                        tx = %short_id,
                        length = self.length(priority),
                        "Corporate transaction enqueued"
                    );
                    return Ok(priority);
                }
                Err(TryPushError::Closed(_)) => return Err(PipelineError::QueueClosed(priority)),
                Err(TryPushError::Full(tx)) => {
                    debug!(queue = %priority, tx = %short_id, "Priority lane full, falling back");
                    tx
                }
            }
        } else {
            tx
        };

        self.push(normal, tx, admission, cancel).await?;
        debug!(
            queue = %normal,
            tx = %short_id,
            length = self.length(normal),
            "Transaction enqueued"
        );
        Ok(normal)
    }

    /// Closes every lane for writing. Items already queued stay readable.
    pub async fn close_all(&self) {
        for queue in QueueName::ALL {
            self.lane(queue).receiver.lock().await.close();
            self.metrics.mark_closed(queue);
        }
    }

    pub fn is_closed(&self, queue: QueueName) -> bool {
        self.lane(queue).is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::TransactionType;
    use rust_decimal_macros::dec;

    fn queue_set(config: &SimulationConfig) -> QueueSet {
        let metrics = Arc::new(MetricsAggregator::new(|name| QueueSet::capacity_for(config, name)));
        QueueSet::new(config, metrics)
    }

    #[tokio::test]
    async fn test_client_goes_to_normal_check() {
        let queues = queue_set(&SimulationConfig::default());
        let cancel = CancellationToken::new();

        let dest = queues
            .route_for_check(Transaction::client_transfer(dec!(1.0)), true, &cancel)
            .await
            .unwrap();
        assert_eq!(dest, QueueName::NormalCheck);
        assert_eq!(queues.metrics().totals().generated, 1);
    }

    #[tokio::test]
    async fn test_corporate_overflow_falls_back_to_normal() {
        let config = SimulationConfig::default().with_priority_queue_capacity(1);
        let queues = queue_set(&config);
        let cancel = CancellationToken::new();

        let first = queues
            .route_for_check(Transaction::corporate_payment(dec!(1.0)), true, &cancel)
            .await
            .unwrap();
        let second = queues
            .route_for_check(Transaction::corporate_payment(dec!(2.0)), true, &cancel)
            .await
            .unwrap();

        assert_eq!(first, QueueName::PriorityCheck);
        assert_eq!(second, QueueName::NormalCheck);

        let (_, overflow) = queues.try_pop_first(&[QueueName::NormalCheck]).await.unwrap();
        assert_eq!(overflow.amount(), dec!(2.0));
        assert_eq!(overflow.route(), &[QueueName::NormalCheck]);
    }

    #[tokio::test]
    async fn test_pop_prefers_first_source() {
        let queues = queue_set(&SimulationConfig::default());
        let cancel = CancellationToken::new();
        queues
            .route_for_check(Transaction::client_transfer(dec!(1.0)), true, &cancel)
            .await
            .unwrap();
        queues
            .route_for_check(Transaction::corporate_payment(dec!(2.0)), true, &cancel)
            .await
            .unwrap();

        let sources = [QueueName::PriorityCheck, QueueName::NormalCheck];
        let (queue, tx) = queues.try_pop_first(&sources).await.unwrap();
        assert_eq!(queue, QueueName::PriorityCheck);
        assert_eq!(tx.transaction_type(), TransactionType::CorporatePayment);

        let (queue, _) = queues.try_pop_first(&sources).await.unwrap();
        assert_eq!(queue, QueueName::NormalCheck);
        assert!(queues.try_pop_first(&sources).await.is_none());
    }

    #[tokio::test]
    async fn test_reviewed_corporate_executes_on_normal_lane() {
        let queues = queue_set(&SimulationConfig::default());
        let cancel = CancellationToken::new();

        let mut flagged = Transaction::corporate_payment(dec!(1.0));
        flagged.begin_screening().unwrap();
        flagged.flag_for_manual_check();
        let dest = queues.route_for_execution(flagged, &cancel).await.unwrap();
        assert_eq!(dest, QueueName::NormalExecute);

        let mut clean = Transaction::corporate_payment(dec!(1.0));
        clean.begin_screening().unwrap();
        let dest = queues.route_for_execution(clean, &cancel).await.unwrap();
        assert_eq!(dest, QueueName::PriorityExecute);
    }

    #[tokio::test]
    async fn test_blocked_push_is_cancellable() {
        let config = SimulationConfig::default().with_normal_queue_capacity(Some(1));
        let queues = queue_set(&config);
        let cancel = CancellationToken::new();

        queues
            .push(QueueName::NormalCheck, Transaction::client_transfer(dec!(1.0)), true, &cancel)
            .await
            .unwrap();

        cancel.cancel();
        let result = queues
            .push(QueueName::NormalCheck, Transaction::client_transfer(dec!(2.0)), true, &cancel)
            .await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(queues.metrics().queue(QueueName::NormalCheck).current_length, 1);
        assert_eq!(queues.metrics().totals().generated, 1);
    }

    #[tokio::test]
    async fn test_closed_queues_reject_writes() {
        let queues = queue_set(&SimulationConfig::default());
        let cancel = CancellationToken::new();
        queues
            .route_for_check(Transaction::client_transfer(dec!(1.0)), true, &cancel)
            .await
            .unwrap();

        queues.close_all().await;
        for queue in QueueName::ALL {
            assert!(queues.is_closed(queue));
        }

        let result = queues
            .route_for_check(Transaction::corporate_payment(dec!(1.0)), true, &cancel)
            .await;
        assert!(matches!(result, Err(PipelineError::QueueClosed(QueueName::PriorityCheck))));
        assert!(queues.route_for_manual_check(Transaction::client_transfer(dec!(1.0))).is_err());

        // Already-queued work is still readable after close.
        assert!(queues.try_pop(QueueName::NormalCheck).await.is_some());
        assert_eq!(queues.metrics().totals().generated, 1);
    }

    #[tokio::test]
    async fn test_priority_length_never_exceeds_capacity() {
        let config = SimulationConfig::default().with_priority_queue_capacity(3);
        let queues = queue_set(&config);
        let cancel = CancellationToken::new();

        for _ in 0..10 {
            queues
                .route_for_check(Transaction::corporate_payment(dec!(1.0)), true, &cancel)
                .await
                .unwrap();
        }

        let priority = queues.metrics().queue(QueueName::PriorityCheck);
        assert_eq!(priority.current_length, 3);
        assert_eq!(priority.peak_length, 3);
        assert_eq!(queues.metrics().queue(QueueName::NormalCheck).current_length, 7);
    }
}
