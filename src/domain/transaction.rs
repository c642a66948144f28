use crate::domain::metrics::QueueName;
use crate::error::{PipelineError, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    ClientTransfer,
    CorporatePayment,
}

/// Position of a transaction in the processing state machine.
///
/// `Completed` and `Rejected` are terminal. A terminal transaction is never
/// handed to another queue.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Screening,
    ManualCheck,
    Executing,
    Completed,
    Rejected,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// Returns whether `self -> next` is an edge of the state machine.
    ///
    /// `Pending -> ManualCheck` covers ordinary transactions sampled for a manual
    /// audit straight from the normal check queue, and `Screening -> Screening`
    /// covers a transaction resubmitted after a transient screening failure.
    pub fn can_transition_to(self, next: Self) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Screening)
                | (Pending, ManualCheck)
                | (Screening, Screening)
                | (Screening, ManualCheck)
                | (Screening, Executing)
                | (Screening, Rejected)
                | (ManualCheck, Executing)
                | (ManualCheck, Rejected)
                | (Executing, Completed)
        )
    }
}

/// A unit of work flowing through the pipeline.
///
/// Identity (id, creation time, amount, type) is fixed at construction. The
/// processing state is only changed through the `begin_*`/`complete`/`reject`
/// methods, which enforce the status machine. Ownership moves with the value
/// across queue boundaries, so at most one worker can mutate it at a time.
#[derive(Debug, Clone)]
pub struct Transaction {
    id: Uuid,
    created_at: Instant,
    amount: Decimal,
    r#type: TransactionType,
    status: TransactionStatus,
    needs_manual_check: bool,
    is_suspicious: bool,
    manually_reviewed: bool,
    processing_attempts: u32,
    screening_started_at: Option<Instant>,
    execution_started_at: Option<Instant>,
    completed_at: Option<Instant>,
    route: Vec<QueueName>,
}

impl Transaction {
    pub fn new(r#type: TransactionType, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Instant::now(),
            amount,
            r#type,
            status: TransactionStatus::Pending,
            needs_manual_check: false,
            is_suspicious: false,
            manually_reviewed: false,
            processing_attempts: 0,
            screening_started_at: None,
            execution_started_at: None,
            completed_at: None,
            route: Vec::new(),
        }
    }

    pub fn client_transfer(amount: Decimal) -> Self {
        Self::new(TransactionType::ClientTransfer, amount)
    }

    pub fn corporate_payment(amount: Decimal) -> Self {
        Self::new(TransactionType::CorporatePayment, amount)
    }

    /// Builds a transaction from a raw sampled amount, rounded to cents.
    pub fn with_sampled_amount(r#type: TransactionType, raw: f64) -> Self {
        let amount = Decimal::from_f64(raw)
            .unwrap_or(Decimal::ZERO)
            .round_dp(2);
        Self::new(r#type, amount)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// First eight hex digits of the id, used in log lines.
    pub fn short_id(&self) -> String {
        let mut id = self.id.simple().to_string();
        id.truncate(8);
        id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.r#type
    }

    pub fn is_corporate(&self) -> bool {
        self.r#type == TransactionType::CorporatePayment
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn processing_attempts(&self) -> u32 {
        self.processing_attempts
    }

    /// Set once auto-screening flags the transaction for manual review.
    pub fn needs_manual_check(&self) -> bool {
        self.needs_manual_check
    }

    pub fn is_suspicious(&self) -> bool {
        self.is_suspicious
    }

    pub fn manually_reviewed(&self) -> bool {
        self.manually_reviewed
    }

    pub fn screening_started_at(&self) -> Option<Instant> {
        self.screening_started_at
    }

    pub fn execution_started_at(&self) -> Option<Instant> {
        self.execution_started_at
    }

    pub fn completed_at(&self) -> Option<Instant> {
        self.completed_at
    }

    /// Queues this transaction has been placed into, in order.
    pub fn route(&self) -> &[QueueName] {
        &self.route
    }

    pub(crate) fn record_route(&mut self, queue: QueueName) {
        self.route.push(queue);
    }

    /// Whether execution may use the priority lane.
    ///
    /// Corporate payments qualify unless auto-screening flagged them. An
    /// unflagged payment sampled for audit keeps its priority.
    pub fn is_priority_execution(&self) -> bool {
        self.is_corporate() && !self.needs_manual_check
    }

    fn advance(&mut self, next: TransactionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn begin_screening(&mut self) -> Result<()> {
        self.advance(TransactionStatus::Screening)?;
        self.screening_started_at = Some(Instant::now());
        Ok(())
    }

    /// Marks the transaction suspicious and counts one more attempt.
    ///
    /// Returns the attempt count after the increment.
    pub fn flag_for_manual_check(&mut self) -> u32 {
        self.needs_manual_check = true;
        self.is_suspicious = true;
        self.processing_attempts += 1;
        self.processing_attempts
    }

    pub fn begin_manual_check(&mut self) -> Result<()> {
        self.advance(TransactionStatus::ManualCheck)?;
        self.manually_reviewed = true;
        // Audit-sampled transactions skip auto-screening; manual review is their screening start.
        if self.screening_started_at.is_none() {
            self.screening_started_at = Some(Instant::now());
        }
        Ok(())
    }

    pub fn begin_execution(&mut self) -> Result<()> {
        self.advance(TransactionStatus::Executing)?;
        self.execution_started_at = Some(Instant::now());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.advance(TransactionStatus::Completed)?;
        self.completed_at = Some(Instant::now());
        Ok(())
    }

    pub fn reject(&mut self) -> Result<()> {
        self.advance(TransactionStatus::Rejected)
    }
}
