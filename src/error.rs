use crate::domain::metrics::QueueName;
use crate::domain::transaction::TransactionStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Pipeline has already been started")]
    AlreadyStarted,
    #[error("Queue {0} is closed for writing")]
    QueueClosed(QueueName),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Cancellation is an orderly exit signal, not a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
