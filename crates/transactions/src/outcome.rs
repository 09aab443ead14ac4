//! Results of running a transaction

use std::time::Duration;
use tessera_core::{AttemptId, Error, TransactionId};

use crate::attempt::AttemptStatus;

/// What happened to one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// Attempt identifier
    pub attempt_id: AttemptId,
    /// Final state of the attempt
    pub status: AttemptStatus,
    /// Time from body start to commit or rollback
    pub duration: Duration,
    /// Failure that ended the attempt, if any
    pub error: Option<String>,
}

/// Summary of a finished transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    /// Transaction identifier
    pub transaction_id: TransactionId,
    /// Final state of the last attempt
    pub status: AttemptStatus,
    /// Every attempt in order
    pub attempts: Vec<AttemptRecord>,
    /// All staged writes of the winning attempt were applied
    pub unstaging_complete: bool,
}

impl TransactionOutcome {
    /// Number of attempts made
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Check if the transaction committed
    pub fn is_committed(&self) -> bool {
        self.status == AttemptStatus::Committed
    }

    /// Check if the transaction ended rolled back
    pub fn is_rolled_back(&self) -> bool {
        self.status == AttemptStatus::RolledBack
    }

    /// The last attempt
    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }
}

/// Successful run: the body's value plus the outcome
#[derive(Debug, Clone)]
pub struct TransactionResult<T> {
    /// Value the body returned from the final attempt
    pub value: T,
    /// Outcome summary
    pub outcome: TransactionOutcome,
}

/// Failed run: the terminal error plus the outcome
#[derive(Debug, Clone, thiserror::Error)]
#[error("transaction {} failed: {error}", .outcome.transaction_id)]
pub struct TransactionFailed {
    /// Terminal error
    #[source]
    pub error: Error,
    /// Outcome summary
    pub outcome: TransactionOutcome,
}

impl TransactionFailed {
    /// Terminal error
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Outcome summary
    pub fn outcome(&self) -> &TransactionOutcome {
        &self.outcome
    }
}

impl From<TransactionFailed> for Error {
    fn from(failed: TransactionFailed) -> Self {
        failed.error
    }
}
