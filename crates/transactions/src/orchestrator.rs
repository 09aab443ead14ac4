//! Transaction orchestrator
//!
//! [`Transactions::run`] executes a body in a fresh [`AttemptContext`] per
//! attempt. A body that returns normally is committed. A body that fails, or a
//! commit that is rejected, ends the attempt; retryable failures start a new
//! attempt after an exponential backoff, anything else is terminal.
//!
//! The metric counters use Relaxed ordering; they are observational only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tessera_client::{Channel, Connection};
use tessera_core::{Error, Result, TransactionId};
use tracing::{debug, info, warn};

use crate::attempt::{AttemptContext, AttemptStatus};
use crate::config::TransactionConfig;
use crate::outcome::{AttemptRecord, TransactionFailed, TransactionOutcome, TransactionResult};

/// Snapshot of orchestrator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionMetrics {
    /// Transactions started
    pub started: u64,
    /// Transactions committed
    pub committed: u64,
    /// Transactions the caller rolled back
    pub rolled_back: u64,
    /// Transactions that ended in an error
    pub failed: u64,
}

/// Entry point for multi-document transactions
pub struct Transactions {
    channel: Channel,
    config: TransactionConfig,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_rolled_back: AtomicU64,
    total_failed: AtomicU64,
}

impl std::fmt::Debug for Transactions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transactions")
            .field("config", &self.config)
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl Transactions {
    /// Create an orchestrator with the default configuration
    pub fn new(connection: &Connection) -> Self {
        Self::with_config(connection, TransactionConfig::default())
    }

    /// Create an orchestrator with an explicit configuration
    pub fn with_config(connection: &Connection, config: TransactionConfig) -> Self {
        Self::over_channel(connection.channel().clone(), config)
    }

    /// Create an orchestrator directly over a channel
    pub fn over_channel(channel: Channel, config: TransactionConfig) -> Self {
        Transactions {
            channel,
            config,
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_rolled_back: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Current counters
    pub fn metrics(&self) -> TransactionMetrics {
        TransactionMetrics {
            started: self.total_started.load(Ordering::Relaxed),
            committed: self.total_committed.load(Ordering::Relaxed),
            rolled_back: self.total_rolled_back.load(Ordering::Relaxed),
            failed: self.total_failed.load(Ordering::Relaxed),
        }
    }

    /// Run `body` as a transaction, retrying on conflicts and transient failures
    ///
    /// The body may run several times and should have no side effects outside
    /// the context it is given. Calling [`AttemptContext::rollback`] and
    /// returning `Ok` finishes the transaction as rolled back without error.
    ///
    /// This blocks the calling thread and must not be called from inside an
    /// async runtime; requests made there fail with `InvalidArgument`.
    ///
    /// # Errors
    /// - the body's own error when it is not retryable (after rollback)
    /// - `TransactionCommitAmbiguous` when the commit reply is lost; never retried
    /// - `RetriesExhausted` when the attempt ceiling is reached
    /// - `TransactionExpired` when the timeout elapses
    pub fn run<T, F>(&self, mut body: F) -> std::result::Result<TransactionResult<T>, TransactionFailed>
    where
        F: FnMut(&mut AttemptContext) -> Result<T>,
    {
        let transaction_id = TransactionId::new();
        let started = Instant::now();
        let mut records = Vec::new();
        let mut attempt: u32 = 0;
        self.total_started.fetch_add(1, Ordering::Relaxed);

        loop {
            attempt += 1;
            let mut ctx = AttemptContext::new(
                transaction_id,
                self.channel.clone(),
                started,
                self.config.timeout,
                self.config.durability,
            );
            let attempt_started = Instant::now();
            debug!(target: "tessera::txn", transaction_id = %transaction_id, attempt_id = %ctx.attempt_id(), attempt, "attempt started");

            let result = match body(&mut ctx) {
                Ok(value) if ctx.status() == AttemptStatus::RolledBack => Ok(value),
                Ok(value) => ctx.commit().map(|()| value),
                Err(e) => {
                    ctx.discard();
                    Err(e)
                }
            };
            records.push(AttemptRecord {
                attempt_id: ctx.attempt_id(),
                status: ctx.status(),
                duration: attempt_started.elapsed(),
                error: result.as_ref().err().map(|e| e.to_string()),
            });

            let error = match result {
                Ok(value) => {
                    let status = ctx.status();
                    if status == AttemptStatus::Committed {
                        self.total_committed.fetch_add(1, Ordering::Relaxed);
                        info!(target: "tessera::txn", transaction_id = %transaction_id, attempts = attempt, "transaction committed");
                    } else {
                        self.total_rolled_back.fetch_add(1, Ordering::Relaxed);
                        info!(target: "tessera::txn", transaction_id = %transaction_id, attempts = attempt, "transaction rolled back");
                    }
                    return Ok(TransactionResult {
                        value,
                        outcome: TransactionOutcome {
                            transaction_id,
                            status,
                            attempts: records,
                            unstaging_complete: status == AttemptStatus::Committed,
                        },
                    });
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(self.fail(transaction_id, ctx.status(), records, error));
            }
            if attempt >= self.config.max_attempts {
                let exhausted = Error::RetriesExhausted {
                    attempts: attempt,
                    last_error: error.to_string(),
                };
                return Err(self.fail(transaction_id, ctx.status(), records, exhausted));
            }

            let delay = self.config.calculate_delay(attempt - 1);
            if started.elapsed() + delay >= self.config.timeout {
                let expired = Error::TransactionExpired {
                    transaction_id: transaction_id.to_string(),
                    elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                };
                return Err(self.fail(transaction_id, ctx.status(), records, expired));
            }
            warn!(target: "tessera::txn", transaction_id = %transaction_id, attempt, error = %error, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "retrying transaction");
            std::thread::sleep(delay);
        }
    }

    fn fail(
        &self,
        transaction_id: TransactionId,
        status: AttemptStatus,
        attempts: Vec<AttemptRecord>,
        error: Error,
    ) -> TransactionFailed {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
        warn!(target: "tessera::txn", transaction_id = %transaction_id, attempts = attempts.len(), error = %error, "transaction failed");
        TransactionFailed {
            error,
            outcome: TransactionOutcome {
                transaction_id,
                status,
                attempts,
                unstaging_complete: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tessera_client::Credentials;
    use tessera_core::TransportErrorKind;
    use tessera_memory::MemoryServer;

    fn setup(config: TransactionConfig) -> (Arc<MemoryServer>, Connection, Transactions) {
        let server = Arc::new(MemoryServer::new());
        let connection = Connection::connect(server.clone(), Credentials::new("u", "p")).unwrap();
        let transactions = Transactions::with_config(&connection, config);
        (server, connection, transactions)
    }

    fn fast() -> TransactionConfig {
        TransactionConfig::new().with_base_delay_ms(1).with_jitter(false)
    }

    #[test]
    fn test_commit_single_attempt() {
        let (_server, connection, transactions) = setup(fast());
        let collection = connection.open_collection("b", "_default", "_default").unwrap();
        let result = transactions
            .run(|ctx| {
                ctx.insert(&collection, "a", json!({"v": 1}))?;
                Ok(7)
            })
            .unwrap();
        assert_eq!(result.value, 7);
        assert!(result.outcome.is_committed());
        assert!(result.outcome.unstaging_complete);
        assert_eq!(result.outcome.attempt_count(), 1);
        assert_eq!(transactions.metrics().committed, 1);
    }

    #[test]
    fn test_transient_failure_retried() {
        let (server, connection, transactions) = setup(fast());
        let collection = connection.open_collection("b", "_default", "_default").unwrap();
        collection.upsert("a", json!({"v": 1})).unwrap();
        server.inject_failure(Error::transport(TransportErrorKind::TemporaryFailure, "busy"));

        let result = transactions
            .run(|ctx| {
                let doc = ctx.get(&collection, "a")?;
                ctx.replace(&doc, json!({"v": 2}))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(result.outcome.attempt_count(), 2);
        assert!(result.outcome.attempts[0].error.is_some());
        assert_eq!(collection.get("a").unwrap().content.as_inner(), &json!({"v": 2}));
    }

    #[test]
    fn test_application_error_is_terminal() {
        let (_server, connection, transactions) = setup(fast());
        let collection = connection.open_collection("b", "_default", "_default").unwrap();
        let mut calls = 0;
        let failed = transactions
            .run(|ctx| -> Result<()> {
                calls += 1;
                ctx.insert(&collection, "a", json!({}))?;
                Err(Error::application("nope"))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(failed.error, Error::application("nope"));
        assert!(failed.outcome.is_rolled_back());
        assert_eq!(transactions.metrics().failed, 1);
    }

    #[test]
    fn test_retries_exhausted() {
        let (server, connection, transactions) = setup(fast().with_max_attempts(3));
        let collection = connection.open_collection("b", "_default", "_default").unwrap();
        server.inject_failures(
            10,
            Error::transport(TransportErrorKind::ServiceUnavailable, "down"),
        );
        let failed = transactions
            .run(|ctx| ctx.get(&collection, "a").map(|_| ()))
            .unwrap_err();
        assert!(matches!(
            failed.error,
            Error::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(failed.outcome.attempt_count(), 3);
    }

    #[test]
    fn test_explicit_rollback() {
        let (_server, connection, transactions) = setup(fast());
        let collection = connection.open_collection("b", "_default", "_default").unwrap();
        let result = transactions
            .run(|ctx| {
                ctx.insert(&collection, "a", json!({}))?;
                ctx.rollback()?;
                Ok("done")
            })
            .unwrap();
        assert_eq!(result.value, "done");
        assert!(result.outcome.is_rolled_back());
        assert!(!result.outcome.unstaging_complete);
        assert!(collection.get("a").is_err());
        assert_eq!(transactions.metrics().rolled_back, 1);
    }

    #[test]
    fn test_timeout_expires() {
        let (_server, connection, transactions) =
            setup(fast().with_timeout(Duration::from_millis(0)));
        let collection = connection.open_collection("b", "_default", "_default").unwrap();
        let failed = transactions
            .run(|ctx| ctx.get(&collection, "a").map(|_| ()))
            .unwrap_err();
        assert!(matches!(failed.error, Error::TransactionExpired { .. }));
    }
}
