//! Multi-document transactions for Tessera
//!
//! ```ignore
//! let transactions = Transactions::new(&connection);
//! let result = transactions.run(|ctx| {
//!     let doc = ctx.get(&collection, "account-1")?;
//!     ctx.replace(&doc, json!({"balance": 10}))?;
//!     Ok(())
//! })?;
//! assert!(result.outcome.is_committed());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attempt;
pub mod config;
pub mod orchestrator;
pub mod outcome;

pub use attempt::{AttemptContext, AttemptStatus, TransactionGetResult, TransactionQueryResult};
pub use config::TransactionConfig;
pub use orchestrator::{TransactionMetrics, Transactions};
pub use outcome::{AttemptRecord, TransactionFailed, TransactionOutcome, TransactionResult};
