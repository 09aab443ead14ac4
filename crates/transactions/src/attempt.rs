//! Transaction attempt context
//!
//! One [`AttemptContext`] lives for exactly one execution of a transaction
//! body. Reads go to the server and are recorded in the read set with the
//! CAS they were observed at. Writes are staged locally and only reach the
//! server in the commit request, where the read set and staged writes are
//! validated together (first committer wins).
//!
//! ## State machine
//!
//! ```text
//! Active ──commit──▶ Committing ──▶ Committed
//!    │                    └──────▶ Failed
//!    └──rollback──▶ RollingBack ──▶ RolledBack
//! ```
//!
//! Errors leaving an operation are either domain errors (passed through as-is)
//! or normalized into `TransactionOperationFailed`.

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tessera_client::{Channel, Collection};
use tessera_core::{
    AttemptId, Cas, DocId, DurabilityLevel, Error, JsonValue, QueryOptions, Request, Response,
    Result, StagedMutation, TransactionId,
};
use tracing::{debug, info, warn};

/// Lifecycle state of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    /// Body is running; operations allowed
    Active,
    /// Commit request in flight
    Committing,
    /// Staged writes applied
    Committed,
    /// Discarding staged writes
    RollingBack,
    /// Staged writes discarded
    RolledBack,
    /// Commit was rejected
    Failed,
}

impl AttemptStatus {
    /// Check if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Committed | AttemptStatus::RolledBack | AttemptStatus::Failed
        )
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptStatus::Active => "active",
            AttemptStatus::Committing => "committing",
            AttemptStatus::Committed => "committed",
            AttemptStatus::RollingBack => "rolling_back",
            AttemptStatus::RolledBack => "rolled_back",
            AttemptStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Document read (or written) inside an attempt
///
/// Doubles as the version token `replace`/`remove` require.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionGetResult {
    id: DocId,
    cas: Cas,
    attempt_id: AttemptId,
    content: JsonValue,
}

impl TransactionGetResult {
    /// Document identity
    pub fn id(&self) -> &DocId {
        &self.id
    }

    /// Document key
    pub fn key(&self) -> &str {
        &self.id.key
    }

    /// CAS the document was read at (zero for documents inserted in the attempt)
    pub fn cas(&self) -> Cas {
        self.cas
    }

    /// Attempt the token was issued by
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    /// Document body as the attempt sees it
    pub fn content(&self) -> &JsonValue {
        &self.content
    }

    /// Decode the body
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T> {
        self.content
            .deserialize_into()
            .map_err(|e| Error::invalid_argument(format!("document does not decode: {}", e)))
    }
}

/// Rows returned by a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionQueryResult {
    rows: Vec<JsonValue>,
}

impl TransactionQueryResult {
    /// Result rows
    pub fn rows(&self) -> &[JsonValue] {
        &self.rows
    }

    /// Decode every row
    pub fn rows_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.rows
            .iter()
            .map(|row| {
                row.deserialize_into()
                    .map_err(|e| Error::invalid_argument(format!("row does not decode: {}", e)))
            })
            .collect()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One execution of a transaction body
pub struct AttemptContext {
    transaction_id: TransactionId,
    attempt_id: AttemptId,
    channel: Channel,
    status: AttemptStatus,
    read_set: BTreeMap<DocId, Cas>,
    staged: Vec<StagedMutation>,
    started: Instant,
    deadline: Option<Instant>,
    durability: DurabilityLevel,
}

impl fmt::Debug for AttemptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptContext")
            .field("transaction_id", &self.transaction_id)
            .field("attempt_id", &self.attempt_id)
            .field("status", &self.status)
            .field("reads", &self.read_set.len())
            .field("staged", &self.staged.len())
            .finish()
    }
}

fn unexpected(operation: &str, response: &Response) -> Error {
    Error::protocol(format!(
        "unexpected {} response to transactional {}",
        response.name(),
        operation
    ))
}

impl AttemptContext {
    /// `started` is the start of the whole transaction; `timeout` is measured from it
    pub(crate) fn new(
        transaction_id: TransactionId,
        channel: Channel,
        started: Instant,
        timeout: Duration,
        durability: DurabilityLevel,
    ) -> Self {
        AttemptContext {
            transaction_id,
            attempt_id: AttemptId::new(),
            channel,
            status: AttemptStatus::Active,
            read_set: BTreeMap::new(),
            staged: Vec::new(),
            started,
            deadline: started.checked_add(timeout),
            durability,
        }
    }

    /// Transaction this attempt belongs to
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Identifier of this attempt
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    /// Current state
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    /// Number of staged writes
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Number of documents read
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    fn check_active(&self) -> Result<()> {
        if self.status == AttemptStatus::Active {
            Ok(())
        } else {
            Err(Error::AttemptNotActive {
                attempt_id: self.attempt_id.to_string(),
                state: self.status.to_string(),
            })
        }
    }

    fn check_live(&self) -> Result<()> {
        self.check_active()?;
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                let elapsed = self.started.elapsed().as_millis();
                return Err(Error::TransactionExpired {
                    transaction_id: self.transaction_id.to_string(),
                    elapsed_ms: u64::try_from(elapsed).unwrap_or(u64::MAX),
                });
            }
        }
        Ok(())
    }

    fn normalize(&self, operation: &str, error: Error) -> Error {
        if error.is_domain_error() {
            return error;
        }
        Error::TransactionOperationFailed {
            attempt_id: self.attempt_id.to_string(),
            operation: operation.to_string(),
            message: error.to_string(),
        }
    }

    fn send(&self, operation: &str, request: Request) -> Result<Response> {
        self.channel
            .send_blocking(request)
            .map_err(|e| self.normalize(operation, e))
    }

    fn conflict(&self, id: &DocId, reason: impl Into<String>) -> Error {
        Error::TransactionConflict {
            attempt_id: self.attempt_id.to_string(),
            key: id.key.clone(),
            reason: reason.into(),
        }
    }

    fn staged_for(&self, id: &DocId) -> Option<&StagedMutation> {
        self.staged.iter().find(|m| m.id() == id)
    }

    fn read_cas(&self, id: &DocId) -> Cas {
        self.read_set.get(id).copied().unwrap_or_default()
    }

    fn token(&self, id: DocId, content: JsonValue) -> TransactionGetResult {
        let cas = self.read_cas(&id);
        TransactionGetResult {
            id,
            cas,
            attempt_id: self.attempt_id,
            content,
        }
    }

    /// Stage a write, folding it into an earlier write to the same document
    fn stage(&mut self, mutation: StagedMutation) {
        let Some(pos) = self.staged.iter().position(|m| m.id() == mutation.id()) else {
            self.staged.push(mutation);
            return;
        };
        let merged = match (&self.staged[pos], mutation) {
            (StagedMutation::Insert { .. }, StagedMutation::Replace { id, value, .. }) => {
                Some(StagedMutation::Insert { id, value })
            }
            (StagedMutation::Insert { .. }, StagedMutation::Remove { .. }) => None,
            (StagedMutation::Remove { cas, .. }, StagedMutation::Insert { id, value }) => {
                Some(StagedMutation::Replace {
                    id,
                    cas: *cas,
                    value,
                })
            }
            (_, other) => Some(other),
        };
        match merged {
            Some(mutation) => self.staged[pos] = mutation,
            None => {
                self.staged.remove(pos);
            }
        }
    }

    /// Check that a token was issued by this attempt and is still current
    fn check_token(&self, token: &TransactionGetResult) -> Result<()> {
        if token.attempt_id != self.attempt_id {
            return Err(self.conflict(
                &token.id,
                format!("token was issued by attempt {}", token.attempt_id),
            ));
        }
        match self.read_set.get(&token.id) {
            Some(cas) if *cas == token.cas => {}
            Some(cas) => {
                return Err(self.conflict(
                    &token.id,
                    format!("token is at cas {} but the attempt read {}", token.cas, cas),
                ))
            }
            None => return Err(self.conflict(&token.id, "document was not read by this attempt")),
        }
        if let Some(StagedMutation::Remove { .. }) = self.staged_for(&token.id) {
            return Err(Error::DocumentNotFound {
                key: token.id.key.clone(),
            });
        }
        Ok(())
    }

    // ==================== Operations ====================

    /// Read a document, seeing this attempt's own staged writes
    pub fn get(&mut self, collection: &Collection, key: &str) -> Result<TransactionGetResult> {
        self.check_live()?;
        let id = collection.doc_id(key)?;

        if let Some(staged) = self.staged_for(&id) {
            return match staged.value() {
                Some(value) => Ok(self.token(id.clone(), value.clone())),
                None => Err(Error::DocumentNotFound {
                    key: key.to_string(),
                }),
            };
        }

        match self.send("get", Request::Get { id: id.clone() })? {
            Response::Document { cas, value, .. } => {
                debug!(target: "tessera::txn", attempt_id = %self.attempt_id, key, cas = cas.as_u64(), "read");
                self.read_set.insert(id.clone(), cas);
                Ok(self.token(id, value))
            }
            other => Err(self.normalize("get", unexpected("get", &other))),
        }
    }

    /// Stage the creation of a document that must not exist
    pub fn insert(
        &mut self,
        collection: &Collection,
        key: &str,
        value: impl Into<JsonValue>,
    ) -> Result<TransactionGetResult> {
        self.check_live()?;
        let id = collection.doc_id(key)?;
        let value = value.into();

        let staged_exists = self.staged_for(&id).map(|m| m.value().is_some());
        let exists = match staged_exists {
            Some(exists) => exists,
            None => match self.send("insert", Request::Exists { id: id.clone() })? {
                Response::Exists { exists, .. } => exists,
                other => return Err(self.normalize("insert", unexpected("insert", &other))),
            },
        };
        if exists {
            return Err(Error::DocumentExists {
                key: key.to_string(),
            });
        }

        self.read_set.entry(id.clone()).or_insert(Cas(0));
        self.stage(StagedMutation::Insert {
            id: id.clone(),
            value: value.clone(),
        });
        debug!(target: "tessera::txn", attempt_id = %self.attempt_id, key, "insert staged");
        Ok(self.token(id, value))
    }

    /// Stage a new body for a document read in this attempt
    pub fn replace(
        &mut self,
        token: &TransactionGetResult,
        value: impl Into<JsonValue>,
    ) -> Result<TransactionGetResult> {
        self.check_live()?;
        self.check_token(token)?;
        let value = value.into();
        self.stage(StagedMutation::Replace {
            id: token.id.clone(),
            cas: token.cas,
            value: value.clone(),
        });
        debug!(target: "tessera::txn", attempt_id = %self.attempt_id, key = %token.id.key, "replace staged");
        Ok(self.token(token.id.clone(), value))
    }

    /// Stage the removal of a document read in this attempt
    pub fn remove(&mut self, token: &TransactionGetResult) -> Result<()> {
        self.check_live()?;
        self.check_token(token)?;
        self.stage(StagedMutation::Remove {
            id: token.id.clone(),
            cas: token.cas,
        });
        debug!(target: "tessera::txn", attempt_id = %self.attempt_id, key = %token.id.key, "remove staged");
        Ok(())
    }

    /// Run a statement against this attempt's staged view
    ///
    /// Writes the statement makes are folded into the attempt's staged writes.
    pub fn query(&mut self, statement: &str, options: QueryOptions) -> Result<TransactionQueryResult> {
        self.check_live()?;
        let request = Request::TxnQuery {
            attempt_id: self.attempt_id,
            statement: statement.to_string(),
            options,
            staged: self.staged.clone(),
        };
        match self.send("query", request)? {
            Response::Query { rows, staged } => {
                debug!(target: "tessera::txn", attempt_id = %self.attempt_id, rows = rows.len(), staged = staged.len(), "query");
                for mutation in staged {
                    self.stage(mutation);
                }
                Ok(TransactionQueryResult { rows })
            }
            other => Err(self.normalize("query", unexpected("query", &other))),
        }
    }

    /// Discard every staged write and end the attempt
    ///
    /// The transaction finishes as rolled back once the body returns.
    pub fn rollback(&mut self) -> Result<()> {
        self.check_active()?;
        self.discard();
        Ok(())
    }

    /// Roll back if still active
    pub(crate) fn discard(&mut self) {
        if self.status != AttemptStatus::Active {
            return;
        }
        self.status = AttemptStatus::RollingBack;
        let dropped = self.staged.len();
        self.staged.clear();
        self.status = AttemptStatus::RolledBack;
        warn!(target: "tessera::txn", attempt_id = %self.attempt_id, staged = dropped, "attempt rolled back");
    }

    /// Send the read set and staged writes for validation and application
    ///
    /// An attempt that outlived its deadline is rolled back instead. A
    /// transport failure on the commit request itself is reported as
    /// `TransactionCommitAmbiguous`, since the server may have applied it.
    pub(crate) fn commit(&mut self) -> Result<()> {
        if let Err(e) = self.check_live() {
            self.discard();
            return Err(e);
        }
        self.status = AttemptStatus::Committing;
        if self.staged.is_empty() {
            self.status = AttemptStatus::Committed;
            return Ok(());
        }

        let request = Request::TxnCommit {
            transaction_id: self.transaction_id,
            attempt_id: self.attempt_id,
            reads: self
                .read_set
                .iter()
                .map(|(id, cas)| (id.clone(), *cas))
                .collect(),
            mutations: std::mem::take(&mut self.staged),
            durability: self.durability,
        };
        let result = match self.channel.send_blocking(request) {
            Ok(Response::Committed { cas }) => {
                info!(target: "tessera::txn", attempt_id = %self.attempt_id, documents = cas.len(), "attempt committed");
                Ok(())
            }
            Ok(other) => Err(self.normalize("commit", unexpected("commit", &other))),
            Err(Error::Transport { kind, message }) => {
                warn!(target: "tessera::txn", attempt_id = %self.attempt_id, %kind, "commit outcome unknown");
                Err(Error::TransactionCommitAmbiguous {
                    transaction_id: self.transaction_id.to_string(),
                    message: format!("{}: {}", kind, message),
                })
            }
            Err(e) => Err(self.normalize("commit", e)),
        };
        self.status = if result.is_ok() {
            AttemptStatus::Committed
        } else {
            AttemptStatus::Failed
        };
        result
    }
}
