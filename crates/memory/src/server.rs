//! In-process server implementing [`Transport`]
//!
//! Requests are handled synchronously under one store lock. Test hooks:
//! - [`MemoryServer::request_count`] counts every request received
//! - [`MemoryServer::inject_failures`] fails the next requests with a given error
//! - [`MemoryServer::advance_clock`] moves document expiry time forward
//! - [`MemoryServer::set_query_handler`] plugs in a statement executor

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_client::Transport;
use tessera_core::{
    AttemptId, Cas, CommandSpec, DocId, DurabilityLevel, Error, FieldStatus, JsonValue, Limits,
    MutateInRequestOptions, QueryOptions, Request, Response, Result, StagedMutation,
    StoreSemantics, TransactionId, WriteOptions,
};
use tracing::{debug, info, warn};

use crate::query::{QueryHandler, QueryOutput, StagedView};
use crate::store::{DocumentStore, StoredDocument};
use crate::subdoc::{self, NewVersion, SpecFailure};
use crate::validation::validate_commit;

/// Cluster shape the server pretends to have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Reachable data nodes
    pub nodes: u32,
    /// Configured replicas per document
    pub replicas: u32,
    /// Bucket keeps nothing on disk
    pub ephemeral: bool,
    /// Limits enforced on incoming batches
    pub limits: Limits,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            nodes: 1,
            replicas: 0,
            ephemeral: false,
            limits: Limits::default(),
        }
    }
}

impl MemoryConfig {
    /// Set node and replica counts
    pub fn with_topology(mut self, nodes: u32, replicas: u32) -> Self {
        self.nodes = nodes;
        self.replicas = replicas;
        self
    }

    /// Mark the bucket ephemeral
    pub fn with_ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    /// Check whether a durability level can be met
    pub fn check_durability(&self, level: DurabilityLevel) -> Result<()> {
        if !level.requires_majority() {
            return Ok(());
        }
        let copies = self.replicas + 1;
        let needed = copies / 2 + 1;
        let available = self.nodes.min(copies);
        if available < needed {
            return Err(Error::DurabilityImpossible {
                level,
                reason: format!(
                    "{} of {} copies reachable, {} required",
                    available, copies, needed
                ),
            });
        }
        if level.requires_persistence() && self.ephemeral {
            return Err(Error::DurabilityImpossible {
                level,
                reason: "ephemeral bucket cannot persist".to_string(),
            });
        }
        Ok(())
    }
}

/// In-process reference server
pub struct MemoryServer {
    config: MemoryConfig,
    store: Mutex<DocumentStore>,
    query_handler: RwLock<Option<Arc<dyn QueryHandler>>>,
    faults: Mutex<VecDeque<Error>>,
    requests: AtomicU64,
    commits: AtomicU64,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryServer")
            .field("config", &self.config)
            .field("requests", &self.request_count())
            .field("commits", &self.commit_count())
            .finish_non_exhaustive()
    }
}

fn spec_error(id: &DocId, specs: &[CommandSpec], failed: SpecFailure) -> Error {
    let SpecFailure { index, failure } = failed;
    let path = specs
        .get(index)
        .map(|s| s.path().to_string())
        .unwrap_or_default();
    debug!(target: "tessera::memory", key = %id.key, index, reason = %failure.reason, "spec failed");
    match failure.status {
        FieldStatus::PathNotFound => Error::PathNotFound { index, path },
        FieldStatus::PathExists => Error::PathExists { index, path },
        FieldStatus::PathMismatch => Error::PathMismatch { index, path },
        FieldStatus::InvalidValue | FieldStatus::Success => Error::InvalidValue {
            index,
            path,
            reason: failure.reason,
        },
    }
}

fn check_cas(id: &DocId, existing: Option<&StoredDocument>, expected: Option<Cas>) -> Result<()> {
    match (expected, existing) {
        (None, _) => Ok(()),
        (Some(_), None) => Err(Error::DocumentNotFound {
            key: id.key.clone(),
        }),
        (Some(expected), Some(doc)) if doc.cas != expected => Err(Error::CasMismatch {
            key: id.key.clone(),
            expected: expected.as_u64(),
            actual: doc.cas.as_u64(),
        }),
        _ => Ok(()),
    }
}

/// Existing document (cloned) after applying the existence precondition
fn precondition(
    id: &DocId,
    existing: Option<&StoredDocument>,
    semantics: StoreSemantics,
) -> Result<Option<StoredDocument>> {
    match (semantics, existing) {
        (StoreSemantics::Insert, Some(_)) => Err(Error::DocumentExists {
            key: id.key.clone(),
        }),
        (StoreSemantics::Replace, None) => Err(Error::DocumentNotFound {
            key: id.key.clone(),
        }),
        (_, existing) => Ok(existing.cloned()),
    }
}

impl MemoryServer {
    /// Create a server with the default topology (one node, no replicas)
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Create a server with an explicit configuration
    pub fn with_config(config: MemoryConfig) -> Self {
        MemoryServer {
            config,
            store: Mutex::new(DocumentStore::new()),
            query_handler: RwLock::new(None),
            faults: Mutex::new(VecDeque::new()),
            requests: AtomicU64::new(0),
            commits: AtomicU64::new(0),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Register the statement executor
    pub fn set_query_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &QueryOptions, &StagedView<'_>) -> Result<QueryOutput> + Send + Sync + 'static,
    {
        *self.query_handler.write() = Some(Arc::new(handler));
    }

    /// Fail the next `count` requests with `error`
    pub fn inject_failures(&self, count: usize, error: Error) {
        let mut faults = self.faults.lock();
        for _ in 0..count {
            faults.push_back(error.clone());
        }
    }

    /// Fail the next request with `error`
    pub fn inject_failure(&self, error: Error) {
        self.inject_failures(1, error);
    }

    /// Number of requests received
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Number of transaction commits applied
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Reset both counters
    pub fn reset_counters(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.commits.store(0, Ordering::Relaxed);
    }

    /// Move the document clock forward
    pub fn advance_clock(&self, by: Duration) {
        self.store.lock().advance_clock(by);
    }

    /// Snapshot of a live document
    pub fn document(&self, id: &DocId) -> Option<StoredDocument> {
        self.store.lock().get(id).cloned()
    }

    /// Handle one request
    pub fn handle(&self, request: Request) -> Result<Response> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.faults.lock().pop_front() {
            warn!(target: "tessera::memory", request = request.name(), error = %error, "injected failure");
            return Err(error);
        }
        debug!(target: "tessera::memory", request = request.name(), "handling");

        match request {
            Request::Get { id } => self.get(&id),
            Request::Exists { id } => {
                let store = self.store.lock();
                let cas = store.current_cas(&id);
                Ok(Response::Exists {
                    exists: !cas.is_zero(),
                    cas,
                })
            }
            Request::Store {
                id,
                value,
                semantics,
                options,
            } => self.store_document(id, value, semantics, options),
            Request::Remove { id, options } => self.remove(&id, &options),
            Request::LookupIn { id, specs } => self.lookup_in(&id, &specs),
            Request::MutateIn { id, specs, options } => self.mutate_in(id, &specs, &options),
            Request::TxnQuery {
                attempt_id,
                statement,
                options,
                staged,
            } => self.query(attempt_id, &statement, &options, &staged),
            Request::TxnCommit {
                transaction_id,
                attempt_id,
                reads,
                mutations,
                durability,
            } => self.commit(transaction_id, attempt_id, &reads, mutations, durability),
        }
    }

    fn get(&self, id: &DocId) -> Result<Response> {
        let store = self.store.lock();
        let doc = store.get(id).ok_or_else(|| Error::DocumentNotFound {
            key: id.key.clone(),
        })?;
        Ok(Response::Document {
            cas: doc.cas,
            value: JsonValue::from(doc.body.clone()),
            expiry: doc.expiry,
        })
    }

    fn store_document(
        &self,
        id: DocId,
        value: JsonValue,
        semantics: StoreSemantics,
        options: WriteOptions,
    ) -> Result<Response> {
        self.config.check_durability(options.durability)?;
        let mut store = self.store.lock();
        let existing = precondition(&id, store.get(&id), semantics)?;
        check_cas(&id, existing.as_ref(), options.cas)?;

        let expiry = match &existing {
            Some(doc) if options.preserve_expiry => doc.expiry,
            _ => options.expiry.map(|ttl| store.expiry_at(ttl)).transpose()?,
        };
        let mut doc = existing.unwrap_or_else(|| StoredDocument::new(serde_json::Value::Null));
        doc.body = value.into_inner();
        doc.expiry = expiry;
        let (cas, seqno) = store.write(id, doc);
        Ok(Response::Mutation { cas, seqno })
    }

    fn remove(&self, id: &DocId, options: &WriteOptions) -> Result<Response> {
        self.config.check_durability(options.durability)?;
        let mut store = self.store.lock();
        check_cas(id, store.get(id), options.cas)?;
        let (cas, seqno) = store.remove(id).ok_or_else(|| Error::DocumentNotFound {
            key: id.key.clone(),
        })?;
        Ok(Response::Mutation { cas, seqno })
    }

    fn check_batch(&self, specs: &[CommandSpec], mutation: bool) -> Result<()> {
        self.config.limits.validate_spec_count(specs.len())?;
        if specs.iter().any(|s| s.op().is_mutation() != mutation) {
            return Err(Error::invalid_argument(
                "lookups and mutations cannot be mixed in one batch",
            ));
        }
        Ok(())
    }

    fn lookup_in(&self, id: &DocId, specs: &[CommandSpec]) -> Result<Response> {
        self.check_batch(specs, false)?;
        let store = self.store.lock();
        let doc = store.get(id).ok_or_else(|| Error::DocumentNotFound {
            key: id.key.clone(),
        })?;
        Ok(Response::LookupIn {
            cas: doc.cas,
            fields: subdoc::lookup(doc, specs),
        })
    }

    fn mutate_in(
        &self,
        id: DocId,
        specs: &[CommandSpec],
        options: &MutateInRequestOptions,
    ) -> Result<Response> {
        self.check_batch(specs, true)?;
        let write = &options.write;
        self.config.check_durability(write.durability)?;

        let mut store = self.store.lock();
        let existing = precondition(&id, store.get(&id), options.store_semantics)?;
        check_cas(&id, existing.as_ref(), write.cas)?;

        let expiry = match &existing {
            Some(doc) if write.preserve_expiry => doc.expiry,
            _ => write.expiry.map(|ttl| store.expiry_at(ttl)).transpose()?,
        };
        let mut working = existing
            .unwrap_or_else(|| StoredDocument::new(serde_json::Value::Object(Default::default())));

        let (cas, seqno) = store.next_version();
        let fields = subdoc::mutate(&mut working, specs, NewVersion { cas, seqno })
            .map_err(|failed| spec_error(&id, specs, failed))?;
        working.cas = cas;
        working.seqno = seqno;
        working.expiry = expiry;
        debug!(target: "tessera::memory", key = %id.key, specs = specs.len(), cas = cas.as_u64(), "mutate_in applied");
        store.insert(id, working);

        Ok(Response::MutateIn {
            cas,
            seqno,
            expiry,
            fields,
        })
    }

    fn query(
        &self,
        attempt_id: AttemptId,
        statement: &str,
        options: &QueryOptions,
        staged: &[StagedMutation],
    ) -> Result<Response> {
        let handler = self
            .query_handler
            .read()
            .clone()
            .ok_or_else(|| Error::FeatureNotAvailable {
                feature: "query".to_string(),
            })?;
        let store = self.store.lock();
        let view = StagedView::new(&store, staged);
        let output = handler.execute(statement, options, &view)?;
        if options.read_only && !output.staged.is_empty() {
            return Err(Error::invalid_argument(
                "read-only statement attempted to write",
            ));
        }
        debug!(target: "tessera::memory", attempt_id = %attempt_id, rows = output.rows.len(), staged = output.staged.len(), "query executed");
        Ok(Response::Query {
            rows: output.rows,
            staged: output.staged,
        })
    }

    fn commit(
        &self,
        transaction_id: TransactionId,
        attempt_id: AttemptId,
        reads: &[(DocId, Cas)],
        mutations: Vec<StagedMutation>,
        durability: DurabilityLevel,
    ) -> Result<Response> {
        self.config.check_durability(durability)?;
        let mut store = self.store.lock();

        let validation = validate_commit(reads, &mutations, &store);
        if let Some(conflict) = validation.conflicts.into_iter().next() {
            warn!(target: "tessera::memory", attempt_id = %attempt_id, conflict = %conflict, "commit rejected");
            return Err(conflict.into_error(attempt_id));
        }

        let mut written = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            match mutation {
                StagedMutation::Insert { id, value } => {
                    let (cas, _) = store.write(id.clone(), StoredDocument::new(value.into_inner()));
                    written.push((id, cas));
                }
                StagedMutation::Replace { id, value, .. } => {
                    let mut doc = store
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| StoredDocument::new(serde_json::Value::Null));
                    doc.body = value.into_inner();
                    let (cas, _) = store.write(id.clone(), doc);
                    written.push((id, cas));
                }
                StagedMutation::Remove { id, .. } => {
                    if let Some((cas, _)) = store.remove(&id) {
                        written.push((id, cas));
                    }
                }
            }
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        info!(target: "tessera::memory", transaction_id = %transaction_id, attempt_id = %attempt_id, documents = written.len(), "commit applied");
        Ok(Response::Committed { cas: written })
    }
}

#[async_trait]
impl Transport for MemoryServer {
    async fn send(&self, request: Request) -> Result<Response> {
        self.handle(request)
    }
}
