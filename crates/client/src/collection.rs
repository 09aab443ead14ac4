//! Collection handles
//!
//! [`AsyncCollection`] issues requests through a [`Channel`] and maps
//! responses into typed results. [`Collection`] is the blocking veneer over
//! it: every method drives exactly one request to completion.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tessera_core::{
    Cas, CommandSpec, DocId, DurabilityLevel, Error, JsonValue, Keyspace, Limits, Request,
    Response, Result, StoreSemantics, WriteOptions,
};
use tracing::debug;

use crate::batch::{
    BatchKind, BatchResult, CommandBatch, LookupInOptions, LookupInResult, MutateInOptions,
    MutateInResult,
};
use crate::transport::Channel;

/// Whole document read
#[derive(Debug, Clone, PartialEq)]
pub struct GetResult {
    /// Document version
    pub cas: Cas,
    /// Document body
    pub content: JsonValue,
    /// Expiry, when requested
    pub expiry: Option<DateTime<Utc>>,
}

impl GetResult {
    /// Decode the body
    pub fn content_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        self.content
            .deserialize_into()
            .map_err(|e| Error::invalid_argument(format!("document does not decode: {}", e)))
    }
}

/// Whole document write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationResult {
    /// New document version
    pub cas: Cas,
    /// Sequence number of the write
    pub seqno: u64,
}

/// Existence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistsResult {
    /// Whether the document exists
    pub exists: bool,
    /// Version when it exists
    pub cas: Cas,
}

#[derive(Debug)]
struct CollectionInner {
    keyspace: Keyspace,
    channel: Channel,
    limits: Limits,
    default_durability: DurabilityLevel,
}

/// Asynchronous collection handle
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct AsyncCollection {
    inner: Arc<CollectionInner>,
}

fn unexpected(request: &'static str, response: &Response) -> Error {
    Error::protocol(format!(
        "unexpected {} response to {}",
        response.name(),
        request
    ))
}

impl AsyncCollection {
    pub(crate) fn new(
        keyspace: Keyspace,
        channel: Channel,
        limits: Limits,
        default_durability: DurabilityLevel,
    ) -> Self {
        AsyncCollection {
            inner: Arc::new(CollectionInner {
                keyspace,
                channel,
                limits,
                default_durability,
            }),
        }
    }

    /// Keyspace this handle addresses
    pub fn keyspace(&self) -> &Keyspace {
        &self.inner.keyspace
    }

    /// Channel requests go through
    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    /// Identity of a document in this collection
    pub fn doc_id(&self, key: &str) -> Result<DocId> {
        self.inner.limits.validate_key(key)?;
        Ok(self.inner.keyspace.doc(key))
    }

    fn durability(&self, requested: DurabilityLevel) -> DurabilityLevel {
        if requested == DurabilityLevel::None {
            self.inner.default_durability
        } else {
            requested
        }
    }

    // ==================== Sub-document ====================

    /// Read fragments of a document
    pub async fn lookup_in(
        &self,
        key: &str,
        specs: Vec<CommandSpec>,
        options: LookupInOptions,
    ) -> Result<LookupInResult> {
        self.execute(key, CommandBatch::lookup(specs, options)).await
    }

    /// Edit fragments of a document in one atomic request
    pub async fn mutate_in(
        &self,
        key: &str,
        specs: Vec<CommandSpec>,
        options: MutateInOptions,
    ) -> Result<MutateInResult> {
        self.execute(key, CommandBatch::mutation(specs, options)).await
    }

    /// Validate and send a batch
    ///
    /// Validation failures return before anything is sent.
    pub async fn execute(&self, key: &str, batch: CommandBatch) -> Result<BatchResult> {
        let id = self.doc_id(key)?;
        batch.validate(&self.inner.limits)?;
        let (specs, kind) = batch.into_parts();
        debug!(target: "tessera::subdoc", key, specs = specs.len(), mutation = matches!(kind, BatchKind::Mutation(_)), "executing batch");

        match kind {
            BatchKind::Lookup(_) => {
                let request = Request::LookupIn {
                    id,
                    specs: specs.clone(),
                };
                match self.inner.channel.send(request).await? {
                    Response::LookupIn { cas, fields } => {
                        BatchResult::new(key.to_string(), &specs, cas, None, None, fields)
                    }
                    other => Err(unexpected("lookup_in", &other)),
                }
            }
            BatchKind::Mutation(options) => {
                let mut request_options = options.to_request();
                request_options.write.durability = self.durability(options.durability);
                let request = Request::MutateIn {
                    id,
                    specs: specs.clone(),
                    options: request_options,
                };
                match self.inner.channel.send(request).await? {
                    Response::MutateIn {
                        cas,
                        seqno,
                        expiry,
                        fields,
                    } => BatchResult::new(key.to_string(), &specs, cas, expiry, Some(seqno), fields),
                    other => Err(unexpected("mutate_in", &other)),
                }
            }
        }
    }

    // ==================== Whole document ====================

    /// Fetch a document
    pub async fn get(&self, key: &str) -> Result<GetResult> {
        let mut result = self.get_with_expiry(key).await?;
        result.expiry = None;
        Ok(result)
    }

    /// Fetch a document and its expiry
    pub async fn get_with_expiry(&self, key: &str) -> Result<GetResult> {
        let id = self.doc_id(key)?;
        match self.inner.channel.send(Request::Get { id }).await? {
            Response::Document { cas, value, expiry } => Ok(GetResult {
                cas,
                content: value,
                expiry,
            }),
            other => Err(unexpected("get", &other)),
        }
    }

    /// Check whether a document exists
    pub async fn exists(&self, key: &str) -> Result<ExistsResult> {
        let id = self.doc_id(key)?;
        match self.inner.channel.send(Request::Exists { id }).await? {
            Response::Exists { exists, cas } => Ok(ExistsResult { exists, cas }),
            other => Err(unexpected("exists", &other)),
        }
    }

    /// Create a document that must not exist
    pub async fn insert(&self, key: &str, value: impl Into<JsonValue>) -> Result<MutationResult> {
        self.store(key, value, StoreSemantics::Insert, WriteOptions::default())
            .await
    }

    /// Create or overwrite a document
    pub async fn upsert(&self, key: &str, value: impl Into<JsonValue>) -> Result<MutationResult> {
        self.store(key, value, StoreSemantics::Upsert, WriteOptions::default())
            .await
    }

    /// Overwrite a document that must exist
    pub async fn replace(&self, key: &str, value: impl Into<JsonValue>) -> Result<MutationResult> {
        self.store(key, value, StoreSemantics::Replace, WriteOptions::default())
            .await
    }

    /// Write a whole document with explicit semantics and options
    pub async fn store(
        &self,
        key: &str,
        value: impl Into<JsonValue>,
        semantics: StoreSemantics,
        mut options: WriteOptions,
    ) -> Result<MutationResult> {
        let id = self.doc_id(key)?;
        if semantics == StoreSemantics::Insert && options.cas.is_some() {
            return Err(Error::invalid_argument(
                "a cas precondition cannot be used with insert",
            ));
        }
        if semantics == StoreSemantics::Insert && options.preserve_expiry {
            return Err(Error::invalid_argument(
                "preserve_expiry cannot be used with insert",
            ));
        }
        if let Some(expiry) = options.expiry {
            self.inner.limits.validate_expiry(expiry)?;
        }
        let value = value.into();
        self.inner.limits.validate_document_size(value.size_bytes())?;
        options.durability = self.durability(options.durability);
        let request = Request::Store {
            id,
            value,
            semantics,
            options,
        };
        match self.inner.channel.send(request).await? {
            Response::Mutation { cas, seqno } => Ok(MutationResult { cas, seqno }),
            other => Err(unexpected("store", &other)),
        }
    }

    /// Delete a document
    pub async fn remove(&self, key: &str) -> Result<MutationResult> {
        self.remove_with(key, WriteOptions::default()).await
    }

    /// Delete a document with a CAS precondition or durability
    pub async fn remove_with(&self, key: &str, mut options: WriteOptions) -> Result<MutationResult> {
        let id = self.doc_id(key)?;
        options.durability = self.durability(options.durability);
        match self.inner.channel.send(Request::Remove { id, options }).await? {
            Response::Mutation { cas, seqno } => Ok(MutationResult { cas, seqno }),
            other => Err(unexpected("remove", &other)),
        }
    }
}

/// Blocking collection handle
///
/// Same operations as [`AsyncCollection`], each completed before returning.
/// Calls made from inside an async runtime fail with `InvalidArgument`.
#[derive(Debug, Clone)]
pub struct Collection {
    inner: AsyncCollection,
}

impl Collection {
    pub(crate) fn new(inner: AsyncCollection) -> Self {
        Collection { inner }
    }

    /// Asynchronous view of this handle
    pub fn as_async(&self) -> &AsyncCollection {
        &self.inner
    }

    /// Keyspace this handle addresses
    pub fn keyspace(&self) -> &Keyspace {
        self.inner.keyspace()
    }

    /// Channel requests go through
    pub fn channel(&self) -> &Channel {
        self.inner.channel()
    }

    /// Identity of a document in this collection
    pub fn doc_id(&self, key: &str) -> Result<DocId> {
        self.inner.doc_id(key)
    }

    /// Read fragments of a document
    pub fn lookup_in(
        &self,
        key: &str,
        specs: Vec<CommandSpec>,
        options: LookupInOptions,
    ) -> Result<LookupInResult> {
        self.channel()
            .block_on(self.inner.lookup_in(key, specs, options))
    }

    /// Edit fragments of a document in one atomic request
    pub fn mutate_in(
        &self,
        key: &str,
        specs: Vec<CommandSpec>,
        options: MutateInOptions,
    ) -> Result<MutateInResult> {
        self.channel()
            .block_on(self.inner.mutate_in(key, specs, options))
    }

    /// Validate and send a batch
    pub fn execute(&self, key: &str, batch: CommandBatch) -> Result<BatchResult> {
        self.channel().block_on(self.inner.execute(key, batch))
    }

    /// Fetch a document
    pub fn get(&self, key: &str) -> Result<GetResult> {
        self.channel().block_on(self.inner.get(key))
    }

    /// Fetch a document and its expiry
    pub fn get_with_expiry(&self, key: &str) -> Result<GetResult> {
        self.channel().block_on(self.inner.get_with_expiry(key))
    }

    /// Check whether a document exists
    pub fn exists(&self, key: &str) -> Result<ExistsResult> {
        self.channel().block_on(self.inner.exists(key))
    }

    /// Create a document that must not exist
    pub fn insert(&self, key: &str, value: impl Into<JsonValue>) -> Result<MutationResult> {
        self.channel().block_on(self.inner.insert(key, value))
    }

    /// Create or overwrite a document
    pub fn upsert(&self, key: &str, value: impl Into<JsonValue>) -> Result<MutationResult> {
        self.channel().block_on(self.inner.upsert(key, value))
    }

    /// Overwrite a document that must exist
    pub fn replace(&self, key: &str, value: impl Into<JsonValue>) -> Result<MutationResult> {
        self.channel().block_on(self.inner.replace(key, value))
    }

    /// Write a whole document with explicit semantics and options
    pub fn store(
        &self,
        key: &str,
        value: impl Into<JsonValue>,
        semantics: StoreSemantics,
        options: WriteOptions,
    ) -> Result<MutationResult> {
        self.channel()
            .block_on(self.inner.store(key, value, semantics, options))
    }

    /// Delete a document
    pub fn remove(&self, key: &str) -> Result<MutationResult> {
        self.channel().block_on(self.inner.remove(key))
    }

    /// Delete a document with a CAS precondition or durability
    pub fn remove_with(&self, key: &str, options: WriteOptions) -> Result<MutationResult> {
        self.channel().block_on(self.inner.remove_with(key, options))
    }
}
