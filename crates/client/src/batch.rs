//! Sub-document batches and their results
//!
//! A [`CommandBatch`] is an ordered list of specs plus document-level
//! options. [`CommandBatch::validate`] runs every pre-flight check; a batch
//! that fails it is never sent.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tessera_core::{
    Cas, CommandSpec, DurabilityLevel, Error, FieldResult, FieldStatus, JsonValue, Limits,
    MutateInRequestOptions, Operation, Result, StoreSemantics, WriteOptions,
};

/// Options for a lookup batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupInOptions {
    /// Override the channel timeout
    pub timeout: Option<Duration>,
}

/// Options for a mutation batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutateInOptions {
    /// Existence precondition (default: `Replace`)
    pub store_semantics: StoreSemantics,
    /// New time to live; `None` clears the expiry unless preserved
    pub expiry: Option<Duration>,
    /// Keep the document's current expiry
    pub preserve_expiry: bool,
    /// Durability requirement
    pub durability: DurabilityLevel,
    /// Version precondition
    pub cas: Option<Cas>,
}

impl MutateInOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options from flag-style store semantics
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if more than one flag is set.
    pub fn from_store_flags(insert: bool, upsert: bool, replace: bool) -> Result<Self> {
        Ok(MutateInOptions {
            store_semantics: StoreSemantics::from_flags(insert, upsert, replace)?,
            ..Self::default()
        })
    }

    /// Set store semantics
    pub fn store_semantics(mut self, semantics: StoreSemantics) -> Self {
        self.store_semantics = semantics;
        self
    }

    /// Set expiry
    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Keep the current expiry
    pub fn preserve_expiry(mut self, preserve: bool) -> Self {
        self.preserve_expiry = preserve;
        self
    }

    /// Set durability
    pub fn durability(mut self, level: DurabilityLevel) -> Self {
        self.durability = level;
        self
    }

    /// Set a CAS precondition
    pub fn cas(mut self, cas: Cas) -> Self {
        self.cas = Some(cas);
        self
    }

    fn validate(&self, limits: &Limits) -> Result<()> {
        if let Some(expiry) = self.expiry {
            limits.validate_expiry(expiry)?;
        }
        let semantics = self.store_semantics;
        if self.preserve_expiry && semantics == StoreSemantics::Insert {
            return Err(Error::invalid_argument(
                "preserve_expiry cannot be used with insert semantics",
            ));
        }
        let explicit_expiry = self.expiry.map_or(false, |e| !e.is_zero());
        if self.preserve_expiry && explicit_expiry && semantics == StoreSemantics::Replace {
            return Err(Error::invalid_argument(
                "preserve_expiry and an explicit expiry are mutually exclusive",
            ));
        }
        if self.cas.is_some() && semantics == StoreSemantics::Insert {
            return Err(Error::invalid_argument(
                "a cas precondition cannot be used with insert semantics",
            ));
        }
        Ok(())
    }

    pub(crate) fn to_request(&self) -> MutateInRequestOptions {
        MutateInRequestOptions {
            store_semantics: self.store_semantics,
            write: WriteOptions {
                expiry: self.expiry.filter(|e| !e.is_zero()),
                preserve_expiry: self.preserve_expiry,
                durability: self.durability,
                cas: self.cas,
            },
        }
    }
}

/// Whether a batch reads or writes
#[derive(Debug, Clone, PartialEq)]
pub enum BatchKind {
    /// All specs are lookups
    Lookup(LookupInOptions),
    /// All specs are mutations
    Mutation(MutateInOptions),
}

/// Ordered specs plus document-level options
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBatch {
    specs: Vec<CommandSpec>,
    kind: BatchKind,
}

impl CommandBatch {
    /// Build a lookup batch
    pub fn lookup(specs: Vec<CommandSpec>, options: LookupInOptions) -> Self {
        CommandBatch {
            specs,
            kind: BatchKind::Lookup(options),
        }
    }

    /// Build a mutation batch
    pub fn mutation(specs: Vec<CommandSpec>, options: MutateInOptions) -> Self {
        CommandBatch {
            specs,
            kind: BatchKind::Mutation(options),
        }
    }

    /// Specs in input order
    pub fn specs(&self) -> &[CommandSpec] {
        &self.specs
    }

    /// Batch kind and options
    pub fn kind(&self) -> &BatchKind {
        &self.kind
    }

    /// Consume into parts
    pub fn into_parts(self) -> (Vec<CommandSpec>, BatchKind) {
        (self.specs, self.kind)
    }

    /// Run every pre-flight check
    pub fn validate(&self, limits: &Limits) -> Result<()> {
        limits.validate_spec_count(self.specs.len())?;
        let want_mutation = matches!(self.kind, BatchKind::Mutation(_));
        for (index, spec) in self.specs.iter().enumerate() {
            if spec.op().is_mutation() != want_mutation {
                return Err(Error::invalid_argument(format!(
                    "spec {} ({}) cannot be used in a {} batch",
                    index,
                    spec.op(),
                    if want_mutation { "mutate_in" } else { "lookup_in" }
                )));
            }
        }
        if let BatchKind::Mutation(options) = &self.kind {
            options.validate(limits)?;
            let payload: usize = self
                .specs
                .iter()
                .flat_map(|s| s.values())
                .map(JsonValue::size_bytes)
                .sum();
            limits.validate_document_size(payload)?;
        }
        Ok(())
    }
}

/// Result of a lookup or mutation batch
///
/// Per-spec outcomes are kept in input order; accessors turn a failed
/// outcome into the matching per-spec error.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    key: String,
    cas: Cas,
    expiry: Option<DateTime<Utc>>,
    seqno: Option<u64>,
    ops: Vec<(Operation, String)>,
    fields: Vec<FieldResult>,
}

/// Result of `lookup_in`
pub type LookupInResult = BatchResult;

/// Result of `mutate_in`
pub type MutateInResult = BatchResult;

impl BatchResult {
    pub(crate) fn new(
        key: String,
        specs: &[CommandSpec],
        cas: Cas,
        expiry: Option<DateTime<Utc>>,
        seqno: Option<u64>,
        fields: Vec<FieldResult>,
    ) -> Result<Self> {
        if fields.len() != specs.len() {
            return Err(Error::protocol(format!(
                "expected {} spec results, got {}",
                specs.len(),
                fields.len()
            )));
        }
        Ok(BatchResult {
            key,
            cas,
            expiry,
            seqno,
            ops: specs
                .iter()
                .map(|s| (s.op(), s.path().to_string()))
                .collect(),
            fields,
        })
    }

    /// Document key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Document version after the batch
    pub fn cas(&self) -> Cas {
        self.cas
    }

    /// Document expiry after the batch
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// Sequence number of the mutation (mutation batches only)
    pub fn seqno(&self) -> Option<u64> {
        self.seqno
    }

    /// Number of spec results
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if there are no results
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw status of a spec
    pub fn status(&self, index: usize) -> Result<FieldStatus> {
        self.field(index).map(|f| f.status)
    }

    /// Value produced by spec `index`
    ///
    /// # Errors
    ///
    /// The spec's own failure (`PathNotFound`, ...), or `InvalidArgument`
    /// for an out-of-range index or a spec that produces no value.
    pub fn content(&self, index: usize) -> Result<JsonValue> {
        let field = self.successful(index)?;
        field.value.clone().ok_or_else(|| {
            Error::invalid_argument(format!(
                "spec {} ({}) produced no content",
                index, self.ops[index].0
            ))
        })
    }

    /// Value produced by spec `index`, deserialized
    pub fn content_as<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        self.content(index)?.deserialize_into().map_err(|e| {
            Error::invalid_argument(format!("spec {} content does not decode: {}", index, e))
        })
    }

    /// Whether the path of spec `index` was found
    ///
    /// `PathNotFound` reads as `false`; other failures are returned.
    pub fn exists(&self, index: usize) -> Result<bool> {
        let field = self.field(index)?;
        match field.status {
            FieldStatus::Success => Ok(true),
            FieldStatus::PathNotFound => Ok(false),
            _ => Err(self.field_error(index, field)),
        }
    }

    fn field(&self, index: usize) -> Result<&FieldResult> {
        self.fields.get(index).ok_or_else(|| {
            Error::invalid_argument(format!(
                "spec index {} out of range (batch has {})",
                index,
                self.fields.len()
            ))
        })
    }

    fn successful(&self, index: usize) -> Result<&FieldResult> {
        let field = self.field(index)?;
        match field.status {
            FieldStatus::Success => Ok(field),
            _ => Err(self.field_error(index, field)),
        }
    }

    fn field_error(&self, index: usize, field: &FieldResult) -> Error {
        let path = self.ops[index].1.clone();
        match field.status {
            FieldStatus::PathNotFound => Error::PathNotFound { index, path },
            FieldStatus::PathExists => Error::PathExists { index, path },
            FieldStatus::PathMismatch => Error::PathMismatch { index, path },
            FieldStatus::InvalidValue => Error::InvalidValue {
                index,
                path,
                reason: format!("value rejected by {}", self.ops[index].0),
            },
            FieldStatus::Success => Error::Internal {
                reason: "successful field reported as failure".to_string(),
            },
        }
    }
}
