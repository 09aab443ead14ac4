//! Commit validation for transaction attempts
//!
//! Rules:
//! - Every document read by the attempt must still be at the CAS it was
//!   read at (absent documents count as CAS 0)
//! - Staged replaces/removes must match the current CAS
//! - Staged inserts require the document to still be absent
//! - First committer wins; the loser's attempt is retried by the client

use std::fmt;
use tessera_core::{AttemptId, Cas, DocId, Error, StagedMutation};

use crate::store::DocumentStore;

/// Types of conflicts found while validating a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A read document changed after it was read
    ReadWriteConflict {
        /// Document that changed
        id: DocId,
        /// CAS recorded at read time
        read_cas: Cas,
        /// CAS at validation time
        current_cas: Cas,
    },
    /// A staged replace/remove no longer matches
    CasConflict {
        /// Document that changed
        id: DocId,
        /// CAS the write was staged against
        expected: Cas,
        /// CAS at validation time
        current: Cas,
    },
    /// A staged insert collides with a document created concurrently
    InsertConflict {
        /// Document that now exists
        id: DocId,
    },
}

impl ConflictType {
    /// Document the conflict is on
    pub fn id(&self) -> &DocId {
        match self {
            ConflictType::ReadWriteConflict { id, .. }
            | ConflictType::CasConflict { id, .. }
            | ConflictType::InsertConflict { id } => id,
        }
    }

    /// Convert into the retryable client error
    pub fn into_error(self, attempt_id: AttemptId) -> Error {
        Error::TransactionConflict {
            attempt_id: attempt_id.to_string(),
            key: self.id().key.clone(),
            reason: self.to_string(),
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::ReadWriteConflict {
                id,
                read_cas,
                current_cas,
            } => write!(
                f,
                "{} was read at cas {} but is now at {}",
                id, read_cas, current_cas
            ),
            ConflictType::CasConflict {
                id,
                expected,
                current,
            } => write!(
                f,
                "{} was staged against cas {} but is now at {}",
                id, expected, current
            ),
            ConflictType::InsertConflict { id } => write!(f, "{} was created concurrently", id),
        }
    }
}

/// Result of commit validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// A result with no conflicts
    pub fn ok() -> Self {
        Self::default()
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

/// Check that every read document is unchanged
pub fn validate_read_set(reads: &[(DocId, Cas)], store: &DocumentStore) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for (id, read_cas) in reads {
        let current_cas = store.current_cas(id);
        if current_cas != *read_cas {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                id: id.clone(),
                read_cas: *read_cas,
                current_cas,
            });
        }
    }
    result
}

/// Check that staged writes still apply
pub fn validate_write_set(mutations: &[StagedMutation], store: &DocumentStore) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for mutation in mutations {
        let current = store.current_cas(mutation.id());
        match mutation {
            StagedMutation::Insert { id, .. } => {
                if !current.is_zero() {
                    result
                        .conflicts
                        .push(ConflictType::InsertConflict { id: id.clone() });
                }
            }
            StagedMutation::Replace { id, cas, .. } | StagedMutation::Remove { id, cas } => {
                if current != *cas {
                    result.conflicts.push(ConflictType::CasConflict {
                        id: id.clone(),
                        expected: *cas,
                        current,
                    });
                }
            }
        }
    }
    result
}

/// Validate a whole commit
pub fn validate_commit(
    reads: &[(DocId, Cas)],
    mutations: &[StagedMutation],
    store: &DocumentStore,
) -> ValidationResult {
    let mut result = validate_read_set(reads, store);
    result.merge(validate_write_set(mutations, store));
    result
}
