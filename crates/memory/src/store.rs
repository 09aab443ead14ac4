//! Versioned document store with a controllable clock
//!
//! Every write gets a fresh CAS and sequence number from two monotonic
//! counters. Expired documents read as absent; they are purged the next time
//! their key is written.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tessera_core::{Cas, DocId, Error, Keyspace, Result};

/// A stored document
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// JSON body
    pub body: Value,
    /// User extended attributes (always an object)
    pub xattrs: Value,
    /// Current version
    pub cas: Cas,
    /// Sequence number of the last write
    pub seqno: u64,
    /// Absolute expiry
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredDocument {
    /// A new, unversioned document
    pub fn new(body: Value) -> Self {
        StoredDocument {
            body,
            xattrs: Value::Object(serde_json::Map::new()),
            cas: Cas::default(),
            seqno: 0,
            expiry: None,
        }
    }

    /// Encoded body size in bytes
    pub fn value_bytes(&self) -> usize {
        serde_json::to_vec(&self.body).map(|b| b.len()).unwrap_or(0)
    }

    /// Checksum of the encoded body
    pub fn value_crc32(&self) -> u32 {
        serde_json::to_vec(&self.body)
            .map(|b| crc32fast::hash(&b))
            .unwrap_or(0)
    }

    /// Check if the document has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.map_or(false, |at| at <= now)
    }

    /// The read-only `$document` attribute
    pub fn virtual_xattrs(&self) -> Value {
        json!({
            "$document": {
                "CAS": format!("0x{:016x}", self.cas.as_u64()),
                "exptime": self.expiry.map_or(0, |at| at.timestamp()),
                "value_bytes": self.value_bytes(),
                "deleted": false,
                "seqno": format!("0x{:016x}", self.seqno),
                "value_crc32c": format!("0x{:08x}", self.value_crc32()),
            }
        })
    }
}

/// All documents of the server
#[derive(Debug)]
pub struct DocumentStore {
    docs: BTreeMap<DocId, StoredDocument>,
    last_cas: u64,
    last_seqno: u64,
    clock_offset: chrono::Duration,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        DocumentStore {
            docs: BTreeMap::new(),
            last_cas: 0,
            last_seqno: 0,
            clock_offset: chrono::Duration::zero(),
        }
    }

    /// Current time as seen by the store
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
            .checked_add_signed(self.clock_offset)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Move the store clock forward
    ///
    /// The clock saturates at the latest representable instant.
    pub fn advance_clock(&mut self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        self.clock_offset = self
            .clock_offset
            .checked_add(&by)
            .unwrap_or(chrono::Duration::MAX);
    }

    /// Absolute expiry for a time to live starting now
    ///
    /// # Errors
    /// `InvalidArgument` when the expiry is not representable.
    pub fn expiry_at(&self, ttl: Duration) -> Result<DateTime<Utc>> {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.now().checked_add_signed(ttl))
            .ok_or_else(|| {
                Error::invalid_argument(format!("expiry of {}s is out of range", ttl.as_secs()))
            })
    }

    /// Reserve the next CAS and sequence number
    pub fn next_version(&mut self) -> (Cas, u64) {
        self.last_cas += 1;
        self.last_seqno += 1;
        (Cas(self.last_cas), self.last_seqno)
    }

    /// Get a live document
    pub fn get(&self, id: &DocId) -> Option<&StoredDocument> {
        let now = self.now();
        self.docs.get(id).filter(|doc| !doc.is_expired(now))
    }

    /// Current CAS of a live document (zero when absent)
    pub fn current_cas(&self, id: &DocId) -> Cas {
        self.get(id).map(|doc| doc.cas).unwrap_or_default()
    }

    /// Store a document that already carries its new version
    pub fn insert(&mut self, id: DocId, doc: StoredDocument) {
        self.docs.insert(id, doc);
    }

    /// Store a document under a fresh version
    pub fn write(&mut self, id: DocId, mut doc: StoredDocument) -> (Cas, u64) {
        let (cas, seqno) = self.next_version();
        doc.cas = cas;
        doc.seqno = seqno;
        self.docs.insert(id, doc);
        (cas, seqno)
    }

    /// Remove a document, returning the version of the removal
    pub fn remove(&mut self, id: &DocId) -> Option<(Cas, u64)> {
        let live = self.get(id).is_some();
        self.docs.remove(id);
        if live {
            Some(self.next_version())
        } else {
            None
        }
    }

    /// Live documents in a keyspace, in key order
    pub fn documents_in<'a>(
        &'a self,
        keyspace: &'a Keyspace,
    ) -> impl Iterator<Item = (&'a DocId, &'a StoredDocument)> + 'a {
        let now = self.now();
        self.docs
            .iter()
            .filter(move |(id, doc)| &id.keyspace == keyspace && !doc.is_expired(now))
    }

    /// Number of live documents
    pub fn len(&self) -> usize {
        let now = self.now();
        self.docs.values().filter(|d| !d.is_expired(now)).count()
    }

    /// Check if there are no live documents
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
