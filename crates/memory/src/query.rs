//! Query collaborator
//!
//! The server does not parse statements. Tests register a handler that
//! receives the statement, its options and a [`StagedView`]: the committed
//! documents with the calling attempt's staged writes laid over them.

use serde_json::Value;
use std::collections::BTreeMap;
use tessera_core::{Cas, DocId, JsonValue, Keyspace, QueryOptions, Result, StagedMutation};

use crate::store::DocumentStore;

/// What a handler returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Result rows
    pub rows: Vec<JsonValue>,
    /// Writes the statement staged into the attempt
    pub staged: Vec<StagedMutation>,
}

impl QueryOutput {
    /// Output with rows and no writes
    pub fn rows(rows: Vec<JsonValue>) -> Self {
        QueryOutput {
            rows,
            staged: Vec::new(),
        }
    }
}

/// Committed documents overlaid with an attempt's staged writes
pub struct StagedView<'a> {
    store: &'a DocumentStore,
    staged: &'a [StagedMutation],
}

impl<'a> StagedView<'a> {
    pub(crate) fn new(store: &'a DocumentStore, staged: &'a [StagedMutation]) -> Self {
        StagedView { store, staged }
    }

    fn staged_for(&self, id: &DocId) -> Option<&'a StagedMutation> {
        self.staged.iter().rev().find(|m| m.id() == id)
    }

    /// Document body as the attempt sees it
    pub fn get(&self, id: &DocId) -> Option<Value> {
        match self.staged_for(id) {
            Some(mutation) => mutation.value().map(|v| v.as_inner().clone()),
            None => self.store.get(id).map(|doc| doc.body.clone()),
        }
    }

    /// Committed CAS of a document (zero when absent)
    pub fn committed_cas(&self, id: &DocId) -> Cas {
        self.store.current_cas(id)
    }

    /// Every visible document in a keyspace, in key order
    pub fn documents(&self, keyspace: &Keyspace) -> Vec<(DocId, Value)> {
        let mut visible: BTreeMap<DocId, Option<Value>> = self
            .store
            .documents_in(keyspace)
            .map(|(id, doc)| (id.clone(), Some(doc.body.clone())))
            .collect();
        for mutation in self.staged {
            if &mutation.id().keyspace == keyspace {
                visible.insert(
                    mutation.id().clone(),
                    mutation.value().map(|v| v.as_inner().clone()),
                );
            }
        }
        visible
            .into_iter()
            .filter_map(|(id, body)| body.map(|b| (id, b)))
            .collect()
    }
}

/// Executes statements on behalf of the server
pub trait QueryHandler: Send + Sync {
    /// Run `statement` against `view`
    fn execute(
        &self,
        statement: &str,
        options: &QueryOptions,
        view: &StagedView<'_>,
    ) -> Result<QueryOutput>;
}

impl<F> QueryHandler for F
where
    F: Fn(&str, &QueryOptions, &StagedView<'_>) -> Result<QueryOutput> + Send + Sync,
{
    fn execute(
        &self,
        statement: &str,
        options: &QueryOptions,
        view: &StagedView<'_>,
    ) -> Result<QueryOutput> {
        self(statement, options, view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoredDocument;
    use serde_json::json;

    #[test]
    fn test_staged_writes_overlay_store() {
        let ks = Keyspace::default_collection("b");
        let mut store = DocumentStore::new();
        let (cas, _) = store.write(ks.doc("a"), StoredDocument::new(json!({"v": 1})));
        store.write(ks.doc("b"), StoredDocument::new(json!({"v": 2})));

        let staged = vec![
            StagedMutation::Replace {
                id: ks.doc("a"),
                cas,
                value: json!({"v": 10}).into(),
            },
            StagedMutation::Remove {
                id: ks.doc("b"),
                cas: Cas(2),
            },
            StagedMutation::Insert {
                id: ks.doc("c"),
                value: json!({"v": 3}).into(),
            },
        ];
        let view = StagedView::new(&store, &staged);
        assert_eq!(view.get(&ks.doc("a")), Some(json!({"v": 10})));
        assert_eq!(view.get(&ks.doc("b")), None);
        let keys: Vec<String> = view
            .documents(&ks)
            .into_iter()
            .map(|(id, _)| id.key)
            .collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(view.committed_cas(&ks.doc("a")), cas);
    }
}
