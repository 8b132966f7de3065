//! Persistence for JSON documents grouped into named collections.
//!
//! Documents are JSON objects. Lookups and replacements select documents with
//! a [`Filter`] of top-level field equalities.

pub mod config;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use std::io;
use std::sync::Arc;

pub use config::DocumentStoreConfig;
pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),

    #[error("invalid index field: {0:?}")]
    InvalidField(String),

    #[error("document must be a JSON object")]
    NotAnObject,
}

/// Conjunction of top-level field equalities.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    fields: Vec<(String, Value)>,
}

impl Filter {
    pub fn eq<F: Into<String>, V: Into<Value>>(field: F, value: V) -> Self {
        Filter::default().and(field, value)
    }

    pub fn and<F: Into<String>, V: Into<Value>>(mut self, field: F, value: V) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    pub(crate) fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// An empty filter matches every document.
    pub fn matches(&self, document: &Value) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    Inserted,
    /// Nothing matched and upsert was not requested.
    NotFound,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the first matching document, or `None` when nothing matches.
    async fn find_one(&self, collection: &str, filter: &Filter)
    -> Result<Option<Value>, StoreError>;

    async fn insert_one(&self, collection: &str, document: Value) -> Result<(), StoreError>;

    /// Replaces the first matching document. With `upsert`, inserts `document`
    /// when nothing matches.
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Value,
        upsert: bool,
    ) -> Result<ReplaceOutcome, StoreError>;

    /// Removes every document. The collection and its indexes are kept.
    async fn clear_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Removes the collection together with its indexes. Dropping a missing
    /// collection is not an error.
    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Adds a lookup index on a top-level field. Creating an existing index
    /// is a no-op. Indexes never constrain the stored values.
    async fn create_index(&self, collection: &str, field: &str) -> Result<(), StoreError>;

    async fn count(&self, collection: &str) -> Result<usize, StoreError>;
}

pub fn get_store(config: &DocumentStoreConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    let store: Arc<dyn DocumentStore> = match config {
        DocumentStoreConfig::Memory => {
            tracing::warn!("Using the in-memory document store. Nothing will survive a restart.");
            Arc::new(MemoryDocumentStore::new())
        }
        DocumentStoreConfig::Sqlite { path } => Arc::new(SqliteDocumentStore::open(path)?),
    };
    Ok(store)
}

/// Collection names must be non-empty and free of path separators and NUL.
pub fn validate_collection(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

/// Index fields are top-level keys that can be written as a quoted JSON path.
pub(crate) fn validate_field(field: &str) -> Result<(), StoreError> {
    if field.is_empty() || field.contains(['"', '\0']) {
        Err(StoreError::InvalidField(field.to_string()))
    } else {
        Ok(())
    }
}

pub(crate) fn ensure_object(document: &Value) -> Result<(), StoreError> {
    if document.is_object() {
        Ok(())
    } else {
        Err(StoreError::NotAnObject)
    }
}

pub(crate) fn apply_replace(
    documents: &mut Vec<Value>,
    filter: &Filter,
    document: Value,
    upsert: bool,
) -> ReplaceOutcome {
    match documents.iter_mut().find(|d| filter.matches(d)) {
        Some(existing) => {
            *existing = document;
            ReplaceOutcome::Replaced
        }
        None if upsert => {
            documents.push(document);
            ReplaceOutcome::Inserted
        }
        None => ReplaceOutcome::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches() {
        let doc = json!({"id": "R1", "catalog": "Main", "n": 3});

        assert!(Filter::default().matches(&doc));
        assert!(Filter::eq("id", "R1").matches(&doc));
        assert!(Filter::eq("id", "R1").and("n", 3).matches(&doc));
        assert!(!Filter::eq("id", "R1").and("catalog", "Other").matches(&doc));
        assert!(!Filter::eq("missing", Value::Null).matches(&doc));
    }

    #[test]
    fn test_apply_replace() {
        let mut docs = vec![json!({"id": "a", "v": 1}), json!({"id": "b", "v": 1})];

        let outcome = apply_replace(&mut docs, &Filter::eq("id", "b"), json!({"id": "b", "v": 2}), false);
        assert_eq!(outcome, ReplaceOutcome::Replaced);
        assert_eq!(docs[1]["v"], 2);

        let outcome = apply_replace(&mut docs, &Filter::eq("id", "c"), json!({"id": "c"}), false);
        assert_eq!(outcome, ReplaceOutcome::NotFound);
        assert_eq!(docs.len(), 2);

        let outcome = apply_replace(&mut docs, &Filter::eq("id", "c"), json!({"id": "c"}), true);
        assert_eq!(outcome, ReplaceOutcome::Inserted);
        assert_eq!(docs.len(), 3);
    }

    #[test]
    fn test_validate_field() {
        assert!(validate_field("id").is_ok());
        assert!(validate_field("created date").is_ok());
        for bad in ["", "a\"b"] {
            assert!(matches!(validate_field(bad), Err(StoreError::InvalidField(_))));
        }
    }

    #[test]
    fn test_validate_collection() {
        assert!(validate_collection("records").is_ok());
        assert!(validate_collection("events-2024").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b"] {
            assert!(matches!(
                validate_collection(bad),
                Err(StoreError::InvalidCollection(_))
            ));
        }
    }
}
