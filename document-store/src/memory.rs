use crate::{
    DocumentStore, Filter, ReplaceOutcome, StoreError, apply_replace, ensure_object,
    validate_collection, validate_field,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Process-local store. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError> {
        validate_collection(collection)?;
        let guard = self.collections.read();
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| filter.matches(d)))
            .cloned())
    }

    async fn insert_one(&self, collection: &str, document: Value) -> Result<(), StoreError> {
        validate_collection(collection)?;
        ensure_object(&document)?;
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Value,
        upsert: bool,
    ) -> Result<ReplaceOutcome, StoreError> {
        validate_collection(collection)?;
        ensure_object(&document)?;
        let mut guard = self.collections.write();
        let docs = guard.entry(collection.to_string()).or_default();
        Ok(apply_replace(docs, filter, document, upsert))
    }

    async fn clear_collection(&self, collection: &str) -> Result<(), StoreError> {
        validate_collection(collection)?;
        if let Some(docs) = self.collections.write().get_mut(collection) {
            docs.clear();
        }
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        validate_collection(collection)?;
        self.collections.write().remove(collection);
        Ok(())
    }

    /// Lookups here are always linear scans, so this only validates its input.
    async fn create_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        validate_collection(collection)?;
        validate_field(field)
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        validate_collection(collection)?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .map_or(0, |docs| docs.len()))
    }
}
