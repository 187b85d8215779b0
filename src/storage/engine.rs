use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::pipeline::run_pipeline;
use crate::data::Document;
use crate::query::Stage;

/// Document store able to run compiled pipelines.
///
/// Documents are addressed by their `_id`. Reading a collection that was
/// never written behaves like reading an empty one.
pub trait Datastore: Send + Sync {
    /// Run a compiled pipeline against a collection
    fn aggregate(&self, collection: &str, stages: &[Stage]) -> Result<Vec<Document>, StorageError>;

    /// Every document of a collection, in insertion order
    fn find(&self, collection: &str) -> Result<Vec<Document>, StorageError>;

    fn count(&self, collection: &str) -> Result<usize, StorageError>;

    /// Insert a document, assigning an `_id` when it has none. Returns the id.
    fn insert(&self, collection: &str, doc: Document) -> Result<String, StorageError>;

    /// Replace the document with `id`, or insert it
    fn upsert(&self, collection: &str, id: &str, doc: Document) -> Result<(), StorageError>;

    /// Remove the document with `id`; false if nothing matched
    fn delete(&self, collection: &str, id: &str) -> Result<bool, StorageError>;
}

/// One named collection
#[derive(Default)]
struct Collection {
    docs: RwLock<Vec<Document>>,
}

/// In-memory datastore with concurrent access per collection
pub struct MemoryStore {
    collections: DashMap<String, Arc<Collection>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Build a store from pre-existing collections
    pub fn from_collections(collections: impl IntoIterator<Item = (String, Vec<Document>)>) -> Self {
        let store = Self::new();
        for (name, docs) in collections {
            store.get_or_create(&name).docs.write().extend(docs);
        }
        store
    }

    fn get_or_create(&self, name: &str) -> Arc<Collection> {
        if let Some(collection) = self.collections.get(name) {
            return Arc::clone(&collection);
        }
        Arc::clone(
            self.collections
                .entry(name.to_string())
                .or_default()
                .value(),
        )
    }

    fn get(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.get(name).map(|c| Arc::clone(&c))
    }

    /// Names of all collections, sorted
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Insert many documents at once, returning their ids
    pub fn insert_many(
        &self,
        collection: &str,
        docs: impl IntoIterator<Item = Document>,
    ) -> Result<Vec<String>, StorageError> {
        docs.into_iter().map(|doc| self.insert(collection, doc)).collect()
    }

    fn assign_id(&self, doc: &mut Document) -> String {
        if let Some(id) = doc_id(doc) {
            return id;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        doc.insert("_id".to_string(), Value::String(id.clone()));
        id
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// String form of a document's `_id`
pub fn doc_id(doc: &Document) -> Option<String> {
    match doc.get("_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Datastore for MemoryStore {
    fn aggregate(&self, collection: &str, stages: &[Stage]) -> Result<Vec<Document>, StorageError> {
        let docs = self.find(collection)?;
        run_pipeline(docs, stages)
    }

    fn find(&self, collection: &str) -> Result<Vec<Document>, StorageError> {
        Ok(self
            .get(collection)
            .map(|c| c.docs.read().clone())
            .unwrap_or_default())
    }

    fn count(&self, collection: &str) -> Result<usize, StorageError> {
        Ok(self.get(collection).map(|c| c.docs.read().len()).unwrap_or(0))
    }

    fn insert(&self, collection: &str, mut doc: Document) -> Result<String, StorageError> {
        let id = self.assign_id(&mut doc);
        self.get_or_create(collection).docs.write().push(doc);
        Ok(id)
    }

    fn upsert(&self, collection: &str, id: &str, mut doc: Document) -> Result<(), StorageError> {
        doc.insert("_id".to_string(), Value::String(id.to_string()));
        let target = self.get_or_create(collection);
        let mut docs = target.docs.write();

        match docs.iter_mut().find(|d| doc_id(d).as_deref() == Some(id)) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool, StorageError> {
        let Some(target) = self.get(collection) else {
            return Ok(false);
        };
        let mut docs = target.docs.write();
        let before = docs.len();
        docs.retain(|d| doc_id(d).as_deref() != Some(id));
        Ok(docs.len() < before)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid pipeline stage: {0}")]
    InvalidStage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Datastore error: {0}")]
    Backend(String),
}
