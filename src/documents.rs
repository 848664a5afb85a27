//! Named JSON documents: schema sets and the synthesized specification.
//!
//! Writes are last-writer-wins; a name always holds the most recent full document.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use sled::{Db, Tree};

use crate::error::StorageError;

const TREE_DOCUMENTS: &str = "documents";

/// Name of the persisted specification document.
pub const SPECIFICATION_DOCUMENT: &str = "openapi-schema";

pub trait DocumentStore: Send + Sync {
    fn write(&self, name: &str, document: &Value) -> Result<(), StorageError>;
    fn read(&self, name: &str) -> Result<Option<Value>, StorageError>;
}

/// Schema document name for an endpoint collection.
///
/// Derived from the ordered endpoint list, so the same configuration always
/// targets the same document regardless of which job wrote it.
pub fn schema_document_name(endpoints: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    for endpoint in endpoints {
        hasher.update(endpoint.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize().to_hex();
    format!("schemas-{}", &digest.as_str()[..16])
}

/// Per-datasource schema document name: the base URL with every run of
/// non-alphanumeric characters collapsed to `_`.
pub fn endpoint_document_name(base_url: &str) -> String {
    let mut name = String::with_capacity(base_url.len());
    let mut pending_separator = false;
    for ch in base_url.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !name.is_empty() {
                name.push('_');
            }
            pending_separator = false;
            name.push(ch);
        } else {
            pending_separator = true;
        }
    }
    format!("{}_schema", name)
}

/// sled-backed document store (tree `documents`, pretty JSON values).
#[derive(Clone)]
pub struct SledDocumentStore {
    documents: Tree,
}

impl SledDocumentStore {
    pub fn new(db: &Db) -> Result<Self, StorageError> {
        let documents = db.open_tree(TREE_DOCUMENTS)?;
        Ok(Self { documents })
    }
}

impl DocumentStore for SledDocumentStore {
    fn write(&self, name: &str, document: &Value) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(document)?;
        self.documents.insert(name.as_bytes(), bytes)?;
        self.documents.flush()?;
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<Value>, StorageError> {
        let Some(raw) = self.documents.get(name.as_bytes())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }
}

/// Volatile document store.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Value>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn write(&self, name: &str, document: &Value) -> Result<(), StorageError> {
        self.documents
            .write()
            .insert(name.to_string(), document.clone());
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.documents.read().get(name).cloned())
    }
}
