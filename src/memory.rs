//! In-memory [`VectorIndex`] for tests and offline runs.
//!
//! Records live in a `BTreeMap` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every stored vector.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{IndexRecord, SearchHit};
use crate::schema::IndexSchema;
use crate::traits::{IndexOutcome, VectorIndex};

pub struct InMemoryIndex {
    name: String,
    schema: RwLock<Option<IndexSchema>>,
    records: RwLock<BTreeMap<String, IndexRecord>>,
}

impl InMemoryIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            schema: RwLock::new(None),
            records: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<IndexRecord> {
        self.records
            .read()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn schema(&self) -> Option<IndexSchema> {
        self.schema.read().ok().and_then(|s| s.clone())
    }
}

fn poisoned() -> Error {
    Error::invalid_response("memory", "lock poisoned")
}

fn incompatible(message: String) -> Error {
    Error::Service {
        service: "memory",
        status: 400,
        body: message,
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn index_name(&self) -> &str {
        &self.name
    }

    async fn ensure_index(&self, schema: &IndexSchema) -> Result<IndexOutcome> {
        let mut current = self.schema.write().map_err(|_| poisoned())?;
        let outcome = match current.as_ref() {
            None => IndexOutcome::Created,
            Some(existing) => {
                // Mirrors the remote service: key and vector fields cannot change in place.
                if existing.key_field() != schema.key_field()
                    || existing.vector_dims() != schema.vector_dims()
                {
                    return Err(incompatible(format!(
                        "index '{}' exists with an incompatible schema",
                        self.name
                    )));
                }
                IndexOutcome::Updated
            }
        };
        *current = Some(schema.clone());
        Ok(outcome)
    }

    async fn index_exists(&self) -> Result<bool> {
        Ok(self.schema.read().map_err(|_| poisoned())?.is_some())
    }

    async fn delete_index(&self) -> Result<()> {
        *self.schema.write().map_err(|_| poisoned())? = None;
        self.records.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        let dims = self
            .schema
            .read()
            .map_err(|_| poisoned())?
            .as_ref()
            .and_then(|s| s.vector_dims())
            .ok_or_else(|| Error::Service {
                service: "memory",
                status: 404,
                body: format!("index '{}' not found", self.name),
            })?;

        for r in records {
            if r.embedding.len() != dims {
                return Err(Error::DimensionMismatch {
                    context: r.doc_id.clone(),
                    expected: dims,
                    actual: r.embedding.len(),
                });
            }
        }

        let mut stored = self.records.write().map_err(|_| poisoned())?;
        for r in records {
            stored.insert(r.doc_id.clone(), r.clone());
        }
        Ok(records.len())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let stored = self.records.read().map_err(|_| poisoned())?;
        let mut hits: Vec<SearchHit> = stored
            .values()
            .map(|r| SearchHit {
                doc_id: r.doc_id.clone(),
                content: r.content.clone(),
                metadata: r.metadata.clone(),
                score: cosine_similarity(vector, &r.embedding) as f64,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}
