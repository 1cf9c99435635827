//! Capability traits at the seams between pipeline logic and the remote
//! services.
//!
//! ```text
//!   files ─▶ extract ─▶ Chunker ─▶ Embedder ─▶ VectorIndex
//!                                     ▲            │
//!   question ─────────────────────────┘            ▼
//!                                   Generator ◀─ context
//! ```
//!
//! Production implementations talk to Azure AI Search and Azure OpenAI
//! ([`crate::search_index`], [`crate::embedding`], [`crate::generation`]).
//! Tests plug in stubs and [`crate::memory::InMemoryIndex`].

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChatMessage, Chunk, Document, IndexRecord, SearchHit};
use crate::schema::IndexSchema;

/// Splits an extracted document into ordered chunks.
pub trait Chunker: Send + Sync {
    /// Chunks carry contiguous `chunk_index` values starting at 0.
    /// Blank documents yield no chunks.
    fn chunk(&self, doc: &Document) -> Vec<Chunk>;
}

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model or deployment identifier, for logs.
    fn model_name(&self) -> &str;

    /// Expected vector length.
    fn dims(&self) -> usize;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Produces an answer from a chat transcript.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Whether `ensure_index` created a new index or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Created,
    Updated,
}

/// A remote store of vectors plus metadata with nearest-neighbour search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn index_name(&self) -> &str;

    /// Idempotent create-or-update.
    async fn ensure_index(&self, schema: &IndexSchema) -> Result<IndexOutcome>;

    async fn index_exists(&self) -> Result<bool>;

    /// Deleting a missing index is not an error.
    async fn delete_index(&self) -> Result<()>;

    /// Insert or overwrite records by key. Returns how many were accepted.
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize>;

    /// Top-`k` records by vector similarity, best first.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>>;
}
