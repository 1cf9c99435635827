//! `create-index` command: create or update the chunk index.
//!
//! The index is declared once by [`IndexSchema::chunk_index`] and applied
//! with [`VectorIndex::ensure_index`], which is idempotent. `--recreate`
//! drops an existing index first; every stored record is lost.

use crate::error::Result;
use crate::schema::IndexSchema;
use crate::traits::{IndexOutcome, VectorIndex};

pub async fn ensure_chunk_index(
    index: &dyn VectorIndex,
    dims: usize,
    recreate: bool,
) -> Result<IndexOutcome> {
    let schema = IndexSchema::chunk_index(index.index_name(), dims);

    if recreate && index.index_exists().await? {
        tracing::warn!(index = index.index_name(), "deleting existing index");
        index.delete_index().await?;
    }

    let outcome = index.ensure_index(&schema).await?;
    match outcome {
        IndexOutcome::Created => {
            tracing::info!(index = index.index_name(), dims, "index created")
        }
        IndexOutcome::Updated => {
            tracing::info!(index = index.index_name(), dims, "index already exists, updated")
        }
    }
    Ok(outcome)
}
