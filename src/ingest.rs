//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: directory scan → extraction → chunking →
//! embedding → upsert into the vector index. Documents are processed one
//! at a time in path order; embedding calls are batched per document.
//!
//! Unreadable documents are skipped (or abort the run when
//! `ingest.fail_fast` is set). Any error from the embedding service or the
//! index aborts the run.

use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, IngestConfig};
use crate::error::{Error, Result};
use crate::models::{Chunk, Document, IndexRecord};
use crate::sources::{load_document, scan_directory, SourceFile};
use crate::traits::{Chunker, Embedder, VectorIndex};

/// Counters returned by a completed ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub documents_seen: usize,
    pub documents_ingested: usize,
    pub documents_skipped: usize,
    /// Readable documents that produced no text.
    pub documents_empty: usize,
    pub chunks: usize,
    pub records_upserted: usize,
}

pub struct Ingestor {
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: Config,
}

impl Ingestor {
    pub fn new(
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &Config,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            config: config.clone(),
        }
    }

    /// Ingest every supported document under `dir`.
    pub async fn ingest(&self, dir: &Path) -> Result<IngestReport> {
        let files = scan_directory(dir, &self.config.ingest)?;
        tracing::info!(
            dir = %dir.display(),
            files = files.len(),
            index = self.index.index_name(),
            "starting ingestion"
        );

        let mut report = IngestReport {
            documents_seen: files.len(),
            ..Default::default()
        };

        for file in &files {
            let Some(doc) = load_or_skip(file, &self.config.ingest, &mut report)? else {
                continue;
            };

            let chunks = self.chunker.chunk(&doc);
            if chunks.is_empty() {
                tracing::warn!(file = %file.relative, "document has no extractable text");
                report.documents_empty += 1;
                continue;
            }

            let upserted = self.index_chunks(&doc, &chunks).await?;
            tracing::info!(
                file = %file.relative,
                chunks = chunks.len(),
                records = upserted,
                "document ingested"
            );
            report.documents_ingested += 1;
            report.chunks += chunks.len();
            report.records_upserted += upserted;
        }

        tracing::info!(
            seen = report.documents_seen,
            ingested = report.documents_ingested,
            skipped = report.documents_skipped,
            empty = report.documents_empty,
            chunks = report.chunks,
            records = report.records_upserted,
            "ingestion complete"
        );
        Ok(report)
    }

    async fn index_chunks(&self, doc: &Document, chunks: &[Chunk]) -> Result<usize> {
        let dims = self.embedder.dims();
        let batch_size = self.config.embedding.batch_size.max(1);
        let mut upserted = 0;

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::invalid_response(
                    "embedder",
                    format!("expected {} vectors, got {}", batch.len(), vectors.len()),
                ));
            }

            let mut records = Vec::with_capacity(batch.len());
            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.len() != dims {
                    return Err(Error::DimensionMismatch {
                        context: format!("{} chunk {}", chunk.file_name, chunk.chunk_index),
                        expected: dims,
                        actual: vector.len(),
                    });
                }
                records.push(IndexRecord::from_chunk(chunk, vector, Some(doc.modified)));
            }

            upserted += self.index.upsert(&records).await?;
            tracing::debug!(
                file = %doc.file_name,
                batch = records.len(),
                "upserted batch"
            );
        }
        Ok(upserted)
    }
}

/// Scan, extract and chunk without calling any remote service.
pub fn dry_run(chunker: &dyn Chunker, dir: &Path, config: &Config) -> Result<IngestReport> {
    let files = scan_directory(dir, &config.ingest)?;
    let mut report = IngestReport {
        documents_seen: files.len(),
        ..Default::default()
    };

    for file in &files {
        let Some(doc) = load_or_skip(file, &config.ingest, &mut report)? else {
            continue;
        };
        let count = chunker.chunk(&doc).len();
        if count == 0 {
            report.documents_empty += 1;
        } else {
            report.documents_ingested += 1;
            report.chunks += count;
        }
    }
    Ok(report)
}

fn load_or_skip(
    file: &SourceFile,
    config: &IngestConfig,
    report: &mut IngestReport,
) -> Result<Option<Document>> {
    match load_document(file, config.max_file_bytes) {
        Ok(doc) => Ok(Some(doc)),
        Err(e @ Error::Extract { .. }) if !config.fail_fast => {
            tracing::warn!(file = %file.relative, error = %e, "skipping unreadable document");
            report.documents_skipped += 1;
            Ok(None)
        }
        Err(e) => {
            tracing::error!(file = %file.relative, error = %e, "failed to read document");
            Err(e)
        }
    }
}
