//! Core data models flowing through ingestion and retrieval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A source file read from the input directory.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the input directory; doubles as the document identity.
    pub file_name: String,
    pub content_type: String,
    pub modified: DateTime<Utc>,
    pub pages: Vec<Page>,
}

/// Extracted text of one page (PDF) or of the whole file (other formats).
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based page number, when the format has pages.
    pub number: Option<u32>,
    pub text: String,
}

impl Document {
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// A span of document text sized for the embedding model.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub file_name: String,
    pub page: Option<u32>,
    /// Position within the document, contiguous from 0.
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

impl Chunk {
    pub fn new(file_name: &str, page: Option<u32>, chunk_index: usize, text: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            page,
            chunk_index,
            text: text.to_string(),
            hash: sha256_hex(text.as_bytes()),
        }
    }

    /// Deterministic record key: the same chunk of the same file always
    /// maps to the same index record.
    pub fn record_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.file_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.chunk_index.to_le_bytes());
        hasher.update([0u8]);
        hasher.update(self.hash.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Metadata stored as a JSON string alongside each record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordMetadata {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_label: Option<String>,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl RecordMetadata {
    /// Citation label: `file.pdf p.3`, or just the file name.
    pub fn label(&self) -> String {
        match &self.page_label {
            Some(p) => format!("{} p.{}", self.file_name, p),
            None => self.file_name.clone(),
        }
    }
}

/// The persisted unit in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    pub doc_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    /// JSON-encoded [`RecordMetadata`].
    pub metadata: String,
}

impl IndexRecord {
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>, modified: Option<DateTime<Utc>>) -> Self {
        let meta = RecordMetadata {
            file_name: chunk.file_name.clone(),
            page_label: chunk.page.map(|p| p.to_string()),
            chunk_index: chunk.chunk_index,
            last_modified: modified.map(|m| m.to_rfc3339()),
        };
        Self {
            doc_id: chunk.record_id(),
            content: chunk.text.clone(),
            embedding,
            metadata: serde_json::to_string(&meta).unwrap_or_default(),
        }
    }
}

/// A record returned by similarity search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub doc_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub score: f64,
}

impl SearchHit {
    /// Source label for citations: parsed metadata, raw metadata, or the key.
    pub fn source_label(&self) -> String {
        if let Ok(meta) = serde_json::from_str::<RecordMetadata>(&self.metadata) {
            return meta.label();
        }
        if !self.metadata.trim().is_empty() {
            return self.metadata.clone();
        }
        self.doc_id.clone()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat exchange, in the shape the chat API expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_is_deterministic_and_position_sensitive() {
        let a = Chunk::new("manual.pdf", Some(1), 0, "Wire transfers close at 5pm.");
        let b = Chunk::new("manual.pdf", Some(1), 0, "Wire transfers close at 5pm.");
        let c = Chunk::new("manual.pdf", Some(1), 1, "Wire transfers close at 5pm.");
        let d = Chunk::new("other.pdf", Some(1), 0, "Wire transfers close at 5pm.");
        assert_eq!(a.record_id(), b.record_id());
        assert_ne!(a.record_id(), c.record_id());
        assert_ne!(a.record_id(), d.record_id());
        assert!(a.record_id().chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn record_metadata_carries_page() {
        let chunk = Chunk::new("guide/fees.pdf", Some(7), 3, "Fees are waived.");
        let rec = IndexRecord::from_chunk(&chunk, vec![0.1, 0.2], None);
        let meta: RecordMetadata = serde_json::from_str(&rec.metadata).unwrap();
        assert_eq!(meta.file_name, "guide/fees.pdf");
        assert_eq!(meta.page_label.as_deref(), Some("7"));
        assert_eq!(meta.chunk_index, 3);
        assert_eq!(rec.content, "Fees are waived.");
    }

    #[test]
    fn source_label_fallbacks() {
        let mut hit = SearchHit {
            doc_id: "abc".to_string(),
            content: "text".to_string(),
            metadata: r#"{"file_name":"a.pdf","page_label":"2","chunk_index":0}"#.to_string(),
            score: 1.0,
        };
        assert_eq!(hit.source_label(), "a.pdf p.2");

        hit.metadata = "legacy metadata".to_string();
        assert_eq!(hit.source_label(), "legacy metadata");

        hit.metadata = String::new();
        assert_eq!(hit.source_label(), "abc");
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
