//! Azure AI Search implementation of [`VectorIndex`].
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `ensure_index` | `PUT /indexes/{name}` with the schema definition |
//! | `index_exists` | `GET /indexes/{name}` |
//! | `delete_index` | `DELETE /indexes/{name}` |
//! | `upsert` | `POST /indexes/{name}/docs/index` with `mergeOrUpload` actions |
//! | `search` | `POST /indexes/{name}/docs/search` with a vector query |

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{HttpConfig, SearchSettings};
use crate::error::{Error, Result};
use crate::http::ServiceClient;
use crate::models::{IndexRecord, SearchHit};
use crate::schema::{IndexSchema, CONTENT_FIELD, KEY_FIELD, METADATA_FIELD, VECTOR_FIELD};
use crate::traits::{IndexOutcome, VectorIndex};

/// The service rejects index batches above 1000 actions.
const MAX_BATCH: usize = 1000;

pub struct AzureSearchIndex {
    client: ServiceClient,
    index_name: String,
}

impl AzureSearchIndex {
    pub fn new(settings: &SearchSettings, http: &HttpConfig) -> Result<Self> {
        let client = ServiceClient::new(
            "search",
            &settings.endpoint,
            &settings.api_key,
            &settings.api_version,
            http,
        )?;
        Ok(Self::with_client(client, &settings.index_name))
    }

    pub fn with_client(client: ServiceClient, index_name: &str) -> Self {
        Self {
            client,
            index_name: index_name.to_string(),
        }
    }

    fn index_path(&self) -> String {
        format!("indexes/{}", self.index_name)
    }

    async fn upsert_batch(&self, records: &[IndexRecord]) -> Result<usize> {
        let actions: Vec<Value> = records
            .iter()
            .map(|r| {
                json!({
                    "@search.action": "mergeOrUpload",
                    KEY_FIELD: r.doc_id,
                    CONTENT_FIELD: r.content,
                    VECTOR_FIELD: r.embedding,
                    METADATA_FIELD: r.metadata,
                })
            })
            .collect();

        let resp = self
            .client
            .post(
                &format!("{}/docs/index", self.index_path()),
                &json!({ "value": actions }),
            )
            .await?;

        let results = resp
            .body
            .get("value")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::invalid_response("search", "index response missing value array"))?;

        let failed: Vec<String> = results
            .iter()
            .filter(|r| !r.get("status").and_then(|s| s.as_bool()).unwrap_or(false))
            .map(|r| {
                format!(
                    "{}: {}",
                    r.get("key").and_then(|k| k.as_str()).unwrap_or("?"),
                    r.get("errorMessage").and_then(|m| m.as_str()).unwrap_or("unknown error")
                )
            })
            .collect();

        if !failed.is_empty() {
            return Err(Error::Service {
                service: "search",
                status: resp.status.as_u16(),
                body: format!("{} record(s) rejected: {}", failed.len(), failed.join("; ")),
            });
        }

        Ok(results.len())
    }
}

#[async_trait]
impl VectorIndex for AzureSearchIndex {
    fn index_name(&self) -> &str {
        &self.index_name
    }

    async fn ensure_index(&self, schema: &IndexSchema) -> Result<IndexOutcome> {
        let resp = self
            .client
            .put(&self.index_path(), &schema.to_definition())
            .await?;
        // 201 on create, 200/204 on update
        Ok(if resp.status.as_u16() == 201 {
            IndexOutcome::Created
        } else {
            IndexOutcome::Updated
        })
    }

    async fn index_exists(&self) -> Result<bool> {
        match self.client.get(&self.index_path()).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete_index(&self) -> Result<()> {
        match self.client.delete(&self.index_path()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        let mut accepted = 0;
        for batch in records.chunks(MAX_BATCH) {
            accepted += self.upsert_batch(batch).await?;
        }
        Ok(accepted)
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let body = json!({
            "search": "",
            "vectorQueries": [{
                "kind": "vector",
                "vector": vector,
                "fields": VECTOR_FIELD,
                "k": k,
            }],
            "select": format!("{},{},{}", CONTENT_FIELD, METADATA_FIELD, KEY_FIELD),
            "top": k,
        });

        let resp = self
            .client
            .post(&format!("{}/docs/search", self.index_path()), &body)
            .await?;

        let rows = resp
            .body
            .get("value")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::invalid_response("search", "search response missing value array"))?;

        Ok(rows.iter().filter_map(parse_hit).collect())
    }
}

/// Rows without content are dropped.
fn parse_hit(row: &Value) -> Option<SearchHit> {
    let content = row.get(CONTENT_FIELD)?.as_str()?;
    if content.is_empty() {
        return None;
    }
    Some(SearchHit {
        doc_id: row
            .get(KEY_FIELD)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        content: content.to_string(),
        metadata: row
            .get(METADATA_FIELD)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        score: row
            .get("@search.score")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hit_reads_fields() {
        let row = json!({
            "@search.score": 0.82,
            "doc_id": "abc",
            "content": "Wire cutoff is 5pm.",
            "metadata": "{\"file_name\":\"a.pdf\",\"chunk_index\":0}"
        });
        let hit = parse_hit(&row).unwrap();
        assert_eq!(hit.doc_id, "abc");
        assert_eq!(hit.content, "Wire cutoff is 5pm.");
        assert!((hit.score - 0.82).abs() < 1e-9);
    }

    #[test]
    fn parse_hit_skips_rows_without_content() {
        assert!(parse_hit(&json!({ "doc_id": "x" })).is_none());
        assert!(parse_hit(&json!({ "doc_id": "x", "content": "" })).is_none());
    }

    #[test]
    fn parse_hit_tolerates_missing_metadata() {
        let hit = parse_hit(&json!({ "content": "text" })).unwrap();
        assert_eq!(hit.metadata, "");
        assert_eq!(hit.doc_id, "");
        assert_eq!(hit.score, 0.0);
    }
}
