//! Vector index schema.
//!
//! The schema is fixed: a string key, searchable chunk text, a vector field
//! and a filterable metadata string. [`IndexSchema::to_definition`] renders
//! it as the JSON index definition the search service accepts on
//! `PUT /indexes/{name}`.

use serde_json::{json, Value};

pub const KEY_FIELD: &str = "doc_id";
pub const CONTENT_FIELD: &str = "content";
pub const VECTOR_FIELD: &str = "embedding";
pub const METADATA_FIELD: &str = "metadata";

const HNSW_ALGORITHM: &str = "my-hnsw";
const VECTOR_PROFILE: &str = "my-vector-config";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    DotProduct,
    Euclidean,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::DotProduct => "dotProduct",
            DistanceMetric::Euclidean => "euclidean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Vector { dims: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub key: bool,
    pub searchable: bool,
    pub filterable: bool,
    pub facetable: bool,
    pub analyzer: Option<String>,
}

impl FieldSpec {
    fn string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::String,
            key: false,
            searchable: false,
            filterable: false,
            facetable: false,
            analyzer: None,
        }
    }

    fn to_definition(&self) -> Value {
        match &self.kind {
            FieldKind::String => {
                let mut v = json!({
                    "name": self.name,
                    "type": "Edm.String",
                    "key": self.key,
                    "searchable": self.searchable,
                    "filterable": self.filterable,
                    "facetable": self.facetable,
                    "retrievable": true,
                });
                if let Some(analyzer) = &self.analyzer {
                    v["analyzer"] = json!(analyzer);
                }
                v
            }
            FieldKind::Vector { dims } => json!({
                "name": self.name,
                "type": "Collection(Edm.Single)",
                "searchable": true,
                "retrievable": false,
                "dimensions": dims,
                "vectorSearchProfile": VECTOR_PROFILE,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSchema {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    pub metric: DistanceMetric,
}

impl IndexSchema {
    /// The chunk index layout used by ingestion and query.
    pub fn chunk_index(name: &str, dims: usize) -> Self {
        let key = FieldSpec {
            key: true,
            filterable: true,
            ..FieldSpec::string(KEY_FIELD)
        };
        let content = FieldSpec {
            searchable: true,
            analyzer: Some("en.microsoft".to_string()),
            ..FieldSpec::string(CONTENT_FIELD)
        };
        let vector = FieldSpec {
            kind: FieldKind::Vector { dims },
            searchable: true,
            ..FieldSpec::string(VECTOR_FIELD)
        };
        let metadata = FieldSpec {
            filterable: true,
            facetable: true,
            ..FieldSpec::string(METADATA_FIELD)
        };

        Self {
            name: name.to_string(),
            fields: vec![key, content, vector, metadata],
            metric: DistanceMetric::Cosine,
        }
    }

    pub fn key_field(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key)
    }

    /// Dimensionality of the first vector field.
    pub fn vector_dims(&self) -> Option<usize> {
        self.fields.iter().find_map(|f| match f.kind {
            FieldKind::Vector { dims } => Some(dims),
            FieldKind::String => None,
        })
    }

    pub fn to_definition(&self) -> Value {
        json!({
            "name": self.name,
            "fields": self.fields.iter().map(FieldSpec::to_definition).collect::<Vec<_>>(),
            "vectorSearch": {
                "algorithms": [{
                    "name": HNSW_ALGORITHM,
                    "kind": "hnsw",
                    "hnswParameters": {
                        "metric": self.metric.as_str(),
                        "m": 4,
                        "efConstruction": 400,
                        "efSearch": 500
                    }
                }],
                "profiles": [{
                    "name": VECTOR_PROFILE,
                    "algorithm": HNSW_ALGORITHM
                }]
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_index_layout() {
        let schema = IndexSchema::chunk_index("manuals", 3072);
        assert_eq!(schema.key_field().map(|f| f.name.as_str()), Some(KEY_FIELD));
        assert_eq!(schema.vector_dims(), Some(3072));
        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["doc_id", "content", "embedding", "metadata"]);
    }

    #[test]
    fn definition_matches_service_shape() {
        let def = IndexSchema::chunk_index("manuals", 1536).to_definition();
        assert_eq!(def["name"], "manuals");

        let fields = def["fields"].as_array().unwrap();
        assert_eq!(fields[0]["key"], true);
        assert_eq!(fields[1]["analyzer"], "en.microsoft");
        assert_eq!(fields[2]["type"], "Collection(Edm.Single)");
        assert_eq!(fields[2]["dimensions"], 1536);
        assert_eq!(fields[2]["vectorSearchProfile"], "my-vector-config");
        assert_eq!(fields[3]["facetable"], true);

        let algo = &def["vectorSearch"]["algorithms"][0];
        assert_eq!(algo["kind"], "hnsw");
        assert_eq!(algo["hnswParameters"]["metric"], "cosine");
        assert_eq!(def["vectorSearch"]["profiles"][0]["algorithm"], "my-hnsw");
    }
}
