//! # docchat
//!
//! Question answering over a folder of client manuals, backed by Azure AI
//! Search for vector retrieval and Azure OpenAI for embeddings and chat.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  ./data     │──▶│  Pipeline     │──▶│ Azure AI      │
//! │ PDF/DOCX/MD │   │ Chunk+Embed  │   │ Search index │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │ top-k
//!                                            ▼
//!                   ┌──────────────┐   ┌──────────────┐
//!                   │  Web chat /  │◀──│ Azure OpenAI │
//!                   │  ask (CLI)   │   │ chat         │
//!                   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docchat create-index          # create or update the index
//! docchat ingest --dir ./data   # chunk, embed and upload documents
//! docchat serve                 # chat UI on http://127.0.0.1:8501
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Environment settings and TOML tuning file |
//! | [`logging`] | Per-stage log files and console output |
//! | [`error`] | Shared error type |
//! | [`models`] | Documents, chunks, records, chat messages |
//! | [`traits`] | `Chunker`, `Embedder`, `Generator`, `VectorIndex` |
//! | [`schema`] | Index definition |
//! | [`index_cmd`] | Idempotent index creation |
//! | [`sources`] | Directory scanning |
//! | [`extract`] | PDF, DOCX and text extraction |
//! | [`chunk`] | Sentence-window chunker |
//! | [`ingest`] | Ingestion pipeline |
//! | [`http`] | Retrying REST client |
//! | [`search_index`] | Azure AI Search index |
//! | [`embedding`] | Azure OpenAI embeddings |
//! | [`generation`] | Azure OpenAI chat completions |
//! | [`memory`] | In-memory index |
//! | [`query`] | Retrieval and answer generation |
//! | [`server`] | Web chat server |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod http;
pub mod index_cmd;
pub mod ingest;
pub mod logging;
pub mod memory;
pub mod models;
pub mod query;
pub mod schema;
pub mod search_index;
pub mod server;
pub mod sources;
pub mod traits;
