//! Question answering over the vector index.
//!
//! [`QueryEngine::answer`] embeds the question, pulls the top-k chunks,
//! formats them as a cited context block and asks the generator. A
//! [`ChatSession`] carries the running transcript for the web UI and the
//! `ask` command.

use std::sync::Arc;

use serde::Serialize;

use crate::config::{GenerationConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::models::{ChatMessage, SearchHit};
use crate::traits::{Embedder, Generator, VectorIndex};

/// A generated answer and the hits it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Source {
    pub doc_id: String,
    pub label: String,
    pub score: f64,
}

impl From<&SearchHit> for Source {
    fn from(hit: &SearchHit) -> Self {
        Self {
            doc_id: hit.doc_id.clone(),
            label: hit.source_label(),
            score: hit.score,
        }
    }
}

pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    system_prompt: String,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
        retrieval: &RetrievalConfig,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            top_k: retrieval.top_k,
            system_prompt: generation.system_prompt.clone(),
        }
    }

    /// Top-k hits for `question`, best first.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchHit>> {
        let mut vectors = self.embedder.embed(&[question.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| Error::invalid_response("embedder", "no vector for question"))?;
        self.index.search(&vector, self.top_k).await
    }

    /// Answer `question` given the prior turns in `history`.
    ///
    /// Retrieval errors degrade to an empty context. Generation errors are
    /// returned.
    pub async fn answer(&self, question: &str, history: &[ChatMessage]) -> Result<Answer> {
        let hits = match self.retrieve(question).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::error!(error = %e, "retrieval failed, answering without context");
                Vec::new()
            }
        };
        tracing::info!(hits = hits.len(), "retrieved context");

        let mut messages = history.to_vec();
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.push(ChatMessage::user(format!(
            "Context:\n{}\n\nQuestion: {}",
            build_context(&hits),
            question
        )));

        let text = self.generator.generate(&messages).await?;
        Ok(Answer {
            text,
            sources: hits.iter().map(Source::from).collect(),
        })
    }
}

/// Render hits as `"{content}\n(Source: {label})"`, one per line.
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| format!("{}\n(Source: {})", h.content, h.source_label()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One conversation: the user/assistant turns exchanged so far.
#[derive(Debug, Default, Clone)]
pub struct ChatSession {
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Ask a question and record the exchange. A generation failure becomes
    /// the assistant's reply so the conversation can continue.
    pub async fn ask(&mut self, engine: &QueryEngine, question: &str) -> Answer {
        let answer = match engine.answer(question, &self.history).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "answer generation failed");
                Answer {
                    text: format!("Error generating response: {}", e),
                    sources: Vec::new(),
                }
            }
        };
        self.history.push(ChatMessage::user(question));
        self.history.push(ChatMessage::assistant(answer.text.clone()));
        answer
    }
}
