//! Sentence-window text chunker.
//!
//! Each page is split into sentences, and sentences are packed into chunks
//! of at most `chunk_size` tokens. Consecutive chunks on the same page share
//! up to `chunk_overlap` tokens of trailing sentences so that an answer
//! spanning a boundary is still retrievable. A sentence longer than a whole
//! chunk is hard-split at whitespace.
//!
//! Token counts are approximated at four characters per token.

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};
use crate::traits::Chunker;

const CHARS_PER_TOKEN: usize = 4;

pub struct SentenceChunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl SentenceChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            max_chars: chunk_size.max(1) * CHARS_PER_TOKEN,
            overlap_chars: chunk_overlap * CHARS_PER_TOKEN,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split one page of text into chunk texts.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        for sentence in split_sentences(text) {
            if sentence.len() > self.max_chars {
                pieces.extend(hard_split(&sentence, self.max_chars));
            } else {
                pieces.push(sentence);
            }
        }

        let mut chunks = Vec::new();
        let mut window: Vec<String> = Vec::new();
        let mut window_len = 0usize;
        // Sentences in `window` already emitted as part of the previous chunk.
        let mut carried = 0usize;

        for piece in pieces {
            let added = if window.is_empty() {
                piece.len()
            } else {
                piece.len() + 1
            };
            if window_len + added > self.max_chars && window.len() > carried {
                chunks.push(window.join(" "));
                let keep = self.overlap_tail(&window, piece.len());
                window.drain(..window.len() - keep);
                window_len = joined_len(&window);
                carried = window.len();
            }
            window_len += if window.is_empty() {
                piece.len()
            } else {
                piece.len() + 1
            };
            window.push(piece);
        }

        if window.len() > carried {
            chunks.push(window.join(" "));
        }
        chunks
    }

    /// How many trailing sentences to carry into the next chunk so that
    /// they fit the overlap budget and leave room for `next_len`.
    fn overlap_tail(&self, window: &[String], next_len: usize) -> usize {
        let budget = self
            .overlap_chars
            .min(self.max_chars.saturating_sub(next_len + 1));
        let mut used = 0usize;
        let mut keep = 0usize;
        for s in window.iter().rev() {
            let cost = if keep == 0 { s.len() } else { s.len() + 1 };
            if used + cost > budget {
                break;
            }
            used += cost;
            keep += 1;
        }
        keep
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, doc: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in &doc.pages {
            for text in self.split_text(&page.text) {
                chunks.push(Chunk::new(&doc.file_name, page.number, chunks.len(), &text));
            }
        }
        chunks
    }
}

fn joined_len(window: &[String]) -> usize {
    if window.is_empty() {
        return 0;
    }
    window.iter().map(|s| s.len()).sum::<usize>() + window.len() - 1
}

/// Split on sentence terminators followed by whitespace, and on blank lines.
/// Whitespace inside a sentence is collapsed.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        let mut start = 0;
        let bytes = para.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if matches!(b, b'.' | b'!' | b'?')
                && i + 1 < bytes.len()
                && bytes[i + 1].is_ascii_whitespace()
            {
                push_collapsed(&mut sentences, &para[start..=i]);
                start = i + 1;
            }
            i += 1;
        }
        push_collapsed(&mut sentences, &para[start..]);
    }
    sentences
}

fn push_collapsed(out: &mut Vec<String>, raw: &str) {
    let sentence = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !sentence.is_empty() {
        out.push(sentence);
    }
}

/// Split an oversized sentence at whitespace (or at `max_chars` when there is
/// none), never inside a UTF-8 character.
fn hard_split(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = sentence.trim();
    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            out.push(remaining.to_string());
            break;
        }
        let mut split_at = max_chars;
        while !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        let actual = remaining[..split_at]
            .rfind(char::is_whitespace)
            .filter(|&pos| pos > 0)
            .unwrap_or(split_at);
        let actual = if actual == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            actual
        };
        out.push(remaining[..actual].trim().to_string());
        remaining = remaining[actual..].trim_start();
    }
    out
}
