//! Retrieval index — chunked-document nearest-neighbor store.
//!
//! Built once at process start from a corpus directory and read-only
//! afterwards, so it is safe to share across all sessions. Documents are
//! split page-by-page (form-feed separators, the convention of text dumps
//! from paged sources), then into fixed-size overlapping chunks, each
//! embedded for cosine nearest-neighbor lookup.

use std::path::Path;
use std::sync::Arc;

use tokio::fs;

use crate::error::RetrievalError;
use crate::llm::Embedder;

/// Page separator emitted by paged-document text extractors.
const PAGE_SEPARATOR: char = '\u{c}';

/// Embedding batch size during index construction.
const EMBED_BATCH: usize = 64;

/// A fixed-size slice of a source document, annotated for citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalChunk {
    pub text: String,
    pub source: String,
    pub page: u32,
}

/// Chunking parameters, in characters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 900,
            overlap: 150,
        }
    }
}

/// In-memory nearest-neighbor store over embedded corpus chunks.
pub struct RetrievalIndex {
    chunks: Vec<RetrievalChunk>,
    vectors: Vec<Vec<f32>>,
    embedder: Arc<dyn Embedder>,
}

impl RetrievalIndex {
    /// Load every `.txt`/`.md` file under `corpus_dir`, chunk, and embed.
    ///
    /// A missing or empty corpus directory produces an empty index: planning
    /// then degrades to uncited synthesis rather than failing startup.
    pub async fn build(
        corpus_dir: &Path,
        chunking: ChunkingConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RetrievalError> {
        let mut chunks = Vec::new();
        if corpus_dir.exists() {
            collect_chunks(corpus_dir, chunking, &mut chunks).await?;
        } else {
            tracing::warn!(dir = %corpus_dir.display(), "Corpus directory missing, index is empty");
        }
        tracing::info!(chunks = chunks.len(), "Retrieval index loaded");
        Self::from_chunks(chunks, embedder).await
    }

    /// Build an index over pre-made chunks.
    pub async fn from_chunks(
        chunks: Vec<RetrievalChunk>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RetrievalError> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let mut embedded =
                embedder
                    .embed(&texts)
                    .await
                    .map_err(|e| RetrievalError::Embedding {
                        reason: e.to_string(),
                    })?;
            if embedded.len() != texts.len() {
                return Err(RetrievalError::EmbeddingCountMismatch {
                    expected: texts.len(),
                    got: embedded.len(),
                });
            }
            vectors.append(&mut embedded);
        }
        Ok(Self {
            chunks,
            vectors,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Nearest-neighbor search: the `k` chunks most similar to `query`,
    /// best first. Each call re-queries; results are not cached.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievalChunk>, RetrievalError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| RetrievalError::Embedding {
                reason: e.to_string(),
            })?
            .into_iter()
            .next()
            .ok_or(RetrievalError::EmbeddingCountMismatch {
                expected: 1,
                got: 0,
            })?;

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (cosine(&query_vec, v), i))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, i)| self.chunks[i].clone())
            .collect())
    }
}

/// Recursively gather chunks from corpus files.
fn collect_chunks<'a>(
    dir: &'a Path,
    chunking: ChunkingConfig,
    out: &'a mut Vec<RetrievalChunk>,
) -> std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<(), RetrievalError>> + Send + 'a>,
> {
    Box::pin(async move {
        let mut read_dir = fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;

            if metadata.is_dir() {
                let name = entry.file_name();
                if !name.to_string_lossy().starts_with('.') {
                    collect_chunks(&path, chunking, out).await?;
                }
            } else if metadata.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("txt" | "md")
                )
            {
                let content = fs::read_to_string(&path).await?;
                let source = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                for (page_index, page) in split_pages(&content).into_iter().enumerate() {
                    for text in chunk_text(&page, chunking) {
                        out.push(RetrievalChunk {
                            text,
                            source: source.clone(),
                            page: page_index as u32 + 1,
                        });
                    }
                }
            }
        }
        Ok(())
    })
}

/// Split a document into pages on form-feed boundaries. Documents without
/// separators are a single page.
fn split_pages(content: &str) -> Vec<String> {
    content
        .split(PAGE_SEPARATOR)
        .map(str::to_string)
        .collect()
}

/// Fixed-size overlapping split on char boundaries. Whitespace-only slices
/// are dropped.
fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let step = config.chunk_size.saturating_sub(config.overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}
