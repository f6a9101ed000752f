//! In-memory document index with brute-force cosine similarity search.
//!
//! Chunks are grouped by owning document. Re-ingesting a document builds
//! the full replacement chunk list first (embedding outside the lock) and
//! swaps it in under a short write section, so concurrent queries see
//! either the old set or the new set, never a partial mix, and ingestion
//! for one document never blocks queries against others.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use colloquy_core::types::ChunkInput;

use crate::embedding::DynEmbeddingService;
use crate::error::IndexError;

/// A chunk returned from a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Owning document id.
    pub document_id: String,
    /// Chunk position within the document, contiguous from 0.
    pub chunk_index: usize,
    /// Chunk text.
    pub text: String,
    /// Cosine similarity to the query (higher is more similar).
    pub score: f64,
}

/// Collection statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexInfo {
    pub document_count: usize,
    pub chunk_count: usize,
}

/// A chunk stored in the index.
#[derive(Debug)]
struct StoredChunk {
    text: String,
    embedding: Vec<f32>,
}

/// In-memory document index keyed by document id.
pub struct DocumentIndex {
    embedder: Arc<dyn DynEmbeddingService>,
    documents: RwLock<HashMap<String, Arc<Vec<StoredChunk>>>>,
}

impl DocumentIndex {
    /// Create an empty index over the given embedding backend.
    pub fn new(embedder: Arc<dyn DynEmbeddingService>) -> Self {
        Self {
            embedder,
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Ingest (or re-ingest) a document's chunks.
    ///
    /// Idempotent per `document_id`: any prior chunks for the id are
    /// replaced atomically. Incoming chunks are ordered by their declared
    /// index and re-numbered positionally from 0. Returns the number of
    /// chunks stored; an empty chunk list removes the document.
    pub async fn ingest(
        &self,
        document_id: &str,
        chunks: &[ChunkInput],
    ) -> Result<usize, IndexError> {
        let mut ordered: Vec<&ChunkInput> = chunks.iter().collect();
        ordered.sort_by_key(|c| c.index);

        // Embed everything before touching the map.
        let mut replacement = Vec::with_capacity(ordered.len());
        for chunk in ordered {
            let embedding = self.embedder.embed_boxed(&chunk.text).await?;
            replacement.push(StoredChunk {
                text: chunk.text.clone(),
                embedding,
            });
        }
        let count = replacement.len();

        let mut documents = self
            .documents
            .write()
            .map_err(|e| IndexError::LockPoisoned(e.to_string()))?;
        if count == 0 {
            documents.remove(document_id);
        } else {
            documents.insert(document_id.to_string(), Arc::new(replacement));
        }
        drop(documents);

        info!(document_id, chunks = count, "document ingested");
        Ok(count)
    }

    /// Query the `k` most similar chunks, ordered by descending score.
    ///
    /// `scope` restricts the search to the given document ids; `None`
    /// searches the whole collection. An empty index (or empty query text)
    /// yields an empty sequence, never an error.
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        scope: Option<&[String]>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 || text.is_empty() || self.info().chunk_count == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_boxed(text).await?;

        // Snapshot the chunk lists, then score outside the lock.
        let snapshot: Vec<(String, Arc<Vec<StoredChunk>>)> = {
            let documents = self
                .documents
                .read()
                .map_err(|e| IndexError::LockPoisoned(e.to_string()))?;
            documents
                .iter()
                .filter(|(id, _)| match scope {
                    Some(ids) => ids.contains(id),
                    None => true,
                })
                .map(|(id, chunks)| (id.clone(), Arc::clone(chunks)))
                .collect()
        };

        let query_vec = &query_vec;
        let mut scored: Vec<ScoredChunk> = snapshot
            .iter()
            .flat_map(|(document_id, chunks)| {
                chunks.iter().enumerate().map(move |(chunk_index, chunk)| {
                    ScoredChunk {
                        document_id: document_id.clone(),
                        chunk_index,
                        text: chunk.text.clone(),
                        score: cosine_similarity(query_vec, &chunk.embedding),
                    }
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        debug!(hits = scored.len(), "similarity query");
        Ok(scored)
    }

    /// Remove a document and its chunks. Returns whether it existed.
    pub fn remove(&self, document_id: &str) -> Result<bool, IndexError> {
        let mut documents = self
            .documents
            .write()
            .map_err(|e| IndexError::LockPoisoned(e.to_string()))?;
        Ok(documents.remove(document_id).is_some())
    }

    /// Remove every document.
    pub fn clear(&self) -> Result<(), IndexError> {
        let mut documents = self
            .documents
            .write()
            .map_err(|e| IndexError::LockPoisoned(e.to_string()))?;
        documents.clear();
        info!("document collection cleared");
        Ok(())
    }

    /// Collection statistics.
    pub fn info(&self) -> IndexInfo {
        let documents = match self.documents.read() {
            Ok(d) => d,
            Err(_) => {
                return IndexInfo {
                    document_count: 0,
                    chunk_count: 0,
                }
            }
        };
        IndexInfo {
            document_count: documents.len(),
            chunk_count: documents.values().map(|c| c.len()).sum(),
        }
    }

    /// True if the collection holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.info().chunk_count == 0
    }
}

impl std::fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.info();
        f.debug_struct("DocumentIndex")
            .field("document_count", &info.document_count)
            .field("chunk_count", &info.chunk_count)
            .finish()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-magnitude input.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedding;

    fn index() -> DocumentIndex {
        DocumentIndex::new(Arc::new(MockEmbedding::new()))
    }

    fn chunks(texts: &[&str]) -> Vec<ChunkInput> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| ChunkInput {
                text: t.to_string(),
                index: i,
            })
            .collect()
    }

    // ---- Ingestion ----

    #[tokio::test]
    async fn test_ingest_and_info() {
        let index = index();
        let stored = index
            .ingest("doc1", &chunks(&["first chunk", "second chunk"]))
            .await
            .unwrap();
        assert_eq!(stored, 2);
        assert_eq!(
            index.info(),
            IndexInfo {
                document_count: 1,
                chunk_count: 2
            }
        );
    }

    #[tokio::test]
    async fn test_reingest_replaces_prior_chunks() {
        let index = index();
        index
            .ingest("doc1", &chunks(&["alpha", "beta", "gamma"]))
            .await
            .unwrap();
        index.ingest("doc1", &chunks(&["delta"])).await.unwrap();

        assert_eq!(index.info().chunk_count, 1);
        let hits = index.query("delta", 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "delta");
        // No stale leakage from the first set.
        assert!(hits.iter().all(|h| h.text != "alpha"));
    }

    #[tokio::test]
    async fn test_ingest_empty_chunk_list_removes_document() {
        let index = index();
        index.ingest("doc1", &chunks(&["content"])).await.unwrap();
        let stored = index.ingest("doc1", &[]).await.unwrap();
        assert_eq!(stored, 0);
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_reorders_by_declared_index() {
        let index = index();
        let out_of_order = vec![
            ChunkInput {
                text: "second".to_string(),
                index: 5,
            },
            ChunkInput {
                text: "first".to_string(),
                index: 2,
            },
        ];
        index.ingest("doc1", &out_of_order).await.unwrap();

        let hits = index.query("first", 10, None).await.unwrap();
        let first = hits.iter().find(|h| h.text == "first").unwrap();
        let second = hits.iter().find(|h| h.text == "second").unwrap();
        // Re-numbered contiguously from 0.
        assert_eq!(first.chunk_index, 0);
        assert_eq!(second.chunk_index, 1);
    }

    #[tokio::test]
    async fn test_ingest_empty_chunk_text_errors() {
        let index = index();
        let result = index.ingest("doc1", &chunks(&["ok", ""])).await;
        assert!(result.is_err());
        // Failed ingest leaves nothing behind.
        assert!(index.is_empty());
    }

    // ---- Query ----

    #[tokio::test]
    async fn test_query_empty_index_returns_empty() {
        let index = index();
        let hits = index.query("anything", 5, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_query_respects_k() {
        let index = index();
        index
            .ingest("doc1", &chunks(&["a", "b", "c", "d", "e", "f"]))
            .await
            .unwrap();
        let hits = index.query("a", 3, None).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_query_ordered_descending() {
        let index = index();
        index
            .ingest(
                "doc1",
                &chunks(&["rust memory model", "gardening tips", "rust ownership"]),
            )
            .await
            .unwrap();
        let hits = index.query("rust memory model", 10, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        // Identical text scores highest.
        assert_eq!(hits[0].text, "rust memory model");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_query_scores_across_documents() {
        let index = index();
        index.ingest("doc1", &chunks(&["apples", "pears"])).await.unwrap();
        index.ingest("doc2", &chunks(&["oranges"])).await.unwrap();
        index.ingest("doc3", &chunks(&["bananas"])).await.unwrap();

        let hits = index.query("oranges", 10, None).await.unwrap();
        assert_eq!(hits.len(), 4);
        // Every document contributes its chunks to one ranked list.
        let mut ids: Vec<&str> = hits.iter().map(|h| h.document_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids, vec!["doc1", "doc2", "doc3"]);
        assert_eq!(hits[0].text, "oranges");
    }

    #[tokio::test]
    async fn test_query_scope_filters_documents() {
        let index = index();
        index.ingest("doc1", &chunks(&["apples"])).await.unwrap();
        index.ingest("doc2", &chunks(&["oranges"])).await.unwrap();

        let scope = vec!["doc2".to_string()];
        let hits = index.query("fruit", 10, Some(&scope)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "doc2");
    }

    #[tokio::test]
    async fn test_query_scope_unknown_document_is_empty() {
        let index = index();
        index.ingest("doc1", &chunks(&["content"])).await.unwrap();
        let scope = vec!["missing".to_string()];
        let hits = index.query("content", 10, Some(&scope)).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_query_empty_text_returns_empty() {
        let index = index();
        index.ingest("doc1", &chunks(&["content"])).await.unwrap();
        let hits = index.query("", 5, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_query_k_zero_returns_empty() {
        let index = index();
        index.ingest("doc1", &chunks(&["content"])).await.unwrap();
        let hits = index.query("content", 0, None).await.unwrap();
        assert!(hits.is_empty());
    }

    // ---- Removal ----

    #[tokio::test]
    async fn test_remove_document() {
        let index = index();
        index.ingest("doc1", &chunks(&["content"])).await.unwrap();
        assert!(index.remove("doc1").unwrap());
        assert!(!index.remove("doc1").unwrap());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let index = index();
        index.ingest("doc1", &chunks(&["a"])).await.unwrap();
        index.ingest("doc2", &chunks(&["b"])).await.unwrap();
        index.clear().unwrap();
        assert_eq!(index.info().document_count, 0);
    }

    // ---- Cosine similarity ----

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0f32; 64];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let mut a = vec![0.0f32; 64];
        let mut b = vec![0.0f32; 64];
        a[0] = 1.0;
        b[1] = 1.0;
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0f32; 64];
        let b = vec![1.0f32; 64];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        let a = vec![1.0f32; 8];
        let b = vec![1.0f32; 16];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    // ---- Concurrent ingest and query ----

    #[tokio::test]
    async fn test_reingest_does_not_block_other_documents() {
        let index = Arc::new(index());
        index.ingest("stable", &chunks(&["stable text"])).await.unwrap();

        let writer = {
            let index = Arc::clone(&index);
            tokio::spawn(async move {
                for i in 0..20 {
                    let texts = vec![format!("version {} chunk", i)];
                    let inputs: Vec<ChunkInput> = texts
                        .iter()
                        .enumerate()
                        .map(|(j, t)| ChunkInput {
                            text: t.clone(),
                            index: j,
                        })
                        .collect();
                    index.ingest("churning", &inputs).await.unwrap();
                }
            })
        };

        let reader = {
            let index = Arc::clone(&index);
            let scope = vec!["stable".to_string()];
            tokio::spawn(async move {
                for _ in 0..20 {
                    let hits = index.query("stable text", 5, Some(&scope)).await.unwrap();
                    assert_eq!(hits.len(), 1);
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
        // The churning document always has exactly its latest chunk set.
        assert_eq!(index.info().chunk_count, 2);
    }
}
