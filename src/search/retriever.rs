//! Query execution: title, content, word-distance and vector search
//!
//! Vector search runs in two stages: a streaming scan over the quantized
//! ANN chunks keeps the best `limit * limit` candidates in a bounded
//! max-heap, then the survivors are re-ranked by exact L2 distance over
//! the full-precision embeddings. When only one of the two tables exists
//! the remaining stage runs alone.

use crate::error::{Result, WikiliteError};
use crate::ml::codec::{bytes_to_float32, extract_mrl, quantize_binary};
use crate::ml::distance::{hamming, l2, levenshtein};
use crate::ml::embedding::Embedder;
use crate::search::ranker::fuse;
use crate::search::{SearchKind, SearchResult};
use crate::storage::{AnnMode, Store};

use std::collections::BinaryHeap;
use std::collections::HashSet;

/// Distinct vocabulary terms fetched per page during word search.
const VOCABULARY_PAGE_SIZE: usize = 100_000;

/// Bounded max-heap keeping the `capacity` smallest-distance payloads.
///
/// Ties are deterministic: at capacity a candidate only displaces the
/// current worst when its distance is strictly smaller, and among equal
/// distances the earliest insertion survives.
struct BoundedMaxHeap<P> {
    heap: BinaryHeap<HeapEntry<P>>,
    capacity: usize,
    seq: usize,
}

struct HeapEntry<P> {
    distance: f32,
    seq: usize,
    payload: P,
}

impl<P> PartialEq for HeapEntry<P> {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.seq == other.seq
    }
}

impl<P> Eq for HeapEntry<P> {}

impl<P> PartialOrd for HeapEntry<P> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for HeapEntry<P> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.seq.cmp(&other.seq))
    }
}

impl<P> BoundedMaxHeap<P> {
    fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity + 1),
            capacity,
            seq: 0,
        }
    }

    fn push(&mut self, distance: f32, payload: P) {
        let seq = self.seq;
        self.seq += 1;

        if self.heap.len() < self.capacity {
            self.heap.push(HeapEntry {
                distance,
                seq,
                payload,
            });
        } else if let Some(worst) = self.heap.peek() {
            if distance < worst.distance {
                self.heap.pop();
                self.heap.push(HeapEntry {
                    distance,
                    seq,
                    payload,
                });
            }
        }
    }

    /// Drain into ascending (distance, insertion) order.
    fn into_sorted_vec(self) -> Vec<(f32, P)> {
        let mut entries: Vec<HeapEntry<P>> = self.heap.into_vec();
        entries.sort_by(|a, b| a.cmp(b));
        entries
            .into_iter()
            .map(|entry| (entry.distance, entry.payload))
            .collect()
    }
}

/// Query context over an open store and an optional embedder.
pub struct Retriever<'a> {
    store: &'a Store,
    embedder: Option<&'a dyn Embedder>,
}

impl<'a> Retriever<'a> {
    pub fn new(store: &'a Store, embedder: Option<&'a dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    // ============ Lexical ============

    /// BM25 title search; each hit carries the text of the article's
    /// first section as a preview.
    pub fn search_title(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let hits = self.store.search_title_fts(query, limit)?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let (section, text) = self
                .store
                .first_section_text(hit.article_id)?
                .unwrap_or_default();
            results.push(SearchResult {
                article_id: hit.article_id,
                title: hit.title,
                entity: hit.entity,
                section,
                text,
                kind: SearchKind::Title,
                power: hit.relevance,
            });
        }
        Ok(results)
    }

    /// BM25 section content search.
    pub fn search_content(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let hits = self.store.search_content_fts(query, limit)?;

        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                article_id: hit.article_id,
                title: hit.article_title,
                entity: hit.entity,
                section: hit.section_title,
                text: hit.text,
                kind: SearchKind::Content,
                power: hit.relevance,
            })
            .collect())
    }

    /// Title and content search fused into one deduplicated list.
    pub fn search_lexical(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let mut results = self.search_title(query, limit)?;
        results.extend(self.search_content(query, limit)?);
        Ok(fuse(results, limit))
    }

    /// Closest vocabulary terms by Levenshtein distance, for fuzzy
    /// "did you mean" suggestions.
    pub fn search_word(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let mut heap = BoundedMaxHeap::new(limit);
        let mut seen: HashSet<String> = HashSet::new();
        let mut offset = 0usize;

        loop {
            let page = self.store.vocabulary_page(offset, VOCABULARY_PAGE_SIZE)?;
            if page.is_empty() {
                break;
            }
            offset += page.len();

            for term in page {
                if !seen.insert(term.clone()) {
                    continue;
                }
                let distance = levenshtein(query, &term);
                heap.push(distance as f32, term);
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|(distance, term)| SearchResult {
                article_id: 0,
                title: term.clone(),
                entity: String::new(),
                section: String::new(),
                text: term,
                kind: SearchKind::Word,
                power: distance as f64,
            })
            .collect())
    }

    // ============ Semantic ============

    async fn embed_query(&self, query: &str) -> Result<Option<Vec<f32>>> {
        match self.embedder {
            Some(embedder) => {
                let input = format!(
                    "{}{}",
                    self.store.settings().model_prefix_search,
                    query
                );
                Ok(Some(embedder.embed(&input).await?))
            }
            None => Ok(None),
        }
    }

    /// Two-stage nearest-neighbour search for an already-embedded query.
    ///
    /// Stage one scans the quantized chunks and keeps `limit * limit`
    /// candidates when an exact stage follows (else `limit`). Stage two
    /// re-ranks the survivors by L2 over the stored float32 embeddings.
    pub fn vector_results(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let has_ann = self.store.ann_chunk_count()? > 0;
        let has_vectors = self.store.vector_count()? > 0;

        if !has_ann && !has_vectors {
            return Ok(Vec::new());
        }

        let finalists: Vec<(i64, f64)> = if has_ann {
            let ann_limit = if has_vectors { limit * limit } else { limit };
            let candidates = self.scan_ann_chunks(query, ann_limit)?;

            let mut resolved: Vec<(i64, f32)> = Vec::with_capacity(candidates.len());
            for (distance, (chunk_id, position)) in candidates {
                if let Some(vectors_id) = self.store.ann_resolve(chunk_id, position)? {
                    resolved.push((vectors_id, distance));
                }
            }

            if has_vectors {
                let mut heap = BoundedMaxHeap::new(limit);
                for (vectors_id, _) in &resolved {
                    if let Some(embedding) = self.store.vector_get(*vectors_id)? {
                        heap.push(l2(query, &embedding)?, *vectors_id);
                    }
                }
                heap.into_sorted_vec()
                    .into_iter()
                    .map(|(distance, id)| (id, distance as f64))
                    .collect()
            } else {
                resolved
                    .into_iter()
                    .take(limit)
                    .map(|(id, distance)| (id, distance as f64))
                    .collect()
            }
        } else {
            // No ANN index yet: exhaustive scan over the stored embeddings.
            let mut heap = BoundedMaxHeap::new(limit);
            self.store.for_each_vector(|id, embedding| {
                heap.push(l2(query, &embedding)?, id);
                Ok(())
            })?;
            heap.into_sorted_vec()
                .into_iter()
                .map(|(distance, id)| (id, distance as f64))
                .collect()
        };

        let mut results = Vec::with_capacity(finalists.len());
        for (vectors_id, power) in finalists {
            if let Some(info) = self.store.vector_section_info(vectors_id)? {
                results.push(SearchResult {
                    article_id: info.article_id,
                    title: info.article_title,
                    entity: info.entity,
                    section: info.section_title.clone(),
                    text: info.section_title,
                    kind: SearchKind::Vector,
                    power,
                });
            }
        }
        Ok(results)
    }

    /// Stream every ANN chunk in fixed strides, keeping the `ann_limit`
    /// best `(chunk_id, position)` slots.
    fn scan_ann_chunks(
        &self,
        query: &[f32],
        ann_limit: usize,
    ) -> Result<Vec<(f32, (i64, i64))>> {
        let settings = self.store.settings();
        let mode: AnnMode = settings.ann_mode.parse()?;

        // The query goes through the same quantization as the stored
        // vectors, so an identical embedding scores exactly zero.
        let quantized_query = match mode {
            AnnMode::Binary => quantize_binary(query),
            AnnMode::Mrl => extract_mrl(query, settings.ann_size),
        };
        let stride = quantized_query.len();
        if stride == 0 {
            return Err(WikiliteError::InvalidAnnSize);
        }
        let query_prefix = match mode {
            AnnMode::Binary => Vec::new(),
            AnnMode::Mrl => bytes_to_float32(&quantized_query)?,
        };

        let mut heap = BoundedMaxHeap::new(ann_limit);
        self.store.for_each_ann_chunk(|chunk_id, chunk| {
            for (position, slice) in chunk.chunks_exact(stride).enumerate() {
                let distance = match mode {
                    AnnMode::Binary => hamming(&quantized_query, slice)?,
                    AnnMode::Mrl => l2(&query_prefix, &bytes_to_float32(slice)?)?,
                };
                heap.push(distance, (chunk_id, position as i64));
            }
            Ok(())
        })?;

        Ok(heap.into_sorted_vec())
    }

    /// Vector search for a text query. Fails when no embedder is
    /// configured.
    pub async fn search_vectors(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let embedding = self.embed_query(query).await?.ok_or_else(|| {
            WikiliteError::Embedding("no embedding model configured".to_string())
        })?;
        self.vector_results(&embedding, limit)
    }

    /// Vector search when an embedder is available, empty otherwise.
    pub async fn search_semantic(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        match self.embed_query(query).await? {
            Some(embedding) => self.vector_results(&embedding, limit),
            None => Ok(Vec::new()),
        }
    }

    // ============ Combined ============

    /// Lexical and semantic results fused, for a pre-computed optional
    /// query embedding.
    pub fn search_combined_with(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let mut results = self.search_lexical(query, limit)?;
        if let Some(embedding) = query_embedding {
            results.extend(self.vector_results(embedding, limit)?);
        }
        Ok(fuse(results, limit))
    }

    /// Full hybrid search: lexical plus semantic when available.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let embedding = self.embed_query(query).await?;
        self.search_combined_with(query, embedding.as_deref(), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ingest::process_ann;
    use crate::ml::codec::float32_to_bytes;
    use crate::storage::{NewArticle, NewSection};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StubEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.vectors
                .get(text)
                .cloned()
                .ok_or_else(|| WikiliteError::Embedding(format!("no stub vector for {:?}", text)))
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn seeded_store() -> (Store, Vec<i64>) {
        let mut store = Store::open_in_memory().unwrap();
        store.import_mode().unwrap();

        for (id, title, content) in [
            (1, "Alpha", "alpha body text"),
            (2, "Beta", "beta body text"),
            (3, "Gamma", "gamma body text"),
        ] {
            store
                .article_put(&NewArticle {
                    id,
                    title: title.to_string(),
                    entity: format!("Q{}", id),
                    sections: vec![NewSection {
                        title: "Body".to_string(),
                        pow: 2,
                        content: content.to_string(),
                    }],
                })
                .unwrap();
        }

        let section_ids: Vec<i64> = (0..3)
            .map(|i| store.article_get(i + 1).unwrap().sections[0].id)
            .collect();
        (store, section_ids)
    }

    fn seed_vectors(store: &mut Store, section_ids: &[i64], embeddings: &[Vec<f32>]) {
        let vectors: Vec<(i64, Vec<u8>)> = section_ids
            .iter()
            .zip(embeddings.iter())
            .map(|(id, v)| (*id, float32_to_bytes(v)))
            .collect();
        store.insert_vectors(&vectors).unwrap();
    }

    fn embeddings() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0],
            vec![-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0],
            vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0],
        ]
    }

    #[test]
    fn test_bounded_heap_keeps_smallest() {
        let mut heap = BoundedMaxHeap::new(3);
        for (distance, id) in [(5.0, 'a'), (1.0, 'b'), (4.0, 'c'), (2.0, 'd'), (3.0, 'e')] {
            heap.push(distance, id);
        }
        let sorted = heap.into_sorted_vec();
        let ids: Vec<char> = sorted.iter().map(|(_, id)| *id).collect();
        assert_eq!(ids, vec!['b', 'd', 'e']);
    }

    #[test]
    fn test_bounded_heap_first_seen_wins_on_ties() {
        let mut heap = BoundedMaxHeap::new(2);
        heap.push(1.0, "first");
        heap.push(1.0, "second");
        heap.push(1.0, "third");
        let sorted = heap.into_sorted_vec();
        assert_eq!(
            sorted.iter().map(|(_, p)| *p).collect::<Vec<_>>(),
            vec!["first", "second"]
        );
    }

    #[tokio::test]
    async fn test_vector_search_binary_exact_match_first() {
        let (mut store, section_ids) = seeded_store();
        seed_vectors(&mut store, &section_ids, &embeddings());

        let config = Config {
            ann_mode: "binary".to_string(),
            ..Config::default()
        };
        process_ann(&mut store, &config).unwrap();

        let embedder = StubEmbedder {
            vectors: HashMap::from([("alpha".to_string(), embeddings()[0].clone())]),
        };
        let retriever = Retriever::new(&store, Some(&embedder));

        let results = retriever.search_vectors("alpha", 2).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].article_id, 1);
        assert_eq!(results[0].power, 0.0);
        assert_eq!(results[0].kind, SearchKind::Vector);
        assert_eq!(results[0].text, "Body");
    }

    #[tokio::test]
    async fn test_vector_search_mrl_exact_match_first() {
        let (mut store, section_ids) = seeded_store();
        seed_vectors(&mut store, &section_ids, &embeddings());

        let config = Config {
            ann_mode: "mrl".to_string(),
            ann_size: 4,
            ..Config::default()
        };
        process_ann(&mut store, &config).unwrap();

        let embedder = StubEmbedder {
            vectors: HashMap::from([("beta".to_string(), embeddings()[1].clone())]),
        };
        let retriever = Retriever::new(&store, Some(&embedder));

        let results = retriever.search_vectors("beta", 2).await.unwrap();
        assert_eq!(results[0].article_id, 2);
        assert_eq!(results[0].power, 0.0);
    }

    #[tokio::test]
    async fn test_vector_search_without_ann_scans_exhaustively() {
        let (mut store, section_ids) = seeded_store();
        seed_vectors(&mut store, &section_ids, &embeddings());
        // No process_ann call: only full-precision vectors exist.

        let embedder = StubEmbedder {
            vectors: HashMap::from([("gamma".to_string(), embeddings()[2].clone())]),
        };
        let retriever = Retriever::new(&store, Some(&embedder));

        let results = retriever.search_vectors("gamma", 2).await.unwrap();
        assert_eq!(results[0].article_id, 3);
        assert_eq!(results[0].power, 0.0);
    }

    #[tokio::test]
    async fn test_vector_search_empty_store_is_empty() {
        let (store, _) = seeded_store();
        let embedder = StubEmbedder {
            vectors: HashMap::from([("alpha".to_string(), embeddings()[0].clone())]),
        };
        let retriever = Retriever::new(&store, Some(&embedder));
        let results = retriever.search_vectors("alpha", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_without_embedder_is_empty() {
        let (store, _) = seeded_store();
        let retriever = Retriever::new(&store, None);
        assert!(retriever.search_semantic("anything", 5).await.unwrap().is_empty());
    }

    #[test]
    fn test_word_search_fuzzy_suggestions() {
        let mut store = Store::open_in_memory().unwrap();
        store.import_mode().unwrap();
        store
            .article_put(&NewArticle {
                id: 1,
                title: "kitten".to_string(),
                entity: "Q1".to_string(),
                sections: vec![NewSection {
                    title: String::new(),
                    pow: 0,
                    content: "sitting bitten".to_string(),
                }],
            })
            .unwrap();
        store.process_titles().unwrap();
        store.process_contents().unwrap();
        store.process_vocabulary().unwrap();

        let retriever = Retriever::new(&store, None);
        let results = retriever.search_word("kittin", 2).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "kitten");
        assert_eq!(results[0].power, 1.0);
        assert_eq!(results[1].title, "bitten");
        assert_eq!(results[1].power, 2.0);
        assert_eq!(results[0].kind, SearchKind::Word);
    }

    #[tokio::test]
    async fn test_combined_search_fuses_streams() {
        let (mut store, section_ids) = seeded_store();
        seed_vectors(&mut store, &section_ids, &embeddings());
        store.process_titles().unwrap();
        store.process_contents().unwrap();

        let config = Config::default();
        process_ann(&mut store, &config).unwrap();

        let embedder = StubEmbedder {
            vectors: HashMap::from([("alpha".to_string(), embeddings()[0].clone())]),
        };
        let retriever = Retriever::new(&store, Some(&embedder));

        let results = retriever.search("alpha", 5).await.unwrap();
        // Article 1 matches by title, content and vector; it must appear
        // exactly once.
        let alpha_hits: Vec<_> = results.iter().filter(|r| r.article_id == 1).collect();
        assert_eq!(alpha_hits.len(), 1);
    }
}
