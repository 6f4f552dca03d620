//! Hybrid retrieval for wikilite
//!
//! Lexical search runs over the FTS5 indexes, semantic search over the
//! quantized ANN chunks with an exact re-rank, and the ranker fuses the
//! streams into one deduplicated result list. Every result carries a
//! `power` score where smaller is better, whatever the source signal.

pub mod ranker;
pub mod retriever;

pub use ranker::fuse;
pub use retriever::Retriever;

use serde::Serialize;

/// Which signal produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchKind {
    /// Title FTS match
    #[serde(rename = "T")]
    Title,
    /// Content FTS match
    #[serde(rename = "C")]
    Content,
    /// Vector similarity match
    #[serde(rename = "V")]
    Vector,
    /// Vocabulary word-distance suggestion
    #[serde(rename = "W")]
    Word,
}

impl SearchKind {
    /// Single-letter code used in terminal output.
    pub fn code(&self) -> &'static str {
        match self {
            SearchKind::Title => "T",
            SearchKind::Content => "C",
            SearchKind::Vector => "V",
            SearchKind::Word => "W",
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub article_id: i64,
    pub title: String,
    pub entity: String,
    pub section: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: SearchKind,
    pub power: f64,
}
