//! Storage functionality for wikilite
//!
//! A single SQLite file holds articles, sectioned text (optionally
//! deflate-compressed), two FTS5 indexes, the vocabulary, float32
//! embedding blobs and the quantized ANN chunk index.

pub mod database;
pub mod schema;

pub use database::Store;

use crate::error::{Result, WikiliteError};
use crate::utils::inflate_text;
use std::str::FromStr;

/// Article to be ingested, with its sections in document order.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub id: i64,
    pub title: String,
    pub entity: String,
    pub sections: Vec<NewSection>,
}

/// One section of an incoming article.
#[derive(Debug, Clone)]
pub struct NewSection {
    /// Heading text; empty for the article prologue
    pub title: String,
    /// Heading level weight (1 for h1 .. 6 for h6)
    pub pow: i64,
    pub content: String,
}

/// Stored article with its sections in insertion order.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub entity: String,
    pub sections: Vec<Section>,
}

/// Stored section, content already decompressed.
#[derive(Debug, Clone)]
pub struct Section {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub pow: i64,
}

/// Section text as persisted: plain or deflate-compressed. Callers of the
/// store never see this; rows decompress at the access boundary.
#[derive(Debug, Clone)]
pub enum SectionText {
    Plain(String),
    Deflated(Vec<u8>),
}

impl SectionText {
    pub fn from_columns(content: Option<String>, content_flate: Option<Vec<u8>>) -> Self {
        match (content, content_flate) {
            (Some(text), _) => SectionText::Plain(text),
            (None, Some(blob)) => SectionText::Deflated(blob),
            (None, None) => SectionText::Plain(String::new()),
        }
    }

    pub fn into_string(self) -> Result<String> {
        match self {
            SectionText::Plain(text) => Ok(text),
            SectionText::Deflated(blob) => inflate_text(&blob),
        }
    }
}

/// ANN quantization layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnMode {
    /// One sign bit per component, Hamming prefilter
    Binary,
    /// Leading components of the normalized vector, L2 prefilter
    Mrl,
}

impl AnnMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnMode::Binary => "binary",
            AnnMode::Mrl => "mrl",
        }
    }

    /// Bytes per quantized vector inside an ANN chunk.
    pub fn stride(&self, dimension: usize, ann_size: usize) -> usize {
        match self {
            AnnMode::Binary => dimension.div_ceil(8),
            AnnMode::Mrl => 4 * ann_size,
        }
    }
}

impl FromStr for AnnMode {
    type Err = WikiliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "binary" => Ok(AnnMode::Binary),
            "mrl" => Ok(AnnMode::Mrl),
            other => Err(WikiliteError::InvalidAnnMode(other.to_string())),
        }
    }
}

/// Setup values loaded when the store is opened.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub language: String,
    pub model: String,
    pub ann_mode: String,
    pub ann_size: usize,
    pub model_prefix_save: String,
    pub model_prefix_search: String,
}

/// Section pending embedding generation, joined with its article title.
#[derive(Debug, Clone)]
pub struct PendingSection {
    pub id: i64,
    pub article_title: String,
    pub title: String,
    pub content: String,
}

/// Row mapping a vector id to its slot inside an ANN chunk.
#[derive(Debug, Clone, Copy)]
pub struct AnnEntry {
    pub vectors_id: i64,
    pub chunk_position: i64,
}
