//! Text extraction for wikilite
//!
//! Turns raw encyclopaedia HTML into sectioned plain text ready for the
//! store.

pub mod extractor;

pub use extractor::extract_article;
