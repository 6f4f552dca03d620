//! Machine learning primitives for wikilite
//!
//! Vector codecs, distance functions and embedding generation. The codec
//! and distance leaves are pure functions over slices; embedding is an
//! abstract trait with remote (HTTP/JSON) and local (Candle) adapters.

pub mod codec;
pub mod distance;
pub mod embedding;

pub use codec::{bytes_to_float32, extract_mrl, float32_to_bytes, quantize_binary};
pub use distance::{hamming, l2, levenshtein};
pub use embedding::{create_embedder, CandleEmbedder, Embedder, OpenAiEmbedder};
