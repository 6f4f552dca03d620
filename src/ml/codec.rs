//! Vector codecs: float32 blobs, sign-bit binary quantization, MRL truncation
//!
//! Embeddings are persisted as little-endian float32 blobs. The ANN index
//! stores a compact quantized form of each vector: either one sign bit per
//! component (`binary` mode, 32x smaller, compared with Hamming distance)
//! or the leading components of the L2-normalized vector (`mrl` mode,
//! compared with L2 distance).

use crate::error::{Result, WikiliteError};

/// Pack a float32 vector into little-endian bytes, 4 bytes per component.
pub fn float32_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for &value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a little-endian float32 blob back into a vector.
///
/// Fails with `MalformedVector` when the blob length is not a multiple of 4.
pub fn bytes_to_float32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(WikiliteError::MalformedVector(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Quantize a vector to one sign bit per component.
///
/// Produces `ceil(len / 8)` bytes. Bit `i % 8` of byte `i / 8` is set iff
/// the IEEE sign bit of `values[i]` is clear (LSB-first within each byte),
/// so `-0.0` quantizes to 0.
pub fn quantize_binary(values: &[f32]) -> Vec<u8> {
    let mut packed = vec![0u8; values.len().div_ceil(8)];
    for (i, &value) in values.iter().enumerate() {
        if !value.is_sign_negative() {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}

/// Extract an MRL prefix: L2-normalize the full vector, keep the first
/// `size` components, pack as little-endian float32 bytes.
///
/// A `size` of zero or larger than the vector falls back to the full
/// length. A zero-magnitude vector yields zeros.
pub fn extract_mrl(values: &[f32], size: usize) -> Vec<u8> {
    let take = if size == 0 || size > values.len() {
        values.len()
    } else {
        size
    };

    let magnitude = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    let prefix: Vec<f32> = if magnitude > 0.0 {
        values[..take].iter().map(|v| v / magnitude).collect()
    } else {
        vec![0.0; take]
    };

    float32_to_bytes(&prefix)
}
