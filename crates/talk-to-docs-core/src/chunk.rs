//! Sliding-window text chunker.
//!
//! Splits cleaned document text into overlapping [`Chunk`]s of at most
//! `chunk_size` characters. Consecutive windows share exactly `overlap`
//! characters, so a sentence cut at one boundary appears whole in the
//! neighbouring chunk.
//!
//! Each chunk receives a deterministic UUID (v5) derived from its
//! document ID and sequence index, plus a SHA-256 hash of its text.
//! Re-chunking the same document with the same parameters reproduces
//! identical chunks, ids included.
//!
//! # Algorithm
//!
//! 1. Validate `0 <= overlap < chunk_size`.
//! 2. Walk the text in character positions with stride `chunk_size - overlap`.
//! 3. Each window `[start, min(start + chunk_size, len))` becomes one chunk.
//! 4. Stop after the window that reaches the end of the text. The final
//!    chunk may be shorter than `chunk_size`; it is never padded.
//!
//! # Example
//!
//! ```rust
//! use talk_to_docs_core::chunk::split;
//!
//! let chunks = split("doc-123", "abcdefghij", 4, 1).unwrap();
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(texts, ["abcd", "defg", "ghij"]);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Split `text` into overlapping windows of `chunk_size` characters.
///
/// # Errors
///
/// [`Error::InvalidConfiguration`] if `chunk_size == 0` or
/// `overlap >= chunk_size`.
///
/// # Guarantees
///
/// - Empty text produces no chunks.
/// - Sequence indices are contiguous: `0, 1, 2, …, N-1`.
/// - Chunks cover `[0, len)` with no gaps.
/// - `end_offset - start_offset <= chunk_size` for every chunk.
pub fn split(document_id: &str, text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    validate(chunk_size, overlap)?;

    // Byte offset of every char boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;
    let stride = chunk_size - overlap;

    let mut chunks = Vec::with_capacity(len / stride + 1);
    let mut start = 0;
    while start < len {
        let end = (start + chunk_size).min(len);
        let window = &text[bounds[start]..bounds[end]];
        chunks.push(make_chunk(document_id, chunks.len(), window, start, end));
        if end == len {
            break;
        }
        start += stride;
    }

    Ok(chunks)
}

/// Check chunking parameters without splitting anything.
pub fn validate(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(Error::invalid_config("chunk_size must be > 0"));
    }
    if overlap >= chunk_size {
        return Err(Error::invalid_config(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }
    Ok(())
}

/// Deterministic chunk id for `(document_id, sequence_index)`.
pub fn chunk_id(document_id: &str, sequence_index: usize) -> String {
    let name = format!("{}:{}", document_id, sequence_index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

fn make_chunk(document_id: &str, index: usize, text: &str, start: usize, end: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(document_id, index),
        document_id: document_id.to_string(),
        sequence_index: index,
        text: text.to_string(),
        start_offset: start,
        end_offset: end,
        hash,
    }
}
