//! Fixed-size sliding-window chunker.
//!
//! Splits extracted text into overlapping windows of `chunk_size`
//! characters. Consecutive windows share `overlap` characters so a clause
//! cut at a window edge still appears whole in one of the two chunks.
//!
//! # Algorithm
//!
//! 1. `start = 0`, `stride = chunk_size - overlap`.
//! 2. Emit `text[start .. start + chunk_size]` (clamped to the end).
//! 3. `start += stride`; repeat while `start < len(text)`.
//!
//! Lengths and offsets are measured in `char`s, so a window never cuts a
//! multi-byte code point. For a text of `L > 0` characters this yields
//! `ceil(L / stride)` chunks; the last one may be shorter than `chunk_size`.
//!
//! # Example
//!
//! ```rust
//! use lexrag_core::chunk::split_text;
//!
//! let text = "a".repeat(2500);
//! let chunks = split_text(&text, 1000, 200).unwrap();
//! assert_eq!(chunks.len(), 4);
//! assert_eq!(chunks[3].chars().count(), 100);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive windows in characters.
pub const DEFAULT_OVERLAP: usize = 200;

/// Reject parameters whose stride would be non-positive.
pub fn validate(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(RagError::InvalidConfig(format!(
            "chunk_size ({}) must be greater than overlap ({})",
            chunk_size, overlap
        )));
    }
    Ok(())
}

/// Start offsets (in chars) of every window for a text of `len` chars.
pub fn window_starts(len: usize, chunk_size: usize, overlap: usize) -> Result<Vec<usize>> {
    validate(chunk_size, overlap)?;
    let stride = chunk_size - overlap;
    Ok((0..len).step_by(stride).collect())
}

/// Split `text` into overlapping windows. Empty text yields no chunks.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    // Byte offset of every char boundary, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;

    let chunks = window_starts(len, chunk_size, overlap)?
        .into_iter()
        .map(|start| {
            let end = (start + chunk_size).min(len);
            text[bounds[start]..bounds[end]].to_string()
        })
        .collect();
    Ok(chunks)
}

/// Chunk every segment of one load and number the results.
///
/// Segments are split independently and concatenated in order. Chunk
/// indices are contiguous across segments and ids take the form
/// `"{generation}:{chunk_index}"`.
pub fn chunk_segments(
    source: &str,
    generation: u64,
    segments: &[String],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    validate(chunk_size, overlap)?;

    let mut chunks = Vec::new();
    for segment in segments {
        for text in split_text(segment, chunk_size, overlap)? {
            let index = chunks.len();
            chunks.push(make_chunk(source, generation, index, text));
        }
    }
    Ok(chunks)
}

fn make_chunk(source: &str, generation: u64, index: usize, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}:{}", generation, index),
        source: source.to_string(),
        generation,
        chunk_index: index,
        text,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_reference_scenario() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let starts = window_starts(2500, 1000, 200).unwrap();
        assert_eq!(starts, vec![0, 800, 1600, 2400]);

        let chunks = split_text(&text, 1000, 200).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], text[0..1000]);
        assert_eq!(chunks[1], text[800..1800]);
        assert_eq!(chunks[2], text[1600..2500]);
        assert_eq!(chunks[3].len(), 100);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("Hello world", 1000, 200).unwrap();
        assert_eq!(chunks, vec!["Hello world".to_string()]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(split_text("", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_parameters() {
        for (size, overlap) in [(10, 10), (10, 11), (0, 0)] {
            let err = split_text("abc", size, overlap).unwrap_err();
            assert!(matches!(err, RagError::InvalidConfig(_)), "{size}/{overlap}");
        }
    }

    #[test]
    fn test_every_char_covered_and_count() {
        for len in 1..60usize {
            for size in 1..12usize {
                for overlap in 0..size {
                    let stride = size - overlap;
                    let starts = window_starts(len, size, overlap).unwrap();
                    assert_eq!(starts.len(), len.div_ceil(stride));

                    let mut covered = vec![false; len];
                    for s in &starts {
                        for c in covered.iter_mut().take((s + size).min(len)).skip(*s) {
                            *c = true;
                        }
                    }
                    assert!(covered.iter().all(|c| *c), "len={len} size={size} overlap={overlap}");
                }
            }
        }
    }

    #[test]
    fn test_zero_overlap_partitions() {
        let text = "abcdefghijklmnopqrstuvwxyz0123";
        let chunks = split_text(text, 7, 0).unwrap();
        assert_eq!(chunks.concat(), text);
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, text.len());
    }

    #[test]
    fn test_multibyte_chars_counted_as_chars() {
        let text = "cláusula décima: añadir ñandú ┌──┐";
        let chunks = split_text(text, 5, 1).unwrap();
        for c in &chunks {
            assert!(c.chars().count() <= 5);
        }
        assert_eq!(chunks[0], "cláus");
        assert_eq!(chunks[1], "sula ");
    }

    #[test]
    fn test_segments_indexed_contiguously() {
        let segments = vec!["a".repeat(25), "b".repeat(5), "c".repeat(12)];
        let chunks = chunk_segments("doc.pdf", 3, &segments, 10, 0).unwrap();
        assert_eq!(chunks.len(), 3 + 1 + 2);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.id, format!("3:{}", i));
            assert_eq!(c.generation, 3);
            assert_eq!(c.source, "doc.pdf");
        }
        assert!(chunks[3].text.starts_with('b'));
        assert!(chunks[4].text.starts_with('c'));

        let ids: HashSet<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let segs = vec!["Alpha beta gamma".to_string()];
        let a = chunk_segments("x", 1, &segs, 8, 2).unwrap();
        let b = chunk_segments("x", 2, &segs, 8, 2).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.hash, y.hash);
            assert_ne!(x.id, y.id);
        }
    }
}
