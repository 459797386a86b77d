//! Recursive character text chunker.
//!
//! Splits source text into overlapping [`Chunk`]s of at most `chunk_size`
//! characters, preferring to break on paragraph boundaries, then lines,
//! then words, and only as a last resort between characters.
//!
//! # Algorithm
//!
//! 1. Pick the first separator in `["\n\n", "\n", " ", ""]` that occurs in
//!    the text and split on it, keeping each separator at the start of the
//!    piece that follows it.
//! 2. Pieces shorter than `chunk_size` are accumulated and merged; a piece
//!    that is still too long is split recursively with the remaining
//!    separators.
//! 3. While merging, when the next piece would overflow `chunk_size`, the
//!    current window is emitted and pieces are dropped from its front until
//!    at most `chunk_overlap` characters remain, which carry over into the
//!    next chunk.
//! 4. Chunks are whitespace-trimmed; empty chunks are dropped.
//!
//! Lengths are counted in characters, not bytes, so multi-byte text never
//! splits inside a code point.
//!
//! Each chunk receives a deterministic UUID derived from its source and
//! index plus a SHA-256 hash of its text, so indexing the same files twice
//! produces identical chunks.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, SourceDocument};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Split one document into chunks with contiguous indices starting at 0.
pub fn chunk_document(doc: &SourceDocument, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    split_text(&doc.content, chunk_size, chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(i, text)| make_chunk(&doc.source, i as i64, text))
        .collect()
}

/// Split text into trimmed, non-empty pieces of at most `chunk_size` chars.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size - 1);
    split_recursive(text, &SEPARATORS, chunk_size, chunk_overlap)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    // First separator present in the text; "" always matches.
    let (idx, separator) = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
        .map(|(i, sep)| (i, *sep))
        .unwrap_or((separators.len().saturating_sub(1), ""));
    let remaining = separators.get(idx + 1..).unwrap_or(&[]);

    let pieces = split_keeping_separator(text, separator);

    let mut output = Vec::new();
    let mut good: Vec<String> = Vec::new();

    for piece in pieces {
        if char_len(&piece) < chunk_size {
            good.push(piece);
            continue;
        }

        if !good.is_empty() {
            output.extend(merge_pieces(&good, chunk_size, chunk_overlap));
            good.clear();
        }

        if remaining.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                output.push(trimmed.to_string());
            }
        } else {
            output.extend(split_recursive(&piece, remaining, chunk_size, chunk_overlap));
        }
    }

    if !good.is_empty() {
        output.extend(merge_pieces(&good, chunk_size, chunk_overlap));
    }

    output
}

/// Split on `separator`, attaching each separator to the following piece.
/// An empty separator splits into individual characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (at, _) in text.match_indices(separator) {
        if at > start {
            pieces.push(text[start..at].to_string());
        }
        start = at;
    }
    // `start` sits on the last separator (or 0), so the tail keeps it.
    let tail = &text[start..];
    if !tail.is_empty() {
        pieces.push(tail.to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

/// Greedily merge pieces into windows of at most `chunk_size` chars,
/// carrying up to `chunk_overlap` chars of trailing pieces forward.
fn merge_pieces(pieces: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut docs = Vec::new();
    let mut window: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);

        if total + len > chunk_size && !window.is_empty() {
            push_joined(&mut docs, &window);

            while total > chunk_overlap || (total + len > chunk_size && total > 0) {
                match window.pop_front() {
                    Some(front) => total -= char_len(front),
                    None => break,
                }
            }
        }

        window.push_back(piece);
        total += len;
    }

    push_joined(&mut docs, &window);
    docs
}

fn push_joined(docs: &mut Vec<String>, window: &std::collections::VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn make_chunk(source: &str, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}#{}", source, index).as_bytes());

    Chunk {
        id: id.to_string(),
        source: source.to_string(),
        chunk_index: index,
        text,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: &str, content: &str) -> SourceDocument {
        SourceDocument {
            source: source.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_document(&doc("a.py", "print('hi')"), 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "print('hi')");
        assert_eq!(chunks[0].source, "a.py");
    }

    #[test]
    fn test_empty_and_whitespace_text_has_no_chunks() {
        assert!(chunk_document(&doc("a.py", ""), 1000, 200).is_empty());
        assert!(chunk_document(&doc("a.py", "  \n\n \n"), 1000, 200).is_empty());
    }

    #[test]
    fn test_chunks_respect_size() {
        let text = (0..200)
            .map(|i| format!("line number {} of the file", i))
            .collect::<Vec<_>>()
            .join("\n");
        for piece in split_text(&text, 100, 20) {
            assert!(char_len(&piece) <= 100, "chunk too long: {}", char_len(&piece));
        }
    }

    #[test]
    fn test_paragraphs_preferred_over_lines() {
        let text = "alpha alpha alpha\nalpha alpha\n\nbeta beta beta\nbeta beta";
        let pieces = split_text(text, 30, 0);
        assert_eq!(pieces, vec!["alpha alpha alpha\nalpha alpha", "beta beta beta\nbeta beta"]);
    }

    #[test]
    fn test_overlap_carries_trailing_words() {
        let text = "one two three four five six seven eight nine ten";
        let pieces = split_text(text, 20, 10);
        assert!(pieces.len() > 1);
        // The tail of each chunk reappears at the head of the next.
        for pair in pieces.windows(2) {
            let last_word = pair[0].split_whitespace().last().unwrap();
            assert!(
                pair[1].contains(last_word),
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_long_word_split_by_characters() {
        let text = "x".repeat(25);
        let pieces = split_text(&text, 10, 0);
        assert_eq!(pieces, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn test_multibyte_safe() {
        let text = "é".repeat(30);
        let pieces = split_text(&text, 8, 2);
        assert!(pieces.iter().all(|p| char_len(p) <= 8));
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_document(&doc("notes.md", &text), 60, 10);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_document(&doc("d.txt", text), 12, 4);
        let c2 = chunk_document(&doc("d.txt", text), 12, 4);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_ids_differ_per_source() {
        let a = chunk_document(&doc("a.rs", "fn main() {}"), 100, 0);
        let b = chunk_document(&doc("b.rs", "fn main() {}"), 100, 0);
        assert_ne!(a[0].id, b[0].id);
        assert_eq!(a[0].hash, b[0].hash);
    }
}
