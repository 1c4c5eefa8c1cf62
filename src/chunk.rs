//! Fixed-size overlapping text chunker.
//!
//! Splits document body text into windows of `chunk_size` units with
//! `overlap` units of overlap between consecutive windows, preserving
//! document order. Overlap is a deliberate trade-off: it prevents
//! losing context at chunk boundaries at the cost of redundant storage.
//!
//! Units are bytes clamped down to UTF-8 character boundaries, so a
//! window never splits a multi-byte character. On ASCII input the
//! windows are exact (2500 chars at 1000/200 → chunks of 1000, 1000,
//! 900).

use crate::models::Chunk;

/// Split text into overlapping chunks with contiguous indices from 0.
///
/// Returns an empty vector when the text is empty or whitespace-only;
/// the caller decides whether that is an error (ingestion treats it as
/// `ExtractionEmpty`).
pub fn chunk_text(
    owner_id: &str,
    document_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    // A window must advance, otherwise the loop never terminates.
    let overlap = overlap.min(chunk_size.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    loop {
        let mut end = floor_char_boundary(text, (start + chunk_size).min(text.len()));
        if end <= start {
            // chunk_size smaller than the character at `start`; take
            // the whole character rather than stalling.
            end = next_char_boundary(text, start + 1);
        }
        chunks.push(Chunk {
            document_id: document_id.to_string(),
            owner_id: owner_id.to_string(),
            chunk_index: index,
            content: text[start..end].to_string(),
        });
        index += 1;

        if end >= text.len() {
            break;
        }
        // Boundary flooring can eat the whole step when
        // chunk_size - overlap is smaller than the bytes lost to it;
        // the next window must still start strictly after this one.
        let candidate = floor_char_boundary(text, end - overlap.min(end));
        start = if candidate > start {
            candidate
        } else {
            next_char_boundary(text, start + 1)
        };
    }

    chunks
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Smallest char boundary at or above `index`.
fn next_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_produces_no_chunks() {
        assert!(chunk_text("u1", "doc1", "", 1000, 200).is_empty());
        assert!(chunk_text("u1", "doc1", "   \n\t ", 1000, 200).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("u1", "doc1", "Hello, world!", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].content, "Hello, world!");
        assert_eq!(chunks[0].document_id, "doc1");
        assert_eq!(chunks[0].owner_id, "u1");
    }

    #[test]
    fn test_2500_chars_yields_three_chunks() {
        // 2500 chars at 1000/200 windowing: starts at 0, 800, 1600.
        let text = "a".repeat(2500);
        let chunks = chunk_text("u1", "doc1", &text, 1000, 200);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content.len(), 1000);
        assert_eq!(chunks[1].content.len(), 1000);
        assert_eq!(chunks[2].content.len(), 900);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn test_windows_overlap() {
        let text: String = (0..1500).map(|i| ((i % 26) as u8 + b'a') as char).collect();
        let chunks = chunk_text("u1", "doc1", &text, 1000, 200);
        assert_eq!(chunks.len(), 2);
        // Last 200 units of chunk 0 equal the first 200 of chunk 1.
        let tail = &chunks[0].content[800..];
        let head = &chunks[1].content[..200];
        assert_eq!(tail, head);
    }

    #[test]
    fn test_never_splits_multibyte_chars() {
        let text = "é".repeat(1500); // 2 bytes per char
        let chunks = chunk_text("u1", "doc1", &text, 1001, 200);
        for c in &chunks {
            assert!(c.content.is_char_boundary(0));
            assert!(std::str::from_utf8(c.content.as_bytes()).is_ok());
        }
        let reassembled: usize = chunks.iter().map(|c| c.content.chars().count()).sum();
        assert!(reassembled >= 1500);
    }

    #[test]
    fn test_deterministic() {
        let text = "The quick brown fox. ".repeat(200);
        let a = chunk_text("u1", "doc1", &text, 1000, 200);
        let b = chunk_text("u1", "doc1", &text, 1000, 200);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.content, y.content);
            assert_eq!(x.chunk_index, y.chunk_index);
        }
    }

    #[test]
    fn test_narrow_window_multibyte_terminates() {
        // chunk_size=4, overlap=3 leaves a 1-byte step that boundary
        // flooring can swallow on 2-byte chars; the window must still
        // advance every iteration.
        let text = "é".repeat(50); // 100 bytes
        let chunks = chunk_text("u1", "doc1", &text, 4, 3);
        assert!(!chunks.is_empty());
        assert!(chunks.len() <= 100, "window stalled");
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(!c.content.is_empty());
        }
        // The final window reaches the end of the text.
        assert!(chunks.last().unwrap().content.ends_with('é'));
        assert!(text.ends_with(chunks.last().unwrap().content.as_str()));
    }

    #[test]
    fn test_overlap_clamped_below_window() {
        // overlap >= chunk_size would stall the window.
        let text = "x".repeat(50);
        let chunks = chunk_text("u1", "doc1", &text, 10, 10);
        assert!(chunks.len() < 60, "chunker failed to advance");
        assert_eq!(chunks.last().unwrap().chunk_index as usize + 1, chunks.len());
    }
}
