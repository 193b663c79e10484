//! Sliding-window text chunker with separator-priority split points.
//!
//! Splits document text into windows of at most `chunk_size` bytes, cutting
//! at the highest-priority separator found inside each window (paragraph
//! break, then line break, then space) and only falling back to an arbitrary
//! character boundary when no separator is present. Consecutive windows
//! overlap by roughly `chunk_overlap` bytes so context survives the cut.
//!
//! Every chunk is a verbatim substring of the input: concatenating the first
//! chunk with each subsequent chunk's non-overlapping suffix reconstructs
//! the original text exactly.

use crate::models::{Chunk, ChunkMetadata, Document};

/// Split priority: paragraph break, line break, word break, then hard cut.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Split `text` into overlapping windows of at most `chunk_size` bytes.
/// `chunk_overlap` must be < `chunk_size` (enforced by config validation).
/// Empty input yields no chunks.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    split_ranges(text, chunk_size, chunk_overlap)
        .into_iter()
        .map(|(start, end)| text[start..end].to_string())
        .collect()
}

/// Byte ranges of each chunk within `text`. Ranges are in order, start at 0,
/// end at `text.len()`, and consecutive ranges overlap (`start[i+1] <= end[i]`).
pub(crate) fn split_ranges(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<(usize, usize)> {
    debug_assert!(chunk_overlap < chunk_size);

    if text.is_empty() {
        return Vec::new();
    }

    let len = text.len();
    let mut ranges = Vec::new();
    let mut start = 0;

    loop {
        let end = if len - start <= chunk_size {
            len
        } else {
            pick_split(text, start, floor_char_boundary(text, start + chunk_size))
        };
        ranges.push((start, end));

        if end >= len {
            break;
        }

        // Back up by the overlap, keeping forward progress and a valid boundary.
        let mut next = end.saturating_sub(chunk_overlap).max(start + 1);
        next = ceil_char_boundary(text, next);
        if next <= start || next >= len {
            next = end;
        }
        start = next;
    }

    ranges
}

/// Choose a split point in `(start, hard_end]`, preferring the last
/// occurrence of the highest-priority separator. The separator stays with
/// the left chunk so the ranges tile the input.
fn pick_split(text: &str, start: usize, hard_end: usize) -> usize {
    if hard_end <= start {
        // A single multi-byte char wider than chunk_size; cut after it.
        return ceil_char_boundary(text, start + 1);
    }

    let window = &text[start..hard_end];
    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            let cut = start + pos + sep.len();
            if cut > start {
                return cut;
            }
        }
    }
    hard_end
}

fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    i = i.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(text: &str, mut i: usize) -> usize {
    i = i.min(text.len());
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Chunk every document, attaching the parent's metadata plus
/// `chunk_index` / `chunk_count`.
pub fn chunk_documents(
    documents: &[Document],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for doc in documents {
        let pieces = split_text(&doc.content, chunk_size, chunk_overlap);
        let count = pieces.len();
        for (i, content) in pieces.into_iter().enumerate() {
            chunks.push(Chunk {
                content,
                metadata: ChunkMetadata {
                    source_path: doc.metadata.source_path.clone(),
                    filename: doc.metadata.filename.clone(),
                    file_type: doc.metadata.file_type.clone(),
                    chunk_index: i,
                    chunk_count: count,
                },
            });
        }
    }

    tracing::debug!(
        chunks = chunks.len(),
        documents = documents.len(),
        "chunked documents"
    );
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    fn reconstruct(text: &str, ranges: &[(usize, usize)]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for &(start, end) in ranges {
            assert!(start <= covered, "gap between chunks at byte {}", covered);
            if end > covered {
                out.push_str(&text[covered..end]);
                covered = end;
            }
        }
        out
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = split_text("Hello, world!", 100, 10);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_no_chunks() {
        assert!(split_text("", 100, 10).is_empty());
    }

    #[test]
    fn chunks_respect_size_bound() {
        let text = "The quick brown fox jumps over the lazy dog. \
                    Pack my box with five dozen liquor jugs. \
                    How vexingly quick daft zebras jump.";
        for (size, overlap) in [(40, 10), (25, 0), (64, 32), (10, 3)] {
            for chunk in split_text(text, size, overlap) {
                assert!(
                    chunk.len() <= size,
                    "chunk of {} bytes exceeds size {}",
                    chunk.len(),
                    size
                );
            }
        }
    }

    #[test]
    fn ranges_tile_the_input() {
        let text = "First paragraph.\n\nSecond paragraph is a bit longer.\n\nThird one.";
        for (size, overlap) in [(20, 5), (30, 10), (100, 0)] {
            let ranges = split_ranges(text, size, overlap);
            assert_eq!(ranges.first().unwrap().0, 0);
            assert_eq!(ranges.last().unwrap().1, text.len());
            assert_eq!(reconstruct(text, &ranges), text);
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let ranges = split_ranges(text, 20, 8);
        assert!(ranges.len() >= 2);
        for pair in ranges.windows(2) {
            assert!(pair[1].0 < pair[0].1, "chunks do not overlap: {:?}", pair);
        }
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = "Alpha beta gamma.\n\nDelta epsilon zeta.";
        let chunks = split_text(text, 25, 0);
        assert_eq!(chunks[0], "Alpha beta gamma.\n\n");
        assert_eq!(chunks[1], "Delta epsilon zeta.");
    }

    #[test]
    fn falls_back_to_hard_cut_without_separators() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = split_text(text, 10, 0);
        assert_eq!(chunks, vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllo wörld ünïcode täxt ẞharp";
        for (size, overlap) in [(10, 3), (7, 2)] {
            let ranges = split_ranges(text, size, overlap);
            for &(start, end) in &ranges {
                assert!(text.is_char_boundary(start));
                assert!(text.is_char_boundary(end));
            }
            assert_eq!(reconstruct(text, &ranges), text);
        }
    }

    #[test]
    fn three_sentences_at_forty_chars_make_overlapping_chunks() {
        let text = "Rust is fast. Rust is safe. Rust is productive.";
        let ranges = split_ranges(text, 40, 10);
        assert!(ranges.len() >= 2);
        for &(start, end) in &ranges {
            assert!(end - start <= 40);
        }
        assert_eq!(reconstruct(text, &ranges), text);
    }

    #[test]
    fn chunk_documents_attaches_positions() {
        let doc = Document {
            content: "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.".to_string(),
            metadata: DocumentMetadata {
                source_path: "/docs/a.txt".to_string(),
                filename: "a.txt".to_string(),
                file_type: "txt".to_string(),
            },
        };
        let chunks = chunk_documents(&[doc], 20, 5);
        assert!(chunks.len() > 1);
        let count = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.chunk_index, i);
            assert_eq!(chunk.metadata.chunk_count, count);
            assert_eq!(chunk.metadata.filename, "a.txt");
        }
    }
}
