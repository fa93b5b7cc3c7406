//! Recursive text splitting along a separator preference order.
//!
//! Splitting prefers semantic boundaries and degrades gracefully: paragraph
//! breaks first, then line breaks, sentence-ending punctuation, plain
//! spaces, and only as a last resort hard character slicing. All lengths
//! are measured in characters, never bytes, so multi-byte text is never
//! split mid-scalar.

use std::mem::take;

use magpie_core::{Error, Result};

/// Separator preference order, coarsest first.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "? ", "! ", " "];

/// Splits text into overlapping chunks bounded by a target size.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker with the given target size and overlap.
    ///
    /// # Errors
    /// Returns an error if `chunk_size` is zero or `overlap` is not
    /// strictly smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk size must be positive".to_owned()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap {overlap} must be smaller than chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Split `text` into chunks of at most `chunk_size` characters.
    ///
    /// Returns an empty vec for empty input and `[text]` when the whole
    /// text already fits in one chunk.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        if char_len(text) <= self.chunk_size {
            return vec![text.to_owned()];
        }
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let Some((separator, finer)) = separators.split_first() else {
            return self.hard_slice(text);
        };
        if !text.contains(separator) {
            return self.split_recursive(text, finer);
        }

        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        // Pieces forming the running buffer; rejoined by the separator when
        // emitted. buffer_len tracks the joined length in characters.
        let mut buffer: Vec<&str> = Vec::new();
        let mut buffer_len = 0;

        for piece in text.split(separator) {
            let piece_len = char_len(piece);

            // A piece too large for any chunk at this level: flush the
            // buffer and descend into the finer separators for it.
            if piece_len > self.chunk_size {
                if !buffer.is_empty() {
                    push_joined(&mut chunks, &take(&mut buffer), separator);
                    buffer_len = 0;
                }
                chunks.extend(self.split_recursive(piece, finer));
                continue;
            }

            let cost = if buffer.is_empty() {
                piece_len
            } else {
                separator_len + piece_len
            };
            if !buffer.is_empty() && buffer_len + cost > self.chunk_size {
                push_joined(&mut chunks, &buffer, separator);
                // Keep a suffix of the emitted pieces as the overlap seed,
                // shrinking from the front until the incoming piece fits
                // alongside it.
                while !buffer.is_empty()
                    && (buffer_len > self.overlap
                        || buffer_len + separator_len + piece_len > self.chunk_size)
                {
                    let removed = char_len(buffer.remove(0));
                    buffer_len -= removed;
                    if !buffer.is_empty() {
                        buffer_len -= separator_len;
                    }
                }
            }

            if !buffer.is_empty() {
                buffer_len += separator_len;
            }
            buffer.push(piece);
            buffer_len += piece_len;
        }

        if !buffer.is_empty() {
            push_joined(&mut chunks, &buffer, separator);
        }
        chunks
    }

    /// Last-resort slicing by character count, stepping back by the
    /// overlap between consecutive slices.
    fn hard_slice(&self, text: &str) -> Vec<String> {
        let characters: Vec<char> = text.chars().collect();
        let total = characters.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let end = (start + self.chunk_size).min(total);
            chunks.push(characters[start..end].iter().collect());
            if end == total {
                break;
            }
            start = end - self.overlap;
        }
        chunks
    }
}

/// Collapse runs of blank lines and strip trailing whitespace per line.
///
/// Applied to raw documents before chunking so that extraction artifacts
/// (stacked blank lines, padded line ends) do not distort chunk sizes.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut previous_blank = false;

    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            if !previous_blank && !lines.is_empty() {
                lines.push("");
            }
            previous_blank = true;
        } else {
            lines.push(trimmed);
            previous_blank = false;
        }
    }
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn push_joined(chunks: &mut Vec<String>, pieces: &[&str], separator: &str) {
    let chunk = pieces.join(separator);
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(chunk_size: usize, overlap: usize) -> Chunker {
        Chunker::new(chunk_size, overlap).unwrap()
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunker(100, 20).split("").is_empty());
    }

    #[test]
    fn test_short_text_returned_whole() {
        let text = "fits in one chunk";
        assert_eq!(chunker(100, 20).split(text), vec![text.to_owned()]);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(Chunker::new(0, 0).is_err(), "Zero chunk size is invalid");
        assert!(
            Chunker::new(100, 100).is_err(),
            "Overlap equal to chunk size is invalid"
        );
        assert!(
            Chunker::new(100, 150).is_err(),
            "Overlap above chunk size is invalid"
        );
    }

    #[test]
    fn test_uniform_text_hard_slice_boundary() {
        let text = "x".repeat(1500);
        let chunks = chunker(1000, 200).split(&text);
        let lengths: Vec<usize> = chunks.iter().map(|chunk| chunk.chars().count()).collect();
        assert_eq!(lengths, vec![1000, 700], "Slices step back by the overlap");
    }

    #[test]
    fn test_hard_slice_respects_char_boundaries() {
        let text = "é".repeat(1500);
        let chunks = chunker(1000, 200).split(&text);
        let lengths: Vec<usize> = chunks.iter().map(|chunk| chunk.chars().count()).collect();
        assert_eq!(lengths, vec![1000, 700], "Lengths are counted in characters");
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let first = "a".repeat(400);
        let second = "b".repeat(400);
        let third = "c".repeat(400);
        let text = format!("{first}\n\n{second}\n\n{third}");

        let chunks = chunker(1000, 0).split(&text);
        assert_eq!(
            chunks,
            vec![format!("{first}\n\n{second}"), third],
            "Whole paragraphs accumulate until the next one would overflow"
        );
    }

    #[test]
    fn test_overlap_seeds_next_chunk_with_previous_tail() {
        let line_a = "a".repeat(100);
        let line_b = "b".repeat(100);
        let line_c = "c".repeat(100);
        let line_d = "d".repeat(100);
        let text = format!("{line_a}\n{line_b}\n{line_c}\n{line_d}");

        let chunks = chunker(250, 120).split(&text);
        assert_eq!(
            chunks,
            vec![
                format!("{line_a}\n{line_b}"),
                format!("{line_b}\n{line_c}"),
                format!("{line_c}\n{line_d}"),
            ],
            "Each chunk starts with the previous chunk's tail line"
        );

        for pair in chunks.windows(2) {
            let shared = longest_shared_boundary(&pair[0], &pair[1]);
            assert!(
                shared > 0 && shared <= 120,
                "Adjacent chunks share at most overlap characters, got {shared}"
            );
        }
    }

    #[test]
    fn test_sentence_boundaries_used_inside_paragraph() {
        let first = "a".repeat(48);
        let second = "b".repeat(48);
        let third = "c".repeat(48);
        let text = format!("{first}. {second}. {third}.");

        let chunks = chunker(120, 0).split(&text);
        assert_eq!(
            chunks,
            vec![format!("{first}. {second}"), format!("{third}.")],
            "Sentences accumulate and rejoin with their separator"
        );
    }

    #[test]
    fn test_oversized_piece_recurses_into_finer_separators() {
        let left = "A".repeat(80);
        let right = "B".repeat(80);
        let short = "c".repeat(10);
        let text = format!("{left}. {right}\n\n{short}");

        let chunks = chunker(100, 0).split(&text);
        assert_eq!(
            chunks,
            vec![left, right, short],
            "An oversized paragraph falls through to sentence splitting"
        );
    }

    #[test]
    fn test_no_chunk_exceeds_target_size() {
        let sentence = "The quick brown fox jumps over the lazy dog near the riverbank. ";
        let paragraph = sentence.repeat(8);
        let text = format!(
            "{paragraph}\n\n{paragraph}\n\nword {} tail",
            "supercalifragilisticexpialidocious".repeat(6)
        );

        for chunk in chunker(120, 30).split(&text) {
            let length = chunk.chars().count();
            assert!(length <= 120, "Chunk of {length} chars exceeds the target");
        }
    }

    #[test]
    fn test_normalize_whitespace_collapses_blank_runs() {
        let text = "first line   \n\n\n\nsecond line\t\n\nthird line\n\n\n";
        assert_eq!(
            normalize_whitespace(text),
            "first line\n\nsecond line\n\nthird line",
            "Blank runs collapse to one separator and line ends are trimmed"
        );
    }

    #[test]
    fn test_normalize_whitespace_drops_leading_blanks() {
        assert_eq!(normalize_whitespace("\n\n\nbody"), "body");
        assert_eq!(normalize_whitespace("   \n \nbody"), "body");
        assert_eq!(normalize_whitespace(""), "");
        assert_eq!(normalize_whitespace(" \n\t\n "), "");
    }

    /// Longest prefix of `next` (up to its full length) that is a suffix
    /// of `previous`, in characters.
    fn longest_shared_boundary(previous: &str, next: &str) -> usize {
        let next_chars: Vec<char> = next.chars().collect();
        for length in (1..=next_chars.len()).rev() {
            let prefix: String = next_chars[..length].iter().collect();
            if previous.ends_with(&prefix) {
                return length;
            }
        }
        0
    }
}
