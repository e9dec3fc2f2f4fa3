#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Separators for source code, tried in order. Definition boundaries come
/// first so windows tend to start at a `class`, `def` or decorator line.
pub const CODE_SEPARATORS: &[&str] = &["\nclass ", "\ndef ", "\n@", "\n\n", "\n", " ", ""];

/// Separators for prose: paragraphs, then lines, then words, then characters
pub const PROSE_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Window sizes for the two splitters, measured in characters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub code_chunk_size: usize,
    pub code_chunk_overlap: usize,
    pub prose_chunk_size: usize,
    pub prose_chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            code_chunk_size: 800,
            code_chunk_overlap: 100,
            prose_chunk_size: 1000,
            prose_chunk_overlap: 150,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn code_splitter(&self) -> RecursiveSplitter {
        RecursiveSplitter::new(
            self.code_chunk_size,
            self.code_chunk_overlap,
            CODE_SEPARATORS,
        )
    }

    #[inline]
    pub fn prose_splitter(&self) -> RecursiveSplitter {
        RecursiveSplitter::new(
            self.prose_chunk_size,
            self.prose_chunk_overlap,
            PROSE_SEPARATORS,
        )
    }
}

/// Recursive character splitter.
///
/// Text is cut at the first separator that occurs in it; the separator stays
/// attached to the start of the piece that follows it. Pieces still larger
/// than `chunk_size` are split again with the remaining separators, then
/// adjacent pieces are merged back into windows of at most `chunk_size`
/// characters, carrying up to `chunk_overlap` characters into the next window.
/// Windows are trimmed and empty windows are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    #[inline]
    pub fn new(chunk_size: usize, chunk_overlap: usize, separators: &[&str]) -> Self {
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: separators.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        let (separator, remaining) = choose_separator(text, separators);
        let pieces = split_keeping_separator(text, separator);

        let mut good_pieces: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                good_pieces.push(piece);
                continue;
            }

            if !good_pieces.is_empty() {
                final_chunks.extend(self.merge_pieces(&good_pieces));
                good_pieces.clear();
            }

            if remaining.is_empty() {
                if let Some(trimmed) = non_empty_trimmed(piece) {
                    final_chunks.push(trimmed);
                }
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good_pieces.is_empty() {
            final_chunks.extend(self.merge_pieces(&good_pieces));
        }

        final_chunks
    }

    /// Merge small pieces into windows, keeping an overlapping tail
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current: Vec<(&str, usize)> = Vec::new();
        let mut total = 0usize;
        let mut start = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && current.len() > start {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of {} characters, longer than the configured {}",
                        total, self.chunk_size
                    );
                }

                if let Some(window) = join_window(&current[start..]) {
                    windows.push(window);
                }

                // Drop pieces from the front until the tail fits the overlap
                // and leaves room for the incoming piece
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    let (_, dropped) = current[start];
                    total -= dropped;
                    start += 1;
                }
            }

            current.push((piece, len));
            total += len;
        }

        if let Some(window) = join_window(&current[start..]) {
            windows.push(window);
        }

        windows
    }
}

/// First separator present in `text` plus the separators left for recursion.
/// The empty separator always matches and ends the recursion.
fn choose_separator<'s>(text: &str, separators: &'s [&'s str]) -> (&'s str, &'s [&'s str]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (separator, &[]);
        }
        if text.contains(separator) {
            return (separator, &separators[i + 1..]);
        }
    }
    (separators.last().copied().unwrap_or(""), &[])
}

/// Split `text` at every occurrence of `separator`, keeping the separator at
/// the start of the following piece. Empty pieces are skipped.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (index, _) in text.match_indices(separator) {
        if index > last {
            pieces.push(&text[last..index]);
        }
        last = index;
    }
    if last < text.len() {
        pieces.push(&text[last..]);
    }
    pieces
}

fn join_window(pieces: &[(&str, usize)]) -> Option<String> {
    let joined: String = pieces.iter().map(|(piece, _)| *piece).collect();
    non_empty_trimmed(&joined)
}

fn non_empty_trimmed(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[inline]
fn char_len(text: &str) -> usize {
    text.chars().count()
}
