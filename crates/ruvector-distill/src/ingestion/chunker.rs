//! Page-adaptive overlapping chunker
//!
//! Chunk size is a step function of the declared page count, converted to
//! characters and capped. Consecutive chunks share `overlap` characters; the
//! last chunk is cut at the document end.

use crate::config::ChunkingConfig;
use crate::types::Chunk;

/// Overlapping window chunker sized from the page count
#[derive(Debug, Clone)]
pub struct DocumentChunker {
    /// Characters assumed per page
    chars_per_page: usize,
    /// Hard ceiling on chunk size
    max_chunk_chars: usize,
    /// Fraction of a chunk repeated at the start of the next one
    overlap_ratio: f64,
}

impl DocumentChunker {
    /// Create a chunker from configuration
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chars_per_page: config.chars_per_page.max(1),
            max_chunk_chars: config.max_chunk_chars.max(1),
            overlap_ratio: config.overlap_ratio.clamp(0.0, 0.99),
        }
    }

    /// Pages per chunk for a document of `total_pages`
    pub fn pages_per_chunk(total_pages: u32) -> usize {
        match total_pages {
            0..=50 => 15,
            51..=200 => 20,
            201..=500 => 25,
            _ => 30,
        }
    }

    /// Chunk size in characters, never above `max_chunk_chars`
    pub fn chunk_size(&self, total_pages: u32) -> usize {
        (Self::pages_per_chunk(total_pages) * self.chars_per_page).min(self.max_chunk_chars)
    }

    /// Characters shared by neighbouring chunks
    pub fn overlap(&self, chunk_size: usize) -> usize {
        let overlap = (chunk_size as f64 * self.overlap_ratio).floor() as usize;
        overlap.min(chunk_size.saturating_sub(1))
    }

    /// Split `content` into ordered, overlapping chunks.
    ///
    /// Returns an empty list for empty content; otherwise every chunk is
    /// non-empty and together they cover the content without gaps.
    pub fn create_chunks(&self, content: &str, total_pages: u32) -> Vec<Chunk> {
        if content.is_empty() {
            return Vec::new();
        }

        let chunk_size = self.chunk_size(total_pages);
        let overlap = self.overlap(chunk_size);
        let advance = chunk_size - overlap;

        // Byte offset of every char, plus the end, so slicing stays on
        // UTF-8 boundaries
        let offsets: Vec<usize> = content
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(content.len()))
            .collect();
        let total_chars = offsets.len() - 1;

        let mut chunks = Vec::with_capacity(total_chars / advance + 1);
        let mut start = 0usize;

        loop {
            let end = (start + chunk_size).min(total_chars);
            chunks.push(Chunk {
                index: chunks.len(),
                content: content[offsets[start]..offsets[end]].to_string(),
                start,
                end,
            });

            if end == total_chars {
                break;
            }
            start += advance;
        }

        tracing::debug!(
            "Chunked {} chars ({} pages) into {} chunks of <= {} chars, {} overlap",
            total_chars,
            total_pages,
            chunks.len(),
            chunk_size,
            overlap
        );

        chunks
    }
}

impl Default for DocumentChunker {
    fn default() -> Self {
        Self::new(&ChunkingConfig::default())
    }
}
