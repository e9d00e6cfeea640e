use std::ops::Range;

use crate::error::IndexError;

/// Sliding character window: `chunk_size` long, advancing by `chunk_size - chunk_overlap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkerConfig {
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` unless `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IndexError> {
        if chunk_size == 0 {
            return Err(IndexError::InvalidConfiguration(
                "chunk_size must be positive".into(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(IndexError::InvalidConfiguration(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Character ranges of the chunks covering a text of `len` characters.
    ///
    /// Windows start at `0, step, 2*step, ...`. Once the text left after a window is
    /// shorter than the overlap it is merged into that window instead of becoming a
    /// trailing chunk of its own.
    #[must_use]
    pub fn spans(&self, len: usize) -> Vec<Range<usize>> {
        let step = self.chunk_size - self.chunk_overlap;
        let mut spans = Vec::new();
        let mut start = 0;
        while start < len {
            let end = (start + self.chunk_size).min(len);
            if end == len {
                spans.push(start..end);
                break;
            }
            if len - end < self.chunk_overlap {
                spans.push(start..len);
                break;
            }
            spans.push(start..end);
            start += step;
        }
        spans
    }

    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        self.spans(chars.len())
            .into_iter()
            .map(|r| chars[r].iter().collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn rejects_overlap_not_below_size() {
        assert!(matches!(
            ChunkerConfig::new(100, 100),
            Err(IndexError::InvalidConfiguration(_))
        ));
        assert!(ChunkerConfig::new(100, 150).is_err());
        assert!(ChunkerConfig::new(0, 0).is_err());
        assert!(ChunkerConfig::new(100, 99).is_ok());
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(ChunkerConfig::default().split("").is_empty());
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = ChunkerConfig::new(10, 2).unwrap().split("hello");
        assert_eq!(chunks, vec!["hello"]);
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let chunks = ChunkerConfig::new(4, 1).unwrap().split("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn short_remainder_merges_into_last_chunk() {
        // windows: 0..5, 3..8; remainder after 8 is 1 char (< overlap 2), so merge.
        let config = ChunkerConfig::new(5, 2).unwrap();
        assert_eq!(config.spans(9), vec![0..5, 3..9]);
        assert_eq!(config.split("abcdefghi"), vec!["abcde", "defghi"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunks = ChunkerConfig::new(3, 1).unwrap().split("xin chào");
        assert_eq!(chunks[0], "xin");
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    }

    proptest! {
        #[test]
        fn spans_cover_text_without_gaps(size in 1usize..64, overlap_seed in 0usize..64, len in 0usize..2000) {
            let overlap = overlap_seed % size;
            let config = ChunkerConfig::new(size, overlap).unwrap();
            let spans = config.spans(len);

            if len == 0 {
                prop_assert!(spans.is_empty());
            } else {
                prop_assert_eq!(spans[0].start, 0);
                prop_assert_eq!(spans.last().unwrap().end, len);
                for pair in spans.windows(2) {
                    prop_assert!(pair[1].start <= pair[0].end, "gap between {:?} and {:?}", pair[0], pair[1]);
                    prop_assert_eq!(pair[1].start - pair[0].start, size - overlap);
                }
                for span in &spans[..spans.len() - 1] {
                    prop_assert_eq!(span.len(), size);
                }
            }
        }

        #[test]
        fn final_chunk_never_shorter_than_needed(size in 2usize..32, overlap_seed in 1usize..32, len in 1usize..500) {
            let overlap = overlap_seed % size;
            let spans = ChunkerConfig::new(size, overlap).unwrap().spans(len);
            let last = spans.last().unwrap();
            prop_assert!(last.len() < size + overlap.max(1));
            if spans.len() > 1 {
                prop_assert!(last.end - spans[spans.len() - 2].end >= overlap);
            }
        }

        #[test]
        fn split_reassembles_original(text in "\\PC{0,300}", size in 1usize..40, overlap_seed in 0usize..40) {
            let overlap = overlap_seed % size;
            let config = ChunkerConfig::new(size, overlap).unwrap();
            let chunks = config.split(&text);
            let mut rebuilt: String = chunks.first().cloned().unwrap_or_default();
            for chunk in chunks.iter().skip(1) {
                rebuilt.extend(chunk.chars().skip(overlap));
            }
            prop_assert_eq!(rebuilt, text);
        }
    }
}
