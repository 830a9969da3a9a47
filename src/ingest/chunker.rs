use thiserror::Error;

/// Invalid chunking parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("chunk_size must be positive")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` with this chunker's parameters.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.chunk_size, self.overlap)
    }
}

/// Splits text into overlapping chunks of at most `chunk_size` characters
/// (using `char` count).
///
/// Chunks end at the last space inside the window when there is one, and
/// the next window starts `overlap` characters before the previous end.
/// Every chunk is trimmed and empty ones are dropped. The window start
/// strictly increases on every step, so any `overlap` terminates.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();

    if chars.len() <= chunk_size {
        return keep_trimmed(text);
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = start + chunk_size;

        if end >= chars.len() {
            chunks.extend(keep_trimmed(&collect(&chars[start..])));
            break;
        }

        // Last space after the window start, else a hard cut at the edge
        let cut = chars[start + 1..end]
            .iter()
            .rposition(|&c| c == ' ')
            .map_or(end, |i| start + 1 + i);

        chunks.extend(keep_trimmed(&collect(&chars[start..cut])));

        let next = cut.saturating_sub(overlap);
        start = if next > start { next } else { cut };
    }

    chunks
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

fn keep_trimmed(s: &str) -> Vec<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Repeating prose cut to exactly `len` characters.
    fn prose(len: usize) -> String {
        "alpha beta gamma delta epsilon zeta eta theta "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[test]
    fn test_short_text_single_trimmed_chunk() {
        let chunks = chunk_text("  This is a short text that should not be chunked. ", 100, 20);
        assert_eq!(chunks, vec!["This is a short text that should not be chunked."]);
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        assert!(chunk_text("   \n\t ", 100, 20).is_empty());
        assert!(chunk_text("", 100, 20).is_empty());
    }

    #[test]
    fn test_long_text_bounded_and_non_empty() {
        let text = "This is a longer text. ".repeat(20);
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= 100, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn test_cuts_on_word_boundaries() {
        let text = prose(700);
        let chunks = chunk_text(&text, 100, 20);
        let words: Vec<&str> = text.split_whitespace().collect();
        // overlap may start mid-word, but cuts land on spaces
        for chunk in &chunks[..chunks.len() - 1] {
            let last = chunk.split(' ').last().unwrap();
            assert!(words.contains(&last), "split word at end: {last}");
        }
    }

    #[test]
    fn test_chunks_cover_source() {
        let text = prose(1234);
        let chunks = chunk_text(&text, 150, 30);
        for word in text.split_whitespace() {
            assert!(chunks.iter().any(|c| c.contains(word)));
        }
        assert!(text.trim_end().ends_with(chunks.last().unwrap().as_str()));
        assert!(text.starts_with(chunks[0].as_str()));
    }

    #[test]
    fn test_no_space_falls_back_to_hard_cut() {
        let text = "x".repeat(250);
        let chunks = chunk_text(&text, 100, 10);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[1].len(), 100);
        // 0..100, 90..190, 180..250
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 70);
    }

    #[test]
    fn test_overlap_between_consecutive_chunks() {
        let text = prose(2500);
        let chunks = chunk_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 3);
        for pair in chunks.windows(2) {
            let head: String = pair[1].chars().take(50).collect();
            assert!(
                pair[0].contains(&head),
                "next chunk should start inside the previous one's tail"
            );
        }
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
        }
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let text = "héllo wörld ".repeat(30);
        let chunks = chunk_text(&text, 50, 10);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
        assert!(chunks.iter().all(|c| c.contains('é') || c.contains('ö')));
    }

    #[test]
    fn test_overlap_not_smaller_than_chunk_size_terminates() {
        let text = prose(600);
        for overlap in [100, 150, 1000] {
            let chunks = chunk_text(&text, 100, overlap);
            assert!(!chunks.is_empty());
            assert!(chunks.len() < 600, "must make progress every step");
            assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        }
    }

    #[test]
    fn test_zero_chunk_size_terminates() {
        let chunks = chunk_text("ab cd", 0, 0);
        assert_eq!(chunks.concat(), "abcd");
    }

    #[test]
    fn test_chunker_validation() {
        assert_eq!(Chunker::new(0, 0), Err(ChunkerError::ZeroChunkSize));
        assert_eq!(
            Chunker::new(100, 100),
            Err(ChunkerError::OverlapTooLarge {
                chunk_size: 100,
                overlap: 100
            })
        );
        let chunker = Chunker::new(1000, 200).unwrap();
        assert_eq!(chunker.chunk_size(), 1000);
        assert_eq!(chunker.overlap(), 200);
        assert_eq!(chunker.split("short"), vec!["short"]);
    }
}
