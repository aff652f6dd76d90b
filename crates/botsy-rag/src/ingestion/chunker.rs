//! Text chunking with overlap and page tracking

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::types::{ChunkDraft, ChunkMetadata};

use super::loader::{NormalizedText, SourceMetadata};

/// A unit the packer never splits
struct Piece {
    text: String,
    /// First piece of a paragraph; joined with a blank line
    starts_paragraph: bool,
}

/// Text chunker with configurable size and overlap (sizes in characters)
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    min_size: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize, min_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap: overlap.min(chunk_size.saturating_sub(1)),
            min_size,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, config.min_chunk_size)
    }

    /// Chunk a loaded document; sequence numbers run across sections
    pub fn chunk(&self, doc: &NormalizedText) -> Vec<ChunkDraft> {
        let total: usize = doc
            .sections
            .iter()
            .map(|s| s.text.trim().chars().count())
            .sum();
        if total == 0 || total < self.min_size {
            return Vec::new();
        }

        let mut drafts = Vec::new();
        for section in &doc.sections {
            for text in self.chunk_text(&section.text) {
                drafts.push(ChunkDraft {
                    sequence: drafts.len() as u32,
                    text,
                    metadata: chunk_metadata(&doc.metadata, section.page),
                });
            }
        }
        drafts
    }

    /// Split text into chunk strings
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;
        // Whether `current` holds anything beyond carried-over overlap
        let mut fresh = false;

        for piece in self.pieces(text) {
            let piece_len = piece.text.chars().count();
            let separator = if piece.starts_paragraph { "\n\n" } else { " " };

            if !current.is_empty()
                && current_len + separator.len() + piece_len > self.chunk_size
            {
                if fresh {
                    chunks.push(current.clone());
                }

                current = self.overlap_tail(&current);
                current_len = current.chars().count();
                if !current.is_empty() && current_len + 1 + piece_len > self.chunk_size {
                    current.clear();
                    current_len = 0;
                }
                fresh = false;
            }

            if !current.is_empty() {
                // Overlap is always joined with a space
                let separator = if fresh { separator } else { " " };
                current.push_str(separator);
                current_len += separator.len();
            }
            current.push_str(&piece.text);
            current_len += piece_len;
            fresh = true;
        }

        if fresh && !current.trim().is_empty() {
            chunks.push(current);
        }

        chunks
    }

    /// Paragraphs, then sentences, then fixed-width windows
    fn pieces(&self, text: &str) -> Vec<Piece> {
        let mut pieces = Vec::new();

        for paragraph in paragraphs(text) {
            if paragraph.chars().count() <= self.chunk_size {
                pieces.push(Piece {
                    text: paragraph,
                    starts_paragraph: true,
                });
                continue;
            }

            let mut first = true;
            for sentence in paragraph.split_sentence_bounds() {
                let sentence = sentence.trim();
                if sentence.is_empty() {
                    continue;
                }
                for part in split_fixed(sentence, self.chunk_size) {
                    pieces.push(Piece {
                        text: part,
                        starts_paragraph: first,
                    });
                    first = false;
                }
            }
        }

        pieces
    }

    /// At most `overlap` trailing characters, starting on a word boundary
    fn overlap_tail(&self, text: &str) -> String {
        if self.overlap == 0 {
            return String::new();
        }

        let char_count = text.chars().count();
        if char_count <= self.overlap {
            return text.trim().to_string();
        }

        let start = byte_offset(text, char_count - self.overlap);
        let tail = &text[start..];
        let starts_mid_word = text[..start]
            .chars()
            .next_back()
            .is_some_and(|c| !c.is_whitespace());

        let aligned = if starts_mid_word {
            match tail.find(char::is_whitespace) {
                Some(pos) => &tail[pos..],
                None => "",
            }
        } else {
            tail
        };

        aligned.trim().to_string()
    }
}

fn chunk_metadata(source: &SourceMetadata, page: Option<u32>) -> ChunkMetadata {
    ChunkMetadata {
        source_kind: source.source_kind,
        origin: source.origin,
        source_id: source.source_id.clone(),
        title: source.title.clone(),
        page,
    }
}

/// Groups of non-blank lines
fn paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !lines.is_empty() {
                paragraphs.push(lines.join("\n"));
                lines.clear();
            }
        } else {
            lines.push(line);
        }
    }
    if !lines.is_empty() {
        paragraphs.push(lines.join("\n"));
    }

    paragraphs
}

/// Split at the last whitespace inside each window, or hard at the limit
fn split_fixed(text: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text.trim();

    while rest.chars().count() > max_chars {
        let window_end = byte_offset(rest, max_chars);
        let cut = rest[..window_end]
            .rfind(char::is_whitespace)
            .filter(|&pos| pos > 0)
            .unwrap_or(window_end);

        parts.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }

    parts
}

/// Byte offset of the `n`th character
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::loader::TextSection;
    use crate::types::{DocumentOrigin, SourceKind};
    use proptest::prelude::*;

    fn doc(sections: Vec<TextSection>) -> NormalizedText {
        NormalizedText {
            sections,
            metadata: SourceMetadata {
                source_kind: SourceKind::Text,
                origin: DocumentOrigin::File,
                source_id: "guide.txt".into(),
                title: Some("Guide".into()),
                content_type: "text/plain".into(),
                description: None,
                byte_size: 0,
            },
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = TextChunker::new(1000, 200, 10);
        let drafts = chunker.chunk(&doc(vec![TextSection::unpaged(
            "Our refund window is 30 days.",
        )]));

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, "Our refund window is 30 days.");
        assert_eq!(drafts[0].sequence, 0);
        assert_eq!(drafts[0].metadata.source_id, "guide.txt");
    }

    #[test]
    fn test_degenerate_inputs() {
        let chunker = TextChunker::new(100, 20, 10);
        assert!(chunker.chunk(&doc(vec![])).is_empty());
        assert!(chunker.chunk(&doc(vec![TextSection::unpaged("   \n\n ")])).is_empty());
        assert!(chunker.chunk(&doc(vec![TextSection::unpaged("tiny")])).is_empty());
    }

    #[test]
    fn test_overlap_starts_on_word_boundary() {
        let chunker = TextChunker::new(50, 20, 1);
        let text: String = (1..=8)
            .map(|i| format!("Topic{} covers detail{}.", i, i))
            .collect::<Vec<_>>()
            .join(" ");

        let chunks = chunker.chunk_text(&text);
        assert!(chunks.len() > 1);
        assert_eq!(chunks[1], "covers detail2. Topic3 covers detail3.");

        for pair in chunks.windows(2) {
            let first_word = pair[1].split_whitespace().next().unwrap();
            assert!(pair[0].split_whitespace().any(|w| w == first_word));
        }
    }

    #[test]
    fn test_long_word_hard_split() {
        let chunker = TextChunker::new(10, 0, 1);
        let chunks = chunker.chunk_text(&"x".repeat(25));
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn test_no_overlap_only_trailing_chunk() {
        let chunker = TextChunker::new(30, 10, 1);
        assert_eq!(
            chunker.chunk_text("aaaa bbbb cccc dddd eeee ffff"),
            vec!["aaaa bbbb cccc dddd eeee ffff"]
        );
        assert_eq!(
            chunker.chunk_text("aaaa bbbb cccc dddd eeee ffff gggg"),
            vec!["aaaa bbbb cccc dddd eeee ffff", "eeee ffff gggg"]
        );
    }

    #[test]
    fn test_pages_and_sequence_across_sections() {
        let chunker = TextChunker::new(1000, 100, 10);
        let drafts = chunker.chunk(&doc(vec![
            TextSection {
                page: Some(1),
                text: "First page text here.".into(),
            },
            TextSection {
                page: Some(2),
                text: "Second page text here.".into(),
            },
        ]));

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].metadata.page, Some(1));
        assert_eq!(drafts[1].metadata.page, Some(2));
        assert_eq!(drafts[1].sequence, 1);
        assert_eq!(drafts[1].metadata.title.as_deref(), Some("Guide"));
    }

    #[test]
    fn test_paragraphs_kept_together() {
        let chunker = TextChunker::new(60, 0, 1);
        let chunks = chunker.chunk_text("Para one line.\n\nPara two line.\n\n\nPara three is a little longer.");
        assert_eq!(
            chunks,
            vec![
                "Para one line.\n\nPara two line.",
                "Para three is a little longer.",
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_chunking_is_deterministic_and_bounded(
            words in proptest::collection::vec("[a-zA-Z]{1,12}[.,]?", 0..300),
            size in 20usize..200,
            overlap_pct in 0usize..60,
        ) {
            let overlap = size * overlap_pct / 100;
            let chunker = TextChunker::new(size, overlap, 5);
            let text = words.join(" ");
            let input = doc(vec![TextSection::unpaged(text.clone())]);

            let first = chunker.chunk(&input);
            let second = chunker.chunk(&input);
            prop_assert_eq!(&first, &second);

            for draft in &first {
                prop_assert!(draft.text.chars().count() <= size);
                prop_assert!(!draft.text.trim().is_empty());
            }

            let covered: std::collections::HashSet<&str> =
                first.iter().flat_map(|d| d.text.split_whitespace()).collect();
            if !first.is_empty() {
                for word in text.split_whitespace() {
                    prop_assert!(covered.contains(word));
                }
            }
        }
    }
}
