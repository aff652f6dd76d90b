//! Citation extraction and linking

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::config::CitationPolicy;
use crate::types::{CitedSource, DocumentOrigin, ScoredChunk};

// [Source 2], [Sources 1, 3], [Source: policy.pdf, Page 4], [Source 1: policy.pdf]
static SOURCE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[Sources?\s*([\d,\s]+)?(?::\s*([^\]]+))?\]").expect("Invalid regex")
});

static PAGE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)page\s*(\d+)").expect("Invalid regex"));

/// Build citations for an answer over the given context chunks.
///
/// Results are deduplicated by document and capped at `max_citations`.
pub fn select_citations(
    answer: &str,
    context: &[ScoredChunk],
    policy: CitationPolicy,
    max_citations: usize,
    snippet_chars: usize,
) -> Vec<CitedSource> {
    let order = match policy {
        CitationPolicy::AllContext => (0..context.len()).collect(),
        CitationPolicy::Referenced => {
            let referenced = referenced_indices(answer, context);
            if referenced.is_empty() {
                (0..context.len()).collect()
            } else {
                referenced
            }
        }
    };

    let mut seen_documents = HashSet::new();
    order
        .into_iter()
        .map(|i| &context[i])
        .filter(|r| seen_documents.insert(r.chunk.document_id))
        .take(max_citations)
        .map(|r| cite(r, snippet_chars))
        .collect()
}

/// Context positions referenced by the answer, in order of first mention
pub fn referenced_indices(answer: &str, context: &[ScoredChunk]) -> Vec<usize> {
    let mut indices = Vec::new();
    let mut push = |i: usize| {
        if !indices.contains(&i) {
            indices.push(i);
        }
    };

    for cap in SOURCE_MARKER.captures_iter(answer) {
        let mut numbered = false;
        if let Some(numbers) = cap.get(1) {
            for n in numbers
                .as_str()
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter_map(|s| s.parse::<usize>().ok())
            {
                if (1..=context.len()).contains(&n) {
                    push(n - 1);
                    numbered = true;
                }
            }
        }

        if numbered {
            continue;
        }
        if let Some(name) = cap.get(2) {
            if let Some(i) = find_by_name(context, name.as_str()) {
                push(i);
            }
        }
    }

    indices
}

/// Match `identifier[, Page p]` or `identifier (title, Page p)` to a chunk
fn find_by_name(context: &[ScoredChunk], reference: &str) -> Option<usize> {
    let identifier = reference
        .split([',', '('])
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    if identifier.is_empty() {
        return None;
    }
    let page: Option<u32> = PAGE_REF
        .captures(reference)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());

    let matches = |r: &ScoredChunk| {
        let source_id = r.chunk.metadata.source_id.to_lowercase();
        let title = r.chunk.metadata.title.as_deref().map(str::to_lowercase);
        source_id == identifier
            || title.as_deref() == Some(identifier.as_str())
            || source_id.contains(&identifier)
            || identifier.contains(&source_id)
    };

    let candidates: Vec<usize> = context
        .iter()
        .enumerate()
        .filter(|(_, r)| matches(r))
        .map(|(i, _)| i)
        .collect();

    page.and_then(|p| {
        candidates
            .iter()
            .copied()
            .find(|&i| context[i].chunk.metadata.page == Some(p))
    })
    .or_else(|| candidates.first().copied())
}

fn cite(result: &ScoredChunk, snippet_chars: usize) -> CitedSource {
    let metadata = &result.chunk.metadata;
    CitedSource {
        document_id: result.chunk.document_id,
        chunk_id: result.chunk.id,
        source_id: metadata.source_id.clone(),
        title: metadata.title.clone(),
        url: match metadata.origin {
            DocumentOrigin::Url => Some(metadata.source_id.clone()),
            DocumentOrigin::File => None,
        },
        page: metadata.page,
        snippet: truncate_snippet(&result.chunk.text, snippet_chars),
        score: result.score,
    }
}

/// Collapse whitespace and cut to at most `max_chars` on a word boundary
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let budget = max_chars.saturating_sub(3);
    let end = collapsed
        .char_indices()
        .nth(budget)
        .map(|(i, _)| i)
        .unwrap_or(collapsed.len());
    let head = &collapsed[..end];

    let at_word_end = collapsed[end..].starts_with(' ');
    let cut = match head.rfind(' ') {
        _ if at_word_end => head,
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BotId, Chunk, ChunkId, ChunkMetadata, DocumentId, SourceKind};

    fn scored(document_id: DocumentId, source_id: &str, page: Option<u32>, score: f32) -> ScoredChunk {
        let origin = if source_id.starts_with("http") {
            DocumentOrigin::Url
        } else {
            DocumentOrigin::File
        };
        ScoredChunk {
            chunk: Chunk {
                id: ChunkId::new(),
                document_id,
                bot_id: BotId::new(),
                sequence: 0,
                text: format!("Text from {} about refunds and returns.", source_id),
                embedding: Vec::new(),
                metadata: ChunkMetadata {
                    source_kind: SourceKind::Pdf,
                    origin,
                    source_id: source_id.to_string(),
                    title: None,
                    page,
                },
            },
            score,
        }
    }

    fn context() -> Vec<ScoredChunk> {
        let policy = DocumentId::new();
        vec![
            scored(policy, "policy.pdf", Some(1), 0.9),
            scored(policy, "policy.pdf", Some(4), 0.8),
            scored(DocumentId::new(), "https://acme.test/faq", None, 0.7),
            scored(DocumentId::new(), "shipping.txt", None, 0.6),
        ]
    }

    #[test]
    fn test_numbered_markers() {
        let ctx = context();
        assert_eq!(
            referenced_indices("Refunds take 30 days [Source 3]. See also [Sources 1, 4].", &ctx),
            vec![2, 0, 3]
        );
        assert!(referenced_indices("No markers here. [Source 9]", &ctx).is_empty());
    }

    #[test]
    fn test_named_markers_prefer_page() {
        let ctx = context();
        assert_eq!(referenced_indices("[Source: policy.pdf, Page 4]", &ctx), vec![1]);
        assert_eq!(referenced_indices("[Source: Shipping.txt]", &ctx), vec![3]);
        assert!(referenced_indices("[Source: unknown.doc]", &ctx).is_empty());
    }

    #[test]
    fn test_referenced_policy_dedupes_by_document() {
        let ctx = context();
        let cited = select_citations(
            "Answer [Source 2] and [Source 1] and [Source 3].",
            &ctx,
            CitationPolicy::Referenced,
            3,
            200,
        );

        assert_eq!(cited.len(), 2);
        assert_eq!(cited[0].chunk_id, ctx[1].chunk.id);
        assert_eq!(cited[0].page, Some(4));
        assert_eq!(cited[1].url.as_deref(), Some("https://acme.test/faq"));
    }

    #[test]
    fn test_fallback_to_all_context_and_cap() {
        let ctx = context();
        let cited = select_citations("No markers at all.", &ctx, CitationPolicy::Referenced, 2, 200);
        assert_eq!(cited.len(), 2);
        assert_eq!(cited[0].document_id, ctx[0].chunk.document_id);
        assert_eq!(cited[1].document_id, ctx[2].chunk.document_id);

        let all = select_citations("[Source 4]", &ctx, CitationPolicy::AllContext, 10, 200);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].document_id, ctx[0].chunk.document_id);
    }

    #[test]
    fn test_truncate_snippet() {
        assert_eq!(truncate_snippet("short  text\n here", 50), "short text here");

        let snippet = truncate_snippet("The refund window is thirty days from delivery", 20);
        assert_eq!(snippet, "The refund window...");
        assert!(snippet.chars().count() <= 20);

        let unbroken = truncate_snippet(&"x".repeat(30), 10);
        assert_eq!(unbroken, "xxxxxxx...");
    }
}
