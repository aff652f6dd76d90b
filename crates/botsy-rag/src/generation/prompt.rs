//! Prompt assembly for grounded chat answers

use crate::config::ComposerConfig;
use crate::providers::llm::{ChatPrompt, PromptMessage};
use crate::types::{ChatTurn, ChunkMetadata, Role, ScoredChunk};

const GROUNDING_RULES: &str = r#"GROUNDING RULES:
1. Answer ONLY from the CONTEXT below. Do not use outside knowledge.
2. If the context does not contain the answer, say that you don't have that information.
3. Cite the sources you used inline as [Source N], matching the numbers in the context.
4. Keep answers clear and concise. Use short paragraphs or lists where they help."#;

/// A prompt plus the chunks that made it into the context block
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub prompt: ChatPrompt,
    /// Leading retrieved chunks included as `[Source 1..=n]`
    pub context_chunks: usize,
}

/// Prompt builder for grounded answers
pub struct PromptBuilder {
    max_context_chars: usize,
    history_window: usize,
    default_system_prompt: String,
}

impl PromptBuilder {
    pub fn new(config: &ComposerConfig) -> Self {
        Self {
            max_context_chars: config.max_context_chars,
            history_window: config.history_window,
            default_system_prompt: config.default_system_prompt.clone(),
        }
    }

    /// System message, windowed history, then the effective prompt
    pub fn build(
        &self,
        persona: Option<&str>,
        history: &[ChatTurn],
        retrieved: &[ScoredChunk],
        effective_prompt: &str,
    ) -> BuiltPrompt {
        let (context, context_chunks) = self.build_context(retrieved);

        let persona = persona
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_system_prompt);

        let system = format!(
            "{}\n\n{}\n\nCONTEXT:\n{}",
            persona,
            GROUNDING_RULES,
            context.trim_end()
        );

        let mut messages = Vec::with_capacity(self.history_window + 2);
        messages.push(PromptMessage::system(system));

        let start = history.len().saturating_sub(self.history_window);
        for turn in &history[start..] {
            messages.push(match turn.role {
                Role::User => PromptMessage::user(turn.text.clone()),
                Role::Assistant => PromptMessage::assistant(turn.text.clone()),
            });
        }

        messages.push(PromptMessage::user(effective_prompt));

        BuiltPrompt {
            prompt: ChatPrompt { messages },
            context_chunks,
        }
    }

    /// Numbered context block within the character budget.
    ///
    /// Stops before the chunk that would overflow. The first chunk is
    /// always present, cut to fit when it alone is over budget.
    pub fn build_context(&self, retrieved: &[ScoredChunk]) -> (String, usize) {
        let mut context = String::new();
        let mut used = 0usize;
        let mut included = 0usize;

        for (i, result) in retrieved.iter().enumerate() {
            let entry = format!(
                "[Source {}: {}]\n{}\n\n",
                i + 1,
                source_label(&result.chunk.metadata),
                result.chunk.text.trim()
            );
            let entry_len = entry.chars().count();

            if used + entry_len > self.max_context_chars {
                if included == 0 {
                    context.extend(entry.chars().take(self.max_context_chars));
                    context.push_str("\n\n");
                    included = 1;
                }
                break;
            }

            context.push_str(&entry);
            used += entry_len;
            included += 1;
        }

        (context, included)
    }
}

/// `identifier (title, Page p)`, leaving out absent parts
pub fn source_label(metadata: &ChunkMetadata) -> String {
    let mut details = Vec::new();
    if let Some(title) = metadata.title.as_deref().filter(|t| *t != metadata.source_id) {
        details.push(title.to_string());
    }
    if let Some(page) = metadata.page {
        details.push(format!("Page {}", page));
    }

    if details.is_empty() {
        metadata.source_id.clone()
    } else {
        format!("{} ({})", metadata.source_id, details.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::PromptRole;
    use crate::types::{BotId, Chunk, ChunkId, DocumentId, DocumentOrigin, SourceKind};

    fn scored(source_id: &str, title: Option<&str>, page: Option<u32>, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: ChunkId::new(),
                document_id: DocumentId::new(),
                bot_id: BotId::new(),
                sequence: 0,
                text: text.to_string(),
                embedding: Vec::new(),
                metadata: ChunkMetadata {
                    source_kind: SourceKind::Pdf,
                    origin: DocumentOrigin::File,
                    source_id: source_id.to_string(),
                    title: title.map(str::to_string),
                    page,
                },
            },
            score: 0.8,
        }
    }

    #[test]
    fn test_source_label() {
        let full = scored("policy.pdf", Some("Refund Policy"), Some(3), "x");
        assert_eq!(source_label(&full.chunk.metadata), "policy.pdf (Refund Policy, Page 3)");

        let bare = scored("notes.txt", Some("notes.txt"), None, "x");
        assert_eq!(source_label(&bare.chunk.metadata), "notes.txt");
    }

    #[test]
    fn test_prompt_layout() {
        let builder = PromptBuilder::new(&ComposerConfig::default());
        let history = vec![
            ChatTurn::user("Hi there"),
            ChatTurn::assistant("Hello!", Vec::new()),
        ];
        let retrieved = vec![scored("policy.pdf", None, Some(1), "Our refund window is 30 days.")];

        let built = builder.build(Some("You are Acme's support bot."), &history, &retrieved, "What is the refund window?");
        let messages = &built.prompt.messages;

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, PromptRole::System);
        assert!(messages[0].content.starts_with("You are Acme's support bot."));
        assert!(messages[0].content.contains("[Source 1: policy.pdf (Page 1)]\nOur refund window is 30 days."));
        assert_eq!(messages[1].role, PromptRole::User);
        assert_eq!(messages[2].role, PromptRole::Assistant);
        assert_eq!(built.prompt.last_user_message(), Some("What is the refund window?"));
        assert_eq!(built.context_chunks, 1);
    }

    #[test]
    fn test_default_persona_and_history_window() {
        let config = ComposerConfig {
            history_window: 2,
            ..Default::default()
        };
        let builder = PromptBuilder::new(&config);
        let history: Vec<ChatTurn> = (0..6).map(|i| ChatTurn::user(format!("turn {}", i))).collect();

        let built = builder.build(Some("   "), &history, &[], "latest");
        let messages = &built.prompt.messages;

        assert!(messages[0].content.starts_with(&config.default_system_prompt));
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "turn 4");
        assert_eq!(messages[2].content, "turn 5");
    }

    #[test]
    fn test_context_budget() {
        let config = ComposerConfig {
            max_context_chars: 120,
            ..Default::default()
        };
        let builder = PromptBuilder::new(&config);
        let retrieved = vec![
            scored("a.txt", None, None, &"alpha ".repeat(10)),
            scored("b.txt", None, None, &"beta ".repeat(10)),
            scored("c.txt", None, None, &"gamma ".repeat(10)),
        ];

        let (context, included) = builder.build_context(&retrieved);
        assert_eq!(included, 1);
        assert!(context.contains("[Source 1: a.txt]"));
        assert!(!context.contains("[Source 2"));

        let oversized = vec![scored("big.txt", None, None, &"word ".repeat(100))];
        let (context, included) = builder.build_context(&oversized);
        assert_eq!(included, 1);
        assert!(context.chars().count() <= 122);
    }
}
