//! Answer composition: greeting shortcut, grounded generation and citations

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{CitationPolicy, ComposerConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::providers::llm::{ChatPrompt, LlmProvider};
use crate::types::{Bot, ChatTurn, CitedSource, ReplyOutcome, ScoredChunk, TurnInput};

use super::citation::select_citations;
use super::prompt::PromptBuilder;

const GREETING_WORDS: &[&str] = &["hi", "hello", "hey", "hiya", "greetings"];
const GREETING_TIMES: &[&str] = &["morning", "afternoon", "evening"];

/// Composed answer for one turn
#[derive(Debug, Clone)]
pub struct ComposedAnswer {
    pub answer_text: String,
    pub cited_sources: Vec<CitedSource>,
    pub outcome: ReplyOutcome,
}

impl ComposedAnswer {
    fn plain(answer_text: impl Into<String>, outcome: ReplyOutcome) -> Self {
        Self {
            answer_text: answer_text.into(),
            cited_sources: Vec::new(),
            outcome,
        }
    }
}

/// Turns retrieved context into a cited answer
pub struct AnswerComposer {
    llm: Arc<dyn LlmProvider>,
    prompts: PromptBuilder,
    citation_policy: CitationPolicy,
    max_citations: usize,
    snippet_chars: usize,
    greeting_shortcut: bool,
    no_context_answer: String,
    fallback_answer: String,
    llm_timeout: Duration,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn LlmProvider>, composer: &ComposerConfig, llm_config: &LlmConfig) -> Self {
        Self {
            llm,
            prompts: PromptBuilder::new(composer),
            citation_policy: composer.citation_policy,
            max_citations: composer.max_citations,
            snippet_chars: composer.snippet_chars,
            greeting_shortcut: composer.greeting_shortcut,
            no_context_answer: composer.no_context_answer.clone(),
            fallback_answer: composer.fallback_answer.clone(),
            llm_timeout: Duration::from_secs(llm_config.timeout_secs),
        }
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    /// Apology returned when retrieval or generation fails
    pub fn fallback(&self) -> ComposedAnswer {
        ComposedAnswer::plain(self.fallback_answer.clone(), ReplyOutcome::Fallback)
    }

    /// Canned reply for short greetings; `None` means retrieve and compose
    pub fn shortcut(&self, bot: &Bot, input: &TurnInput) -> Option<ComposedAnswer> {
        if !self.greeting_shortcut || !is_greeting(&input.effective_prompt) {
            return None;
        }
        Some(ComposedAnswer::plain(bot.greeting(), ReplyOutcome::Greeting))
    }

    /// Compose an answer from retrieved chunks.
    ///
    /// Model failures never surface as errors: they are logged and the
    /// configured apology is returned with outcome `Fallback`.
    pub async fn compose(
        &self,
        bot: &Bot,
        history: &[ChatTurn],
        retrieved: &[ScoredChunk],
        input: &TurnInput,
    ) -> ComposedAnswer {
        if let Some(greeting) = self.shortcut(bot, input) {
            return greeting;
        }

        if retrieved.is_empty() {
            tracing::debug!("No context for bot {}, skipping generation", bot.id);
            return ComposedAnswer::plain(self.no_context_answer.clone(), ReplyOutcome::NoContext);
        }

        let built = self.prompts.build(
            bot.system_prompt.as_deref(),
            history,
            retrieved,
            &input.effective_prompt,
        );
        let context = &retrieved[..built.context_chunks];

        let start = Instant::now();
        match self.generate(&built.prompt).await {
            Ok(answer) => {
                let cited_sources = select_citations(
                    &answer,
                    context,
                    self.citation_policy,
                    self.max_citations,
                    self.snippet_chars,
                );
                tracing::info!(
                    "Generated answer for bot {} with {} ({}ms, {} context chunks, {} citations)",
                    bot.id,
                    self.llm.name(),
                    start.elapsed().as_millis(),
                    context.len(),
                    cited_sources.len()
                );
                ComposedAnswer {
                    answer_text: answer,
                    cited_sources,
                    outcome: ReplyOutcome::Answered,
                }
            }
            Err(e) => {
                tracing::error!(
                    "Generation failed for bot {} [{}]: {}",
                    bot.id,
                    e.reason_code(),
                    e
                );
                self.fallback()
            }
        }
    }

    async fn generate(&self, prompt: &ChatPrompt) -> Result<String> {
        let answer = tokio::time::timeout(self.llm_timeout, self.llm.complete(prompt))
            .await
            .map_err(|_| Error::Timeout {
                operation: "generation",
                secs: self.llm_timeout.as_secs(),
            })??;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::generation("model returned an empty answer"));
        }
        Ok(answer.to_string())
    }
}

/// Three words or fewer, opening with a greeting
pub fn is_greeting(message: &str) -> bool {
    let words: Vec<String> = message
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() || words.len() > 3 {
        return false;
    }

    GREETING_WORDS.contains(&words[0].as_str())
        || (words[0] == "good"
            && words
                .get(1)
                .is_some_and(|w| GREETING_TIMES.contains(&w.as_str())))
}
