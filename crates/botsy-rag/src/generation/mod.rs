//! Answer generation with grounded prompts and citations

pub mod citation;
pub mod composer;
pub mod prompt;

pub use citation::{select_citations, truncate_snippet};
pub use composer::{AnswerComposer, ComposedAnswer};
pub use prompt::{BuiltPrompt, PromptBuilder};
