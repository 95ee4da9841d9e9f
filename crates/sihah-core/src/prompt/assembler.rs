//! Ordered message list for one model invocation.
//!
//! Layout:
//! ```text
//! SYSTEM     rendered template
//!            <language>Hebrew instruction</language>     (Hebrew input only)
//!            <knowledge><chunk ...>...</chunk></knowledge> (when chunks exist)
//! ...        trailing history window, oldest first, no SYSTEM entries
//! USER       the raw current input
//! ```
//!
//! When the total character count exceeds the budget, the oldest history
//! entries are dropped first, then the lowest-ranked knowledge chunks. The
//! rendered template and the current input are never truncated.

use sihah_types::agent::AgentConfig;
use sihah_types::analysis::TextAnalysis;
use sihah_types::chat::ConversationMessage;
use sihah_types::config::PipelineConfig;
use sihah_types::knowledge::ContextChunk;
use sihah_types::llm::{Message, MessageRole};

const HEBREW_INSTRUCTION: &str = "המשתמש כותב בעברית. ענה בעברית תקנית וברורה, \
    ושמור מונחים טכניים, שמות מוצרים ומספרים בכתיב המקורי שלהם.";

/// History and size limits for assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLimits {
    pub history_limit: usize,
    pub max_context_chars: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PromptLimits {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            history_limit: config.history_limit,
            max_context_chars: config.max_context_chars,
        }
    }
}

/// Builds the prompt for a turn. Pure: no I/O.
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn assemble(
        agent: &AgentConfig,
        analysis: &TextAnalysis,
        chunks: &[ContextChunk],
        history: &[ConversationMessage],
        user_input: &str,
        limits: PromptLimits,
    ) -> Vec<Message> {
        let base = Self::base_system(agent, analysis);

        let window: Vec<&ConversationMessage> = {
            let eligible: Vec<&ConversationMessage> = history
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .collect();
            let skip = eligible.len().saturating_sub(limits.history_limit);
            eligible.into_iter().skip(skip).collect()
        };

        let fixed = base.chars().count() + user_input.chars().count();
        let mut history_start = 0;
        let mut chunk_count = chunks.len();

        let total = |history_start: usize, chunk_count: usize| -> usize {
            fixed
                + Self::knowledge_section(&chunks[..chunk_count]).chars().count()
                + window[history_start..]
                    .iter()
                    .map(|m| m.content.chars().count())
                    .sum::<usize>()
        };

        while total(history_start, chunk_count) > limits.max_context_chars {
            if history_start < window.len() {
                history_start += 1;
            } else if chunk_count > 0 {
                chunk_count -= 1;
            } else {
                break;
            }
        }

        let mut messages = Vec::with_capacity(window.len() - history_start + 2);
        messages.push(Message::system(format!(
            "{base}{}",
            Self::knowledge_section(&chunks[..chunk_count])
        )));
        messages.extend(window[history_start..].iter().map(|m| Message {
            role: m.role,
            content: m.content.clone(),
        }));
        messages.push(Message::user(user_input));
        messages
    }

    fn base_system(agent: &AgentConfig, analysis: &TextAnalysis) -> String {
        let mut system = agent.render_system_prompt().trim().to_string();
        if analysis.is_hebrew() {
            system.push_str("\n\n<language>\n");
            system.push_str(HEBREW_INSTRUCTION);
            system.push_str("\n</language>");
        }
        system
    }

    fn knowledge_section(chunks: &[ContextChunk]) -> String {
        if chunks.is_empty() {
            return String::new();
        }
        let body: Vec<String> = chunks
            .iter()
            .map(|c| {
                format!(
                    "<chunk source=\"{}\" score=\"{:.3}\">\n{}\n</chunk>",
                    c.document_id,
                    c.score,
                    c.text.trim()
                )
            })
            .collect();
        format!(
            "\n\n<knowledge>\n\
            Use the following reference material when it is relevant. \
            Do not mention that it was provided to you.\n\
            {}\n\
            </knowledge>",
            body.join("\n")
        )
    }
}
