//! Turn-level spans shared by the HTTP handlers and the interactive CLI.

use std::future::Future;

use tracing::{Instrument, Span, info_span};
use uuid::Uuid;

use sihah_observe::genai_attrs::{
    GEN_AI_AGENT_ID, GEN_AI_CONVERSATION_ID, GEN_AI_OPERATION_NAME, GEN_AI_REQUEST_MODEL,
    GEN_AI_RESPONSE_MODEL, GEN_AI_USAGE_INPUT_TOKENS, GEN_AI_USAGE_OUTPUT_TOKENS,
    OP_INVOKE_AGENT,
};
use sihah_types::agent::AgentConfig;
use sihah_types::error::TurnError;
use sihah_types::turn::TurnResult;

/// Span covering one agent turn. Usage and response fields are filled in by
/// [`record_turn`].
pub fn turn_span(conversation_id: Uuid, agent: &AgentConfig) -> Span {
    let span = info_span!(
        "invoke_agent",
        otel.name = %format!("{OP_INVOKE_AGENT} {}", agent.name),
        gen_ai.operation.name = tracing::field::Empty,
        gen_ai.conversation.id = tracing::field::Empty,
        gen_ai.agent.id = tracing::field::Empty,
        gen_ai.request.model = tracing::field::Empty,
        gen_ai.response.model = tracing::field::Empty,
        gen_ai.usage.input_tokens = tracing::field::Empty,
        gen_ai.usage.output_tokens = tracing::field::Empty,
    );
    span.record(GEN_AI_OPERATION_NAME, OP_INVOKE_AGENT);
    span.record(GEN_AI_CONVERSATION_ID, conversation_id.to_string());
    span.record(GEN_AI_AGENT_ID, agent.agent_id.to_string());
    span.record(GEN_AI_REQUEST_MODEL, agent.model.as_str());
    span
}

/// Record the outcome of a successful turn on its span.
pub fn record_turn(span: &Span, result: &TurnResult) {
    span.record(GEN_AI_RESPONSE_MODEL, result.processing.model.as_str());
    span.record(GEN_AI_USAGE_INPUT_TOKENS, result.processing.input_tokens);
    span.record(GEN_AI_USAGE_OUTPUT_TOKENS, result.processing.output_tokens);
}

/// Run a turn future inside a fresh turn span.
pub async fn traced_turn<F>(
    conversation_id: Uuid,
    agent: &AgentConfig,
    turn: F,
) -> Result<TurnResult, TurnError>
where
    F: Future<Output = Result<TurnResult, TurnError>>,
{
    let span = turn_span(conversation_id, agent);
    let result = turn.instrument(span.clone()).await;
    if let Ok(r) = &result {
        record_turn(&span, r);
    }
    result
}
