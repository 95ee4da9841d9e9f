//! OpenTelemetry GenAI Semantic Convention attribute constants.
//!
//! Usable as field names in `Span::record`. A span must declare the field
//! (as `tracing::field::Empty`) under the same dotted name for the record
//! to take effect.

// --- Required attributes ---

/// The name of the operation being performed (e.g., "invoke_agent").
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

// --- Recommended attributes ---

/// The model ID requested.
pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";

/// The model ID that actually served the response.
pub const GEN_AI_RESPONSE_MODEL: &str = "gen_ai.response.model";

/// The number of input tokens consumed.
pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";

/// The number of output tokens generated.
pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

/// The unique identifier of a conversation (session, thread).
pub const GEN_AI_CONVERSATION_ID: &str = "gen_ai.conversation.id";

// --- Agent-specific attributes ---

/// The unique identifier of the agent.
pub const GEN_AI_AGENT_ID: &str = "gen_ai.agent.id";

// --- Operation name values ---

/// Agent invocation operation (one conversation turn).
pub const OP_INVOKE_AGENT: &str = "invoke_agent";
