//! Result of processing one conversation turn.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{Language, SentimentLabel};

/// Reply produced for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub conversation_id: Uuid,
    pub reply: String,
    /// In `(0, 1]`.
    pub confidence: f32,
    pub suggested_actions: Vec<String>,
    pub processing: TurnProcessingInfo,
}

/// Processing metadata recorded alongside the assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnProcessingInfo {
    /// Model that actually produced the reply.
    pub model: String,
    /// True when the requested model was unknown and the default was used.
    pub fell_back: bool,
    pub attempts: u32,
    pub context_chunks: usize,
    /// True when retrieval failed and the turn proceeded without context.
    pub retrieval_degraded: bool,
    pub language: Option<Language>,
    pub sentiment: Option<SentimentLabel>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
    pub user_message_id: Option<Uuid>,
    pub assistant_message_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_result_serialize() {
        let result = TurnResult {
            conversation_id: Uuid::now_v7(),
            reply: "שלום".into(),
            confidence: 0.8,
            suggested_actions: vec!["book a meeting".into()],
            processing: TurnProcessingInfo {
                model: "gpt-4o-mini".into(),
                attempts: 1,
                language: Some(Language::Hebrew),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["processing"]["language"], "hebrew");
        assert_eq!(json["processing"]["fell_back"], false);
        assert_eq!(json["suggested_actions"][0], "book a meeting");
    }
}
