//! Text analysis results produced by the normalizer/analyzer.
//!
//! A `TextAnalysis` is derived from one utterance, never persisted and
//! never mutated after construction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Detected language of an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Hebrew,
    Other,
}

impl Language {
    pub fn is_hebrew(self) -> bool {
        self == Language::Hebrew
    }

    /// Short language tag, as used in prompt hints and span attributes.
    pub fn code(self) -> &'static str {
        match self {
            Language::Hebrew => "he",
            Language::Other => "und",
        }
    }
}

/// Kind of a recognized entity span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Date,
    Number,
    Person,
    Email,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Date => write!(f, "DATE"),
            EntityKind::Number => write!(f, "NUMBER"),
            EntityKind::Person => write!(f, "PERSON"),
            EntityKind::Email => write!(f, "EMAIL"),
        }
    }
}

/// A typed span in the normalized text.
///
/// `start`/`end` are character (not byte) offsets, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
}

/// Polarity label derived from the sentiment score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

/// Threshold above which a score is labeled positive (and below whose
/// negation it is labeled negative). The boundary itself is neutral.
pub const SENTIMENT_THRESHOLD: f32 = 0.2;

impl SentimentLabel {
    pub fn from_score(score: f32) -> Self {
        if score > SENTIMENT_THRESHOLD {
            SentimentLabel::Positive
        } else if score < -SENTIMENT_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

/// Scalar sentiment in `[-1, 1]` with its label and confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub score: f32,
    pub label: SentimentLabel,
    pub confidence: f32,
}

impl Sentiment {
    /// Build a sentiment from a raw score, clamping it into `[-1, 1]`.
    pub fn from_score(score: f32, confidence: f32) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(-1.0, 1.0) };
        Self {
            score,
            label: SentimentLabel::from_score(score),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn neutral() -> Self {
        Self {
            score: 0.0,
            label: SentimentLabel::Neutral,
            confidence: 0.0,
        }
    }
}

/// Result of analyzing one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    pub normalized: String,
    pub tokens: Vec<String>,
    pub language: Language,
    pub entities: Vec<Entity>,
    pub sentiment: Sentiment,
}

impl TextAnalysis {
    /// The degraded analysis: original text, whitespace tokens, no
    /// entities, neutral sentiment.
    pub fn neutral(raw: &str) -> Self {
        Self {
            normalized: raw.to_string(),
            tokens: raw.split_whitespace().map(str::to_string).collect(),
            language: Language::Other,
            entities: Vec::new(),
            sentiment: Sentiment::neutral(),
        }
    }

    pub fn is_hebrew(&self) -> bool {
        self.language.is_hebrew()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_thresholds_are_exclusive() {
        assert_eq!(SentimentLabel::from_score(0.2), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.2), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(0.21), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(-0.21), SentimentLabel::Negative);
        assert_eq!(SentimentLabel::from_score(0.0), SentimentLabel::Neutral);
    }

    #[test]
    fn test_sentiment_clamps_score() {
        assert_eq!(Sentiment::from_score(3.5, 0.9).score, 1.0);
        assert_eq!(Sentiment::from_score(-7.0, 0.9).score, -1.0);
        assert_eq!(Sentiment::from_score(f32::NAN, 0.9).score, 0.0);
    }

    #[test]
    fn test_neutral_analysis_keeps_original_text() {
        let a = TextAnalysis::neutral("  hello   world ");
        assert_eq!(a.normalized, "  hello   world ");
        assert_eq!(a.tokens, vec!["hello", "world"]);
        assert_eq!(a.language, Language::Other);
        assert!(a.entities.is_empty());
        assert_eq!(a.sentiment.label, SentimentLabel::Neutral);
    }

    #[test]
    fn test_entity_kind_serde() {
        let json = serde_json::to_string(&EntityKind::Person).unwrap();
        assert_eq!(json, "\"PERSON\"");
    }
}
