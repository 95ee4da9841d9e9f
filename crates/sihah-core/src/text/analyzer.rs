//! Utterance analysis: language detection, normalization, tokenization,
//! entities, and sentiment.
//!
//! `LanguageAnalyzer` is the pluggable seam; `HebrewAnalyzer` is the built-in
//! rule-based implementation. The pipeline calls [`analyze_or_neutral`],
//! which never fails.

use sihah_types::analysis::{Language, TextAnalysis};
use sihah_types::error::AnalysisError;
use tracing::{debug, warn};

use super::{entities, hebrew, sentiment};

/// Inputs longer than this are not analyzed.
pub const MAX_ANALYSIS_CHARS: usize = 16_000;

/// A language analysis provider.
///
/// Implementations must be pure: the same input yields the same analysis.
pub trait LanguageAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(&self, raw: &str) -> Result<TextAnalysis, AnalysisError>;
}

/// Rule-based analyzer for Hebrew input.
///
/// Input without any Hebrew character takes the default path: it is
/// returned unnormalized with whitespace tokens and a neutral analysis.
#[derive(Debug, Default, Clone)]
pub struct HebrewAnalyzer;

impl HebrewAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl LanguageAnalyzer for HebrewAnalyzer {
    fn name(&self) -> &str {
        "hebrew-rules"
    }

    fn analyze(&self, raw: &str) -> Result<TextAnalysis, AnalysisError> {
        let len = raw.chars().count();
        if len > MAX_ANALYSIS_CHARS {
            return Err(AnalysisError::Provider(format!(
                "input of {len} chars exceeds the {MAX_ANALYSIS_CHARS} char limit"
            )));
        }

        if !hebrew::contains_hebrew(raw) {
            return Ok(TextAnalysis::neutral(raw));
        }

        let normalized = hebrew::normalize(raw);
        let tokens: Vec<String> = normalized
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let entities = entities::recognize(&normalized);
        let sentiment = sentiment::score(&tokens);

        Ok(TextAnalysis {
            normalized,
            tokens,
            language: Language::Hebrew,
            entities,
            sentiment,
        })
    }
}

/// Run `analyzer`, degrading to the neutral analysis on failure.
pub fn analyze_or_neutral(analyzer: &dyn LanguageAnalyzer, raw: &str) -> TextAnalysis {
    match analyzer.analyze(raw) {
        Ok(analysis) => {
            debug!(
                analyzer = analyzer.name(),
                language = analysis.language.code(),
                tokens = analysis.tokens.len(),
                entities = analysis.entities.len(),
                sentiment = analysis.sentiment.score,
                "Analyzed utterance"
            );
            analysis
        }
        Err(e) => {
            warn!(analyzer = analyzer.name(), error = %e, "Text analysis failed, using neutral analysis");
            TextAnalysis::neutral(raw)
        }
    }
}
