//! Response post-processing.
//!
//! Hebrew replies get LRM marks around embedded Latin and digit runs and are
//! then re-normalized. Suggested actions are pulled from a fixed set of
//! interrogative offers ("would you like me to ...?", "האם תרצה ש...?").
//! Confidence starts from a base value and drops when the reply hedges.
//! Both are computed on the unmarked text; only the persisted reply keeps
//! the marks.

use std::sync::LazyLock;

use regex::Regex;

use crate::text::{bidi, hebrew};

const BASE_CONFIDENCE: f32 = 0.85;
const HEDGED_CONFIDENCE: f32 = 0.5;
const EMPTY_CONFIDENCE: f32 = 0.1;
const MAX_ACTIONS: usize = 5;

const HEDGES: &[&str] = &[
    "i'm not sure",
    "i am not sure",
    "i don't know",
    "i do not know",
    "not certain",
    "perhaps",
    "maybe",
    "אני לא בטוח",
    "אני לא בטוחה",
    "לא ברור לי",
    "איני יודע",
    "איני יודעת",
    "אני לא יודע",
    "אני לא יודעת",
    "ייתכן",
    "אולי",
];

static ACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)would you like me to ([^?.!\n]+)\?",
        r"(?i)do you want me to ([^?.!\n]+)\?",
        r"(?i)shall i ([^?.!\n]+)\?",
        r"(?i)should i ([^?.!\n]+)\?",
        r"(?:האם )?(?:תרצה|תרצי|תרצו|תרצה/י) ש([^?.!\n]+)\?",
        r"(?:האם )?(?:אתה|את|אתם) רוצה ש([^?.!\n]+)\?",
        r"(?:האם )?להמשיך ל([^?.!\n]+)\?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid action regex"))
    .collect()
});

/// Output of post-processing a raw model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedReply {
    pub text: String,
    /// In `(0, 1]`.
    pub confidence: f32,
    pub suggested_actions: Vec<String>,
}

/// Post-process a raw reply.
pub fn post_process(raw: &str, is_hebrew: bool) -> ProcessedReply {
    let text = if is_hebrew {
        hebrew::normalize(&bidi::wrap_ltr_runs(raw))
    } else {
        raw.trim().to_string()
    };

    let plain = bidi::strip_marks(&text);
    ProcessedReply {
        confidence: confidence(&plain),
        suggested_actions: suggested_actions(&plain),
        text,
    }
}

/// Offers the reply makes to the user, in order of appearance, deduplicated.
pub fn suggested_actions(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = ACTION_PATTERNS
        .iter()
        .flat_map(|re| {
            re.captures_iter(text).filter_map(|caps| {
                let whole = caps.get(0)?;
                let action = caps.get(1)?.as_str().trim();
                (!action.is_empty()).then(|| (whole.start(), action.to_string()))
            })
        })
        .collect();
    found.sort_by_key(|(pos, _)| *pos);

    let mut actions: Vec<String> = Vec::new();
    for (_, action) in found {
        if !actions.contains(&action) {
            actions.push(action);
        }
        if actions.len() == MAX_ACTIONS {
            break;
        }
    }
    actions
}

/// Heuristic confidence in `(0, 1]`.
pub fn confidence(text: &str) -> f32 {
    let plain = bidi::strip_marks(text);
    if plain.trim().is_empty() {
        return EMPTY_CONFIDENCE;
    }
    let lower = plain.to_lowercase();
    if HEDGES.iter().any(|h| lower.contains(h)) {
        HEDGED_CONFIDENCE
    } else {
        BASE_CONFIDENCE
    }
}
