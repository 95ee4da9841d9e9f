//! Lexicon-based sentiment scoring for Hebrew and English.
//!
//! Tokens are matched against a small polarity lexicon after stripping
//! edge punctuation and, for Hebrew, up to two attached prefix letters
//! (ו ה ב ל מ ש כ). A negator within the two preceding tokens flips and
//! dampens a hit; an intensifier directly before or after a hit scales it.
//!
//! The raw sum `s` is squashed with `s / sqrt(s^2 + 15)`, which keeps the
//! score strictly inside `(-1, 1)`; it is clamped afterwards regardless.

use sihah_types::analysis::Sentiment;

use super::hebrew::is_hebrew_letter;

const NORMALIZATION_ALPHA: f32 = 15.0;
const NEGATION_FACTOR: f32 = -0.75;
const NEGATION_WINDOW: usize = 2;
const HEBREW_PREFIXES: [char; 7] = ['ו', 'ה', 'ב', 'ל', 'מ', 'ש', 'כ'];

const LEXICON: &[(&str, f32)] = &[
    // Hebrew, positive
    ("טוב", 2.0),
    ("טובה", 2.0),
    ("מצוין", 3.0),
    ("מצוינת", 3.0),
    ("מעולה", 3.0),
    ("נהדר", 3.0),
    ("נהדרת", 3.0),
    ("נפלא", 3.0),
    ("מושלם", 3.0),
    ("יופי", 2.0),
    ("תודה", 2.0),
    ("אוהב", 2.5),
    ("אוהבת", 2.5),
    ("שמח", 2.0),
    ("שמחה", 2.0),
    ("מרוצה", 2.0),
    ("מדהים", 3.0),
    ("כיף", 2.0),
    ("עזרת", 1.0),
    // Hebrew, negative
    ("רע", -2.0),
    ("רעה", -2.0),
    ("גרוע", -3.0),
    ("גרועה", -3.0),
    ("נורא", -3.0),
    ("נוראי", -3.0),
    ("זוועה", -3.0),
    ("שונא", -3.0),
    ("שונאת", -3.0),
    ("כועס", -2.0),
    ("כועסת", -2.0),
    ("עצוב", -2.0),
    ("מאוכזב", -2.5),
    ("מאוכזבת", -2.5),
    ("מתסכל", -2.0),
    ("בעיה", -1.0),
    ("תקלה", -2.0),
    ("איטי", -1.0),
    ("מבאס", -2.0),
    // English, positive
    ("good", 2.0),
    ("great", 3.0),
    ("excellent", 3.0),
    ("awesome", 3.0),
    ("perfect", 3.0),
    ("amazing", 3.0),
    ("thanks", 2.0),
    ("thank", 2.0),
    ("love", 2.5),
    ("happy", 2.0),
    ("helpful", 2.0),
    ("nice", 2.0),
    // English, negative
    ("bad", -2.0),
    ("terrible", -3.0),
    ("awful", -3.0),
    ("horrible", -3.0),
    ("hate", -3.0),
    ("angry", -2.0),
    ("sad", -2.0),
    ("disappointed", -2.5),
    ("frustrating", -2.0),
    ("problem", -1.0),
    ("broken", -2.0),
    ("slow", -1.0),
    ("useless", -2.5),
];

const NEGATORS: &[&str] = &[
    "לא", "אין", "אינו", "אינה", "איני", "בלי", "אף", "not", "no", "never", "don't", "dont",
    "isn't", "wasn't", "doesn't", "didn't",
];

const INTENSIFIERS: &[(&str, f32)] = &[
    ("מאוד", 1.5),
    ("ממש", 1.4),
    ("הכי", 1.6),
    ("לגמרי", 1.3),
    ("very", 1.5),
    ("really", 1.4),
    ("so", 1.3),
    ("extremely", 1.8),
    ("totally", 1.3),
];

fn lookup<'a>(table: &'a [(&'a str, f32)], word: &str) -> Option<f32> {
    table.iter().find(|(w, _)| *w == word).map(|(_, v)| *v)
}

/// Strip edge punctuation and lowercase.
fn clean(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .trim_matches('\'')
        .to_lowercase()
}

/// Candidate lexicon keys for a token: itself, then with one or two
/// Hebrew prefix letters removed (keeping at least two letters).
fn candidates(word: &str) -> Vec<String> {
    let mut out = vec![word.to_string()];
    let mut current: Vec<char> = word.chars().collect();
    for _ in 0..2 {
        let strippable = current.len() > 2
            && current.iter().all(|c| is_hebrew_letter(*c))
            && HEBREW_PREFIXES.contains(&current[0]);
        if !strippable {
            break;
        }
        current.remove(0);
        out.push(current.iter().collect());
    }
    out
}

fn polarity(word: &str) -> Option<f32> {
    candidates(word)
        .iter()
        .find_map(|w| lookup(LEXICON, w))
}

fn intensity(word: &str) -> Option<f32> {
    lookup(INTENSIFIERS, word)
}

fn is_negator(word: &str) -> bool {
    NEGATORS.contains(&word)
}

/// Score the sentiment of already-tokenized text.
pub fn score(tokens: &[String]) -> Sentiment {
    let words: Vec<String> = tokens.iter().map(|t| clean(t)).collect();
    let mut total = 0.0f32;
    let mut hits = 0usize;
    let mut last_hit: Option<(usize, f32)> = None;

    for (i, word) in words.iter().enumerate() {
        if word.is_empty() {
            continue;
        }

        if let Some(boost) = intensity(word) {
            // "טוב מאוד": the intensifier follows the word it scales.
            if let Some((idx, value)) = last_hit {
                if idx + 1 == i {
                    total += value * (boost - 1.0);
                    last_hit = None;
                }
            }
            continue;
        }

        let Some(mut value) = polarity(word) else {
            continue;
        };

        if i > 0 {
            if let Some(boost) = intensity(&words[i - 1]) {
                value *= boost;
            }
        }

        let lo = i.saturating_sub(NEGATION_WINDOW);
        if words[lo..i].iter().any(|w| is_negator(w)) {
            value *= NEGATION_FACTOR;
        }

        total += value;
        hits += 1;
        last_hit = Some((i, value));
    }

    let normalized = total / (total * total + NORMALIZATION_ALPHA).sqrt();
    let confidence = if hits == 0 {
        0.5
    } else {
        (0.6 + 0.1 * (hits as f32 - 1.0)).min(0.95)
    };
    Sentiment::from_score(normalized, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sihah_types::analysis::SentimentLabel;

    fn toks(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn positive_hebrew() {
        let s = score(&toks("השירות היה מצוין, תודה!"));
        assert_eq!(s.label, SentimentLabel::Positive);
        assert!(s.score > 0.2 && s.score <= 1.0);
    }

    #[test]
    fn negative_hebrew() {
        let s = score(&toks("אני מאוד מאוכזב מהשירות"));
        assert_eq!(s.label, SentimentLabel::Negative);
    }

    #[test]
    fn prefix_stripping_finds_word() {
        // "וטוב" = "and good"
        let s = score(&toks("וטוב"));
        assert!(s.score > 0.0);
    }

    #[test]
    fn negation_flips_polarity() {
        let plain = score(&toks("זה טוב"));
        let negated = score(&toks("זה לא טוב"));
        assert!(plain.score > 0.0);
        assert!(negated.score < 0.0);
    }

    #[test]
    fn trailing_intensifier_increases_magnitude() {
        let plain = score(&toks("טוב"));
        let boosted = score(&toks("טוב מאוד"));
        assert!(boosted.score > plain.score);
    }

    #[test]
    fn english_path() {
        assert_eq!(
            score(&toks("This is really terrible")).label,
            SentimentLabel::Negative
        );
        assert_eq!(
            score(&toks("great, thanks")).label,
            SentimentLabel::Positive
        );
    }

    #[test]
    fn no_hits_is_neutral_zero() {
        let s = score(&toks("מה השעה עכשיו"));
        assert_eq!(s.score, 0.0);
        assert_eq!(s.label, SentimentLabel::Neutral);
        assert!(s.confidence > 0.0);
    }

    #[test]
    fn score_always_bounded() {
        let extreme = "מצוין ".repeat(500);
        let s = score(&toks(&extreme));
        assert!(s.score <= 1.0 && s.score >= -1.0);
        let extreme = "נורא ".repeat(500);
        let s = score(&toks(&extreme));
        assert!(s.score <= 1.0 && s.score >= -1.0);
        assert_eq!(s.label, SentimentLabel::Negative);
    }

    #[test]
    fn balanced_hits_cancel_out() {
        let s = score(&toks("עזרת איטי"));
        assert_eq!(s.score, 0.0);
        assert_eq!(s.label, SentimentLabel::Neutral);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn word() -> impl Strategy<Value = String> {
            prop_oneof![
                prop::sample::select(vec![
                    "מצוין", "נורא", "טוב", "תודה", "לא", "מאוד", "ממש", "הכי", "great", "not",
                ])
                .prop_map(str::to_string),
                "\\PC{0,8}",
            ]
        }

        proptest! {
            #[test]
            fn score_is_bounded_for_any_tokens(tokens in prop::collection::vec(word(), 0..200)) {
                let s = score(&tokens);
                prop_assert!((-1.0..=1.0).contains(&s.score));
                prop_assert!((0.0..=1.0).contains(&s.confidence));
            }
        }
    }
}
