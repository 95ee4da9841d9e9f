//! Pattern-based entity recognition.
//!
//! Each recognizer runs independently over the normalized text, so a date
//! such as `12.03.2024` may also be reported as a NUMBER. Overlapping spans
//! are kept; results are ordered by start offset, then by kind.
//!
//! Offsets are character offsets into the text that was scanned.

use std::sync::LazyLock;

use regex::Regex;
use sihah_types::analysis::{Entity, EntityKind};

use super::hebrew::is_hebrew_letter;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9][A-Za-z0-9._%+-]*@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}")
        .expect("valid email regex")
});

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}|\d{1,2}[./-]\d{1,2}[./-](?:\d{4}|\d{2})")
        .expect("valid date regex")
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)*%?").expect("valid number regex"));

static LATIN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Z][a-z]+(?:[ ][A-Z][a-z]+)+").expect("valid latin name regex")
});

static HONORIFIC_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:מר|גברת|גב'|ד"ר|פרופ'|הרב|עו"ד)[ ][א-ת]{2,}"#)
        .expect("valid honorific regex")
});

const EMAIL_CONFIDENCE: f32 = 0.95;
const DATE_CONFIDENCE: f32 = 0.9;
const NUMBER_CONFIDENCE: f32 = 0.8;
const PERSON_CONFIDENCE: f32 = 0.6;

/// Recognize entities in `text`.
pub fn recognize(text: &str) -> Vec<Entity> {
    let mut entities = Vec::new();

    collect(text, &EMAIL, EntityKind::Email, EMAIL_CONFIDENCE, |c| {
        c.is_ascii_alphanumeric()
    }, &mut entities);
    collect(text, &DATE, EntityKind::Date, DATE_CONFIDENCE, |c| {
        c.is_ascii_digit()
    }, &mut entities);
    collect(text, &NUMBER, EntityKind::Number, NUMBER_CONFIDENCE, |c| {
        c.is_ascii_digit() || c.is_ascii_alphabetic()
    }, &mut entities);
    collect(text, &LATIN_NAME, EntityKind::Person, PERSON_CONFIDENCE, |c| {
        c.is_ascii_alphabetic()
    }, &mut entities);
    collect(text, &HONORIFIC_NAME, EntityKind::Person, PERSON_CONFIDENCE, is_hebrew_letter, &mut entities);

    entities.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(a.end.cmp(&b.end))
            .then(a.kind.to_string().cmp(&b.kind.to_string()))
    });
    entities
}

/// Push every match of `re` that is not glued to a neighbouring character
/// for which `joins` holds.
///
/// The regex crate has no lookaround, so boundaries are checked here.
fn collect(
    text: &str,
    re: &Regex,
    kind: EntityKind,
    confidence: f32,
    joins: impl Fn(char) -> bool,
    out: &mut Vec<Entity>,
) {
    for m in re.find_iter(text) {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        if before.is_some_and(&joins) || after.is_some_and(&joins) {
            continue;
        }
        let start = text[..m.start()].chars().count();
        let end = start + m.as_str().chars().count();
        out.push(Entity {
            kind,
            text: m.as_str().to_string(),
            start,
            end,
            confidence,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(entities: &[Entity]) -> Vec<EntityKind> {
        entities.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn finds_date_with_hebrew_prefix() {
        let text = "הפגישה ב-12/03/2024 בבוקר";
        let entities = recognize(text);
        let date = entities.iter().find(|e| e.kind == EntityKind::Date).unwrap();
        assert_eq!(date.text, "12/03/2024");
        let chars: Vec<char> = text.chars().collect();
        let span: String = chars[date.start..date.end].iter().collect();
        assert_eq!(span, "12/03/2024");
    }

    #[test]
    fn overlapping_number_reported_independently() {
        let entities = recognize("2024-05-01");
        assert!(kinds(&entities).contains(&EntityKind::Date));
        assert!(kinds(&entities).contains(&EntityKind::Number));
        let date = entities.iter().find(|e| e.kind == EntityKind::Date).unwrap();
        assert_eq!((date.start, date.end), (0, 10));
    }

    #[test]
    fn number_with_decimal_and_percent() {
        let entities = recognize("הנחה של 12.5% היום");
        let num = entities
            .iter()
            .find(|e| e.kind == EntityKind::Number)
            .unwrap();
        assert_eq!(num.text, "12.5%");
        assert_eq!(num.start, 8);
    }

    #[test]
    fn honorific_led_hebrew_name() {
        let entities = recognize("קבעתי תור אצל ד\"ר כהן מחר");
        let person = entities
            .iter()
            .find(|e| e.kind == EntityKind::Person)
            .unwrap();
        assert_eq!(person.text, "ד\"ר כהן");
    }

    #[test]
    fn honorific_inside_word_is_ignored() {
        // "תמר" ends with "מר" but is a name, not an honorific.
        let entities = recognize("תמר לוי");
        assert!(!kinds(&entities).contains(&EntityKind::Person));
    }

    #[test]
    fn capitalized_multiword_latin_name() {
        let entities = recognize("I spoke with Dana Levi yesterday");
        let person = entities
            .iter()
            .find(|e| e.kind == EntityKind::Person)
            .unwrap();
        assert_eq!(person.text, "Dana Levi");
        assert_eq!(person.start, 13);
    }

    #[test]
    fn email_detected() {
        let entities = recognize("כתבו ל-info@example.co.il בבקשה");
        let email = entities
            .iter()
            .find(|e| e.kind == EntityKind::Email)
            .unwrap();
        assert_eq!(email.text, "info@example.co.il");
    }

    #[test]
    fn confidences_in_range_and_sorted() {
        let entities = recognize("מר לוי שילם 300 ב-01/02/2025, Dana Levi אישרה");
        assert!(!entities.is_empty());
        for e in &entities {
            assert!(e.confidence > 0.0 && e.confidence <= 1.0);
            assert!(e.start < e.end);
        }
        assert!(entities.windows(2).all(|w| w[0].start <= w[1].start));
    }

    #[test]
    fn plain_text_has_no_entities() {
        assert!(recognize("שלום מה שלומך").is_empty());
    }
}
