//! Hebrew script detection and normalization.
//!
//! Normalization runs three passes in a fixed order:
//! 1. collapse whitespace runs to a single space and trim
//! 2. replace Hebrew and typographic punctuation with ASCII equivalents
//! 3. correct medial letters at the end of a word to their final forms
//!
//! `normalize(normalize(x)) == normalize(x)` for every input.

/// Whether `c` lies in the Hebrew Unicode block (U+0590..U+05FF).
pub fn is_hebrew_char(c: char) -> bool {
    ('\u{0590}'..='\u{05FF}').contains(&c)
}

/// Whether `c` is a Hebrew letter (alef through tav, including finals).
pub fn is_hebrew_letter(c: char) -> bool {
    ('\u{05D0}'..='\u{05EA}').contains(&c)
}

/// Whether `c` is a Hebrew point or cantillation mark.
///
/// Marks attach to the preceding letter, so they belong to the word.
fn is_hebrew_mark(c: char) -> bool {
    matches!(c, '\u{0591}'..='\u{05BD}' | '\u{05BF}' | '\u{05C1}' | '\u{05C2}' | '\u{05C4}' | '\u{05C5}' | '\u{05C7}')
}

/// Whether the text contains any character from the Hebrew block.
pub fn contains_hebrew(text: &str) -> bool {
    text.chars().any(is_hebrew_char)
}

/// Collapse all whitespace runs (including newlines) to a single space and
/// trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace Hebrew gershayim/geresh/maqaf and curly quotes with ASCII.
pub fn normalize_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{05F4}' | '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
            '\u{05F3}' | '\u{2018}' | '\u{2019}' => '\'',
            '\u{05BE}' => '-',
            other => other,
        })
        .collect()
}

/// Final form of a medial letter, if it has one.
fn final_form(c: char) -> Option<char> {
    match c {
        'כ' => Some('ך'),
        'מ' => Some('ם'),
        'נ' => Some('ן'),
        'פ' => Some('ף'),
        'צ' => Some('ץ'),
        _ => None,
    }
}

/// Replace a medial כ/מ/נ/פ/צ at the end of a word with its final form.
///
/// A word is a maximal run of Hebrew letters (points included). Single
/// letter words are left alone, and trailing punctuation is not part of
/// the word, so `"מימ?"` becomes `"מים?"`.
pub fn fix_final_letters(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if !is_hebrew_letter(chars[i]) {
            i += 1;
            continue;
        }
        let mut letters = 0usize;
        let mut last_letter = i;
        let mut j = i;
        while j < chars.len() && (is_hebrew_letter(chars[j]) || is_hebrew_mark(chars[j])) {
            if is_hebrew_letter(chars[j]) {
                letters += 1;
                last_letter = j;
            }
            j += 1;
        }
        if letters > 1 {
            if let Some(fin) = final_form(chars[last_letter]) {
                chars[last_letter] = fin;
            }
        }
        i = j;
    }
    chars.into_iter().collect()
}

/// Full Hebrew normalization pipeline.
pub fn normalize(text: &str) -> String {
    fix_final_letters(&normalize_punctuation(&collapse_whitespace(text)))
}
