//! Directionality marks for mixed Hebrew/Latin text.
//!
//! In a right-to-left paragraph, embedded Latin words and digit runs can be
//! reordered visually together with neighbouring punctuation. Surrounding
//! each left-to-right run with LEFT-TO-RIGHT MARKs pins it in place.

/// U+200E LEFT-TO-RIGHT MARK.
pub const LRM: char = '\u{200E}';

#[derive(Clone, Copy, PartialEq, Eq)]
enum Run {
    Latin,
    Digit,
    Other,
}

fn classify(c: char) -> Run {
    if c.is_ascii_alphabetic() {
        Run::Latin
    } else if c.is_ascii_digit() {
        Run::Digit
    } else {
        Run::Other
    }
}

/// Wrap every maximal run of ASCII letters, and every maximal run of ASCII
/// digits, with an LRM on each side.
///
/// Existing LRMs are removed first, so the function is idempotent.
pub fn wrap_ltr_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut current = Run::Other;

    for c in text.chars().filter(|c| *c != LRM) {
        let kind = classify(c);
        if kind != current {
            if current != Run::Other {
                out.push(LRM);
            }
            if kind != Run::Other {
                out.push(LRM);
            }
            current = kind;
        }
        out.push(c);
    }
    if current != Run::Other {
        out.push(LRM);
    }
    out
}

/// Remove all LRM marks.
pub fn strip_marks(text: &str) -> String {
    text.chars().filter(|c| *c != LRM).collect()
}
