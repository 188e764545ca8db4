//! Bounded typo correction for command verbs.
//!
//! Only the word in command position is ever corrected, and short words get
//! a tighter edit budget so "ls" or "do" never turn into commands.

use strsim::levenshtein;

/// Politeness prefixes skipped when looking for the command word.
const LEADING_FILLERS: &[&str] = &[
    "please", "pls", "plz", "kindly", "hey", "ok", "okay", "so", "now", "just",
];

const LEADING_PHRASES: &[&str] = &[
    "can you",
    "could you",
    "would you",
    "will you",
    "go ahead and",
    "i need you to",
    "i want you to",
];

/// A single-word correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub original: String,
    pub corrected: &'static str,
    pub distance: usize,
    /// Text with the word replaced
    pub text: String,
}

/// Edits allowed for a token of `len` characters.
pub fn allowed_edits(len: usize, max_distance: usize) -> usize {
    match len {
        0..=2 => 0,
        3..=4 => max_distance.min(1),
        _ => max_distance,
    }
}

/// Closest vocabulary word to `token` within the allowed edit distance.
///
/// Ties go to the earlier vocabulary entry. Exact matches return `None`.
pub fn correct_token(
    token: &str,
    vocabulary: &[&'static str],
    max_distance: usize,
) -> Option<(&'static str, usize)> {
    let token = token.to_lowercase();
    let len = token.chars().count();
    let budget = allowed_edits(len, max_distance);
    if budget == 0 || vocabulary.contains(&token.as_str()) {
        return None;
    }

    let mut best: Option<(&'static str, usize)> = None;
    for &candidate in vocabulary {
        if candidate.chars().count().abs_diff(len) > max_distance {
            continue;
        }
        let distance = levenshtein(&token, candidate);
        if distance == 0 || distance > budget {
            continue;
        }
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }
    best
}

/// Byte offset of the command-position word in `text`.
pub fn command_position(text: &str) -> Option<(usize, usize)> {
    let mut offset = 0;

    loop {
        let rest = &text[offset..];
        let trimmed = rest.trim_start();
        let start = offset + (rest.len() - trimmed.len());
        if trimmed.is_empty() {
            return None;
        }

        if let Some(phrase) = LEADING_PHRASES.iter().find(|p| {
            trimmed
                .get(..p.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(p))
                && is_word_end(&trimmed[p.len()..])
        }) {
            offset = start + phrase.len();
            continue;
        }

        let end = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let word = trimmed[..end].trim_end_matches([',', '!', '.']);
        if LEADING_FILLERS.contains(&word.to_lowercase().as_str()) {
            offset = start + end;
            continue;
        }
        return Some((start, start + word.len()));
    }
}

fn is_word_end(rest: &str) -> bool {
    rest.chars().next().map_or(true, |c| !c.is_alphanumeric())
}

/// Correct the command-position word of `text`, if it is a near miss.
pub fn correct_leading_verb(
    text: &str,
    vocabulary: &[&'static str],
    max_distance: usize,
) -> Option<Correction> {
    let (start, end) = command_position(text)?;
    let word = &text[start..end];
    if !word.chars().all(char::is_alphabetic) {
        return None;
    }

    let (corrected, distance) = correct_token(word, vocabulary, max_distance)?;
    let mut fixed = String::with_capacity(text.len());
    fixed.push_str(&text[..start]);
    fixed.push_str(corrected);
    fixed.push_str(&text[end..]);

    tracing::debug!(from = word, to = corrected, distance, "Corrected command word");
    Some(Correction {
        original: word.to_string(),
        corrected,
        distance,
        text: fixed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOCAB: &[&str] = &["deploy", "status", "restart", "test", "logs", "run", "build"];

    #[test]
    fn edit_budget_scales_with_length() {
        assert_eq!(allowed_edits(2, 2), 0);
        assert_eq!(allowed_edits(3, 2), 1);
        assert_eq!(allowed_edits(4, 2), 1);
        assert_eq!(allowed_edits(6, 2), 2);
        assert_eq!(allowed_edits(6, 1), 1);
    }

    #[test]
    fn corrects_near_misses() {
        assert_eq!(correct_token("deplyo", VOCAB, 2), Some(("deploy", 2)));
        assert_eq!(correct_token("stauts", VOCAB, 2), Some(("status", 2)));
        assert_eq!(correct_token("restrat", VOCAB, 2), Some(("restart", 2)));
        assert_eq!(correct_token("tst", VOCAB, 2), Some(("test", 1)));
    }

    #[test]
    fn short_tokens_never_corrected() {
        assert_eq!(correct_token("ru", VOCAB, 2), None);
        assert_eq!(correct_token("ls", VOCAB, 2), None);
    }

    #[test]
    fn four_letter_tokens_allow_one_edit() {
        assert_eq!(correct_token("tets", VOCAB, 2), None);
        assert_eq!(correct_token("logz", VOCAB, 2), Some(("logs", 1)));
    }

    #[test]
    fn length_difference_guard() {
        assert_eq!(correct_token("deplo", VOCAB, 0), None);
        assert_eq!(correct_token("restartingnow", VOCAB, 2), None);
    }

    #[test]
    fn exact_words_untouched() {
        assert_eq!(correct_token("deploy", VOCAB, 2), None);
        assert_eq!(correct_token("banana", VOCAB, 2), None);
    }

    #[test]
    fn corrects_only_command_position() {
        let fixed = correct_leading_verb("please deplyo JUDO", VOCAB, 2).unwrap();
        assert_eq!(fixed.text, "please deploy JUDO");
        assert_eq!(fixed.original, "deplyo");

        let fixed = correct_leading_verb("can you stauts JUDO", VOCAB, 2).unwrap();
        assert_eq!(fixed.text, "can you status JUDO");

        assert_eq!(correct_leading_verb("the deplyo failed", VOCAB, 2), None);
    }
}
