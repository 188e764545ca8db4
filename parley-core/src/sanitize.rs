//! Shell-metacharacter stripping for text that may become a command token.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

// Expansions go first so their contents are dropped along with the markers.
static SUBSHELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\([^)]*\)?").expect("static regex"));
static BRACE_EXPANSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{[^}]*\}?").expect("static regex"));
static BACKTICK_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]*`").expect("static regex"));

const FORBIDDEN_CHARS: &[char] = &[';', '|', '&', '`', '\n', '\r'];

/// Remove sequences that could escape a shell-command context.
///
/// Returns the input borrowed when nothing needed stripping.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if !needs_sanitizing(text) {
        return Cow::Borrowed(text);
    }

    let stripped = SUBSHELL.replace_all(text, " ");
    let stripped = BRACE_EXPANSION.replace_all(&stripped, " ");
    let stripped = BACKTICK_SPAN.replace_all(&stripped, " ");
    let stripped: String = stripped
        .chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) { ' ' } else { c })
        .collect();

    Cow::Owned(crate::types::collapse_whitespace(&stripped))
}

fn needs_sanitizing(text: &str) -> bool {
    text.contains(FORBIDDEN_CHARS) || text.contains("$(") || text.contains("${")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_borrowed() {
        let out = sanitize("deploy JUDO");
        assert!(matches!(out, Cow::Borrowed("deploy JUDO")));
    }

    #[test]
    fn empty_input_is_unchanged() {
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn strips_command_chaining() {
        assert_eq!(sanitize("deploy JUDO; rm -rf /"), "deploy JUDO rm -rf /");
        assert_eq!(sanitize("status | sh"), "status sh");
        assert_eq!(sanitize("logs && reboot"), "logs reboot");
    }

    #[test]
    fn strips_substitutions() {
        assert_eq!(sanitize("deploy $(whoami)"), "deploy");
        assert_eq!(sanitize("deploy `cat /etc/passwd` now"), "deploy now");
        assert_eq!(sanitize("deploy ${HOME}"), "deploy");
    }

    #[test]
    fn unterminated_substitution_is_removed() {
        assert_eq!(sanitize("deploy $(curl evil"), "deploy");
        assert_eq!(sanitize("deploy `id"), "deploy id");
    }

    #[test]
    fn newlines_become_spaces() {
        assert_eq!(sanitize("deploy\nJUDO"), "deploy JUDO");
    }
}
