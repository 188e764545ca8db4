//! Passthrough guards
//!
//! Casual chat must never be turned into a command: a wrong side effect costs
//! far more than a missed command the user can simply repeat. These checks run
//! before any pattern or classifier logic and err on the side of passing the
//! message through untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which guard short-circuited a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassthroughReason {
    Empty,
    Greeting,
    Thanks,
    Acknowledgment,
    Question,
    CodingInstruction,
    ConversationalBuild,
    /// Nothing resolved; the message goes to the AI responder as-is.
    Unresolved,
}

impl PassthroughReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassthroughReason::Empty => "empty",
            PassthroughReason::Greeting => "greeting",
            PassthroughReason::Thanks => "thanks",
            PassthroughReason::Acknowledgment => "acknowledgment",
            PassthroughReason::Question => "question",
            PassthroughReason::CodingInstruction => "coding_instruction",
            PassthroughReason::ConversationalBuild => "conversational_build",
            PassthroughReason::Unresolved => "unresolved",
        }
    }
}

static GREETING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:hi|hello|hey|heya|hiya|yo|howdy|sup|hola|greetings|good\s+(?:morning|afternoon|evening|night)|what'?s\s+up|whats\s+up)\b",
    )
    .expect("static regex")
});

static THANKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:thanks|thank\s+you|thx|ty|tysm|cheers|much\s+appreciated|appreciate\s+it)\b")
        .expect("static regex")
});

static CODING_INSTRUCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:please\s+)?(?:can\s+you\s+|could\s+you\s+)?(?:add|implement|write|create|refactor|fix|update|change|make|build|design|style|rename|move)\s+(?:a|an|the|some|new|my|our|this|that)\s+(?:[\w-]+\s+){0,3}?(?:buttons?|pages?|components?|functions?|methods?|features?|endpoints?|forms?|class(?:es)?|modules?|apis?|screens?|modals?|fields?|routes?|layouts?|headers?|footers?|navbars?|sidebars?|tests?|bugs?|styles?|css|quer(?:y|ies)|schemas?|migrations?|hooks?|widgets?|cards?|tables?|views?|types?|structs?|enums?|handlers?|variables?|imports?|docs?|readme|comments?)\b",
    )
    .expect("static regex")
});

static CONVERSATIONAL_BUILD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:let'?s|lets|let\s+us|we\s+should|we\s+could|i\s+want\s+to|i'?d\s+like\s+to|can\s+we|shall\s+we)\s+(?:build|make|create|design|start|write|prototype|add)\b",
    )
    .expect("static regex")
});

const ACKNOWLEDGMENTS: &[&str] = &[
    "ok", "okay", "k", "kk", "cool", "nice", "great", "got it", "gotcha", "sure", "yes", "no",
    "yep", "yeah", "nope", "nah", "alright", "all right", "sounds good", "perfect", "awesome",
    "lol", "haha", "right", "fine", "understood", "makes sense", "noted", "will do", "done",
    "good", "good job", "well done", "👍", "🙏", "👌",
];

/// Greetings longer than this are treated as real messages ("hey, deploy JUDO to prod now").
const MAX_GREETING_WORDS: usize = 4;

/// Return the guard that applies to `text`, if any.
pub fn passthrough_reason(text: &str) -> Option<PassthroughReason> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(PassthroughReason::Empty);
    }

    let words = trimmed.split_whitespace().count();
    if words <= MAX_GREETING_WORDS && GREETING.is_match(trimmed) {
        return Some(PassthroughReason::Greeting);
    }
    if THANKS.is_match(trimmed) {
        return Some(PassthroughReason::Thanks);
    }
    if is_acknowledgment(trimmed) {
        return Some(PassthroughReason::Acknowledgment);
    }
    if trimmed.ends_with('?') {
        return Some(PassthroughReason::Question);
    }
    if CODING_INSTRUCTION.is_match(trimmed) {
        return Some(PassthroughReason::CodingInstruction);
    }
    if CONVERSATIONAL_BUILD.is_match(trimmed) {
        return Some(PassthroughReason::ConversationalBuild);
    }
    None
}

/// Questions and greetings are never decomposed or classified.
pub fn is_question_or_greeting(text: &str) -> bool {
    matches!(
        passthrough_reason(text),
        Some(PassthroughReason::Question | PassthroughReason::Greeting)
    )
}

fn is_acknowledgment(text: &str) -> bool {
    let normalized = text
        .trim_end_matches(|c: char| matches!(c, '!' | '.' | ',' | '~'))
        .trim()
        .to_lowercase();
    ACKNOWLEDGMENTS.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings_pass_through() {
        for msg in ["hi", "Hello there!", "hey bot", "good morning", "what's up"] {
            assert_eq!(passthrough_reason(msg), Some(PassthroughReason::Greeting), "{msg}");
        }
    }

    #[test]
    fn long_message_starting_with_greeting_is_not_a_greeting() {
        assert_ne!(
            passthrough_reason("hey deploy JUDO to production right now"),
            Some(PassthroughReason::Greeting)
        );
    }

    #[test]
    fn thanks_and_acks_pass_through() {
        assert_eq!(passthrough_reason("thanks!"), Some(PassthroughReason::Thanks));
        assert_eq!(passthrough_reason("thank you so much"), Some(PassthroughReason::Thanks));
        assert_eq!(passthrough_reason("ok"), Some(PassthroughReason::Acknowledgment));
        assert_eq!(passthrough_reason("Sounds good."), Some(PassthroughReason::Acknowledgment));
        assert_eq!(passthrough_reason("👍"), Some(PassthroughReason::Acknowledgment));
    }

    #[test]
    fn questions_pass_through() {
        assert_eq!(
            passthrough_reason("can you deploy JUDO?"),
            Some(PassthroughReason::Question)
        );
        assert_eq!(
            passthrough_reason("what's the status of JUDO ?  "),
            Some(PassthroughReason::Question)
        );
    }

    #[test]
    fn coding_instructions_pass_through() {
        for msg in [
            "add a login button",
            "please implement the signup page",
            "fix the bug in the header",
            "create a new React component for the sidebar",
            "refactor the auth module",
        ] {
            assert_eq!(
                passthrough_reason(msg),
                Some(PassthroughReason::CodingInstruction),
                "{msg}"
            );
        }
    }

    #[test]
    fn conversational_build_passes_through() {
        assert_eq!(
            passthrough_reason("let's build a todo app"),
            Some(PassthroughReason::ConversationalBuild)
        );
        assert_eq!(
            passthrough_reason("I want to make a landing page for the launch"),
            Some(PassthroughReason::ConversationalBuild)
        );
    }

    #[test]
    fn commands_are_not_guarded() {
        for msg in [
            "deploy JUDO",
            "run tests on JUDO and then deploy it",
            "show logs for LusoTown",
            "restart the api",
            "status",
            "create project Atlas",
        ] {
            assert_eq!(passthrough_reason(msg), None, "{msg}");
        }
    }

    #[test]
    fn empty_is_guarded() {
        assert_eq!(passthrough_reason("   "), Some(PassthroughReason::Empty));
    }
}
