//! Compound instruction decomposition
//!
//! Splits "run tests on JUDO and then deploy it" into ordered steps. A message
//! is only split when every resulting segment reads as a command on its own,
//! so noun-phrase conjunctions ("pros and cons") and chat stay whole.
//!
//! ## Shapes
//!
//! | Input | Steps | Flags |
//! |-------|-------|-------|
//! | `A and then B`, `A, then B`, `A. B`, `A after that B` | A, B | sequential |
//! | `A and B`, `A, B` | A, B | parallel |
//! | `B but first A` | A, B | sequential |
//! | `if A then B`, `A and if they pass then B` | A, B | conditional on success |
//!
//! Pronouns in later steps resolve against entities named in earlier steps
//! of the same message.

use crate::entities::{trim_token, EntityCatalog};
use crate::guards::is_question_or_greeting;
use crate::patterns::{is_command_verb, is_non_target};
use crate::thread::replace_object_pronoun;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Messages shorter than this are never split.
const MIN_WORDS: usize = 4;

static IF_THEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:if|once|when)\s+(.+?)(?:\s*,\s*|\s+)then\s+(.+)$").expect("static regex")
});

static IF_COMMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:if|once|when)\s+(.+?)\s*,\s*(.+)$").expect("static regex")
});

static AND_IF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(.+?)(?:\s*,\s*|\s+)and\s+if\s+(?:they|it|that|those|these|everything|all)\s+(?:pass(?:es)?|succeeds?|works?|(?:is|are)\s+(?:green|ok|okay|good|fine))(?:\s*,\s*|\s+)(?:then\s+)?(.+)$",
    )
    .expect("static regex")
});

static BUT_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+?)(?:\s*,\s*|\s+)but\s+first\s*,?\s+(.+)$").expect("static regex")
});

static SEQUENCE_SPLIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\s*,\s*|\s+)(?:and\s+)?(?:then|after\s+that|afterwards)\s*,?\s+|[.!;]\s+")
        .expect("static regex")
});

static PARALLEL_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*,\s*(?:and\s+)?|\s+and\s+").expect("static regex"));

static SUCCESS_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s+(?:pass(?:es)?|succeeds?|works?|(?:is|are)\s+(?:green|ok|okay|good|fine|passing)|go(?:es)?\s+(?:well|green))$",
    )
    .expect("static regex")
});

/// Words that may open a step without being its verb.
const STEP_FILLERS: &[&str] = &["please", "also", "and", "then", "now", "just"];

const PREPOSITIONS: &[&str] = &["on", "for", "in", "to", "of", "against"];

/// Nouns that follow verbs but never name a project.
const GENERIC_NOUNS: &[&str] = &[
    "server", "servers", "service", "services", "app", "build", "builds", "deploy",
    "deployment", "branch", "production", "prod", "staging", "dev", "pipeline", "suite",
];

/// Gate between conditional steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Run the next step only if the previous one reported success
    Success,
}

/// One step of a decomposed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubIntent {
    pub text: String,
    /// Waits for the previous step to finish
    pub is_sequential: bool,
}

/// Decomposition of a message into steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedIntents {
    pub is_multi_intent: bool,
    pub intents: Vec<SubIntent>,
    pub is_conditional: bool,
    pub condition: Option<Condition>,
}

impl ParsedIntents {
    fn single(text: &str) -> Self {
        Self {
            is_multi_intent: false,
            intents: vec![SubIntent {
                text: text.to_string(),
                is_sequential: false,
            }],
            is_conditional: false,
            condition: None,
        }
    }

    fn steps(steps: Vec<String>, sequential: bool) -> Self {
        let intents = steps
            .into_iter()
            .enumerate()
            .map(|(i, text)| SubIntent {
                text,
                is_sequential: sequential && i > 0,
            })
            .collect();
        Self {
            is_multi_intent: true,
            intents,
            is_conditional: false,
            condition: None,
        }
    }

    fn conditional(steps: Vec<String>) -> Self {
        Self {
            is_conditional: true,
            condition: Some(Condition::Success),
            ..Self::steps(steps, true)
        }
    }

    /// The step to route now.
    pub fn first(&self) -> Option<&SubIntent> {
        self.intents.first()
    }
}

/// Splits compound messages into steps.
#[derive(Debug, Clone, Default)]
pub struct MultiIntentParser {
    catalog: EntityCatalog,
}

impl MultiIntentParser {
    pub fn new(catalog: EntityCatalog) -> Self {
        Self { catalog }
    }

    pub fn parse(&self, text: &str) -> ParsedIntents {
        let text = text.trim();
        if text.split_whitespace().count() < MIN_WORDS || is_question_or_greeting(text) {
            return ParsedIntents::single(text);
        }

        if let Some(parsed) = self.parse_conditional(text) {
            return parsed;
        }

        if let Some(caps) = BUT_FIRST.captures(text) {
            let later = clean_step(&caps[1]);
            let first = clean_step(&caps[2]);
            if is_verb_led(&first) && is_verb_led(&later) {
                return ParsedIntents::steps(self.resolve_steps(vec![first, later]), true);
            }
        }

        if let Some(steps) = split_steps(&SEQUENCE_SPLIT, text) {
            tracing::debug!(steps = steps.len(), "Split sequential instruction");
            return ParsedIntents::steps(self.resolve_steps(steps), true);
        }

        if let Some(steps) = split_steps(&PARALLEL_SPLIT, text) {
            tracing::debug!(steps = steps.len(), "Split parallel instruction");
            return ParsedIntents::steps(self.resolve_steps(steps), false);
        }

        ParsedIntents::single(text)
    }

    fn parse_conditional(&self, text: &str) -> Option<ParsedIntents> {
        if let Some(caps) = AND_IF.captures(text) {
            let first = clean_step(&caps[1]);
            let then = clean_step(&caps[2]);
            if is_verb_led(&first) && is_verb_led(&then) {
                return Some(ParsedIntents::conditional(
                    self.resolve_steps(vec![first, then]),
                ));
            }
        }

        let caps = IF_THEN.captures(text).or_else(|| IF_COMMA.captures(text))?;
        let first = condition_step(&caps[1])?;
        let then = clean_step(&caps[2]);
        if !is_verb_led(&then) {
            return None;
        }
        Some(ParsedIntents::conditional(
            self.resolve_steps(vec![first, then]),
        ))
    }

    /// Replace object pronouns with the entity named by the closest earlier step.
    fn resolve_steps(&self, steps: Vec<String>) -> Vec<String> {
        let mut last_entity: Option<String> = None;
        steps
            .into_iter()
            .map(|step| {
                let step = match &last_entity {
                    Some(entity) => replace_object_pronoun(&step, entity).unwrap_or(step),
                    None => step,
                };
                if let Some(entity) = self.entity_in(&step) {
                    last_entity = Some(entity);
                }
                step
            })
            .collect()
    }

    /// The project or company a step is about.
    fn entity_in(&self, step: &str) -> Option<String> {
        if let Some(repo) = self.catalog.repos_in(step).into_iter().next() {
            return Some(repo);
        }
        if let Some(company) = self.catalog.companies_in(step).into_iter().next() {
            return Some(company);
        }

        let words: Vec<&str> = step.split_whitespace().collect();
        let verb_at = words
            .iter()
            .position(|w| !STEP_FILLERS.contains(&w.to_lowercase().as_str()))?;

        words
            .iter()
            .enumerate()
            .skip(verb_at + 1)
            .filter(|(i, _)| {
                let after_preposition = |at: usize| {
                    PREPOSITIONS.contains(&words[at].to_lowercase().as_str())
                };
                *i == verb_at + 1
                    || after_preposition(i - 1)
                    || (*i >= 2 && words[i - 1].eq_ignore_ascii_case("the") && after_preposition(i - 2))
            })
            .map(|(_, w)| trim_token(w))
            .find(|w| {
                let lower = w.to_lowercase();
                !w.is_empty()
                    && !is_non_target(&lower)
                    && !PREPOSITIONS.contains(&lower.as_str())
                    && !GENERIC_NOUNS.contains(&lower.as_str())
            })
            .map(str::to_string)
    }
}

/// Split on `splitter`, keeping the result only if every step is a command.
fn split_steps(splitter: &Regex, text: &str) -> Option<Vec<String>> {
    let steps: Vec<String> = splitter
        .split(text)
        .map(clean_step)
        .filter(|s| !s.is_empty())
        .collect();
    if steps.len() < 2 || !steps.iter().all(|s| is_verb_led(s)) {
        return None;
    }
    Some(steps)
}

fn clean_step(step: &str) -> String {
    let step = step.trim().trim_end_matches(['.', '!', ',', ';']).trim();
    let lower = step.to_lowercase();
    for filler in ["and ", "then ", "also "] {
        if lower.starts_with(filler) {
            return step[filler.len()..].trim().to_string();
        }
    }
    step.to_string()
}

/// Whether the first word (after fillers) is a command verb.
fn is_verb_led(step: &str) -> bool {
    step.split_whitespace()
        .map(str::to_lowercase)
        .find(|w| !STEP_FILLERS.contains(&w.as_str()))
        .is_some_and(|w| is_command_verb(&w))
}

/// Turn a condition clause ("the tests pass") into the step that produces it.
fn condition_step(clause: &str) -> Option<String> {
    let clause = clean_step(clause);
    if is_verb_led(&clause) {
        return Some(SUCCESS_SUFFIX.replace(&clause, "").into_owned());
    }
    let stripped = SUCCESS_SUFFIX.replace(&clause, "");
    if stripped.len() == clause.len() || stripped.trim().is_empty() {
        return None;
    }
    Some(format!("run {}", stripped.trim()))
}
