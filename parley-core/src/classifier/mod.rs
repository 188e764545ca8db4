//! Confidence-scored intent classification
//!
//! The classifier is the fallback for messages no pattern rule recognized.
//! It scores the message against keyword templates for each action and
//! combines four factors into one confidence:
//!
//! ```text
//! confidence = (wk*keyword + wc*context + wh*history + ws*specificity) / (wk+wc+wh+ws)
//! ```
//!
//! | Factor | Source |
//! |--------|--------|
//! | keyword | Template verbs and keywords present in the message |
//! | context | Target from the entity catalog, a named token, or auto-context |
//! | history | How often this user ran the same action recently |
//! | specificity | Message length, penalized for vague phrasing |
//!
//! Results below the clarification threshold are ambiguous and carry
//! clarifying questions; below the unknown threshold the intent is
//! `unknown`. The classifier only ever produces a command for the caller
//! when a result is confident, names a target where the action needs one,
//! and reads as an instruction.

pub mod fuzzy;
pub mod history;
pub mod learning;
pub mod risk;

pub use history::UserHistory;
pub use learning::{correction_key, CorrectionLearner, CorrectionPattern, CorrectionRecord};
pub use risk::RiskAssessor;

use crate::config::{validate_thresholds, ClassifierConfig, ConfidenceWeights, HistoryConfig};
use crate::entities::{trim_token, EntityCatalog};
use crate::error::Result;
use crate::patterns::{
    action_for_verb, allows_auto_fill, is_command_verb, is_non_target, normalize_env,
    scope_for_action, ActionScope, COMMAND_VERBS,
};
use crate::types::{ArgValue, CommandIntent, IntentSource, Risk, RouteContext};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Intent reported when nothing scores above the unknown threshold.
pub const UNKNOWN_INTENT: &str = "unknown";

/// Keyword score multiplier when the command word had to be corrected.
const FUZZY_KEYWORD_DISCOUNT: f64 = 0.9;

const PRIMARY_KEYWORD_SCORE: f64 = 1.0;
const SECONDARY_KEYWORD_SCORE: f64 = 0.7;
const EXTRA_KEYWORD_BONUS: f64 = 0.15;

const CATALOG_CONTEXT: f64 = 1.0;
const AUTO_CONTEXT: f64 = 0.6;
const NAMED_TOKEN_CONTEXT: f64 = 0.5;

const VAGUE_PHRASES: &[&str] = &[
    "something",
    "stuff",
    "things",
    "whatever",
    "maybe",
    "somehow",
    "kind of",
    "sort of",
    "i guess",
    "not sure",
];

const ENVIRONMENTS: &[&str] = &[
    "prod",
    "production",
    "staging",
    "stage",
    "dev",
    "development",
    "qa",
    "preview",
    "live",
];

// ============================================
// Intent templates
// ============================================

struct IntentTemplate {
    action: &'static str,
    primary: &'static str,
    keywords: &'static [&'static str],
}

const TEMPLATES: &[IntentTemplate] = &[
    IntentTemplate {
        action: "deploy",
        primary: "deploy",
        keywords: &["deployment", "ship", "release", "launch", "push", "production", "prod"],
    },
    IntentTemplate {
        action: "status",
        primary: "status",
        keywords: &["check", "health", "healthy", "running", "down", "state", "doing", "uptime"],
    },
    IntentTemplate {
        action: "test",
        primary: "test",
        keywords: &["tests", "testing", "spec", "specs", "ci", "suite"],
    },
    IntentTemplate {
        action: "logs",
        primary: "logs",
        keywords: &["log", "tail", "errors", "output", "trace", "stacktrace"],
    },
    IntentTemplate {
        action: "restart",
        primary: "restart",
        keywords: &["reboot", "bounce", "reload", "cycle", "kick"],
    },
    IntentTemplate {
        action: "rollback",
        primary: "rollback",
        keywords: &["revert", "undo", "previous", "roll"],
    },
    IntentTemplate {
        action: "build",
        primary: "build",
        keywords: &["compile", "bundle", "artifact", "artifacts"],
    },
    IntentTemplate {
        action: "delete",
        primary: "delete",
        keywords: &["remove", "destroy", "drop", "wipe"],
    },
    IntentTemplate {
        action: "create",
        primary: "create",
        keywords: &["new", "init", "scaffold", "bootstrap", "setup"],
    },
    IntentTemplate {
        action: "deadlines",
        primary: "deadlines",
        keywords: &["deadline", "due", "schedule", "milestones", "timeline"],
    },
    IntentTemplate {
        action: "company",
        primary: "company",
        keywords: &["client", "org", "organization", "account", "customer"],
    },
    IntentTemplate {
        action: "repos",
        primary: "repos",
        keywords: &["repositories", "repo", "projects", "codebases"],
    },
];

fn best_template(tokens: &[String]) -> Option<(&'static IntentTemplate, f64)> {
    let mut best: Option<(&'static IntentTemplate, f64)> = None;

    for template in TEMPLATES {
        let mut matches = 0usize;
        let mut primary = false;
        for token in tokens {
            if token == template.primary || action_for_verb(token) == Some(template.action) {
                primary = true;
                matches += 1;
            } else if template.keywords.contains(&token.as_str()) {
                matches += 1;
            }
        }
        if matches == 0 {
            continue;
        }

        let base = if primary {
            PRIMARY_KEYWORD_SCORE
        } else {
            SECONDARY_KEYWORD_SCORE
        };
        let score = (base + EXTRA_KEYWORD_BONUS * (matches - 1) as f64).min(1.0);
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((template, score));
        }
    }

    best
}

// ============================================
// Scoring
// ============================================

/// The four factors behind a confidence score, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConfidenceFactors {
    pub keyword: f64,
    pub context: f64,
    pub history: f64,
    pub specificity: f64,
}

/// Weighted, normalized combination of `factors`, in [0, 1].
pub fn score(factors: &ConfidenceFactors, weights: &ConfidenceWeights) -> f64 {
    let total = weights.sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted = weights.keyword * factors.keyword.clamp(0.0, 1.0)
        + weights.context * factors.context.clamp(0.0, 1.0)
        + weights.history * factors.history.clamp(0.0, 1.0)
        + weights.specificity * factors.specificity.clamp(0.0, 1.0);
    (weighted / total).clamp(0.0, 1.0)
}

fn specificity(tokens: &[String]) -> f64 {
    let base = match tokens.len() {
        0 => 0.0,
        1 => 0.3,
        2 => 0.8,
        3..=8 => 1.0,
        9..=15 => 0.7,
        _ => 0.4,
    };
    let joined = format!(" {} ", tokens.join(" "));
    let vague = VAGUE_PHRASES
        .iter()
        .any(|p| joined.contains(&format!(" {p} ")));
    if vague {
        base * 0.5
    } else {
        base
    }
}

/// Whether the command-position word is a known verb.
fn is_imperative(text: &str) -> bool {
    fuzzy::command_position(text).is_some_and(|(start, end)| {
        let word = &text[start..end];
        is_command_verb(word) || action_for_verb(word).is_some()
    })
}

fn is_template_word(word: &str) -> bool {
    TEMPLATES
        .iter()
        .any(|t| t.primary == word || t.keywords.contains(&word))
}

/// First token after the command word that looks like a proper name.
fn named_token(text: &str) -> Option<String> {
    let (_, end) = fuzzy::command_position(text)?;
    text[end..]
        .split_whitespace()
        .map(trim_token)
        .find(|token| {
            let lower = token.to_lowercase();
            token.chars().count() >= 2
                && token.chars().any(|c| c.is_uppercase() || c.is_ascii_digit())
                && !is_non_target(&lower)
                && !is_command_verb(&lower)
                && !is_template_word(&lower)
                && !ENVIRONMENTS.contains(&lower.as_str())
        })
        .map(str::to_string)
}

fn detect_environment(tokens: &[String]) -> Option<String> {
    tokens
        .iter()
        .find(|t| ENVIRONMENTS.contains(&t.as_str()))
        .map(|t| normalize_env(t))
}

// ============================================
// Results and parameters
// ============================================

/// Outcome of classifying one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// Action name, or [`UNKNOWN_INTENT`]
    pub intent: String,
    pub project: Option<String>,
    pub company: Option<String>,
    pub environment: Option<String>,
    pub confidence: f64,
    pub ambiguous: bool,
    pub clarifying_questions: Vec<String>,
    pub risk: Risk,
    pub requires_confirmation: bool,
    pub factors: ConfidenceFactors,
    /// Message text after command-word correction, when one was applied
    pub corrected_text: Option<String>,
}

impl ClassificationResult {
    pub fn unknown() -> Self {
        Self {
            intent: UNKNOWN_INTENT.to_string(),
            project: None,
            company: None,
            environment: None,
            confidence: 0.0,
            ambiguous: true,
            clarifying_questions: Vec::new(),
            risk: risk::base_risk(UNKNOWN_INTENT),
            requires_confirmation: false,
            factors: ConfidenceFactors::default(),
            corrected_text: None,
        }
    }

    /// Result describing an intent that was resolved another way.
    pub fn from_intent(intent: &CommandIntent) -> Self {
        let mut result = Self::unknown();
        result.intent = intent.action.clone();
        match scope_for_action(&intent.action) {
            ActionScope::Company => result.company = intent.target.clone(),
            _ => result.project = intent.target.clone(),
        }
        result.environment = match intent.args.get("env") {
            Some(ArgValue::Text(env)) => Some(env.clone()),
            _ => None,
        };
        result.confidence = intent.confidence;
        result.ambiguous = false;
        result.risk = intent.risk();
        result.requires_confirmation = intent.requires_confirmation();
        result
    }

    pub fn is_unknown(&self) -> bool {
        self.intent == UNKNOWN_INTENT
    }

    /// The project or company the action applies to, by action scope.
    pub fn target(&self) -> Option<&str> {
        match scope_for_action(&self.intent) {
            ActionScope::Company => self.company.as_deref(),
            _ => self.project.as_deref(),
        }
    }

    fn build_intent(&self, original_message: &str) -> CommandIntent {
        let mut intent = CommandIntent::new(
            self.intent.clone(),
            self.target().map(str::to_string),
            IntentSource::Classifier,
            original_message,
        )
        .with_confidence(self.confidence);
        if let Some(env) = &self.environment {
            intent = intent.with_arg("env", ArgValue::Text(env.clone()));
        }
        intent.set_risk(self.risk);
        intent
    }

    /// Canonical command this result would produce.
    pub fn canonical(&self) -> String {
        self.build_intent("").canonical()
    }

    /// The executable intent, unless the result is unknown or ambiguous.
    pub fn command_intent(&self, original_message: &str) -> Option<CommandIntent> {
        if self.is_unknown() || self.ambiguous {
            return None;
        }
        Some(self.build_intent(original_message))
    }
}

/// Runtime-adjustable scoring parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierParams {
    pub weights: ConfidenceWeights,
    pub clarification_threshold: f64,
    pub unknown_threshold: f64,
}

impl ClassifierParams {
    /// Apply named overrides such as `clarification_threshold` or
    /// `weight.keyword`, then validate the result.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, f64>) -> Result<Self> {
        for (key, &value) in overrides {
            match key.as_str() {
                "clarification_threshold" => self.clarification_threshold = value,
                "unknown_threshold" => self.unknown_threshold = value,
                "weight.keyword" => self.weights.keyword = value,
                "weight.context" => self.weights.context = value,
                "weight.history" => self.weights.history = value,
                "weight.specificity" => self.weights.specificity = value,
                other => tracing::debug!(key = other, "Ignoring unknown classifier override"),
            }
        }
        validate_thresholds(self.clarification_threshold, self.unknown_threshold)?;
        self.weights.validate()?;
        Ok(self)
    }
}

// ============================================
// IntentClassifier
// ============================================

pub struct IntentClassifier {
    params: RwLock<ClassifierParams>,
    max_edit_distance: usize,
    catalog: EntityCatalog,
    history: UserHistory,
    learner: CorrectionLearner,
    risk: RiskAssessor,
}

impl IntentClassifier {
    pub fn new(config: &ClassifierConfig, history: &HistoryConfig, catalog: EntityCatalog) -> Self {
        Self {
            params: RwLock::new(ClassifierParams {
                weights: config.weights,
                clarification_threshold: config.clarification_threshold,
                unknown_threshold: config.unknown_threshold,
            }),
            max_edit_distance: config.max_edit_distance,
            catalog,
            history: UserHistory::new(history),
            learner: CorrectionLearner::new(config.correction_penalty, config.correction_log_size),
            risk: RiskAssessor::new(&config.production_markers),
        }
    }

    // --- parameters ---

    pub fn params(&self) -> ClassifierParams {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clarification_threshold(&self) -> f64 {
        self.params().clarification_threshold
    }

    pub fn unknown_threshold(&self) -> f64 {
        self.params().unknown_threshold
    }

    pub fn weights(&self) -> ConfidenceWeights {
        self.params().weights
    }

    pub fn set_clarification_threshold(&self, value: f64) -> Result<()> {
        let mut params = self.params.write().unwrap_or_else(PoisonError::into_inner);
        validate_thresholds(value, params.unknown_threshold)?;
        params.clarification_threshold = value;
        tracing::info!(value, "Clarification threshold updated");
        Ok(())
    }

    pub fn set_unknown_threshold(&self, value: f64) -> Result<()> {
        let mut params = self.params.write().unwrap_or_else(PoisonError::into_inner);
        validate_thresholds(params.clarification_threshold, value)?;
        params.unknown_threshold = value;
        tracing::info!(value, "Unknown threshold updated");
        Ok(())
    }

    /// Set both thresholds at once, checked as a pair.
    pub fn set_thresholds(&self, clarification: f64, unknown: f64) -> Result<()> {
        validate_thresholds(clarification, unknown)?;
        let mut params = self.params.write().unwrap_or_else(PoisonError::into_inner);
        params.clarification_threshold = clarification;
        params.unknown_threshold = unknown;
        tracing::info!(clarification, unknown, "Classifier thresholds updated");
        Ok(())
    }

    pub fn set_weights(&self, weights: ConfidenceWeights) -> Result<()> {
        weights.validate()?;
        self.params
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .weights = weights;
        tracing::info!(?weights, "Classifier weights updated");
        Ok(())
    }

    // --- stores ---

    pub fn history(&self) -> &UserHistory {
        &self.history
    }

    pub fn learner(&self) -> &CorrectionLearner {
        &self.learner
    }

    pub fn risk_assessor(&self) -> &RiskAssessor {
        &self.risk
    }

    pub fn record_action(&self, user_id: &str, action: &str) {
        self.history.record(user_id, action);
    }

    /// Record that a human corrected `result`; returns the pair's new count.
    pub fn record_correction(
        &self,
        result: &ClassificationResult,
        correction: &str,
        user_id: &str,
    ) -> u32 {
        self.learner.record(result, correction, user_id)
    }

    pub fn assess_risk(&self, action: &str, target: Option<&str>) -> Risk {
        self.risk.assess(action, target)
    }

    // --- classification ---

    pub fn classify(&self, text: &str, ctx: &RouteContext) -> ClassificationResult {
        let params = self.params();
        self.classify_params(text, ctx, &params)
    }

    /// Classify with per-call parameter overrides.
    ///
    /// Invalid overrides are logged and the shared parameters used instead.
    pub fn classify_with(
        &self,
        text: &str,
        ctx: &RouteContext,
        overrides: &BTreeMap<String, f64>,
    ) -> ClassificationResult {
        let params = match self.params().with_overrides(overrides) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid classifier overrides, using defaults");
                self.params()
            }
        };
        self.classify_params(text, ctx, &params)
    }

    fn classify_params(
        &self,
        text: &str,
        ctx: &RouteContext,
        params: &ClassifierParams,
    ) -> ClassificationResult {
        let trimmed = text.trim();
        let correction =
            fuzzy::correct_leading_verb(trimmed, COMMAND_VERBS, self.max_edit_distance);
        let working = correction.as_ref().map_or(trimmed, |c| c.text.as_str());

        let tokens: Vec<String> = working
            .split_whitespace()
            .map(|t| trim_token(t).to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let mut result = ClassificationResult::unknown();
        result.corrected_text = correction.as_ref().map(|c| c.text.clone());

        let Some((template, keyword)) = best_template(&tokens) else {
            result.factors.specificity = specificity(&tokens);
            result.confidence = score(&result.factors, &params.weights);
            result.clarifying_questions = self.clarifying_questions(&result, None, None);
            tracing::debug!(confidence = result.confidence, "No intent template matched");
            return result;
        };

        let action = template.action;
        let (context, project, company) = self.context(working, action, ctx);

        let factors = ConfidenceFactors {
            keyword: if correction.is_some() {
                keyword * FUZZY_KEYWORD_DISCOUNT
            } else {
                keyword
            },
            context,
            history: self.history.factor(&ctx.user_id, action),
            specificity: specificity(&tokens),
        };

        result.intent = action.to_string();
        result.project = project;
        result.company = company;
        result.environment = detect_environment(&tokens);
        result.factors = factors;

        let mut confidence = score(&factors, &params.weights);
        let learned = self.learner.pattern(action, result.target());
        if let Some(multiplier) = self.learner.multiplier(action, result.target()) {
            confidence *= multiplier;
        }
        result.confidence = confidence;

        if confidence < params.unknown_threshold {
            result.intent = UNKNOWN_INTENT.to_string();
            result.project = None;
            result.company = None;
            result.environment = None;
        }

        let missing_target = !result.is_unknown()
            && scope_for_action(action) != ActionScope::Unscoped
            && result.target().is_none();
        result.ambiguous = result.is_unknown()
            || confidence < params.clarification_threshold
            || learned.is_some()
            || missing_target
            || !is_imperative(working);

        result.risk = self.risk.assess_intent(&result.build_intent(""));
        result.requires_confirmation = result.risk == Risk::High;

        if result.ambiguous {
            result.clarifying_questions =
                self.clarifying_questions(&result, learned.as_ref(), correction.as_ref());
        }

        tracing::debug!(
            intent = %result.intent,
            confidence = result.confidence,
            ambiguous = result.ambiguous,
            "Classified message"
        );
        result
    }

    /// Context factor plus the project and company it found.
    fn context(
        &self,
        text: &str,
        action: &str,
        ctx: &RouteContext,
    ) -> (f64, Option<String>, Option<String>) {
        let auto_fill = allows_auto_fill(action);
        let known_repo = self.catalog.repos_in(text).into_iter().next();
        let known_company = self.catalog.companies_in(text).into_iter().next();

        match scope_for_action(action) {
            ActionScope::Repo => {
                if let Some(repo) = known_repo {
                    (CATALOG_CONTEXT, Some(repo), known_company)
                } else if let Some(name) = named_token(text) {
                    (NAMED_TOKEN_CONTEXT, Some(name), known_company)
                } else if let Some(repo) = ctx.repo().filter(|_| auto_fill) {
                    (AUTO_CONTEXT, Some(repo.to_string()), known_company)
                } else {
                    (0.0, None, known_company)
                }
            }
            ActionScope::Company => {
                if let Some(company) = known_company {
                    (CATALOG_CONTEXT, known_repo, Some(company))
                } else if let Some(name) = named_token(text) {
                    (NAMED_TOKEN_CONTEXT, known_repo, Some(name))
                } else if let Some(company) = ctx.company().filter(|_| auto_fill) {
                    (AUTO_CONTEXT, known_repo, Some(company.to_string()))
                } else {
                    (0.0, known_repo, None)
                }
            }
            ActionScope::Unscoped => (0.0, known_repo, known_company),
        }
    }

    fn clarifying_questions(
        &self,
        result: &ClassificationResult,
        learned: Option<&CorrectionPattern>,
        correction: Option<&fuzzy::Correction>,
    ) -> Vec<String> {
        if result.is_unknown() {
            return vec![
                "I'm not sure what you'd like me to do. Could you phrase it as a command, like \"status <project>\" or \"deploy <project>\"?"
                    .to_string(),
            ];
        }

        let mut questions = Vec::new();
        if let Some(c) = correction {
            questions.push(format!(
                "Did you mean \"{}\" where you wrote \"{}\"?",
                c.corrected, c.original
            ));
        }

        match (result.target(), scope_for_action(&result.intent)) {
            (None, ActionScope::Repo) => questions.push(format!(
                "Which project should `{}` run against?",
                result.intent
            )),
            (None, ActionScope::Company) => questions.push(format!(
                "Which company should I look up {} for?",
                result.intent
            )),
            _ => questions.push(format!("Should I run `{}`?", result.canonical())),
        }

        if let Some(pattern) = learned {
            questions.push(format!(
                "A similar request was corrected to \"{}\" before. Is that what you want?",
                pattern.sample_correction
            ));
        }
        questions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(
            &ClassifierConfig::default(),
            &HistoryConfig::default(),
            EntityCatalog::new(&["JUDO", "LusoTown"], &["Acme"]),
        )
    }

    fn ctx() -> RouteContext {
        RouteContext::new("u1", "c1")
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn score_bounds() {
        let weights = ConfidenceWeights::default();
        assert_eq!(score(&ConfidenceFactors::default(), &weights), 0.0);

        let all = ConfidenceFactors {
            keyword: 1.0,
            context: 1.0,
            history: 1.0,
            specificity: 1.0,
        };
        assert_eq!(score(&all, &weights), 1.0);

        let keyword_only = ConfidenceFactors {
            keyword: 1.0,
            ..ConfidenceFactors::default()
        };
        assert!(approx(score(&keyword_only, &weights), 0.4));
    }

    #[test]
    fn score_clamps_out_of_range_factors() {
        let factors = ConfidenceFactors {
            keyword: 3.0,
            context: -1.0,
            history: 1.0,
            specificity: 1.0,
        };
        let s = score(&factors, &ConfidenceWeights::default());
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn confident_command_with_known_repo() {
        let classifier = classifier();
        let result = classifier.classify("could you deploy judo for me", &ctx());
        assert_eq!(result.intent, "deploy");
        assert_eq!(result.project.as_deref(), Some("JUDO"));
        assert!(!result.ambiguous, "{result:?}");
        assert!(result.requires_confirmation);
        assert_eq!(result.risk, Risk::High);

        let intent = result.command_intent("could you deploy judo for me").unwrap();
        assert_eq!(intent.canonical(), "deploy JUDO");
        assert_eq!(intent.source, IntentSource::Classifier);
    }

    #[test]
    fn typo_is_corrected() {
        let classifier = classifier();
        let result = classifier.classify("deplyo JUDO", &ctx());
        assert_eq!(result.intent, "deploy");
        assert_eq!(result.corrected_text.as_deref(), Some("deploy JUDO"));
        assert!(result.factors.keyword < 1.0);
    }

    #[test]
    fn chat_is_unknown() {
        let classifier = classifier();
        let result = classifier.classify("I had a lovely weekend", &ctx());
        assert!(result.is_unknown());
        assert!(result.ambiguous);
        assert!(result.command_intent("x").is_none());
        assert!(!result.clarifying_questions.is_empty());
    }

    #[test]
    fn statements_are_not_commands() {
        let classifier = classifier();
        let result = classifier.classify("the deploy of JUDO went well", &ctx());
        assert_eq!(result.intent, "deploy");
        assert!(result.ambiguous);
        assert!(result.command_intent("x").is_none());
    }

    #[test]
    fn missing_target_asks_which_project() {
        let classifier = classifier();
        let result = classifier.classify("please restart everything now", &ctx());
        assert_eq!(result.intent, "restart");
        assert!(result.ambiguous);
        assert!(result
            .clarifying_questions
            .iter()
            .any(|q| q.contains("Which project")));
    }

    #[test]
    fn auto_context_supplies_target() {
        let classifier = classifier();
        let ctx = ctx().with_auto_repo("LusoTown");
        let result = classifier.classify("could you restart the servers", &ctx);
        assert_eq!(result.project.as_deref(), Some("LusoTown"));
        assert!(approx(result.factors.context, AUTO_CONTEXT));
    }

    #[test]
    fn destructive_actions_ignore_auto_context() {
        let classifier = classifier();
        let ctx = ctx().with_auto_repo("LusoTown");
        let result = classifier.classify("please delete everything now", &ctx);
        assert_eq!(result.intent, "delete");
        assert_eq!(result.project, None);
        assert!(result.ambiguous);
    }

    #[test]
    fn production_environment_is_captured() {
        let classifier = classifier();
        let result = classifier.classify("can you build JUDO for production", &ctx());
        assert_eq!(result.intent, "build");
        assert_eq!(result.environment.as_deref(), Some("production"));
        assert_eq!(result.risk, Risk::High);
    }

    #[test]
    fn corrections_only_lower_confidence() {
        let classifier = classifier();
        let before = classifier.classify("could you deploy judo for me", &ctx());

        let mut previous = before.confidence;
        for i in 0..3 {
            classifier.record_correction(&before, "status JUDO", "u1");
            let after = classifier.classify("could you deploy judo for me", &ctx());
            assert!(after.confidence < previous, "round {i}");
            assert!(after.ambiguous);
            previous = after.confidence;
        }

        let expected = before.confidence / (1.0 + 0.25 * 3.0);
        assert!(approx(previous, expected));
    }

    #[test]
    fn history_raises_confidence() {
        let classifier = classifier();
        let cold = classifier.classify("could you deploy judo for me", &ctx());
        classifier.record_action("u1", "deploy");
        let warm = classifier.classify("could you deploy judo for me", &ctx());
        assert!(warm.confidence > cold.confidence);
        assert_eq!(warm.factors.history, 1.0);
    }

    #[test]
    fn threshold_setters_validate() {
        let classifier = classifier();
        assert!(matches!(
            classifier.set_clarification_threshold(1.5),
            Err(Error::InvalidThreshold { .. })
        ));
        assert!(classifier.set_unknown_threshold(0.7).is_err());
        assert!(classifier.set_thresholds(0.2, 0.5).is_err());

        classifier.set_thresholds(0.8, 0.4).unwrap();
        assert_eq!(classifier.clarification_threshold(), 0.8);
        assert_eq!(classifier.unknown_threshold(), 0.4);
    }

    #[test]
    fn weight_setter_validates() {
        let classifier = classifier();
        let zero = ConfidenceWeights {
            keyword: 0.0,
            context: 0.0,
            history: 0.0,
            specificity: 0.0,
        };
        assert!(matches!(
            classifier.set_weights(zero),
            Err(Error::InvalidWeights(_))
        ));

        let keyword_heavy = ConfidenceWeights {
            keyword: 1.0,
            context: 0.0,
            history: 0.0,
            specificity: 0.0,
        };
        classifier.set_weights(keyword_heavy).unwrap();
        assert_eq!(classifier.weights(), keyword_heavy);
    }

    #[test]
    fn overrides_apply_per_call_only() {
        let classifier = classifier();
        let text = "could you deploy judo for me";

        let mut strict = BTreeMap::new();
        strict.insert("clarification_threshold".to_string(), 0.99);
        let result = classifier.classify_with(text, &ctx(), &strict);
        assert!(result.ambiguous);

        assert!(!classifier.classify(text, &ctx()).ambiguous);
        assert_eq!(classifier.clarification_threshold(), 0.6);
    }

    #[test]
    fn invalid_overrides_fall_back() {
        let classifier = classifier();
        let mut bad = BTreeMap::new();
        bad.insert("unknown_threshold".to_string(), 0.9);
        let result = classifier.classify_with("could you deploy judo for me", &ctx(), &bad);
        assert!(!result.ambiguous);
    }

    #[test]
    fn risk_assessment() {
        let classifier = classifier();
        assert_eq!(classifier.assess_risk("logs", Some("JUDO")), Risk::Low);
        assert_eq!(classifier.assess_risk("logs", Some("prod")), Risk::Medium);
        assert_eq!(classifier.assess_risk("restart", None), Risk::High);
    }
}
