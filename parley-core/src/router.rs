//! Message routing
//!
//! [`Router`] is the single entry point for inbound chat text. It decides
//! whether a message is a command, and if so which one:
//!
//! ```text
//! message ─► sanitize ─► guards ─► cache ─► multi-intent ─► pronouns
//!                           │                                  │
//!                           ▼                                  ▼
//!                      passthrough               pattern rules ─► classifier
//!                                                      │              │
//!                                                      └──► command ◄─┘
//! ```
//!
//! Anything that is not confidently a command comes back as a passthrough
//! carrying the message exactly as the user typed it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use parley_core::{Config, RouteContext, Router};
//!
//! let config = Config::load()?;
//! let router = Router::new(&config);
//!
//! let ctx = RouteContext::new("u1", "general").with_auto_repo("JUDO");
//! let resolution = router.resolve("restart the server", &ctx);
//! println!("{} ({})", resolution.text, resolution.source);
//! # Ok::<(), parley_core::Error>(())
//! ```

use crate::cache::ResponseCache;
use crate::classifier::{ClassificationResult, IntentClassifier, RiskAssessor};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::experiments::{ExperimentFramework, ExperimentStatus, JsonFileArchive, Outcome};
use crate::guards::{passthrough_reason, PassthroughReason};
use crate::multi_intent::{Condition, MultiIntentParser, SubIntent};
use crate::patterns::{scope_for_action, ActionScope, PatternMatcher, RuleSpec};
use crate::sanitize::sanitize;
use crate::thread::{has_anaphora, ConversationThreads, MentionKind};
use crate::types::{CommandIntent, IntentSource, RouteContext};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Counters for routed messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterMetrics {
    pub total: u64,
    pub passthroughs: u64,
    pub pattern_hits: u64,
    pub classifier_hits: u64,
    pub cache_hits: u64,
    /// Messages split into more than one step
    pub multi_intents: u64,
    /// Classifier results that needed clarification
    pub ambiguous: u64,
}

impl RouterMetrics {
    fn rate(count: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    }

    pub fn passthrough_rate(&self) -> f64 {
        Self::rate(self.passthroughs, self.total)
    }

    pub fn pattern_rate(&self) -> f64 {
        Self::rate(self.pattern_hits, self.total)
    }

    pub fn classifier_rate(&self) -> f64 {
        Self::rate(self.classifier_hits, self.total)
    }

    pub fn cache_hit_rate(&self) -> f64 {
        Self::rate(self.cache_hits, self.total)
    }
}

/// Steps of a compound message that were not routed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decomposition {
    pub chat_id: String,
    pub total_intents: usize,
    /// Steps after the one that was routed, in order
    pub remaining_intents: Vec<SubIntent>,
    pub is_conditional: bool,
    pub condition: Option<Condition>,
}

/// What the router decided for one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    /// Canonical command, or the original message for a passthrough
    pub text: String,
    pub source: IntentSource,
    pub intent: Option<CommandIntent>,
    /// Present whenever the classifier ran
    pub classification: Option<ClassificationResult>,
    pub passthrough_reason: Option<PassthroughReason>,
    pub decomposition: Option<Decomposition>,
}

impl Resolution {
    fn passthrough(message: &str, reason: PassthroughReason) -> Self {
        Self {
            text: message.to_string(),
            source: IntentSource::Passthrough,
            intent: None,
            classification: None,
            passthrough_reason: Some(reason),
            decomposition: None,
        }
    }

    fn command(intent: CommandIntent) -> Self {
        Self {
            text: intent.canonical(),
            source: intent.source,
            intent: Some(intent),
            classification: None,
            passthrough_reason: None,
            decomposition: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.source == IntentSource::Passthrough
    }

    pub fn requires_confirmation(&self) -> bool {
        self.intent
            .as_ref()
            .is_some_and(CommandIntent::requires_confirmation)
    }
}

/// Routes chat messages to canonical commands.
///
/// All state lives behind interior locks, so a router can be shared across
/// threads behind an `Arc`.
pub struct Router {
    cache: Arc<ResponseCache>,
    threads: Arc<ConversationThreads>,
    classifier: Arc<IntentClassifier>,
    experiments: Arc<ExperimentFramework>,
    matcher: PatternMatcher,
    parser: MultiIntentParser,
    /// Experiment whose variants supply classifier overrides
    threshold_experiment: RwLock<Option<String>>,
    metrics: Mutex<RouterMetrics>,
    last_decomposition: Mutex<Option<Decomposition>>,
}

impl Router {
    /// Build a router and all of its stores from configuration.
    pub fn new(config: &Config) -> Self {
        let catalog = config.entities.clone();
        let risk = RiskAssessor::new(config.classifier.production_markers.as_slice());

        let experiments = ExperimentFramework::new().with_archive(Box::new(JsonFileArchive::new(
            config.experiments.archive_dir(),
        )));

        let mut router = Self::with_components(
            Arc::new(ResponseCache::new(&config.cache)),
            Arc::new(ConversationThreads::new(&config.threads, catalog.clone())),
            Arc::new(IntentClassifier::new(
                &config.classifier,
                &config.history,
                catalog.clone(),
            )),
            Arc::new(experiments),
            PatternMatcher::new()
                .with_catalog(catalog.clone())
                .with_risk_assessor(risk),
            MultiIntentParser::new(catalog),
        );
        router.threshold_experiment = RwLock::new(config.experiments.threshold_experiment.clone());
        router
    }

    /// Build a router around existing stores.
    pub fn with_components(
        cache: Arc<ResponseCache>,
        threads: Arc<ConversationThreads>,
        classifier: Arc<IntentClassifier>,
        experiments: Arc<ExperimentFramework>,
        matcher: PatternMatcher,
        parser: MultiIntentParser,
    ) -> Self {
        Self {
            cache,
            threads,
            classifier,
            experiments,
            matcher,
            parser,
            threshold_experiment: RwLock::new(None),
            metrics: Mutex::new(RouterMetrics::default()),
            last_decomposition: Mutex::new(None),
        }
    }

    fn lock_metrics(&self) -> MutexGuard<'_, RouterMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ============================================
    // Routing
    // ============================================

    /// Resolve one message in the given context.
    pub fn resolve(&self, message: &str, ctx: &RouteContext) -> Resolution {
        self.lock_metrics().total += 1;

        let sanitized = sanitize(message);
        let text = sanitized.trim();
        if let Some(reason) = passthrough_reason(text) {
            tracing::debug!(chat_id = %ctx.chat_id, reason = reason.as_str(), "Passthrough");
            self.lock_metrics().passthroughs += 1;
            return Resolution::passthrough(message, reason);
        }

        let anaphoric = has_anaphora(text);
        if !anaphoric {
            if let Some(resolution) = self.from_cache(text, message, ctx) {
                return resolution;
            }
        }

        let parsed = self.parser.parse(text);
        let decomposition = parsed.is_multi_intent.then(|| Decomposition {
            chat_id: ctx.chat_id.clone(),
            total_intents: parsed.intents.len(),
            remaining_intents: parsed.intents.iter().skip(1).cloned().collect(),
            is_conditional: parsed.is_conditional,
            condition: parsed.condition,
        });
        if let Some(decomposition) = &decomposition {
            tracing::info!(
                chat_id = %ctx.chat_id,
                steps = decomposition.total_intents,
                conditional = decomposition.is_conditional,
                "Decomposed multi-intent message"
            );
            self.lock_metrics().multi_intents += 1;
            *self
                .last_decomposition
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(decomposition.clone());
        }
        let step = parsed.first().map_or(text, |s| s.text.as_str());

        let resolved = self.threads.resolve_pronouns(&ctx.chat_id, step);
        if resolved != step {
            tracing::debug!(from = step, to = %resolved, "Resolved pronouns");
        }

        let cacheable = !anaphoric && decomposition.is_none();
        let mut resolution = match self.matcher.match_intent(&resolved, ctx) {
            Some(mut intent) => {
                intent.original_message = message.to_string();
                self.lock_metrics().pattern_hits += 1;
                self.remember(ctx, &resolved, &intent);
                if cacheable && !self.was_corrected(&intent) {
                    self.cache.insert(text, ctx, &intent.canonical());
                }
                Resolution::command(intent)
            }
            None => self.classify(message, &resolved, text, cacheable, ctx),
        };

        resolution.decomposition = decomposition;
        tracing::info!(
            chat_id = %ctx.chat_id,
            source = resolution.source.as_str(),
            command = %resolution.text,
            "Routed message"
        );
        resolution
    }

    fn from_cache(&self, text: &str, message: &str, ctx: &RouteContext) -> Option<Resolution> {
        let command = self.cache.get(text, ctx)?;
        let mut intent = CommandIntent::from_canonical(&command, IntentSource::Cache, message)?;
        // Corrections recorded in any chat outrank cached commands.
        if self.was_corrected(&intent) {
            tracing::debug!(command = %command, "Skipping cached command with a learned correction");
            self.cache.invalidate(text, ctx);
            return None;
        }
        intent.set_risk(self.classifier.risk_assessor().assess_intent(&intent));

        self.lock_metrics().cache_hits += 1;
        self.remember(ctx, &command, &intent);
        Some(Resolution::command(intent))
    }

    fn was_corrected(&self, intent: &CommandIntent) -> bool {
        self.classifier
            .learner()
            .pattern(&intent.action, intent.target.as_deref())
            .is_some()
    }

    fn classify(
        &self,
        message: &str,
        resolved: &str,
        text: &str,
        cacheable: bool,
        ctx: &RouteContext,
    ) -> Resolution {
        let overrides = self.experiment_overrides(ctx);
        let classification = match &overrides {
            Some(params) => self.classifier.classify_with(resolved, ctx, params),
            None => self.classifier.classify(resolved, ctx),
        };

        match classification.command_intent(message) {
            Some(intent) => {
                self.lock_metrics().classifier_hits += 1;
                self.remember(ctx, resolved, &intent);
                // Per-user variant parameters must not leak across users.
                if cacheable && overrides.is_none() {
                    self.cache.insert(text, ctx, &intent.canonical());
                }
                Resolution {
                    classification: Some(classification),
                    ..Resolution::command(intent)
                }
            }
            None => {
                {
                    let mut metrics = self.lock_metrics();
                    metrics.passthroughs += 1;
                    if !classification.is_unknown() {
                        metrics.ambiguous += 1;
                    }
                }
                tracing::debug!(
                    intent = %classification.intent,
                    confidence = classification.confidence,
                    "Unresolved message"
                );
                self.threads.detect_and_record(&ctx.chat_id, resolved);
                Resolution {
                    classification: Some(classification),
                    ..Resolution::passthrough(message, PassthroughReason::Unresolved)
                }
            }
        }
    }

    /// Update conversation state after a command was chosen.
    fn remember(&self, ctx: &RouteContext, text: &str, intent: &CommandIntent) {
        self.threads.detect_and_record(&ctx.chat_id, text);
        self.threads
            .record_mention(&ctx.chat_id, MentionKind::Action, &intent.action);
        if let Some(target) = &intent.target {
            let kind = match scope_for_action(&intent.action) {
                ActionScope::Company => MentionKind::Company,
                _ => MentionKind::Repo,
            };
            self.threads.record_mention(&ctx.chat_id, kind, target);
        }
        self.classifier.record_action(&ctx.user_id, &intent.action);
    }

    fn experiment_overrides(&self, ctx: &RouteContext) -> Option<BTreeMap<String, f64>> {
        let id = self.threshold_experiment()?;
        if let Some(experiment) = self.experiments.experiment(&id) {
            if experiment.status == ExperimentStatus::Completed {
                tracing::debug!(experiment = %id, "Experiment ended, using shared parameters");
                return None;
            }
        }
        match self.experiments.get_variant(&id, &ctx.user_id) {
            Ok(variant) => Some(variant.params),
            Err(e) => {
                tracing::warn!(experiment = %id, error = %e, "Experiment lookup failed, using defaults");
                None
            }
        }
    }

    // ============================================
    // Feedback
    // ============================================

    /// Record that a human corrected `resolution` to `correction`.
    ///
    /// Returns the correction count for the corrected action and target, or
    /// `None` when the resolution carried nothing to learn from.
    pub fn record_correction(
        &self,
        resolution: &Resolution,
        correction: &str,
        ctx: &RouteContext,
    ) -> Option<u32> {
        self.record_experiment_outcome(ctx, Outcome::failure(None));

        let result = match (&resolution.classification, &resolution.intent) {
            (Some(classification), _) => classification.clone(),
            (None, Some(intent)) => ClassificationResult::from_intent(intent),
            (None, None) => return None,
        };
        if let Some(intent) = &resolution.intent {
            let sanitized = sanitize(&intent.original_message);
            self.cache.invalidate(sanitized.trim(), ctx);
        }
        Some(
            self.classifier
                .record_correction(&result, correction, &ctx.user_id),
        )
    }

    /// Record that a routed command ran without correction.
    pub fn record_success(&self, ctx: &RouteContext, latency_ms: Option<f64>) {
        self.record_experiment_outcome(ctx, Outcome::success(latency_ms));
    }

    fn record_experiment_outcome(&self, ctx: &RouteContext, outcome: Outcome) {
        let Some(id) = self.threshold_experiment() else {
            return;
        };
        if let Err(e) = self.experiments.record_outcome(&id, &ctx.user_id, outcome) {
            tracing::warn!(experiment = %id, error = %e, "Failed to record experiment outcome");
        }
    }

    // ============================================
    // Configuration and inspection
    // ============================================

    /// Bind classifier overrides to an experiment, or unbind with `None`.
    pub fn set_threshold_experiment(&self, experiment_id: Option<&str>) -> Result<()> {
        if let Some(id) = experiment_id {
            if self.experiments.experiment(id).is_none() {
                return Err(Error::ExperimentNotFound(id.to_string()));
            }
        }
        *self
            .threshold_experiment
            .write()
            .unwrap_or_else(PoisonError::into_inner) = experiment_id.map(str::to_string);
        tracing::info!(experiment = ?experiment_id, "Threshold experiment bound");
        Ok(())
    }

    pub fn threshold_experiment(&self) -> Option<String> {
        self.threshold_experiment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Append a custom pattern rule after the built-ins.
    pub fn add_rule(&mut self, spec: RuleSpec) -> Result<()> {
        self.matcher.add_rule(spec)
    }

    pub fn metrics(&self) -> RouterMetrics {
        *self.lock_metrics()
    }

    pub fn reset_metrics(&self) {
        *self.lock_metrics() = RouterMetrics::default();
    }

    /// The most recent multi-intent decomposition, from any chat.
    pub fn last_decomposition(&self) -> Option<Decomposition> {
        self.last_decomposition
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn threads(&self) -> &Arc<ConversationThreads> {
        &self.threads
    }

    pub fn classifier(&self) -> &Arc<IntentClassifier> {
        &self.classifier
    }

    pub fn experiments(&self) -> &Arc<ExperimentFramework> {
        &self.experiments
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityCatalog;
    use crate::experiments::Variant;
    use crate::types::Risk;

    fn router() -> Router {
        crate::logging::init_test();
        let config = Config {
            entities: EntityCatalog::new(&["JUDO", "LusoTown"], &["Acme"]),
            ..Config::default()
        };
        Router::new(&config)
    }

    fn ctx() -> RouteContext {
        RouteContext::new("u1", "c1")
    }

    #[test]
    fn chat_passes_through_untouched() {
        let router = router();
        for (msg, reason) in [
            ("", PassthroughReason::Empty),
            ("hey there", PassthroughReason::Greeting),
            ("thanks!", PassthroughReason::Thanks),
            ("can you deploy JUDO?", PassthroughReason::Question),
            ("add a login button to the header", PassthroughReason::CodingInstruction),
        ] {
            let resolution = router.resolve(msg, &ctx());
            assert!(resolution.is_passthrough(), "{msg}");
            assert_eq!(resolution.text, msg);
            assert_eq!(resolution.passthrough_reason, Some(reason), "{msg}");
        }
        assert_eq!(router.metrics().passthroughs, 5);
    }

    #[test]
    fn pattern_result_is_cached() {
        let router = router();
        let first = router.resolve("ship judo to prod", &ctx());
        assert_eq!(first.source, IntentSource::Pattern);
        assert_eq!(first.text, "deploy JUDO --env=production");
        assert!(first.requires_confirmation());

        let second = router.resolve("ship judo to prod", &ctx());
        assert_eq!(second.source, IntentSource::Cache);
        assert_eq!(second.text, first.text);
        assert!(second.requires_confirmation());

        let metrics = router.metrics();
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.pattern_hits, 1);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_hit_rate(), 0.5);
    }

    #[test]
    fn explicit_target_beats_auto_context() {
        let router = router();
        let ctx = ctx().with_auto_repo("LusoTown");
        assert_eq!(router.resolve("deploy JUDO", &ctx).text, "deploy JUDO");
        assert_eq!(router.resolve("restart", &ctx).text, "restart LusoTown");
    }

    #[test]
    fn pronouns_use_thread_state() {
        let router = router();
        router.resolve("build JUDO", &ctx());
        let resolution = router.resolve("restart it", &ctx());
        assert_eq!(resolution.text, "restart JUDO");
        assert_eq!(resolution.intent.unwrap().original_message, "restart it");

        // Another chat knows nothing about JUDO
        let other = RouteContext::new("u1", "c2");
        assert!(router.resolve("restart it", &other).is_passthrough());
    }

    #[test]
    fn anaphoric_messages_skip_the_cache() {
        let router = router();
        router.resolve("build JUDO", &ctx());
        router.resolve("restart it", &ctx());
        router.resolve("build LusoTown", &ctx());
        let resolution = router.resolve("restart it", &ctx());
        assert_eq!(resolution.text, "restart LusoTown");
        assert_eq!(resolution.source, IntentSource::Pattern);
    }

    #[test]
    fn multi_intent_routes_first_step() {
        let router = router();
        let resolution = router.resolve("run tests on JUDO and then deploy it", &ctx());
        assert_eq!(resolution.text, "test JUDO");

        let decomposition = resolution.decomposition.unwrap();
        assert_eq!(decomposition.total_intents, 2);
        assert_eq!(decomposition.remaining_intents[0].text, "deploy JUDO");
        assert!(decomposition.remaining_intents[0].is_sequential);
        assert_eq!(router.last_decomposition(), Some(decomposition));
        assert_eq!(router.metrics().multi_intents, 1);
    }

    #[test]
    fn classifier_handles_free_phrasing() {
        let router = router();
        let resolution = router.resolve("could you deploy judo for me", &ctx());
        assert_eq!(resolution.source, IntentSource::Classifier);
        assert_eq!(resolution.text, "deploy JUDO");
        assert!(resolution.classification.is_some());
        assert_eq!(resolution.intent.unwrap().risk(), Risk::High);
    }

    #[test]
    fn unresolved_returns_original_message() {
        let router = router();
        let resolution = router.resolve("the deploy of JUDO went well", &ctx());
        assert!(resolution.is_passthrough());
        assert_eq!(resolution.text, "the deploy of JUDO went well");
        assert_eq!(resolution.passthrough_reason, Some(PassthroughReason::Unresolved));
        assert!(resolution.classification.unwrap().ambiguous);
        assert_eq!(router.metrics().ambiguous, 1);
    }

    #[test]
    fn shell_syntax_is_stripped_before_routing() {
        let router = router();
        let resolution = router.resolve("deploy JUDO`whoami`", &ctx());
        assert_eq!(resolution.text, "deploy JUDO");
        assert_eq!(resolution.intent.unwrap().original_message, "deploy JUDO`whoami`");

        assert_eq!(router.resolve("status $(reboot)", &ctx()).text, "status");
    }

    #[test]
    fn correction_lowers_future_confidence() {
        let router = router();
        let first = router.resolve("could you deploy judo for me", &ctx());
        assert_eq!(router.record_correction(&first, "status JUDO", &ctx()), Some(1));

        let again = router.resolve("could you deploy judo for me", &ctx());
        assert!(again.is_passthrough());
        let classification = again.classification.unwrap();
        assert!(classification.ambiguous);
        assert!(classification.confidence < first.classification.unwrap().confidence);
    }

    #[test]
    fn correction_invalidates_cached_command() {
        let router = router();
        let first = router.resolve("build JUDO", &ctx());
        assert_eq!(router.cache().len(), 1);
        router.record_correction(&first, "test JUDO", &ctx());
        assert!(router.cache().is_empty());
    }

    #[test]
    fn correction_reaches_other_chats() {
        let router = router();
        let c1 = RouteContext::new("u1", "c1");
        let c2 = RouteContext::new("u2", "c2");
        let first = router.resolve("could you deploy judo for me", &c1);
        let other = router.resolve("could you deploy judo for me", &c2);
        assert_eq!(other.text, "deploy JUDO");
        assert_eq!(router.cache().len(), 2);

        router.record_correction(&first, "status JUDO", &c1);

        let again = router.resolve("could you deploy judo for me", &c2);
        assert_ne!(again.source, IntentSource::Cache);
        assert!(again.is_passthrough());
        assert!(again.classification.unwrap().ambiguous);
        assert!(router.cache().is_empty());
    }

    #[test]
    fn corrected_pattern_commands_are_not_cached() {
        let router = router();
        let first = router.resolve("build JUDO", &ctx());
        router.record_correction(&first, "test JUDO", &ctx());

        let other = RouteContext::new("u2", "c2");
        assert_eq!(router.resolve("build JUDO", &other).source, IntentSource::Pattern);
        assert_eq!(router.resolve("build JUDO", &other).source, IntentSource::Pattern);
        assert!(router.cache().is_empty());
    }

    #[test]
    fn ended_experiment_stops_overriding() {
        let router = router();
        router
            .experiments()
            .create_experiment(
                "strict",
                vec![Variant::new("strict", 1).with_param("clarification_threshold", 0.99)],
            )
            .unwrap();
        router.set_threshold_experiment(Some("strict")).unwrap();
        assert!(router.resolve("could you deploy judo for me", &ctx()).is_passthrough());

        router.experiments().end_experiment("strict", false).unwrap();

        let after = router.resolve("could you deploy judo for me", &ctx());
        assert_eq!(after.source, IntentSource::Classifier);
        assert_eq!(after.text, "deploy JUDO");
        // Shared parameters apply again, so the result is cacheable
        assert_eq!(router.cache().len(), 1);
    }

    #[test]
    fn threshold_experiment_binding() {
        let router = router();
        assert!(matches!(
            router.set_threshold_experiment(Some("missing")),
            Err(Error::ExperimentNotFound(_))
        ));

        router
            .experiments()
            .create_experiment(
                "strict",
                vec![Variant::new("strict", 1).with_param("clarification_threshold", 0.99)],
            )
            .unwrap();
        router.set_threshold_experiment(Some("strict")).unwrap();

        let resolution = router.resolve("could you deploy judo for me", &ctx());
        assert!(resolution.is_passthrough());

        router.record_success(&ctx(), Some(12.0));
        let results = router.experiments().get_results("strict").unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.variants[0].successes, 1);
    }
}
