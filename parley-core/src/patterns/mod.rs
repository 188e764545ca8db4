//! Rule-based pattern matching
//!
//! An ordered library of tagged rules maps natural-language phrasings to
//! canonical commands. The first rule that matches wins, so precedence is the
//! order of [`BUILTIN_RULES`] followed by any custom rules.
//!
//! ## Slot filling
//!
//! A rule's target comes from its `target` capture. Only when that capture is
//! empty (or a bare pronoun) is the session's auto-context consulted:
//!
//! ```text
//! explicit capture  >  context.auto_repo / auto_company  >  nothing
//! ```
//!
//! A rule whose required slot stays empty does not match, and matching moves
//! on to the next rule.

pub mod auto_context;

pub use auto_context::apply_auto_context;

use crate::classifier::risk::RiskAssessor;
use crate::entities::{trim_token, EntityCatalog};
use crate::error::{Error, Result};
use crate::types::{collapse_whitespace, ArgValue, CommandIntent, IntentSource, RouteContext};
use regex::{Regex, RegexBuilder};

/// Placeholder expanded to the target capture group in rule patterns.
const TARGET_PLACEHOLDER: &str = "{T}";
const TARGET_GROUP: &str = r"(?P<target>[A-Za-z0-9][\w.\-]*)";

/// What kind of entity fills an action's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    Repo,
    Company,
    Unscoped,
}

/// Target slot of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub scope: ActionScope,
    /// Rule does not match without a target
    pub required: bool,
    /// Auto-context may fill an empty target
    pub auto_fill: bool,
}

impl Slot {
    const fn repo(required: bool) -> Self {
        Self {
            scope: ActionScope::Repo,
            required,
            auto_fill: true,
        }
    }

    const fn company(required: bool) -> Self {
        Self {
            scope: ActionScope::Company,
            required,
            auto_fill: true,
        }
    }

    /// Target must be typed out; never filled from context.
    const fn explicit_repo() -> Self {
        Self {
            scope: ActionScope::Repo,
            required: true,
            auto_fill: false,
        }
    }
}

/// Definition of a rule before compilation.
#[derive(Debug, Clone)]
pub struct RuleSpec {
    pub name: String,
    /// Case-insensitive regex; `{T}` expands to the `target` capture
    pub pattern: String,
    pub action: String,
    pub slot: Option<Slot>,
}

impl RuleSpec {
    pub fn new(name: &str, pattern: &str, action: &str, slot: Option<Slot>) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            action: action.to_string(),
            slot,
        }
    }
}

struct BuiltinRule {
    name: &'static str,
    pattern: &'static str,
    action: &'static str,
    slot: Option<Slot>,
}

const ENV: &str = r"(?P<env>prod(?:uction)?|staging|stage|dev(?:elopment)?|qa|preview|live)";

/// Built-in rules, in precedence order.
const BUILTIN_RULES: &[BuiltinRule] = &[
    BuiltinRule {
        name: "run-tests",
        pattern: r"^(?:please\s+)?(?:run|execute|kick\s+off|start)\s+(?:the\s+|all\s+)?(?:unit\s+|integration\s+|e2e\s+)?tests?(?:\s+(?:on|for|in|against)\s+(?:the\s+)?{T})?$",
        action: "test",
        slot: Some(Slot::repo(false)),
    },
    BuiltinRule {
        name: "test",
        pattern: r"^(?:please\s+)?test(?:\s+(?:the\s+)?{T})?$",
        action: "test",
        slot: Some(Slot::repo(false)),
    },
    BuiltinRule {
        name: "deploy",
        pattern: r"^(?:please\s+)?(?:deploy|ship|release|launch)(?:\s+(?:the\s+)?{T})?(?:\s+(?:to|on|in)\s+{ENV})?(?:\s+now)?$",
        action: "deploy",
        slot: Some(Slot::repo(true)),
    },
    BuiltinRule {
        name: "restart",
        pattern: r"^(?:please\s+)?(?:restart|reboot|bounce|reload)(?:\s+(?:the\s+)?{T})?(?:\s+(?:server|service|app|container|pod)s?)?(?:\s+(?:on|in)\s+{ENV})?$",
        action: "restart",
        slot: Some(Slot::repo(true)),
    },
    BuiltinRule {
        name: "rollback",
        pattern: r"^(?:please\s+)?(?:roll\s*back|revert)(?:\s+(?:the\s+)?{T})?(?:\s+(?:deploy(?:ment)?|release))?(?:\s+(?:on|in)\s+{ENV})?$",
        action: "rollback",
        slot: Some(Slot::repo(true)),
    },
    BuiltinRule {
        name: "build",
        pattern: r"^(?:please\s+)?(?:build|compile)(?:\s+(?:the\s+)?{T})?$",
        action: "build",
        slot: Some(Slot::repo(true)),
    },
    BuiltinRule {
        name: "logs",
        pattern: r"^(?:please\s+)?(?:(?:show|get|tail|view|check|pull|fetch)\s+(?:me\s+)?)?(?:the\s+)?(?:(?P<target2>[A-Za-z0-9][\w.\-]*)\s+)?(?:error\s+|recent\s+|latest\s+)?logs?(?:\s+(?:(?:for|of|from|on)\s+)?(?:the\s+)?{T})?$",
        action: "logs",
        slot: Some(Slot::repo(false)),
    },
    BuiltinRule {
        name: "status",
        pattern: r"^(?:please\s+)?(?:(?:show|get|check|give\s+me)\s+)?(?:the\s+)?status(?:\s+(?:(?:of|for|on)\s+)?(?:the\s+)?{T})?$",
        action: "status",
        slot: Some(Slot::repo(false)),
    },
    BuiltinRule {
        name: "deadlines",
        pattern: r"^(?:please\s+)?(?:(?:show|list|get|check)\s+(?:me\s+)?)?(?:(?:the|all|upcoming|my)\s+)*(?:(?P<target2>[A-Za-z0-9][\w.\-]*)\s+)?deadlines?(?:\s+(?:(?:for|of|at)\s+)?(?:the\s+)?{T})?$",
        action: "deadlines",
        slot: Some(Slot::company(false)),
    },
    BuiltinRule {
        name: "repos",
        pattern: r"^(?:please\s+)?(?:(?:list|show|get)\s+(?:me\s+)?)?(?:(?:all|my|the)\s+)*(?:repos|repositories|projects)(?:\s+(?:(?:for|of|at|in)\s+)?(?:the\s+)?{T})?$",
        action: "repos",
        slot: Some(Slot::company(false)),
    },
    BuiltinRule {
        name: "company-lookup",
        pattern: r"^(?:please\s+)?(?:look\s*up|tell\s+me\s+about|info\s+(?:on|for|about)|details\s+(?:on|for))\s+(?:the\s+)?(?:(?:company|org|organization|client)\s+)?{T}$",
        action: "company",
        slot: Some(Slot::company(true)),
    },
    BuiltinRule {
        name: "company-info",
        pattern: r"^(?:company|org|organization)(?:\s+info)?(?:\s+{T})?$",
        action: "company",
        slot: Some(Slot::company(true)),
    },
    BuiltinRule {
        name: "create",
        pattern: r"^(?:please\s+)?(?:create|init|initialize|scaffold)\s+(?:a\s+)?(?:new\s+)?(?:repo|repository|project)(?:\s+(?:called|named))?\s+{T}$",
        action: "create",
        slot: Some(Slot::explicit_repo()),
    },
    BuiltinRule {
        name: "delete",
        pattern: r"^(?:please\s+)?(?:delete|destroy)\s+(?:the\s+)?(?:(?:repo|repository|project|branch)\s+)?{T}(?:\s+(?:repo|repository|project))?$",
        action: "delete",
        slot: Some(Slot::explicit_repo()),
    },
    BuiltinRule {
        name: "status-check",
        pattern: r"^(?:please\s+)?(?:check\s+(?:on\s+)?|how\s+is\s+|how's\s+)(?:the\s+)?{T}(?:\s+doing)?$",
        action: "status",
        slot: Some(Slot::repo(true)),
    },
    BuiltinRule {
        name: "help",
        pattern: r"^(?:help|commands|show\s+commands|what\s+can\s+you\s+do)$",
        action: "help",
        slot: None,
    },
];

/// Words that can lead a command. Used to decide whether a clause looks
/// like an instruction.
pub const COMMAND_VERBS: &[&str] = &[
    "deploy", "ship", "release", "launch", "push", "run", "execute", "test", "check", "show",
    "get", "list", "view", "tail", "display", "restart", "reboot", "bounce", "reload", "stop",
    "start", "rollback", "revert", "roll", "build", "compile", "delete", "destroy", "remove",
    "create", "init", "initialize", "scaffold", "update", "upgrade", "merge", "open", "close",
    "fetch", "pull", "sync", "backup", "migrate", "lookup", "look", "find", "search", "status",
    "logs", "help", "monitor", "watch", "ping", "scale", "notify", "send", "tell", "verify",
];

/// Verb to canonical action.
const VERB_ACTIONS: &[(&str, &str)] = &[
    ("deploy", "deploy"),
    ("ship", "deploy"),
    ("release", "deploy"),
    ("launch", "deploy"),
    ("test", "test"),
    ("tests", "test"),
    ("status", "status"),
    ("check", "status"),
    ("logs", "logs"),
    ("log", "logs"),
    ("tail", "logs"),
    ("restart", "restart"),
    ("reboot", "restart"),
    ("bounce", "restart"),
    ("reload", "restart"),
    ("rollback", "rollback"),
    ("revert", "rollback"),
    ("build", "build"),
    ("compile", "build"),
    ("delete", "delete"),
    ("destroy", "delete"),
    ("create", "create"),
    ("init", "create"),
    ("scaffold", "create"),
    ("deadlines", "deadlines"),
    ("deadline", "deadlines"),
    ("company", "company"),
    ("lookup", "company"),
    ("repos", "repos"),
    ("help", "help"),
];

/// Tokens a target capture may pick up that never name an entity.
const NON_TARGETS: &[&str] = &[
    "it", "that", "them", "this", "there", "they", "their", "me", "my", "the", "all", "a", "an",
    "our", "error", "errors", "recent", "latest", "last", "upcoming", "status", "logs", "log",
    "tests", "test", "deadlines", "repos", "projects", "again", "now", "please", "everything",
];

/// Pronouns that stand for a previously mentioned target.
pub(crate) const PRONOUNS: &[&str] = &["it", "that", "them", "this", "there", "they", "their"];

pub fn is_command_verb(word: &str) -> bool {
    let word = word.to_lowercase();
    COMMAND_VERBS.contains(&word.as_str())
}

/// Canonical action for a leading verb, if it names one.
pub fn action_for_verb(word: &str) -> Option<&'static str> {
    let word = word.to_lowercase();
    VERB_ACTIONS
        .iter()
        .find(|(verb, _)| *verb == word)
        .map(|(_, action)| *action)
}

/// Entity kind an action targets.
pub fn scope_for_action(action: &str) -> ActionScope {
    match action {
        "deploy" | "status" | "test" | "logs" | "restart" | "rollback" | "build" | "delete"
        | "create" => ActionScope::Repo,
        "deadlines" | "company" | "repos" => ActionScope::Company,
        _ => ActionScope::Unscoped,
    }
}

/// Whether an empty target of `action` may be filled from session context.
///
/// Destructive and creating actions always need an explicit target.
pub fn allows_auto_fill(action: &str) -> bool {
    !matches!(action, "delete" | "create")
}

pub(crate) fn is_non_target(word: &str) -> bool {
    let word = word.to_lowercase();
    NON_TARGETS.contains(&word.as_str())
}

struct Rule {
    name: String,
    regex: Regex,
    action: String,
    slot: Option<Slot>,
}

fn compile(spec: &RuleSpec) -> Result<Rule> {
    let pattern = spec
        .pattern
        .replace(TARGET_PLACEHOLDER, TARGET_GROUP)
        .replace("{ENV}", ENV);
    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::InvalidRule {
            name: spec.name.clone(),
            message: e.to_string(),
        })?;
    Ok(Rule {
        name: spec.name.clone(),
        regex,
        action: spec.action.clone(),
        slot: spec.slot,
    })
}

/// Ordered rule library.
pub struct PatternMatcher {
    rules: Vec<Rule>,
    catalog: EntityCatalog,
    risk: RiskAssessor,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher {
    /// Matcher with the built-in rules.
    pub fn new() -> Self {
        let rules = BUILTIN_RULES
            .iter()
            .filter_map(|b| {
                let spec = RuleSpec::new(b.name, b.pattern, b.action, b.slot);
                match compile(&spec) {
                    Ok(rule) => Some(rule),
                    Err(e) => {
                        tracing::error!(rule = b.name, error = %e, "Skipping built-in rule");
                        None
                    }
                }
            })
            .collect();

        Self {
            rules,
            catalog: EntityCatalog::default(),
            risk: RiskAssessor::default(),
        }
    }

    /// Canonicalize target spelling against known entities.
    pub fn with_catalog(mut self, catalog: EntityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_risk_assessor(mut self, risk: RiskAssessor) -> Self {
        self.risk = risk;
        self
    }

    /// Append a rule after all existing rules.
    pub fn add_rule(&mut self, spec: RuleSpec) -> Result<()> {
        let rule = compile(&spec)?;
        tracing::info!(rule = %rule.name, "Registered pattern rule");
        self.rules.push(rule);
        Ok(())
    }

    /// Insert a rule at `index` so it takes precedence over later rules.
    pub fn insert_rule(&mut self, index: usize, spec: RuleSpec) -> Result<()> {
        let rule = compile(&spec)?;
        tracing::info!(rule = %rule.name, index, "Registered pattern rule");
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
        Ok(())
    }

    /// Rule names in precedence order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Canonical command for `text`, if any rule matches.
    pub fn match_command(&self, text: &str, ctx: &RouteContext) -> Option<String> {
        self.match_intent(text, ctx).map(|intent| intent.canonical())
    }

    /// Full intent for `text`, if any rule matches.
    pub fn match_intent(&self, text: &str, ctx: &RouteContext) -> Option<CommandIntent> {
        let normalized = collapse_whitespace(text.trim().trim_end_matches(['.', '!']));
        if normalized.is_empty() {
            return None;
        }

        for rule in &self.rules {
            let Some(caps) = rule.regex.captures(&normalized) else {
                continue;
            };

            let explicit = ["target", "target2"]
                .iter()
                .filter_map(|name| caps.name(name))
                .map(|m| trim_token(m.as_str()))
                .find(|t| !t.is_empty() && !is_non_target(t))
                .map(|t| self.canonical_target(t, rule.slot));

            let target = match rule.slot {
                Some(slot) => {
                    let target = explicit.or_else(|| {
                        if !slot.auto_fill {
                            return None;
                        }
                        match slot.scope {
                            ActionScope::Repo => ctx.repo().map(str::to_string),
                            ActionScope::Company => ctx.company().map(str::to_string),
                            ActionScope::Unscoped => None,
                        }
                    });
                    if slot.required && target.is_none() {
                        tracing::debug!(rule = %rule.name, "Required slot unfilled");
                        continue;
                    }
                    target
                }
                None => None,
            };

            let mut intent =
                CommandIntent::new(rule.action.clone(), target, IntentSource::Pattern, text);
            for name in rule.regex.capture_names().flatten() {
                if name == "target" || name == "target2" {
                    continue;
                }
                if let Some(m) = caps.name(name) {
                    let value = if name == "env" {
                        normalize_env(m.as_str())
                    } else {
                        m.as_str().to_lowercase()
                    };
                    intent = intent.with_arg(name, ArgValue::Text(value));
                }
            }

            intent.set_risk(self.risk.assess_intent(&intent));
            tracing::debug!(
                rule = %rule.name,
                command = %intent.canonical(),
                "Pattern matched"
            );
            return Some(intent);
        }

        self.match_flagged(&normalized, text, ctx)
    }

    /// A command typed out with `--flags`, such as `deploy --force`.
    ///
    /// The session target is filled in the same way as for bare rule matches.
    fn match_flagged(
        &self,
        normalized: &str,
        original: &str,
        ctx: &RouteContext,
    ) -> Option<CommandIntent> {
        let mut tokens = normalized.split_whitespace();
        let verb = tokens.next()?.to_lowercase();
        let rest: Vec<&str> = tokens.collect();
        let flags = rest.iter().filter(|t| t.starts_with("--")).count();
        if flags == 0 || rest.len() - flags > 1 || action_for_verb(&verb) != Some(verb.as_str()) {
            return None;
        }

        let rendered = std::iter::once(verb.as_str())
            .chain(rest.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let command = apply_auto_context(&rendered, ctx);
        let mut intent = CommandIntent::from_canonical(&command, IntentSource::Pattern, original)?;

        let slot = self
            .rules
            .iter()
            .find(|r| r.action == intent.action)
            .and_then(|r| r.slot);
        intent.target = intent
            .target
            .take()
            .filter(|t| !is_non_target(t))
            .map(|t| self.canonical_target(&t, slot));
        if slot.is_some_and(|s| s.required) && intent.target.is_none() {
            return None;
        }
        if let Some(ArgValue::Text(env)) = intent.args.get_mut("env") {
            *env = normalize_env(env);
        }

        intent.set_risk(self.risk.assess_intent(&intent));
        tracing::debug!(command = %intent.canonical(), "Flagged command matched");
        Some(intent)
    }

    fn canonical_target(&self, raw: &str, slot: Option<Slot>) -> String {
        let known = match slot.map(|s| s.scope) {
            Some(ActionScope::Company) => self.catalog.company(raw),
            _ => self.catalog.repo(raw),
        };
        known.unwrap_or(raw).to_string()
    }
}

/// Collapse environment aliases to one spelling.
pub fn normalize_env(env: &str) -> String {
    match env.to_lowercase().as_str() {
        "prod" | "production" | "live" => "production".to_string(),
        "stage" | "staging" => "staging".to_string(),
        "dev" | "development" => "dev".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RouteContext {
        RouteContext::new("u1", "c1")
    }

    #[test]
    fn explicit_target_beats_auto_context() {
        let matcher = PatternMatcher::new();
        let ctx = ctx().with_auto_repo("LusoTown");
        assert_eq!(
            matcher.match_command("deploy JUDO", &ctx).as_deref(),
            Some("deploy JUDO")
        );
    }

    #[test]
    fn auto_context_fills_empty_slot() {
        let matcher = PatternMatcher::new();
        let ctx = ctx().with_auto_repo("JUDO");
        assert_eq!(matcher.match_command("deploy", &ctx).as_deref(), Some("deploy JUDO"));
    }

    #[test]
    fn required_slot_without_context_does_not_match() {
        let matcher = PatternMatcher::new();
        assert_eq!(matcher.match_command("deploy", &ctx()), None);
        assert_eq!(matcher.match_command("restart", &ctx()), None);
    }

    #[test]
    fn pronoun_capture_counts_as_empty() {
        let matcher = PatternMatcher::new();
        assert_eq!(matcher.match_command("deploy it", &ctx()), None);
        assert_eq!(
            matcher
                .match_command("deploy it", &ctx().with_auto_repo("JUDO"))
                .as_deref(),
            Some("deploy JUDO")
        );
    }

    #[test]
    fn optional_slot_matches_bare() {
        let matcher = PatternMatcher::new();
        assert_eq!(matcher.match_command("status", &ctx()).as_deref(), Some("status"));
        assert_eq!(matcher.match_command("run tests", &ctx()).as_deref(), Some("test"));
        assert_eq!(
            matcher.match_command("show me the logs", &ctx()).as_deref(),
            Some("logs")
        );
    }

    #[test]
    fn common_phrasings() {
        let matcher = PatternMatcher::new();
        let cases = [
            ("run tests on JUDO", "test JUDO"),
            ("please run the unit tests for LusoTown", "test LusoTown"),
            ("ship JUDO to prod", "deploy JUDO --env=production"),
            ("Deploy JUDO to staging!", "deploy JUDO --env=staging"),
            ("status of JUDO", "status JUDO"),
            ("check JUDO", "status JUDO"),
            ("how's LusoTown doing", "status LusoTown"),
            ("show logs for JUDO", "logs JUDO"),
            ("tail JUDO logs", "logs JUDO"),
            ("show me error logs", "logs"),
            ("restart the api server", "restart api"),
            ("roll back JUDO", "rollback JUDO"),
            ("build JUDO", "build JUDO"),
            ("deadlines for Acme", "deadlines Acme"),
            ("show upcoming deadlines", "deadlines"),
            ("list repos for Acme", "repos Acme"),
            ("lookup Acme", "company Acme"),
            ("tell me about the company Globex", "company Globex"),
            ("create a new project called Atlas", "create Atlas"),
            ("delete the repo scratchpad", "delete scratchpad"),
            ("help", "help"),
            ("status JUDO", "status JUDO"),
            ("logs JUDO", "logs JUDO"),
            ("deadlines Acme", "deadlines Acme"),
            ("repos Acme", "repos Acme"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                matcher.match_command(input, &ctx()).as_deref(),
                Some(expected),
                "input: {input}"
            );
        }
    }

    #[test]
    fn company_rules_use_company_context() {
        let matcher = PatternMatcher::new();
        let ctx = ctx().with_auto_repo("JUDO").with_auto_company("Acme");
        assert_eq!(matcher.match_command("deadlines", &ctx).as_deref(), Some("deadlines Acme"));
        assert_eq!(matcher.match_command("list repos", &ctx).as_deref(), Some("repos Acme"));
    }

    #[test]
    fn destructive_rules_never_use_context() {
        let matcher = PatternMatcher::new();
        let ctx = ctx().with_auto_repo("JUDO");
        assert_eq!(matcher.match_command("delete it", &ctx), None);
    }

    #[test]
    fn catalog_normalizes_spelling() {
        let matcher =
            PatternMatcher::new().with_catalog(EntityCatalog::new(&["JUDO"], &["Acme"]));
        assert_eq!(matcher.match_command("deploy judo", &ctx()).as_deref(), Some("deploy JUDO"));
        assert_eq!(
            matcher.match_command("deadlines for acme", &ctx()).as_deref(),
            Some("deadlines Acme")
        );
    }

    #[test]
    fn risk_is_assessed() {
        let matcher = PatternMatcher::new();
        let deploy = matcher.match_intent("deploy JUDO", &ctx()).unwrap();
        assert!(deploy.requires_confirmation());

        let logs = matcher.match_intent("show logs for JUDO", &ctx()).unwrap();
        assert!(!logs.requires_confirmation());
        assert_eq!(logs.source, IntentSource::Pattern);
        assert_eq!(logs.original_message, "show logs for JUDO");
    }

    #[test]
    fn chat_is_not_matched() {
        let matcher = PatternMatcher::new();
        for msg in ["I love this weather", "pros and cons of rust", "the deploy was great"] {
            assert_eq!(matcher.match_command(msg, &ctx()), None, "{msg}");
        }
    }

    #[test]
    fn flagged_commands_take_session_target() {
        let matcher = PatternMatcher::new();
        let bound = ctx().with_auto_repo("JUDO");
        assert_eq!(
            matcher.match_command("deploy --force", &bound).as_deref(),
            Some("deploy JUDO --force")
        );
        assert_eq!(
            matcher.match_command("deploy LusoTown --env=prod", &bound).as_deref(),
            Some("deploy LusoTown --env=production")
        );
        // Destructive verbs still need the target typed out
        assert_eq!(matcher.match_command("delete --force", &bound), None);
        assert_eq!(matcher.match_command("deploy --force", &ctx()), None);
        // Synonyms and extra words are left to the rules and the classifier
        assert_eq!(matcher.match_command("ship --force", &bound), None);
        assert_eq!(matcher.match_command("deploy the app --force", &bound), None);
    }

    #[test]
    fn custom_rules() {
        let mut matcher = PatternMatcher::new();
        let bad = RuleSpec::new("bad", r"^(unclosed", "noop", None);
        assert!(matches!(matcher.add_rule(bad), Err(Error::InvalidRule { .. })));

        matcher
            .insert_rule(
                0,
                RuleSpec::new("ping", r"^ping\s+{T}$", "ping", Some(Slot::repo(true))),
            )
            .unwrap();
        assert_eq!(matcher.rule_names()[0], "ping");
        assert_eq!(matcher.match_command("ping JUDO", &ctx()).as_deref(), Some("ping JUDO"));
    }

    #[test]
    fn builtin_rules_all_compile() {
        let matcher = PatternMatcher::new();
        assert_eq!(matcher.rule_names().len(), BUILTIN_RULES.len());
    }

    #[test]
    fn verb_tables() {
        assert!(is_command_verb("Deploy"));
        assert!(!is_command_verb("pros"));
        assert_eq!(action_for_verb("ship"), Some("deploy"));
        assert_eq!(action_for_verb("banana"), None);
        assert_eq!(scope_for_action("deadlines"), ActionScope::Company);
        assert!(!allows_auto_fill("delete"));
        assert_eq!(normalize_env("PROD"), "production");
    }
}
