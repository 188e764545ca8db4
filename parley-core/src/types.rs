//! Core domain types for parley
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Canonical command** | Normalized, executable rendering of an intent (verb + target + flags) |
//! | **Passthrough** | The original message handed on unchanged because no command should be extracted |
//! | **Auto-context** | Session default repo/company used to fill an intent's missing target |
//! | **Ambiguous** | A classification below the clarification threshold |
//!
//! A [`CommandIntent`] is the only thing the skill layer ever sees. Its
//! canonical string is derived from `(action, target, args)` alone, so two
//! intents that render the same are interchangeable downstream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================
// Routing context
// ============================================

/// Per-message context supplied by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteContext {
    pub user_id: String,
    pub chat_id: String,
    /// Active project for this session, used to fill missing repo targets
    #[serde(default)]
    pub auto_repo: Option<String>,
    /// Active organization for this session, used to fill missing company targets
    #[serde(default)]
    pub auto_company: Option<String>,
}

impl RouteContext {
    pub fn new(user_id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            auto_repo: None,
            auto_company: None,
        }
    }

    pub fn with_auto_repo(mut self, repo: impl Into<String>) -> Self {
        self.auto_repo = Some(repo.into());
        self
    }

    pub fn with_auto_company(mut self, company: impl Into<String>) -> Self {
        self.auto_company = Some(company.into());
        self
    }

    /// Auto-context values with blank strings treated as unset.
    pub fn repo(&self) -> Option<&str> {
        self.auto_repo.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn company(&self) -> Option<&str> {
        self.auto_company
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ============================================
// Intent metadata
// ============================================

/// Where a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Pattern,
    Classifier,
    Cache,
    Passthrough,
}

impl IntentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentSource::Pattern => "pattern",
            IntentSource::Classifier => "classifier",
            IntentSource::Cache => "cache",
            IntentSource::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for IntentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side-effect risk of executing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

impl Risk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::Low => "low",
            Risk::Medium => "medium",
            Risk::High => "high",
        }
    }

    /// One tier up, saturating at `High`.
    pub fn escalate(self) -> Self {
        match self {
            Risk::Low => Risk::Medium,
            Risk::Medium | Risk::High => Risk::High,
        }
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of an optional command flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Flag(bool),
    Text(String),
}

// ============================================
// CommandIntent
// ============================================

/// A resolved, executable intent.
///
/// `risk` and `requires_confirmation` are private so they can only change
/// together: a high-risk intent always requires confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandIntent {
    pub action: String,
    pub target: Option<String>,
    pub args: BTreeMap<String, ArgValue>,
    pub confidence: f64,
    pub source: IntentSource,
    pub original_message: String,
    risk: Risk,
    requires_confirmation: bool,
}

impl CommandIntent {
    pub fn new(
        action: impl Into<String>,
        target: Option<String>,
        source: IntentSource,
        original_message: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            target,
            args: BTreeMap::new(),
            confidence: 1.0,
            source,
            original_message: original_message.into(),
            risk: Risk::Low,
            requires_confirmation: false,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: ArgValue) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_risk(mut self, risk: Risk) -> Self {
        self.set_risk(risk);
        self
    }

    pub fn set_risk(&mut self, risk: Risk) {
        self.risk = risk;
        self.requires_confirmation = risk == Risk::High;
    }

    pub fn risk(&self) -> Risk {
        self.risk
    }

    pub fn requires_confirmation(&self) -> bool {
        self.requires_confirmation
    }

    /// Render the executable command string.
    ///
    /// `--key` for true flags, nothing for false flags, `--key=value` for text.
    pub fn canonical(&self) -> String {
        let mut out = self.action.clone();
        if let Some(target) = self.target.as_deref().filter(|t| !t.is_empty()) {
            out.push(' ');
            out.push_str(target);
        }
        for (key, value) in &self.args {
            match value {
                ArgValue::Flag(true) => {
                    out.push_str(" --");
                    out.push_str(key);
                }
                ArgValue::Flag(false) => {}
                ArgValue::Text(text) => {
                    out.push_str(&format!(" --{}={}", key, text));
                }
            }
        }
        out
    }

    /// Parse a rendered command back into an intent.
    ///
    /// The first bare token after the action is the target; `--key` and
    /// `--key=value` tokens become args. Risk is left at its default.
    pub fn from_canonical(
        command: &str,
        source: IntentSource,
        original_message: impl Into<String>,
    ) -> Option<Self> {
        let mut tokens = command.split_whitespace();
        let action = tokens.next()?;
        let mut intent = Self::new(action, None, source, original_message);
        for token in tokens {
            if let Some(flag) = token.strip_prefix("--") {
                let (key, value) = match flag.split_once('=') {
                    Some((key, value)) => (key, ArgValue::Text(value.to_string())),
                    None => (flag, ArgValue::Flag(true)),
                };
                intent.args.insert(key.to_string(), value);
            } else if intent.target.is_none() {
                intent.target = Some(token.to_string());
            }
        }
        Some(intent)
    }

    /// True when the canonical form differs from what the user typed.
    pub fn is_transformed(&self) -> bool {
        self.canonical() != self.original_message
    }
}

impl fmt::Display for CommandIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Collapse whitespace runs and trim.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
