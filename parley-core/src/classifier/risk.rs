//! Action risk tiers.

use crate::types::{ArgValue, CommandIntent, Risk};

const HIGH_RISK: &[&str] = &["deploy", "delete", "restart", "rollback", "destroy", "drop"];
const MEDIUM_RISK: &[&str] = &["create", "modify", "build", "update", "upgrade", "migrate"];
const LOW_RISK: &[&str] = &[
    "read", "check", "list", "test", "status", "logs", "deadlines", "company", "repos", "help",
];

/// Risk tier of an action before looking at its target.
///
/// Unrecognized verbs sit in the middle tier.
pub fn base_risk(action: &str) -> Risk {
    let action = action.to_lowercase();
    let action = action.as_str();
    if HIGH_RISK.contains(&action) {
        Risk::High
    } else if MEDIUM_RISK.contains(&action) {
        Risk::Medium
    } else if LOW_RISK.contains(&action) {
        Risk::Low
    } else {
        Risk::Medium
    }
}

/// Assigns risk from the action and whether the target looks like production.
#[derive(Debug, Clone)]
pub struct RiskAssessor {
    production_markers: Vec<String>,
}

impl Default for RiskAssessor {
    fn default() -> Self {
        Self::new(&["prod", "production", "live", "main", "master"])
    }
}

impl RiskAssessor {
    pub fn new<S: AsRef<str>>(markers: &[S]) -> Self {
        Self {
            production_markers: markers
                .iter()
                .map(|m| m.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// True when any word of `value` is a production marker.
    pub fn is_production(&self, value: &str) -> bool {
        value
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .any(|w| {
                let w = w.to_lowercase();
                self.production_markers.iter().any(|m| *m == w)
            })
    }

    pub fn assess(&self, action: &str, target: Option<&str>) -> Risk {
        let risk = base_risk(action);
        match target {
            Some(t) if self.is_production(t) => risk.escalate(),
            _ => risk,
        }
    }

    /// Risk of an intent, counting a production `env` arg like a target.
    pub fn assess_intent(&self, intent: &CommandIntent) -> Risk {
        let env_is_prod = matches!(
            intent.args.get("env"),
            Some(ArgValue::Text(env)) if self.is_production(env)
        );
        let target_is_prod = intent
            .target
            .as_deref()
            .is_some_and(|t| self.is_production(t));

        let risk = base_risk(&intent.action);
        if env_is_prod || target_is_prod {
            risk.escalate()
        } else {
            risk
        }
    }
}
