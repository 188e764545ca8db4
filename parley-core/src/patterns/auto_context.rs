//! Auto-context injection for rendered commands.

use super::{allows_auto_fill, scope_for_action, ActionScope};
use crate::types::RouteContext;

/// Insert the session's default target into a command that lacks one.
///
/// The target goes right after the verb, ahead of any `--flags`. Commands
/// that already name a target, or whose verb takes no target, come back
/// unchanged.
pub fn apply_auto_context(command: &str, ctx: &RouteContext) -> String {
    let mut tokens = command.split_whitespace();
    let Some(verb) = tokens.next() else {
        return command.to_string();
    };
    let rest: Vec<&str> = tokens.collect();

    if rest.iter().any(|t| !t.starts_with("--")) {
        return command.to_string();
    }

    let action = verb.to_lowercase();
    if !allows_auto_fill(&action) {
        return command.to_string();
    }

    let fill = match scope_for_action(&action) {
        ActionScope::Repo => ctx.repo(),
        ActionScope::Company => ctx.company(),
        ActionScope::Unscoped => None,
    };

    match fill {
        Some(target) => {
            let mut parts = Vec::with_capacity(rest.len() + 2);
            parts.push(verb);
            parts.push(target);
            parts.extend(rest);
            parts.join(" ")
        }
        None => command.to_string(),
    }
}
