//! Text rendering for resolutions and classifications.

use parley_core::{ClassificationResult, Resolution, RouterMetrics};
use parley_core::thread::ThreadState;

/// Multi-line summary of a routing decision.
pub fn resolution_text(resolution: &Resolution) -> String {
    let mut lines = vec![resolution.text.clone()];

    match (&resolution.intent, resolution.passthrough_reason) {
        (Some(intent), _) => {
            let confirm = if intent.requires_confirmation() {
                " (confirm before running)"
            } else {
                ""
            };
            lines.push(format!("  source: {}", resolution.source));
            lines.push(format!("  risk:   {}{}", intent.risk(), confirm));
        }
        (None, Some(reason)) => lines.push(format!("  passthrough: {}", reason.as_str())),
        (None, None) => {}
    }

    if let Some(classification) = &resolution.classification {
        lines.push(format!(
            "  classified as {} ({:.2})",
            classification.intent, classification.confidence
        ));
        for question in &classification.clarifying_questions {
            lines.push(format!("  ? {question}"));
        }
    }

    if let Some(decomposition) = &resolution.decomposition {
        for step in &decomposition.remaining_intents {
            let marker = if decomposition.is_conditional {
                "on success"
            } else if step.is_sequential {
                "then"
            } else {
                "also"
            };
            lines.push(format!("  {marker}: {}", step.text));
        }
    }

    lines.join("\n")
}

pub fn classification_text(result: &ClassificationResult) -> String {
    let mut lines = vec![format!(
        "{} (confidence {:.2}{})",
        result.intent,
        result.confidence,
        if result.ambiguous { ", ambiguous" } else { "" }
    )];
    if let Some(target) = result.target() {
        lines.push(format!("  target: {target}"));
    }
    if let Some(env) = &result.environment {
        lines.push(format!("  env:    {env}"));
    }
    lines.push(format!("  risk:   {}", result.risk));
    let f = &result.factors;
    lines.push(format!(
        "  factors: keyword={:.2} context={:.2} history={:.2} specificity={:.2}",
        f.keyword, f.context, f.history, f.specificity
    ));
    if let Some(corrected) = &result.corrected_text {
        lines.push(format!("  corrected: {corrected}"));
    }
    for question in &result.clarifying_questions {
        lines.push(format!("  ? {question}"));
    }
    lines.join("\n")
}

pub fn metrics_text(metrics: &RouterMetrics) -> String {
    format!(
        "messages: {}\n  pattern:     {} ({:.0}%)\n  classifier:  {} ({:.0}%)\n  cache:       {} ({:.0}%)\n  passthrough: {} ({:.0}%)\n  multi-intent: {}\n  ambiguous:   {}",
        metrics.total,
        metrics.pattern_hits,
        metrics.pattern_rate() * 100.0,
        metrics.classifier_hits,
        metrics.classifier_rate() * 100.0,
        metrics.cache_hits,
        metrics.cache_hit_rate() * 100.0,
        metrics.passthroughs,
        metrics.passthrough_rate() * 100.0,
        metrics.multi_intents,
        metrics.ambiguous,
    )
}

pub fn thread_text(state: Option<&ThreadState>) -> String {
    let Some(state) = state else {
        return "no thread state".to_string();
    };
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    format!(
        "repo: {}\ncompany: {}\naction: {}\nrecent repos: {}",
        show(&state.last_repo),
        show(&state.last_company),
        show(&state.last_action),
        state
            .repo_history
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    )
}
