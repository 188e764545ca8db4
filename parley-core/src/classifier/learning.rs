//! Learning from human corrections.
//!
//! Every correction a user makes is tallied against the `action:target` pair
//! the classifier produced. Later classifications of the same pair have their
//! confidence divided down and are always routed back for clarification.
//! Corrections only ever lower confidence.

use super::ClassificationResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Tally of corrections for one `action:target` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionPattern {
    pub count: u32,
    /// Most recent correction text
    pub sample_correction: String,
    pub last_corrected_at: DateTime<Utc>,
}

/// One recorded correction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionRecord {
    pub user_id: String,
    pub key: String,
    pub classified_as: String,
    pub correction: String,
    pub recorded_at: DateTime<Utc>,
}

/// Pattern key for an action and optional target.
pub fn correction_key(action: &str, target: Option<&str>) -> String {
    let target = target
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .unwrap_or_else(|| "*".to_string());
    format!("{}:{}", action.to_lowercase(), target)
}

#[derive(Default)]
struct LearnerInner {
    patterns: HashMap<String, CorrectionPattern>,
    log: VecDeque<CorrectionRecord>,
}

pub struct CorrectionLearner {
    inner: Mutex<LearnerInner>,
    penalty: f64,
    log_size: usize,
}

impl CorrectionLearner {
    pub fn new(penalty: f64, log_size: usize) -> Self {
        Self {
            inner: Mutex::new(LearnerInner::default()),
            penalty: penalty.max(f64::EPSILON),
            log_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LearnerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a correction of `result`, returning the pair's new count.
    pub fn record(&self, result: &ClassificationResult, correction: &str, user_id: &str) -> u32 {
        self.record_at(result, correction, user_id, Utc::now())
    }

    pub fn record_at(
        &self,
        result: &ClassificationResult,
        correction: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> u32 {
        let key = correction_key(&result.intent, result.target());
        let mut inner = self.lock();

        let pattern = inner
            .patterns
            .entry(key.clone())
            .or_insert_with(|| CorrectionPattern {
                count: 0,
                sample_correction: String::new(),
                last_corrected_at: now,
            });
        pattern.count = pattern.count.saturating_add(1);
        pattern.sample_correction = correction.to_string();
        pattern.last_corrected_at = now;
        let count = pattern.count;

        if self.log_size > 0 {
            inner.log.push_back(CorrectionRecord {
                user_id: user_id.to_string(),
                key: key.clone(),
                classified_as: result.canonical(),
                correction: correction.to_string(),
                recorded_at: now,
            });
            while inner.log.len() > self.log_size {
                inner.log.pop_front();
            }
        }

        tracing::info!(key = %key, count, user_id, "Recorded correction");
        count
    }

    /// Confidence multiplier for a pair: `1 / (1 + penalty * count)`.
    pub fn multiplier(&self, action: &str, target: Option<&str>) -> Option<f64> {
        let key = correction_key(action, target);
        let count = self.lock().patterns.get(&key)?.count;
        Some(1.0 / (1.0 + self.penalty * f64::from(count)))
    }

    pub fn pattern(&self, action: &str, target: Option<&str>) -> Option<CorrectionPattern> {
        self.lock()
            .patterns
            .get(&correction_key(action, target))
            .cloned()
    }

    /// Up to `limit` most recent corrections, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CorrectionRecord> {
        self.lock().log.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.patterns.clear();
        inner.log.clear();
        tracing::info!("Correction patterns cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(intent: &str, project: Option<&str>) -> ClassificationResult {
        let mut result = ClassificationResult::unknown();
        result.intent = intent.to_string();
        result.project = project.map(str::to_string);
        result
    }

    #[test]
    fn key_format() {
        assert_eq!(correction_key("deploy", Some("JUDO")), "deploy:judo");
        assert_eq!(correction_key("status", None), "status:*");
        assert_eq!(correction_key("status", Some("  ")), "status:*");
    }

    #[test]
    fn multiplier_shrinks_with_count() {
        let learner = CorrectionLearner::new(0.25, 10);
        assert_eq!(learner.multiplier("deploy", Some("JUDO")), None);

        let r = result("deploy", Some("JUDO"));
        assert_eq!(learner.record(&r, "status JUDO", "u1"), 1);
        assert_eq!(learner.multiplier("deploy", Some("judo")), Some(0.8));

        learner.record(&r, "logs JUDO", "u2");
        let m = learner.multiplier("deploy", Some("JUDO")).unwrap();
        assert!((m - 1.0 / 1.5).abs() < 1e-12);

        let pattern = learner.pattern("deploy", Some("JUDO")).unwrap();
        assert_eq!(pattern.count, 2);
        assert_eq!(pattern.sample_correction, "logs JUDO");
    }

    #[test]
    fn log_is_bounded_newest_first() {
        let learner = CorrectionLearner::new(0.25, 2);
        let r = result("deploy", None);
        for correction in ["a", "b", "c"] {
            learner.record(&r, correction, "u1");
        }
        let recent = learner.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].correction, "c");
        assert_eq!(recent[1].correction, "b");
    }

    #[test]
    fn clear_resets() {
        let learner = CorrectionLearner::new(0.25, 2);
        learner.record(&result("deploy", None), "x", "u1");
        learner.clear();
        assert!(learner.is_empty());
        assert!(learner.recent(5).is_empty());
    }
}
