//! Deterministic A/B experiments
//!
//! An experiment splits users across weighted variants, each carrying a set
//! of numeric parameters (typically classifier thresholds). Assignment is a
//! pure function of `(experiment id, user id)`:
//!
//! ```text
//! bucket = u64::from_be_bytes(sha256("{id}:{user}")[..8]) % total_weight
//! ```
//!
//! and the variant is the first whose cumulative weight exceeds the bucket,
//! so a user keeps their variant across calls, restarts and machines.
//!
//! Ended experiments can be written through an [`ExperimentArchive`];
//! [`JsonFileArchive`] stores one pretty-printed JSON file per experiment.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

// ============================================
// Experiment types
// ============================================

/// One arm of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    /// Relative share of users
    pub weight: u32,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl Variant {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Active,
    Completed,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Active => "active",
            ExperimentStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub status: ExperimentStatus,
    pub variants: Vec<Variant>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Result of one routed message under an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub latency_ms: Option<f64>,
}

impl Outcome {
    pub fn success(latency_ms: Option<f64>) -> Self {
        Self {
            success: true,
            latency_ms,
        }
    }

    pub fn failure(latency_ms: Option<f64>) -> Self {
        Self {
            success: false,
            latency_ms,
        }
    }
}

/// Aggregated outcomes for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResults {
    pub name: String,
    pub count: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub mean_latency_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub experiment_id: String,
    pub status: ExperimentStatus,
    pub total: u64,
    pub variants: Vec<VariantResults>,
}

/// What an archive stores for an ended experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedExperiment {
    pub experiment: Experiment,
    pub results: ExperimentResults,
}

// ============================================
// Assignment
// ============================================

/// Stable bucket for a user in an experiment.
pub fn assignment_hash(experiment_id: &str, user_id: &str) -> u64 {
    let digest = Sha256::digest(format!("{experiment_id}:{user_id}").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// The variant a user falls into, or `None` if no variant has weight.
pub fn assign_variant<'a>(
    experiment_id: &str,
    user_id: &str,
    variants: &'a [Variant],
) -> Option<&'a Variant> {
    let total: u64 = variants.iter().map(|v| u64::from(v.weight)).sum();
    if total == 0 {
        return None;
    }

    let bucket = assignment_hash(experiment_id, user_id) % total;
    let mut cumulative = 0u64;
    for variant in variants {
        cumulative += u64::from(variant.weight);
        if bucket < cumulative {
            return Some(variant);
        }
    }
    None
}

// ============================================
// Archive
// ============================================

/// Destination for the final results of ended experiments.
pub trait ExperimentArchive: Send + Sync {
    fn store(&self, archived: &ArchivedExperiment) -> Result<()>;
}

/// Writes `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileArchive {
    dir: PathBuf,
}

impl JsonFileArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File an experiment is archived to. Characters outside
    /// `[A-Za-z0-9_-]` in the id become `_`.
    pub fn path_for(&self, experiment_id: &str) -> PathBuf {
        let file: String = experiment_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }

    pub fn load(&self, experiment_id: &str) -> Result<ArchivedExperiment> {
        let path = self.path_for(experiment_id);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Archive(format!("failed to read {}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl ExperimentArchive for JsonFileArchive {
    fn store(&self, archived: &ArchivedExperiment) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&archived.experiment.id);
        let json = serde_json::to_string_pretty(archived)?;
        std::fs::write(&path, json)
            .map_err(|e| Error::Archive(format!("failed to write {}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), "Archived experiment");
        Ok(())
    }
}

// ============================================
// ExperimentFramework
// ============================================

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    count: u64,
    successes: u64,
    latency_sum: f64,
    latency_count: u64,
}

struct Entry {
    experiment: Experiment,
    tallies: HashMap<String, Tally>,
}

impl Entry {
    fn results(&self) -> ExperimentResults {
        let variants: Vec<VariantResults> = self
            .experiment
            .variants
            .iter()
            .map(|v| {
                let tally = self.tallies.get(&v.name).copied().unwrap_or_default();
                VariantResults {
                    name: v.name.clone(),
                    count: tally.count,
                    successes: tally.successes,
                    success_rate: if tally.count == 0 {
                        0.0
                    } else {
                        tally.successes as f64 / tally.count as f64
                    },
                    mean_latency_ms: (tally.latency_count > 0)
                        .then(|| tally.latency_sum / tally.latency_count as f64),
                }
            })
            .collect();

        ExperimentResults {
            experiment_id: self.experiment.id.clone(),
            status: self.experiment.status,
            total: variants.iter().map(|v| v.count).sum(),
            variants,
        }
    }
}

/// Registry of experiments and their outcome tallies.
#[derive(Default)]
pub struct ExperimentFramework {
    experiments: Mutex<HashMap<String, Entry>>,
    archive: Option<Box<dyn ExperimentArchive>>,
}

impl ExperimentFramework {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive(mut self, archive: Box<dyn ExperimentArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.experiments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_experiment(&self, id: &str, variants: Vec<Variant>) -> Result<Experiment> {
        if id.trim().is_empty() {
            return Err(Error::InvalidExperiment("id must not be empty".to_string()));
        }
        if id.trim() != id {
            return Err(Error::InvalidExperiment(format!(
                "{id:?}: id must not have surrounding whitespace"
            )));
        }
        if variants.is_empty() {
            return Err(Error::InvalidExperiment(format!("{id}: no variants")));
        }
        let mut names = HashSet::new();
        for variant in &variants {
            if variant.name.trim().is_empty() {
                return Err(Error::InvalidExperiment(format!(
                    "{id}: variant name must not be empty"
                )));
            }
            if !names.insert(variant.name.as_str()) {
                return Err(Error::InvalidExperiment(format!(
                    "{id}: duplicate variant {}",
                    variant.name
                )));
            }
        }
        if variants.iter().all(|v| v.weight == 0) {
            return Err(Error::InvalidExperiment(format!("{id}: total weight is zero")));
        }

        let mut experiments = self.lock();
        if experiments.contains_key(id) {
            return Err(Error::ExperimentExists(id.to_string()));
        }

        let experiment = Experiment {
            id: id.to_string(),
            status: ExperimentStatus::Active,
            variants,
            created_at: Utc::now(),
            ended_at: None,
        };
        experiments.insert(
            id.to_string(),
            Entry {
                experiment: experiment.clone(),
                tallies: HashMap::new(),
            },
        );
        tracing::info!(
            experiment_id = id,
            variants = experiment.variants.len(),
            "Created experiment"
        );
        Ok(experiment)
    }

    /// The variant `user_id` is assigned to. Stable for the experiment's lifetime.
    pub fn get_variant(&self, experiment_id: &str, user_id: &str) -> Result<Variant> {
        let experiments = self.lock();
        let entry = experiments
            .get(experiment_id)
            .ok_or_else(|| Error::ExperimentNotFound(experiment_id.to_string()))?;
        assign_variant(experiment_id, user_id, &entry.experiment.variants)
            .cloned()
            .ok_or_else(|| Error::InvalidExperiment(format!("{experiment_id}: no weighted variant")))
    }

    /// Record an outcome against the user's variant; returns the variant name.
    pub fn record_outcome(
        &self,
        experiment_id: &str,
        user_id: &str,
        outcome: Outcome,
    ) -> Result<String> {
        let mut experiments = self.lock();
        let entry = experiments
            .get_mut(experiment_id)
            .ok_or_else(|| Error::ExperimentNotFound(experiment_id.to_string()))?;
        if entry.experiment.status == ExperimentStatus::Completed {
            return Err(Error::ExperimentCompleted(experiment_id.to_string()));
        }

        let name = assign_variant(experiment_id, user_id, &entry.experiment.variants)
            .map(|v| v.name.clone())
            .ok_or_else(|| Error::InvalidExperiment(format!("{experiment_id}: no weighted variant")))?;

        let tally = entry.tallies.entry(name.clone()).or_default();
        tally.count += 1;
        if outcome.success {
            tally.successes += 1;
        }
        if let Some(latency) = outcome.latency_ms.filter(|l| l.is_finite() && *l >= 0.0) {
            tally.latency_sum += latency;
            tally.latency_count += 1;
        }

        tracing::debug!(experiment_id, variant = %name, success = outcome.success, "Recorded outcome");
        Ok(name)
    }

    pub fn get_results(&self, experiment_id: &str) -> Result<ExperimentResults> {
        self.lock()
            .get(experiment_id)
            .map(Entry::results)
            .ok_or_else(|| Error::ExperimentNotFound(experiment_id.to_string()))
    }

    /// Mark an experiment completed, optionally archiving its final results.
    ///
    /// The experiment stays active when archiving fails, so the call can be
    /// retried.
    pub fn end_experiment(&self, experiment_id: &str, persist: bool) -> Result<ExperimentResults> {
        if persist && self.archive.is_none() {
            return Err(Error::Archive("no experiment archive configured".to_string()));
        }

        // Held across the archive write.
        let mut experiments = self.lock();
        let entry = experiments
            .get_mut(experiment_id)
            .ok_or_else(|| Error::ExperimentNotFound(experiment_id.to_string()))?;
        if entry.experiment.status == ExperimentStatus::Completed {
            return Err(Error::ExperimentCompleted(experiment_id.to_string()));
        }
        entry.experiment.status = ExperimentStatus::Completed;
        entry.experiment.ended_at = Some(Utc::now());
        let archived = ArchivedExperiment {
            experiment: entry.experiment.clone(),
            results: entry.results(),
        };

        if persist {
            if let Some(archive) = &self.archive {
                if let Err(e) = archive.store(&archived) {
                    entry.experiment.status = ExperimentStatus::Active;
                    entry.experiment.ended_at = None;
                    tracing::warn!(experiment_id, error = %e, "Failed to archive experiment");
                    return Err(e);
                }
            }
        }
        drop(experiments);

        tracing::info!(experiment_id, total = archived.results.total, "Ended experiment");
        Ok(archived.results)
    }

    pub fn experiment(&self, experiment_id: &str) -> Option<Experiment> {
        self.lock()
            .get(experiment_id)
            .map(|e| e.experiment.clone())
    }

    /// All experiments, oldest first.
    pub fn list_experiments(&self) -> Vec<Experiment> {
        let mut list: Vec<Experiment> = self
            .lock()
            .values()
            .map(|e| e.experiment.clone())
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }
}
