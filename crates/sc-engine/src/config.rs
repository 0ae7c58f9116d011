use sc_experiments::{CalibrationStore, SchemeCheck};
use sc_optimizer::StrategyKind;
use sc_types::{config_error, ScResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::SearchLimits;
use crate::loss::LossFunction;

/// A workflow execution file, or repeated executions of one workflow
/// (`"a.json"` or `["a-1.json", "a-2.json"]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowEntry {
    File(PathBuf),
    Repetitions(Vec<PathBuf>),
}

impl WorkflowEntry {
    pub fn to_group(&self) -> Vec<PathBuf> {
        match self {
            Self::File(path) => vec![path.clone()],
            Self::Repetitions(paths) => paths.clone(),
        }
    }
}

fn groups(entries: &[WorkflowEntry]) -> Vec<Vec<PathBuf>> {
    entries.iter().map(WorkflowEntry::to_group).collect()
}

/// One training set and the evaluation sets scored with its calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub training: Vec<WorkflowEntry>,
    #[serde(default)]
    pub evaluation: Vec<Vec<WorkflowEntry>>,
}

impl ExperimentConfig {
    pub fn training_groups(&self) -> Vec<Vec<PathBuf>> {
        groups(&self.training)
    }

    pub fn evaluation_groups(&self) -> Vec<Vec<Vec<PathBuf>>> {
        self.evaluation.iter().map(|set| groups(set)).collect()
    }
}

/// Calibration run configuration, read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRunConfig {
    pub simulator: PathBuf,
    /// Simulator configuration template the search space is derived from.
    pub template: PathBuf,
    pub calibration_ranges: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub experiments: Vec<ExperimentConfig>,
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default = "default_grid_steps")]
    pub grid_steps: usize,
    #[serde(default = "default_max_evaluations")]
    pub max_evaluations: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub time_limit_seconds: Option<u64>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub docker_container: Option<String>,
    #[serde(default)]
    pub loss: LossFunction,
    #[serde(default)]
    pub scheme_check: SchemeCheck,
    /// Persisted calibrations; the platform data directory when unset.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    /// Exact-key range lookup only.
    #[serde(default = "default_strict_ranges")]
    pub strict_ranges: bool,
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_grid_steps() -> usize {
    5
}

fn default_max_evaluations() -> usize {
    100
}

fn default_concurrency() -> usize {
    SearchLimits::default().concurrency
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_strict_ranges() -> bool {
    true
}

impl CalibrationRunConfig {
    pub fn new(
        simulator: impl Into<PathBuf>,
        template: impl Into<PathBuf>,
        calibration_ranges: impl Into<PathBuf>,
    ) -> Self {
        Self {
            simulator: simulator.into(),
            template: template.into(),
            calibration_ranges: calibration_ranges.into(),
            output_dir: default_output_dir(),
            experiments: Vec::new(),
            strategy: StrategyKind::default(),
            grid_steps: default_grid_steps(),
            max_evaluations: default_max_evaluations(),
            concurrency: default_concurrency(),
            timeout_seconds: default_timeout_seconds(),
            time_limit_seconds: None,
            seed: None,
            docker_container: None,
            loss: LossFunction::default(),
            scheme_check: SchemeCheck::default(),
            store_dir: None,
            strict_ranges: default_strict_ranges(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> ScResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            config_error!("cannot read run configuration {}: {e}", path.as_ref().display())
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScResult<()> {
        if self.timeout_seconds == 0 {
            return Err(config_error!("timeout_seconds must be positive"));
        }
        if self.time_limit_seconds == Some(0) {
            return Err(config_error!("time_limit_seconds must be positive"));
        }
        self.limits()
            .validate()
            .map_err(|e| config_error!("invalid search limits: {e}"))
    }

    /// An experiment where every file is its own workflow.
    pub fn with_experiment(mut self, training: Vec<PathBuf>, evaluation: Vec<Vec<PathBuf>>) -> Self {
        let files = |paths: Vec<PathBuf>| -> Vec<WorkflowEntry> {
            paths.into_iter().map(WorkflowEntry::File).collect()
        };
        self.experiments.push(ExperimentConfig {
            training: files(training),
            evaluation: evaluation.into_iter().map(files).collect(),
        });
        self
    }

    /// An experiment over groups of repeated executions.
    pub fn with_grouped_experiment(
        mut self,
        training: Vec<Vec<PathBuf>>,
        evaluation: Vec<Vec<Vec<PathBuf>>>,
    ) -> Self {
        let groups = |sets: Vec<Vec<PathBuf>>| -> Vec<WorkflowEntry> {
            sets.into_iter().map(WorkflowEntry::Repetitions).collect()
        };
        self.experiments.push(ExperimentConfig {
            training: groups(training),
            evaluation: evaluation.into_iter().map(groups).collect(),
        });
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_docker_container(mut self, container: impl Into<String>) -> Self {
        self.docker_container = Some(container.into());
        self
    }

    pub fn with_store_dir(mut self, store_dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(store_dir.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn limits(&self) -> SearchLimits {
        let limits = SearchLimits::default()
            .with_max_evaluations(self.max_evaluations)
            .with_concurrency(self.concurrency);
        match self.time_limit_seconds {
            Some(seconds) => limits.with_time_limit(Duration::from_secs(seconds)),
            None => limits,
        }
    }

    pub fn store_root(&self) -> PathBuf {
        self.store_dir.clone().unwrap_or_else(CalibrationStore::default_root)
    }
}
