//! Experiments and the cache-aware experiment set.

use async_trait::async_trait;
use sc_types::{Calibration, ScResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::CalibrationCache;
use crate::storage::{CalibrationRecord, CalibrationStore, SchemeIds};
use crate::workflow_set::WorkflowSetSpec;

/// Best calibration found for a training set, with its loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub calibration: Calibration,
    pub loss: f64,
}

/// The expensive operations an experiment set delegates.
#[async_trait]
pub trait CalibrationBackend: Send + Sync {
    /// Search for the calibration that best fits `workflows`. Each group
    /// lists repeated executions of one workflow.
    async fn calibrate(&self, workflows: &[Vec<PathBuf>]) -> ScResult<CalibrationResult>;

    /// Loss of `calibration` over the workflow groups.
    async fn evaluate(&self, calibration: &Calibration, workflows: &[Vec<PathBuf>])
        -> ScResult<f64>;

    /// Scheme identifiers calibrations are computed under.
    fn schemes(&self) -> SchemeIds;
}

/// One training set, its calibration and the evaluation sets scored with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub training_set_spec: WorkflowSetSpec,
    pub evaluation_set_specs: Vec<WorkflowSetSpec>,
    pub calibration: Calibration,
    pub calibration_loss: f64,
    pub evaluation_losses: Vec<f64>,
}

/// Drop empty evaluation sets and duplicates (by `ivhash`), keeping order.
pub fn dedup_evaluation_specs(specs: Vec<WorkflowSetSpec>) -> Vec<WorkflowSetSpec> {
    let mut kept: Vec<WorkflowSetSpec> = Vec::with_capacity(specs.len());
    for spec in specs {
        if !spec.is_empty() && !kept.contains(&spec) {
            kept.push(spec);
        }
    }
    kept
}

/// Experiments sharing one simulator scheme selection and search setup.
pub struct ExperimentSet {
    experiments: Vec<Experiment>,
    backend: Arc<dyn CalibrationBackend>,
    cache: Arc<CalibrationCache>,
    store: Option<CalibrationStore>,
}

impl ExperimentSet {
    pub fn new(backend: Arc<dyn CalibrationBackend>) -> Self {
        Self {
            experiments: Vec::new(),
            backend,
            cache: Arc::new(CalibrationCache::new()),
            store: None,
        }
    }

    /// Share a calibration cache with other experiment sets.
    pub fn with_cache(mut self, cache: Arc<CalibrationCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Persist calibrations and reuse previously persisted ones.
    pub fn with_store(mut self, store: CalibrationStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn experiments(&self) -> &[Experiment] {
        &self.experiments
    }

    pub fn cache(&self) -> &CalibrationCache {
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Index of the experiment trained on `target`.
    pub fn find(&self, target: &WorkflowSetSpec) -> Option<usize> {
        self.experiments
            .iter()
            .position(|xp| xp.training_set_spec == *target)
    }

    /// Remove experiments whose training set is a proper sub-multiset of
    /// `training`; they are recalibrated on the larger set.
    fn evict_subsets(&mut self, training: &WorkflowSetSpec) -> usize {
        let before = self.experiments.len();
        let cache = &self.cache;
        self.experiments.retain(|xp| {
            let stale = xp.training_set_spec.is_proper_subset_of(training);
            if stale {
                info!(
                    evicted = %xp.training_set_spec,
                    requested = %training,
                    "evicting experiment trained on a subset of the requested workflows"
                );
                cache.evict(&xp.training_set_spec.ivhash);
            }
            !stale
        });
        before - self.experiments.len()
    }

    /// Reuse the experiment trained on `training` if there is one, otherwise
    /// calibrate a new one; then score every evaluation set.
    ///
    /// Returns `None` when the training set is empty or no non-empty
    /// evaluation set remains.
    pub async fn add_or_reuse(
        &mut self,
        training: WorkflowSetSpec,
        evaluation_specs: Vec<WorkflowSetSpec>,
    ) -> ScResult<Option<&Experiment>> {
        if training.is_empty() {
            warn!("skipping experiment with an empty training set");
            return Ok(None);
        }
        let evaluation_specs = dedup_evaluation_specs(evaluation_specs);
        if evaluation_specs.is_empty() {
            warn!(training = %training, "skipping experiment without evaluation workflows");
            return Ok(None);
        }

        self.evict_subsets(&training);

        let index = match self.find(&training) {
            Some(index) => {
                info!(training = %training, "reusing cached calibration");
                index
            }
            None => {
                let result = self.calibration_for(&training).await?;
                self.experiments.push(Experiment {
                    training_set_spec: training,
                    evaluation_set_specs: Vec::new(),
                    calibration: result.calibration,
                    calibration_loss: result.loss,
                    evaluation_losses: Vec::new(),
                });
                self.experiments.len() - 1
            }
        };

        let calibration = self.experiments[index].calibration.clone();
        let mut losses = Vec::with_capacity(evaluation_specs.len());
        for spec in &evaluation_specs {
            losses.push(self.backend.evaluate(&calibration, &spec.workflows).await?);
        }

        let experiment = &mut self.experiments[index];
        experiment.evaluation_set_specs = evaluation_specs;
        experiment.evaluation_losses = losses;
        Ok(Some(&self.experiments[index]))
    }

    async fn calibration_for(&self, training: &WorkflowSetSpec) -> ScResult<CalibrationResult> {
        let backend = self.backend.clone();
        let store = self.store.clone();
        let ivhash = training.ivhash.clone();
        let groups = training.workflows.clone();

        self.cache
            .get_or_calibrate(&training.ivhash, || {
                load_or_calibrate(backend, store, ivhash, groups)
            })
            .await
    }
}

/// Prefer a persisted calibration; otherwise compute one and persist it.
async fn load_or_calibrate(
    backend: Arc<dyn CalibrationBackend>,
    store: Option<CalibrationStore>,
    ivhash: String,
    groups: Vec<Vec<PathBuf>>,
) -> ScResult<CalibrationResult> {
    let schemes = backend.schemes();
    if let Some(store) = &store {
        if let Some(record) = store.load(&ivhash, &schemes).await? {
            info!(ivhash = %ivhash, loss = record.loss, "reusing stored calibration");
            return Ok(CalibrationResult {
                calibration: record.calibration,
                loss: record.loss,
            });
        }
    }

    info!(ivhash = %ivhash, groups = groups.len(), "computing calibration");
    let result = backend.calibrate(&groups).await?;
    if let Some(store) = &store {
        let record = CalibrationRecord::new(
            ivhash.clone(),
            result.calibration.clone(),
            result.loss,
            schemes,
        );
        store.save(&record).await?;
    }
    Ok(result)
}
