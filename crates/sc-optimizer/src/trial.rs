//! Trial tracking and search run status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sc_types::ConfigurationSample;

/// Unique search run identifier.
pub type SearchId = Uuid;

/// Lifecycle state for a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Why a search stopped asking for more samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    MaxEvaluations,
    TimeLimit,
    Exhausted,
}

/// Aggregate status of a search run. The best trial is the one with the
/// largest objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStatus {
    pub id: SearchId,
    pub strategy: String,
    pub state: SearchState,
    pub trials_completed: usize,
    pub trials_failed: usize,
    pub best_trial: Option<TrialResult>,
    pub stop_reason: Option<StopReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SearchStatus {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy: strategy.into(),
            state: SearchState::Pending,
            trials_completed: 0,
            trials_failed: 0,
            best_trial: None,
            stop_reason: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = SearchState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, reason: StopReason) {
        self.state = SearchState::Completed;
        self.stop_reason = Some(reason);
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = SearchState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn evaluations(&self) -> usize {
        self.trials_completed + self.trials_failed
    }

    /// Count `result` and keep it if it improves on the current best.
    /// Failed evaluations (`-inf`) are counted but never become best.
    pub fn record(&mut self, result: &TrialResult) {
        if result.is_failure() {
            self.trials_failed += 1;
            return;
        }
        self.trials_completed += 1;
        let improves = match &self.best_trial {
            None => true,
            Some(current_best) => result.objective > current_best.objective,
        };
        if improves {
            self.best_trial = Some(result.clone());
        }
    }
}

/// A single trial: one sample evaluated by the objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Also used as the evaluation job id.
    pub id: Uuid,
    pub search_id: SearchId,
    pub trial_number: usize,
    pub sample: ConfigurationSample,
    pub status: TrialStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Trial {
    pub fn new(search_id: SearchId, trial_number: usize, sample: ConfigurationSample) -> Self {
        Self {
            id: Uuid::new_v4(),
            search_id,
            trial_number,
            sample,
            status: TrialStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Close the trial with its objective.
    pub fn finish(mut self, objective: f64) -> TrialResult {
        let finished_at = Utc::now();
        self.status = if objective == f64::NEG_INFINITY {
            TrialStatus::Failed
        } else {
            TrialStatus::Completed
        };
        self.finished_at = Some(finished_at);
        let duration_ms = self
            .started_at
            .map(|start| (finished_at - start).num_milliseconds().max(0) as u64);
        TrialResult {
            trial_id: self.id,
            trial_number: self.trial_number,
            objective,
            sample: self.sample,
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Result of a single trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    pub trial_number: usize,
    pub objective: f64,
    pub sample: ConfigurationSample,
    pub duration_ms: Option<u64>,
}

impl TrialResult {
    pub fn is_failure(&self) -> bool {
        self.objective == f64::NEG_INFINITY || self.objective.is_nan()
    }
}
