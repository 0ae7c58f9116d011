//! Objective evaluation and calibration search for the workflow simulator.
//!
//! A [`CalibrationEngine`] asks a search strategy for samples and scores
//! each one with an [`ObjectiveEvaluator`], which decodes the sample, runs
//! the simulator on it under a timeout and turns the reported error into
//! an objective. [`SimulatorBackend`] plugs the engine into experiment sets.

pub mod backend;
pub mod config;
pub mod context;
pub mod engine;
pub mod evaluator;
pub mod loss;
pub mod makespan;
pub mod runner;
pub mod simulator;

pub use backend::SimulatorBackend;
pub use config::{CalibrationRunConfig, ExperimentConfig, WorkflowEntry};
pub use context::EvaluationContext;
pub use engine::{CalibrationEngine, SearchLimits, SearchOutcome};
pub use evaluator::{set_workflow, ObjectiveEvaluator, FAILURE_OBJECTIVE};
pub use loss::LossFunction;
pub use makespan::{group_makespan, recorded_makespan};
pub use runner::{prepare_backend, run_experiments};
pub use simulator::{Simulator, SimulatorOutput};

#[cfg(all(test, unix))]
pub(crate) mod testing {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable shell script standing in for the simulator.
    pub fn fake_simulator(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("simulator.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
