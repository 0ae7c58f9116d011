//! Wiring from a [`CalibrationRunConfig`] to a finished experiment set.

use sc_experiments::{CalibrationStore, Experiment, ExperimentSet, WorkflowSetSpec};
use sc_space::{CalibrationRangeTable, ConfigCodec, ParameterSpaceBuilder};
use sc_types::{config_error, ScResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::SimulatorBackend;
use crate::config::CalibrationRunConfig;
use crate::context::EvaluationContext;
use crate::engine::CalibrationEngine;
use crate::simulator::Simulator;

/// Validate inputs, probe the simulator and build the backend. Everything
/// that can fail before the first evaluation fails here.
pub async fn prepare_backend(config: &CalibrationRunConfig) -> ScResult<SimulatorBackend> {
    config.validate()?;

    let table = Arc::new(CalibrationRangeTable::load(&config.calibration_ranges)?);
    let template: Value = serde_json::from_str(&std::fs::read_to_string(&config.template)?)?;
    let definition = ParameterSpaceBuilder::new(&table)
        .with_strict(config.strict_ranges)
        .build(&template)?;
    if definition.space.is_empty() {
        return Err(config_error!(
            "template {} yields no calibratable parameters",
            config.template.display()
        ));
    }

    let codec = ConfigCodec::new(&definition, table).with_strict(config.strict_ranges);
    let initial = match codec.encode_template(&template) {
        Ok(sample) => Some(sample),
        Err(e) => {
            warn!(error = %e, "template values cannot seed the search");
            None
        }
    };

    let mut simulator = Simulator::new(&config.simulator, config.timeout());
    if let Some(container) = &config.docker_container {
        simulator = simulator.with_docker(container.clone());
    }
    let version = simulator.probe().await?;
    info!(simulator = %config.simulator.display(), version = %version, "simulator is runnable");

    std::fs::create_dir_all(&config.output_dir)?;
    let mut context = EvaluationContext::new(simulator, Arc::new(codec), &config.output_dir);
    if let Some(seed) = config.seed {
        context = context.with_seed(seed);
    }

    let engine = CalibrationEngine::new(Arc::new(context)).with_limits(config.limits());
    let mut backend = SimulatorBackend::new(engine)
        .with_strategy(config.strategy, config.grid_steps)
        .with_loss(config.loss);
    if let Some(initial) = initial {
        backend = backend.with_initial(initial);
    }
    Ok(backend)
}

/// Run every configured experiment, reusing calibrations where the
/// training sets match.
pub async fn run_experiments(config: &CalibrationRunConfig) -> ScResult<Vec<Experiment>> {
    let backend = prepare_backend(config).await?;
    let store = CalibrationStore::new(config.store_root())?.with_scheme_check(config.scheme_check);
    let mut set = ExperimentSet::new(Arc::new(backend)).with_store(store);

    for experiment in &config.experiments {
        let training = WorkflowSetSpec::new(experiment.training_groups());
        let evaluation = experiment
            .evaluation_groups()
            .into_iter()
            .map(WorkflowSetSpec::new)
            .collect();
        if set.add_or_reuse(training, evaluation).await?.is_none() {
            warn!("experiment skipped");
        }
    }

    info!(
        experiments = set.len(),
        cache_hits = set.cache().stats().hits,
        "all experiments finished"
    );
    Ok(set.experiments().to_vec())
}
