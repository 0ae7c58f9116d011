//! Simulator-backed [`CalibrationBackend`] used by experiment sets.

use async_trait::async_trait;
use sc_experiments::{CalibrationBackend, CalibrationResult, SchemeIds};
use sc_optimizer::{create_strategy, RandomSearch, SearchStrategy, StrategyKind};
use sc_types::{Calibration, ConfigurationSample, RealizedConfiguration, ScResult, SimulatorError};
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::CalibrationEngine;
use crate::evaluator::set_workflow;
use crate::loss::LossFunction;
use crate::makespan::{group_makespan, non_empty};

pub const COMPUTE_SERVICE_SCHEME: &str = "compute_service_scheme";
pub const STORAGE_SERVICE_SCHEME: &str = "storage_service_scheme";
pub const NETWORK_TOPOLOGY_SCHEME: &str = "network_topology_scheme";

#[derive(Debug)]
pub struct SimulatorBackend {
    engine: CalibrationEngine,
    strategy: StrategyKind,
    grid_steps: usize,
    initial: Option<ConfigurationSample>,
    loss: LossFunction,
}

impl SimulatorBackend {
    pub fn new(engine: CalibrationEngine) -> Self {
        Self {
            engine,
            strategy: StrategyKind::default(),
            grid_steps: 5,
            initial: None,
            loss: LossFunction::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyKind, grid_steps: usize) -> Self {
        self.strategy = strategy;
        self.grid_steps = grid_steps;
        self
    }

    /// Have random searches try `sample` first, typically the template's
    /// own values.
    pub fn with_initial(mut self, sample: ConfigurationSample) -> Self {
        self.initial = Some(sample);
        self
    }

    pub fn with_loss(mut self, loss: LossFunction) -> Self {
        self.loss = loss;
        self
    }

    pub fn engine(&self) -> &CalibrationEngine {
        &self.engine
    }

    /// A fresh strategy per calibration; searches never share state.
    fn new_strategy(&self) -> Box<dyn SearchStrategy> {
        let context = self.engine.context();
        let space = context.codec().space().clone();
        match (self.strategy, &self.initial) {
            (StrategyKind::Random, Some(initial)) => Box::new(
                RandomSearch::new(space, context.seed()).with_initial([initial.clone()]),
            ),
            (kind, _) => create_strategy(kind, space, self.grid_steps, context.seed()),
        }
    }
}

#[async_trait]
impl CalibrationBackend for SimulatorBackend {
    async fn calibrate(&self, workflows: &[Vec<PathBuf>]) -> ScResult<CalibrationResult> {
        let mut strategy = self.new_strategy();
        let outcome = self.engine.run(strategy.as_mut(), workflows).await?;
        info!(
            workflows = workflows.len(),
            loss = outcome.loss,
            evaluations = outcome.status.evaluations(),
            "calibration complete"
        );
        Ok(CalibrationResult {
            calibration: outcome.calibration,
            loss: outcome.loss,
        })
    }

    /// Re-realize `calibration` for the first workflow of each group and
    /// score the simulated makespans against the groups' mean recorded
    /// makespans.
    async fn evaluate(
        &self,
        calibration: &Calibration,
        workflows: &[Vec<PathBuf>],
    ) -> ScResult<f64> {
        let evaluator = self.engine.evaluator();
        let mut simulated = Vec::with_capacity(workflows.len());
        let mut real = Vec::with_capacity(workflows.len());

        for group in non_empty(workflows) {
            let workflow = &group[0];
            let mut realized = RealizedConfiguration::new();
            calibration.apply_to(&mut realized);
            set_workflow(&mut realized, workflow);

            let output = evaluator.run_realized(&realized, Uuid::new_v4()).await?;
            let (sim, obs) = output.makespans().ok_or_else(|| SimulatorError::MalformedOutput {
                output: format!("{output:?}"),
                message: "makespans are not numeric".to_string(),
            })?;
            let obs = group_makespan(group, Some(obs)).await?;
            debug!(
                workflow = %workflow.display(),
                repetitions = group.len(),
                simulated = sim,
                real = obs,
                "evaluated workflow group"
            );
            simulated.push(sim);
            real.push(obs);
        }

        let loss = self.loss.compute(&simulated, &real)?;
        info!(groups = simulated.len(), loss_function = self.loss.name(), loss, "evaluation complete");
        Ok(loss)
    }

    fn schemes(&self) -> SchemeIds {
        let codec = self.engine.context().codec();
        let scheme = |key: &str| codec.scheme(key).map(str::to_string);
        SchemeIds::new(
            scheme(COMPUTE_SERVICE_SCHEME),
            scheme(STORAGE_SERVICE_SCHEME),
            scheme(NETWORK_TOPOLOGY_SCHEME),
        )
    }
}
