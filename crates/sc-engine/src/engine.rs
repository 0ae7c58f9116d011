// Calibration driver: feeds strategy suggestions to concurrent evaluations
// and keeps the best sample.

use sc_optimizer::{SearchStatus, SearchStrategy, StopReason, Trial, TrialResult};
use sc_types::{internal_error, validation_error, Calibration, ScResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info};

use crate::context::EvaluationContext;
use crate::evaluator::ObjectiveEvaluator;

/// When a search stops asking for samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLimits {
    pub max_evaluations: usize,
    /// Evaluations allowed in flight at once.
    pub concurrency: usize,
    pub time_limit: Option<Duration>,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_evaluations: 100,
            concurrency: std::thread::available_parallelism().map_or(1, |n| n.get()),
            time_limit: None,
        }
    }
}

impl SearchLimits {
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = Some(time_limit);
        self
    }

    pub fn validate(&self) -> ScResult<()> {
        if self.max_evaluations == 0 {
            return Err(validation_error!("max_evaluations must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(validation_error!("concurrency must be at least 1"));
        }
        Ok(())
    }
}

/// Result of one completed search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub calibration: Calibration,
    /// `-objective` of the best trial.
    pub loss: f64,
    pub best: TrialResult,
    pub status: SearchStatus,
}

#[derive(Debug)]
pub struct CalibrationEngine {
    evaluator: ObjectiveEvaluator,
    limits: SearchLimits,
}

impl CalibrationEngine {
    pub fn new(context: Arc<EvaluationContext>) -> Self {
        Self {
            evaluator: ObjectiveEvaluator::new(context),
            limits: SearchLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &SearchLimits {
        &self.limits
    }

    pub fn evaluator(&self) -> &ObjectiveEvaluator {
        &self.evaluator
    }

    pub fn context(&self) -> &EvaluationContext {
        self.evaluator.context()
    }

    /// Run `strategy` over the workflow groups until a limit is hit or the
    /// strategy runs dry, and return the calibration with the largest
    /// objective.
    pub async fn run(
        &self,
        strategy: &mut dyn SearchStrategy,
        workflows: &[Vec<PathBuf>],
    ) -> ScResult<SearchOutcome> {
        self.limits.validate()?;

        let mut status = SearchStatus::new(strategy.name());
        status.mark_running();
        info!(
            search_id = %status.id,
            strategy = %status.strategy,
            workflows = workflows.len(),
            max_evaluations = self.limits.max_evaluations,
            concurrency = self.limits.concurrency,
            "starting calibration search"
        );

        let deadline = self.limits.time_limit.map(|limit| Instant::now() + limit);
        let workflows: Arc<[Vec<PathBuf>]> = workflows.into();
        let mut in_flight: JoinSet<TrialResult> = JoinSet::new();
        let mut submitted = 0;
        let mut exhausted = false;

        let reason = loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break StopReason::TimeLimit;
            }

            while !exhausted
                && in_flight.len() < self.limits.concurrency
                && submitted < self.limits.max_evaluations
            {
                let Some(sample) = strategy.suggest(1).pop() else {
                    exhausted = true;
                    break;
                };
                let mut trial = Trial::new(status.id, submitted, sample);
                trial.mark_running();
                submitted += 1;

                let evaluator = self.evaluator.clone();
                let workflows = workflows.clone();
                in_flight.spawn(async move {
                    let objective = evaluator
                        .evaluate_workflows(&trial.sample, &workflows, trial.id)
                        .await;
                    trial.finish(objective)
                });
            }

            if in_flight.is_empty() {
                break if exhausted {
                    StopReason::Exhausted
                } else {
                    StopReason::MaxEvaluations
                };
            }

            let joined = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, in_flight.join_next()).await {
                        Ok(joined) => joined,
                        Err(_) => break StopReason::TimeLimit,
                    }
                }
                None => in_flight.join_next().await,
            };

            match joined {
                Some(Ok(result)) => {
                    strategy.report(&result.sample, result.objective);
                    status.record(&result);
                }
                Some(Err(e)) => {
                    in_flight.shutdown().await;
                    error!(search_id = %status.id, error = %e, "evaluation task aborted");
                    status.mark_failed(e.to_string());
                    return Err(internal_error!("evaluation task aborted: {e}"));
                }
                None => {}
            }
        };

        // Dropping the in-flight evaluations kills their simulators and
        // removes their configuration files.
        let abandoned = in_flight.len();
        in_flight.shutdown().await;
        status.mark_completed(reason);
        info!(
            search_id = %status.id,
            stop_reason = ?reason,
            completed = status.trials_completed,
            failed = status.trials_failed,
            abandoned,
            "calibration search finished"
        );

        let Some(best) = status.best_trial.clone() else {
            return Err(internal_error!(
                "no successful evaluation after {} attempts",
                status.evaluations()
            ));
        };
        let calibration = Calibration::from_sample(self.context().codec().space().iter(), &best.sample);
        Ok(SearchOutcome {
            calibration,
            loss: -best.objective,
            best,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::Simulator;
    use sc_space::{CalibrationRangeTable, ConfigCodec, ParameterSpaceBuilder};
    use serde_json::json;
    use std::path::Path;

    fn context(program: &Path, dir: &Path, timeout: Duration) -> Arc<EvaluationContext> {
        let table = CalibrationRangeTable::from_value(&json!({
            "bandwidth": {"min": 6, "max": 10, "scale": "log2", "unit": "MBps"},
        }))
        .unwrap();
        let template = json!({
            "workflow": {"file": "wf.json"},
            "storage_service_scheme": "submit_only",
            "storage_service_scheme_parameters": {
                "submit_only": {"bandwidth": "100MBps"}
            }
        });
        let definition = ParameterSpaceBuilder::new(&table).build(&template).unwrap();
        let codec = Arc::new(ConfigCodec::new(&definition, Arc::new(table)));
        Arc::new(EvaluationContext::new(Simulator::new(program, timeout), codec, dir))
    }

    #[test]
    fn limits_validate() {
        assert!(SearchLimits::default().validate().is_ok());
        assert!(SearchLimits::default().with_max_evaluations(0).validate().is_err());
        assert!(SearchLimits::default().with_concurrency(0).validate().is_err());
    }

    #[tokio::test]
    async fn zero_budget_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Path::new("sim"), dir.path(), Duration::from_secs(1));
        let engine = CalibrationEngine::new(ctx.clone())
            .with_limits(SearchLimits::default().with_max_evaluations(0));
        let mut strategy = sc_optimizer::GridSearch::new(ctx.codec().space().clone(), 3);
        assert!(engine.run(&mut strategy, &[]).await.is_err());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::testing::fake_simulator;
        use sc_optimizer::{GridSearch, RandomSearch, SearchState};

        const BANDWIDTH: &str = "storage_service_scheme_parameters-submit_only-bandwidth";

        // Error is zero at 256MBps and grows away from it.
        const SCORE_BY_BANDWIDTH: &str = "\
if grep -q '\"256MBps\"' \"$1\"; then echo 1:1:0;
elif grep -q '\"128MBps\"' \"$1\" || grep -q '\"512MBps\"' \"$1\"; then echo 1:1:0.5;
else echo 1:1:1; fi";

        #[tokio::test]
        async fn grid_search_finds_the_best_point() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_simulator(dir.path(), SCORE_BY_BANDWIDTH);
            let ctx = context(&program, dir.path(), Duration::from_secs(5));
            let engine = CalibrationEngine::new(ctx.clone()).with_limits(
                SearchLimits::default()
                    .with_max_evaluations(50)
                    .with_concurrency(2),
            );
            let mut strategy = GridSearch::new(ctx.codec().space().clone(), 5);

            let outcome = engine.run(&mut strategy, &[]).await.unwrap();
            assert_eq!(outcome.status.stop_reason, Some(StopReason::Exhausted));
            assert_eq!(outcome.status.state, SearchState::Completed);
            assert_eq!(outcome.status.evaluations(), 5);
            assert_eq!(outcome.loss, 0.0);
            assert_eq!(outcome.calibration.get(BANDWIDTH).unwrap().realize(), "256MBps");
        }

        #[tokio::test]
        async fn stops_at_max_evaluations() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_simulator(dir.path(), "echo 1:1:0.2");
            let ctx = context(&program, dir.path(), Duration::from_secs(5));
            let engine = CalibrationEngine::new(ctx.clone()).with_limits(
                SearchLimits::default()
                    .with_max_evaluations(7)
                    .with_concurrency(3),
            );
            let mut strategy = RandomSearch::new(ctx.codec().space().clone(), Some(7));

            let outcome = engine.run(&mut strategy, &[]).await.unwrap();
            assert_eq!(outcome.status.stop_reason, Some(StopReason::MaxEvaluations));
            assert_eq!(outcome.status.trials_completed, 7);
            assert!((outcome.loss - 0.04).abs() < 1e-12);
        }

        #[tokio::test]
        async fn all_failures_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_simulator(dir.path(), "exit 1");
            let ctx = context(&program, dir.path(), Duration::from_secs(5));
            let engine = CalibrationEngine::new(ctx.clone())
                .with_limits(SearchLimits::default().with_max_evaluations(3));
            let mut strategy = RandomSearch::new(ctx.codec().space().clone(), Some(1));

            assert!(engine.run(&mut strategy, &[]).await.is_err());
        }

        #[tokio::test]
        async fn time_limit_abandons_running_evaluations() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_simulator(dir.path(), "sleep 5\necho 1:1:0");
            let ctx = context(&program, dir.path(), Duration::from_secs(30));
            let engine = CalibrationEngine::new(ctx.clone()).with_limits(
                SearchLimits::default()
                    .with_max_evaluations(10)
                    .with_concurrency(2)
                    .with_time_limit(Duration::from_millis(300)),
            );
            let mut strategy = RandomSearch::new(ctx.codec().space().clone(), Some(3));

            let started = std::time::Instant::now();
            assert!(engine.run(&mut strategy, &[]).await.is_err());
            assert!(started.elapsed() < Duration::from_secs(4));

            let leftovers = std::fs::read_dir(dir.path())
                .unwrap()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_name().to_string_lossy().starts_with("config-"))
                .count();
            assert_eq!(leftovers, 0);
        }
    }
}
