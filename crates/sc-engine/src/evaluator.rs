//! One objective evaluation: decode, write, simulate, score, clean up.

use sc_space::{WORKFLOW_FILE_KEY, WORKFLOW_KEY};
use sc_types::{validation_error, ConfigurationSample, RealizedConfiguration, ScResult, SimulatorError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::EvaluationContext;
use crate::makespan::{group_makespan, non_empty};
use crate::simulator::SimulatorOutput;

/// Objective reported for any failed evaluation.
pub const FAILURE_OBJECTIVE: f64 = f64::NEG_INFINITY;

/// Removes the configuration file when dropped, whichever way the
/// evaluation ends after the file was written.
struct ConfigFileGuard {
    path: PathBuf,
}

impl Drop for ConfigFileGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove configuration file");
            }
        }
    }
}

/// Stateless worker over a shared [`EvaluationContext`].
#[derive(Debug, Clone)]
pub struct ObjectiveEvaluator {
    context: Arc<EvaluationContext>,
}

impl ObjectiveEvaluator {
    pub fn new(context: Arc<EvaluationContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.context
    }

    /// `<output_dir>/config-<job_id>.json`
    pub fn config_path(&self, job_id: Uuid) -> PathBuf {
        self.context.output_dir().join(format!("config-{job_id}.json"))
    }

    /// Score `sample` with the workflow the template names. Never fails:
    /// every error becomes [`FAILURE_OBJECTIVE`].
    pub async fn evaluate(&self, sample: &ConfigurationSample, job_id: Uuid) -> f64 {
        let objective = match self.try_evaluate(sample, None, job_id).await {
            Ok(output) => output.objective(),
            Err(e) => {
                warn!(%job_id, error = %e, "evaluation failed");
                FAILURE_OBJECTIVE
            }
        };
        debug!(%job_id, objective, "evaluation finished");
        objective
    }

    /// Score `sample` over workflow groups: `-(mean of err^2)` with one
    /// simulation per group, or [`FAILURE_OBJECTIVE`] as soon as one group
    /// fails.
    pub async fn evaluate_workflows(
        &self,
        sample: &ConfigurationSample,
        groups: &[Vec<PathBuf>],
        job_id: Uuid,
    ) -> f64 {
        let groups: Vec<&[PathBuf]> = non_empty(groups).collect();
        if groups.is_empty() {
            return self.evaluate(sample, job_id).await;
        }

        let mut total = 0.0;
        for group in &groups {
            match self.group_error(sample, group, job_id).await {
                Ok(error) => total += error * error,
                Err(e) => {
                    warn!(%job_id, workflow = %group[0].display(), error = %e, "evaluation failed");
                    debug!(%job_id, objective = FAILURE_OBJECTIVE, "evaluation finished");
                    return FAILURE_OBJECTIVE;
                }
            }
        }
        let objective = -(total / groups.len() as f64);
        debug!(%job_id, groups = groups.len(), objective, "evaluation finished");
        objective
    }

    /// Error of one group. The first file is simulated; a single-file group
    /// keeps the simulator's own error, a larger one is scored relative to
    /// the group's mean recorded makespan.
    async fn group_error(
        &self,
        sample: &ConfigurationSample,
        group: &[PathBuf],
        job_id: Uuid,
    ) -> ScResult<f64> {
        let Some(first) = group.first() else {
            return Err(validation_error!("empty workflow group"));
        };
        let output = self.try_evaluate(sample, Some(first), job_id).await?;
        if group.len() == 1 {
            return Ok(output.error);
        }

        let simulated = output.simulated.ok_or_else(|| SimulatorError::MalformedOutput {
            output: format!("{output:?}"),
            message: "simulated makespan is not numeric".to_string(),
        })?;
        let real = group_makespan(group, output.real).await?;
        if real == 0.0 {
            return Err(validation_error!("relative error against a zero real makespan"));
        }
        Ok((simulated - real).abs() / real)
    }

    /// Decode `sample`, optionally point it at `workflow`, and run it.
    pub async fn try_evaluate(
        &self,
        sample: &ConfigurationSample,
        workflow: Option<&Path>,
        job_id: Uuid,
    ) -> ScResult<SimulatorOutput> {
        let mut realized = self.context.codec().decode(sample)?;
        if let Some(workflow) = workflow {
            set_workflow(&mut realized, workflow);
        }
        self.run_realized(&realized, job_id).await
    }

    /// Write `realized` to the job's file, run the simulator on it, and
    /// remove the file once the file exists.
    pub async fn run_realized(
        &self,
        realized: &RealizedConfiguration,
        job_id: Uuid,
    ) -> ScResult<SimulatorOutput> {
        let path = self.config_path(job_id);
        tokio::fs::write(&path, realized.to_pretty_json()?).await?;
        let _guard = ConfigFileGuard { path: path.clone() };

        Ok(self.context.simulator().run(&path).await?)
    }
}

/// Point a realized configuration at another workflow file.
pub fn set_workflow(realized: &mut RealizedConfiguration, workflow: &Path) {
    realized.set_path(
        &[WORKFLOW_KEY, WORKFLOW_FILE_KEY],
        Value::String(workflow.to_string_lossy().into_owned()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::Simulator;
    use sc_space::{CalibrationRangeTable, ConfigCodec, ParameterSpaceBuilder};
    use sc_types::SampleValue;
    use serde_json::json;
    use std::time::Duration;

    fn codec() -> Arc<ConfigCodec> {
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
        Arc::new(ConfigCodec::new(&definition, Arc::new(table)))
    }

    fn sample() -> ConfigurationSample {
        ConfigurationSample::new().with(
            "storage_service_scheme_parameters-submit_only-bandwidth",
            SampleValue::Int(8),
        )
    }

    fn evaluator(program: &Path, dir: &Path, timeout: Duration) -> ObjectiveEvaluator {
        let context = EvaluationContext::new(Simulator::new(program, timeout), codec(), dir);
        ObjectiveEvaluator::new(Arc::new(context))
    }

    fn leftover_configs(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("config-"))
            .count()
    }

    #[test]
    fn config_paths_are_unique_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = evaluator(Path::new("sim"), dir.path(), Duration::from_secs(1));
        let a = evaluator.config_path(Uuid::new_v4());
        let b = evaluator.config_path(Uuid::new_v4());
        assert_ne!(a, b);
        assert!(a.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn missing_output_dir_fails_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let evaluator = evaluator(Path::new("/nonexistent/simulator"), &missing, Duration::from_secs(1));
        let objective = evaluator.evaluate(&sample(), Uuid::new_v4()).await;
        assert_eq!(objective, FAILURE_OBJECTIVE);
    }

    #[test]
    fn workflow_override() {
        let mut realized = RealizedConfiguration::new();
        set_workflow(&mut realized, Path::new("/data/other.json"));
        assert_eq!(
            realized.get_path(&["workflow", "file"]),
            Some(&json!("/data/other.json"))
        );
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::testing::fake_simulator;

        #[tokio::test]
        async fn objective_is_negated_squared_error() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_simulator(dir.path(), "echo 12.5:11.9:0.048");
            let evaluator = evaluator(&program, dir.path(), Duration::from_secs(5));

            let objective = evaluator.evaluate(&sample(), Uuid::new_v4()).await;
            assert!((objective - (-0.002304)).abs() < 1e-12);
            assert_eq!(leftover_configs(dir.path()), 0);
        }

        #[tokio::test]
        async fn simulator_sees_decoded_configuration() {
            let dir = tempfile::tempdir().unwrap();
            // Exit non-zero unless the decoded bandwidth reached the file.
            let program = fake_simulator(
                dir.path(),
                "grep -q '256MBps' \"$1\" || exit 1\necho 1:1:0.5",
            );
            let evaluator = evaluator(&program, dir.path(), Duration::from_secs(5));
            assert_eq!(evaluator.evaluate(&sample(), Uuid::new_v4()).await, -0.25);
        }

        #[tokio::test]
        async fn timeout_returns_sentinel_and_cleans_up() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_simulator(dir.path(), "sleep 5\necho 1:1:0");
            let evaluator = evaluator(&program, dir.path(), Duration::from_millis(200));

            let objective = evaluator.evaluate(&sample(), Uuid::new_v4()).await;
            assert_eq!(objective, FAILURE_OBJECTIVE);
            assert_eq!(leftover_configs(dir.path()), 0);
        }

        #[tokio::test]
        async fn failing_simulator_returns_sentinel() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_simulator(dir.path(), "echo boom >&2\nexit 2");
            let evaluator = evaluator(&program, dir.path(), Duration::from_secs(5));

            assert_eq!(evaluator.evaluate(&sample(), Uuid::new_v4()).await, FAILURE_OBJECTIVE);
            assert_eq!(leftover_configs(dir.path()), 0);
        }

        #[tokio::test]
        async fn undecodable_sample_returns_sentinel() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_simulator(dir.path(), "echo 1:1:0");
            let evaluator = evaluator(&program, dir.path(), Duration::from_secs(5));
            let bad = ConfigurationSample::new().with(
                "storage_service_scheme_parameters-submit_only-bandwidth",
                SampleValue::Float(f64::NAN),
            );
            assert_eq!(evaluator.evaluate(&bad, Uuid::new_v4()).await, FAILURE_OBJECTIVE);
        }

        #[tokio::test]
        async fn several_workflows_average_squared_errors() {
            let dir = tempfile::tempdir().unwrap();
            // The error is 0.1 for workflow "a" and 0.3 for anything else.
            let program = fake_simulator(
                dir.path(),
                "if grep -q '\"a.json\"' \"$1\"; then echo 1:1:0.1; else echo 1:1:0.3; fi",
            );
            let evaluator = evaluator(&program, dir.path(), Duration::from_secs(5));
            let workflows = vec![vec![PathBuf::from("a.json")], vec![PathBuf::from("b.json")]];

            let objective = evaluator
                .evaluate_workflows(&sample(), &workflows, Uuid::new_v4())
                .await;
            assert!((objective - (-(0.01 + 0.09) / 2.0)).abs() < 1e-12);
        }

        #[tokio::test]
        async fn one_failed_workflow_fails_the_sample() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_simulator(
                dir.path(),
                "if grep -q '\"a.json\"' \"$1\"; then echo 1:1:0.1; else exit 1; fi",
            );
            let evaluator = evaluator(&program, dir.path(), Duration::from_secs(5));
            let workflows = vec![vec![PathBuf::from("a.json")], vec![PathBuf::from("b.json")]];

            let objective = evaluator
                .evaluate_workflows(&sample(), &workflows, Uuid::new_v4())
                .await;
            assert_eq!(objective, FAILURE_OBJECTIVE);
            assert_eq!(leftover_configs(dir.path()), 0);
        }

        #[tokio::test]
        async fn repetitions_are_simulated_once_against_their_mean() {
            let dir = tempfile::tempdir().unwrap();
            // Count invocations next to the script; simulated 15, real 10.
            let program = fake_simulator(
                dir.path(),
                "echo run >> \"$(dirname \"$0\")/runs\"\necho 15:10:0.5",
            );
            let evaluator = evaluator(&program, dir.path(), Duration::from_secs(5));
            let group = vec![
                crate::makespan::write_execution(dir.path(), "rep1.json", 10.0),
                crate::makespan::write_execution(dir.path(), "rep2.json", 14.0),
            ];

            let objective = evaluator
                .evaluate_workflows(&sample(), &[group], Uuid::new_v4())
                .await;
            // Mean real makespan 12: |15 - 12| / 12 = 0.25.
            assert!((objective - (-0.0625)).abs() < 1e-12);

            let runs = std::fs::read_to_string(dir.path().join("runs")).unwrap();
            assert_eq!(runs.lines().count(), 1);
        }

        #[tokio::test]
        async fn unreadable_repetition_fails_the_sample() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_simulator(dir.path(), "echo 15:10:0.5");
            let evaluator = evaluator(&program, dir.path(), Duration::from_secs(5));
            let group = vec![PathBuf::from("rep1.json"), dir.path().join("missing.json")];

            let objective = evaluator
                .evaluate_workflows(&sample(), &[group], Uuid::new_v4())
                .await;
            assert_eq!(objective, FAILURE_OBJECTIVE);
        }
    }
}
