use sc_space::ConfigCodec;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::simulator::Simulator;

/// Everything a worker needs for one search run.
///
/// Built once before the first evaluation and never mutated afterwards;
/// workers receive it behind an `Arc` instead of reading process-global
/// state such as the seed or the docker container.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    simulator: Simulator,
    codec: Arc<ConfigCodec>,
    output_dir: PathBuf,
    seed: Option<u64>,
}

impl EvaluationContext {
    pub fn new(simulator: Simulator, codec: Arc<ConfigCodec>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            simulator,
            codec,
            output_dir: output_dir.into(),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn codec(&self) -> &ConfigCodec {
        &self.codec
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}
