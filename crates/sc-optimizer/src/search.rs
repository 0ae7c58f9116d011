//! Search strategies over a calibration parameter space.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use sc_types::{
    ConfigurationSample, NumericDomain, ParameterKind, ParameterSpace, ParameterSpec, SampleValue,
    GATE_FINITE, GATE_INFINITY,
};

/// Strategy selector as it appears in run configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Grid,
    #[default]
    Random,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grid => write!(f, "grid"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// Common trait for all search strategies.
///
/// Strategies maximize: every objective reported back is `<= 0`, with
/// `f64::NEG_INFINITY` marking a failed evaluation.
pub trait SearchStrategy: Send + Sync {
    /// Generate the next batch of samples to evaluate. An empty batch means
    /// the strategy has nothing left to propose.
    fn suggest(&mut self, count: usize) -> Vec<ConfigurationSample>;

    /// Report a completed evaluation so adaptive strategies can learn.
    fn report(&mut self, _sample: &ConfigurationSample, _objective: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Build the strategy named by `kind`.
pub fn create_strategy(
    kind: StrategyKind,
    space: ParameterSpace,
    grid_steps: usize,
    seed: Option<u64>,
) -> Box<dyn SearchStrategy> {
    match kind {
        StrategyKind::Grid => Box::new(GridSearch::new(space, grid_steps)),
        StrategyKind::Random => Box::new(RandomSearch::new(space, seed)),
    }
}

// ---- Grid search ----

/// One grid axis: each point may assign several names (a gate and its body).
type Axis = Vec<Vec<(String, SampleValue)>>;

/// Exhaustive grid search over the parameter space.
///
/// Points are produced on demand by a mixed-radix cursor over the axes, so
/// the grid is never materialized and a search budget bounds the work.
#[derive(Debug, Clone)]
pub struct GridSearch {
    axes: Vec<Axis>,
    /// Index into each axis; the last axis varies fastest.
    digits: Vec<usize>,
    produced: u128,
    exhausted: bool,
}

impl GridSearch {
    /// `steps` caps the number of points per numeric dimension.
    pub fn new(space: ParameterSpace, steps: usize) -> Self {
        let axes: Vec<Axis> = space.iter().map(|spec| Self::axis(spec, steps)).collect();
        let exhausted = axes.iter().any(Vec::is_empty);
        let grid = Self {
            digits: vec![0; axes.len()],
            axes,
            produced: 0,
            exhausted,
        };
        debug!(points = %grid.len(), axes = grid.axes.len(), steps, "grid prepared");
        grid
    }

    /// Total number of grid points, saturating at `u128::MAX`.
    pub fn len(&self) -> u128 {
        if self.axes.iter().any(Vec::is_empty) {
            return 0;
        }
        self.axes
            .iter()
            .try_fold(1u128, |acc, axis| acc.checked_mul(axis.len() as u128))
            .unwrap_or(u128::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> u128 {
        self.len().saturating_sub(self.produced)
    }

    fn axis(spec: &ParameterSpec, steps: usize) -> Axis {
        let name = spec.name.clone();
        match &spec.kind {
            ParameterKind::Numeric(domain) => domain
                .grid_points(steps)
                .into_iter()
                .map(|v| vec![(name.clone(), SampleValue::Int(v))])
                .collect(),
            ParameterKind::Constant { value, .. } => {
                vec![vec![(name, SampleValue::Float(*value))]]
            }
            ParameterKind::Categorical { choices } => choices
                .iter()
                .map(|c| vec![(name.clone(), SampleValue::Choice(c.clone()))])
                .collect(),
            ParameterKind::ConditionalPair { body } => {
                let gate = spec.gate_name();
                let mut axis = vec![vec![
                    (gate.clone(), SampleValue::Choice(GATE_INFINITY.to_string())),
                    (name.clone(), SampleValue::Float(f64::NAN)),
                ]];
                axis.extend(body.grid_points(steps).into_iter().map(|v| {
                    vec![
                        (gate.clone(), SampleValue::Choice(GATE_FINITE.to_string())),
                        (name.clone(), SampleValue::Int(v)),
                    ]
                }));
                axis
            }
        }
    }

    fn current(&self) -> ConfigurationSample {
        self.axes
            .iter()
            .zip(&self.digits)
            .flat_map(|(axis, &digit)| axis[digit].iter().cloned())
            .collect()
    }

    /// Move the cursor to the next point; returns false past the last one.
    fn advance(&mut self) -> bool {
        for (digit, axis) in self.digits.iter_mut().zip(&self.axes).rev() {
            *digit += 1;
            if *digit < axis.len() {
                return true;
            }
            *digit = 0;
        }
        false
    }

    fn next_point(&mut self) -> Option<ConfigurationSample> {
        if self.exhausted {
            return None;
        }
        let sample = self.current();
        self.produced = self.produced.saturating_add(1);
        self.exhausted = !self.advance();
        Some(sample)
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<ConfigurationSample> {
        std::iter::from_fn(|| self.next_point()).take(count).collect()
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: ParameterSpace,
    rng: StdRng,
    initial: VecDeque<ConfigurationSample>,
}

impl RandomSearch {
    /// A fixed `seed` makes the suggestion sequence reproducible.
    pub fn new(space: ParameterSpace, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            space,
            rng,
            initial: VecDeque::new(),
        }
    }

    /// Samples proposed verbatim before any random ones.
    pub fn with_initial(mut self, samples: impl IntoIterator<Item = ConfigurationSample>) -> Self {
        self.initial.extend(samples);
        self
    }

    /// Uniform over the integers of the domain, both bounds included.
    fn draw(rng: &mut StdRng, domain: &NumericDomain) -> SampleValue {
        match domain.integer_bounds() {
            Some((lo, hi)) => SampleValue::Int(rng.gen_range(lo..=hi)),
            None => SampleValue::Float(rng.gen_range(domain.min..=domain.max)),
        }
    }

    fn sample_one(&mut self) -> ConfigurationSample {
        let mut sample = ConfigurationSample::new();

        for spec in self.space.iter() {
            let name = spec.name.clone();
            sample = match &spec.kind {
                ParameterKind::Numeric(domain) => sample.with(name, Self::draw(&mut self.rng, domain)),
                ParameterKind::Constant { value, .. } => sample.with(name, SampleValue::Float(*value)),
                ParameterKind::Categorical { choices } if choices.is_empty() => sample,
                ParameterKind::Categorical { choices } => {
                    let idx = self.rng.gen_range(0..choices.len());
                    sample.with(name, SampleValue::Choice(choices[idx].clone()))
                }
                ParameterKind::ConditionalPair { body } => {
                    if self.rng.gen_bool(0.5) {
                        sample
                            .with(spec.gate_name(), SampleValue::Choice(GATE_INFINITY.to_string()))
                            .with(name, SampleValue::Float(f64::NAN))
                    } else {
                        sample
                            .with(spec.gate_name(), SampleValue::Choice(GATE_FINITE.to_string()))
                            .with(name, Self::draw(&mut self.rng, body))
                    }
                }
            };
        }

        sample
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<ConfigurationSample> {
        (0..count)
            .map(|_| match self.initial.pop_front() {
                Some(sample) => sample,
                None => self.sample_one(),
            })
            .collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}
