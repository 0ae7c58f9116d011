//! Flat parameter-space types exchanged with search strategies.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::errors::RangeError;
use crate::range::{CalibrationRange, Scale};

/// Joins hierarchy path segments into a parameter name.
pub const NAME_DELIMITER: &str = "-";

/// Prefix of the categorical gate that accompanies a conditional parameter in
/// a flat sample.
pub const GATE_PREFIX: &str = "CAT_";

pub const GATE_INFINITY: &str = "infinity";
pub const GATE_FINITE: &str = "finite";

/// Bounded integer-valued domain sampled by a search strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericDomain {
    pub scale: Scale,
    pub min: f64,
    pub max: f64,
    pub unit: Option<String>,
}

impl NumericDomain {
    /// Sampling requires `min < max`; one-point ranges must be modelled as
    /// [`ParameterKind::Constant`].
    pub fn new(
        key: &str,
        scale: Scale,
        min: f64,
        max: f64,
        unit: Option<String>,
    ) -> Result<Self, RangeError> {
        if min.is_nan() || max.is_nan() || min >= max {
            return Err(RangeError::InvalidRange {
                key: key.to_string(),
                message: format!("sampled range needs min < max (got {min}..{max})"),
            });
        }
        Ok(Self {
            scale,
            min,
            max,
            unit,
        })
    }

    pub fn from_range(key: &str, range: &CalibrationRange) -> Result<Self, RangeError> {
        Self::new(key, range.scale, range.min, range.max, range.unit.clone())
    }

    pub fn contains(&self, raw: f64) -> bool {
        raw >= self.min && raw <= self.max
    }

    /// Smallest and largest integer inside the domain, if it holds any.
    pub fn integer_bounds(&self) -> Option<(i64, i64)> {
        let lo = self.min.ceil() as i64;
        let hi = self.max.floor() as i64;
        (lo <= hi).then_some((lo, hi))
    }

    /// Up to `steps` evenly spaced integers covering the domain, both ends
    /// included. Computed without walking the range.
    pub fn grid_points(&self, steps: usize) -> Vec<i64> {
        let Some((lo, hi)) = self.integer_bounds() else {
            return Vec::new();
        };
        let span = i128::from(hi) - i128::from(lo);
        let steps = steps.max(2) as i128;
        if span < steps {
            return (lo..=hi).collect();
        }
        let mut points: Vec<i64> = (0..steps)
            .map(|i| (i128::from(lo) + i * span / (steps - 1)) as i64)
            .collect();
        points.dedup();
        points
    }
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    Numeric(NumericDomain),
    /// Degenerate numeric range (`min == max`).
    Constant {
        value: f64,
        scale: Scale,
        unit: Option<String>,
    },
    Categorical { choices: Vec<String> },
    /// Gate `CAT_<name>` in {"infinity", "finite"}; the body only counts
    /// under "finite".
    ConditionalPair { body: NumericDomain },
}

/// A single named dimension of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Path segments joined by [`NAME_DELIMITER`].
    pub name: String,
    /// Location of the leaf in the realized configuration.
    pub path: Vec<String>,
    pub kind: ParameterKind,
}

impl ParameterSpec {
    pub fn new(path: Vec<String>, kind: ParameterKind) -> Self {
        Self {
            name: path.join(NAME_DELIMITER),
            path,
            kind,
        }
    }

    /// A spec whose name differs from its joined path (top-level keys such as
    /// `workflow` that realize under `workflow.file`).
    pub fn named(name: impl Into<String>, path: Vec<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            path,
            kind,
        }
    }

    pub fn categorical(path: Vec<String>, choices: Vec<String>) -> Self {
        Self::new(path, ParameterKind::Categorical { choices })
    }

    pub fn gate_name(&self) -> String {
        gate_name(&self.name)
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.kind, ParameterKind::ConditionalPair { .. })
    }

    pub fn scale(&self) -> Option<Scale> {
        match &self.kind {
            ParameterKind::Numeric(domain) | ParameterKind::ConditionalPair { body: domain } => {
                Some(domain.scale)
            }
            ParameterKind::Constant { scale, .. } => Some(*scale),
            ParameterKind::Categorical { .. } => None,
        }
    }

    pub fn unit(&self) -> Option<&str> {
        match &self.kind {
            ParameterKind::Numeric(domain) | ParameterKind::ConditionalPair { body: domain } => {
                domain.unit.as_deref()
            }
            ParameterKind::Constant { unit, .. } => unit.as_deref(),
            ParameterKind::Categorical { .. } => None,
        }
    }
}

pub fn gate_name(name: &str) -> String {
    format!("{GATE_PREFIX}{name}")
}

/// A raw value chosen by a search strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Int(i64),
    Float(f64),
    Choice(String),
}

impl SampleValue {
    /// Numeric view; the literal `"infinity"` maps to NaN (inactive body).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Choice(s) if s == GATE_INFINITY => Some(f64::NAN),
            Self::Choice(s) => s.parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Choice(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Choice(v) => write!(f, "{v}"),
        }
    }
}

/// One optimizer-chosen point: parameter name to raw value. Immutable once
/// built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSample {
    values: BTreeMap<String, SampleValue>,
}

impl ConfigurationSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: SampleValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SampleValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SampleValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Gate resolution for a conditional parameter: the explicit gate wins,
    /// otherwise a NaN or missing body means "infinity".
    pub fn is_infinite(&self, name: &str) -> bool {
        if let Some(gate) = self.get(&gate_name(name)).and_then(SampleValue::as_str) {
            return gate == GATE_INFINITY;
        }
        match self.get(name).and_then(SampleValue::as_f64) {
            Some(raw) => raw.is_nan(),
            None => true,
        }
    }
}

impl FromIterator<(String, SampleValue)> for ConfigurationSample {
    fn from_iter<I: IntoIterator<Item = (String, SampleValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl From<HashMap<String, SampleValue>> for ConfigurationSample {
    fn from(values: HashMap<String, SampleValue>) -> Self {
        values.into_iter().collect()
    }
}

/// The full search space: parameter specs with unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ParameterSpec>", into = "Vec<ParameterSpec>")]
pub struct ParameterSpace {
    parameters: Vec<ParameterSpec>,
    index: HashMap<String, usize>,
}

impl TryFrom<Vec<ParameterSpec>> for ParameterSpace {
    type Error = RangeError;

    fn try_from(parameters: Vec<ParameterSpec>) -> Result<Self, Self::Error> {
        let mut space = Self::new();
        for spec in parameters {
            space.push(spec)?;
        }
        Ok(space)
    }
}

impl From<ParameterSpace> for Vec<ParameterSpec> {
    fn from(space: ParameterSpace) -> Self {
        space.parameters
    }
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, spec: ParameterSpec) -> Result<(), RangeError> {
        if self.index.contains_key(&spec.name) {
            return Err(RangeError::DuplicateParameter { name: spec.name });
        }
        self.index.insert(spec.name.clone(), self.parameters.len());
        self.parameters.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.index.get(name).map(|&i| &self.parameters[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParameterSpec> {
        self.parameters.iter()
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}
