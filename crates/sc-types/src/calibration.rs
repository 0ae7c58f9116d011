//! Calibrations: the concrete values picked by a completed search.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::parameter::{
    gate_name, ConfigurationSample, ParameterKind, ParameterSpec, SampleValue, GATE_FINITE,
    GATE_INFINITY,
};
use crate::range::Scale;
use crate::realized::RealizedConfiguration;

/// A chosen raw value plus everything needed to realize it again without the
/// parameter space that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedValue {
    pub raw: SampleValue,
    pub path: Vec<String>,
    /// `None` for categorical values.
    pub scale: Option<Scale>,
    pub unit: Option<String>,
    #[serde(default)]
    pub conditional: bool,
}

impl CalibratedValue {
    /// Capture the value `sample` holds for `spec`. Inactive conditional
    /// bodies are stored as the literal `"infinity"`.
    pub fn capture(spec: &ParameterSpec, sample: &ConfigurationSample) -> Option<Self> {
        let raw = match &spec.kind {
            ParameterKind::ConditionalPair { .. } if sample.is_infinite(&spec.name) => {
                SampleValue::Choice(GATE_INFINITY.to_string())
            }
            ParameterKind::Constant { value, .. } => sample
                .get(&spec.name)
                .cloned()
                .unwrap_or(SampleValue::Float(*value)),
            _ => sample.get(&spec.name)?.clone(),
        };
        Some(Self {
            raw,
            path: spec.path.clone(),
            scale: spec.scale(),
            unit: spec.unit().map(str::to_string),
            conditional: spec.is_conditional(),
        })
    }

    /// The leaf value the simulator sees.
    pub fn realize(&self) -> String {
        match (self.scale, self.raw.as_f64()) {
            (_, Some(raw)) if self.conditional && raw.is_nan() => GATE_INFINITY.to_string(),
            (Some(scale), Some(raw)) => scale.realize(raw, self.unit.as_deref()),
            _ => self.raw.to_string(),
        }
    }
}

/// Parameter name to calibrated value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub values: BTreeMap<String, CalibratedValue>,
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sample<'a>(
        specs: impl IntoIterator<Item = &'a ParameterSpec>,
        sample: &ConfigurationSample,
    ) -> Self {
        let values = specs
            .into_iter()
            .filter_map(|spec| {
                CalibratedValue::capture(spec, sample).map(|value| (spec.name.clone(), value))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&CalibratedValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Flatten back into an optimizer sample, restoring conditional gates.
    pub fn to_sample(&self) -> ConfigurationSample {
        let mut entries = Vec::with_capacity(self.values.len());
        for (name, value) in &self.values {
            if value.conditional {
                let infinite = value.raw.as_f64().map_or(true, f64::is_nan);
                let gate = if infinite { GATE_INFINITY } else { GATE_FINITE };
                entries.push((gate_name(name), SampleValue::Choice(gate.to_string())));
            }
            entries.push((name.clone(), value.raw.clone()));
        }
        entries.into_iter().collect()
    }

    /// Write every calibrated value onto `base` at its recorded path.
    pub fn apply_to(&self, base: &mut RealizedConfiguration) {
        for value in self.values.values() {
            base.set_path(&value.path, serde_json::Value::String(value.realize()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::NumericDomain;

    fn buffer_spec() -> ParameterSpec {
        ParameterSpec::new(
            vec!["storage".into(), "BUFFER_SIZE".into()],
            ParameterKind::ConditionalPair {
                body: NumericDomain::new("BUFFER_SIZE", Scale::Log2, 20.0, 30.0, Some("B".into()))
                    .unwrap(),
            },
        )
    }

    #[test]
    fn capture_infinite_gate() {
        let spec = buffer_spec();
        let sample = ConfigurationSample::new()
            .with("CAT_storage-BUFFER_SIZE", SampleValue::Choice("infinity".into()))
            .with("storage-BUFFER_SIZE", SampleValue::Int(22));
        let value = CalibratedValue::capture(&spec, &sample).unwrap();
        assert_eq!(value.realize(), "infinity");

        // Persisted form must survive JSON (NaN would not).
        let json = serde_json::to_string(&value).unwrap();
        let back: CalibratedValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back.realize(), "infinity");
    }

    #[test]
    fn capture_finite_gate() {
        let spec = buffer_spec();
        let sample = ConfigurationSample::new()
            .with("CAT_storage-BUFFER_SIZE", SampleValue::Choice("finite".into()))
            .with("storage-BUFFER_SIZE", SampleValue::Int(22));
        let value = CalibratedValue::capture(&spec, &sample).unwrap();
        assert_eq!(value.realize(), "4194304B");
    }

    #[test]
    fn to_sample_restores_gates() {
        let spec = buffer_spec();
        let sample = ConfigurationSample::new()
            .with("CAT_storage-BUFFER_SIZE", SampleValue::Choice("infinity".into()))
            .with("storage-BUFFER_SIZE", SampleValue::Float(f64::NAN));
        let calibration = Calibration::from_sample([&spec], &sample);
        let restored = calibration.to_sample();
        assert!(restored.is_infinite("storage-BUFFER_SIZE"));
        assert_eq!(
            restored.get("CAT_storage-BUFFER_SIZE"),
            Some(&SampleValue::Choice("infinity".into()))
        );
    }

    #[test]
    fn apply_writes_paths() {
        let spec = buffer_spec();
        let sample = ConfigurationSample::new()
            .with("CAT_storage-BUFFER_SIZE", SampleValue::Choice("finite".into()))
            .with("storage-BUFFER_SIZE", SampleValue::Int(20));
        let calibration = Calibration::from_sample([&spec], &sample);
        assert_eq!(calibration.len(), 1);

        let mut config = RealizedConfiguration::new();
        calibration.apply_to(&mut config);
        assert_eq!(
            config.get_path(&["storage", "BUFFER_SIZE"]),
            Some(&serde_json::json!("1048576B"))
        );
    }
}
