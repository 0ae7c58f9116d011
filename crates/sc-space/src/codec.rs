//! Conversion between flat optimizer samples and realized configurations.

use std::sync::Arc;

use sc_types::{
    ConfigurationSample, ParameterKind, ParameterSpace, ParameterSpec, RangeError,
    RealizedConfiguration, SampleValue, Scale, GATE_FINITE, GATE_INFINITY, GATE_PREFIX,
    NAME_DELIMITER,
};
use serde_json::Value;
use tracing::warn;

use crate::builder::{scalar_to_string, SpaceDefinition};
use crate::ranges::{semantic_key, CalibrationRangeTable};
use crate::schema::{is_conditional_key, SchemeSelection};

/// Bidirectional codec for one parameter space.
///
/// Holds everything a worker needs to decode a sample, so one instance is
/// built per search run and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ConfigCodec {
    space: ParameterSpace,
    schemes: Vec<SchemeSelection>,
    prefixes: Vec<String>,
    table: Arc<CalibrationRangeTable>,
    strict: bool,
}

impl ConfigCodec {
    pub fn new(definition: &SpaceDefinition, table: Arc<CalibrationRangeTable>) -> Self {
        Self {
            space: definition.space.clone(),
            schemes: definition.schemes().to_vec(),
            prefixes: definition.tree.group_prefixes(),
            table,
            strict: true,
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn schemes(&self) -> &[SchemeSelection] {
        &self.schemes
    }

    /// The chosen value for `scheme_key`, if that scheme is active.
    pub fn scheme(&self, scheme_key: &str) -> Option<&str> {
        self.schemes
            .iter()
            .find(|s| s.scheme_key == scheme_key)
            .map(|s| s.chosen.as_str())
    }

    fn in_group(&self, name: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            name.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with(NAME_DELIMITER))
        })
    }

    /// Decode `sample` into the nested configuration the simulator consumes.
    pub fn decode(&self, sample: &ConfigurationSample) -> Result<RealizedConfiguration, RangeError> {
        let mut realized = RealizedConfiguration::new();

        // Top-level keys first, then the scheme groups.
        let (top, grouped): (Vec<&ParameterSpec>, Vec<&ParameterSpec>) =
            self.space.iter().partition(|spec| !self.in_group(&spec.name));
        for spec in top.into_iter().chain(grouped) {
            if let Some(text) = decode_spec(spec, sample)? {
                realized.set_path(&spec.path, Value::String(text));
            }
        }

        // Group entries the space does not declare are resolved against the
        // range table directly.
        for (name, value) in sample.iter() {
            if name.starts_with(GATE_PREFIX)
                || self.space.get(name).is_some()
                || !self.in_group(name)
            {
                continue;
            }
            if let Some(text) = self.decode_undeclared(name, value)? {
                let path: Vec<&str> = name.split(NAME_DELIMITER).collect();
                realized.set_path(&path, Value::String(text));
            }
        }

        Ok(realized)
    }

    fn decode_undeclared(&self, name: &str, value: &SampleValue) -> Result<Option<String>, RangeError> {
        let leaf = name.rsplit(NAME_DELIMITER).next().unwrap_or(name);
        let (key, range) = self.table.resolve(name, leaf, self.strict);
        let Some(range) = range else {
            warn!(parameter = %name, key = %key, "no calibration range found; value skipped");
            return Ok(None);
        };
        match value.as_f64() {
            Some(raw) if raw.is_nan() && is_conditional_key(key) => {
                Ok(Some(GATE_INFINITY.to_string()))
            }
            Some(raw) if raw.is_nan() => Err(not_a_number(name)),
            Some(raw) => Ok(Some(range.scale.realize(raw, range.unit()))),
            None => Ok(Some(value.to_string())),
        }
    }

    /// Inverse of [`ConfigCodec::decode`] over the declared space. Leaves
    /// missing from `realized` are left out of the sample.
    pub fn encode(&self, realized: &RealizedConfiguration) -> Result<ConfigurationSample, RangeError> {
        let mut sample = ConfigurationSample::new();
        for spec in self.space.iter() {
            let Some(value) = realized.get_path(&spec.path) else {
                continue;
            };
            let text = scalar_to_string(value);
            sample = match &spec.kind {
                ParameterKind::Categorical { .. } => {
                    sample.with(spec.name.clone(), SampleValue::Choice(text))
                }
                ParameterKind::Numeric(domain) => sample.with(
                    spec.name.clone(),
                    encode_number(spec, &text, domain.scale, domain.unit.as_deref())?,
                ),
                ParameterKind::Constant { scale, unit, .. } => sample.with(
                    spec.name.clone(),
                    encode_number(spec, &text, *scale, unit.as_deref())?,
                ),
                ParameterKind::ConditionalPair { body } => {
                    if text == GATE_INFINITY {
                        sample
                            .with(spec.gate_name(), SampleValue::Choice(GATE_INFINITY.into()))
                            .with(spec.name.clone(), SampleValue::Float(f64::NAN))
                    } else {
                        let raw = encode_number(spec, &text, body.scale, body.unit.as_deref())?;
                        sample
                            .with(spec.gate_name(), SampleValue::Choice(GATE_FINITE.into()))
                            .with(spec.name.clone(), raw)
                    }
                }
            };
        }
        Ok(sample)
    }

    /// Encode the values a template already carries, for seeding a search.
    pub fn encode_template(&self, template: &Value) -> Result<ConfigurationSample, RangeError> {
        self.encode(&RealizedConfiguration::from(template.clone()))
    }
}

/// Realize one declared parameter, or `None` when the sample carries no
/// value for it.
pub fn decode_spec(
    spec: &ParameterSpec,
    sample: &ConfigurationSample,
) -> Result<Option<String>, RangeError> {
    let value = sample.get(&spec.name);
    match &spec.kind {
        ParameterKind::Categorical { choices } => Ok(value
            .map(|v| v.to_string())
            .or_else(|| choices.first().cloned())),
        ParameterKind::Constant { value: fixed, scale, unit } => {
            let raw = value.and_then(SampleValue::as_f64).unwrap_or(*fixed);
            if raw.is_nan() {
                return Err(not_a_number(&spec.name));
            }
            Ok(Some(scale.realize(raw, unit.as_deref())))
        }
        ParameterKind::Numeric(domain) => match value {
            None => Ok(None),
            Some(v) => {
                let raw = v.as_f64().ok_or_else(|| RangeError::Unencodable {
                    parameter: spec.name.clone(),
                    value: v.to_string(),
                    message: "expected a number".to_string(),
                })?;
                if raw.is_nan() {
                    return Err(not_a_number(&spec.name));
                }
                Ok(Some(domain.scale.realize(raw, domain.unit.as_deref())))
            }
        },
        ParameterKind::ConditionalPair { body } => {
            if sample.is_infinite(&spec.name) {
                return Ok(Some(GATE_INFINITY.to_string()));
            }
            match value.and_then(SampleValue::as_f64) {
                Some(raw) if !raw.is_nan() => {
                    Ok(Some(body.scale.realize(raw, body.unit.as_deref())))
                }
                _ => Ok(Some(GATE_INFINITY.to_string())),
            }
        }
    }
}

fn encode_number(
    spec: &ParameterSpec,
    text: &str,
    scale: Scale,
    unit: Option<&str>,
) -> Result<SampleValue, RangeError> {
    scale
        .unrealize(text, unit)
        .map(|raw| SampleValue::Int(raw as i64))
        .ok_or_else(|| RangeError::Unencodable {
            parameter: spec.name.clone(),
            value: text.to_string(),
            message: format!("not a {scale} value with unit {}", unit.unwrap_or("<none>")),
        })
}

fn not_a_number(name: &str) -> RangeError {
    RangeError::Unencodable {
        parameter: name.to_string(),
        value: "NaN".to_string(),
        message: format!(
            "only {} leaves may be left unbounded",
            crate::schema::CONDITIONAL_KEYS.join(" and ")
        ),
    }
}

/// Semantic key of the last segment of a flat parameter name.
pub fn leaf_key(name: &str) -> &str {
    semantic_key(name.rsplit(NAME_DELIMITER).next().unwrap_or(name))
}
