//! Derives the flat parameter space from a simulator configuration template.

use sc_types::{
    CalibrationRange, NumericDomain, ParameterKind, ParameterSpace, ParameterSpec, RangeError,
    ScResult, NAME_DELIMITER,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ranges::CalibrationRangeTable;
use crate::schema::{active_schemes, is_conditional_key, SchemaNode, SchemaTree, SchemeSelection};

pub const WORKFLOW_KEY: &str = "workflow";
pub const WORKFLOW_FILE_KEY: &str = "file";
pub const REFERENCE_FLOPS_KEY: &str = "reference_flops";
pub const SCHEDULING_OVERHEAD_KEY: &str = "scheduling_overhead";

/// Output of [`ParameterSpaceBuilder::build`].
#[derive(Debug, Clone)]
pub struct SpaceDefinition {
    pub tree: SchemaTree,
    pub space: ParameterSpace,
    /// Names of leaves dropped because no calibration range matched.
    pub dropped: Vec<String>,
}

impl SpaceDefinition {
    pub fn schemes(&self) -> &[SchemeSelection] {
        &self.tree.schemes
    }
}

/// Walks the active scheme subtrees of a template and consults the range
/// table for every scalar leaf.
#[derive(Debug, Clone)]
pub struct ParameterSpaceBuilder<'a> {
    table: &'a CalibrationRangeTable,
    strict: bool,
}

impl<'a> ParameterSpaceBuilder<'a> {
    pub fn new(table: &'a CalibrationRangeTable) -> Self {
        Self {
            table,
            strict: true,
        }
    }

    /// Allow substring matches for non-payload leaves.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(&self, template: &Value) -> ScResult<SpaceDefinition> {
        let root = template.as_object().ok_or_else(|| {
            sc_types::config_error!("simulator configuration template must be a JSON object")
        })?;

        let schemes = active_schemes(template);
        let mut dropped = Vec::new();
        let mut top = Vec::new();

        for scheme in &schemes {
            top.push((
                scheme.scheme_key.clone(),
                SchemaNode::Leaf(ParameterSpec::categorical(
                    vec![scheme.scheme_key.clone()],
                    vec![scheme.chosen.clone()],
                )),
            ));
        }

        if let Some(workflow) = root.get(WORKFLOW_KEY) {
            if let Some(file) = workflow.get(WORKFLOW_FILE_KEY).and_then(Value::as_str) {
                top.push((
                    WORKFLOW_KEY.to_string(),
                    SchemaNode::Leaf(ParameterSpec::named(
                        WORKFLOW_KEY,
                        path_of(&[WORKFLOW_KEY, WORKFLOW_FILE_KEY]),
                        ParameterKind::Categorical {
                            choices: vec![file.to_string()],
                        },
                    )),
                ));
            }
            if let Some(flops) = workflow.get(REFERENCE_FLOPS_KEY) {
                let spec = self.top_level_spec(
                    REFERENCE_FLOPS_KEY,
                    path_of(&[WORKFLOW_KEY, REFERENCE_FLOPS_KEY]),
                    flops,
                )?;
                top.push((REFERENCE_FLOPS_KEY.to_string(), SchemaNode::Leaf(spec)));
            }
        }

        if let Some(overhead) = root.get(SCHEDULING_OVERHEAD_KEY) {
            let spec = self.top_level_spec(
                SCHEDULING_OVERHEAD_KEY,
                path_of(&[SCHEDULING_OVERHEAD_KEY]),
                overhead,
            )?;
            top.push((SCHEDULING_OVERHEAD_KEY.to_string(), SchemaNode::Leaf(spec)));
        }

        for scheme in &schemes {
            let group_key = scheme.group_key();
            let subtree = root
                .get(&group_key)
                .and_then(|groups| groups.get(&scheme.chosen));
            let node = match subtree {
                Some(value) => {
                    let mut path = vec![group_key.clone(), scheme.chosen.clone()];
                    self.walk(value, &mut path, &mut dropped)?
                }
                None => {
                    warn!(
                        scheme = %scheme.scheme_key,
                        chosen = %scheme.chosen,
                        "template has no parameters for the selected scheme"
                    );
                    SchemaNode::group()
                }
            };
            top.push((
                group_key,
                SchemaNode::Group(vec![(scheme.chosen.clone(), node)]),
            ));
        }

        let tree = SchemaTree {
            root: SchemaNode::Group(top),
            schemes,
        };
        let space = tree.flatten()?;
        info!(
            parameters = space.len(),
            dropped = dropped.len(),
            "parameter space built"
        );
        Ok(SpaceDefinition {
            tree,
            space,
            dropped,
        })
    }

    fn walk(
        &self,
        value: &Value,
        path: &mut Vec<String>,
        dropped: &mut Vec<String>,
    ) -> Result<SchemaNode, RangeError> {
        match value {
            Value::Object(children) => {
                let mut nodes = Vec::with_capacity(children.len());
                for (key, child) in children {
                    path.push(key.clone());
                    let node = self.walk(child, path, dropped)?;
                    path.pop();
                    nodes.push((key.clone(), node));
                }
                Ok(SchemaNode::Group(nodes))
            }
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                match self.leaf_spec(path)? {
                    Some(spec) => Ok(SchemaNode::Leaf(spec)),
                    None => {
                        dropped.push(path.join(NAME_DELIMITER));
                        Ok(SchemaNode::group())
                    }
                }
            }
            Value::Array(_) | Value::Null => {
                debug!(path = %path.join(NAME_DELIMITER), "skipping non-scalar template leaf");
                Ok(SchemaNode::group())
            }
        }
    }

    fn leaf_spec(&self, path: &[String]) -> Result<Option<ParameterSpec>, RangeError> {
        let name = path.join(NAME_DELIMITER);
        let leaf = path.last().map(String::as_str).unwrap_or_default();
        let (key, range) = self.table.resolve(&name, leaf, self.strict);
        let Some(range) = range else {
            let missing = RangeError::MissingCalibrationRange {
                parameter: name.clone(),
                key: key.to_string(),
            };
            warn!(error = %missing, "parameter dropped");
            return Ok(None);
        };
        let kind = numeric_kind(key, range)?;
        debug!(parameter = %name, key = %key, "added parameter for calibration");
        Ok(Some(ParameterSpec::new(path.to_vec(), kind)))
    }

    /// Top-level keys are numeric when a range exists and otherwise carried as
    /// a single-choice constant of the template value.
    fn top_level_spec(
        &self,
        key: &str,
        path: Vec<String>,
        template_value: &Value,
    ) -> Result<ParameterSpec, RangeError> {
        let kind = match self.table.get_range(key, true) {
            Some(range) => numeric_kind(key, range)?,
            None => ParameterKind::Categorical {
                choices: vec![scalar_to_string(template_value)],
            },
        };
        Ok(ParameterSpec::named(key, path, kind))
    }
}

/// Range-to-kind rules shared by every numeric leaf.
pub fn numeric_kind(key: &str, range: &CalibrationRange) -> Result<ParameterKind, RangeError> {
    range.validate(key)?;
    if is_conditional_key(key) && range.infinity_allowed {
        return Ok(ParameterKind::ConditionalPair {
            body: NumericDomain::from_range(key, range)?,
        });
    }
    if range.is_degenerate() {
        return Ok(ParameterKind::Constant {
            value: range.min,
            scale: range.scale,
            unit: range.unit.clone(),
        });
    }
    Ok(ParameterKind::Numeric(NumericDomain::from_range(key, range)?))
}

/// Convenience wrapper returning only the flat space.
pub fn build_space(template: &Value, table: &CalibrationRangeTable) -> ScResult<ParameterSpace> {
    Ok(ParameterSpaceBuilder::new(table).build(template)?.space)
}

pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn path_of(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}
