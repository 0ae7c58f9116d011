//! Typed view of a simulator configuration template.

use sc_types::{ParameterSpace, ParameterSpec, RangeError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Suffix that turns a scheme key into its parameter-group key
/// (`compute_service_scheme` -> `compute_service_scheme_parameters`).
pub const PARAMETERS_SUFFIX: &str = "_parameters";

/// Leaves that may be unbounded; modelled as a gate plus a numeric body when
/// their range allows infinity.
pub const CONDITIONAL_KEYS: [&str; 2] = ["BUFFER_SIZE", "MAX_NUM_CONCURRENT_DATA_CONNECTIONS"];

pub fn is_conditional_key(key: &str) -> bool {
    CONDITIONAL_KEYS.contains(&key)
}

/// One scheme choice made by the template, e.g.
/// `storage_service_scheme = "submit_only"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeSelection {
    pub scheme_key: String,
    pub chosen: String,
}

impl SchemeSelection {
    pub fn group_key(&self) -> String {
        format!("{}{}", self.scheme_key, PARAMETERS_SUFFIX)
    }
}

/// Every top-level `X` holding a string for which `X_parameters` exists.
pub fn active_schemes(template: &Value) -> Vec<SchemeSelection> {
    let Some(root) = template.as_object() else {
        return Vec::new();
    };
    root.iter()
        .filter_map(|(key, value)| {
            let chosen = value.as_str()?;
            root.contains_key(&format!("{key}{PARAMETERS_SUFFIX}"))
                .then(|| SchemeSelection {
                    scheme_key: key.clone(),
                    chosen: chosen.to_string(),
                })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Group(Vec<(String, SchemaNode)>),
    Leaf(ParameterSpec),
}

impl SchemaNode {
    pub fn group() -> Self {
        Self::Group(Vec::new())
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Group(children) => children.iter().map(|(_, c)| c.leaf_count()).sum(),
        }
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a ParameterSpec>) {
        match self {
            Self::Leaf(spec) => out.push(spec),
            Self::Group(children) => {
                for (_, child) in children {
                    child.collect(out);
                }
            }
        }
    }
}

/// The parameter tree built from a template: top-level leaves followed by
/// one subtree per active scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaTree {
    pub root: SchemaNode,
    pub schemes: Vec<SchemeSelection>,
}

impl SchemaTree {
    pub fn leaves(&self) -> Vec<&ParameterSpec> {
        let mut out = Vec::new();
        self.root.collect(&mut out);
        out
    }

    /// Depth-first flattening; fails on duplicate names.
    pub fn flatten(&self) -> Result<ParameterSpace, RangeError> {
        let mut space = ParameterSpace::new();
        for spec in self.leaves() {
            space.push(spec.clone())?;
        }
        Ok(space)
    }

    pub fn group_prefixes(&self) -> Vec<String> {
        self.schemes.iter().map(SchemeSelection::group_key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn discovers_active_schemes() {
        let template = json!({
            "workflow": {"file": "wf.json"},
            "compute_service_scheme": "all_bare_metal",
            "compute_service_scheme_parameters": {"all_bare_metal": {}},
            "storage_service_scheme": "submit_only",
            "storage_service_scheme_parameters": {"submit_only": {}},
            "orphan_scheme": "nothing"
        });
        let schemes = active_schemes(&template);
        assert_eq!(schemes.len(), 2);
        assert_eq!(schemes[0].scheme_key, "compute_service_scheme");
        assert_eq!(schemes[0].group_key(), "compute_service_scheme_parameters");
        assert_eq!(schemes[1].chosen, "submit_only");
    }

    #[test]
    fn conditional_keys() {
        assert!(is_conditional_key("BUFFER_SIZE"));
        assert!(is_conditional_key("MAX_NUM_CONCURRENT_DATA_CONNECTIONS"));
        assert!(!is_conditional_key("speed"));
    }
}
