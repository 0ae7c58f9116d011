//! Calibration-range lookup table.
//!
//! The ranges document is a nested JSON mapping from parameter-name fragments
//! to `{min, max, scale, unit, infinity_allowed}` records. It is indexed once
//! at load time: an exact-key map (first depth-first occurrence wins) and a
//! depth-first ordered list used for substring lookups.

use std::collections::HashMap;
use std::path::Path;

use sc_types::{CalibrationRange, RangeError, ScResult};
use serde_json::{Map, Value};
use tracing::debug;

/// Every payload-class parameter shares this range entry.
pub const PAYLOAD_KEY: &str = "payloads";

/// Separator between a property namespace and its key
/// (`StorageServiceProperty::BUFFER_SIZE`).
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Strip any `Namespace::` prefix from a path segment.
pub fn semantic_key(segment: &str) -> &str {
    segment
        .rsplit_once(NAMESPACE_SEPARATOR)
        .map_or(segment, |(_, key)| key)
}

pub fn is_payload(name: &str) -> bool {
    name.contains("payload") || name.contains("Payload")
}

#[derive(Debug, Clone, Default)]
pub struct CalibrationRangeTable {
    exact: HashMap<String, CalibrationRange>,
    ordered: Vec<(String, CalibrationRange)>,
}

impl CalibrationRangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> ScResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let table = Self::from_json_str(&text)?;
        debug!(
            path = %path.as_ref().display(),
            entries = table.len(),
            "loaded calibration ranges"
        );
        Ok(table)
    }

    pub fn from_json_str(text: &str) -> ScResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(&value)?)
    }

    pub fn from_value(value: &Value) -> Result<Self, RangeError> {
        let root = value.as_object().ok_or_else(|| RangeError::MalformedDocument {
            message: "top level must be an object".to_string(),
        })?;
        let mut table = Self::new();
        table.index_object(root, "")?;
        Ok(table)
    }

    /// Add a single entry at the end of the depth-first order.
    pub fn insert(&mut self, key: impl Into<String>, range: CalibrationRange) {
        let key = key.into();
        self.exact.entry(key.clone()).or_insert_with(|| range.clone());
        self.ordered.push((key, range));
    }

    fn index_object(&mut self, object: &Map<String, Value>, at: &str) -> Result<(), RangeError> {
        for (key, value) in object {
            let location = if at.is_empty() {
                key.clone()
            } else {
                format!("{at}.{key}")
            };
            let Value::Object(inner) = value else {
                return Err(RangeError::MalformedDocument {
                    message: format!("{location}: expected an object, found {value}"),
                });
            };
            if inner.contains_key("min") && inner.contains_key("max") {
                let range: CalibrationRange = serde_json::from_value(value.clone()).map_err(
                    |e| RangeError::MalformedDocument {
                        message: format!("{location}: {e}"),
                    },
                )?;
                self.insert(key.clone(), range);
            } else {
                self.index_object(inner, &location)?;
            }
        }
        Ok(())
    }

    /// Strict lookup needs an exact key; non-strict also accepts the first
    /// key (depth-first) that contains `key` as a substring.
    pub fn get_range(&self, key: &str, strict: bool) -> Option<&CalibrationRange> {
        if let Some(range) = self.exact.get(key) {
            return Some(range);
        }
        if strict {
            return None;
        }
        self.ordered
            .iter()
            .find(|(candidate, _)| candidate.contains(key))
            .map(|(_, range)| range)
    }

    /// Resolve the range for a full parameter name whose last path segment is
    /// `leaf`. Returns the key used for the lookup alongside the range.
    pub fn resolve<'a>(
        &'a self,
        name: &str,
        leaf: &'a str,
        strict: bool,
    ) -> (&'a str, Option<&'a CalibrationRange>) {
        if is_payload(name) {
            return (PAYLOAD_KEY, self.get_range(PAYLOAD_KEY, true));
        }
        let key = semantic_key(leaf);
        (key, self.get_range(key, strict))
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
