//! The nested configuration document consumed by the simulator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-shaped tree rooted at the simulator's native input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RealizedConfiguration(Value);

impl Default for RealizedConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl RealizedConfiguration {
    pub fn new() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Write `value` at `path`, creating intermediate objects as needed. A
    /// non-object found on the way is replaced by an object.
    pub fn set_path<S: AsRef<str>>(&mut self, path: &[S], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut node = &mut self.0;
        for segment in parents {
            node = ensure_object(node)
                .entry(segment.as_ref().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(node).insert(last.as_ref().to_string(), value);
    }

    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.0, |node, segment| node.get(segment.as_ref()))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.0)
    }
}

impl From<Value> for RealizedConfiguration {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}
