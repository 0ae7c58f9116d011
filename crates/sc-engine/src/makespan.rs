//! Recorded makespans of real workflow executions.
//!
//! A workflow group lists repeated executions of one workflow
//! configuration. It is simulated once and compared against the mean of
//! the makespans its files recorded.

use sc_types::{validation_error, ScResult};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Where a workflow execution file records its makespan.
pub const MAKESPAN_POINTER: &str = "/workflow/execution/makespanInSeconds";

pub async fn recorded_makespan(path: &Path) -> ScResult<f64> {
    let text = tokio::fs::read_to_string(path).await?;
    let document: Value = serde_json::from_str(&text)?;
    document
        .pointer(MAKESPAN_POINTER)
        .and_then(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .filter(|makespan| makespan.is_finite())
        .ok_or_else(|| {
            validation_error!("{} records no numeric makespan", path.display())
        })
}

/// Mean recorded makespan of `group`. `first` stands in for the first
/// file when the simulator already reported its real makespan.
pub async fn group_makespan(group: &[PathBuf], first: Option<f64>) -> ScResult<f64> {
    if group.is_empty() {
        return Err(validation_error!("empty workflow group"));
    }
    let mut total = 0.0;
    for (i, path) in group.iter().enumerate() {
        total += match first {
            Some(reported) if i == 0 => reported,
            _ => recorded_makespan(path).await?,
        };
    }
    Ok(total / group.len() as f64)
}

/// Non-empty groups only.
pub(crate) fn non_empty(groups: &[Vec<PathBuf>]) -> impl Iterator<Item = &[PathBuf]> {
    groups
        .iter()
        .filter(|group| !group.is_empty())
        .map(Vec::as_slice)
}

#[cfg(test)]
pub(crate) fn write_execution(dir: &Path, name: &str, makespan: f64) -> PathBuf {
    let path = dir.join(name);
    let document = serde_json::json!({
        "workflow": {"execution": {"makespanInSeconds": makespan}}
    });
    std::fs::write(&path, document.to_string()).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_numbers_and_numeric_strings() {
        let dir = tempfile::tempdir().unwrap();
        let numeric = write_execution(dir.path(), "a.json", 42.5);
        assert_eq!(recorded_makespan(&numeric).await.unwrap(), 42.5);

        let quoted = dir.path().join("b.json");
        std::fs::write(
            &quoted,
            r#"{"workflow": {"execution": {"makespanInSeconds": "17"}}}"#,
        )
        .unwrap();
        assert_eq!(recorded_makespan(&quoted).await.unwrap(), 17.0);

        let missing = dir.path().join("c.json");
        std::fs::write(&missing, r#"{"workflow": {}}"#).unwrap();
        assert!(recorded_makespan(&missing).await.is_err());
        assert!(recorded_makespan(&dir.path().join("absent.json")).await.is_err());
    }

    #[tokio::test]
    async fn group_mean_uses_the_reported_first_value() {
        let dir = tempfile::tempdir().unwrap();
        let group = vec![
            dir.path().join("not-read.json"),
            write_execution(dir.path(), "b.json", 14.0),
            write_execution(dir.path(), "c.json", 12.0),
        ];
        assert_eq!(group_makespan(&group, Some(10.0)).await.unwrap(), 12.0);
        assert!(group_makespan(&group, None).await.is_err());
        assert!(group_makespan(&[], Some(1.0)).await.is_err());
    }
}
