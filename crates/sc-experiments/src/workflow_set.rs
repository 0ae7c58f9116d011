use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use crate::hash::{file_identifier, hash_workflow_groups};

/// A set of workflow files grouped into repetitions of the same workflow
/// configuration.
///
/// Identity is the order-invariant `ivhash`: two specs listing the same
/// files in different orders or groupings are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSetSpec {
    pub workflows: Vec<Vec<PathBuf>>,
    pub ivhash: String,
}

impl WorkflowSetSpec {
    pub fn new(workflows: Vec<Vec<PathBuf>>) -> Self {
        let ivhash = hash_workflow_groups(&workflows);
        Self { workflows, ivhash }
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.iter().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.workflows.iter().map(Vec::len).sum()
    }

    fn counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for path in self.workflows.iter().flatten() {
            *counts.entry(file_identifier(path)).or_insert(0) += 1;
        }
        counts
    }

    /// True when every file of `self` appears in `other` exactly as often,
    /// and `other` also has files `self` lacks.
    pub fn is_proper_subset_of(&self, other: &WorkflowSetSpec) -> bool {
        let ours = self.counts();
        let theirs = other.counts();
        ours.len() < theirs.len() && ours.iter().all(|(file, n)| theirs.get(file) == Some(n))
    }
}

impl PartialEq for WorkflowSetSpec {
    fn eq(&self, other: &Self) -> bool {
        self.ivhash == other.ivhash
    }
}

impl Eq for WorkflowSetSpec {}

impl Hash for WorkflowSetSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ivhash.hash(state);
    }
}

impl fmt::Display for WorkflowSetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} workflows in {} groups ({})",
            self.len(),
            self.workflows.len(),
            &self.ivhash[..self.ivhash.len().min(12)]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(groups: &[&[&str]]) -> WorkflowSetSpec {
        WorkflowSetSpec::new(
            groups
                .iter()
                .map(|g| g.iter().map(PathBuf::from).collect())
                .collect(),
        )
    }

    #[test]
    fn equality_is_hash_equality() {
        let a = spec(&[&["a", "b"], &["c"]]);
        let b = spec(&[&["c"], &["b", "a"]]);
        assert_eq!(a, b);
        assert_ne!(a.workflows, b.workflows);
        assert_ne!(a, spec(&[&["a", "b"]]));
    }

    #[test]
    fn proper_subsets() {
        let small = spec(&[&["a", "b"]]);
        let large = spec(&[&["a"], &["b", "c"]]);
        assert!(small.is_proper_subset_of(&large));
        assert!(!large.is_proper_subset_of(&small));
        assert!(!small.is_proper_subset_of(&small.clone()));

        let disjoint = spec(&[&["x", "y"]]);
        assert!(!disjoint.is_proper_subset_of(&large));

        // Shared files must repeat equally often.
        let doubled = spec(&[&["a", "a"]]);
        assert!(!doubled.is_proper_subset_of(&large));
        let repeated = spec(&[&["a", "a", "b"], &["c"]]);
        assert!(!spec(&[&["a"]]).is_proper_subset_of(&repeated));
        assert!(spec(&[&["a", "a"]]).is_proper_subset_of(&repeated));
    }

    #[test]
    fn emptiness() {
        assert!(spec(&[]).is_empty());
        assert!(spec(&[&[]]).is_empty());
        let files = spec(&[&["w1.json"], &["w2.json"]]);
        assert!(!files.is_empty());
        assert_eq!(files.len(), 2);
        assert_eq!(
            files.workflows,
            vec![vec![PathBuf::from("w1.json")], vec![PathBuf::from("w2.json")]]
        );
        assert!(files.to_string().starts_with("2 workflows in 2 groups"));
    }
}
