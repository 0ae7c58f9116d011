//! Order-invariant digests over workflow file sets.
//!
//! The digest of a collection is the byte-wise sum (mod 256) of the SHA-256
//! digests of its items, seeded with the digest of `n` zero bytes where `n`
//! is the item count. Permutations and regroupings of the same multiset of
//! items hash identically. Two different multisets can be made to collide on
//! purpose, so this is a deduplication key only.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const DIGEST_LEN: usize = 32;

fn sha256(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&result);
    digest
}

/// Digest of a flat collection, independent of iteration order.
pub fn order_invariant_hash<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let digests: Vec<[u8; DIGEST_LEN]> = items
        .into_iter()
        .map(|item| sha256(item.as_ref()))
        .collect();

    let mut acc = sha256(&vec![0u8; digests.len()]);
    for digest in &digests {
        for (a, d) in acc.iter_mut().zip(digest) {
            *a = a.wrapping_add(*d);
        }
    }
    hex::encode(acc)
}

/// Identifier hashed for one workflow file.
pub fn file_identifier(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Digest of nested workflow groups after flattening.
pub fn hash_workflow_groups(groups: &[Vec<PathBuf>]) -> String {
    order_invariant_hash(
        groups
            .iter()
            .flatten()
            .map(|path| file_identifier(path)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(spec: &[&[&str]]) -> Vec<Vec<PathBuf>> {
        spec.iter()
            .map(|g| g.iter().map(PathBuf::from).collect())
            .collect()
    }

    #[test]
    fn regrouping_and_reordering_hash_identically() {
        let a = hash_workflow_groups(&groups(&[&["a", "b"], &["c"]]));
        let b = hash_workflow_groups(&groups(&[&["c"], &["b", "a"]]));
        let c = hash_workflow_groups(&groups(&[&["b"], &["a", "c"]]));
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_sets_differ() {
        let abc = hash_workflow_groups(&groups(&[&["a", "b", "c"]]));
        let ab = hash_workflow_groups(&groups(&[&["a", "b"]]));
        let abd = hash_workflow_groups(&groups(&[&["a", "b", "d"]]));
        assert_ne!(abc, ab);
        assert_ne!(abc, abd);
    }

    #[test]
    fn multiplicity_counts() {
        let once = order_invariant_hash(["a"]);
        let twice = order_invariant_hash(["a", "a"]);
        assert_ne!(once, twice);
    }

    #[test]
    fn empty_collection_is_seed_only() {
        let empty: [&str; 0] = [];
        assert_eq!(order_invariant_hash(empty), hex::encode(sha256(&[])));
    }

    #[test]
    fn permutations_of_many_items() {
        let items: Vec<String> = (0..20).map(|i| format!("/wf/run-{i}.json")).collect();
        let mut reversed = items.clone();
        reversed.reverse();
        assert_eq!(order_invariant_hash(&items), order_invariant_hash(&reversed));
    }
}
