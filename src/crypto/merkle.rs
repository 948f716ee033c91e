//! Merkle root over transaction digests
//!
//! Block headers commit to their transaction list through this root, so
//! the header bytes fed to the proof engine stay fixed-size regardless of
//! how many transactions a block carries.

use super::hash::{sha256, sha256_concat};

/// Hash one tree level into the next. An odd node is paired with itself.
fn reduce_level(level: &[Vec<u8>]) -> Vec<Vec<u8>> {
    level
        .chunks(2)
        .map(|pair| {
            let left = pair[0].as_slice();
            let right = pair.get(1).map_or(left, Vec::as_slice);
            sha256_concat(&[left, right])
        })
        .collect()
}

/// Merkle root of the given leaf digests.
///
/// An empty list hashes the empty string; a single leaf is its own root.
pub fn calculate_merkle_root(leaves: &[Vec<u8>]) -> Vec<u8> {
    match leaves {
        [] => sha256(b""),
        [only] => only.clone(),
        _ => {
            let mut level = reduce_level(leaves);
            while level.len() > 1 {
                level = reduce_level(&level);
            }
            level.swap_remove(0)
        }
    }
}

/// Hex-encoded [`calculate_merkle_root`]
pub fn calculate_merkle_root_hex(leaves: &[Vec<u8>]) -> String {
    hex::encode(calculate_merkle_root(leaves))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> Vec<u8> {
        sha256(name.as_bytes())
    }

    #[test]
    fn test_single_leaf_is_root() {
        let only = leaf("tx1");
        assert_eq!(calculate_merkle_root(&[only.clone()]), only);
    }

    #[test]
    fn test_pair() {
        let (a, b) = (leaf("tx1"), leaf("tx2"));
        let root = calculate_merkle_root(&[a.clone(), b.clone()]);
        assert_eq!(root, sha256(&[a, b].concat()));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let (a, b, c) = (leaf("tx1"), leaf("tx2"), leaf("tx3"));
        let root = calculate_merkle_root(&[a.clone(), b.clone(), c.clone()]);

        let left = sha256(&[a, b].concat());
        let right = sha256(&[c.clone(), c].concat());
        assert_eq!(root, sha256(&[left, right].concat()));
    }

    #[test]
    fn test_order_matters() {
        let (a, b) = (leaf("tx1"), leaf("tx2"));
        assert_ne!(
            calculate_merkle_root(&[a.clone(), b.clone()]),
            calculate_merkle_root(&[b, a])
        );
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(calculate_merkle_root(&[]), sha256(b""));
        assert_eq!(calculate_merkle_root_hex(&[]).len(), 64);
    }
}
