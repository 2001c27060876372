//! Sorted-pair Merkle commitments over winner assignments.
//!
//! Sibling digests are ordered by byte value before hashing, so a proof is
//! just the list of siblings — no left/right flags. An unpaired node at any
//! level is promoted to the next level unchanged; the on-chain claim
//! verifier expects exactly this construction.

use num_bigint::BigUint;
use thiserror::Error;

use crate::abi::{self, Address, Token};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("cannot build a merkle tree over an empty leaf set")]
    EmptyLeafSet,
}

/// Digest of one winner/prize assignment, encoded exactly as the claim
/// contract re-derives it:
/// `keccak256(abi.encode(lotteryId, winner, ticketNumber, metadataUri))`.
pub fn leaf_digest(
    lottery_id: u64,
    winner: &Address,
    ticket_number: u64,
    metadata_uri: &str,
) -> [u8; 32] {
    let encoded = abi::encode(&[
        Token::Uint(BigUint::from(lottery_id)),
        Token::Address(*winner),
        Token::Uint(BigUint::from(ticket_number)),
        Token::Str(metadata_uri.to_string()),
    ]);
    abi::keccak256(&encoded)
}

/// Hash two sibling digests, ordering the pair by byte value first.
pub fn hash_pair(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut combined = [0u8; 64];
    if a <= b {
        combined[..32].copy_from_slice(a);
        combined[32..].copy_from_slice(b);
    } else {
        combined[..32].copy_from_slice(b);
        combined[32..].copy_from_slice(a);
    }
    abi::keccak256(&combined)
}

/// Recompute the root from a leaf and its sibling path; true on match.
pub fn verify_proof(root: &[u8; 32], leaf: &[u8; 32], proof: &[[u8; 32]]) -> bool {
    let mut current = *leaf;
    for sibling in proof {
        current = hash_pair(&current, sibling);
    }
    current == *root
}

/// Serialize a proof the way claim tooling stores it: comma-joined
/// 0x-prefixed lowercase hex digests.
pub fn serialize_proof(proof: &[[u8; 32]]) -> String {
    proof
        .iter()
        .map(|digest| format!("0x{}", hex::encode(digest)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a proof serialized by [`serialize_proof`].
pub fn parse_proof(s: &str) -> Option<Vec<[u8; 32]>> {
    if s.is_empty() {
        return Some(Vec::new());
    }
    s.split(',')
        .map(|part| {
            let bytes = hex::decode(part.trim().strip_prefix("0x")?).ok()?;
            <[u8; 32]>::try_from(bytes).ok()
        })
        .collect()
}

/// A Merkle tree over pre-hashed leaves, levels stored bottom-up.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Build the full tree. The leaf order is fixed at construction and
    /// proofs refer to it by index.
    pub fn from_leaves(leaves: Vec<[u8; 32]>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyLeafSet);
        }
        let mut levels = Vec::new();
        let mut current = leaves;
        while current.len() > 1 {
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                match pair {
                    [left, right] => next.push(hash_pair(left, right)),
                    [odd] => next.push(*odd),
                    _ => {}
                }
            }
            levels.push(current);
            current = next;
        }
        levels.push(current);
        Ok(Self { levels })
    }

    pub fn root(&self) -> [u8; 32] {
        self.levels[self.levels.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Sibling digests along the path from the `index`-th leaf to the root.
    /// A level where the node is promoted unpaired contributes no digest.
    pub fn proof_for(&self, index: usize) -> Option<Vec<[u8; 32]>> {
        if index >= self.leaf_count() {
            return None;
        }
        Some(self.path(index))
    }

    /// Proofs for every leaf, in leaf order.
    pub fn proofs(&self) -> Vec<Vec<[u8; 32]>> {
        (0..self.leaf_count()).map(|index| self.path(index)).collect()
    }

    fn path(&self, index: usize) -> Vec<[u8; 32]> {
        let mut proof = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = position ^ 1;
            if sibling < level.len() {
                proof.push(level[sibling]);
            }
            position /= 2;
        }
        proof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u8) -> Vec<[u8; 32]> {
        (0..n).map(|i| abi::keccak256(&[i])).collect()
    }

    #[test]
    fn test_hash_pair_is_commutative() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
    }

    #[test]
    fn test_empty_leaf_set_rejected() {
        assert_eq!(
            MerkleTree::from_leaves(Vec::new()).unwrap_err(),
            MerkleError::EmptyLeafSet
        );
    }

    #[test]
    fn test_single_leaf_tree() {
        let leaf = abi::keccak256(b"only");
        let tree = MerkleTree::from_leaves(vec![leaf]).unwrap();
        assert_eq!(tree.root(), leaf);
        assert_eq!(tree.proof_for(0), Some(Vec::new()));
        assert!(verify_proof(&tree.root(), &leaf, &[]));
    }

    #[test]
    fn test_round_trip_all_sizes() {
        for n in 1..=8u8 {
            let leaf_set = leaves(n);
            let tree = MerkleTree::from_leaves(leaf_set.clone()).unwrap();
            let root = tree.root();
            for (index, leaf) in leaf_set.iter().enumerate() {
                let proof = tree.proof_for(index).unwrap();
                assert!(
                    verify_proof(&root, leaf, &proof),
                    "leaf {index} of {n} failed verification"
                );
            }
        }
    }

    #[test]
    fn test_tampered_leaf_fails_verification() {
        let leaf_set = leaves(5);
        let tree = MerkleTree::from_leaves(leaf_set.clone()).unwrap();
        let proof = tree.proof_for(2).unwrap();
        let mut tampered = leaf_set[2];
        tampered[0] ^= 0x01;
        assert!(!verify_proof(&tree.root(), &tampered, &proof));
    }

    #[test]
    fn test_odd_node_is_promoted_not_duplicated() {
        let leaf_set = leaves(3);
        let tree = MerkleTree::from_leaves(leaf_set.clone()).unwrap();
        let expected = hash_pair(&hash_pair(&leaf_set[0], &leaf_set[1]), &leaf_set[2]);
        assert_eq!(tree.root(), expected);
        // The promoted leaf's proof skips the level it was unpaired on.
        assert_eq!(
            tree.proof_for(2),
            Some(vec![hash_pair(&leaf_set[0], &leaf_set[1])])
        );
    }

    #[test]
    fn test_proof_index_out_of_bounds() {
        let tree = MerkleTree::from_leaves(leaves(2)).unwrap();
        assert_eq!(tree.proof_for(2), None);
    }

    #[test]
    fn test_proofs_matches_proof_for() {
        let tree = MerkleTree::from_leaves(leaves(6)).unwrap();
        let all = tree.proofs();
        assert_eq!(all.len(), 6);
        for (index, proof) in all.iter().enumerate() {
            assert_eq!(tree.proof_for(index).as_ref(), Some(proof));
        }
    }

    #[test]
    fn test_proof_serialization_round_trip() {
        let tree = MerkleTree::from_leaves(leaves(5)).unwrap();
        let proof = tree.proof_for(1).unwrap();
        let serialized = serialize_proof(&proof);
        assert!(serialized.starts_with("0x"));
        assert_eq!(parse_proof(&serialized), Some(proof));
        assert_eq!(parse_proof(""), Some(Vec::new()));
        assert_eq!(parse_proof("0xzz"), None);
    }

    #[test]
    fn test_leaf_digest_field_sensitivity() {
        let winner: Address = "0x00112233445566778899aabbccddeeff00112233"
            .parse()
            .unwrap();
        let other: Address = "0x00112233445566778899aabbccddeeff00112234"
            .parse()
            .unwrap();
        let base = leaf_digest(1, &winner, 4, "ar://meta");
        assert_eq!(base, leaf_digest(1, &winner, 4, "ar://meta"));
        assert_ne!(base, leaf_digest(2, &winner, 4, "ar://meta"));
        assert_ne!(base, leaf_digest(1, &other, 4, "ar://meta"));
        assert_ne!(base, leaf_digest(1, &winner, 5, "ar://meta"));
        assert_ne!(base, leaf_digest(1, &winner, 4, "ar://other"));
    }
}
