//! Binary merkle root with domain-separated leaves.
//!
//! Leaves are hashed once under the `0x00` prefix, internal pairs under
//! `0x01`. Without the separation a leaf's bytes could masquerade as an
//! internal node, opening a second-preimage forgery on the root.

use basalt_types::Hash256;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Root over `leaves`: zero for an empty list, the leaf itself for a single
/// entry, otherwise the prefixed binary-tree digest with the odd hash of a
/// round promoted unpaired.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    match leaves {
        [] => Hash256::ZERO,
        [single] => *single,
        _ => {
            let mut level: Vec<Hash256> = leaves.iter().map(hash_leaf).collect();
            while level.len() > 1 {
                level = level
                    .chunks(2)
                    .map(|pair| match pair {
                        [left, right] => hash_node(left, right),
                        [odd] => *odd,
                        _ => unreachable!("chunks(2) yields one or two items"),
                    })
                    .collect();
            }
            level[0]
        }
    }
}

fn hash_leaf(leaf: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(leaf.as_bytes());
    Hash256::new(*hasher.finalize().as_bytes())
}

fn hash_node(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256::new(*hasher.finalize().as_bytes())
}
