use sha2::{Digest, Sha256};
use tracing::debug;

use crate::constants::{DISPLAY_HASH_LEN, EMPTY_MERKLE_ROOT};
use crate::Hash;

/// A node of the commitment tree. Leaves hash raw transaction bytes, parents
/// hash `left || right` with no separator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleNode {
    pub hash: Hash,
    left: Option<Box<MerkleNode>>,
    right: Option<Box<MerkleNode>>,
}

impl MerkleNode {
    pub fn leaf(data: &[u8]) -> Self {
        Self {
            hash: Sha256::digest(data).into(),
            left: None,
            right: None,
        }
    }

    pub fn parent(left: MerkleNode, right: MerkleNode) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(left.hash);
        hasher.update(right.hash);
        Self {
            hash: hasher.finalize().into(),
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    pub fn left(&self) -> Option<&MerkleNode> {
        self.left.as_deref()
    }

    pub fn right(&self) -> Option<&MerkleNode> {
        self.right.as_deref()
    }
}

/// One line of the level listing produced by [`MerkleTree::rows`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleRow {
    /// 1 for the root, increasing towards the leaves.
    pub level: usize,
    pub left: Option<String>,
    pub right: Option<String>,
    pub hash: String,
}

/// Binary hash tree over an ordered batch of transactions.
///
/// The tree is rebuilt from scratch whenever a commitment is needed; it is
/// never stored alongside a block. When a level holds an odd number of nodes
/// the last one is paired with a copy of itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    root: Option<MerkleNode>,
    leaf_count: usize,
}

impl MerkleTree {
    pub fn new<T: AsRef<[u8]>>(txs: &[T]) -> Self {
        let mut level: Vec<MerkleNode> = txs
            .iter()
            .map(|tx| MerkleNode::leaf(tx.as_ref()))
            .collect();
        let leaf_count = level.len();

        while level.len() > 1 {
            if level.len() % 2 != 0 {
                if let Some(last) = level.last().cloned() {
                    level.push(last);
                }
            }
            let mut next = Vec::with_capacity(level.len() / 2);
            let mut nodes = level.into_iter();
            while let (Some(left), Some(right)) = (nodes.next(), nodes.next()) {
                next.push(MerkleNode::parent(left, right));
            }
            debug!(width = next.len(), "merkle level built");
            level = next;
        }

        Self {
            root: level.pop(),
            leaf_count,
        }
    }

    /// `None` only for a tree built over no transactions.
    pub fn root(&self) -> Option<&MerkleNode> {
        self.root.as_ref()
    }

    /// Root commitment. An empty tree commits to all-zero bytes.
    pub fn root_hash(&self) -> Hash {
        self.root
            .as_ref()
            .map(|node| node.hash)
            .unwrap_or(EMPTY_MERKLE_ROOT)
    }

    pub fn root_hex(&self) -> String {
        hex::encode(self.root_hash())
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Post-order listing of every node, children before their parent.
    pub fn rows(&self) -> Vec<MerkleRow> {
        let mut rows = Vec::new();
        if let Some(root) = &self.root {
            collect_rows(root, 1, &mut rows);
        }
        rows
    }
}

fn collect_rows(node: &MerkleNode, level: usize, rows: &mut Vec<MerkleRow>) {
    if let Some(left) = node.left() {
        collect_rows(left, level + 1, rows);
    }
    if let Some(right) = node.right() {
        collect_rows(right, level + 1, rows);
    }
    rows.push(MerkleRow {
        level,
        left: node.left().map(|n| short_digest(&n.hash)),
        right: node.right().map(|n| short_digest(&n.hash)),
        hash: short_digest(&node.hash),
    });
}

fn short_digest(hash: &Hash) -> String {
    format!("{}...", hex::encode(&hash[..DISPLAY_HASH_LEN]))
}

/// Root commitment over `txs`, see [`MerkleTree`].
pub fn merkle_root<T: AsRef<[u8]>>(txs: &[T]) -> Hash {
    MerkleTree::new(txs).root_hash()
}

pub fn merkle_root_hex<T: AsRef<[u8]>>(txs: &[T]) -> String {
    hex::encode(merkle_root(txs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn sha(data: &[u8]) -> Hash {
        Sha256::digest(data).into()
    }

    fn pair(a: Hash, b: Hash) -> Hash {
        let mut joined = a.to_vec();
        joined.extend_from_slice(&b);
        sha(&joined)
    }

    #[test]
    fn merkle_root_empty_txs() {
        let txs: Vec<String> = vec![];
        let tree = MerkleTree::new(&txs);
        assert!(tree.root().is_none());
        assert_eq!(tree.root_hash(), [0u8; 32]);
        assert_eq!(tree.root_hex(), "0".repeat(64));
        assert!(tree.rows().is_empty());
    }

    #[test]
    fn merkle_root_single_tx() {
        let root = merkle_root(&["a"]);
        assert_eq!(root, sha(b"a"));
        assert_eq!(
            hex::encode(root),
            "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb"
        );
    }

    #[test]
    fn merkle_root_two_txs() {
        let root = merkle_root(&["a", "b"]);
        assert_eq!(root, pair(sha(b"a"), sha(b"b")));
        assert_eq!(
            hex::encode(root),
            "e5a01fee14e0ed5c48714f22180f25ad8365b53f9779f79dc4a3d7e93963f94a"
        );
    }

    #[test]
    fn merkle_root_three_txs_duplicates_last() {
        let root = merkle_root(&["a", "b", "c"]);
        let expected = pair(pair(sha(b"a"), sha(b"b")), pair(sha(b"c"), sha(b"c")));
        assert_eq!(root, expected);
        assert_eq!(
            merkle_root_hex(&["a", "b", "c"]),
            "d31a37ef6ac14a2db1470c4316beb5592e6afd4465022339adafda76a18ffabe"
        );
    }

    #[test]
    fn merkle_root_five_txs_pads_every_odd_level() {
        let txs = ["t1", "t2", "t3", "t4", "t5"];
        let l: Vec<Hash> = txs.iter().map(|t| sha(t.as_bytes())).collect();
        // 5 -> pad to 6 -> 3 -> pad to 4 -> 2 -> 1
        let a = pair(l[0], l[1]);
        let b = pair(l[2], l[3]);
        let c = pair(l[4], l[4]);
        let expected = pair(pair(a, b), pair(c, c));
        assert_eq!(merkle_root(&txs), expected);
    }

    #[test]
    fn merkle_root_is_order_sensitive() {
        assert_ne!(merkle_root(&["a", "b"]), merkle_root(&["b", "a"]));
        assert_eq!(
            merkle_root_hex(&["b", "a"]),
            "18d79cb747ea174c59f3a3b41768672526d56fecc58360a99d283d0f9b0a3cc0"
        );
    }

    #[test]
    fn merkle_root_deterministic_for_random_batches() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let n = rng.gen_range(1..40);
            let mut txs: Vec<String> = (0..n)
                .map(|i| format!("tx-{i}-{}", rng.gen::<u32>()))
                .collect();
            let first = merkle_root(&txs);
            assert_eq!(first, merkle_root(&txs.clone()));
            if n > 1 {
                txs.swap(0, n - 1);
                assert_ne!(first, merkle_root(&txs));
            }
        }
    }

    #[test]
    fn leaves_and_parents_are_linked() {
        let tree = MerkleTree::new(&["a", "b"]);
        let root = tree.root().unwrap();
        assert!(!root.is_leaf());
        assert_eq!(root.left().unwrap().hash, sha(b"a"));
        assert_eq!(root.right().unwrap().hash, sha(b"b"));
        assert!(root.left().unwrap().is_leaf());
        assert_eq!(tree.leaf_count(), 2);
    }

    #[test]
    fn rows_list_children_before_root() {
        let tree = MerkleTree::new(&["a", "b", "c"]);
        let rows = tree.rows();
        // 4 leaves (c duplicated) + 2 parents + root
        assert_eq!(rows.len(), 7);
        let root_row = rows.last().unwrap();
        assert_eq!(root_row.level, 1);
        assert!(root_row.hash.ends_with("..."));
        assert_eq!(root_row.hash.len(), 32 + 3);
        assert!(rows.iter().filter(|r| r.level == 3).all(|r| r.left.is_none()));
        assert_eq!(rows[0].hash, format!("{}...", &hex::encode(sha(b"a"))[..32]));
    }
}
