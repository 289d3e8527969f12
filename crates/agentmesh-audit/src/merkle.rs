//! The Merkle audit chain: an append-only entry list with an incrementally
//! maintained Merkle tree over the entry hashes.
//!
//! Two independent tamper-evidence mechanisms live here:
//!
//! 1. **Hash chain** — each entry's `previous_hash` links to its
//!    predecessor; `verify_chain` walks every link in O(n).
//! 2. **Merkle tree** — the entry hashes form the leaves of a binary hash
//!    tree; `proof`/`verify_proof` check a single entry against the root
//!    in O(log n), with no access to chain state required.
//!
//! The tree is stored as a list of levels, each a dense array of nodes.
//! Level 0 holds the leaves; the last level holds the root in its first
//! slot. Capacity grows by doubling: every level is padded with zero-hash
//! nodes to twice its width, then a new top level of width two (the old
//! root plus one pad) is appended. The top level therefore has width two,
//! not one, after the first doubling — an inherited shape quirk that the
//! proof and rebuild paths are written against. Changing it would change
//! every historical root, so it stays.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::entry::AuditEntry;

/// The reserved all-zero digest that marks padding nodes.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash two child hashes into a parent: `SHA-256(left || right)` over the
/// bytes of the two hex strings. Returns lowercase hex.
pub fn hash_pair(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

// ── Nodes ─────────────────────────────────────────────────────────────────────

/// A single node in the Merkle tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleNode {
    /// This node's hash (64 hex chars, or `ZERO_HASH` for padding).
    pub hash: String,
    /// Left child's hash, for internal nodes.
    pub left_hash: Option<String>,
    /// Right child's hash, for internal nodes.
    pub right_hash: Option<String>,
    /// True for leaf nodes created from an entry.
    pub is_leaf: bool,
    /// The entry this leaf represents. Absent for padding and internal nodes.
    pub entry_id: Option<String>,
}

impl MerkleNode {
    /// A leaf node carrying one entry's hash.
    fn leaf(hash: String, entry_id: String) -> Self {
        Self {
            hash,
            left_hash: None,
            right_hash: None,
            is_leaf: true,
            entry_id: Some(entry_id),
        }
    }

    /// A zero-hash padding node. Keeps levels dense; carries no entry.
    fn padding() -> Self {
        Self {
            hash: ZERO_HASH.to_string(),
            left_hash: None,
            right_hash: None,
            is_leaf: false,
            entry_id: None,
        }
    }

    /// An internal node whose hash commits to both children.
    fn internal(left: &str, right: &str) -> Self {
        Self {
            hash: hash_pair(left, right),
            left_hash: Some(left.to_string()),
            right_hash: Some(right.to_string()),
            is_leaf: false,
            entry_id: None,
        }
    }
}

// ── Proofs ────────────────────────────────────────────────────────────────────

/// Which side of the current node a proof sibling occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofPosition {
    /// The sibling sits to the left: combine as `H(sibling || current)`.
    Left,
    /// The sibling sits to the right: combine as `H(current || sibling)`.
    Right,
}

/// One step of an inclusion proof: a sibling hash and its side.
///
/// Proof steps are copies of tree state, never references into it, so a
/// proof stays valid (for the root it was issued against) no matter what
/// happens to the chain afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofStep {
    /// The sibling's hash at this level.
    pub sibling_hash: String,
    /// Which side of the current node the sibling occupies.
    pub position: ProofPosition,
}

/// Replay an inclusion proof from a leaf hash up to an expected root.
///
/// Starting from `entry_hash`, each step combines the running hash with the
/// step's sibling on the indicated side and rehashes. The proof holds when
/// the final value equals `root_hash`.
///
/// Pure function — it needs no chain state, so a third party can verify an
/// entry offline against a separately retained root. O(log n).
pub fn verify_proof(entry_hash: &str, proof: &[ProofStep], root_hash: &str) -> bool {
    let mut current = entry_hash.to_string();
    for step in proof {
        current = match step.position {
            ProofPosition::Left => hash_pair(&step.sibling_hash, &current),
            ProofPosition::Right => hash_pair(&current, &step.sibling_hash),
        };
    }
    current == root_hash
}

// ── Chain verification result ─────────────────────────────────────────────────

/// The result of a full-chain verification walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainStatus {
    /// Every entry's hash and linkage checked out.
    Valid,
    /// The first failure found, with the entry index it occurred at.
    Broken {
        /// Index of the first entry that failed.
        index: usize,
        /// What failed at that entry.
        reason: String,
    },
}

impl ChainStatus {
    /// True when the chain verified cleanly.
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainStatus::Valid)
    }
}

// ── The chain ─────────────────────────────────────────────────────────────────

/// An append-only audit chain with an incrementally maintained Merkle tree.
///
/// The chain exclusively owns its entries and tree nodes. There is exactly
/// one mutating transition, `add_entry`, which strictly grows the chain —
/// no delete, no modify. Reads never mutate, so a caller that serializes
/// writers may run reads concurrently between appends.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MerkleAuditChain {
    /// All entries, in append order.
    entries: Vec<AuditEntry>,
    /// Tree levels: `tree[0]` holds the leaves, the last level the root.
    tree: Vec<Vec<MerkleNode>>,
    /// Cached root hash; `None` while the chain is empty.
    root_hash: Option<String>,
}

impl MerkleAuditChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a chain from entries loaded in bulk from external storage.
    ///
    /// The entries' stored hashes are preserved, not recomputed — run
    /// `verify_chain` afterwards before trusting the restored state. The
    /// rebuilt tree is identical, node for node, to the tree incremental
    /// appends would have produced, so historical proofs and roots match.
    pub fn from_entries(entries: Vec<AuditEntry>) -> Self {
        let mut chain = Self {
            entries,
            tree: Vec::new(),
            root_hash: None,
        };
        chain.rebuild_tree();
        chain
    }

    /// Number of entries in the chain.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entry has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in append order.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Look up an entry by id.
    pub fn entry(&self, entry_id: &str) -> Option<&AuditEntry> {
        self.entries.iter().find(|e| e.entry_id == entry_id)
    }

    /// The current root hash, or `None` while the chain is empty.
    pub fn root_hash(&self) -> Option<&str> {
        self.root_hash.as_deref()
    }

    /// Append one entry, linking it into the hash chain and the tree.
    ///
    /// Sets the entry's `previous_hash` (empty string for the first entry)
    /// and `entry_hash`, places its leaf, and recomputes the internal nodes
    /// on the path to the root. Amortized O(log n): the capacity-doubling
    /// step touches every node but happens only O(log n) times over the
    /// life of the chain.
    pub fn add_entry(&mut self, mut entry: AuditEntry) -> &AuditEntry {
        entry.previous_hash = match self.entries.last() {
            Some(prev) => prev.entry_hash.clone(),
            None => String::new(),
        };
        entry.entry_hash = entry.compute_hash();

        let leaf = MerkleNode::leaf(entry.entry_hash.clone(), entry.entry_id.clone());
        self.entries.push(entry);
        let n = self.entries.len();

        if n == 1 {
            // First entry: single-level tree, leaf hash is the root.
            self.root_hash = Some(leaf.hash.clone());
            self.tree = vec![vec![leaf]];
            return &self.entries[0];
        }

        if n > self.tree[0].len() {
            self.grow();
        }

        self.tree[0][n - 1] = leaf;
        self.recompute_path(n - 1);

        let top = self.tree.len() - 1;
        self.root_hash = Some(self.tree[top][0].hash.clone());
        &self.entries[n - 1]
    }

    /// Double the tree's capacity.
    ///
    /// Every existing level is padded with zero-hash nodes to twice its
    /// width, existing content staying at the low indices. A new top level
    /// is then appended holding the previous root and one pad — width two.
    fn grow(&mut self) {
        for level in &mut self.tree {
            let width = level.len();
            level.extend((0..width).map(|_| MerkleNode::padding()));
        }

        let old_top = self.tree.len() - 1;
        let old_root = self.tree[old_top][0].clone();
        self.tree.push(vec![old_root, MerkleNode::padding()]);

        debug!(
            capacity = self.tree[0].len(),
            levels = self.tree.len(),
            "merkle tree capacity doubled"
        );
    }

    /// Recompute the internal nodes from leaf `leaf_idx` up to the root.
    ///
    /// At each level the parent is rehashed from the sibling pair at
    /// `(2 * parent, 2 * parent + 1)`. Should the right slot ever be out of
    /// range, the left node stands in as its own sibling; with zero-hash
    /// padding keeping every level's width even, that branch is never taken
    /// in practice.
    fn recompute_path(&mut self, leaf_idx: usize) {
        let mut idx = leaf_idx;
        let top = self.tree.len() - 1;

        for level in 0..top {
            let parent_idx = idx / 2;
            let left = self.tree[level][2 * parent_idx].hash.clone();
            let right = match self.tree[level].get(2 * parent_idx + 1) {
                Some(node) => node.hash.clone(),
                None => left.clone(),
            };
            self.tree[level + 1][parent_idx] = MerkleNode::internal(&left, &right);
            idx = parent_idx;
        }
    }

    /// Build an inclusion proof for the entry with the given id.
    ///
    /// Walks from the entry's leaf up to (excluding) the top level,
    /// recording each in-range sibling's hash and side. Returns `None` for
    /// an unknown id. O(log n).
    pub fn proof(&self, entry_id: &str) -> Option<Vec<ProofStep>> {
        let mut idx = self.entries.iter().position(|e| e.entry_id == entry_id)?;
        let top = self.tree.len() - 1;
        let mut steps = Vec::with_capacity(top);

        for level in 0..top {
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            if let Some(sibling) = self.tree[level].get(sibling_idx) {
                steps.push(ProofStep {
                    sibling_hash: sibling.hash.clone(),
                    position: if sibling_idx < idx {
                        ProofPosition::Left
                    } else {
                        ProofPosition::Right
                    },
                });
            }
            idx /= 2;
        }

        Some(steps)
    }

    /// Verify every entry's own hash and its link to the previous entry.
    ///
    /// This is the O(n), authoritative check; `verify_proof` is the cheap
    /// single-entry check, and whenever this passes, every proof issued
    /// against the current root verifies too. An empty chain is valid.
    pub fn verify_chain(&self) -> ChainStatus {
        for (index, entry) in self.entries.iter().enumerate() {
            if !entry.verify_hash() {
                return ChainStatus::Broken {
                    index,
                    reason: "stored entry_hash does not match recomputed hash".to_string(),
                };
            }

            if index == 0 {
                if !entry.previous_hash.is_empty() {
                    return ChainStatus::Broken {
                        index,
                        reason: "first entry must have an empty previous_hash".to_string(),
                    };
                }
            } else if entry.previous_hash != self.entries[index - 1].entry_hash {
                return ChainStatus::Broken {
                    index,
                    reason: format!(
                        "previous_hash does not match the hash of entry {}",
                        index - 1
                    ),
                };
            }
        }

        ChainStatus::Valid
    }

    /// Rebuild the whole tree from the entry list, leaves up. O(n).
    ///
    /// Fallback path for bulk loads. Reproduces the incremental tree
    /// exactly: level 0 is padded to the capacity the doubling schedule
    /// would have reached, upper levels keep the doubled widths
    /// (capacity, capacity, capacity/2, …, 2), and an internal slot is
    /// computed only where a real leaf lies beneath it — elsewhere it stays
    /// a zero pad, just as the incremental path never writes it.
    pub fn rebuild_tree(&mut self) {
        let n = self.entries.len();
        if n == 0 {
            self.tree.clear();
            self.root_hash = None;
            return;
        }

        let capacity = n.next_power_of_two();
        let mut leaves: Vec<MerkleNode> = self
            .entries
            .iter()
            .map(|e| MerkleNode::leaf(e.entry_hash.clone(), e.entry_id.clone()))
            .collect();
        leaves.extend((n..capacity).map(|_| MerkleNode::padding()));
        self.tree = vec![leaves];

        if n == 1 {
            self.root_hash = Some(self.tree[0][0].hash.clone());
            return;
        }

        let mut level_idx = 1;
        loop {
            let width = std::cmp::max(2, capacity >> (level_idx - 1));
            // A parent at this level spans 2^level_idx leaves; slots whose
            // span starts past the last real leaf stay zero pads.
            let span = 1usize << level_idx;
            let mut level = Vec::with_capacity(width);
            for parent_idx in 0..width {
                if parent_idx * span < n {
                    let left = &self.tree[level_idx - 1][2 * parent_idx].hash;
                    let right = &self.tree[level_idx - 1][2 * parent_idx + 1].hash;
                    level.push(MerkleNode::internal(left, right));
                } else {
                    level.push(MerkleNode::padding());
                }
            }
            self.tree.push(level);
            if width == 2 {
                break;
            }
            level_idx += 1;
        }

        let top = self.tree.len() - 1;
        self.root_hash = Some(self.tree[top][0].hash.clone());
    }
}
