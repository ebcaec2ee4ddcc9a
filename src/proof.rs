//! Single-leaf Merkle proofs.
//!
//! A proof authenticates the node at a generalized index against the hash
//! tree root of the value that contains it. Combine with
//! [`Schema::gindex_of`](crate::Schema::gindex_of) to prove a field or an
//! element.

use serde::{Deserialize, Serialize};

use crate::error::ViewError;
use crate::gindex::{self, GeneralizedIndex};
use crate::merkle::hash_pair;
use crate::tree::Root;
use crate::view::View;

/// The node at `gindex` plus its co-path, sibling of the leaf first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub gindex: GeneralizedIndex,
    pub leaf: Root,
    pub branch: Vec<Root>,
}

impl MerkleProof {
    /// Checks the proof against a hash tree root.
    #[must_use]
    pub fn verify(&self, root: &Root) -> bool {
        verify_merkle_branch(&self.leaf, &self.branch, self.gindex, root)
    }
}

impl View {
    /// Builds a proof for the node at `gindex`, relative to this view's root.
    pub fn prove(&self, gindex: GeneralizedIndex) -> Result<MerkleProof, ViewError> {
        if gindex == 0 {
            return Err(ViewError::GindexOutOfBounds { gindex });
        }
        let mut branch = Vec::with_capacity(gindex::depth(gindex) as usize);
        let mut node = self.node().clone();
        for go_right in gindex::path_bits(gindex) {
            let (left, right) = node
                .children()
                .ok_or(ViewError::GindexOutOfBounds { gindex })?;
            let (next, sibling) = if go_right { (right, left) } else { (left, right) };
            branch.push(sibling.root());
            node = next.clone();
        }
        branch.reverse();
        Ok(MerkleProof {
            gindex,
            leaf: node.root(),
            branch,
        })
    }
}

/// Recomputes the root from `leaf` and its co-path and compares it with
/// `root`. The branch length must equal the depth of `gindex`.
#[must_use]
pub fn verify_merkle_branch(
    leaf: &Root,
    branch: &[Root],
    gindex: GeneralizedIndex,
    root: &Root,
) -> bool {
    if gindex == 0 || branch.len() != gindex::depth(gindex) as usize {
        return false;
    }
    let mut current = *leaf;
    let mut position = gindex;
    for sibling in branch {
        current = if gindex::is_left(position) {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
        position = gindex::parent(position);
    }
    current == *root
}
