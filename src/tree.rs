//! Persistent binary tree of 32-byte chunks.
//!
//! Nodes are immutable and reference-counted. An update returns a new root
//! that shares every subtree off the updated path with the old root, so old
//! handles stay valid and cheap snapshots come for free.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::trace;

use crate::error::ViewError;
use crate::gindex::{self, GeneralizedIndex};
use crate::merkle::hash_pair;
use crate::{MAX_PREALLOCATION, hashing_config};

/// A 32-byte chunk or node hash.
pub type Root = [u8; 32];

/// The all-zero chunk.
pub const ZERO_CHUNK: Root = [0; 32];

/// Depths held by the zero-subtree cache.
const ZERO_CACHE_DEPTH: usize = 64;

/// Canonical all-zero subtrees, one per depth, populated on first use.
static ZERO_NODES: [OnceLock<Node>; ZERO_CACHE_DEPTH] =
    [const { OnceLock::new() }; ZERO_CACHE_DEPTH];

/// A tree node. Cloning copies a pointer.
#[derive(Clone)]
pub struct Node(Arc<Inner>);

enum Inner {
    Leaf(Root),
    Branch {
        left: Node,
        right: Node,
        height: u8,
        /// Filled on first access. Concurrent writers compute the same
        /// value, so whichever write lands first is kept.
        root: OnceLock<Root>,
    },
}

impl Node {
    #[must_use]
    pub fn leaf(chunk: Root) -> Self {
        Self(Arc::new(Inner::Leaf(chunk)))
    }

    #[must_use]
    pub fn branch(left: Node, right: Node) -> Self {
        let height = left.height().max(right.height()).saturating_add(1);
        Self(Arc::new(Inner::Branch {
            left,
            right,
            height,
            root: OnceLock::new(),
        }))
    }

    /// A leaf holding `bytes` left-aligned and zero-padded.
    ///
    /// Caller must ensure `bytes.len() <= 32`.
    #[must_use]
    pub fn leaf_from_bytes(bytes: &[u8]) -> Self {
        let mut chunk = ZERO_CHUNK;
        chunk[..bytes.len()].copy_from_slice(bytes);
        Self::leaf(chunk)
    }

    /// Distance to the deepest leaf below this node.
    #[must_use]
    pub fn height(&self) -> u8 {
        match &*self.0 {
            Inner::Leaf(_) => 0,
            Inner::Branch { height, .. } => *height,
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(&*self.0, Inner::Leaf(_))
    }

    #[must_use]
    pub fn chunk(&self) -> Option<&Root> {
        match &*self.0 {
            Inner::Leaf(chunk) => Some(chunk),
            Inner::Branch { .. } => None,
        }
    }

    #[must_use]
    pub fn children(&self) -> Option<(&Node, &Node)> {
        match &*self.0 {
            Inner::Leaf(_) => None,
            Inner::Branch { left, right, .. } => Some((left, right)),
        }
    }

    /// True if both handles point at the same node.
    #[must_use]
    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    fn cached_root(&self) -> Option<Root> {
        match &*self.0 {
            Inner::Leaf(chunk) => Some(*chunk),
            Inner::Branch { root, .. } => root.get().copied(),
        }
    }

    /// The hash of this subtree, computed at most once per node.
    ///
    /// High branches with two unhashed children hash them on separate
    /// rayon tasks.
    #[must_use]
    pub fn root(&self) -> Root {
        match &*self.0 {
            Inner::Leaf(chunk) => *chunk,
            Inner::Branch {
                left,
                right,
                height,
                root,
            } => {
                if let Some(cached) = root.get() {
                    return *cached;
                }
                let parallel = *height >= hashing_config().parallel_min_height
                    && left.cached_root().is_none()
                    && right.cached_root().is_none();
                let (l, r) = if parallel {
                    rayon::join(|| left.root(), || right.root())
                } else {
                    (left.root(), right.root())
                };
                let hash = hash_pair(&l, &r);
                // a concurrent hasher may have won; its value is identical
                let _ = root.set(hash);
                hash
            }
        }
    }

    /// Descends to the node at `gindex`.
    pub fn navigate(&self, gindex: GeneralizedIndex) -> Result<Node, ViewError> {
        if gindex == 0 {
            return Err(ViewError::GindexOutOfBounds { gindex });
        }
        let mut node = self;
        for go_right in gindex::path_bits(gindex) {
            let (left, right) = node
                .children()
                .ok_or(ViewError::GindexOutOfBounds { gindex })?;
            node = if go_right { right } else { left };
        }
        Ok(node.clone())
    }

    /// Returns a new root with the node at `gindex` replaced by `subtree`.
    ///
    /// Siblings along the path are shared with `self`; only the ancestors
    /// of `gindex` are allocated anew.
    pub fn update(&self, gindex: GeneralizedIndex, subtree: Node) -> Result<Node, ViewError> {
        if gindex == 0 {
            return Err(ViewError::GindexOutOfBounds { gindex });
        }
        let mut spine = Vec::with_capacity(gindex::depth(gindex) as usize);
        let mut node = self;
        for go_right in gindex::path_bits(gindex) {
            let (left, right) = node
                .children()
                .ok_or(ViewError::GindexOutOfBounds { gindex })?;
            spine.push((left, right, go_right));
            node = if go_right { right } else { left };
        }

        let mut acc = subtree;
        for (left, right, go_right) in spine.into_iter().rev() {
            acc = if go_right {
                Node::branch(left.clone(), acc)
            } else {
                Node::branch(acc, right.clone())
            };
        }
        Ok(acc)
    }

    /// Replaces several nodes at the same `depth` in one pass.
    ///
    /// `updates` holds `(index at depth, node)` pairs. When an index
    /// repeats, the last pair wins, matching sequential [`Node::update`]s.
    pub fn update_many(
        &self,
        depth: u32,
        mut updates: Vec<(u64, Node)>,
    ) -> Result<Node, ViewError> {
        let bound = 1u64
            .checked_shl(depth)
            .ok_or(ViewError::GindexOutOfBounds { gindex: 0 })?;
        if let Some((index, _)) = updates.iter().find(|(index, _)| *index >= bound) {
            return Err(ViewError::IndexOutOfBounds {
                index: *index,
                bound,
            });
        }
        // stable sort keeps insertion order among equal indices
        updates.sort_by_key(|(index, _)| *index);
        let mut deduped: Vec<(u64, Node)> = Vec::with_capacity(updates.len());
        for (index, node) in updates {
            match deduped.last_mut() {
                Some(last) if last.0 == index => last.1 = node,
                _ => deduped.push((index, node)),
            }
        }
        rebuild(self, depth, 0, &deduped)
    }

    /// Builds a tree of `depth` whose leftmost positions hold `nodes` and
    /// whose remaining positions are zero subtrees.
    pub fn fill(nodes: Vec<Node>, depth: u32) -> Result<Node, ViewError> {
        let bound = 1u64.checked_shl(depth).unwrap_or(u64::MAX);
        if nodes.len() as u64 > bound {
            return Err(ViewError::IndexOutOfBounds {
                index: nodes.len() as u64,
                bound,
            });
        }
        if nodes.is_empty() {
            return Ok(zero_node(depth));
        }
        let mut layer = nodes;
        for level in 0..depth {
            if layer.len() == 1 {
                // the rest of the way up is a left spine over zero siblings
                let mut node = layer.swap_remove(0);
                for upper in level..depth {
                    node = Node::branch(node, zero_node(upper));
                }
                return Ok(node);
            }
            let mut next = Vec::with_capacity(layer.len().div_ceil(2));
            let mut iter = layer.into_iter();
            while let Some(left) = iter.next() {
                let right = iter.next().unwrap_or_else(|| zero_node(level));
                next.push(Node::branch(left, right));
            }
            layer = next;
        }
        Ok(layer.swap_remove(0))
    }

    /// Builds a tree of `depth` holding `count` copies of `node` on the left
    /// and zero subtrees elsewhere, in O(depth) allocations.
    pub fn repeat(node: &Node, count: u64, depth: u32) -> Result<Node, ViewError> {
        let bound = 1u64.checked_shl(depth).unwrap_or(u64::MAX);
        if count > bound {
            return Err(ViewError::IndexOutOfBounds {
                index: count,
                bound,
            });
        }
        // full[l] holds 2^l copies
        let mut full = Vec::with_capacity(depth as usize + 1);
        full.push(node.clone());
        for level in 0..depth as usize {
            full.push(Node::branch(full[level].clone(), full[level].clone()));
        }

        fn build(full: &[Node], count: u64, depth: u32) -> Node {
            if count == 0 {
                return zero_node(depth);
            }
            if depth == 0 || count == 1u64 << depth {
                return full[depth as usize].clone();
            }
            let half = 1u64 << (depth - 1);
            if count <= half {
                Node::branch(build(full, count, depth - 1), zero_node(depth - 1))
            } else {
                Node::branch(full[depth as usize - 1].clone(), build(full, count - half, depth - 1))
            }
        }

        Ok(build(&full, count, depth))
    }

    /// Collects the first `count` nodes at `depth`, left to right.
    pub fn nodes_at_depth(&self, depth: u32, count: u64) -> Result<Vec<Node>, ViewError> {
        fn collect(
            node: &Node,
            depth: u32,
            count: u64,
            out: &mut Vec<Node>,
        ) -> Result<(), ViewError> {
            if count == 0 {
                return Ok(());
            }
            if depth == 0 {
                out.push(node.clone());
                return Ok(());
            }
            let (left, right) = node.children().ok_or(ViewError::GindexOutOfBounds {
                gindex: gindex::from_depth_index(depth, 0),
            })?;
            let half = 1u64 << (depth - 1);
            collect(left, depth - 1, count.min(half), out)?;
            if count > half {
                collect(right, depth - 1, count - half, out)?;
            }
            Ok(())
        }

        let mut out = Vec::with_capacity(
            usize::try_from(count).map_or(MAX_PREALLOCATION, |n| n.min(MAX_PREALLOCATION)),
        );
        collect(self, depth, count, &mut out)?;
        Ok(out)
    }

    /// Chunks of the first `count` leaves at `depth`.
    pub fn chunks_at_depth(&self, depth: u32, count: u64) -> Result<Vec<Root>, ViewError> {
        self.nodes_at_depth(depth, count)?
            .iter()
            .map(|node| {
                node.chunk().copied().ok_or(ViewError::GindexOutOfBounds {
                    gindex: gindex::from_depth_index(depth, 0),
                })
            })
            .collect()
    }
}

fn rebuild(node: &Node, depth: u32, base: u64, updates: &[(u64, Node)]) -> Result<Node, ViewError> {
    match updates {
        [] => return Ok(node.clone()),
        [(_, replacement)] if depth == 0 => return Ok(replacement.clone()),
        _ => {}
    }
    let (left, right) = node.children().ok_or(ViewError::GindexOutOfBounds {
        gindex: gindex::from_depth_index(depth, 0),
    })?;
    let mid = base + (1u64 << (depth - 1));
    let split = updates.partition_point(|(index, _)| *index < mid);
    let (left_updates, right_updates) = updates.split_at(split);
    Ok(Node::branch(
        rebuild(left, depth - 1, base, left_updates)?,
        rebuild(right, depth - 1, mid, right_updates)?,
    ))
}

/// The canonical all-zero subtree of `depth`.
///
/// Equal depths always return the same node, so zero subtrees are shared
/// across every tree in the process and their roots are hashed once.
///
/// Panics if `depth >= 64`; schemas never produce such depths.
#[must_use]
pub fn zero_node(depth: u32) -> Node {
    ZERO_NODES[depth as usize]
        .get_or_init(|| {
            trace!(depth, "populating zero subtree cache");
            if depth == 0 {
                Node::leaf(ZERO_CHUNK)
            } else {
                let child = zero_node(depth - 1);
                Node::branch(child.clone(), child)
            }
        })
        .clone()
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Node::ptr_eq(self, other) || self.root() == other.root()
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Inner::Leaf(chunk) => write!(f, "Leaf(0x{})", hex::encode(chunk)),
            Inner::Branch { height, root, .. } => match root.get() {
                Some(root) => {
                    write!(f, "Branch(height={height}, root=0x{})", hex::encode(root))
                }
                None => write!(f, "Branch(height={height})"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use proptest::prelude::*;

    use super::*;
    use crate::merkle::{merkleize, zero_hash};

    fn chunk(n: u8) -> Root {
        let mut c = ZERO_CHUNK;
        c[0] = n;
        c
    }

    fn leaves(n: usize) -> Vec<Node> {
        (0..n).map(|i| Node::leaf(chunk(i as u8 + 1))).collect()
    }

    #[test]
    fn test_debug_shows_hex_roots() {
        let leaf = Node::leaf(chunk(0xab));
        assert_eq!(format!("{leaf:?}"), format!("Leaf(0xab{})", "00".repeat(31)));

        let branch = Node::branch(leaf.clone(), leaf);
        assert_eq!(format!("{branch:?}"), "Branch(height=1)");
        let root = branch.root();
        assert_eq!(
            format!("{branch:?}"),
            format!("Branch(height=1, root=0x{})", hex::encode(root))
        );
    }

    #[test]
    fn test_zero_node_is_cached_instance() {
        for depth in 0..10 {
            assert!(Node::ptr_eq(&zero_node(depth), &zero_node(depth)));
            assert_eq!(zero_node(depth).root(), zero_hash(depth));
        }
        let z5 = zero_node(5);
        let (l, r) = z5.children().unwrap();
        assert!(Node::ptr_eq(l, &zero_node(4)));
        assert!(Node::ptr_eq(r, &zero_node(4)));
    }

    #[test]
    fn test_zero_node_concurrent_population() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| (zero_node(40).root(), zero_node(40))))
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for (root, node) in &results {
            assert_eq!(*root, results[0].0);
            assert!(Node::ptr_eq(node, &results[0].1));
        }
    }

    #[test]
    fn test_branch_hash_is_sha256_of_children() {
        let node = Node::branch(Node::leaf(chunk(1)), Node::leaf(chunk(2)));
        assert_eq!(node.root(), hash_pair(&chunk(1), &chunk(2)));
        // memoized
        assert_eq!(node.cached_root(), Some(node.root()));
    }

    #[test]
    fn test_fill_matches_merkleize() {
        for n in 1..=9 {
            let chunks: Vec<_> = (0..n).map(|i| chunk(i as u8 + 1)).collect();
            let tree = Node::fill(leaves(n), 4).unwrap();
            assert_eq!(tree.root(), merkleize(&chunks, 4));
        }
        assert!(Node::fill(leaves(5), 2).is_err());
        assert!(Node::ptr_eq(&Node::fill(vec![], 7).unwrap(), &zero_node(7)));
    }

    #[test]
    fn test_navigate() {
        let tree = Node::fill(leaves(4), 2).unwrap();
        assert_eq!(tree.navigate(4).unwrap().chunk(), Some(&chunk(1)));
        assert_eq!(tree.navigate(7).unwrap().chunk(), Some(&chunk(4)));
        assert_eq!(tree.navigate(1).unwrap(), tree);
        assert!(matches!(
            tree.navigate(8),
            Err(ViewError::GindexOutOfBounds { gindex: 8 })
        ));
        assert!(tree.navigate(0).is_err());
    }

    #[test]
    fn test_update_shares_siblings() {
        let tree = Node::fill(leaves(8), 3).unwrap();
        let updated = tree.update(9, Node::leaf(chunk(99))).unwrap();

        assert_eq!(updated.navigate(9).unwrap().chunk(), Some(&chunk(99)));
        // old handle unchanged
        assert_eq!(tree.navigate(9).unwrap().chunk(), Some(&chunk(2)));
        // siblings off the path are the same nodes
        for g in [3, 5, 8] {
            assert!(Node::ptr_eq(
                &tree.navigate(g).unwrap(),
                &updated.navigate(g).unwrap()
            ));
        }
        // spine is fresh
        for g in [1, 2, 4] {
            assert!(!Node::ptr_eq(
                &tree.navigate(g).unwrap(),
                &updated.navigate(g).unwrap()
            ));
        }
        assert!(tree.update(16, Node::leaf(chunk(1))).is_err());
    }

    #[test]
    fn test_update_many_equals_sequential() {
        let tree = Node::fill(leaves(6), 3).unwrap();
        let updates = vec![
            (5, Node::leaf(chunk(50))),
            (0, Node::leaf(chunk(10))),
            (5, Node::leaf(chunk(51))),
            (7, Node::leaf(chunk(70))),
        ];
        let mut sequential = tree.clone();
        for (index, node) in &updates {
            sequential = sequential
                .update(gindex::from_depth_index(3, *index), node.clone())
                .unwrap();
        }
        let batched = tree.update_many(3, updates).unwrap();
        assert_eq!(batched.root(), sequential.root());
        // untouched subtree is shared
        assert!(Node::ptr_eq(
            &tree.navigate(5).unwrap(),
            &batched.navigate(5).unwrap()
        ));
        assert!(matches!(
            tree.update_many(3, vec![(8, Node::leaf(chunk(1)))]),
            Err(ViewError::IndexOutOfBounds { index: 8, bound: 8 })
        ));
    }

    #[test]
    fn test_repeat_shares_nodes() {
        let element = Node::fill(leaves(2), 1).unwrap();
        let tree = Node::repeat(&element, 5, 3).unwrap();
        let expected = Node::fill(vec![element.clone(); 5], 3).unwrap();
        assert_eq!(tree.root(), expected.root());
        let a = tree.navigate(8).unwrap();
        let b = tree.navigate(12).unwrap();
        assert!(Node::ptr_eq(&a, &b));
        assert!(Node::ptr_eq(&tree.navigate(13).unwrap(), &zero_node(0)));
    }

    #[test]
    fn test_chunks_at_depth() {
        let tree = Node::fill(leaves(5), 3).unwrap();
        let chunks = tree.chunks_at_depth(3, 6).unwrap();
        assert_eq!(chunks.len(), 6);
        assert_eq!(chunks[4], chunk(5));
        assert_eq!(chunks[5], ZERO_CHUNK);
    }

    #[test]
    fn test_nodes_at_depth_with_huge_count_errors() {
        let leaf = Node::leaf(chunk(1));
        assert!(matches!(
            leaf.nodes_at_depth(40, 1 << 40),
            Err(ViewError::GindexOutOfBounds { .. })
        ));
        assert!(leaf.chunks_at_depth(62, u64::MAX).is_err());
    }

    #[test]
    fn test_parallel_hash_of_large_tree() {
        // tall enough to take the rayon::join path
        let nodes: Vec<_> = (0..4096u32)
            .map(|i| {
                let mut c = ZERO_CHUNK;
                c[..4].copy_from_slice(&i.to_le_bytes());
                Node::leaf(c)
            })
            .collect();
        let chunks: Vec<_> = nodes.iter().map(|n| *n.chunk().unwrap()).collect();
        let tree = Node::fill(nodes, 12).unwrap();
        let shared = Arc::new(tree);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let t = Arc::clone(&shared);
                thread::spawn(move || t.root())
            })
            .collect();
        let expected = merkleize(&chunks, 12);
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    }

    proptest! {
        #[test]
        fn proptest_update_then_navigate(
            n in 1usize..64,
            depth in 6u32..9,
            target in 0u64..64,
            value in any::<u8>(),
        ) {
            let tree = Node::fill(leaves(n), depth).unwrap();
            let g = gindex::from_depth_index(depth, target);
            let updated = tree.update(g, Node::leaf(chunk(value))).unwrap();
            let navigated = updated.navigate(g).unwrap();
            prop_assert_eq!(navigated.chunk(), Some(&chunk(value)));
            prop_assert_eq!(updated.height(), tree.height());
        }
    }
}
