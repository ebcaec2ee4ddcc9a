//! Generalized index arithmetic.
//!
//! A generalized index encodes a path from a tree root: the root is `1`,
//! and the children of `g` are `2g` (left) and `2g + 1` (right). Reading
//! the bits of `g` after the leading one from most to least significant
//! yields the left/right turns from the root.

/// Position of a node relative to some subtree root.
pub type GeneralizedIndex = u64;

/// The generalized index of the root itself.
pub const ROOT: GeneralizedIndex = 1;

/// Returns the generalized index of the `index`-th node at `depth`.
///
/// Caller must ensure `index < 1 << depth` and `depth < 64`.
#[must_use]
#[inline]
pub const fn from_depth_index(depth: u32, index: u64) -> GeneralizedIndex {
    (1 << depth) | index
}

/// Number of edges between the root and the node at `gindex`.
///
/// `0` names no node; its depth is reported as `0`.
#[must_use]
#[inline]
pub const fn depth(gindex: GeneralizedIndex) -> u32 {
    (u64::BITS - 1).saturating_sub(gindex.leading_zeros())
}

/// Position of the node within its level, counting from the left.
#[must_use]
#[inline]
pub const fn index_at_depth(gindex: GeneralizedIndex) -> u64 {
    gindex & !(1u64 << depth(gindex))
}

/// Appends the path `child` (relative to the node at `parent`) to `parent`.
///
/// Returns `None` if either index is `0` or the combined index does not
/// fit in 64 bits.
#[must_use]
pub fn concat(parent: GeneralizedIndex, child: GeneralizedIndex) -> Option<GeneralizedIndex> {
    if parent == 0 || child == 0 {
        return None;
    }
    let child_depth = depth(child);
    if depth(parent) + child_depth > 63 {
        return None;
    }
    Some((parent << child_depth) | index_at_depth(child))
}

#[must_use]
#[inline]
pub const fn parent(gindex: GeneralizedIndex) -> GeneralizedIndex {
    gindex >> 1
}

#[must_use]
#[inline]
pub const fn sibling(gindex: GeneralizedIndex) -> GeneralizedIndex {
    gindex ^ 1
}

#[must_use]
#[inline]
pub const fn is_left(gindex: GeneralizedIndex) -> bool {
    gindex & 1 == 0
}

/// Iterates the turns from the root down to `gindex`; `true` means right.
pub(crate) fn path_bits(gindex: GeneralizedIndex) -> impl Iterator<Item = bool> {
    let d = depth(gindex);
    (0..d).rev().map(move |shift| (gindex >> shift) & 1 == 1)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_depth_and_index() {
        assert_eq!(depth(ROOT), 0);
        assert_eq!(depth(2), 1);
        assert_eq!(depth(3), 1);
        assert_eq!(depth(8), 3);
        assert_eq!(index_at_depth(11), 3);
        assert_eq!(from_depth_index(3, 3), 11);
    }

    #[test]
    fn test_path_bits() {
        // 0b1101: right, left, right
        let bits: Vec<_> = path_bits(0b1101).collect();
        assert_eq!(bits, vec![true, false, true]);
        assert_eq!(path_bits(ROOT).count(), 0);
    }

    #[test]
    fn test_concat() {
        // right child of the left child of the root
        assert_eq!(concat(2, 3), Some(5));
        assert_eq!(concat(ROOT, 7), Some(7));
        assert_eq!(concat(7, ROOT), Some(7));
        assert_eq!(concat(1 << 40, 1 << 30), None);
    }

    #[test]
    fn test_zero_index_does_not_panic() {
        assert_eq!(depth(0), 0);
        assert_eq!(index_at_depth(0), 0);
        assert_eq!(path_bits(0).count(), 0);
        assert_eq!(concat(0, 5), None);
        assert_eq!(concat(5, 0), None);
        assert_eq!(concat(0, 0), None);
    }

    #[test]
    fn test_family() {
        assert_eq!(parent(11), 5);
        assert_eq!(sibling(11), 10);
        assert!(is_left(10));
        assert!(!is_left(11));
    }

    proptest! {
        #[test]
        fn proptest_concat_depth_adds(
            a_depth in 0u32..30,
            a_index in any::<u64>(),
            b_depth in 0u32..30,
            b_index in any::<u64>(),
        ) {
            let a = from_depth_index(a_depth, a_index & ((1u64 << a_depth) - 1));
            let b = from_depth_index(b_depth, b_index & ((1u64 << b_depth) - 1));
            let c = concat(a, b).unwrap();
            prop_assert_eq!(depth(c), a_depth + b_depth);
            prop_assert_eq!(c >> b_depth, a);
        }
    }
}
