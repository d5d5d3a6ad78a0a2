// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Pure, non-IO B+Tree arithmetic and search helpers.
//!
//! Nothing in this module touches a [`crate::storage::Storage`] or
//! [`crate::storage_async::AsyncStorage`]; that is what lets the blocking
//! and cooperative engines (`tree.rs` / `tree_async.rs`) share it verbatim
//! and guarantees no suspension point hides inside a binary search.

use crate::comparator::Comparator;
use std::cmp::Ordering;

/// Which ordering (and tie-breaking rule) governs a descent through an
/// internal node's separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescentMode {
    /// Full order (primary then tie-break); on equality, descend right.
    /// Used for insertion and for full-order equality lookups. Matches the
    /// leaf-split convention, where a promoted separator is the minimum
    /// value of the newly-created right leaf: descending right on equality
    /// is what actually lands on the leaf holding that value.
    Insertion,
    /// Primary order only, ignoring tie-break; on equality, descend left.
    /// Used to locate the candidate leaf for a primary-keyed deletion, which
    /// recovers from landing one leaf early by walking `leaf.next`.
    PrimaryOnly,
    /// Primary order only; on equality, descend right. Used to find the
    /// leaf just past the last primary-equal run, e.g. for `lte` /
    /// `primaryEqual` end-of-range bounds.
    RightmostPrimary,
}

/// Chooses the child index to descend into from an internal node's
/// `separators` (length `k - 1` for `k` children), given `target` and a
/// [`DescentMode`].
///
/// ## Output
/// An index in `0..=separators.len()` (i.e. `0..=k-1`), suitable for
/// indexing the node's `keys` (child ids).
pub fn descend_index<V>(separators: &[V], target: &V, cmp: &dyn Comparator<V>, mode: DescentMode) -> usize {
    match mode {
        DescentMode::Insertion => {
            separators.partition_point(|s| cmp.full_asc(s, target) != Ordering::Greater)
        }
        DescentMode::PrimaryOnly => {
            separators.partition_point(|s| cmp.primary_asc(s, target) == Ordering::Less)
        }
        DescentMode::RightmostPrimary => {
            separators.partition_point(|s| cmp.primary_asc(target, s) != Ordering::Less)
        }
    }
}

/// Locates `target` among a leaf's ascending `values`.
///
/// ## Output
/// - `Ok(i)`: `values[i]` equals `target` under the full order (the slot to
///   reuse / whose bucket to extend).
/// - `Err(i)`: no equal slot exists; `i` is the ascending insertion point.
pub fn leaf_slot_search<V>(values: &[V], target: &V, cmp: &dyn Comparator<V>) -> Result<usize, usize> {
    values.binary_search_by(|probe| cmp.full_asc(probe, target))
}

/// `mid = ceil(order / 2) - 1`, used both as the leaf split point (values
/// `[0..=mid]` stay, `[mid+1..]` move to the new right leaf) and as the
/// internal-node split point (same arithmetic, see `spec.md` §4.5).
pub fn split_mid(order: u32) -> usize {
    internal_min_children(order) - 1
}

/// Minimum number of children a non-root internal node must retain:
/// `ceil(order / 2)`.
pub fn internal_min_children(order: u32) -> usize {
    ((order + 1) / 2) as usize
}

/// Minimum number of separators (`values.len()`) a non-root internal node
/// must retain: `internal_min_children(order) - 1`.
pub fn internal_min_values(order: u32) -> usize {
    internal_min_children(order) - 1
}

/// Minimum number of values a non-root leaf must retain:
/// `ceil((order - 1) / 2)`, which is algebraically identical to
/// `order / 2` (integer division) for every `order >= 3`.
pub fn leaf_min_values(order: u32) -> usize {
    (order / 2) as usize
}

/// Whether two adjacent leaves may be merged into one without exceeding the
/// node's maximum occupancy (a leaf splits once it reaches `order` values,
/// so the largest stable leaf holds `order - 1`).
pub fn can_merge_leaves(left_values: usize, right_values: usize, order: u32) -> bool {
    left_values + right_values <= order as usize - 1
}

/// Whether two adjacent internal nodes may be merged (plus the parent's
/// demoted separator) without exceeding the node's maximum occupancy (an
/// internal node splits once `keys.len() > order`, so the largest stable
/// internal node holds `order` children).
pub fn can_merge_internal(left_children: usize, right_children: usize, order: u32) -> bool {
    left_children + right_children <= order as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::NaturalComparator;

    #[test]
    fn descend_index_insertion_goes_right_on_equality() {
        let cmp = NaturalComparator;
        let separators = vec![10, 20, 30];
        assert_eq!(descend_index(&separators, &20, &cmp, DescentMode::Insertion), 2);
        assert_eq!(descend_index(&separators, &5, &cmp, DescentMode::Insertion), 0);
        assert_eq!(descend_index(&separators, &25, &cmp, DescentMode::Insertion), 2);
        assert_eq!(descend_index(&separators, &100, &cmp, DescentMode::Insertion), 3);
    }

    #[test]
    fn descend_index_rightmost_primary_goes_right_on_equality() {
        let cmp = NaturalComparator;
        let separators = vec![10, 20, 20, 30];
        assert_eq!(
            descend_index(&separators, &20, &cmp, DescentMode::RightmostPrimary),
            3
        );
        assert_eq!(
            descend_index(&separators, &15, &cmp, DescentMode::RightmostPrimary),
            1
        );
    }

    #[test]
    fn leaf_slot_search_finds_exact_and_insertion_points() {
        let cmp = NaturalComparator;
        let values = vec![1, 3, 5, 7];
        assert_eq!(leaf_slot_search(&values, &5, &cmp), Ok(2));
        assert_eq!(leaf_slot_search(&values, &4, &cmp), Err(2));
        assert_eq!(leaf_slot_search(&values, &8, &cmp), Err(4));
    }

    #[test]
    fn occupancy_thresholds_for_order_4() {
        assert_eq!(split_mid(4), 1);
        assert_eq!(leaf_min_values(4), 2);
        assert_eq!(internal_min_children(4), 2);
        assert_eq!(internal_min_values(4), 1);
    }

    #[test]
    fn occupancy_thresholds_for_order_5() {
        assert_eq!(split_mid(5), 2);
        assert_eq!(leaf_min_values(5), 2);
        assert_eq!(internal_min_children(5), 3);
    }

    #[test]
    fn merge_feasibility_respects_max_occupancy() {
        assert!(can_merge_leaves(2, 1, 4));
        assert!(!can_merge_leaves(2, 2, 4));
        assert!(can_merge_internal(2, 2, 4));
        assert!(!can_merge_internal(3, 2, 4));
    }
}
