// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Maps a driver predicate's [`Tag`] onto a leaf-descent strategy and a
//! priority score used by the multi-tree arbiter (C8).

use super::condition::Tag;

/// Where the scan should descend to before it starts walking the leaf
/// chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartNodeStrategy {
    /// Descend to the leaf slot at or after the predicate's argument.
    AtOrAfter,
    /// Descend to the leaf slot at or before the predicate's argument
    /// (used by the backward-scanning `lt`/`lte` family).
    AtOrBefore,
    /// No useful descent target: start at the leftmost leaf.
    Leftmost,
    /// No useful descent target, but the scan runs backward: start at the
    /// rightmost leaf.
    Rightmost,
}

/// Where the scan is allowed to stop early, independent of
/// [`super::condition::Predicate::early_terminate`] (which governs
/// mid-scan termination on a match-then-miss transition).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndNodeStrategy {
    /// Keep walking until the leaf chain itself runs out.
    ChainEnd,
    /// Stop as soon as a slot fails the driver predicate (valid for the
    /// monotonic `gt`/`gte`/`lt`/`lte` families, since the full order
    /// guarantees everything past that point also fails).
    FirstMiss,
}

/// Picks the start-of-scan strategy for a driver tag.
pub fn start_node_strategy(tag: Tag) -> StartNodeStrategy {
    use Tag::*;
    match tag {
        PrimaryEqual | Equal | Gt | Gte | PrimaryGt | PrimaryGte | Or | PrimaryOr => StartNodeStrategy::AtOrAfter,
        Lt | Lte | PrimaryLt | PrimaryLte => StartNodeStrategy::AtOrBefore,
        Like | NotEqual | PrimaryNotEqual => StartNodeStrategy::Leftmost,
    }
}

/// Picks the end-of-scan strategy for a driver tag.
pub fn end_node_strategy(tag: Tag) -> EndNodeStrategy {
    use Tag::*;
    match tag {
        Gt | Gte | PrimaryGt | PrimaryGte | Lt | Lte | PrimaryLt | PrimaryLte => {
            EndNodeStrategy::FirstMiss
        }
        PrimaryEqual | Equal | Like | NotEqual | PrimaryNotEqual | Or | PrimaryOr => {
            EndNodeStrategy::ChainEnd
        }
    }
}

/// Relative cost/selectivity score used to rank candidate driver
/// predicates across several trees in a join-like multi-tree query (C8).
/// Higher is more selective and therefore a better driver.
pub fn condition_priority(tag: Tag) -> u32 {
    use Tag::*;
    match tag {
        Equal | PrimaryEqual => 100,
        Or | PrimaryOr => 80,
        Gt | Gte | Lt | Lte | PrimaryGt | PrimaryGte | PrimaryLt | PrimaryLte => 50,
        Like => 30,
        NotEqual | PrimaryNotEqual => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_descends_forward_and_stops_at_chain_end() {
        assert_eq!(start_node_strategy(Tag::Equal), StartNodeStrategy::AtOrAfter);
        assert_eq!(end_node_strategy(Tag::Equal), EndNodeStrategy::ChainEnd);
    }

    #[test]
    fn range_predicates_stop_at_first_miss() {
        assert_eq!(end_node_strategy(Tag::Gte), EndNodeStrategy::FirstMiss);
        assert_eq!(end_node_strategy(Tag::PrimaryLt), EndNodeStrategy::FirstMiss);
    }

    #[test]
    fn lt_family_descends_backward() {
        assert_eq!(start_node_strategy(Tag::Lt), StartNodeStrategy::AtOrBefore);
        assert_eq!(start_node_strategy(Tag::PrimaryLte), StartNodeStrategy::AtOrBefore);
    }

    #[test]
    fn unbounded_predicates_scan_from_an_edge() {
        assert_eq!(start_node_strategy(Tag::Like), StartNodeStrategy::Leftmost);
        assert_eq!(start_node_strategy(Tag::NotEqual), StartNodeStrategy::Leftmost);
    }

    #[test]
    fn priority_ranks_equality_above_range_above_like_above_not_equal() {
        assert!(condition_priority(Tag::Equal) > condition_priority(Tag::Or));
        assert!(condition_priority(Tag::Or) > condition_priority(Tag::Gt));
        assert!(condition_priority(Tag::Gt) > condition_priority(Tag::Like));
        assert!(condition_priority(Tag::Like) > condition_priority(Tag::NotEqual));
    }
}
