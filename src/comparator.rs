// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Value ordering contract for B+Tree values.
//!
//! A [`Comparator`] layers two total orders over the value type `V`: a
//! primary order, which is independently queryable (`primaryEqual`,
//! `primaryGt`, ...), and a tie-break order used only to make the primary
//! order total for storage and range-scan purposes. For scalar value types
//! the two orders usually coincide.

use std::cmp::Ordering;

/// Ordering and pattern-match projection for a B+Tree's value type.
///
/// ## Contract
/// - [`Comparator::asc`] and [`Comparator::primary_asc`] must each be a
///   strict weak ordering: reflexive, transitive, and antisymmetric on
///   equality. The engine assumes this without re-checking it.
/// - [`Comparator::primary_asc`] is consulted only to break ties left by
///   [`Comparator::asc`]; for types with no secondary dimension, implement
///   it identically to `asc`.
/// - [`Comparator::match_str`] is used exclusively by the `like` predicate;
///   for scalar string values it should return the value's own text.
pub trait Comparator<V>: Send + Sync {
    /// Full-order comparison: primary ordinal, used for everything except
    /// the `primary*` predicate family.
    fn asc(&self, a: &V, b: &V) -> Ordering;

    /// Tie-break ordinal comparison, consulted when `asc` reports `Equal`.
    fn primary_asc(&self, a: &V, b: &V) -> Ordering;

    /// Projects a value to the string the `like` predicate matches against.
    fn match_str(&self, v: &V) -> String;

    /// `true` when `a` and `b` are equal under the full order (primary then
    /// tie-break).
    fn is_same(&self, a: &V, b: &V) -> bool {
        self.full_asc(a, b) == Ordering::Equal
    }

    /// `true` when `a` sorts strictly before `b` under the full order.
    fn is_lower(&self, a: &V, b: &V) -> bool {
        self.full_asc(a, b) == Ordering::Less
    }

    /// `true` when `a` sorts strictly after `b` under the full order.
    fn is_higher(&self, a: &V, b: &V) -> bool {
        self.full_asc(a, b) == Ordering::Greater
    }

    /// `true` when `a` and `b` are equal under the primary order alone.
    fn is_primary_same(&self, a: &V, b: &V) -> bool {
        self.primary_asc(a, b) == Ordering::Equal
    }

    /// `true` when `a` sorts strictly before `b` under the primary order
    /// alone.
    fn is_primary_lower(&self, a: &V, b: &V) -> bool {
        self.primary_asc(a, b) == Ordering::Less
    }

    /// `true` when `a` sorts strictly after `b` under the primary order
    /// alone.
    fn is_primary_higher(&self, a: &V, b: &V) -> bool {
        self.primary_asc(a, b) == Ordering::Greater
    }

    /// The full storage order: primary order first, tie-break order to
    /// resolve primary ties. This is what determines leaf-slot ordering and
    /// the leaf chain's ascending direction.
    fn full_asc(&self, a: &V, b: &V) -> Ordering {
        match self.asc(a, b) {
            Ordering::Equal => self.primary_asc(a, b),
            other => other,
        }
    }
}

/// A [`Comparator`] for any `V: Ord + ToString` where the primary order and
/// the tie-break order are identical — the common case for scalar values
/// (integers, strings).
#[derive(Debug, Default, Clone, Copy)]
pub struct NaturalComparator;

impl<V> Comparator<V> for NaturalComparator
where
    V: Ord + ToString,
{
    fn asc(&self, a: &V, b: &V) -> Ordering {
        a.cmp(b)
    }

    fn primary_asc(&self, a: &V, b: &V) -> Ordering {
        a.cmp(b)
    }

    fn match_str(&self, v: &V) -> String {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_comparator_orders_integers() {
        let cmp = NaturalComparator;
        assert!(cmp.is_lower(&1, &2));
        assert!(cmp.is_higher(&5, &2));
        assert!(cmp.is_same(&3, &3));
    }

    #[test]
    fn natural_comparator_match_str_uses_to_string() {
        let cmp = NaturalComparator;
        assert_eq!(Comparator::<i32>::match_str(&cmp, &42), "42");
    }

    struct CompositeValue {
        name: &'static str,
        rank: i32,
    }

    struct ByRankThenName;

    impl Comparator<CompositeValue> for ByRankThenName {
        fn asc(&self, a: &CompositeValue, b: &CompositeValue) -> Ordering {
            a.rank.cmp(&b.rank)
        }
        fn primary_asc(&self, a: &CompositeValue, b: &CompositeValue) -> Ordering {
            a.name.cmp(b.name)
        }
        fn match_str(&self, v: &CompositeValue) -> String {
            v.name.to_string()
        }
    }

    #[test]
    fn tie_break_resolves_primary_equal_values() {
        let cmp = ByRankThenName;
        let a = CompositeValue { name: "alice", rank: 1 };
        let b = CompositeValue { name: "bob", rank: 1 };
        assert!(cmp.is_primary_same(&a, &b));
        assert_eq!(cmp.full_asc(&a, &b), Ordering::Less);
        assert!(!cmp.is_same(&a, &b));
    }
}
