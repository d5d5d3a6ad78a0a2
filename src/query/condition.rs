// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The closed predicate tag set and the multi-predicate condition object.

use crate::comparator::Comparator;
use crate::error::IxResult;
use crate::pattern::PatternCache;

/// One of the fourteen predicate tags a [`Condition`] may carry.
///
/// Order here is the driver precedence from `spec.md` §4.6: when several
/// tags are set on one condition, the first one (in this order) that is
/// present becomes the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    PrimaryEqual,
    Equal,
    Gt,
    Gte,
    Lt,
    Lte,
    PrimaryGt,
    PrimaryGte,
    PrimaryLt,
    PrimaryLte,
    Like,
    NotEqual,
    PrimaryNotEqual,
    Or,
    PrimaryOr,
}

/// Driver precedence, highest first. Exposed as a constant slice so the
/// ordering is a single source of truth for both
/// [`Condition::predicates`] and [`crate::query::arbiter`].
pub const TAG_PRECEDENCE: &[Tag] = &[
    Tag::PrimaryEqual,
    Tag::Equal,
    Tag::Gt,
    Tag::Gte,
    Tag::Lt,
    Tag::Lte,
    Tag::PrimaryGt,
    Tag::PrimaryGte,
    Tag::PrimaryLt,
    Tag::PrimaryLte,
    Tag::Like,
    Tag::NotEqual,
    Tag::PrimaryNotEqual,
    Tag::Or,
    Tag::PrimaryOr,
];

/// A single active predicate, normalized out of a [`Condition`] with its
/// tag-specific argument attached.
#[derive(Debug, Clone)]
pub enum Predicate<V> {
    Equal(V),
    NotEqual(V),
    Gt(V),
    Gte(V),
    Lt(V),
    Lte(V),
    Or(Vec<V>),
    PrimaryEqual(V),
    PrimaryNotEqual(V),
    PrimaryGt(V),
    PrimaryGte(V),
    PrimaryLt(V),
    PrimaryLte(V),
    PrimaryOr(Vec<V>),
    Like(String),
}

impl<V> Predicate<V> {
    pub fn tag(&self) -> Tag {
        match self {
            Self::Equal(_) => Tag::Equal,
            Self::NotEqual(_) => Tag::NotEqual,
            Self::Gt(_) => Tag::Gt,
            Self::Gte(_) => Tag::Gte,
            Self::Lt(_) => Tag::Lt,
            Self::Lte(_) => Tag::Lte,
            Self::Or(_) => Tag::Or,
            Self::PrimaryEqual(_) => Tag::PrimaryEqual,
            Self::PrimaryNotEqual(_) => Tag::PrimaryNotEqual,
            Self::PrimaryGt(_) => Tag::PrimaryGt,
            Self::PrimaryGte(_) => Tag::PrimaryGte,
            Self::PrimaryLt(_) => Tag::PrimaryLt,
            Self::PrimaryLte(_) => Tag::PrimaryLte,
            Self::PrimaryOr(_) => Tag::PrimaryOr,
            Self::Like(_) => Tag::Like,
        }
    }

    /// Scan direction this predicate would drive: `+1` to follow `next`,
    /// `-1` to follow `prev`. Only meaningful when this predicate is the
    /// chosen driver.
    pub fn direction(&self) -> i8 {
        match self.tag() {
            Tag::Lt | Tag::Lte | Tag::PrimaryLt | Tag::PrimaryLte => -1,
            _ => 1,
        }
    }

    /// `true` only for `equal`/`primaryEqual`: once a match has been seen
    /// and a subsequent non-match appears, the scan may stop, since an
    /// equality run is known to be contiguous in leaf-chain order.
    pub fn early_terminate(&self) -> bool {
        matches!(self.tag(), Tag::Equal | Tag::PrimaryEqual)
    }

    /// Evaluates this predicate against one leaf slot's value.
    pub fn verify(
        &self,
        node_value: &V,
        cmp: &dyn Comparator<V>,
        patterns: &mut PatternCache,
    ) -> IxResult<bool> {
        Ok(match self {
            Self::Equal(arg) => cmp.is_same(node_value, arg),
            Self::NotEqual(arg) => !cmp.is_same(node_value, arg),
            Self::Gt(arg) => cmp.is_higher(node_value, arg),
            Self::Gte(arg) => !cmp.is_lower(node_value, arg),
            Self::Lt(arg) => cmp.is_lower(node_value, arg),
            Self::Lte(arg) => !cmp.is_higher(node_value, arg),
            Self::Or(args) => args.iter().any(|arg| cmp.is_same(node_value, arg)),
            Self::PrimaryEqual(arg) => cmp.is_primary_same(node_value, arg),
            Self::PrimaryNotEqual(arg) => !cmp.is_primary_same(node_value, arg),
            Self::PrimaryGt(arg) => cmp.is_primary_higher(node_value, arg),
            Self::PrimaryGte(arg) => !cmp.is_primary_lower(node_value, arg),
            Self::PrimaryLt(arg) => cmp.is_primary_lower(node_value, arg),
            Self::PrimaryLte(arg) => !cmp.is_primary_higher(node_value, arg),
            Self::PrimaryOr(args) => args.iter().any(|arg| cmp.is_primary_same(node_value, arg)),
            Self::Like(pattern) => {
                let regex = patterns.get_or_compile(pattern)?;
                regex.is_match(&cmp.match_str(node_value))
            }
        })
    }
}

/// A multi-predicate condition: any subset of the fourteen tags may be set
/// simultaneously. [`Condition::predicates`] normalizes the active subset
/// into driver precedence order.
#[derive(Debug, Clone, Default)]
pub struct Condition<V> {
    pub equal: Option<V>,
    pub not_equal: Option<V>,
    pub gt: Option<V>,
    pub gte: Option<V>,
    pub lt: Option<V>,
    pub lte: Option<V>,
    pub or: Option<Vec<V>>,
    pub primary_equal: Option<V>,
    pub primary_not_equal: Option<V>,
    pub primary_gt: Option<V>,
    pub primary_gte: Option<V>,
    pub primary_lt: Option<V>,
    pub primary_lte: Option<V>,
    pub primary_or: Option<Vec<V>>,
    pub like: Option<String>,
}

macro_rules! builder_field {
    ($name:ident, $field:ident, $ty:ty) => {
        pub fn $name(mut self, arg: $ty) -> Self {
            self.$field = Some(arg);
            self
        }
    };
}

impl<V> Condition<V> {
    pub fn new() -> Self {
        Self::default()
    }

    builder_field!(equal, equal, V);
    builder_field!(not_equal, not_equal, V);
    builder_field!(gt, gt, V);
    builder_field!(gte, gte, V);
    builder_field!(lt, lt, V);
    builder_field!(lte, lte, V);
    builder_field!(or, or, Vec<V>);
    builder_field!(primary_equal, primary_equal, V);
    builder_field!(primary_not_equal, primary_not_equal, V);
    builder_field!(primary_gt, primary_gt, V);
    builder_field!(primary_gte, primary_gte, V);
    builder_field!(primary_lt, primary_lt, V);
    builder_field!(primary_lte, primary_lte, V);
    builder_field!(primary_or, primary_or, Vec<V>);

    pub fn like(mut self, pattern: impl Into<String>) -> Self {
        self.like = Some(pattern.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates().is_empty()
    }
}

impl<V: Clone> Condition<V> {
    /// Normalizes the active tags into driver-precedence order. The first
    /// element, if any, is the driver candidate; the rest form the
    /// post-filter once a driver is chosen.
    pub fn predicates(&self) -> Vec<Predicate<V>> {
        let mut out = Vec::new();
        for tag in TAG_PRECEDENCE {
            let predicate = match tag {
                Tag::PrimaryEqual => self.primary_equal.clone().map(Predicate::PrimaryEqual),
                Tag::Equal => self.equal.clone().map(Predicate::Equal),
                Tag::Gt => self.gt.clone().map(Predicate::Gt),
                Tag::Gte => self.gte.clone().map(Predicate::Gte),
                Tag::Lt => self.lt.clone().map(Predicate::Lt),
                Tag::Lte => self.lte.clone().map(Predicate::Lte),
                Tag::PrimaryGt => self.primary_gt.clone().map(Predicate::PrimaryGt),
                Tag::PrimaryGte => self.primary_gte.clone().map(Predicate::PrimaryGte),
                Tag::PrimaryLt => self.primary_lt.clone().map(Predicate::PrimaryLt),
                Tag::PrimaryLte => self.primary_lte.clone().map(Predicate::PrimaryLte),
                Tag::Like => self.like.clone().map(Predicate::Like),
                Tag::NotEqual => self.not_equal.clone().map(Predicate::NotEqual),
                Tag::PrimaryNotEqual => self.primary_not_equal.clone().map(Predicate::PrimaryNotEqual),
                Tag::Or => self.or.clone().map(Predicate::Or),
                Tag::PrimaryOr => self.primary_or.clone().map(Predicate::PrimaryOr),
            };
            if let Some(predicate) = predicate {
                out.push(predicate);
            }
        }
        out
    }
}

/// Ascending or descending result order, per `spec.md` §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Default for Order {
    fn default() -> Self {
        Self::Asc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_are_ordered_by_precedence() {
        let condition = Condition::new().lt(10).gte(5).equal(6);
        let tags: Vec<Tag> = condition.predicates().iter().map(Predicate::tag).collect();
        assert_eq!(tags, vec![Tag::Equal, Tag::Gte, Tag::Lt]);
    }

    #[test]
    fn empty_condition_has_no_predicates() {
        let condition: Condition<i32> = Condition::new();
        assert!(condition.is_empty());
    }

    #[test]
    fn lt_and_lte_scan_backward() {
        assert_eq!(Predicate::Lt::<i32>(5).direction(), -1);
        assert_eq!(Predicate::PrimaryLte::<i32>(5).direction(), -1);
        assert_eq!(Predicate::Gt::<i32>(5).direction(), 1);
    }

    #[test]
    fn only_equality_early_terminates() {
        assert!(Predicate::Equal::<i32>(1).early_terminate());
        assert!(Predicate::PrimaryEqual::<i32>(1).early_terminate());
        assert!(!Predicate::Gt::<i32>(1).early_terminate());
    }
}
