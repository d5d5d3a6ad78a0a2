// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Blocking query executor: turns a planned scan into a lazy `(K, V)`
//! iterator over the leaf chain.

use super::condition::{Condition, Order, Predicate, Tag};
use super::dispatch::{end_node_strategy, start_node_strategy, EndNodeStrategy, StartNodeStrategy};
use crate::algo::DescentMode;
use crate::comparator::Comparator;
use crate::error::IxResult;
use crate::node::{Node, NodeId};
use crate::pattern::PatternCache;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::marker::PhantomData;

/// What the engine (C5) must expose to the executor so it can descend to a
/// start leaf and then walk the leaf chain. Implemented by
/// [`crate::tree::Tree`]; kept separate from the engine's own mutation API
/// so this module stays ignorant of MVCC, splitting, and merging.
pub trait LeafSource<K, V, D> {
    fn comparator(&self) -> &dyn Comparator<V>;

    fn patterns(&self) -> &RefCell<PatternCache>;

    fn leftmost_leaf(&self) -> IxResult<Option<NodeId>>;

    fn rightmost_leaf(&self) -> IxResult<Option<NodeId>>;

    /// Descends to the leaf that would hold `target` under `mode`, or
    /// `None` if the tree is empty.
    fn descend_to_leaf(&self, target: &V, mode: DescentMode) -> IxResult<Option<NodeId>>;

    fn read_leaf(&self, id: &NodeId) -> IxResult<Node<K, V>>;

    /// Whether the scan should eagerly fetch the next-direction leaf while
    /// still processing the current one (`spec.md` §4.6 "Read-ahead"),
    /// backed by [`crate::options::Options::read_ahead`]. Defaults to `true`,
    /// matching [`crate::options::Options::default`].
    fn read_ahead(&self) -> bool {
        true
    }
}

/// Where a [`Scan`] actually begins walking the leaf chain. `Normal` means
/// the driver's own start-node strategy picked the leaf; the other two
/// variants override it when `Order::Desc` reverses the plan and the
/// ascending-order start node no longer reaches the far end of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartOverride {
    Normal,
    ForceRightmost,
    ForceLeftmost,
}

/// A plan derived from a [`Condition`]: the driver predicate (if any),
/// its scan direction and termination rule, and the remaining predicates
/// to apply as a post-filter.
struct Plan<V> {
    driver: Option<Predicate<V>>,
    post_filter: Vec<Predicate<V>>,
    direction: i8,
    end_strategy: EndNodeStrategy,
    early_terminate: bool,
    start_override: StartOverride,
}

fn plan_for<V: Clone>(condition: &Condition<V>, order: Order) -> Plan<V> {
    let mut predicates = condition.predicates();
    if predicates.is_empty() {
        let (direction, start_override) = match order {
            Order::Asc => (1, StartOverride::Normal),
            Order::Desc => (-1, StartOverride::ForceRightmost),
        };
        return Plan {
            driver: None,
            post_filter: Vec::new(),
            direction,
            end_strategy: EndNodeStrategy::ChainEnd,
            early_terminate: false,
            start_override,
        };
    }
    let driver = predicates.remove(0);
    let tag = driver.tag();
    let base_direction = driver.direction();
    let mut direction = base_direction;
    let mut end_strategy = end_node_strategy(tag);
    let early_terminate = driver.early_terminate();
    let mut start_override = StartOverride::Normal;
    if order == Order::Desc {
        direction = -direction;
        end_strategy = EndNodeStrategy::ChainEnd;
        // No endNode is computed for any driver here, so per spec.md §4.6 the
        // new start is the chain edge the ascending plan would have walked
        // toward: the far (rightmost) edge for a forward-baseline driver,
        // the near (leftmost) edge for a backward-baseline one (lt/lte).
        start_override = if base_direction == 1 {
            StartOverride::ForceRightmost
        } else {
            StartOverride::ForceLeftmost
        };
    }
    Plan {
        driver: Some(driver),
        post_filter: predicates,
        direction,
        end_strategy,
        early_terminate,
        start_override,
    }
}

/// Descent target for the driver predicate, chosen per `spec.md` §4.6.
/// `None` means start at a chain edge rather than via descent.
fn descent_target<V: Clone>(driver: &Predicate<V>, cmp: &dyn Comparator<V>) -> Option<(V, DescentMode)> {
    use Predicate::*;
    match driver {
        Equal(v) | NotEqual(v) | Gt(v) | Gte(v) | Lt(v) => Some((v.clone(), DescentMode::Insertion)),
        Lte(v) => Some((v.clone(), DescentMode::RightmostPrimary)),
        PrimaryEqual(v) | PrimaryNotEqual(v) | PrimaryGt(v) | PrimaryGte(v) | PrimaryLt(v) => {
            Some((v.clone(), DescentMode::PrimaryOnly))
        }
        PrimaryLte(v) => Some((v.clone(), DescentMode::RightmostPrimary)),
        // "descend to the lowest-by-(primary) ordering of the argument set" (spec.md §4.6).
        Or(args) => lowest_arg(args, cmp, false).map(|v| (v, DescentMode::Insertion)),
        PrimaryOr(args) => lowest_arg(args, cmp, true).map(|v| (v, DescentMode::PrimaryOnly)),
        Like(_) => None,
    }
}

/// The least element of `args` under the full order, or the primary order
/// alone when `primary` is set. Empty `args` (a degenerate `or`/`primaryOr`
/// condition) falls back to `None`, which leaves the caller to start from a
/// chain edge instead.
fn lowest_arg<V: Clone>(args: &[V], cmp: &dyn Comparator<V>, primary: bool) -> Option<V> {
    args.iter()
        .cloned()
        .min_by(|a, b| if primary { cmp.primary_asc(a, b) } else { cmp.full_asc(a, b) })
}

/// Whether `tag` is one of the eight range comparisons, whose starting slot
/// within the landed leaf must be located relative to the driver's own
/// target value rather than assumed to sit at a leaf edge.
fn is_range_tag(tag: Tag) -> bool {
    matches!(
        tag,
        Tag::Gt | Tag::Gte | Tag::Lt | Tag::Lte | Tag::PrimaryGt | Tag::PrimaryGte | Tag::PrimaryLt | Tag::PrimaryLte
    )
}

/// Locates the slot a range driver should begin scanning from within the
/// leaf it landed on: the first slot matching the driver (forward drivers)
/// or the last one (backward drivers, `lt`/`lte`), so the scan neither
/// skips matches already present in the landed leaf nor starts on a value
/// the driver itself rejects.
fn range_start_slot<V>(values: &[V], driver: &Predicate<V>, cmp: &dyn Comparator<V>) -> isize {
    use Predicate::*;
    let (target, primary, forward, strict) = match driver {
        Gt(v) => (v, false, true, true),
        Gte(v) => (v, false, true, false),
        Lt(v) => (v, false, false, true),
        Lte(v) => (v, false, false, false),
        PrimaryGt(v) => (v, true, true, true),
        PrimaryGte(v) => (v, true, true, false),
        PrimaryLt(v) => (v, true, false, true),
        PrimaryLte(v) => (v, true, false, false),
        _ => unreachable!("range_start_slot is only called for range-tag drivers"),
    };
    let order = |a: &V, b: &V| if primary { cmp.primary_asc(a, b) } else { cmp.full_asc(a, b) };
    if forward {
        // gt starts just past the equal run; gte starts at its first slot.
        let bound = if strict {
            values.partition_point(|v| order(v, target) != Ordering::Greater)
        } else {
            values.partition_point(|v| order(v, target) == Ordering::Less)
        };
        bound as isize
    } else {
        // lte starts at the last slot of the equal run; lt starts just before it.
        let bound = if strict {
            values.partition_point(|v| order(v, target) == Ordering::Less)
        } else {
            values.partition_point(|v| order(v, target) != Ordering::Greater)
        };
        bound as isize - 1
    }
}

fn start_leaf<K, V, D, S>(
    source: &S,
    driver: Option<&Predicate<V>>,
    start_override: StartOverride,
) -> IxResult<Option<NodeId>>
where
    V: Clone,
    S: LeafSource<K, V, D>,
{
    match start_override {
        StartOverride::ForceRightmost => return source.rightmost_leaf(),
        StartOverride::ForceLeftmost => return source.leftmost_leaf(),
        StartOverride::Normal => {}
    }
    let Some(driver) = driver else {
        return source.leftmost_leaf();
    };
    match start_node_strategy(driver.tag()) {
        StartNodeStrategy::AtOrAfter | StartNodeStrategy::AtOrBefore => {
            match descent_target(driver, source.comparator()) {
                Some((target, mode)) => source.descend_to_leaf(&target, mode),
                None => source.leftmost_leaf(),
            }
        }
        StartNodeStrategy::Leftmost => source.leftmost_leaf(),
        StartNodeStrategy::Rightmost => source.rightmost_leaf(),
    }
}

/// Lazy `(K, V)` pair stream over one tree's leaf chain.
pub struct Scan<'a, K, V, D, S> {
    source: &'a S,
    comparator: &'a dyn Comparator<V>,
    driver: Option<Predicate<V>>,
    post_filter: Vec<Predicate<V>>,
    direction: i8,
    end_strategy: EndNodeStrategy,
    early_terminate: bool,
    leaf: Option<Node<K, V>>,
    slot_index: isize,
    bucket: VecDeque<K>,
    current_value: Option<V>,
    seen_match: bool,
    done: bool,
    limit: Option<usize>,
    yielded: usize,
    read_ahead: bool,
    _marker: PhantomData<D>,
}

impl<'a, K, V, D, S> Scan<'a, K, V, D, S>
where
    K: Clone + Ord,
    V: Clone,
    S: LeafSource<K, V, D>,
{
    pub fn new(source: &'a S, condition: &Condition<V>, order: Order, limit: Option<usize>) -> IxResult<Self> {
        let plan = plan_for(condition, order);
        let start = start_leaf(source, plan.driver.as_ref(), plan.start_override)?;
        let leaf = match start {
            Some(id) => Some(source.read_leaf(&id)?),
            None => None,
        };
        let slot_index = match (&leaf, &plan.driver) {
            (Some(node), Some(driver))
                if plan.start_override == StartOverride::Normal && is_range_tag(driver.tag()) =>
            {
                range_start_slot(&node.values, driver, source.comparator())
            }
            (Some(_), _) if plan.direction == 1 => 0,
            (Some(node), _) => node.value_count() as isize - 1,
            (None, _) => 0,
        };
        let done = leaf.is_none();
        Ok(Self {
            source,
            comparator: source.comparator(),
            driver: plan.driver,
            post_filter: plan.post_filter,
            direction: plan.direction,
            end_strategy: plan.end_strategy,
            early_terminate: plan.early_terminate,
            leaf,
            slot_index,
            bucket: VecDeque::new(),
            current_value: None,
            seen_match: false,
            done,
            limit,
            yielded: 0,
            read_ahead: source.read_ahead(),
            _marker: PhantomData,
        })
    }

    fn advance_slot(&mut self) -> IxResult<bool> {
        loop {
            let Some(leaf) = self.leaf.as_ref() else {
                return Ok(false);
            };
            let len = leaf.value_count() as isize;
            if self.slot_index >= 0 && self.slot_index < len {
                return Ok(true);
            }
            let next_id = if self.direction == 1 { leaf.next.clone() } else { leaf.prev.clone() };
            match next_id {
                Some(id) => {
                    let node = self.source.read_leaf(&id)?;
                    self.slot_index = if self.direction == 1 { 0 } else { node.value_count() as isize - 1 };
                    if self.read_ahead {
                        // Warm the cache for the leaf beyond this one so its
                        // read overlaps with this leaf's predicate
                        // evaluation instead of landing cold on the next
                        // `advance_slot` call. Prefetch failures are not
                        // scan errors; they just forgo the overlap.
                        let beyond_id = if self.direction == 1 { node.next.clone() } else { node.prev.clone() };
                        if let Some(beyond_id) = beyond_id {
                            let _ = self.source.read_leaf(&beyond_id);
                        }
                    }
                    self.leaf = Some(node);
                }
                None => {
                    self.leaf = None;
                    return Ok(false);
                }
            }
        }
    }

    fn fill_bucket(&mut self) -> IxResult<bool> {
        loop {
            if !self.advance_slot()? {
                return Ok(false);
            }
            let (value, bucket) = {
                let leaf = self.leaf.as_ref().expect("advance_slot guarantees a leaf");
                let index = self.slot_index as usize;
                (leaf.values[index].clone(), leaf.bucket(index).cloned().unwrap_or_default())
            };

            let driver_ok = match &self.driver {
                Some(predicate) => {
                    let mut patterns = self.source.patterns().borrow_mut();
                    predicate.verify(&value, self.comparator, &mut patterns)?
                }
                None => true,
            };

            if self.driver.is_some() {
                if !driver_ok {
                    if self.early_terminate && self.seen_match {
                        self.leaf = None;
                        return Ok(false);
                    }
                    if self.end_strategy == EndNodeStrategy::FirstMiss {
                        self.leaf = None;
                        return Ok(false);
                    }
                    self.step_slot();
                    continue;
                }
                self.seen_match = true;
            }

            let mut post_ok = true;
            for predicate in &self.post_filter {
                let mut patterns = self.source.patterns().borrow_mut();
                if !predicate.verify(&value, self.comparator, &mut patterns)? {
                    post_ok = false;
                    break;
                }
            }

            if !post_ok {
                self.step_slot();
                continue;
            }

            self.bucket = bucket.into_iter().collect();
            self.current_value = Some(value);
            self.step_slot();
            return Ok(true);
        }
    }

    fn step_slot(&mut self) {
        self.slot_index += self.direction as isize;
    }
}

impl<'a, K, V, D, S> Iterator for Scan<'a, K, V, D, S>
where
    K: Clone + Ord,
    V: Clone,
    S: LeafSource<K, V, D>,
{
    type Item = IxResult<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(limit) = self.limit {
            if self.yielded >= limit {
                self.done = true;
                return None;
            }
        }
        loop {
            if let Some(k) = self.bucket.pop_front() {
                let v = self.current_value.clone().expect("bucket implies current_value");
                self.yielded += 1;
                return Some(Ok((k, v)));
            }
            match self.fill_bucket() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
