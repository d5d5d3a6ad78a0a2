// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Cooperative mirror of [`crate::query::executor`].
//!
//! `AsyncScan` is a manual async iterator (an inherent `next()` method)
//! rather than a `futures::Stream` implementation. A `Stream` impl would
//! need to pin a boxed future across `.await` points inside `next`, which
//! buys nothing here since every caller already awaits `next()` directly;
//! picking it anyway would just add a dependency surface for no gain.

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

/// Cooperative counterpart of [`crate::query::executor::LeafSource`].
pub trait AsyncLeafSource<K, V, D> {
    fn comparator(&self) -> &dyn Comparator<V>;

    fn patterns(&self) -> &RefCell<PatternCache>;

    fn leftmost_leaf(&self) -> impl std::future::Future<Output = IxResult<Option<NodeId>>> + Send;

    fn rightmost_leaf(&self) -> impl std::future::Future<Output = IxResult<Option<NodeId>>> + Send;

    fn descend_to_leaf(
        &self,
        target: &V,
        mode: DescentMode,
    ) -> impl std::future::Future<Output = IxResult<Option<NodeId>>> + Send;

    fn read_leaf(&self, id: &NodeId) -> impl std::future::Future<Output = IxResult<Node<K, V>>> + Send;

    /// Whether the scan should eagerly fetch the next-direction leaf while
    /// still processing the current one; see
    /// `executor::LeafSource::read_ahead`. Defaults to `true`.
    fn read_ahead(&self) -> bool {
        true
    }
}

/// Cooperative counterpart of `executor::StartOverride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartOverride {
    Normal,
    ForceRightmost,
    ForceLeftmost,
}

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

fn descent_target<V: Clone>(driver: &Predicate<V>, cmp: &dyn Comparator<V>) -> Option<(V, DescentMode)> {
    use Predicate::*;
    match driver {
        Equal(v) | NotEqual(v) | Gt(v) | Gte(v) | Lt(v) => Some((v.clone(), DescentMode::Insertion)),
        Lte(v) => Some((v.clone(), DescentMode::RightmostPrimary)),
        PrimaryEqual(v) | PrimaryNotEqual(v) | PrimaryGt(v) | PrimaryGte(v) | PrimaryLt(v) => {
            Some((v.clone(), DescentMode::PrimaryOnly))
        }
        PrimaryLte(v) => Some((v.clone(), DescentMode::RightmostPrimary)),
        Or(args) => lowest_arg(args, cmp, false).map(|v| (v, DescentMode::Insertion)),
        PrimaryOr(args) => lowest_arg(args, cmp, true).map(|v| (v, DescentMode::PrimaryOnly)),
        Like(_) => None,
    }
}

fn lowest_arg<V: Clone>(args: &[V], cmp: &dyn Comparator<V>, primary: bool) -> Option<V> {
    args.iter()
        .cloned()
        .min_by(|a, b| if primary { cmp.primary_asc(a, b) } else { cmp.full_asc(a, b) })
}

/// Whether `tag` is one of the eight range comparisons; see
/// `executor::is_range_tag`.
fn is_range_tag(tag: Tag) -> bool {
    matches!(
        tag,
        Tag::Gt | Tag::Gte | Tag::Lt | Tag::Lte | Tag::PrimaryGt | Tag::PrimaryGte | Tag::PrimaryLt | Tag::PrimaryLte
    )
}

/// Cooperative mirror of `executor::range_start_slot`.
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
        let bound = if strict {
            values.partition_point(|v| order(v, target) != Ordering::Greater)
        } else {
            values.partition_point(|v| order(v, target) == Ordering::Less)
        };
        bound as isize
    } else {
        let bound = if strict {
            values.partition_point(|v| order(v, target) == Ordering::Less)
        } else {
            values.partition_point(|v| order(v, target) != Ordering::Greater)
        };
        bound as isize - 1
    }
}

async fn start_leaf<K, V, D, S>(
    source: &S,
    driver: Option<&Predicate<V>>,
    start_override: StartOverride,
) -> IxResult<Option<NodeId>>
where
    V: Clone,
    S: AsyncLeafSource<K, V, D>,
{
    match start_override {
        StartOverride::ForceRightmost => return source.rightmost_leaf().await,
        StartOverride::ForceLeftmost => return source.leftmost_leaf().await,
        StartOverride::Normal => {}
    }
    let Some(driver) = driver else {
        return source.leftmost_leaf().await;
    };
    match start_node_strategy(driver.tag()) {
        StartNodeStrategy::AtOrAfter | StartNodeStrategy::AtOrBefore => {
            match descent_target(driver, source.comparator()) {
                Some((target, mode)) => source.descend_to_leaf(&target, mode).await,
                None => source.leftmost_leaf().await,
            }
        }
        StartNodeStrategy::Leftmost => source.leftmost_leaf().await,
        StartNodeStrategy::Rightmost => source.rightmost_leaf().await,
    }
}

/// Cooperative mirror of [`crate::query::executor::Scan`]. Call
/// [`AsyncScan::next`] in a loop (typically `while let Some(pair) =
/// scan.next().await`); there is no `Stream` impl, see the module doc.
pub struct AsyncScan<'a, K, V, D, S> {
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

impl<'a, K, V, D, S> AsyncScan<'a, K, V, D, S>
where
    K: Clone + Ord,
    V: Clone,
    S: AsyncLeafSource<K, V, D>,
{
    pub async fn new(source: &'a S, condition: &Condition<V>, order: Order, limit: Option<usize>) -> IxResult<Self> {
        let plan = plan_for(condition, order);
        let start = start_leaf(source, plan.driver.as_ref(), plan.start_override).await?;
        let leaf = match start {
            Some(id) => Some(source.read_leaf(&id).await?),
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

    async fn advance_slot(&mut self) -> IxResult<bool> {
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
                    let node = self.source.read_leaf(&id).await?;
                    self.slot_index = if self.direction == 1 { 0 } else { node.value_count() as isize - 1 };
                    if self.read_ahead {
                        // Warm the cache for the leaf beyond this one so its
                        // read overlaps with this leaf's predicate
                        // evaluation instead of landing cold on the next
                        // `advance_slot` call. Prefetch failures are not
                        // scan errors; they just forgo the overlap.
                        let beyond_id = if self.direction == 1 { node.next.clone() } else { node.prev.clone() };
                        if let Some(beyond_id) = beyond_id {
                            let _ = self.source.read_leaf(&beyond_id).await;
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

    async fn fill_bucket(&mut self) -> IxResult<bool> {
        loop {
            if !self.advance_slot().await? {
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

    /// Advances the scan and returns the next pair, or `None` when the
    /// scan is exhausted.
    pub async fn next(&mut self) -> Option<IxResult<(K, V)>> {
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
            match self.fill_bucket().await {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::NaturalComparator;
    use crate::node::NodeKeys;
    use std::collections::BTreeSet;
    use std::collections::HashMap;

    /// Cooperative counterpart of `executor`'s `FixedChain`: a fixed
    /// two-leaf chain used to exercise `AsyncScan` without a full `AsyncTree`.
    struct FixedChain {
        leaves: HashMap<NodeId, Node<String, i32>>,
        head: NodeId,
        tail: NodeId,
        comparator: NaturalComparator,
        patterns: RefCell<PatternCache>,
    }

    impl FixedChain {
        fn new() -> Self {
            let mut left = Node::new_leaf("left".into(), None);
            left.values = vec![1, 2, 3];
            left.keys = vec![
                NodeKeys::Bucket(BTreeSet::from(["a".to_string()])),
                NodeKeys::Bucket(BTreeSet::from(["b".to_string()])),
                NodeKeys::Bucket(BTreeSet::from(["c".to_string()])),
            ];
            left.next = Some("right".into());

            let mut right = Node::new_leaf("right".into(), None);
            right.values = vec![4, 5, 6];
            right.keys = vec![
                NodeKeys::Bucket(BTreeSet::from(["d".to_string()])),
                NodeKeys::Bucket(BTreeSet::from(["e".to_string()])),
                NodeKeys::Bucket(BTreeSet::from(["f".to_string()])),
            ];
            right.prev = Some("left".into());

            let mut leaves = HashMap::new();
            leaves.insert("left".to_string(), left);
            leaves.insert("right".to_string(), right);

            Self {
                leaves,
                head: "left".into(),
                tail: "right".into(),
                comparator: NaturalComparator,
                patterns: RefCell::new(PatternCache::new(16)),
            }
        }
    }

    impl AsyncLeafSource<String, i32, ()> for FixedChain {
        fn comparator(&self) -> &dyn Comparator<i32> {
            &self.comparator
        }

        fn patterns(&self) -> &RefCell<PatternCache> {
            &self.patterns
        }

        async fn leftmost_leaf(&self) -> IxResult<Option<NodeId>> {
            Ok(Some(self.head.clone()))
        }

        async fn rightmost_leaf(&self) -> IxResult<Option<NodeId>> {
            Ok(Some(self.tail.clone()))
        }

        async fn descend_to_leaf(&self, target: &i32, _mode: DescentMode) -> IxResult<Option<NodeId>> {
            if *target <= 3 {
                Ok(Some(self.head.clone()))
            } else {
                Ok(Some(self.tail.clone()))
            }
        }

        async fn read_leaf(&self, id: &NodeId) -> IxResult<Node<String, i32>> {
            Ok(self.leaves.get(id).cloned().expect("known leaf"))
        }
    }

    async fn collect(mut scan: AsyncScan<'_, String, i32, (), FixedChain>) -> Vec<(String, i32)> {
        let mut out = Vec::new();
        while let Some(pair) = scan.next().await {
            out.push(pair.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn equal_yields_single_pair() {
        let chain = FixedChain::new();
        let condition = Condition::new().equal(5);
        let scan = AsyncScan::new(&chain, &condition, Order::Asc, None).await.unwrap();
        assert_eq!(collect(scan).await, vec![("e".to_string(), 5)]);
    }

    #[tokio::test]
    async fn gte_scans_forward_to_chain_end() {
        let chain = FixedChain::new();
        let condition = Condition::new().gte(4);
        let scan = AsyncScan::new(&chain, &condition, Order::Asc, None).await.unwrap();
        let values: Vec<i32> = collect(scan).await.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn gt_skips_the_equal_run_within_the_landed_leaf() {
        // Regression guard: without `range_start_slot`, a `FirstMiss`-ended
        // driver starting at slot 0 of the landed leaf would bail out on
        // the first (non-matching) value instead of finding 4, 5, 6.
        let chain = FixedChain::new();
        let condition = Condition::new().gt(3);
        let scan = AsyncScan::new(&chain, &condition, Order::Asc, None).await.unwrap();
        let values: Vec<i32> = collect(scan).await.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn lt_scans_backward() {
        let chain = FixedChain::new();
        let condition = Condition::new().lt(3);
        let scan = AsyncScan::new(&chain, &condition, Order::Asc, None).await.unwrap();
        let values: Vec<i32> = collect(scan).await.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![2, 1]);
    }

    #[tokio::test]
    async fn desc_order_reverses_the_sequence() {
        let chain = FixedChain::new();
        let condition = Condition::new().gte(4);
        let scan = AsyncScan::new(&chain, &condition, Order::Desc, None).await.unwrap();
        let values: Vec<i32> = collect(scan).await.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![6, 5, 4]);
    }

    #[tokio::test]
    async fn limit_bounds_result_count() {
        let chain = FixedChain::new();
        let condition: Condition<i32> = Condition::new();
        let scan = AsyncScan::new(&chain, &condition, Order::Asc, Some(2)).await.unwrap();
        let values: Vec<i32> = collect(scan).await.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[tokio::test]
    async fn post_filter_narrows_driver_match() {
        let chain = FixedChain::new();
        let condition = Condition::new().gte(1).lt(3);
        let scan = AsyncScan::new(&chain, &condition, Order::Asc, None).await.unwrap();
        let values: Vec<i32> = collect(scan).await.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![1, 2]);
    }
}
