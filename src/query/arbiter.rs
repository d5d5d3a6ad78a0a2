// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Multi-tree arbiter (C8): picks which of several candidate driver
//! predicates should actually drive a query that spans more than one
//! index.

use super::condition::Condition;
use super::dispatch::condition_priority;

/// Chooses the best driver among `candidates` by the maximum
/// [`condition_priority`] over each candidate's own predicates (`spec.md`
/// §4.6 "Cross-tree arbitration" / §4.8), breaking ties in favor of the
/// earliest candidate. Returns `None` if `candidates` is empty.
///
/// Takes the conditions themselves rather than a pre-reduced driver tag per
/// candidate: a condition's precedence driver (the single tag
/// [`Condition::predicates`] would pick to drive its own scan) and its
/// highest-priority predicate are different reductions over the same tag
/// set. For `{like, or}`, the precedence driver is `like` (priority 30) but
/// the required arbitration score is `or`'s 80 — scoring the precedence
/// driver alone would pick the wrong candidate whenever the two diverge.
pub fn choose_driver<V: Clone>(candidates: &[&Condition<V>]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .map(|(index, condition)| {
            let score = condition
                .predicates()
                .iter()
                .map(|predicate| condition_priority(predicate.tag()))
                .max()
                .unwrap_or(0);
            (index, score)
        })
        .max_by_key(|&(index, score)| (score, std::cmp::Reverse(index)))
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_candidates_has_no_driver() {
        let candidates: Vec<&Condition<i32>> = Vec::new();
        assert_eq!(choose_driver(&candidates), None);
    }

    #[test]
    fn picks_highest_priority_candidate() {
        let not_eq = Condition::new().not_equal(1);
        let eq = Condition::new().equal(2);
        let like = Condition::new().like("a%");
        let candidates = [&not_eq, &eq, &like];
        assert_eq!(choose_driver(&candidates), Some(1));
    }

    #[test]
    fn ties_break_to_first_candidate() {
        let a = Condition::new().equal(1);
        let b = Condition::new().primary_equal(2);
        let candidates = [&a, &b];
        assert_eq!(choose_driver(&candidates), Some(0));
    }

    #[test]
    fn scores_by_max_priority_predicate_not_precedence_driver() {
        let like_or = Condition::new().like("a%").or(vec![1, 2]);
        let gt = Condition::new().gt(5);
        let candidates = [&like_or, &gt];
        assert_eq!(choose_driver(&candidates), Some(0));
    }
}
