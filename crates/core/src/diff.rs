// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attribute diffing between a cached entry and its refetched state.
//!
//! An attribute counts as changed iff the multiset of its values differs;
//! value order is not significant. Absent vs. present is a change. The
//! comparison is octet-exact: matching-rule-aware folding belongs to filter
//! evaluation, not to diffing.

use crate::entry::Entry;

/// The sorted set of attribute names whose values differ between `old` and
/// `new`. Either side may be absent (entry creation / deletion).
pub fn changed_attributes(old: Option<&Entry>, new: Option<&Entry>) -> Vec<String> {
    let mut changed = Vec::new();
    let empty = [];
    let old_names: Vec<&str> = old.map(|e| e.attribute_names().collect()).unwrap_or_default();
    let new_names: Vec<&str> = new.map(|e| e.attribute_names().collect()).unwrap_or_default();

    // Both name lists are sorted (BTreeMap order); merge them.
    let mut names: Vec<&str> = old_names.iter().chain(new_names.iter()).copied().collect();
    names.sort_unstable();
    names.dedup();

    for name in names {
        let old_values = old.and_then(|e| e.get(name)).unwrap_or(&empty);
        let new_values = new.and_then(|e| e.get(name)).unwrap_or(&empty);
        if !same_multiset(old_values, new_values) {
            changed.push(name.to_string());
        }
    }
    changed
}

fn same_multiset(a: &[Vec<u8>], b: &[Vec<u8>]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a_sorted: Vec<&Vec<u8>> = a.iter().collect();
    let mut b_sorted: Vec<&Vec<u8>> = b.iter().collect();
    a_sorted.sort_unstable();
    b_sorted.sort_unstable();
    a_sorted == b_sorted
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
