//! Changed-option detection.
//!
//! Deciding whether a control must re-render walks three tiers per field,
//! cheapest first: version counters for the same shared cell, pointer
//! identity for functions and cells, then plain value equality. A field
//! present on only one side is always changed.

use std::collections::{BTreeMap, BTreeSet};

use crate::scope::{Options, Value};

/// Capture version counters for every shared-cell option. The snapshot is
/// compared against live counters on the next diff.
pub fn capture_versions(options: &Options) -> BTreeMap<String, u64> {
    let mut versions = BTreeMap::new();
    for (name, value) in options {
        if let Value::Shared(cell) = value {
            versions.insert(name.clone(), cell.version());
        }
    }
    versions
}

/// Names of options whose value changed between `prev` and `next`, given the
/// version snapshot captured when `prev` was committed.
pub fn diff_options(
    prev: &Options,
    next: &Options,
    versions: &BTreeMap<String, u64>,
) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();

    for (name, next_value) in next {
        let Some(prev_value) = prev.get(name) else {
            changed.insert(name.clone());
            continue;
        };
        if option_changed(name, prev_value, next_value, versions) {
            changed.insert(name.clone());
        }
    }
    for name in prev.keys() {
        if !next.contains_key(name) {
            changed.insert(name.clone());
        }
    }
    changed
}

fn option_changed(
    name: &str,
    prev: &Value,
    next: &Value,
    versions: &BTreeMap<String, u64>,
) -> bool {
    match (prev, next) {
        (Value::Shared(a), Value::Shared(b)) if a.ptr_eq(b) => {
            // Same cell on both sides: only the version counter can tell
            // whether it mutated since the snapshot.
            versions.get(name) != Some(&b.version())
        }
        (Value::Func(a), Value::Func(b)) => !a.ptr_eq(b),
        _ => prev != next,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{ContentFn, SharedValue};

    fn options_with(entries: &[(&str, Value)]) -> Options {
        let mut options = Options::new();
        for (k, v) in entries {
            options.insert((*k).to_owned(), v.clone());
        }
        options
    }

    #[test]
    fn test_value_change_detected() {
        let prev = options_with(&[("n", Value::Number(1.0))]);
        let next = options_with(&[("n", Value::Number(2.0))]);
        let changed = diff_options(&prev, &next, &BTreeMap::new());
        assert_eq!(changed, BTreeSet::from(["n".to_owned()]));
    }

    #[test]
    fn test_equal_options_are_unchanged() {
        let prev = options_with(&[("n", Value::Number(1.0)), ("s", Value::from("x"))]);
        let changed = diff_options(&prev, &prev.clone(), &capture_versions(&prev));
        assert!(changed.is_empty());
    }

    #[test]
    fn test_added_and_removed_fields_change() {
        let prev = options_with(&[("a", Value::Number(1.0))]);
        let next = options_with(&[("b", Value::Number(1.0))]);
        let changed = diff_options(&prev, &next, &BTreeMap::new());
        assert_eq!(changed, BTreeSet::from(["a".to_owned(), "b".to_owned()]));
    }

    #[test]
    fn test_same_cell_unchanged_when_version_matches() {
        let cell = SharedValue::new(Value::Number(1.0));
        let options = options_with(&[("cell", Value::Shared(cell))]);
        let versions = capture_versions(&options);
        assert!(diff_options(&options, &options.clone(), &versions).is_empty());
    }

    #[test]
    fn test_same_cell_changed_after_write() {
        let cell = SharedValue::new(Value::Number(1.0));
        let options = options_with(&[("cell", Value::Shared(cell.clone()))]);
        let versions = capture_versions(&options);
        cell.set(Value::Number(2.0));
        let changed = diff_options(&options, &options.clone(), &versions);
        assert_eq!(changed, BTreeSet::from(["cell".to_owned()]));
    }

    #[test]
    fn test_different_cells_compare_by_value() {
        let a = options_with(&[("cell", Value::Shared(SharedValue::new(Value::Number(1.0))))]);
        let b = options_with(&[("cell", Value::Shared(SharedValue::new(Value::Number(1.0))))]);
        assert!(diff_options(&a, &b, &capture_versions(&a)).is_empty());

        let c = options_with(&[("cell", Value::Shared(SharedValue::new(Value::Number(9.0))))]);
        assert_eq!(
            diff_options(&a, &c, &capture_versions(&a)),
            BTreeSet::from(["cell".to_owned()])
        );
    }

    #[test]
    fn test_functions_compare_by_identity() {
        let f = ContentFn::new(|_| Ok(Value::Null));
        let same = options_with(&[("cb", Value::Func(f.clone()))]);
        assert!(diff_options(&same, &same.clone(), &BTreeMap::new()).is_empty());

        let other = options_with(&[("cb", Value::Func(ContentFn::new(|_| Ok(Value::Null))))]);
        assert_eq!(
            diff_options(&same, &other, &BTreeMap::new()),
            BTreeSet::from(["cb".to_owned()])
        );
    }
}
