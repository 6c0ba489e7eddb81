//! Headless testing support: lifecycle probes and scope builders.
//!
//! Use a [`Probe`] together with [`RecordingComponent`] to observe the exact
//! order of lifecycle hooks a [`Runtime`](crate::runtime::Runtime) drives,
//! and [`options_of`]/[`scope_of`] to build option maps and scopes without
//! `BTreeMap` boilerplate in assertions.

pub mod probe;

pub use probe::{deferred_slot, DeferredSlot, Probe, RecordingComponent};

use crate::scope::{Options, Scope, Value};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Build an options map from name/value pairs.
///
/// # Examples
///
/// ```ignore
/// use weft_ui::testing::options_of;
/// use weft_ui::scope::Value;
///
/// let options = options_of(&[("title", Value::Str("hi".into()))]);
/// assert_eq!(options.len(), 1);
/// ```
pub fn options_of(entries: &[(&str, Value)]) -> Options {
    entries
        .iter()
        .map(|(name, value)| ((*name).to_owned(), value.clone()))
        .collect()
}

/// Build a single-layer scope from name/value pairs.
pub fn scope_of(entries: &[(&str, Value)]) -> Scope {
    Scope::from_map(options_of(entries))
}
