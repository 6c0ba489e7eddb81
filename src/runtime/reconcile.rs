//! Tree diffing.
//!
//! [`diff`] compares two rendered fragments and emits the patch stream that
//! turns the first into the second. Children with explicit keys match by
//! key; the rest match positionally among themselves. A matched pair with
//! the same element tag is patched in place; anything else is replaced
//! whole.
//!
//! Two component nodes with the same path and equal options produce no ops.
//! With the same path but different options they produce a `ReplaceNode`,
//! which the runtime intercepts as a child update rather than a remount.

use std::collections::HashMap;

use crate::markup::{MarkupNode, NodePath};
use crate::runtime::patch::PatchOp;

/// Diff two fragments rooted at the same parent.
pub fn diff(prev: &[MarkupNode], next: &[MarkupNode]) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    diff_children(prev, next, &NodePath::root(), &mut ops);
    ops
}

/// Diff two fragments addressed from `base`, appending to `ops`.
pub fn diff_fragment(
    prev: &[MarkupNode],
    next: &[MarkupNode],
    base: &NodePath,
    ops: &mut Vec<PatchOp>,
) {
    diff_children(prev, next, base, ops);
}

// ---------------------------------------------------------------------------
// Child lists
// ---------------------------------------------------------------------------

/// Occupant of a child slot while structural ops are being simulated.
#[derive(Clone, Copy, PartialEq)]
enum Slot {
    Old(usize),
    New,
}

fn diff_children(
    prev: &[MarkupNode],
    next: &[MarkupNode],
    base: &NodePath,
    ops: &mut Vec<PatchOp>,
) {
    if prev == next {
        return;
    }

    // Pair children: by key where both sides have one, positionally for the
    // unkeyed remainder.
    let mut old_match: Vec<Option<usize>> = vec![None; prev.len()];
    let mut new_match: Vec<Option<usize>> = vec![None; next.len()];

    let mut old_keys: HashMap<&str, usize> = HashMap::new();
    for (i, node) in prev.iter().enumerate() {
        if let Some(key) = node.key() {
            old_keys.entry(key).or_insert(i);
        }
    }
    for (j, node) in next.iter().enumerate() {
        if let Some(key) = node.key() {
            if let Some(&i) = old_keys.get(key) {
                if old_match[i].is_none() {
                    old_match[i] = Some(j);
                    new_match[j] = Some(i);
                }
            }
        }
    }
    let mut unkeyed_old = prev
        .iter()
        .enumerate()
        .filter(|(_, n)| n.key().is_none())
        .map(|(i, _)| i);
    for (j, node) in next.iter().enumerate() {
        if node.key().is_none() {
            if let Some(i) = unkeyed_old.next() {
                old_match[i] = Some(j);
                new_match[j] = Some(i);
            }
        }
    }

    // Remove unmatched old children, highest index first so earlier
    // positions stay valid.
    let mut working: Vec<Slot> = Vec::with_capacity(prev.len());
    for i in 0..prev.len() {
        working.push(Slot::Old(i));
    }
    for i in (0..prev.len()).rev() {
        if old_match[i].is_none() {
            ops.push(PatchOp::RemoveNode {
                path: base.child(i),
            });
            working.remove(i);
        }
    }

    // Settle each target position in order: move a surviving child into
    // place or create the new one.
    for (j, node) in next.iter().enumerate() {
        match new_match[j] {
            Some(old_index) => {
                let current = working
                    .iter()
                    .position(|slot| *slot == Slot::Old(old_index))
                    .unwrap_or(j);
                if current != j {
                    ops.push(PatchOp::MoveChild {
                        parent: base.clone(),
                        from: current,
                        to: j,
                    });
                    let slot = working.remove(current);
                    working.insert(j, slot);
                }
            }
            None => {
                emit_create(node, &base.child(j), ops);
                working.insert(j, Slot::New);
            }
        }
    }

    // Content diffs run against final positions.
    for (j, node) in next.iter().enumerate() {
        if let Some(old_index) = new_match[j] {
            diff_node(&prev[old_index], node, &base.child(j), ops);
        }
    }
}

// ---------------------------------------------------------------------------
// Node pairs
// ---------------------------------------------------------------------------

fn diff_node(prev: &MarkupNode, next: &MarkupNode, path: &NodePath, ops: &mut Vec<PatchOp>) {
    match (prev, next) {
        (MarkupNode::Text(a), MarkupNode::Text(b)) => {
            if a != b {
                ops.push(PatchOp::SetText {
                    path: path.clone(),
                    content: b.clone(),
                });
            }
        }
        (
            MarkupNode::Element {
                tag: prev_tag,
                attributes: prev_attrs,
                children: prev_children,
                ..
            },
            MarkupNode::Element {
                tag: next_tag,
                attributes: next_attrs,
                children: next_children,
                ..
            },
        ) if prev_tag == next_tag => {
            for (name, value) in next_attrs {
                if prev_attrs.get(name) != Some(value) {
                    ops.push(PatchOp::SetAttribute {
                        path: path.clone(),
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
            }
            for name in prev_attrs.keys() {
                if !next_attrs.contains_key(name) {
                    ops.push(PatchOp::RemoveAttribute {
                        path: path.clone(),
                        name: name.clone(),
                    });
                }
            }
            diff_children(prev_children, next_children, path, ops);
        }
        (
            MarkupNode::Component {
                path: prev_target,
                options: prev_options,
                ..
            },
            MarkupNode::Component {
                path: next_target,
                options: next_options,
                ..
            },
        ) if prev_target == next_target && prev_options == next_options => {}
        _ => ops.push(PatchOp::ReplaceNode {
            path: path.clone(),
            node: next.clone(),
        }),
    }
}

/// Emit creation ops for a new subtree: elements decompose into create and
/// attribute ops, components enter whole.
fn emit_create(node: &MarkupNode, path: &NodePath, ops: &mut Vec<PatchOp>) {
    match node {
        MarkupNode::Text(content) => ops.push(PatchOp::CreateText {
            path: path.clone(),
            content: content.clone(),
        }),
        MarkupNode::Element {
            tag,
            attributes,
            key,
            children,
        } => {
            ops.push(PatchOp::CreateElement {
                path: path.clone(),
                tag: tag.clone(),
                key: key.clone(),
            });
            for (name, value) in attributes {
                ops.push(PatchOp::SetAttribute {
                    path: path.clone(),
                    name: name.clone(),
                    value: value.clone(),
                });
            }
            for (i, child) in children.iter().enumerate() {
                emit_create(child, &path.child(i), ops);
            }
        }
        MarkupNode::Component { .. } => ops.push(PatchOp::InsertChild {
            path: path.clone(),
            node: node.clone(),
        }),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
