//! Patch operations produced by reconciliation.
//!
//! Invariants:
//! - Ops are applied strictly in order; each op addresses the tree as it
//!   exists after every preceding op was applied.
//! - A path must resolve at the time its op is applied; a dangling path is
//!   a [`PatchError`], never a silent skip.
//! - One diff pass yields a self-contained stream for the transition
//!   `previous -> next`; applying it to `previous` reproduces `next`.
//! - Structural ops for a child list precede content ops addressed through
//!   that list.
//! - Component nodes are opaque here: they enter a stream whole and are
//!   expanded by the runtime, never patched field by field.

use thiserror::Error;

use crate::markup::{MarkupNode, NodePath};

/// A single tree mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Insert a fresh, empty element at `path`.
    CreateElement {
        path: NodePath,
        tag: String,
        key: Option<String>,
    },
    /// Insert a fresh text node at `path`.
    CreateText { path: NodePath, content: String },
    /// Overwrite the content of the text node at `path`.
    SetText { path: NodePath, content: String },
    /// Set one attribute of the element at `path`.
    SetAttribute {
        path: NodePath,
        name: String,
        value: String,
    },
    /// Remove one attribute of the element at `path`.
    RemoveAttribute { path: NodePath, name: String },
    /// Insert a complete prebuilt subtree at `path`.
    InsertChild { path: NodePath, node: MarkupNode },
    /// Reorder within the child list addressed by `parent`.
    MoveChild {
        parent: NodePath,
        from: usize,
        to: usize,
    },
    /// Remove the node at `path` from its parent's child list.
    RemoveNode { path: NodePath },
    /// Swap the node at `path` for a prebuilt subtree.
    ReplaceNode { path: NodePath, node: MarkupNode },
}

impl PatchOp {
    /// True for ops that change list structure rather than node content.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::CreateElement { .. }
                | Self::CreateText { .. }
                | Self::InsertChild { .. }
                | Self::MoveChild { .. }
                | Self::RemoveNode { .. }
                | Self::ReplaceNode { .. }
        )
    }
}

/// Patch application failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatchError {
    #[error("no node at {path}")]
    BadPath { path: NodePath },

    #[error("node at {path} is not {expected}")]
    WrongKind {
        path: NodePath,
        expected: &'static str,
    },

    #[error("index {index} out of bounds for child list at {parent} (len {len})")]
    BadIndex {
        parent: NodePath,
        index: usize,
        len: usize,
    },
}

/// Apply a patch stream to a fragment, in order.
pub fn apply(nodes: &mut Vec<MarkupNode>, ops: &[PatchOp]) -> Result<(), PatchError> {
    for op in ops {
        apply_one(nodes, op)?;
    }
    Ok(())
}

fn apply_one(nodes: &mut Vec<MarkupNode>, op: &PatchOp) -> Result<(), PatchError> {
    match op {
        PatchOp::CreateElement { path, tag, key } => {
            let mut node = MarkupNode::element(tag.clone());
            if let Some(key) = key {
                node = node.keyed(key.clone());
            }
            insert_at(nodes, path, node)
        }
        PatchOp::CreateText { path, content } => {
            insert_at(nodes, path, MarkupNode::Text(content.clone()))
        }
        PatchOp::SetText { path, content } => match resolve_mut(nodes, path)? {
            MarkupNode::Text(slot) => {
                *slot = content.clone();
                Ok(())
            }
            _ => Err(PatchError::WrongKind {
                path: path.clone(),
                expected: "a text node",
            }),
        },
        PatchOp::SetAttribute { path, name, value } => match resolve_mut(nodes, path)? {
            MarkupNode::Element { attributes, .. } => {
                attributes.insert(name.clone(), value.clone());
                Ok(())
            }
            _ => Err(PatchError::WrongKind {
                path: path.clone(),
                expected: "an element",
            }),
        },
        PatchOp::RemoveAttribute { path, name } => match resolve_mut(nodes, path)? {
            MarkupNode::Element { attributes, .. } => {
                attributes.remove(name);
                Ok(())
            }
            _ => Err(PatchError::WrongKind {
                path: path.clone(),
                expected: "an element",
            }),
        },
        PatchOp::InsertChild { path, node } => insert_at(nodes, path, node.clone()),
        PatchOp::MoveChild { parent, from, to } => {
            let list = child_list_mut(nodes, parent)?;
            let len = list.len();
            if *from >= len || *to >= len {
                return Err(PatchError::BadIndex {
                    parent: parent.clone(),
                    index: (*from).max(*to),
                    len,
                });
            }
            let node = list.remove(*from);
            list.insert(*to, node);
            Ok(())
        }
        PatchOp::RemoveNode { path } => {
            let (parent, index) = split_last(path)?;
            let list = child_list_mut(nodes, &parent)?;
            if index >= list.len() {
                return Err(PatchError::BadIndex {
                    parent,
                    index,
                    len: list.len(),
                });
            }
            list.remove(index);
            Ok(())
        }
        PatchOp::ReplaceNode { path, node } => {
            *resolve_mut(nodes, path)? = node.clone();
            Ok(())
        }
    }
}

fn insert_at(
    nodes: &mut Vec<MarkupNode>,
    path: &NodePath,
    node: MarkupNode,
) -> Result<(), PatchError> {
    let (parent, index) = split_last(path)?;
    let list = child_list_mut(nodes, &parent)?;
    if index > list.len() {
        return Err(PatchError::BadIndex {
            parent,
            index,
            len: list.len(),
        });
    }
    list.insert(index, node);
    Ok(())
}

fn split_last(path: &NodePath) -> Result<(NodePath, usize), PatchError> {
    match (path.parent(), path.0.last()) {
        (Some(parent), Some(&index)) => Ok((parent, index)),
        _ => Err(PatchError::BadPath { path: path.clone() }),
    }
}

/// The child list addressed by `parent`: the fragment itself for the root
/// path, else the children of the element at `parent`.
fn child_list_mut<'a>(
    nodes: &'a mut Vec<MarkupNode>,
    parent: &NodePath,
) -> Result<&'a mut Vec<MarkupNode>, PatchError> {
    if parent.0.is_empty() {
        return Ok(nodes);
    }
    match resolve_mut(nodes, parent)? {
        MarkupNode::Element { children, .. } => Ok(children),
        _ => Err(PatchError::WrongKind {
            path: parent.clone(),
            expected: "an element",
        }),
    }
}

fn resolve_mut<'a>(
    nodes: &'a mut [MarkupNode],
    path: &NodePath,
) -> Result<&'a mut MarkupNode, PatchError> {
    path.get_mut(nodes)
        .ok_or_else(|| PatchError::BadPath { path: path.clone() })
}

// ===========================================================================
// Tests
// ===========================================================================
