//! Rendered markup tree.
//!
//! [`MarkupNode`] is the product of rendering a compiled template against a
//! scope: plain text, elements with resolved attributes, and component
//! invocations with resolved options. Attributes live in a `BTreeMap`, so two
//! renders of the same template over the same scope compare equal and print
//! identically.

use std::collections::BTreeMap;
use std::fmt;

use crate::scope::{Options, Value};
use crate::template::ast::ComponentPath;
use crate::template::parser::VOID_ELEMENTS;

/// A node of rendered markup.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    /// A run of character data.
    Text(String),
    /// A markup element with resolved attribute values.
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        key: Option<String>,
        children: Vec<MarkupNode>,
    },
    /// A component invocation with resolved options.
    Component {
        path: ComponentPath,
        options: Options,
        key: Option<String>,
    },
}

impl MarkupNode {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn element(tag: impl Into<String>) -> Self {
        Self::Element {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            key: None,
            children: Vec::new(),
        }
    }

    pub fn component(path: ComponentPath, options: Options) -> Self {
        Self::Component {
            path,
            options,
            key: None,
        }
    }

    /// Builder-style attribute insertion. No-op on text and component nodes.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Element { attributes, .. } = &mut self {
            attributes.insert(name.into(), value.into());
        }
        self
    }

    /// Builder-style child append. No-op on text and component nodes.
    pub fn child(mut self, node: MarkupNode) -> Self {
        if let Self::Element { children, .. } = &mut self {
            children.push(node);
        }
        self
    }

    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        match &mut self {
            Self::Element { key: slot, .. } | Self::Component { key: slot, .. } => {
                *slot = Some(key.into());
            }
            Self::Text(_) => {}
        }
        self
    }

    /// Assign a key only where none exists. Used for loop-generated keys,
    /// which never override an explicit one.
    pub(crate) fn set_key_if_absent(&mut self, key: &str) {
        if let Self::Element { key: slot, .. } | Self::Component { key: slot, .. } = self {
            if slot.is_none() {
                *slot = Some(key.to_owned());
            }
        }
    }

    /// Reconciliation key, if one was assigned.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Element { key, .. } | Self::Component { key, .. } => key.as_deref(),
            Self::Text(_) => None,
        }
    }

    pub fn children(&self) -> &[MarkupNode] {
        match self {
            Self::Element { children, .. } => children,
            _ => &[],
        }
    }

    /// Serialize the subtree as HTML-shaped markup. Components print as
    /// `component` pseudo-tags so snapshots stay readable. Reconciliation
    /// keys are diffing metadata, not attributes, and never serialize.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Self::Text(content) => out.push_str(&escape_text(content)),
            Self::Element {
                tag,
                attributes,
                children,
                ..
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    write_attr(out, name, value);
                }
                if VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str()) {
                    out.push('>');
                    return;
                }
                out.push('>');
                for child in children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            Self::Component { path, options, .. } => {
                out.push_str("<component path=\"");
                out.push_str(&escape_attr(path.as_str()));
                out.push('"');
                for (name, value) in options {
                    write_attr(out, name, &format_option(value));
                }
                out.push_str("/>");
            }
        }
    }
}

impl fmt::Display for MarkupNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html())
    }
}

// ---------------------------------------------------------------------------
// Node paths
// ---------------------------------------------------------------------------

/// Address of a node inside a markup fragment: child indices from the root
/// list down. An empty path addresses the fragment itself and never names a
/// single node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodePath(pub Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Extend the path by one child index.
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn parent(&self) -> Option<Self> {
        let mut indices = self.0.clone();
        indices.pop().map(|_| Self(indices))
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Resolve the path against a fragment.
    pub fn get<'a>(&self, nodes: &'a [MarkupNode]) -> Option<&'a MarkupNode> {
        let (&first, rest) = self.0.split_first()?;
        let mut node = nodes.get(first)?;
        for &index in rest {
            node = node.children().get(index)?;
        }
        Some(node)
    }

    pub fn get_mut<'a>(&self, nodes: &'a mut [MarkupNode]) -> Option<&'a mut MarkupNode> {
        let (&first, rest) = self.0.split_first()?;
        let mut node = nodes.get_mut(first)?;
        for &index in rest {
            match node {
                MarkupNode::Element { children, .. } => node = children.get_mut(index)?,
                _ => return None,
            }
        }
        Some(node)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(root)");
        }
        let mut first = true;
        for index in &self.0 {
            if !first {
                f.write_str("/")?;
            }
            write!(f, "{index}")?;
            first = false;
        }
        Ok(())
    }
}

/// Serialize a rendered fragment, node by node.
pub fn fragment_to_html(nodes: &[MarkupNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        node.write_html(&mut out);
    }
    out
}

fn format_option(value: &Value) -> String {
    match value {
        Value::Func(_) => "[function]".to_owned(),
        other => other.to_string(),
    }
}

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_attr(value));
    out.push('"');
}

fn escape_text(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

// ===========================================================================
// Tests
// ===========================================================================
