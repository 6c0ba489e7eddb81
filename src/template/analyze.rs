//! Static analysis over parsed templates.

use crate::template::ast::Node;

/// Name of the component a template resolves to, if the first meaningful
/// top-level node is a component or partial reference.
///
/// Doctypes, comments, CDATA sections and processing instructions are
/// skipped. A plain element or text node yields `None`.
pub fn top_level_component_name(nodes: &[Node]) -> Option<String> {
    let first = nodes.iter().find(|n| n.is_semantic())?;
    match first {
        Node::ComponentReference { path, .. } => Some(path.as_str().to_owned()),
        Node::StaticPartialReference { template, .. } => {
            template.as_literal().map(str::to_owned)
        }
        _ => None,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
