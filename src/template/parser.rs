//! Markup parser: lexemes to a well-formed [`Node`] tree.
//!
//! Every opened tag must close in reverse order; unmatched or mismatched
//! closers are malformed markup. Tags in the `w:` namespace are directives
//! (`w:if`, `w:else`, `w:for`, `w:partial`) except `w:option`, which stays an
//! element for the data-injection layer to consume. Tag names containing a
//! dot or colon are component references.
//!
//! Whitespace-only text between tags is dropped; any other text is kept
//! verbatim, split into literal and `{{ ... }}` interpolation runs.

use thiserror::Error;

use crate::expr::{self, Expr, ExprError};
use crate::template::ast::{
    Attribute, ComponentPath, ControlFlowKind, ElseArm, Node, SourcePos, TemplateText, TextRun,
};
use crate::template::tokenizer::{self, Lexeme, MarkupToken};

/// Tag name of typed option children consumed by data injection.
pub const OPTION_TAG: &str = "w:option";

/// Reserved directive namespace prefix.
pub const DIRECTIVE_PREFIX: &str = "w:";

/// Elements that never take children or a closing tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Template parse failure. Fatal: no partial tree is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unrecognized markup `{found}` at {pos}")]
    InvalidMarkup { found: String, pos: SourcePos },

    #[error("malformed markup at {pos}: {message}")]
    MalformedMarkup { message: String, pos: SourcePos },

    #[error("unterminated `{{{{` interpolation at {pos}")]
    UnterminatedInterpolation { pos: SourcePos },

    #[error("invalid expression at {pos}: {source}")]
    Expr {
        pos: SourcePos,
        #[source]
        source: ExprError,
    },

    #[error("invalid `{directive}` at {pos}: {message}")]
    BadDirective {
        directive: String,
        message: String,
        pos: SourcePos,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Parse template source into a list of top-level nodes.
///
/// Pure function: all diagnostics come back as [`ParseError`] values carrying
/// source positions.
pub fn parse(source: &str) -> Result<Vec<Node>, ParseError> {
    let lines = LineIndex::new(source);
    let lexemes = tokenizer::scan(source).map_err(|e| ParseError::InvalidMarkup {
        found: e.found,
        pos: lines.pos(e.offset),
    })?;

    let mut parser = TreeBuilder {
        lines: &lines,
        stack: Vec::new(),
        roots: Vec::new(),
    };
    for lexeme in lexemes {
        parser.feed(lexeme)?;
    }
    if let Some(frame) = parser.stack.last() {
        return Err(ParseError::MalformedMarkup {
            message: format!("unclosed element `<{}>`", frame.tag),
            pos: frame.pos,
        });
    }

    let mut roots = parser.roots;
    assign_ordinals(&mut roots);
    tracing::debug!(top_level = roots.len(), "template parsed");
    Ok(roots)
}

// ---------------------------------------------------------------------------
// Line index
// ---------------------------------------------------------------------------

/// Byte offset to 1-based line/column conversion.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    fn pos(&self, offset: usize) -> SourcePos {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        SourcePos {
            line: line as u32 + 1,
            column: (offset - self.line_starts[line]) as u32 + 1,
            offset,
        }
    }
}

// ---------------------------------------------------------------------------
// Tree building
// ---------------------------------------------------------------------------

/// An element opened but not yet closed.
struct OpenFrame {
    tag: String,
    attributes: Vec<Attribute>,
    pos: SourcePos,
    children: Vec<Node>,
}

/// Result of completing a tag: a regular node, or an else-arm to fold into
/// the preceding `w:if` sibling.
enum Built {
    Node(Node),
    Else(ElseArm, SourcePos),
}

struct TreeBuilder<'a> {
    lines: &'a LineIndex,
    stack: Vec<OpenFrame>,
    roots: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn feed(&mut self, lexeme: Lexeme) -> Result<(), ParseError> {
        let pos = self.lines.pos(lexeme.start);
        match lexeme.token {
            MarkupToken::Text => {
                if lexeme.text.trim().is_empty() {
                    return Ok(());
                }
                let content = parse_text_runs(&lexeme.text, lexeme.start, self.lines)?;
                self.attach(Built::Node(Node::Text {
                    content,
                    pos,
                    ordinal: 0,
                }))
            }
            MarkupToken::Comment => {
                let inner = lexeme
                    .text
                    .trim_start_matches("<!--")
                    .trim_end_matches("-->")
                    .to_owned();
                self.attach(Built::Node(Node::Comment {
                    text: inner,
                    pos,
                    ordinal: 0,
                }))
            }
            MarkupToken::Cdata => {
                let inner = lexeme
                    .text
                    .trim_start_matches("<![CDATA[")
                    .trim_end_matches("]]>")
                    .to_owned();
                self.attach(Built::Node(Node::Cdata {
                    text: inner,
                    pos,
                    ordinal: 0,
                }))
            }
            MarkupToken::Doctype => self.attach(Built::Node(Node::Doctype {
                text: lexeme.text,
                pos,
                ordinal: 0,
            })),
            MarkupToken::Instruction => self.attach(Built::Node(Node::Instruction {
                text: lexeme.text,
                pos,
                ordinal: 0,
            })),
            MarkupToken::OpenTag => {
                let (tag, attributes, self_closing) =
                    split_tag(&lexeme.text, lexeme.start, self.lines)?;
                let is_void = VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str());
                let frame = OpenFrame {
                    tag,
                    attributes,
                    pos,
                    children: Vec::new(),
                };
                if self_closing || is_void {
                    let built = build_node(frame)?;
                    self.attach(built)
                } else {
                    self.stack.push(frame);
                    Ok(())
                }
            }
            MarkupToken::CloseTag => {
                let name = lexeme
                    .text
                    .trim_start_matches("</")
                    .trim_end_matches('>')
                    .trim_end()
                    .to_owned();
                let Some(frame) = self.stack.pop() else {
                    return Err(ParseError::MalformedMarkup {
                        message: format!("unmatched closing tag `</{name}>`"),
                        pos,
                    });
                };
                if frame.tag != name {
                    return Err(ParseError::MalformedMarkup {
                        message: format!(
                            "mismatched closing tag `</{name}>`, expected `</{}>`",
                            frame.tag
                        ),
                        pos,
                    });
                }
                let built = build_node(frame)?;
                self.attach(built)
            }
        }
    }

    /// Attach a completed node to the innermost open element, or the root
    /// list. Else-arms fold into the directly preceding `w:if`.
    fn attach(&mut self, built: Built) -> Result<(), ParseError> {
        let children = match self.stack.last_mut() {
            Some(frame) => &mut frame.children,
            None => &mut self.roots,
        };
        match built {
            Built::Node(node) => {
                children.push(node);
                Ok(())
            }
            Built::Else(arm, pos) => {
                let target = children.last_mut().and_then(|node| match node {
                    Node::ControlFlow {
                        kind: ControlFlowKind::If { else_arms, .. },
                        ..
                    } => Some(else_arms),
                    _ => None,
                });
                let Some(else_arms) = target else {
                    return Err(ParseError::BadDirective {
                        directive: "w:else".to_owned(),
                        message: "must immediately follow `w:if` or a conditional `w:else`"
                            .to_owned(),
                        pos,
                    });
                };
                if else_arms.last().is_some_and(|a| a.condition.is_none()) {
                    return Err(ParseError::BadDirective {
                        directive: "w:else".to_owned(),
                        message: "cannot follow an unconditional `w:else`".to_owned(),
                        pos,
                    });
                }
                else_arms.push(arm);
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Node construction
// ---------------------------------------------------------------------------

fn build_node(frame: OpenFrame) -> Result<Built, ParseError> {
    let OpenFrame {
        tag,
        attributes,
        pos,
        children,
    } = frame;

    // `w:option` is not a directive and not a component: it stays a plain
    // element for injection to consume by name.
    if tag == OPTION_TAG {
        return Ok(Built::Node(Node::Element {
            tag,
            attributes,
            children,
            pos,
            ordinal: 0,
        }));
    }

    if tag.starts_with(DIRECTIVE_PREFIX) {
        return build_directive(&tag, attributes, children, pos);
    }

    if tag.contains('.') || tag.contains(':') {
        return Ok(Built::Node(Node::ComponentReference {
            path: ComponentPath::from_tag(&tag),
            attributes,
            children,
            pos,
            ordinal: 0,
        }));
    }

    Ok(Built::Node(Node::Element {
        tag,
        attributes,
        children,
        pos,
        ordinal: 0,
    }))
}

fn build_directive(
    tag: &str,
    mut attributes: Vec<Attribute>,
    children: Vec<Node>,
    pos: SourcePos,
) -> Result<Built, ParseError> {
    match tag {
        "w:if" => {
            let data = take_attribute(&mut attributes, "data").ok_or_else(|| bad_directive(
                tag,
                "missing `data` attribute",
                pos,
            ))?;
            reject_extra_attributes(tag, &attributes)?;
            let condition = attribute_expr(tag, &data)?;
            Ok(Built::Node(Node::ControlFlow {
                kind: ControlFlowKind::If {
                    condition,
                    children,
                    else_arms: Vec::new(),
                },
                pos,
                ordinal: 0,
            }))
        }
        "w:else" => {
            let condition = match take_attribute(&mut attributes, "data") {
                Some(data) => Some(attribute_expr(tag, &data)?),
                None => None,
            };
            reject_extra_attributes(tag, &attributes)?;
            Ok(Built::Else(
                ElseArm {
                    condition,
                    children,
                },
                pos,
            ))
        }
        "w:for" => {
            let data = take_attribute(&mut attributes, "data").ok_or_else(|| bad_directive(
                tag,
                "missing `data` attribute",
                pos,
            ))?;
            let key = take_attribute(&mut attributes, "key").map(|a| a.value);
            reject_extra_attributes(tag, &attributes)?;
            let Some(binding) = data.value.as_literal() else {
                return Err(bad_directive(
                    tag,
                    "`data` must be a literal `item in source` binding",
                    pos,
                ));
            };
            let (index_binding, item_binding, source) = parse_for_binding(binding)
                .ok_or_else(|| bad_directive(
                    tag,
                    "expected `item in source` or `index, item in source`",
                    pos,
                ))?;
            let source = expr::parse(&source).map_err(|source| ParseError::Expr {
                pos: data.pos,
                source,
            })?;
            Ok(Built::Node(Node::ControlFlow {
                kind: ControlFlowKind::For {
                    index_binding,
                    item_binding,
                    source,
                    key,
                    children,
                },
                pos,
                ordinal: 0,
            }))
        }
        "w:partial" => {
            let template = take_attribute(&mut attributes, "template").ok_or_else(|| {
                bad_directive(tag, "missing `template` attribute", pos)
            })?;
            Ok(Built::Node(Node::StaticPartialReference {
                template: template.value,
                attributes,
                children,
                pos,
                ordinal: 0,
            }))
        }
        other => Err(bad_directive(other, "unknown directive", pos)),
    }
}

fn bad_directive(tag: &str, message: &str, pos: SourcePos) -> ParseError {
    ParseError::BadDirective {
        directive: tag.to_owned(),
        message: message.to_owned(),
        pos,
    }
}

fn take_attribute(attributes: &mut Vec<Attribute>, name: &str) -> Option<Attribute> {
    let idx = attributes.iter().position(|a| a.name == name)?;
    Some(attributes.remove(idx))
}

fn reject_extra_attributes(tag: &str, attributes: &[Attribute]) -> Result<(), ParseError> {
    if let Some(extra) = attributes.first() {
        return Err(ParseError::BadDirective {
            directive: tag.to_owned(),
            message: format!("unexpected attribute `{}`", extra.name),
            pos: extra.pos,
        });
    }
    Ok(())
}

/// A directive condition: a single interpolation, or a bare literal parsed
/// as an expression.
fn attribute_expr(tag: &str, attr: &Attribute) -> Result<Expr, ParseError> {
    match attr.value.runs.as_slice() {
        [TextRun::Interp(e)] => Ok(e.clone()),
        [TextRun::Literal(s)] => expr::parse(s).map_err(|source| ParseError::Expr {
            pos: attr.pos,
            source,
        }),
        _ => Err(ParseError::BadDirective {
            directive: tag.to_owned(),
            message: format!("`{}` must be a single expression", attr.name),
            pos: attr.pos,
        }),
    }
}

/// Split `item in source` / `index, item in source`. Returns
/// `(index_binding, item_binding, source_text)`.
fn parse_for_binding(raw: &str) -> Option<(Option<String>, String, String)> {
    let (bindings, source) = raw.split_once(" in ")?;
    let source = source.trim();
    if source.is_empty() {
        return None;
    }
    let parts: Vec<&str> = bindings.split(',').map(str::trim).collect();
    let (index, item) = match parts.as_slice() {
        [item] => (None, *item),
        [index, item] => (Some(*index), *item),
        _ => return None,
    };
    if !is_ident(item) || !index.map_or(true, is_ident) {
        return None;
    }
    Some((
        index.map(str::to_owned),
        item.to_owned(),
        source.to_owned(),
    ))
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Tag interior
// ---------------------------------------------------------------------------

/// Split an open-tag lexeme into name, attributes and a self-closing flag.
fn split_tag(
    text: &str,
    start: usize,
    lines: &LineIndex,
) -> Result<(String, Vec<Attribute>, bool), ParseError> {
    // Strip `<` and `>`.
    let mut interior = &text[1..text.len() - 1];
    let mut self_closing = false;
    let trimmed = interior.trim_end();
    if trimmed.ends_with('/') {
        self_closing = true;
        interior = &trimmed[..trimmed.len() - 1];
    }

    let bytes = interior.as_bytes();
    let mut i = 0;
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    let tag = interior[..i].to_owned();
    let mut attributes = Vec::new();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let attr_start = i;
        while i < bytes.len() && is_name_byte(bytes[i]) {
            i += 1;
        }
        if i == attr_start {
            return Err(ParseError::MalformedMarkup {
                message: format!("bad attribute syntax near `{}`", &interior[i..]),
                pos: lines.pos(start + 1 + i),
            });
        }
        let name = interior[attr_start..i].to_owned();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        if i >= bytes.len() || bytes[i] != b'=' {
            // Boolean attribute with no value.
            attributes.push(Attribute {
                name,
                value: TemplateText::literal(""),
                pos: lines.pos(start + 1 + attr_start),
            });
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(ParseError::MalformedMarkup {
                message: format!("attribute `{name}` has no value"),
                pos: lines.pos(start + 1 + attr_start),
            });
        }

        let (raw_value, value_start) = match bytes[i] {
            quote @ (b'"' | b'\'') => {
                let open = i + 1;
                let mut j = open;
                while j < bytes.len() && bytes[j] != quote {
                    j += 1;
                }
                if j >= bytes.len() {
                    return Err(ParseError::MalformedMarkup {
                        message: format!("unterminated value for attribute `{name}`"),
                        pos: lines.pos(start + 1 + i),
                    });
                }
                i = j + 1;
                (&interior[open..j], open)
            }
            _ => {
                let open = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                (&interior[open..i], open)
            }
        };

        let value = parse_text_runs(raw_value, start + 1 + value_start, lines)?;
        attributes.push(Attribute {
            name,
            value,
            pos: lines.pos(start + 1 + attr_start),
        });
    }

    Ok((tag, attributes, self_closing))
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b':' | b'_' | b'-')
}

// ---------------------------------------------------------------------------
// Interpolation runs
// ---------------------------------------------------------------------------

/// Split raw text into literal and `{{ ... }}` interpolation runs.
fn parse_text_runs(
    raw: &str,
    start: usize,
    lines: &LineIndex,
) -> Result<TemplateText, ParseError> {
    let mut runs = Vec::new();
    let mut rest = raw;
    let mut consumed = 0;

    while let Some(open) = rest.find("{{") {
        if open > 0 {
            runs.push(TextRun::Literal(rest[..open].to_owned()));
        }
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Err(ParseError::UnterminatedInterpolation {
                pos: lines.pos(start + consumed + open),
            });
        };
        let inner = &after[..close];
        let expr = expr::parse(inner).map_err(|source| ParseError::Expr {
            pos: lines.pos(start + consumed + open),
            source,
        })?;
        runs.push(TextRun::Interp(expr));
        consumed += open + 2 + close + 2;
        rest = &rest[open + 2 + close + 2..];
    }
    if !rest.is_empty() {
        runs.push(TextRun::Literal(rest.to_owned()));
    }
    Ok(TemplateText { runs })
}

// ---------------------------------------------------------------------------
// Ordinals
// ---------------------------------------------------------------------------

/// Assign parent-relative ordinals in document order, recursing into every
/// child list, including control-flow arms.
fn assign_ordinals(nodes: &mut [Node]) {
    for (i, node) in nodes.iter_mut().enumerate() {
        match node {
            Node::Text { ordinal, .. }
            | Node::Doctype { ordinal, .. }
            | Node::Cdata { ordinal, .. }
            | Node::Instruction { ordinal, .. }
            | Node::Comment { ordinal, .. } => *ordinal = i,
            Node::Element {
                ordinal, children, ..
            }
            | Node::ComponentReference {
                ordinal, children, ..
            }
            | Node::StaticPartialReference {
                ordinal, children, ..
            } => {
                *ordinal = i;
                assign_ordinals(children);
            }
            Node::ControlFlow { ordinal, kind, .. } => {
                *ordinal = i;
                match kind {
                    ControlFlowKind::If {
                        children,
                        else_arms,
                        ..
                    } => {
                        assign_ordinals(children);
                        for arm in else_arms {
                            assign_ordinals(&mut arm.children);
                        }
                    }
                    ControlFlowKind::For { children, .. } => assign_ordinals(children),
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Value;

    fn parse_one(source: &str) -> Node {
        let mut nodes = parse(source).unwrap();
        assert_eq!(nodes.len(), 1, "expected one top-level node");
        nodes.remove(0)
    }

    // ── elements and text ────────────────────────────────────────────

    #[test]
    fn test_element_with_text_child() {
        let node = parse_one("<div>hello</div>");
        match node {
            Node::Element { tag, children, .. } => {
                assert_eq!(tag, "div");
                assert_eq!(children.len(), 1);
                match &children[0] {
                    Node::Text { content, .. } => {
                        assert_eq!(content.as_literal(), Some("hello"))
                    }
                    other => panic!("expected text child, got {other:?}"),
                }
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_elements_and_ordinals() {
        let node = parse_one("<ul><li>a</li><li>b</li></ul>");
        match node {
            Node::Element { children, .. } => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[0].ordinal(), 0);
                assert_eq!(children[1].ordinal(), 1);
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_whitespace_only_text_dropped() {
        let node = parse_one("<div>\n  <span>x</span>\n</div>");
        match node {
            Node::Element { children, .. } => assert_eq!(children.len(), 1),
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_attributes() {
        let node = parse_one(r#"<input class="big" disabled value='{{ v }}'/>"#);
        match node {
            Node::Element {
                tag, attributes, ..
            } => {
                assert_eq!(tag, "input");
                assert_eq!(attributes.len(), 3);
                assert_eq!(attributes[0].name, "class");
                assert_eq!(attributes[0].value.as_literal(), Some("big"));
                assert_eq!(attributes[1].name, "disabled");
                assert_eq!(attributes[1].value.as_literal(), Some(""));
                assert_eq!(attributes[2].name, "value");
                assert!(attributes[2].value.as_literal().is_none());
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_attribute_value() {
        let node = parse_one("<div id=main></div>");
        match node {
            Node::Element { attributes, .. } => {
                assert_eq!(attributes[0].value.as_literal(), Some("main"));
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_void_element_takes_no_children() {
        let nodes = parse("<br><span>x</span>").unwrap();
        assert_eq!(nodes.len(), 2);
        match &nodes[0] {
            Node::Element { tag, children, .. } => {
                assert_eq!(tag, "br");
                assert!(children.is_empty());
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_self_closing_element() {
        let node = parse_one("<widget attr=\"1\" />");
        match node {
            Node::Element { tag, children, .. } => {
                assert_eq!(tag, "widget");
                assert!(children.is_empty());
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    // ── well-formedness ──────────────────────────────────────────────

    #[test]
    fn test_mismatched_close_tag() {
        let err = parse("<div><span></div></span>").unwrap_err();
        match err {
            ParseError::MalformedMarkup { message, .. } => {
                assert!(message.contains("mismatched"), "{message}");
                assert!(message.contains("span"), "{message}");
            }
            other => panic!("expected MalformedMarkup, got {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_close_tag() {
        let err = parse("</div>").unwrap_err();
        assert!(matches!(err, ParseError::MalformedMarkup { .. }));
    }

    #[test]
    fn test_unclosed_element_at_eof() {
        let err = parse("<div><p>text").unwrap_err();
        match err {
            ParseError::MalformedMarkup { message, pos } => {
                assert!(message.contains("unclosed"), "{message}");
                assert!(message.contains('p'), "{message}");
                assert_eq!(pos.offset, 5);
            }
            other => panic!("expected MalformedMarkup, got {other:?}"),
        }
    }

    #[test]
    fn test_stray_angle_bracket() {
        let err = parse("<p>a < b</p>").unwrap_err();
        assert!(matches!(err, ParseError::InvalidMarkup { .. }));
    }

    // ── components and partials ──────────────────────────────────────

    #[test]
    fn test_component_reference_path() {
        let node = parse_one("<Controls.buttons:Button caption=\"Go\"/>");
        match node {
            Node::ComponentReference {
                path, attributes, ..
            } => {
                assert_eq!(path.as_str(), "Controls/buttons:Button");
                assert_eq!(attributes[0].name, "caption");
            }
            other => panic!("expected component reference, got {other:?}"),
        }
    }

    #[test]
    fn test_partial_reference() {
        let node = parse_one(r#"<w:partial template="App/list:Row" caption="x"/>"#);
        match node {
            Node::StaticPartialReference {
                template,
                attributes,
                ..
            } => {
                assert_eq!(template.as_literal(), Some("App/list:Row"));
                assert_eq!(attributes.len(), 1);
            }
            other => panic!("expected partial reference, got {other:?}"),
        }
    }

    #[test]
    fn test_partial_requires_template() {
        let err = parse("<w:partial/>").unwrap_err();
        assert!(matches!(err, ParseError::BadDirective { .. }));
    }

    #[test]
    fn test_option_tag_stays_an_element() {
        let node = parse_one(
            r#"<Controls.list:View><w:option name="caption" type="string">Hi</w:option></Controls.list:View>"#,
        );
        match node {
            Node::ComponentReference { children, .. } => match &children[0] {
                Node::Element { tag, .. } => assert_eq!(tag, OPTION_TAG),
                other => panic!("expected element child, got {other:?}"),
            },
            other => panic!("expected component reference, got {other:?}"),
        }
    }

    #[test]
    fn test_option_tag_is_never_a_component_reference() {
        // The colon in `w:option` must not route it down the component path.
        let node = parse_one(r#"<w:option name="x" type="number">5</w:option>"#);
        match node {
            Node::Element {
                tag, attributes, ..
            } => {
                assert_eq!(tag, OPTION_TAG);
                assert_eq!(attributes.len(), 2);
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    // ── directives ───────────────────────────────────────────────────

    #[test]
    fn test_if_directive() {
        let node = parse_one(r#"<w:if data="{{ count > 0 }}"><p>yes</p></w:if>"#);
        match node {
            Node::ControlFlow {
                kind: ControlFlowKind::If {
                    children,
                    else_arms,
                    ..
                },
                ..
            } => {
                assert_eq!(children.len(), 1);
                assert!(else_arms.is_empty());
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_else_chain_folds_into_if() {
        let source = r#"
            <w:if data="{{ n > 10 }}"><p>big</p></w:if>
            <w:else data="{{ n > 5 }}"><p>medium</p></w:else>
            <w:else><p>small</p></w:else>
        "#;
        let nodes = parse(source).unwrap();
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            Node::ControlFlow {
                kind: ControlFlowKind::If { else_arms, .. },
                ..
            } => {
                assert_eq!(else_arms.len(), 2);
                assert!(else_arms[0].condition.is_some());
                assert!(else_arms[1].condition.is_none());
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_else_without_if_fails() {
        let err = parse("<w:else><p>x</p></w:else>").unwrap_err();
        match err {
            ParseError::BadDirective { directive, .. } => assert_eq!(directive, "w:else"),
            other => panic!("expected BadDirective, got {other:?}"),
        }
    }

    #[test]
    fn test_else_after_unconditional_else_fails() {
        let source = r#"
            <w:if data="{{ a }}"><p>1</p></w:if>
            <w:else><p>2</p></w:else>
            <w:else><p>3</p></w:else>
        "#;
        assert!(matches!(
            parse(source).unwrap_err(),
            ParseError::BadDirective { .. }
        ));
    }

    #[test]
    fn test_for_directive_bindings() {
        let node = parse_one(r#"<w:for data="i, item in items"><p>{{ item }}</p></w:for>"#);
        match node {
            Node::ControlFlow {
                kind:
                    ControlFlowKind::For {
                        index_binding,
                        item_binding,
                        key,
                        ..
                    },
                ..
            } => {
                assert_eq!(index_binding.as_deref(), Some("i"));
                assert_eq!(item_binding, "item");
                assert!(key.is_none());
            }
            other => panic!("expected for, got {other:?}"),
        }
    }

    #[test]
    fn test_for_with_key() {
        let node = parse_one(r#"<w:for data="u in users" key="{{ u.id }}"><p/></w:for>"#);
        match node {
            Node::ControlFlow {
                kind: ControlFlowKind::For { key, .. },
                ..
            } => assert!(key.is_some()),
            other => panic!("expected for, got {other:?}"),
        }
    }

    #[test]
    fn test_for_bad_binding() {
        let err = parse(r#"<w:for data="1bad in items"><p/></w:for>"#).unwrap_err();
        assert!(matches!(err, ParseError::BadDirective { .. }));
    }

    #[test]
    fn test_if_rejects_stray_attributes() {
        let err = parse(r#"<w:if data="{{ a }}" extra="x"><p/></w:if>"#).unwrap_err();
        match err {
            ParseError::BadDirective { message, .. } => {
                assert!(message.contains("extra"), "{message}")
            }
            other => panic!("expected BadDirective, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_directive() {
        let err = parse("<w:repeat><p/></w:repeat>").unwrap_err();
        assert!(matches!(err, ParseError::BadDirective { .. }));
    }

    #[test]
    fn test_bare_condition_parses_as_expression() {
        let node = parse_one(r#"<w:if data="visible"><p/></w:if>"#);
        match node {
            Node::ControlFlow {
                kind: ControlFlowKind::If { condition, .. },
                ..
            } => assert_eq!(condition, Expr::Name("visible".to_owned())),
            other => panic!("expected if, got {other:?}"),
        }
    }

    // ── interpolation ────────────────────────────────────────────────

    #[test]
    fn test_text_interpolation_runs() {
        let node = parse_one("<p>hi {{ name }}!</p>");
        match node {
            Node::Element { children, .. } => match &children[0] {
                Node::Text { content, .. } => {
                    assert_eq!(content.runs.len(), 3);
                    assert_eq!(content.runs[0], TextRun::Literal("hi ".to_owned()));
                    assert!(matches!(content.runs[1], TextRun::Interp(_)));
                    assert_eq!(content.runs[2], TextRun::Literal("!".to_owned()));
                }
                other => panic!("expected text, got {other:?}"),
            },
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_interpolation() {
        let err = parse("<p>{{ name</p>").unwrap_err();
        assert!(matches!(err, ParseError::UnterminatedInterpolation { .. }));
    }

    #[test]
    fn test_bad_expression_carries_position() {
        let err = parse("<p>\n  {{ a ~ b }}</p>").unwrap_err();
        match err {
            ParseError::Expr { pos, .. } => {
                assert_eq!(pos.line, 2);
                assert_eq!(pos.column, 3);
            }
            other => panic!("expected Expr error, got {other:?}"),
        }
    }

    #[test]
    fn test_attribute_expression_value() {
        let node = parse_one(r#"<w:if data="{{ flag }}"><p/></w:if>"#);
        match node {
            Node::ControlFlow {
                kind: ControlFlowKind::If { condition, .. },
                ..
            } => assert_eq!(condition, Expr::Name("flag".to_owned())),
            other => panic!("expected if, got {other:?}"),
        }
    }

    // ── non-semantic nodes ───────────────────────────────────────────

    #[test]
    fn test_comment_and_doctype_kept_as_nodes() {
        let nodes = parse("<!DOCTYPE html><!-- note --><div/>").unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(matches!(nodes[0], Node::Doctype { .. }));
        match &nodes[1] {
            Node::Comment { text, .. } => assert_eq!(text, " note "),
            other => panic!("expected comment, got {other:?}"),
        }
        assert!(!nodes[0].is_semantic());
        assert!(!nodes[1].is_semantic());
        assert!(nodes[2].is_semantic());
    }

    #[test]
    fn test_cdata_inner_text() {
        let nodes = parse("<![CDATA[<raw>]]>").unwrap();
        match &nodes[0] {
            Node::Cdata { text, .. } => assert_eq!(text, "<raw>"),
            other => panic!("expected cdata, got {other:?}"),
        }
    }

    // ── positions ────────────────────────────────────────────────────

    #[test]
    fn test_positions_are_line_and_column() {
        let nodes = parse("<div>\n  <span>x</span>\n</div>").unwrap();
        match &nodes[0] {
            Node::Element { children, pos, .. } => {
                assert_eq!(pos.line, 1);
                assert_eq!(pos.column, 1);
                assert_eq!(children[0].pos().line, 2);
                assert_eq!(children[0].pos().column, 3);
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_pure_function_same_result() {
        let source = r#"<div a="1"><w:if data="{{ x }}"><p>{{ x }}</p></w:if></div>"#;
        assert_eq!(parse(source).unwrap(), parse(source).unwrap());
    }

    // ── evaluation smoke test through parsed runs ────────────────────

    #[test]
    fn test_parsed_runs_evaluate() {
        let node = parse_one("<p>{{ 1 + 2 }}</p>");
        match node {
            Node::Element { children, .. } => match &children[0] {
                Node::Text { content, .. } => {
                    let scope = crate::scope::Scope::new();
                    let ctx = crate::expr::EvalCtx::default();
                    assert_eq!(content.evaluate(&scope, &ctx).unwrap(), Value::Number(3.0));
                }
                other => panic!("expected text, got {other:?}"),
            },
            other => panic!("expected element, got {other:?}"),
        }
    }
}
