//! Template AST: typed nodes with source positions and child ordinals.

use std::fmt;

use crate::expr::{self, EvalCtx, Expr, ExprError};
use crate::scope::{Scope, Value};

// ---------------------------------------------------------------------------
// Source positions
// ---------------------------------------------------------------------------

/// Position in template source. Line and column are 1-based; `offset` is the
/// byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl SourcePos {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

// ---------------------------------------------------------------------------
// Text with interpolation
// ---------------------------------------------------------------------------

/// One run of a text stretch or attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum TextRun {
    Literal(String),
    /// A `{{ ... }}` segment, parsed at template-parse time.
    Interp(Expr),
}

/// A text stretch or attribute value: literal and interpolation runs in
/// source order.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateText {
    pub runs: Vec<TextRun>,
}

impl TemplateText {
    /// A purely literal value.
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            runs: vec![TextRun::Literal(text.into())],
        }
    }

    /// The literal contents, if no interpolation is present.
    pub fn as_literal(&self) -> Option<&str> {
        match self.runs.as_slice() {
            [] => Some(""),
            [TextRun::Literal(s)] => Some(s),
            _ => None,
        }
    }

    /// Evaluate against a scope. A value that is a single interpolation run
    /// yields the evaluated value itself (so `"{{ items }}"` passes a list
    /// through); anything else concatenates the stringified runs.
    pub fn evaluate(&self, scope: &Scope, ctx: &EvalCtx<'_>) -> Result<Value, ExprError> {
        if let [TextRun::Interp(e)] = self.runs.as_slice() {
            return expr::eval(e, scope, ctx);
        }
        Ok(Value::Str(self.evaluate_to_string(scope, ctx)?))
    }

    /// Evaluate and stringify every run.
    pub fn evaluate_to_string(&self, scope: &Scope, ctx: &EvalCtx<'_>) -> Result<String, ExprError> {
        let mut out = String::new();
        for run in &self.runs {
            match run {
                TextRun::Literal(s) => out.push_str(s),
                TextRun::Interp(e) => {
                    let value = expr::eval(e, scope, ctx)?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Component paths
// ---------------------------------------------------------------------------

/// Fully qualified module path of a component or partial, e.g.
/// `Controls/buttons:Button`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentPath(String);

impl ComponentPath {
    /// Canonical path from a tag name: dots in the module part become
    /// slashes, the `:Member` suffix is kept. `Controls.buttons:Button`
    /// becomes `Controls/buttons:Button`; already-canonical paths pass
    /// through.
    pub fn from_tag(tag: &str) -> Self {
        let (module, member) = match tag.split_once(':') {
            Some((module, member)) => (module, Some(member)),
            None => (tag, None),
        };
        let module = module.replace('.', "/");
        match member {
            Some(member) => Self(format!("{module}:{member}")),
            None => Self(module),
        }
    }

    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A named attribute with its (possibly interpolated) value.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: TemplateText,
    pub pos: SourcePos,
}

/// One arm of an `else` chain. `condition: None` is the unconditional arm.
#[derive(Debug, Clone, PartialEq)]
pub struct ElseArm {
    pub condition: Option<Expr>,
    pub children: Vec<Node>,
}

/// Control-flow directive payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlowKind {
    If {
        condition: Expr,
        children: Vec<Node>,
        else_arms: Vec<ElseArm>,
    },
    For {
        /// Optional index binding from `index, item in source`.
        index_binding: Option<String>,
        item_binding: String,
        source: Expr,
        /// Explicit per-iteration key expression, if declared.
        key: Option<TemplateText>,
        children: Vec<Node>,
    },
}

/// A parsed template node. Every variant carries its source position and a
/// parent-relative ordinal assigned in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text {
        content: TemplateText,
        pos: SourcePos,
        ordinal: usize,
    },
    Element {
        tag: String,
        attributes: Vec<Attribute>,
        children: Vec<Node>,
        pos: SourcePos,
        ordinal: usize,
    },
    ComponentReference {
        path: ComponentPath,
        attributes: Vec<Attribute>,
        children: Vec<Node>,
        pos: SourcePos,
        ordinal: usize,
    },
    StaticPartialReference {
        /// The `template` attribute: a literal path or an expression that
        /// resolves to a path or content function at render time.
        template: TemplateText,
        attributes: Vec<Attribute>,
        children: Vec<Node>,
        pos: SourcePos,
        ordinal: usize,
    },
    Doctype {
        text: String,
        pos: SourcePos,
        ordinal: usize,
    },
    Cdata {
        text: String,
        pos: SourcePos,
        ordinal: usize,
    },
    Instruction {
        text: String,
        pos: SourcePos,
        ordinal: usize,
    },
    Comment {
        text: String,
        pos: SourcePos,
        ordinal: usize,
    },
    ControlFlow {
        kind: ControlFlowKind,
        pos: SourcePos,
        ordinal: usize,
    },
}

impl Node {
    pub fn pos(&self) -> SourcePos {
        match self {
            Node::Text { pos, .. }
            | Node::Element { pos, .. }
            | Node::ComponentReference { pos, .. }
            | Node::StaticPartialReference { pos, .. }
            | Node::Doctype { pos, .. }
            | Node::Cdata { pos, .. }
            | Node::Instruction { pos, .. }
            | Node::Comment { pos, .. }
            | Node::ControlFlow { pos, .. } => *pos,
        }
    }

    pub fn ordinal(&self) -> usize {
        match self {
            Node::Text { ordinal, .. }
            | Node::Element { ordinal, .. }
            | Node::ComponentReference { ordinal, .. }
            | Node::StaticPartialReference { ordinal, .. }
            | Node::Doctype { ordinal, .. }
            | Node::Cdata { ordinal, .. }
            | Node::Instruction { ordinal, .. }
            | Node::Comment { ordinal, .. }
            | Node::ControlFlow { ordinal, .. } => *ordinal,
        }
    }

    /// Whether this node carries rendering semantics. Doctype, CDATA,
    /// instruction and comment nodes do not; analysis and rendering skip
    /// them.
    pub fn is_semantic(&self) -> bool {
        !matches!(
            self,
            Node::Doctype { .. }
                | Node::Cdata { .. }
                | Node::Instruction { .. }
                | Node::Comment { .. }
        )
    }
}
