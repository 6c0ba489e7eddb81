//! Typed data injection.
//!
//! Component and partial invocations receive their options through typed
//! option tags (`<w:option name="..." type="...">`). Each [`DataType`]
//! resolves a tag's children against the current scope with its own
//! algorithm; untyped options default to [`DataType::Object`]. Restricted
//! resolution snapshots values so no live shared cell leaks across a
//! component boundary.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::expr::{EvalCtx, ExprError};
use crate::scope::{ContentFn, Options, Scope, Value};
use crate::template::ast::{Attribute, Node, SourcePos};
use crate::template::parser::OPTION_TAG;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Typed-data descriptor carried by an option tag's `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    Array,
    Object,
    Function,
    Number,
    Boolean,
    Value,
}

impl DataType {
    /// Case-insensitive lookup. `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            "function" => Some(Self::Function),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "value" => Some(Self::Value),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
            Self::Function => "function",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Value => "value",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Injection failure while resolving typed options.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InjectError {
    #[error("unknown data type `{name}` at {pos}")]
    UnknownDataType { name: String, pos: SourcePos },

    #[error("option tag at {pos} has no `name` attribute")]
    MissingName { pos: SourcePos },

    #[error("cannot coerce {found} value to {wanted} at {pos}")]
    Coercion {
        wanted: DataType,
        found: String,
        pos: SourcePos,
    },

    #[error("evaluation failed at {pos}: {source}")]
    Evaluation {
        pos: SourcePos,
        #[source]
        source: ExprError,
    },
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve one option tag to a [`Value`].
///
/// `restricted` forces by-value semantics: the resolved value is deep-copied
/// out of any shared cells before it is returned.
pub fn resolve(
    node: &Node,
    scope: &Scope,
    restricted: bool,
    eval: EvalCtx<'_>,
) -> Result<Value, InjectError> {
    let Node::Element {
        attributes,
        children,
        ..
    } = node
    else {
        tracing::debug!(node = ?node.pos(), "non-element node ignored during injection");
        return Ok(Value::Null);
    };

    let dtype = match find_attribute(attributes, "type") {
        Some(attr) => {
            let name = evaluate_to_string(&attr.value, attr.pos, scope, eval)?;
            DataType::from_name(&name).ok_or(InjectError::UnknownDataType {
                name,
                pos: attr.pos,
            })?
        }
        None => DataType::Object,
    };

    let value = match dtype {
        DataType::String => Value::Str(combine_text(children, scope, eval)?),
        DataType::Value => match first_text(children) {
            Some((content, pos)) => evaluate(content, pos, scope, eval)?,
            None => Value::Null,
        },
        DataType::Number => match first_text(children) {
            Some((content, text_pos)) => {
                let raw = evaluate(content, text_pos, scope, eval)?;
                match raw.as_number() {
                    Some(n) => Value::Number(n),
                    None => {
                        return Err(InjectError::Coercion {
                            wanted: DataType::Number,
                            found: raw.kind().to_owned(),
                            pos: text_pos,
                        })
                    }
                }
            }
            None => Value::Null,
        },
        DataType::Boolean => match first_text(children) {
            Some((content, text_pos)) => {
                let raw = evaluate(content, text_pos, scope, eval)?;
                match raw.as_bool() {
                    Some(b) => Value::Bool(b),
                    None => {
                        return Err(InjectError::Coercion {
                            wanted: DataType::Boolean,
                            found: raw.kind().to_owned(),
                            pos: text_pos,
                        })
                    }
                }
            }
            None => Value::Null,
        },
        DataType::Array => {
            let mut items = Vec::new();
            for child in children.iter().filter(|c| c.is_semantic()) {
                match child {
                    Node::Text { content, pos, .. } => {
                        items.push(evaluate(content, *pos, scope, eval)?)
                    }
                    Node::Element { .. } => items.push(resolve(child, scope, false, eval)?),
                    other => {
                        tracing::debug!(pos = %other.pos(), "array item ignored");
                    }
                }
            }
            Value::List(items)
        }
        DataType::Object => object_value(attributes, children, scope, eval)?,
        DataType::Function => capture_function(children.clone(), scope, eval),
    };

    if restricted {
        return Ok(value.to_plain());
    }
    Ok(value)
}

/// Assemble the full option map for a component or partial invocation:
/// literal attributes, typed option children, and a `content` function
/// capturing any remaining markup children.
///
/// The `key` attribute is reserved for reconciliation and never becomes an
/// option.
pub fn component_options(
    attributes: &[Attribute],
    children: &[Node],
    scope: &Scope,
    restricted: bool,
    eval: EvalCtx<'_>,
) -> Result<Options, InjectError> {
    let mut options = Options::new();

    for attr in attributes {
        if attr.name == "key" {
            continue;
        }
        let ctx = EvalCtx {
            property_name: Some(&attr.name),
            ..eval
        };
        let value = attr
            .value
            .evaluate(scope, &ctx)
            .map_err(|source| InjectError::Evaluation {
                pos: attr.pos,
                source,
            })?;
        options.insert(attr.name.clone(), value);
    }

    let mut content: Vec<Node> = Vec::new();
    for child in children {
        if !child.is_semantic() {
            continue;
        }
        if let Node::Element {
            tag, attributes, ..
        } = child
        {
            if tag == OPTION_TAG {
                let name = option_name(attributes, child.pos(), scope, eval)?;
                let ctx = EvalCtx {
                    property_name: Some(&name),
                    ..eval
                };
                let value = resolve(child, scope, false, ctx)?;
                options.insert(name, value);
                continue;
            }
        }
        content.push(child.clone());
    }
    if !content.is_empty() {
        options.insert("content".to_owned(), capture_function(content, scope, eval));
    }

    if restricted {
        for value in options.values_mut() {
            *value = value.to_plain();
        }
    }
    Ok(options)
}

// ---------------------------------------------------------------------------
// Per-type helpers
// ---------------------------------------------------------------------------

/// String combination: evaluated text children concatenated in order.
/// Non-text children are never evaluated.
fn combine_text(
    children: &[Node],
    scope: &Scope,
    eval: EvalCtx<'_>,
) -> Result<String, InjectError> {
    let mut out = String::new();
    for child in children {
        if let Node::Text { content, pos, .. } = child {
            out.push_str(&evaluate_to_string(content, *pos, scope, eval)?);
        }
    }
    Ok(out)
}

/// First text child, if any. Children after it are never inspected.
fn first_text(children: &[Node]) -> Option<(&crate::template::ast::TemplateText, SourcePos)> {
    children.iter().find_map(|child| match child {
        Node::Text { content, pos, .. } => Some((content, *pos)),
        _ => None,
    })
}

fn object_value(
    attributes: &[Attribute],
    children: &[Node],
    scope: &Scope,
    eval: EvalCtx<'_>,
) -> Result<Value, InjectError> {
    let mut map = BTreeMap::new();
    for attr in attributes {
        if attr.name == "name" || attr.name == "type" {
            continue;
        }
        let ctx = EvalCtx {
            property_name: Some(&attr.name),
            ..eval
        };
        let value = attr
            .value
            .evaluate(scope, &ctx)
            .map_err(|source| InjectError::Evaluation {
                pos: attr.pos,
                source,
            })?;
        map.insert(attr.name.clone(), value);
    }
    for child in children {
        match child {
            Node::Element {
                tag, attributes, ..
            } if tag == OPTION_TAG => {
                let name = option_name(attributes, child.pos(), scope, eval)?;
                let ctx = EvalCtx {
                    property_name: Some(&name),
                    ..eval
                };
                let value = resolve(child, scope, false, ctx)?;
                map.insert(name, value);
            }
            Node::Text { .. } => {}
            other if other.is_semantic() => {
                tracing::debug!(pos = %other.pos(), "object entry ignored");
            }
            _ => {}
        }
    }
    Ok(Value::Map(map))
}

/// Function capture: the child subtree and the defining scope are moved into
/// a [`ContentFn`]. Invocation layers call arguments over the captured scope
/// and runs string combination over the captured children.
fn capture_function(children: Vec<Node>, scope: &Scope, eval: EvalCtx<'_>) -> Value {
    let captured = scope.clone();
    let is_control = eval.is_control;
    let root_config = eval.root_config;
    Value::Func(ContentFn::new(move |args: Options| {
        let call_scope = captured.child(args);
        let ctx = EvalCtx {
            is_control,
            root_config,
            property_name: None,
        };
        let text = combine_text(&children, &call_scope, ctx)?;
        Ok(Value::Str(text))
    }))
}

fn option_name(
    attributes: &[Attribute],
    pos: SourcePos,
    scope: &Scope,
    eval: EvalCtx<'_>,
) -> Result<String, InjectError> {
    let attr = find_attribute(attributes, "name").ok_or(InjectError::MissingName { pos })?;
    let name = evaluate_to_string(&attr.value, attr.pos, scope, eval)?;
    if name.is_empty() {
        return Err(InjectError::MissingName { pos });
    }
    Ok(name)
}

fn find_attribute<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|a| a.name == name)
}

fn evaluate(
    content: &crate::template::ast::TemplateText,
    pos: SourcePos,
    scope: &Scope,
    eval: EvalCtx<'_>,
) -> Result<Value, InjectError> {
    content
        .evaluate(scope, &eval)
        .map_err(|source| InjectError::Evaluation { pos, source })
}

fn evaluate_to_string(
    content: &crate::template::ast::TemplateText,
    pos: SourcePos,
    scope: &Scope,
    eval: EvalCtx<'_>,
) -> Result<String, InjectError> {
    content
        .evaluate_to_string(scope, &eval)
        .map_err(|source| InjectError::Evaluation { pos, source })
}

// ===========================================================================
// Tests
// ===========================================================================
