//! Template compilation and rendering.
//!
//! [`compile`] lowers a parsed AST into an op tree; [`Template::render`]
//! interprets that tree against a [`Scope`] and produces markup. Option
//! resolution for components happens at render time, when the scope is
//! known. A `Template` is cheap to clone: the compiled program is shared
//! behind an `Rc`.

use std::collections::BTreeMap;
use std::rc::Rc;

use thiserror::Error;

use crate::expr::{self, EvalCtx, Expr, ExprError};
use crate::inject::{self, InjectError};
use crate::markup::MarkupNode;
use crate::scope::{Scope, Value};
use crate::template::ast::{
    Attribute, ComponentPath, ControlFlowKind, Node, SourcePos, TemplateText,
};
use crate::template::parser::{self, ParseError, OPTION_TAG};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Compilation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("`{OPTION_TAG}` at {pos} is only valid inside a component or partial invocation")]
    MisplacedOption { pos: SourcePos },
}

/// Rendering failure. Rendering is all-or-nothing: no partial markup tree
/// escapes an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("expression failed at {pos}: {source}")]
    Expr {
        pos: SourcePos,
        #[source]
        source: ExprError,
    },

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error("cannot iterate {kind} value at {pos}")]
    NotIterable { kind: String, pos: SourcePos },

    #[error("partial target at {pos} resolved to an empty string")]
    EmptyPartialTarget { pos: SourcePos },

    #[error("unknown component `{path}`")]
    UnknownComponent { path: String },

    #[error("component `{path}` failed: {message}")]
    RenderFailure { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Knobs threaded through compilation into render-time evaluation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Template name for diagnostics and registry lookups.
    pub name: Option<String>,
    /// Marks the template as rendering a root configuration surface.
    pub root_config: bool,
    /// Marks the template as a component's own body.
    pub is_control: bool,
}

impl CompileOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// A compiled template. Immutable; rendering never mutates the program, so
/// one compilation can be rendered any number of times.
#[derive(Debug, Clone)]
pub struct Template {
    program: Rc<Program>,
}

#[derive(Debug)]
struct Program {
    name: Option<String>,
    root_config: bool,
    is_control: bool,
    ops: Vec<Op>,
}

#[derive(Debug)]
enum Op {
    Text {
        content: TemplateText,
        pos: SourcePos,
    },
    Element {
        tag: String,
        attributes: Vec<Attribute>,
        key: Option<Attribute>,
        children: Vec<Op>,
        pos: SourcePos,
    },
    /// Options resolve from the raw attribute and child nodes at render
    /// time, through the injection layer.
    Component {
        path: ComponentPath,
        attributes: Vec<Attribute>,
        children: Vec<Node>,
    },
    Partial {
        template: TemplateText,
        attributes: Vec<Attribute>,
        children: Vec<Node>,
        pos: SourcePos,
    },
    If {
        condition: Expr,
        then_ops: Vec<Op>,
        else_arms: Vec<(Option<Expr>, Vec<Op>)>,
        pos: SourcePos,
    },
    For {
        index_binding: Option<String>,
        item_binding: String,
        source: Expr,
        key: Option<TemplateText>,
        body: Vec<Op>,
        pos: SourcePos,
    },
}

/// Compile parsed nodes into a [`Template`].
pub fn compile(nodes: &[Node], options: CompileOptions) -> Result<Template, CompileError> {
    let ops = compile_nodes(nodes)?;
    tracing::debug!(name = options.name.as_deref(), ops = ops.len(), "template compiled");
    Ok(Template {
        program: Rc::new(Program {
            name: options.name,
            root_config: options.root_config,
            is_control: options.is_control,
            ops,
        }),
    })
}

/// Parse and compile in one step.
pub fn compile_source(source: &str, options: CompileOptions) -> Result<Template, CompileError> {
    let nodes = parser::parse(source)?;
    compile(&nodes, options)
}

fn compile_nodes(nodes: &[Node]) -> Result<Vec<Op>, CompileError> {
    let mut ops = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let Some(op) = compile_node(node)? {
            ops.push(op);
        }
    }
    Ok(ops)
}

/// Doctypes, comments, CDATA sections and processing instructions carry no
/// runtime meaning and compile to nothing.
fn compile_node(node: &Node) -> Result<Option<Op>, CompileError> {
    match node {
        Node::Text { content, pos, .. } => Ok(Some(Op::Text {
            content: content.clone(),
            pos: *pos,
        })),
        Node::Element {
            tag,
            attributes,
            children,
            pos,
            ..
        } => {
            if tag == OPTION_TAG {
                return Err(CompileError::MisplacedOption { pos: *pos });
            }
            let mut attributes = attributes.clone();
            let key = attributes
                .iter()
                .position(|a| a.name == "key")
                .map(|i| attributes.remove(i));
            Ok(Some(Op::Element {
                tag: tag.clone(),
                attributes,
                key,
                children: compile_nodes(children)?,
                pos: *pos,
            }))
        }
        Node::ComponentReference {
            path,
            attributes,
            children,
            ..
        } => Ok(Some(Op::Component {
            path: path.clone(),
            attributes: attributes.clone(),
            children: children.clone(),
        })),
        Node::StaticPartialReference {
            template,
            attributes,
            children,
            pos,
            ..
        } => Ok(Some(Op::Partial {
            template: template.clone(),
            attributes: attributes.clone(),
            children: children.clone(),
            pos: *pos,
        })),
        Node::ControlFlow { kind, pos, .. } => match kind {
            ControlFlowKind::If {
                condition,
                children,
                else_arms,
            } => {
                let mut arms = Vec::with_capacity(else_arms.len());
                for arm in else_arms {
                    arms.push((arm.condition.clone(), compile_nodes(&arm.children)?));
                }
                Ok(Some(Op::If {
                    condition: condition.clone(),
                    then_ops: compile_nodes(children)?,
                    else_arms: arms,
                    pos: *pos,
                }))
            }
            ControlFlowKind::For {
                index_binding,
                item_binding,
                source,
                key,
                children,
            } => Ok(Some(Op::For {
                index_binding: index_binding.clone(),
                item_binding: item_binding.clone(),
                source: source.clone(),
                key: key.clone(),
                body: compile_nodes(children)?,
                pos: *pos,
            })),
        },
        Node::Doctype { .. }
        | Node::Cdata { .. }
        | Node::Instruction { .. }
        | Node::Comment { .. } => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

impl Template {
    pub fn name(&self) -> Option<&str> {
        self.program.name.as_deref()
    }

    /// Render against a scope. Rendering the same program over value-equal
    /// scopes yields structurally equal trees.
    pub fn render(&self, scope: &Scope) -> Result<Vec<MarkupNode>, RenderError> {
        let ctx = EvalCtx {
            is_control: self.program.is_control,
            root_config: self.program.root_config,
            property_name: None,
        };
        let mut out = Vec::new();
        render_ops(&self.program.ops, scope, ctx, &mut out)?;
        Ok(out)
    }
}

fn render_ops(
    ops: &[Op],
    scope: &Scope,
    ctx: EvalCtx<'_>,
    out: &mut Vec<MarkupNode>,
) -> Result<(), RenderError> {
    for op in ops {
        render_op(op, scope, ctx, out)?;
    }
    Ok(())
}

fn render_op(
    op: &Op,
    scope: &Scope,
    ctx: EvalCtx<'_>,
    out: &mut Vec<MarkupNode>,
) -> Result<(), RenderError> {
    match op {
        Op::Text { content, pos } => {
            let text = content
                .evaluate_to_string(scope, &ctx)
                .map_err(|source| RenderError::Expr { pos: *pos, source })?;
            // Interpolations can collapse to nothing; empty text emits no node.
            if !text.is_empty() {
                out.push(MarkupNode::Text(text));
            }
            Ok(())
        }
        Op::Element {
            tag,
            attributes,
            key,
            children,
            ..
        } => {
            let mut resolved = BTreeMap::new();
            for attr in attributes {
                let attr_ctx = EvalCtx {
                    property_name: Some(&attr.name),
                    ..ctx
                };
                let value = attr
                    .value
                    .evaluate_to_string(scope, &attr_ctx)
                    .map_err(|source| RenderError::Expr {
                        pos: attr.pos,
                        source,
                    })?;
                resolved.insert(attr.name.clone(), value);
            }
            let key = match key {
                Some(attr) => Some(attr.value.evaluate_to_string(scope, &ctx).map_err(
                    |source| RenderError::Expr {
                        pos: attr.pos,
                        source,
                    },
                )?),
                None => None,
            };
            let mut rendered_children = Vec::new();
            render_ops(children, scope, ctx, &mut rendered_children)?;
            out.push(MarkupNode::Element {
                tag: tag.clone(),
                attributes: resolved,
                key,
                children: rendered_children,
            });
            Ok(())
        }
        Op::Component {
            path,
            attributes,
            children,
        } => {
            out.push(render_invocation(path.clone(), attributes, children, scope, ctx)?);
            Ok(())
        }
        Op::Partial {
            template,
            attributes,
            children,
            pos,
        } => {
            let target = template
                .evaluate_to_string(scope, &ctx)
                .map_err(|source| RenderError::Expr { pos: *pos, source })?;
            if target.is_empty() {
                return Err(RenderError::EmptyPartialTarget { pos: *pos });
            }
            out.push(render_invocation(
                ComponentPath::new(target),
                attributes,
                children,
                scope,
                ctx,
            )?);
            Ok(())
        }
        Op::If {
            condition,
            then_ops,
            else_arms,
            pos,
        } => {
            let test = expr::eval(condition, scope, &ctx)
                .map_err(|source| RenderError::Expr { pos: *pos, source })?;
            if test.is_truthy() {
                return render_ops(then_ops, scope, ctx, out);
            }
            for (arm_condition, arm_ops) in else_arms {
                let taken = match arm_condition {
                    Some(c) => expr::eval(c, scope, &ctx)
                        .map_err(|source| RenderError::Expr { pos: *pos, source })?
                        .is_truthy(),
                    None => true,
                };
                if taken {
                    return render_ops(arm_ops, scope, ctx, out);
                }
            }
            Ok(())
        }
        Op::For {
            index_binding,
            item_binding,
            source,
            key,
            body,
            pos,
        } => {
            let value = expr::eval(source, scope, &ctx)
                .map_err(|source| RenderError::Expr { pos: *pos, source })?;
            let items = iterable_items(&value).ok_or_else(|| RenderError::NotIterable {
                kind: value.kind().to_owned(),
                pos: *pos,
            })?;

            for (i, item) in items.into_iter().enumerate() {
                let mut layer = BTreeMap::new();
                layer.insert(item_binding.clone(), item);
                if let Some(index) = index_binding {
                    layer.insert(index.clone(), Value::Number(i as f64));
                }
                let iter_scope = scope.child(layer);

                let start = out.len();
                render_ops(body, &iter_scope, ctx, out)?;

                if let Some(key_template) = key {
                    let key_value = key_template
                        .evaluate_to_string(&iter_scope, &ctx)
                        .map_err(|source| RenderError::Expr { pos: *pos, source })?;
                    for node in &mut out[start..] {
                        node.set_key_if_absent(&key_value);
                    }
                }
            }
            Ok(())
        }
    }
}

fn render_invocation(
    path: ComponentPath,
    attributes: &[Attribute],
    children: &[Node],
    scope: &Scope,
    ctx: EvalCtx<'_>,
) -> Result<MarkupNode, RenderError> {
    // Options cross a component boundary by value.
    let options = inject::component_options(attributes, children, scope, true, ctx)?;
    let key = match attributes.iter().find(|a| a.name == "key") {
        Some(attr) => Some(attr.value.evaluate_to_string(scope, &ctx).map_err(
            |source| RenderError::Expr {
                pos: attr.pos,
                source,
            },
        )?),
        None => None,
    };
    Ok(MarkupNode::Component { path, options, key })
}

/// Values a loop can walk: lists, shared cells holding lists, and maps
/// (iterated over values in key order).
fn iterable_items(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::List(items) => Some(items.clone()),
        Value::Map(map) => Some(map.values().cloned().collect()),
        Value::Shared(cell) => match cell.get() {
            Value::List(items) => Some(items),
            Value::Map(map) => Some(map.values().cloned().collect()),
            _ => None,
        },
        _ => None,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::fragment_to_html;
    use crate::scope::SharedValue;

    fn scope_with(entries: &[(&str, Value)]) -> Scope {
        let mut map = BTreeMap::new();
        for (k, v) in entries {
            map.insert((*k).to_owned(), v.clone());
        }
        Scope::from_map(map)
    }

    fn render(source: &str, scope: &Scope) -> Vec<MarkupNode> {
        compile_source(source, CompileOptions::default())
            .unwrap()
            .render(scope)
            .unwrap()
    }

    // ── text and attributes ──────────────────────────────────────────

    #[test]
    fn test_text_interpolation() {
        let scope = scope_with(&[("name", Value::from("weft"))]);
        let nodes = render("<p>hi {{ name }}</p>", &scope);
        assert_eq!(fragment_to_html(&nodes), "<p>hi weft</p>");
    }

    #[test]
    fn test_attribute_interpolation_and_key_extraction() {
        let scope = scope_with(&[("id", Value::from("row-9"))]);
        let nodes = render(r#"<li key="{{ id }}" class="row">x</li>"#, &scope);
        match &nodes[0] {
            MarkupNode::Element {
                attributes, key, ..
            } => {
                assert_eq!(key.as_deref(), Some("row-9"));
                assert_eq!(attributes.get("class").map(String::as_str), Some("row"));
                assert!(!attributes.contains_key("key"));
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_interpolation_emits_no_text_node() {
        let scope = scope_with(&[("gone", Value::Null)]);
        let nodes = render("<div>{{ gone }}</div>", &scope);
        match &nodes[0] {
            MarkupNode::Element { children, .. } => assert!(children.is_empty()),
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_comments_compile_to_nothing() {
        let nodes = render("<!-- note --><div>x</div>", &Scope::new());
        assert_eq!(nodes.len(), 1);
    }

    // ── control flow ─────────────────────────────────────────────────

    #[test]
    fn test_if_else_chain() {
        let source = r#"
            <w:if data="{{ n > 10 }}"><p>big</p></w:if>
            <w:else data="{{ n > 5 }}"><p>medium</p></w:else>
            <w:else><p>small</p></w:else>
        "#;
        let render_n = |n: f64| {
            let scope = scope_with(&[("n", Value::Number(n))]);
            fragment_to_html(&render(source, &scope))
        };
        assert_eq!(render_n(20.0), "<p>big</p>");
        assert_eq!(render_n(7.0), "<p>medium</p>");
        assert_eq!(render_n(1.0), "<p>small</p>");
    }

    #[test]
    fn test_if_false_without_else_renders_nothing() {
        let scope = scope_with(&[("flag", Value::Bool(false))]);
        let nodes = render(r#"<w:if data="{{ flag }}"><p>x</p></w:if>"#, &scope);
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_for_with_index_binding() {
        let items = Value::List(vec![Value::from("a"), Value::from("b")]);
        let scope = scope_with(&[("items", items)]);
        let nodes = render(
            r#"<w:for data="i, item in items"><p>{{ i }}:{{ item }}</p></w:for>"#,
            &scope,
        );
        assert_eq!(fragment_to_html(&nodes), "<p>0:a</p><p>1:b</p>");
    }

    #[test]
    fn test_for_key_expression_keys_each_iteration() {
        let users = Value::List(vec![
            Value::Map(BTreeMap::from([("id".to_owned(), Value::from("u1"))])),
            Value::Map(BTreeMap::from([("id".to_owned(), Value::from("u2"))])),
        ]);
        let scope = scope_with(&[("users", users)]);
        let nodes = render(
            r#"<w:for data="u in users" key="{{ u.id }}"><li>{{ u.id }}</li></w:for>"#,
            &scope,
        );
        assert_eq!(nodes[0].key(), Some("u1"));
        assert_eq!(nodes[1].key(), Some("u2"));
    }

    #[test]
    fn test_for_explicit_child_key_wins() {
        let items = Value::List(vec![Value::from("a")]);
        let scope = scope_with(&[("items", items)]);
        let nodes = render(
            r#"<w:for data="x in items" key="loop"><li key="own">{{ x }}</li></w:for>"#,
            &scope,
        );
        assert_eq!(nodes[0].key(), Some("own"));
    }

    #[test]
    fn test_for_over_map_values() {
        let map = Value::Map(BTreeMap::from([
            ("b".to_owned(), Value::Number(2.0)),
            ("a".to_owned(), Value::Number(1.0)),
        ]));
        let scope = scope_with(&[("m", map)]);
        let nodes = render(r#"<w:for data="v in m"><p>{{ v }}</p></w:for>"#, &scope);
        assert_eq!(fragment_to_html(&nodes), "<p>1</p><p>2</p>");
    }

    #[test]
    fn test_for_over_shared_list() {
        let cell = SharedValue::new(Value::List(vec![Value::Number(1.0)]));
        let scope = scope_with(&[("xs", Value::Shared(cell))]);
        let nodes = render(r#"<w:for data="x in xs"><p>{{ x }}</p></w:for>"#, &scope);
        assert_eq!(fragment_to_html(&nodes), "<p>1</p>");
    }

    #[test]
    fn test_for_over_scalar_fails() {
        let scope = scope_with(&[("n", Value::Number(3.0))]);
        let template =
            compile_source(r#"<w:for data="x in n"><p/></w:for>"#, CompileOptions::default())
                .unwrap();
        match template.render(&scope).unwrap_err() {
            RenderError::NotIterable { kind, .. } => assert_eq!(kind, "number"),
            other => panic!("expected NotIterable, got {other:?}"),
        }
    }

    // ── components and partials ──────────────────────────────────────

    #[test]
    fn test_component_invocation_resolves_options() {
        let scope = scope_with(&[("title", Value::from("News"))]);
        let nodes = render(
            r#"<App.widgets:Card caption="{{ title }}"><w:option name="limit" type="number">5</w:option></App.widgets:Card>"#,
            &scope,
        );
        match &nodes[0] {
            MarkupNode::Component { path, options, .. } => {
                assert_eq!(path.as_str(), "App/widgets:Card");
                assert_eq!(options.get("caption"), Some(&Value::Str("News".to_owned())));
                assert_eq!(options.get("limit"), Some(&Value::Number(5.0)));
            }
            other => panic!("expected component, got {other:?}"),
        }
    }

    #[test]
    fn test_component_options_cross_by_value() {
        let cell = SharedValue::new(Value::Number(1.0));
        let scope = scope_with(&[("cell", Value::Shared(cell.clone()))]);
        let nodes = render(r#"<App.x:Y amount="{{ cell }}"/>"#, &scope);
        cell.set(Value::Number(9.0));
        match &nodes[0] {
            MarkupNode::Component { options, .. } => {
                assert_eq!(options.get("amount"), Some(&Value::Number(1.0)));
            }
            other => panic!("expected component, got {other:?}"),
        }
    }

    #[test]
    fn test_dynamic_partial_target() {
        let scope = scope_with(&[("target", Value::from("App/list:Row"))]);
        let nodes = render(r#"<w:partial template="{{ target }}" n="1"/>"#, &scope);
        match &nodes[0] {
            MarkupNode::Component { path, options, .. } => {
                assert_eq!(path.as_str(), "App/list:Row");
                assert_eq!(options.get("n"), Some(&Value::Str("1".to_owned())));
            }
            other => panic!("expected component, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_partial_target_fails() {
        let scope = scope_with(&[("target", Value::Null)]);
        let template = compile_source(
            r#"<w:partial template="{{ target }}"/>"#,
            CompileOptions::default(),
        )
        .unwrap();
        assert!(matches!(
            template.render(&scope).unwrap_err(),
            RenderError::EmptyPartialTarget { .. }
        ));
    }

    #[test]
    fn test_misplaced_option_is_a_compile_error() {
        let err = compile_source(
            r#"<div><w:option name="x" type="number">1</w:option></div>"#,
            CompileOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::MisplacedOption { .. }));
    }

    // ── determinism ──────────────────────────────────────────────────

    #[test]
    fn test_render_is_idempotent() {
        let source = r#"<div a="{{ n }}"><w:for data="x in xs"><p>{{ x }}</p></w:for></div>"#;
        let template = compile_source(source, CompileOptions::default()).unwrap();
        let scope = scope_with(&[
            ("n", Value::Number(1.0)),
            ("xs", Value::List(vec![Value::from("a"), Value::from("b")])),
        ]);
        assert_eq!(template.render(&scope).unwrap(), template.render(&scope).unwrap());
    }

    #[test]
    fn test_render_restarts_after_scope_change() {
        let template =
            compile_source("<p>{{ n }}</p>", CompileOptions::default()).unwrap();
        let first = template
            .render(&scope_with(&[("n", Value::Number(1.0))]))
            .unwrap();
        let second = template
            .render(&scope_with(&[("n", Value::Number(2.0))]))
            .unwrap();
        let again = template
            .render(&scope_with(&[("n", Value::Number(1.0))]))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(first, again);
    }

    #[test]
    fn test_template_clone_shares_program() {
        let template = compile_source("<p>x</p>", CompileOptions::named("demo")).unwrap();
        let clone = template.clone();
        assert_eq!(clone.name(), Some("demo"));
        assert_eq!(
            template.render(&Scope::new()).unwrap(),
            clone.render(&Scope::new()).unwrap()
        );
    }

    #[test]
    fn test_document_order_preserved() {
        let scope = scope_with(&[("flag", Value::Bool(true))]);
        let nodes = render(
            r#"<a>1</a><w:if data="{{ flag }}"><b>2</b></w:if><c>3</c>"#,
            &scope,
        );
        assert_eq!(fragment_to_html(&nodes), "<a>1</a><b>2</b><c>3</c>");
    }

    #[test]
    fn test_full_fragment_snapshot() {
        let scope = scope_with(&[
            ("title", Value::from("Release notes")),
            (
                "tags",
                Value::List(vec![Value::from("ui"), Value::from("templates")]),
            ),
            ("draft", Value::Bool(false)),
        ]);
        let nodes = render(
            r#"<article class="post"><h1>{{ title }}</h1><w:for data="tag in tags" key="{{ tag }}"><span class="tag">{{ tag }}</span></w:for><w:if data="{{ draft }}"><em>draft</em></w:if><w:else><hr></w:else></article>"#,
            &scope,
        );
        insta::assert_snapshot!(
            fragment_to_html(&nodes),
            @r#"<article class="post"><h1>Release notes</h1><span class="tag">ui</span><span class="tag">templates</span><hr></article>"#
        );
    }
}
