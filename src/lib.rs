//! # weft-ui
//!
//! A template-to-markup compiler and reconciliation runtime for declarative
//! UI components.
//!
//! weft-ui parses an HTML-shaped template language with `{{ ... }}`
//! interpolation and `w:` control-flow directives, compiles it into a
//! reusable op-tree, renders that against layered data scopes, and diffs
//! successive renders into minimal patch streams a host can replay against
//! whatever scene it keeps. A slotmap-backed runtime mounts component
//! templates as live controls with lifecycle hooks, bubbling notifications,
//! deferred async values, and error boundaries.
//!
//! ## Core Systems
//!
//! - **[`template`]** — Template front end: tokenizer, AST, parser, static analysis
//! - **[`expr`]** — Expression language: parsing and truthiness-aware evaluation
//! - **[`scope`]** — Layered data scopes, values, shared cells, content functions
//! - **[`inject`]** — Typed data injection: element trees to structured values
//! - **[`compile`]** — Template compilation to op-trees and rendering to markup
//! - **[`markup`]** — Rendered markup nodes, node paths, HTML serialization
//! - **[`runtime`]** — Control tree: mount/update/unmount, reconciliation, events, deferreds
//! - **[`refs`]** — Ref chains tracking rendered nodes across re-renders
//! - **[`testing`]** — Headless lifecycle probes and scope builders for tests

// Foundation
pub mod expr;
pub mod markup;
pub mod scope;

// Template front end
pub mod template;

// Injection and compilation
pub mod compile;
pub mod inject;

// Runtime
pub mod refs;
pub mod runtime;

// Testing
pub mod testing;

pub use compile::{compile, compile_source, CompileOptions, RenderError, Template};
pub use markup::{MarkupNode, NodePath};
pub use runtime::{Commit, Component, ControlId, Event, Phase, Runtime};
pub use scope::{Options, Scope, SharedValue, Value};
pub use template::{parse, ComponentPath, Node, ParseError};
