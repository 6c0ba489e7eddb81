//! Template front end: tokenizer, AST, parser, static analysis.

pub mod analyze;
pub mod ast;
pub mod parser;
pub mod tokenizer;

pub use analyze::top_level_component_name;
pub use ast::{
    Attribute, ComponentPath, ControlFlowKind, ElseArm, Node, SourcePos, TemplateText, TextRun,
};
pub use parser::{parse, ParseError};
