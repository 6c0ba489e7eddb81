//! logos-based expression language for attribute values and text
//! interpolation.
//!
//! Token priority in logos is determined by:
//! 1. Longest match wins (e.g. `!=` beats `!`, `<=` beats `<`)
//! 2. For equal length matches, `#[token]` beats `#[regex]`, so the
//!    `true`/`false`/`null` keywords win over [`ExprToken::Ident`]
//!
//! Grammar (precedence low to high): `||`, `&&`, `==`/`!=`,
//! `<`/`<=`/`>`/`>=`, `+`/`-`, `*`/`/`/`%`, unary `!`/`-`, then member
//! access `a.b` and indexing `a[i]`.

use logos::Logos;
use thiserror::Error;

use crate::scope::{Scope, Value};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Expression lexing, parsing or evaluation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unrecognized character `{found}` at offset {offset}")]
    InvalidToken { found: String, offset: usize },

    #[error("unexpected token `{found}` at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("unexpected end of expression")]
    UnexpectedEof,

    #[error("unknown name `{name}` (scope has: {scope_keys:?})")]
    UnknownName {
        name: String,
        scope_keys: Vec<String>,
    },

    #[error("cannot read `{key}` of {kind}")]
    BadMember { key: String, kind: &'static str },

    #[error("cannot index {kind} with {index}")]
    BadIndex {
        kind: &'static str,
        index: &'static str,
    },

    #[error("`{op}` not supported between {left} and {right}")]
    BadOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Expression token produced by the lexer.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum ExprToken {
    // ── compound operators (longer matches, defined first) ───────────

    #[token("==")]
    EqEq,

    #[token("!=")]
    NotEq,

    #[token("<=")]
    LessEq,

    #[token(">=")]
    GreaterEq,

    #[token("&&")]
    AndAnd,

    #[token("||")]
    OrOr,

    // ── keywords ─────────────────────────────────────────────────────

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("null")]
    Null,

    // ── literals and names ───────────────────────────────────────────

    /// Unsigned number; negation is a unary operator in the parser.
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    #[regex(r#""[^"]*""#)]
    DoubleQuoted,

    #[regex(r"'[^']*'")]
    SingleQuoted,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // ── single-character operators and punctuation ───────────────────

    #[token("<")]
    Less,

    #[token(">")]
    Greater,

    #[token("!")]
    Not,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token(".")]
    Dot,

    #[token(",")]
    Comma,

    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    #[token("[")]
    BracketOpen,

    #[token("]")]
    BracketClose,
}

/// Tokenize an expression into `(token, text, offset)` triples.
///
/// Unlike markup text, a character that fails to lex here is an error, not
/// something to skip.
fn tokenize(input: &str) -> Result<Vec<(ExprToken, String, usize)>, ExprError> {
    let mut out = Vec::new();
    for (result, span) in ExprToken::lexer(input).spanned() {
        match result {
            Ok(token) => out.push((token, input[span.clone()].to_owned(), span.start)),
            Err(()) => {
                return Err(ExprError::InvalidToken {
                    found: input[span.clone()].to_owned(),
                    offset: span.start,
                })
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Member {
        object: Box<Expr>,
        key: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse an expression source into an [`Expr`].
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, cursor: 0 };
    let expr = parser.parse_or()?;
    if let Some((_, text, offset)) = parser.peek_full() {
        return Err(ExprError::UnexpectedToken {
            found: text.clone(),
            offset: *offset,
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(ExprToken, String, usize)>,
    cursor: usize,
}

impl Parser {
    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.cursor).map(|(t, _, _)| t)
    }

    fn peek_full(&self) -> Option<&(ExprToken, String, usize)> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self) -> Option<(ExprToken, String, usize)> {
        let item = self.tokens.get(self.cursor).cloned();
        if item.is_some() {
            self.cursor += 1;
        }
        item
    }

    /// Consume the next token if it matches, reporting failure otherwise.
    fn expect(&mut self, expected: ExprToken) -> Result<(ExprToken, String, usize), ExprError> {
        match self.advance() {
            Some(item) if item.0 == expected => Ok(item),
            Some((_, text, offset)) => Err(ExprError::UnexpectedToken {
                found: text,
                offset,
            }),
            None => Err(ExprError::UnexpectedEof),
        }
    }

    /// If the next token matches one of `ops`, consume it and return the op.
    fn match_binary(&mut self, ops: &[(ExprToken, BinaryOp)]) -> Option<BinaryOp> {
        let next = self.peek()?;
        let op = ops.iter().find(|(t, _)| t == next).map(|(_, op)| *op)?;
        self.cursor += 1;
        Some(op)
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while let Some(op) = self.match_binary(&[(ExprToken::OrOr, BinaryOp::Or)]) {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_equality()?;
        while let Some(op) = self.match_binary(&[(ExprToken::AndAnd, BinaryOp::And)]) {
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_comparison()?;
        while let Some(op) = self.match_binary(&[
            (ExprToken::EqEq, BinaryOp::Eq),
            (ExprToken::NotEq, BinaryOp::Ne),
        ]) {
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_additive()?;
        while let Some(op) = self.match_binary(&[
            (ExprToken::LessEq, BinaryOp::Le),
            (ExprToken::GreaterEq, BinaryOp::Ge),
            (ExprToken::Less, BinaryOp::Lt),
            (ExprToken::Greater, BinaryOp::Gt),
        ]) {
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        while let Some(op) = self.match_binary(&[
            (ExprToken::Plus, BinaryOp::Add),
            (ExprToken::Minus, BinaryOp::Sub),
        ]) {
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.match_binary(&[
            (ExprToken::Star, BinaryOp::Mul),
            (ExprToken::Slash, BinaryOp::Div),
            (ExprToken::Percent, BinaryOp::Rem),
        ]) {
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            Some(ExprToken::Not) => Some(UnaryOp::Not),
            Some(ExprToken::Minus) => Some(UnaryOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            self.cursor += 1;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(ExprToken::Dot) => {
                    self.cursor += 1;
                    let (_, key, _) = self.expect(ExprToken::Ident)?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        key,
                    };
                }
                Some(ExprToken::BracketOpen) => {
                    self.cursor += 1;
                    let index = self.parse_or()?;
                    self.expect(ExprToken::BracketClose)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some((ExprToken::Number, text, offset)) => {
                let n: f64 = text.parse().map_err(|_| ExprError::UnexpectedToken {
                    found: text,
                    offset,
                })?;
                Ok(Expr::Literal(Value::Number(n)))
            }
            Some((ExprToken::DoubleQuoted, text, _))
            | Some((ExprToken::SingleQuoted, text, _)) => {
                // Strip the surrounding quotes.
                let inner = &text[1..text.len() - 1];
                Ok(Expr::Literal(Value::Str(inner.to_owned())))
            }
            Some((ExprToken::True, _, _)) => Ok(Expr::Literal(Value::Bool(true))),
            Some((ExprToken::False, _, _)) => Ok(Expr::Literal(Value::Bool(false))),
            Some((ExprToken::Null, _, _)) => Ok(Expr::Literal(Value::Null)),
            Some((ExprToken::Ident, text, _)) => Ok(Expr::Name(text)),
            Some((ExprToken::ParenOpen, _, _)) => {
                let expr = self.parse_or()?;
                self.expect(ExprToken::ParenClose)?;
                Ok(expr)
            }
            Some((_, text, offset)) => Err(ExprError::UnexpectedToken {
                found: text,
                offset,
            }),
            None => Err(ExprError::UnexpectedEof),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluation context threaded from data injection: whether the enclosing
/// tag is a component invocation, whether it sits at the template root, and
/// the option name currently being resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalCtx<'a> {
    pub is_control: bool,
    pub root_config: bool,
    pub property_name: Option<&'a str>,
}

/// Evaluate an expression against a scope.
pub fn eval(expr: &Expr, scope: &Scope, ctx: &EvalCtx<'_>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => match scope.get(name) {
            Some(value) => Ok(value.clone()),
            None => {
                tracing::debug!(
                    name = %name,
                    property = ?ctx.property_name,
                    "expression name not in scope"
                );
                Err(ExprError::UnknownName {
                    name: name.clone(),
                    scope_keys: scope.keys(),
                })
            }
        },
        Expr::Member { object, key } => {
            let object = eval(object, scope, ctx)?;
            eval_member(&object, key)
        }
        Expr::Index { object, index } => {
            let object = eval(object, scope, ctx)?;
            let index = eval(index, scope, ctx)?;
            eval_index(&object, &index)
        }
        Expr::Unary { op, operand } => {
            let value = eval(operand, scope, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => match value.as_number() {
                    Some(n) => Ok(Value::Number(-n)),
                    None => Err(ExprError::BadOperands {
                        op: "-",
                        left: "unary",
                        right: value.kind(),
                    }),
                },
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, scope, ctx),
    }
}

/// Parse and evaluate in one step.
pub fn eval_str(input: &str, scope: &Scope, ctx: &EvalCtx<'_>) -> Result<Value, ExprError> {
    let expr = parse(input)?;
    eval(&expr, scope, ctx)
}

fn eval_member(object: &Value, key: &str) -> Result<Value, ExprError> {
    match object {
        Value::Map(map) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
        Value::List(items) if key == "length" => Ok(Value::Number(items.len() as f64)),
        Value::Str(s) if key == "length" => Ok(Value::Number(s.chars().count() as f64)),
        Value::Shared(cell) => cell.with(|inner| eval_member(inner, key)),
        other => Err(ExprError::BadMember {
            key: key.to_owned(),
            kind: other.kind(),
        }),
    }
}

fn eval_index(object: &Value, index: &Value) -> Result<Value, ExprError> {
    match object {
        Value::List(items) => match index.as_number() {
            Some(n) if n >= 0.0 => Ok(items.get(n as usize).cloned().unwrap_or(Value::Null)),
            _ => Err(ExprError::BadIndex {
                kind: "list",
                index: index.kind(),
            }),
        },
        Value::Map(map) => match index {
            Value::Str(key) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
            other => Err(ExprError::BadIndex {
                kind: "map",
                index: other.kind(),
            }),
        },
        Value::Shared(cell) => cell.with(|inner| eval_index(inner, index)),
        other => Err(ExprError::BadIndex {
            kind: other.kind(),
            index: index.kind(),
        }),
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    scope: &Scope,
    ctx: &EvalCtx<'_>,
) -> Result<Value, ExprError> {
    // Short-circuiting operators evaluate the right side lazily and yield
    // the deciding operand itself, not a coerced boolean.
    match op {
        BinaryOp::And => {
            let lhs = eval(left, scope, ctx)?;
            if !lhs.is_truthy() {
                return Ok(lhs);
            }
            return eval(right, scope, ctx);
        }
        BinaryOp::Or => {
            let lhs = eval(left, scope, ctx)?;
            if lhs.is_truthy() {
                return Ok(lhs);
            }
            return eval(right, scope, ctx);
        }
        _ => {}
    }

    let lhs = eval(left, scope, ctx)?;
    let rhs = eval(right, scope, ctx)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &lhs, &rhs),
        BinaryOp::Add => {
            if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
                Ok(Value::Number(a + b))
            } else {
                Ok(Value::Str(format!("{lhs}{rhs}")))
            }
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => Ok(Value::Number(match op {
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                })),
                _ => Err(ExprError::BadOperands {
                    op: op.symbol(),
                    left: lhs.kind(),
                    right: rhs.kind(),
                }),
            }
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    let ordering = if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
        a.partial_cmp(&b)
    } else if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
        Some(a.cmp(b))
    } else {
        None
    };
    let Some(ordering) = ordering else {
        return Err(ExprError::BadOperands {
            op: op.symbol(),
            left: lhs.kind(),
            right: rhs.kind(),
        });
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::SharedValue;
    use std::collections::BTreeMap;

    fn scope() -> Scope {
        let mut scope = Scope::new();
        scope.set("count", Value::Number(3.0));
        scope.set("name", Value::from("ada"));
        scope.set("flag", Value::Bool(true));
        scope.set(
            "items",
            Value::List(vec![Value::from(10i64), Value::from(20i64)]),
        );
        let mut user = BTreeMap::new();
        user.insert("age".to_owned(), Value::Number(30.0));
        scope.set("user", Value::Map(user));
        scope
    }

    fn eval_ok(input: &str) -> Value {
        eval_str(input, &scope(), &EvalCtx::default()).unwrap()
    }

    fn eval_err(input: &str) -> ExprError {
        eval_str(input, &scope(), &EvalCtx::default()).unwrap_err()
    }

    // ── lexer ──────────────────────────────────────────────────────────────

    #[test]
    fn compound_operators_win_over_single() {
        let tokens: Vec<ExprToken> = tokenize("a != b <= c")
            .unwrap()
            .into_iter()
            .map(|(t, _, _)| t)
            .collect();
        assert_eq!(
            tokens,
            vec![
                ExprToken::Ident,
                ExprToken::NotEq,
                ExprToken::Ident,
                ExprToken::LessEq,
                ExprToken::Ident,
            ]
        );
    }

    #[test]
    fn keywords_win_over_ident() {
        let tokens: Vec<ExprToken> = tokenize("true truthy")
            .unwrap()
            .into_iter()
            .map(|(t, _, _)| t)
            .collect();
        assert_eq!(tokens, vec![ExprToken::True, ExprToken::Ident]);
    }

    #[test]
    fn invalid_character_reports_offset() {
        let err = tokenize("a @ b").unwrap_err();
        assert_eq!(
            err,
            ExprError::InvalidToken {
                found: "@".to_owned(),
                offset: 2,
            }
        );
    }

    // ── parser ─────────────────────────────────────────────────────────────

    #[test]
    fn precedence_mul_over_add() {
        let expr = parse("1 + 2 * 3").unwrap();
        let result = eval(&expr, &Scope::new(), &EvalCtx::default()).unwrap();
        assert_eq!(result, Value::Number(7.0));
    }

    #[test]
    fn parens_override_precedence() {
        assert_eq!(eval_ok("(1 + 2) * 3"), Value::Number(9.0));
    }

    #[test]
    fn member_and_index_chain() {
        let expr = parse("user.age").unwrap();
        assert_eq!(
            expr,
            Expr::Member {
                object: Box::new(Expr::Name("user".to_owned())),
                key: "age".to_owned(),
            }
        );
        assert_eq!(eval_ok("items[1]"), Value::Number(20.0));
    }

    #[test]
    fn trailing_tokens_rejected() {
        let err = parse("1 2").unwrap_err();
        assert_eq!(
            err,
            ExprError::UnexpectedToken {
                found: "2".to_owned(),
                offset: 2,
            }
        );
    }

    #[test]
    fn unterminated_paren_is_eof() {
        assert_eq!(parse("(1 + 2").unwrap_err(), ExprError::UnexpectedEof);
    }

    #[test]
    fn string_literals_strip_quotes() {
        assert_eq!(parse("'hi'").unwrap(), Expr::Literal(Value::from("hi")));
        assert_eq!(parse("\"hi\"").unwrap(), Expr::Literal(Value::from("hi")));
    }

    // ── evaluation ─────────────────────────────────────────────────────────

    #[test]
    fn name_lookup() {
        assert_eq!(eval_ok("count"), Value::Number(3.0));
        assert_eq!(eval_ok("name"), Value::from("ada"));
    }

    #[test]
    fn unknown_name_carries_scope_snapshot() {
        match eval_err("missing") {
            ExprError::UnknownName { name, scope_keys } => {
                assert_eq!(name, "missing");
                assert!(scope_keys.contains(&"count".to_owned()));
                assert!(scope_keys.contains(&"user".to_owned()));
            }
            other => panic!("expected UnknownName, got {other:?}"),
        }
    }

    #[test]
    fn missing_map_key_is_null() {
        assert_eq!(eval_ok("user.missing"), Value::Null);
    }

    #[test]
    fn member_on_number_fails() {
        match eval_err("count.x") {
            ExprError::BadMember { key, kind } => {
                assert_eq!(key, "x");
                assert_eq!(kind, "number");
            }
            other => panic!("expected BadMember, got {other:?}"),
        }
    }

    #[test]
    fn length_on_lists_and_strings() {
        assert_eq!(eval_ok("items.length"), Value::Number(2.0));
        assert_eq!(eval_ok("name.length"), Value::Number(3.0));
    }

    #[test]
    fn out_of_bounds_index_is_null() {
        assert_eq!(eval_ok("items[9]"), Value::Null);
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval_ok("count > 2"), Value::Bool(true));
        assert_eq!(eval_ok("count >= 3"), Value::Bool(true));
        assert_eq!(eval_ok("count < 3"), Value::Bool(false));
        assert_eq!(eval_ok("name == 'ada'"), Value::Bool(true));
        assert_eq!(eval_ok("'abc' < 'abd'"), Value::Bool(true));
    }

    #[test]
    fn numeric_strings_compare_numerically() {
        assert_eq!(eval_ok("'10' > 9"), Value::Bool(true));
    }

    #[test]
    fn logic_yields_deciding_operand() {
        assert_eq!(eval_ok("flag && count"), Value::Number(3.0));
        assert_eq!(eval_ok("0 || name"), Value::from("ada"));
        assert_eq!(eval_ok("0 && missing"), Value::Number(0.0));
    }

    #[test]
    fn short_circuit_skips_right_side() {
        // `missing` would be an UnknownName error if evaluated.
        assert_eq!(eval_ok("flag || missing"), Value::Bool(true));
    }

    #[test]
    fn not_and_negation() {
        assert_eq!(eval_ok("!flag"), Value::Bool(false));
        assert_eq!(eval_ok("-count"), Value::Number(-3.0));
        assert_eq!(eval_ok("!0"), Value::Bool(true));
    }

    #[test]
    fn add_concatenates_when_not_numeric() {
        assert_eq!(eval_ok("name + '!'"), Value::from("ada!"));
        assert_eq!(eval_ok("'n=' + count"), Value::from("n=3"));
        assert_eq!(eval_ok("1 + 2"), Value::Number(3.0));
        assert_eq!(eval_ok("'1' + 2"), Value::Number(3.0));
    }

    #[test]
    fn arithmetic_type_errors() {
        match eval_err("name * 2") {
            ExprError::BadOperands { op, left, right } => {
                assert_eq!(op, "*");
                assert_eq!(left, "string");
                assert_eq!(right, "number");
            }
            other => panic!("expected BadOperands, got {other:?}"),
        }
    }

    #[test]
    fn shared_cells_are_transparent() {
        let mut scope = Scope::new();
        scope.set("cell", Value::Shared(SharedValue::new(Value::Number(5.0))));
        let ctx = EvalCtx::default();
        assert_eq!(
            eval_str("cell + 1", &scope, &ctx).unwrap(),
            Value::Number(6.0)
        );
        assert_eq!(
            eval_str("cell > 4", &scope, &ctx).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn shared_member_access() {
        let mut inner = BTreeMap::new();
        inner.insert("x".to_owned(), Value::Number(1.0));
        let mut scope = Scope::new();
        scope.set(
            "obj",
            Value::Shared(SharedValue::new(Value::Map(inner))),
        );
        assert_eq!(
            eval_str("obj.x", &scope, &EvalCtx::default()).unwrap(),
            Value::Number(1.0)
        );
    }
}
