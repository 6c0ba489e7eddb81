//! logos-based markup tokenizer.
//!
//! Produces coarse events (open tag, close tag, text, comment, doctype,
//! instruction, CDATA); the parser splits open-tag interiors into name and
//! attributes in a second pass.
//!
//! Comment, CDATA, and instruction bodies are consumed by callbacks that
//! scan the remainder for the first terminator and bump past it: their
//! "any content but the terminator" loops do not survive logos's
//! non-backtracking DFA as regexes. `<!-- a --> b <!-- c -->` lexes as two
//! comments with text between.
//!
//! No skip rule: whitespace is text content here, and the parser decides
//! what to do with whitespace-only text nodes.

use logos::{Lexer, Logos};
use thiserror::Error;

/// A stretch of markup the lexer could not recognize, e.g. a stray `<`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized markup `{found}` at offset {offset}")]
pub struct MarkupLexError {
    pub found: String,
    pub offset: usize,
}

/// Markup token produced by the lexer.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupToken {
    /// `<!-- ... -->`. The body runs to the first `-->`.
    #[token("<!--", |lex| take_through(lex, "-->"))]
    Comment,

    /// `<![CDATA[ ... ]]>`. The body runs to the first `]]>`.
    #[token("<![CDATA[", |lex| take_through(lex, "]]>"))]
    Cdata,

    /// `<?...?>` processing instruction. The body runs to the first `?>`.
    #[token("<?", |lex| take_through(lex, "?>"))]
    Instruction,

    /// `<!DOCTYPE ...>`, case-insensitive keyword.
    #[regex(r"<![dD][oO][cC][tT][yY][pP][eE][^>]*>")]
    Doctype,

    /// `</name>` with optional trailing whitespace before `>`.
    #[regex(r"</[a-zA-Z][a-zA-Z0-9.:_-]*[ \t\n\r]*>")]
    CloseTag,

    /// `<name ...>` including attributes and an optional self-closing `/`.
    /// Quoted attribute values may contain `<`, `>` and the other quote kind.
    #[regex(r#"<[a-zA-Z]([^<>"']|"[^"]*"|'[^']*')*>"#)]
    OpenTag,

    /// Anything up to the next `<`.
    #[regex(r"[^<]+")]
    Text,
}

/// Extend the current token through the end of `terminator`. A missing
/// terminator fails the token, surfacing as a lex error.
fn take_through(lex: &mut Lexer<'_, MarkupToken>, terminator: &str) -> bool {
    match lex.remainder().find(terminator) {
        Some(offset) => {
            lex.bump(offset + terminator.len());
            true
        }
        None => false,
    }
}

/// One recognized stretch of markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub token: MarkupToken,
    pub text: String,
    /// Byte offset of the first character in the source.
    pub start: usize,
}

/// Tokenize markup source into lexemes.
pub fn scan(input: &str) -> Result<Vec<Lexeme>, MarkupLexError> {
    let mut out = Vec::new();
    for (result, span) in MarkupToken::lexer(input).spanned() {
        match result {
            Ok(token) => out.push(Lexeme {
                token,
                text: input[span.clone()].to_owned(),
                start: span.start,
            }),
            Err(()) => {
                return Err(MarkupLexError {
                    found: input[span.clone()].to_owned(),
                    offset: span.start,
                })
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: scan and return just the token kinds.
    fn kinds(input: &str) -> Vec<MarkupToken> {
        scan(input).unwrap().into_iter().map(|l| l.token).collect()
    }

    /// Helper: scan and return (token, text) pairs.
    fn lexemes(input: &str) -> Vec<(MarkupToken, String)> {
        scan(input)
            .unwrap()
            .into_iter()
            .map(|l| (l.token, l.text))
            .collect()
    }

    // ── basic events ─────────────────────────────────────────────────

    #[test]
    fn test_open_close_text() {
        assert_eq!(
            kinds("<div>hello</div>"),
            vec![MarkupToken::OpenTag, MarkupToken::Text, MarkupToken::CloseTag]
        );
    }

    #[test]
    fn test_self_closing_is_open_tag() {
        let result = lexemes("<br/>");
        assert_eq!(result[0], (MarkupToken::OpenTag, "<br/>".into()));
    }

    #[test]
    fn test_attributes_with_quotes() {
        let result = lexemes(r#"<div class="big" id='x'>"#);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0, MarkupToken::OpenTag);
    }

    #[test]
    fn test_quoted_angle_brackets_stay_inside_tag() {
        // The `<` and `>` inside the quoted expression must not end the tag.
        let result = lexemes(r#"<span title="{{ a < b }}">x</span>"#);
        assert_eq!(
            result.iter().map(|(t, _)| *t).collect::<Vec<_>>(),
            vec![MarkupToken::OpenTag, MarkupToken::Text, MarkupToken::CloseTag]
        );
        assert_eq!(result[0].1, r#"<span title="{{ a < b }}">"#);
    }

    #[test]
    fn test_dotted_and_namespaced_tag_names() {
        assert_eq!(kinds("<Controls.buttons:Button/>"), vec![MarkupToken::OpenTag]);
        assert_eq!(kinds("<w:if data=\"x\"></w:if>"), vec![MarkupToken::OpenTag, MarkupToken::CloseTag]);
    }

    #[test]
    fn test_close_tag_with_whitespace() {
        assert_eq!(kinds("</div  >"), vec![MarkupToken::CloseTag]);
    }

    // ── comments ─────────────────────────────────────────────────────

    #[test]
    fn test_comment_simple() {
        assert_eq!(kinds("<!-- note -->"), vec![MarkupToken::Comment]);
    }

    #[test]
    fn test_comment_with_dashes_and_arrows() {
        assert_eq!(kinds("<!-- a - b -- c -> d -->"), vec![MarkupToken::Comment]);
    }

    #[test]
    fn test_comment_ends_at_first_terminator() {
        let result = lexemes("<!-- one --><p><!-- two -->");
        assert_eq!(
            result.iter().map(|(t, _)| *t).collect::<Vec<_>>(),
            vec![MarkupToken::Comment, MarkupToken::OpenTag, MarkupToken::Comment]
        );
        assert_eq!(result[0].1, "<!-- one -->");
    }

    #[test]
    fn test_empty_comment() {
        assert_eq!(kinds("<!---->"), vec![MarkupToken::Comment]);
    }

    // ── doctype / cdata / instruction ────────────────────────────────

    #[test]
    fn test_doctype_case_insensitive() {
        assert_eq!(kinds("<!DOCTYPE html>"), vec![MarkupToken::Doctype]);
        assert_eq!(kinds("<!doctype html>"), vec![MarkupToken::Doctype]);
    }

    #[test]
    fn test_cdata() {
        assert_eq!(kinds("<![CDATA[ raw <stuff> ]]>"), vec![MarkupToken::Cdata]);
    }

    #[test]
    fn test_cdata_with_brackets() {
        assert_eq!(kinds("<![CDATA[a]]b]>c]]>"), vec![MarkupToken::Cdata]);
    }

    #[test]
    fn test_instruction() {
        assert_eq!(kinds("<?xml version=\"1.0\"?>"), vec![MarkupToken::Instruction]);
    }

    #[test]
    fn test_instruction_with_question_marks() {
        assert_eq!(kinds("<?pi a? b ?>"), vec![MarkupToken::Instruction]);
    }

    // ── text ─────────────────────────────────────────────────────────

    #[test]
    fn test_text_runs_to_next_angle() {
        let result = lexemes("hello {{ name }} world<br/>");
        assert_eq!(result[0], (MarkupToken::Text, "hello {{ name }} world".into()));
        assert_eq!(result[1].0, MarkupToken::OpenTag);
    }

    #[test]
    fn test_whitespace_is_text() {
        let result = lexemes("<a>\n  </a>");
        assert_eq!(result[1], (MarkupToken::Text, "\n  ".into()));
    }

    // ── offsets and errors ───────────────────────────────────────────

    #[test]
    fn test_offsets_are_byte_positions() {
        let result = scan("ab<i>c</i>").unwrap();
        assert_eq!(result[0].start, 0);
        assert_eq!(result[1].start, 2);
        assert_eq!(result[2].start, 5);
        assert_eq!(result[3].start, 6);
    }

    #[test]
    fn test_stray_angle_bracket_is_an_error() {
        let err = scan("a < b").unwrap_err();
        assert_eq!(err.offset, 2);
        assert!(err.found.starts_with('<'));
    }

    #[test]
    fn test_unterminated_comment_is_an_error() {
        assert!(scan("<!-- never closed").is_err());
    }

    #[test]
    fn test_unterminated_cdata_and_instruction_are_errors() {
        assert!(scan("<![CDATA[ never closed").is_err());
        assert!(scan("<?pi never closed").is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(scan("").unwrap().is_empty());
    }
}
