use thiserror::Error;

use crate::tpl::token::TagKind;

/// 词法错误，随终止的 error token 传给解析器
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    #[error("unclosed {0} tag")]
    Unclosed(TagKind),
    #[error("unable to find end of new delimiter, check that there is a space following it")]
    MissingDelimiterSpace,
    #[error("expected '=' while trying to close a change delimiter tag")]
    MissingDelimiterEquals,
    #[error("expected '=' immediately before the closing delimiter")]
    MisplacedDelimiterEquals,
    #[error("empty delimiter in change delimiter tag")]
    EmptyDelimiter,
}

/// 解析器产生的语法与校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected {found} in {context}")]
    Unexpected { found: String, context: &'static str },
    #[error("section name mismatch: {{{{#{expected}}}}} closed by {{{{/{found}}}}}")]
    SectionMismatch { expected: String, found: String },
    #[error("unexpected EOF in section {0:?}")]
    UnclosedSection(String),
    #[error("unexpected {{{{/{0}}}}} outside of a section")]
    UnexpectedEnd(String),
    #[error("unexpected {{{{^}}}} in {0}")]
    UnexpectedElse(&'static str),
    #[error("empty command")]
    EmptyCommand,
    #[error("missing value for {0}")]
    MissingValue(&'static str),
    #[error("undefined variable {0:?}")]
    UndefinedVariable(String),
    #[error("multiple definition of template {0:?}")]
    DuplicateTemplate(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// 解析失败时返回给调用方的错误，带模板名与行列位置
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("template: {name}:{line}:{col}: {kind}")]
pub struct TemplateError {
    pub name: String,
    pub line: usize,
    pub col: usize,
    pub kind: ErrorKind,
}

impl TemplateError {
    /// Locates `pos` inside `text`: 1-based line, byte offset within that line.
    pub fn at(name: &str, text: &str, pos: usize, kind: impl Into<ErrorKind>) -> Self {
        let (line, col) = locate(text, pos);
        Self {
            name: name.to_string(),
            line,
            col,
            kind: kind.into(),
        }
    }

    pub fn is_lex(&self) -> bool {
        matches!(self.kind, ErrorKind::Lex(_))
    }
}

pub(crate) fn locate(text: &str, pos: usize) -> (usize, usize) {
    let pos = pos.min(text.len());
    let before = &text.as_bytes()[..pos];
    let line = 1 + before.iter().filter(|&&b| b == b'\n').count();
    let col = match before.iter().rposition(|&b| b == b'\n') {
        Some(nl) => pos - (nl + 1),
        None => pos,
    };
    (line, col)
}

const CONTEXT_LIMIT: usize = 20;

/// Quotes a token or node rendering for an error message, keeping at most
/// 20 characters and marking the cut with `...`.
pub(crate) fn quote_context(s: &str) -> String {
    match s.char_indices().nth(CONTEXT_LIMIT) {
        Some((cut, _)) => format!("{:?}...", &s[..cut]),
        None => format!("{:?}", s),
    }
}
