use std::fmt;

use crate::error::LexError;

/// 开标签标记符对应的标签类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Escaped,
    Unescaped,
    Section,
    Inverted,
    EndSection,
    Comment,
    Partial,
    Delimiters,
}

impl TagKind {
    /// Classifies the character following an open delimiter. `None` means
    /// the tag is a plain escaped variable and the character belongs to
    /// its body.
    pub fn from_marker(c: char) -> Option<Self> {
        match c {
            '!' => Some(TagKind::Comment),
            '{' | '&' => Some(TagKind::Unescaped),
            '#' => Some(TagKind::Section),
            '/' => Some(TagKind::EndSection),
            '^' => Some(TagKind::Inverted),
            '>' => Some(TagKind::Partial),
            '=' => Some(TagKind::Delimiters),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Escaped => "escaped variable",
            TagKind::Unescaped => "unescaped variable",
            TagKind::Section => "section",
            TagKind::Inverted => "inverted section",
            TagKind::EndSection => "end section",
            TagKind::Comment => "comment",
            TagKind::Partial => "partial",
            TagKind::Delimiters => "delimiter-change",
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Error(LexError),
    Eof,
    /// Ordinary text, never containing whitespace runs or line breaks.
    Text,
    /// One or more spaces or tabs.
    Space,
    Newline,
    CarriageReturn,
    /// Open delimiter plus tag marker, e.g. `{{#`.
    Open(TagKind),
    CloseTag,
    /// Tag payload: a section/partial name or an interpolation body.
    Identifier,
    /// Comment payload.
    Discard,
}

impl TokenKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenKind::Eof | TokenKind::Error(_))
    }

    pub fn is_line_end(&self) -> bool {
        matches!(self, TokenKind::Newline | TokenKind::CarriageReturn)
    }
}

/// 词法单元，`value` 借用模板原文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub pos: usize,
    pub value: &'a str,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, pos: usize, value: &'a str) -> Self {
        Self { kind, pos, value }
    }

    pub fn eof(pos: usize) -> Self {
        Self::new(TokenKind::Eof, pos, "")
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => f.write_str("EOF"),
            TokenKind::Error(e) => write!(f, "{}", e),
            _ => f.write_str(&crate::error::quote_context(self.value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_classification() {
        assert_eq!(TagKind::from_marker('!'), Some(TagKind::Comment));
        assert_eq!(TagKind::from_marker('&'), Some(TagKind::Unescaped));
        assert_eq!(TagKind::from_marker('{'), Some(TagKind::Unescaped));
        assert_eq!(TagKind::from_marker('='), Some(TagKind::Delimiters));
        assert_eq!(TagKind::from_marker('n'), None);
    }

    #[test]
    fn test_token_display() {
        assert_eq!(Token::eof(3).to_string(), "EOF");
        let t = Token::new(TokenKind::Text, 0, "a very long piece of template text");
        assert_eq!(t.to_string(), "\"a very long piece of\"...");
    }
}
