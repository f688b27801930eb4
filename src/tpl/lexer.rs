use std::iter::FusedIterator;

use tracing::{debug, trace};

use crate::error::LexError;
use crate::models::delimiters::Delimiters;
use crate::tpl::token::{TagKind, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    OpenTag,
    Body(TagKind),
    Delimiters,
    CloseTag,
    Done,
}

/// 支持自定义分隔符的词法分析器，按需产出 token，
/// 结尾恰好有一个 `Eof` 或 `Error` token。
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    open: String,
    close: String,
    state: State,
    // start of the token being built
    start: usize,
    pos: usize,
    // current tag was opened as `{{{`
    triple_brace: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, delimiters: &Delimiters) -> Self {
        Self::starting_at(input, delimiters, 0)
    }

    /// 从字节偏移 `pos` 开始扫描；越界时截到输入末尾，
    /// 并回退到最近的字符边界。
    pub fn starting_at(input: &'a str, delimiters: &Delimiters, pos: usize) -> Self {
        let mut pos = pos.min(input.len());
        while !input.is_char_boundary(pos) {
            pos -= 1;
        }
        let delimiters = Delimiters::new(&delimiters.open, &delimiters.close);
        Self {
            input,
            open: delimiters.open,
            close: delimiters.close,
            state: State::Text,
            start: pos,
            pos,
            triple_brace: false,
        }
    }

    /// 当前生效的分隔符
    pub fn delimiters(&self) -> Delimiters {
        Delimiters::new(&self.open, &self.close)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn emit(&mut self, kind: TokenKind) -> Token<'a> {
        let token = Token::new(kind, self.start, &self.input[self.start..self.pos]);
        self.start = self.pos;
        token
    }

    fn fail(&mut self, err: LexError) -> Token<'a> {
        trace!(pos = self.start, %err, "lex error");
        self.state = State::Done;
        Token::new(TokenKind::Error(err), self.start, "")
    }

    fn lex_text(&mut self) -> Option<Token<'a>> {
        loop {
            let rest = self.rest();
            if rest.starts_with(self.open.as_str()) {
                self.state = State::OpenTag;
                return (self.pos > self.start).then(|| self.emit(TokenKind::Text));
            }
            let Some(c) = rest.chars().next() else {
                if self.pos > self.start {
                    return Some(self.emit(TokenKind::Text));
                }
                self.state = State::Done;
                return Some(self.emit(TokenKind::Eof));
            };
            match c {
                '\r' | '\n' | ' ' | '\t' => {
                    if self.pos > self.start {
                        return Some(self.emit(TokenKind::Text));
                    }
                    return Some(self.lex_whitespace(c));
                }
                _ => self.pos += c.len_utf8(),
            }
        }
    }

    fn lex_whitespace(&mut self, c: char) -> Token<'a> {
        self.pos += 1;
        match c {
            '\r' => self.emit(TokenKind::CarriageReturn),
            '\n' => self.emit(TokenKind::Newline),
            _ => {
                let run = self
                    .rest()
                    .find(|c| !is_blank(c))
                    .unwrap_or(self.rest().len());
                self.pos += run;
                self.emit(TokenKind::Space)
            }
        }
    }

    fn lex_open_tag(&mut self) -> Token<'a> {
        self.pos += self.open.len();
        let marker = self.rest().chars().next();
        let kind = match marker.and_then(TagKind::from_marker) {
            Some(kind) => {
                // every marker is a single ASCII byte
                self.pos += 1;
                kind
            }
            None => TagKind::Escaped,
        };
        self.triple_brace = marker == Some('{');
        self.state = match kind {
            TagKind::Delimiters => State::Delimiters,
            kind => State::Body(kind),
        };
        self.emit(TokenKind::Open(kind))
    }

    fn lex_body(&mut self, kind: TagKind) -> Token<'a> {
        let Some(found) = self.rest().find(self.close.as_str()) else {
            return self.fail(LexError::Unclosed(kind));
        };
        let elide_brace = self.triple_brace
            && self.rest()[found..]
                .strip_prefix('}')
                .is_some_and(|r| r.starts_with(self.close.as_str()));
        self.triple_brace = false;

        if found == 0 {
            if elide_brace {
                self.pos += 1;
                self.start = self.pos;
            }
            return self.lex_close();
        }

        self.pos += found;
        let payload = match kind {
            TagKind::Comment => TokenKind::Discard,
            _ => TokenKind::Identifier,
        };
        let token = self.emit(payload);
        if elide_brace {
            self.pos += 1;
            self.start = self.pos;
        }
        self.state = State::CloseTag;
        token
    }

    fn lex_close(&mut self) -> Token<'a> {
        self.pos += self.close.len();
        self.state = State::Text;
        self.emit(TokenKind::CloseTag)
    }

    /// Handles `{{=NEW_OPEN NEW_CLOSE=}}`. The directive ends at the close
    /// delimiter that was active when it was opened.
    fn lex_delimiters(&mut self) -> Token<'a> {
        let Some(found) = self.rest().find(self.close.as_str()) else {
            return self.fail(LexError::Unclosed(TagKind::Delimiters));
        };
        let close_at = self.pos + found;
        let close_len = self.close.len();

        let (open, close) = match parse_change(&self.input[self.pos..close_at]) {
            Ok(pair) => pair,
            Err(err) => return self.fail(err),
        };
        debug!(open = %open, close = %close, "changing delimiters");
        self.open = open;
        self.close = close;

        self.start = close_at;
        self.pos = close_at + close_len;
        self.state = State::Text;
        self.emit(TokenKind::CloseTag)
    }
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Splits a delimiter-change body such as `<% %>=` or ` | | =` into the new
/// open and close delimiters.
fn parse_change(body: &str) -> Result<(String, String), LexError> {
    let body = body.trim_start_matches(is_blank);
    let end = body.find(is_blank).ok_or(LexError::MissingDelimiterSpace)?;
    let open = &body[..end];

    let rest = body[end..].trim_start_matches(is_blank);
    let eq = rest.find('=').ok_or(LexError::MissingDelimiterEquals)?;
    let close: String = rest[..eq].chars().filter(|&c| c != ' ').collect();
    if !rest[eq + 1..].trim_matches(is_blank).is_empty() {
        return Err(LexError::MisplacedDelimiterEquals);
    }
    if open.is_empty() || close.is_empty() {
        return Err(LexError::EmptyDelimiter);
    }
    Ok((open.to_string(), close))
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        loop {
            let token = match self.state {
                State::Done => return None,
                State::Text => self.lex_text(),
                State::OpenTag => Some(self.lex_open_tag()),
                State::Body(kind) => Some(self.lex_body(kind)),
                State::Delimiters => Some(self.lex_delimiters()),
                State::CloseTag => Some(self.lex_close()),
            };
            if token.is_some() {
                return token;
            }
        }
    }
}

impl FusedIterator for Lexer<'_> {}
