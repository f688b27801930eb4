use tracing::trace;

use crate::error::{ParseError, TemplateError, quote_context};
use crate::tpl::ast::{ChainNode, CommandNode, EscapeMode, Node, PipeNode, VariableNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordKind {
    Ident,
    Comma,
    Pipe,
    Declare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Word<'a> {
    kind: WordKind,
    pos: usize,
    value: &'a str,
}

/// Splits a tag body into words. `base` is the body's offset in the
/// template so word positions stay absolute.
fn scan(body: &str, base: usize) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    let mut i = 0;
    while let Some(c) = body[i..].chars().next() {
        let rest = &body[i..];
        let (kind, len) = match c {
            c if c.is_whitespace() => {
                i += c.len_utf8();
                continue;
            }
            ',' => (WordKind::Comma, 1),
            '|' => (WordKind::Pipe, 1),
            ':' if rest.starts_with(":=") => (WordKind::Declare, 2),
            _ => (WordKind::Ident, ident_len(rest)),
        };
        words.push(Word {
            kind,
            pos: base + i,
            value: &rest[..len],
        });
        i += len;
    }
    words
}

fn ident_len(s: &str) -> usize {
    s.char_indices()
        .find(|&(i, c)| c.is_whitespace() || c == ',' || c == '|' || s[i..].starts_with(":="))
        .map_or(s.len(), |(i, _)| i)
}

/// 管道可见的变量名，每个打开的 section 对应一层
#[derive(Debug, Default)]
pub(crate) struct Scope {
    names: Vec<String>,
    marks: Vec<usize>,
}

impl Scope {
    pub(crate) fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names.into_iter().map(|n| n.as_ref().to_string()).collect(),
            marks: Vec::new(),
        }
    }

    pub(crate) fn enter(&mut self) {
        self.marks.push(self.names.len());
    }

    /// 丢弃对应 `enter` 之后声明的所有变量
    pub(crate) fn exit(&mut self) {
        if let Some(mark) = self.marks.pop() {
            self.names.truncate(mark);
        }
    }

    pub(crate) fn declare(&mut self, name: &str) {
        self.names.push(name.to_string());
    }

    pub(crate) fn is_declared(&self, name: &str) -> bool {
        self.names.iter().rev().any(|n| n == name)
    }
}

/// Parses the body of an interpolation tag:
///
/// ```text
/// pipeline     := [declarations ":="] command ("|" command)*
/// declarations := identifier ("," identifier)*
/// command      := operand (operand)*
/// ```
pub(crate) struct PipelineParser<'a, 's> {
    name: &'a str,
    text: &'a str,
    words: Vec<Word<'a>>,
    index: usize,
    escape: EscapeMode,
    scope: &'s mut Scope,
    // close delimiter position, reported when the body runs out
    end: usize,
}

impl<'a, 's> PipelineParser<'a, 's> {
    pub(crate) fn new(
        name: &'a str,
        text: &'a str,
        body: &'a str,
        pos: usize,
        end: usize,
        escape: EscapeMode,
        scope: &'s mut Scope,
    ) -> Self {
        Self {
            name,
            text,
            words: scan(body, pos),
            index: 0,
            escape,
            scope,
            end,
        }
    }

    /// A pipeline made of one bare operand collapses into a `Variable`.
    pub(crate) fn parse(mut self) -> Result<Node, TemplateError> {
        let pos = self.words.first().map_or(self.end, |w| w.pos);
        let decl = self.declarations()?;
        if self.peek().is_none() {
            return Err(self.error(self.end, ParseError::MissingValue("command")));
        }

        let mut cmds = vec![self.command()?];
        while self.consume(WordKind::Pipe) {
            cmds.push(self.command()?);
        }
        for v in &decl {
            self.scope.declare(v.name());
        }

        if decl.is_empty() && cmds.len() == 1 && cmds[0].args.len() == 1 {
            if let Some(arg) = cmds.pop().and_then(|c| c.args.into_iter().next()) {
                return Ok(collapse(arg));
            }
        }
        trace!(pos, decl = decl.len(), cmds = cmds.len(), "pipeline");
        Ok(Node::Pipeline(PipeNode {
            pos,
            escape: self.escape,
            decl,
            cmds,
        }))
    }

    fn declarations(&mut self) -> Result<Vec<VariableNode>, TemplateError> {
        let save = self.index;
        let mut names = Vec::new();
        while let Some(word) = self.peek() {
            if word.kind != WordKind::Ident {
                break;
            }
            names.push(word);
            self.index += 1;
            if !self.consume(WordKind::Comma) {
                break;
            }
        }
        if names.is_empty() || !self.consume(WordKind::Declare) {
            self.index = save;
            return Ok(Vec::new());
        }

        let mut decl = Vec::with_capacity(names.len());
        for word in names {
            if word.value.contains('.') {
                return Err(self.unexpected(word, "declaration"));
            }
            decl.push(VariableNode::new(self.escape, word.pos, word.value));
        }
        Ok(decl)
    }

    fn command(&mut self) -> Result<CommandNode, TemplateError> {
        let pos = self.peek().map_or(self.end, |w| w.pos);
        let mut args = Vec::new();
        while let Some(word) = self.peek() {
            match word.kind {
                WordKind::Pipe => break,
                WordKind::Ident => {
                    self.index += 1;
                    args.push(self.operand(word)?);
                }
                WordKind::Comma | WordKind::Declare => {
                    return Err(self.unexpected(word, "operand"));
                }
            }
        }
        if args.is_empty() {
            return Err(self.error(pos, ParseError::EmptyCommand));
        }
        Ok(CommandNode { pos, args })
    }

    // term .field*
    fn operand(&self, word: Word<'a>) -> Result<Node, TemplateError> {
        let mut segments = word.value.split('.');
        let head = segments.next().unwrap_or_default();
        let fields: Vec<String> = segments.map(str::to_string).collect();
        if head.is_empty() || fields.iter().any(String::is_empty) {
            return Err(self.unexpected(word, "operand"));
        }
        if !self.scope.is_declared(head) {
            return Err(self.error(word.pos, ParseError::UndefinedVariable(head.to_string())));
        }

        let term = Node::Variable(VariableNode::new(self.escape, word.pos, head));
        if fields.is_empty() {
            return Ok(term);
        }
        Ok(Node::Chain(ChainNode {
            pos: word.pos,
            node: Box::new(term),
            fields,
        }))
    }

    fn peek(&self) -> Option<Word<'a>> {
        self.words.get(self.index).copied()
    }

    fn consume(&mut self, kind: WordKind) -> bool {
        if self.peek().is_some_and(|w| w.kind == kind) {
            self.index += 1;
            return true;
        }
        false
    }

    fn unexpected(&self, word: Word<'_>, context: &'static str) -> TemplateError {
        self.error(
            word.pos,
            ParseError::Unexpected {
                found: quote_context(word.value),
                context,
            },
        )
    }

    fn error(&self, pos: usize, err: ParseError) -> TemplateError {
        TemplateError::at(self.name, self.text, pos, err)
    }
}

fn collapse(node: Node) -> Node {
    match node {
        Node::Chain(ChainNode { pos, node, fields }) => match *node {
            Node::Variable(mut v) => {
                v.ident.extend(fields);
                Node::Variable(v)
            }
            other => Node::Chain(ChainNode {
                pos,
                node: Box::new(other),
                fields,
            }),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parse(body: &str, names: &[&str]) -> Result<Node, TemplateError> {
        let mut scope = Scope::with_names(names);
        PipelineParser::new("t", body, body, 0, body.len(), EscapeMode::Escaped, &mut scope)
            .parse()
    }

    fn parse_err(body: &str, names: &[&str]) -> ParseError {
        match parse(body, names).unwrap_err().kind {
            ErrorKind::Parse(e) => e,
            ErrorKind::Lex(e) => panic!("unexpected lex error {e}"),
        }
    }

    #[test]
    fn test_scan_words() {
        let words = scan(" x, y:=a.b |c", 10);
        let kinds: Vec<WordKind> = words.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WordKind::Ident,
                WordKind::Comma,
                WordKind::Ident,
                WordKind::Declare,
                WordKind::Ident,
                WordKind::Pipe,
                WordKind::Ident,
            ]
        );
        assert_eq!(words[0].pos, 11);
        assert_eq!(words[4].value, "a.b");
        assert_eq!(scan("a:b", 0)[0].value, "a:b");
    }

    #[test]
    fn test_single_operand_collapses() {
        let node = parse("user.name", &["user"]).unwrap();
        match node {
            Node::Variable(v) => assert_eq!(v.ident, vec!["user", "name"]),
            other => panic!("expected variable, got {other:?}"),
        }
    }

    #[test]
    fn test_pipeline_with_chain() {
        let node = parse("fmt a.b | upper", &["fmt", "a", "upper"]).unwrap();
        let Node::Pipeline(pipe) = node else {
            panic!("expected pipeline");
        };
        assert_eq!(pipe.cmds.len(), 2);
        assert_eq!(pipe.cmds[0].args[1].kind(), crate::tpl::ast::NodeKind::Chain);
        assert_eq!(pipe.to_string(), "{{fmt a.b | upper}}");
    }

    #[test]
    fn test_declaration_registers_names() {
        let mut scope = Scope::with_names(["items"]);
        let body = "x, y := items";
        let node = PipelineParser::new("t", body, body, 0, body.len(), EscapeMode::Escaped, &mut scope)
            .parse()
            .unwrap();
        assert_eq!(node.to_string(), "{{x, y := items}}");
        assert!(scope.is_declared("x"));
        assert!(scope.is_declared("y"));
    }

    #[test]
    fn test_declared_name_not_visible_to_own_pipeline() {
        assert_eq!(
            parse_err("x := x", &[]),
            ParseError::UndefinedVariable("x".into())
        );
    }

    #[test]
    fn test_undefined_variable() {
        let err = parse("item", &["list"]).unwrap_err();
        assert_eq!(err.to_string(), "template: t:1:0: undefined variable \"item\"");
    }

    #[test]
    fn test_grammar_errors() {
        assert_eq!(parse_err("", &[]), ParseError::MissingValue("command"));
        assert_eq!(parse_err("x :=", &[]), ParseError::MissingValue("command"));
        assert_eq!(parse_err("a |", &["a"]), ParseError::EmptyCommand);
        assert_eq!(parse_err("| a", &["a"]), ParseError::EmptyCommand);
        assert_eq!(
            parse_err("a , b", &["a", "b"]),
            ParseError::Unexpected {
                found: "\",\"".into(),
                context: "operand"
            }
        );
        assert_eq!(
            parse_err("a..b", &["a"]),
            ParseError::Unexpected {
                found: "\"a..b\"".into(),
                context: "operand"
            }
        );
        assert_eq!(
            parse_err("a.b := c", &["c"]),
            ParseError::Unexpected {
                found: "\"a.b\"".into(),
                context: "declaration"
            }
        );
    }

    #[test]
    fn test_scope_blocks() {
        let mut scope = Scope::with_names(["root"]);
        scope.enter();
        scope.declare("inner");
        assert!(scope.is_declared("inner"));
        scope.exit();
        assert!(!scope.is_declared("inner"));
        assert!(scope.is_declared("root"));
        // unbalanced exit leaves predeclared names alone
        scope.exit();
        assert!(scope.is_declared("root"));
    }
}
