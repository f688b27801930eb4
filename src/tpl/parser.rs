use tracing::{debug, trace};

use crate::error::{ErrorKind, ParseError, TemplateError};
use crate::tpl::ast::{
    EscapeMode, InvertedNode, ListNode, Node, PartialNode, SectionNode, TextNode,
};
use crate::tpl::channel::TokenStream;
use crate::tpl::pipeline::{PipelineParser, Scope};
use crate::tpl::token::{TagKind, Token, TokenKind};
use crate::tpl::tree::{TemplateSet, Tree};

/// Outcome of parsing one item.
enum Step {
    Node(Node),
    // comment or delimiter change
    Skip,
    End { pos: usize, name: String },
    Else { pos: usize },
    Eof { pos: usize },
}

/// 递归下降解析器：三个 token 的前瞻缓冲，
/// 外加三个 token 的历史记录，用于独立标签的空白消除。
pub(crate) struct Parser<'a, 's> {
    name: &'a str,
    text: &'a str,
    tokens: TokenStream<'a>,
    lookahead: [Token<'a>; 3],
    peek_count: usize,
    history: [Token<'a>; 3],
    glance_count: usize,
    scope: Scope,
    // 待注册的 section 树，整个模板解析成功后才写入
    defined: Vec<(usize, Tree)>,
    set: &'s TemplateSet,
    register_root: bool,
}

impl<'a, 's> Parser<'a, 's> {
    pub(crate) fn new(
        name: &'a str,
        text: &'a str,
        tokens: TokenStream<'a>,
        scope: Scope,
        set: &'s TemplateSet,
    ) -> Self {
        let blank = Token::eof(0);
        Self {
            name,
            text,
            tokens,
            lookahead: [blank; 3],
            peek_count: 0,
            history: [blank; 3],
            glance_count: 0,
            scope,
            defined: Vec::new(),
            set,
            register_root: true,
        }
    }

    /// 只把 section 树写入注册表，顶层树仅返回给调用方
    pub(crate) fn sections_only(mut self) -> Self {
        self.register_root = false;
        self
    }

    /// 解析整个模板。成功时顶层树与各 section 树一次性写入注册表，失败时什么都不写。
    pub(crate) fn parse(mut self) -> Result<Tree, TemplateError> {
        let root = self.root_list()?;
        let tree = Tree::new(self.name, self.name, root, self.text);
        if self.register_root {
            self.register(0, tree.clone())?;
        }
        self.commit()?;
        debug!(name = self.name, nodes = tree.nodes().len(), "parsed template");
        Ok(tree)
    }

    fn pull(&mut self) -> Token<'a> {
        let end = self.text.len();
        self.tokens.next().unwrap_or(Token::eof(end))
    }

    fn next(&mut self) -> Token<'a> {
        if self.peek_count > 0 {
            self.peek_count -= 1;
        } else {
            self.lookahead[0] = self.pull();
        }
        self.lookahead[self.peek_count]
    }

    fn peek(&mut self) -> Token<'a> {
        if self.peek_count > 0 {
            return self.lookahead[self.peek_count - 1];
        }
        self.peek_count = 1;
        self.lookahead[0] = self.pull();
        self.lookahead[0]
    }

    fn backup(&mut self) {
        self.peek_count += 1;
    }

    /// Backs up two tokens; `t1` is the one read first.
    fn backup2(&mut self, t1: Token<'a>) {
        self.lookahead[1] = t1;
        self.peek_count = 2;
    }

    fn remember(&mut self, token: Token<'a>) {
        self.history[2] = self.history[1];
        self.history[1] = self.history[0];
        self.history[0] = token;
        self.glance_count = (self.glance_count + 1).min(self.history.len());
    }

    fn error(&self, pos: usize, kind: impl Into<ErrorKind>) -> TemplateError {
        TemplateError::at(self.name, self.text, pos, kind)
    }

    fn unexpected(&self, token: Token<'_>, context: &'static str) -> TemplateError {
        match token.kind {
            TokenKind::Error(err) => self.error(token.pos, err),
            _ => self.error(
                token.pos,
                ParseError::Unexpected {
                    found: token.to_string(),
                    context,
                },
            ),
        }
    }

    fn expect_close(&mut self, context: &'static str) -> Result<Token<'a>, TemplateError> {
        let token = self.next();
        if token.kind != TokenKind::CloseTag {
            return Err(self.unexpected(token, context));
        }
        Ok(token)
    }

    fn root_list(&mut self) -> Result<ListNode, TemplateError> {
        let mut list = ListNode::new(0);
        loop {
            match self.item(&mut list)? {
                Step::Node(node) => list.push(node),
                Step::Skip => {}
                Step::Eof { .. } => return Ok(list),
                Step::End { pos, name } => {
                    return Err(self.error(pos, ParseError::UnexpectedEnd(name)));
                }
                Step::Else { pos } => {
                    return Err(self.error(pos, ParseError::UnexpectedElse("template")));
                }
            }
        }
    }

    // `list` is the list under construction, for standalone elision.
    fn item(&mut self, list: &mut ListNode) -> Result<Step, TemplateError> {
        let token = self.next();
        self.remember(token);
        let step = match token.kind {
            TokenKind::Text => Step::Node(Node::Text(TextNode::new(token.pos, token.value))),
            TokenKind::Space => Step::Node(Node::Space(TextNode::new(token.pos, token.value))),
            TokenKind::Newline => Step::Node(Node::Newline(TextNode::new(token.pos, token.value))),
            TokenKind::CarriageReturn => {
                Step::Node(Node::CarriageReturn(TextNode::new(token.pos, token.value)))
            }
            TokenKind::Eof => Step::Eof { pos: token.pos },
            TokenKind::Error(err) => return Err(self.error(token.pos, err)),
            TokenKind::Open(kind @ (TagKind::Comment | TagKind::Delimiters)) => {
                self.skip_tag(kind)?;
                self.standalone(list);
                Step::Skip
            }
            TokenKind::Open(kind @ (TagKind::Section | TagKind::Inverted)) => {
                self.section(token, kind)?
            }
            TokenKind::Open(TagKind::EndSection) => Step::End {
                pos: token.pos,
                name: self.tag_name(TagKind::EndSection)?,
            },
            TokenKind::Open(TagKind::Partial) => {
                let name = self.tag_name(TagKind::Partial)?;
                Step::Node(Node::Partial(PartialNode::new(token.pos, &name)))
            }
            TokenKind::Open(kind @ (TagKind::Escaped | TagKind::Unescaped)) => {
                Step::Node(self.action(kind)?)
            }
            TokenKind::CloseTag | TokenKind::Identifier | TokenKind::Discard => {
                return Err(self.unexpected(token, "template"));
            }
        };
        Ok(step)
    }

    fn skip_tag(&mut self, kind: TagKind) -> Result<(), TemplateError> {
        loop {
            let token = self.next();
            match token.kind {
                TokenKind::CloseTag => return Ok(()),
                TokenKind::Discard | TokenKind::Identifier => {}
                _ => return Err(self.unexpected(token, kind.as_str())),
            }
        }
    }

    /// Payload of a section, end or partial tag, followed by its close.
    fn tag_name(&mut self, kind: TagKind) -> Result<String, TemplateError> {
        let token = self.next();
        let name = match token.kind {
            TokenKind::Identifier | TokenKind::Discard if !token.value.trim().is_empty() => {
                token.value.trim()
            }
            _ => return Err(self.unexpected(token, kind.as_str())),
        };
        self.expect_close(kind.as_str())?;
        Ok(name.to_string())
    }

    /// 注释或分隔符修改标签独占一行时，连同缩进和行尾一起消除
    fn standalone(&mut self, list: &mut ListNode) {
        if !self.leading_standalone() || !self.trailing_standalone() {
            return;
        }
        let indent = list.pop_space();
        trace!(indent, "standalone tag elided");
    }

    fn leading_standalone(&self) -> bool {
        if self.glance_count < 2 {
            return true;
        }
        match self.history[1].kind {
            TokenKind::Newline => true,
            TokenKind::Space => self.glance_count < 3 || self.history[2].kind == TokenKind::Newline,
            _ => false,
        }
    }

    // Consumes the trailing line ending when the tag is standalone.
    fn trailing_standalone(&mut self) -> bool {
        let t1 = self.next();
        match t1.kind {
            TokenKind::Eof => {
                self.backup();
                true
            }
            TokenKind::Newline => {
                self.remember(t1);
                true
            }
            TokenKind::CarriageReturn => {
                self.remember(t1);
                self.consume_line_end();
                true
            }
            TokenKind::Space => {
                let t2 = self.next();
                if !t2.kind.is_line_end() {
                    self.backup2(t1);
                    return false;
                }
                self.remember(t1);
                self.remember(t2);
                if t2.kind == TokenKind::CarriageReturn {
                    self.consume_line_end();
                }
                true
            }
            _ => {
                self.backup();
                false
            }
        }
    }

    // The `\n` of a `\r\n` pair.
    fn consume_line_end(&mut self) {
        let token = self.peek();
        if token.kind == TokenKind::Newline {
            self.next();
            self.remember(token);
        }
    }

    fn section(&mut self, open: Token<'a>, kind: TagKind) -> Result<Step, TemplateError> {
        if kind == TagKind::Inverted && self.peek().kind == TokenKind::CloseTag {
            self.next();
            return Ok(Step::Else { pos: open.pos });
        }
        let name = self.tag_name(kind)?;
        trace!(name = %name, %kind, "entering section");

        self.scope.enter();
        let body = self.section_body(&name, kind);
        self.scope.exit();
        let (list, else_list) = body?;

        self.register(open.pos, Tree::new(&name, self.name, list.clone(), self.text))?;
        let node = match kind {
            TagKind::Inverted => Node::InvertedSection(InvertedNode {
                pos: open.pos,
                name,
                list,
            }),
            _ => Node::Section(SectionNode {
                pos: open.pos,
                name,
                list,
                else_list,
            }),
        };
        Ok(Step::Node(node))
    }

    fn section_body(
        &mut self,
        name: &str,
        kind: TagKind,
    ) -> Result<(ListNode, Option<ListNode>), TemplateError> {
        let start = self.peek().pos;
        let mut list = ListNode::new(start);
        let mut else_list: Option<ListNode> = None;
        loop {
            let current = match else_list.as_mut() {
                Some(l) => l,
                None => &mut list,
            };
            match self.item(current)? {
                Step::Node(node) => current.push(node),
                Step::Skip => {}
                Step::Else { pos } => {
                    if kind == TagKind::Inverted {
                        return Err(self.error(pos, ParseError::UnexpectedElse("inverted section")));
                    }
                    if else_list.is_some() {
                        return Err(self.error(pos, ParseError::UnexpectedElse("section")));
                    }
                    else_list = Some(ListNode::new(pos));
                }
                Step::End { pos, name: found } => {
                    if found != name {
                        return Err(self.error(
                            pos,
                            ParseError::SectionMismatch {
                                expected: name.to_string(),
                                found,
                            },
                        ));
                    }
                    return Ok((list, else_list));
                }
                Step::Eof { pos } => {
                    return Err(self.error(pos, ParseError::UnclosedSection(name.to_string())));
                }
            }
        }
    }

    fn action(&mut self, kind: TagKind) -> Result<Node, TemplateError> {
        let escape = match kind {
            TagKind::Unescaped => EscapeMode::Unescaped,
            _ => EscapeMode::Escaped,
        };
        let body = self.next();
        match body.kind {
            TokenKind::Identifier => {}
            TokenKind::CloseTag => {
                return Err(self.error(body.pos, ParseError::MissingValue("command")));
            }
            _ => return Err(self.unexpected(body, kind.as_str())),
        }
        let end = self.peek().pos;
        let node = PipelineParser::new(
            self.name,
            self.text,
            body.value,
            body.pos,
            end,
            escape,
            &mut self.scope,
        )
        .parse()?;
        self.expect_close(kind.as_str())?;
        Ok(node)
    }

    /// 暂存一个定义。规则同 `TemplateSet::add`，
    /// 同时检查注册表和本模板中更早的定义。
    fn register(&mut self, pos: usize, tree: Tree) -> Result<(), TemplateError> {
        if self.set.conflicts(&tree) {
            return Err(self.error(pos, ParseError::DuplicateTemplate(tree.name)));
        }
        if let Some(i) = self.defined.iter().position(|(_, t)| t.name == tree.name) {
            if self.defined[i].1.is_empty() {
                self.defined[i] = (pos, tree);
            } else if !tree.is_empty() {
                return Err(self.error(pos, ParseError::DuplicateTemplate(tree.name)));
            }
            return Ok(());
        }
        debug!(name = %tree.name, "section defined");
        self.defined.push((pos, tree));
        Ok(())
    }

    /// 把暂存的树作为一批写入；`register` 之后才出现的冲突不会留下部分写入
    fn commit(&mut self) -> Result<(), TemplateError> {
        let defined = std::mem::take(&mut self.defined);
        let positions: Vec<(usize, String)> =
            defined.iter().map(|(pos, t)| (*pos, t.name.clone())).collect();
        let trees = defined.into_iter().map(|(_, t)| t).collect();
        self.set.add_all(trees).map(|_| ()).map_err(|e| {
            let pos = match &e {
                ParseError::DuplicateTemplate(name) => positions
                    .iter()
                    .find(|(_, n)| n == name)
                    .map_or(0, |(pos, _)| *pos),
                _ => 0,
            };
            self.error(pos, e)
        })
    }
}
