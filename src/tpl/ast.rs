use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Text,
    Newline,
    CarriageReturn,
    Space,
    Variable,
    Section,
    InvertedSection,
    Partial,
    List,
    Pipeline,
    Command,
    Chain,
}

/// Whether interpolated output gets HTML-escaped by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EscapeMode {
    Escaped,
    Unescaped,
}

/// 语法树节点。`clone` 会深拷贝整棵子树。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(TextNode),
    Newline(TextNode),
    CarriageReturn(TextNode),
    Space(TextNode),
    Variable(VariableNode),
    Section(SectionNode),
    InvertedSection(InvertedNode),
    Partial(PartialNode),
    List(ListNode),
    Pipeline(PipeNode),
    Command(CommandNode),
    Chain(ChainNode),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Text(_) => NodeKind::Text,
            Node::Newline(_) => NodeKind::Newline,
            Node::CarriageReturn(_) => NodeKind::CarriageReturn,
            Node::Space(_) => NodeKind::Space,
            Node::Variable(_) => NodeKind::Variable,
            Node::Section(_) => NodeKind::Section,
            Node::InvertedSection(_) => NodeKind::InvertedSection,
            Node::Partial(_) => NodeKind::Partial,
            Node::List(_) => NodeKind::List,
            Node::Pipeline(_) => NodeKind::Pipeline,
            Node::Command(_) => NodeKind::Command,
            Node::Chain(_) => NodeKind::Chain,
        }
    }

    /// 节点在模板文本中的字节偏移
    pub fn position(&self) -> usize {
        match self {
            Node::Text(n) | Node::Newline(n) | Node::CarriageReturn(n) | Node::Space(n) => n.pos,
            Node::Variable(n) => n.pos,
            Node::Section(n) => n.pos,
            Node::InvertedSection(n) => n.pos,
            Node::Partial(n) => n.pos,
            Node::List(n) => n.pos,
            Node::Pipeline(n) => n.pos,
            Node::Command(n) => n.pos,
            Node::Chain(n) => n.pos,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(n) | Node::Newline(n) | Node::CarriageReturn(n) | Node::Space(n) => {
                n.fmt(f)
            }
            Node::Variable(n) => n.fmt(f),
            Node::Section(n) => n.fmt(f),
            Node::InvertedSection(n) => n.fmt(f),
            Node::Partial(n) => n.fmt(f),
            Node::List(n) => n.fmt(f),
            Node::Pipeline(n) => n.fmt(f),
            Node::Command(n) => n.fmt(f),
            Node::Chain(n) => n.fmt(f),
        }
    }
}

/// Payload of text, space, newline and carriage-return nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub pos: usize,
    pub text: String,
}

impl TextNode {
    pub fn new(pos: usize, text: &str) -> Self {
        Self {
            pos,
            text: text.to_string(),
        }
    }

    /// Nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl fmt::Display for TextNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// `{{name}}`, `{{{name}}}` or `{{&name}}`; `ident` holds the dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableNode {
    pub pos: usize,
    pub escape: EscapeMode,
    pub ident: Vec<String>,
}

impl VariableNode {
    pub fn new(escape: EscapeMode, pos: usize, ident: &str) -> Self {
        Self {
            pos,
            escape,
            ident: ident.split('.').map(str::to_string).collect(),
        }
    }

    pub fn name(&self) -> &str {
        self.ident.first().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for VariableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ident.join("."))
    }
}

/// `{{#name}}list{{^}}else_list{{/name}}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode {
    pub pos: usize,
    pub name: String,
    pub list: ListNode,
    pub else_list: Option<ListNode>,
}

impl fmt::Display for SectionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{#{}}}}}{}", self.name, self.list)?;
        if let Some(else_list) = &self.else_list {
            write!(f, "{{{{^}}}}{}", else_list)?;
        }
        write!(f, "{{{{/{}}}}}", self.name)
    }
}

/// `{{^name}}list{{/name}}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvertedNode {
    pub pos: usize,
    pub name: String,
    pub list: ListNode,
}

impl fmt::Display for InvertedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{^{}}}}}{}{{{{/{}}}}}", self.name, self.list, self.name)
    }
}

/// `{{>name}}`; resolving the partial is up to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialNode {
    pub pos: usize,
    pub name: String,
}

impl PartialNode {
    pub fn new(pos: usize, name: &str) -> Self {
        Self {
            pos,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for PartialNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{>{}}}}}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListNode {
    pub pos: usize,
    pub nodes: Vec<Node>,
}

impl ListNode {
    pub fn new(pos: usize) -> Self {
        Self {
            pos,
            nodes: Vec::new(),
        }
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    /// 末尾是空白节点时将其移除
    pub(crate) fn pop_space(&mut self) -> bool {
        if matches!(self.nodes.last(), Some(Node::Space(_))) {
            self.nodes.pop();
            return true;
        }
        false
    }
}

impl fmt::Display for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            node.fmt(f)?;
        }
        Ok(())
    }
}

/// 变量声明，后跟以 `|` 分隔的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeNode {
    pub pos: usize,
    pub escape: EscapeMode,
    pub decl: Vec<VariableNode>,
    pub cmds: Vec<CommandNode>,
}

impl fmt::Display for PipeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, close) = match self.escape {
            EscapeMode::Escaped => ("{{", "}}"),
            EscapeMode::Unescaped => ("{{{", "}}}"),
        };
        f.write_str(open)?;
        if !self.decl.is_empty() {
            let names: Vec<String> = self.decl.iter().map(ToString::to_string).collect();
            write!(f, "{} := ", names.join(", "))?;
        }
        for (i, cmd) in self.cmds.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            cmd.fmt(f)?;
        }
        f.write_str(close)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    pub pos: usize,
    pub args: Vec<Node>,
}

impl fmt::Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            arg.fmt(f)?;
        }
        Ok(())
    }
}

/// A term followed by field accesses: `user.address.city`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainNode {
    pub pos: usize,
    pub node: Box<Node>,
    pub fields: Vec<String>,
}

impl fmt::Display for ChainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.fmt(f)?;
        for field in &self.fields {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Node {
        Node::Variable(VariableNode::new(EscapeMode::Escaped, 0, name))
    }

    #[test]
    fn test_variable_path() {
        let v = VariableNode::new(EscapeMode::Unescaped, 4, "user.address.city");
        assert_eq!(v.ident, vec!["user", "address", "city"]);
        assert_eq!(v.name(), "user");
        assert_eq!(v.to_string(), "user.address.city");
    }

    #[test]
    fn test_section_display() {
        let mut list = ListNode::new(9);
        list.push(var("item"));
        let mut else_list = ListNode::new(20);
        else_list.push(Node::Text(TextNode::new(25, "none")));
        let section = Node::Section(SectionNode {
            pos: 0,
            name: "list".into(),
            list,
            else_list: Some(else_list),
        });
        assert_eq!(section.kind(), NodeKind::Section);
        assert_eq!(section.to_string(), "{{#list}}item{{^}}none{{/list}}");
    }

    #[test]
    fn test_pipeline_display() {
        let pipe = PipeNode {
            pos: 2,
            escape: EscapeMode::Unescaped,
            decl: vec![VariableNode::new(EscapeMode::Unescaped, 2, "x")],
            cmds: vec![
                CommandNode {
                    pos: 7,
                    args: vec![var("a"), var("b")],
                },
                CommandNode {
                    pos: 13,
                    args: vec![Node::Chain(ChainNode {
                        pos: 13,
                        node: Box::new(var("c")),
                        fields: vec!["d".into()],
                    })],
                },
            ],
        };
        assert_eq!(pipe.to_string(), "{{{x := a b | c.d}}}");
    }

    #[test]
    fn test_copy_is_deep() {
        let mut list = ListNode::new(0);
        list.push(Node::Text(TextNode::new(0, "hello")));
        list.push(Node::Partial(PartialNode::new(5, "footer")));
        let original = Node::List(list);

        let mut copy = original.clone();
        if let Node::List(l) = &mut copy {
            l.nodes.pop();
            if let Some(Node::Text(t)) = l.nodes.first_mut() {
                t.text.push_str(" world");
            }
        }
        assert_eq!(original.to_string(), "hello{{>footer}}");
        assert_eq!(copy.to_string(), "hello world");
        assert_eq!(original.position(), 0);
    }

    #[test]
    fn test_pop_space() {
        let mut list = ListNode::new(0);
        list.push(Node::Text(TextNode::new(0, "a")));
        assert!(!list.pop_space());
        list.push(Node::Space(TextNode::new(1, "  ")));
        assert!(list.pop_space());
        assert_eq!(list.len(), 1);
    }
}
