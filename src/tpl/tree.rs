use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::error::{ParseError, locate, quote_context};
use crate::tpl::ast::{ListNode, Node};

/// 解析结果：顶层模板或某个 section 的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub name: String,
    /// Name of the top-level template this tree was parsed from.
    pub parse_name: String,
    pub root: Option<ListNode>,
    pub text: String,
}

impl Tree {
    pub fn new(name: &str, parse_name: &str, root: ListNode, text: &str) -> Self {
        Self {
            name: name.to_string(),
            parse_name: parse_name.to_string(),
            root: Some(root),
            text: text.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        is_empty_tree(self.root.as_ref())
    }

    pub fn nodes(&self) -> &[Node] {
        self.root.as_ref().map(|r| r.nodes.as_slice()).unwrap_or_default()
    }

    /// `("<parse_name>:<line>:<col>", quoted node text)` for reporting a
    /// problem found at `node` after parsing, e.g. by an executor.
    pub fn error_context(&self, node: &Node) -> (String, String) {
        let (line, col) = locate(&self.text, node.position());
        (
            format!("{}:{}:{}", self.parse_name, line, col),
            quote_context(&node.to_string()),
        )
    }
}

/// True when `root` is absent or holds nothing but whitespace-only text.
pub fn is_empty_tree(root: Option<&ListNode>) -> bool {
    root.is_none_or(|list| {
        list.iter().all(|node| match node {
            Node::Text(text) => text.is_blank(),
            _ => false,
        })
    })
}

/// 模板注册表，按名称存放解析结果。可在多个线程间共享。
#[derive(Debug, Default)]
pub struct TemplateSet {
    trees: DashMap<String, Arc<Tree>>,
    // serializes writers so a batch is checked and stored as one step
    commit: Mutex<()>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按名称取出已注册的树
    pub fn get(&self, name: &str) -> Option<Arc<Tree>> {
        self.trees.get(name).map(|t| Arc::clone(t.value()))
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// 已注册的模板名，按字典序排列
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.trees.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// 写入 `tree` 是否会重复定义一个非空模板
    pub fn conflicts(&self, tree: &Tree) -> bool {
        !tree.is_empty() && self.trees.get(&tree.name).is_some_and(|t| !t.is_empty())
    }

    /// 注册单棵树：已有的空定义会被替换，空的新定义不会覆盖非空定义。
    /// 返回是否实际写入。
    pub fn add(&self, tree: Tree) -> Result<bool, ParseError> {
        let _guard = self.lock();
        self.store(tree)
    }

    /// 批量注册：要么全部写入，要么一棵都不写。
    /// 遇到第一棵冲突的树即返回错误，注册表保持原样。返回实际写入的数量。
    pub fn add_all(&self, trees: Vec<Tree>) -> Result<usize, ParseError> {
        let _guard = self.lock();

        // name -> whether the definition it would end up with is empty
        let mut pending: HashMap<&str, bool> = HashMap::new();
        for tree in &trees {
            let existing_empty = match pending.get(tree.name.as_str()) {
                Some(&empty) => Some(empty),
                None => self.trees.get(&tree.name).map(|t| t.is_empty()),
            };
            match existing_empty {
                Some(false) if !tree.is_empty() => {
                    return Err(ParseError::DuplicateTemplate(tree.name.clone()));
                }
                Some(false) => {}
                _ => {
                    pending.insert(tree.name.as_str(), tree.is_empty());
                }
            }
        }

        let mut stored = 0;
        for tree in trees {
            if self.store(tree)? {
                stored += 1;
            }
        }
        Ok(stored)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.commit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, tree: Tree) -> Result<bool, ParseError> {
        match self.trees.entry(tree.name.clone()) {
            Entry::Vacant(e) => {
                debug!(name = %tree.name, "registering template");
                e.insert(Arc::new(tree));
                Ok(true)
            }
            Entry::Occupied(mut e) => {
                if e.get().is_empty() {
                    debug!(name = %tree.name, "replacing empty template");
                    e.insert(Arc::new(tree));
                    Ok(true)
                } else if tree.is_empty() {
                    Ok(false)
                } else {
                    Err(ParseError::DuplicateTemplate(tree.name))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tpl::ast::{PartialNode, TextNode};

    fn tree(name: &str, nodes: Vec<Node>) -> Tree {
        let mut list = ListNode::new(0);
        for node in nodes {
            list.push(node);
        }
        Tree::new(name, "page", list, "")
    }

    fn text(s: &str) -> Node {
        Node::Text(TextNode::new(0, s))
    }

    #[test]
    fn test_empty_tree() {
        assert!(is_empty_tree(None));
        assert!(tree("a", vec![]).is_empty());
        assert!(tree("a", vec![text("  \t")]).is_empty());
        assert!(!tree("a", vec![text(" x ")]).is_empty());
        assert!(!tree("a", vec![Node::Space(TextNode::new(0, " "))]).is_empty());
        assert!(!tree("a", vec![Node::Partial(PartialNode::new(0, "p"))]).is_empty());
    }

    #[test]
    fn test_add_and_replace() {
        let set = TemplateSet::new();
        assert!(set.add(tree("a", vec![])).unwrap());
        assert!(set.add(tree("a", vec![text("body")])).unwrap());
        assert_eq!(set.get("a").unwrap().nodes().len(), 1);

        // empty never replaces non-empty
        assert!(!set.add(tree("a", vec![])).unwrap());
        assert_eq!(set.get("a").unwrap().nodes().len(), 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_multiple_definition() {
        let set = TemplateSet::new();
        set.add(tree("a", vec![text("one")])).unwrap();
        let second = tree("a", vec![text("two")]);
        assert!(set.conflicts(&second));
        assert_eq!(
            set.add(second).unwrap_err(),
            ParseError::DuplicateTemplate("a".into())
        );
    }

    #[test]
    fn test_add_all_is_all_or_nothing() {
        let set = TemplateSet::new();
        set.add(tree("y", vec![text("kept")])).unwrap();

        let batch = vec![tree("x", vec![text("1")]), tree("y", vec![text("2")])];
        assert_eq!(
            set.add_all(batch).unwrap_err(),
            ParseError::DuplicateTemplate("y".into())
        );
        assert!(set.get("x").is_none());
        assert_eq!(set.get("y").unwrap().nodes()[0].to_string(), "kept");

        // within a batch an empty definition yields to a real one
        let batch = vec![
            tree("x", vec![]),
            tree("x", vec![text("1")]),
            tree("y", vec![]),
        ];
        assert_eq!(set.add_all(batch).unwrap(), 2);
        assert_eq!(set.get("x").unwrap().nodes().len(), 1);
        assert_eq!(set.names(), vec!["x", "y"]);
    }

    #[test]
    fn test_names_sorted() {
        let set = TemplateSet::new();
        set.add(tree("b", vec![text("x")])).unwrap();
        set.add(tree("a", vec![text("x")])).unwrap();
        assert_eq!(set.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_error_context() {
        let mut list = ListNode::new(0);
        let node = Node::Partial(PartialNode::new(9, "a_rather_long_partial_name"));
        list.push(node.clone());
        let t = Tree::new("page", "page", list, "line one\n{{>a_rather_long_partial_name}}");
        let (location, context) = t.error_context(&node);
        assert_eq!(location, "page:2:0");
        assert_eq!(context, "\"{{>a_rather_long_par\"...");
    }
}
