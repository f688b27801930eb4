pub mod error;
pub mod models;
pub mod tpl;

pub use error::{ErrorKind, LexError, ParseError, TemplateError};
pub use models::delimiters::Delimiters;
pub use models::parse_options::ParseOptions;
pub use tpl::ast::{EscapeMode, ListNode, Node, NodeKind};
pub use tpl::lexer::Lexer;
pub use tpl::token::{TagKind, Token, TokenKind};
pub use tpl::tree::{TemplateSet, Tree, is_empty_tree};

/// `parse_with_delimiters` 返回的顶层树名称
pub const DEFAULT_NAME: &str = "parse";

/// 使用默认分隔符解析模板，结果写入一个新的注册表。
pub fn parse(name: &str, text: &str) -> Result<Tree, TemplateError> {
    tpl::engine::parse_template(name, text, &ParseOptions::default(), &TemplateSet::new())
}

/// 以 [`DEFAULT_NAME`] 为名、按给定的初始分隔符解析模板。
/// 只有 section 树会合并进 `set`，顶层树直接返回，所以同一个 `set`
/// 可以反复调用。
/// `open` 或 `close` 为空时该侧使用默认分隔符。
pub fn parse_with_delimiters(
    text: &str,
    open: &str,
    close: &str,
    set: &TemplateSet,
) -> Result<Tree, TemplateError> {
    let options = ParseOptions::new().delimiters(open, close);
    tpl::engine::parse_sections(DEFAULT_NAME, text, &options, set)
}

/// 按 `options` 解析模板，成功时顶层树与 section 树一起写入 `set`
pub fn parse_with_options(
    name: &str,
    text: &str,
    options: &ParseOptions,
    set: &TemplateSet,
) -> Result<Tree, TemplateError> {
    tpl::engine::parse_template(name, text, options, set)
}
