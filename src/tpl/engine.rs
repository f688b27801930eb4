use std::thread;

use tracing::debug;

use crate::error::TemplateError;
use crate::models::parse_options::ParseOptions;
use crate::tpl::channel::TokenStream;
use crate::tpl::lexer::Lexer;
use crate::tpl::parser::Parser;
use crate::tpl::pipeline::Scope;
use crate::tpl::tree::{TemplateSet, Tree};

/// 解析模板，成功时把顶层树与各 section 树合并进 `set`
pub(crate) fn parse_template(
    name: &str,
    text: &str,
    options: &ParseOptions,
    set: &TemplateSet,
) -> Result<Tree, TemplateError> {
    run(name, text, options, set, true)
}

/// 同 `parse_template`，但顶层树不写入 `set`，只合并 section 树
pub(crate) fn parse_sections(
    name: &str,
    text: &str,
    options: &ParseOptions,
    set: &TemplateSet,
) -> Result<Tree, TemplateError> {
    run(name, text, options, set, false)
}

fn run(
    name: &str,
    text: &str,
    options: &ParseOptions,
    set: &TemplateSet,
    register_root: bool,
) -> Result<Tree, TemplateError> {
    debug!(
        name,
        default_delimiters = options.delimiters.is_default(),
        helpers = options.helpers.len(),
        threaded = options.threaded,
        register_root,
        "parsing template"
    );
    let lexer = Lexer::new(text, &options.delimiters);
    let scope = Scope::with_names(&options.variables);

    if options.threaded {
        // the parser owns the receiver; the scope joins the lexer thread
        thread::scope(|s| {
            let tokens = TokenStream::spawn(s, lexer);
            parser(name, text, tokens, scope, set, register_root).parse()
        })
    } else {
        parser(name, text, TokenStream::inline(lexer), scope, set, register_root).parse()
    }
}

fn parser<'a, 's>(
    name: &'a str,
    text: &'a str,
    tokens: TokenStream<'a>,
    scope: Scope,
    set: &'s TemplateSet,
    register_root: bool,
) -> Parser<'a, 's> {
    let parser = Parser::new(name, text, tokens, scope, set);
    if register_root { parser } else { parser.sections_only() }
}
