use std::sync::mpsc::{Receiver, sync_channel};
use std::thread::{self, Scope};

use tracing::{trace, warn};

use crate::tpl::lexer::Lexer;
use crate::tpl::token::Token;

/// Slots between the tokenizer thread and the parser.
pub const CHANNEL_CAPACITY: usize = 2;

/// 解析器读取 token 的来源
pub(crate) enum TokenStream<'a> {
    Inline(Lexer<'a>),
    Channel(Receiver<Token<'a>>),
}

impl<'a> TokenStream<'a> {
    pub(crate) fn inline(lexer: Lexer<'a>) -> Self {
        TokenStream::Inline(lexer)
    }

    /// 在 scoped 线程中运行 `lexer`，通过有界通道输出 token。
    /// 发出终止 token 或接收端被丢弃后生产者退出，由 scope 负责 join。
    pub(crate) fn spawn<'scope, 'env>(scope: &'scope Scope<'scope, 'env>, lexer: Lexer<'a>) -> Self
    where
        'a: 'scope,
    {
        let fallback = lexer.clone();
        let (tx, rx) = sync_channel(CHANNEL_CAPACITY);
        let spawned = thread::Builder::new()
            .name("stache-lexer".to_string())
            .spawn_scoped(scope, move || {
                for token in lexer {
                    if tx.send(token).is_err() {
                        trace!("token receiver dropped, stopping lexer");
                        break;
                    }
                }
            });
        match spawned {
            Ok(_) => TokenStream::Channel(rx),
            Err(e) => {
                warn!(error = %e, "could not spawn lexer thread, lexing inline");
                TokenStream::Inline(fallback)
            }
        }
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        match self {
            TokenStream::Inline(lexer) => lexer.next(),
            TokenStream::Channel(rx) => rx.recv().ok(),
        }
    }
}
